pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod matches;
pub mod protocol;
pub mod render;
pub mod state;
pub mod store;
pub mod stream;
pub mod voice;
pub mod web;

use tokio::sync::mpsc;

use api::ApiClient;
use error::{ApiError, VoiceError};
use matches::{MatchPanel, ProfileLookup};
use protocol::{Message, MessageId, Profile};
use state::{Action, ChatKey, Effect, ViewState};
use store::TranscriptStore;
use voice::{QuestionRow, VoicePipeline};

// ---------------------------------------------------------------------------
// Controller — the conversation view core
// ---------------------------------------------------------------------------

/// Owns the view state, the transcript cache and the collaborating
/// sub-controllers, and turns user actions into server calls plus rendered
/// fragments. Both frontends — terminal and web gateway — drive this type;
/// neither touches view state directly.
pub struct Controller {
    api: ApiClient,
    store: TranscriptStore,
    state: ViewState,
    matches: MatchPanel,
    voice: VoicePipeline,
    /// Narrow in-flight guard for the generate control: the page stays
    /// interactive, only duplicate generation submits are blocked.
    generating: bool,
}

impl Controller {
    pub fn new(server_url: &str) -> Self {
        let api = ApiClient::new(server_url);
        Controller {
            store: store::new_transcript_store(),
            matches: MatchPanel::new(api.clone()),
            voice: VoicePipeline::new(api.clone()),
            api,
            state: ViewState::default(),
            generating: false,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn transcripts(&self) -> TranscriptStore {
        self.store.clone()
    }

    /// Run one action through the reducer and adopt the resulting state.
    pub fn dispatch(&mut self, action: Action) -> Option<Effect> {
        let step = state::reduce(&self.state, action);
        self.state = step.state;
        step.effect
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    /// Fetch one conversation and replace its cached transcript.
    pub async fn fetch_conversation(&self, key: &ChatKey) -> Result<Vec<Message>, ApiError> {
        let batch = self.api.conversation(key.as_str()).await?;
        store::replace(&self.store, key.as_str(), batch.messages.clone());
        Ok(batch.messages)
    }

    /// Full reload of a conversation, folded into a displayable fragment:
    /// fetch failures render as the conversation's empty/error notice, the
    /// way the transcript panel shows them.
    pub async fn conversation_fragment(&mut self, key: &ChatKey) -> String {
        match self.fetch_conversation(key).await {
            Ok(messages) => render::render_transcript(key, &messages, key.supports_reactions()),
            Err(e) => {
                tracing::debug!(chat = %key, error = %e, "conversation load failed");
                match key {
                    ChatKey::Human => {
                        "<p class=\"empty-msg\">Could not load human chat.</p>".to_string()
                    }
                    _ => render::render_empty_state(key),
                }
            }
        }
    }

    /// Tab click: transition, then reload the now-active conversation.
    pub async fn select_tab(&mut self, key: ChatKey) -> String {
        self.dispatch(Action::SelectTab(key.clone()));
        self.conversation_fragment(&key).await
    }

    /// Open a topic tab. Idempotent: re-adding switches nothing and loads
    /// nothing the second time.
    pub async fn add_topic(&mut self, name: &str) -> Option<String> {
        match self.dispatch(Action::AddTopic(name.to_string())) {
            Some(Effect::LoadConversation(key)) => Some(self.conversation_fragment(&key).await),
            _ => None,
        }
    }

    /// Submit a human turn. The server echoes the refreshed transcript
    /// (human turn plus reply); an empty echo falls back to a reload.
    pub async fn send_human(&mut self, text: &str) -> Result<String, ApiError> {
        let batch = self.api.send_human(text).await?;
        if batch.messages.is_empty() {
            Ok(self.conversation_fragment(&ChatKey::Human).await)
        } else {
            store::replace(&self.store, "human", batch.messages.clone());
            Ok(render::render_messages(&batch.messages, true))
        }
    }

    pub async fn clear_human(&mut self) -> Result<String, ApiError> {
        self.api.clear_human().await?;
        Ok(self.conversation_fragment(&ChatKey::Human).await)
    }

    /// Submit a reaction, then reload so the rendered tally is always the
    /// server's. No optimistic local increment; on failure the transcript
    /// is left untouched and the error propagates to a blocking alert.
    pub async fn react(&mut self, message_id: MessageId, emoji: &str) -> Result<String, ApiError> {
        self.api.react(message_id, emoji).await?;
        Ok(self.conversation_fragment(&ChatKey::Human).await)
    }

    /// Trigger server-side multi-agent generation for the general room.
    /// Duplicate submissions while one is in flight are ignored.
    pub async fn generate_general(&mut self, turns: u32) -> String {
        if self.generating {
            return render::render_generating_notice();
        }
        self.generating = true;
        let result = self.api.generate_general(turns).await;
        self.generating = false;

        match result {
            Ok(batch) if batch.messages.is_empty() => render::render_generation_empty(),
            Ok(batch) => {
                store::replace(&self.store, "general", batch.messages.clone());
                render::render_messages(&batch.messages, false)
            }
            Err(e) => render::render_generation_error(&e.to_string()),
        }
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    // -----------------------------------------------------------------------
    // History stream
    // -----------------------------------------------------------------------

    /// Attach the live history stream once per session. Streamed messages
    /// are appended to the shared transcript (id-deduplicated) and handed
    /// to the returned receiver in arrival order. The feed ends silently
    /// when the upstream channel closes — terminal for this session.
    pub fn start_history_stream(&self) -> mpsc::UnboundedReceiver<Message> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let api = self.api.clone();
        let transcripts = self.store.clone();

        tokio::spawn(async move {
            if let Err(e) = stream::run(api, raw_tx).await {
                tracing::warn!(error = %e, "history stream terminated");
            }
        });
        tokio::spawn(async move {
            while let Some(message) = raw_rx.recv().await {
                if store::append(&transcripts, "human", message.clone())
                    && out_tx.send(message).is_err()
                {
                    break;
                }
            }
        });

        out_rx
    }

    // -----------------------------------------------------------------------
    // Matches
    // -----------------------------------------------------------------------

    /// Refetch the ranked list (falling back when empty/unreachable) and
    /// invalidate any positional selection.
    pub async fn matches_fragment(&mut self) -> String {
        self.matches.load().await;
        self.dispatch(Action::MatchesReloaded);
        render::render_match_cards(self.matches.list(), self.state.selected_match)
    }

    /// Card click: select by position and build both the re-rendered card
    /// list and the detail panel. Returns `None` for a stale index.
    pub async fn select_match(&mut self, index: usize) -> Option<(String, String)> {
        let m = self.matches.get(index)?.clone();
        self.dispatch(Action::SelectMatch(index));
        let cards = render::render_match_cards(self.matches.list(), Some(index));
        let detail = render::render_match_detail(&m);
        Some((cards, detail))
    }

    /// Detail panel's back action: return to the human chat and reload it.
    pub async fn back_to_chat(&mut self) -> String {
        self.dispatch(Action::BackToChat);
        self.conversation_fragment(&ChatKey::Human).await
    }

    pub async fn view_profile(&self, index: usize) -> Result<ProfileLookup, ApiError> {
        self.matches.lookup_profile(index).await
    }

    pub async fn send_connection_request(&self, index: usize) -> Result<String, ApiError> {
        self.matches.send_connection_request(index).await
    }

    pub fn match_list(&self) -> &[protocol::Match] {
        self.matches.list()
    }

    pub async fn load_matches(&mut self) -> &[protocol::Match] {
        self.matches.load().await;
        self.dispatch(Action::MatchesReloaded);
        self.matches.list()
    }

    // -----------------------------------------------------------------------
    // Onboarding
    // -----------------------------------------------------------------------

    /// Save the questionnaire server-side; only a successful save unlocks
    /// persona creation.
    pub async fn save_profile(&mut self, profile: Profile) -> Result<(), ApiError> {
        self.api.save_profile(&profile).await?;
        self.voice.save_profile(profile);
        Ok(())
    }

    /// Fetch the onboarding questions and build their rows. A failure
    /// leaves the rows empty — persona creation from the profile alone
    /// stays available.
    pub async fn load_questions(&mut self) -> Result<usize, ApiError> {
        let list = self.api.questions().await?;
        let count = list.questions.len();
        self.voice.set_questions(list.questions);
        Ok(count)
    }

    pub fn voice_rows(&self) -> &[QuestionRow] {
        self.voice.rows()
    }

    pub fn set_capture_program(&mut self, program: String, args: Vec<String>) {
        self.voice.set_capture_program(program, args);
    }

    pub async fn start_recording(&mut self, index: usize) -> Result<(), VoiceError> {
        self.voice.start_recording(index).await
    }

    pub async fn stop_recording(&mut self, index: usize) -> Result<String, VoiceError> {
        self.voice.stop_recording(index).await
    }

    pub async fn create_persona(&mut self) -> Result<(), VoiceError> {
        self.voice.create_persona().await
    }

    pub fn persona_ready(&self) -> bool {
        self.voice.saved_profile().is_some()
    }
}

/// Render a persona lookup the way the detail panel consumes it: a profile
/// fragment on a hit, the blocking-alert text on a miss.
pub fn profile_outcome(lookup: ProfileLookup) -> Result<String, String> {
    match lookup {
        ProfileLookup::Found(persona) => Ok(render::render_profile_fragment(&persona)),
        ProfileLookup::Missing { name, reason } => Err(format!(
            "No full profile found for {}. Match reason: {}",
            name, reason
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::Persona;

    fn make_controller() -> Controller {
        // Port 1 refuses connections, so every network call fails fast —
        // exactly what the degradation paths under test need.
        Controller::new("http://127.0.0.1:1")
    }

    #[test]
    fn test_initial_state_is_human_chat() {
        let controller = make_controller();
        assert_eq!(controller.state().active_chat, ChatKey::Human);
        assert_eq!(controller.state().view_mode, state::ViewMode::Chat);
    }

    #[test]
    fn test_dispatch_updates_state() {
        let mut controller = make_controller();
        let effect = controller.dispatch(Action::SelectTab(ChatKey::General));
        assert_eq!(effect, Some(Effect::LoadConversation(ChatKey::General)));
        assert_eq!(controller.state().active_chat, ChatKey::General);
    }

    #[tokio::test]
    async fn test_human_load_failure_fragment() {
        let mut controller = make_controller();
        let html = controller.conversation_fragment(&ChatKey::Human).await;
        assert!(html.contains("Could not load human chat."));
    }

    #[tokio::test]
    async fn test_topic_load_failure_uses_empty_state() {
        let mut controller = make_controller();
        let html = controller
            .conversation_fragment(&ChatKey::Topic("books".into()))
            .await;
        assert!(html.contains("No conversation for this topic yet."));
    }

    #[tokio::test]
    async fn test_general_load_failure_offers_generate() {
        let mut controller = make_controller();
        let html = controller.conversation_fragment(&ChatKey::General).await;
        assert!(html.contains("btn-generate-general"));
    }

    #[tokio::test]
    async fn test_add_topic_second_add_returns_none() {
        let mut controller = make_controller();
        assert!(controller.add_topic("Books").await.is_some());
        assert!(controller.add_topic("Books").await.is_none());
        assert_eq!(controller.state().added_tabs.len(), 1);
    }

    #[tokio::test]
    async fn test_react_failure_propagates() {
        let mut controller = make_controller();
        let result = controller.react(MessageId::Num(1), "👍").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_generate_failure_renders_retry() {
        let mut controller = make_controller();
        let html = controller.generate_general(10).await;
        assert!(html.contains("Error:"));
        assert!(html.contains("Retry"));
        assert!(!controller.is_generating());
    }

    #[tokio::test]
    async fn test_matches_fragment_falls_back_and_clears_selection() {
        let mut controller = make_controller();
        controller.dispatch(Action::SelectMatch(2));
        let html = controller.matches_fragment().await;
        assert!(controller.state().selected_match.is_none());
        assert!(html.contains("Alex Chen"));
        assert!(!html.contains("match-card active"));
    }

    #[tokio::test]
    async fn test_select_match_renders_cards_and_detail() {
        let mut controller = make_controller();
        controller.load_matches().await;
        let (cards, detail) = controller.select_match(0).await.expect("selectable");
        assert!(cards.contains("match-card active\" data-match-index=\"0\""));
        assert!(detail.contains("Alex Chen"));
        assert!(detail.contains("btn-back-chat"));
        assert_eq!(controller.state().selected_match, Some(0));
    }

    #[tokio::test]
    async fn test_select_match_stale_index_is_none() {
        let mut controller = make_controller();
        assert!(controller.select_match(0).await.is_none());
    }

    #[tokio::test]
    async fn test_back_to_chat_restores_human_view() {
        let mut controller = make_controller();
        controller.load_matches().await;
        controller.select_match(1).await;
        let html = controller.back_to_chat().await;
        assert_eq!(controller.state().view_mode, state::ViewMode::Chat);
        assert_eq!(controller.state().active_chat, ChatKey::Human);
        assert!(html.contains("empty-msg"));
    }

    #[tokio::test]
    async fn test_connection_request_on_stale_index_fails() {
        let controller = make_controller();
        assert!(controller.send_connection_request(0).await.is_err());
    }

    #[test]
    fn test_persona_not_ready_without_profile() {
        let controller = make_controller();
        assert!(!controller.persona_ready());
    }

    #[test]
    fn test_profile_outcome_found() {
        let lookup = ProfileLookup::Found(Persona {
            name: "Alex".into(),
            personality_summary: "curious".into(),
            interests: vec!["ai".into()],
        });
        let html = profile_outcome(lookup).expect("fragment");
        assert!(html.contains("curious"));
    }

    #[test]
    fn test_profile_outcome_missing_builds_alert_text() {
        let lookup = ProfileLookup::Missing {
            name: "Alex Chen".into(),
            reason: "Shared interest in AI".into(),
        };
        let alert = profile_outcome(lookup).expect_err("alert");
        assert!(alert.contains("No full profile found for Alex Chen"));
        assert!(alert.contains("Shared interest in AI"));
    }
}
