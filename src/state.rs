//! View-mode state machine.
//!
//! All view transitions run through a single reducer over an immutable
//! state snapshot; handlers never mutate shared view fields directly.
//! Rendering always derives from the `ViewState` the reducer returned.

// ---------------------------------------------------------------------------
// Chat keys
// ---------------------------------------------------------------------------

/// Identifier of a conversation room. Topic keys are stored lowercased;
/// parsing any casing of `human`/`general` yields the built-in rooms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatKey {
    Human,
    General,
    Topic(String),
}

impl ChatKey {
    pub fn parse(s: &str) -> ChatKey {
        match s.to_lowercase().as_str() {
            "human" => ChatKey::Human,
            "general" => ChatKey::General,
            other => ChatKey::Topic(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ChatKey::Human => "human",
            ChatKey::General => "general",
            ChatKey::Topic(key) => key,
        }
    }

    /// Reaction affordances exist only on the authenticated human chat.
    pub fn supports_reactions(&self) -> bool {
        matches!(self, ChatKey::Human)
    }
}

impl std::fmt::Display for ChatKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// View state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Chat,
    MatchDetail,
}

/// Process-wide view state for one page session. No persistence: a fresh
/// session always starts on the human chat in chat mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub active_chat: ChatKey,
    pub view_mode: ViewMode,
    /// Positional weak reference into the cached match list; cleared
    /// whenever the list is refetched.
    pub selected_match: Option<usize>,
    /// Display names of topics the user has opened, in open order.
    pub added_tabs: Vec<String>,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            active_chat: ChatKey::Human,
            view_mode: ViewMode::Chat,
            selected_match: None,
            added_tabs: Vec::new(),
        }
    }
}

impl ViewState {
    pub fn has_topic(&self, name: &str) -> bool {
        let key = name.to_lowercase();
        self.added_tabs.iter().any(|t| t.to_lowercase() == key)
    }
}

// ---------------------------------------------------------------------------
// Actions and effects
// ---------------------------------------------------------------------------

/// User-originated view transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SelectTab(ChatKey),
    SelectMatch(usize),
    BackToChat,
    AddTopic(String),
    /// The match list was refetched; positional selection is stale.
    MatchesReloaded,
}

/// Work the controller must perform after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    LoadConversation(ChatKey),
    ShowMatchDetail(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub state: ViewState,
    pub effect: Option<Effect>,
}

/// The single reducer. Every transition of §view state goes through here;
/// unknown or unreachable transitions return the input state untouched.
pub fn reduce(state: &ViewState, action: Action) -> Step {
    match action {
        Action::SelectTab(key) => {
            let mut next = state.clone();
            next.active_chat = key.clone();
            next.view_mode = ViewMode::Chat;
            Step {
                state: next,
                effect: Some(Effect::LoadConversation(key)),
            }
        }
        Action::SelectMatch(index) => {
            let mut next = state.clone();
            next.view_mode = ViewMode::MatchDetail;
            next.selected_match = Some(index);
            Step {
                state: next,
                effect: Some(Effect::ShowMatchDetail(index)),
            }
        }
        Action::BackToChat => {
            // Only reachable from the detail panel.
            if state.view_mode != ViewMode::MatchDetail {
                return Step {
                    state: state.clone(),
                    effect: None,
                };
            }
            let mut next = state.clone();
            next.view_mode = ViewMode::Chat;
            next.active_chat = ChatKey::Human;
            Step {
                state: next,
                effect: Some(Effect::LoadConversation(ChatKey::Human)),
            }
        }
        Action::AddTopic(name) => {
            if state.has_topic(&name) {
                // Idempotent: a second add of the same topic is a no-op.
                return Step {
                    state: state.clone(),
                    effect: None,
                };
            }
            let key = ChatKey::Topic(name.to_lowercase());
            let mut next = state.clone();
            next.added_tabs.push(name);
            next.active_chat = key.clone();
            next.view_mode = ViewMode::Chat;
            Step {
                state: next,
                effect: Some(Effect::LoadConversation(key)),
            }
        }
        Action::MatchesReloaded => {
            let mut next = state.clone();
            next.selected_match = None;
            Step {
                state: next,
                effect: None,
            }
        }
    }
}
