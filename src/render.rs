//! Pure fragment rendering.
//!
//! Every function here maps domain data to an HTML fragment string and
//! nothing else: no I/O, no shared state, total over all inputs. All
//! user-supplied text passes through [`escape`] before insertion.

use crate::protocol::{Match, Message, Persona};
use crate::state::ChatKey;
use crate::voice::{QuestionRow, RecorderPhase};

/// The fixed quick-react palette offered as one-tap reactions. The wire
/// format accepts any emoji key; the UI only offers these four.
pub const REACTION_EMOJIS: [&str; 4] = ["👍", "❤️", "😂", "🔥"];

/// Topics the user may open as extra conversation tabs.
pub const ADDABLE_TOPICS: [&str; 12] = [
    "Finance", "Politics", "Science", "Books", "Music", "Gaming", "Startups", "Travel", "Food",
    "Fitness", "Art", "Movies",
];

/// Neutralize markup in user-supplied text.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Display a 0–100 score without a trailing `.0` for whole numbers.
pub fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{}", score as i64)
    } else {
        format!("{:.1}", score)
    }
}

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

/// One fragment per message, in input order. A missing server id defaults
/// to the message's position. With reactions enabled, each message shows
/// its existing tallies as badges followed by the quick-react palette.
pub fn render_messages(messages: &[Message], with_reactions: bool) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(idx, m)| {
            let id = m
                .id
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_else(|| idx.to_string());

            let reaction_html = if with_reactions {
                let badges: String = m
                    .reactions
                    .iter()
                    .map(|(emoji, count)| {
                        format!(
                            "<span class=\"msg-reaction\" data-msg-id=\"{}\" data-emoji=\"{}\">{} {}</span>",
                            escape(&id),
                            escape(emoji),
                            escape(emoji),
                            count
                        )
                    })
                    .collect();
                let palette: String = REACTION_EMOJIS
                    .iter()
                    .map(|emoji| {
                        format!(
                            "<button type=\"button\" class=\"msg-reaction msg-reaction-add\" data-msg-id=\"{}\" data-emoji=\"{}\" title=\"Add {}\">{}</button>",
                            escape(&id),
                            emoji,
                            emoji,
                            emoji
                        )
                    })
                    .collect();
                format!("<div class=\"msg-reactions\">{}{}</div>", badges, palette)
            } else {
                String::new()
            };

            let timestamp_html = m
                .timestamp
                .as_deref()
                .map(|t| format!("<div class=\"time\">{}</div>", escape(t)))
                .unwrap_or_default();

            format!(
                "<div class=\"chat-msg\" data-msg-id=\"{}\"><span class=\"speaker\">{}</span><span class=\"bubble\">{}</span>{}{}</div>",
                escape(&id),
                escape(&m.speaker),
                escape(&m.text),
                timestamp_html,
                reaction_html
            )
        })
        .collect()
}

/// Conversation-specific empty-state notice. The general room offers a
/// generate control; the human chat invites a first message.
pub fn render_empty_state(key: &ChatKey) -> String {
    match key {
        ChatKey::General => concat!(
            "<p class=\"empty-msg\">No multi-agent conversation yet.</p>",
            "<button type=\"button\" class=\"btn-generate\" id=\"btn-generate-general\">",
            "Generate conversation (multi-agent)</button>"
        )
        .to_string(),
        ChatKey::Human => {
            "<p class=\"empty-msg\">No messages yet. Say something and the assistant will reply.</p>"
                .to_string()
        }
        ChatKey::Topic(_) => {
            "<p class=\"empty-msg\">No conversation for this topic yet.</p>".to_string()
        }
    }
}

/// Full transcript fragment: the empty state when there are no messages,
/// the rendered message list otherwise.
pub fn render_transcript(key: &ChatKey, messages: &[Message], with_reactions: bool) -> String {
    if messages.is_empty() {
        render_empty_state(key)
    } else {
        render_messages(messages, with_reactions)
    }
}

/// Shown in the general room while server-side generation is in flight.
pub fn render_generating_notice() -> String {
    "<p class=\"empty-msg\">Generating multi-agent chat (personas taking turns)…</p>".to_string()
}

/// Shown when generation returned no messages (no personas exist yet).
pub fn render_generation_empty() -> String {
    "<p class=\"empty-msg\">No messages generated. Add personas first (Profile → Create persona).</p>"
        .to_string()
}

/// Inline generation failure with a retry control.
pub fn render_generation_error(message: &str) -> String {
    format!(
        "<p class=\"empty-msg\">Error: {}</p><button type=\"button\" class=\"btn-generate\" id=\"btn-generate-general\">Retry</button>",
        escape(message)
    )
}

// ---------------------------------------------------------------------------
// Tabs
// ---------------------------------------------------------------------------

/// The tab bar: the two built-in rooms, then each opened topic in order.
pub fn render_tabs(added_tabs: &[String], active: &ChatKey) -> String {
    let mut tabs = vec![
        ("human".to_string(), "Human Chat".to_string()),
        ("general".to_string(), "General".to_string()),
    ];
    for topic in added_tabs {
        tabs.push((topic.to_lowercase(), topic.clone()));
    }
    tabs.iter()
        .map(|(key, label)| {
            let class = if key == active.as_str() {
                "nav-tab active"
            } else {
                "nav-tab"
            };
            format!(
                "<button type=\"button\" class=\"{}\" data-chat=\"{}\">{}</button>",
                class,
                escape(key),
                escape(label)
            )
        })
        .collect()
}

/// The add-topic menu, hiding topics that already have a tab.
pub fn render_topic_menu(added_tabs: &[String]) -> String {
    ADDABLE_TOPICS
        .iter()
        .filter(|topic| {
            !added_tabs
                .iter()
                .any(|t| t.eq_ignore_ascii_case(topic))
        })
        .map(|topic| {
            format!(
                "<button type=\"button\" class=\"add-topic-item\" data-topic=\"{}\">{}</button>",
                topic, topic
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

/// Summary cards for the ranked match list; the selected card (if any)
/// carries the `active` class.
pub fn render_match_cards(matches: &[Match], selected: Option<usize>) -> String {
    matches
        .iter()
        .enumerate()
        .map(|(idx, m)| {
            let class = if selected == Some(idx) {
                "match-card active"
            } else {
                "match-card"
            };
            format!(
                "<div class=\"{}\" data-match-index=\"{}\">\
                 <div class=\"match-score-row\"><span class=\"match-name\">{}</span>\
                 <span class=\"score-badge\">{}% Match</span></div>\
                 <div class=\"match-reason\">{}</div></div>",
                class,
                idx,
                escape(&m.user_a),
                format_score(m.score),
                escape(&m.reason)
            )
        })
        .collect()
}

/// Expanded detail panel for one match.
pub fn render_match_detail(m: &Match) -> String {
    format!(
        "<div class=\"match-detail-card\"><h2>{}</h2>\
         <span class=\"score-badge\">{}% Match</span>\
         <p class=\"match-reason\">{}</p>\
         <div class=\"match-detail-actions\">\
         <button type=\"button\" class=\"btn-secondary\" id=\"btn-back-chat\">← Back to chat</button>\
         <button type=\"button\" class=\"btn-primary\" id=\"btn-view-profile\">View profile</button>\
         <button type=\"button\" class=\"btn-primary\" id=\"btn-send-request\">Send connection request</button>\
         </div></div>",
        escape(&m.user_a),
        format_score(m.score),
        escape(&m.reason)
    )
}

/// Read-only profile fragment appended under the detail card.
pub fn render_profile_fragment(persona: &Persona) -> String {
    format!(
        "<div class=\"profile-fragment\"><strong>Profile</strong><p>{}</p>\
         <p><strong>Interests:</strong> {}</p></div>",
        escape(&persona.personality_summary),
        escape(&persona.interests.join(", "))
    )
}

// ---------------------------------------------------------------------------
// Voice questions
// ---------------------------------------------------------------------------

fn voice_answer_text(row: &QuestionRow) -> String {
    if let Some(err) = &row.error {
        return format!("Error: {}", escape(err));
    }
    match row.phase {
        RecorderPhase::Recording => "Recording…".to_string(),
        RecorderPhase::Stopping => "Transcribing…".to_string(),
        RecorderPhase::Idle => {
            if row.answer.is_empty() {
                String::new()
            } else {
                escape(&row.answer)
            }
        }
    }
}

/// One block per onboarding question: question text, record/stop controls
/// (visibility driven by the row's phase), and the answer / status line.
pub fn render_voice_questions(rows: &[QuestionRow]) -> String {
    rows.iter()
        .enumerate()
        .map(|(idx, row)| {
            let recording = row.phase == RecorderPhase::Recording;
            format!(
                "<div class=\"voice-q-block\" data-index=\"{idx}\">\
                 <div class=\"voice-q-text\">{}</div>\
                 <div class=\"voice-q-actions\">\
                 <button type=\"button\" class=\"btn-record\" data-index=\"{idx}\"{}>Record</button>\
                 <button type=\"button\" class=\"btn-stop\" data-index=\"{idx}\"{}>Stop</button>\
                 </div>\
                 <div class=\"voice-q-answer\" data-index=\"{idx}\">{}</div></div>",
                escape(&row.question),
                if recording { " style=\"display:none\"" } else { "" },
                if recording { "" } else { " style=\"display:none\"" },
                voice_answer_text(row)
            )
        })
        .collect()
}
