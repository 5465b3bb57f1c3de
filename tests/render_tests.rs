//! External tests for the fragment renderer — escaping guarantees, empty
//! states, and the end-to-end rendering scenarios the panels rely on.

use mingle::matches::FALLBACK_MATCHES;
use mingle::protocol::{Message, MessageId};
use mingle::render::*;
use mingle::state::ChatKey;

use proptest::prelude::*;

fn msg(speaker: &str, text: &str) -> Message {
    Message::new(speaker, text)
}

// -- escaping property ------------------------------------------------------

proptest! {
    /// Whatever the input text, every `<` in the rendered markup opens a
    /// tag the renderer itself emits — user text can never introduce one.
    #[test]
    fn prop_user_text_never_opens_a_tag(speaker in "\\PC*", text in "\\PC*") {
        let html = render_messages(&[msg(&speaker, &text)], true);
        for (i, _) in html.match_indices('<') {
            let rest = &html[i..];
            prop_assert!(
                rest.starts_with("<div")
                    || rest.starts_with("<span")
                    || rest.starts_with("<button")
                    || rest.starts_with("</div")
                    || rest.starts_with("</span")
                    || rest.starts_with("</button"),
                "unexpected '<' at {}", i
            );
        }
    }

    #[test]
    fn prop_escape_round_trips_ampersands(text in "[a-z&<>\"']{0,40}") {
        let escaped = escape(&text);
        prop_assert!(!escaped.contains('<'));
        prop_assert!(!escaped.contains('>'));
        prop_assert!(!escaped.contains('"'));
        // Every ampersand in the output starts an entity we produced.
        for (i, _) in escaped.match_indices('&') {
            let rest = &escaped[i..];
            prop_assert!(
                rest.starts_with("&amp;")
                    || rest.starts_with("&lt;")
                    || rest.starts_with("&gt;")
                    || rest.starts_with("&quot;")
                    || rest.starts_with("&#39;")
            );
        }
    }

    #[test]
    fn prop_one_fragment_per_message(count in 0usize..20) {
        let messages: Vec<Message> =
            (0..count).map(|i| msg("s", &format!("m{}", i))).collect();
        let html = render_messages(&messages, false);
        prop_assert_eq!(html.matches("class=\"chat-msg\"").count(), count);
    }
}

// -- ordering ---------------------------------------------------------------

#[test]
fn test_messages_render_in_input_order() {
    let messages: Vec<Message> = (0..8).map(|i| msg("s", &format!("unique-{}", i))).collect();
    let html = render_messages(&messages, false);
    let positions: Vec<usize> = (0..8)
        .map(|i| html.find(&format!("unique-{}", i)).expect("present"))
        .collect();
    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted);
}

// -- empty general room scenario -------------------------------------------

#[test]
fn test_empty_general_offers_generate_control() {
    let html = render_transcript(&ChatKey::General, &[], false);
    assert!(html.contains("No multi-agent conversation yet."));
    assert!(html.contains("id=\"btn-generate-general\""));
}

#[test]
fn test_generated_message_renders_speaker_and_text() {
    let html = render_messages(&[msg("Alex", "Hi")], false);
    assert!(html.contains("Alex"));
    assert!(html.contains("Hi"));
    assert!(html.contains("class=\"bubble\""));
}

// -- fallback match scenario ------------------------------------------------

#[test]
fn test_fallback_matches_all_render_as_clickable_cards() {
    let html = render_match_cards(&FALLBACK_MATCHES, None);
    assert_eq!(html.matches("match-card").count(), 5);
    for idx in 0..5 {
        assert!(html.contains(&format!("data-match-index=\"{}\"", idx)));
    }
    for m in FALLBACK_MATCHES.iter() {
        assert!(html.contains(&m.reason));
    }
}

#[test]
fn test_fallback_match_detail_shows_fixed_reason() {
    for m in FALLBACK_MATCHES.iter() {
        let html = render_match_detail(m);
        assert!(html.contains(&m.reason));
        assert!(html.contains(&m.user_a));
    }
}

// -- reactions --------------------------------------------------------------

#[test]
fn test_reaction_tallies_come_from_message_data_only() {
    let mut m = msg("a", "x");
    m.id = Some(MessageId::Num(7));
    m.reactions.insert("👍".to_string(), 2);
    m.reactions.insert("🔥".to_string(), 1);
    let html = render_messages(&[m], true);
    assert!(html.contains("👍 2"));
    assert!(html.contains("🔥 1"));
    // No other counts appear anywhere.
    assert!(!html.contains("👍 3"));
}

#[test]
fn test_reaction_palette_absent_in_group_chats() {
    let html = render_messages(&[msg("a", "x")], false);
    assert!(!html.contains("msg-reaction-add"));
}

#[test]
fn test_reaction_buttons_carry_message_id() {
    let mut m = msg("a", "x");
    m.id = Some(MessageId::Text("m-12".into()));
    let html = render_messages(&[m], true);
    assert!(html.contains("data-msg-id=\"m-12\" data-emoji=\"👍\""));
}

// -- timestamps are optional -------------------------------------------------

#[test]
fn test_timestamp_absent_means_no_time_node() {
    let html = render_messages(&[msg("a", "x")], false);
    assert!(!html.contains("class=\"time\""));
}
