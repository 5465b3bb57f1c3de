//! Cached conversation transcripts.
//!
//! ## Design
//! - TranscriptStore: Arc<Mutex<HashMap<chat key, Vec<Message>>>> — shared
//!   between the controller, the stream client and the web gateway
//! - Single writer: only the controller mutates entries
//! - Full reloads replace a transcript wholesale; the stream client is the
//!   only append path
//! - Appends de-duplicate by server-assigned message id; id-less messages
//!   append unconditionally (last write wins, duplicates possible)

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::protocol::Message;

/// Shared transcript cache: chat key → ordered messages.
pub type TranscriptStore = Arc<Mutex<HashMap<String, Vec<Message>>>>;

/// Create a new empty TranscriptStore.
pub fn new_transcript_store() -> TranscriptStore {
    Arc::new(Mutex::new(HashMap::new()))
}

/// Replace a conversation's cached transcript wholesale.
pub fn replace(store: &TranscriptStore, key: &str, messages: Vec<Message>) {
    if let Ok(mut guard) = store.lock() {
        guard.insert(key.to_string(), messages);
    }
}

/// Append one streamed message in arrival order.
///
/// Returns `false` when the message carries an id already present in the
/// cached transcript (a reload beat the stream to it); `true` otherwise.
pub fn append(store: &TranscriptStore, key: &str, message: Message) -> bool {
    let Ok(mut guard) = store.lock() else {
        return false;
    };
    let transcript = guard.entry(key.to_string()).or_default();
    if let Some(id) = &message.id {
        if transcript.iter().any(|m| m.id.as_ref() == Some(id)) {
            return false;
        }
    }
    transcript.push(message);
    true
}

/// Snapshot a conversation's messages (empty when never loaded).
pub fn snapshot(store: &TranscriptStore, key: &str) -> Vec<Message> {
    store
        .lock()
        .ok()
        .and_then(|guard| guard.get(key).cloned())
        .unwrap_or_default()
}

/// Drop a conversation's cached transcript.
pub fn clear(store: &TranscriptStore, key: &str) {
    if let Ok(mut guard) = store.lock() {
        guard.remove(key);
    }
}

/// Number of cached messages for a conversation.
pub fn len(store: &TranscriptStore, key: &str) -> usize {
    store
        .lock()
        .ok()
        .and_then(|guard| guard.get(key).map(|m| m.len()))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageId;

    fn message_with_id(id: i64, text: &str) -> Message {
        Message {
            id: Some(MessageId::Num(id)),
            ..Message::new("Alex", text)
        }
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = new_transcript_store();
        assert!(snapshot(&store, "human").is_empty());
        assert_eq!(len(&store, "human"), 0);
    }

    #[test]
    fn test_replace_overwrites_wholesale() {
        let store = new_transcript_store();
        replace(&store, "human", vec![Message::new("a", "old")]);
        replace(&store, "human", vec![Message::new("b", "new")]);
        let messages = snapshot(&store, "human");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "new");
    }

    #[test]
    fn test_append_preserves_arrival_order() {
        let store = new_transcript_store();
        assert!(append(&store, "general", Message::new("a", "1")));
        assert!(append(&store, "general", Message::new("b", "2")));
        let messages = snapshot(&store, "general");
        assert_eq!(messages[0].text, "1");
        assert_eq!(messages[1].text, "2");
    }

    #[test]
    fn test_append_dedupes_by_id() {
        let store = new_transcript_store();
        replace(&store, "general", vec![message_with_id(1, "hello")]);
        assert!(!append(&store, "general", message_with_id(1, "hello again")));
        assert_eq!(len(&store, "general"), 1);
    }

    #[test]
    fn test_append_idless_always_appends() {
        let store = new_transcript_store();
        assert!(append(&store, "general", Message::new("a", "x")));
        assert!(append(&store, "general", Message::new("a", "x")));
        assert_eq!(len(&store, "general"), 2);
    }

    #[test]
    fn test_append_creates_conversation_implicitly() {
        let store = new_transcript_store();
        assert!(append(&store, "books", Message::new("a", "x")));
        assert_eq!(len(&store, "books"), 1);
    }

    #[test]
    fn test_conversations_are_independent() {
        let store = new_transcript_store();
        replace(&store, "human", vec![Message::new("a", "h")]);
        replace(&store, "general", vec![Message::new("b", "g")]);
        clear(&store, "human");
        assert!(snapshot(&store, "human").is_empty());
        assert_eq!(len(&store, "general"), 1);
    }

    #[test]
    fn test_replace_flushes_streamed_duplicates() {
        let store = new_transcript_store();
        append(&store, "human", message_with_id(1, "streamed"));
        replace(&store, "human", vec![message_with_id(1, "server copy")]);
        let messages = snapshot(&store, "human");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "server copy");
    }
}
