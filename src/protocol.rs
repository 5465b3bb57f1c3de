use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Message records
// ---------------------------------------------------------------------------

/// Server-assigned message identifier. Older deployments number messages,
/// newer ones hand out opaque strings; both must round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Num(i64),
    Text(String),
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageId::Num(n) => write!(f, "{}", n),
            MessageId::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One transcript entry. The simple-history endpoint speaks `role`/`content`,
/// the conversation endpoints speak `speaker`/`text`; the aliases accept both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default, alias = "role")]
    pub speaker: String,
    #[serde(default, alias = "content")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Emoji symbol → tally. The key set is open; counts are non-negative.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reactions: BTreeMap<String, u64>,
}

impl Message {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Message {
            speaker: speaker.into(),
            text: text.into(),
            ..Message::default()
        }
    }
}

/// `{"messages": [...]}` envelope returned by every conversation endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageBatch {
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// One event on the history stream. Anything that is not a `message` event
/// with a role or content present is dropped by the stream client.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

// ---------------------------------------------------------------------------
// Matches and personas
// ---------------------------------------------------------------------------

/// A server-computed compatibility record. Immutable once fetched; the
/// client refers to matches by list position only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub user_a: String,
    pub user_b: String,
    pub score: f64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    #[serde(default)]
    pub personality_summary: String,
    #[serde(default)]
    pub interests: Vec<String>,
}

// ---------------------------------------------------------------------------
// Profile and onboarding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalInfo {
    #[serde(rename = "fullName", default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfessionalInfo {
    #[serde(rename = "jobTitle", default)]
    pub job_title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub skills: Vec<String>,
}

/// The onboarding questionnaire, serialized with the field names the server
/// stores verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub profile: PersonalInfo,
    #[serde(default)]
    pub professional: ProfessionalInfo,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub weekend: String,
    #[serde(rename = "socialEnergy", default)]
    pub social_energy: String,
    #[serde(rename = "communicationStyle", default)]
    pub communication_style: String,
    #[serde(default)]
    pub seeking: String,
}

/// One onboarding question with its transcribed answer (empty until a
/// recording has been transcribed).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaEntry {
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionList {
    #[serde(default)]
    pub questions: Vec<String>,
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactRequest {
    pub message_id: MessageId,
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionRequest {
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscribeRequest {
    pub audio_base64: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscribeResponse {
    #[serde(default)]
    pub text: String,
}

/// `conversation` is `None` (serialized as an explicit `null`) when no
/// question has a non-empty answer — distinct from "had no questions".
#[derive(Debug, Clone, Serialize)]
pub struct CreatePersonaRequest {
    pub profile: Profile,
    pub conversation: Option<Vec<QaEntry>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- Message deserialization --

    #[test]
    fn test_message_full_shape() {
        let json = r#"{"id":3,"speaker":"Alex","text":"hi","timestamp":"12:01","reactions":{"👍":2}}"#;
        let m: Message = serde_json::from_str(json).expect("deser");
        assert_eq!(m.id, Some(MessageId::Num(3)));
        assert_eq!(m.speaker, "Alex");
        assert_eq!(m.text, "hi");
        assert_eq!(m.timestamp.as_deref(), Some("12:01"));
        assert_eq!(m.reactions.get("👍"), Some(&2));
    }

    #[test]
    fn test_message_string_id() {
        let json = r#"{"id":"msg-9","speaker":"a","text":"b"}"#;
        let m: Message = serde_json::from_str(json).expect("deser");
        assert_eq!(m.id, Some(MessageId::Text("msg-9".to_string())));
    }

    #[test]
    fn test_message_missing_optional_fields() {
        let json = r#"{"speaker":"a","text":"b"}"#;
        let m: Message = serde_json::from_str(json).expect("deser");
        assert!(m.id.is_none());
        assert!(m.timestamp.is_none());
        assert!(m.reactions.is_empty());
    }

    #[test]
    fn test_message_role_content_aliases() {
        let json = r#"{"role":"Observer","content":"watching"}"#;
        let m: Message = serde_json::from_str(json).expect("deser");
        assert_eq!(m.speaker, "Observer");
        assert_eq!(m.text, "watching");
    }

    #[test]
    fn test_message_serialize_skips_empty_reactions() {
        let m = Message::new("a", "b");
        let json = serde_json::to_string(&m).expect("ser");
        assert!(!json.contains("reactions"));
        assert!(!json.contains("timestamp"));
        assert!(!json.contains("id"));
    }

    #[test]
    fn test_message_id_display() {
        assert_eq!(MessageId::Num(7).to_string(), "7");
        assert_eq!(MessageId::Text("x1".into()).to_string(), "x1");
    }

    #[test]
    fn test_message_batch_defaults_to_empty() {
        let batch: MessageBatch = serde_json::from_str("{}").expect("deser");
        assert!(batch.messages.is_empty());
    }

    #[test]
    fn test_message_batch_preserves_order() {
        let json = r#"{"messages":[{"speaker":"a","text":"1"},{"speaker":"b","text":"2"}]}"#;
        let batch: MessageBatch = serde_json::from_str(json).expect("deser");
        assert_eq!(batch.messages.len(), 2);
        assert_eq!(batch.messages[0].text, "1");
        assert_eq!(batch.messages[1].text, "2");
    }

    // -- Stream events --

    #[test]
    fn test_stream_event_message() {
        let json = r#"{"type":"message","role":"Priya","content":"hello"}"#;
        let ev: StreamEvent = serde_json::from_str(json).expect("deser");
        assert_eq!(ev.event_type, "message");
        assert_eq!(ev.role.as_deref(), Some("Priya"));
        assert_eq!(ev.content.as_deref(), Some("hello"));
    }

    #[test]
    fn test_stream_event_missing_type_is_empty() {
        let ev: StreamEvent = serde_json::from_str(r#"{"role":"x"}"#).expect("deser");
        assert_eq!(ev.event_type, "");
    }

    // -- Matches and personas --

    #[test]
    fn test_match_deserializes() {
        let json = r#"{"user_a":"Alex Chen","user_b":"You","score":92,"reason":"Shared interest in AI"}"#;
        let m: Match = serde_json::from_str(json).expect("deser");
        assert_eq!(m.user_a, "Alex Chen");
        assert_eq!(m.score, 92.0);
    }

    #[test]
    fn test_match_missing_reason_defaults_empty() {
        let json = r#"{"user_a":"A","user_b":"B","score":50}"#;
        let m: Match = serde_json::from_str(json).expect("deser");
        assert!(m.reason.is_empty());
    }

    #[test]
    fn test_persona_interests_default() {
        let p: Persona = serde_json::from_str(r#"{"name":"Sam"}"#).expect("deser");
        assert!(p.interests.is_empty());
        assert!(p.personality_summary.is_empty());
    }

    // -- Profile wire names --

    #[test]
    fn test_profile_uses_camel_case_wire_names() {
        let profile = Profile {
            profile: PersonalInfo {
                full_name: "Kai".into(),
                ..PersonalInfo::default()
            },
            professional: ProfessionalInfo {
                job_title: "Engineer".into(),
                ..ProfessionalInfo::default()
            },
            social_energy: "ambivert".into(),
            communication_style: "direct".into(),
            ..Profile::default()
        };
        let json = serde_json::to_string(&profile).expect("ser");
        assert!(json.contains("\"fullName\":\"Kai\""));
        assert!(json.contains("\"jobTitle\":\"Engineer\""));
        assert!(json.contains("\"socialEnergy\":\"ambivert\""));
        assert!(json.contains("\"communicationStyle\":\"direct\""));
    }

    #[test]
    fn test_create_persona_null_conversation() {
        let req = CreatePersonaRequest {
            profile: Profile::default(),
            conversation: None,
        };
        let json = serde_json::to_string(&req).expect("ser");
        assert!(json.contains("\"conversation\":null"));
    }

    #[test]
    fn test_create_persona_with_answers() {
        let req = CreatePersonaRequest {
            profile: Profile::default(),
            conversation: Some(vec![QaEntry {
                question: "Describe your weekend".into(),
                answer: "hiking".into(),
            }]),
        };
        let json = serde_json::to_string(&req).expect("ser");
        assert!(json.contains("\"question\":\"Describe your weekend\""));
        assert!(json.contains("\"answer\":\"hiking\""));
    }

    #[test]
    fn test_react_request_numeric_id() {
        let req = ReactRequest {
            message_id: MessageId::Num(4),
            emoji: "🔥".into(),
        };
        let json = serde_json::to_string(&req).expect("ser");
        assert!(json.contains("\"message_id\":4"));
        assert!(json.contains("🔥"));
    }

    #[test]
    fn test_question_list_defaults() {
        let q: QuestionList = serde_json::from_str("{}").expect("deser");
        assert!(q.questions.is_empty());
    }
}
