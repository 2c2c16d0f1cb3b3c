//! Raw events as handed over by the remote timeline backend.
//!
//! The engine only reads a narrow slice of each event: its type, sender,
//! timestamp, content payload and relation pointer. Everything else stays opaque
//! inside `content`.

use serde::{Deserialize, Serialize};

/// Event type of a room message.
pub const MESSAGE_EVENT_TYPE: &str = "m.room.message";

/// Event type of a reaction (annotation) event.
pub const REACTION_EVENT_TYPE: &str = "m.reaction";

/// Event type of a redaction (retraction) event.
pub const REDACTION_EVENT_TYPE: &str = "m.room.redaction";

const RELATES_TO_KEY: &str = "m.relates_to";
const ANNOTATION_REL_TYPE: &str = "m.annotation";
const REPLACE_REL_TYPE: &str = "m.replace";

/// Local send status of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Acknowledged by the remote system.
    #[default]
    Delivered,
    /// Local echo still waiting for the remote acknowledgement.
    Pending,
    /// Local echo the remote system rejected.
    Failed,
}

/// An event from the remote, append-only conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Unique identifier assigned by the remote system
    pub event_id: String,

    /// Type discriminator (`m.room.message`, `m.reaction`, ...)
    #[serde(rename = "type")]
    pub event_type: String,

    /// Originating account id
    pub sender: String,

    /// Wall-clock timestamp in milliseconds
    pub origin_server_ts: u64,

    /// Type-specific payload
    #[serde(default)]
    pub content: serde_json::Value,

    /// Target of a redaction event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts: Option<String>,

    /// Local send status
    #[serde(default)]
    pub status: EventStatus,
}

/// Relation pointer carried by an event's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// The event quotes another event.
    Reply { event_id: String },
    /// The event annotates another event with a reaction key.
    Annotation { event_id: String, key: String },
    /// The event replaces the content of another event.
    Replacement { event_id: String },
}

#[derive(Debug, Deserialize)]
struct RelatesTo {
    rel_type: Option<String>,
    event_id: Option<String>,
    key: Option<String>,
    #[serde(rename = "m.in_reply_to")]
    in_reply_to: Option<InReplyTo>,
}

#[derive(Debug, Deserialize)]
struct InReplyTo {
    event_id: String,
}

impl RawEvent {
    /// Decode a single event from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_message(&self) -> bool {
        self.event_type == MESSAGE_EVENT_TYPE
    }

    pub fn is_reaction(&self) -> bool {
        self.event_type == REACTION_EVENT_TYPE
    }

    pub fn is_redaction(&self) -> bool {
        self.event_type == REDACTION_EVENT_TYPE
    }

    pub fn is_delivered(&self) -> bool {
        self.status == EventStatus::Delivered
    }

    /// Parse the relation pointer, if any.
    ///
    /// Malformed relation payloads are treated as absent.
    pub fn relation(&self) -> Option<Relation> {
        let relates_to = self.content.get(RELATES_TO_KEY)?;
        let relates_to = RelatesTo::deserialize(relates_to).ok()?;

        match (relates_to.rel_type.as_deref(), relates_to.event_id) {
            (Some(ANNOTATION_REL_TYPE), Some(event_id)) => {
                let key = relates_to.key?;
                Some(Relation::Annotation { event_id, key })
            }
            (Some(REPLACE_REL_TYPE), Some(event_id)) => Some(Relation::Replacement { event_id }),
            _ => relates_to.in_reply_to.map(|reply| Relation::Reply {
                event_id: reply.event_id,
            }),
        }
    }

    /// Target of this event when it is a redaction.
    ///
    /// Newer room versions carry the target inside `content.redacts`.
    pub fn redacted_event_id(&self) -> Option<&str> {
        if !self.is_redaction() {
            return None;
        }
        self.redacts
            .as_deref()
            .or_else(|| self.content.get("redacts").and_then(|v| v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, content: serde_json::Value) -> RawEvent {
        RawEvent {
            event_id: "$event".to_string(),
            event_type: event_type.to_string(),
            sender: "@alice:example.org".to_string(),
            origin_server_ts: 1_700_000_000_000,
            content,
            redacts: None,
            status: EventStatus::Delivered,
        }
    }

    #[test]
    fn test_decode_from_json_defaults_status_to_delivered() {
        let raw = RawEvent::from_json(
            r#"{"event_id":"$1","type":"m.room.message","sender":"@a:x","origin_server_ts":5,
                "content":{"msgtype":"m.text","body":"hi"}}"#,
        )
        .unwrap();

        assert_eq!(raw.event_id, "$1");
        assert!(raw.is_message());
        assert_eq!(raw.status, EventStatus::Delivered);
        assert!(raw.redacts.is_none());
    }

    #[test]
    fn test_decode_rejects_missing_event_id() {
        let result = RawEvent::from_json(r#"{"type":"m.room.message","sender":"@a:x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_annotation_relation() {
        let raw = event(
            REACTION_EVENT_TYPE,
            json!({"m.relates_to": {"rel_type": "m.annotation", "event_id": "$target", "key": "👍"}}),
        );

        assert_eq!(
            raw.relation(),
            Some(Relation::Annotation {
                event_id: "$target".to_string(),
                key: "👍".to_string()
            })
        );
    }

    #[test]
    fn test_annotation_without_key_is_ignored() {
        let raw = event(
            REACTION_EVENT_TYPE,
            json!({"m.relates_to": {"rel_type": "m.annotation", "event_id": "$target"}}),
        );
        assert!(raw.relation().is_none());
    }

    #[test]
    fn test_reply_and_replacement_relations() {
        let reply = event(
            MESSAGE_EVENT_TYPE,
            json!({"msgtype": "m.text", "body": "re", "m.relates_to": {"m.in_reply_to": {"event_id": "$orig"}}}),
        );
        assert_eq!(
            reply.relation(),
            Some(Relation::Reply {
                event_id: "$orig".to_string()
            })
        );

        let edit = event(
            MESSAGE_EVENT_TYPE,
            json!({"msgtype": "m.text", "body": "* fixed", "m.relates_to": {"rel_type": "m.replace", "event_id": "$orig"}}),
        );
        assert_eq!(
            edit.relation(),
            Some(Relation::Replacement {
                event_id: "$orig".to_string()
            })
        );
    }

    #[test]
    fn test_malformed_relation_is_absent() {
        let raw = event(MESSAGE_EVENT_TYPE, json!({"m.relates_to": "nonsense"}));
        assert!(raw.relation().is_none());
    }

    #[test]
    fn test_redaction_target_from_either_location() {
        let mut top_level = event(REDACTION_EVENT_TYPE, json!({}));
        top_level.redacts = Some("$gone".to_string());
        assert_eq!(top_level.redacted_event_id(), Some("$gone"));

        let in_content = event(REDACTION_EVENT_TYPE, json!({"redacts": "$also_gone"}));
        assert_eq!(in_content.redacted_event_id(), Some("$also_gone"));

        let not_redaction = event(MESSAGE_EVENT_TYPE, json!({"redacts": "$x"}));
        assert!(not_redaction.redacted_event_id().is_none());
    }
}
