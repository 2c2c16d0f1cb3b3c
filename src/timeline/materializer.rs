//! Core materialization logic
//!
//! Turns the full local event set of a conversation into the display-ordered
//! message list. Every call recomputes the list from scratch, so the result can
//! never drift from the events it was derived from.

use std::collections::{HashMap, HashSet};

use super::edits::EditIndex;
use super::event_mapper::EventMapper;
use super::reactions::{self, AnnotationIndex};
use super::replies;
use super::types::{MessageItem, RoomContext, TimelineConfig};
use crate::client::{RawEvent, Relation, RemoteTimelineClient};

/// Result of one materialization pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Materialized {
    /// Displayable messages, newest first
    pub messages: Vec<MessageItem>,

    /// Newest delivered event of any type, target of read receipts
    pub newest_event_id: Option<String>,
}

pub struct Materializer<'a> {
    mapper: EventMapper<'a>,
    config: &'a TimelineConfig,
}

impl<'a> Materializer<'a> {
    pub fn new(client: &'a dyn RemoteTimelineClient, config: &'a TimelineConfig) -> Self {
        Self {
            mapper: EventMapper::new(client, config),
            config,
        }
    }

    pub fn materialize(&self, events: &[RawEvent], room: &RoomContext) -> Materialized {
        if events.is_empty() {
            return Materialized::default();
        }

        // Step 1: Deduplicate by event id and sort chronologically
        let mut seen: HashSet<&str> = HashSet::with_capacity(events.len());
        let mut sorted: Vec<&RawEvent> = events
            .iter()
            .filter(|event| seen.insert(event.event_id.as_str()))
            .collect();
        sorted.sort_by(|a, b| {
            a.origin_server_ts
                .cmp(&b.origin_server_ts)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });

        if self.config.enable_debug_logging && sorted.len() != events.len() {
            tracing::debug!(
                target: "timeline_sync::materializer",
                "Dropped {} duplicate events",
                events.len() - sorted.len()
            );
        }

        // Step 2: Collect redactions
        let redacted: HashSet<&str> = sorted
            .iter()
            .filter(|event| event.is_delivered())
            .filter_map(|event| event.redacted_event_id())
            .collect();

        // Step 3: Index relations
        let annotations = AnnotationIndex::build(sorted.iter().copied(), &redacted);
        let edits = EditIndex::build(sorted.iter().copied(), &redacted);

        // Step 4: Map displayable messages
        let mut messages: HashMap<String, MessageItem> = HashMap::new();
        let mut reply_targets: Vec<(String, String)> = Vec::new();

        for event in &sorted {
            if redacted.contains(event.event_id.as_str()) {
                continue;
            }

            let Some(mut item) = self.mapper.map(event, room) else {
                continue;
            };

            edits.apply(&mut item);
            item.reactions = reactions::aggregate(
                &item.event_id,
                &annotations,
                &room.viewer_id,
                self.config.normalize_reaction_keys,
            );

            if let Some(Relation::Reply { event_id }) = event.relation() {
                reply_targets.push((item.event_id.clone(), event_id));
            }

            messages.insert(item.event_id.clone(), item);
        }

        if self.config.enable_debug_logging {
            tracing::debug!(
                target: "timeline_sync::materializer",
                "Mapped {} displayable messages from {} events ({} redacted)",
                messages.len(),
                sorted.len(),
                redacted.len()
            );
        }

        // Step 5: Resolve reply previews against the mapped messages
        let previews: Vec<(String, Option<_>)> = reply_targets
            .into_iter()
            .map(|(event_id, target_id)| {
                let preview =
                    replies::resolve(&target_id, &messages, self.config.reply_preview_max_chars);
                if preview.is_none() && self.config.enable_debug_logging {
                    tracing::debug!(
                        target: "timeline_sync::materializer",
                        "Reply target {} of {} is not available locally",
                        target_id,
                        event_id
                    );
                }
                (event_id, preview)
            })
            .collect();

        for (event_id, preview) in previews {
            if let Some(item) = messages.get_mut(&event_id) {
                item.reply_to = preview;
            }
        }

        // Step 6: Newest first
        let mut result: Vec<MessageItem> = messages.into_values().collect();
        result.sort_by(|a, b| {
            b.timestamp_ms
                .cmp(&a.timestamp_ms)
                .then_with(|| b.event_id.cmp(&a.event_id))
        });

        let newest_event_id = sorted
            .iter()
            .rev()
            .find(|event| event.is_delivered())
            .map(|event| event.event_id.clone());

        Materialized {
            messages: result,
            newest_event_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::test_utils::*;

    fn materialize(events: &[RawEvent]) -> Materialized {
        let client = MockTimelineClient::new();
        let config = TimelineConfig::default();
        let room = RoomContext::new(ROOM_ID, VIEWER).with_member(ALICE, "Alice");
        Materializer::new(&client, &config).materialize(events, &room)
    }

    fn ids(materialized: &Materialized) -> Vec<&str> {
        materialized
            .messages
            .iter()
            .map(|m| m.event_id.as_str())
            .collect()
    }

    #[test]
    fn test_empty_events() {
        let result = materialize(&[]);
        assert!(result.messages.is_empty());
        assert!(result.newest_event_id.is_none());
    }

    #[test]
    fn test_newest_first_ordering() {
        let events = vec![
            text_event("$b", ALICE, 20, "second"),
            text_event("$c", BOB, 30, "third"),
            text_event("$a", VIEWER, 10, "first"),
        ];

        assert_eq!(ids(&materialize(&events)), vec!["$c", "$b", "$a"]);
    }

    #[test]
    fn test_equal_timestamps_order_by_event_id() {
        let events = vec![
            text_event("$a", ALICE, 10, "x"),
            text_event("$b", BOB, 10, "y"),
        ];

        assert_eq!(ids(&materialize(&events)), vec!["$b", "$a"]);
    }

    #[test]
    fn test_duplicate_events_materialize_once() {
        let events = vec![
            text_event("$1", ALICE, 10, "hello"),
            text_event("$2", BOB, 20, "hi"),
            text_event("$1", ALICE, 10, "hello"),
        ];

        assert_eq!(ids(&materialize(&events)), vec!["$2", "$1"]);
    }

    #[test]
    fn test_non_displayable_events_are_skipped() {
        let events = vec![
            text_event("$1", ALICE, 10, "hello"),
            notice_event("$n", BOB, 20),
            raw_event("$s", "m.room.member", BOB, 30, serde_json::json!({"membership": "join"})),
        ];

        let result = materialize(&events);
        assert_eq!(ids(&result), vec!["$1"]);
        // Read receipts target the newest event regardless of type
        assert_eq!(result.newest_event_id.as_deref(), Some("$s"));
    }

    #[test]
    fn test_newest_event_skips_local_echoes() {
        let mut pending = text_event("$local", VIEWER, 50, "sending");
        pending.status = EventStatus::Pending;
        let events = vec![text_event("$1", ALICE, 10, "hello"), pending];

        assert_eq!(materialize(&events).newest_event_id.as_deref(), Some("$1"));
    }

    #[test]
    fn test_redaction_removes_message_and_its_reactions() {
        let events = vec![
            text_event("$1", ALICE, 10, "keep"),
            text_event("$2", ALICE, 20, "remove me"),
            reaction_event("$r1", BOB, 21, "$1", "👍"),
            reaction_event("$r2", VIEWER, 22, "$1", "👍"),
            redaction_event("$x1", ALICE, 30, "$2"),
            redaction_event("$x2", VIEWER, 31, "$r2"),
        ];

        let result = materialize(&events);
        assert_eq!(ids(&result), vec!["$1"]);
        let reactions = &result.messages[0].reactions;
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].count, 1);
        assert!(!reactions[0].viewer_has_reacted);
    }

    #[test]
    fn test_reply_resolution() {
        let events = vec![
            text_event("$1", ALICE, 10, "what time?"),
            reply_event("$2", VIEWER, 20, "$1", "> <@alice:example.org> what time?\n\nnoon"),
            reply_event("$3", VIEWER, 30, "$missing", "orphan"),
        ];

        let result = materialize(&events);
        let reply = result.messages.iter().find(|m| m.event_id == "$2").unwrap();
        let preview = reply.reply_to.as_ref().unwrap();
        assert_eq!(reply.body, "noon");
        assert_eq!(preview.event_id, "$1");
        assert_eq!(preview.sender_display_name, "Alice");
        assert_eq!(preview.body_preview, "what time?");

        let orphan = result.messages.iter().find(|m| m.event_id == "$3").unwrap();
        assert!(orphan.reply_to.is_none());
    }

    #[test]
    fn test_reply_to_redacted_message_has_no_preview() {
        let events = vec![
            text_event("$1", ALICE, 10, "oops"),
            reply_event("$2", BOB, 20, "$1", "lol"),
            redaction_event("$x", ALICE, 30, "$1"),
        ];

        let result = materialize(&events);
        assert_eq!(ids(&result), vec!["$2"]);
        assert!(result.messages[0].reply_to.is_none());
    }

    #[test]
    fn test_edits_are_applied_and_not_displayed() {
        let events = vec![
            text_event("$1", ALICE, 10, "helo"),
            edit_event("$e", ALICE, 20, "$1", "hello"),
        ];

        let result = materialize(&events);
        assert_eq!(ids(&result), vec!["$1"]);
        assert_eq!(result.messages[0].body, "hello");
        assert!(result.messages[0].is_edited);
    }

    #[test]
    fn test_materialization_is_order_independent() {
        let events = vec![
            text_event("$1", ALICE, 10, "hello"),
            image_event("$2", BOB, 20, "mxc://example.org/pic", "image/png"),
            reaction_event("$r1", VIEWER, 21, "$2", "❤️"),
            reaction_event("$r2", ALICE, 22, "$2", "❤️"),
            reply_event("$3", VIEWER, 30, "$2", "nice"),
            redaction_event("$x", ALICE, 40, "$r2"),
        ];
        let mut reversed = events.clone();
        reversed.reverse();

        assert_eq!(materialize(&events), materialize(&reversed));
    }
}
