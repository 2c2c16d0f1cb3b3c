//! Message edits
//!
//! An edit is a message event replacing the content of an earlier one. Edits
//! are never displayed themselves; the latest edit made by the original author
//! overrides the target's body.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use super::types::{MessageItem, MessageKind};
use crate::client::{RawEvent, Relation};

const NEW_CONTENT_KEY: &str = "m.new_content";

#[derive(Debug, Deserialize)]
struct NewContent {
    body: String,
}

#[derive(Debug, Clone)]
struct Replacement<'a> {
    sender: &'a str,
    timestamp_ms: u64,
    event_id: &'a str,
    body: String,
}

/// Latest replacement per target, per author
#[derive(Debug, Default)]
pub struct EditIndex<'a> {
    by_target: HashMap<String, Vec<Replacement<'a>>>,
}

impl<'a> EditIndex<'a> {
    pub fn build<I>(events: I, redacted: &HashSet<&str>) -> Self
    where
        I: IntoIterator<Item = &'a RawEvent>,
    {
        let mut by_target: HashMap<String, Vec<Replacement<'a>>> = HashMap::new();

        for event in events {
            if !event.is_message()
                || !event.is_delivered()
                || redacted.contains(event.event_id.as_str())
            {
                continue;
            }

            let Some(Relation::Replacement { event_id }) = event.relation() else {
                continue;
            };

            let Some(new_content) = event
                .content
                .get(NEW_CONTENT_KEY)
                .and_then(|value| NewContent::deserialize(value).ok())
            else {
                tracing::debug!(
                    target: "timeline_sync::edits",
                    "Edit {} carries no usable replacement content",
                    event.event_id
                );
                continue;
            };

            by_target.entry(event_id).or_default().push(Replacement {
                sender: event.sender.as_str(),
                timestamp_ms: event.origin_server_ts,
                event_id: event.event_id.as_str(),
                body: new_content.body,
            });
        }

        Self { by_target }
    }

    /// Apply the latest edit by the message's own author, if any.
    pub fn apply(&self, item: &mut MessageItem) {
        if item.kind != MessageKind::Text {
            return;
        }

        let latest = self
            .by_target
            .get(&item.event_id)
            .into_iter()
            .flatten()
            .filter(|replacement| replacement.sender == item.sender)
            .max_by(|a, b| {
                a.timestamp_ms
                    .cmp(&b.timestamp_ms)
                    .then_with(|| a.event_id.cmp(b.event_id))
            });

        if let Some(replacement) = latest {
            item.body = replacement.body.clone();
            item.is_edited = true;
        }
    }
}
