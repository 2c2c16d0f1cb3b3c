//! Reaction aggregation
//!
//! Reactions are annotation events pointing at a target message. They are
//! grouped per key and counted per distinct sender, so a sender repeating the
//! same annotation never counts twice.

use std::collections::{HashMap, HashSet};

use super::emoji_utils;
use super::types::ReactionSummary;
use crate::client::{RawEvent, Relation};

/// A live annotation: target event, reaction key, sender and timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
struct Annotation<'a> {
    key: String,
    sender: &'a str,
    timestamp_ms: u64,
}

/// Live annotations of the local event set, keyed by target event id
#[derive(Debug, Default)]
pub struct AnnotationIndex<'a> {
    by_target: HashMap<String, Vec<Annotation<'a>>>,
}

impl<'a> AnnotationIndex<'a> {
    /// Index every delivered, non-redacted annotation event.
    pub fn build<I>(events: I, redacted: &HashSet<&str>) -> Self
    where
        I: IntoIterator<Item = &'a RawEvent>,
    {
        let mut by_target: HashMap<String, Vec<Annotation<'a>>> = HashMap::new();

        for event in events {
            if !event.is_reaction()
                || !event.is_delivered()
                || redacted.contains(event.event_id.as_str())
            {
                continue;
            }

            let Some(Relation::Annotation { event_id, key }) = event.relation() else {
                tracing::debug!(
                    target: "timeline_sync::reactions",
                    "Reaction {} has no annotation relation",
                    event.event_id
                );
                continue;
            };

            by_target.entry(event_id).or_default().push(Annotation {
                key,
                sender: event.sender.as_str(),
                timestamp_ms: event.origin_server_ts,
            });
        }

        Self { by_target }
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }

    fn annotations_for(&self, target_event_id: &str) -> Option<&[Annotation<'a>]> {
        self.by_target.get(target_event_id).map(Vec::as_slice)
    }
}

struct KeyGroup<'a> {
    first_seen_ms: u64,
    senders: HashSet<&'a str>,
}

/// Aggregate the live reactions on `target_event_id`.
///
/// Targets without any indexed annotation get an empty summary list.
pub fn aggregate(
    target_event_id: &str,
    index: &AnnotationIndex<'_>,
    viewer_id: &str,
    normalize_keys: bool,
) -> Vec<ReactionSummary> {
    let Some(annotations) = index.annotations_for(target_event_id) else {
        return Vec::new();
    };

    let mut groups: HashMap<String, KeyGroup<'_>> = HashMap::new();

    for annotation in annotations {
        let Some(key) = emoji_utils::normalize_reaction_key(&annotation.key, normalize_keys) else {
            continue;
        };

        let group = groups.entry(key).or_insert_with(|| KeyGroup {
            first_seen_ms: annotation.timestamp_ms,
            senders: HashSet::new(),
        });
        group.first_seen_ms = group.first_seen_ms.min(annotation.timestamp_ms);
        group.senders.insert(annotation.sender);
    }

    let mut ordered: Vec<(u64, ReactionSummary)> = groups
        .into_iter()
        .map(|(emoji_key, group)| {
            let summary = ReactionSummary {
                viewer_has_reacted: group.senders.contains(viewer_id),
                count: group.senders.len(),
                emoji_key,
            };
            (group.first_seen_ms, summary)
        })
        .collect();

    // First appearance, then key, for a stable order across materializations
    ordered.sort_by(|(a_ts, a), (b_ts, b)| a_ts.cmp(b_ts).then_with(|| a.emoji_key.cmp(&b.emoji_key)));

    ordered.into_iter().map(|(_, summary)| summary).collect()
}
