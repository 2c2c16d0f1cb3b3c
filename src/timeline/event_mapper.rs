//! Mapping of single raw events to displayable messages
//!
//! The mapping is pure: given the same event, room context and media resolver
//! it always produces the same [`MessageItem`]. Anything that is not a
//! displayable message (state, notices, unsent local echoes, edits, malformed
//! payloads) maps to `None` and is dropped without surfacing an error.

use serde::Deserialize;

use super::types::{MediaDescriptor, MessageItem, MessageKind, RoomContext, TimelineConfig};
use crate::client::{RawEvent, Relation, RemoteTimelineClient};

const ANIMATED_IMAGE_MIMETYPE: &str = "image/gif";

#[derive(Debug, Deserialize)]
struct MessagePayload {
    msgtype: String,
    body: Option<String>,
    url: Option<String>,
    info: Option<MediaInfo>,
    filename: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaInfo {
    w: Option<u32>,
    h: Option<u32>,
    mimetype: Option<String>,
    size: Option<u64>,
    thumbnail_url: Option<String>,
}

pub struct EventMapper<'a> {
    client: &'a dyn RemoteTimelineClient,
    config: &'a TimelineConfig,
}

impl<'a> EventMapper<'a> {
    pub fn new(client: &'a dyn RemoteTimelineClient, config: &'a TimelineConfig) -> Self {
        Self { client, config }
    }

    /// Map a raw event to a message, or `None` if it is not displayable
    pub fn map(&self, event: &RawEvent, room: &RoomContext) -> Option<MessageItem> {
        if !event.is_message() {
            return None;
        }

        if !event.is_delivered() {
            tracing::trace!(
                target: "timeline_sync::event_mapper",
                "Skipping undelivered event {} ({:?})",
                event.event_id,
                event.status
            );
            return None;
        }

        let relation = event.relation();
        if matches!(relation, Some(Relation::Replacement { .. })) {
            return None;
        }

        let payload = match MessagePayload::deserialize(&event.content) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(
                    target: "timeline_sync::event_mapper",
                    "Dropping malformed message {}: {}",
                    event.event_id,
                    e
                );
                return None;
            }
        };

        let kind = match payload.msgtype.as_str() {
            "m.text" | "m.emote" => MessageKind::Text,
            "m.image" => MessageKind::Image,
            "m.video" => MessageKind::Video,
            "m.file" => MessageKind::File,
            "m.notice" => return None,
            other => {
                tracing::debug!(
                    target: "timeline_sync::event_mapper",
                    "Dropping message {} with unsupported msgtype {}",
                    event.event_id,
                    other
                );
                return None;
            }
        };

        // Media captions are optional, text bodies are not
        let body = match (kind, payload.body.as_deref()) {
            (MessageKind::Text, None) => {
                tracing::debug!(
                    target: "timeline_sync::event_mapper",
                    "Dropping text message {} without a body",
                    event.event_id
                );
                return None;
            }
            (_, body) => body.unwrap_or_default(),
        };

        let media = match kind {
            MessageKind::Text => None,
            _ => Some(self.resolve_media(kind, &payload, &event.event_id)?),
        };

        let body = if matches!(relation, Some(Relation::Reply { .. })) {
            strip_reply_fallback(body)
        } else {
            body.to_string()
        };

        let sender_display_name = room.sender_display_name(&event.sender);
        let is_own = room.is_own(&event.sender, &sender_display_name);

        Some(MessageItem {
            event_id: event.event_id.clone(),
            sender: event.sender.clone(),
            sender_display_name,
            timestamp_ms: event.origin_server_ts,
            kind,
            body,
            media,
            is_own,
            reactions: Vec::new(),
            reply_to: None,
            is_edited: false,
        })
    }

    fn resolve_media(
        &self,
        kind: MessageKind,
        payload: &MessagePayload,
        event_id: &str,
    ) -> Option<MediaDescriptor> {
        let Some(locator) = payload.url.as_deref().filter(|url| !url.is_empty()) else {
            tracing::debug!(
                target: "timeline_sync::event_mapper",
                "Dropping media message {} without a content locator",
                event_id
            );
            return None;
        };

        let info = payload.info.as_ref();
        let mimetype = info.and_then(|info| info.mimetype.clone());
        let thumbnail_size = Some(self.config.thumbnail_size);

        let (url, thumbnail_url) = match kind {
            MessageKind::Image if is_animated(mimetype.as_deref()) => {
                // Thumbnail transforms drop every frame but the first
                let url = self.client.resolve_media_url(locator, None, true)?;
                (url.clone(), Some(url))
            }
            MessageKind::Image => {
                let url = self
                    .client
                    .resolve_media_url(locator, thumbnail_size, false)?;
                (url.clone(), Some(url))
            }
            MessageKind::Video => {
                let url = self.client.resolve_media_url(locator, None, false)?;
                let thumbnail_url = info
                    .and_then(|info| info.thumbnail_url.as_deref())
                    .and_then(|thumb| self.client.resolve_media_url(thumb, thumbnail_size, false));
                (url, thumbnail_url)
            }
            MessageKind::File | MessageKind::Text => {
                (self.client.resolve_media_url(locator, None, false)?, None)
            }
        };

        Some(MediaDescriptor {
            url,
            thumbnail_url,
            width: info.and_then(|info| info.w),
            height: info.and_then(|info| info.h),
            mimetype,
            size: info.and_then(|info| info.size),
            filename: payload
                .filename
                .clone()
                .or_else(|| {
                    (kind == MessageKind::File)
                        .then(|| payload.body.clone())
                        .flatten()
                }),
        })
    }
}

fn is_animated(mimetype: Option<&str>) -> bool {
    mimetype.is_some_and(|mime| mime.eq_ignore_ascii_case(ANIMATED_IMAGE_MIMETYPE))
}

/// Remove the quoted fallback that reply bodies start with.
///
/// Fallbacks are a run of `>`-prefixed lines followed by one blank line.
fn strip_reply_fallback(body: &str) -> String {
    let mut lines = body.lines().peekable();
    let mut stripped = false;

    while lines.next_if(|line| line.starts_with('>')).is_some() {
        stripped = true;
    }

    if !stripped {
        return body.to_string();
    }

    lines.next_if(|line| line.is_empty());
    let remainder = lines.collect::<Vec<_>>().join("\n");

    if remainder.is_empty() {
        body.to_string()
    } else {
        remainder
    }
}
