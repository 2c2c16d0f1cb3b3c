//! Reply preview resolution
//!
//! Replies only ever quote messages that are already materialized locally. A
//! reply whose target is unknown, redacted or not displayable is rendered
//! without a preview; resolution never blocks on the network.

use std::collections::HashMap;

use super::types::{MessageItem, MessageKind, ReplyPreview};

const PHOTO_LABEL: &str = "Photo";
const VIDEO_LABEL: &str = "Video";
const FILE_LABEL: &str = "File";
const ELLIPSIS: char = '…';

/// Build the quoted preview of `reply_to_event_id`, if it is locally known.
pub fn resolve(
    reply_to_event_id: &str,
    local_messages: &HashMap<String, MessageItem>,
    max_chars: usize,
) -> Option<ReplyPreview> {
    let target = local_messages.get(reply_to_event_id)?;

    let media_thumbnail = target.media.as_ref().and_then(|media| match target.kind {
        MessageKind::Image => media.thumbnail_url.clone().or_else(|| Some(media.url.clone())),
        MessageKind::Video => media.thumbnail_url.clone(),
        MessageKind::File | MessageKind::Text => None,
    });

    Some(ReplyPreview {
        event_id: target.event_id.clone(),
        sender: target.sender.clone(),
        sender_display_name: target.sender_display_name.clone(),
        body_preview: preview_body(target, max_chars),
        is_own: target.is_own,
        media_thumbnail,
    })
}

fn preview_body(target: &MessageItem, max_chars: usize) -> String {
    match target.kind {
        MessageKind::Image => PHOTO_LABEL.to_string(),
        MessageKind::Video => VIDEO_LABEL.to_string(),
        MessageKind::File => target
            .media
            .as_ref()
            .and_then(|media| media.filename.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| FILE_LABEL.to_string()),
        MessageKind::Text => truncate(&target.body, max_chars),
    }
}

/// Collapse a body onto one line and cut it on a char boundary.
fn truncate(body: &str, max_chars: usize) -> String {
    let single_line = body.split_whitespace().collect::<Vec<_>>().join(" ");

    if single_line.chars().count() <= max_chars {
        return single_line;
    }

    let mut truncated: String = single_line.chars().take(max_chars).collect();
    truncated.truncate(truncated.trim_end().len());
    truncated.push(ELLIPSIS);
    truncated
}
