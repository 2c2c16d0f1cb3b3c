use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::client::MediaSize;
use crate::error::{Result, TimelineError};

/// Upper bound accepted for a single backfill request
pub const MAX_BACKFILL_BATCH_SIZE: u16 = 100;

/// Displayable message subtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    File,
}

/// Fetchable media attached to an image, video or file message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// URL of the asset to display or download
    pub url: String,

    /// Scaled preview, if one could be resolved
    pub thumbnail_url: Option<String>,

    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mimetype: Option<String>,

    /// Size in bytes as advertised by the sender
    pub size: Option<u64>,

    pub filename: Option<String>,
}

/// Represents a materialized message ready for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageItem {
    /// Unique, stable identifier of the underlying event
    pub event_id: String,

    /// Account id of the author
    pub sender: String,

    pub sender_display_name: String,

    /// Timestamp of the underlying event in milliseconds
    pub timestamp_ms: u64,

    pub kind: MessageKind,

    /// Message text (the caption or filename for media messages)
    pub body: String,

    pub media: Option<MediaDescriptor>,

    /// Whether the viewer authored this message
    pub is_own: bool,

    /// Aggregated reactions, ordered by first appearance
    pub reactions: Vec<ReactionSummary>,

    /// Quoted preview of the message this one replies to, when locally known
    pub reply_to: Option<ReplyPreview>,

    /// Whether the body has been replaced by a later edit
    pub is_edited: bool,
}

/// Aggregated reactions for a single key on a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSummary {
    /// The emoji or reaction key
    pub emoji_key: String,

    /// Number of distinct senders reacting with this key (always >= 1)
    pub count: usize,

    /// Whether the viewer is one of those senders
    pub viewer_has_reacted: bool,
}

/// Lightweight quote of a replied-to message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub event_id: String,
    pub sender: String,
    pub sender_display_name: String,

    /// Single-line, truncated rendition of the quoted message
    pub body_preview: String,

    pub is_own: bool,
    pub media_thumbnail: Option<String>,
}

/// Locally known metadata about the conversation being materialized
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomContext {
    pub conversation_id: String,

    /// Account id of the person viewing the conversation
    pub viewer_id: String,

    /// Computed display name of the conversation itself
    pub display_name: Option<String>,

    /// Member account id => display name
    pub member_display_names: HashMap<String, String>,
}

impl RoomContext {
    pub fn new(conversation_id: impl Into<String>, viewer_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            viewer_id: viewer_id.into(),
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_member(
        mut self,
        account_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        self.member_display_names
            .insert(account_id.into(), display_name.into());
        self
    }

    /// Display name for a sender: member name, else the id's localpart, else the raw id.
    pub fn sender_display_name(&self, sender: &str) -> String {
        if let Some(name) = self.member_display_names.get(sender) {
            return name.clone();
        }

        let localpart = sender
            .strip_prefix('@')
            .and_then(|rest| rest.split(':').next())
            .filter(|localpart| !localpart.is_empty());

        localpart.unwrap_or(sender).to_string()
    }

    /// Whether a message by `sender` counts as the viewer's own.
    ///
    /// Bridged conversations do not always attribute the viewer's messages to the
    /// viewer's account, so a sender whose display name differs from the
    /// conversation's name is also treated as the viewer. Only applies when the
    /// conversation has a display name.
    pub fn is_own(&self, sender: &str, sender_display_name: &str) -> bool {
        if sender == self.viewer_id {
            return true;
        }

        self.display_name
            .as_deref()
            .is_some_and(|room_name| room_name != sender_display_name)
    }
}

/// Configuration for timeline materialization and pagination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Displayable messages wanted before the initial load settles
    pub min_visible_messages: usize,

    /// Events requested per backfill
    pub backfill_batch_size: u16,

    /// Characters kept in a reply preview before truncation
    pub reply_preview_max_chars: usize,

    /// Distance from the newest message still considered "at the bottom"
    pub near_bottom_threshold: f64,

    /// Distance from the oldest message that triggers backward pagination
    pub near_top_threshold: f64,

    /// Size requested for scaled image thumbnails
    pub thumbnail_size: MediaSize,

    /// Whether to fold skin tone and presentation variants of reaction keys together
    pub normalize_reaction_keys: bool,

    /// Whether to enable detailed logging of materialization steps
    pub enable_debug_logging: bool,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            min_visible_messages: 10,
            backfill_batch_size: 30,
            reply_preview_max_chars: 100,
            near_bottom_threshold: 150.0,
            near_top_threshold: 300.0,
            thumbnail_size: MediaSize::new(320, 240),
            normalize_reaction_keys: false,
            enable_debug_logging: false,
        }
    }
}

impl TimelineConfig {
    /// Load a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backfill_batch_size == 0 || self.backfill_batch_size > MAX_BACKFILL_BATCH_SIZE {
            return Err(TimelineError::Configuration(format!(
                "backfill_batch_size must be within 1..={}, got {}",
                MAX_BACKFILL_BATCH_SIZE, self.backfill_batch_size
            )));
        }

        if self.reply_preview_max_chars == 0 {
            return Err(TimelineError::Configuration(
                "reply_preview_max_chars must be positive".to_string(),
            ));
        }

        for (name, value) in [
            ("near_bottom_threshold", self.near_bottom_threshold),
            ("near_top_threshold", self.near_top_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(TimelineError::Configuration(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        if self.thumbnail_size.width == 0 || self.thumbnail_size.height == 0 {
            return Err(TimelineError::Configuration(
                "thumbnail_size must have non-zero dimensions".to_string(),
            ));
        }

        Ok(())
    }
}
