//! Remote timeline client capability
//!
//! The engine never talks to the network itself. Everything it needs from the
//! messaging backend goes through [`RemoteTimelineClient`], which is injected at
//! construction time.

mod events;
mod live;

pub use events::{
    EventStatus, MESSAGE_EVENT_TYPE, REACTION_EVENT_TYPE, REDACTION_EVENT_TYPE, RawEvent,
    Relation,
};
pub use live::{LiveEventHub, LiveSignal, LiveSubscription};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Requested dimensions for a scaled media transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaSize {
    pub width: u32,
    pub height: u32,
}

impl MediaSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Errors reported by the remote timeline client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Request rejected by remote: {0}")]
    Rejected(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Capability interface onto the remote messaging backend.
///
/// Implementations own the local event set of every conversation; the engine
/// only ever reads it.
#[async_trait]
pub trait RemoteTimelineClient: Send + Sync {
    /// Currently known events of a conversation, in any order.
    fn local_events(&self, conversation_id: &str) -> Vec<RawEvent>;

    /// Token to fetch events older than the oldest locally known one.
    fn backward_token(&self, conversation_id: &str) -> Option<String>;

    /// Fetch up to `limit` older events into the local event set.
    ///
    /// Returns the next backward token, or `None` once the start of the
    /// conversation has been reached.
    async fn paginate_backward(
        &self,
        conversation_id: &str,
        token: &str,
        limit: u16,
    ) -> Result<Option<String>, ClientError>;

    /// Subscribe to events entering the local set. Dropping the returned
    /// handle unsubscribes.
    fn subscribe_live_events(&self, conversation_id: &str) -> LiveSubscription;

    async fn send_read_receipt(
        &self,
        conversation_id: &str,
        event_id: &str,
    ) -> Result<(), ClientError>;

    /// Turn a remote content locator into a fetchable URL.
    ///
    /// `size_hint` requests a scaled thumbnail transform. `preserve_animation`
    /// requests the original asset so animated formats keep their frames.
    fn resolve_media_url(
        &self,
        locator: &str,
        size_hint: Option<MediaSize>,
        preserve_animation: bool,
    ) -> Option<String>;
}
