//! Per-conversation broadcast channels for live events.
//!
//! Client implementations push newly received events through a [`LiveEventHub`];
//! each open conversation view holds a [`LiveSubscription`]. Channels are created
//! lazily and cleaned up once every subscription to them has been dropped.

use dashmap::DashMap;
use tokio::sync::broadcast::{self, error::RecvError};

use super::RawEvent;

const BUFFER_SIZE: usize = 100;

/// What a live subscription yields.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveSignal {
    /// A new event entered the local event set.
    Event(RawEvent),
    /// The subscriber fell behind and missed this many events.
    Lagged(u64),
}

/// Owned handle onto a conversation's live event stream.
///
/// Dropping the handle unsubscribes.
#[derive(Debug)]
pub struct LiveSubscription {
    conversation_id: String,
    receiver: broadcast::Receiver<RawEvent>,
}

impl LiveSubscription {
    pub fn new(conversation_id: impl Into<String>, receiver: broadcast::Receiver<RawEvent>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            receiver,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Wait for the next live signal, or `None` once the stream has closed.
    pub async fn recv(&mut self) -> Option<LiveSignal> {
        match self.receiver.recv().await {
            Ok(event) => Some(LiveSignal::Event(event)),
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(
                    target: "timeline_sync::live",
                    "Live subscription for {} lagged, {} events skipped",
                    self.conversation_id,
                    missed
                );
                Some(LiveSignal::Lagged(missed))
            }
            Err(RecvError::Closed) => None,
        }
    }
}

pub struct LiveEventHub {
    streams: DashMap<String, broadcast::Sender<RawEvent>>,
}

impl LiveEventHub {
    pub fn new() -> Self {
        Self {
            streams: DashMap::new(),
        }
    }

    pub fn subscribe(&self, conversation_id: &str) -> LiveSubscription {
        let receiver = self
            .streams
            .entry(conversation_id.to_string())
            .or_insert_with(|| broadcast::channel(BUFFER_SIZE).0)
            .subscribe();
        LiveSubscription::new(conversation_id, receiver)
    }

    pub fn emit(&self, conversation_id: &str, event: RawEvent) {
        if let Some(sender) = self.streams.get(conversation_id) {
            // Attempt to send; if all receivers dropped, clean up
            if sender.send(event).is_err() && sender.receiver_count() == 0 {
                drop(sender);
                self.streams.remove(conversation_id);
            }
        }
    }

    /// Number of live subscriptions currently attached to a conversation.
    pub fn subscriber_count(&self, conversation_id: &str) -> usize {
        self.streams
            .get(conversation_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for LiveEventHub {
    fn default() -> Self {
        Self::new()
    }
}
