//! Background read receipts
//!
//! Receipts are a non-critical side effect: they are sent from a spawned task,
//! failures are logged and dropped, and nothing is retried.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use crate::client::RemoteTimelineClient;

pub struct ReadReceiptNotifier {
    client: Arc<dyn RemoteTimelineClient>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ReadReceiptNotifier {
    pub fn new(client: Arc<dyn RemoteTimelineClient>) -> Self {
        Self {
            client,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Mark `event_id` as read without waiting for the remote.
    pub fn notify(&self, conversation_id: &str, event_id: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                target: "timeline_sync::read_receipts",
                "No async runtime available, skipping read receipt for {}",
                event_id
            );
            return;
        };

        let client = self.client.clone();
        let conversation_id = conversation_id.to_string();
        let event_id = event_id.to_string();

        let handle = runtime.spawn(async move {
            match client.send_read_receipt(&conversation_id, &event_id).await {
                Ok(()) => {
                    tracing::debug!(
                        target: "timeline_sync::read_receipts",
                        "Sent read receipt for {} in {}",
                        event_id,
                        conversation_id
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        target: "timeline_sync::read_receipts",
                        "Failed to send read receipt for {} in {}: {}",
                        event_id,
                        conversation_id,
                        e
                    );
                }
            }
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Wait for every receipt spawned so far.
    #[cfg(test)]
    pub async fn wait_idle(&self) {
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            let _ = task.await;
        }
    }
}
