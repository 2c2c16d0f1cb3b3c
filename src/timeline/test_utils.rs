//! Shared test doubles and event builders

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;

pub use crate::client::{EventStatus, RawEvent};
use crate::client::{
    ClientError, LiveEventHub, LiveSubscription, MediaSize, RemoteTimelineClient,
};

pub const ROOM_ID: &str = "!room:example.org";
pub const VIEWER: &str = "@me:example.org";
pub const ALICE: &str = "@alice:example.org";
pub const BOB: &str = "@bob:example.org";

const MEDIA_BASE_URL: &str = "https://media.example.org/";

/// Scripted answer to the next `paginate_backward` call
#[derive(Debug, Clone)]
pub enum MockPage {
    Events {
        events: Vec<RawEvent>,
        next_token: Option<String>,
    },
    Fail,
}

#[derive(Default)]
struct MockState {
    events: HashMap<String, Vec<RawEvent>>,
    tokens: HashMap<String, String>,
    pages: VecDeque<MockPage>,
    pagination_calls: Vec<(String, String, u16)>,
    receipts: Vec<(String, String)>,
    media_calls: Vec<(String, Option<MediaSize>, bool)>,
    fail_receipts: bool,
    gate: Option<Arc<Notify>>,
}

/// In-memory remote client recording every call made against it
#[derive(Default)]
pub struct MockTimelineClient {
    state: Mutex<MockState>,
    hub: LiveEventHub,
}

impl MockTimelineClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(self, conversation_id: &str, events: Vec<RawEvent>) -> Self {
        self.state
            .lock()
            .unwrap()
            .events
            .insert(conversation_id.to_string(), events);
        self
    }

    pub fn with_token(self, conversation_id: &str, token: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .tokens
            .insert(conversation_id.to_string(), token.to_string());
        self
    }

    pub fn push_page(&self, events: Vec<RawEvent>, next_token: Option<&str>) {
        self.state.lock().unwrap().pages.push_back(MockPage::Events {
            events,
            next_token: next_token.map(str::to_string),
        });
    }

    pub fn push_failure(&self) {
        self.state.lock().unwrap().pages.push_back(MockPage::Fail);
    }

    pub fn fail_receipts(&self) {
        self.state.lock().unwrap().fail_receipts = true;
    }

    /// Block every pagination until [`Self::release_pagination`] is called.
    pub fn hold_pagination(&self) {
        self.state.lock().unwrap().gate = Some(Arc::new(Notify::new()));
    }

    pub fn release_pagination(&self) {
        if let Some(gate) = self.state.lock().unwrap().gate.take() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    /// Append an event to the local set, then announce it on the live stream.
    pub fn push_live(&self, conversation_id: &str, event: RawEvent) {
        self.state
            .lock()
            .unwrap()
            .events
            .entry(conversation_id.to_string())
            .or_default()
            .push(event.clone());
        self.hub.emit(conversation_id, event);
    }

    pub fn pagination_calls(&self) -> Vec<(String, String, u16)> {
        self.state.lock().unwrap().pagination_calls.clone()
    }

    pub fn receipts(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().receipts.clone()
    }

    pub fn media_calls(&self) -> Vec<(String, Option<MediaSize>, bool)> {
        self.state.lock().unwrap().media_calls.clone()
    }

    pub fn live_subscribers(&self, conversation_id: &str) -> usize {
        self.hub.subscriber_count(conversation_id)
    }
}

#[async_trait]
impl RemoteTimelineClient for MockTimelineClient {
    fn local_events(&self, conversation_id: &str) -> Vec<RawEvent> {
        self.state
            .lock()
            .unwrap()
            .events
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    fn backward_token(&self, conversation_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .tokens
            .get(conversation_id)
            .cloned()
    }

    async fn paginate_backward(
        &self,
        conversation_id: &str,
        token: &str,
        limit: u16,
    ) -> Result<Option<String>, ClientError> {
        let gate = {
            let mut state = self.state.lock().unwrap();
            state
                .pagination_calls
                .push((conversation_id.to_string(), token.to_string(), limit));
            state.gate.clone()
        };

        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        match state.pages.pop_front() {
            Some(MockPage::Events { events, next_token }) => {
                state
                    .events
                    .entry(conversation_id.to_string())
                    .or_default()
                    .extend(events);
                match &next_token {
                    Some(next) => {
                        state
                            .tokens
                            .insert(conversation_id.to_string(), next.clone());
                    }
                    None => {
                        state.tokens.remove(conversation_id);
                    }
                }
                Ok(next_token)
            }
            Some(MockPage::Fail) => Err(ClientError::Network("connection reset".to_string())),
            None => Ok(None),
        }
    }

    fn subscribe_live_events(&self, conversation_id: &str) -> LiveSubscription {
        self.hub.subscribe(conversation_id)
    }

    async fn send_read_receipt(
        &self,
        conversation_id: &str,
        event_id: &str,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        state
            .receipts
            .push((conversation_id.to_string(), event_id.to_string()));
        if state.fail_receipts {
            return Err(ClientError::Rejected("receipt refused".to_string()));
        }
        Ok(())
    }

    fn resolve_media_url(
        &self,
        locator: &str,
        size_hint: Option<MediaSize>,
        preserve_animation: bool,
    ) -> Option<String> {
        self.state.lock().unwrap().media_calls.push((
            locator.to_string(),
            size_hint,
            preserve_animation,
        ));

        let path = locator.strip_prefix("mxc://")?;
        let base = format!("{MEDIA_BASE_URL}{path}");
        Some(match (preserve_animation, size_hint) {
            (true, _) => format!("{base}?animated=true"),
            (false, Some(size)) => format!("{base}?w={}&h={}", size.width, size.height),
            (false, None) => base,
        })
    }
}

pub fn raw_event(id: &str, event_type: &str, sender: &str, ts: u64, content: Value) -> RawEvent {
    RawEvent {
        event_id: id.to_string(),
        event_type: event_type.to_string(),
        sender: sender.to_string(),
        origin_server_ts: ts,
        content,
        redacts: None,
        status: EventStatus::Delivered,
    }
}

pub fn text_event(id: &str, sender: &str, ts: u64, body: &str) -> RawEvent {
    raw_event(
        id,
        "m.room.message",
        sender,
        ts,
        json!({"msgtype": "m.text", "body": body}),
    )
}

pub fn notice_event(id: &str, sender: &str, ts: u64) -> RawEvent {
    raw_event(
        id,
        "m.room.message",
        sender,
        ts,
        json!({"msgtype": "m.notice", "body": "bot says hi"}),
    )
}

pub fn reaction_event(id: &str, sender: &str, ts: u64, target: &str, key: &str) -> RawEvent {
    raw_event(
        id,
        "m.reaction",
        sender,
        ts,
        json!({
            "m.relates_to": {"rel_type": "m.annotation", "event_id": target, "key": key}
        }),
    )
}

pub fn redaction_event(id: &str, sender: &str, ts: u64, target: &str) -> RawEvent {
    let mut event = raw_event(id, "m.room.redaction", sender, ts, json!({}));
    event.redacts = Some(target.to_string());
    event
}

pub fn edit_event(id: &str, sender: &str, ts: u64, target: &str, new_body: &str) -> RawEvent {
    raw_event(
        id,
        "m.room.message",
        sender,
        ts,
        json!({
            "msgtype": "m.text",
            "body": format!("* {new_body}"),
            "m.new_content": {"msgtype": "m.text", "body": new_body},
            "m.relates_to": {"rel_type": "m.replace", "event_id": target}
        }),
    )
}

pub fn image_event(id: &str, sender: &str, ts: u64, locator: &str, mimetype: &str) -> RawEvent {
    raw_event(
        id,
        "m.room.message",
        sender,
        ts,
        json!({
            "msgtype": "m.image",
            "body": "image",
            "url": locator,
            "info": {"w": 640, "h": 480, "mimetype": mimetype, "size": 48_213}
        }),
    )
}

pub fn video_event(id: &str, sender: &str, ts: u64, locator: &str) -> RawEvent {
    raw_event(
        id,
        "m.room.message",
        sender,
        ts,
        json!({
            "msgtype": "m.video",
            "body": "clip.mp4",
            "url": locator,
            "info": {
                "w": 1280,
                "h": 720,
                "mimetype": "video/mp4",
                "thumbnail_url": format!("{locator}_thumb")
            }
        }),
    )
}

pub fn file_event(id: &str, sender: &str, ts: u64, locator: &str, filename: &str) -> RawEvent {
    raw_event(
        id,
        "m.room.message",
        sender,
        ts,
        json!({
            "msgtype": "m.file",
            "body": filename,
            "filename": filename,
            "url": locator,
            "info": {"mimetype": "application/pdf", "size": 1_024}
        }),
    )
}

pub fn reply_event(id: &str, sender: &str, ts: u64, target: &str, body: &str) -> RawEvent {
    raw_event(
        id,
        "m.room.message",
        sender,
        ts,
        json!({
            "msgtype": "m.text",
            "body": body,
            "m.relates_to": {"m.in_reply_to": {"event_id": target}}
        }),
    )
}
