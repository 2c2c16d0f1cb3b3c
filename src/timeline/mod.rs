//! Conversation timeline engine
//!
//! This module turns the raw, append-only event log of a single conversation
//! into an ordered list of displayable messages and keeps it current as older
//! history is fetched and live events arrive. Reactions, replies, redactions
//! and edits are folded into the messages they point at, and scroll-position
//! heuristics tell the view when to jump, auto-scroll or load older history.

mod edits;
mod emoji_utils;
pub mod event_mapper;
mod materializer;
pub mod pagination;
pub mod reactions;
pub mod read_receipts;
pub mod replies;
pub mod scroll;
mod types;

#[cfg(test)]
mod test_utils;

pub use event_mapper::EventMapper;
pub use materializer::{Materialized, Materializer};
pub use pagination::{
    BackfillRequest, LoadMoreOutcome, PaginationController, PaginationCursor, PaginationPhase,
};
pub use read_receipts::ReadReceiptNotifier;
pub use scroll::{
    ChangeOrigin, ListChange, ScrollAction, ScrollDecision, ScrollHeuristics, ScrollMetrics,
};
pub use types::{
    MAX_BACKFILL_BATCH_SIZE, MediaDescriptor, MessageItem, MessageKind, ReactionSummary,
    ReplyPreview, RoomContext, TimelineConfig,
};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::client::{ClientError, LiveSignal, LiveSubscription, RemoteTimelineClient};
use crate::error::Result;

/// Result of processing one live signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveUpdate {
    /// Event that triggered the update, `None` after the subscription lagged
    pub event_id: Option<String>,

    /// What the view should do with its scroll position
    pub scroll: ScrollDecision,
}

/// Serializable view of everything the timeline exposes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSnapshot {
    pub conversation_id: String,
    pub messages: Vec<MessageItem>,
    pub loading: bool,
    pub loading_more: bool,
    pub can_load_more: bool,
    pub show_scroll_button: bool,
}

struct TimelineState {
    room: RoomContext,
    open: bool,
    /// Bumped on every open and close so late completions can be discarded
    generation: u64,
    pagination: PaginationController,
    messages: Vec<MessageItem>,
    newest_event_id: Option<String>,
    metrics: ScrollMetrics,
    jump_armed: bool,
    /// A backfill is outstanding against the remote. Survives close and reopen
    /// so a new session never races a fetch started by an earlier one.
    fetch_in_flight: bool,
}

/// Materialized, self-updating view onto one conversation
///
/// All methods take `&self`; share the timeline behind an `Arc` to drive it
/// from several tasks.
pub struct ConversationTimeline {
    client: Arc<dyn RemoteTimelineClient>,
    config: TimelineConfig,
    heuristics: ScrollHeuristics,
    receipts: ReadReceiptNotifier,
    state: Mutex<TimelineState>,
    live: Mutex<Option<LiveSubscription>>,
    open_signal: watch::Sender<bool>,
}

impl ConversationTimeline {
    pub fn new(
        client: Arc<dyn RemoteTimelineClient>,
        room: RoomContext,
        config: TimelineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let pagination =
            PaginationController::new(config.backfill_batch_size, config.min_visible_messages);

        Ok(Self {
            receipts: ReadReceiptNotifier::new(client.clone()),
            heuristics: ScrollHeuristics::from_config(&config),
            client,
            config,
            state: Mutex::new(TimelineState {
                room,
                open: false,
                generation: 0,
                pagination,
                messages: Vec::new(),
                newest_event_id: None,
                metrics: ScrollMetrics::default(),
                jump_armed: false,
                fetch_in_flight: false,
            }),
            live: Mutex::new(None),
            open_signal: watch::Sender::new(false),
        })
    }

    pub fn conversation_id(&self) -> String {
        self.lock_state().room.conversation_id.clone()
    }

    /// Open the conversation: materialize local events, top up older history
    /// once if the list is too short, and start following live events.
    pub async fn open(&self) {
        // Step 1: Reset state and materialize what is already local
        let (conversation_id, generation, request) = {
            let mut state = self.lock_state();
            if state.open {
                tracing::debug!(
                    target: "timeline_sync::timeline",
                    "Conversation {} is already open",
                    state.room.conversation_id
                );
                return;
            }

            state.open = true;
            state.generation += 1;
            state.jump_armed = false;
            state.metrics = ScrollMetrics::default();
            state.pagination = PaginationController::new(
                self.config.backfill_batch_size,
                self.config.min_visible_messages,
            );

            let token = self.client.backward_token(&state.room.conversation_id);
            state.pagination.begin_initial(token);
            self.rematerialize(&mut state);

            let request = if state.fetch_in_flight {
                tracing::debug!(
                    target: "timeline_sync::pagination",
                    "Skipping initial backfill for {}, an earlier fetch is still outstanding",
                    state.room.conversation_id
                );
                None
            } else {
                state.pagination.initial_backfill(state.messages.len())
            };
            state.fetch_in_flight |= request.is_some();
            (
                state.room.conversation_id.clone(),
                state.generation,
                request,
            )
        };

        tracing::info!(
            target: "timeline_sync::timeline",
            "Opening conversation {}",
            conversation_id
        );

        // Step 2: Follow live events before backfilling so nothing slips through
        {
            let mut state = self.lock_state();
            if state.generation != generation {
                if request.is_some() {
                    state.fetch_in_flight = false;
                }
                return;
            }
            *self.lock_live() = Some(self.client.subscribe_live_events(&conversation_id));
        }
        self.open_signal.send_replace(true);

        // Step 3: One bounded backfill if the list is below the visible floor
        if let Some(request) = request {
            tracing::debug!(
                target: "timeline_sync::timeline",
                "Initial backfill of {} events for {}",
                request.limit,
                conversation_id
            );
            let result = self
                .client
                .paginate_backward(&conversation_id, &request.token, request.limit)
                .await;

            let mut state = self.lock_state();
            state.fetch_in_flight = false;
            if state.generation != generation {
                tracing::debug!(
                    target: "timeline_sync::timeline",
                    "Discarding initial backfill for {} after close",
                    conversation_id
                );
                self.resync_after_stale_fetch(&mut state, &conversation_id, &result);
                return;
            }
            state.pagination.record_backfill(&result);
            if result.is_ok() {
                self.rematerialize(&mut state);
            }
        }

        // Step 4: Settle, arm the initial jump and mark the conversation as read
        let mut state = self.lock_state();
        if state.generation != generation {
            return;
        }
        state.pagination.settle();
        state.jump_armed = true;
        self.send_receipt(&state);
    }

    /// Stop following live events. In-flight backfills are left to finish but
    /// their results are discarded.
    pub fn close(&self) {
        {
            let mut state = self.lock_state();
            if !state.open {
                return;
            }

            tracing::info!(
                target: "timeline_sync::timeline",
                "Closing conversation {}",
                state.room.conversation_id
            );

            state.open = false;
            state.generation += 1;
            state.jump_armed = false;
            state.messages.clear();
            state.newest_event_id = None;
            state.pagination = PaginationController::new(
                self.config.backfill_batch_size,
                self.config.min_visible_messages,
            );
            self.lock_live().take();
        }
        self.open_signal.send_replace(false);
    }

    pub fn is_open(&self) -> bool {
        self.lock_state().open
    }

    /// Re-derive the list from the current local events.
    pub fn refresh(&self) {
        let mut state = self.lock_state();
        if !state.open {
            return;
        }
        self.rematerialize(&mut state);
        self.send_receipt(&state);
    }

    /// Fetch one batch of older history.
    pub async fn load_more(&self) -> LoadMoreOutcome {
        let (conversation_id, generation, request) = {
            let mut state = self.lock_state();
            if !state.open || state.fetch_in_flight {
                return LoadMoreOutcome::Skipped;
            }
            let Some(request) = state.pagination.begin_more() else {
                return LoadMoreOutcome::Skipped;
            };
            state.fetch_in_flight = true;
            (
                state.room.conversation_id.clone(),
                state.generation,
                request,
            )
        };

        tracing::debug!(
            target: "timeline_sync::pagination",
            "Loading {} older events for {}",
            request.limit,
            conversation_id
        );

        let result = self
            .client
            .paginate_backward(&conversation_id, &request.token, request.limit)
            .await;

        let mut state = self.lock_state();
        state.fetch_in_flight = false;
        if state.generation != generation {
            tracing::debug!(
                target: "timeline_sync::pagination",
                "Discarding backfill for {} after close",
                conversation_id
            );
            self.resync_after_stale_fetch(&mut state, &conversation_id, &result);
            return LoadMoreOutcome::Discarded;
        }

        state.pagination.record_backfill(&result);
        state.pagination.settle();

        if result.is_err() {
            return LoadMoreOutcome::Failed;
        }

        let previous_len = state.messages.len();
        self.rematerialize(&mut state);
        let new_messages = state.messages.len().saturating_sub(previous_len);

        if state.pagination.can_load_more() {
            LoadMoreOutcome::Loaded { new_messages }
        } else {
            LoadMoreOutcome::ReachedStart { new_messages }
        }
    }

    /// Wait for the next live event and re-derive the list.
    ///
    /// Returns `None` once the conversation is closed or the live stream ended.
    /// Only one caller should consume live updates at a time.
    pub async fn next_live_update(&self) -> Option<LiveUpdate> {
        let mut subscription = self.lock_live().take()?;
        let generation = self.lock_state().generation;
        let mut open = self.open_signal.subscribe();
        let closed = async move {
            while *open.borrow_and_update() {
                if open.changed().await.is_err() {
                    break;
                }
            }
        };

        let signal = tokio::select! {
            signal = subscription.recv() => signal,
            () = closed => None,
        };

        let Some(signal) = signal else {
            tracing::debug!(
                target: "timeline_sync::timeline",
                "Live updates for {} ended",
                subscription.conversation_id()
            );
            return None;
        };

        let mut state = self.lock_state();
        if state.generation != generation || !state.open {
            return None;
        }

        let event_id = match signal {
            LiveSignal::Event(event) => Some(event.event_id),
            LiveSignal::Lagged(_) => None,
        };

        let previous_newest_id = state.messages.first().map(|m| m.event_id.clone());
        self.rematerialize(&mut state);

        let newest = state.messages.first();
        let change = ListChange {
            previous_newest_id: previous_newest_id.as_deref(),
            newest_id: newest.map(|m| m.event_id.as_str()),
            newest_is_own: newest.is_some_and(|m| m.is_own),
            origin: ChangeOrigin::LiveUpdate,
        };
        let scroll = self.heuristics.decide(&change, &state.metrics);

        self.send_receipt(&state);
        *self.lock_live() = Some(subscription);

        Some(LiveUpdate { event_id, scroll })
    }

    /// Record the view's scroll position, loading older history when it nears the top.
    pub async fn on_scroll(&self, metrics: ScrollMetrics) -> Option<LoadMoreOutcome> {
        let should_paginate = {
            let mut state = self.lock_state();
            state.metrics = metrics;
            state.open
                && self.heuristics.should_paginate(
                    &metrics,
                    state.pagination.can_load_more(),
                    state.pagination.is_in_flight() || state.fetch_in_flight,
                )
        };

        if should_paginate {
            Some(self.load_more().await)
        } else {
            None
        }
    }

    /// Record a new content extent. Yields the one-shot jump to the newest
    /// message the first time content is laid out after the initial load.
    pub fn on_content_size_change(&self, content_extent: f64) -> ScrollAction {
        let mut state = self.lock_state();
        state.metrics.content_extent = content_extent;

        if !state.jump_armed || state.messages.is_empty() {
            return ScrollAction::None;
        }

        state.jump_armed = false;
        let newest = state.messages.first();
        let change = ListChange {
            previous_newest_id: None,
            newest_id: newest.map(|m| m.event_id.as_str()),
            newest_is_own: newest.is_some_and(|m| m.is_own),
            origin: ChangeOrigin::InitialLoad,
        };
        let action = self.heuristics.decide(&change, &state.metrics).action;
        if action == ScrollAction::JumpToEnd {
            state.metrics.offset = 0.0;
        }
        action
    }

    /// Move the recorded position back to the newest message.
    pub fn scroll_to_bottom(&self) -> ScrollAction {
        self.lock_state().metrics.offset = 0.0;
        ScrollAction::AutoScrollToLatest
    }

    pub fn show_scroll_button(&self) -> bool {
        self.heuristics.show_jump_button(&self.lock_state().metrics)
    }

    /// Materialized messages, newest first.
    pub fn messages(&self) -> Vec<MessageItem> {
        self.lock_state().messages.clone()
    }

    /// Whether the initial load is still in progress.
    pub fn loading(&self) -> bool {
        self.lock_state().pagination.is_loading_initial()
    }

    pub fn loading_more(&self) -> bool {
        self.lock_state().pagination.is_loading_more()
    }

    pub fn can_load_more(&self) -> bool {
        self.lock_state().pagination.can_load_more()
    }

    /// Replace the room metadata (member names, conversation name) and re-derive.
    pub fn set_room_context(&self, room: RoomContext) {
        let mut state = self.lock_state();
        state.room = room;
        if state.open {
            self.rematerialize(&mut state);
        }
    }

    pub fn snapshot(&self) -> TimelineSnapshot {
        let state = self.lock_state();
        TimelineSnapshot {
            conversation_id: state.room.conversation_id.clone(),
            messages: state.messages.clone(),
            loading: state.pagination.is_loading_initial(),
            loading_more: state.pagination.is_loading_more(),
            can_load_more: state.pagination.can_load_more(),
            show_scroll_button: self.heuristics.show_jump_button(&state.metrics),
        }
    }

    fn rematerialize(&self, state: &mut TimelineState) {
        let events = self.client.local_events(&state.room.conversation_id);
        let materialized =
            Materializer::new(self.client.as_ref(), &self.config).materialize(&events, &state.room);

        if self.config.enable_debug_logging {
            tracing::debug!(
                target: "timeline_sync::timeline",
                "Materialized {} messages from {} events for {}",
                materialized.messages.len(),
                events.len(),
                state.room.conversation_id
            );
        }

        state.messages = materialized.messages;
        state.newest_event_id = materialized.newest_event_id;
    }

    /// A fetch started by an earlier session landed while a newer one is open.
    /// Its events are local now, so the newer session resumes from the remote's
    /// current cursor instead of requesting the same page again.
    fn resync_after_stale_fetch(
        &self,
        state: &mut TimelineState,
        conversation_id: &str,
        result: &std::result::Result<Option<String>, ClientError>,
    ) {
        if !state.open || result.is_err() || state.room.conversation_id != conversation_id {
            return;
        }
        let token = self.client.backward_token(conversation_id);
        state.pagination.resync(token);
        self.rematerialize(state);
    }

    fn send_receipt(&self, state: &TimelineState) {
        if let Some(event_id) = state.newest_event_id.as_deref() {
            self.receipts.notify(&state.room.conversation_id, event_id);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TimelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_live(&self) -> MutexGuard<'_, Option<LiveSubscription>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) async fn wait_for_receipts(&self) {
        self.receipts.wait_idle().await;
    }
}

impl Drop for ConversationTimeline {
    fn drop(&mut self) {
        self.close();
    }
}
