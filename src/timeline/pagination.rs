//! Backward pagination state machine
//!
//! The controller carries no I/O. The timeline asks it for a [`BackfillRequest`],
//! performs the network call, and reports the result back. At most one request
//! is handed out at a time; asking again while one is outstanding yields
//! nothing.

use serde::{Deserialize, Serialize};

use crate::client::ClientError;

/// Opaque backward-fetch token plus exhaustion flag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationCursor {
    token: Option<String>,
    exhausted: bool,
}

impl PaginationCursor {
    pub fn new(token: Option<String>) -> Self {
        let exhausted = token.is_none();
        Self { token, exhausted }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn advance(&mut self, next_token: Option<String>) {
        if next_token.is_none() {
            self.exhausted = true;
        }
        self.token = next_token;
    }

    /// Stop paginating after a failure so callers cannot retry in a loop.
    fn stall(&mut self) {
        self.exhausted = true;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationPhase {
    #[default]
    Idle,
    LoadingInitial,
    LoadingMore,
}

/// A backfill the caller should perform against the remote client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillRequest {
    pub token: String,
    pub limit: u16,
}

/// Outcome of an explicit `load_more`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMoreOutcome {
    /// Nothing was requested: a fetch is in flight, or there is nothing left.
    Skipped,
    /// Older events were fetched and more remain.
    Loaded { new_messages: usize },
    /// Older events were fetched and the start of the conversation was reached.
    ReachedStart { new_messages: usize },
    /// The backfill failed; pagination is disabled for this conversation view.
    Failed,
    /// The conversation was closed or reopened while the fetch was in flight.
    Discarded,
}

#[derive(Debug, Clone)]
pub struct PaginationController {
    cursor: Option<PaginationCursor>,
    phase: PaginationPhase,
    batch_size: u16,
    min_visible_messages: usize,
    failed: bool,
}

impl PaginationController {
    pub fn new(batch_size: u16, min_visible_messages: usize) -> Self {
        Self {
            cursor: None,
            phase: PaginationPhase::Idle,
            batch_size: batch_size.max(1),
            min_visible_messages,
            failed: false,
        }
    }

    pub fn phase(&self) -> PaginationPhase {
        self.phase
    }

    pub fn cursor(&self) -> Option<&PaginationCursor> {
        self.cursor.as_ref()
    }

    pub fn is_loading_initial(&self) -> bool {
        self.phase == PaginationPhase::LoadingInitial
    }

    pub fn is_loading_more(&self) -> bool {
        self.phase == PaginationPhase::LoadingMore
    }

    pub fn is_in_flight(&self) -> bool {
        self.phase != PaginationPhase::Idle
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn can_load_more(&self) -> bool {
        self.cursor
            .as_ref()
            .is_some_and(|cursor| !cursor.is_exhausted() && cursor.token().is_some())
    }

    /// Start the initial load, creating the cursor from the remote's token.
    ///
    /// Returns `false` when a load is already underway.
    pub fn begin_initial(&mut self, token: Option<String>) -> bool {
        if self.is_in_flight() {
            return false;
        }

        self.cursor = Some(PaginationCursor::new(token));
        self.phase = PaginationPhase::LoadingInitial;
        self.failed = false;
        true
    }

    /// The single backfill the initial load may issue to reach the visible floor.
    pub fn initial_backfill(&self, displayable_messages: usize) -> Option<BackfillRequest> {
        if !self.is_loading_initial() || displayable_messages >= self.min_visible_messages {
            return None;
        }
        self.next_request()
    }

    /// Start an explicit backfill, or `None` if one is in flight or nothing is left.
    pub fn begin_more(&mut self) -> Option<BackfillRequest> {
        if self.is_in_flight() {
            tracing::debug!(
                target: "timeline_sync::pagination",
                "Ignoring load more request, {:?} in progress",
                self.phase
            );
            return None;
        }

        let request = self.next_request()?;
        self.phase = PaginationPhase::LoadingMore;
        Some(request)
    }

    /// Record the result of a backfill issued from either phase.
    pub fn record_backfill(&mut self, result: &Result<Option<String>, ClientError>) {
        let Some(cursor) = self.cursor.as_mut() else {
            return;
        };

        match result {
            Ok(next_token) => {
                cursor.advance(next_token.clone());
                if cursor.is_exhausted() {
                    tracing::debug!(
                        target: "timeline_sync::pagination",
                        "Reached the start of the conversation"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    target: "timeline_sync::pagination",
                    "Backfill failed, disabling further pagination: {}",
                    e
                );
                cursor.stall();
                self.failed = true;
            }
        }
    }

    /// Adopt the remote's cursor after a fetch this controller did not issue
    /// advanced it. A failed controller stays stalled.
    pub fn resync(&mut self, token: Option<String>) {
        if self.failed || self.cursor.is_none() {
            return;
        }
        self.cursor = Some(PaginationCursor::new(token));
    }

    /// Return to idle after the current load finished.
    pub fn settle(&mut self) {
        self.phase = PaginationPhase::Idle;
    }

    fn next_request(&self) -> Option<BackfillRequest> {
        if !self.can_load_more() {
            return None;
        }

        let token = self.cursor.as_ref()?.token()?.to_string();
        Some(BackfillRequest {
            token,
            limit: self.batch_size,
        })
    }
}
