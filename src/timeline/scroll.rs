//! Scroll-position heuristics
//!
//! The conversation is rendered as an inverted list: offset `0` shows the
//! newest message, and offsets grow towards older history. All decisions here
//! are pure functions of the list change and the current scroll metrics.

use serde::{Deserialize, Serialize};

use super::types::TimelineConfig;

/// Scroll geometry reported by the view
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollMetrics {
    /// Distance scrolled away from the newest message
    pub offset: f64,

    /// Total height of the rendered list
    pub content_extent: f64,

    /// Height of the visible area
    pub viewport_extent: f64,
}

impl ScrollMetrics {
    pub fn new(offset: f64, content_extent: f64, viewport_extent: f64) -> Self {
        Self {
            offset,
            content_extent,
            viewport_extent,
        }
    }

    pub fn distance_from_bottom(&self) -> f64 {
        self.offset.max(0.0)
    }

    pub fn distance_from_top(&self) -> f64 {
        (self.content_extent - self.viewport_extent - self.offset).max(0.0)
    }
}

/// Why the materialized list changed
///
/// The timeline itself decides `InitialLoad` and `LiveUpdate` changes.
/// `BackwardPagination` is for hosts that diff the list on their own after a
/// `load_more` and want the same answer the timeline would give: never scroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    InitialLoad,
    LiveUpdate,
    BackwardPagination,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollAction {
    #[default]
    None,
    /// One-shot jump to the newest message once the initial load settled
    JumpToEnd,
    /// Animated scroll to a newly arrived message
    AutoScrollToLatest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollDecision {
    pub action: ScrollAction,
    pub show_jump_button: bool,
}

/// Newest-message transition of a list change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListChange<'a> {
    pub previous_newest_id: Option<&'a str>,
    pub newest_id: Option<&'a str>,
    pub newest_is_own: bool,
    pub origin: ChangeOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollHeuristics {
    near_bottom_threshold: f64,
    near_top_threshold: f64,
}

impl ScrollHeuristics {
    pub fn new(near_bottom_threshold: f64, near_top_threshold: f64) -> Self {
        Self {
            near_bottom_threshold,
            near_top_threshold,
        }
    }

    pub fn from_config(config: &TimelineConfig) -> Self {
        Self::new(config.near_bottom_threshold, config.near_top_threshold)
    }

    pub fn is_near_bottom(&self, metrics: &ScrollMetrics) -> bool {
        metrics.distance_from_bottom() <= self.near_bottom_threshold
    }

    pub fn is_near_top(&self, metrics: &ScrollMetrics) -> bool {
        metrics.distance_from_top() <= self.near_top_threshold
    }

    /// The jump-to-latest button shows once the viewer is more than a screen away.
    pub fn show_jump_button(&self, metrics: &ScrollMetrics) -> bool {
        metrics.distance_from_bottom() > metrics.viewport_extent
    }

    pub fn decide(&self, change: &ListChange<'_>, metrics: &ScrollMetrics) -> ScrollDecision {
        ScrollDecision {
            action: Self::action_for(change, self.is_near_bottom(metrics)),
            show_jump_button: self.show_jump_button(metrics),
        }
    }

    /// Auto-scroll table: a new newest message scrolls into view when the viewer
    /// wrote it or is already at the bottom. Prepending history never scrolls.
    pub fn action_for(change: &ListChange<'_>, near_bottom: bool) -> ScrollAction {
        match change.origin {
            ChangeOrigin::InitialLoad => ScrollAction::JumpToEnd,
            ChangeOrigin::BackwardPagination => ScrollAction::None,
            ChangeOrigin::LiveUpdate => {
                let newest_changed =
                    change.newest_id.is_some() && change.newest_id != change.previous_newest_id;
                if newest_changed && (change.newest_is_own || near_bottom) {
                    ScrollAction::AutoScrollToLatest
                } else {
                    ScrollAction::None
                }
            }
        }
    }

    pub fn should_paginate(
        &self,
        metrics: &ScrollMetrics,
        can_load_more: bool,
        in_flight: bool,
    ) -> bool {
        can_load_more && !in_flight && self.is_near_top(metrics)
    }
}

impl Default for ScrollHeuristics {
    fn default() -> Self {
        Self::from_config(&TimelineConfig::default())
    }
}
