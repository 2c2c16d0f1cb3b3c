//! Timeline synchronization and message materialization
//!
//! Turns the raw event log of a conversation, as exposed by a
//! [`RemoteTimelineClient`], into a newest-first list of displayable messages
//! with reactions, reply previews, edits and redactions applied. The
//! [`ConversationTimeline`] keeps that list current through backward pagination
//! and live events, and tells the view how to scroll.

pub mod client;
mod error;
pub mod timeline;

pub use crate::client::{
    ClientError, EventStatus, LiveEventHub, LiveSignal, LiveSubscription, MediaSize, RawEvent,
    Relation, RemoteTimelineClient,
};
pub use crate::error::{Result, TimelineError};
pub use crate::timeline::{
    ConversationTimeline, LiveUpdate, LoadMoreOutcome, MessageItem, MessageKind, ReactionSummary,
    ReplyPreview, RoomContext, ScrollAction, ScrollMetrics, TimelineConfig, TimelineSnapshot,
};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

use std::path::Path;
use std::sync::{Mutex, PoisonError};

static TRACING_GUARDS: Mutex<Option<(WorkerGuard, WorkerGuard)>> = Mutex::new(None);

/// Install the global tracing subscriber: stdout plus a daily rolling log file.
///
/// Only the first successful call has an effect; later calls return `Ok(())`.
/// The filter follows `RUST_LOG` and defaults to `info`.
pub fn init_tracing(logs_dir: &Path) -> Result<()> {
    let mut guards = TRACING_GUARDS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if guards.is_some() {
        return Ok(());
    }

    std::fs::create_dir_all(logs_dir)?;

    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("timeline-sync")
        .filename_suffix("log")
        .build(logs_dir)
        .map_err(|e| TimelineError::LoggingSetup(e.to_string()))?;

    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
    let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let stdout_layer = Layer::new()
        .with_writer(non_blocking_stdout)
        .with_ansi(true)
        .with_target(true);

    let file_layer = Layer::new()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| TimelineError::LoggingSetup(e.to_string()))?;

    *guards = Some((file_guard, stdout_guard));
    tracing::info!(
        target: "timeline_sync::init_tracing",
        "Logging to {}",
        logs_dir.display()
    );
    Ok(())
}
