//! Ingestion supervisor: pulls decoded events off the adapter stream,
//! folds them into the state machine, and fans formatted lines out to the
//! renderer over a broadcast channel (lagging consumers lose the oldest).
//!
//! The task is daemonic; it lives until the process exits. Reconnects are
//! the stream's job, so there is no retry here.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::protocols::{spawn_event_stream, ProtocolAdapter};
use crate::state::LiquidityStateMachine;
use crate::types::LiquidityDeltaEvent;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Human-readable event line for the stream printer.
pub fn format_event(event: &LiquidityDeltaEvent) -> String {
    let when = Utc
        .timestamp_opt(event.timestamp, 0)
        .single()
        .unwrap_or_else(Utc::now);
    format!(
        "{} [{}] tick {}-{} Δ{} block={} tx={}",
        when.format("%Y-%m-%d %H:%M:%S"),
        event.kind.as_str(),
        event.lower_tick,
        event.upper_tick,
        event.liquidity_delta,
        event.block_number,
        event.tx_hash,
    )
}

/// Spawn the stream → apply → publish loop.
///
/// Returns the broadcast handle; subscribe before events start flowing to
/// see everything, or late to see only what comes after.
pub fn spawn_ingestion(
    adapter: Arc<dyn ProtocolAdapter>,
    state: Arc<LiquidityStateMachine>,
    wss_url: String,
) -> broadcast::Sender<String> {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let publish = tx.clone();

    tokio::spawn(async move {
        let mut events = spawn_event_stream(adapter, wss_url);
        while let Some(event) = events.recv().await {
            debug!(
                kind = event.kind.as_str(),
                lower = event.lower_tick,
                upper = event.upper_tick,
                delta = event.liquidity_delta,
                "applying liquidity event"
            );
            state.apply_event(&event);
            // No receiver yet is fine; the renderer may attach later.
            let _ = publish.send(format_event(&event));
        }
        warn!("event stream closed; ingestion task exiting");
    });

    tx
}
