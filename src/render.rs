//! Terminal depth view: a periodic buy-wall table plus a live event line
//! printer. Read-only over the state machine.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::debug;

use crate::state::LiquidityStateMachine;

const BAR_CHAR: &str = "▮";
const BAR_UNIT: f64 = 1_000.0;
const BAR_MAX: usize = 60;

fn depth_bar(depth: f64) -> String {
    let len = ((depth / BAR_UNIT) as usize + 1).min(BAR_MAX);
    BAR_CHAR.repeat(len)
}

/// One rendered frame of the depth table.
pub fn render_depth_table(state: &LiquidityStateMachine) -> String {
    let scale = state.adaptive_scale();
    let rows = state.buy_wall_depth();

    let mut out = String::new();
    out.push_str("=== Depth Chart (Buy Wall) ===\n");
    out.push_str(&format!(
        "Current Price: {:.6}  Step: {:.6}  Buckets: {}\n",
        scale.current_price,
        scale.step,
        state.bucket_count(),
    ));
    for row in &rows {
        out.push_str(&format!(
            "{} | liquidity {:>14.2} | {}\n",
            row.bucket_label,
            row.depth,
            depth_bar(row.depth),
        ));
    }
    if rows.is_empty() {
        out.push_str("(no resting liquidity below current price)\n");
    }
    out
}

/// Print the depth table every `refresh` until the process exits.
pub async fn run_renderer(state: Arc<LiquidityStateMachine>, refresh: Duration) {
    let mut ticker = interval(refresh);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        print!("{}", render_depth_table(&state));
    }
}

/// Drain formatted event lines onto stdout. Lagged gaps are noted and
/// skipped rather than treated as failures.
pub fn spawn_event_printer(mut rx: broadcast::Receiver<String>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(line) => println!("{line}"),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "event printer lagged; dropping oldest lines");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });
}
