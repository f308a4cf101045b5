//! Tickwall binary: fetch the initial snapshot, start the ingestion loop,
//! and keep redrawing the buy-wall depth table.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tickwall::config::AppConfig;
use tickwall::protocols::build_adapter;
use tickwall::rpc::{Multicall, RpcClient};
use tickwall::state::LiquidityStateMachine;
use tickwall::{ingest, render};

const RENDER_REFRESH: Duration = Duration::from_secs(15);

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tickwall=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load().context("configuration error")?;
    info!(
        chain = %config.chain.name,
        pool = %config.pool.pool_address,
        protocol = config.pool.protocol.as_str(),
        "starting tickwall"
    );

    let rpc = RpcClient::new(config.chain.rpc_url.clone())?;
    let multicall = Multicall::new(rpc, config.chain.multicall_address);
    let adapter = build_adapter(&config, multicall)?;

    info!("fetching initial liquidity snapshot (may take a while on busy pools)");
    let snapshot = adapter
        .fetch_snapshot()
        .await
        .context("initial snapshot fetch failed")?;
    info!(
        ticks = snapshot.ticks.len(),
        spacing = snapshot.tick_spacing,
        "snapshot ready"
    );

    let state = Arc::new(LiquidityStateMachine::new(
        snapshot,
        config.pool.token0_decimals,
        config.pool.token1_decimals,
    ));

    let events = ingest::spawn_ingestion(
        adapter,
        Arc::clone(&state),
        config.chain.wss_url.clone(),
    );
    render::spawn_event_printer(events.subscribe());

    render::run_renderer(state, RENDER_REFRESH).await;
    Ok(())
}
