//! Protocol adapters: one per supported pool flavor.
//!
//! An adapter materializes the initial tick snapshot from chain state and
//! decodes raw subscription logs into liquidity delta events. Selection
//! happens once at startup from the configured protocol tag.

pub mod abi;
pub mod pancake_v3;
pub mod uniswap_v3;
pub mod uniswap_v4;

use std::sync::Arc;

use alloy_primitives::{B256, LogData};
use alloy_sol_types::SolEvent;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::rpc::{LogFilter, LogStream, Multicall, RawLog};
use crate::types::{EventKind, LiquidityDeltaEvent, Protocol, Snapshot};

use self::abi::IUniswapV3Pool;

#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Materialize the initial snapshot. Batched and synchronous from the
    /// caller's perspective; may take seconds on pools with many ticks.
    async fn fetch_snapshot(&self) -> Result<Snapshot>;

    /// Subscription filter for this pool's liquidity events.
    fn log_filter(&self) -> LogFilter;

    /// Decode one raw log into a delta event. Malformed records and records
    /// for unrelated pools come back as None and are dropped.
    fn decode_log(&self, log: &RawLog) -> Option<LiquidityDeltaEvent>;
}

/// Build the adapter matching the configured protocol.
pub fn build_adapter(config: &AppConfig, multicall: Multicall) -> Result<Arc<dyn ProtocolAdapter>> {
    let pool = &config.pool;
    Ok(match pool.protocol {
        Protocol::UniswapV3 => Arc::new(uniswap_v3::UniswapV3Adapter::new(
            multicall,
            pool.pool_address,
            pool.token0_decimals,
            pool.token1_decimals,
        )),
        Protocol::PancakeV3 => Arc::new(pancake_v3::PancakeV3Adapter::new(
            multicall,
            pool.pool_address,
            pool.tick_lens_address
                .ok_or_else(|| anyhow::anyhow!("pancake_v3 requires a tick lens address"))?,
            pool.token0_decimals,
            pool.token1_decimals,
        )),
        Protocol::UniswapV4 => Arc::new(uniswap_v4::UniswapV4Adapter::new(
            multicall,
            pool.pool_address,
            pool.pool_id
                .ok_or_else(|| anyhow::anyhow!("uniswap_v4 requires a pool id"))?,
        )),
    })
}

/// Wire the adapter's filter into a live log stream and hand decoded events
/// to the receiver. The underlying stream reconnects on its own; dropping
/// the receiver ends both tasks.
pub fn spawn_event_stream(
    adapter: Arc<dyn ProtocolAdapter>,
    wss_url: String,
) -> mpsc::Receiver<LiquidityDeltaEvent> {
    let (tx, rx) = mpsc::channel(1024);
    let mut raw_rx = LogStream::new(wss_url, adapter.log_filter()).spawn();

    tokio::spawn(async move {
        while let Some(raw) = raw_rx.recv().await {
            let Some(event) = adapter.decode_log(&raw) else {
                continue;
            };
            if tx.send(event).await.is_err() {
                return;
            }
        }
    });

    rx
}

/// Rebuild node-delivered topics + data into the shape the sol! decoders eat.
pub(crate) fn log_data_of(raw: &RawLog) -> Option<LogData> {
    let data = raw.data_bytes()?;
    Some(LogData::new_unchecked(raw.topics.clone(), data.into()))
}

pub(crate) fn event_metadata(raw: &RawLog) -> (B256, u64, i64) {
    (
        raw.transaction_hash.unwrap_or(B256::ZERO),
        raw.block_number_u64(),
        Utc::now().timestamp(),
    )
}

/// Shared Mint/Burn decoding for the V3-family adapters.
pub(crate) fn decode_mint_burn(raw: &RawLog) -> Option<LiquidityDeltaEvent> {
    let topic0 = raw.topics.first()?;
    let log_data = log_data_of(raw)?;
    let (tx_hash, block_number, timestamp) = event_metadata(raw);

    let (lower_tick, upper_tick, liquidity_delta, kind) =
        if *topic0 == IUniswapV3Pool::Mint::SIGNATURE_HASH {
            let mint = IUniswapV3Pool::Mint::decode_log_data(&log_data).ok()?;
            (
                mint.tickLower.as_i32(),
                mint.tickUpper.as_i32(),
                i128::try_from(mint.amount).ok()?,
                EventKind::Mint,
            )
        } else if *topic0 == IUniswapV3Pool::Burn::SIGNATURE_HASH {
            let burn = IUniswapV3Pool::Burn::decode_log_data(&log_data).ok()?;
            (
                burn.tickLower.as_i32(),
                burn.tickUpper.as_i32(),
                i128::try_from(burn.amount).ok()?.checked_neg()?,
                EventKind::Burn,
            )
        } else {
            return None;
        };

    Some(LiquidityDeltaEvent {
        tx_hash,
        lower_tick,
        upper_tick,
        liquidity_delta,
        block_number,
        timestamp,
        kind,
    })
}
