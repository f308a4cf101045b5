//! Uniswap V4 adapter: snapshot from the PoolManager singleton.
//!
//! One manager contract hosts every pool, keyed by a 32-byte pool id.
//! Snapshot reads are parameterized by that id; stream records carry it in
//! the payload and anything for another pool is discarded without error.

use alloy_primitives::{Address, B256, U256};
use alloy_primitives::aliases::I24;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::pricing::tick_to_price;
use crate::rpc::{Call, LogFilter, Multicall, RawLog};
use crate::types::{
    EventKind, LiquidityDeltaEvent, PriceState, Protocol, Snapshot, TickBucket, MAX_TICK, MIN_TICK,
};

use super::abi::IPoolManager;
use super::{event_metadata, log_data_of, ProtocolAdapter};
use alloy_sol_types::{SolCall, SolEvent};

/// `getTickLiquidity` is a single storage read; large chunks are fine.
const TICK_CHUNK: usize = 200;

/// Token decimals are not part of the manager's view surface; the pool id
/// abstracts the pair away, so prices here are raw tick powers.
const DECIMALS: u8 = 18;

pub struct UniswapV4Adapter {
    multicall: Multicall,
    manager_address: Address,
    pool_id: B256,
}

impl UniswapV4Adapter {
    pub fn new(multicall: Multicall, manager_address: Address, pool_id: B256) -> Self {
        Self {
            multicall,
            manager_address,
            pool_id,
        }
    }
}

#[async_trait]
impl ProtocolAdapter for UniswapV4Adapter {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let calls = [
            Call {
                target: self.manager_address,
                calldata: IPoolManager::tickSpacingCall { poolId: self.pool_id }.abi_encode(),
            },
            Call {
                target: self.manager_address,
                calldata: IPoolManager::getCurrentTickCall { poolId: self.pool_id }.abi_encode(),
            },
            Call {
                target: self.manager_address,
                calldata: IPoolManager::getCurrentSqrtPriceCall { poolId: self.pool_id }
                    .abi_encode(),
            },
        ];
        let outcome = self.multicall.aggregate(&calls).await?;

        let tick_spacing = IPoolManager::tickSpacingCall::abi_decode_returns(&outcome.return_data[0])
            .context("failed to decode tickSpacing")?
            .as_i32();
        anyhow::ensure!(
            tick_spacing > 0,
            "manager reports non-positive tick spacing {tick_spacing}"
        );
        let current_tick =
            IPoolManager::getCurrentTickCall::abi_decode_returns(&outcome.return_data[1])
                .context("failed to decode current tick")?
                .as_i32();
        let sqrt_price =
            IPoolManager::getCurrentSqrtPriceCall::abi_decode_returns(&outcome.return_data[2])
                .context("failed to decode sqrt price")?;

        let mut aligned: Vec<(i32, IPoolManager::getTickLiquidityCall)> = Vec::new();
        // First spacing multiple inside the domain; only aligned ticks can
        // be initialized.
        let mut tick = MIN_TICK.div_euclid(tick_spacing) * tick_spacing;
        if tick < MIN_TICK {
            tick += tick_spacing;
        }
        while tick < MAX_TICK {
            if let Ok(t) = I24::try_from(tick) {
                aligned.push((
                    tick,
                    IPoolManager::getTickLiquidityCall {
                        poolId: self.pool_id,
                        tick: t,
                    },
                ));
            }
            tick += tick_spacing;
        }

        let calls: Vec<IPoolManager::getTickLiquidityCall> =
            aligned.iter().map(|(_, c)| c.clone()).collect();
        let liquidities = self
            .multicall
            .call_batch_chunked(self.manager_address, &calls, TICK_CHUNK)
            .await
            .context("tick liquidity sweep failed")?;

        let mut snapshot = Snapshot::new(Protocol::UniswapV4, self.manager_address, tick_spacing);
        snapshot.price_state = PriceState {
            sqrt_price_x96: Some(U256::from(sqrt_price)),
            tick: Some(current_tick),
        };

        for ((tick, _), liquidity) in aligned.into_iter().zip(liquidities) {
            if liquidity == 0 {
                continue;
            }
            snapshot.ticks.insert(
                tick,
                TickBucket {
                    lower_tick: tick,
                    upper_tick: tick + tick_spacing,
                    liquidity: i128::try_from(liquidity).unwrap_or(i128::MAX),
                    liquidity_net: None,
                    price_lower: tick_to_price(tick, DECIMALS, DECIMALS),
                    price_upper: tick_to_price(tick + tick_spacing, DECIMALS, DECIMALS),
                },
            );
        }

        info!(
            ticks = snapshot.ticks.len(),
            spacing = tick_spacing,
            pool_id = %self.pool_id,
            "uniswap v4 snapshot materialized"
        );
        Ok(snapshot)
    }

    fn log_filter(&self) -> LogFilter {
        LogFilter {
            address: self.manager_address,
            topics: vec![
                IPoolManager::ModifyLiquidity::SIGNATURE_HASH,
                IPoolManager::Mint::SIGNATURE_HASH,
            ],
        }
    }

    fn decode_log(&self, log: &RawLog) -> Option<LiquidityDeltaEvent> {
        let topic0 = log.topics.first()?;
        let log_data = log_data_of(log)?;
        let (tx_hash, block_number, timestamp) = event_metadata(log);

        let (lower_tick, upper_tick, liquidity_delta, kind) =
            if *topic0 == IPoolManager::ModifyLiquidity::SIGNATURE_HASH {
                let modify = IPoolManager::ModifyLiquidity::decode_log_data(&log_data).ok()?;
                let params = modify.params;
                if params.poolId != self.pool_id {
                    return None;
                }
                (
                    params.tickLower.as_i32(),
                    params.tickUpper.as_i32(),
                    i128::try_from(params.liquidityDelta).ok()?,
                    EventKind::ModifyLiquidity,
                )
            } else if *topic0 == IPoolManager::Mint::SIGNATURE_HASH {
                let mint = IPoolManager::Mint::decode_log_data(&log_data).ok()?;
                if mint.poolId != self.pool_id {
                    return None;
                }
                (
                    mint.tickLower.as_i32(),
                    mint.tickUpper.as_i32(),
                    mint.amount,
                    EventKind::Mint,
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
}
