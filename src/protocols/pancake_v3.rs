//! Pancake V3 adapter: snapshot via the external tick-lens contract.
//!
//! The pool itself offers no cheap bitmap walk; the lens returns every
//! populated tick within a bitmap word in one call, so the snapshot is one
//! lens call per word, batched through the aggregator.

use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::pricing::tick_to_price;
use crate::rpc::{Call, LogFilter, Multicall, RawLog};
use crate::types::{LiquidityDeltaEvent, PriceState, Protocol, Snapshot, TickBucket, MAX_TICK, MIN_TICK};

use super::abi::{ITickLens, IUniswapV3Pool};
use super::{decode_mint_burn, ProtocolAdapter};
use alloy_sol_types::{SolCall, SolEvent};

/// Lens calls return whole arrays; keep aggregates small.
const LENS_CHUNK: usize = 80;
const WORD_SIZE: i32 = 256;

pub struct PancakeV3Adapter {
    multicall: Multicall,
    pool_address: Address,
    tick_lens_address: Address,
    token0_decimals: u8,
    token1_decimals: u8,
}

impl PancakeV3Adapter {
    pub fn new(
        multicall: Multicall,
        pool_address: Address,
        tick_lens_address: Address,
        token0_decimals: u8,
        token1_decimals: u8,
    ) -> Self {
        Self {
            multicall,
            pool_address,
            tick_lens_address,
            token0_decimals,
            token1_decimals,
        }
    }
}

#[async_trait]
impl ProtocolAdapter for PancakeV3Adapter {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let calls = [
            Call {
                target: self.pool_address,
                calldata: IUniswapV3Pool::slot0Call {}.abi_encode(),
            },
            Call {
                target: self.pool_address,
                calldata: IUniswapV3Pool::tickSpacingCall {}.abi_encode(),
            },
        ];
        let outcome = self.multicall.aggregate(&calls).await?;
        let slot0 = IUniswapV3Pool::slot0Call::abi_decode_returns(&outcome.return_data[0])
            .context("failed to decode slot0")?;
        let tick_spacing =
            IUniswapV3Pool::tickSpacingCall::abi_decode_returns(&outcome.return_data[1])
                .context("failed to decode tickSpacing")?
                .as_i32();
        anyhow::ensure!(
            tick_spacing > 0,
            "pool reports non-positive tick spacing {tick_spacing}"
        );

        let min_word = MIN_TICK / tick_spacing / WORD_SIZE;
        let max_word = MAX_TICK / tick_spacing / WORD_SIZE;
        let lens_calls: Vec<ITickLens::getPopulatedTicksInWordCall> = (min_word..=max_word)
            .filter_map(|w| i16::try_from(w).ok())
            .map(|w| ITickLens::getPopulatedTicksInWordCall {
                pool: self.pool_address,
                tickBitmapIndex: w,
            })
            .collect();

        let words = self
            .multicall
            .call_batch_chunked(self.tick_lens_address, &lens_calls, LENS_CHUNK)
            .await
            .context("tick lens traversal failed")?;

        let mut snapshot = Snapshot::new(Protocol::PancakeV3, self.pool_address, tick_spacing);
        snapshot.price_state = PriceState {
            sqrt_price_x96: Some(U256::from(slot0.sqrtPriceX96)),
            tick: Some(slot0.tick.as_i32()),
        };

        for populated in words {
            for tick_info in populated {
                if tick_info.liquidityGross == 0 {
                    continue;
                }
                let tick = tick_info.tick.as_i32();
                if !(MIN_TICK..=MAX_TICK).contains(&tick) {
                    continue;
                }
                snapshot.ticks.insert(
                    tick,
                    TickBucket {
                        lower_tick: tick,
                        upper_tick: tick + tick_spacing,
                        liquidity: i128::try_from(tick_info.liquidityGross).unwrap_or(i128::MAX),
                        liquidity_net: Some(tick_info.liquidityNet),
                        price_lower: tick_to_price(
                            tick,
                            self.token0_decimals,
                            self.token1_decimals,
                        ),
                        price_upper: tick_to_price(
                            tick + tick_spacing,
                            self.token0_decimals,
                            self.token1_decimals,
                        ),
                    },
                );
            }
        }

        info!(
            ticks = snapshot.ticks.len(),
            spacing = tick_spacing,
            "pancake v3 snapshot materialized"
        );
        Ok(snapshot)
    }

    fn log_filter(&self) -> LogFilter {
        LogFilter {
            address: self.pool_address,
            topics: vec![
                IUniswapV3Pool::Mint::SIGNATURE_HASH,
                IUniswapV3Pool::Burn::SIGNATURE_HASH,
            ],
        }
    }

    fn decode_log(&self, log: &RawLog) -> Option<LiquidityDeltaEvent> {
        decode_mint_burn(log)
    }
}
