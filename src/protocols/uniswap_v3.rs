//! Uniswap V3 adapter: snapshot via tick-bitmap traversal.
//!
//! The tick domain compressed by the pool's spacing packs 256 ticks per
//! bitmap word, so the initialized set is discovered by batch-reading whole
//! words and expanding set bits instead of probing every tick.

use alloy_primitives::{Address, U256};
use alloy_primitives::aliases::I24;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::pricing::tick_to_price;
use crate::rpc::{Call, LogFilter, Multicall, RawLog};
use crate::types::{LiquidityDeltaEvent, PriceState, Protocol, Snapshot, TickBucket, MAX_TICK, MIN_TICK};

use super::abi::IUniswapV3Pool;
use super::{decode_mint_burn, ProtocolAdapter};
use alloy_sol_types::{SolCall, SolEvent};

const WORD_SIZE: i32 = 256;
/// Bitmap words are cheap reads; pack many into one aggregate.
const BITMAP_CHUNK: usize = 200;
/// `ticks()` returns eight fields; keep the chunk under the gas cap.
const TICK_CHUNK: usize = 120;

pub struct UniswapV3Adapter {
    multicall: Multicall,
    pool_address: Address,
    token0_decimals: u8,
    token1_decimals: u8,
}

impl UniswapV3Adapter {
    pub fn new(
        multicall: Multicall,
        pool_address: Address,
        token0_decimals: u8,
        token1_decimals: u8,
    ) -> Self {
        Self {
            multicall,
            pool_address,
            token0_decimals,
            token1_decimals,
        }
    }

    async fn read_price_and_spacing(&self) -> Result<(PriceState, i32)> {
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
        let spacing = IUniswapV3Pool::tickSpacingCall::abi_decode_returns(&outcome.return_data[1])
            .context("failed to decode tickSpacing")?
            .as_i32();
        anyhow::ensure!(spacing > 0, "pool reports non-positive tick spacing {spacing}");

        let price_state = PriceState {
            sqrt_price_x96: Some(U256::from(slot0.sqrtPriceX96)),
            tick: Some(slot0.tick.as_i32()),
        };
        Ok((price_state, spacing))
    }

    /// Walk the compressed-tick bitmap and expand every set bit back into a
    /// tick index. Words outside the valid range and zero words cost nothing.
    async fn collect_initialized_ticks(&self, tick_spacing: i32) -> Result<Vec<i32>> {
        let min_word = MIN_TICK / tick_spacing / WORD_SIZE;
        let max_word = MAX_TICK / tick_spacing / WORD_SIZE;

        let mut word_indices: Vec<i16> = Vec::new();
        for word in min_word..=max_word {
            if let Ok(w) = i16::try_from(word) {
                word_indices.push(w);
            }
        }

        let calls: Vec<IUniswapV3Pool::tickBitmapCall> = word_indices
            .iter()
            .map(|&w| IUniswapV3Pool::tickBitmapCall { wordPosition: w })
            .collect();
        let bitmaps = self
            .multicall
            .call_batch_chunked(self.pool_address, &calls, BITMAP_CHUNK)
            .await
            .context("tick bitmap traversal failed")?;

        let mut ticks = Vec::new();
        for (&word, bitmap) in word_indices.iter().zip(bitmaps) {
            ticks.extend(ticks_in_word(word, bitmap, tick_spacing));
        }

        debug!(count = ticks.len(), "bitmap traversal complete");
        Ok(ticks)
    }
}

#[async_trait]
impl ProtocolAdapter for UniswapV3Adapter {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let (price_state, tick_spacing) = self.read_price_and_spacing().await?;
        let initialized = self.collect_initialized_ticks(tick_spacing).await?;

        let mut aligned: Vec<(i32, IUniswapV3Pool::ticksCall)> = Vec::with_capacity(initialized.len());
        for tick in initialized {
            if let Ok(t) = I24::try_from(tick) {
                aligned.push((tick, IUniswapV3Pool::ticksCall { tick: t }));
            }
        }
        let calls: Vec<IUniswapV3Pool::ticksCall> =
            aligned.iter().map(|(_, c)| c.clone()).collect();
        let records = self
            .multicall
            .call_batch_chunked(self.pool_address, &calls, TICK_CHUNK)
            .await
            .context("tick record fetch failed")?;

        let mut snapshot = Snapshot::new(Protocol::UniswapV3, self.pool_address, tick_spacing);
        snapshot.price_state = price_state;

        for ((tick, _), record) in aligned.into_iter().zip(records) {
            if record.liquidityGross == 0 || !record.initialized {
                continue;
            }
            let liquidity = i128::try_from(record.liquidityGross).unwrap_or(i128::MAX);
            snapshot.ticks.insert(
                tick,
                TickBucket {
                    lower_tick: tick,
                    upper_tick: tick + tick_spacing,
                    liquidity,
                    liquidity_net: Some(record.liquidityNet),
                    price_lower: tick_to_price(tick, self.token0_decimals, self.token1_decimals),
                    price_upper: tick_to_price(
                        tick + tick_spacing,
                        self.token0_decimals,
                        self.token1_decimals,
                    ),
                },
            );
        }

        info!(
            ticks = snapshot.ticks.len(),
            spacing = tick_spacing,
            "uniswap v3 snapshot materialized"
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

/// Expand one bitmap word into tick values, shared with tests.
pub fn ticks_in_word(word: i16, bitmap: U256, tick_spacing: i32) -> Vec<i32> {
    let mut out = Vec::new();
    if bitmap.is_zero() {
        return out;
    }
    for bit in 0..WORD_SIZE {
        if bitmap.bit(bit as usize) {
            let tick = (word as i32 * WORD_SIZE + bit) * tick_spacing;
            if (MIN_TICK..=MAX_TICK).contains(&tick) {
                out.push(tick);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_zero_low_bits_map_to_spaced_ticks() {
        // bits 0 and 2 set => compressed ticks {0, 2} => ticks {0, 120}.
        let ticks = ticks_in_word(0, U256::from(0b101u8), 60);
        assert_eq!(ticks, vec![0, 120]);
    }

    #[test]
    fn zero_word_yields_nothing() {
        assert!(ticks_in_word(12, U256::ZERO, 60).is_empty());
    }

    #[test]
    fn negative_word_produces_negative_ticks() {
        // Word -1, bit 255 is the tick right below zero.
        let bitmap = U256::from(1u8) << 255;
        let ticks = ticks_in_word(-1, bitmap, 60);
        assert_eq!(ticks, vec![-60]);
    }

    #[test]
    fn out_of_range_expansion_is_skipped() {
        // With spacing 1, word 3465 straddles MAX_TICK: compressed ticks
        // 887040..=887295, only 887040..=887272 are valid.
        let ticks = ticks_in_word(3465, U256::MAX, 1);
        assert_eq!(ticks.len(), 233);
        assert_eq!(*ticks.last().unwrap(), MAX_TICK);
        assert!(ticks.iter().all(|&t| t <= MAX_TICK));
    }

    #[test]
    fn every_set_bit_appears_exactly_once() {
        let mut bitmap = U256::ZERO;
        for bit in [0usize, 1, 17, 200, 255] {
            bitmap |= U256::from(1u8) << bit;
        }
        let ticks = ticks_in_word(0, bitmap, 10);
        assert_eq!(ticks, vec![0, 10, 170, 2000, 2550]);
    }
}
