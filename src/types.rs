use std::collections::HashMap;

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Tick index domain shared by the V3 family of pools.
pub const MIN_TICK: i32 = -887_272;
pub const MAX_TICK: i32 = 887_272;

/// Protocol variants the auditor can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    UniswapV3,
    UniswapV4,
    PancakeV3,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::UniswapV3 => "uniswap_v3",
            Protocol::UniswapV4 => "uniswap_v4",
            Protocol::PancakeV3 => "pancake_v3",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uniswap_v3" => Some(Protocol::UniswapV3),
            "uniswap_v4" => Some(Protocol::UniswapV4),
            "pancake_v3" => Some(Protocol::PancakeV3),
            _ => None,
        }
    }
}

/// One initialized tick range `[lower_tick, lower_tick + spacing)` on the pool.
///
/// `liquidity` is signed because delta application may transiently push a
/// bucket through zero before the matching event arrives.
#[derive(Debug, Clone)]
pub struct TickBucket {
    pub lower_tick: i32,
    pub upper_tick: i32,
    pub liquidity: i128,
    pub liquidity_net: Option<i128>,
    pub price_lower: f64,
    pub price_upper: f64,
}

impl TickBucket {
    #[inline]
    pub fn width(&self) -> i32 {
        self.upper_tick - self.lower_tick
    }
}

/// Pool price pair read from slot0 (or the V4 manager).
///
/// Both fields are absent until the first snapshot read completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceState {
    pub sqrt_price_x96: Option<U256>,
    pub tick: Option<i32>,
}

/// Authoritative tick map plus price state for one pool.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub ticks: HashMap<i32, TickBucket>,
    pub price_state: PriceState,
    pub protocol: Protocol,
    pub pool_address: Address,
    pub tick_spacing: i32,
}

impl Snapshot {
    pub fn new(protocol: Protocol, pool_address: Address, tick_spacing: i32) -> Self {
        Self {
            ticks: HashMap::new(),
            price_state: PriceState::default(),
            protocol,
            pool_address,
            tick_spacing,
        }
    }
}

/// Kind of on-chain liquidity change a stream record decoded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Mint,
    Burn,
    ModifyLiquidity,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Mint => "Mint",
            EventKind::Burn => "Burn",
            EventKind::ModifyLiquidity => "ModifyLiquidity",
        }
    }
}

/// A decoded liquidity change over a tick range.
///
/// `liquidity_delta` is positive for Mint-like events and negative for Burns.
#[derive(Debug, Clone)]
pub struct LiquidityDeltaEvent {
    pub tx_hash: B256,
    pub lower_tick: i32,
    pub upper_tick: i32,
    pub liquidity_delta: i128,
    pub block_number: u64,
    pub timestamp: i64,
    pub kind: EventKind,
}

/// Price window derived at query time from the pool's current price.
///
/// 21 buckets of width `step` spanning roughly ±20% around the price.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveScale {
    pub current_price: f64,
    pub step: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// One row of the buy-wall view.
///
/// `depth` is raw pool liquidity units summed into the bucket, not quote-token
/// units; the renderer labels it as such.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedDepth {
    pub bucket_label: String,
    pub depth: f64,
}
