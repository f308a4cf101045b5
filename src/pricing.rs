//! Tick and sqrt-price conversions for display.
//!
//! Double precision is fine here: these values feed the depth view only,
//! never on-chain math. Extreme ticks map to astronomically large or
//! vanishing prices (infinity/zero past f64 range); the depth aggregator
//! discards buckets that far outside the adaptive window.

use alloy_primitives::U256;

/// Price of one tick with decimal correction: `1.0001^tick * 10^(d0 - d1)`.
pub fn tick_to_price(tick: i32, token0_decimals: u8, token1_decimals: u8) -> f64 {
    let decimal_correction = 10f64.powi(token0_decimals as i32 - token1_decimals as i32);
    1.0001f64.powi(tick) * decimal_correction
}

/// Human-readable price from a Q64.96 sqrt price.
pub fn sqrt_price_x96_to_price(sqrt_price_x96: U256, token0_decimals: u8, token1_decimals: u8) -> f64 {
    // f64 via string to avoid picking limbs apart; precision loss is acceptable
    // for a display value.
    let as_f64: f64 = sqrt_price_x96.to_string().parse().unwrap_or(0.0);
    let sqrt_price = as_f64 / 2f64.powi(96);
    sqrt_price * sqrt_price * 10f64.powi(token0_decimals as i32 - token1_decimals as i32)
}
