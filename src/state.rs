//! Liquidity state machine: single writer over the snapshot, concurrent
//! readers of the derived depth views.
//!
//! Every operation takes the one snapshot lock for its whole duration.
//! Events arrive at block cadence and reads at ~1 Hz, so contention is not
//! a concern; correctness of the map under interleaving is.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::warn;

use crate::pricing::tick_to_price;
use crate::types::{
    AdaptiveScale, AggregatedDepth, LiquidityDeltaEvent, PriceState, Snapshot, TickBucket,
    MAX_TICK, MIN_TICK,
};

/// Fraction of the current price one depth bucket spans.
const SCALE_STEP_FRACTION: f64 = 0.02;
const SCALE_STEP_FLOOR: f64 = 1e-8;
/// Buckets on each side of the current price.
const SCALE_HALF_SPAN: f64 = 10.0;

pub struct LiquidityStateMachine {
    snapshot: Mutex<Snapshot>,
    token0_decimals: u8,
    token1_decimals: u8,
}

impl LiquidityStateMachine {
    pub fn new(snapshot: Snapshot, token0_decimals: u8, token1_decimals: u8) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            token0_decimals,
            token1_decimals,
        }
    }

    /// Fold one delta event into the tick map.
    ///
    /// Buckets are created lazily on the first event touching an absent
    /// range, keyed at the event's lower tick with the pool's spacing as
    /// width; ranges spanning several spacing intervals are not split.
    /// Events violating the bucket invariants are rejected and logged.
    pub fn apply_event(&self, event: &LiquidityDeltaEvent) {
        let mut snapshot = self.snapshot.lock();
        let tick_spacing = snapshot.tick_spacing;

        if tick_spacing <= 0 {
            warn!(
                spacing = tick_spacing,
                "rejecting event: snapshot has invalid tick spacing"
            );
            return;
        }
        if !(MIN_TICK..=MAX_TICK).contains(&event.lower_tick)
            || event.lower_tick % tick_spacing != 0
        {
            warn!(
                lower_tick = event.lower_tick,
                spacing = tick_spacing,
                tx = %event.tx_hash,
                "rejecting event: lower tick outside domain or misaligned"
            );
            return;
        }

        let bucket = snapshot
            .ticks
            .entry(event.lower_tick)
            .or_insert_with(|| TickBucket {
                lower_tick: event.lower_tick,
                upper_tick: event.lower_tick + tick_spacing,
                liquidity: 0,
                liquidity_net: None,
                price_lower: tick_to_price(
                    event.lower_tick,
                    self.token0_decimals,
                    self.token1_decimals,
                ),
                price_upper: tick_to_price(
                    event.lower_tick + tick_spacing,
                    self.token0_decimals,
                    self.token1_decimals,
                ),
            });
        bucket.liquidity = bucket.liquidity.saturating_add(event.liquidity_delta);
    }

    /// Replace the pool price pair.
    pub fn update_price(&self, price_state: PriceState) {
        self.snapshot.lock().price_state = price_state;
    }

    /// Current display price, 0.0 until the first snapshot read lands.
    pub fn latest_price(&self) -> f64 {
        let snapshot = self.snapshot.lock();
        self.current_price_of(&snapshot)
    }

    /// Price window around the current price: 21 buckets of width
    /// `max(price * 2%, 1e-8)` spanning roughly ±20%.
    pub fn adaptive_scale(&self) -> AdaptiveScale {
        let snapshot = self.snapshot.lock();
        self.scale_of(&snapshot)
    }

    /// Demand-side cumulative liquidity below the current price, aggregated
    /// into adaptive price buckets, ascending by bucket price.
    ///
    /// Depth is raw liquidity units; no conversion into quote-token units
    /// is attempted here.
    pub fn buy_wall_depth(&self) -> Vec<AggregatedDepth> {
        let snapshot = self.snapshot.lock();
        let scale = self.scale_of(&snapshot);
        let price = scale.current_price;

        // Keyed by bucket index so rows come out numerically ordered without
        // re-parsing labels.
        let mut buckets: BTreeMap<i64, f64> = BTreeMap::new();

        for bucket in snapshot.ticks.values() {
            if bucket.liquidity <= 0 {
                continue;
            }
            let price_lower =
                tick_to_price(bucket.lower_tick, self.token0_decimals, self.token1_decimals);
            let price_upper =
                tick_to_price(bucket.upper_tick, self.token0_decimals, self.token1_decimals);

            let is_below = price_upper < price;
            let straddles = price_lower <= price && price <= price_upper;
            if !is_below && !straddles {
                continue;
            }

            let liquidity = bucket.liquidity as f64;
            let contribution = if straddles {
                let span = price_upper - price_lower;
                if span > 0.0 {
                    liquidity * (price - price_lower).max(0.0) / span
                } else {
                    liquidity
                }
            } else {
                liquidity
            };

            let index = ((price_upper - scale.min_price) / scale.step).floor() as i64;
            *buckets.entry(index).or_insert(0.0) += contribution;
        }

        buckets
            .into_iter()
            .map(|(index, depth)| AggregatedDepth {
                bucket_label: format_bucket_price(scale.min_price + index as f64 * scale.step),
                depth,
            })
            .collect()
    }

    /// Number of tracked buckets, for the renderer header.
    pub fn bucket_count(&self) -> usize {
        self.snapshot.lock().ticks.len()
    }

    fn current_price_of(&self, snapshot: &Snapshot) -> f64 {
        match snapshot.price_state.tick {
            Some(tick) => tick_to_price(tick, self.token0_decimals, self.token1_decimals),
            None => 0.0,
        }
    }

    fn scale_of(&self, snapshot: &Snapshot) -> AdaptiveScale {
        let mut price = self.current_price_of(snapshot);
        if price <= 0.0 {
            price = 1.0;
        }
        let step = (price * SCALE_STEP_FRACTION).max(SCALE_STEP_FLOOR);
        AdaptiveScale {
            current_price: price,
            step,
            min_price: (price - step * SCALE_HALF_SPAN).max(step),
            max_price: price + step * SCALE_HALF_SPAN,
        }
    }
}

fn format_bucket_price(price: f64) -> String {
    format!("{price:.6}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventKind, Protocol, Snapshot};
    use alloy_primitives::{Address, B256};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;

    fn fresh_state(tick_spacing: i32) -> LiquidityStateMachine {
        let snapshot = Snapshot::new(Protocol::UniswapV3, Address::ZERO, tick_spacing);
        LiquidityStateMachine::new(snapshot, 18, 18)
    }

    fn event(lower: i32, upper: i32, delta: i128) -> LiquidityDeltaEvent {
        LiquidityDeltaEvent {
            tx_hash: B256::ZERO,
            lower_tick: lower,
            upper_tick: upper,
            liquidity_delta: delta,
            block_number: 1,
            timestamp: 0,
            kind: if delta >= 0 { EventKind::Mint } else { EventKind::Burn },
        }
    }

    fn set_tick(state: &LiquidityStateMachine, tick: i32) {
        state.update_price(PriceState {
            sqrt_price_x96: None,
            tick: Some(tick),
        });
    }

    #[test]
    fn mint_creates_bucket_with_spacing_width() {
        let state = fresh_state(60);
        state.apply_event(&event(-60, 60, 1_000_000));

        let snapshot = state.snapshot.lock();
        let bucket = snapshot.ticks.get(&-60).expect("bucket created");
        assert_eq!(bucket.liquidity, 1_000_000);
        // Bucket width is the pool spacing, not the event's range.
        assert_eq!(bucket.upper_tick, 0);
    }

    #[test]
    fn mint_then_equal_burn_restores_liquidity() {
        let state = fresh_state(10);
        state.apply_event(&event(100, 110, 42_000));
        state.apply_event(&event(100, 110, -42_000));

        let snapshot = state.snapshot.lock();
        assert_eq!(snapshot.ticks.get(&100).unwrap().liquidity, 0);
    }

    #[test]
    fn new_buckets_start_from_zero_even_for_burns() {
        let state = fresh_state(60);
        // A burn on an absent range creates the bucket at zero and then
        // applies the delta; the initial value is never negative.
        state.apply_event(&event(-120, -60, -500));
        {
            let snapshot = state.snapshot.lock();
            assert_eq!(snapshot.ticks.get(&-120).unwrap().liquidity, -500);
        }
        state.apply_event(&event(-120, -60, 500));
        let snapshot = state.snapshot.lock();
        assert_eq!(snapshot.ticks.get(&-120).unwrap().liquidity, 0);
    }

    #[test]
    fn concurrent_writers_and_readers_agree_on_totals() {
        let state = std::sync::Arc::new(fresh_state(60));

        let mut handles = Vec::new();
        for worker in 0..4 {
            let state = std::sync::Arc::clone(&state);
            handles.push(std::thread::spawn(move || {
                for i in 0..250 {
                    let lower = ((worker * 250 + i) % 50) * 60;
                    state.apply_event(&event(lower, lower + 60, 10));
                    // Interleave reads; they must never observe a torn map.
                    let _ = state.buy_wall_depth();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = state.snapshot.lock();
        let total: i128 = snapshot.ticks.values().map(|b| b.liquidity).sum();
        assert_eq!(total, 4 * 250 * 10);
    }

    #[test]
    fn misaligned_or_out_of_range_events_are_rejected() {
        let state = fresh_state(60);
        state.apply_event(&event(-50, 10, 1)); // misaligned
        state.apply_event(&event(887_280, 887_340, 1)); // past MAX_TICK
        state.apply_event(&event(-900_000, -899_940, 1)); // below MIN_TICK

        assert_eq!(state.bucket_count(), 0);
    }

    #[test]
    fn per_bucket_liquidity_is_sum_of_matching_deltas() {
        let state = fresh_state(60);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut expected: HashMap<i32, i128> = HashMap::new();

        for _ in 0..500 {
            let lower = rng.gen_range(-200..=200) * 60;
            let delta = rng.gen_range(-1_000_000i128..=1_000_000);
            state.apply_event(&event(lower, lower + 60, delta));
            *expected.entry(lower).or_insert(0) += delta;
        }

        let snapshot = state.snapshot.lock();
        for (lower, sum) in expected {
            assert_eq!(snapshot.ticks.get(&lower).unwrap().liquidity, sum, "tick {lower}");
        }
    }

    #[test]
    fn bucket_keys_match_lower_tick_and_spacing() {
        let state = fresh_state(60);
        for lower in [-600, -60, 0, 120] {
            state.apply_event(&event(lower, lower + 60, 5));
        }
        let snapshot = state.snapshot.lock();
        for (key, bucket) in &snapshot.ticks {
            assert_eq!(bucket.lower_tick, *key);
            assert_eq!(bucket.upper_tick - key, 60);
        }
    }

    #[test]
    fn adaptive_scale_matches_formula_at_parity() {
        let state = fresh_state(60);
        set_tick(&state, 0);

        let scale = state.adaptive_scale();
        assert!((scale.current_price - 1.0).abs() < 1e-12);
        assert!((scale.step - 0.02).abs() < 1e-12);
        assert!((scale.min_price - 0.8).abs() < 1e-12);
        assert!((scale.max_price - 1.2).abs() < 1e-12);
    }

    #[test]
    fn adaptive_scale_falls_back_to_unit_price() {
        let state = fresh_state(60);
        // No price read yet: latest_price reports zero, the scale falls
        // back to 1.0 so the window stays usable.
        assert_eq!(state.latest_price(), 0.0);
        let scale = state.adaptive_scale();
        assert_eq!(scale.current_price, 1.0);
        assert!(scale.min_price > 0.0);
    }

    /// Install a bucket with explicit ticks; price fields mirror the ticks.
    fn insert_bucket(state: &LiquidityStateMachine, lower: i32, upper: i32, liquidity: i128) {
        let mut snapshot = state.snapshot.lock();
        snapshot.ticks.insert(
            lower,
            TickBucket {
                lower_tick: lower,
                upper_tick: upper,
                liquidity,
                liquidity_net: None,
                price_lower: tick_to_price(lower, 18, 18),
                price_upper: tick_to_price(upper, 18, 18),
            },
        );
    }

    // Ticks whose prices land near round numbers: 1.0001^t.
    fn tick_for_price(price: f64) -> i32 {
        (price.ln() / 1.0001f64.ln()).round() as i32
    }

    #[test]
    fn fully_below_buckets_contribute_whole_liquidity() {
        let state = fresh_state(60);
        set_tick(&state, 0);

        // Both buckets entirely below price 1.0.
        insert_bucket(
            &state,
            tick_for_price(0.90),
            tick_for_price(0.92),
            500,
        );
        insert_bucket(
            &state,
            tick_for_price(0.94),
            tick_for_price(0.96),
            300,
        );

        let rows = state.buy_wall_depth();
        assert_eq!(rows.len(), 2);
        let total: f64 = rows.iter().map(|r| r.depth).sum();
        assert!((total - 800.0).abs() < 1e-6);
        // Lower-priced bucket sorts first.
        assert!((rows[0].depth - 500.0).abs() < 1e-6);
        assert!((rows[1].depth - 300.0).abs() < 1e-6);
    }

    #[test]
    fn straddling_bucket_contributes_pro_rata() {
        let state = fresh_state(60);
        set_tick(&state, 0);

        let lower = tick_for_price(0.99);
        let upper = tick_for_price(1.01);
        insert_bucket(&state, lower, upper, 1000);

        let rows = state.buy_wall_depth();
        assert_eq!(rows.len(), 1);

        let price_lower = tick_to_price(lower, 18, 18);
        let price_upper = tick_to_price(upper, 18, 18);
        let expected = 1000.0 * (1.0 - price_lower) / (price_upper - price_lower);
        assert!((rows[0].depth - expected).abs() < 1e-6);
        // Roughly half the bucket sits below the current price.
        assert!((rows[0].depth - 500.0).abs() < 25.0);
    }

    #[test]
    fn buckets_above_price_are_discarded() {
        let state = fresh_state(60);
        set_tick(&state, 0);

        insert_bucket(&state, tick_for_price(1.05), tick_for_price(1.07), 900);
        assert!(state.buy_wall_depth().is_empty());
    }

    #[test]
    fn depth_rows_sort_ascending_by_numeric_label() {
        let state = fresh_state(60);
        set_tick(&state, 0);

        for (lo, hi) in [(0.85, 0.87), (0.95, 0.97), (0.90, 0.92)] {
            insert_bucket(&state, tick_for_price(lo), tick_for_price(hi), 100);
        }

        let rows = state.buy_wall_depth();
        let prices: Vec<f64> = rows
            .iter()
            .map(|r| r.bucket_label.parse::<f64>().unwrap())
            .collect();
        for pair in prices.windows(2) {
            assert!(pair[0] < pair[1], "rows not ascending: {prices:?}");
        }
    }

    #[test]
    fn nonpositive_liquidity_buckets_are_ignored() {
        let state = fresh_state(60);
        set_tick(&state, 0);

        insert_bucket(&state, tick_for_price(0.90), tick_for_price(0.92), 0);
        insert_bucket(&state, tick_for_price(0.93), tick_for_price(0.95), -40);
        assert!(state.buy_wall_depth().is_empty());
    }

    #[test]
    fn update_price_moves_the_window() {
        let state = fresh_state(60);
        set_tick(&state, 0);
        let before = state.adaptive_scale();

        set_tick(&state, 6932); // ~2.0
        let after = state.adaptive_scale();
        assert!(after.current_price > before.current_price * 1.9);
        assert!(after.step > before.step);
    }
}
