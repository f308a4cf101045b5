//! End-to-end checks over the decode → apply → aggregate path using
//! synthesized log records, no network involved.

use std::sync::Arc;

use alloy_primitives::aliases::I24;
use alloy_primitives::{Address, B256, I256, U256};
use alloy_sol_types::SolEvent;

use tickwall::protocols::abi::{IPoolManager, IUniswapV3Pool};
use tickwall::protocols::uniswap_v3::UniswapV3Adapter;
use tickwall::protocols::uniswap_v4::UniswapV4Adapter;
use tickwall::protocols::ProtocolAdapter;
use tickwall::rpc::{Multicall, RawLog, RpcClient};
use tickwall::state::LiquidityStateMachine;
use tickwall::types::{EventKind, PriceState, Protocol, Snapshot};

fn multicall() -> Multicall {
    let rpc = RpcClient::new("http://localhost:8545".to_string()).unwrap();
    Multicall::new(rpc, Address::repeat_byte(0xca))
}

fn v3_adapter() -> UniswapV3Adapter {
    UniswapV3Adapter::new(multicall(), Address::repeat_byte(0x01), 18, 18)
}

fn v4_adapter(pool_id: B256) -> UniswapV4Adapter {
    UniswapV4Adapter::new(multicall(), Address::repeat_byte(0x02), pool_id)
}

fn raw_log_from<E: SolEvent>(event: &E, block: u64) -> RawLog {
    let log_data = event.encode_log_data();
    RawLog {
        topics: log_data.topics().to_vec(),
        data: format!("0x{}", hex::encode(log_data.data.as_ref())),
        block_number: Some(format!("0x{block:x}")),
        transaction_hash: Some(B256::repeat_byte(0x77)),
    }
}

fn mint_log(lower: i32, upper: i32, amount: u128, block: u64) -> RawLog {
    let event = IUniswapV3Pool::Mint {
        sender: Address::repeat_byte(0x11),
        owner: Address::repeat_byte(0x22),
        tickLower: I24::try_from(lower).unwrap(),
        tickUpper: I24::try_from(upper).unwrap(),
        amount,
        amount0: U256::ZERO,
        amount1: U256::ZERO,
    };
    raw_log_from(&event, block)
}

fn burn_log(lower: i32, upper: i32, amount: u128, block: u64) -> RawLog {
    let event = IUniswapV3Pool::Burn {
        owner: Address::repeat_byte(0x22),
        tickLower: I24::try_from(lower).unwrap(),
        tickUpper: I24::try_from(upper).unwrap(),
        amount,
        amount0: U256::ZERO,
        amount1: U256::ZERO,
    };
    raw_log_from(&event, block)
}

fn modify_liquidity_log(pool_id: B256, lower: i32, upper: i32, delta: i128, block: u64) -> RawLog {
    let event = IPoolManager::ModifyLiquidity {
        params: IPoolManager::ModifyLiquidityParams {
            poolId: pool_id,
            sender: Address::repeat_byte(0x33),
            tickLower: I24::try_from(lower).unwrap(),
            tickUpper: I24::try_from(upper).unwrap(),
            liquidityDelta: I256::try_from(delta).unwrap(),
            salt: I256::ZERO,
        },
    };
    raw_log_from(&event, block)
}

#[test]
fn v3_mint_and_burn_logs_decode_to_signed_deltas() {
    let adapter = v3_adapter();

    let mint = adapter.decode_log(&mint_log(-60, 60, 1_000_000, 42)).unwrap();
    assert_eq!(mint.kind, EventKind::Mint);
    assert_eq!(mint.lower_tick, -60);
    assert_eq!(mint.upper_tick, 60);
    assert_eq!(mint.liquidity_delta, 1_000_000);
    assert_eq!(mint.block_number, 42);

    let burn = adapter.decode_log(&burn_log(-60, 60, 400_000, 43)).unwrap();
    assert_eq!(burn.kind, EventKind::Burn);
    assert_eq!(burn.liquidity_delta, -400_000);
}

#[test]
fn malformed_logs_are_dropped() {
    let adapter = v3_adapter();

    // No topics at all.
    let no_topics = RawLog {
        topics: Vec::new(),
        data: "0x".to_string(),
        block_number: None,
        transaction_hash: None,
    };
    assert!(adapter.decode_log(&no_topics).is_none());

    // Right topic, garbage body.
    let mut truncated = mint_log(0, 60, 1, 1);
    truncated.data = "0x0011".to_string();
    assert!(adapter.decode_log(&truncated).is_none());

    // Right topic, body that is not even hex.
    let mut not_hex = mint_log(0, 60, 1, 1);
    not_hex.data = "0xzzzz".to_string();
    assert!(adapter.decode_log(&not_hex).is_none());

    // Unrelated topic.
    let mut unrelated = mint_log(0, 60, 1, 1);
    unrelated.topics[0] = B256::repeat_byte(0x9f);
    assert!(adapter.decode_log(&unrelated).is_none());
}

#[test]
fn v4_events_for_other_pools_are_discarded() {
    let ours = B256::repeat_byte(0xaa);
    let theirs = B256::repeat_byte(0xbb);
    let adapter = v4_adapter(ours);

    let matching = adapter
        .decode_log(&modify_liquidity_log(ours, -120, 120, 5_000, 9))
        .unwrap();
    assert_eq!(matching.kind, EventKind::ModifyLiquidity);
    assert_eq!(matching.liquidity_delta, 5_000);

    assert!(adapter
        .decode_log(&modify_liquidity_log(theirs, -120, 120, 5_000, 9))
        .is_none());
}

#[test]
fn v4_negative_deltas_survive_the_int256_round_trip() {
    let pool_id = B256::repeat_byte(0xaa);
    let adapter = v4_adapter(pool_id);

    let event = adapter
        .decode_log(&modify_liquidity_log(pool_id, 0, 60, -777, 1))
        .unwrap();
    assert_eq!(event.liquidity_delta, -777);
}

#[test]
fn decoded_stream_drives_the_state_machine() {
    let adapter = v3_adapter();
    let state = Arc::new(LiquidityStateMachine::new(
        Snapshot::new(Protocol::UniswapV3, Address::repeat_byte(0x01), 60),
        18,
        18,
    ));
    state.update_price(PriceState {
        sqrt_price_x96: None,
        tick: Some(0),
    });

    // Mint below the current price, partially burn it, add noise the decoder
    // must reject.
    let logs = vec![
        mint_log(-1200, -1140, 900_000, 1),
        mint_log(-1200, -1140, 100_000, 2),
        burn_log(-1200, -1140, 250_000, 3),
        mint_log(-600, -540, 300_000, 4),
        RawLog {
            topics: Vec::new(),
            data: "0x".into(),
            block_number: None,
            transaction_hash: None,
        },
    ];

    let mut applied = 0;
    for log in &logs {
        if let Some(event) = adapter.decode_log(log) {
            state.apply_event(&event);
            applied += 1;
        }
    }
    assert_eq!(applied, 4);
    assert_eq!(state.bucket_count(), 2);

    let rows = state.buy_wall_depth();
    assert_eq!(rows.len(), 2);
    let total: f64 = rows.iter().map(|r| r.depth).sum();
    // 900k + 100k - 250k + 300k, all below price 1.0.
    assert!((total - 1_050_000.0).abs() < 1e-3);

    // Ascending numeric order of bucket labels.
    let prices: Vec<f64> = rows
        .iter()
        .map(|r| r.bucket_label.parse::<f64>().unwrap())
        .collect();
    assert!(prices[0] < prices[1]);
}
