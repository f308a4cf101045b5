//! Application configuration: TOML file layered under environment overrides.
//!
//! Required fields (pool address, multicall address) fail fast at startup
//! with a descriptive message; everything else has defaults.

use std::path::Path;

use alloy_primitives::{Address, B256};
use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::types::Protocol;

/// Chain endpoints and the aggregate-call contract.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_url: String,
    pub wss_url: String,
    pub multicall_address: Address,
}

/// Target pool and its display parameters.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub pool_address: Address,
    pub protocol: Protocol,
    pub pool_id: Option<B256>,
    pub fee: u32,
    pub token0_decimals: u8,
    pub token1_decimals: u8,
    pub tick_lens_address: Option<Address>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub chain: ChainConfig,
    pub pool: PoolConfig,
}

/// Raw TOML shape; every field optional so env vars can fill the gaps.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    chain: FileChain,
    #[serde(default)]
    pool: FilePool,
}

#[derive(Debug, Default, Deserialize)]
struct FileChain {
    name: Option<String>,
    rpc_url: Option<String>,
    wss_url: Option<String>,
    multicall_address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FilePool {
    pool_address: Option<String>,
    protocol: Option<String>,
    pool_id: Option<String>,
    fee: Option<u32>,
    token0_decimals: Option<u8>,
    token1_decimals: Option<u8>,
    tick_lens_address: Option<String>,
}

fn env_or(key: &str, fallback: Option<String>) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty()).or(fallback)
}

fn parse_address(value: &str, what: &str) -> Result<Address> {
    value
        .parse::<Address>()
        .with_context(|| format!("{what} is not a valid address: {value}"))
}

impl AppConfig {
    /// Load from `CONFIG_PATH` (default `tickwall.toml`, missing file is fine)
    /// with environment variables taking precedence per field.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "tickwall.toml".to_string());
        let file = Self::read_file(Path::new(&path))?;
        Self::from_parts(file)
    }

    fn read_file(path: &Path) -> Result<FileConfig> {
        if !path.exists() {
            return Ok(FileConfig::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    fn from_parts(file: FileConfig) -> Result<Self> {
        let name = env_or("CHAIN_NAME", file.chain.name).unwrap_or_else(|| "bsc".to_string());
        let rpc_url = env_or("RPC_URL", file.chain.rpc_url)
            .unwrap_or_else(|| "https://bsc-dataseed.binance.org".to_string());
        let wss_url = env_or("WSS_URL", file.chain.wss_url)
            .unwrap_or_else(|| "wss://bsc-ws-node.nariox.org:443".to_string());

        let multicall_address = env_or("MULTICALL_ADDRESS", file.chain.multicall_address)
            .context("MULTICALL_ADDRESS must be provided via environment or config file")?;
        let multicall_address = parse_address(&multicall_address, "MULTICALL_ADDRESS")?;

        let pool_address = env_or("POOL_ADDRESS", file.pool.pool_address)
            .context("POOL_ADDRESS must be provided via environment or config file")?;
        let pool_address = parse_address(&pool_address, "POOL_ADDRESS")?;

        let protocol_raw = env_or("POOL_PROTOCOL", file.pool.protocol)
            .unwrap_or_else(|| "pancake_v3".to_string());
        let Some(protocol) = Protocol::parse(&protocol_raw) else {
            bail!(
                "POOL_PROTOCOL must be one of uniswap_v3, uniswap_v4, pancake_v3 (got {protocol_raw})"
            );
        };

        let pool_id = match env_or("POOL_ID", file.pool.pool_id) {
            Some(raw) => Some(
                raw.parse::<B256>()
                    .with_context(|| format!("POOL_ID is not 32-byte hex: {raw}"))?,
            ),
            None => None,
        };
        if protocol == Protocol::UniswapV4 && pool_id.is_none() {
            bail!("POOL_ID is required for uniswap_v4 pools");
        }

        let tick_lens_address = match env_or("TICK_LENS_ADDRESS", file.pool.tick_lens_address) {
            Some(raw) => Some(parse_address(&raw, "TICK_LENS_ADDRESS")?),
            None => None,
        };
        if protocol == Protocol::PancakeV3 && tick_lens_address.is_none() {
            bail!("TICK_LENS_ADDRESS is required for pancake_v3 pools");
        }

        let fee = env_or("POOL_FEE", None)
            .and_then(|v| v.parse().ok())
            .or(file.pool.fee)
            .unwrap_or(500);
        let token0_decimals = env_or("TOKEN0_DECIMALS", None)
            .and_then(|v| v.parse().ok())
            .or(file.pool.token0_decimals)
            .unwrap_or(18);
        let token1_decimals = env_or("TOKEN1_DECIMALS", None)
            .and_then(|v| v.parse().ok())
            .or(file.pool.token1_decimals)
            .unwrap_or(18);

        Ok(Self {
            chain: ChainConfig {
                name,
                rpc_url,
                wss_url,
                multicall_address,
            },
            pool: PoolConfig {
                pool_address,
                protocol,
                pool_id,
                fee,
                token0_decimals,
                token1_decimals,
                tick_lens_address,
            },
        })
    }
}
