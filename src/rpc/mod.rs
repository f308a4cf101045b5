pub mod client;
pub mod log_stream;
pub mod multicall;

pub use client::RpcClient;
pub use log_stream::{LogFilter, LogStream, RawLog};
pub use multicall::{Call, Multicall};
