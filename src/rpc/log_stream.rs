//! WebSocket log subscription stream.
//!
//! Opens `eth_subscribe(logs)` for one `(address, topic0 alternatives)`
//! filter and yields raw log records forever. Any I/O or decode failure
//! tears the connection down and re-subscribes after a 3 second back-off;
//! events emitted during the gap are lost.

use std::time::Duration;

use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(3);
const PING_INTERVAL: Duration = Duration::from_secs(20);
const SUBSCRIBE_REQUEST_ID: u64 = 1;

/// Single-pool log filter: contract address plus accepted topic0 values.
#[derive(Debug, Clone)]
pub struct LogFilter {
    pub address: Address,
    pub topics: Vec<B256>,
}

/// Raw log record as delivered by the node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
}

impl RawLog {
    /// Hex-quantity block number, 0 when absent or malformed.
    pub fn block_number_u64(&self) -> u64 {
        self.block_number
            .as_deref()
            .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
            .unwrap_or(0)
    }

    /// Decoded event body bytes, None when the data field is not valid hex.
    pub fn data_bytes(&self) -> Option<Vec<u8>> {
        hex::decode(self.data.trim_start_matches("0x")).ok()
    }
}

#[derive(Debug, Deserialize)]
struct SubscribeResponse {
    id: Option<u64>,
    result: Option<String>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Notification {
    method: Option<String>,
    params: Option<NotificationParams>,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    subscription: Option<String>,
    result: Option<serde_json::Value>,
}

/// Long-lived log subscription with automatic resubscribe.
pub struct LogStream {
    wss_url: String,
    filter: LogFilter,
}

impl LogStream {
    pub fn new(wss_url: String, filter: LogFilter) -> Self {
        Self { wss_url, filter }
    }

    /// Spawn the stream worker; the receiver yields raw logs indefinitely.
    pub fn spawn(self) -> mpsc::Receiver<RawLog> {
        let (tx, rx) = mpsc::channel(1024);
        tokio::spawn(async move {
            self.run(tx).await;
        });
        rx
    }

    async fn run(self, tx: mpsc::Sender<RawLog>) {
        loop {
            match self.connect_and_stream(&tx).await {
                Ok(()) => {
                    // Receiver dropped; nothing left to feed.
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "log subscription dropped, reconnecting");
                    sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    async fn connect_and_stream(&self, tx: &mpsc::Sender<RawLog>) -> Result<()> {
        info!(url = %self.wss_url, address = %self.filter.address, "connecting log subscription");

        let (ws_stream, resp) = connect_async(&self.wss_url)
            .await
            .context("websocket connect failed")?;
        debug!(status = %resp.status(), "log subscription websocket connected");

        let (mut write, mut read) = ws_stream.split();

        let topic_alternatives: Vec<String> = self
            .filter
            .topics
            .iter()
            .map(|t| format!("{t}"))
            .collect();
        let subscribe = serde_json::json!({
            "id": SUBSCRIBE_REQUEST_ID,
            "method": "eth_subscribe",
            "params": ["logs", {
                "address": format!("{}", self.filter.address),
                "topics": [topic_alternatives],
            }],
        });
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .context("failed to send eth_subscribe")?;

        let mut subscription_id: Option<String> = None;

        let mut ping = interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    write
                        .send(Message::Ping(Vec::new()))
                        .await
                        .context("failed to send keepalive ping")?;
                }
                msg = read.next() => {
                    let Some(msg) = msg else {
                        return Err(anyhow::anyhow!("websocket stream ended"));
                    };

                    match msg {
                        Ok(Message::Text(text)) => {
                            if self.handle_text(&text, &mut subscription_id, tx).await? {
                                // Receiver side is gone; exit cleanly.
                                return Ok(());
                            }
                        }
                        Ok(Message::Ping(payload)) => {
                            write.send(Message::Pong(payload)).await.ok();
                        }
                        Ok(Message::Close(frame)) => {
                            return Err(anyhow::anyhow!("websocket closed by server: {frame:?}"));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            return Err(anyhow::anyhow!("websocket error: {e}"));
                        }
                    }
                }
            }
        }
    }

    /// Returns Ok(true) when the consumer has gone away.
    async fn handle_text(
        &self,
        text: &str,
        subscription_id: &mut Option<String>,
        tx: &mpsc::Sender<RawLog>,
    ) -> Result<bool> {
        if subscription_id.is_none() {
            if let Ok(resp) = serde_json::from_str::<SubscribeResponse>(text) {
                if resp.id == Some(SUBSCRIBE_REQUEST_ID) {
                    if let Some(err) = resp.error {
                        return Err(anyhow::anyhow!("eth_subscribe rejected: {err:?}"));
                    }
                    if let Some(id) = resp.result {
                        info!(subscription = %id, "log subscription established");
                        *subscription_id = Some(id);
                        return Ok(false);
                    }
                }
            }
        }

        let Ok(note) = serde_json::from_str::<Notification>(text) else {
            return Ok(false);
        };
        if note.method.as_deref() != Some("eth_subscription") {
            return Ok(false);
        }
        let Some(params) = note.params else {
            return Ok(false);
        };
        let Some(expected) = subscription_id.as_deref() else {
            return Ok(false);
        };
        if params.subscription.as_deref() != Some(expected) {
            return Ok(false);
        }
        let Some(result) = params.result else {
            return Ok(false);
        };
        let Ok(log) = serde_json::from_value::<RawLog>(result) else {
            debug!("dropping undecodable log record");
            return Ok(false);
        };

        Ok(tx.send(log).await.is_err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_log_parses_node_payload() {
        let raw: RawLog = serde_json::from_str(
            r#"{
                "address": "0x0000000000000000000000000000000000000001",
                "topics": ["0x1111111111111111111111111111111111111111111111111111111111111111"],
                "data": "0x00ff",
                "blockNumber": "0x10",
                "transactionHash": "0x2222222222222222222222222222222222222222222222222222222222222222"
            }"#,
        )
        .unwrap();
        assert_eq!(raw.topics.len(), 1);
        assert_eq!(raw.block_number_u64(), 16);
        assert_eq!(raw.data_bytes().unwrap(), vec![0x00, 0xff]);
    }

    #[test]
    fn malformed_quantities_degrade_to_zero() {
        let raw = RawLog {
            topics: Vec::new(),
            data: "0xzz".to_string(),
            block_number: Some("0xnothex".to_string()),
            transaction_hash: None,
        };
        assert_eq!(raw.block_number_u64(), 0);
        assert!(raw.data_bytes().is_none());
    }
}
