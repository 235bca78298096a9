//! The live listener: one WebSocket connection, one `eth_subscribe` per
//! registered subscription, reconnect-and-reseat on connection loss.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, Instant};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};
use url::Url;

use crate::chain::ws::{self, WsStream};
use crate::live::types::ListenerOutput;
use crate::metrics;
use crate::shutdown::Shutdown;

const PING_INTERVAL: Duration = Duration::from_secs(25);
const PING_TIMEOUT: Duration = Duration::from_secs(120);
const RECONNECT_SLEEP: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
struct Subscription {
    contract_address: String,
    topic: String,
}

/// Owns the subscription list and drives the connection lifecycle.
/// Subscriptions must all be registered via [`Self::add_subscription`]
/// before [`Self::listen_forever`] is called. Cheap to clone — needed so
/// the pipeline's retry-on-failure task spawner can reconstruct a fresh
/// call to `listen_forever` on every retry attempt.
#[derive(Clone)]
pub struct Listener {
    node_wss_uri: Url,
    subscriptions: Vec<Subscription>,
}

impl Listener {
    pub fn new(node_wss_uri: Url) -> Self {
        Self {
            node_wss_uri,
            subscriptions: Vec::new(),
        }
    }

    /// Registers a subscription, returning its internal id. Ids are
    /// assigned `0, 1, 2, …` in call order and are stable across
    /// reconnects even though the node's own subscription id changes.
    pub fn add_subscription(
        &mut self,
        contract_address: impl Into<String>,
        topic: impl Into<String>,
    ) -> u64 {
        self.subscriptions.push(Subscription {
            contract_address: contract_address.into(),
            topic: topic.into(),
        });
        (self.subscriptions.len() - 1) as u64
    }

    /// Runs until shutdown is signalled. Connection-closed errors trigger a
    /// reconnect with subscription reseating; any other error is fatal.
    pub async fn listen_forever(
        &self,
        out: mpsc::Sender<ListenerOutput>,
        shutdown: Shutdown,
    ) -> anyhow::Result<()> {
        while !shutdown.is_shutting_down() {
            match self.run_connection(&out, &shutdown).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    warn!(?error, "listener connection lost, reconnecting");
                    metrics::ws_reconnected();
                    tokio::time::sleep(RECONNECT_SLEEP).await;
                }
            }
        }
        Ok(())
    }

    async fn run_connection(
        &self,
        out: &mpsc::Sender<ListenerOutput>,
        shutdown: &Shutdown,
    ) -> anyhow::Result<()> {
        let mut stream = ws::connect(&self.node_wss_uri).await?;
        let idmap = self.subscribe_all(&mut stream).await?;
        info!(count = idmap.len(), "subscriptions (re)seated");

        let mut ping_ticker = interval(PING_INTERVAL);
        let mut last_pong = Instant::now();

        loop {
            tokio::select! {
                () = shutdown.await_shutdown_begin() => return Ok(()),
                _ = ping_ticker.tick() => {
                    if last_pong.elapsed() > PING_TIMEOUT {
                        anyhow::bail!("ping timeout exceeded, treating connection as dead");
                    }
                    stream.send(Message::Ping(Vec::new())).await?;
                }
                frame = stream.next() => {
                    let frame = frame.ok_or_else(|| anyhow::anyhow!("connection closed"))??;
                    match frame {
                        Message::Text(text) => {
                            let (node_sub_id, event_log) = ws::parse_notification(&text)?;
                            let Some(&subscription_id) = idmap.get(&node_sub_id) else {
                                warn!(node_sub_id, "notification for unknown subscription, dropping");
                                continue;
                            };
                            if out.send(ListenerOutput { subscription_id, event_log }).await.is_err() {
                                return Ok(());
                            }
                        }
                        Message::Pong(_) => last_pong = Instant::now(),
                        Message::Ping(payload) => stream.send(Message::Pong(payload)).await?,
                        Message::Close(_) => anyhow::bail!("connection closed by peer"),
                        Message::Binary(_) | Message::Frame(_) => {}
                    }
                }
            }
        }
    }

    async fn subscribe_all(&self, stream: &mut WsStream) -> anyhow::Result<HashMap<String, u64>> {
        let mut idmap = HashMap::with_capacity(self.subscriptions.len());
        for (internal_id, subscription) in self.subscriptions.iter().enumerate() {
            let node_sub_id = ws::subscribe_logs(
                stream,
                internal_id as u64,
                &subscription.contract_address,
                &subscription.topic,
            )
            .await?;
            idmap.insert(node_sub_id, internal_id as u64);
        }
        Ok(idmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_ids_assigned_in_call_order() {
        let mut listener = Listener::new(Url::parse("wss://example.invalid").unwrap());
        assert_eq!(listener.add_subscription("0xA", "0xtopicA"), 0);
        assert_eq!(listener.add_subscription("0xB", "0xtopicB"), 1);
        assert_eq!(listener.add_subscription("0xC", "0xtopicC"), 2);
    }
}
