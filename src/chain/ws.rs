//! The `eth_subscribe`/`eth_subscription` WebSocket wire protocol, kept
//! separate from the listener's reconnect/idmap logic in `live::listener`
//! so the framing and the lifecycle policy can be tested independently.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("websocket connection error: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection closed")]
    Closed,
    #[error("malformed subscribe response")]
    MalformedSubscribeResponse,
    #[error("malformed notification frame")]
    MalformedNotification,
}

/// A log delivered over a subscription notification. Distinct from the
/// indexer's REST `EventLog` shape: it carries `removed` and `blockHash`
/// instead of `timeStamp`/`gasPrice`/`gasUsed`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    pub block_hash: String,
    pub transaction_hash: String,
    pub transaction_index: String,
    pub log_index: String,
    #[serde(default)]
    pub removed: bool,
}

#[derive(Deserialize)]
struct SubscriptionNotification {
    params: SubscriptionParams,
}

#[derive(Deserialize)]
struct SubscriptionParams {
    subscription: String,
    result: WsLog,
}

pub async fn connect(uri: &Url) -> Result<WsStream, WsError> {
    let (stream, _response) = tokio_tungstenite::connect_async(uri.as_str()).await?;
    Ok(stream)
}

/// Sends `eth_subscribe("logs", {address, topics: [topic]})` and reads the
/// single response frame containing the node's subscription id.
pub async fn subscribe_logs(
    stream: &mut WsStream,
    request_id: u64,
    address: &str,
    topic: &str,
) -> Result<String, WsError> {
    let request = json!({
        "jsonrpc": "2.0",
        "id": request_id,
        "method": "eth_subscribe",
        "params": ["logs", { "address": address, "topics": [topic] }],
    });

    stream
        .send(Message::Text(request.to_string()))
        .await
        .map_err(WsError::Connect)?;

    let frame = stream.next().await.ok_or(WsError::Closed)??;
    let text = frame
        .into_text()
        .map_err(WsError::Connect)?;
    let response: Value =
        serde_json::from_str(&text).map_err(|_| WsError::MalformedSubscribeResponse)?;

    response
        .get("result")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(WsError::MalformedSubscribeResponse)
}

/// Parses a raw text frame as an `eth_subscription` notification. The
/// listener's own read loop drives the frame read itself (it also needs to
/// see pings/pongs/close frames) and hands only text frames here.
pub fn parse_notification(text: &str) -> Result<(String, WsLog), WsError> {
    let notification: SubscriptionNotification =
        serde_json::from_str(text).map_err(|_| WsError::MalformedNotification)?;
    Ok((notification.params.subscription, notification.params.result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_notification_frame() {
        let text = r#"{
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {
                "subscription": "0xabc",
                "result": {
                    "address": "0x1111111111111111111111111111111111111111",
                    "topics": ["0xdead"],
                    "data": "0x",
                    "blockNumber": "0x10",
                    "blockHash": "0xb",
                    "transactionHash": "0xt",
                    "transactionIndex": "0x0",
                    "logIndex": "0x0",
                    "removed": false
                }
            }
        }"#;
        let notification: SubscriptionNotification = serde_json::from_str(text).unwrap();
        assert_eq!(notification.params.subscription, "0xabc");
        assert_eq!(notification.params.result.transaction_hash, "0xt");
        assert!(!notification.params.result.removed);
    }
}
