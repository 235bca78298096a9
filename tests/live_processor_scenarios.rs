//! End-to-end scenarios for the live processor (spec.md §8 S1-S3), driven
//! against an in-process mock JSON-RPC/price server via `wiremock` rather
//! than a real node and oracle.

use std::collections::HashMap;
use std::time::Duration;

use defi_event_recorder::chain::ws::WsLog;
use defi_event_recorder::chain::RpcClient;
use defi_event_recorder::config::GasPricingConfig;
use defi_event_recorder::live::processor::{Processor, SubscriptionRuntime};
use defi_event_recorder::live::types::{ListenerOutput, ProcessorOutput};
use defi_event_recorder::price::PriceOracleClient;
use defi_event_recorder::shutdown::Shutdown;
use serde_json::json;
use tokio::sync::mpsc;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RETRY_TTL_BLOCKS: u64 = 256;

/// A log shaped like spec.md §8 S1, but with no handler registered for
/// its subscription (`no_handler_subscriptions` below) — these scenarios
/// exercise the coordination core's fetch/retry/emit behavior, which is
/// independent of event-specific decoding, so the raw payload content is
/// irrelevant here.
fn swap_log(transaction_hash: &str, removed: bool) -> WsLog {
    WsLog {
        address: "0x1111111111111111111111111111111111111111".to_string(),
        topics: vec!["0xdead".to_string()],
        data: "0x00".to_string(),
        block_number: "0x10".to_string(),
        block_hash: "0xb".to_string(),
        transaction_hash: transaction_hash.to_string(),
        transaction_index: "0x0".to_string(),
        log_index: "0x0".to_string(),
        removed,
    }
}

async fn mock_chain_server(receipt_present: bool) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"method": "eth_getBlockByHash"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "timestamp": "0x61A8" },
        })))
        .mount(&server)
        .await;

    let receipt_result = if receipt_present {
        json!({ "gasUsed": "0x5208", "effectiveGasPrice": "0x3B9ACA00" })
    } else {
        serde_json::Value::Null
    };
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"method": "eth_getTransactionReceipt"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": receipt_result,
        })))
        .mount(&server)
        .await;

    server
}

async fn mock_price_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            [0, "0", "0", "0", "1234.56", "0", 25_000_000_i64],
        ])))
        .mount(&server)
        .await;
    server
}

fn no_handler_subscriptions() -> HashMap<u64, SubscriptionRuntime> {
    let mut subscriptions = HashMap::new();
    subscriptions.insert(0, SubscriptionRuntime { event_id: "uniswap-v3-pool-swap".to_string(), handler: None });
    subscriptions
}

fn processor(chain: &MockServer, price: &MockServer) -> Processor {
    Processor::new(
        RpcClient::new(Url::parse(&chain.uri()).unwrap()),
        PriceOracleClient::new(Url::parse(&price.uri()).unwrap()),
        GasPricingConfig { gas_currency: "ETH".to_string(), quote_currency: "SGD".to_string() },
        no_handler_subscriptions(),
        RETRY_TTL_BLOCKS,
    )
}

/// S1 — live happy path, single swap: receipt and timestamp both present,
/// the record's gas numbers and quote match the worked example.
#[tokio::test]
async fn s1_happy_path_single_swap() {
    let chain = mock_chain_server(true).await;
    let price = mock_price_server().await;
    let processor = std::sync::Arc::new(processor(&chain, &price));

    let (input_tx, input_rx) = mpsc::channel(8);
    let (output_tx, mut output_rx) = mpsc::channel(8);
    let shutdown = Shutdown::spawn(Duration::from_secs(5), Duration::from_millis(50));

    let handle = tokio::spawn({
        let processor = processor.clone();
        let shutdown = shutdown.clone();
        async move { processor.run(input_rx, output_tx, shutdown).await }
    });

    input_tx
        .send(ListenerOutput { subscription_id: 0, event_log: swap_log("0xT", false) })
        .await
        .unwrap();

    let ProcessorOutput { subscription_id, record } =
        tokio::time::timeout(Duration::from_secs(2), output_rx.recv()).await.unwrap().unwrap();

    assert_eq!(subscription_id, 0);
    assert_eq!(record.gas_used, "21000");
    assert_eq!(record.gas_price_wei, "1000000000");
    assert_eq!(record.gas_price_quote.currency, "SGD");
    // int_price(123456) * gas_used(21000) * gas_price_wei(1e9) / 10^decimals(2), floored.
    assert_eq!(record.gas_price_quote.value, "25925760000000000");
    assert_eq!(record.block_number, 16);
    assert_eq!(record.timestamp, 25_000);

    drop(input_tx);
    shutdown.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
}

/// S2 — postpone then succeed: a receipt-miss event is queued; a second
/// event on a different transaction is emitted first; once the first
/// transaction's receipt becomes available on a later retry pass, it is
/// emitted too, after the second.
#[tokio::test]
async fn s2_postpone_then_succeed_preserves_retry_order() {
    let chain = MockServer::start().await;

    // 0xT never has a receipt for the first two calls, then succeeds.
    let call_count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    {
        let call_count = call_count.clone();
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({"method": "eth_getTransactionReceipt", "params": ["0xT"]})))
            .respond_with(move |_: &wiremock::Request| {
                let n = call_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                // Null on process_log's own call (n=0) and on the retry pass
                // that immediately follows it (n=1), so 0xT is still pending
                // when 0xU is processed; succeeds on 0xU's own retry pass (n=2).
                let result = if n < 2 {
                    serde_json::Value::Null
                } else {
                    json!({ "gasUsed": "0x5208", "effectiveGasPrice": "0x3B9ACA00" })
                };
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
            })
            .mount(&chain)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"method": "eth_getTransactionReceipt", "params": ["0xU"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "gasUsed": "0x5208", "effectiveGasPrice": "0x3B9ACA00" },
        })))
        .mount(&chain)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"method": "eth_getBlockByHash"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "timestamp": "0x61A8" },
        })))
        .mount(&chain)
        .await;

    let price = mock_price_server().await;
    let processor = std::sync::Arc::new(processor(&chain, &price));

    let (input_tx, input_rx) = mpsc::channel(8);
    let (output_tx, mut output_rx) = mpsc::channel(8);
    let shutdown = Shutdown::spawn(Duration::from_secs(5), Duration::from_millis(50));

    let handle = tokio::spawn({
        let processor = processor.clone();
        let shutdown = shutdown.clone();
        async move { processor.run(input_rx, output_tx, shutdown).await }
    });

    input_tx.send(ListenerOutput { subscription_id: 0, event_log: swap_log("0xT", false) }).await.unwrap();
    input_tx.send(ListenerOutput { subscription_id: 0, event_log: swap_log("0xU", false) }).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), output_rx.recv()).await.unwrap().unwrap();
    let second = tokio::time::timeout(Duration::from_secs(2), output_rx.recv()).await.unwrap().unwrap();

    assert_eq!(first.record.transaction_hash, "0xU");
    assert_eq!(second.record.transaction_hash, "0xT");

    drop(input_tx);
    shutdown.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
}

/// S3 — reorg cancels retry: a `removed=true` notification for a pending
/// transaction evicts its bucket before the receipt ever appears; nothing
/// is emitted for it.
#[tokio::test]
async fn s3_removed_flag_cancels_pending_retry() {
    let chain = mock_chain_server(false).await;
    let price = mock_price_server().await;
    let processor = std::sync::Arc::new(processor(&chain, &price));

    let (input_tx, input_rx) = mpsc::channel(8);
    let (output_tx, mut output_rx) = mpsc::channel(8);
    let shutdown = Shutdown::spawn(Duration::from_secs(5), Duration::from_millis(50));

    let handle = tokio::spawn({
        let processor = processor.clone();
        let shutdown = shutdown.clone();
        async move { processor.run(input_rx, output_tx, shutdown).await }
    });

    input_tx.send(ListenerOutput { subscription_id: 0, event_log: swap_log("0xT", false) }).await.unwrap();
    input_tx.send(ListenerOutput { subscription_id: 0, event_log: swap_log("0xT", true) }).await.unwrap();

    drop(input_tx);
    shutdown.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

    assert!(tokio::time::timeout(Duration::from_millis(200), output_rx.recv()).await.unwrap_or(None).is_none());
}
