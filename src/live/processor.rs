//! The live processor — the coordination core. Enriches each log with
//! block timestamp, receipt-derived gas numbers and price, or postpones
//! it in the retry map until its transaction receipt is indexed.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use tokio::sync::mpsc;
use tracing::{instrument, warn};

use crate::bigint::{parse_hex_biguint, parse_hex_u64};
use crate::chain::ws::WsLog;
use crate::chain::{ChainError, RpcClient, TransactionReceipt};
use crate::config::GasPricingConfig;
use crate::events::Handler;
use crate::live::types::{ListenerOutput, ProcessorOutput};
use crate::metrics;
use crate::price::{PriceError, PriceOracleClient, PricePoint};
use crate::record::{compute_gas_price_quote, EnrichedRecord};
use crate::shutdown::Shutdown;

const CACHE_CAPACITY: usize = 16;
const BLOCK_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Sleep after resetting an HTTP session on a transport-level error,
/// before resuming the pipeline (spec.md §7's "HTTP client connection
/// error" row).
const HTTP_RESET_SLEEP: Duration = Duration::from_secs(1);

/// Connection-level errors (closed sockets, timeouts, DNS failures) get
/// the reset-and-resume treatment; everything else — malformed
/// responses, RPC-level errors, ABI decode failures — is unclassified
/// and fatal.
fn is_transport_error(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<ChainError>(), Some(ChainError::Transport { .. }))
        || matches!(error.downcast_ref::<PriceError>(), Some(PriceError::Transport(_)))
}

/// A configured subscription's decode-time context: which event id it
/// carries, which collection it lands in, and its handler (if any).
pub struct SubscriptionRuntime {
    pub event_id: String,
    pub handler: Option<Arc<dyn Handler>>,
}

/// A transaction's queued-for-retry events, tagged with the block height
/// they were first postponed at so the retry map can bound its own
/// lifetime (spec.md §9 flags this as unresolved upstream; SPEC_FULL.md
/// resolves it in favor of TTL eviction).
struct RetryBucket {
    created_at_block: u64,
    events: Vec<(u64, WsLog)>,
}

type RetryMap = HashMap<String, RetryBucket>;

pub struct Processor {
    rpc: RpcClient,
    price: PriceOracleClient,
    gas_pricing: GasPricingConfig,
    subscriptions: HashMap<u64, SubscriptionRuntime>,
    retry_ttl_blocks: u64,
    block_cache: Mutex<LruCache<String, u64>>,
    receipt_cache: Mutex<LruCache<String, TransactionReceipt>>,
    price_cache: Mutex<LruCache<(String, String, u64), PricePoint>>,
}

impl Processor {
    pub fn new(
        rpc: RpcClient,
        price: PriceOracleClient,
        gas_pricing: GasPricingConfig,
        subscriptions: HashMap<u64, SubscriptionRuntime>,
        retry_ttl_blocks: u64,
    ) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).expect("capacity is non-zero");
        Self {
            rpc,
            price,
            gas_pricing,
            subscriptions,
            retry_ttl_blocks,
            block_cache: Mutex::new(LruCache::new(capacity)),
            receipt_cache: Mutex::new(LruCache::new(capacity)),
            price_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Resolves every registered handler's context once, before the
    /// pipeline starts consuming logs. A failure here is fatal.
    pub async fn resolve_handlers(&self) -> anyhow::Result<()> {
        for runtime in self.subscriptions.values() {
            if let Some(handler) = &runtime.handler {
                handler.resolve_context(&self.rpc).await?;
            }
        }
        Ok(())
    }

    /// Resets the HTTP sessions underlying both the chain RPC and price
    /// oracle clients, as part of the transport-error recovery policy.
    fn reset_sessions(&self) {
        self.rpc.reset_session();
        self.price.reset_session();
    }

    /// Consumes listener output until shutdown, enriching and forwarding
    /// to `out`. Transport-level connection errors reset the HTTP
    /// sessions and resume (the retry map is left untouched); any other
    /// error is fatal to the live pipeline.
    pub async fn run(
        self: Arc<Self>,
        mut input: mpsc::Receiver<ListenerOutput>,
        out: mpsc::Sender<ProcessorOutput>,
        shutdown: Shutdown,
    ) -> anyhow::Result<()> {
        let mut retry_map: RetryMap = HashMap::new();

        loop {
            tokio::select! {
                () = shutdown.await_shutdown_begin() => return Ok(()),
                received = input.recv() => {
                    let Some(ListenerOutput { subscription_id, event_log }) = received else {
                        return Ok(());
                    };
                    let current_block = parse_hex_u64(&event_log.block_number);

                    if let Err(error) = self.process_log(subscription_id, event_log, &mut retry_map, &out).await {
                        if !is_transport_error(&error) {
                            return Err(error);
                        }
                        warn!(?error, "HTTP transport error, resetting session and resuming");
                        self.reset_sessions();
                        tokio::time::sleep(HTTP_RESET_SLEEP).await;
                        continue;
                    }

                    if let Err(error) = self.retry_pass(&mut retry_map, &out).await {
                        if !is_transport_error(&error) {
                            return Err(error);
                        }
                        warn!(?error, "HTTP transport error during retry pass, resetting session and resuming");
                        self.reset_sessions();
                        tokio::time::sleep(HTTP_RESET_SLEEP).await;
                        continue;
                    }

                    self.evict_stale_buckets(&mut retry_map, current_block);
                }
            }
        }
    }

    #[instrument(level = "debug", skip(self, retry_map, out), fields(subscription_id, tx = %log.transaction_hash))]
    async fn process_log(
        self: &Arc<Self>,
        subscription_id: u64,
        log: WsLog,
        retry_map: &mut RetryMap,
        out: &mpsc::Sender<ProcessorOutput>,
    ) -> anyhow::Result<()> {
        if log.removed {
            if retry_map.remove(&log.transaction_hash).is_some() {
                metrics::set_retry_map_size(retry_map.len());
            }
            return Ok(());
        }

        let arrival_block = parse_hex_u64(&log.block_number);

        let started_at = std::time::Instant::now();
        let timestamp_handle = {
            let processor = Arc::clone(self);
            let block_hash = log.block_hash.clone();
            tokio::spawn(async move { processor.fetch_block_timestamp(&block_hash).await })
        };
        let receipt_handle = {
            let processor = Arc::clone(self);
            let transaction_hash = log.transaction_hash.clone();
            tokio::spawn(async move { processor.fetch_transaction_receipt(&transaction_hash).await })
        };

        let timestamp = timestamp_handle.await??;

        let price_handle = {
            let processor = Arc::clone(self);
            let gas_currency = self.gas_pricing.gas_currency.clone();
            let quote_currency = self.gas_pricing.quote_currency.clone();
            tokio::spawn(
                async move { processor.fetch_price(&gas_currency, &quote_currency, timestamp).await },
            )
        };

        let Some(receipt) = receipt_handle.await?? else {
            // The price task's result is discarded; it was launched
            // speculatively and the event is going to the retry map instead.
            price_handle.abort();
            retry_map
                .entry(log.transaction_hash.clone())
                .or_insert_with(|| RetryBucket { created_at_block: arrival_block, events: Vec::new() })
                .events
                .push((subscription_id, log));
            metrics::set_retry_map_size(retry_map.len());
            return Ok(());
        };

        let price = price_handle.await??;
        let output = self.build_record(subscription_id, &log, timestamp, &receipt, &price)?;
        let _ = out.send(output).await;
        metrics::record_written();
        metrics::observe_enrichment_latency(started_at.elapsed().as_secs_f64());
        Ok(())
    }

    /// Walks the retry map once, attempting every pending transaction's
    /// receipt lookup; buckets whose receipt has since appeared are
    /// drained and removed.
    async fn retry_pass(
        &self,
        retry_map: &mut RetryMap,
        out: &mpsc::Sender<ProcessorOutput>,
    ) -> anyhow::Result<()> {
        let pending_tx_hashes: Vec<String> = retry_map.keys().cloned().collect();

        for transaction_hash in pending_tx_hashes {
            let Some(receipt) = self.fetch_transaction_receipt(&transaction_hash).await? else {
                continue;
            };

            let bucket = retry_map
                .remove(&transaction_hash)
                .expect("key was just read from retry_map.keys()");
            let (_, first_log) = &bucket.events[0];
            let timestamp = self.fetch_block_timestamp(&first_log.block_hash).await?;
            let price = self
                .fetch_price(&self.gas_pricing.gas_currency, &self.gas_pricing.quote_currency, timestamp)
                .await?;

            for (subscription_id, log) in &bucket.events {
                let output = self.build_record(*subscription_id, log, timestamp, &receipt, &price)?;
                if out.send(output).await.is_err() {
                    return Ok(());
                }
                metrics::record_written();
            }
        }

        metrics::set_retry_map_size(retry_map.len());
        Ok(())
    }

    /// Drops retry buckets older than `retry_ttl_blocks` behind the most
    /// recently observed block. Paced by the live stream's own arrivals
    /// rather than a timer, since block height is the natural clock for a
    /// chain-reorg-sensitive cache. An adversarial stream of never-indexed
    /// transaction hashes would otherwise grow the retry map without bound.
    fn evict_stale_buckets(&self, retry_map: &mut RetryMap, current_block: u64) {
        let cutoff = current_block.saturating_sub(self.retry_ttl_blocks);
        let before = retry_map.len();
        retry_map.retain(|transaction_hash, bucket| {
            let keep = bucket.created_at_block >= cutoff;
            if !keep {
                warn!(
                    tx = %transaction_hash,
                    created_at_block = bucket.created_at_block,
                    current_block,
                    "evicting stale retry bucket"
                );
            }
            keep
        });
        if retry_map.len() != before {
            metrics::set_retry_map_size(retry_map.len());
        }
    }

    fn build_record(
        &self,
        subscription_id: u64,
        log: &WsLog,
        timestamp: u64,
        receipt: &TransactionReceipt,
        price: &PricePoint,
    ) -> anyhow::Result<ProcessorOutput> {
        let runtime = self
            .subscriptions
            .get(&subscription_id)
            .ok_or_else(|| anyhow::anyhow!("unknown subscription id {subscription_id}"))?;

        let gas_used = parse_hex_biguint(&receipt.gas_used);
        let gas_price_wei = parse_hex_biguint(&receipt.effective_gas_price);
        let gas_price_quote = compute_gas_price_quote(
            &self.gas_pricing.quote_currency,
            &gas_used,
            &gas_price_wei,
            &price.integer_price,
            price.decimals,
        );

        let data = match &runtime.handler {
            Some(handler) => handler.decode(&log.data, &log.topics),
            None => BTreeMap::new(),
        };

        let record = EnrichedRecord {
            event_id: runtime.event_id.clone(),
            transaction_hash: log.transaction_hash.clone(),
            block_number: parse_hex_u64(&log.block_number),
            timestamp,
            gas_used: gas_used.to_string(),
            gas_price_wei: gas_price_wei.to_string(),
            gas_price_quote,
            address: log.address.clone(),
            topics: log.topics.clone(),
            raw_data: log.data.clone(),
            data,
        };

        Ok(ProcessorOutput { subscription_id, record })
    }

    /// `eth_getBlockByHash`, retrying every ~2s on `result == null`.
    /// LRU-cached, capacity 16.
    async fn fetch_block_timestamp(&self, block_hash: &str) -> Result<u64, ChainError> {
        if let Some(&cached) = self.block_cache.lock().unwrap().get(block_hash) {
            return Ok(cached);
        }

        loop {
            match self.rpc.eth_get_block_by_hash(block_hash).await? {
                Some(header) => {
                    let timestamp = parse_hex_u64(&header.timestamp);
                    self.block_cache.lock().unwrap().put(block_hash.to_string(), timestamp);
                    return Ok(timestamp);
                }
                None => {
                    warn!(block_hash, "block not yet available, retrying");
                    tokio::time::sleep(BLOCK_POLL_INTERVAL).await;
                }
            }
        }
    }

    /// `eth_getTransactionReceipt`. LRU-cached, but a miss (`null`) is
    /// never cached.
    async fn fetch_transaction_receipt(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        if let Some(cached) = self.receipt_cache.lock().unwrap().get(transaction_hash) {
            return Ok(Some(cached.clone()));
        }

        let receipt = self.rpc.eth_get_transaction_receipt(transaction_hash).await?;
        if let Some(receipt) = &receipt {
            self.receipt_cache
                .lock()
                .unwrap()
                .put(transaction_hash.to_string(), receipt.clone());
        }
        Ok(receipt)
    }

    /// The gas-currency→quote-currency price at `timestamp`. LRU-cached by
    /// the exact `(gas_currency, quote_currency, timestamp)` tuple.
    async fn fetch_price(
        &self,
        gas_currency: &str,
        quote_currency: &str,
        timestamp: u64,
    ) -> Result<PricePoint, crate::price::PriceError> {
        let key = (gas_currency.to_string(), quote_currency.to_string(), timestamp);
        if let Some(cached) = self.price_cache.lock().unwrap().get(&key) {
            return Ok(cached.clone());
        }

        let point = self.price.fetch_price(gas_currency, quote_currency, timestamp).await?;
        self.price_cache.lock().unwrap().put(key, point.clone());
        Ok(point)
    }
}
