//! The historical batch processor: one oracle price-range query per
//! batch, then a cursor walk assigning the applicable price to each log
//! in time order.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::instrument;

use crate::bigint::{parse_hex_biguint, parse_hex_u64};
use crate::config::GasPricingConfig;
use crate::events::Handler;
use crate::indexer::IndexerLogEntry;
use crate::price::PriceOracleClient;
use crate::record::{compute_gas_price_quote, EnrichedRecord};

pub struct BatchProcessor {
    price: PriceOracleClient,
    gas_pricing: GasPricingConfig,
    event_id: String,
    handler: Option<Arc<dyn Handler>>,
}

impl BatchProcessor {
    pub fn new(
        price: PriceOracleClient,
        gas_pricing: GasPricingConfig,
        event_id: String,
        handler: Option<Arc<dyn Handler>>,
    ) -> Self {
        Self { price, gas_pricing, event_id, handler }
    }

    /// Consumes batches until an empty-batch sentinel arrives, at which
    /// point it forwards the sentinel and terminates.
    pub async fn run(
        &self,
        mut input: mpsc::Receiver<Vec<IndexerLogEntry>>,
        out: mpsc::Sender<Vec<EnrichedRecord>>,
    ) -> anyhow::Result<()> {
        while let Some(batch) = input.recv().await {
            if batch.is_empty() {
                let _ = out.send(Vec::new()).await;
                return Ok(());
            }

            let records = self.process_batch(batch).await?;
            if out.send(records).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }

    #[instrument(skip(self, batch), fields(batch_size = batch.len()))]
    async fn process_batch(&self, mut batch: Vec<IndexerLogEntry>) -> anyhow::Result<Vec<EnrichedRecord>> {
        // The indexer is expected to return logs in block-ascending order;
        // sort defensively in case that assumption is violated.
        batch.sort_by_key(|entry| parse_hex_u64(&entry.time_stamp));

        let min_ts = parse_hex_u64(&batch[0].time_stamp);
        let max_ts = parse_hex_u64(&batch[batch.len() - 1].time_stamp);

        let prices = self
            .price
            .fetch_price_range(
                &self.gas_pricing.gas_currency,
                &self.gas_pricing.quote_currency,
                min_ts.saturating_sub(60),
                max_ts,
            )
            .await?;
        anyhow::ensure!(!prices.is_empty(), "oracle returned no prices covering the batch's time extent");

        let mut cursor = 0usize;
        let mut records = Vec::with_capacity(batch.len());

        for entry in &batch {
            let timestamp = parse_hex_u64(&entry.time_stamp);
            let event_timestamp_ms = (timestamp as i64) * 1000;

            while cursor < prices.len() - 1 && prices[cursor].close_time_ms < event_timestamp_ms {
                cursor += 1;
            }
            let price = &prices[cursor];

            let gas_used = parse_hex_biguint(&entry.gas_used);
            let gas_price_wei = parse_hex_biguint(&entry.gas_price);
            let gas_price_quote = compute_gas_price_quote(
                &self.gas_pricing.quote_currency,
                &gas_used,
                &gas_price_wei,
                &price.integer_price,
                price.decimals,
            );

            let data = match &self.handler {
                Some(handler) => handler.decode(&entry.data, &entry.topics),
                None => BTreeMap::new(),
            };

            records.push(EnrichedRecord {
                event_id: self.event_id.clone(),
                transaction_hash: entry.transaction_hash.clone(),
                block_number: parse_hex_u64(&entry.block_number),
                timestamp,
                gas_used: gas_used.to_string(),
                gas_price_wei: gas_price_wei.to_string(),
                gas_price_quote,
                address: entry.address.clone(),
                topics: entry.topics.clone(),
                raw_data: entry.data.clone(),
                data,
            });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(time_stamp: &str, tx: &str) -> IndexerLogEntry {
        IndexerLogEntry {
            address: "0x1111111111111111111111111111111111111111".to_string(),
            topics: vec!["0xdead".to_string()],
            data: "0x".to_string(),
            block_number: "0x10".to_string(),
            time_stamp: time_stamp.to_string(),
            gas_price: "0x3B9ACA00".to_string(),
            gas_used: "0x5208".to_string(),
            log_index: "0x0".to_string(),
            transaction_hash: tx.to_string(),
            transaction_index: "0x0".to_string(),
        }
    }

    #[test]
    fn sorts_batch_by_timestamp_defensively() {
        let mut batch = vec![entry("0x2", "0xB"), entry("0x1", "0xA")];
        batch.sort_by_key(|e| parse_hex_u64(&e.time_stamp));
        assert_eq!(batch[0].transaction_hash, "0xA");
        assert_eq!(batch[1].transaction_hash, "0xB");
    }
}
