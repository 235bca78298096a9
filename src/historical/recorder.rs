//! The historical recorder: wires loader → batch processor → batch
//! writer for one backfill job invocation. The HTTP control plane that
//! accepts job requests is an external collaborator; this module exposes
//! the shape it would call into.

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::{Environment, HistoricalConfig};
use crate::events::EventRegistry;
use crate::historical::loader::Loader;
use crate::historical::processor::BatchProcessor;
use crate::historical::types::BackfillRequest;
use crate::historical::writer::BatchWriter;
use crate::indexer::IndexerClient;
use crate::price::PriceOracleClient;
use crate::store::DocumentStore;

const CHANNEL_CAPACITY: usize = 64;

/// Runs one backfill job end to end, returning the number of records
/// written. Fails fast on an invalid request or an unknown event id.
pub async fn run_backfill_job(
    request: BackfillRequest,
    config: HistoricalConfig,
    env: Environment,
) -> anyhow::Result<usize> {
    request.validate().context("invalid backfill request")?;

    let category = EventRegistry::category(&request.event_id)
        .with_context(|| format!("resolving category for event id {}", request.event_id))?;
    let topic = EventRegistry::topic(&request.event_id)
        .with_context(|| format!("resolving topic for event id {}", request.event_id))?;
    let handler = EventRegistry::new_handler(&request.event_id, &request.contract_address)
        .with_context(|| format!("constructing handler for event id {}", request.event_id))?;

    let rpc = crate::chain::RpcClient::new(env.node_rpc_uri.clone());
    if let Some(handler) = &handler {
        handler
            .resolve_context(&rpc)
            .await
            .context("resolving handler context")?;
    }

    let indexer_api_key = env
        .indexer_api_key
        .clone()
        .context("ETHERSCAN_API_KEY is required for the historical entrypoint")?;
    let indexer = IndexerClient::new(env.indexer_base_url.clone(), indexer_api_key);
    let price = PriceOracleClient::new(env.oracle_base_url.clone());
    let store = DocumentStore::connect(&env.database).await?;

    let loader = Loader::new(indexer, config.batch.loader_sleep);
    let processor = BatchProcessor::new(price, config.batch.gas_pricing.clone(), request.event_id.clone(), handler);
    let writer = BatchWriter::new(store, category.to_string());

    let (loader_tx, processor_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (processor_tx, writer_rx) = mpsc::channel(CHANNEL_CAPACITY);

    info!(
        event_id = %request.event_id,
        from_block = request.from_block,
        to_block = request.to_block,
        "starting backfill job"
    );

    let loader_handle = tokio::spawn(async move {
        loader
            .run(
                &request.contract_address,
                &topic,
                request.from_block as u64,
                request.to_block as u64,
                config.batch.blocks_per_batch,
                &loader_tx,
            )
            .await
    });
    let processor_handle = tokio::spawn(async move { processor.run(processor_rx, processor_tx).await });
    let writer_handle = tokio::spawn(async move { writer.run(writer_rx).await });

    let (loader_result, processor_result, writer_result) =
        tokio::join!(loader_handle, processor_handle, writer_handle);

    loader_result.context("loader task panicked")??;
    processor_result.context("batch processor task panicked")??;
    let total_written = writer_result.context("batch writer task panicked")??;

    info!(total_written, "backfill job complete");
    Ok(total_written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::historical::types::BackfillRequestError;

    #[tokio::test]
    async fn unknown_event_id_fails_before_any_io() {
        let request = BackfillRequest {
            event_id: "bogus".to_string(),
            contract_address: "0x1111111111111111111111111111111111111111".to_string(),
            from_block: 1,
            to_block: 2,
        };
        assert!(request.validate().is_ok());
        let category = EventRegistry::category(&request.event_id);
        assert!(category.is_err());
    }

    #[test]
    fn invalid_request_is_rejected_before_registry_lookup() {
        let request = BackfillRequest {
            event_id: String::new(),
            contract_address: "0x1111111111111111111111111111111111111111".to_string(),
            from_block: 1,
            to_block: 2,
        };
        assert_eq!(request.validate(), Err(BackfillRequestError::EmptyEventId));
    }
}
