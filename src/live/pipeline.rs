//! Wires the live listener, processor and writer together with bounded
//! channels and shared shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;

use crate::chain::RpcClient;
use crate::config::{Environment, LiveConfig};
use crate::events::EventRegistry;
use crate::live::listener::Listener;
use crate::live::processor::{Processor, SubscriptionRuntime};
use crate::live::writer::Writer;
use crate::price::PriceOracleClient;
use crate::shutdown::Shutdown;
use crate::store::DocumentStore;

/// Queue depth between pipeline stages (recommended bounds: 64-256 items).
const CHANNEL_CAPACITY: usize = 128;

pub async fn run(config: LiveConfig, env: Environment, shutdown: Shutdown) -> anyhow::Result<()> {
    let store = DocumentStore::connect(&env.database).await?;
    let rpc = RpcClient::new(env.node_rpc_uri.clone());
    let price = PriceOracleClient::new(env.oracle_base_url.clone());

    let mut listener = Listener::new(env.node_wss_uri.clone());
    let mut subscriptions = HashMap::with_capacity(config.subscriptions.len());
    let mut categories = HashMap::with_capacity(config.subscriptions.len());

    for subscription in &config.subscriptions {
        let topic = EventRegistry::topic(&subscription.event_id)
            .with_context(|| format!("resolving topic for event id {}", subscription.event_id))?;
        let category = EventRegistry::category(&subscription.event_id)
            .with_context(|| format!("resolving category for event id {}", subscription.event_id))?;
        let handler = EventRegistry::new_handler(&subscription.event_id, &subscription.contract_address)
            .with_context(|| format!("constructing handler for event id {}", subscription.event_id))?;

        let internal_id = listener.add_subscription(subscription.contract_address.clone(), topic);

        categories.insert(internal_id, category.to_string());
        subscriptions.insert(
            internal_id,
            SubscriptionRuntime {
                event_id: subscription.event_id.clone(),
                handler,
            },
        );
    }

    let processor = Arc::new(Processor::new(
        rpc,
        price,
        config.gas_pricing.clone(),
        subscriptions,
        env.retry_ttl_blocks,
    ));
    processor.resolve_handlers().await.context("resolving handler contexts")?;

    let (listener_tx, processor_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (writer_tx, writer_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let writer = Writer::new(store, categories);

    info!(subscriptions = config.subscriptions.len(), "starting live pipeline");

    let listener_task_shutdown = shutdown.clone();
    let listener_handle = crate::utils::spawn_with_backoff_cancel_on_shutdown(
        move || {
            let listener = listener.clone();
            let listener_tx = listener_tx.clone();
            let shutdown = listener_task_shutdown.clone();
            async move { listener.listen_forever(listener_tx, shutdown).await }
        },
        std::time::Duration::from_millis(500),
        shutdown.clone(),
    );

    let processor_handle = {
        let processor = Arc::clone(&processor);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { processor.run(processor_rx, writer_tx, shutdown).await })
    };

    let writer_handle = tokio::spawn(async move { writer.run(writer_rx).await });

    let (listener_result, processor_result, writer_result) =
        tokio::join!(listener_handle, processor_handle, writer_handle);

    listener_result.context("listener task panicked")?;
    processor_result.context("processor task panicked")??;
    writer_result.context("writer task panicked")??;

    Ok(())
}
