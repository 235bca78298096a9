//! The live writer: single-document inserts, one category per
//! subscription, preserving arrival order. Insertion failures are fatal;
//! the writer claims no idempotency, favoring the simpler single-insert
//! design over de-duplication on write.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::instrument;

use crate::live::types::ProcessorOutput;
use crate::store::DocumentStore;

pub struct Writer {
    store: DocumentStore,
    categories: HashMap<u64, String>,
}

impl Writer {
    pub fn new(store: DocumentStore, categories: HashMap<u64, String>) -> Self {
        Self { store, categories }
    }

    pub async fn run(&self, mut input: mpsc::Receiver<ProcessorOutput>) -> anyhow::Result<()> {
        while let Some(ProcessorOutput { subscription_id, record }) = input.recv().await {
            let category = self
                .categories
                .get(&subscription_id)
                .ok_or_else(|| anyhow::anyhow!("unknown subscription id {subscription_id}"))?;
            self.insert(category, record).await?;
        }
        Ok(())
    }

    #[instrument(level = "debug", skip(self, record), fields(category, tx = %record.transaction_hash))]
    async fn insert(&self, category: &str, record: crate::record::EnrichedRecord) -> anyhow::Result<()> {
        self.store.insert_one(category, &record).await?;
        Ok(())
    }
}
