//! The historical batch writer: bulk-inserts each non-empty batch,
//! terminating on the empty-batch sentinel.

use tokio::sync::mpsc;
use tracing::instrument;

use crate::metrics;
use crate::record::EnrichedRecord;
use crate::store::DocumentStore;

pub struct BatchWriter {
    store: DocumentStore,
    category: String,
}

impl BatchWriter {
    pub fn new(store: DocumentStore, category: String) -> Self {
        Self { store, category }
    }

    pub async fn run(&self, mut input: mpsc::Receiver<Vec<EnrichedRecord>>) -> anyhow::Result<usize> {
        let mut total_written = 0;

        while let Some(batch) = input.recv().await {
            if batch.is_empty() {
                return Ok(total_written);
            }
            self.insert_batch(&batch).await?;
            total_written += batch.len();
        }

        Ok(total_written)
    }

    #[instrument(skip(self, batch), fields(category = %self.category, batch_size = batch.len()))]
    async fn insert_batch(&self, batch: &[EnrichedRecord]) -> anyhow::Result<()> {
        self.store.insert_many(&self.category, batch).await?;
        metrics::records_written_by(batch.len());
        Ok(())
    }
}
