//! The historical loader: paginates the indexer over a block range in
//! fixed-size windows, emitting non-empty batches and a trailing
//! empty-batch sentinel.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::indexer::{IndexerClient, IndexerLogEntry};

/// Minimum sleep between indexer requests, used when the caller doesn't
/// override it via configuration.
pub const DEFAULT_LOADER_SLEEP: Duration = Duration::from_millis(500);

pub struct Loader {
    indexer: IndexerClient,
    sleep: Duration,
}

impl Loader {
    pub fn new(indexer: IndexerClient, sleep: Duration) -> Self {
        Self { indexer, sleep }
    }

    /// Steps `[from_block, to_block]` by `blocks_per_batch`, emitting each
    /// non-empty result batch to `out`, then an empty sentinel on
    /// completion. Windows overlap at their boundary block (`fromBlock=i,
    /// toBlock=i+blocks_per_batch`, then `i += blocks_per_batch`) to match
    /// the indexer's own range semantics; the indexer is expected to
    /// de-duplicate or the downstream store to tolerate the repeat.
    #[instrument(skip(self, out), fields(address, from_block, to_block, blocks_per_batch))]
    pub async fn run(
        &self,
        address: &str,
        topic0: &str,
        from_block: u64,
        to_block: u64,
        blocks_per_batch: u64,
        out: &mpsc::Sender<Vec<IndexerLogEntry>>,
    ) -> anyhow::Result<()> {
        let mut window_start = from_block;

        while window_start <= to_block {
            let window_end = window_start + blocks_per_batch;
            let batch = self
                .indexer
                .get_logs(address, topic0, window_start, window_end)
                .await?;

            if batch.is_empty() {
                debug!(window_start, window_end, "empty batch, skipping");
            } else if out.send(batch).await.is_err() {
                return Ok(());
            }

            window_start += blocks_per_batch;
            tokio::time::sleep(self.sleep).await;
        }

        let _ = out.send(Vec::new()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_overlap_at_their_boundary_block() {
        let mut windows = Vec::new();
        let (from_block, to_block, blocks_per_batch) = (100u64, 129u64, 15u64);
        let mut window_start = from_block;
        while window_start <= to_block {
            let window_end = window_start + blocks_per_batch;
            windows.push((window_start, window_end));
            window_start += blocks_per_batch;
        }
        assert_eq!(windows, vec![(100, 115), (115, 130)]);
    }
}
