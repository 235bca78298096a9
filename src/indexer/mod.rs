//! The historical loader's indexer REST client: a block-explorer style
//! `getLogs` endpoint that does not paginate and silently truncates
//! oversize windows, hence the loader's small `blocks_per_batch`.

use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;
use url::Url;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("transport error calling the indexer: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One raw log entry as the indexer returns it. Distinct from the
/// WebSocket's `WsLog`: it carries `timeStamp`/`gasPrice`/`gasUsed`
/// directly instead of `removed`/`blockHash`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerLogEntry {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    pub time_stamp: String,
    pub gas_price: String,
    pub gas_used: String,
    pub log_index: String,
    pub transaction_hash: String,
    pub transaction_index: String,
}

#[derive(Deserialize)]
struct GetLogsResponse {
    #[serde(default)]
    result: Vec<IndexerLogEntry>,
}

#[derive(Debug, Clone)]
pub struct IndexerClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl IndexerClient {
    pub fn new(base_url: Url, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn get_logs(
        &self,
        address: &str,
        topic0: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<IndexerLogEntry>, IndexerError> {
        let response: GetLogsResponse = self
            .http
            .get(self.api_url())
            .query(&[
                ("module", "logs"),
                ("action", "getLogs"),
                ("apikey", self.api_key.as_str()),
                ("address", address),
                ("topic0", topic0),
                ("fromBlock", &from_block.to_string()),
                ("toBlock", &to_block.to_string()),
            ])
            .send()
            .await?
            .json()
            .await?;

        Ok(response.result)
    }

    fn api_url(&self) -> Url {
        self.base_url.join("/api").expect("base_url is a valid base")
    }
}
