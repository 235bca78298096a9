//! The document-store client: one collection per event category, one
//! document per [`EnrichedRecord`], backed by MongoDB since the recorded
//! events have no enforced schema.

use mongodb::bson::{self, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::record::EnrichedRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("error connecting to the document store: {0}")]
    Connect(#[source] mongodb::error::Error),
    #[error("error serializing record for insertion: {0}")]
    Serialize(#[from] bson::ser::Error),
    #[error("error inserting into collection {collection}: {source}")]
    Insert {
        collection: String,
        #[source]
        source: mongodb::error::Error,
    },
}

#[derive(Clone)]
pub struct DocumentStore {
    database: Database,
}

impl DocumentStore {
    #[instrument(skip_all)]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        info!(host = %config.host, database = %config.database, "Connecting to document store");

        let options = ClientOptions::parse(config.connection_uri())
            .await
            .map_err(StoreError::Connect)?;
        let client = Client::with_options(options).map_err(StoreError::Connect)?;
        let database = client.database(&config.database);

        Ok(Self { database })
    }

    /// Single-document insert, used by the live writer. Writer insertion
    /// failures are fatal; no idempotency is claimed.
    #[instrument(skip(self, record))]
    pub async fn insert_one(
        &self,
        category: &str,
        record: &EnrichedRecord,
    ) -> Result<(), StoreError> {
        let document = bson::to_document(record)?;
        self.database
            .collection::<Document>(category)
            .insert_one(document, None)
            .await
            .map_err(|source| StoreError::Insert {
                collection: category.to_string(),
                source,
            })?;
        Ok(())
    }

    /// Bulk insert, used by the historical batch writer. Skips the call
    /// entirely for an empty batch.
    #[instrument(skip(self, records))]
    pub async fn insert_many(
        &self,
        category: &str,
        records: &[EnrichedRecord],
    ) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let documents = records
            .iter()
            .map(bson::to_document)
            .collect::<Result<Vec<_>, _>>()?;
        self.database
            .collection::<Document>(category)
            .insert_many(documents, None)
            .await
            .map_err(|source| StoreError::Insert {
                collection: category.to_string(),
                source,
            })?;
        Ok(())
    }
}
