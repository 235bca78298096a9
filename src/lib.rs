//! Ingests on-chain event logs, enriches them with gas cost, a
//! fiat-denominated gas quote and decoded event fields, and persists the
//! enriched records to a document store.

pub mod bigint;
pub mod chain;
pub mod config;
pub mod events;
pub mod historical;
pub mod indexer;
pub mod live;
pub mod metrics;
pub mod monitoring;
pub mod price;
pub mod record;
pub mod shutdown;
pub mod store;
pub mod utils;
