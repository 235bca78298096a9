//! The handler protocol: `resolve_context` populates immutable metadata
//! via chain reads, `decode` turns raw log payload + topics into
//! event-specific fields. `decode` never fails — it returns an empty map
//! until context is resolved.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::chain::RpcClient;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("chain error resolving handler context: {0}")]
    Chain(#[from] crate::chain::ChainError),
}

/// Polymorphic over `{resolve_context, decode}`. Implementors own their
/// resolved context and must make `resolve_context` idempotent: it may
/// be called more than once (e.g. retried after a transient chain error)
/// but must only issue chain reads the first time it succeeds.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Populates the handler's context via read-only chain calls. Must
    /// complete before any `decode` call is expected to return non-empty
    /// data. Failures here are fatal to the pipeline that owns the
    /// handler.
    async fn resolve_context(&self, rpc: &RpcClient) -> Result<(), HandlerError>;

    /// Decodes event-specific fields from the raw log payload and topics.
    /// Returns `{}` if context is unresolved.
    fn decode(&self, raw_data: &str, topics: &[String]) -> BTreeMap<String, String>;
}
