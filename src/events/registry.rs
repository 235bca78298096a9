//! The Event Registry: maps event ids to `{category, topic hash, handler
//! constructor}`. Closed and built at process startup — a tagged-variant
//! registry keyed by event id, rather than open dynamic dispatch
//! registration.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use ethers::types::Address;
use ethers::utils::keccak256;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::events::handler::Handler;
use crate::events::handlers::uniswap_v3_pool_swap::UniswapV3PoolSwapHandler;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown event id: {0}")]
    UnknownEventId(String),
    #[error("contract address {0} is not a valid 0x-prefixed address")]
    InvalidAddress(String),
}

struct EventMetadata {
    category: &'static str,
    /// The canonical event signature; the topic hash is `keccak256` of
    /// this, computed lazily rather than stored pre-hashed.
    signature: &'static str,
    handler_ctor: Option<fn(Address) -> Arc<dyn Handler>>,
}

static METADATA: Lazy<HashMap<&'static str, EventMetadata>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert(
        "uniswap-v3-pool-swap",
        EventMetadata {
            category: "swaps",
            signature: "Swap(address,address,int256,int256,uint160,uint128,int24)",
            handler_ctor: Some(|address| {
                Arc::new(UniswapV3PoolSwapHandler::new(address)) as Arc<dyn Handler>
            }),
        },
    );
    map
});

pub struct EventRegistry;

impl EventRegistry {
    fn metadata(event_id: &str) -> Result<&'static EventMetadata, RegistryError> {
        METADATA
            .get(event_id)
            .ok_or_else(|| RegistryError::UnknownEventId(event_id.to_string()))
    }

    pub fn category(event_id: &str) -> Result<&'static str, RegistryError> {
        Ok(Self::metadata(event_id)?.category)
    }

    /// The 0x-prefixed, 32-byte keccak hash of the canonical event
    /// signature.
    pub fn topic(event_id: &str) -> Result<String, RegistryError> {
        let metadata = Self::metadata(event_id)?;
        let hash = keccak256(metadata.signature.as_bytes());
        Ok(format!("0x{}", hex::encode(hash)))
    }

    /// `None` if the event id is known but carries no handler. If a
    /// handler is registered for the event id, `data` is populated;
    /// otherwise `data` is empty.
    pub fn new_handler(
        event_id: &str,
        contract_address: &str,
    ) -> Result<Option<Arc<dyn Handler>>, RegistryError> {
        let metadata = Self::metadata(event_id)?;
        let Some(ctor) = metadata.handler_ctor else {
            return Ok(None);
        };
        let address = Address::from_str(contract_address)
            .map_err(|_| RegistryError::InvalidAddress(contract_address.to_string()))?;
        Ok(Some(ctor(address)))
    }
}
