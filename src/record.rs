//! The persisted record schema shared by the live and historical
//! pipelines.

use std::collections::BTreeMap;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::bigint::pow10;

/// One enriched, persisted event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub event_id: String,
    pub transaction_hash: String,
    pub block_number: u64,
    pub timestamp: u64,
    pub gas_used: String,
    pub gas_price_wei: String,
    pub gas_price_quote: GasPriceQuote,
    pub address: String,
    pub topics: Vec<String>,
    pub raw_data: String,
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceQuote {
    pub currency: String,
    pub value: String,
}

/// `gas_price_quote.value = int_price * gas_used * gas_price_wei / 10^decimals`,
/// using unbounded-precision integer floor division.
pub fn compute_gas_price_quote(
    currency: &str,
    gas_used: &BigUint,
    gas_price_wei: &BigUint,
    integer_price: &BigUint,
    price_decimals: u32,
) -> GasPriceQuote {
    let numerator = integer_price * gas_used * gas_price_wei;
    let value = numerator / pow10(price_decimals);
    GasPriceQuote {
        currency: currency.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_matches_formula() {
        // gas_used=21000 ("0x5208"), gas_price_wei=1e9 ("0x3B9ACA00"), close="1234.56".
        let gas_used = BigUint::from(21_000u32);
        let gas_price_wei = BigUint::from(1_000_000_000u64);
        let integer_price = BigUint::from(123_456u32);
        let quote = compute_gas_price_quote("SGD", &gas_used, &gas_price_wei, &integer_price, 2);
        // int_price * gas_used * gas_price_wei / 10^decimals, floor.
        assert_eq!(quote.value, "25925760000000000");
        assert_eq!(quote.currency, "SGD");
    }

    #[test]
    fn quote_floors_the_division() {
        let gas_used = BigUint::from(3u32);
        let gas_price_wei = BigUint::from(1u32);
        let integer_price = BigUint::from(7u32);
        // 3 * 1 * 7 = 21, / 10^1 = 2.1 -> floors to 2.
        let quote = compute_gas_price_quote("SGD", &gas_used, &gas_price_wei, &integer_price, 1);
        assert_eq!(quote.value, "2");
    }
}
