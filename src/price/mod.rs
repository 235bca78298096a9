//! The price oracle REST client: one-minute klines, from which we only
//! ever consume `close` (index 4) and `close_time` (index 6).

use std::sync::RwLock;

use num_bigint::BigUint;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::bigint::split_decimal_string;

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("transport error calling the price oracle: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("price oracle returned no klines for the requested range")]
    Empty,
    #[error("malformed kline entry")]
    Malformed,
}

/// A single resolved price point: the close price of one 1-minute candle,
/// split into `(integer_price, decimals)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricePoint {
    pub close_time_ms: i64,
    pub integer_price: BigUint,
    pub decimals: u32,
}

#[derive(Debug)]
pub struct PriceOracleClient {
    http: RwLock<reqwest::Client>,
    base_url: Url,
}

impl PriceOracleClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: RwLock::new(reqwest::Client::new()),
            base_url,
        }
    }

    /// Swaps in a fresh `reqwest::Client`, as part of the caller's
    /// reset-the-session failure policy for transport-level errors.
    pub fn reset_session(&self) {
        *self.http.write().unwrap() = reqwest::Client::new();
    }

    fn client(&self) -> reqwest::Client {
        self.http.read().unwrap().clone()
    }

    /// A single one-minute kline ending at `timestamp_secs * 1000`, `limit=1`.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_price(
        &self,
        gas_currency: &str,
        quote_currency: &str,
        timestamp_secs: u64,
    ) -> Result<PricePoint, PriceError> {
        let symbol = format!("{gas_currency}{quote_currency}");
        let end_time = (timestamp_secs as i64) * 1000;

        let response = self
            .client()
            .get(self.klines_url())
            .query(&[
                ("symbol", symbol.as_str()),
                ("interval", "1m"),
                ("endTime", &end_time.to_string()),
                ("limit", "1"),
            ])
            .send()
            .await?
            .json::<Vec<Vec<serde_json::Value>>>()
            .await?;

        let kline = response.into_iter().next().ok_or(PriceError::Empty)?;
        parse_kline(&kline)
    }

    /// All one-minute klines covering `[start_secs, end_secs]`, sorted by
    /// close time, for the historical batch processor's cursor walk.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_price_range(
        &self,
        gas_currency: &str,
        quote_currency: &str,
        start_secs: u64,
        end_secs: u64,
    ) -> Result<Vec<PricePoint>, PriceError> {
        let symbol = format!("{gas_currency}{quote_currency}");
        let start_time = (start_secs as i64) * 1000;
        let end_time = (end_secs as i64) * 1000;

        let response = self
            .client()
            .get(self.klines_url())
            .query(&[
                ("symbol", symbol.as_str()),
                ("interval", "1m"),
                ("startTime", &start_time.to_string()),
                ("endTime", &end_time.to_string()),
            ])
            .send()
            .await?
            .json::<Vec<Vec<serde_json::Value>>>()
            .await?;

        let mut points = response
            .iter()
            .map(|kline| parse_kline(kline))
            .collect::<Result<Vec<_>, _>>()?;
        points.sort_by_key(|point| point.close_time_ms);
        Ok(points)
    }

    fn klines_url(&self) -> Url {
        self.base_url
            .join("/api/v3/klines")
            .expect("base_url is a valid base")
    }
}

fn parse_kline(kline: &[serde_json::Value]) -> Result<PricePoint, PriceError> {
    let close = kline.get(4).and_then(|v| v.as_str()).ok_or(PriceError::Malformed)?;
    let close_time_ms = kline
        .get(6)
        .and_then(|v| v.as_i64())
        .ok_or(PriceError::Malformed)?;
    let (integer_price, decimals) = split_decimal_string(close);
    Ok(PricePoint {
        close_time_ms,
        integer_price,
        decimals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_close_and_close_time() {
        let kline = vec![
            json!(0),
            json!("0"),
            json!("0"),
            json!("0"),
            json!("1234.56"),
            json!("0"),
            json!(60_000),
        ];
        let point = parse_kline(&kline).unwrap();
        assert_eq!(point.integer_price, BigUint::from(123_456u32));
        assert_eq!(point.decimals, 2);
        assert_eq!(point.close_time_ms, 60_000);
    }
}
