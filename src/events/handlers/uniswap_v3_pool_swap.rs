//! The only concrete handler shipped: decodes Uniswap v3 pool `Swap`
//! events, resolving token symbols/decimals from the pool contract the
//! first time it's asked to.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use ethers::types::Address;
use num_bigint::BigInt;
use num_traits::Zero;
use tracing::instrument;

use crate::bigint::div_floor;
use crate::chain::abi::{
    decode_address, decode_string, decode_swap_data, decode_topic_address, decode_uint8,
    encode_call_no_args,
};
use crate::chain::{ChainError, RpcClient};
use crate::events::handler::{Handler, HandlerError};

/// Resolved once, immutable thereafter.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub token_0_address: Address,
    pub token_1_address: Address,
    pub symbol_0: String,
    pub symbol_1: String,
    pub decimals_0: u8,
    pub decimals_1: u8,
    /// `10^(18 + decimals_0 - decimals_1)`.
    pub scale_0: BigInt,
    /// `10^(18 + decimals_1 - decimals_0)`.
    pub scale_1: BigInt,
}

fn scaling_factor(decimals_i: u8, decimals_j: u8) -> Result<BigInt, HandlerError> {
    let exponent = 18i32 + i32::from(decimals_i) - i32::from(decimals_j);
    let exponent: u32 = exponent
        .try_into()
        .map_err(|_| HandlerError::Chain(ChainError::UnexpectedAbiShape(
            "negative scaling exponent",
        )))?;
    Ok(BigInt::from(10u8).pow(exponent))
}

pub struct UniswapV3PoolSwapHandler {
    contract_address: Address,
    context: OnceLock<HandlerContext>,
}

impl UniswapV3PoolSwapHandler {
    pub fn new(contract_address: Address) -> Self {
        Self {
            contract_address,
            context: OnceLock::new(),
        }
    }

    async fn read_address(&self, rpc: &RpcClient, signature: &str) -> Result<Address, HandlerError> {
        let data = rpc
            .eth_call(self.contract_address, encode_call_no_args(signature))
            .await?;
        Ok(decode_address(&data)?)
    }

    async fn read_string(&self, rpc: &RpcClient, token: Address) -> Result<String, HandlerError> {
        let data = rpc.eth_call(token, encode_call_no_args("symbol()")).await?;
        Ok(decode_string(&data)?)
    }

    async fn read_decimals(&self, rpc: &RpcClient, token: Address) -> Result<u8, HandlerError> {
        let data = rpc
            .eth_call(token, encode_call_no_args("decimals()"))
            .await?;
        Ok(decode_uint8(&data)?)
    }
}

#[async_trait]
impl Handler for UniswapV3PoolSwapHandler {
    #[instrument(level = "debug", skip(self, rpc), fields(pool = ?self.contract_address))]
    async fn resolve_context(&self, rpc: &RpcClient) -> Result<(), HandlerError> {
        if self.context.get().is_some() {
            return Ok(());
        }

        let token_0_address = self.read_address(rpc, "token0()").await?;
        let token_1_address = self.read_address(rpc, "token1()").await?;

        let symbol_0 = self.read_string(rpc, token_0_address).await?;
        let symbol_1 = self.read_string(rpc, token_1_address).await?;
        let decimals_0 = self.read_decimals(rpc, token_0_address).await?;
        let decimals_1 = self.read_decimals(rpc, token_1_address).await?;

        let scale_0 = scaling_factor(decimals_0, decimals_1)?;
        let scale_1 = scaling_factor(decimals_1, decimals_0)?;

        let _ = self.context.set(HandlerContext {
            token_0_address,
            token_1_address,
            symbol_0,
            symbol_1,
            decimals_0,
            decimals_1,
            scale_0,
            scale_1,
        });

        Ok(())
    }

    fn decode(&self, raw_data: &str, topics: &[String]) -> BTreeMap<String, String> {
        let Some(context) = self.context.get() else {
            return BTreeMap::new();
        };

        let Ok(data) = hex::decode(raw_data.trim_start_matches("0x")) else {
            return BTreeMap::new();
        };
        let Ok(swap) = decode_swap_data(&data) else {
            return BTreeMap::new();
        };

        let sender = topics
            .get(1)
            .and_then(|t| decode_topic_address(t).ok())
            .unwrap_or_default();
        let recipient = topics
            .get(2)
            .and_then(|t| decode_topic_address(t).ok())
            .unwrap_or_default();

        let (swap_price_0, swap_price_1) =
            swap_prices(&context.scale_0, &context.scale_1, &swap.amount_0, &swap.amount_1);

        let mut fields = BTreeMap::new();
        fields.insert("sender".to_string(), format!("{sender:#x}"));
        fields.insert("recipient".to_string(), format!("{recipient:#x}"));
        fields.insert("symbol_0".to_string(), context.symbol_0.clone());
        fields.insert("symbol_1".to_string(), context.symbol_1.clone());
        fields.insert("amount_0".to_string(), swap.amount_0.to_string());
        fields.insert("amount_1".to_string(), swap.amount_1.to_string());
        fields.insert("swap_price_0".to_string(), swap_price_0.to_string());
        fields.insert("swap_price_1".to_string(), swap_price_1.to_string());
        fields.insert("sqrt_price_x96".to_string(), swap.sqrt_price_x96.to_string());
        fields.insert("liquidity".to_string(), swap.liquidity.to_string());
        fields.insert("tick".to_string(), swap.tick.to_string());
        fields
    }
}

/// Swap-price symmetry: zero either amount, both prices are zero;
/// otherwise each is the negated floor of the other amount scaled by the
/// complementary token's scaling factor.
fn swap_prices(
    scale_0: &BigInt,
    scale_1: &BigInt,
    amount_0: &BigInt,
    amount_1: &BigInt,
) -> (BigInt, BigInt) {
    if amount_0.is_zero() || amount_1.is_zero() {
        return (BigInt::zero(), BigInt::zero());
    }

    let swap_price_0 = -div_floor(&(scale_0 * amount_1), amount_0);
    let swap_price_1 = -div_floor(&(scale_1 * amount_0), amount_1);
    (swap_price_0, swap_price_1)
}
