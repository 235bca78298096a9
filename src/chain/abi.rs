//! Manual ABI decoding helpers. The handler protocol decodes raw `eth_call`
//! return data and raw log payloads itself rather than through generated
//! contract bindings, so this module wraps `ethers::abi`'s primitive
//! decode routines with the exact shapes the handlers need.

use ethers::abi::{decode, ParamType, Token};
use ethers::types::Address;
use ethers::utils::keccak256;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::bigint::u256_to_signed_bigint;
use crate::chain::ChainError;

/// The first four bytes of `keccak256(signature)`, e.g. for `"token0()"`.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Builds `eth_call` input data for a no-argument read function.
pub fn encode_call_no_args(signature: &str) -> Vec<u8> {
    function_selector(signature).to_vec()
}

/// Decodes a single ABI `address` return value (right-aligned in 32 bytes).
pub fn decode_address(data: &[u8]) -> Result<Address, ChainError> {
    let tokens = decode(&[ParamType::Address], data).map_err(ChainError::Abi)?;
    match tokens.into_iter().next() {
        Some(Token::Address(addr)) => Ok(addr),
        _ => Err(ChainError::UnexpectedAbiShape("address")),
    }
}

/// Decodes a single ABI dynamic `string` return value.
pub fn decode_string(data: &[u8]) -> Result<String, ChainError> {
    let tokens = decode(&[ParamType::String], data).map_err(ChainError::Abi)?;
    match tokens.into_iter().next() {
        Some(Token::String(s)) => Ok(s),
        _ => Err(ChainError::UnexpectedAbiShape("string")),
    }
}

/// Decodes a single ABI `uint8` return value.
pub fn decode_uint8(data: &[u8]) -> Result<u8, ChainError> {
    let tokens = decode(&[ParamType::Uint(8)], data).map_err(ChainError::Abi)?;
    match tokens.into_iter().next() {
        Some(Token::Uint(value)) => Ok(value.low_u32() as u8),
        _ => Err(ChainError::UnexpectedAbiShape("uint8")),
    }
}

/// A topic entry holding an indexed `address` argument, right-aligned in
/// the 32-byte word.
pub fn decode_topic_address(topic: &str) -> Result<Address, ChainError> {
    let trimmed = topic.trim_start_matches("0x");
    let bytes = hex::decode(trimmed).map_err(|_| ChainError::UnexpectedAbiShape("topic"))?;
    if bytes.len() != 32 {
        return Err(ChainError::UnexpectedAbiShape("topic"));
    }
    Ok(Address::from_slice(&bytes[12..]))
}

/// The decoded body of a Uniswap v3 pool `Swap` event's non-indexed data:
/// `(int256 amount_0, int256 amount_1, uint160 sqrtPriceX96, uint128 liquidity, int24 tick)`.
pub struct SwapData {
    pub amount_0: BigInt,
    pub amount_1: BigInt,
    pub sqrt_price_x96: BigInt,
    pub liquidity: BigInt,
    pub tick: i32,
}

pub fn decode_swap_data(data: &[u8]) -> Result<SwapData, ChainError> {
    let tokens = decode(
        &[
            ParamType::Int(256),
            ParamType::Int(256),
            ParamType::Uint(160),
            ParamType::Uint(128),
            ParamType::Int(24),
        ],
        data,
    )
    .map_err(ChainError::Abi)?;

    let mut iter = tokens.into_iter();
    let amount_0 = expect_int(&mut iter)?;
    let amount_1 = expect_int(&mut iter)?;
    let sqrt_price_x96 = expect_uint(&mut iter)?;
    let liquidity = expect_uint(&mut iter)?;
    let tick_raw = expect_int(&mut iter)?;

    Ok(SwapData {
        amount_0,
        amount_1,
        sqrt_price_x96,
        liquidity,
        tick: tick_raw
            .to_i32()
            .ok_or(ChainError::UnexpectedAbiShape("tick out of i32 range"))?,
    })
}

fn expect_int(iter: &mut impl Iterator<Item = Token>) -> Result<BigInt, ChainError> {
    match iter.next() {
        Some(Token::Int(raw)) => Ok(u256_to_signed_bigint(raw)),
        _ => Err(ChainError::UnexpectedAbiShape("int")),
    }
}

fn expect_uint(iter: &mut impl Iterator<Item = Token>) -> Result<BigInt, ChainError> {
    match iter.next() {
        Some(Token::Uint(raw)) => Ok(u256_to_signed_bigint(raw)),
        _ => Err(ChainError::UnexpectedAbiShape("uint")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_matches_known_signature() {
        // token0() -> 0x0dfe1681
        assert_eq!(function_selector("token0()"), [0x0d, 0xfe, 0x16, 0x81]);
    }

    #[test]
    fn topic_address_reads_right_aligned_bytes() {
        let topic = format!("0x{}{}", "0".repeat(24), "a".repeat(40));
        let addr = decode_topic_address(&topic).unwrap();
        assert_eq!(format!("{addr:x}"), "a".repeat(40));
    }
}
