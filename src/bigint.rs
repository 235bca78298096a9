//! Arbitrary-precision helpers shared by the gas-quote and swap-price math.
//!
//! Amounts, prices and gas costs routinely exceed 64 bits, and the swap
//! price formula in the handler needs Euclidean (floor) division on signed
//! values, so everything here goes through `num-bigint` rather than the
//! machine integer types.

use ethers::types::U256;
use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::Zero;

/// Parses a 0x-prefixed hex string into a `BigUint`. Empty/`0x` decodes to zero.
pub fn parse_hex_biguint(value: &str) -> BigUint {
    let trimmed = value.trim_start_matches("0x").trim_start_matches("0X");
    if trimmed.is_empty() {
        return BigUint::zero();
    }
    BigUint::parse_bytes(trimmed.as_bytes(), 16).unwrap_or_else(BigUint::zero)
}

/// Parses a 0x-prefixed hex string into a `u64`, saturating on overflow.
pub fn parse_hex_u64(value: &str) -> u64 {
    let trimmed = value.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(trimmed, 16).unwrap_or(0)
}

/// Splits a decimal string such as `"1234.56"` into the digits with the
/// separator removed (`1234 56` -> `123456`) and the number of fractional
/// digits (here, `2`). Used to turn the oracle's `close` price into an
/// integer/decimals pair.
pub fn split_decimal_string(value: &str) -> (BigUint, u32) {
    match value.split_once('.') {
        Some((whole, frac)) => {
            let digits = format!("{whole}{frac}");
            let decimals = u32::try_from(frac.len()).unwrap_or(0);
            let integer = BigUint::parse_bytes(digits.as_bytes(), 10).unwrap_or_else(BigUint::zero);
            (integer, decimals)
        }
        None => (
            BigUint::parse_bytes(value.as_bytes(), 10).unwrap_or_else(BigUint::zero),
            0,
        ),
    }
}

/// 10^n as a `BigUint`.
pub fn pow10(n: u32) -> BigUint {
    BigUint::from(10u8).pow(n)
}

/// Converts a 256-bit two's-complement word (as returned by ABI-decoding a
/// Solidity `intN`, which is always sign-extended to 256 bits) into a signed
/// `BigInt`.
pub fn u256_to_signed_bigint(raw: U256) -> BigInt {
    let mut bytes = [0u8; 32];
    raw.to_big_endian(&mut bytes);
    let unsigned = BigUint::from_bytes_be(&bytes);
    let modulus = BigUint::from(1u8) << 256;
    let half = BigUint::from(1u8) << 255;
    if unsigned >= half {
        BigInt::from_biguint(Sign::Minus, modulus - unsigned)
    } else {
        BigInt::from_biguint(Sign::Plus, unsigned)
    }
}

/// Euclidean (floor) division of two signed `BigInt`s, rounding toward
/// negative infinity rather than truncating toward zero.
pub fn div_floor(numerator: &BigInt, denominator: &BigInt) -> BigInt {
    numerator.div_floor(denominator)
}
