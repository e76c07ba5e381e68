// 18-decimal fixed-point helpers.
//
// Products are carried in BigInt so mul-then-div never overflows; results are
// narrowed back to U256 and fail with MathOverflow when they do not fit.

use ethers::types::U256;
use num_bigint::{BigInt, Sign};
use num_traits::{Signed, Zero};

use crate::error::{EngineError, Result};

pub const WAD: u128 = 1_000_000_000_000_000_000;
const WAD_I128: i128 = WAD as i128;
const BPS_DENOMINATOR: u64 = 10_000;

#[inline]
pub fn wad() -> U256 {
    U256::from(WAD)
}

#[inline]
pub fn to_big(v: U256) -> BigInt {
    let mut bytes = [0u8; 32];
    v.to_big_endian(&mut bytes);
    BigInt::from_bytes_be(Sign::Plus, &bytes)
}

pub fn from_big(v: &BigInt) -> Result<U256> {
    if v.is_negative() {
        return Err(EngineError::MathOverflow("negative value narrowed to U256"));
    }
    let (_, bytes) = v.to_bytes_be();
    if bytes.len() > 32 {
        return Err(EngineError::MathOverflow("value exceeds 256 bits"));
    }
    Ok(U256::from_big_endian(&bytes))
}

pub fn to_u128(v: &BigInt) -> Result<u128> {
    let as_u256 = from_big(v)?;
    if as_u256 > U256::from(u128::MAX) {
        return Err(EngineError::MathOverflow("value exceeds 128 bits"));
    }
    Ok(as_u256.as_u128())
}

/// floor(a * b / d)
pub fn mul_div(a: U256, b: U256, d: U256) -> Result<U256> {
    if d.is_zero() {
        return Err(EngineError::DivisionByZero("mul_div"));
    }
    from_big(&((to_big(a) * to_big(b)) / to_big(d)))
}

/// ceil(a * b / d)
pub fn mul_div_rounding_up(a: U256, b: U256, d: U256) -> Result<U256> {
    if d.is_zero() {
        return Err(EngineError::DivisionByZero("mul_div_rounding_up"));
    }
    let num = to_big(a) * to_big(b);
    let den = to_big(d);
    let q = &num / &den;
    if (&num % &den).is_zero() {
        from_big(&q)
    } else {
        from_big(&(q + 1))
    }
}

/// a * b / 1e18
#[inline]
pub fn mul_wad(a: U256, b: U256) -> Result<U256> {
    mul_div(a, b, wad())
}

/// a * 1e18 / b
#[inline]
pub fn div_wad(a: U256, b: U256) -> Result<U256> {
    if b.is_zero() {
        return Err(EngineError::DivisionByZero("div_wad"));
    }
    mul_div(a, wad(), b)
}

/// v * (10_000 + bps) / 10_000
pub fn scale_up_bps(v: U256, bps: u32) -> Result<U256> {
    mul_div(v, U256::from(BPS_DENOMINATOR + bps as u64), U256::from(BPS_DENOMINATOR))
}

/// v * 10_000 / (10_000 + bps)
pub fn scale_down_bps(v: U256, bps: u32) -> Result<U256> {
    mul_div(v, U256::from(BPS_DENOMINATOR), U256::from(BPS_DENOMINATOR + bps as u64))
}

/// v * bps / 10_000
pub fn bps_of(v: U256, bps: u32) -> Result<U256> {
    mul_div(v, U256::from(bps), U256::from(BPS_DENOMINATOR))
}

/// Base-2 logarithm of a WAD value, returned as a signed WAD.
///
/// Integer part from the most significant bit, fractional part by repeated
/// squaring (one bit per iteration, 60 iterations cover 18 decimals).
/// Arguments below one are handled through `log2(x) = -log2(1/x)`.
pub fn log2_wad(x: U256) -> Result<i128> {
    if x.is_zero() {
        return Err(EngineError::InvalidPrice);
    }
    let unit = wad();
    let (sign, x) = if x >= unit {
        (1i128, x)
    } else {
        (-1i128, U256::exp10(36) / x)
    };

    let n = (x / unit).bits() - 1;
    let mut result = n as i128 * WAD_I128;

    // y in [1, 2) as WAD
    let mut y = (x >> n).as_u128();
    if y != WAD {
        let mut delta = WAD_I128 / 2;
        while delta > 0 {
            y = y * y / WAD;
            if y >= 2 * WAD {
                result += delta;
                y >>= 1;
            }
            delta >>= 1;
        }
    }
    Ok(result * sign)
}

/// 10^exp as U256.
#[inline]
pub fn pow10(exp: u32) -> U256 {
    U256::exp10(exp as usize)
}
