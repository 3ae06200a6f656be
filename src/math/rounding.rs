// src/math/rounding.rs
use primitive_types::{U256, U512};

use crate::error::EngineError;

/// Every division in the engine names its rounding direction explicitly.
/// Round up what the protocol will later subtract from the user, round
/// down what it credits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    Down, // floor
    Up,   // ceil
}

pub fn div_round(n: U256, d: U256, rounding: Rounding) -> Result<U256, EngineError> {
    if d.is_zero() {
        return Err(EngineError::DivisionByZero("div_round"));
    }
    let q = n / d;
    let r = n % d;
    Ok(match rounding {
        Rounding::Down => q,
        Rounding::Up => {
            if r.is_zero() {
                q
            } else {
                q + U256::one()
            }
        }
    })
}

fn u512_to_u256_checked(x: U512, op: &'static str) -> Result<U256, EngineError> {
    let be = x.to_big_endian();

    if be[..32].iter().any(|&b| b != 0) {
        return Err(EngineError::Overflow(op));
    }

    Ok(U256::from_big_endian(&be[32..]))
}

/// a * b / den in 512-bit intermediate precision.
pub fn mul_div(a: U256, b: U256, den: U256, rounding: Rounding) -> Result<U256, EngineError> {
    if den.is_zero() {
        return Err(EngineError::DivisionByZero("mul_div"));
    }
    let prod = U512::from(a) * U512::from(b);
    let den512 = U512::from(den);
    let mut q = prod / den512;
    if matches!(rounding, Rounding::Up) && !(prod % den512).is_zero() {
        q += U512::one();
    }
    u512_to_u256_checked(q, "mul_div")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_round_up_only_on_remainder() {
        let n = U256::from(10u64);
        let d = U256::from(5u64);
        assert_eq!(div_round(n, d, Rounding::Up).unwrap(), U256::from(2u64));
        assert_eq!(
            div_round(U256::from(11u64), d, Rounding::Up).unwrap(),
            U256::from(3u64)
        );
        assert_eq!(
            div_round(U256::from(11u64), d, Rounding::Down).unwrap(),
            U256::from(2u64)
        );
    }

    #[test]
    fn div_round_rejects_zero_divisor() {
        assert_eq!(
            div_round(U256::one(), U256::zero(), Rounding::Down),
            Err(EngineError::DivisionByZero("div_round"))
        );
    }

    #[test]
    fn mul_div_survives_u256_overflowing_product() {
        // (2^200 * 2^100) / 2^100 = 2^200: the product needs 512 bits.
        let a = U256::one() << 200;
        let b = U256::one() << 100;
        assert_eq!(mul_div(a, b, b, Rounding::Down).unwrap(), a);
    }

    #[test]
    fn mul_div_detects_result_overflow() {
        let max = U256::max_value();
        assert_eq!(
            mul_div(max, U256::from(2u64), U256::one(), Rounding::Down),
            Err(EngineError::Overflow("mul_div"))
        );
    }
}
