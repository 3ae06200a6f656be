// src/math/pnl.rs
use primitive_types::U256;

use crate::error::EngineError;
use crate::math::rounding::{div_round, Rounding};
use crate::math::{bps_divisor, mul_div};
use crate::types::{Side, SignedU256, TokenAmount, TokenPrices, Usd};

/// Quote side used when valuing an open position: the conservative one.
pub fn pnl_quote_price(side: Side, prices: &TokenPrices) -> Usd {
    match side {
        Side::Long => prices.min,
        Side::Short => prices.max,
    }
}

/// Position PnL at an explicit index price.
///
/// Assumptions:
/// - size_tokens is in atoms
/// - index_price is USD(1e30) per atom
/// - size_usd is USD(1e30)
pub fn position_pnl_at_price(
    side: Side,
    size_usd: Usd,
    size_tokens: TokenAmount,
    index_price: Usd,
) -> Result<SignedU256, EngineError> {
    if size_usd.is_zero() && size_tokens.is_zero() {
        return Ok(SignedU256::zero());
    }

    // value_usd = size_tokens * price_per_atom
    let value = size_tokens
        .checked_mul(index_price)
        .ok_or(EngineError::Overflow("position_pnl_value"))?;

    let pnl = match side {
        Side::Long => {
            // pnl = value - entry
            if value >= size_usd {
                SignedU256::pos(value - size_usd)
            } else {
                SignedU256::neg(size_usd - value)
            }
        }
        Side::Short => {
            // pnl = entry - value
            if size_usd >= value {
                SignedU256::pos(size_usd - value)
            } else {
                SignedU256::neg(value - size_usd)
            }
        }
    };
    Ok(pnl)
}

/// Position PnL at the conservative oracle quote for the side.
pub fn position_pnl_usd(
    side: Side,
    size_usd: Usd,
    size_tokens: TokenAmount,
    prices: &TokenPrices,
) -> Result<SignedU256, EngineError> {
    position_pnl_at_price(side, size_usd, size_tokens, pnl_quote_price(side, prices))
}

/// Realized share of the total PnL for a partial close, floor on magnitude.
pub fn realized_pnl_usd(
    total_pnl_usd: SignedU256,
    size_delta_tokens: TokenAmount,
    pos_size_tokens: TokenAmount,
) -> Result<SignedU256, EngineError> {
    if pos_size_tokens.is_zero() {
        return Err(EngineError::DivisionByZero("realized_pnl"));
    }
    if size_delta_tokens.is_zero() || total_pnl_usd.mag.is_zero() {
        return Ok(SignedU256::zero());
    }
    if size_delta_tokens > pos_size_tokens {
        return Err(EngineError::Overflow("realized_pnl_share"));
    }
    let mag = mul_div(
        total_pnl_usd.mag,
        size_delta_tokens,
        pos_size_tokens,
        Rounding::Down,
    )?;

    if mag.is_zero() {
        return Ok(SignedU256::zero());
    }

    Ok(if total_pnl_usd.is_negative {
        SignedU256::neg(mag)
    } else {
        SignedU256::pos(mag)
    })
}

/// Index tokens removed by a decrease:
/// - full close => all tokens
/// - partial:
///   - long => ceil(size_tokens * size_delta_usd / size_usd)
///   - short => floor(...)
pub fn size_delta_in_tokens_for_decrease(
    side: Side,
    size_usd: Usd,
    size_tokens: TokenAmount,
    size_delta_usd: Usd,
    is_full_close: bool,
) -> Result<TokenAmount, EngineError> {
    if is_full_close || size_delta_usd == size_usd {
        return Ok(size_tokens);
    }
    if size_usd.is_zero() || size_tokens.is_zero() || size_delta_usd.is_zero() {
        return Err(EngineError::InvalidMarket("decrease_on_empty_position"));
    }
    if size_delta_usd > size_usd {
        return Err(EngineError::Overflow("size_delta_exceeds_position"));
    }

    let rounding = match side {
        Side::Long => Rounding::Up,
        Side::Short => Rounding::Down,
    };
    let t = mul_div(size_tokens, size_delta_usd, size_usd, rounding)?;
    Ok(t.min(size_tokens))
}

/// Index tokens added by an increase: long entries round down, short
/// entries round up, both against the trader.
pub fn size_delta_in_tokens_for_increase(
    side: Side,
    size_delta_usd: Usd,
    index_price: Usd,
) -> Result<TokenAmount, EngineError> {
    if size_delta_usd.is_zero() {
        return Ok(U256::zero());
    }
    let rounding = match side {
        Side::Long => Rounding::Down,
        Side::Short => Rounding::Up,
    };
    div_round(size_delta_usd, index_price, rounding)
}

/// Average entry price per atom, or None for an empty position.
pub fn entry_price(size_usd: Usd, size_tokens: TokenAmount) -> Result<Option<Usd>, EngineError> {
    if size_tokens.is_zero() {
        return Ok(None);
    }
    Ok(Some(div_round(size_usd, size_tokens, Rounding::Down)?))
}

/// Leverage in basis points, or None when there is no collateral.
pub fn leverage_bps(size_usd: Usd, collateral_usd: Usd) -> Result<Option<U256>, EngineError> {
    if collateral_usd.is_zero() {
        return Ok(None);
    }
    Ok(Some(mul_div(
        size_usd,
        bps_divisor(),
        collateral_usd,
        Rounding::Down,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::usd_one;

    fn usd(x: u64) -> U256 {
        U256::from(x) * usd_one()
    }

    #[test]
    fn long_pnl_signs() {
        // 2 atoms at entry 100, price now 60 per atom => value 120, pnl +20.
        let pnl = position_pnl_at_price(Side::Long, usd(100), U256::from(2u64), usd(60)).unwrap();
        assert_eq!(pnl, SignedU256::pos(usd(20)));

        let pnl = position_pnl_at_price(Side::Long, usd(100), U256::from(2u64), usd(40)).unwrap();
        assert_eq!(pnl, SignedU256::neg(usd(20)));
    }

    #[test]
    fn short_pnl_signs() {
        let pnl = position_pnl_at_price(Side::Short, usd(100), U256::from(2u64), usd(40)).unwrap();
        assert_eq!(pnl, SignedU256::pos(usd(20)));

        let pnl = position_pnl_at_price(Side::Short, usd(100), U256::from(2u64), usd(60)).unwrap();
        assert_eq!(pnl, SignedU256::neg(usd(20)));
    }

    #[test]
    fn realized_share_floors_magnitude() {
        let total = SignedU256::neg(usd(10));
        let realized =
            realized_pnl_usd(total, U256::from(1u64), U256::from(3u64)).unwrap();
        // floor(10 / 3) on the magnitude, sign preserved
        assert!(realized.is_negative);
        assert_eq!(realized.mag, usd(10) / U256::from(3u64));
    }

    #[test]
    fn decrease_token_rounding_favors_protocol() {
        // 10 tokens, 100 usd size, close 33: long ceil -> 4, short floor -> 3.
        let long = size_delta_in_tokens_for_decrease(
            Side::Long,
            usd(100),
            U256::from(10u64),
            usd(33),
            false,
        )
        .unwrap();
        let short = size_delta_in_tokens_for_decrease(
            Side::Short,
            usd(100),
            U256::from(10u64),
            usd(33),
            false,
        )
        .unwrap();
        assert_eq!(long, U256::from(4u64));
        assert_eq!(short, U256::from(3u64));
    }

    #[test]
    fn leverage_is_none_without_collateral() {
        assert_eq!(leverage_bps(usd(100), U256::zero()).unwrap(), None);
        assert_eq!(
            leverage_bps(usd(100), usd(50)).unwrap(),
            Some(U256::from(20_000u64))
        );
    }
}
