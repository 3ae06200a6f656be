// src/pricing/acceptable.rs
use primitive_types::U256;

use crate::error::EngineError;
use crate::math::rounding::{div_round, mul_div, Rounding};
use crate::math::{apply_bps, apply_signed_add_floor_zero, bps_divisor};
use crate::types::{Side, SignedU256, TokenPrices, TradeDirection, Usd};

/// Mark-price convention:
///
/// (Increase, Long) | (Decrease, Short): max quote
/// (Increase, Short)| (Decrease, Long) : min quote
///
/// The protocol always charges the side of the spread that favors it.
pub fn should_use_max_price(direction: TradeDirection, side: Side) -> bool {
    matches!(
        (direction, side),
        (TradeDirection::Increase, Side::Long) | (TradeDirection::Decrease, Side::Short)
    )
}

/// Index quote the trade executes against, before impact.
pub fn pick_mark_price(prices: &TokenPrices, direction: TradeDirection, side: Side) -> Usd {
    if should_use_max_price(direction, side) {
        prices.max
    } else {
        prices.min
    }
}

/// Acceptable price plus how far it sits from the mark.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcceptablePriceInfo {
    pub acceptable_price: Usd,
    /// Signed distance of acceptable from mark, in bps of mark.
    pub acceptable_price_delta_bps: SignedU256,
    /// Impact the price was solved from (live or back-solved).
    pub price_impact_usd: SignedU256,
}

fn price_delta_bps(acceptable: Usd, mark: Usd) -> Result<SignedU256, EngineError> {
    if mark.is_zero() {
        return Err(EngineError::DivisionByZero("acceptable_price_delta_bps"));
    }
    if acceptable >= mark {
        Ok(SignedU256::pos(mul_div(
            acceptable - mark,
            bps_divisor(),
            mark,
            Rounding::Down,
        )?))
    } else {
        Ok(SignedU256::neg(mul_div(
            mark - acceptable,
            bps_divisor(),
            mark,
            Rounding::Down,
        )?))
    }
}

/// Worst execution price the trader accepts for this step:
///
/// `acceptable = mark * (size_delta + impact') / size_delta`
///
/// where `impact'` is the price impact with its sign flipped under the
/// max-price convention (a loss must raise the bound there, not lower it).
/// An impact loss larger than the trade floors the numerator at zero.
pub fn acceptable_price_info(
    mark_price: Usd,
    size_delta_usd: Usd,
    price_impact_usd: SignedU256,
    direction: TradeDirection,
    side: Side,
) -> Result<AcceptablePriceInfo, EngineError> {
    if mark_price.is_zero() {
        return Err(EngineError::DivisionByZero("acceptable_price_mark"));
    }
    // 0) trivial branch: no size, the mark itself is acceptable
    if size_delta_usd.is_zero() {
        return Ok(AcceptablePriceInfo {
            acceptable_price: mark_price,
            acceptable_price_delta_bps: SignedU256::zero(),
            price_impact_usd,
        });
    }

    // 1) orient the impact to the quote convention
    let adjustment = if should_use_max_price(direction, side) {
        price_impact_usd.negated()
    } else {
        price_impact_usd
    };

    // 2) solve the price
    let numerator = apply_signed_add_floor_zero(size_delta_usd, adjustment);
    let acceptable_price = mul_div(mark_price, numerator, size_delta_usd, Rounding::Down)?;

    Ok(AcceptablePriceInfo {
        acceptable_price,
        acceptable_price_delta_bps: price_delta_bps(acceptable_price, mark_price)?,
        price_impact_usd,
    })
}

/// Limit / trigger variant: the caller fixes the worst tolerated negative
/// impact in bps and the impact amount is back-solved from it; the live
/// curve is not consulted.
pub fn acceptable_price_for_fixed_impact_bps(
    mark_price: Usd,
    size_delta_usd: Usd,
    max_negative_impact_bps: u32,
    direction: TradeDirection,
    side: Side,
) -> Result<AcceptablePriceInfo, EngineError> {
    let impact_usd = SignedU256::neg(apply_bps(size_delta_usd, max_negative_impact_bps)?);
    acceptable_price_info(mark_price, size_delta_usd, impact_usd, direction, side)
}

/// Convert signed impact USD -> signed index-token atoms.
///
///  - positive impact: max quote, round down (minimize the bonus)
///  - negative impact: min quote, round up (maximize the penalty)
pub fn price_impact_usd_to_tokens(
    impact_usd: SignedU256,
    index_prices: &TokenPrices,
) -> Result<SignedU256, EngineError> {
    if impact_usd.mag.is_zero() {
        return Ok(SignedU256::zero());
    }
    if !impact_usd.is_negative {
        let mag = div_round(impact_usd.mag, index_prices.max, Rounding::Down)?;
        Ok(SignedU256::pos(mag))
    } else {
        let mag = div_round(impact_usd.mag, index_prices.min, Rounding::Up)?;
        Ok(SignedU256::neg(mag))
    }
}
