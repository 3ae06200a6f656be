// src/trade/decrease.rs
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::market::MarketInfo;
use crate::math::rounding::{div_round, mul_div, Rounding};
use crate::math::{pnl, signed_add, signed_sub};
use crate::position::Position;
use crate::pricing::acceptable::{
    acceptable_price_for_fixed_impact_bps, acceptable_price_info, pick_mark_price,
};
use crate::pricing::fees::{position_fees, ui_fee_usd};
use crate::pricing::price_impact::capped_position_impact;
use crate::trade::next_values::PositionSizingCfg;
use crate::trade::quoted;
use crate::types::{SignedU256, TokenAmount, TokenData, TradeDirection, Usd};

pub struct DecreasePositionParams<'a> {
    pub market: &'a MarketInfo,
    pub index_token: &'a TokenData,
    pub collateral_token: &'a TokenData,
    /// The open position being reduced; its side drives every convention.
    pub position: &'a Position,
    /// Requested close size in USD. Clamped to the position size; a
    /// remainder under the dust threshold promotes it to a full close.
    pub close_size_usd: Usd,
    /// Release collateral proportionally so leverage stays put. Ignored
    /// on a full close, which always releases everything.
    pub keep_leverage: bool,
    /// Trigger orders exit-price the trade here instead of the live mark.
    pub trigger_price: Option<Usd>,
    /// When set, the acceptable price tolerates exactly this much negative
    /// impact and the live impact estimate is ignored for the payout too.
    pub fixed_acceptable_price_impact_bps: Option<u32>,
    /// Frontend fee factor, 1e18 fixed point. Zero disables it.
    pub ui_fee_factor_fp: U256,
    /// Referral-style rebate on the position fee, 1e18 fixed point.
    pub fee_discount_factor_fp: U256,
    pub sizing: &'a PositionSizingCfg,
}

/// Everything a decrease order needs for rendering and submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecreasePositionAmounts {
    pub size_delta_usd: Usd,
    pub size_delta_tokens: TokenAmount,

    /// Collateral released back to the trader, before exit costs.
    pub collateral_delta_usd: Usd,
    pub collateral_delta_amount: TokenAmount,

    pub index_price: Usd,
    pub collateral_price: Usd,

    pub acceptable_price: Usd,
    pub acceptable_price_delta_bps: SignedU256,

    /// PnL of the whole position at the exit price.
    pub estimated_pnl_usd: SignedU256,
    /// The share of it this close settles.
    pub realized_pnl_usd: SignedU256,

    pub position_fee_usd: Usd,
    pub fee_discount_usd: Usd,
    pub ui_fee_usd: Usd,
    pub borrowing_fee_usd: Usd,
    pub funding_fee_usd: Usd,

    pub position_price_impact_delta_usd: SignedU256,
    /// Negative impact the decrease-side cap clipped off. Claimable
    /// on-chain later, never charged against the payout here.
    pub price_impact_diff_usd: Usd,

    /// What the trader walks away with, in collateral-token terms.
    pub receive_usd: Usd,
    pub receive_token_amount: TokenAmount,

    pub is_full_close: bool,
}

/// Solve a decrease order.
///
/// The payout nets everything the close settles:
///
/// ```text
/// receive_usd = collateral_delta_usd + realized_pnl_usd
///             - position_fee_usd - ui_fee_usd
///             - borrowing_fee_usd - funding_fee_usd
///             + price_impact_usd
/// ```
///
/// clamped at zero. A close that would leave less than
/// `min_position_size_usd` behind becomes a full close. A zero close size
/// or an empty position yields zero amounts with the quotes filled in.
pub fn get_decrease_position_amounts(
    params: &DecreasePositionParams<'_>,
) -> EngineResult<DecreasePositionAmounts> {
    if params.market.is_disabled {
        return Err(EngineError::InvalidMarket("decrease_on_disabled_market"));
    }
    if params.market.is_spot_only {
        return Err(EngineError::InvalidMarket("decrease_on_spot_only_market"));
    }

    let pos = params.position;
    let side = pos.side;

    let index_prices = quoted(params.index_token)?;
    let collateral_prices = quoted(params.collateral_token)?;
    let collateral_price = collateral_prices.min;

    let index_price = match params.trigger_price {
        Some(price) => price,
        None => pick_mark_price(&index_prices, TradeDirection::Decrease, side),
    };

    let mut values = DecreasePositionAmounts {
        size_delta_usd: U256::zero(),
        size_delta_tokens: U256::zero(),
        collateral_delta_usd: U256::zero(),
        collateral_delta_amount: U256::zero(),
        index_price,
        collateral_price,
        acceptable_price: index_price,
        acceptable_price_delta_bps: SignedU256::zero(),
        estimated_pnl_usd: SignedU256::zero(),
        realized_pnl_usd: SignedU256::zero(),
        position_fee_usd: U256::zero(),
        fee_discount_usd: U256::zero(),
        ui_fee_usd: U256::zero(),
        borrowing_fee_usd: U256::zero(),
        funding_fee_usd: U256::zero(),
        position_price_impact_delta_usd: SignedU256::zero(),
        price_impact_diff_usd: U256::zero(),
        receive_usd: U256::zero(),
        receive_token_amount: U256::zero(),
        is_full_close: false,
    };

    if params.close_size_usd.is_zero() || pos.size_usd.is_zero() {
        return Ok(values);
    }

    // 1) close size, with the dust promotion
    let mut size_delta_usd = params.close_size_usd.min(pos.size_usd);
    let remainder = pos.size_usd - size_delta_usd;
    let is_full_close = remainder.is_zero() || remainder < params.sizing.min_position_size_usd;
    if is_full_close {
        size_delta_usd = pos.size_usd;
    }
    values.size_delta_usd = size_delta_usd;
    values.is_full_close = is_full_close;

    // Any touch settles the pending carry-overs in full.
    values.borrowing_fee_usd = pos.pending_borrowing_fee_usd;
    values.funding_fee_usd = pos.pending_funding_fee_usd;

    // 2) index tokens removed, rounded against the trader
    values.size_delta_tokens = pnl::size_delta_in_tokens_for_decrease(
        side,
        pos.size_usd,
        pos.size_tokens,
        size_delta_usd,
        is_full_close,
    )?;

    // 3) pnl at the exit price; the token-proportional share settles now
    values.estimated_pnl_usd =
        pnl::position_pnl_at_price(side, pos.size_usd, pos.size_tokens, index_price)?;
    values.realized_pnl_usd = pnl::realized_pnl_usd(
        values.estimated_pnl_usd,
        values.size_delta_tokens,
        pos.size_tokens,
    )?;

    // 4) collateral release policy
    let collateral_usd = pos.collateral_usd(&collateral_prices)?;
    if is_full_close {
        values.collateral_delta_usd = collateral_usd;
        values.collateral_delta_amount = pos.collateral_amount;
    } else if params.keep_leverage {
        values.collateral_delta_usd =
            mul_div(collateral_usd, size_delta_usd, pos.size_usd, Rounding::Down)?;
        values.collateral_delta_amount =
            div_round(values.collateral_delta_usd, collateral_price, Rounding::Down)?;
    }

    // 5) impact of shrinking this side's open interest
    let impact =
        capped_position_impact(params.market, SignedU256::neg(size_delta_usd), side, true)?;
    values.price_impact_diff_usd = impact.price_impact_diff_usd;

    // 6) fees on the closed size
    let fees = position_fees(
        &params.market.fees,
        size_delta_usd,
        impact.balance_was_improved,
        params.fee_discount_factor_fp,
    )?;
    values.position_fee_usd = fees.position_fee_usd;
    values.fee_discount_usd = fees.fee_discount_usd;
    values.ui_fee_usd = ui_fee_usd(size_delta_usd, params.ui_fee_factor_fp)?;

    // 7) acceptable price; a fixed-bps override replaces the live impact
    //    entirely, payout included
    let acceptable = match params.fixed_acceptable_price_impact_bps {
        Some(max_bps) => acceptable_price_for_fixed_impact_bps(
            index_price,
            size_delta_usd,
            max_bps,
            TradeDirection::Decrease,
            side,
        )?,
        None => acceptable_price_info(
            index_price,
            size_delta_usd,
            impact.impact_usd,
            TradeDirection::Decrease,
            side,
        )?,
    };
    values.acceptable_price = acceptable.acceptable_price;
    values.acceptable_price_delta_bps = acceptable.acceptable_price_delta_bps;
    values.position_price_impact_delta_usd = acceptable.price_impact_usd;

    // 8) payout: one signed sum, clamped at zero once. Clamping term by
    //    term would let a positive impact credit revive a payout that a
    //    realized loss already consumed.
    let costs_usd = values
        .position_fee_usd
        .checked_add(values.ui_fee_usd)
        .and_then(|acc| acc.checked_add(values.borrowing_fee_usd))
        .and_then(|acc| acc.checked_add(values.funding_fee_usd))
        .ok_or(EngineError::Overflow("decrease_costs_usd"))?;
    let mut total = signed_add(
        SignedU256::pos(values.collateral_delta_usd),
        values.realized_pnl_usd,
    );
    total = signed_sub(total, SignedU256::pos(costs_usd));
    total = signed_add(total, values.position_price_impact_delta_usd);
    values.receive_usd = if total.is_negative {
        U256::zero()
    } else {
        total.mag
    };
    values.receive_token_amount =
        div_round(values.receive_usd, collateral_price, Rounding::Down)?;

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{ImpactCfg, MarketFeesCfg};
    use crate::math::{float_one, usd_one};
    use crate::types::{AssetId, MarketId, Side, TokenPrices};

    fn usd(x: u64) -> U256 {
        U256::from(x) * usd_one()
    }

    /// Flat 1% position fee, zero impact factors: payout arithmetic stays
    /// in whole dollars.
    fn flat_fee_market() -> MarketInfo {
        MarketInfo {
            id: MarketId(1),
            index_token: AssetId(1),
            long_token: AssetId(1),
            short_token: AssetId(2),
            pool_amount_long: U256::from(1_000_000u64),
            pool_amount_short: U256::from(1_000_000u64),
            oi_long_usd: usd(100_000),
            oi_short_usd: usd(100_000),
            is_disabled: false,
            is_spot_only: false,
            fees: MarketFeesCfg {
                swap_fee_factor_positive: U256::zero(),
                swap_fee_factor_negative: U256::zero(),
                position_fee_factor_positive: float_one() / 100,
                position_fee_factor_negative: float_one() / 100,
            },
            impact: ImpactCfg {
                position_impact_exponent: 2,
                position_impact_factor_positive: U256::zero(),
                position_impact_factor_negative: U256::zero(),
                swap_impact_exponent: 2,
                swap_impact_factor_positive: U256::zero(),
                swap_impact_factor_negative: U256::zero(),
                max_position_impact_factor_positive: float_one() * 5 / 1_000,
                max_position_impact_factor_negative: float_one() * 5 / 1_000,
                max_swap_impact_factor: float_one() * 5 / 1_000,
            },
        }
    }

    /// Same fees, but the default quadratic impact curve is live.
    fn impact_market() -> MarketInfo {
        MarketInfo {
            impact: ImpactCfg::default_quadratic(),
            ..flat_fee_market()
        }
    }

    fn index_token(price: u64) -> TokenData {
        TokenData::new(
            AssetId(1),
            18,
            TokenPrices {
                min: usd(price),
                max: usd(price),
            },
        )
    }

    fn stable_token() -> TokenData {
        TokenData::new(
            AssetId(2),
            6,
            TokenPrices {
                min: usd(1),
                max: usd(1),
            },
        )
    }

    /// Long, entered at $100/atom: 10 atoms backing $1,000 of size, with
    /// $200 of stable collateral and $5 of pending carry-overs.
    fn long_position() -> Position {
        Position {
            size_usd: usd(1_000),
            size_tokens: U256::from(10u64),
            collateral_amount: U256::from(200u64),
            pending_borrowing_fee_usd: usd(3),
            pending_funding_fee_usd: usd(2),
            ..Position::empty(MarketId(1), AssetId(2), Side::Long)
        }
    }

    fn params<'a>(
        market: &'a MarketInfo,
        index: &'a TokenData,
        stable: &'a TokenData,
        position: &'a Position,
        sizing: &'a PositionSizingCfg,
        close_size_usd: U256,
        keep_leverage: bool,
    ) -> DecreasePositionParams<'a> {
        DecreasePositionParams {
            market,
            index_token: index,
            collateral_token: stable,
            position,
            close_size_usd,
            keep_leverage,
            trigger_price: None,
            fixed_acceptable_price_impact_bps: None,
            ui_fee_factor_fp: U256::zero(),
            fee_discount_factor_fp: U256::zero(),
            sizing,
        }
    }

    #[test]
    fn partial_close_with_keep_leverage_nets_the_payout() {
        let market = flat_fee_market();
        let index = index_token(110);
        let stable = stable_token();
        let pos = long_position();
        let sizing = PositionSizingCfg::mvp();

        let amounts = get_decrease_position_amounts(&params(
            &market, &index, &stable, &pos, &sizing, usd(500), true,
        ))
        .unwrap();

        assert!(!amounts.is_full_close);
        assert_eq!(amounts.size_delta_usd, usd(500));
        // long partial close rounds the token share up: ceil(10 * 500/1000)
        assert_eq!(amounts.size_delta_tokens, U256::from(5u64));

        // whole position: 10 atoms * $110 - $1000 entry
        assert_eq!(amounts.estimated_pnl_usd, SignedU256::pos(usd(100)));
        assert_eq!(amounts.realized_pnl_usd, SignedU256::pos(usd(50)));

        // proportional release of the $200 collateral
        assert_eq!(amounts.collateral_delta_usd, usd(100));
        assert_eq!(amounts.collateral_delta_amount, U256::from(100u64));

        // 1% of 500
        assert_eq!(amounts.position_fee_usd, usd(5));
        assert_eq!(amounts.borrowing_fee_usd, usd(3));
        assert_eq!(amounts.funding_fee_usd, usd(2));

        // 100 + 50 - 5 - 3 - 2
        assert_eq!(amounts.receive_usd, usd(140));
        assert_eq!(amounts.receive_token_amount, U256::from(140u64));

        // zero impact: the bound sits on the mark
        assert_eq!(amounts.acceptable_price, usd(110));
        assert!(amounts.acceptable_price_delta_bps.is_zero());
    }

    #[test]
    fn dust_remainder_promotes_to_a_full_close() {
        let market = flat_fee_market();
        let index = index_token(110);
        let stable = stable_token();
        let pos = long_position();
        // $10 dust threshold: closing 999 of 1000 leaves $1 behind
        let sizing = PositionSizingCfg::mvp();

        let amounts = get_decrease_position_amounts(&params(
            &market, &index, &stable, &pos, &sizing, usd(999), false,
        ))
        .unwrap();

        assert!(amounts.is_full_close);
        assert_eq!(amounts.size_delta_usd, usd(1_000));
        assert_eq!(amounts.size_delta_tokens, U256::from(10u64));

        // full close releases the entire collateral regardless of keep_leverage
        assert_eq!(amounts.collateral_delta_usd, usd(200));
        assert_eq!(amounts.collateral_delta_amount, U256::from(200u64));

        assert_eq!(amounts.realized_pnl_usd, SignedU256::pos(usd(100)));
        // 200 + 100 - 10 (1% of 1000) - 3 - 2
        assert_eq!(amounts.receive_usd, usd(285));
    }

    #[test]
    fn without_keep_leverage_a_partial_close_releases_no_collateral() {
        let market = flat_fee_market();
        let index = index_token(110);
        let stable = stable_token();
        let pos = long_position();
        let sizing = PositionSizingCfg::mvp();

        let amounts = get_decrease_position_amounts(&params(
            &market, &index, &stable, &pos, &sizing, usd(500), false,
        ))
        .unwrap();

        assert_eq!(amounts.collateral_delta_usd, U256::zero());
        assert_eq!(amounts.collateral_delta_amount, U256::zero());
        // 0 + 50 - 5 - 3 - 2
        assert_eq!(amounts.receive_usd, usd(40));
    }

    #[test]
    fn trigger_price_drives_exit_pnl_and_the_bound() {
        let market = flat_fee_market();
        let index = index_token(110);
        let stable = stable_token();
        let pos = long_position();
        let sizing = PositionSizingCfg::mvp();

        let mut p = params(&market, &index, &stable, &pos, &sizing, usd(500), true);
        p.trigger_price = Some(usd(120));
        let amounts = get_decrease_position_amounts(&p).unwrap();

        assert_eq!(amounts.index_price, usd(120));
        // 10 atoms * $120 - $1000 entry
        assert_eq!(amounts.estimated_pnl_usd, SignedU256::pos(usd(200)));
        assert_eq!(amounts.realized_pnl_usd, SignedU256::pos(usd(100)));
        // 100 + 100 - 5 - 3 - 2
        assert_eq!(amounts.receive_usd, usd(190));
        assert_eq!(amounts.acceptable_price, usd(120));
    }

    #[test]
    fn fixed_bps_override_replaces_the_live_impact() {
        let market = flat_fee_market();
        let index = index_token(110);
        let stable = stable_token();
        let pos = long_position();
        let sizing = PositionSizingCfg::mvp();

        let mut p = params(&market, &index, &stable, &pos, &sizing, usd(500), true);
        p.fixed_acceptable_price_impact_bps = Some(100);
        let amounts = get_decrease_position_amounts(&p).unwrap();

        // 1% of 500, always charged as a loss
        assert_eq!(
            amounts.position_price_impact_delta_usd,
            SignedU256::neg(usd(5))
        );
        // 100 + 50 - 5 - 3 - 2 - 5
        assert_eq!(amounts.receive_usd, usd(135));

        // decrease+long keeps the min convention: 110 * 495/500
        assert_eq!(amounts.acceptable_price, usd_one() * 1_089 / 10);
        assert_eq!(
            amounts.acceptable_price_delta_bps,
            SignedU256::neg(U256::from(100u64))
        );
    }

    #[test]
    fn deep_negative_impact_is_clipped_and_recorded() {
        // Balanced OI, long close of 5000: the quadratic curve prices
        // -$100 raw, the 0.5% decrease cap allows only -$25.
        let market = impact_market();
        let index = index_token(100);
        let stable = stable_token();
        let pos = Position {
            size_usd: usd(8_000),
            size_tokens: U256::from(80u64),
            collateral_amount: U256::from(1_000u64),
            ..Position::empty(MarketId(1), AssetId(2), Side::Long)
        };
        let sizing = PositionSizingCfg::mvp();

        let amounts = get_decrease_position_amounts(&params(
            &market, &index, &stable, &pos, &sizing, usd(5_000), true,
        ))
        .unwrap();

        assert_eq!(
            amounts.position_price_impact_delta_usd,
            SignedU256::neg(usd(25))
        );
        assert_eq!(amounts.price_impact_diff_usd, usd(75));
        // release 625 of the 1000 collateral, 1% fee on 5000, impact -25
        assert_eq!(amounts.receive_usd, usd(550));
    }

    #[test]
    fn helpful_decrease_earns_capped_positive_impact() {
        // Long-heavy market: closing longs shrinks the imbalance to zero,
        // raw +$100 capped at 0.5% of the close.
        let mut market = impact_market();
        market.oi_long_usd = usd(110_000);
        market.oi_short_usd = usd(100_000);
        let index = index_token(100);
        let stable = stable_token();
        let pos = Position {
            size_usd: usd(20_000),
            size_tokens: U256::from(200u64),
            collateral_amount: U256::from(2_000u64),
            ..Position::empty(MarketId(1), AssetId(2), Side::Long)
        };
        let sizing = PositionSizingCfg::mvp();

        let amounts = get_decrease_position_amounts(&params(
            &market, &index, &stable, &pos, &sizing, usd(10_000), true,
        ))
        .unwrap();

        assert_eq!(
            amounts.position_price_impact_delta_usd,
            SignedU256::pos(usd(50))
        );
        assert_eq!(amounts.price_impact_diff_usd, U256::zero());
        // release 1000, 1% fee on 10000, impact +50
        assert_eq!(amounts.receive_usd, usd(950));
    }

    #[test]
    fn zero_close_size_yields_zero_amounts() {
        let market = flat_fee_market();
        let index = index_token(110);
        let stable = stable_token();
        let pos = long_position();
        let sizing = PositionSizingCfg::mvp();

        let amounts = get_decrease_position_amounts(&params(
            &market, &index, &stable, &pos, &sizing, U256::zero(), true,
        ))
        .unwrap();

        assert_eq!(amounts.size_delta_usd, U256::zero());
        assert_eq!(amounts.receive_usd, U256::zero());
        assert!(!amounts.is_full_close);
        // quotes still resolve
        assert_eq!(amounts.index_price, usd(110));
        assert_eq!(amounts.collateral_price, usd(1));
    }

    #[test]
    fn disabled_market_refuses_to_price() {
        let mut market = flat_fee_market();
        market.is_disabled = true;
        let index = index_token(110);
        let stable = stable_token();
        let pos = long_position();
        let sizing = PositionSizingCfg::mvp();

        let err = get_decrease_position_amounts(&params(
            &market, &index, &stable, &pos, &sizing, usd(500), true,
        ))
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidMarket(_)));
    }
}
