// src/trade/increase.rs
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::market::MarketInfo;
use crate::math::rounding::{div_round, mul_div, Rounding};
use crate::math::{bps_divisor, pnl};
use crate::pricing::acceptable::{
    acceptable_price_for_fixed_impact_bps, acceptable_price_info, pick_mark_price,
};
use crate::pricing::fees::{position_fees, ui_fee_usd};
use crate::pricing::price_impact::capped_position_impact;
use crate::position::Position;
use crate::routing::router::{SwapPathResolver, SwapPathStats};
use crate::trade::quoted;
use crate::trade::swap::{
    get_swap_amounts_by_from_value, get_swap_amounts_by_to_value, SwapAmounts, SwapAmountsParams,
    SwapMode,
};
use crate::types::{
    tokens_equivalent, Side, SignedU256, TokenAmount, TokenData, TradeDirection, Usd,
};

/// How an increase order is sized. Each variant carries exactly the two
/// inputs its solve needs; everything else is derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncreaseStrategy {
    /// Fix the deposit, derive the size: size = net collateral x leverage.
    LeverageByCollateral {
        initial_collateral_amount: TokenAmount,
        /// Target leverage in basis points (2x = 20_000).
        leverage_bps: U256,
    },
    /// Fix the size, back-solve the deposit through the collateral swap.
    LeverageBySize {
        index_token_amount: TokenAmount,
        leverage_bps: U256,
    },
    /// Fix both sides independently; leverage becomes an output.
    Independent {
        initial_collateral_amount: TokenAmount,
        index_token_amount: TokenAmount,
    },
}

pub struct IncreasePositionParams<'a> {
    pub market: &'a MarketInfo,
    pub index_token: &'a TokenData,
    /// Token the trader pays with. Swapped into `collateral_token` when
    /// the two are not equivalent.
    pub initial_collateral_token: &'a TokenData,
    pub collateral_token: &'a TokenData,
    pub side: Side,
    pub strategy: IncreaseStrategy,
    /// Existing position when topping one up; carries the pending fees.
    pub position: Option<&'a Position>,
    /// Limit orders entry-price the trade here instead of the live mark.
    pub trigger_price: Option<Usd>,
    /// When set, the acceptable price tolerates exactly this much negative
    /// impact and the live impact estimate is ignored for it.
    pub fixed_acceptable_price_impact_bps: Option<u32>,
    /// Frontend fee factor, 1e18 fixed point. Zero disables it.
    pub ui_fee_factor_fp: U256,
    /// Referral-style rebate on the position fee, 1e18 fixed point.
    pub fee_discount_factor_fp: U256,
    pub resolver: &'a dyn SwapPathResolver,
}

/// Everything an increase order needs for rendering and submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncreasePositionAmounts {
    /// What the trader pays, in the pay token.
    pub initial_collateral_amount: TokenAmount,
    pub initial_collateral_usd: Usd,

    /// What actually backs the position after every deduction.
    pub collateral_delta_usd: Usd,
    pub collateral_delta_amount: TokenAmount,

    pub size_delta_usd: Usd,
    pub size_delta_tokens: TokenAmount,

    /// Requested leverage, or the derived one for `Independent` sizing.
    pub estimated_leverage_bps: Option<U256>,

    pub index_price: Usd,
    pub initial_collateral_price: Usd,
    pub collateral_price: Usd,

    pub acceptable_price: Usd,
    pub acceptable_price_delta_bps: SignedU256,

    pub position_fee_usd: Usd,
    pub fee_discount_usd: Usd,
    pub ui_fee_usd: Usd,
    pub swap_ui_fee_usd: Usd,
    pub borrowing_fee_usd: Usd,
    pub funding_fee_usd: Usd,

    pub position_price_impact_delta_usd: SignedU256,

    pub swap_path_stats: Option<SwapPathStats>,
}

fn swap_volume_usd(stats: Option<&SwapPathStats>) -> Usd {
    stats
        .map(SwapPathStats::total_swap_volume_usd)
        .unwrap_or_default()
}

/// Collateral swaps inside an increase run with a zero UI factor: the
/// order charges the swap-UI fee itself, priced on the route volume, so
/// the swap layer must not charge it a second time.
fn collateral_swap_by_from(
    params: &IncreasePositionParams<'_>,
    amount_in: TokenAmount,
) -> EngineResult<SwapAmounts> {
    get_swap_amounts_by_from_value(
        &SwapAmountsParams {
            token_in: params.initial_collateral_token,
            token_out: params.collateral_token,
            mode: SwapMode::Market,
            ui_fee_factor_fp: U256::zero(),
            resolver: params.resolver,
        },
        amount_in,
    )
}

fn collateral_swap_by_to(
    params: &IncreasePositionParams<'_>,
    amount_out: TokenAmount,
) -> EngineResult<SwapAmounts> {
    get_swap_amounts_by_to_value(
        &SwapAmountsParams {
            token_in: params.initial_collateral_token,
            token_out: params.collateral_token,
            mode: SwapMode::Market,
            ui_fee_factor_fp: U256::zero(),
            resolver: params.resolver,
        },
        amount_out,
    )
}

/// Solve an increase order.
///
/// All three strategies share one cost model. `base_collateral_usd`, the
/// swapped-in deposit value, covers the collateral delta plus every fee
/// the order settles:
///
/// ```text
/// base_collateral_usd = collateral_delta_usd
///                     + position_fee_usd + borrowing_fee_usd
///                     + funding_fee_usd + ui_fee_usd + swap_ui_fee_usd
/// ```
///
/// `LeverageByCollateral` fixes the left side and nets fees out of it;
/// `LeverageBySize` fixes the right side and back-solves the deposit.
/// Degenerate sizing inputs yield zero amounts with the quotes filled in.
pub fn get_increase_position_amounts(
    params: &IncreasePositionParams<'_>,
) -> EngineResult<IncreasePositionAmounts> {
    if params.market.is_disabled {
        return Err(EngineError::InvalidMarket("increase_on_disabled_market"));
    }
    if params.market.is_spot_only {
        return Err(EngineError::InvalidMarket("increase_on_spot_only_market"));
    }

    let index_prices = quoted(params.index_token)?;
    let initial_collateral_price = quoted(params.initial_collateral_token)?.min;
    let collateral_price =
        if tokens_equivalent(params.initial_collateral_token, params.collateral_token) {
            initial_collateral_price
        } else {
            quoted(params.collateral_token)?.min
        };

    let index_price = match params.trigger_price {
        Some(price) => price,
        None => pick_mark_price(&index_prices, TradeDirection::Increase, params.side),
    };

    let (borrowing_fee_usd, funding_fee_usd) = match params.position {
        Some(position) => (
            position.pending_borrowing_fee_usd,
            position.pending_funding_fee_usd,
        ),
        None => (U256::zero(), U256::zero()),
    };

    let mut values = IncreasePositionAmounts {
        initial_collateral_amount: U256::zero(),
        initial_collateral_usd: U256::zero(),
        collateral_delta_usd: U256::zero(),
        collateral_delta_amount: U256::zero(),
        size_delta_usd: U256::zero(),
        size_delta_tokens: U256::zero(),
        estimated_leverage_bps: None,
        index_price,
        initial_collateral_price,
        collateral_price,
        acceptable_price: index_price,
        acceptable_price_delta_bps: SignedU256::zero(),
        position_fee_usd: U256::zero(),
        fee_discount_usd: U256::zero(),
        ui_fee_usd: U256::zero(),
        swap_ui_fee_usd: U256::zero(),
        borrowing_fee_usd,
        funding_fee_usd,
        position_price_impact_delta_usd: SignedU256::zero(),
        swap_path_stats: None,
    };

    match params.strategy {
        IncreaseStrategy::LeverageByCollateral {
            initial_collateral_amount,
            leverage_bps,
        } => {
            if initial_collateral_amount.is_zero() || leverage_bps.is_zero() {
                return Ok(values);
            }
            values.estimated_leverage_bps = Some(leverage_bps);
            values.initial_collateral_amount = initial_collateral_amount;
            values.initial_collateral_usd = initial_collateral_amount
                .checked_mul(initial_collateral_price)
                .ok_or(EngineError::Overflow("initial_collateral_usd"))?;

            let swap = collateral_swap_by_from(params, initial_collateral_amount)?;
            values.swap_ui_fee_usd = ui_fee_usd(
                swap_volume_usd(swap.swap_path_stats.as_ref()),
                params.ui_fee_factor_fp,
            )?;

            let base_collateral_usd = swap
                .amount_out
                .checked_mul(collateral_price)
                .ok_or(EngineError::Overflow("base_collateral_usd"))?;

            // First pass sizes fees on the gross figure, second pass
            // reprices them on the size the net collateral supports.
            let base_size_delta_usd =
                mul_div(base_collateral_usd, leverage_bps, bps_divisor(), Rounding::Down)?;
            let base_impact = capped_position_impact(
                params.market,
                SignedU256::pos(base_size_delta_usd),
                params.side,
                false,
            )?;
            let base_fees = position_fees(
                &params.market.fees,
                base_size_delta_usd,
                base_impact.balance_was_improved,
                params.fee_discount_factor_fp,
            )?;
            let base_ui_fee_usd = ui_fee_usd(base_size_delta_usd, params.ui_fee_factor_fp)?;

            let net_collateral_usd = base_collateral_usd
                .saturating_sub(base_fees.position_fee_usd)
                .saturating_sub(base_ui_fee_usd)
                .saturating_sub(values.swap_ui_fee_usd);
            values.size_delta_usd =
                mul_div(net_collateral_usd, leverage_bps, bps_divisor(), Rounding::Down)?;

            let impact = capped_position_impact(
                params.market,
                SignedU256::pos(values.size_delta_usd),
                params.side,
                false,
            )?;
            let fees = position_fees(
                &params.market.fees,
                values.size_delta_usd,
                impact.balance_was_improved,
                params.fee_discount_factor_fp,
            )?;
            values.position_fee_usd = fees.position_fee_usd;
            values.fee_discount_usd = fees.fee_discount_usd;
            values.ui_fee_usd = ui_fee_usd(values.size_delta_usd, params.ui_fee_factor_fp)?;

            values.collateral_delta_usd = base_collateral_usd
                .saturating_sub(values.position_fee_usd)
                .saturating_sub(values.borrowing_fee_usd)
                .saturating_sub(values.funding_fee_usd)
                .saturating_sub(values.ui_fee_usd)
                .saturating_sub(values.swap_ui_fee_usd);
            values.collateral_delta_amount =
                div_round(values.collateral_delta_usd, collateral_price, Rounding::Down)?;
            values.swap_path_stats = swap.swap_path_stats;
        }

        IncreaseStrategy::LeverageBySize {
            index_token_amount,
            leverage_bps,
        } => {
            if index_token_amount.is_zero() || leverage_bps.is_zero() {
                return Ok(values);
            }
            values.estimated_leverage_bps = Some(leverage_bps);
            values.size_delta_usd = index_token_amount
                .checked_mul(index_price)
                .ok_or(EngineError::Overflow("size_delta_usd"))?;

            let impact = capped_position_impact(
                params.market,
                SignedU256::pos(values.size_delta_usd),
                params.side,
                false,
            )?;
            let fees = position_fees(
                &params.market.fees,
                values.size_delta_usd,
                impact.balance_was_improved,
                params.fee_discount_factor_fp,
            )?;
            values.position_fee_usd = fees.position_fee_usd;
            values.fee_discount_usd = fees.fee_discount_usd;
            values.ui_fee_usd = ui_fee_usd(values.size_delta_usd, params.ui_fee_factor_fp)?;

            values.collateral_delta_usd =
                mul_div(values.size_delta_usd, bps_divisor(), leverage_bps, Rounding::Down)?;
            values.collateral_delta_amount =
                div_round(values.collateral_delta_usd, collateral_price, Rounding::Down)?;

            // Deposit value needed before the swap-UI fee is known.
            let collateral_before_swap_fee_usd = values
                .collateral_delta_usd
                .checked_add(values.position_fee_usd)
                .and_then(|acc| acc.checked_add(values.borrowing_fee_usd))
                .and_then(|acc| acc.checked_add(values.funding_fee_usd))
                .and_then(|acc| acc.checked_add(values.ui_fee_usd))
                .ok_or(EngineError::Overflow("collateral_before_swap_fee_usd"))?;

            // The swap-UI fee depends on the route volume, which depends
            // on the target. One refinement pass: price the fee on a
            // first back-solve, grow the target by it, solve again.
            let first_target_amount = div_round(
                collateral_before_swap_fee_usd,
                collateral_price,
                Rounding::Up,
            )?;
            let first_pass = collateral_swap_by_to(params, first_target_amount)?;
            values.swap_ui_fee_usd = ui_fee_usd(
                swap_volume_usd(first_pass.swap_path_stats.as_ref()),
                params.ui_fee_factor_fp,
            )?;

            let base_collateral_usd = collateral_before_swap_fee_usd
                .checked_add(values.swap_ui_fee_usd)
                .ok_or(EngineError::Overflow("base_collateral_usd"))?;
            let target_amount = div_round(base_collateral_usd, collateral_price, Rounding::Up)?;
            let swap = collateral_swap_by_to(params, target_amount)?;

            values.initial_collateral_amount = swap.amount_in;
            values.initial_collateral_usd = swap.usd_in;
            values.swap_path_stats = swap.swap_path_stats;
        }

        IncreaseStrategy::Independent {
            initial_collateral_amount,
            index_token_amount,
        } => {
            if !index_token_amount.is_zero() {
                values.size_delta_usd = index_token_amount
                    .checked_mul(index_price)
                    .ok_or(EngineError::Overflow("size_delta_usd"))?;

                let impact = capped_position_impact(
                    params.market,
                    SignedU256::pos(values.size_delta_usd),
                    params.side,
                    false,
                )?;
                let fees = position_fees(
                    &params.market.fees,
                    values.size_delta_usd,
                    impact.balance_was_improved,
                    params.fee_discount_factor_fp,
                )?;
                values.position_fee_usd = fees.position_fee_usd;
                values.fee_discount_usd = fees.fee_discount_usd;
                values.ui_fee_usd = ui_fee_usd(values.size_delta_usd, params.ui_fee_factor_fp)?;
            }

            if !initial_collateral_amount.is_zero() {
                values.initial_collateral_amount = initial_collateral_amount;
                values.initial_collateral_usd = initial_collateral_amount
                    .checked_mul(initial_collateral_price)
                    .ok_or(EngineError::Overflow("initial_collateral_usd"))?;

                let swap = collateral_swap_by_from(params, initial_collateral_amount)?;
                values.swap_ui_fee_usd = ui_fee_usd(
                    swap_volume_usd(swap.swap_path_stats.as_ref()),
                    params.ui_fee_factor_fp,
                )?;

                let base_collateral_usd = swap
                    .amount_out
                    .checked_mul(collateral_price)
                    .ok_or(EngineError::Overflow("base_collateral_usd"))?;
                values.collateral_delta_usd = base_collateral_usd
                    .saturating_sub(values.position_fee_usd)
                    .saturating_sub(values.borrowing_fee_usd)
                    .saturating_sub(values.funding_fee_usd)
                    .saturating_sub(values.ui_fee_usd)
                    .saturating_sub(values.swap_ui_fee_usd);
                values.collateral_delta_amount =
                    div_round(values.collateral_delta_usd, collateral_price, Rounding::Down)?;
                values.swap_path_stats = swap.swap_path_stats;
            }

            values.estimated_leverage_bps =
                pnl::leverage_bps(values.size_delta_usd, values.collateral_delta_usd)?;
        }
    }

    values.size_delta_tokens =
        pnl::size_delta_in_tokens_for_increase(params.side, values.size_delta_usd, index_price)?;

    let impact = capped_position_impact(
        params.market,
        SignedU256::pos(values.size_delta_usd),
        params.side,
        false,
    )?;
    let acceptable = match params.fixed_acceptable_price_impact_bps {
        Some(max_bps) => acceptable_price_for_fixed_impact_bps(
            index_price,
            values.size_delta_usd,
            max_bps,
            TradeDirection::Increase,
            params.side,
        )?,
        None => acceptable_price_info(
            index_price,
            values.size_delta_usd,
            impact.impact_usd,
            TradeDirection::Increase,
            params.side,
        )?,
    };
    values.acceptable_price = acceptable.acceptable_price;
    values.acceptable_price_delta_bps = acceptable.acceptable_price_delta_bps;
    values.position_price_impact_delta_usd = acceptable.price_impact_usd;

    Ok(values)
}
