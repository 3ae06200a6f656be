// src/trade/swap.rs
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::math::rounding::{div_round, mul_div, Rounding};
use crate::math::{apply_signed_add_floor_zero, usd_one};
use crate::pricing::fees::ui_fee_usd;
use crate::routing::router::{FindSwapPathOpts, SwapPathResolver, SwapPathStats};
use crate::trade::quoted;
use crate::types::{tokens_equivalent, TokenAmount, TokenData, Usd};

/// Market swap, or a limit swap pinned to a caller-fixed exchange ratio.
///
/// The trigger ratio is out-atoms per in-atom and shares the 1e30 scale of
/// USD quotes. Limit swaps route by liquidity instead of simulated output
/// because they execute later, at unknown pool state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapMode {
    Market,
    Limit { trigger_ratio_fp: U256 },
}

impl SwapMode {
    pub fn is_limit(&self) -> bool {
        matches!(self, SwapMode::Limit { .. })
    }

    fn path_opts(&self) -> FindSwapPathOpts {
        FindSwapPathOpts {
            by_liquidity: self.is_limit(),
            max_depth: None,
        }
    }
}

/// Inputs shared by both solve directions.
pub struct SwapAmountsParams<'a> {
    pub token_in: &'a TokenData,
    pub token_out: &'a TokenData,
    pub mode: SwapMode,
    /// Frontend fee factor, 1e18 fixed point. Zero disables it.
    pub ui_fee_factor_fp: U256,
    pub resolver: &'a dyn SwapPathResolver,
}

/// Everything a swap order needs for rendering and submission.
///
/// A degenerate input, an unroutable pair or costs exceeding the gross
/// output all yield zero amounts with `swap_path_stats` left as resolved;
/// none of those is an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapAmounts {
    pub amount_in: TokenAmount,
    pub usd_in: Usd,
    pub amount_out: TokenAmount,
    pub usd_out: Usd,

    pub price_in: Usd,
    pub price_out: Usd,

    /// Worst output the order may settle at. Equals `amount_out`;
    /// slippage allowances are the caller's concern.
    pub min_output_amount: TokenAmount,
    pub ui_fee_usd: Usd,
    pub swap_path_stats: Option<SwapPathStats>,
}

/// Solve `amount_out` from a fixed `amount_in`.
///
/// The input is valued at the in-token min quote. Equivalent tokens (same
/// id, or a wrapped/native pair) pass through 1:1 before any path or fee
/// is considered. Otherwise the resolved path supplies `usd_out`, the UI
/// fee (factor x usd_in) is subtracted, and `amount_out` settles at the
/// out-token max quote. In limit mode the trigger ratio fixes the gross
/// output and path fees + UI fee + price impact settle against it.
pub fn get_swap_amounts_by_from_value(
    params: &SwapAmountsParams<'_>,
    amount_in: TokenAmount,
) -> EngineResult<SwapAmounts> {
    let price_in = quoted(params.token_in)?.min;
    let price_out = quoted(params.token_out)?.max;

    let usd_in = amount_in
        .checked_mul(price_in)
        .ok_or(EngineError::Overflow("swap_usd_in"))?;

    let mut amounts = SwapAmounts {
        amount_in,
        usd_in,
        amount_out: U256::zero(),
        usd_out: U256::zero(),
        price_in,
        price_out,
        min_output_amount: U256::zero(),
        ui_fee_usd: U256::zero(),
        swap_path_stats: None,
    };

    if amount_in.is_zero() {
        return Ok(amounts);
    }

    // 1) equivalent tokens never touch the path: 1:1, no fees, no impact
    if tokens_equivalent(params.token_in, params.token_out) {
        amounts.amount_out = amount_in;
        amounts.usd_out = usd_in;
        amounts.min_output_amount = amount_in;
        return Ok(amounts);
    }

    // 2) resolve the path; no route renders zero amounts
    let stats = match params.resolver.find_swap_path(usd_in, &params.mode.path_opts()) {
        Some(stats) => stats,
        None => return Ok(amounts),
    };

    amounts.ui_fee_usd = ui_fee_usd(usd_in, params.ui_fee_factor_fp)?;

    // 3) settle the output
    match params.mode {
        SwapMode::Market => {
            amounts.usd_out = stats.usd_out.saturating_sub(amounts.ui_fee_usd);
        }
        SwapMode::Limit { trigger_ratio_fp } => {
            // The user pinned the rate; costs settle against the
            // ratio-derived gross output.
            let ratio_amount_out =
                mul_div(amount_in, trigger_ratio_fp, usd_one(), Rounding::Down)?;
            let gross_usd_out = ratio_amount_out
                .checked_mul(price_out)
                .ok_or(EngineError::Overflow("swap_ratio_usd_out"))?;
            let after_fees = gross_usd_out
                .saturating_sub(stats.total_swap_fee_usd)
                .saturating_sub(amounts.ui_fee_usd);
            amounts.usd_out = apply_signed_add_floor_zero(
                after_fees,
                stats.total_swap_price_impact_delta_usd,
            );
        }
    }

    amounts.amount_out = div_round(amounts.usd_out, price_out, Rounding::Down)?;
    amounts.min_output_amount = amounts.amount_out;
    amounts.swap_path_stats = Some(stats);
    Ok(amounts)
}

/// Solve `amount_in` from a fixed `amount_out` target.
///
/// The target is valued at the out-token MIN quote: the conservative side
/// for a caller that must end up with at least this much. The target USD
/// is routed as a proxy input to size the path, then rescaled:
///
/// `usd_in = usd_out * usd_out / simulated_usd_out`
///
/// a first-order correction for path curvature, not an exact inverse (its
/// error bound is covered by tests). The UI fee is added on top and
/// `amount_in` rounds up: the user must supply enough. In limit mode the
/// inverted trigger ratio fixes the gross input and path fees + UI fee are
/// added while price impact is subtracted.
pub fn get_swap_amounts_by_to_value(
    params: &SwapAmountsParams<'_>,
    amount_out: TokenAmount,
) -> EngineResult<SwapAmounts> {
    let price_in = quoted(params.token_in)?.min;
    let price_out = quoted(params.token_out)?.min;

    let usd_out = amount_out
        .checked_mul(price_out)
        .ok_or(EngineError::Overflow("swap_usd_out"))?;

    let mut amounts = SwapAmounts {
        amount_in: U256::zero(),
        usd_in: U256::zero(),
        amount_out,
        usd_out,
        price_in,
        price_out,
        min_output_amount: amount_out,
        ui_fee_usd: U256::zero(),
        swap_path_stats: None,
    };

    if amount_out.is_zero() {
        return Ok(amounts);
    }

    if tokens_equivalent(params.token_in, params.token_out) {
        amounts.amount_in = amount_out;
        amounts.usd_in = usd_out;
        return Ok(amounts);
    }

    let stats = match params.resolver.find_swap_path(usd_out, &params.mode.path_opts()) {
        Some(stats) => stats,
        None => return Ok(amounts),
    };

    amounts.ui_fee_usd = ui_fee_usd(usd_out, params.ui_fee_factor_fp)?;

    match params.mode {
        SwapMode::Market => {
            // A path that simulates to zero output cannot size an input;
            // the result stays empty.
            if stats.usd_out.is_zero() {
                amounts.ui_fee_usd = U256::zero();
                amounts.swap_path_stats = Some(stats);
                return Ok(amounts);
            }
            let adjusted_usd_in = mul_div(usd_out, usd_out, stats.usd_out, Rounding::Up)?;
            amounts.usd_in = adjusted_usd_in.saturating_add(amounts.ui_fee_usd);
            amounts.amount_in = div_round(amounts.usd_in, price_in, Rounding::Up)?;
        }
        SwapMode::Limit { trigger_ratio_fp } => {
            let ratio_amount_in =
                mul_div(amount_out, usd_one(), trigger_ratio_fp, Rounding::Up)?;
            let gross_usd_in = ratio_amount_in
                .checked_mul(price_in)
                .ok_or(EngineError::Overflow("swap_ratio_usd_in"))?;
            let with_costs = gross_usd_in
                .saturating_add(stats.total_swap_fee_usd)
                .saturating_add(amounts.ui_fee_usd);
            // positive impact lowers the required input, negative raises it
            amounts.usd_in = apply_signed_add_floor_zero(
                with_costs,
                stats.total_swap_price_impact_delta_usd.negated(),
            );
            amounts.amount_in = div_round(amounts.usd_in, price_in, Rounding::Up)?;
        }
    }

    amounts.swap_path_stats = Some(stats);
    Ok(amounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::usd_one;
    use crate::types::{AssetId, TokenData, TokenPrices};

    fn usd(x: u64) -> U256 {
        U256::from(x) * usd_one()
    }

    /// A resolver for pairs that must never reach the routing layer.
    struct NoRouteResolver;

    impl SwapPathResolver for NoRouteResolver {
        fn find_swap_path(&self, _usd_in: Usd, _opts: &FindSwapPathOpts) -> Option<SwapPathStats> {
            None
        }
    }

    fn priced_token(id: u32, price: U256) -> TokenData {
        TokenData::new(AssetId(id), 18, TokenPrices { min: price, max: price })
    }

    #[test]
    fn wrapping_native_is_an_exact_passthrough() {
        // 1.0 native (18 dp) -> wrapped: same atom count, no path consulted.
        let mut native = priced_token(1, usd(3000) / U256::exp10(18));
        let mut wrapped = priced_token(2, usd(3000) / U256::exp10(18));
        native.wrapped_counterpart = Some(AssetId(2));
        wrapped.wrapped_counterpart = Some(AssetId(1));

        let params = SwapAmountsParams {
            token_in: &native,
            token_out: &wrapped,
            mode: SwapMode::Market,
            ui_fee_factor_fp: U256::exp10(15), // a nonzero factor must not apply
            resolver: &NoRouteResolver,
        };
        let one_native = U256::exp10(18);

        let amounts = get_swap_amounts_by_from_value(&params, one_native).unwrap();
        assert_eq!(amounts.amount_out, one_native);
        assert_eq!(amounts.usd_out, amounts.usd_in);
        assert_eq!(amounts.min_output_amount, one_native);
        assert_eq!(amounts.ui_fee_usd, U256::zero());
        assert!(amounts.swap_path_stats.is_none());

        let amounts = get_swap_amounts_by_to_value(&params, one_native).unwrap();
        assert_eq!(amounts.amount_in, one_native);
        assert_eq!(amounts.usd_in, amounts.usd_out);
        assert!(amounts.swap_path_stats.is_none());
    }

    #[test]
    fn zero_input_renders_zero_amounts() {
        let a = priced_token(1, usd(1));
        let b = priced_token(2, usd(1));
        let params = SwapAmountsParams {
            token_in: &a,
            token_out: &b,
            mode: SwapMode::Market,
            ui_fee_factor_fp: U256::zero(),
            resolver: &NoRouteResolver,
        };

        let amounts = get_swap_amounts_by_from_value(&params, U256::zero()).unwrap();
        assert_eq!(amounts.amount_out, U256::zero());
        assert_eq!(amounts.usd_in, U256::zero());

        let amounts = get_swap_amounts_by_to_value(&params, U256::zero()).unwrap();
        assert_eq!(amounts.amount_in, U256::zero());
    }

    #[test]
    fn unroutable_pair_is_not_an_error() {
        let a = priced_token(1, usd(1));
        let b = priced_token(2, usd(1));
        let params = SwapAmountsParams {
            token_in: &a,
            token_out: &b,
            mode: SwapMode::Market,
            ui_fee_factor_fp: U256::zero(),
            resolver: &NoRouteResolver,
        };

        let amounts = get_swap_amounts_by_from_value(&params, U256::from(100u64)).unwrap();
        assert_eq!(amounts.amount_out, U256::zero());
        assert_eq!(amounts.usd_in, usd(100));
        assert!(amounts.swap_path_stats.is_none());

        let amounts = get_swap_amounts_by_to_value(&params, U256::from(100u64)).unwrap();
        assert_eq!(amounts.amount_in, U256::zero());
        assert_eq!(amounts.usd_out, usd(100));
        assert!(amounts.swap_path_stats.is_none());
    }

    #[test]
    fn missing_quote_refuses_to_price() {
        let a = priced_token(1, usd(1));
        let mut b = priced_token(2, usd(1));
        b.prices = None;
        let params = SwapAmountsParams {
            token_in: &a,
            token_out: &b,
            mode: SwapMode::Market,
            ui_fee_factor_fp: U256::zero(),
            resolver: &NoRouteResolver,
        };

        let err = get_swap_amounts_by_from_value(&params, U256::from(1u64)).unwrap_err();
        assert_eq!(err, EngineError::MissingPrice(AssetId(2)));
    }
}
