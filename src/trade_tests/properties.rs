use super::helpers::*;

use primitive_types::U256;
use proptest::prelude::*;

use crate::math::float_one;
use crate::pricing::acceptable::{
    acceptable_price_for_fixed_impact_bps, acceptable_price_info, should_use_max_price,
};
use crate::trade::increase::{
    get_increase_position_amounts, IncreasePositionParams, IncreaseStrategy,
};
use crate::trade::next_values::{liquidation_price, PositionSizingCfg};
use crate::trade::swap::{
    get_swap_amounts_by_from_value, get_swap_amounts_by_to_value, SwapAmountsParams, SwapMode,
};
use crate::types::{Side, SignedU256, TradeDirection};

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

fn direction_strategy() -> impl Strategy<Value = TradeDirection> {
    prop_oneof![
        Just(TradeDirection::Increase),
        Just(TradeDirection::Decrease),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn swap_output_is_monotone_in_the_input(a in 1u64..2_000_000, b in 1u64..2_000_000) {
        let env = setup_env(2_000);
        let router = env.router(env.usdc, env.dai);
        let params = SwapAmountsParams {
            token_in: env.token(env.usdc),
            token_out: env.token(env.dai),
            mode: SwapMode::Market,
            ui_fee_factor_fp: U256::zero(),
            resolver: &router,
        };

        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let small =
            get_swap_amounts_by_from_value(&params, to_atoms(u128::from(lo), env.usdc_decimals))?;
        let large =
            get_swap_amounts_by_from_value(&params, to_atoms(u128::from(hi), env.usdc_decimals))?;

        prop_assert!(
            small.usd_out <= large.usd_out,
            "paying {} returned {} but paying {} returned {}",
            lo,
            small.usd_out,
            hi,
            large.usd_out
        );
        prop_assert!(small.amount_out <= large.amount_out);
    }

    #[test]
    fn sizing_an_exact_output_round_trips_within_ten_bps(target in 1u64..1_500_000) {
        let env = setup_env(2_000);
        let router = env.router(env.usdc, env.dai);
        let params = SwapAmountsParams {
            token_in: env.token(env.usdc),
            token_out: env.token(env.dai),
            mode: SwapMode::Market,
            ui_fee_factor_fp: U256::zero(),
            resolver: &router,
        };

        let sized =
            get_swap_amounts_by_to_value(&params, to_atoms(u128::from(target), env.dai_decimals))?;
        prop_assert_eq!(sized.usd_out, usd(u128::from(target)));
        // the single-quote rescale can only overshoot the requirement
        prop_assert!(sized.usd_in >= sized.usd_out);

        // spend the solved input for real and compare the settled output
        let settled = get_swap_amounts_by_from_value(&params, sized.amount_in)?;
        let drift = u256_abs_diff(settled.usd_out, sized.usd_out);
        let bound = sized.usd_out * U256::from(10u64) / U256::from(10_000u64);
        prop_assert!(
            drift <= bound,
            "targeted {} but the solved input settles {}",
            sized.usd_out,
            settled.usd_out
        );
    }

    #[test]
    fn identical_swap_queries_settle_identically(amount in any::<u64>()) {
        let env = setup_env(2_000);
        let router = env.router(env.usdc, env.dai);
        let params = SwapAmountsParams {
            token_in: env.token(env.usdc),
            token_out: env.token(env.dai),
            mode: SwapMode::Market,
            ui_fee_factor_fp: U256::zero(),
            resolver: &router,
        };

        let first = get_swap_amounts_by_from_value(&params, U256::from(amount))?;
        let second = get_swap_amounts_by_from_value(&params, U256::from(amount))?;
        prop_assert_eq!(&first, &second);

        // a fresh graph walk lands on the same route and the same numbers
        let router = env.router(env.usdc, env.dai);
        let params = SwapAmountsParams {
            token_in: env.token(env.usdc),
            token_out: env.token(env.dai),
            mode: SwapMode::Market,
            ui_fee_factor_fp: U256::zero(),
            resolver: &router,
        };
        let third = get_swap_amounts_by_from_value(&params, U256::from(amount))?;
        prop_assert_eq!(&first, &third);
    }

    #[test]
    fn an_increase_deposit_covers_the_collateral_and_every_fee(
        deposit in 10u64..1_000_000,
        leverage_x in 1u64..50,
        ui_bps in 0u64..10,
    ) {
        let env = setup_env(2_000);
        let router = env.router(env.usdc, env.usdc);
        let params = IncreasePositionParams {
            market: env.market(env.market_eth_usdc),
            index_token: env.token(env.eth),
            initial_collateral_token: env.token(env.usdc),
            collateral_token: env.token(env.usdc),
            side: Side::Long,
            strategy: IncreaseStrategy::LeverageByCollateral {
                initial_collateral_amount: to_atoms(u128::from(deposit), env.usdc_decimals),
                leverage_bps: U256::from(leverage_x * 10_000),
            },
            position: None,
            trigger_price: None,
            fixed_acceptable_price_impact_bps: None,
            ui_fee_factor_fp: float_one() * U256::from(ui_bps) / U256::from(10_000u64),
            fee_discount_factor_fp: U256::zero(),
            resolver: &router,
        };
        let amounts = get_increase_position_amounts(&params)?;

        // nothing of the deposit leaks: it is collateral plus fees, exactly
        let spent = amounts.collateral_delta_usd
            + amounts.position_fee_usd
            + amounts.ui_fee_usd
            + amounts.borrowing_fee_usd
            + amounts.funding_fee_usd
            + amounts.swap_ui_fee_usd;
        prop_assert_eq!(amounts.initial_collateral_usd, spent);

        // sized off the net deposit: never beyond the gross target
        let gross = mul_div_u256(
            amounts.initial_collateral_usd,
            U256::from(leverage_x * 10_000),
            U256::from(10_000u64),
        )
        .unwrap();
        prop_assert!(amounts.size_delta_usd <= gross);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn the_acceptable_price_brackets_the_mark_by_impact_sign(
        mark_whole in 1u64..1_000_000,
        size_whole in 1u64..1_000_000_000,
        impact_whole in 0u64..1_000_000_000,
        impact_is_negative in any::<bool>(),
        side in side_strategy(),
        direction in direction_strategy(),
    ) {
        let mark = usd(u128::from(mark_whole));
        let size = usd(u128::from(size_whole));
        let impact = if impact_is_negative {
            SignedU256::neg(usd(u128::from(impact_whole)))
        } else {
            SignedU256::pos(usd(u128::from(impact_whole)))
        };

        let info = acceptable_price_info(mark, size, impact, direction, side)?;

        if impact.is_zero() {
            prop_assert_eq!(info.acceptable_price, mark);
            prop_assert!(info.acceptable_price_delta_bps.is_zero());
        } else if should_use_max_price(direction, side) == impact.is_negative {
            // whichever quote convention runs, a worsening only ever
            // pushes the bound away from the trader
            prop_assert!(
                info.acceptable_price >= mark,
                "bound {} fell below the mark {}",
                info.acceptable_price,
                mark
            );
            prop_assert!(!info.acceptable_price_delta_bps.is_negative);
        } else {
            prop_assert!(
                info.acceptable_price <= mark,
                "bound {} rose above the mark {}",
                info.acceptable_price,
                mark
            );
            prop_assert!(!info.acceptable_price_delta_bps.is_positive());
        }
    }

    #[test]
    fn a_fixed_impact_tolerance_always_worsens_the_bound(
        mark_whole in 1u64..1_000_000,
        size_whole in 1u64..1_000_000_000,
        tolerance_bps in 0u32..5_000,
        side in side_strategy(),
        direction in direction_strategy(),
    ) {
        let mark = usd(u128::from(mark_whole));
        let size = usd(u128::from(size_whole));

        let info =
            acceptable_price_for_fixed_impact_bps(mark, size, tolerance_bps, direction, side)?;

        if should_use_max_price(direction, side) {
            prop_assert!(info.acceptable_price >= mark);
        } else {
            prop_assert!(info.acceptable_price <= mark);
        }

        // the tolerance reads back off the solved impact exactly
        let expected = SignedU256::neg(size * U256::from(tolerance_bps) / U256::from(10_000u64));
        prop_assert_eq!(info.price_impact_usd, expected);
    }

    #[test]
    fn extra_collateral_never_brings_liquidation_closer(
        size_whole in 10u64..1_000_000,
        token_atoms in 1u64..1_000_000_000_000u64,
        collateral_whole in 0u64..2_000_000,
        extra_whole in 1u64..1_000_000,
        side in side_strategy(),
    ) {
        let market = default_market(1, 11, 11, 10, U256::zero(), U256::zero());
        let cfg = PositionSizingCfg::mvp();

        let size_usd = usd(u128::from(size_whole));
        let size_tokens = U256::from(token_atoms);
        let lean = usd(u128::from(collateral_whole));
        let rich = lean + usd(u128::from(extra_whole));

        let at_lean =
            liquidation_price(&market, side, size_usd, size_tokens, lean, U256::zero(), &cfg)?;
        let at_rich =
            liquidation_price(&market, side, size_usd, size_tokens, rich, U256::zero(), &cfg)?;

        match side {
            // a richer long liquidates lower, a richer short higher
            Side::Long => prop_assert!(
                at_rich <= at_lean,
                "long liq price rose from {} to {} on extra collateral",
                at_lean,
                at_rich
            ),
            Side::Short => prop_assert!(
                at_rich >= at_lean,
                "short liq price fell from {} to {} on extra collateral",
                at_lean,
                at_rich
            ),
        }
    }
}
