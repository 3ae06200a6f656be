use super::helpers::*;

use pretty_assertions::assert_eq;
use primitive_types::U256;

use crate::routing::router::get_swap_path_stats;
use crate::trade::swap::{
    get_swap_amounts_by_from_value, get_swap_amounts_by_to_value, SwapAmountsParams, SwapMode,
};
use crate::types::SignedU256;

// Default schedule on every env market: 7 bps harmful-side swap fee,
// quadratic impact capped at 0.5% of the pushed size.
const SWAP_FEE_BPS: u64 = 7;
const MAX_IMPACT_BPS: u64 = 50;

fn bps_of(value: U256, bps: u64) -> U256 {
    value * U256::from(bps) / U256::from(10_000u64)
}

#[test]
fn market_swap_settles_on_the_best_output_route() {
    let env = setup_env(2_000);
    let router = env.router(env.usdc, env.dai);
    let params = SwapAmountsParams {
        token_in: env.token(env.usdc),
        token_out: env.token(env.dai),
        mode: SwapMode::Market,
        ui_fee_factor_fp: U256::zero(),
        resolver: &router,
    };

    let amount_in = to_atoms(100_000, env.usdc_decimals);
    let amounts = get_swap_amounts_by_from_value(&params, amount_in).unwrap();

    // Both candidate routes push the pool diff by the same 200k, so the
    // impact caps at 0.5% either way and the single-fee direct hop wins
    // despite its shallower pool.
    let stats = amounts.swap_path_stats.as_ref().unwrap();
    assert_eq!(stats.swap_path, vec![env.market_stable]);

    let fee = bps_of(usd(100_000), SWAP_FEE_BPS);
    let impact = bps_of(usd(100_000), MAX_IMPACT_BPS);
    assert_eq!(stats.total_swap_fee_usd, fee);
    assert_eq!(
        stats.total_swap_price_impact_delta_usd,
        SignedU256::neg(impact)
    );

    assert_eq!(amounts.usd_in, usd(100_000));
    assert_eq!(amounts.usd_out, usd(99_430));
    assert_eq!(amounts.amount_out, to_atoms(99_430, env.dai_decimals));
    assert_eq!(amounts.min_output_amount, amounts.amount_out);
    assert_eq!(amounts.ui_fee_usd, U256::zero());

    // The rejected detour really is worse: same impact cap, fee twice.
    let detour = get_swap_path_stats(
        &env.snapshot,
        &[env.market_eth_usdc, env.market_eth_dai],
        env.usdc,
        usd(100_000),
    )
    .unwrap()
    .unwrap();
    assert!(detour.usd_out < amounts.usd_out);
}

#[test]
fn identical_inputs_settle_identically() {
    let env = setup_env(2_000);
    let router = env.router(env.usdc, env.dai);
    let params = SwapAmountsParams {
        token_in: env.token(env.usdc),
        token_out: env.token(env.dai),
        mode: SwapMode::Market,
        ui_fee_factor_fp: U256::zero(),
        resolver: &router,
    };
    let amount_in = to_atoms(250_000, env.usdc_decimals);

    let first = get_swap_amounts_by_from_value(&params, amount_in).unwrap();
    let second = get_swap_amounts_by_from_value(&params, amount_in).unwrap();
    assert_eq!(first, second);

    // A router built fresh over the same snapshot resolves the same.
    let other_router = env.router(env.usdc, env.dai);
    let other = get_swap_amounts_by_from_value(
        &SwapAmountsParams {
            resolver: &other_router,
            ..params
        },
        amount_in,
    )
    .unwrap();
    assert_eq!(first, other);
}

#[test]
fn frontend_fee_settles_out_of_the_output() {
    let env = setup_env(2_000);
    let router = env.router(env.usdc, env.dai);
    // 0.5% of the input volume goes to the frontend
    let params = SwapAmountsParams {
        token_in: env.token(env.usdc),
        token_out: env.token(env.dai),
        mode: SwapMode::Market,
        ui_fee_factor_fp: U256::exp10(18) * 5 / 1_000,
        resolver: &router,
    };

    let amounts =
        get_swap_amounts_by_from_value(&params, to_atoms(100_000, env.usdc_decimals)).unwrap();

    assert_eq!(amounts.ui_fee_usd, usd(500));
    // 100_000 - 70 fee - 500 impact - 500 frontend
    assert_eq!(amounts.usd_out, usd(98_930));
    assert_eq!(amounts.amount_out, to_atoms(98_930, env.dai_decimals));
}

#[test]
fn sizing_an_exact_output_rescales_for_curvature() {
    let env = setup_env(2_000);
    let router = env.router(env.usdc, env.dai);
    let params = SwapAmountsParams {
        token_in: env.token(env.usdc),
        token_out: env.token(env.dai),
        mode: SwapMode::Market,
        ui_fee_factor_fp: U256::zero(),
        resolver: &router,
    };

    let target = to_atoms(50_000, env.dai_decimals);
    let amounts = get_swap_amounts_by_to_value(&params, target).unwrap();

    let stats = amounts.swap_path_stats.as_ref().unwrap();
    assert_eq!(stats.swap_path, vec![env.market_stable]);
    // proxy simulation of the target: 50_000 - 35 fee - 250 capped impact
    assert_eq!(stats.usd_out, usd(49_715));

    // usd_in = usd_out^2 / simulated, rounded against the trader
    let expected_usd_in = mul_div_ceil_u256(usd(50_000), usd(50_000), usd(49_715)).unwrap();
    assert_eq!(amounts.usd_in, expected_usd_in);
    assert_eq!(
        amounts.amount_in,
        div_ceil_u256(expected_usd_in, U256::exp10(24))
    );
    // costs make the required input strictly larger than the target
    assert!(amounts.amount_in > target);

    assert_eq!(amounts.usd_out, usd(50_000));
    assert_eq!(amounts.min_output_amount, target);
}

#[test]
fn limit_swap_routes_by_liquidity_and_settles_the_pinned_rate() {
    let env = setup_env(2_000);
    let router = env.router(env.usdc, env.dai);
    // 1:1 atoms at equal decimals
    let params = SwapAmountsParams {
        token_in: env.token(env.usdc),
        token_out: env.token(env.dai),
        mode: SwapMode::Limit {
            trigger_ratio_fp: usd(1),
        },
        ui_fee_factor_fp: U256::zero(),
        resolver: &router,
    };

    let amounts =
        get_swap_amounts_by_from_value(&params, to_atoms(10_000, env.usdc_decimals)).unwrap();

    // Executes later at unknown pool state, so the deeper two-hop perp
    // route outranks the shallow direct pool.
    let stats = amounts.swap_path_stats.as_ref().unwrap();
    assert_eq!(
        stats.swap_path,
        vec![env.market_eth_usdc, env.market_eth_dai]
    );

    // hop 1: 10_000 less 7 bps fee and the 0.5% cap feeds hop 2 with 9_943
    let hop2_in = usd(10_000) - bps_of(usd(10_000), SWAP_FEE_BPS + MAX_IMPACT_BPS);
    assert_eq!(hop2_in, usd(9_943));
    let total_fee = bps_of(usd(10_000), SWAP_FEE_BPS) + bps_of(hop2_in, SWAP_FEE_BPS);
    let total_impact = bps_of(usd(10_000), MAX_IMPACT_BPS) + bps_of(hop2_in, MAX_IMPACT_BPS);
    assert_eq!(stats.total_swap_fee_usd, total_fee);
    assert_eq!(
        stats.total_swap_price_impact_delta_usd,
        SignedU256::neg(total_impact)
    );

    // the pinned ratio fixes the gross output; path costs settle against it
    let expected_usd_out = usd(10_000) - total_fee - total_impact;
    assert_eq!(amounts.usd_out, expected_usd_out);
    assert_eq!(amounts.amount_out, expected_usd_out / U256::exp10(24));
    assert_eq!(amounts.amount_out, U256::from(9_886_324_900u64));
}

#[test]
fn disabled_markets_drop_out_of_routing() {
    let mut env = setup_env(2_000);
    env.market_mut(env.market_stable).is_disabled = true;
    env.rebuild_graph();

    let router = env.router(env.usdc, env.dai);
    let params = SwapAmountsParams {
        token_in: env.token(env.usdc),
        token_out: env.token(env.dai),
        mode: SwapMode::Market,
        ui_fee_factor_fp: U256::zero(),
        resolver: &router,
    };

    let amounts =
        get_swap_amounts_by_from_value(&params, to_atoms(100_000, env.usdc_decimals)).unwrap();

    // only the detour remains: two fee hops, two capped impact hits
    let stats = amounts.swap_path_stats.as_ref().unwrap();
    assert_eq!(
        stats.swap_path,
        vec![env.market_eth_usdc, env.market_eth_dai]
    );
    let hop2_in = usd(100_000) - bps_of(usd(100_000), SWAP_FEE_BPS + MAX_IMPACT_BPS);
    let expected_usd_out = hop2_in - bps_of(hop2_in, SWAP_FEE_BPS + MAX_IMPACT_BPS);
    assert_eq!(amounts.usd_out, expected_usd_out);
}
