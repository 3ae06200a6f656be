use super::helpers::*;

use pretty_assertions::assert_eq;
use primitive_types::U256;

use crate::error::EngineError;
use crate::market::MarketInfo;
use crate::math::float_one;
use crate::position::Position;
use crate::routing::router::SwapRouter;
use crate::trade::increase::{
    get_increase_position_amounts, IncreasePositionParams, IncreaseStrategy,
};
use crate::trade::next_values::{get_next_position_values, NextPositionParams, PositionSizingCfg};
use crate::types::{AssetId, Side, SignedU256, TradeDirection};

// Default schedule on every env market: 7 bps harmful-side swap fee,
// quadratic impact capped at 0.5% of the pushed size.
const SWAP_FEE_BPS: u64 = 7;
const MAX_IMPACT_BPS: u64 = 50;

fn bps_of(value: U256, bps: u64) -> U256 {
    value * U256::from(bps) / U256::from(10_000u64)
}

/// USD(1e30) per atom for a whole-token quote.
fn atom_price(usd_per_token: u128, decimals: u8) -> U256 {
    usd(usd_per_token) / U256::exp10(decimals as usize)
}

/// Whole-dollar position arithmetic: 1% position fee both ways, no
/// position price impact.
fn flat_position_costs(market: &mut MarketInfo) {
    market.fees.position_fee_factor_positive = float_one() / 100;
    market.fees.position_fee_factor_negative = float_one() / 100;
    market.impact.position_impact_factor_positive = U256::zero();
    market.impact.position_impact_factor_negative = U256::zero();
}

/// No position costs at all: fee and impact factors zeroed.
fn free_position_costs(market: &mut MarketInfo) {
    flat_position_costs(market);
    market.fees.position_fee_factor_positive = U256::zero();
    market.fees.position_fee_factor_negative = U256::zero();
}

/// The route settles 1:1: no swap fee, no pool impact.
fn free_swaps(market: &mut MarketInfo) {
    market.fees.swap_fee_factor_positive = U256::zero();
    market.fees.swap_fee_factor_negative = U256::zero();
    market.impact.swap_impact_factor_positive = U256::zero();
    market.impact.swap_impact_factor_negative = U256::zero();
}

fn params<'a>(
    env: &'a TestEnv,
    pay: AssetId,
    collateral: AssetId,
    side: Side,
    strategy: IncreaseStrategy,
    resolver: &'a SwapRouter<'a>,
) -> IncreasePositionParams<'a> {
    IncreasePositionParams {
        market: env.market(env.market_eth_usdc),
        index_token: env.token(env.eth),
        initial_collateral_token: env.token(pay),
        collateral_token: env.token(collateral),
        side,
        strategy,
        position: None,
        trigger_price: None,
        fixed_acceptable_price_impact_bps: None,
        ui_fee_factor_fp: U256::zero(),
        fee_discount_factor_fp: U256::zero(),
        resolver,
    }
}

#[test]
fn leverage_by_collateral_sizes_from_the_net_deposit() {
    let mut env = setup_env(2_000);
    flat_position_costs(env.market_mut(env.market_eth_usdc));

    // 1,000 USDC straight in as collateral, long ETH at 2x.
    let router = env.router(env.usdc, env.usdc);
    let amounts = get_increase_position_amounts(&params(
        &env,
        env.usdc,
        env.usdc,
        Side::Long,
        IncreaseStrategy::LeverageByCollateral {
            initial_collateral_amount: to_atoms(1_000, env.usdc_decimals),
            leverage_bps: U256::from(20_000u64),
        },
        &router,
    ))
    .unwrap();

    assert_eq!(amounts.initial_collateral_usd, usd(1_000));
    // the pay token already is the collateral token: no route, no swap fee
    assert!(amounts.swap_path_stats.is_none());
    assert_eq!(amounts.swap_ui_fee_usd, U256::zero());

    // gross sizing prices the fee: 2x on 1,000 costs 1% of 2,000, and the
    // net 980 re-levers to 1,960
    assert_eq!(amounts.size_delta_usd, usd(1_960));
    let position_fee = usd(1_960) / U256::from(100u64);
    assert_eq!(amounts.position_fee_usd, position_fee);
    assert_eq!(amounts.collateral_delta_usd, usd(1_000) - position_fee);
    assert_eq!(
        amounts.collateral_delta_amount,
        U256::from(980_400_000u64) // 980.4 USDC
    );

    // long entries settle at the max quote and round the tokens down
    assert_eq!(amounts.index_price, atom_price(2_000, env.eth_decimals));
    assert_eq!(amounts.size_delta_tokens, to_atoms(98, 16)); // 0.98 ETH

    assert_eq!(amounts.estimated_leverage_bps, Some(U256::from(20_000u64)));

    // no impact: the bound sits on the mark
    assert_eq!(amounts.acceptable_price, amounts.index_price);
    assert!(amounts.acceptable_price_delta_bps.is_zero());
    assert!(amounts.position_price_impact_delta_usd.is_zero());
}

#[test]
fn leverage_by_size_back_solves_the_deposit_for_every_cost() {
    let mut env = setup_env(2_000);
    flat_position_costs(env.market_mut(env.market_eth_usdc));
    // the DAI -> USDC leg settles 1:1 so the back-solve stays exact
    free_swaps(env.market_mut(env.market_stable));

    // Topping up an open long that owes carry-over fees.
    let position = Position {
        size_usd: usd(4_000),
        size_tokens: to_atoms(2, 18),
        collateral_amount: to_atoms(1_000, env.usdc_decimals),
        pending_borrowing_fee_usd: usd(2),
        pending_funding_fee_usd: usd(5),
        ..Position::empty(env.market_eth_usdc, env.usdc, Side::Long)
    };

    let router = env.router(env.dai, env.usdc);
    let mut p = params(
        &env,
        env.dai,
        env.usdc,
        Side::Long,
        IncreaseStrategy::LeverageBySize {
            index_token_amount: to_atoms(5, 17), // 0.5 ETH
            leverage_bps: U256::from(20_000u64),
        },
        &router,
    );
    p.position = Some(&position);
    p.ui_fee_factor_fp = float_one() * 3 / 1_000; // 0.3% frontend fee
    let amounts = get_increase_position_amounts(&p).unwrap();

    // 0.5 ETH at the $2,000 max quote
    assert_eq!(amounts.size_delta_usd, usd(1_000));
    assert_eq!(amounts.size_delta_tokens, to_atoms(5, 17));
    // 2x fixes the collateral at half the size
    assert_eq!(amounts.collateral_delta_usd, usd(500));
    assert_eq!(amounts.collateral_delta_amount, U256::from(500_000_000u64));

    // every cost the deposit must cover
    assert_eq!(amounts.position_fee_usd, usd(10)); // 1% of 1,000
    assert_eq!(amounts.borrowing_fee_usd, usd(2));
    assert_eq!(amounts.funding_fee_usd, usd(5));
    assert_eq!(amounts.ui_fee_usd, usd(3)); // 0.3% of the size

    // the swap-UI fee prices on the back-solved route volume:
    // 500 + 10 + 2 + 5 + 3 = 520 routed once through the free pool
    let swap_ui_fee = usd(520) * U256::from(3u64) / U256::from(1_000u64);
    assert_eq!(amounts.swap_ui_fee_usd, swap_ui_fee);

    // deposit = collateral delta + all five fees, settled in DAI 1:1
    let base_collateral_usd = amounts.collateral_delta_usd
        + amounts.position_fee_usd
        + amounts.borrowing_fee_usd
        + amounts.funding_fee_usd
        + amounts.ui_fee_usd
        + amounts.swap_ui_fee_usd;
    assert_eq!(amounts.initial_collateral_usd, base_collateral_usd);
    assert_eq!(amounts.initial_collateral_usd, usd(520) + swap_ui_fee);
    assert_eq!(
        amounts.initial_collateral_amount,
        U256::from(521_560_000u64) // 521.56 DAI
    );

    let stats = amounts.swap_path_stats.as_ref().unwrap();
    assert_eq!(stats.swap_path, vec![env.market_stable]);

    assert_eq!(amounts.estimated_leverage_bps, Some(U256::from(20_000u64)));
    assert_eq!(amounts.acceptable_price, atom_price(2_000, env.eth_decimals));
}

#[test]
fn independent_sizing_derives_the_leverage() {
    let mut env = setup_env(2_000);
    flat_position_costs(env.market_mut(env.market_eth_usdc));

    let router = env.router(env.usdc, env.usdc);
    let amounts = get_increase_position_amounts(&params(
        &env,
        env.usdc,
        env.usdc,
        Side::Long,
        IncreaseStrategy::Independent {
            initial_collateral_amount: to_atoms(800, env.usdc_decimals),
            index_token_amount: to_atoms(6, 17), // 0.6 ETH
        },
        &router,
    ))
    .unwrap();

    // both sides fixed: 0.6 ETH of size against an 800 USDC deposit
    assert_eq!(amounts.size_delta_usd, usd(1_200));
    assert_eq!(amounts.position_fee_usd, usd(12));
    assert_eq!(amounts.collateral_delta_usd, usd(788));
    assert_eq!(amounts.collateral_delta_amount, U256::from(788_000_000u64));

    // leverage becomes an output: floor(1,200 * 10,000 / 788)
    assert_eq!(amounts.estimated_leverage_bps, Some(U256::from(15_228u64)));
}

#[test]
fn trigger_entry_prices_the_size_and_a_fixed_tolerance_sets_the_bound() {
    let mut env = setup_env(2_000);
    flat_position_costs(env.market_mut(env.market_eth_usdc));
    let trigger = atom_price(1_900, env.eth_decimals);

    let router = env.router(env.usdc, env.usdc);
    let mut p = params(
        &env,
        env.usdc,
        env.usdc,
        Side::Long,
        IncreaseStrategy::LeverageBySize {
            index_token_amount: to_atoms(5, 17),
            leverage_bps: U256::from(20_000u64),
        },
        &router,
    );
    p.trigger_price = Some(trigger);
    p.fixed_acceptable_price_impact_bps = Some(100);
    let amounts = get_increase_position_amounts(&p).unwrap();

    // the mark never enters: 0.5 ETH at the $1,900 trigger
    assert_eq!(amounts.index_price, trigger);
    assert_eq!(amounts.size_delta_usd, usd(950));
    assert_eq!(amounts.collateral_delta_usd, usd(475));
    assert_eq!(amounts.position_fee_usd, usd(95) / U256::from(10u64));

    // 1% of 950, always charged as a loss
    assert_eq!(
        amounts.position_price_impact_delta_usd,
        SignedU256::neg(usd(95) / U256::from(10u64))
    );
    // increase+long runs the max convention: the loss raises the bound
    assert_eq!(
        amounts.acceptable_price,
        trigger * U256::from(101u64) / U256::from(100u64)
    );
    assert_eq!(
        amounts.acceptable_price_delta_bps,
        SignedU256::pos(U256::from(100u64))
    );

    // the short side of the same order flips the bound below the trigger
    let mut p = params(
        &env,
        env.usdc,
        env.usdc,
        Side::Short,
        IncreaseStrategy::LeverageBySize {
            index_token_amount: to_atoms(5, 17),
            leverage_bps: U256::from(20_000u64),
        },
        &router,
    );
    p.trigger_price = Some(trigger);
    p.fixed_acceptable_price_impact_bps = Some(100);
    let amounts = get_increase_position_amounts(&p).unwrap();

    assert_eq!(
        amounts.acceptable_price,
        trigger * U256::from(99u64) / U256::from(100u64)
    );
    assert_eq!(
        amounts.acceptable_price_delta_bps,
        SignedU256::neg(U256::from(100u64))
    );
}

#[test]
fn swapped_deposit_settles_through_the_best_route() {
    let mut env = setup_env(2_000);
    flat_position_costs(env.market_mut(env.market_eth_usdc));

    // 100,000 DAI paid in, position collateral is USDC: the deposit takes
    // the single-fee direct pool, exactly as a plain swap would.
    let router = env.router(env.dai, env.usdc);
    let amounts = get_increase_position_amounts(&params(
        &env,
        env.dai,
        env.usdc,
        Side::Long,
        IncreaseStrategy::LeverageByCollateral {
            initial_collateral_amount: to_atoms(100_000, env.dai_decimals),
            leverage_bps: U256::from(10_000u64), // 1x keeps size == net deposit
        },
        &router,
    ))
    .unwrap();

    assert_eq!(amounts.initial_collateral_usd, usd(100_000));
    let stats = amounts.swap_path_stats.as_ref().unwrap();
    assert_eq!(stats.swap_path, vec![env.market_stable]);
    assert_eq!(stats.total_swap_fee_usd, bps_of(usd(100_000), SWAP_FEE_BPS));
    assert_eq!(
        stats.total_swap_price_impact_delta_usd,
        SignedU256::neg(bps_of(usd(100_000), MAX_IMPACT_BPS))
    );

    // the route lands 99,430 USDC of backing; 1% of it prices the first
    // pass, the net re-levers at 1x
    let routed_usd = usd(100_000) - bps_of(usd(100_000), SWAP_FEE_BPS + MAX_IMPACT_BPS);
    let gross_fee = routed_usd / U256::from(100u64);
    let size_delta_usd = routed_usd - gross_fee;
    let position_fee = size_delta_usd / U256::from(100u64);

    assert_eq!(amounts.size_delta_usd, size_delta_usd);
    assert_eq!(amounts.position_fee_usd, position_fee);
    assert_eq!(amounts.collateral_delta_usd, routed_usd - position_fee);
    assert_eq!(amounts.size_delta_tokens, to_atoms(4_921_785, 13)); // 49.21785 ETH

    assert_eq!(amounts.estimated_leverage_bps, Some(U256::from(10_000u64)));
}

#[test]
fn degenerate_sizing_inputs_render_zero_amounts() {
    let env = setup_env(2_000);
    let router = env.router(env.usdc, env.usdc);
    let mark = atom_price(2_000, env.eth_decimals);

    let strategies = [
        IncreaseStrategy::LeverageByCollateral {
            initial_collateral_amount: U256::zero(),
            leverage_bps: U256::from(20_000u64),
        },
        IncreaseStrategy::LeverageByCollateral {
            initial_collateral_amount: to_atoms(1_000, env.usdc_decimals),
            leverage_bps: U256::zero(),
        },
        IncreaseStrategy::LeverageBySize {
            index_token_amount: U256::zero(),
            leverage_bps: U256::from(20_000u64),
        },
        IncreaseStrategy::Independent {
            initial_collateral_amount: U256::zero(),
            index_token_amount: U256::zero(),
        },
    ];

    for strategy in strategies {
        let amounts = get_increase_position_amounts(&params(
            &env,
            env.usdc,
            env.usdc,
            Side::Long,
            strategy,
            &router,
        ))
        .unwrap();

        assert_eq!(amounts.size_delta_usd, U256::zero());
        assert_eq!(amounts.collateral_delta_usd, U256::zero());
        assert_eq!(amounts.size_delta_tokens, U256::zero());
        assert_eq!(amounts.estimated_leverage_bps, None);
        assert!(amounts.swap_path_stats.is_none());
        // quotes still resolve
        assert_eq!(amounts.index_price, mark);
        assert_eq!(amounts.acceptable_price, mark);
    }
}

#[test]
fn disabled_and_spot_only_markets_refuse_to_price() {
    let strategy = IncreaseStrategy::LeverageByCollateral {
        initial_collateral_amount: to_atoms(1_000, 6),
        leverage_bps: U256::from(20_000u64),
    };

    let mut env = setup_env(2_000);
    env.market_mut(env.market_eth_usdc).is_disabled = true;
    let router = env.router(env.usdc, env.usdc);
    let err = get_increase_position_amounts(&params(
        &env,
        env.usdc,
        env.usdc,
        Side::Long,
        strategy,
        &router,
    ))
    .unwrap_err();
    assert!(matches!(err, EngineError::InvalidMarket(_)));

    // spot-only markets carry swaps but host no positions
    let env = setup_env(2_000);
    let router = env.router(env.usdc, env.usdc);
    let mut p = params(&env, env.usdc, env.usdc, Side::Long, strategy, &router);
    p.market = env.market(env.market_stable);
    let err = get_increase_position_amounts(&p).unwrap_err();
    assert!(matches!(err, EngineError::InvalidMarket(_)));
}

#[test]
fn projection_after_the_increase_re_averages_the_entry() {
    let mut env = setup_env(2_000);
    free_position_costs(env.market_mut(env.market_eth_usdc));

    // 1 ETH long from $1,800, topping up 1 ETH at the $2,000 quote.
    let position = Position {
        size_usd: usd(1_800),
        size_tokens: to_atoms(1, 18),
        collateral_amount: to_atoms(1_000, env.usdc_decimals),
        ..Position::empty(env.market_eth_usdc, env.usdc, Side::Long)
    };

    let router = env.router(env.usdc, env.usdc);
    let mut p = params(
        &env,
        env.usdc,
        env.usdc,
        Side::Long,
        IncreaseStrategy::LeverageByCollateral {
            initial_collateral_amount: to_atoms(1_000, env.usdc_decimals),
            leverage_bps: U256::from(20_000u64),
        },
        &router,
    );
    p.position = Some(&position);
    let amounts = get_increase_position_amounts(&p).unwrap();

    // free market: the whole deposit backs the position
    assert_eq!(amounts.size_delta_usd, usd(2_000));
    assert_eq!(amounts.size_delta_tokens, to_atoms(1, 18));
    assert_eq!(amounts.collateral_delta_usd, usd(1_000));

    let index_prices = env.token(env.eth).prices.unwrap();
    let collateral_prices = env.token(env.usdc).prices.unwrap();
    let cfg = PositionSizingCfg::mvp();
    let next = get_next_position_values(&NextPositionParams {
        market: env.market(env.market_eth_usdc),
        position: &position,
        direction: TradeDirection::Increase,
        size_delta_usd: amounts.size_delta_usd,
        size_delta_tokens: amounts.size_delta_tokens,
        collateral_delta_usd: amounts.collateral_delta_usd,
        pending_costs_usd: U256::zero(),
        index_prices: &index_prices,
        collateral_prices: &collateral_prices,
        cfg: &cfg,
    })
    .unwrap();

    assert_eq!(next.next_size_usd, usd(3_800));
    assert_eq!(next.next_size_tokens, to_atoms(2, 18));
    assert_eq!(next.next_collateral_usd, usd(2_000));

    // 1 ETH at 1,800 plus 1 ETH at 2,000 averages to 1,900
    assert_eq!(
        next.next_entry_price,
        Some(atom_price(1_900, env.eth_decimals))
    );
    // 3,800 over 2,000 of collateral
    assert_eq!(next.next_leverage_bps, Some(U256::from(19_000u64)));
    // 2 ETH at the min quote vs the 3,800 entry
    assert_eq!(next.next_pnl_usd, SignedU256::pos(usd(200)));

    // maintenance at 2%: P = (3,800 + 76 - 2,000) / 2 ETH
    assert_eq!(
        next.next_liq_price,
        Some(usd(938) / U256::exp10(env.eth_decimals as usize))
    );
}
