use super::helpers::*;

use pretty_assertions::assert_eq;
use primitive_types::U256;

use crate::market::MarketInfo;
use crate::math::float_one;
use crate::position::Position;
use crate::trade::decrease::{get_decrease_position_amounts, DecreasePositionParams};
use crate::trade::next_values::{get_next_position_values, NextPositionParams, PositionSizingCfg};
use crate::types::{AssetId, Side, SignedU256, TokenData, TokenPrices, TradeDirection};

/// USD(1e30) per atom for a whole-token quote.
fn atom_price(usd_per_token: u128, decimals: u8) -> U256 {
    usd(usd_per_token) / U256::exp10(decimals as usize)
}

/// Whole-dollar exits: 1% position fee, no price impact.
fn flat_position_costs(market: &mut MarketInfo) {
    market.fees.position_fee_factor_positive = float_one() / 100;
    market.fees.position_fee_factor_negative = float_one() / 100;
    market.impact.position_impact_factor_positive = U256::zero();
    market.impact.position_impact_factor_negative = U256::zero();
}

/// No exit costs at all.
fn free_position_costs(market: &mut MarketInfo) {
    flat_position_costs(market);
    market.fees.position_fee_factor_positive = U256::zero();
    market.fees.position_fee_factor_negative = U256::zero();
}

fn params<'a>(
    env: &'a TestEnv,
    collateral: AssetId,
    position: &'a Position,
    sizing: &'a PositionSizingCfg,
    close_size_usd: U256,
    keep_leverage: bool,
) -> DecreasePositionParams<'a> {
    DecreasePositionParams {
        market: env.market(env.market_eth_usdc),
        index_token: env.token(env.eth),
        collateral_token: env.token(collateral),
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
fn eth_collateral_long_pays_out_in_eth() {
    let mut env = setup_env(2_000);
    flat_position_costs(env.market_mut(env.market_eth_usdc));
    let sizing = PositionSizingCfg::mvp();

    // 1 ETH long from $2,000 backed by 0.5 ETH, closing half of it.
    let position = Position {
        size_usd: usd(2_000),
        size_tokens: to_atoms(1, 18),
        collateral_amount: to_atoms(5, 17),
        ..Position::empty(env.market_eth_usdc, env.eth, Side::Long)
    };

    let amounts = get_decrease_position_amounts(&params(
        &env,
        env.eth,
        &position,
        &sizing,
        usd(1_000),
        true,
    ))
    .unwrap();

    assert_eq!(amounts.size_delta_usd, usd(1_000));
    assert_eq!(amounts.size_delta_tokens, to_atoms(5, 17));
    assert!(!amounts.is_full_close);

    // keep-leverage releases half the 1,000 USD of ETH backing
    assert_eq!(amounts.collateral_delta_usd, usd(500));
    assert_eq!(amounts.collateral_delta_amount, to_atoms(25, 16)); // 0.25 ETH

    // entry and the min exit quote coincide: nothing to realize
    assert!(amounts.estimated_pnl_usd.is_zero());
    assert!(amounts.realized_pnl_usd.is_zero());

    // 1% of the closed size, settled out of the payout in ETH
    assert_eq!(amounts.position_fee_usd, usd(10));
    assert_eq!(amounts.receive_usd, usd(490));
    assert_eq!(amounts.receive_token_amount, to_atoms(245, 15)); // 0.245 ETH

    assert_eq!(amounts.index_price, atom_price(2_000, env.eth_decimals));
    assert_eq!(amounts.acceptable_price, amounts.index_price);
}

#[test]
fn short_full_close_exits_at_the_max_quote() {
    let mut env = setup_env(2_000);
    flat_position_costs(env.market_mut(env.market_eth_usdc));
    // a spread on the index: shorts close against the max quote
    let eth_prices = TokenPrices {
        min: atom_price(1_900, 18),
        max: atom_price(1_920, 18),
    };
    env.snapshot
        .tokens
        .insert(env.eth, TokenData::new(env.eth, 18, eth_prices));
    let sizing = PositionSizingCfg::mvp();

    // 1 ETH short from $2,000 owing carry-over fees.
    let position = Position {
        size_usd: usd(2_000),
        size_tokens: to_atoms(1, 18),
        collateral_amount: to_atoms(1_000, env.usdc_decimals),
        pending_borrowing_fee_usd: usd(3),
        pending_funding_fee_usd: usd(1),
        ..Position::empty(env.market_eth_usdc, env.usdc, Side::Short)
    };

    let amounts = get_decrease_position_amounts(&params(
        &env,
        env.usdc,
        &position,
        &sizing,
        usd(2_000),
        false,
    ))
    .unwrap();

    assert!(amounts.is_full_close);
    assert_eq!(amounts.index_price, atom_price(1_920, 18));
    assert_eq!(amounts.size_delta_tokens, to_atoms(1, 18));

    // short gain: 2,000 entry against a 1,920 exit
    assert_eq!(amounts.estimated_pnl_usd, SignedU256::pos(usd(80)));
    assert_eq!(amounts.realized_pnl_usd, SignedU256::pos(usd(80)));

    // a full close releases all the backing and settles every fee:
    // 1,000 + 80 - 20 - 3 - 1
    assert_eq!(amounts.collateral_delta_usd, usd(1_000));
    assert_eq!(amounts.position_fee_usd, usd(20));
    assert_eq!(amounts.borrowing_fee_usd, usd(3));
    assert_eq!(amounts.funding_fee_usd, usd(1));
    assert_eq!(amounts.receive_usd, usd(1_056));
    assert_eq!(amounts.receive_token_amount, to_atoms(1_056, 6));

    // nothing remains to project
    let index_prices = env.token(env.eth).prices.unwrap();
    let collateral_prices = env.token(env.usdc).prices.unwrap();
    let next = get_next_position_values(&NextPositionParams {
        market: env.market(env.market_eth_usdc),
        position: &position,
        direction: TradeDirection::Decrease,
        size_delta_usd: amounts.size_delta_usd,
        size_delta_tokens: amounts.size_delta_tokens,
        collateral_delta_usd: amounts.collateral_delta_usd,
        pending_costs_usd: U256::zero(),
        index_prices: &index_prices,
        collateral_prices: &collateral_prices,
        cfg: &sizing,
    })
    .unwrap();

    assert_eq!(next.next_size_usd, U256::zero());
    assert_eq!(next.next_size_tokens, U256::zero());
    assert_eq!(next.next_collateral_usd, U256::zero());
    assert_eq!(next.next_leverage_bps, None);
    assert_eq!(next.next_entry_price, None);
    assert_eq!(next.next_liq_price, None);
    assert!(next.next_pnl_usd.is_zero());
}

#[test]
fn underwater_long_clamps_the_payout_at_zero() {
    // the index collapsed from the $2,000 entry to $900
    let mut env = setup_env(900);
    flat_position_costs(env.market_mut(env.market_eth_usdc));
    let sizing = PositionSizingCfg::mvp();

    let position = Position {
        size_usd: usd(2_000),
        size_tokens: to_atoms(1, 18),
        collateral_amount: to_atoms(1_000, env.usdc_decimals),
        ..Position::empty(env.market_eth_usdc, env.usdc, Side::Long)
    };

    let amounts = get_decrease_position_amounts(&params(
        &env,
        env.usdc,
        &position,
        &sizing,
        usd(2_000),
        false,
    ))
    .unwrap();

    assert!(amounts.is_full_close);
    assert_eq!(amounts.estimated_pnl_usd, SignedU256::neg(usd(1_100)));
    assert_eq!(amounts.realized_pnl_usd, SignedU256::neg(usd(1_100)));

    // the release is reported in full even though the loss consumes it:
    // 1,000 - 1,100 - 20 nets below zero
    assert_eq!(amounts.collateral_delta_usd, usd(1_000));
    assert_eq!(amounts.position_fee_usd, usd(20));
    assert_eq!(amounts.receive_usd, U256::zero());
    assert_eq!(amounts.receive_token_amount, U256::zero());
}

#[test]
fn keep_leverage_projection_holds_the_leverage_steady() {
    let mut env = setup_env(2_000);
    free_position_costs(env.market_mut(env.market_eth_usdc));
    let sizing = PositionSizingCfg::mvp();

    // a 4x long: 2,000 of size on 500 of collateral
    let position = Position {
        size_usd: usd(2_000),
        size_tokens: to_atoms(1, 18),
        collateral_amount: to_atoms(500, env.usdc_decimals),
        ..Position::empty(env.market_eth_usdc, env.usdc, Side::Long)
    };

    let amounts = get_decrease_position_amounts(&params(
        &env,
        env.usdc,
        &position,
        &sizing,
        usd(1_000),
        true,
    ))
    .unwrap();

    // free market: the released quarter comes straight back
    assert_eq!(amounts.collateral_delta_usd, usd(250));
    assert_eq!(amounts.receive_usd, usd(250));
    assert_eq!(amounts.receive_token_amount, to_atoms(250, 6));

    let index_prices = env.token(env.eth).prices.unwrap();
    let collateral_prices = env.token(env.usdc).prices.unwrap();
    let next = get_next_position_values(&NextPositionParams {
        market: env.market(env.market_eth_usdc),
        position: &position,
        direction: TradeDirection::Decrease,
        size_delta_usd: amounts.size_delta_usd,
        size_delta_tokens: amounts.size_delta_tokens,
        collateral_delta_usd: amounts.collateral_delta_usd,
        pending_costs_usd: U256::zero(),
        index_prices: &index_prices,
        collateral_prices: &collateral_prices,
        cfg: &sizing,
    })
    .unwrap();

    assert_eq!(next.next_size_usd, usd(1_000));
    assert_eq!(next.next_size_tokens, to_atoms(5, 17));
    assert_eq!(next.next_collateral_usd, usd(250));

    // the whole point of keep-leverage: still 4x
    assert_eq!(next.next_leverage_bps, Some(U256::from(40_000u64)));
    assert_eq!(
        next.next_entry_price,
        Some(atom_price(2_000, env.eth_decimals))
    );
    assert!(next.next_pnl_usd.is_zero());

    // maintenance at 2% of 1,000 is 20: P = (1,000 + 20 - 250) / 0.5 ETH
    assert_eq!(
        next.next_liq_price,
        Some(usd(1_540) / U256::exp10(env.eth_decimals as usize))
    );
}
