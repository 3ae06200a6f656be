// src/trade/next_values.rs
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::market::MarketInfo;
use crate::math::pnl;
use crate::math::rounding::{div_round, Rounding};
use crate::math::{apply_factor, float_one, usd_one};
use crate::position::Position;
use crate::types::{Side, SignedU256, TokenAmount, TokenPrices, TradeDirection, Usd};

/// Position sizing thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionSizingCfg {
    /// A decrease leaving less than this much size closes fully.
    /// USD(1e30)
    pub min_position_size_usd: Usd,

    /// Absolute minimum collateral for a position to remain open.
    /// USD(1e30)
    pub min_collateral_usd: Usd,

    /// Maintenance margin factor vs position notional, 1e18 fixed point.
    ///
    /// required_collateral_usd >= size_usd * min_collateral_factor_fp
    pub min_collateral_factor_fp: U256,
}

impl PositionSizingCfg {
    /// MVP defaults:
    /// - dust: $10
    /// - min collateral: $5
    /// - maintenance factor ~ 2% (50x)
    pub fn mvp() -> Self {
        Self::with_max_leverage_and_thresholds(50, 10, 5)
    }

    /// Human-readable USD thresholds (no scale) and a max leverage that is
    /// converted to a maintenance factor: 1 / max_leverage in FP(1e18).
    pub fn with_max_leverage_and_thresholds(
        max_leverage_x: u64,
        dust_usd: u64,
        min_collateral_usd: u64,
    ) -> Self {
        assert!(max_leverage_x > 0, "max_leverage_x must be > 0");

        Self {
            min_position_size_usd: U256::from(dust_usd) * usd_one(),
            min_collateral_usd: U256::from(min_collateral_usd) * usd_one(),
            min_collateral_factor_fp: float_one() / U256::from(max_leverage_x),
        }
    }
}

impl Default for PositionSizingCfg {
    fn default() -> Self {
        Self::mvp()
    }
}

/// Position state projected past one increase or decrease.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextPositionValues {
    pub next_size_usd: Usd,
    pub next_size_tokens: TokenAmount,
    pub next_collateral_usd: Usd,

    /// None when the projected collateral is zero.
    pub next_leverage_bps: Option<U256>,
    /// None when the projected position holds no tokens.
    pub next_entry_price: Option<Usd>,
    /// None when the projected position has no size.
    pub next_liq_price: Option<Usd>,

    /// PnL of the projected position at the conservative index quote.
    pub next_pnl_usd: SignedU256,
}

pub struct NextPositionParams<'a> {
    pub market: &'a MarketInfo,
    pub position: &'a Position,
    pub direction: TradeDirection,

    pub size_delta_usd: Usd,
    pub size_delta_tokens: TokenAmount,
    pub collateral_delta_usd: Usd,

    /// Carry-overs still owed after the projected trade. The trade itself
    /// settles the position's pending fees, so this is usually zero.
    pub pending_costs_usd: Usd,

    pub index_prices: &'a TokenPrices,
    pub collateral_prices: &'a TokenPrices,
    pub cfg: &'a PositionSizingCfg,
}

/// required_usd = max(min_collateral_usd, size_usd * min_collateral_factor_fp)
pub fn required_collateral_usd(size_usd: Usd, cfg: &PositionSizingCfg) -> EngineResult<Usd> {
    let required_by_leverage = apply_factor(size_usd, cfg.min_collateral_factor_fp)?;
    Ok(required_by_leverage.max(cfg.min_collateral_usd))
}

/// Index price (USD(1e30) per atom) at which the position's equity hits
/// the maintenance threshold.
///
/// Derivation, with C = collateral USD, R = required USD, K = pending
/// costs + close fees, entry = size_usd, T = size_tokens:
///
/// Long:  equity = C + (T*P - entry) - K, boundary at equity = R
///        => P = (entry + R + K - C) / T   (round UP: liquidate earlier)
/// Short: equity = C + (entry - T*P) - K
///        => P = (entry + C - K - R) / T   (round DOWN: liquidate earlier)
///
/// Close fees are estimated at the market's negative position-fee factor.
/// A boundary outside the positive price range yields zero.
pub fn liquidation_price(
    market: &MarketInfo,
    side: Side,
    size_usd: Usd,
    size_tokens: TokenAmount,
    collateral_usd: Usd,
    pending_costs_usd: Usd,
    cfg: &PositionSizingCfg,
) -> EngineResult<Usd> {
    if size_usd.is_zero() || size_tokens.is_zero() {
        return Err(EngineError::InvalidMarket("liquidation_price_empty_position"));
    }

    let r = required_collateral_usd(size_usd, cfg)?;
    let close_fees = apply_factor(size_usd, market.fees.position_fee_factor_negative)?;
    let k = pending_costs_usd.saturating_add(close_fees);

    let c = collateral_usd;
    let entry = size_usd;
    let t = size_tokens;

    let price = match side {
        Side::Long => {
            let numer = entry
                .checked_add(r)
                .and_then(|v| v.checked_add(k))
                .ok_or(EngineError::Overflow("liquidation_price"))?;
            if numer <= c {
                U256::zero()
            } else {
                div_round(numer - c, t, Rounding::Up)?
            }
        }
        Side::Short => {
            let numer = entry
                .checked_add(c)
                .ok_or(EngineError::Overflow("liquidation_price"))?;
            let costs = k.saturating_add(r);
            if numer <= costs {
                U256::zero()
            } else {
                div_round(numer - costs, t, Rounding::Down)?
            }
        }
    };

    Ok(price)
}

/// Project the position past one trade.
///
/// Increases re-average the entry price through the summed size figures;
/// decreases shrink both size figures proportionally, which keeps it.
pub fn get_next_position_values(
    params: &NextPositionParams<'_>,
) -> EngineResult<NextPositionValues> {
    let pos = params.position;
    let collateral_usd = pos.collateral_usd(params.collateral_prices)?;

    let (next_size_usd, next_size_tokens, next_collateral_usd) = match params.direction {
        TradeDirection::Increase => (
            pos.size_usd
                .checked_add(params.size_delta_usd)
                .ok_or(EngineError::Overflow("next_size_usd"))?,
            pos.size_tokens
                .checked_add(params.size_delta_tokens)
                .ok_or(EngineError::Overflow("next_size_tokens"))?,
            collateral_usd
                .checked_add(params.collateral_delta_usd)
                .ok_or(EngineError::Overflow("next_collateral_usd"))?,
        ),
        TradeDirection::Decrease => (
            pos.size_usd.saturating_sub(params.size_delta_usd),
            pos.size_tokens.saturating_sub(params.size_delta_tokens),
            collateral_usd.saturating_sub(params.collateral_delta_usd),
        ),
    };

    let next_pnl_usd = pnl::position_pnl_usd(
        pos.side,
        next_size_usd,
        next_size_tokens,
        params.index_prices,
    )?;

    let next_liq_price = if next_size_usd.is_zero() || next_size_tokens.is_zero() {
        None
    } else {
        Some(liquidation_price(
            params.market,
            pos.side,
            next_size_usd,
            next_size_tokens,
            next_collateral_usd,
            params.pending_costs_usd,
            params.cfg,
        )?)
    };

    Ok(NextPositionValues {
        next_size_usd,
        next_size_tokens,
        next_collateral_usd,
        next_leverage_bps: pnl::leverage_bps(next_size_usd, next_collateral_usd)?,
        next_entry_price: pnl::entry_price(next_size_usd, next_size_tokens)?,
        next_liq_price,
        next_pnl_usd,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{ImpactCfg, MarketFeesCfg};
    use crate::types::{AssetId, MarketId};

    fn usd(x: u64) -> U256 {
        U256::from(x) * usd_one()
    }

    fn market_no_fees() -> MarketInfo {
        MarketInfo {
            id: MarketId(1),
            index_token: AssetId(1),
            long_token: AssetId(1),
            short_token: AssetId(2),
            pool_amount_long: U256::zero(),
            pool_amount_short: U256::zero(),
            oi_long_usd: U256::zero(),
            oi_short_usd: U256::zero(),
            is_disabled: false,
            is_spot_only: false,
            fees: MarketFeesCfg {
                swap_fee_factor_positive: U256::zero(),
                swap_fee_factor_negative: U256::zero(),
                position_fee_factor_positive: U256::zero(),
                position_fee_factor_negative: U256::zero(),
            },
            impact: ImpactCfg::default_quadratic(),
        }
    }

    fn sizing_10x() -> PositionSizingCfg {
        PositionSizingCfg::with_max_leverage_and_thresholds(10, 10, 5)
    }

    #[test]
    fn mvp_thresholds() {
        let cfg = PositionSizingCfg::mvp();
        assert_eq!(cfg.min_position_size_usd, usd(10));
        assert_eq!(cfg.min_collateral_usd, usd(5));
        // 50x => 2%
        assert_eq!(cfg.min_collateral_factor_fp, float_one() / 50);
    }

    #[test]
    fn liquidation_price_long_basic() {
        // Long: entry=$200 over 2 atoms, collateral=$50, required=$20
        // => P = (200 + 20 - 50) / 2 = 85
        let market = market_no_fees();
        let p = liquidation_price(
            &market,
            Side::Long,
            usd(200),
            U256::from(2u64),
            usd(50),
            U256::zero(),
            &sizing_10x(),
        )
        .unwrap();
        assert_eq!(p, usd(85));
    }

    #[test]
    fn liquidation_price_short_basic() {
        // Short: entry=$200 over 2 atoms, collateral=$50, required=$20
        // => P = (200 + 50 - 20) / 2 = 115
        let market = market_no_fees();
        let p = liquidation_price(
            &market,
            Side::Short,
            usd(200),
            U256::from(2u64),
            usd(50),
            U256::zero(),
            &sizing_10x(),
        )
        .unwrap();
        assert_eq!(p, usd(115));
    }

    #[test]
    fn overcollateralized_long_never_liquidates() {
        let market = market_no_fees();
        let p = liquidation_price(
            &market,
            Side::Long,
            usd(200),
            U256::from(2u64),
            usd(500),
            U256::zero(),
            &sizing_10x(),
        )
        .unwrap();
        assert_eq!(p, U256::zero());
    }

    #[test]
    fn increase_re_averages_the_entry() {
        // 2 atoms at $100 each, adding 2 atoms at $200 each => entry $150.
        let market = market_no_fees();
        let pos = Position {
            size_usd: usd(200),
            size_tokens: U256::from(2u64),
            collateral_amount: U256::from(100u64), // 100 atoms at $1
            ..Position::empty(MarketId(1), AssetId(2), Side::Long)
        };
        let index_prices = TokenPrices {
            min: usd(200),
            max: usd(200),
        };
        let collateral_prices = TokenPrices {
            min: usd(1),
            max: usd(1),
        };

        let next = get_next_position_values(&NextPositionParams {
            market: &market,
            position: &pos,
            direction: TradeDirection::Increase,
            size_delta_usd: usd(400),
            size_delta_tokens: U256::from(2u64),
            collateral_delta_usd: usd(100),
            pending_costs_usd: U256::zero(),
            index_prices: &index_prices,
            collateral_prices: &collateral_prices,
            cfg: &sizing_10x(),
        })
        .unwrap();

        assert_eq!(next.next_size_usd, usd(600));
        assert_eq!(next.next_size_tokens, U256::from(4u64));
        assert_eq!(next.next_entry_price, Some(usd(150)));
        // 4 atoms at min quote $200 = $800 value vs $600 entry
        assert_eq!(next.next_pnl_usd, SignedU256::pos(usd(200)));
        // leverage = 600 / 200 = 3x
        assert_eq!(next.next_leverage_bps, Some(U256::from(30_000u64)));
    }

    #[test]
    fn full_decrease_projects_to_an_empty_position() {
        let market = market_no_fees();
        let pos = Position {
            size_usd: usd(600),
            size_tokens: U256::from(4u64),
            collateral_amount: U256::from(200u64),
            ..Position::empty(MarketId(1), AssetId(2), Side::Short)
        };
        let prices = TokenPrices {
            min: usd(1),
            max: usd(1),
        };
        let index_prices = TokenPrices {
            min: usd(150),
            max: usd(150),
        };

        let next = get_next_position_values(&NextPositionParams {
            market: &market,
            position: &pos,
            direction: TradeDirection::Decrease,
            size_delta_usd: usd(600),
            size_delta_tokens: U256::from(4u64),
            collateral_delta_usd: usd(200),
            pending_costs_usd: U256::zero(),
            index_prices: &index_prices,
            collateral_prices: &prices,
            cfg: &sizing_10x(),
        })
        .unwrap();

        assert_eq!(next.next_size_usd, U256::zero());
        assert_eq!(next.next_leverage_bps, None);
        assert_eq!(next.next_entry_price, None);
        assert_eq!(next.next_liq_price, None);
        assert!(next.next_pnl_usd.is_zero());
    }

    #[test]
    fn close_fees_move_the_liquidation_boundary() {
        // 7 bps close fee on $200 size = $0.14 added to the cost side.
        let mut market = market_no_fees();
        market.fees.position_fee_factor_negative = float_one() * 7 / 10_000;

        let without = liquidation_price(
            &market_no_fees(),
            Side::Long,
            usd(200),
            U256::from(2u64),
            usd(50),
            U256::zero(),
            &sizing_10x(),
        )
        .unwrap();
        let with = liquidation_price(
            &market,
            Side::Long,
            usd(200),
            U256::from(2u64),
            usd(50),
            U256::zero(),
            &sizing_10x(),
        )
        .unwrap();
        assert_eq!(with - without, usd(14) / U256::from(200u64));
    }
}
