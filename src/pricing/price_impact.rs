// src/pricing/price_impact.rs
use primitive_types::U256;

use crate::error::EngineError;
use crate::market::{MarketInfo, MarketsSnapshot};
use crate::math::rounding::{mul_div, Rounding};
use crate::math::{apply_factor, apply_signed_add, float_one, usd_one};
use crate::types::{AssetId, Side, SignedU256, Usd};

/// Long/short USD balances of one market dimension (open interest for
/// position trades, pool value for swaps).
#[derive(Clone, Copy, Debug, Default)]
pub struct SideBalances {
    pub long_usd: Usd,
    pub short_usd: Usd,
}

/// Balances before and after the candidate trade.
#[derive(Clone, Copy, Debug)]
pub struct RebalanceParams {
    pub current: SideBalances,
    pub next: SideBalances,
}

/// Impact curve: factors are fixed-point with scale 1e18.
#[derive(Clone, Copy, Debug)]
pub struct ImpactCurve {
    /// Exponent "e" in d^e (e.g. 1, 2, 3).
    pub exponent: u32,
    /// Applied when the imbalance shrinks (helpful trades).
    pub factor_positive_fp: U256,
    /// Applied when it grows (harmful trades).
    pub factor_negative_fp: U256,
}

impl MarketInfo {
    pub fn position_impact_curve(&self) -> ImpactCurve {
        ImpactCurve {
            exponent: self.impact.position_impact_exponent,
            factor_positive_fp: self.impact.position_impact_factor_positive,
            factor_negative_fp: self.impact.position_impact_factor_negative,
        }
    }

    pub fn swap_impact_curve(&self) -> ImpactCurve {
        ImpactCurve {
            exponent: self.impact.swap_impact_exponent,
            factor_positive_fp: self.impact.swap_impact_factor_positive,
            factor_negative_fp: self.impact.swap_impact_factor_negative,
        }
    }
}

/// |a - b| for U256
fn abs_diff(a: U256, b: U256) -> U256 {
    if a >= b {
        a - b
    } else {
        b - a
    }
}

/// x^exp but kept in USD(1e30) scale:
/// exp=1 => x
/// exp=2 => x*x / 1e30
/// exp=3 => x*x/1e30 * x/1e30
fn pow_usd_scaled(x: U256, exp: u32) -> Result<U256, EngineError> {
    if exp == 0 {
        return Err(EngineError::ZeroImpactExponent);
    }
    if exp == 1 {
        return Ok(x);
    }
    let scale = usd_one();
    let mut res = x;
    for _ in 1..exp {
        res = mul_div(res, x, scale, Rounding::Down)?;
    }
    Ok(res)
}

/// Impact of moving the long/short balance from `current` to `next`.
///
/// Same-side rebalance: impact ~ (d0^e - d1^e) * factor, the factor chosen
/// by whether the imbalance shrank. Crossover rebalance:
/// impact = d0^e * positive_factor - d1^e * negative_factor.
///
/// Returns the signed USD impact and whether the absolute imbalance shrank.
pub fn imbalance_impact_usd(
    params: &RebalanceParams,
    curve: &ImpactCurve,
) -> Result<(SignedU256, bool), EngineError> {
    let long0 = params.current.long_usd;
    let short0 = params.current.short_usd;
    let long1 = params.next.long_usd;
    let short1 = params.next.short_usd;

    let initial_long_le_short = long0 <= short0;
    let next_long_le_short = long1 <= short1;
    let is_same_side_rebalance = initial_long_le_short == next_long_le_short;

    // absolute imbalance before / after
    let initial_diff = abs_diff(long0, short0);
    let next_diff = abs_diff(long1, short1);

    let balance_was_improved = next_diff < initial_diff;

    let e = curve.exponent;
    let d0e = pow_usd_scaled(initial_diff, e)?;
    let d1e = pow_usd_scaled(next_diff, e)?;

    if is_same_side_rebalance {
        let factor_fp = if balance_was_improved {
            curve.factor_positive_fp
        } else {
            curve.factor_negative_fp
        };

        // diff_e = d0^e - d1^e (with sign)
        let (diff_e, is_negative): (U256, bool) = if d0e >= d1e {
            (d0e - d1e, false)
        } else {
            (d1e - d0e, true)
        };

        let mag_usd = mul_div(diff_e, factor_fp, float_one(), Rounding::Down)?;
        let impact = if is_negative {
            SignedU256::neg(mag_usd)
        } else {
            SignedU256::pos(mag_usd)
        };
        Ok((impact, balance_was_improved))
    } else {
        // Crossover: positive credit on the vanishing imbalance, negative
        // charge on the newly created one.
        let term0 = mul_div(d0e, curve.factor_positive_fp, float_one(), Rounding::Down)?;
        let term1 = mul_div(d1e, curve.factor_negative_fp, float_one(), Rounding::Down)?;

        let impact = if term0 >= term1 {
            SignedU256::pos(term0 - term1)
        } else {
            SignedU256::neg(term1 - term0)
        };
        Ok((impact, balance_was_improved))
    }
}

/// Open interest before/after applying a signed size delta to one side.
pub fn next_open_interest(
    market: &MarketInfo,
    size_delta_usd: SignedU256,
    side: Side,
) -> Result<RebalanceParams, EngineError> {
    let current = SideBalances {
        long_usd: market.oi_long_usd,
        short_usd: market.oi_short_usd,
    };
    let next = match side {
        Side::Long => SideBalances {
            long_usd: apply_signed_add(current.long_usd, size_delta_usd)?,
            short_usd: current.short_usd,
        },
        Side::Short => SideBalances {
            long_usd: current.long_usd,
            short_usd: apply_signed_add(current.short_usd, size_delta_usd)?,
        },
    };
    Ok(RebalanceParams { current, next })
}

/// Raw (uncapped) price impact of a position trade on this market.
pub fn position_price_impact_usd(
    market: &MarketInfo,
    size_delta_usd: SignedU256,
    side: Side,
) -> Result<(SignedU256, bool), EngineError> {
    let params = next_open_interest(market, size_delta_usd, side)?;
    imbalance_impact_usd(&params, &market.position_impact_curve())
}

/// Capped position impact plus the part the cap removed.
#[derive(Clone, Copy, Debug, Default)]
pub struct CappedImpact {
    pub impact_usd: SignedU256,
    /// Negative impact clipped by the decrease-side cap, claimable later.
    pub price_impact_diff_usd: Usd,
    /// Sign of the raw impact; selects the fee factor.
    pub balance_was_improved: bool,
}

/// Position impact with the protocol caps applied:
/// - positive impact never exceeds max_positive_factor * |size_delta|;
/// - on decreases, negative impact beyond max_negative_factor * |size_delta|
///   is clipped and the difference recorded as `price_impact_diff_usd`.
pub fn capped_position_impact(
    market: &MarketInfo,
    size_delta_usd: SignedU256,
    side: Side,
    is_decrease: bool,
) -> Result<CappedImpact, EngineError> {
    if size_delta_usd.is_zero() {
        return Ok(CappedImpact::default());
    }

    let (raw, _) = position_price_impact_usd(market, size_delta_usd, side)?;
    let size_mag = size_delta_usd.mag;

    let mut impact = raw;
    let mut diff = U256::zero();

    if raw.is_positive() {
        let cap = apply_factor(size_mag, market.impact.max_position_impact_factor_positive)?;
        if impact.mag > cap {
            impact = SignedU256::pos(cap);
        }
    } else if raw.is_negative && is_decrease {
        let floor = apply_factor(size_mag, market.impact.max_position_impact_factor_negative)?;
        if impact.mag > floor {
            diff = impact.mag - floor;
            impact = SignedU256::neg(floor);
        }
    }

    Ok(CappedImpact {
        impact_usd: impact,
        price_impact_diff_usd: diff,
        balance_was_improved: raw.is_positive(),
    })
}

/// Price impact of swapping usd_in through the market's pool: the in side
/// grows, the out side shrinks, the swap curve prices the rebalance.
/// Capped at max_swap_impact_factor * usd_in on both signs.
///
/// Returns the capped impact and the fee-factor selector (raw sign).
pub fn swap_price_impact_usd(
    snapshot: &MarketsSnapshot,
    market: &MarketInfo,
    token_in: AssetId,
    token_out: AssetId,
    usd_in: Usd,
) -> Result<(SignedU256, bool), EngineError> {
    let long_pool_usd = snapshot.available_liquidity_usd(market, market.long_token)?;
    let short_pool_usd = snapshot.available_liquidity_usd(market, market.short_token)?;

    let delta_in = |side_usd: Usd| -> Result<Usd, EngineError> {
        side_usd
            .checked_add(usd_in)
            .ok_or(EngineError::Overflow("swap_pool_delta"))
    };
    let delta_out = |side_usd: Usd| -> Result<Usd, EngineError> {
        side_usd
            .checked_sub(usd_in)
            .ok_or(EngineError::Underflow("swap_pool_delta"))
    };

    let current = SideBalances {
        long_usd: long_pool_usd,
        short_usd: short_pool_usd,
    };
    let next = if token_in == market.long_token && token_out == market.short_token {
        SideBalances {
            long_usd: delta_in(long_pool_usd)?,
            short_usd: delta_out(short_pool_usd)?,
        }
    } else if token_in == market.short_token && token_out == market.long_token {
        SideBalances {
            long_usd: delta_out(long_pool_usd)?,
            short_usd: delta_in(short_pool_usd)?,
        }
    } else {
        return Err(EngineError::InvalidMarket("swap_tokens_not_in_market"));
    };

    let (raw, _) = imbalance_impact_usd(
        &RebalanceParams { current, next },
        &market.swap_impact_curve(),
    )?;

    let cap = apply_factor(usd_in, market.impact.max_swap_impact_factor)?;
    let capped = if raw.mag > cap {
        if raw.is_negative {
            SignedU256::neg(cap)
        } else {
            SignedU256::pos(cap)
        }
    } else {
        raw
    };

    Ok((capped, raw.is_positive()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::usd_one;

    fn usd(x: u64) -> U256 {
        U256::from(x) * usd_one()
    }

    fn curve() -> ImpactCurve {
        ImpactCurve {
            exponent: 2,
            factor_positive_fp: float_one() / 1_000_000,
            factor_negative_fp: float_one() * 4 / 1_000_000,
        }
    }

    fn params(l0: u64, s0: u64, l1: u64, s1: u64) -> RebalanceParams {
        RebalanceParams {
            current: SideBalances {
                long_usd: usd(l0),
                short_usd: usd(s0),
            },
            next: SideBalances {
                long_usd: usd(l1),
                short_usd: usd(s1),
            },
        }
    }

    #[test]
    fn same_side_shrinking_imbalance_is_positive() {
        // diff 1000 -> 600, quadratic, positive factor 1e-6:
        // (1000^2 - 600^2) * 1e-6 = 640_000 * 1e-6 = 0.64 usd
        let (impact, improved) =
            imbalance_impact_usd(&params(2000, 3000, 2400, 3000), &curve()).unwrap();
        assert!(improved);
        assert!(!impact.is_negative);
        assert_eq!(impact.mag, usd(640_000) / U256::from(1_000_000u64));
    }

    #[test]
    fn same_side_growing_imbalance_is_negative() {
        // diff 1000 -> 1400 with the 4e-6 factor:
        // (1400^2 - 1000^2) * 4e-6 = 960_000 * 4e-6 = 3.84 usd
        let (impact, improved) =
            imbalance_impact_usd(&params(2000, 3000, 1600, 3000), &curve()).unwrap();
        assert!(!improved);
        assert!(impact.is_negative);
        assert_eq!(impact.mag, usd(960_000) * U256::from(4u64) / U256::from(1_000_000u64));
    }

    #[test]
    fn crossover_charges_the_new_imbalance() {
        // long 1000/short 3000 -> long 3400/short 3000:
        // d0 = 2000, d1 = 400, crossover
        // impact = 2000^2 * 1e-6 - 400^2 * 4e-6 = 4.0 - 0.64 = 3.36 usd
        let (impact, improved) =
            imbalance_impact_usd(&params(1000, 3000, 3400, 3000), &curve()).unwrap();
        assert!(improved);
        assert!(!impact.is_negative);
        let expected = usd(4_000_000) / U256::from(1_000_000u64)
            - usd(160_000) * U256::from(4u64) / U256::from(1_000_000u64);
        assert_eq!(impact.mag, expected);
    }

    fn test_market(oi_long: u64, oi_short: u64) -> MarketInfo {
        MarketInfo {
            id: crate::types::MarketId(1),
            index_token: crate::types::AssetId(1),
            long_token: crate::types::AssetId(1),
            short_token: crate::types::AssetId(2),
            pool_amount_long: U256::zero(),
            pool_amount_short: U256::zero(),
            oi_long_usd: usd(oi_long),
            oi_short_usd: usd(oi_short),
            is_disabled: false,
            is_spot_only: false,
            fees: crate::market::MarketFeesCfg::default_bps(),
            impact: crate::market::ImpactCfg::default_quadratic(),
        }
    }

    #[test]
    fn positive_position_impact_is_capped() {
        // Closing the gap long->short by a large trade: raw positive impact
        // exceeds 0.5% of size and must clamp there.
        let market = test_market(1_000_000, 0);
        let capped = capped_position_impact(
            &market,
            SignedU256::pos(usd(1_000_000)),
            Side::Short,
            false,
        )
        .unwrap();
        let cap = apply_factor(usd(1_000_000), market.impact.max_position_impact_factor_positive)
            .unwrap();
        assert_eq!(capped.impact_usd, SignedU256::pos(cap));
        assert!(capped.balance_was_improved);
        assert_eq!(capped.price_impact_diff_usd, U256::zero());
    }

    #[test]
    fn decrease_negative_impact_overflow_is_recorded() {
        // Removing short interest below an already dominant long side grows
        // the gap far past the negative cap.
        let market = test_market(2_000_000, 1_000_000);
        let capped = capped_position_impact(
            &market,
            SignedU256::neg(usd(1_000_000)),
            Side::Short,
            true,
        )
        .unwrap();
        assert!(capped.impact_usd.is_negative);
        let floor = apply_factor(usd(1_000_000), market.impact.max_position_impact_factor_negative)
            .unwrap();
        assert_eq!(capped.impact_usd.mag, floor);
        assert!(!capped.price_impact_diff_usd.is_zero());
    }

    #[test]
    fn zero_size_delta_has_no_impact() {
        let market = test_market(100, 200);
        let capped =
            capped_position_impact(&market, SignedU256::zero(), Side::Long, false).unwrap();
        assert_eq!(capped.impact_usd, SignedU256::zero());
    }
}
