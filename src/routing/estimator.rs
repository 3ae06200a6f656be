// src/routing/estimator.rs
use log::debug;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::graph::MarketEdge;
use crate::market::{MarketInfo, MarketsSnapshot};
use crate::math::apply_signed_add_floor_zero;
use crate::math::rounding::{div_round, Rounding};
use crate::math::{apply_factor, usd_one};
use crate::pricing::fees::swap_fee_factor;
use crate::pricing::price_impact::swap_price_impact_usd;
use crate::routing::path_finder::SwapRoute;
use crate::types::{AssetId, MarketId, SignedU256, TokenAmount, Usd};

/// Full accounting of pushing `usd_in` through one market hop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapStats {
    pub market: MarketId,
    pub token_in: AssetId,
    pub token_out: AssetId,

    pub usd_in: Usd,
    pub amount_in: TokenAmount,

    pub swap_fee_usd: Usd,
    pub swap_fee_amount: TokenAmount,
    /// Capped pool-rebalance impact applied to the output.
    pub price_impact_delta_usd: SignedU256,

    pub usd_out: Usd,
    pub amount_out: TokenAmount,

    /// The hop asks for more of the out token than the pool holds.
    pub is_out_liquidity: bool,
}

/// Price one hop: value the input at the in-token min quote, charge the
/// swap fee (factor picked by the raw impact sign), apply the capped pool
/// impact, and settle the output at the out-token max quote.
///
/// Fees or negative impact exceeding the input clamp the output to zero
/// rather than erroring.
pub fn get_swap_stats(
    snapshot: &MarketsSnapshot,
    market: &MarketInfo,
    token_in: AssetId,
    usd_in: Usd,
) -> Result<SwapStats, EngineError> {
    let token_out = market.opposite_token(token_in)?;

    let price_in = snapshot.token_prices(token_in)?.min;
    let price_out = snapshot.token_prices(token_out)?.max;
    if price_in.is_zero() {
        return Err(EngineError::InvalidPrice(token_in));
    }
    if price_out.is_zero() {
        return Err(EngineError::InvalidPrice(token_out));
    }

    let amount_in = div_round(usd_in, price_in, Rounding::Down)?;

    // 1) pool-rebalance impact of moving usd_in across the sides.
    //    Draining the out side past zero surfaces as underflow here; that
    //    marks the hop unusable instead of failing the whole search.
    let (price_impact_delta_usd, balance_was_improved) =
        match swap_price_impact_usd(snapshot, market, token_in, token_out, usd_in) {
            Ok(v) => v,
            Err(EngineError::Underflow(_)) => {
                return Ok(SwapStats {
                    market: market.id,
                    token_in,
                    token_out,
                    usd_in,
                    amount_in,
                    swap_fee_usd: U256::zero(),
                    swap_fee_amount: U256::zero(),
                    price_impact_delta_usd: SignedU256::zero(),
                    usd_out: U256::zero(),
                    amount_out: U256::zero(),
                    is_out_liquidity: true,
                });
            }
            Err(e) => return Err(e),
        };

    // 2) fee, factor picked by the raw impact sign
    let fee_factor = swap_fee_factor(&market.fees, balance_was_improved);
    let swap_fee_usd = apply_factor(usd_in, fee_factor)?;
    let swap_fee_amount = apply_factor(amount_in, fee_factor)?;
    let usd_in_after_fees = usd_in.saturating_sub(swap_fee_usd);

    // 3) output, floored at zero when the impact eats the rest
    let usd_out = apply_signed_add_floor_zero(usd_in_after_fees, price_impact_delta_usd);
    let amount_out = div_round(usd_out, price_out, Rounding::Down)?;

    // 4) the out side must actually hold that much
    let available_out_usd = snapshot.available_liquidity_usd(market, token_out)?;
    let is_out_liquidity = usd_out > available_out_usd;

    Ok(SwapStats {
        market: market.id,
        token_in,
        token_out,
        usd_in,
        amount_in,
        swap_fee_usd,
        swap_fee_amount,
        price_impact_delta_usd,
        usd_out,
        amount_out,
        is_out_liquidity,
    })
}

/// Route estimator bound to one markets snapshot.
///
/// Estimates never fail: a hop that errors, hits a disabled market or
/// exhausts the out side simply estimates to zero, so candidate routes
/// compete on output alone.
pub struct SwapEstimator<'a> {
    snapshot: &'a MarketsSnapshot,
}

impl<'a> SwapEstimator<'a> {
    pub fn new(snapshot: &'a MarketsSnapshot) -> Self {
        Self { snapshot }
    }

    /// USD received for pushing `usd_in` through one edge.
    pub fn estimate_edge(&self, edge: &MarketEdge, usd_in: Usd) -> Usd {
        let market = match self.snapshot.market(edge.market) {
            Ok(m) if !m.is_disabled => m,
            _ => return U256::zero(),
        };
        match get_swap_stats(self.snapshot, market, edge.from, usd_in) {
            Ok(stats) if !stats.is_out_liquidity => stats.usd_out,
            _ => U256::zero(),
        }
    }

    /// Fold `usd_in` through the route: hop k feeds on hop k-1's output.
    pub fn estimate_route(&self, route: &SwapRoute, usd_in: Usd) -> Usd {
        route
            .edges
            .iter()
            .fold(usd_in, |usd, edge| self.estimate_edge(edge, usd))
    }
}

/// Pick the route with the highest simulated output.
///
/// Strictly greater output replaces the best, so ties keep the
/// first-found route. `None` when no route yields a positive output.
pub fn get_best_swap_path(
    routes: &[SwapRoute],
    usd_in: Usd,
    estimator: &SwapEstimator<'_>,
) -> Option<Vec<MarketId>> {
    let mut best_route: Option<&SwapRoute> = None;
    let mut best_usd_out = U256::zero();

    for route in routes {
        let usd_out = estimator.estimate_route(route, usd_in);
        if usd_out > best_usd_out {
            best_usd_out = usd_out;
            best_route = Some(route);
        }
    }

    best_route.map(|route| {
        debug!(
            "best swap path {:?}: {} usd in, {} usd out",
            route.path,
            usd_in / usd_one(),
            best_usd_out / usd_one()
        );
        route.path.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{ImpactCfg, MarketFeesCfg};
    use crate::types::{TokenData, TokenPrices};

    fn usd(x: u64) -> U256 {
        U256::from(x) * usd_one()
    }

    fn token(id: u32) -> TokenData {
        TokenData::new(
            AssetId(id),
            18,
            TokenPrices {
                min: usd_one(),
                max: usd_one(),
            },
        )
    }

    fn market(id: u32, long: u32, short: u32, pool_long: u64, pool_short: u64) -> MarketInfo {
        MarketInfo {
            id: MarketId(id),
            index_token: AssetId(long),
            long_token: AssetId(long),
            short_token: AssetId(short),
            pool_amount_long: U256::from(pool_long),
            pool_amount_short: U256::from(pool_short),
            oi_long_usd: U256::zero(),
            oi_short_usd: U256::zero(),
            is_disabled: false,
            is_spot_only: false,
            fees: MarketFeesCfg::default_bps(),
            impact: ImpactCfg::default_quadratic(),
        }
    }

    fn snapshot(markets: Vec<MarketInfo>, token_ids: &[u32]) -> MarketsSnapshot {
        MarketsSnapshot {
            markets: markets.into_iter().map(|m| (m.id, m)).collect(),
            tokens: token_ids.iter().map(|&id| (AssetId(id), token(id))).collect(),
        }
    }

    fn edge(market: u32, from: u32, to: u32) -> MarketEdge {
        MarketEdge {
            market: MarketId(market),
            from: AssetId(from),
            to: AssetId(to),
        }
    }

    fn route(edges: Vec<MarketEdge>) -> SwapRoute {
        SwapRoute {
            path: edges.iter().map(|e| e.market).collect(),
            edges,
            liquidity: U256::zero(),
        }
    }

    #[test]
    fn harmful_hop_charges_the_negative_factor_and_capped_impact() {
        // Balanced 1M/1M pool; pushing 100k across it creates a 200k gap.
        // Raw impact is far past the cap, so: fee 7 bps = 70 usd, impact
        // capped at 0.5% of usd_in = 500 usd.
        let snap = snapshot(vec![market(1, 1, 2, 1_000_000, 1_000_000)], &[1, 2]);
        let m = snap.market(MarketId(1)).unwrap();

        let stats = get_swap_stats(&snap, m, AssetId(1), usd(100_000)).unwrap();
        assert_eq!(stats.swap_fee_usd, usd(70));
        assert_eq!(stats.price_impact_delta_usd, SignedU256::neg(usd(500)));
        assert_eq!(stats.usd_out, usd(99_430));
        assert_eq!(stats.amount_out, U256::from(99_430u64));
        assert!(!stats.is_out_liquidity);
    }

    #[test]
    fn helpful_hop_gets_the_reduced_fee_and_a_positive_credit() {
        // Pool 0.9M/1.1M; 100k from the long side closes the gap exactly:
        // fee 5 bps = 50 usd, positive impact capped at 500 usd.
        let snap = snapshot(vec![market(1, 1, 2, 900_000, 1_100_000)], &[1, 2]);
        let m = snap.market(MarketId(1)).unwrap();

        let stats = get_swap_stats(&snap, m, AssetId(1), usd(100_000)).unwrap();
        assert_eq!(stats.swap_fee_usd, usd(50));
        assert_eq!(stats.price_impact_delta_usd, SignedU256::pos(usd(500)));
        assert_eq!(stats.usd_out, usd(100_450));
    }

    #[test]
    fn draining_the_out_side_sets_the_liquidity_flag() {
        // The hop asks for twice what the short side holds.
        let snap = snapshot(vec![market(1, 1, 2, 1_000_000, 50_000)], &[1, 2]);
        let m = snap.market(MarketId(1)).unwrap();

        let stats = get_swap_stats(&snap, m, AssetId(1), usd(100_000)).unwrap();
        assert!(stats.is_out_liquidity);
        assert_eq!(stats.usd_out, U256::zero());
        assert_eq!(stats.amount_out, U256::zero());

        // The estimator then refuses to route through it.
        let estimator = SwapEstimator::new(&snap);
        assert_eq!(
            estimator.estimate_edge(&edge(1, 1, 2), usd(100_000)),
            U256::zero()
        );
    }

    #[test]
    fn best_path_prefers_one_hop_over_two() {
        // Direct route pays one fee + one impact cap; the detour pays both
        // twice and must lose.
        let snap = snapshot(
            vec![
                market(1, 1, 2, 1_000_000, 1_000_000),
                market(2, 2, 3, 1_000_000, 1_000_000),
                market(3, 1, 3, 1_000_000, 1_000_000),
            ],
            &[1, 2, 3],
        );
        let estimator = SwapEstimator::new(&snap);

        let detour = route(vec![edge(1, 1, 2), edge(2, 2, 3)]);
        let direct = route(vec![edge(3, 1, 3)]);
        let best = get_best_swap_path(
            &[detour, direct],
            usd(100_000),
            &estimator,
        );
        assert_eq!(best, Some(vec![MarketId(3)]));
    }

    #[test]
    fn equal_outputs_keep_the_first_route() {
        let snap = snapshot(
            vec![
                market(1, 1, 2, 1_000_000, 1_000_000),
                market(2, 1, 2, 1_000_000, 1_000_000),
            ],
            &[1, 2],
        );
        let estimator = SwapEstimator::new(&snap);

        let first = route(vec![edge(1, 1, 2)]);
        let second = route(vec![edge(2, 1, 2)]);
        let best = get_best_swap_path(&[first, second], usd(10_000), &estimator);
        assert_eq!(best, Some(vec![MarketId(1)]));
    }

    #[test]
    fn no_positive_output_is_none() {
        // Out side too shallow: every candidate estimates to zero.
        let snap = snapshot(vec![market(1, 1, 2, 1_000_000, 10)], &[1, 2]);
        let estimator = SwapEstimator::new(&snap);

        let only = route(vec![edge(1, 1, 2)]);
        assert_eq!(
            get_best_swap_path(&[only], usd(100_000), &estimator),
            None
        );
        assert_eq!(get_best_swap_path(&[], usd(100_000), &estimator), None);
    }
}
