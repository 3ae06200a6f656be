// src/routing/router.rs
use log::debug;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::graph::MarketsGraph;
use crate::market::MarketsSnapshot;
use crate::math::{signed_add, signed_sub};
use crate::routing::estimator::{get_best_swap_path, get_swap_stats, SwapEstimator, SwapStats};
use crate::routing::path_finder::{find_swap_routes, SwapRoute};
use crate::types::{AssetId, MarketId, SignedU256, TokenAmount, Usd};

/// Per-hop stats plus route totals for one resolved swap path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapPathStats {
    pub swap_steps: Vec<SwapStats>,
    pub swap_path: Vec<MarketId>,

    pub token_in: AssetId,
    pub token_out: AssetId,

    pub total_swap_fee_usd: Usd,
    pub total_swap_price_impact_delta_usd: SignedU256,
    /// Impact minus fees: the net cost sign of the whole route.
    pub total_fees_delta_usd: SignedU256,

    pub usd_out: Usd,
    pub amount_out: TokenAmount,
}

impl SwapPathStats {
    /// Total USD volume pushed through the route: the sum of per-hop
    /// inputs. Volume-based fees (UI fee) are priced on this.
    pub fn total_swap_volume_usd(&self) -> Usd {
        self.swap_steps
            .iter()
            .fold(U256::zero(), |acc, step| acc.saturating_add(step.usd_in))
    }
}

/// How the router picks among candidate paths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FindSwapPathOpts {
    /// Rank by annotated route liquidity instead of simulated output.
    /// Used for orders that execute later at unknown state.
    pub by_liquidity: bool,
    /// Hop bound override for the route search.
    pub max_depth: Option<usize>,
}

/// Fold `usd_in` through a concrete market path, hop feeding hop.
///
/// An empty path resolves to `None`. A hop takes the previous hop's
/// `usd_out` and the previous hop's out token as its input.
pub fn get_swap_path_stats(
    snapshot: &MarketsSnapshot,
    path: &[MarketId],
    token_in: AssetId,
    usd_in: Usd,
) -> Result<Option<SwapPathStats>, EngineError> {
    if path.is_empty() {
        return Ok(None);
    }

    let mut swap_steps: Vec<SwapStats> = Vec::with_capacity(path.len());
    let mut current_token = token_in;
    let mut usd_out = usd_in;
    let mut total_swap_fee_usd = U256::zero();
    let mut total_impact = SignedU256::zero();

    for market_id in path {
        let market = snapshot.market(*market_id)?;
        let step = get_swap_stats(snapshot, market, current_token, usd_out)?;

        current_token = step.token_out;
        usd_out = step.usd_out;
        total_swap_fee_usd = total_swap_fee_usd.saturating_add(step.swap_fee_usd);
        total_impact = signed_add(total_impact, step.price_impact_delta_usd);
        swap_steps.push(step);
    }

    let last = match swap_steps.last() {
        Some(s) => s,
        None => return Ok(None),
    };

    Ok(Some(SwapPathStats {
        token_in,
        token_out: last.token_out,
        usd_out: last.usd_out,
        amount_out: last.amount_out,
        total_fees_delta_usd: signed_sub(total_impact, SignedU256::pos(total_swap_fee_usd)),
        total_swap_fee_usd,
        total_swap_price_impact_delta_usd: total_impact,
        swap_path: path.to_vec(),
        swap_steps,
    }))
}

/// The capability trade calculators need from routing: given a USD size,
/// produce the priced path or nothing.
///
/// Calculators stay ignorant of graphs and candidate search; tests plug
/// in fixed-path stubs.
pub trait SwapPathResolver {
    fn find_swap_path(&self, usd_in: Usd, opts: &FindSwapPathOpts) -> Option<SwapPathStats>;
}

/// Graph-backed resolver for one (token_in, token_out) pair.
pub struct SwapRouter<'a> {
    snapshot: &'a MarketsSnapshot,
    graph: &'a MarketsGraph,
    token_in: AssetId,
    token_out: AssetId,
}

impl<'a> SwapRouter<'a> {
    pub fn new(
        snapshot: &'a MarketsSnapshot,
        graph: &'a MarketsGraph,
        token_in: AssetId,
        token_out: AssetId,
    ) -> Self {
        Self {
            snapshot,
            graph,
            token_in,
            token_out,
        }
    }

    /// Most liquid route wins; ties keep the first-found.
    fn best_route_by_liquidity(routes: &[SwapRoute]) -> Option<&SwapRoute> {
        let mut best: Option<&SwapRoute> = None;
        for route in routes {
            let better = match best {
                Some(b) => route.liquidity > b.liquidity,
                None => true,
            };
            if better {
                best = Some(route);
            }
        }
        best
    }

    fn resolve(&self, usd_in: Usd, opts: &FindSwapPathOpts) -> Option<SwapPathStats> {
        let routes = find_swap_routes(
            self.snapshot,
            self.graph,
            self.token_in,
            self.token_out,
            opts.max_depth,
        )?;

        let path = if opts.by_liquidity {
            Self::best_route_by_liquidity(&routes).map(|r| r.path.clone())?
        } else {
            let estimator = SwapEstimator::new(self.snapshot);
            get_best_swap_path(&routes, usd_in, &estimator)?
        };

        match get_swap_path_stats(self.snapshot, &path, self.token_in, usd_in) {
            Ok(stats) => stats,
            Err(err) => {
                debug!("swap path {:?} dropped: {}", path, err);
                None
            }
        }
    }
}

impl SwapPathResolver for SwapRouter<'_> {
    fn find_swap_path(&self, usd_in: Usd, opts: &FindSwapPathOpts) -> Option<SwapPathStats> {
        self.resolve(usd_in, opts)
    }
}
