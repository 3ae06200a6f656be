// src/routing/path_finder.rs
use std::collections::{BTreeSet, HashSet};

use primitive_types::U256;

use crate::graph::{MarketEdge, MarketsGraph};
use crate::market::MarketsSnapshot;
use crate::types::{AssetId, MarketId, Usd};

pub const DEFAULT_MAX_SWAP_DEPTH: usize = 3;

/// One candidate swap path. Carries no amounts; the estimator prices it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapRoute {
    pub path: Vec<MarketId>,
    pub edges: Vec<MarketEdge>,
    /// Worst per-hop USD liquidity bound along the route: the minimum of
    /// each hop's outgoing-side pool value.
    pub liquidity: Usd,
}

/// All simple paths from `from` to `to` within `max_depth` hops, in
/// discovery order.
///
/// Returns `None` when the source has no outgoing edges at all; an
/// unreachable destination yields `Some` of an empty list. A market is
/// visited at most once per path, in either direction.
pub fn find_swap_routes(
    snapshot: &MarketsSnapshot,
    graph: &MarketsGraph,
    from: AssetId,
    to: AssetId,
    max_depth: Option<usize>,
) -> Option<Vec<SwapRoute>> {
    if graph.edges_from(from).is_empty() {
        return None;
    }
    let max_depth = max_depth.unwrap_or(DEFAULT_MAX_SWAP_DEPTH);

    let mut routes = Vec::new();
    let mut visited: HashSet<MarketId> = HashSet::new();
    let mut current_edges: Vec<MarketEdge> = Vec::new();
    dfs_routes(
        snapshot,
        graph,
        from,
        to,
        max_depth,
        &mut visited,
        &mut current_edges,
        &mut routes,
    );
    Some(routes)
}

fn dfs_routes(
    snapshot: &MarketsSnapshot,
    graph: &MarketsGraph,
    current: AssetId,
    target: AssetId,
    max_depth: usize,
    visited: &mut HashSet<MarketId>,
    current_edges: &mut Vec<MarketEdge>,
    routes: &mut Vec<SwapRoute>,
) {
    if current == target && !current_edges.is_empty() {
        routes.push(complete_route(snapshot, current_edges));
        return;
    }
    if current_edges.len() >= max_depth {
        return;
    }

    for edge in graph.edges_from(current) {
        if visited.contains(&edge.market) {
            continue;
        }
        visited.insert(edge.market);
        current_edges.push(*edge);
        dfs_routes(
            snapshot,
            graph,
            edge.to,
            target,
            max_depth,
            visited,
            current_edges,
            routes,
        );
        current_edges.pop();
        visited.remove(&edge.market);
    }
}

fn complete_route(snapshot: &MarketsSnapshot, edges: &[MarketEdge]) -> SwapRoute {
    let mut liquidity = U256::MAX;
    for edge in edges {
        let hop_liquidity = snapshot
            .market(edge.market)
            .map(|m| snapshot.liquidity_usd_or_zero(m, edge.to))
            .unwrap_or_else(|_| U256::zero());
        liquidity = liquidity.min(hop_liquidity);
    }
    SwapRoute {
        path: edges.iter().map(|e| e.market).collect(),
        edges: edges.to_vec(),
        liquidity,
    }
}

/// Every token swappable from `from` within `max_depth` hops, ascending.
///
/// Used to filter token pickers down to what routing can actually serve.
pub fn find_all_reachable_tokens(
    graph: &MarketsGraph,
    from: AssetId,
    max_depth: usize,
) -> Vec<AssetId> {
    let mut seen: BTreeSet<AssetId> = BTreeSet::new();
    let mut frontier = vec![from];

    for _ in 0..max_depth {
        let mut next = Vec::new();
        for token in frontier {
            for edge in graph.edges_from(token) {
                if edge.to != from && seen.insert(edge.to) {
                    next.push(edge.to);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    seen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphConfig;
    use crate::market::{ImpactCfg, MarketFeesCfg, MarketInfo};
    use crate::math::usd_one;
    use crate::types::{TokenData, TokenPrices};

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

    /// 1 -(m1)- 2 -(m2)- 3, plus a direct 1 -(m3)- 3 and a spur 3 -(m4)- 4.
    fn test_snapshot() -> MarketsSnapshot {
        let markets = vec![
            market(1, 1, 2, 1000, 200),
            market(2, 2, 3, 100, 150),
            market(3, 1, 3, 900, 500),
            market(4, 3, 4, 50, 60),
        ];
        MarketsSnapshot {
            markets: markets.into_iter().map(|m| (m.id, m)).collect(),
            tokens: [1u32, 2, 3, 4]
                .iter()
                .map(|&id| (AssetId(id), token(id)))
                .collect(),
        }
    }

    fn paths_of(routes: &[SwapRoute]) -> Vec<Vec<MarketId>> {
        routes.iter().map(|r| r.path.clone()).collect()
    }

    #[test]
    fn finds_direct_and_multi_hop_routes_in_discovery_order() {
        let snap = test_snapshot();
        let graph = MarketsGraph::build(&snap, &GraphConfig::default());

        let routes = find_swap_routes(&snap, &graph, AssetId(1), AssetId(3), None).unwrap();
        assert_eq!(
            paths_of(&routes),
            vec![
                vec![MarketId(1), MarketId(2)],
                vec![MarketId(3)],
            ]
        );
    }

    #[test]
    fn max_depth_one_keeps_only_the_direct_hop() {
        let snap = test_snapshot();
        let graph = MarketsGraph::build(&snap, &GraphConfig::default());

        let routes = find_swap_routes(&snap, &graph, AssetId(1), AssetId(3), Some(1)).unwrap();
        assert_eq!(paths_of(&routes), vec![vec![MarketId(3)]]);
    }

    #[test]
    fn route_liquidity_is_the_worst_hop() {
        let snap = test_snapshot();
        let graph = MarketsGraph::build(&snap, &GraphConfig::default());

        let routes = find_swap_routes(&snap, &graph, AssetId(1), AssetId(3), None).unwrap();
        // 1->2 leaves 200 usd on the out side, 2->3 leaves 150 usd.
        assert_eq!(routes[0].liquidity, usd_one() * 150);
        // direct hop: 500 usd of token 3
        assert_eq!(routes[1].liquidity, usd_one() * 500);
    }

    #[test]
    fn source_without_edges_is_none() {
        let snap = test_snapshot();
        let graph = MarketsGraph::build(&snap, &GraphConfig::default());
        assert!(find_swap_routes(&snap, &graph, AssetId(99), AssetId(3), None).is_none());
    }

    #[test]
    fn unreachable_destination_is_an_empty_list() {
        let snap = test_snapshot();
        let graph = MarketsGraph::build(&snap, &GraphConfig::default());
        let routes = find_swap_routes(&snap, &graph, AssetId(1), AssetId(99), None).unwrap();
        assert!(routes.is_empty());
    }

    #[test]
    fn reachable_tokens_respect_the_depth_bound() {
        let snap = test_snapshot();
        let graph = MarketsGraph::build(&snap, &GraphConfig::default());

        assert_eq!(
            find_all_reachable_tokens(&graph, AssetId(1), 1),
            vec![AssetId(2), AssetId(3)]
        );
        assert_eq!(
            find_all_reachable_tokens(&graph, AssetId(1), 2),
            vec![AssetId(2), AssetId(3), AssetId(4)]
        );
    }
}
