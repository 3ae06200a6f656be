// src/graph.rs
use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::market::MarketsSnapshot;
use crate::types::{AssetId, MarketId};

/// One tradable direction through a market: `from` collateral in,
/// `to` collateral out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketEdge {
    pub market: MarketId,
    pub from: AssetId,
    pub to: AssetId,
}

pub const DEFAULT_MAX_MARKETS_PER_TOKEN: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Per token, only the N deepest markets contribute outgoing edges.
    pub max_markets_per_token: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_markets_per_token: DEFAULT_MAX_MARKETS_PER_TOKEN,
        }
    }
}

/// Swap-routing view of a markets snapshot.
///
/// Built once per snapshot and immutable afterwards; searches never touch
/// market state directly.
#[derive(Clone, Debug, Default)]
pub struct MarketsGraph {
    /// token -> edges leaving it, deepest market first.
    adjacency: HashMap<AssetId, Vec<MarketEdge>>,
    edges: Vec<MarketEdge>,
}

impl MarketsGraph {
    /// Build the graph from every enabled two-token market.
    ///
    /// Per token, candidate markets rank by available USD liquidity on the
    /// token's own side (descending), ties by ascending market id so a
    /// rebuild of the same snapshot yields the same graph. A token priced
    /// by no oracle ranks last instead of failing the build. Pruning is
    /// per token: a market cut on one side can still contribute the
    /// opposite direction.
    pub fn build(snapshot: &MarketsSnapshot, cfg: &GraphConfig) -> Self {
        let mut tokens: Vec<AssetId> = Vec::new();
        for market in snapshot.markets.values() {
            if market.is_disabled || market.is_same_collaterals() {
                continue;
            }
            tokens.push(market.long_token);
            tokens.push(market.short_token);
        }
        tokens.sort();
        tokens.dedup();

        let mut adjacency: HashMap<AssetId, Vec<MarketEdge>> = HashMap::new();
        let mut edges: Vec<MarketEdge> = Vec::new();

        for token in tokens {
            let mut candidates: Vec<(MarketId, crate::types::Usd)> = snapshot
                .markets
                .values()
                .filter(|m| !m.is_disabled && !m.is_same_collaterals() && m.has_token(token))
                .map(|m| (m.id, snapshot.liquidity_usd_or_zero(m, token)))
                .collect();

            candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            candidates.truncate(cfg.max_markets_per_token);

            let outgoing: Vec<MarketEdge> = candidates
                .into_iter()
                .filter_map(|(id, _)| {
                    let market = snapshot.markets.get(&id)?;
                    let to = market.opposite_token(token).ok()?;
                    Some(MarketEdge {
                        market: id,
                        from: token,
                        to,
                    })
                })
                .collect();

            if outgoing.is_empty() {
                continue;
            }
            edges.extend_from_slice(&outgoing);
            adjacency.insert(token, outgoing);
        }

        debug!(
            "market graph built: {} tokens, {} edges",
            adjacency.len(),
            edges.len()
        );

        Self { adjacency, edges }
    }

    /// Edges leaving `token`; a token with no eligible markets has none.
    pub fn edges_from(&self, token: AssetId) -> &[MarketEdge] {
        self.adjacency.get(&token).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_edges(&self) -> &[MarketEdge] {
        &self.edges
    }

    pub fn token_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
