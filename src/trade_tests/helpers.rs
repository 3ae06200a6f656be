use crate::graph::{GraphConfig, MarketsGraph};
use crate::market::{ImpactCfg, MarketFeesCfg, MarketInfo, MarketsSnapshot};
use crate::routing::router::SwapRouter;
use crate::types::{AssetId, MarketId, TokenData, TokenPrices};

use primitive_types::{U256, U512};

#[allow(dead_code)]
pub fn usd(x: u128) -> U256 {
    U256::from(x) * U256::exp10(30) // USD(1e30)
}

#[allow(dead_code)]
pub fn to_atoms(tokens: u128, decimals: u8) -> U256 {
    U256::from(tokens) * U256::exp10(decimals as usize)
}

#[allow(dead_code)]
pub fn div_ceil_u256(a: U256, b: U256) -> U256 {
    let q = a / b;
    let r = a % b;
    if r.is_zero() {
        q
    } else {
        q + 1
    }
}

/// Normalize USD(1e30) per 1 whole token -> USD(1e30) per 1 atom (10^-decimals).
/// - min: floor
/// - max: ceil (conservative)
#[allow(dead_code)]
pub fn normalize_price_per_atom(
    price_min_per_token: U256,
    price_max_per_token: U256,
    decimals: u8,
) -> (U256, U256) {
    let scale = U256::exp10(decimals as usize);
    let min_atom = price_min_per_token / scale; // floor
    let max_atom = div_ceil_u256(price_max_per_token, scale); // ceil
    (min_atom, max_atom)
}

/// Token priced at a whole-token USD quote, min == max.
#[allow(dead_code)]
pub fn priced_token(id: u32, decimals: u8, usd_per_token: u128) -> TokenData {
    let (min, max) = normalize_price_per_atom(usd(usd_per_token), usd(usd_per_token), decimals);
    TokenData::new(AssetId(id), decimals, TokenPrices { min, max })
}

/// Market with the default fee schedule and quadratic impact curve.
#[allow(dead_code)]
pub fn default_market(
    id: u32,
    index: u32,
    long: u32,
    short: u32,
    pool_long_atoms: U256,
    pool_short_atoms: U256,
) -> MarketInfo {
    MarketInfo {
        id: MarketId(id),
        index_token: AssetId(index),
        long_token: AssetId(long),
        short_token: AssetId(short),
        pool_amount_long: pool_long_atoms,
        pool_amount_short: pool_short_atoms,
        oi_long_usd: U256::zero(),
        oi_short_usd: U256::zero(),
        is_disabled: false,
        is_spot_only: false,
        fees: MarketFeesCfg::default_bps(),
        impact: ImpactCfg::default_quadratic(),
    }
}

/// Common test environment: snapshot + graph + ids + decimals.
///
/// Three tokens, three markets:
/// - ETH(11, 18dp) at a configurable whole-token price
/// - USDC(10, 6dp) and DAI(12, 6dp) at $1
/// - market 1: ETH/USDC perp, market 2: ETH/DAI perp, both 15M USD
///   per pool side
/// - market 3: USDC/DAI stable pool, spot-only, 5M per side, so
///   liquidity-ranked routing prefers the two-hop perp route while
///   simulated-output routing prefers the direct one.
pub struct TestEnv {
    pub snapshot: MarketsSnapshot,
    pub graph: MarketsGraph,

    pub eth: AssetId,
    pub usdc: AssetId,
    pub dai: AssetId,

    pub eth_decimals: u8,
    pub usdc_decimals: u8,
    pub dai_decimals: u8,

    pub market_eth_usdc: MarketId,
    pub market_eth_dai: MarketId,
    pub market_stable: MarketId,
}

impl TestEnv {
    #[allow(dead_code)]
    pub fn token(&self, id: AssetId) -> &TokenData {
        self.snapshot.tokens.get(&id).expect("token seeded in env")
    }

    #[allow(dead_code)]
    pub fn market(&self, id: MarketId) -> &MarketInfo {
        self.snapshot.markets.get(&id).expect("market seeded in env")
    }

    #[allow(dead_code)]
    pub fn market_mut(&mut self, id: MarketId) -> &mut MarketInfo {
        self.snapshot
            .markets
            .get_mut(&id)
            .expect("market seeded in env")
    }

    /// Routing capability for one pair, backed by the env's graph.
    #[allow(dead_code)]
    pub fn router(&self, token_in: AssetId, token_out: AssetId) -> SwapRouter<'_> {
        SwapRouter::new(&self.snapshot, &self.graph, token_in, token_out)
    }

    /// Rebuild the graph after mutating markets.
    #[allow(dead_code)]
    pub fn rebuild_graph(&mut self) {
        self.graph = MarketsGraph::build(&self.snapshot, &GraphConfig::default());
    }
}

/// Fully seeded environment. `eth_usd_per_token` is a whole-token price,
/// e.g. 2000 for ETH=$2000.
#[allow(dead_code)]
pub fn setup_env(eth_usd_per_token: u128) -> TestEnv {
    let eth = AssetId(11);
    let usdc = AssetId(10);
    let dai = AssetId(12);

    let eth_decimals: u8 = 18;
    let usdc_decimals: u8 = 6;
    let dai_decimals: u8 = 6;

    let tokens = vec![
        priced_token(11, eth_decimals, eth_usd_per_token),
        priced_token(10, usdc_decimals, 1),
        priced_token(12, dai_decimals, 1),
    ];

    // Perp pools hold 15M USD per side, the stable pool 5M.
    let eth_pool = to_atoms(15_000_000 / eth_usd_per_token, eth_decimals);
    let perp_stable_pool = to_atoms(15_000_000, usdc_decimals);
    let stable_pool = to_atoms(5_000_000, usdc_decimals);

    let mut market_stable = default_market(3, 10, 10, 12, stable_pool, stable_pool);
    market_stable.is_spot_only = true;

    let markets = vec![
        default_market(1, 11, 11, 10, eth_pool, perp_stable_pool),
        default_market(2, 11, 11, 12, eth_pool, perp_stable_pool),
        market_stable,
    ];

    let snapshot = MarketsSnapshot {
        markets: markets.into_iter().map(|m| (m.id, m)).collect(),
        tokens: tokens.into_iter().map(|t| (t.id, t)).collect(),
    };
    let graph = MarketsGraph::build(&snapshot, &GraphConfig::default());

    TestEnv {
        snapshot,
        graph,
        eth,
        usdc,
        dai,
        eth_decimals,
        usdc_decimals,
        dai_decimals,
        market_eth_usdc: MarketId(1),
        market_eth_dai: MarketId(2),
        market_stable: MarketId(3),
    }
}

#[allow(dead_code)]
pub fn mul_div_u256(a: U256, b: U256, den: U256) -> Result<U256, String> {
    if den.is_zero() {
        return Err("mul_div_den_zero".into());
    }
    let prod = U512::from(a) * U512::from(b);
    let q = prod / U512::from(den);
    u512_to_u256_checked(q)
}

#[allow(dead_code)]
pub fn mul_div_ceil_u256(a: U256, b: U256, den: U256) -> Result<U256, String> {
    if den.is_zero() {
        return Err("mul_div_den_zero".into());
    }
    let prod = U512::from(a) * U512::from(b);
    let mut q = prod / U512::from(den);
    if prod % U512::from(den) != U512::zero() {
        q += U512::from(1u8);
    }
    u512_to_u256_checked(q)
}

fn u512_to_u256_checked(x: U512) -> Result<U256, String> {
    let be = x.to_big_endian();

    if be[..32].iter().any(|&b| b != 0) {
        return Err("mul_div_overflow".into());
    }

    Ok(U256::from_big_endian(&be[32..]))
}

#[allow(dead_code)]
pub fn u256_abs_diff(a: U256, b: U256) -> U256 {
    if a >= b {
        a - b
    } else {
        b - a
    }
}
