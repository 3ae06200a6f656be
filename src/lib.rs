//! Off-chain trade sizing and swap routing for a pool-based perpetual
//! exchange.
//!
//! Pure arithmetic over an immutable market snapshot: build a
//! [`graph::MarketsGraph`], enumerate candidate swap routes, pick the best
//! path by simulated output, and solve swap / increase / decrease orders
//! into exact amounts. USD is 1e30 fixed point, token amounts are native
//! atoms priced per atom, dimensionless factors are 1e18 fixed point;
//! every division carries an explicit rounding direction so results stay
//! bit-identical to the on-chain accounting.

pub mod error;
pub mod graph;
pub mod market;
pub mod math;
pub mod position;
pub mod pricing;
pub mod routing;
pub mod trade;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use graph::{GraphConfig, MarketsGraph};
pub use market::{MarketInfo, MarketsSnapshot};
pub use position::Position;
pub use routing::router::{FindSwapPathOpts, SwapPathResolver, SwapRouter};
pub use types::{AssetId, MarketId, Side, SignedU256, TokenData, TokenPrices, TradeDirection};

#[cfg(test)]
mod trade_tests {
    mod helpers;

    mod decrease;
    mod increase;
    mod properties;
    mod swap;
}
