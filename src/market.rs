// src/market.rs
use std::collections::HashMap;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::math::float_one;
use crate::types::{AssetId, MarketId, TokenAmount, TokenData, TokenPrices, Usd};

/// Swap and position fee factors, 1e18 fixed point.
///
/// The positive factor applies when a trade improves market balance
/// (positive price impact), the negative one when it worsens it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketFeesCfg {
    pub swap_fee_factor_positive: U256,
    pub swap_fee_factor_negative: U256,
    pub position_fee_factor_positive: U256,
    pub position_fee_factor_negative: U256,
}

impl MarketFeesCfg {
    /// 5 bps / 7 bps swap, 5 bps / 7 bps position.
    pub fn default_bps() -> Self {
        let one = float_one();
        Self {
            swap_fee_factor_positive: one * 5 / 10_000,
            swap_fee_factor_negative: one * 7 / 10_000,
            position_fee_factor_positive: one * 5 / 10_000,
            position_fee_factor_negative: one * 7 / 10_000,
        }
    }
}

/// Price-impact curve parameters, factors in 1e18 fixed point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpactCfg {
    /// Exponent "e" in d^e for position trades (e.g. 1, 2, 3).
    pub position_impact_exponent: u32,
    pub position_impact_factor_positive: U256,
    pub position_impact_factor_negative: U256,

    /// Exponent for pool-balance (swap) trades.
    pub swap_impact_exponent: u32,
    pub swap_impact_factor_positive: U256,
    pub swap_impact_factor_negative: U256,

    /// Positive position impact is capped at this fraction of trade size.
    pub max_position_impact_factor_positive: U256,
    /// On decreases, negative impact beyond this fraction is clipped and
    /// reported separately.
    pub max_position_impact_factor_negative: U256,
    /// Swap impact is capped at this fraction of the hop's USD-in, both signs.
    pub max_swap_impact_factor: U256,
}

impl ImpactCfg {
    /// Quadratic profile: harmful trades ~4x stronger than helpful ones,
    /// impact capped at 0.5% of trade size.
    pub fn default_quadratic() -> Self {
        let one = float_one();
        Self {
            position_impact_exponent: 2,
            position_impact_factor_positive: one / 1_000_000,
            position_impact_factor_negative: one * 4 / 1_000_000,
            swap_impact_exponent: 2,
            swap_impact_factor_positive: one / 1_000_000,
            swap_impact_factor_negative: one * 4 / 1_000_000,
            max_position_impact_factor_positive: one * 5 / 1_000,
            max_position_impact_factor_negative: one * 5 / 1_000,
            max_swap_impact_factor: one * 5 / 1_000,
        }
    }
}

/// One market: a pool of long and short collateral backing an index token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub id: MarketId,

    /// Index token for this market (e.g. ETH, BTC).
    pub index_token: AssetId,
    pub long_token: AssetId,
    pub short_token: AssetId,

    /// Pool collateral per side, in atoms of the side's token.
    pub pool_amount_long: TokenAmount,
    pub pool_amount_short: TokenAmount,

    /// Open interest in USD for longs / shorts.
    pub oi_long_usd: Usd,
    pub oi_short_usd: Usd,

    pub is_disabled: bool,
    /// Spot-only markets carry swaps but host no positions.
    pub is_spot_only: bool,

    pub fees: MarketFeesCfg,
    pub impact: ImpactCfg,
}

impl MarketInfo {
    /// A same-collateral market cannot swap a token into itself and is
    /// excluded from the graph entirely.
    pub fn is_same_collaterals(&self) -> bool {
        self.long_token == self.short_token
    }

    pub fn has_token(&self, token: AssetId) -> bool {
        self.long_token == token || self.short_token == token
    }

    /// The other collateral token of the pair.
    pub fn opposite_token(&self, token: AssetId) -> Result<AssetId, EngineError> {
        if token == self.long_token {
            Ok(self.short_token)
        } else if token == self.short_token {
            Ok(self.long_token)
        } else {
            Err(EngineError::InvalidMarket("token_not_in_market"))
        }
    }

    /// Pool amount on the side holding `token`.
    pub fn pool_amount(&self, token: AssetId) -> Result<TokenAmount, EngineError> {
        if token == self.long_token {
            Ok(self.pool_amount_long)
        } else if token == self.short_token {
            Ok(self.pool_amount_short)
        } else {
            Err(EngineError::InvalidMarket("token_not_in_market"))
        }
    }
}

/// One immutable view of the exchange: markets plus token metadata.
///
/// Rebuilt (never mutated) whenever the underlying market set changes;
/// everything downstream (graph, routes, amounts) is derived from it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MarketsSnapshot {
    pub markets: HashMap<MarketId, MarketInfo>,
    pub tokens: HashMap<AssetId, TokenData>,
}

impl MarketsSnapshot {
    pub fn market(&self, id: MarketId) -> Result<&MarketInfo, EngineError> {
        self.markets.get(&id).ok_or(EngineError::UnknownMarket(id))
    }

    pub fn token(&self, id: AssetId) -> Result<&TokenData, EngineError> {
        self.tokens.get(&id).ok_or(EngineError::UnknownToken(id))
    }

    /// Oracle quote for a token; missing quotes refuse to price.
    pub fn token_prices(&self, id: AssetId) -> Result<&TokenPrices, EngineError> {
        self.token(id)?
            .prices
            .as_ref()
            .ok_or(EngineError::MissingPrice(id))
    }

    /// Available USD liquidity on the market side holding `token`:
    /// pool amount valued at the mid quote.
    pub fn available_liquidity_usd(
        &self,
        market: &MarketInfo,
        token: AssetId,
    ) -> Result<Usd, EngineError> {
        let amount = market.pool_amount(token)?;
        let mid = self.token_prices(token)?.mid();
        amount
            .checked_mul(mid)
            .ok_or(EngineError::Overflow("available_liquidity_usd"))
    }

    /// Like `available_liquidity_usd`, but a token without a quote simply
    /// counts as having no liquidity. Used for ranking, where an unpriced
    /// side must rank last rather than abort the build.
    pub fn liquidity_usd_or_zero(&self, market: &MarketInfo, token: AssetId) -> Usd {
        self.available_liquidity_usd(market, token)
            .unwrap_or_else(|_| U256::zero())
    }
}
