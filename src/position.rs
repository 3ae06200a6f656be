// src/position.rs
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::math::pnl;
use crate::types::{AssetId, MarketId, Side, SignedU256, TokenAmount, TokenPrices, Usd};

/// An open position as the caller knows it.
///
/// Pure input: the engine projects changes to it but never mutates it.
/// Funding and borrowing accrue on-chain; the caller passes the already
/// settled pending amounts in USD.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub market: MarketId,
    pub collateral_token: AssetId,
    pub side: Side,

    pub size_usd: Usd,
    pub size_tokens: TokenAmount,
    pub collateral_amount: TokenAmount,

    pub pending_borrowing_fee_usd: Usd,
    pub pending_funding_fee_usd: Usd,
}

impl Position {
    /// A zero-size position in the given market, used as the base when a
    /// trade opens fresh.
    pub fn empty(market: MarketId, collateral_token: AssetId, side: Side) -> Self {
        Self {
            market,
            collateral_token,
            side,
            size_usd: U256::zero(),
            size_tokens: U256::zero(),
            collateral_amount: U256::zero(),
            pending_borrowing_fee_usd: U256::zero(),
            pending_funding_fee_usd: U256::zero(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size_usd.is_zero() && self.collateral_amount.is_zero()
    }

    /// Collateral valued at the conservative (min) quote.
    pub fn collateral_usd(&self, collateral_prices: &TokenPrices) -> Result<Usd, EngineError> {
        self.collateral_amount
            .checked_mul(collateral_prices.min)
            .ok_or(EngineError::Overflow("position_collateral_usd"))
    }

    /// Carry-over costs owed at the next touch.
    pub fn pending_costs_usd(&self) -> Usd {
        self.pending_borrowing_fee_usd
            .saturating_add(self.pending_funding_fee_usd)
    }

    pub fn entry_price(&self) -> Result<Option<Usd>, EngineError> {
        pnl::entry_price(self.size_usd, self.size_tokens)
    }

    /// PnL at the conservative index quote for the side.
    pub fn pnl_usd(&self, index_prices: &TokenPrices) -> Result<SignedU256, EngineError> {
        pnl::position_pnl_usd(self.side, self.size_usd, self.size_tokens, index_prices)
    }

    pub fn leverage_bps(
        &self,
        collateral_prices: &TokenPrices,
    ) -> Result<Option<U256>, EngineError> {
        pnl::leverage_bps(self.size_usd, self.collateral_usd(collateral_prices)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::usd_one;

    fn usd(x: u64) -> U256 {
        U256::from(x) * usd_one()
    }

    #[test]
    fn collateral_is_valued_at_the_min_quote() {
        let pos = Position {
            collateral_amount: U256::from(100u64),
            ..Position::empty(MarketId(1), AssetId(2), Side::Long)
        };
        let prices = TokenPrices {
            min: usd(9),
            max: usd(11),
        };
        assert_eq!(pos.collateral_usd(&prices).unwrap(), usd(900));
    }

    #[test]
    fn pending_costs_sum_both_carry_overs() {
        let pos = Position {
            pending_borrowing_fee_usd: usd(3),
            pending_funding_fee_usd: usd(4),
            ..Position::empty(MarketId(1), AssetId(2), Side::Short)
        };
        assert_eq!(pos.pending_costs_usd(), usd(7));
    }

    #[test]
    fn leverage_of_an_empty_position_is_none() {
        let pos = Position::empty(MarketId(1), AssetId(2), Side::Long);
        let prices = TokenPrices {
            min: usd(1),
            max: usd(1),
        };
        assert_eq!(pos.leverage_bps(&prices).unwrap(), None);
    }
}
