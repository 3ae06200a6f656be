// src/trade/mod.rs
use crate::error::{EngineError, EngineResult};
use crate::types::{TokenData, TokenPrices};

pub mod decrease;
pub mod increase;
pub mod next_values;
pub mod swap;

/// Oracle quote of a token; absent or degenerate quotes refuse to price.
pub(crate) fn quoted(token: &TokenData) -> EngineResult<TokenPrices> {
    let prices = token.prices.ok_or(EngineError::MissingPrice(token.id))?;
    if prices.min.is_zero() || prices.max.is_zero() {
        return Err(EngineError::InvalidPrice(token.id));
    }
    Ok(prices)
}
