// src/error.rs
use thiserror::Error;

use crate::types::{AssetId, MarketId};

/// Errors raised by the engine.
///
/// These are precondition violations (bad math inputs, inconsistent
/// metadata, missing oracle quotes), not trading conditions. Trading
/// conditions that callers must handle (no viable route, zero input,
/// capped impact) are encoded in the result values themselves.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("division_by_zero: {0}")]
    DivisionByZero(&'static str),

    #[error("mul_div_overflow: {0}")]
    Overflow(&'static str),

    #[error("arithmetic_underflow: {0}")]
    Underflow(&'static str),

    #[error("missing_price: token {0:?}")]
    MissingPrice(AssetId),

    #[error("invalid_price: token {0:?}")]
    InvalidPrice(AssetId),

    #[error("unknown_token: {0:?}")]
    UnknownToken(AssetId),

    #[error("unknown_market: {0:?}")]
    UnknownMarket(MarketId),

    #[error("invalid_market: {0}")]
    InvalidMarket(&'static str),

    #[error("impact_exponent_zero_not_supported")]
    ZeroImpactExponent,
}

pub type EngineResult<T> = Result<T, EngineError>;
