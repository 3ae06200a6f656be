// src/types.rs
use std::hash::Hash;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Sign-magnitude signed integer over U256.
///
/// Used for every signed USD quantity (price impact, PnL). Zero is always
/// stored as non-negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignedU256 {
    pub is_negative: bool,
    pub mag: U256,
}

impl SignedU256 {
    pub fn zero() -> Self {
        Self {
            is_negative: false,
            mag: U256::zero(),
        }
    }
    pub fn pos(mag: U256) -> Self {
        Self {
            is_negative: false,
            mag,
        }
    }
    pub fn neg(mag: U256) -> Self {
        // -0 is not representable
        Self {
            is_negative: !mag.is_zero(),
            mag,
        }
    }
    pub fn is_zero(&self) -> bool {
        self.mag.is_zero()
    }
    pub fn is_positive(&self) -> bool {
        !self.is_negative && !self.mag.is_zero()
    }
    pub fn negated(self) -> Self {
        if self.mag.is_zero() {
            self
        } else {
            Self {
                is_negative: !self.is_negative,
                mag: self.mag,
            }
        }
    }
}

/// USD values in fixed-point with 30 decimals.
pub type Usd = U256;

/// Token amounts in native atoms (10^-decimals of one token).
pub type TokenAmount = U256;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct MarketId(pub u32);

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct AssetId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Increase,
    Decrease,
}

/// Oracle quote pair for one token.
///
/// Prices are quoted per ATOM: `amount_atoms * price == Usd(1e30 scale)`,
/// so token decimals never enter the core arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPrices {
    pub min: Usd,
    pub max: Usd,
}

impl TokenPrices {
    /// Midpoint quote, used only for liquidity ranking.
    pub fn mid(&self) -> Usd {
        (self.min + self.max) / U256::from(2u8)
    }
}

/// Static token metadata plus the current oracle quote.
///
/// `prices == None` means the oracle has no usable quote for this token;
/// calculators must refuse to price trades touching it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenData {
    pub id: AssetId,
    pub decimals: u8,
    pub prices: Option<TokenPrices>,
    pub is_stable: bool,
    pub is_synthetic: bool,
    /// For a native token, the id of its wrapped form (and vice versa).
    pub wrapped_counterpart: Option<AssetId>,
}

impl TokenData {
    pub fn new(id: AssetId, decimals: u8, prices: TokenPrices) -> Self {
        Self {
            id,
            decimals,
            prices: Some(prices),
            is_stable: false,
            is_synthetic: false,
            wrapped_counterpart: None,
        }
    }
}

/// Same token, or a native/wrapped pair. Equivalent tokens convert 1:1
/// without touching the swap path.
pub fn tokens_equivalent(a: &TokenData, b: &TokenData) -> bool {
    a.id == b.id || a.wrapped_counterpart == Some(b.id) || b.wrapped_counterpart == Some(a.id)
}
