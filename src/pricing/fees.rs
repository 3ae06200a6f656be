// src/pricing/fees.rs
use primitive_types::U256;

use crate::error::EngineError;
use crate::market::MarketFeesCfg;
use crate::math::apply_factor;
use crate::math::rounding::{div_round, Rounding};
use crate::types::{TokenAmount, Usd};

/// Position fee for one step, split into the charged part and the rebate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PositionFees {
    /// Fee actually charged, after the discount.
    pub position_fee_usd: Usd,
    /// Rebate granted by the flat discount factor.
    pub fee_discount_usd: Usd,
}

/// Swap fee factor for a hop.
///
/// `balance_was_improved` comes from pricing and selects the reduced
/// factor for trades that shrink the pool imbalance.
pub fn swap_fee_factor(fees: &MarketFeesCfg, balance_was_improved: bool) -> U256 {
    if balance_was_improved {
        fees.swap_fee_factor_positive
    } else {
        fees.swap_fee_factor_negative
    }
}

/// Swap fee on a hop's USD-in.
pub fn swap_fee_usd(
    fees: &MarketFeesCfg,
    usd_in: Usd,
    balance_was_improved: bool,
) -> Result<Usd, EngineError> {
    apply_factor(usd_in, swap_fee_factor(fees, balance_was_improved))
}

/// Position fee on a size delta, with the flat rebate applied.
pub fn position_fees(
    fees: &MarketFeesCfg,
    size_delta_usd: Usd,
    balance_was_improved: bool,
    fee_discount_factor_fp: U256,
) -> Result<PositionFees, EngineError> {
    // 1) Base fee, factor chosen by the impact sign.
    let factor = if balance_was_improved {
        fees.position_fee_factor_positive
    } else {
        fees.position_fee_factor_negative
    };
    let base_fee_usd = apply_factor(size_delta_usd, factor)?;

    // 2) Flat rebate on the base fee.
    let fee_discount_usd = if fee_discount_factor_fp.is_zero() {
        U256::zero()
    } else {
        apply_factor(base_fee_usd, fee_discount_factor_fp)?
    };

    Ok(PositionFees {
        position_fee_usd: base_fee_usd.saturating_sub(fee_discount_usd),
        fee_discount_usd,
    })
}

/// UI / frontend fee on a USD volume.
pub fn ui_fee_usd(volume_usd: Usd, ui_fee_factor_fp: U256) -> Result<Usd, EngineError> {
    if ui_fee_factor_fp.is_zero() {
        return Ok(U256::zero());
    }
    apply_factor(volume_usd, ui_fee_factor_fp)
}

/// USD fee converted to fee-token atoms. Fees the protocol collects
/// round up.
pub fn fee_usd_to_tokens(fee_usd: Usd, token_price: Usd) -> Result<TokenAmount, EngineError> {
    if fee_usd.is_zero() {
        return Ok(U256::zero());
    }
    div_round(fee_usd, token_price, Rounding::Up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{float_one, usd_one};

    fn usd(x: u64) -> U256 {
        U256::from(x) * usd_one()
    }

    #[test]
    fn swap_fee_factor_follows_balance_flag() {
        let fees = MarketFeesCfg::default_bps();
        // 5 bps of 1000 usd vs 7 bps of 1000 usd
        let helpful = swap_fee_usd(&fees, usd(1000), true).unwrap();
        let harmful = swap_fee_usd(&fees, usd(1000), false).unwrap();
        assert_eq!(helpful, usd_one() / 2);
        assert_eq!(harmful, usd_one() * 7 / 10);
    }

    #[test]
    fn position_fee_rebate_splits_the_base_fee() {
        let fees = MarketFeesCfg::default_bps();
        // 7 bps of 1000 usd = 0.7 usd, 10% rebate = 0.07 usd
        let discount_fp = float_one() / 10;
        let pf = position_fees(&fees, usd(1000), false, discount_fp).unwrap();
        assert_eq!(pf.fee_discount_usd, usd_one() * 7 / 100);
        assert_eq!(pf.position_fee_usd, usd_one() * 63 / 100);
    }

    #[test]
    fn position_fee_without_rebate_charges_the_base_fee() {
        let fees = MarketFeesCfg::default_bps();
        let pf = position_fees(&fees, usd(1000), true, U256::zero()).unwrap();
        assert_eq!(pf.position_fee_usd, usd_one() / 2);
        assert_eq!(pf.fee_discount_usd, U256::zero());
    }

    #[test]
    fn fee_token_conversion_rounds_up() {
        // 10 usd at 3 usd per atom: 4 atoms, never 3
        let tokens = fee_usd_to_tokens(usd(10), usd(3)).unwrap();
        assert_eq!(tokens, U256::from(4u64));
    }

    #[test]
    fn zero_ui_factor_is_free() {
        assert_eq!(ui_fee_usd(usd(1_000_000), U256::zero()).unwrap(), U256::zero());
    }
}
