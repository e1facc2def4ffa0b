// src/calc/mod.rs
//
// Financial derivations. All arithmetic is checked decimal arithmetic; an
// overflow or impossible division leaves the derived field unset.

use crate::config::{CalcPolicy, NegativePolicy};
use rust_decimal::Decimal;
use serde::Serialize;

/// Numeric inputs pulled from one row. `None` means blank or non-numeric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinancialInputs {
    pub contract_amount: Option<Decimal>,
    pub paid_amount: Option<Decimal>,
    pub base_index: Option<Decimal>,
    pub current_index: Option<Decimal>,
    pub updated_amount: Option<Decimal>,
    pub uvi_quantity: Option<Decimal>,
    pub uvi_paid: Option<Decimal>,
    pub houses_total: Option<Decimal>,
    pub houses_delivered: Option<Decimal>,
    /// Physical progress as a ratio in `[0, 1]`.
    pub physical_progress: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedFields {
    /// Zero when the subtraction overflows; `remaining_overflow` tells that
    /// apart from a settled contract.
    pub remaining_amount: Decimal,
    pub indexed_amount: Option<Decimal>,
    pub percent_complete: Option<Decimal>,
    pub remaining_updated_amount: Option<Decimal>,
    pub updated_balance: Option<Decimal>,
    pub uvi_remaining: Option<Decimal>,
    pub houses_remaining: Option<Decimal>,
    pub physical_progress_remaining: Option<Decimal>,

    pub incomplete_financials: bool,
    pub negative_input_detected: bool,
    pub negative_remainder: bool,
    pub remaining_overflow: bool,
    pub percent_capped: bool,
    pub indexed_amount_available: bool,
}

/// `a - b`, floored at zero. The flag reports whether flooring kicked in.
fn floored_difference(a: Decimal, b: Decimal) -> Option<(Decimal, bool)> {
    let diff = a.checked_sub(b)?;
    if diff.is_sign_negative() && !diff.is_zero() {
        Some((Decimal::ZERO, true))
    } else {
        Some((diff, false))
    }
}

fn remaining_of(total: Option<Decimal>, used: Option<Decimal>) -> Option<Decimal> {
    floored_difference(total?, used?).map(|(v, _)| v)
}

/// `amount × current / base`; unset when either index is missing or base is 0.
pub fn indexed_amount(
    amount: Decimal,
    base_index: Option<Decimal>,
    current_index: Option<Decimal>,
) -> Option<Decimal> {
    let base = base_index?;
    let current = current_index?;
    if base.is_zero() {
        return None;
    }
    amount.checked_mul(current)?.checked_div(base)
}

pub fn compute(inputs: &FinancialInputs, policy: &CalcPolicy) -> DerivedFields {
    let mut out = DerivedFields::default();

    let candidates = [
        inputs.contract_amount,
        inputs.paid_amount,
        inputs.base_index,
        inputs.current_index,
        inputs.updated_amount,
        inputs.uvi_quantity,
        inputs.uvi_paid,
        inputs.houses_total,
        inputs.houses_delivered,
    ];
    out.negative_input_detected = candidates
        .iter()
        .flatten()
        .any(|v| v.is_sign_negative() && !v.is_zero());

    let adjust = |v: Option<Decimal>| match policy.negative_inputs {
        NegativePolicy::Accept => v,
        NegativePolicy::ClampToZero => v.map(|d| d.max(Decimal::ZERO)),
    };
    let contract = adjust(inputs.contract_amount);
    let paid = adjust(inputs.paid_amount);

    // 1) blanks count as zero, but are remembered
    out.incomplete_financials = contract.is_none() || paid.is_none();
    let contract_n = contract.unwrap_or(Decimal::ZERO);
    let paid_n = paid.unwrap_or(Decimal::ZERO);

    // 2) remaining, floored
    match floored_difference(contract_n, paid_n) {
        Some((remaining, floored)) => {
            out.remaining_amount = remaining;
            out.negative_remainder = floored;
        }
        None => {
            out.incomplete_financials = true;
            out.remaining_overflow = true;
        }
    }

    // 3) indexed amount needs a real contract amount and both indexes
    out.indexed_amount = contract.and_then(|c| {
        indexed_amount(c, adjust(inputs.base_index), adjust(inputs.current_index))
    });
    out.indexed_amount_available = out.indexed_amount.is_some();

    // 4) share paid
    if contract_n > Decimal::ZERO {
        if let Some(ratio) = paid_n.checked_div(contract_n) {
            out.percent_capped = ratio > Decimal::ONE || ratio < Decimal::ZERO;
            out.percent_complete = Some(ratio.clamp(Decimal::ZERO, Decimal::ONE));
        }
    }

    // supplementary balances
    let updated = adjust(inputs.updated_amount);
    out.remaining_updated_amount = remaining_of(updated, paid);
    out.uvi_remaining = remaining_of(adjust(inputs.uvi_quantity), adjust(inputs.uvi_paid));
    out.houses_remaining = remaining_of(
        adjust(inputs.houses_total),
        adjust(inputs.houses_delivered),
    );
    out.updated_balance = adjust(inputs.uvi_quantity)
        .zip(adjust(inputs.current_index))
        .and_then(|(q, idx)| q.checked_mul(idx));
    out.physical_progress_remaining = inputs
        .physical_progress
        .and_then(|p| Decimal::ONE.checked_sub(p))
        .map(|r| r.clamp(Decimal::ZERO, Decimal::ONE));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn inputs(contract: Option<Decimal>, paid: Option<Decimal>) -> FinancialInputs {
        FinancialInputs {
            contract_amount: contract,
            paid_amount: paid,
            ..FinancialInputs::default()
        }
    }

    #[test]
    fn remaining_is_exact_to_the_cent() {
        let out = compute(&inputs(Some(dec!(1000000.10)), Some(dec!(250000.05))), &CalcPolicy::default());
        assert_eq!(out.remaining_amount, dec!(750000.05));
        assert!(!out.negative_remainder);
        assert!(!out.incomplete_financials);
    }

    #[test]
    fn overpaid_contract_floors_at_zero() {
        let out = compute(&inputs(Some(dec!(100)), Some(dec!(130.5))), &CalcPolicy::default());
        assert_eq!(out.remaining_amount, Decimal::ZERO);
        assert!(out.negative_remainder);
        assert_eq!(out.percent_complete, Some(Decimal::ONE));
        assert!(out.percent_capped);
    }

    #[test]
    fn blanks_count_as_zero_and_are_flagged() {
        let out = compute(&inputs(Some(dec!(500)), None), &CalcPolicy::default());
        assert!(out.incomplete_financials);
        assert_eq!(out.remaining_amount, dec!(500));
        assert_eq!(out.percent_complete, Some(Decimal::ZERO));

        let out = compute(&inputs(None, Some(dec!(20))), &CalcPolicy::default());
        assert!(out.incomplete_financials);
        assert_eq!(out.remaining_amount, Decimal::ZERO);
        assert_eq!(out.percent_complete, None);
    }

    #[test]
    fn zero_contract_leaves_percent_unset() {
        let out = compute(&inputs(Some(dec!(0)), Some(dec!(0))), &CalcPolicy::default());
        assert_eq!(out.percent_complete, None);
        assert_eq!(out.remaining_amount, Decimal::ZERO);
    }

    #[test]
    fn indexed_amount_scales_by_index_ratio() {
        let mut i = inputs(Some(dec!(1000)), Some(dec!(0)));
        i.base_index = Some(dec!(100));
        i.current_index = Some(dec!(150));
        let out = compute(&i, &CalcPolicy::default());
        assert_eq!(out.indexed_amount, Some(dec!(1500)));
        assert!(out.indexed_amount_available);

        i.current_index = None;
        let out = compute(&i, &CalcPolicy::default());
        assert_eq!(out.indexed_amount, None);
        assert!(!out.indexed_amount_available);

        i.current_index = Some(dec!(150));
        i.base_index = Some(dec!(0));
        assert!(!compute(&i, &CalcPolicy::default()).indexed_amount_available);
    }

    #[test]
    fn negative_inputs_are_flagged_under_both_policies() {
        let i = inputs(Some(dec!(1000)), Some(dec!(-200)));
        let accepted = compute(&i, &CalcPolicy::default());
        assert!(accepted.negative_input_detected);
        assert_eq!(accepted.remaining_amount, dec!(1200));
        assert_eq!(accepted.percent_complete, Some(Decimal::ZERO));
        assert!(accepted.percent_capped);

        let policy = CalcPolicy {
            negative_inputs: NegativePolicy::ClampToZero,
            ..CalcPolicy::default()
        };
        let clamped = compute(&i, &policy);
        assert!(clamped.negative_input_detected);
        assert_eq!(clamped.remaining_amount, dec!(1000));
        assert!(!clamped.percent_capped);
    }

    #[test]
    fn supplementary_balances() {
        let i = FinancialInputs {
            contract_amount: Some(dec!(1000)),
            paid_amount: Some(dec!(400)),
            current_index: Some(dec!(1250.50)),
            updated_amount: Some(dec!(1800)),
            uvi_quantity: Some(dec!(2000)),
            uvi_paid: Some(dec!(2500)),
            houses_total: Some(dec!(40)),
            houses_delivered: Some(dec!(12)),
            physical_progress: Some(dec!(0.35)),
            ..FinancialInputs::default()
        };
        let out = compute(&i, &CalcPolicy::default());
        assert_eq!(out.remaining_updated_amount, Some(dec!(1400)));
        assert_eq!(out.uvi_remaining, Some(Decimal::ZERO));
        assert_eq!(out.houses_remaining, Some(dec!(28)));
        assert_eq!(out.updated_balance, Some(dec!(2501000)));
        assert_eq!(out.physical_progress_remaining, Some(dec!(0.65)));
        // no base index, so no indexed amount even with a current index
        assert!(!out.indexed_amount_available);
    }

    #[test]
    fn remaining_overflow_is_flagged() {
        let out = compute(&inputs(Some(Decimal::MAX), Some(Decimal::MIN)), &CalcPolicy::default());
        assert!(out.remaining_overflow);
        assert!(out.incomplete_financials);
        assert_eq!(out.remaining_amount, Decimal::ZERO);

        let out = compute(&inputs(Some(dec!(100)), Some(dec!(100))), &CalcPolicy::default());
        assert!(!out.remaining_overflow);
        assert_eq!(out.remaining_amount, Decimal::ZERO);
    }

    #[test]
    fn overflow_degrades_to_unset() {
        let mut i = inputs(Some(Decimal::MAX), Some(dec!(0)));
        i.base_index = Some(dec!(0.0000001));
        i.current_index = Some(Decimal::MAX);
        let out = compute(&i, &CalcPolicy::default());
        assert_eq!(out.indexed_amount, None);
        assert!(!out.indexed_amount_available);
    }
}
