//! Tiered patient-count fee.
//!
//! The sitting fee covers the first `threshold` patients. Patients above the
//! threshold are paid per head, split between general and insurance patients
//! in proportion to each category's share of the total.

use crate::model::{FeeFormula, PatientFee};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatientCountFee {
    pub formula_id: u64,
    pub general: u32,
    pub insurance: u32,
    pub total_patients: u32,
    pub threshold: u32,
    pub threshold_met: bool,
    /// Patients above the threshold
    pub countable: u32,
    pub counted_general: u32,
    pub counted_insurance: u32,
    pub fee_general: Decimal,
    pub fee_insurance: Decimal,
    pub sitting_fee: Decimal,
    pub total: Decimal,
}

impl PatientCountFee {
    pub fn to_stored(&self, calculated_at: DateTime<Utc>) -> PatientFee {
        PatientFee {
            formula_id: self.formula_id,
            threshold_met: self.threshold_met,
            fee_general: self.fee_general,
            fee_insurance: self.fee_insurance,
            sitting_fee: self.sitting_fee,
            total: self.total,
            calculated_at,
        }
    }
}

/// Share of `countable` attributed to a category of `part` out of `total` patients.
fn proportional_count(countable: u32, part: u32, total: u32) -> u32 {
    let share = Decimal::from(countable) * Decimal::from(part) / Decimal::from(total);
    share
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
        .unwrap_or(countable)
}

pub(super) fn calculate(general: u32, insurance: u32, formula: &FeeFormula) -> PatientCountFee {
    let total_patients = general.saturating_add(insurance);
    let threshold = formula.threshold;

    if total_patients <= threshold {
        return PatientCountFee {
            formula_id: formula.id,
            general,
            insurance,
            total_patients,
            threshold,
            threshold_met: false,
            countable: 0,
            counted_general: 0,
            counted_insurance: 0,
            fee_general: Decimal::ZERO,
            fee_insurance: Decimal::ZERO,
            sitting_fee: formula.sitting_fee,
            total: formula.sitting_fee,
        };
    }

    let countable = total_patients - threshold;
    // each category is rounded on its own; the two counts may not add up to `countable`
    let counted_general = proportional_count(countable, general, total_patients);
    let counted_insurance = proportional_count(countable, insurance, total_patients);
    let fee_general = Decimal::from(counted_general) * formula.fee_general;
    let fee_insurance = Decimal::from(counted_insurance) * formula.fee_insurance;

    PatientCountFee {
        formula_id: formula.id,
        general,
        insurance,
        total_patients,
        threshold,
        threshold_met: true,
        countable,
        counted_general,
        counted_insurance,
        fee_general,
        fee_insurance,
        sitting_fee: formula.sitting_fee,
        total: fee_general + fee_insurance + formula.sitting_fee,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formula(threshold: u32, sitting: i64, general: i64, insurance: i64) -> FeeFormula {
        FeeFormula {
            id: 1,
            shift: "Pagi".into(),
            threshold,
            fee_general: Decimal::from(general),
            fee_insurance: Decimal::from(insurance),
            sitting_fee: Decimal::from(sitting),
            active: true,
        }
    }

    #[test]
    fn test_reference_scenario() {
        let fee = calculate(12, 8, &formula(10, 50_000, 5_000, 3_000));
        assert_eq!(fee.total_patients, 20);
        assert_eq!(fee.countable, 10);
        assert_eq!(fee.counted_general, 6);
        assert_eq!(fee.counted_insurance, 4);
        assert_eq!(fee.fee_general, Decimal::from(30_000));
        assert_eq!(fee.fee_insurance, Decimal::from(12_000));
        assert_eq!(fee.total, Decimal::from(92_000));
        assert!(fee.threshold_met);
    }

    #[test]
    fn test_at_or_below_threshold_pays_sitting_fee_only() {
        let f = formula(10, 50_000, 5_000, 3_000);
        for (g, i) in [(0, 0), (3, 2), (10, 0), (4, 6), (0, 10)] {
            let fee = calculate(g, i, &f);
            assert_eq!(fee.total, Decimal::from(50_000), "g={} i={}", g, i);
            assert!(!fee.threshold_met);
            assert_eq!(fee.fee_general + fee.fee_insurance, Decimal::ZERO);
        }
    }

    #[test]
    fn test_components_reconcile_with_total_above_threshold() {
        let f = formula(7, 40_000, 6_000, 2_500);
        for g in 0..25u32 {
            for i in 0..25u32 {
                if g + i <= f.threshold {
                    continue;
                }
                let fee = calculate(g, i, &f);
                assert_eq!(
                    fee.fee_general + fee.fee_insurance + fee.sitting_fee,
                    fee.total,
                    "g={} i={}",
                    g,
                    i
                );
                assert_eq!(fee.fee_general, Decimal::from(fee.counted_general) * f.fee_general);
                assert!(fee.threshold_met);
            }
        }
    }

    #[test]
    fn test_half_counts_round_away_from_zero_independently() {
        // countable = 1, shares 0.5 / 0.5 -> both categories round up
        let fee = calculate(1, 1, &formula(1, 10_000, 1_000, 1_000));
        assert_eq!(fee.countable, 1);
        assert_eq!(fee.counted_general, 1);
        assert_eq!(fee.counted_insurance, 1);
        assert_eq!(fee.total, Decimal::from(12_000));
    }

    #[test]
    fn test_zero_threshold_counts_every_patient() {
        let fee = calculate(3, 2, &formula(0, 0, 1_000, 500));
        assert_eq!(fee.counted_general, 3);
        assert_eq!(fee.counted_insurance, 2);
        assert_eq!(fee.total, Decimal::from(4_000));
    }
}
