//! Fee formula selection for patient count records.
//!
//! Historical records are linked to their tariff in different ways, so the
//! formula is resolved by precedence:
//!
//! 1. the formula the record references explicitly
//! 2. the active formula matching the linked schedule's shift
//! 3. the active formula matching the shift string stored on the record
//! 4. the first active formula (logged as a warning)

use crate::error::JaspelError;
use crate::model::{FeeFormula, PatientCountRecord, Schedule};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaSource {
    Explicit,
    ScheduleShift,
    StoredShift,
    Fallback,
}

#[derive(Debug, Clone, Copy)]
pub struct FormulaSelection<'a> {
    pub formula: &'a FeeFormula,
    pub source: FormulaSource,
}

fn by_shift<'a>(formulas: &'a [FeeFormula], shift: &str) -> Option<&'a FeeFormula> {
    formulas
        .iter()
        .find(|formula| formula.active && formula.matches_shift(shift))
}

/// Resolve the formula for `record`. `schedule` is the record's linked schedule, if loaded.
pub fn select<'a>(
    record: &PatientCountRecord,
    schedule: Option<&Schedule>,
    formulas: &'a [FeeFormula],
) -> Result<FormulaSelection<'a>, JaspelError> {
    if let Some(formula_id) = record.formula_id {
        if let Some(formula) = formulas.iter().find(|formula| formula.id == formula_id) {
            return Ok(FormulaSelection {
                formula,
                source: FormulaSource::Explicit,
            });
        }
        log::warn!(
            target: "jaspel::calculation",
            "patient count {} references missing formula {}",
            record.id,
            formula_id
        );
    }

    if let Some(formula) = schedule.and_then(|schedule| by_shift(formulas, &schedule.shift)) {
        return Ok(FormulaSelection {
            formula,
            source: FormulaSource::ScheduleShift,
        });
    }

    if let Some(formula) = record
        .shift
        .as_deref()
        .and_then(|shift| by_shift(formulas, shift))
    {
        return Ok(FormulaSelection {
            formula,
            source: FormulaSource::StoredShift,
        });
    }

    match formulas.iter().find(|formula| formula.active) {
        Some(formula) => {
            log::warn!(
                target: "jaspel::calculation",
                "patient count {} has no matching formula, falling back to formula {} ({})",
                record.id,
                formula.id,
                formula.shift
            );
            Ok(FormulaSelection {
                formula,
                source: FormulaSource::Fallback,
            })
        }
        None => Err(JaspelError::NoFeeFormula {
            record_id: Some(record.id),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn formula(id: u64, shift: &str, active: bool) -> FeeFormula {
        FeeFormula {
            id,
            shift: shift.into(),
            threshold: 10,
            fee_general: Decimal::from(5_000),
            fee_insurance: Decimal::from(3_000),
            sitting_fee: Decimal::from(50_000),
            active,
        }
    }

    fn record() -> PatientCountRecord {
        PatientCountRecord {
            id: 1,
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            doctor_id: 4,
            general: 12,
            insurance: 8,
            formula_id: None,
            schedule_id: None,
            shift: None,
            validation: Default::default(),
            fee: None,
            input_by: 4,
        }
    }

    fn schedule(shift: &str) -> Schedule {
        Schedule {
            id: 3,
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            user_id: 4,
            shift: shift.into(),
        }
    }

    fn formulas() -> Vec<FeeFormula> {
        vec![
            formula(1, "Pagi", true),
            formula(2, "Sore", true),
            formula(3, "Malam", true),
            formula(4, "Libur", false),
        ]
    }

    #[test]
    fn test_explicit_reference_wins() {
        let formulas = formulas();
        let mut rec = record();
        rec.formula_id = Some(4);
        rec.shift = Some("Sore".into());
        let selected = select(&rec, Some(&schedule("Malam")), &formulas).unwrap();
        assert_eq!(selected.formula.id, 4);
        assert_eq!(selected.source, FormulaSource::Explicit);
    }

    #[test]
    fn test_schedule_shift_beats_stored_shift() {
        let formulas = formulas();
        let mut rec = record();
        rec.shift = Some("Sore".into());
        let selected = select(&rec, Some(&schedule("malam")), &formulas).unwrap();
        assert_eq!(selected.formula.id, 3);
        assert_eq!(selected.source, FormulaSource::ScheduleShift);
    }

    #[test]
    fn test_stored_shift_used_without_schedule_match() {
        let formulas = formulas();
        let mut rec = record();
        rec.shift = Some(" SORE ".into());
        let selected = select(&rec, Some(&schedule("Subuh")), &formulas).unwrap();
        assert_eq!(selected.formula.id, 2);
        assert_eq!(selected.source, FormulaSource::StoredShift);
    }

    #[test]
    fn test_inactive_formulas_do_not_match_by_shift() {
        let formulas = formulas();
        let mut rec = record();
        rec.shift = Some("Libur".into());
        let selected = select(&rec, None, &formulas).unwrap();
        assert_eq!(selected.formula.id, 1);
        assert_eq!(selected.source, FormulaSource::Fallback);
    }

    #[test]
    fn test_missing_explicit_formula_falls_through() {
        let formulas = formulas();
        let mut rec = record();
        rec.formula_id = Some(99);
        let selected = select(&rec, Some(&schedule("Sore")), &formulas).unwrap();
        assert_eq!(selected.formula.id, 2);
    }

    #[test]
    fn test_no_active_formula_is_an_error() {
        let formulas = vec![formula(4, "Libur", false)];
        assert!(matches!(
            select(&record(), None, &formulas),
            Err(JaspelError::NoFeeFormula { record_id: Some(1) })
        ));
    }
}
