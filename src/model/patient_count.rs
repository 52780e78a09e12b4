use super::{RecordKind, RecordRef, Validatable, ValidationState};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fee fields written back onto a patient count record after calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientFee {
    pub formula_id: u64,
    pub threshold_met: bool,
    pub fee_general: Decimal,
    pub fee_insurance: Decimal,
    pub sitting_fee: Decimal,
    pub total: Decimal,
    pub calculated_at: DateTime<Utc>,
}

/// Daily patient tally for a doctor's shift (JumlahPasienHarian).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientCountRecord {
    #[serde(default)]
    pub id: u64,
    pub date: NaiveDate,
    pub doctor_id: u64,
    /// Patients without insurance (umum)
    pub general: u32,
    /// Insurance patients (BPJS)
    pub insurance: u32,
    #[serde(default)]
    pub formula_id: Option<u64>,
    #[serde(default)]
    pub schedule_id: Option<u64>,
    /// Shift string stored by older input forms
    #[serde(default)]
    pub shift: Option<String>,
    #[serde(default)]
    pub validation: ValidationState,
    #[serde(default)]
    pub fee: Option<PatientFee>,
    #[serde(default)]
    pub input_by: u64,
}

impl PatientCountRecord {
    pub fn total_patients(&self) -> u32 {
        self.general.saturating_add(self.insurance)
    }
}

impl Validatable for PatientCountRecord {
    fn record_ref(&self) -> RecordRef {
        RecordRef::new(RecordKind::PatientCount, self.id)
    }

    fn validation(&self) -> &ValidationState {
        &self.validation
    }

    fn validation_mut(&mut self) -> &mut ValidationState {
        &mut self.validation
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn amount(&self) -> Option<Decimal> {
        self.fee.as_ref().map(|fee| fee.total)
    }

    fn input_by(&self) -> u64 {
        self.input_by
    }

    fn beneficiaries(&self) -> Vec<u64> {
        vec![self.doctor_id]
    }
}
