use super::{RecordKind, RecordRef, Validatable, ValidationState};
use crate::error::JaspelError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JaspelType {
    /// Share of a validated procedure
    Procedure,
    /// Patient-count fee of a general practitioner's shift
    DailyPatients,
    /// Manually entered special consultation fee
    SpecialConsultation,
    Shift,
    Other,
}

impl JaspelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JaspelType::Procedure => "procedure",
            JaspelType::DailyPatients => "daily_patients",
            JaspelType::SpecialConsultation => "special_consultation",
            JaspelType::Shift => "shift",
            JaspelType::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JaspelType::Procedure => "Jaspel Tindakan",
            JaspelType::DailyPatients => "Jaspel Pasien Harian",
            JaspelType::SpecialConsultation => "Konsultasi Khusus",
            JaspelType::Shift => "Jaspel Jaga",
            JaspelType::Other => "Lainnya",
        }
    }
}

impl fmt::Display for JaspelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JaspelType {
    type Err = JaspelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "procedure" | "tindakan" => Ok(JaspelType::Procedure),
            "daily_patients" | "pasien_harian" => Ok(JaspelType::DailyPatients),
            "special_consultation" | "konsultasi_khusus" => Ok(JaspelType::SpecialConsultation),
            "shift" | "jaga" => Ok(JaspelType::Shift),
            "other" | "lainnya" => Ok(JaspelType::Other),
            other => Err(JaspelError::BadRequest(format!(
                "jenis jaspel tidak dikenal: {}",
                other
            ))),
        }
    }
}

/// A recorded fee (Jaspel) owed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JaspelEntry {
    #[serde(default)]
    pub id: u64,
    pub user_id: u64,
    pub date: NaiveDate,
    pub entry_type: JaspelType,
    #[serde(default)]
    pub procedure_id: Option<u64>,
    #[serde(default)]
    pub patient_count_id: Option<u64>,
    pub amount: Decimal,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub validation: ValidationState,
    #[serde(default)]
    pub input_by: u64,
    pub created_at: DateTime<Utc>,
}

/// Input for a manually created entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJaspelEntry {
    pub user_id: u64,
    pub date: NaiveDate,
    pub entry_type: JaspelType,
    #[serde(default)]
    pub procedure_id: Option<u64>,
    pub amount: Decimal,
    #[serde(default)]
    pub note: Option<String>,
}

impl NewJaspelEntry {
    pub fn note_len(&self) -> usize {
        self.note
            .as_deref()
            .map(|note| note.trim().chars().count())
            .unwrap_or(0)
    }

    pub fn into_entry(self, input_by: u64, created_at: DateTime<Utc>) -> JaspelEntry {
        JaspelEntry {
            id: 0,
            user_id: self.user_id,
            date: self.date,
            entry_type: self.entry_type,
            procedure_id: self.procedure_id,
            patient_count_id: None,
            amount: self.amount,
            note: self.note,
            validation: ValidationState::default(),
            input_by,
            created_at,
        }
    }
}

impl Validatable for JaspelEntry {
    fn record_ref(&self) -> RecordRef {
        RecordRef::new(RecordKind::JaspelEntry, self.id)
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
        Some(self.amount)
    }

    fn input_by(&self) -> u64 {
        self.input_by
    }

    fn beneficiaries(&self) -> Vec<u64> {
        vec![self.user_id]
    }
}
