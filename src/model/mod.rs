//! Domain records.
//!
//! Every validated record embeds a [`ValidationState`] and implements
//! [`Validatable`], which is what the validation workflow operates on.

mod formula;
mod jaspel;
mod patient_count;
mod procedure;
mod schedule;
mod user;

pub use formula::FeeFormula;
pub use jaspel::{JaspelEntry, JaspelType, NewJaspelEntry};
pub use patient_count::{PatientCountRecord, PatientFee};
pub use procedure::{Complexity, Procedure, ProcedureCategory, ProcedureType};
pub use schedule::Schedule;
pub use user::{Role, User};

use crate::error::JaspelError;
use crate::status::ValidationStatus;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status plus validator stamp shared by all validated records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationState {
    #[serde(default)]
    pub status: ValidationStatus,
    #[serde(default)]
    pub validated_by: Option<u64>,
    #[serde(default)]
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub validation_note: Option<String>,
}

impl ValidationState {
    pub fn is_approved(&self) -> bool {
        self.status == ValidationStatus::Approved
    }
}

/// The kinds of record that go through validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    JaspelEntry,
    Procedure,
    PatientCount,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::JaspelEntry => "jaspel_entry",
            RecordKind::Procedure => "procedure",
            RecordKind::PatientCount => "patient_count",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = JaspelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "jaspel" | "jaspel_entry" => Ok(RecordKind::JaspelEntry),
            "tindakan" | "procedure" => Ok(RecordKind::Procedure),
            "jumlah_pasien" | "jumlah_pasien_harian" | "patient_count" => {
                Ok(RecordKind::PatientCount)
            }
            other => Err(JaspelError::BadRequest(format!(
                "jenis data tidak dikenal: {}",
                other
            ))),
        }
    }
}

/// Points at one validated record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub kind: RecordKind,
    pub id: u64,
}

impl RecordRef {
    pub fn new(kind: RecordKind, id: u64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// A record whose status is driven by the validation workflow.
pub trait Validatable {
    fn record_ref(&self) -> RecordRef;

    fn validation(&self) -> &ValidationState;

    fn validation_mut(&mut self) -> &mut ValidationState;

    /// Business date the record belongs to
    fn date(&self) -> NaiveDate;

    /// Amount carried to the financial log, if any
    fn amount(&self) -> Option<Decimal>;

    /// User who entered the record
    fn input_by(&self) -> u64;

    /// Users whose jaspel totals change with this record
    fn beneficiaries(&self) -> Vec<u64>;
}

/// Rows stored in a table carry a store-assigned id.
pub trait Identified {
    fn id(&self) -> u64;
    fn set_id(&mut self, id: u64);
}

macro_rules! impl_identified {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Identified for $ty {
                fn id(&self) -> u64 {
                    self.id
                }

                fn set_id(&mut self, id: u64) {
                    self.id = id;
                }
            }
        )*
    };
}

impl_identified!(
    User,
    Schedule,
    FeeFormula,
    PatientCountRecord,
    ProcedureType,
    Procedure,
    JaspelEntry,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind_path_aliases() {
        assert_eq!("jaspel".parse::<RecordKind>().unwrap(), RecordKind::JaspelEntry);
        assert_eq!("tindakan".parse::<RecordKind>().unwrap(), RecordKind::Procedure);
        assert_eq!(
            "jumlah-pasien".parse::<RecordKind>().unwrap(),
            RecordKind::PatientCount
        );
        assert!("presensi".parse::<RecordKind>().is_err());
    }

    #[test]
    fn test_record_kind_canonical_names_parse_back() {
        for kind in [
            RecordKind::JaspelEntry,
            RecordKind::Procedure,
            RecordKind::PatientCount,
        ] {
            assert_eq!(kind.as_str().parse::<RecordKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_record_ref_display() {
        assert_eq!(
            RecordRef::new(RecordKind::Procedure, 7).to_string(),
            "procedure#7"
        );
    }
}
