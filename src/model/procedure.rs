use super::{RecordKind, RecordRef, Validatable, ValidationState};
use crate::error::JaspelError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Standard,
    Complex,
}

impl Complexity {
    /// Tariff multiplier: simple 0.6, standard 1.0, complex 1.4
    pub fn multiplier(&self) -> Decimal {
        match self {
            Complexity::Simple => Decimal::new(6, 1),
            Complexity::Standard => Decimal::ONE,
            Complexity::Complex => Decimal::new(14, 1),
        }
    }
}

impl FromStr for Complexity {
    type Err = JaspelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" | "sederhana" => Ok(Complexity::Simple),
            "standard" | "standar" => Ok(Complexity::Standard),
            "complex" | "kompleks" => Ok(Complexity::Complex),
            other => Err(JaspelError::BadRequest(format!(
                "kompleksitas tidak dikenal: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureCategory {
    Konsultasi,
    Pemeriksaan,
    #[default]
    Tindakan,
    Laboratorium,
    Radiologi,
    Lainnya,
}

impl ProcedureCategory {
    /// Jaspel pool percentage for procedures a paramedic performs alone.
    pub fn paramedic_pool_percentage(&self) -> Option<Decimal> {
        match self {
            ProcedureCategory::Tindakan => Some(Decimal::from(70)),
            ProcedureCategory::Pemeriksaan => Some(Decimal::from(60)),
            ProcedureCategory::Laboratorium | ProcedureCategory::Radiologi => {
                Some(Decimal::from(50))
            }
            ProcedureCategory::Konsultasi => Some(Decimal::from(40)),
            ProcedureCategory::Lainnya => None,
        }
    }
}

impl FromStr for ProcedureCategory {
    type Err = JaspelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "konsultasi" => Ok(ProcedureCategory::Konsultasi),
            "pemeriksaan" => Ok(ProcedureCategory::Pemeriksaan),
            "tindakan" => Ok(ProcedureCategory::Tindakan),
            "laboratorium" => Ok(ProcedureCategory::Laboratorium),
            "radiologi" => Ok(ProcedureCategory::Radiologi),
            "lainnya" => Ok(ProcedureCategory::Lainnya),
            other => Err(JaspelError::BadRequest(format!(
                "kategori tindakan tidak dikenal: {}",
                other
            ))),
        }
    }
}

/// Catalogue entry for a billable procedure (jenis tindakan).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureType {
    #[serde(default)]
    pub id: u64,
    pub code: String,
    pub name: String,
    pub base_tariff: Decimal,
    #[serde(default)]
    pub category: ProcedureCategory,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default)]
    pub requires_doctor: bool,
    /// Pool percentage used when the category does not fix one
    #[serde(default)]
    pub jaspel_percentage: Option<Decimal>,
}

/// A performed procedure (Tindakan).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Procedure {
    #[serde(default)]
    pub id: u64,
    pub procedure_type_id: u64,
    pub patient_name: String,
    pub date: NaiveDate,
    /// Tariff charged; defaults to the type's base tariff on submission
    #[serde(default)]
    pub tariff: Decimal,
    #[serde(default)]
    pub doctor_id: Option<u64>,
    #[serde(default)]
    pub paramedic_id: Option<u64>,
    #[serde(default)]
    pub non_paramedic_id: Option<u64>,
    #[serde(default)]
    pub validation: ValidationState,
    #[serde(default)]
    pub input_by: u64,
}

impl Procedure {
    /// Whether `user_id` took part as doctor, paramedic or non-paramedic.
    pub fn involves(&self, user_id: u64) -> bool {
        [self.doctor_id, self.paramedic_id, self.non_paramedic_id].contains(&Some(user_id))
    }
}

impl Validatable for Procedure {
    fn record_ref(&self) -> RecordRef {
        RecordRef::new(RecordKind::Procedure, self.id)
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
        Some(self.tariff)
    }

    fn input_by(&self) -> u64 {
        self.input_by
    }

    fn beneficiaries(&self) -> Vec<u64> {
        [self.doctor_id, self.paramedic_id, self.non_paramedic_id]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_involves_only_listed_participants() {
        let procedure = Procedure {
            id: 1,
            procedure_type_id: 1,
            patient_name: "Pasien A".into(),
            date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            tariff: Decimal::from(30_000),
            doctor_id: None,
            paramedic_id: Some(7),
            non_paramedic_id: Some(9),
            validation: ValidationState::default(),
            input_by: 7,
        };
        assert!(procedure.involves(7));
        assert!(procedure.involves(9));
        assert!(!procedure.involves(8));
    }

    #[test]
    fn test_complexity_multipliers() {
        assert_eq!(Complexity::Simple.multiplier().to_string(), "0.6");
        assert_eq!(Complexity::Standard.multiplier(), Decimal::ONE);
        assert_eq!(Complexity::Complex.multiplier().to_string(), "1.4");
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!(
            "Laboratorium".parse::<ProcedureCategory>().unwrap(),
            ProcedureCategory::Laboratorium
        );
        assert!("bedah".parse::<ProcedureCategory>().is_err());
    }
}
