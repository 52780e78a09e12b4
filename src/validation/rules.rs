//! Input rule for JaspelEntry creation.
//!
//! Hard failures land in [`RuleOutcome::errors`]. Heuristic findings (dummy
//! amounts, large amounts without a note) are errors in production and
//! warnings in development.

use crate::calculation::{calculate, ProcedureSplitPolicy, SplitInput};
use crate::config::{RuntimeEnvironment, ValidationConfig};
use crate::error::{JaspelError, ValidationErrors};
use crate::model::{JaspelType, NewJaspelEntry, User};
use crate::report::rupiah;
use crate::status::ValidationStatus;
use crate::store::Tables;
use rust_decimal::Decimal;
use serde::Serialize;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub errors: ValidationErrors,
    pub warnings: Vec<String>,
}

impl RuleOutcome {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    /// Warnings on success, the collected errors otherwise.
    pub fn into_result(self) -> Result<Vec<String>, JaspelError> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            #[cfg(feature = "metrics")]
            METRICS.record_rule_rejection();
            Err(JaspelError::Validation(self.errors))
        }
    }
}

pub struct JaspelEntryRule<'a> {
    config: &'a ValidationConfig,
    environment: RuntimeEnvironment,
}

impl<'a> JaspelEntryRule<'a> {
    pub fn new(config: &'a ValidationConfig, environment: RuntimeEnvironment) -> Self {
        Self {
            config,
            environment,
        }
    }

    fn strict(&self, outcome: &mut RuleOutcome, field: &str, message: String) {
        if self.environment.is_production() {
            outcome.errors.add(field, message);
        } else {
            outcome.warnings.push(message);
        }
    }

    pub fn check(&self, entry: &NewJaspelEntry, tables: &Tables) -> RuleOutcome {
        let mut outcome = RuleOutcome::default();

        let user = tables.user(entry.user_id);
        match user {
            None => outcome
                .errors
                .add("user_id", format!("Pengguna {} tidak ditemukan", entry.user_id)),
            Some(user) if !user.role.is_earning() => outcome.errors.add(
                "user_id",
                format!("Pengguna dengan peran {} tidak menerima jaspel", user.role.label()),
            ),
            Some(_) => {}
        }

        self.check_amount(entry, &mut outcome);
        self.check_note(entry, &mut outcome);
        if let Some(user) = user {
            self.check_procedure(entry, user, tables, &mut outcome);
        }
        self.check_duplicate(entry, tables, &mut outcome);

        outcome
    }

    fn check_amount(&self, entry: &NewJaspelEntry, outcome: &mut RuleOutcome) {
        let amount = entry.amount;
        if amount <= Decimal::ZERO {
            outcome
                .errors
                .add("amount", "Jumlah jaspel harus lebih dari 0");
            return;
        }
        if amount > self.config.max_amount() {
            outcome.errors.add(
                "amount",
                format!(
                    "Jumlah jaspel melebihi batas maksimal {}",
                    rupiah(self.config.max_amount())
                ),
            );
            return;
        }
        if self.config.looks_like_dummy(amount) {
            self.strict(
                outcome,
                "amount",
                format!(
                    "Jumlah {} terdeteksi sebagai data dummy atau uji coba",
                    rupiah(amount)
                ),
            );
        }
    }

    fn check_note(&self, entry: &NewJaspelEntry, outcome: &mut RuleOutcome) {
        let min = self.config.min_note_length;
        let short_note = entry.note_len() < min;

        if entry.entry_type == JaspelType::SpecialConsultation && short_note {
            outcome.errors.add(
                "note",
                format!(
                    "Konsultasi khusus wajib disertai keterangan minimal {} karakter",
                    min
                ),
            );
        } else if entry.amount > self.config.large_amount() && short_note {
            self.strict(
                outcome,
                "note",
                format!(
                    "Jumlah di atas {} wajib disertai keterangan minimal {} karakter",
                    rupiah(self.config.large_amount()),
                    min
                ),
            );
        }
    }

    fn check_procedure(
        &self,
        entry: &NewJaspelEntry,
        user: &User,
        tables: &Tables,
        outcome: &mut RuleOutcome,
    ) {
        let procedure_id = match entry.procedure_id {
            Some(id) => id,
            None => {
                if entry.entry_type == JaspelType::Procedure {
                    outcome
                        .errors
                        .add("procedure_id", "Jaspel tindakan wajib merujuk ke tindakan");
                }
                return;
            }
        };

        let procedure = match tables.procedures.get(procedure_id) {
            Some(procedure) => procedure,
            None => {
                outcome.errors.add(
                    "procedure_id",
                    format!("Tindakan {} tidak ditemukan", procedure_id),
                );
                return;
            }
        };

        if !procedure.validation.is_approved() {
            outcome
                .errors
                .add("procedure_id", "Tindakan belum disetujui bendahara");
        }

        if !procedure.involves(entry.user_id) {
            outcome
                .errors
                .add("user_id", "Pengguna tidak terlibat dalam tindakan ini");
            return;
        }

        let already_recorded = tables.jaspel_entries.iter().any(|existing| {
            existing.procedure_id == Some(procedure_id)
                && existing.user_id == entry.user_id
                && existing.validation.status != ValidationStatus::Cancelled
        });
        if already_recorded {
            outcome.errors.add(
                "procedure_id",
                "Jaspel untuk tindakan ini sudah tercatat bagi pengguna tersebut",
            );
        }

        let Some(procedure_type) = tables.procedure_types.get(procedure.procedure_type_id) else {
            outcome
                .errors
                .add("procedure_id", "Jenis tindakan tidak ditemukan");
            return;
        };

        let split = calculate(ProcedureSplitPolicy(&SplitInput::for_procedure(
            procedure,
            procedure_type,
        )));
        let expected = split.share_for(user.role);
        if expected.is_zero() {
            outcome
                .errors
                .add("amount", "Pengguna tidak berhak atas jaspel tindakan ini");
            return;
        }

        let deviation = (entry.amount - expected).abs() / expected;
        if deviation > self.config.tolerance() {
            outcome.errors.add(
                "amount",
                format!(
                    "Jumlah menyimpang lebih dari {}% dari nilai berdasarkan tarif ({})",
                    self.config.tolerance_percent,
                    rupiah(expected)
                ),
            );
        }
    }

    fn check_duplicate(&self, entry: &NewJaspelEntry, tables: &Tables, outcome: &mut RuleOutcome) {
        let duplicate = tables.jaspel_entries.iter().any(|existing| {
            existing.user_id == entry.user_id
                && existing.date == entry.date
                && existing.entry_type == entry.entry_type
                && existing.amount == entry.amount
                && existing.validation.status != ValidationStatus::Cancelled
        });
        if duplicate {
            outcome.errors.add(
                "amount",
                "Data jaspel duplikat: pengguna, tanggal, jenis dan jumlah yang sama sudah ada",
            );
        }
    }
}
