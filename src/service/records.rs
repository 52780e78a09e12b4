//! Write operations on master data and submitted records.

use super::require_validator;
use crate::cache::{Cache, CacheKeys, ChangeScope};
use crate::calculation::{
    calculate, formula, PatientCountFee, PatientCountPolicy, ProcedureSplit,
    ProcedureSplitPolicy, SplitInput,
};
use crate::error::{JaspelError, Result, ValidationErrors};
use crate::model::{
    Complexity, FeeFormula, JaspelEntry, NewJaspelEntry, PatientCountRecord, Procedure,
    ProcedureCategory, ProcedureType, Role, Schedule, User, ValidationState,
};
use crate::store::{Database, Tables};
use crate::validation::JaspelEntryRule;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewProcedure {
    pub procedure_type_id: u64,
    pub patient_name: String,
    pub date: NaiveDate,
    /// Charged tariff; the type's base tariff when omitted
    #[serde(default)]
    pub tariff: Option<Decimal>,
    #[serde(default)]
    pub doctor_id: Option<u64>,
    #[serde(default)]
    pub paramedic_id: Option<u64>,
    #[serde(default)]
    pub non_paramedic_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPatientCount {
    pub date: NaiveDate,
    pub doctor_id: u64,
    pub general: u32,
    pub insurance: u32,
    #[serde(default)]
    pub formula_id: Option<u64>,
    #[serde(default)]
    pub schedule_id: Option<u64>,
    #[serde(default)]
    pub shift: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PatientCountPreview {
    pub general: u32,
    pub insurance: u32,
    #[serde(default)]
    pub formula_id: Option<u64>,
    #[serde(default)]
    pub shift: Option<String>,
}

/// Split preview, either for a stored procedure type or for ad-hoc parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProcedurePreview {
    pub procedure_type_id: Option<u64>,
    pub tariff: Option<Decimal>,
    pub complexity: Option<Complexity>,
    pub category: Option<ProcedureCategory>,
    pub requires_doctor: Option<bool>,
    pub jaspel_percentage: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedEntry {
    pub entry: JaspelEntry,
    pub warnings: Vec<String>,
}

pub struct RecordService<'a> {
    db: &'a Database,
    cache: &'a Cache,
    rule: JaspelEntryRule<'a>,
}

fn require_role(tables: &Tables, user_id: u64, field: &str, roles: &[Role]) -> Result<()> {
    match tables.user(user_id) {
        None => Err(JaspelError::validation(
            field,
            format!("Pengguna {} tidak ditemukan", user_id),
        )),
        Some(user) if !roles.contains(&user.role) => Err(JaspelError::validation(
            field,
            format!("{} bukan {}", user.name, roles[0].label()),
        )),
        Some(_) => Ok(()),
    }
}

impl<'a> RecordService<'a> {
    pub fn new(db: &'a Database, cache: &'a Cache, rule: JaspelEntryRule<'a>) -> Self {
        Self { db, cache, rule }
    }

    fn changed(&self, date: NaiveDate, users: Vec<u64>) {
        self.cache
            .invalidate(&CacheKeys::for_change(&ChangeScope { date, users }));
    }

    pub fn create_user(&self, actor: &User, user: User) -> Result<User> {
        if actor.role != Role::Admin {
            return Err(JaspelError::Forbidden("hanya admin yang dapat menambah pengguna".into()));
        }
        if user.name.trim().is_empty() {
            return Err(JaspelError::validation("name", "Nama wajib diisi"));
        }
        self.db.execute_in_transaction("user.create", |tables| {
            let id = tables.users.insert(user);
            tables
                .users
                .get(id)
                .cloned()
                .ok_or_else(|| JaspelError::not_found("user", id))
        })
    }

    pub fn create_formula(&self, actor: &User, formula: FeeFormula) -> Result<FeeFormula> {
        require_validator(actor)?;
        let mut errors = ValidationErrors::new();
        if formula.shift.trim().is_empty() {
            errors.add("shift", "Shift wajib diisi");
        }
        for (field, value) in [
            ("fee_general", formula.fee_general),
            ("fee_insurance", formula.fee_insurance),
            ("sitting_fee", formula.sitting_fee),
        ] {
            if value < Decimal::ZERO {
                errors.add(field, "Nilai tidak boleh negatif");
            }
        }
        if !errors.is_empty() {
            return Err(errors.into());
        }

        self.db.execute_in_transaction("formula.create", |tables| {
            let id = tables.formulas.insert(formula);
            log::info!(target: "jaspel::store", "fee formula {} created by {}", id, actor.id);
            tables
                .formulas
                .get(id)
                .cloned()
                .ok_or_else(|| JaspelError::not_found("formula", id))
        })
    }

    pub fn create_procedure_type(
        &self,
        actor: &User,
        procedure_type: ProcedureType,
    ) -> Result<ProcedureType> {
        require_validator(actor)?;
        let mut errors = ValidationErrors::new();
        if procedure_type.code.trim().is_empty() {
            errors.add("code", "Kode wajib diisi");
        }
        if procedure_type.base_tariff <= Decimal::ZERO {
            errors.add("base_tariff", "Tarif harus lebih dari 0");
        }
        if let Some(percentage) = procedure_type.jaspel_percentage {
            if percentage <= Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
                errors.add("jaspel_percentage", "Persentase harus di antara 0 dan 100");
            }
        }
        if !errors.is_empty() {
            return Err(errors.into());
        }

        self.db.execute_in_transaction("procedure_type.create", |tables| {
            let code = procedure_type.code.trim();
            if tables
                .procedure_types
                .iter()
                .any(|existing| existing.code.eq_ignore_ascii_case(code))
            {
                return Err(JaspelError::validation("code", format!("Kode {} sudah dipakai", code)));
            }
            let id = tables.procedure_types.insert(procedure_type);
            tables
                .procedure_types
                .get(id)
                .cloned()
                .ok_or_else(|| JaspelError::not_found("procedure_type", id))
        })
    }

    pub fn create_schedule(&self, actor: &User, schedule: Schedule) -> Result<Schedule> {
        require_validator(actor)?;
        if schedule.shift.trim().is_empty() {
            return Err(JaspelError::validation("shift", "Shift wajib diisi"));
        }
        self.db.execute_in_transaction("schedule.create", |tables| {
            if tables.user(schedule.user_id).is_none() {
                return Err(JaspelError::validation(
                    "user_id",
                    format!("Pengguna {} tidak ditemukan", schedule.user_id),
                ));
            }
            let id = tables.schedules.insert(schedule);
            tables
                .schedules
                .get(id)
                .cloned()
                .ok_or_else(|| JaspelError::not_found("schedule", id))
        })
    }

    /// Record a performed procedure. It starts pending validation.
    pub fn submit_procedure(&self, actor: &User, input: NewProcedure) -> Result<Procedure> {
        if input.patient_name.trim().is_empty() {
            return Err(JaspelError::validation("patient_name", "Nama pasien wajib diisi"));
        }
        let procedure = self.db.execute_in_transaction("procedure.submit", |tables| {
            let procedure_type = tables
                .procedure_types
                .get(input.procedure_type_id)
                .ok_or_else(|| JaspelError::not_found("procedure_type", input.procedure_type_id))?;

            let mut errors = ValidationErrors::new();
            if procedure_type.requires_doctor && input.doctor_id.is_none() {
                errors.add("doctor_id", "Tindakan ini wajib melibatkan dokter");
            }
            if input.doctor_id.is_none() && input.paramedic_id.is_none() {
                errors.add("paramedic_id", "Tindakan wajib memiliki pelaksana");
            }
            let tariff = input.tariff.unwrap_or(procedure_type.base_tariff);
            if tariff <= Decimal::ZERO {
                errors.add("tariff", "Tarif harus lebih dari 0");
            }
            let participants = [
                ("doctor_id", input.doctor_id, Role::Doctor),
                ("paramedic_id", input.paramedic_id, Role::Paramedic),
                ("non_paramedic_id", input.non_paramedic_id, Role::NonParamedic),
            ];
            for (field, user_id, role) in participants {
                if let Some(user_id) = user_id {
                    if let Err(JaspelError::Validation(found)) =
                        require_role(tables, user_id, field, &[role])
                    {
                        for message in found.get(field).unwrap_or_default() {
                            errors.add(field, message.clone());
                        }
                    }
                }
            }
            if !errors.is_empty() {
                return Err(errors.into());
            }

            let id = tables.procedures.insert(Procedure {
                id: 0,
                procedure_type_id: input.procedure_type_id,
                patient_name: input.patient_name.trim().to_string(),
                date: input.date,
                tariff,
                doctor_id: input.doctor_id,
                paramedic_id: input.paramedic_id,
                non_paramedic_id: input.non_paramedic_id,
                validation: ValidationState::default(),
                input_by: actor.id,
            });
            tables
                .procedures
                .get(id)
                .cloned()
                .ok_or_else(|| JaspelError::not_found("procedure", id))
        })?;

        self.changed(
            procedure.date,
            [procedure.doctor_id, procedure.paramedic_id, procedure.non_paramedic_id]
                .into_iter()
                .flatten()
                .collect(),
        );
        Ok(procedure)
    }

    /// Record a doctor's daily patient count. The fee is calculated on approval.
    pub fn submit_patient_count(
        &self,
        actor: &User,
        input: NewPatientCount,
    ) -> Result<PatientCountRecord> {
        let record = self.db.execute_in_transaction("patient_count.submit", |tables| {
            require_role(tables, input.doctor_id, "doctor_id", &[Role::Doctor])?;
            if let Some(formula_id) = input.formula_id {
                if !tables.formulas.contains(formula_id) {
                    return Err(JaspelError::validation(
                        "formula_id",
                        format!("Formula {} tidak ditemukan", formula_id),
                    ));
                }
            }
            if let Some(schedule_id) = input.schedule_id {
                if !tables.schedules.contains(schedule_id) {
                    return Err(JaspelError::validation(
                        "schedule_id",
                        format!("Jadwal {} tidak ditemukan", schedule_id),
                    ));
                }
            }
            if tables.patient_counts.iter().any(|existing| {
                existing.doctor_id == input.doctor_id
                    && existing.date == input.date
                    && existing.shift == input.shift
                    && existing.schedule_id == input.schedule_id
                    && !existing.validation.status.is_terminal()
            }) {
                return Err(JaspelError::validation(
                    "date",
                    "Jumlah pasien untuk dokter, tanggal dan shift ini sudah diinput",
                ));
            }

            let id = tables.patient_counts.insert(PatientCountRecord {
                id: 0,
                date: input.date,
                doctor_id: input.doctor_id,
                general: input.general,
                insurance: input.insurance,
                formula_id: input.formula_id,
                schedule_id: input.schedule_id,
                shift: input.shift.clone(),
                validation: ValidationState::default(),
                fee: None,
                input_by: actor.id,
            });
            tables
                .patient_counts
                .get(id)
                .cloned()
                .ok_or_else(|| JaspelError::not_found("patient_count", id))
        })?;

        self.changed(record.date, vec![record.doctor_id]);
        Ok(record)
    }

    /// Store a manual JaspelEntry after the input rule passed.
    pub fn create_entry(&self, actor: &User, input: NewJaspelEntry) -> Result<CreatedEntry> {
        let may_enter = actor.role.can_validate()
            || actor.role == Role::Staff
            || actor.id == input.user_id;
        if !may_enter {
            return Err(JaspelError::Forbidden(
                "tidak boleh menginput jaspel untuk pengguna lain".into(),
            ));
        }

        let created = self.db.execute_in_transaction("jaspel.create", |tables| {
            let warnings = self.rule.check(&input, tables).into_result()?;
            let id = tables
                .jaspel_entries
                .insert(input.clone().into_entry(actor.id, Utc::now()));
            let entry = tables
                .jaspel_entries
                .get(id)
                .cloned()
                .ok_or_else(|| JaspelError::not_found("jaspel_entry", id))?;
            Ok::<_, JaspelError>(CreatedEntry { entry, warnings })
        })?;

        for warning in &created.warnings {
            log::warn!(target: "jaspel::validation", "jaspel {} accepted with warning: {}", created.entry.id, warning);
        }
        self.changed(created.entry.date, vec![created.entry.user_id]);
        Ok(created)
    }

    pub fn preview_patient_count(&self, preview: &PatientCountPreview) -> Result<PatientCountFee> {
        let formulas: Vec<FeeFormula> = self
            .db
            .read(|tables| tables.formulas.iter().cloned().collect())?;
        let candidate = PatientCountRecord {
            id: 0,
            date: Utc::now().date_naive(),
            doctor_id: 0,
            general: preview.general,
            insurance: preview.insurance,
            formula_id: preview.formula_id,
            schedule_id: None,
            shift: preview.shift.clone(),
            validation: ValidationState::default(),
            fee: None,
            input_by: 0,
        };
        let selection = formula::select(&candidate, None, &formulas)?;
        Ok(calculate(PatientCountPolicy {
            general: preview.general,
            insurance: preview.insurance,
            formula: selection.formula,
        }))
    }

    pub fn preview_procedure(&self, preview: &ProcedurePreview) -> Result<ProcedureSplit> {
        let base = match preview.procedure_type_id {
            Some(id) => {
                let procedure_type = self
                    .db
                    .read(|tables| tables.procedure_types.get(id).cloned())?
                    .ok_or_else(|| JaspelError::not_found("procedure_type", id))?;
                SplitInput::from_type(&procedure_type)
            }
            None => {
                let tariff = preview
                    .tariff
                    .ok_or_else(|| JaspelError::validation("tariff", "Tarif wajib diisi"))?;
                SplitInput {
                    base_tariff: tariff,
                    complexity: Complexity::default(),
                    category: ProcedureCategory::default(),
                    requires_doctor: false,
                    percentage_override: None,
                }
            }
        };

        let input = SplitInput {
            base_tariff: preview.tariff.unwrap_or(base.base_tariff),
            complexity: preview.complexity.unwrap_or(base.complexity),
            category: preview.category.unwrap_or(base.category),
            requires_doctor: preview.requires_doctor.unwrap_or(base.requires_doctor),
            percentage_override: preview.jaspel_percentage.or(base.percentage_override),
        };
        if input.base_tariff <= Decimal::ZERO {
            return Err(JaspelError::validation("tariff", "Tarif harus lebih dari 0"));
        }
        Ok(calculate(ProcedureSplitPolicy(&input)))
    }
}
