//! Validation status workflow.
//!
//! A transition runs inside one store transaction: the status change, the
//! validator stamp, any generated JaspelEntries and the audit record commit
//! together or not at all. Logging, metrics and cache invalidation happen
//! only after the commit succeeded.

use crate::audit::{self, AuditContext, StatusChange};
use crate::cache::{Cache, CacheKeys, ChangeScope};
use crate::calculation::{
    calculate, formula, PatientCountFee, PatientCountPolicy, ProcedureSplitPolicy, SplitInput,
};
use crate::error::{JaspelError, Result};
use crate::model::{
    FeeFormula, JaspelEntry, JaspelType, RecordKind, RecordRef, User, ValidationState,
};
use crate::status::ValidationStatus;
use crate::store::{Database, Tables};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub target: RecordRef,
    pub status: ValidationStatus,
    #[serde(default)]
    pub note: Option<String>,
}

impl TransitionRequest {
    pub fn new(target: RecordRef, status: ValidationStatus) -> Self {
        Self {
            target,
            status,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    fn trimmed_note(&self) -> Option<String> {
        self.note
            .as_deref()
            .map(str::trim)
            .filter(|note| !note.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// The requested status normalizes to the current one; nothing was written.
    Unchanged {
        target: RecordRef,
        status: ValidationStatus,
    },
    Transitioned {
        target: RecordRef,
        from: ValidationStatus,
        to: ValidationStatus,
        audit_id: Uuid,
        /// Amount carried to the financial log, if the record has one
        #[serde(skip_serializing_if = "Option::is_none")]
        amount: Option<Decimal>,
        generated_entries: Vec<u64>,
    },
}

impl TransitionOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, TransitionOutcome::Transitioned { .. })
    }
}

/// Per-record result of a bulk transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkItem {
    pub target: RecordRef,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TransitionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct Committed {
    change: StatusChange,
    scope: ChangeScope,
    generated: Vec<u64>,
}

pub struct ValidationWorkflow<'a> {
    db: &'a Database,
    cache: &'a Cache,
}

impl<'a> ValidationWorkflow<'a> {
    pub fn new(db: &'a Database, cache: &'a Cache) -> Self {
        Self { db, cache }
    }

    pub fn transition(
        &self,
        actor: &User,
        ctx: &AuditContext,
        request: &TransitionRequest,
    ) -> Result<TransitionOutcome> {
        let target = request.target;
        let to = request.status;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::transition_span(&target.to_string(), to.as_str()).entered();

        // cheap pre-check so no-ops never open a write transaction
        if self.db.read(|tables| plan(tables, actor, request))??.is_none() {
            log::debug!(target: "jaspel::validation", "{} already {}, nothing to do", target, to);
            return Ok(TransitionOutcome::Unchanged { target, status: to });
        }

        let now = Utc::now();
        let committed = self
            .db
            .execute_in_transaction("validation.transition", |tables| {
                match plan(tables, actor, request)? {
                    Some(from) => apply(tables, actor, ctx, request, from, now).map(Some),
                    None => Ok(None),
                }
            })?;

        let Some(committed) = committed else {
            return Ok(TransitionOutcome::Unchanged { target, status: to });
        };

        audit::log_status_change(&committed.change);
        #[cfg(feature = "metrics")]
        METRICS.record_transition(target.kind.as_str(), to.as_str());
        self.cache
            .invalidate(&CacheKeys::for_change(&committed.scope));

        Ok(TransitionOutcome::Transitioned {
            target,
            from: committed.change.from,
            to,
            audit_id: committed.change.audit_id,
            amount: committed.change.amount,
            generated_entries: committed.generated,
        })
    }

    /// Apply one status to many records. A failing record does not stop the others.
    pub fn bulk_transition(
        &self,
        actor: &User,
        ctx: &AuditContext,
        targets: &[RecordRef],
        status: ValidationStatus,
        note: Option<&str>,
    ) -> Vec<BulkItem> {
        targets
            .iter()
            .map(|target| {
                let request = TransitionRequest {
                    target: *target,
                    status,
                    note: note.map(str::to_string),
                };
                match self.transition(actor, ctx, &request) {
                    Ok(outcome) => BulkItem {
                        target: *target,
                        success: true,
                        outcome: Some(outcome),
                        error: None,
                    },
                    Err(err) => {
                        log::warn!(target: "jaspel::validation", "bulk {} -> {} failed: {}", target, status, err);
                        BulkItem {
                            target: *target,
                            success: false,
                            outcome: None,
                            error: Some(err.to_string()),
                        }
                    }
                }
            })
            .collect()
    }
}

fn authorize(actor: &User, input_by: u64, to: ValidationStatus) -> Result<()> {
    let allowed = match to {
        ValidationStatus::Approved | ValidationStatus::Rejected | ValidationStatus::Revision => {
            actor.role.can_validate()
        }
        ValidationStatus::Cancelled => actor.role.can_validate() || actor.id == input_by,
        ValidationStatus::Pending => true,
    };
    if allowed {
        Ok(())
    } else {
        Err(JaspelError::Forbidden(format!(
            "{} tidak boleh mengubah status menjadi {}",
            actor.role.label(),
            to.label()
        )))
    }
}

/// Current status when the request needs a write, `None` for a no-op.
fn plan(
    tables: &Tables,
    actor: &User,
    request: &TransitionRequest,
) -> Result<Option<ValidationStatus>> {
    let target = request.target;
    let record = tables
        .validatable(target)
        .ok_or_else(|| JaspelError::not_found(target.kind.as_str(), target.id))?;

    authorize(actor, record.input_by(), request.status)?;

    let from = record.validation().status;
    if from == request.status {
        return Ok(None);
    }
    if !from.can_transition_to(request.status) {
        return Err(JaspelError::InvalidTransition {
            from,
            to: request.status,
        });
    }
    if matches!(
        request.status,
        ValidationStatus::Rejected | ValidationStatus::Revision
    ) && request.trimmed_note().is_none()
    {
        return Err(JaspelError::validation(
            "note",
            format!("Alasan wajib diisi untuk status {}", request.status.label()),
        ));
    }
    Ok(Some(from))
}

fn apply(
    tables: &mut Tables,
    actor: &User,
    ctx: &AuditContext,
    request: &TransitionRequest,
    from: ValidationStatus,
    now: DateTime<Utc>,
) -> Result<Committed> {
    let target = request.target;
    let to = request.status;
    let missing = || JaspelError::not_found(target.kind.as_str(), target.id);

    let old_values = tables.record_json(target).unwrap_or_default();

    let state = tables.validatable_mut(target).ok_or_else(missing)?.validation_mut();
    state.status = to;
    if to.is_decision() {
        state.validated_by = Some(actor.id);
        state.validated_at = Some(now);
    }
    if let Some(note) = request.trimmed_note() {
        state.validation_note = Some(note);
    }

    let generated = match (target.kind, to) {
        (RecordKind::Procedure, ValidationStatus::Approved) => {
            generate_procedure_entries(tables, target.id, actor, now)?
        }
        (RecordKind::PatientCount, ValidationStatus::Approved) => {
            generate_patient_count_entry(tables, target.id, actor, now)?
        }
        (RecordKind::PatientCount, _) => {
            ensure_patient_count_fee(tables, target.id, now);
            Vec::new()
        }
        _ => Vec::new(),
    };

    let new_values = tables.record_json(target).unwrap_or_default();
    let record = tables.validatable(target).ok_or_else(missing)?;
    let amount = record.amount();
    let scope = ChangeScope {
        date: record.date(),
        users: record.beneficiaries(),
    };

    let audit_id = audit::record_status_change(tables, target, old_values, new_values, ctx, now);

    Ok(Committed {
        change: StatusChange {
            target,
            from,
            to,
            amount,
            audit_id,
            actor_id: actor.id,
        },
        scope,
        generated,
    })
}

fn has_live_entry(tables: &Tables, matches: impl Fn(&JaspelEntry) -> bool) -> bool {
    tables
        .jaspel_entries
        .iter()
        .any(|entry| entry.validation.status != ValidationStatus::Cancelled && matches(entry))
}

fn generated_entry(
    user_id: u64,
    template: &JaspelEntry,
    amount: Decimal,
) -> JaspelEntry {
    JaspelEntry {
        user_id,
        amount,
        ..template.clone()
    }
}

fn generate_procedure_entries(
    tables: &mut Tables,
    procedure_id: u64,
    actor: &User,
    now: DateTime<Utc>,
) -> Result<Vec<u64>> {
    let procedure = tables
        .procedures
        .get(procedure_id)
        .cloned()
        .ok_or_else(|| JaspelError::not_found("procedure", procedure_id))?;
    let procedure_type = tables
        .procedure_types
        .get(procedure.procedure_type_id)
        .ok_or_else(|| JaspelError::not_found("procedure_type", procedure.procedure_type_id))?;

    let split = calculate(ProcedureSplitPolicy(&SplitInput::for_procedure(
        &procedure,
        procedure_type,
    )));
    let template = JaspelEntry {
        id: 0,
        user_id: 0,
        date: procedure.date,
        entry_type: JaspelType::Procedure,
        procedure_id: Some(procedure_id),
        patient_count_id: None,
        amount: Decimal::ZERO,
        note: Some(format!("Jaspel tindakan {}", procedure_type.name)),
        validation: ValidationState::default(),
        input_by: actor.id,
        created_at: now,
    };

    let shares = [
        (procedure.doctor_id, split.jasa_dokter),
        (procedure.paramedic_id, split.jasa_paramedis),
        (procedure.non_paramedic_id, split.jasa_non_paramedis),
    ];

    let mut created = Vec::new();
    for (user_id, amount) in shares {
        let Some(user_id) = user_id else { continue };
        if amount <= Decimal::ZERO {
            continue;
        }
        if has_live_entry(tables, |entry| {
            entry.user_id == user_id && entry.procedure_id == Some(procedure_id)
        }) {
            log::debug!(
                target: "jaspel::validation",
                "procedure {} already has an entry for user {}",
                procedure_id,
                user_id
            );
            continue;
        }
        created.push(
            tables
                .jaspel_entries
                .insert(generated_entry(user_id, &template, amount)),
        );
    }
    Ok(created)
}

/// Price a patient count with its selected formula and store the fee on it.
/// Returns the fee and the shift of the formula used.
fn price_patient_count(
    tables: &mut Tables,
    record_id: u64,
    now: DateTime<Utc>,
) -> Result<(PatientCountFee, String)> {
    let record = tables
        .patient_counts
        .get(record_id)
        .ok_or_else(|| JaspelError::not_found("patient_count", record_id))?;
    let schedule = record.schedule_id.and_then(|id| tables.schedules.get(id));
    let formulas: Vec<FeeFormula> = tables.formulas.iter().cloned().collect();

    let selection = formula::select(record, schedule, &formulas)?;
    let fee = calculate(PatientCountPolicy {
        general: record.general,
        insurance: record.insurance,
        formula: selection.formula,
    });
    let shift = selection.formula.shift.clone();

    if let Some(stored) = tables.patient_counts.get_mut(record_id) {
        stored.fee = Some(fee.to_stored(now));
    }
    Ok((fee, shift))
}

/// Non-approval transitions still carry the fee to the financial log.
fn ensure_patient_count_fee(tables: &mut Tables, record_id: u64, now: DateTime<Utc>) {
    let priced = tables
        .patient_counts
        .get(record_id)
        .map_or(true, |record| record.fee.is_some());
    if priced {
        return;
    }
    if let Err(err) = price_patient_count(tables, record_id, now) {
        log::warn!(
            target: "jaspel::validation",
            "patient count {} could not be priced: {}",
            record_id,
            err
        );
    }
}

fn generate_patient_count_entry(
    tables: &mut Tables,
    record_id: u64,
    actor: &User,
    now: DateTime<Utc>,
) -> Result<Vec<u64>> {
    let (fee, shift) = price_patient_count(tables, record_id, now)?;
    let record = tables
        .patient_counts
        .get(record_id)
        .cloned()
        .ok_or_else(|| JaspelError::not_found("patient_count", record_id))?;

    if fee.total <= Decimal::ZERO
        || has_live_entry(tables, |entry| entry.patient_count_id == Some(record_id))
    {
        return Ok(Vec::new());
    }

    let entry = JaspelEntry {
        id: 0,
        user_id: record.doctor_id,
        date: record.date,
        entry_type: JaspelType::DailyPatients,
        procedure_id: None,
        patient_count_id: Some(record_id),
        amount: fee.total,
        note: Some(format!(
            "Jaspel pasien harian shift {} ({} pasien)",
            shift,
            record.total_patients()
        )),
        validation: ValidationState::default(),
        input_by: actor.id,
        created_at: now,
    };
    Ok(vec![tables.jaspel_entries.insert(entry)])
}
