use super::envelope::{created, ok};
use super::{ApiRequest, ApiResponse};
use crate::audit::{self, AuditContext};
use crate::error::{JaspelError, Result};
use crate::model::{
    FeeFormula, JaspelType, NewJaspelEntry, ProcedureType, RecordKind, RecordRef, Role, Schedule,
    User,
};
use crate::report::{self, ExportFormat, ReportFilter};
use crate::service::{
    require_validator, AppState, NewPatientCount, NewProcedure, PatientCountPreview,
    ProcedurePreview,
};
use crate::status::ValidationStatus;
use crate::validation::{TransitionOutcome, TransitionRequest};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

fn param<'p>(params: &[&'p str], index: usize) -> Result<&'p str> {
    params
        .get(index)
        .copied()
        .ok_or_else(|| JaspelError::BadRequest("parameter path tidak lengkap".into()))
}

fn id_param(params: &[&str], index: usize) -> Result<u64> {
    let raw = param(params, index)?;
    raw.parse()
        .map_err(|_| JaspelError::BadRequest(format!("id tidak valid: {}", raw)))
}

fn authenticate(state: &AppState, req: &ApiRequest) -> Result<User> {
    state.authenticate(req.actor_id())
}

fn audit_context(actor: &User, req: &ApiRequest) -> AuditContext {
    AuditContext::new(actor.id).with_request(req.client_ip(), Some(req.path.clone()))
}

fn filter_from_query(req: &ApiRequest) -> Result<ReportFilter> {
    Ok(ReportFilter {
        from: req.query_param::<NaiveDate>("from")?,
        to: req.query_param::<NaiveDate>("to")?,
        role: req.query_param::<Role>("role")?,
        user_id: req.query_param::<u64>("user_id")?,
        entry_type: req.query_param::<JaspelType>("type")?,
    })
}

/// `(year, month)` from the query; both or neither must be given.
fn period_from_query(req: &ApiRequest) -> Result<Option<(i32, u32)>> {
    match (req.query_param::<i32>("year")?, req.query_param::<u32>("month")?) {
        (Some(year), Some(month)) => Ok(Some((year, month))),
        (None, None) => Ok(None),
        _ => Err(JaspelError::BadRequest(
            "parameter year dan month harus diisi bersamaan".into(),
        )),
    }
}

pub(super) fn health(_state: &AppState, _req: &ApiRequest, _params: &[&str]) -> Result<ApiResponse> {
    Ok(ok(
        "OK",
        json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }),
    ))
}

pub(super) fn validated_jaspel_data(
    state: &AppState,
    req: &ApiRequest,
    _params: &[&str],
) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    let mut filter = filter_from_query(req)?;
    // staff only see their own validated jaspel
    if !actor.role.can_validate() {
        filter.user_id = Some(actor.id);
    }

    let rows = state
        .db
        .read(|tables| report::validated_jaspel(tables, &filter))?;
    let total: Decimal = rows.iter().map(|row| row.amount).sum();
    Ok(ok(
        "Data jaspel tervalidasi",
        json!({ "count": rows.len(), "total": total, "filter": filter, "rows": rows }),
    ))
}

pub(super) fn jaspel_report(state: &AppState, req: &ApiRequest, params: &[&str]) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    require_validator(&actor)?;
    let role: Role = param(params, 0)?.parse()?;
    let filter = filter_from_query(req)?;

    let report = state
        .db
        .read(|tables| report::role_report(tables, role, &filter))?;
    Ok(ok(format!("Laporan jaspel {}", role.label()), report))
}

pub(super) fn jaspel_summary(state: &AppState, req: &ApiRequest, params: &[&str]) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    let user_id = id_param(params, 0)?;
    if actor.id != user_id {
        require_validator(&actor)?;
    }
    let summary = state
        .dashboard()
        .user_summary(user_id, period_from_query(req)?)?;
    Ok(ok("Ringkasan jaspel", summary))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExportBody {
    format: ExportFormat,
    #[serde(flatten)]
    filter: ReportFilter,
}

pub(super) fn jaspel_export(state: &AppState, req: &ApiRequest, _params: &[&str]) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    require_validator(&actor)?;
    let body: ExportBody = if req.body.is_empty() {
        ExportBody::default()
    } else {
        req.json()?
    };

    let export = state
        .db
        .read(|tables| report::export(tables, &body.filter, body.format, Utc::now()))??;

    Ok(
        ApiResponse::raw(200, export.content_type(), export.body.clone())
            .with_header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", export.filename),
            )
            .with_header("X-Checksum-Sha256", export.checksum.clone())
            .with_header("X-Export-Rows", export.rows.to_string()),
    )
}

pub(super) fn validation_counts(
    state: &AppState,
    req: &ApiRequest,
    _params: &[&str],
) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    let dashboard = state.dashboard();
    let counts = dashboard.validation_counts()?;

    let role = match req.query_param::<Role>("role")? {
        Some(role) if actor.role.can_validate() => Some(role),
        Some(_) => return Err(JaspelError::Forbidden("hanya validator yang dapat memilih peran".into())),
        None if actor.role.is_earning() => Some(actor.role),
        None => None,
    };
    let role_counts = role.map(|role| dashboard.role_counts(role)).transpose()?;

    Ok(ok(
        "Jumlah validasi",
        json!({ "counts": counts, "role": role_counts }),
    ))
}

pub(super) fn clear_cache(state: &AppState, req: &ApiRequest, _params: &[&str]) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    require_validator(&actor)?;
    let cleared = state.cache.flush();
    log::info!(target: "jaspel::cache", "cache flushed by user {} ({} entries)", actor.id, cleared);
    Ok(ok("Cache validasi dibersihkan", json!({ "cleared": cleared })))
}

pub(super) fn create_jaspel(state: &AppState, req: &ApiRequest, _params: &[&str]) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    let input: NewJaspelEntry = req.json()?;
    let created_entry = state.records().create_entry(&actor, input)?;
    let message = if created_entry.warnings.is_empty() {
        "Data jaspel tersimpan"
    } else {
        "Data jaspel tersimpan dengan peringatan"
    };
    Ok(created(message, created_entry))
}

#[derive(Debug, Deserialize)]
struct TransitionBody {
    status: String,
    #[serde(default)]
    note: Option<String>,
}

fn transition_message(outcome: &TransitionOutcome) -> &'static str {
    if outcome.changed() {
        "Status validasi diperbarui"
    } else {
        "Status validasi tidak berubah"
    }
}

pub(super) fn validate(state: &AppState, req: &ApiRequest, params: &[&str]) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    let kind: RecordKind = param(params, 0)?.parse()?;
    let id = id_param(params, 1)?;
    let body: TransitionBody = req.json()?;

    let request = TransitionRequest {
        target: RecordRef::new(kind, id),
        status: ValidationStatus::normalize(&body.status)?,
        note: body.note,
    };
    let outcome = state
        .workflow()
        .transition(&actor, &audit_context(&actor, req), &request)?;
    Ok(ok(transition_message(&outcome), outcome))
}

#[derive(Debug, Deserialize)]
struct BulkTarget {
    kind: String,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct BulkBody {
    items: Vec<BulkTarget>,
    status: String,
    #[serde(default)]
    note: Option<String>,
}

pub(super) fn bulk_validate(state: &AppState, req: &ApiRequest, _params: &[&str]) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    let body: BulkBody = req.json()?;
    if body.items.is_empty() {
        return Err(JaspelError::validation("items", "Pilih minimal satu data"));
    }
    let status = ValidationStatus::normalize(&body.status)?;
    let targets = body
        .items
        .iter()
        .map(|item| -> Result<RecordRef> { Ok(RecordRef::new(item.kind.parse()?, item.id)) })
        .collect::<Result<Vec<_>>>()?;

    let items = state.workflow().bulk_transition(
        &actor,
        &audit_context(&actor, req),
        &targets,
        status,
        body.note.as_deref(),
    );
    let succeeded = items.iter().filter(|item| item.success).count();
    let failed = items.len() - succeeded;
    Ok(ok(
        format!("{} data berhasil, {} gagal", succeeded, failed),
        json!({ "succeeded": succeeded, "failed": failed, "items": items }),
    ))
}

pub(super) fn audit_history(state: &AppState, req: &ApiRequest, params: &[&str]) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    require_validator(&actor)?;
    let kind: RecordKind = param(params, 0)?.parse()?;
    let target = RecordRef::new(kind, id_param(params, 1)?);

    let trail = state.db.read(|tables| {
        tables
            .validatable(target)
            .map(|_| audit::history(tables, target))
    })?;
    let trail = trail.ok_or_else(|| JaspelError::not_found(kind.as_str(), target.id))?;
    Ok(ok("Riwayat audit", trail))
}

pub(super) fn preview_patient_count(
    state: &AppState,
    req: &ApiRequest,
    _params: &[&str],
) -> Result<ApiResponse> {
    authenticate(state, req)?;
    let preview: PatientCountPreview = req.json()?;
    let fee = state.records().preview_patient_count(&preview)?;
    Ok(ok("Perhitungan jaspel pasien", fee))
}

pub(super) fn preview_procedure(
    state: &AppState,
    req: &ApiRequest,
    _params: &[&str],
) -> Result<ApiResponse> {
    authenticate(state, req)?;
    let preview: ProcedurePreview = req.json()?;
    let split = state.records().preview_procedure(&preview)?;
    Ok(ok("Perhitungan jaspel tindakan", split))
}

pub(super) fn dashboard_summary(
    state: &AppState,
    req: &ApiRequest,
    _params: &[&str],
) -> Result<ApiResponse> {
    authenticate(state, req)?;
    let (year, month) = match period_from_query(req)? {
        Some(period) => period,
        None => {
            let today = Utc::now().date_naive();
            (today.year(), today.month())
        }
    };
    let summary = state.dashboard().monthly_summary(year, month)?;
    Ok(ok("Ringkasan dashboard", summary))
}

pub(super) fn create_user(state: &AppState, req: &ApiRequest, _params: &[&str]) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    let user: User = req.json()?;
    let user = state.records().create_user(&actor, user)?;
    Ok(created("Pengguna tersimpan", user))
}

pub(super) fn create_formula(state: &AppState, req: &ApiRequest, _params: &[&str]) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    let formula: FeeFormula = req.json()?;
    let formula = state.records().create_formula(&actor, formula)?;
    Ok(created("Formula jaspel tersimpan", formula))
}

pub(super) fn create_procedure_type(
    state: &AppState,
    req: &ApiRequest,
    _params: &[&str],
) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    let procedure_type: ProcedureType = req.json()?;
    let procedure_type = state
        .records()
        .create_procedure_type(&actor, procedure_type)?;
    Ok(created("Jenis tindakan tersimpan", procedure_type))
}

pub(super) fn create_schedule(state: &AppState, req: &ApiRequest, _params: &[&str]) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    let schedule: Schedule = req.json()?;
    let schedule = state.records().create_schedule(&actor, schedule)?;
    Ok(created("Jadwal jaga tersimpan", schedule))
}

pub(super) fn submit_procedure(
    state: &AppState,
    req: &ApiRequest,
    _params: &[&str],
) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    let input: NewProcedure = req.json()?;
    let procedure = state.records().submit_procedure(&actor, input)?;
    Ok(created("Tindakan tersimpan", procedure))
}

pub(super) fn submit_patient_count(
    state: &AppState,
    req: &ApiRequest,
    _params: &[&str],
) -> Result<ApiResponse> {
    let actor = authenticate(state, req)?;
    let input: NewPatientCount = req.json()?;
    let record = state.records().submit_patient_count(&actor, input)?;
    Ok(created("Jumlah pasien tersimpan", record))
}
