//! End-to-end tests driving the API router against an in-memory store.
//!
//! Each test builds its own state: a bootstrap admin, a treasurer who
//! validates, and the three earning roles.

use jaspel::api::{ApiRequest, ApiResponse, Router};
use jaspel::{AppConfig, AppState};
use rust_decimal::Decimal;
use serde_json::{json, Value};

// ============================================================================
// Fixture
// ============================================================================

struct Clinic {
    router: Router,
    treasurer: u64,
    doctor: u64,
    paramedic: u64,
    non_paramedic: u64,
}

fn send(router: &Router, request: ApiRequest) -> (u16, Value) {
    let response = router.handle(request);
    (response.status, response.body_json())
}

fn id_of(body: &Value) -> u64 {
    body["data"]["id"].as_u64().expect("response carries an id")
}

fn decimal(value: &Value) -> Decimal {
    value.as_str().expect("decimal as string").parse().unwrap()
}

fn clinic() -> Clinic {
    let state = AppState::in_memory(AppConfig::default());
    let admin = state.bootstrap().unwrap().expect("store starts empty");
    let router = Router::new(state);

    let add = |name: &str, role: &str| {
        let (status, body) = send(
            &router,
            ApiRequest::post("/api/v2/users")
                .with_actor(admin)
                .with_json(&json!({ "name": name, "role": role })),
        );
        assert_eq!(status, 201, "{}", body);
        id_of(&body)
    };
    let treasurer = add("Bu Rina", "bendahara");
    let doctor = add("dr. Andi", "dokter");
    let paramedic = add("Sri", "paramedis");
    let non_paramedic = add("Budi", "non_paramedis");

    Clinic {
        router,
        treasurer,
        doctor,
        paramedic,
        non_paramedic,
    }
}

impl Clinic {
    fn submit_procedure(&self) -> u64 {
        let (status, body) = send(
            &self.router,
            ApiRequest::post("/api/v2/procedure-types")
                .with_actor(self.treasurer)
                .with_json(&json!({
                    "code": "T-001",
                    "name": "Perawatan luka",
                    "base_tariff": "30000",
                    "category": "tindakan",
                    "complexity": "standard"
                })),
        );
        assert_eq!(status, 201, "{}", body);
        let type_id = id_of(&body);

        let (status, body) = send(
            &self.router,
            ApiRequest::post("/api/v2/procedures")
                .with_actor(self.paramedic)
                .with_json(&json!({
                    "procedure_type_id": type_id,
                    "patient_name": "Pasien A",
                    "date": "2024-06-10",
                    "paramedic_id": self.paramedic,
                    "non_paramedic_id": self.non_paramedic
                })),
        );
        assert_eq!(status, 201, "{}", body);
        assert_eq!(body["data"]["validation"]["status"], "pending");
        id_of(&body)
    }

    fn validate(&self, actor: u64, kind: &str, id: u64, body: Value) -> (u16, Value) {
        send(
            &self.router,
            ApiRequest::post(&format!("/api/v2/validations/{}/{}", kind, id))
                .with_actor(actor)
                .with_json(&body),
        )
    }

    fn create_entry(&self, actor: u64, user_id: u64, date: &str, amount: &str) -> (u16, Value) {
        send(
            &self.router,
            ApiRequest::post("/api/v2/jaspel")
                .with_actor(actor)
                .with_json(&json!({
                    "user_id": user_id,
                    "date": date,
                    "entry_type": "shift",
                    "amount": amount
                })),
        )
    }

    fn pending_entries(&self) -> u64 {
        let (status, body) = send(
            &self.router,
            ApiRequest::get("/api/v2/validation-counts").with_actor(self.treasurer),
        );
        assert_eq!(status, 200, "{}", body);
        body["data"]["counts"]["jaspel_entries"]["pending"]
            .as_u64()
            .unwrap()
    }
}

// ============================================================================
// Authentication and routing
// ============================================================================

#[test]
fn test_missing_actor_is_unauthenticated() {
    let clinic = clinic();
    let (status, body) = send(&clinic.router, ApiRequest::get("/api/v2/validation-counts"));
    assert_eq!(status, 401);
    assert_eq!(body["success"], false);

    let (status, _) = send(
        &clinic.router,
        ApiRequest::get("/api/v2/validation-counts").with_actor(9_999),
    );
    assert_eq!(status, 401);
}

#[test]
fn test_health_needs_no_actor() {
    let clinic = clinic();
    let (status, body) = send(&clinic.router, ApiRequest::get("/health"));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "ok");
}

#[test]
fn test_unknown_route_and_wrong_method() {
    let clinic = clinic();
    let (status, _) = send(&clinic.router, ApiRequest::get("/api/v2/nothing-here"));
    assert_eq!(status, 404);
    let (status, _) = send(
        &clinic.router,
        ApiRequest::get("/api/v2/jaspel").with_actor(clinic.treasurer),
    );
    assert_eq!(status, 405);
}

#[test]
fn test_staff_cannot_export_or_clear_cache() {
    let clinic = clinic();
    let (status, _) = send(
        &clinic.router,
        ApiRequest::post("/api/v2/jaspel-export").with_actor(clinic.paramedic),
    );
    assert_eq!(status, 403);
    let (status, _) = send(
        &clinic.router,
        ApiRequest::post("/api/v2/validation-cache/clear").with_actor(clinic.doctor),
    );
    assert_eq!(status, 403);
}

// ============================================================================
// Validation workflow
// ============================================================================

#[test]
fn test_approving_procedure_generates_split_entries() {
    let clinic = clinic();
    let procedure = clinic.submit_procedure();

    let (status, body) = clinic.validate(
        clinic.treasurer,
        "tindakan",
        procedure,
        json!({ "status": "disetujui" }),
    );
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["outcome"], "transitioned");
    assert_eq!(body["data"]["to"], "approved");
    assert_eq!(body["data"]["generated_entries"].as_array().unwrap().len(), 2);

    // generated entries start pending; approve them so they show up as validated
    for id in body["data"]["generated_entries"].as_array().unwrap() {
        let (status, body) = clinic.validate(
            clinic.treasurer,
            "jaspel",
            id.as_u64().unwrap(),
            json!({ "status": "approved" }),
        );
        assert_eq!(status, 200, "{}", body);
    }

    let (status, body) = send(
        &clinic.router,
        ApiRequest::get("/api/v2/validated-jaspel-data").with_actor(clinic.treasurer),
    );
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["count"], 2);
    assert_eq!(decimal(&body["data"]["total"]), Decimal::from(21_000));

    // staff only see their own share
    let (_, body) = send(
        &clinic.router,
        ApiRequest::get("/api/v2/validated-jaspel-data").with_actor(clinic.paramedic),
    );
    assert_eq!(body["data"]["count"], 1);
    assert_eq!(decimal(&body["data"]["total"]), Decimal::from(16_800));
}

#[test]
fn test_synonym_of_current_status_is_a_noop() {
    let clinic = clinic();
    let procedure = clinic.submit_procedure();
    clinic.validate(
        clinic.treasurer,
        "procedure",
        procedure,
        json!({ "status": "approved" }),
    );

    let (status, body) = clinic.validate(
        clinic.treasurer,
        "procedure",
        procedure,
        json!({ "status": "Tervalidasi" }),
    );
    assert_eq!(status, 200);
    assert_eq!(body["data"]["outcome"], "unchanged");

    let (status, body) = send(
        &clinic.router,
        ApiRequest::get(&format!("/api/v2/audit/procedure/{}", procedure))
            .with_actor(clinic.treasurer),
    );
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[test]
fn test_unknown_status_and_terminal_transition_are_rejected() {
    let clinic = clinic();
    let procedure = clinic.submit_procedure();

    let (status, body) = clinic.validate(
        clinic.treasurer,
        "procedure",
        procedure,
        json!({ "status": "mungkin" }),
    );
    assert_eq!(status, 422);
    assert!(body["errors"]["status"].is_array());

    clinic.validate(
        clinic.treasurer,
        "procedure",
        procedure,
        json!({ "status": "approved" }),
    );
    let (status, body) = clinic.validate(
        clinic.treasurer,
        "procedure",
        procedure,
        json!({ "status": "pending" }),
    );
    assert_eq!(status, 422);
    assert_eq!(body["success"], false);
}

#[test]
fn test_staff_cannot_approve() {
    let clinic = clinic();
    let procedure = clinic.submit_procedure();
    let (status, _) = clinic.validate(
        clinic.doctor,
        "procedure",
        procedure,
        json!({ "status": "approved" }),
    );
    assert_eq!(status, 403);
}

#[test]
fn test_rejection_needs_a_note() {
    let clinic = clinic();
    let procedure = clinic.submit_procedure();
    let (status, _) = clinic.validate(
        clinic.treasurer,
        "procedure",
        procedure,
        json!({ "status": "ditolak" }),
    );
    assert_eq!(status, 422);

    let (status, body) = clinic.validate(
        clinic.treasurer,
        "procedure",
        procedure,
        json!({ "status": "ditolak", "note": "Tarif tidak sesuai" }),
    );
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["to"], "rejected");
}

#[test]
fn test_approving_patient_count_generates_entry() {
    let clinic = clinic();
    let (status, body) = send(
        &clinic.router,
        ApiRequest::post("/api/v2/fee-formulas")
            .with_actor(clinic.treasurer)
            .with_json(&json!({
                "shift": "pagi",
                "threshold": 10,
                "fee_general": "5000",
                "fee_insurance": "3000",
                "sitting_fee": "50000"
            })),
    );
    assert_eq!(status, 201, "{}", body);

    let (status, body) = send(
        &clinic.router,
        ApiRequest::post("/api/v2/patient-counts")
            .with_actor(clinic.doctor)
            .with_json(&json!({
                "date": "2024-06-10",
                "doctor_id": clinic.doctor,
                "general": 12,
                "insurance": 8,
                "shift": "pagi"
            })),
    );
    assert_eq!(status, 201, "{}", body);
    let record = id_of(&body);

    let (status, body) = clinic.validate(
        clinic.treasurer,
        "patient_count",
        record,
        json!({ "status": "approved" }),
    );
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["generated_entries"].as_array().unwrap().len(), 1);
}

#[test]
fn test_bulk_reports_each_item() {
    let clinic = clinic();
    let (_, first) = clinic.create_entry(clinic.doctor, clinic.doctor, "2024-06-10", "175500");
    let (_, second) = clinic.create_entry(clinic.doctor, clinic.doctor, "2024-06-11", "175500");

    let (status, body) = send(
        &clinic.router,
        ApiRequest::post("/api/v2/validations/bulk")
            .with_actor(clinic.treasurer)
            .with_json(&json!({
                "status": "approved",
                "items": [
                    { "kind": "jaspel", "id": first["data"]["entry"]["id"] },
                    { "kind": "jaspel", "id": second["data"]["entry"]["id"] },
                    { "kind": "jaspel", "id": 4242 }
                ]
            })),
    );
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["succeeded"], 2);
    assert_eq!(body["data"]["failed"], 1);
    assert_eq!(body["data"]["items"][2]["success"], false);

    let (status, body) = send(
        &clinic.router,
        ApiRequest::post("/api/v2/validations/bulk")
            .with_actor(clinic.treasurer)
            .with_json(&json!({ "status": "approved", "items": [] })),
    );
    assert_eq!(status, 422);
    assert!(body["errors"]["items"].is_array());
}

// ============================================================================
// Jaspel entries, cache and export
// ============================================================================

#[test]
fn test_duplicate_entry_is_rejected() {
    let clinic = clinic();
    let (status, body) = clinic.create_entry(clinic.doctor, clinic.doctor, "2024-06-10", "175500");
    assert_eq!(status, 201, "{}", body);
    assert!(body["data"]["warnings"].as_array().unwrap().is_empty());

    let (status, body) = clinic.create_entry(clinic.doctor, clinic.doctor, "2024-06-10", "175500");
    assert_eq!(status, 422);
    assert!(body["errors"].is_object());
}

#[test]
fn test_doctor_cannot_enter_jaspel_for_colleague() {
    let clinic = clinic();
    let (status, _) = clinic.create_entry(clinic.doctor, clinic.paramedic, "2024-06-10", "175500");
    assert_eq!(status, 403);
}

#[test]
fn test_new_entry_refreshes_validation_counts() {
    let clinic = clinic();
    assert_eq!(clinic.pending_entries(), 0);

    let (status, _) = clinic.create_entry(clinic.doctor, clinic.doctor, "2024-06-10", "175500");
    assert_eq!(status, 201);
    assert_eq!(clinic.pending_entries(), 1);
}

#[test]
fn test_export_csv_of_validated_entries() {
    let clinic = clinic();
    let (_, body) = clinic.create_entry(clinic.doctor, clinic.doctor, "2024-06-10", "175500");
    let entry = body["data"]["entry"]["id"].as_u64().unwrap();
    clinic.validate(clinic.treasurer, "jaspel", entry, json!({ "status": "approved" }));

    let response: ApiResponse = clinic.router.handle(
        ApiRequest::post("/api/v2/jaspel-export")
            .with_actor(clinic.treasurer)
            .with_json(&json!({ "format": "csv" })),
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.content_type, "text/csv; charset=utf-8");

    let header = |name: &str| {
        response
            .headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    };
    assert_eq!(header("X-Export-Rows").as_deref(), Some("1"));
    assert_eq!(header("X-Checksum-Sha256").map(|sum| sum.len()), Some(64));

    let csv = String::from_utf8(response.body).unwrap();
    assert!(csv.starts_with("Tanggal"));
    assert!(csv.contains("dr. Andi"));
}
