//! Tracing spans are forwarded to the `log` facade, so the server's
//! env_logger sees them without a tracing subscriber.
#![cfg(feature = "tracing")]

use jaspel::calculation::{calculate, ProcedureSplitPolicy, SplitInput};
use jaspel::model::{Complexity, ProcedureCategory};
use log::{LevelFilter, Log, Metadata, Record};
use rust_decimal::Decimal;
use std::sync::Mutex;

static RECORDS: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());

struct Capture;

impl Log for Capture {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        RECORDS
            .lock()
            .unwrap()
            .push((record.target().to_string(), record.args().to_string()));
    }

    fn flush(&self) {}
}

static LOGGER: Capture = Capture;

#[test]
fn test_calculation_span_reaches_log() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Trace);

    let split = calculate(ProcedureSplitPolicy(&SplitInput {
        base_tariff: Decimal::from(30_000),
        complexity: Complexity::Standard,
        category: ProcedureCategory::Tindakan,
        requires_doctor: false,
        percentage_override: None,
    }));
    assert_eq!(split.total_jaspel, Decimal::from(21_000));

    let records = RECORDS.lock().unwrap();
    assert!(records
        .iter()
        .any(|(_, message)| message.contains("jaspel.calculation")));
    assert!(records
        .iter()
        .any(|(target, _)| target.starts_with("tracing::span")));
    assert!(records
        .iter()
        .any(|(target, _)| target == "jaspel::calculation"));
}
