//! Audit trail for validation status changes.
//!
//! Each status change leaves an [`AuditRecord`] in the store (inside the same
//! transaction as the change) and, once committed, one structured line on the
//! `jaspel::audit` log target. Records that carry an amount are also written
//! to the `jaspel::financial` target so finance can follow money-relevant
//! decisions on a dedicated channel.

use crate::model::{RecordKind, RecordRef};
use crate::status::ValidationStatus;
use crate::store::Tables;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const AUDIT_TARGET: &str = "jaspel::audit";
pub const FINANCIAL_TARGET: &str = "jaspel::financial";

/// Who performed a change and from where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub actor_id: u64,
    pub ip: Option<String>,
    pub url: Option<String>,
}

impl AuditContext {
    pub fn new(actor_id: u64) -> Self {
        Self {
            actor_id,
            ..Self::default()
        }
    }

    pub fn with_request(mut self, ip: Option<String>, url: Option<String>) -> Self {
        self.ip = ip;
        self.url = url;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    StatusChanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub kind: RecordKind,
    pub record_id: u64,
    pub event: AuditEvent,
    pub old_values: serde_json::Value,
    pub new_values: serde_json::Value,
    pub actor_id: u64,
    pub ip: Option<String>,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A committed status change, ready to be logged.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub target: RecordRef,
    pub from: ValidationStatus,
    pub to: ValidationStatus,
    pub amount: Option<Decimal>,
    pub audit_id: Uuid,
    pub actor_id: u64,
}

/// Append the audit record of a status change to the staged tables.
pub fn record_status_change(
    tables: &mut Tables,
    target: RecordRef,
    old_values: serde_json::Value,
    new_values: serde_json::Value,
    ctx: &AuditContext,
    at: DateTime<Utc>,
) -> Uuid {
    let id = Uuid::new_v4();
    tables.audit_log.push(AuditRecord {
        id,
        kind: target.kind,
        record_id: target.id,
        event: AuditEvent::StatusChanged,
        old_values,
        new_values,
        actor_id: ctx.actor_id,
        ip: ctx.ip.clone(),
        url: ctx.url.clone(),
        created_at: at,
    });
    id
}

/// Emit the log lines of a committed change.
pub fn log_status_change(change: &StatusChange) {
    log::info!(
        target: AUDIT_TARGET,
        "status_changed record={} from={} to={} actor={} audit_id={}",
        change.target,
        change.from,
        change.to,
        change.actor_id,
        change.audit_id
    );
    if let Some(line) = financial_line(change) {
        log::info!(target: FINANCIAL_TARGET, "{}", line);
    }
}

/// Line for the financial channel; `None` when the record carries no amount.
pub fn financial_line(change: &StatusChange) -> Option<String> {
    change.amount.map(|amount| {
        format!(
            "status_changed record={} from={} to={} amount={} actor={}",
            change.target, change.from, change.to, amount, change.actor_id
        )
    })
}

/// Audit trail of one record, oldest first.
pub fn history(tables: &Tables, target: RecordRef) -> Vec<AuditRecord> {
    tables
        .audit_log
        .iter()
        .filter(|record| record.kind == target.kind && record.record_id == target.id)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_status_change_appends_to_log() {
        let mut tables = Tables::default();
        let target = RecordRef::new(RecordKind::JaspelEntry, 3);
        let ctx = AuditContext::new(9).with_request(
            Some("10.0.0.7".into()),
            Some("/api/v2/validations/jaspel/3".into()),
        );

        let id = record_status_change(
            &mut tables,
            target,
            json!({"status": "pending"}),
            json!({"status": "approved"}),
            &ctx,
            Utc::now(),
        );

        let trail = history(&tables, target);
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].id, id);
        assert_eq!(trail[0].actor_id, 9);
        assert_eq!(trail[0].ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(trail[0].new_values["status"], "approved");
        assert!(history(&tables, RecordRef::new(RecordKind::Procedure, 3)).is_empty());
    }

    #[test]
    fn test_financial_line_needs_an_amount() {
        let mut change = StatusChange {
            target: RecordRef::new(RecordKind::PatientCount, 4),
            from: ValidationStatus::Pending,
            to: ValidationStatus::Rejected,
            amount: Some(Decimal::from(92_000)),
            audit_id: Uuid::new_v4(),
            actor_id: 2,
        };
        let line = financial_line(&change).unwrap();
        assert!(line.contains("to=rejected"));
        assert!(line.contains("amount=92000"));

        change.amount = None;
        assert!(financial_line(&change).is_none());
    }
}
