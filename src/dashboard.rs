//! Cached aggregate read models for the dashboards.

use crate::cache::{Cache, CacheKeys};
use crate::config::CacheSettings;
use crate::error::{JaspelError, Result};
use crate::model::{JaspelType, Role, Validatable};
use crate::report::ReportFilter;
use crate::status::ValidationStatus;
use crate::store::{Database, Tables};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub revision: usize,
    pub cancelled: usize,
    pub total: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: ValidationStatus) {
        match status {
            ValidationStatus::Pending => self.pending += 1,
            ValidationStatus::Approved => self.approved += 1,
            ValidationStatus::Rejected => self.rejected += 1,
            ValidationStatus::Revision => self.revision += 1,
            ValidationStatus::Cancelled => self.cancelled += 1,
        }
        self.total += 1;
    }

    fn tally<'a, R: Validatable + 'a>(records: impl Iterator<Item = &'a R>) -> Self {
        let mut counts = Self::default();
        for record in records {
            counts.add(record.validation().status);
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationCounts {
    pub jaspel_entries: StatusCounts,
    pub procedures: StatusCounts,
    pub patient_counts: StatusCounts,
    /// Records waiting for a validator across all kinds
    pub awaiting_validation: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleCounts {
    pub role: Role,
    pub pending: usize,
    pub approved: usize,
    pub pending_amount: Decimal,
    pub approved_amount: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatientTotals {
    pub general: u64,
    pub insurance: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub approved_total: Decimal,
    pub approved_entries: usize,
    pub pending_entries: usize,
    pub by_role: BTreeMap<Role, Decimal>,
    pub by_type: BTreeMap<JaspelType, Decimal>,
    /// Patients of approved patient count records
    pub patients: PatientTotals,
    pub procedures: StatusCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub user_id: u64,
    pub name: String,
    pub role: Role,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub counts: StatusCounts,
    pub approved_total: Decimal,
    pub pending_total: Decimal,
    pub by_type: BTreeMap<JaspelType, Decimal>,
}

pub fn count_validations(tables: &Tables) -> ValidationCounts {
    let jaspel_entries = StatusCounts::tally(tables.jaspel_entries.iter());
    let procedures = StatusCounts::tally(tables.procedures.iter());
    let patient_counts = StatusCounts::tally(tables.patient_counts.iter());
    ValidationCounts {
        awaiting_validation: jaspel_entries.pending
            + procedures.pending
            + patient_counts.pending,
        jaspel_entries,
        procedures,
        patient_counts,
    }
}

pub fn count_for_role(tables: &Tables, role: Role) -> RoleCounts {
    let mut counts = RoleCounts {
        role,
        pending: 0,
        approved: 0,
        pending_amount: Decimal::ZERO,
        approved_amount: Decimal::ZERO,
    };
    let entries = tables
        .jaspel_entries
        .iter()
        .filter(|entry| tables.user(entry.user_id).is_some_and(|user| user.role == role));
    for entry in entries {
        match entry.validation.status {
            ValidationStatus::Pending => {
                counts.pending += 1;
                counts.pending_amount += entry.amount;
            }
            ValidationStatus::Approved => {
                counts.approved += 1;
                counts.approved_amount += entry.amount;
            }
            _ => {}
        }
    }
    counts
}

fn month_filter(year: i32, month: u32) -> Result<ReportFilter> {
    ReportFilter::for_month(year, month)
        .ok_or_else(|| JaspelError::BadRequest(format!("periode tidak valid: {}-{}", year, month)))
}

pub fn summarize_month(tables: &Tables, year: i32, month: u32) -> Result<MonthlySummary> {
    let filter = month_filter(year, month)?;
    let mut summary = MonthlySummary {
        year,
        month,
        approved_total: Decimal::ZERO,
        approved_entries: 0,
        pending_entries: 0,
        by_role: BTreeMap::new(),
        by_type: BTreeMap::new(),
        patients: PatientTotals::default(),
        procedures: StatusCounts::default(),
    };

    for entry in tables.jaspel_entries.iter() {
        if !filter.matches(entry, None) {
            continue;
        }
        match entry.validation.status {
            ValidationStatus::Approved => {
                summary.approved_entries += 1;
                summary.approved_total += entry.amount;
                *summary.by_type.entry(entry.entry_type).or_insert(Decimal::ZERO) += entry.amount;
                if let Some(user) = tables.user(entry.user_id) {
                    *summary.by_role.entry(user.role).or_insert(Decimal::ZERO) += entry.amount;
                }
            }
            ValidationStatus::Pending => summary.pending_entries += 1,
            _ => {}
        }
    }

    let in_month = |date: NaiveDate| {
        filter.from.is_some_and(|from| date >= from) && filter.to.is_some_and(|to| date <= to)
    };

    for record in tables.patient_counts.iter() {
        if in_month(record.date) && record.validation.is_approved() {
            summary.patients.general += u64::from(record.general);
            summary.patients.insurance += u64::from(record.insurance);
        }
    }
    summary.patients.total = summary.patients.general + summary.patients.insurance;

    summary.procedures =
        StatusCounts::tally(tables.procedures.iter().filter(|procedure| in_month(procedure.date)));

    Ok(summary)
}

pub fn summarize_user(
    tables: &Tables,
    user_id: u64,
    period: Option<(i32, u32)>,
) -> Result<UserSummary> {
    let user = tables
        .user(user_id)
        .ok_or_else(|| JaspelError::not_found("user", user_id))?;
    let mut filter = match period {
        Some((year, month)) => month_filter(year, month)?,
        None => ReportFilter::default(),
    };
    filter.user_id = Some(user_id);

    let mut summary = UserSummary {
        user_id,
        name: user.name.clone(),
        role: user.role,
        year: period.map(|(year, _)| year),
        month: period.map(|(_, month)| month),
        counts: StatusCounts::default(),
        approved_total: Decimal::ZERO,
        pending_total: Decimal::ZERO,
        by_type: BTreeMap::new(),
    };

    for entry in tables.jaspel_entries.iter().filter(|entry| filter.matches(entry, Some(user))) {
        summary.counts.add(entry.validation.status);
        match entry.validation.status {
            ValidationStatus::Approved => {
                summary.approved_total += entry.amount;
                *summary.by_type.entry(entry.entry_type).or_insert(Decimal::ZERO) += entry.amount;
            }
            ValidationStatus::Pending | ValidationStatus::Revision => {
                summary.pending_total += entry.amount
            }
            _ => {}
        }
    }
    Ok(summary)
}

/// Cached access to the read models above.
pub struct Dashboard<'a> {
    db: &'a Database,
    cache: &'a Cache,
    settings: &'a CacheSettings,
}

impl<'a> Dashboard<'a> {
    pub fn new(db: &'a Database, cache: &'a Cache, settings: &'a CacheSettings) -> Self {
        Self {
            db,
            cache,
            settings,
        }
    }

    pub fn validation_counts(&self) -> Result<ValidationCounts> {
        self.cache.remember(
            CacheKeys::VALIDATION_COUNTS,
            self.settings.counts_ttl(),
            || -> Result<ValidationCounts> { Ok(self.db.read(count_validations)?) },
        )
    }

    pub fn role_counts(&self, role: Role) -> Result<RoleCounts> {
        self.cache.remember(
            &CacheKeys::role_counts(role),
            self.settings.counts_ttl(),
            || -> Result<RoleCounts> { Ok(self.db.read(|tables| count_for_role(tables, role))?) },
        )
    }

    pub fn monthly_summary(&self, year: i32, month: u32) -> Result<MonthlySummary> {
        self.cache.remember(
            &CacheKeys::monthly_summary(year, month),
            self.settings.summary_ttl(),
            || -> Result<MonthlySummary> {
                self.db.read(|tables| summarize_month(tables, year, month))?
            },
        )
    }

    pub fn user_summary(&self, user_id: u64, period: Option<(i32, u32)>) -> Result<UserSummary> {
        self.cache.remember(
            &CacheKeys::user_summary(user_id, period),
            self.settings.user_summary_ttl(),
            || -> Result<UserSummary> {
                self.db.read(|tables| summarize_user(tables, user_id, period))?
            },
        )
    }
}
