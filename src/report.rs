//! Validated jaspel listings, role reports and exports.
//!
//! Only approved JaspelEntries appear in reports. Exports are rendered as CSV
//! (via the `csv` crate) or as a print-ready HTML page, and carry a SHA-256
//! checksum of the rendered body.

use crate::error::{JaspelError, Result};
use crate::model::{JaspelEntry, JaspelType, Role, User};
use crate::status::ValidationStatus;
use crate::store::Tables;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Format an amount as Indonesian rupiah, e.g. `Rp 1.250.000` or `Rp 4.200,50`.
pub fn rupiah(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let abs = rounded.abs();
    let whole = abs.trunc();
    let cents = ((abs - whole) * Decimal::ONE_HUNDRED).trunc();

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    if cents.is_zero() {
        format!("{}Rp {}", sign, grouped)
    } else {
        format!("{}Rp {},{:0>2}", sign, grouped, cents.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub role: Option<Role>,
    pub user_id: Option<u64>,
    #[serde(rename = "type")]
    pub entry_type: Option<JaspelType>,
}

impl ReportFilter {
    pub fn for_month(year: i32, month: u32) -> Option<Self> {
        let from = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self {
            from: Some(from),
            to: next.pred_opt(),
            ..Self::default()
        })
    }

    pub fn matches(&self, entry: &JaspelEntry, user: Option<&User>) -> bool {
        if self.from.is_some_and(|from| entry.date < from) {
            return false;
        }
        if self.to.is_some_and(|to| entry.date > to) {
            return false;
        }
        if self.user_id.is_some_and(|id| entry.user_id != id) {
            return false;
        }
        if self.entry_type.is_some_and(|t| entry.entry_type != t) {
            return false;
        }
        match self.role {
            Some(role) => user.is_some_and(|user| user.role == role),
            None => true,
        }
    }
}

/// One approved JaspelEntry with its user and validator resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedRow {
    pub entry_id: u64,
    pub date: NaiveDate,
    pub user_id: u64,
    pub user_name: String,
    pub role: Option<Role>,
    pub entry_type: JaspelType,
    pub amount: Decimal,
    pub note: Option<String>,
    pub validated_by: Option<u64>,
    pub validated_by_name: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
}

/// Approved entries matching `filter`, ordered by date then id.
pub fn validated_jaspel(tables: &Tables, filter: &ReportFilter) -> Vec<ValidatedRow> {
    let mut rows: Vec<ValidatedRow> = tables
        .jaspel_entries
        .iter()
        .filter(|entry| entry.validation.status == ValidationStatus::Approved)
        .filter_map(|entry| {
            let user = tables.user(entry.user_id);
            if !filter.matches(entry, user) {
                return None;
            }
            let validator = entry.validation.validated_by.and_then(|id| tables.user(id));
            Some(ValidatedRow {
                entry_id: entry.id,
                date: entry.date,
                user_id: entry.user_id,
                user_name: user.map(|u| u.name.clone()).unwrap_or_default(),
                role: user.map(|u| u.role),
                entry_type: entry.entry_type,
                amount: entry.amount,
                note: entry.note.clone(),
                validated_by: entry.validation.validated_by,
                validated_by_name: validator.map(|u| u.name.clone()),
                validated_at: entry.validation.validated_at,
            })
        })
        .collect();
    rows.sort_by(|a, b| a.date.cmp(&b.date).then(a.entry_id.cmp(&b.entry_id)));
    rows
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserTotal {
    pub user_id: u64,
    pub name: String,
    pub entries: usize,
    pub total: Decimal,
    pub by_type: BTreeMap<JaspelType, Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleReport {
    pub role: Role,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub users: Vec<UserTotal>,
    pub entries: usize,
    pub total: Decimal,
}

/// Approved totals per user of `role`, highest total first.
pub fn role_report(tables: &Tables, role: Role, filter: &ReportFilter) -> RoleReport {
    let filter = ReportFilter {
        role: Some(role),
        ..filter.clone()
    };

    let mut per_user: BTreeMap<u64, UserTotal> = BTreeMap::new();
    for row in validated_jaspel(tables, &filter) {
        let slot = per_user.entry(row.user_id).or_insert_with(|| UserTotal {
            user_id: row.user_id,
            name: row.user_name.clone(),
            entries: 0,
            total: Decimal::ZERO,
            by_type: BTreeMap::new(),
        });
        slot.entries += 1;
        slot.total += row.amount;
        *slot.by_type.entry(row.entry_type).or_insert(Decimal::ZERO) += row.amount;
    }

    let mut users: Vec<UserTotal> = per_user.into_values().collect();
    users.sort_by(|a, b| b.total.cmp(&a.total).then(a.user_id.cmp(&b.user_id)));

    RoleReport {
        role,
        from: filter.from,
        to: filter.to,
        entries: users.iter().map(|u| u.entries).sum(),
        total: users.iter().map(|u| u.total).sum(),
        users,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Html,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Html => "text/html; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Html => "html",
        }
    }
}

/// A rendered export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Export {
    pub format: ExportFormat,
    pub filename: String,
    pub rows: usize,
    pub total: Decimal,
    pub checksum: String,
    #[serde(skip)]
    pub body: Vec<u8>,
}

impl Export {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

const COLUMNS: [&str; 8] = [
    "Tanggal",
    "Nama",
    "Peran",
    "Jenis",
    "Jumlah",
    "Keterangan",
    "Divalidasi Oleh",
    "Waktu Validasi",
];

fn row_cells(row: &ValidatedRow) -> [String; 8] {
    [
        row.date.format("%Y-%m-%d").to_string(),
        row.user_name.clone(),
        row.role.map(|r| r.label().to_string()).unwrap_or_default(),
        row.entry_type.label().to_string(),
        row.amount.to_string(),
        row.note.clone().unwrap_or_default(),
        row.validated_by_name.clone().unwrap_or_default(),
        row.validated_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default(),
    ]
}

/// Quote cells a spreadsheet would otherwise evaluate as a formula.
fn csv_cell(value: String) -> String {
    match value.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{}", value),
        _ => value,
    }
}

fn render_csv(rows: &[ValidatedRow], total: Decimal) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let export_err = |e: csv::Error| JaspelError::Export(e.to_string());

    writer.write_record(COLUMNS).map_err(export_err)?;
    for row in rows {
        writer
            .write_record(row_cells(row).map(csv_cell))
            .map_err(export_err)?;
    }
    let total = total.to_string();
    writer
        .write_record(["", "", "", "Total", total.as_str(), "", "", ""])
        .map_err(export_err)?;

    writer
        .into_inner()
        .map_err(|e| JaspelError::Export(e.to_string()))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn period_label(filter: &ReportFilter) -> String {
    let day = |d: Option<NaiveDate>| {
        d.map(|d| d.format("%d-%m-%Y").to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    format!("{} s/d {}", day(filter.from), day(filter.to))
}

fn render_html(rows: &[ValidatedRow], total: Decimal, filter: &ReportFilter, at: DateTime<Utc>) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"id\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>Laporan Jaspel Tervalidasi</title>\n<style>\n");
    html.push_str("body{font-family:Arial,sans-serif;font-size:12px;margin:24px}\n");
    html.push_str("table{border-collapse:collapse;width:100%}\n");
    html.push_str("th,td{border:1px solid #999;padding:4px 6px}\n");
    html.push_str("th{background:#eee}td.num{text-align:right}\n");
    html.push_str("@page{size:A4 landscape;margin:12mm}\n");
    html.push_str("</style>\n</head>\n<body>\n");
    html.push_str("<h1>Laporan Jaspel Tervalidasi</h1>\n");
    // write! into a String cannot fail
    let _ = writeln!(
        html,
        "<p>Periode: {}<br>Dicetak: {}</p>",
        escape_html(&period_label(filter)),
        at.format("%d-%m-%Y %H:%M UTC")
    );

    html.push_str("<table>\n<thead><tr>");
    for column in COLUMNS {
        let _ = write!(html, "<th>{}</th>", column);
    }
    html.push_str("</tr></thead>\n<tbody>\n");

    for row in rows {
        let cells = row_cells(row);
        html.push_str("<tr>");
        for (i, cell) in cells.iter().enumerate() {
            if i == 4 {
                let _ = write!(html, "<td class=\"num\">{}</td>", escape_html(&rupiah(row.amount)));
            } else {
                let _ = write!(html, "<td>{}</td>", escape_html(cell));
            }
        }
        html.push_str("</tr>\n");
    }

    let _ = writeln!(
        html,
        "</tbody>\n<tfoot><tr><th colspan=\"4\">Total</th><th class=\"num\">{}</th><th colspan=\"3\"></th></tr></tfoot>\n</table>",
        escape_html(&rupiah(total))
    );
    html.push_str("</body>\n</html>\n");
    html
}

/// Render the validated rows matching `filter`.
pub fn export(
    tables: &Tables,
    filter: &ReportFilter,
    format: ExportFormat,
    generated_at: DateTime<Utc>,
) -> Result<Export> {
    let rows = validated_jaspel(tables, filter);
    let total: Decimal = rows.iter().map(|row| row.amount).sum();

    let body = match format {
        ExportFormat::Csv => render_csv(&rows, total)?,
        ExportFormat::Html => render_html(&rows, total, filter, generated_at).into_bytes(),
    };

    let mut hasher = Sha256::new();
    hasher.update(&body);
    let checksum = format!("{:x}", hasher.finalize());

    let filename = format!(
        "jaspel-tervalidasi-{}.{}",
        generated_at.format("%Y%m%d%H%M%S"),
        format.extension()
    );

    log::info!(
        target: "jaspel::report",
        "exported {} rows as {} ({} bytes, sha256 {})",
        rows.len(),
        filename,
        body.len(),
        checksum
    );

    Ok(Export {
        format,
        filename,
        rows: rows.len(),
        total,
        checksum,
        body,
    })
}
