use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A duty roster slot (jadwal jaga).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub id: u64,
    pub date: NaiveDate,
    pub user_id: u64,
    /// Shift name, e.g. "Pagi", "Sore", "Malam"
    pub shift: String,
}
