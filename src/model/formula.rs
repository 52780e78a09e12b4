use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-shift fee parameters for general practitioners (DokterUmumJaspel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeFormula {
    #[serde(default)]
    pub id: u64,
    /// Shift type this formula applies to, matched case-insensitively
    pub shift: String,
    /// Patients covered by the sitting fee alone
    pub threshold: u32,
    pub fee_general: Decimal,
    pub fee_insurance: Decimal,
    pub sitting_fee: Decimal,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl FeeFormula {
    pub fn matches_shift(&self, shift: &str) -> bool {
        self.shift.trim().eq_ignore_ascii_case(shift.trim())
    }
}
