//! Validation status
//!
//! Records move through a small state machine:
//!
//! ```text
//! pending ──► approved | rejected | revision | cancelled
//! revision ──► pending | cancelled
//! ```
//!
//! Legacy rows and older clients write locale variants ("disetujui",
//! "ditolak", ...). Those strings are mapped to the canonical enum once, at the
//! I/O boundary, through [`ValidationStatus::normalize`]. Everything past the
//! boundary compares enum values only.

use crate::error::JaspelError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValidationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Revision,
    Cancelled,
}

const SYNONYMS: &[(&str, ValidationStatus)] = &[
    ("pending", ValidationStatus::Pending),
    ("menunggu", ValidationStatus::Pending),
    ("tertunda", ValidationStatus::Pending),
    ("waiting", ValidationStatus::Pending),
    ("submitted", ValidationStatus::Pending),
    ("diajukan", ValidationStatus::Pending),
    ("approved", ValidationStatus::Approved),
    ("disetujui", ValidationStatus::Approved),
    ("validated", ValidationStatus::Approved),
    ("tervalidasi", ValidationStatus::Approved),
    ("valid", ValidationStatus::Approved),
    ("accepted", ValidationStatus::Approved),
    ("rejected", ValidationStatus::Rejected),
    ("ditolak", ValidationStatus::Rejected),
    ("declined", ValidationStatus::Rejected),
    ("tidak_valid", ValidationStatus::Rejected),
    ("invalid", ValidationStatus::Rejected),
    ("revision", ValidationStatus::Revision),
    ("revisi", ValidationStatus::Revision),
    ("perlu_revisi", ValidationStatus::Revision),
    ("needs_revision", ValidationStatus::Revision),
    ("cancelled", ValidationStatus::Cancelled),
    ("canceled", ValidationStatus::Cancelled),
    ("dibatalkan", ValidationStatus::Cancelled),
    ("batal", ValidationStatus::Cancelled),
];

impl ValidationStatus {
    pub const ALL: [ValidationStatus; 5] = [
        ValidationStatus::Pending,
        ValidationStatus::Approved,
        ValidationStatus::Rejected,
        ValidationStatus::Revision,
        ValidationStatus::Cancelled,
    ];

    /// Map a raw status string (any case, spaces or dashes allowed) to its canonical value.
    pub fn normalize(raw: &str) -> Result<Self, JaspelError> {
        let key = raw.trim().to_lowercase().replace([' ', '-'], "_");
        SYNONYMS
            .iter()
            .find(|(synonym, _)| *synonym == key)
            .map(|(_, status)| *status)
            .ok_or_else(|| JaspelError::UnknownStatus(raw.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::Approved => "approved",
            ValidationStatus::Rejected => "rejected",
            ValidationStatus::Revision => "revision",
            ValidationStatus::Cancelled => "cancelled",
        }
    }

    /// Indonesian label used in exports and user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "Menunggu",
            ValidationStatus::Approved => "Disetujui",
            ValidationStatus::Rejected => "Ditolak",
            ValidationStatus::Revision => "Perlu Revisi",
            ValidationStatus::Cancelled => "Dibatalkan",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ValidationStatus::Approved | ValidationStatus::Rejected | ValidationStatus::Cancelled
        )
    }

    /// Approval and rejection are validator decisions; they stamp validator id and time.
    pub fn is_decision(&self) -> bool {
        matches!(self, ValidationStatus::Approved | ValidationStatus::Rejected)
    }

    pub fn can_transition_to(&self, next: ValidationStatus) -> bool {
        match self {
            ValidationStatus::Pending => next != ValidationStatus::Pending,
            ValidationStatus::Revision => {
                matches!(next, ValidationStatus::Pending | ValidationStatus::Cancelled)
            }
            ValidationStatus::Approved
            | ValidationStatus::Rejected
            | ValidationStatus::Cancelled => false,
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationStatus {
    type Err = JaspelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValidationStatus::normalize(s)
    }
}

impl Serialize for ValidationStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ValidationStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ValidationStatus::normalize(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonym_pairs_normalize_to_same_value() {
        let pairs = [
            ("approved", "disetujui"),
            ("rejected", "ditolak"),
            ("pending", "menunggu"),
            ("revision", "revisi"),
            ("cancelled", "dibatalkan"),
            ("canceled", "batal"),
        ];
        for (a, b) in pairs {
            assert_eq!(
                ValidationStatus::normalize(a).unwrap(),
                ValidationStatus::normalize(b).unwrap(),
                "{} vs {}",
                a,
                b
            );
        }
    }

    #[test]
    fn test_every_synonym_round_trips_through_canonical_string() {
        for (synonym, status) in SYNONYMS {
            let normalized = ValidationStatus::normalize(synonym).unwrap();
            assert_eq!(normalized, *status);
            assert_eq!(ValidationStatus::normalize(normalized.as_str()).unwrap(), *status);
        }
    }

    #[test]
    fn test_normalize_is_case_and_separator_insensitive() {
        assert_eq!(
            ValidationStatus::normalize("  DISETUJUI ").unwrap(),
            ValidationStatus::Approved
        );
        assert_eq!(
            ValidationStatus::normalize("Perlu Revisi").unwrap(),
            ValidationStatus::Revision
        );
        assert_eq!(
            ValidationStatus::normalize("tidak-valid").unwrap(),
            ValidationStatus::Rejected
        );
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(matches!(
            ValidationStatus::normalize("maybe"),
            Err(JaspelError::UnknownStatus(_))
        ));
        assert!(ValidationStatus::normalize("").is_err());
    }

    #[test]
    fn test_transition_table() {
        use ValidationStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Revision));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Pending));

        assert!(Revision.can_transition_to(Pending));
        assert!(Revision.can_transition_to(Cancelled));
        assert!(!Revision.can_transition_to(Approved));

        for terminal in [Approved, Rejected, Cancelled] {
            for next in ValidationStatus::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_serde_uses_canonical_value_and_accepts_synonyms() {
        let json = serde_json::to_string(&ValidationStatus::Approved).unwrap();
        assert_eq!(json, "\"approved\"");

        let parsed: ValidationStatus = serde_json::from_str("\"disetujui\"").unwrap();
        assert_eq!(parsed, ValidationStatus::Approved);

        assert!(serde_json::from_str::<ValidationStatus>("\"unknown\"").is_err());
    }
}
