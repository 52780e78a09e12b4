//! Error types for the jaspel core.
//!
//! [`JaspelError`] is the error every service operation returns. The API layer
//! maps each variant onto an HTTP status code (see `api::envelope`).

use crate::status::ValidationStatus;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Field-level validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for a single failing field.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Store error type
#[derive(Debug)]
pub enum StoreError {
    /// A previous writer panicked while holding the store lock
    Poisoned,
    /// Transaction already committed or rolled back
    TransactionClosed,
    /// Snapshot file could not be read or written
    Io(std::io::Error),
    /// Snapshot file could not be (de)serialized
    Serialization(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Poisoned => write!(f, "Store lock poisoned by a failed writer"),
            StoreError::TransactionClosed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
            StoreError::Io(e) => write!(f, "Snapshot I/O error: {}", e),
            StoreError::Serialization(s) => write!(f, "Snapshot serialization error: {}", s),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Error type for jaspel operations
#[derive(Debug)]
pub enum JaspelError {
    /// Request carried no (or an unknown) actor
    Unauthenticated,
    /// Actor is known but lacks the role for this operation
    Forbidden(String),
    /// Record does not exist
    NotFound { kind: &'static str, id: u64 },
    /// Status string matched no canonical status or synonym
    UnknownStatus(String),
    /// Status change not permitted from the current state
    InvalidTransition {
        from: ValidationStatus,
        to: ValidationStatus,
    },
    /// Business-rule or field validation failed
    Validation(ValidationErrors),
    /// No fee formula could be selected for a patient count record
    NoFeeFormula { record_id: Option<u64> },
    /// Malformed request input (unparseable body, bad query value)
    BadRequest(String),
    /// Report export failed
    Export(String),
    /// Store failure
    Store(StoreError),
}

impl JaspelError {
    pub fn not_found(kind: &'static str, id: u64) -> Self {
        JaspelError::NotFound { kind, id }
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        JaspelError::Validation(ValidationErrors::single(field, message))
    }
}

impl fmt::Display for JaspelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JaspelError::Unauthenticated => write!(f, "Autentikasi diperlukan"),
            JaspelError::Forbidden(s) => write!(f, "Akses ditolak: {}", s),
            JaspelError::NotFound { kind, id } => {
                write!(f, "Data {} dengan id {} tidak ditemukan", kind, id)
            }
            JaspelError::UnknownStatus(s) => write!(f, "Status validasi tidak dikenal: {}", s),
            JaspelError::InvalidTransition { from, to } => write!(
                f,
                "Perubahan status dari {} ke {} tidak diizinkan",
                from, to
            ),
            JaspelError::Validation(errors) => write!(f, "Validasi gagal: {}", errors),
            JaspelError::NoFeeFormula { record_id } => match record_id {
                Some(id) => write!(f, "Tidak ada formula jaspel aktif untuk data pasien {}", id),
                None => write!(f, "Tidak ada formula jaspel aktif"),
            },
            JaspelError::BadRequest(s) => write!(f, "Permintaan tidak valid: {}", s),
            JaspelError::Export(s) => write!(f, "Ekspor gagal: {}", s),
            JaspelError::Store(e) => write!(f, "Store error: {}", e),
        }
    }
}

impl std::error::Error for JaspelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            JaspelError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for JaspelError {
    fn from(err: StoreError) -> Self {
        JaspelError::Store(err)
    }
}

impl From<ValidationErrors> for JaspelError {
    fn from(errors: ValidationErrors) -> Self {
        JaspelError::Validation(errors)
    }
}

pub type Result<T, E = JaspelError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_accumulate_per_field() {
        let mut errors = ValidationErrors::new();
        errors.add("amount", "terlalu besar");
        errors.add("amount", "angka bulat mencurigakan");
        errors.add("note", "wajib diisi");

        assert_eq!(errors.len(), 3);
        assert!(errors.has("amount"));
        assert_eq!(errors.get("amount").map(<[String]>::len), Some(2));
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["amount", "note"]);
    }

    #[test]
    fn test_validation_errors_serialize_as_map() {
        let errors = ValidationErrors::single("amount", "harus lebih dari 0");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["amount"][0], "harus lebih dari 0");
    }

    #[test]
    fn test_store_error_conversion() {
        let err: JaspelError = StoreError::TransactionClosed.into();
        assert!(err.to_string().contains("already been committed"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = JaspelError::InvalidTransition {
            from: ValidationStatus::Approved,
            to: ValidationStatus::Pending,
        };
        assert!(err.to_string().contains("approved"));
        assert!(err.to_string().contains("pending"));
    }
}
