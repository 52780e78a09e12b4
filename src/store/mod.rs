//! In-process relational store.
//!
//! Tables live behind a single mutex. Readers take a consistent view with
//! [`Database::read`]; writers go through a [`Transaction`] that stages a copy
//! of every table and swaps it in on commit, so a failed business operation
//! leaves no partial writes behind. When a snapshot path is configured the
//! committed state is also written to disk as JSON.

mod transaction;

pub use transaction::Transaction;

use crate::audit::AuditRecord;
use crate::error::StoreError;
use crate::model::{
    FeeFormula, Identified, JaspelEntry, PatientCountRecord, Procedure, ProcedureType,
    RecordKind, RecordRef, Schedule, User, Validatable,
};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Rows keyed by id, with the id sequence of the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table<T> {
    rows: BTreeMap<u64, T>,
    next_id: u64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T: Identified> Table<T> {
    /// Insert a row, assigning the next id. Returns the assigned id.
    pub fn insert(&mut self, mut row: T) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        row.set_id(id);
        self.rows.insert(id, row);
        id
    }

    pub fn get(&self, id: u64) -> Option<&T> {
        self.rows.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut T> {
        self.rows.get_mut(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.rows.contains_key(&id)
    }

    /// Rows in id order
    pub fn iter(&self) -> btree_map::Values<'_, u64, T> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Every table of the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    pub users: Table<User>,
    pub schedules: Table<Schedule>,
    pub formulas: Table<FeeFormula>,
    pub patient_counts: Table<PatientCountRecord>,
    pub procedure_types: Table<ProcedureType>,
    pub procedures: Table<Procedure>,
    pub jaspel_entries: Table<JaspelEntry>,
    #[serde(default)]
    pub audit_log: Vec<AuditRecord>,
}

impl Tables {
    pub fn validatable(&self, target: RecordRef) -> Option<&dyn Validatable> {
        match target.kind {
            RecordKind::JaspelEntry => self
                .jaspel_entries
                .get(target.id)
                .map(|r| r as &dyn Validatable),
            RecordKind::Procedure => self.procedures.get(target.id).map(|r| r as &dyn Validatable),
            RecordKind::PatientCount => self
                .patient_counts
                .get(target.id)
                .map(|r| r as &dyn Validatable),
        }
    }

    pub fn validatable_mut(&mut self, target: RecordRef) -> Option<&mut dyn Validatable> {
        match target.kind {
            RecordKind::JaspelEntry => self
                .jaspel_entries
                .get_mut(target.id)
                .map(|r| r as &mut dyn Validatable),
            RecordKind::Procedure => self
                .procedures
                .get_mut(target.id)
                .map(|r| r as &mut dyn Validatable),
            RecordKind::PatientCount => self
                .patient_counts
                .get_mut(target.id)
                .map(|r| r as &mut dyn Validatable),
        }
    }

    /// Serialized view of a record, used for audit old/new values.
    pub fn record_json(&self, target: RecordRef) -> Option<serde_json::Value> {
        let value = match target.kind {
            RecordKind::JaspelEntry => serde_json::to_value(self.jaspel_entries.get(target.id)?),
            RecordKind::Procedure => serde_json::to_value(self.procedures.get(target.id)?),
            RecordKind::PatientCount => serde_json::to_value(self.patient_counts.get(target.id)?),
        };
        value.ok()
    }

    pub fn user(&self, id: u64) -> Option<&User> {
        self.users.get(id)
    }
}

pub struct Database {
    tables: Mutex<Tables>,
    snapshot_path: Option<PathBuf>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("snapshot_path", &self.snapshot_path)
            .finish_non_exhaustive()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Database {
    pub fn in_memory() -> Self {
        Self::from_tables(Tables::default())
    }

    pub fn from_tables(tables: Tables) -> Self {
        Self {
            tables: Mutex::new(tables),
            snapshot_path: None,
        }
    }

    /// Open a store persisted at `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let tables = if path.exists() {
            let bytes = std::fs::read(path)?;
            let tables: Tables = serde_json::from_slice(&bytes)?;
            log::info!(
                target: "jaspel::store",
                "loaded snapshot {} ({} users, {} jaspel entries)",
                path.display(),
                tables.users.len(),
                tables.jaspel_entries.len()
            );
            tables
        } else {
            log::info!(target: "jaspel::store", "no snapshot at {}, starting empty", path.display());
            Tables::default()
        };
        Ok(Self {
            tables: Mutex::new(tables),
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run `f` against a consistent view of the committed tables.
    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, StoreError> {
        let guard = self.lock()?;
        Ok(f(&guard))
    }

    /// Start a write transaction. Holds the store lock until commit or rollback.
    pub fn begin(&self) -> Result<Transaction<'_>, StoreError> {
        let guard = self.lock()?;
        Ok(Transaction::new(guard, self.snapshot_path.as_deref()))
    }

    /// Run a multi-step write atomically.
    ///
    /// The closure works on staged tables. `Ok` commits, `Err` rolls back and
    /// is logged and returned unchanged. No retry is attempted.
    pub fn execute_in_transaction<T, E>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut Tables) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError> + fmt::Display,
    {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::transaction_span(operation).entered();

        let mut tx = self.begin()?;
        match f(tx.tables_mut()?) {
            Ok(value) => {
                if let Err(err) = tx.commit() {
                    log::error!(target: "jaspel::store", "{} failed to commit, rolled back: {}", operation, err);
                    return Err(err.into());
                }
                log::debug!(target: "jaspel::store", "{} committed", operation);
                Ok(value)
            }
            Err(err) => {
                log::error!(target: "jaspel::store", "{} failed, rolling back: {}", operation, err);
                tx.rollback()?;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JaspelError;
    use crate::model::Role;

    fn db_with_user() -> Database {
        let mut tables = Tables::default();
        tables.users.insert(User::new("dr. Sari", Role::Doctor));
        Database::from_tables(tables)
    }

    #[test]
    fn test_table_assigns_sequential_ids() {
        let mut table: Table<User> = Table::default();
        let a = table.insert(User::new("a", Role::Staff));
        let b = table.insert(User::new("b", Role::Staff));
        assert_eq!((a, b), (1, 2));
        assert_eq!(table.get(2).map(|u| u.name.as_str()), Some("b"));
        assert_eq!(table.get(2).map(|u| u.id), Some(2));
    }

    #[test]
    fn test_execute_in_transaction_commits_on_ok() {
        let db = db_with_user();
        let id = db
            .execute_in_transaction("add user", |t| {
                Ok::<_, JaspelError>(t.users.insert(User::new("Budi", Role::Paramedic)))
            })
            .unwrap();
        assert_eq!(id, 2);
        assert_eq!(db.read(|t| t.users.len()).unwrap(), 2);
    }

    #[test]
    fn test_execute_in_transaction_rolls_back_on_err() {
        let db = db_with_user();
        let result: Result<(), JaspelError> = db.execute_in_transaction("failing", |t| {
            t.users.insert(User::new("Budi", Role::Paramedic));
            Err(JaspelError::BadRequest("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(db.read(|t| t.users.len()).unwrap(), 1);
    }

    #[test]
    fn test_snapshot_persists_committed_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let db = Database::open(&path).unwrap();
            db.execute_in_transaction("seed", |t| {
                t.users.insert(User::new("Ani", Role::Treasurer));
                Ok::<_, JaspelError>(())
            })
            .unwrap();
        }

        let reopened = Database::open(&path).unwrap();
        let names = reopened
            .read(|t| t.users.iter().map(|u| u.name.clone()).collect::<Vec<_>>())
            .unwrap();
        assert_eq!(names, vec!["Ani".to_string()]);
        // sequence survives the round trip
        let next = reopened
            .execute_in_transaction("next", |t| {
                Ok::<_, JaspelError>(t.users.insert(User::new("Dedi", Role::Staff)))
            })
            .unwrap();
        assert_eq!(next, 2);
    }

    #[test]
    fn test_failed_snapshot_write_rolls_back() {
        // the parent of the snapshot path is a regular file, so the write fails
        let file = tempfile::NamedTempFile::new().unwrap();
        let db = Database::open(file.path().join("store.json")).unwrap();

        let result = db.execute_in_transaction("user.create", |t| {
            Ok::<_, JaspelError>(t.users.insert(User::new("Ani", Role::Treasurer)))
        });
        assert!(matches!(result, Err(JaspelError::Store(StoreError::Io(_)))));
        assert_eq!(db.read(|t| t.users.len()).unwrap(), 0);
    }

    #[test]
    fn test_validatable_lookup_by_ref() {
        let db = db_with_user();
        let missing = db
            .read(|t| t.validatable(RecordRef::new(RecordKind::Procedure, 9)).is_none())
            .unwrap();
        assert!(missing);
    }
}
