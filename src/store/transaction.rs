//! Write transactions over the in-process store.
//!
//! A transaction holds the store lock for its whole lifetime and works on a
//! staged copy of the tables:
//! - `commit` writes the snapshot (if configured) and then swaps the staged
//!   copy in
//! - `rollback` discards it
//! - dropping an open transaction rolls back
//!
//! The audit log is append-only. It is moved into the staged copy rather than
//! cloned, and cut back to its previous length on rollback.

use super::Tables;
use crate::error::StoreError;
use std::fs;
use std::path::Path;
use std::sync::MutexGuard;

pub struct Transaction<'a> {
    guard: MutexGuard<'a, Tables>,
    staged: Option<Tables>,
    /// Audit records committed before the transaction began
    audit_len: usize,
    snapshot_path: Option<&'a Path>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(mut guard: MutexGuard<'a, Tables>, snapshot_path: Option<&'a Path>) -> Self {
        let audit_log = std::mem::take(&mut guard.audit_log);
        let audit_len = audit_log.len();
        let mut staged = guard.clone();
        staged.audit_log = audit_log;
        Self {
            guard,
            staged: Some(staged),
            audit_len,
            snapshot_path,
        }
    }

    /// Hand the committed audit records back to the live tables.
    fn restore_audit(&mut self, staged: Tables) {
        let mut audit_log = staged.audit_log;
        audit_log.truncate(self.audit_len);
        self.guard.audit_log = audit_log;
    }

    /// Staged tables; writes are invisible to readers until commit.
    pub fn tables_mut(&mut self) -> Result<&mut Tables, StoreError> {
        self.staged.as_mut().ok_or(StoreError::TransactionClosed)
    }

    pub fn tables(&self) -> Result<&Tables, StoreError> {
        self.staged.as_ref().ok_or(StoreError::TransactionClosed)
    }

    /// Make the staged tables the committed state.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction has already been closed or the
    /// snapshot cannot be written. A failed snapshot write rolls the
    /// transaction back, leaving the committed state untouched.
    pub fn commit(mut self) -> Result<(), StoreError> {
        let staged = self.staged.take().ok_or(StoreError::TransactionClosed)?;
        if let Some(path) = self.snapshot_path {
            if let Err(err) = write_snapshot(path, &staged) {
                self.restore_audit(staged);
                return Err(err);
            }
        }
        *self.guard = staged;
        Ok(())
    }

    /// Discard the staged tables.
    pub fn rollback(mut self) -> Result<(), StoreError> {
        let staged = self.staged.take().ok_or(StoreError::TransactionClosed)?;
        self.restore_audit(staged);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.staged.is_none()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if let Some(staged) = self.staged.take() {
            self.restore_audit(staged);
            log::debug!(target: "jaspel::store", "transaction dropped without commit, rolled back");
        }
    }
}

fn write_snapshot(path: &Path, tables: &Tables) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(tables)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    // write-then-rename so a crash never leaves a truncated snapshot
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
