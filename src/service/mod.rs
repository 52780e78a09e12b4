//! Application state shared by every request.
//!
//! [`AppState`] owns the store, the read cache and the configuration, and
//! hands out the short-lived services that operate on them.

mod records;

pub use records::{
    CreatedEntry, NewPatientCount, NewProcedure, PatientCountPreview, ProcedurePreview,
    RecordService,
};

use crate::cache::Cache;
use crate::config::AppConfig;
use crate::dashboard::Dashboard;
use crate::error::{JaspelError, Result};
use crate::model::{Role, User};
use crate::store::Database;
use crate::validation::{JaspelEntryRule, ValidationWorkflow};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub cache: Arc<Cache>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig) -> Self {
        Self {
            db: Arc::new(db),
            cache: Arc::new(Cache::new()),
            config: Arc::new(config),
        }
    }

    /// Fresh in-memory state, used by tests and one-off CLI calculations.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(Database::in_memory(), config)
    }

    pub fn workflow(&self) -> ValidationWorkflow<'_> {
        ValidationWorkflow::new(&self.db, &self.cache)
    }

    pub fn dashboard(&self) -> Dashboard<'_> {
        Dashboard::new(&self.db, &self.cache, &self.config.cache)
    }

    pub fn records(&self) -> RecordService<'_> {
        RecordService::new(&self.db, &self.cache, self.entry_rule())
    }

    pub fn entry_rule(&self) -> JaspelEntryRule<'_> {
        JaspelEntryRule::new(&self.config.validation, self.config.app.environment)
    }

    /// Create the configured admin account when the store has no users yet.
    ///
    /// Returns the id of the created account.
    pub fn bootstrap(&self) -> Result<Option<u64>> {
        let Some(name) = self.config.app.bootstrap_admin.clone() else {
            return Ok(None);
        };
        self.db.execute_in_transaction("bootstrap", |tables| {
            if !tables.users.is_empty() {
                return Ok::<_, JaspelError>(None);
            }
            let id = tables.users.insert(User::new(name.clone(), Role::Admin));
            log::info!(target: "jaspel::store", "created bootstrap admin '{}' with id {}", name, id);
            Ok(Some(id))
        })
    }

    /// Resolve the acting user from the id the transport supplied.
    pub fn authenticate(&self, actor_id: Option<u64>) -> Result<User> {
        let id = actor_id.ok_or(JaspelError::Unauthenticated)?;
        self.db
            .read(|tables| tables.user(id).cloned())?
            .ok_or(JaspelError::Unauthenticated)
    }
}

/// Fail with `Forbidden` unless `actor` may validate.
pub fn require_validator(actor: &User) -> Result<()> {
    if actor.role.can_validate() {
        Ok(())
    } else {
        Err(JaspelError::Forbidden(format!(
            "hanya bendahara atau admin, bukan {}",
            actor.role.label()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_creates_admin_once() {
        let state = AppState::in_memory(AppConfig::default());
        let id = state.bootstrap().unwrap().unwrap();
        assert_eq!(state.bootstrap().unwrap(), None);

        let admin = state.authenticate(Some(id)).unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.name, "admin");
    }

    #[test]
    fn test_bootstrap_disabled() {
        let mut config = AppConfig::default();
        config.app.bootstrap_admin = None;
        let state = AppState::in_memory(config);
        assert_eq!(state.bootstrap().unwrap(), None);
        assert!(state.db.read(|tables| tables.users.is_empty()).unwrap());
    }

    #[test]
    fn test_authenticate_requires_known_actor() {
        let state = AppState::in_memory(AppConfig::default());
        assert!(matches!(state.authenticate(None), Err(JaspelError::Unauthenticated)));
        assert!(matches!(state.authenticate(Some(42)), Err(JaspelError::Unauthenticated)));
    }

    #[test]
    fn test_require_validator() {
        assert!(require_validator(&User::new("Bu Rina", Role::Treasurer)).is_ok());
        assert!(matches!(
            require_validator(&User::new("Sri", Role::Paramedic)),
            Err(JaspelError::Forbidden(_))
        ));
    }
}
