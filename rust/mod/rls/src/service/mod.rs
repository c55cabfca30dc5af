pub mod catalog;
pub mod guard;
pub mod policy;
pub mod property;
pub mod validate;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use datasec_core::ServiceError;

use crate::config::RlsConfig;
use crate::model::{ProjectId, UserId};
use crate::resolver::PropertyValueResolver;
use crate::store::{PolicyTransaction, StoreError, Stores};

/// RLS service error type.
#[derive(Debug, Error)]
pub enum RlsError {
    /// Missing, or owned by another project. The two are never told apart.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A policy transaction could not be opened or committed.
    #[error("transaction failed: {source}")]
    Transaction { source: StoreError },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RlsError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(m) => RlsError::Conflict(m),
            StoreError::InvalidReference(m) => RlsError::Validation(m),
            other => RlsError::Store(other),
        }
    }
}

impl From<RlsError> for ServiceError {
    fn from(e: RlsError) -> Self {
        match e {
            RlsError::NotFound(m) => ServiceError::NotFound(m),
            RlsError::Validation(m) => ServiceError::Validation(m),
            RlsError::Conflict(m) => ServiceError::Conflict(m),
            e @ RlsError::Transaction { .. } => ServiceError::Transaction(e.to_string()),
            RlsError::Store(StoreError::Internal(m)) => ServiceError::Internal(m),
            RlsError::Store(e) => ServiceError::Storage(e.to_string()),
        }
    }
}

/// The RLS service: session properties, policies, user values and the
/// model catalog, all scoped to a project.
pub struct RlsService {
    pub(crate) stores: Stores,
    pub(crate) config: RlsConfig,
    resolver: Arc<PropertyValueResolver>,
}

impl RlsService {
    pub fn new(stores: Stores, config: RlsConfig) -> Self {
        let resolver = Arc::new(PropertyValueResolver::new(
            stores.properties.clone(),
            stores.values.clone(),
        ));
        Self {
            stores,
            config,
            resolver,
        }
    }

    /// The resolver sharing this service's stores.
    pub fn resolver(&self) -> Arc<PropertyValueResolver> {
        self.resolver.clone()
    }

    /// Effective property bindings for `user_id` in `project_id`.
    pub fn resolve_session_properties(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> Result<BTreeMap<String, String>, RlsError> {
        self.resolver.resolve(project_id, user_id)
    }

    /// Run `f` inside one policy transaction.
    ///
    /// Commits on `Ok`. On `Err` the transaction is rolled back and the
    /// error is returned as is; a failed rollback is only logged.
    pub(crate) fn in_transaction<T, F>(&self, f: F) -> Result<T, RlsError>
    where
        F: FnOnce(&mut dyn PolicyTransaction) -> Result<T, RlsError>,
    {
        let mut tx = self
            .stores
            .policies
            .begin()
            .map_err(|source| RlsError::Transaction { source })?;

        match f(tx.as_mut()) {
            Ok(value) => {
                tx.commit()
                    .map_err(|source| RlsError::Transaction { source })?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, cause = %e, "policy transaction rollback failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use datasec_sql::SQLError;

    use crate::model::{ModelId, PolicyId, RlsPolicy, SessionPropertyId};
    use crate::store::{PolicyChanges, PolicyStore};

    /// Policy store whose transaction boundaries fail on demand.
    #[derive(Default)]
    struct FailingPolicies {
        fail_begin: bool,
        fail_commit: bool,
        fail_rollback: bool,
        committed: Arc<AtomicBool>,
        rolled_back: Arc<AtomicBool>,
    }

    struct FailingTransaction {
        fail_commit: bool,
        fail_rollback: bool,
        committed: Arc<AtomicBool>,
        rolled_back: Arc<AtomicBool>,
    }

    impl PolicyStore for FailingPolicies {
        fn find_by_id(&self, _id: PolicyId) -> Result<Option<RlsPolicy>, StoreError> {
            Ok(None)
        }

        fn find_all_by_project(&self, _project_id: ProjectId) -> Result<Vec<RlsPolicy>, StoreError> {
            Ok(Vec::new())
        }

        fn find_all_by_model(
            &self,
            _project_id: ProjectId,
            _model_id: ModelId,
        ) -> Result<Vec<RlsPolicy>, StoreError> {
            Ok(Vec::new())
        }

        fn find_model_ids(&self, _policy_id: PolicyId) -> Result<Vec<ModelId>, StoreError> {
            Ok(Vec::new())
        }

        fn find_session_property_ids(
            &self,
            _policy_id: PolicyId,
        ) -> Result<Vec<SessionPropertyId>, StoreError> {
            Ok(Vec::new())
        }

        fn delete(&self, _id: PolicyId, _project_id: ProjectId) -> Result<u64, StoreError> {
            Ok(0)
        }

        fn begin(&self) -> Result<Box<dyn PolicyTransaction + '_>, StoreError> {
            if self.fail_begin {
                return Err(StoreError::Internal("begin boom".into()));
            }
            Ok(Box::new(FailingTransaction {
                fail_commit: self.fail_commit,
                fail_rollback: self.fail_rollback,
                committed: self.committed.clone(),
                rolled_back: self.rolled_back.clone(),
            }))
        }
    }

    impl PolicyTransaction for FailingTransaction {
        fn insert(
            &mut self,
            project_id: ProjectId,
            name: &str,
            condition: &str,
        ) -> Result<RlsPolicy, StoreError> {
            Ok(RlsPolicy {
                id: 1,
                project_id,
                name: name.into(),
                condition: condition.into(),
                version: 1,
                created_at: String::new(),
                updated_at: String::new(),
            })
        }

        fn update(
            &mut self,
            _id: PolicyId,
            _project_id: ProjectId,
            _changes: &PolicyChanges<'_>,
        ) -> Result<u64, StoreError> {
            Ok(1)
        }

        fn set_model_ids(
            &mut self,
            _policy_id: PolicyId,
            project_id: ProjectId,
            model_ids: &[ModelId],
        ) -> Result<(), StoreError> {
            match model_ids.first() {
                Some(id) => Err(StoreError::InvalidReference(format!(
                    "model {} not found in project {}",
                    id, project_id
                ))),
                None => Ok(()),
            }
        }

        fn set_session_property_ids(
            &mut self,
            _policy_id: PolicyId,
            _project_id: ProjectId,
            _ids: &[SessionPropertyId],
        ) -> Result<(), StoreError> {
            Ok(())
        }

        fn commit(self: Box<Self>) -> Result<(), StoreError> {
            if self.fail_commit {
                return Err(StoreError::Internal("commit boom".into()));
            }
            self.committed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn rollback(self: Box<Self>) -> Result<(), StoreError> {
            self.rolled_back.store(true, Ordering::SeqCst);
            if self.fail_rollback {
                return Err(StoreError::Internal("rollback boom".into()));
            }
            Ok(())
        }
    }

    fn service_over(policies: FailingPolicies) -> RlsService {
        let config = RlsConfig::default();
        let mut stores = Stores::memory(&config);
        stores.policies = Arc::new(policies);
        RlsService::new(stores, config)
    }

    fn join_fails(tx: &mut dyn PolicyTransaction) -> Result<(), RlsError> {
        let policy = tx.insert(1, "p", "true")?;
        tx.set_model_ids(policy.id, 1, &[9])?;
        Ok(())
    }

    #[test]
    fn test_begin_failure_is_transaction_error() {
        let svc = service_over(FailingPolicies {
            fail_begin: true,
            ..Default::default()
        });
        let err = svc.in_transaction(|_| Ok(())).unwrap_err();
        assert!(matches!(err, RlsError::Transaction { .. }), "{:?}", err);
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("internal: begin boom"));
    }

    #[test]
    fn test_commit_failure_keeps_cause() {
        let svc = service_over(FailingPolicies {
            fail_commit: true,
            ..Default::default()
        });
        let err = svc
            .in_transaction(|tx| tx.insert(1, "p", "true").map_err(RlsError::from))
            .unwrap_err();
        assert!(matches!(err, RlsError::Transaction { .. }), "{:?}", err);
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("internal: commit boom"));
    }

    #[test]
    fn test_inner_error_returned_unchanged_after_rollback() {
        let rolled_back = Arc::new(AtomicBool::new(false));
        let committed = Arc::new(AtomicBool::new(false));
        let svc = service_over(FailingPolicies {
            rolled_back: rolled_back.clone(),
            committed: committed.clone(),
            ..Default::default()
        });

        let err = svc.in_transaction(join_fails).unwrap_err();
        assert_eq!(err.to_string(), "validation: model 9 not found in project 1");
        assert!(rolled_back.load(Ordering::SeqCst));
        assert!(!committed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_failed_rollback_does_not_replace_error() {
        let rolled_back = Arc::new(AtomicBool::new(false));
        let svc = service_over(FailingPolicies {
            fail_rollback: true,
            rolled_back: rolled_back.clone(),
            ..Default::default()
        });

        let err = svc.in_transaction(join_fails).unwrap_err();
        assert!(matches!(err, RlsError::Validation(_)), "{:?}", err);
        assert_eq!(err.to_string(), "validation: model 9 not found in project 1");
        assert!(rolled_back.load(Ordering::SeqCst));
    }

    #[test]
    fn test_success_commits() {
        let committed = Arc::new(AtomicBool::new(false));
        let rolled_back = Arc::new(AtomicBool::new(false));
        let svc = service_over(FailingPolicies {
            committed: committed.clone(),
            rolled_back: rolled_back.clone(),
            ..Default::default()
        });

        let policy = svc
            .in_transaction(|tx| tx.insert(1, "p", "true").map_err(RlsError::from))
            .unwrap();
        assert_eq!(policy.name, "p");
        assert!(committed.load(Ordering::SeqCst));
        assert!(!rolled_back.load(Ordering::SeqCst));
    }

    #[test]
    fn test_store_error_mapping() {
        assert!(matches!(
            RlsError::from(StoreError::InvalidReference("model 3".into())),
            RlsError::Validation(_)
        ));
        assert!(matches!(
            RlsError::from(StoreError::Conflict("dup".into())),
            RlsError::Conflict(_)
        ));
        assert!(matches!(
            RlsError::from(StoreError::Internal("x".into())),
            RlsError::Store(StoreError::Internal(_))
        ));
    }

    #[test]
    fn test_service_error_codes() {
        let e: ServiceError = RlsError::NotFound("rls policy 7 not found in project 1".into()).into();
        assert_eq!(e.error_code(), "NOT_FOUND");
        assert_eq!(e.to_string(), "rls policy 7 not found in project 1");

        let e: ServiceError = RlsError::Transaction {
            source: StoreError::Storage(SQLError::Transaction("database is locked".into())),
        }
        .into();
        assert_eq!(e.error_code(), "TRANSACTION_FAILED");
        assert!(e.to_string().contains("database is locked"));

        let e: ServiceError = RlsError::Store(StoreError::Internal("bad row".into())).into();
        assert_eq!(e.error_code(), "INTERNAL");
    }

    #[test]
    fn test_transaction_keeps_cause() {
        let err = RlsError::Transaction {
            source: StoreError::Internal("commit".into()),
        };
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "internal: commit");
    }
}
