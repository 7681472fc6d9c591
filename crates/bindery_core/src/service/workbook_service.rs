//! Workbook use-case service: create, list-owned, list-shared, share.
//!
//! # Responsibility
//! - Provide the consumer-facing contract over the record store.
//! - Enforce idempotent, race-safe sharing via compare-and-swap with a
//!   bounded retry loop.
//!
//! # Invariants
//! - Input validation runs before any store access.
//! - `shared_with` is mutated only through this service's share path.
//! - Service APIs never bypass store validation/persistence contracts.
//! - Reads served through secondary indexes do not promise
//!   read-your-writes; the primary-key path does.

use crate::keys::WorkbookKey;
use crate::model::workbook::{UserId, Workbook, WorkbookId, WorkbookValidationError};
use crate::repo::workbook_repo::{PutCondition, StoreError, WorkbookStore};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Outcomes of workbook service operations, distinguishable per the
/// error taxonomy: validation, not-found, conflict, persistence.
#[derive(Debug)]
pub enum ServiceError {
    /// Caller input violates a precondition; rejected before storage.
    Validation(WorkbookValidationError),
    /// Referenced workbook is absent. A normal outcome, not a fault.
    WorkbookNotFound(WorkbookKey),
    /// The grantee already has access. Idempotent no-op signal; callers
    /// may treat it as success.
    AlreadyShared {
        workbook_id: WorkbookId,
        grantee_id: UserId,
    },
    /// Another creation with the same identity won the race.
    CreateConflict(WorkbookKey),
    /// Concurrent sharing kept moving `shared_with`; gave up after the
    /// bounded retry count.
    ConflictRetryExhausted { attempts: u32 },
    /// The persistent medium failed. Not retried here.
    Persistence(StoreError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::WorkbookNotFound(key) => write!(f, "workbook not found: {key}"),
            Self::AlreadyShared {
                workbook_id,
                grantee_id,
            } => write!(f, "workbook {workbook_id} is already shared with {grantee_id}"),
            Self::CreateConflict(key) => {
                write!(f, "workbook {key} already exists")
            }
            Self::ConflictRetryExhausted { attempts } => write!(
                f,
                "sharing conflict persisted after {attempts} attempts"
            ),
            Self::Persistence(err) => write!(f, "persistence failure: {err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Persistence(err) => Some(err),
            _ => None,
        }
    }
}

impl From<WorkbookValidationError> for ServiceError {
    fn from(value: WorkbookValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Validation(err) => Self::Validation(err),
            other => Self::Persistence(other),
        }
    }
}

/// Caller-supplied fields for workbook creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateWorkbookRequest {
    pub name: String,
    pub description: String,
    /// Bounded to `SOURCE_CODE_MAX_BYTES`; checked before any store access.
    pub source_code: String,
}

/// Bound on the share retry loop. Injected once at construction and
/// read-only thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareRetryPolicy {
    /// Total attempts (initial try included) before giving up with
    /// `ConflictRetryExhausted`.
    pub max_attempts: u32,
}

impl Default for ShareRetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 4 }
    }
}

/// Use-case service for workbook storage and sharing.
pub struct WorkbookService<S: WorkbookStore> {
    store: S,
    retry_policy: ShareRetryPolicy,
}

impl<S: WorkbookStore> WorkbookService<S> {
    /// Creates a service with the default share retry policy.
    pub fn new(store: S) -> Self {
        Self::with_retry_policy(store, ShareRetryPolicy::default())
    }

    /// Creates a service with an explicit share retry policy.
    pub fn with_retry_policy(store: S, retry_policy: ShareRetryPolicy) -> Self {
        Self {
            store,
            retry_policy,
        }
    }

    /// Creates a workbook owned by `owner_id` and returns its generated
    /// identifier.
    ///
    /// # Contract
    /// - `source_code` over the inclusive byte bound fails validation
    ///   before the store is touched.
    /// - Creation uses a must-not-exist condition; the loser of a
    ///   concurrent double-create receives `CreateConflict`.
    pub fn create_workbook(
        &mut self,
        owner_id: &str,
        request: &CreateWorkbookRequest,
    ) -> ServiceResult<WorkbookId> {
        let workbook_id = Uuid::new_v4().to_string();
        let workbook = Workbook::new(
            owner_id,
            workbook_id.clone(),
            request.name.clone(),
            request.description.clone(),
            request.source_code.clone(),
        );
        workbook.validate()?;

        match self
            .store
            .put_workbook(&workbook, PutCondition::KeyMustNotExist)
        {
            Ok(()) => {
                info!(
                    "event=workbook_create module=service status=ok key={}",
                    WorkbookKey::from(&workbook)
                );
                Ok(workbook_id)
            }
            Err(StoreError::ConditionFailed) => {
                Err(ServiceError::CreateConflict(WorkbookKey::from(&workbook)))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Lists all workbooks owned by `owner_id`. Empty is a valid result.
    pub fn list_owned(&self, owner_id: &str) -> ServiceResult<Vec<Workbook>> {
        Ok(self.store.list_by_owner(owner_id)?)
    }

    /// Lists all workbooks shared with `user_id`. Empty is a valid result.
    pub fn list_shared(&self, user_id: &str) -> ServiceResult<Vec<Workbook>> {
        Ok(self.store.list_shared_with(user_id)?)
    }

    /// Grants `grantee_id` access to `(owner_id, workbook_id)`.
    ///
    /// # Contract
    /// - Absent workbook fails `WorkbookNotFound`.
    /// - A grantee who already has access (the owner included) fails
    ///   `AlreadyShared`; callers may treat this as success.
    /// - A write conflict with another sharer triggers re-read and retry,
    ///   bounded by the retry policy; exhaustion fails
    ///   `ConflictRetryExhausted`. No concurrent grant is ever lost.
    pub fn share(
        &mut self,
        owner_id: &str,
        workbook_id: &str,
        grantee_id: &str,
    ) -> ServiceResult<()> {
        let key = WorkbookKey::new(owner_id, workbook_id);
        let mut attempts = 0;

        while attempts < self.retry_policy.max_attempts {
            attempts += 1;

            let Some(workbook) = self.store.get_workbook(&key)? else {
                return Err(ServiceError::WorkbookNotFound(key));
            };

            if grantee_id == workbook.owner_id || workbook.is_shared_with(grantee_id) {
                return Err(ServiceError::AlreadyShared {
                    workbook_id: workbook.workbook_id,
                    grantee_id: grantee_id.to_string(),
                });
            }

            let mut next = workbook.shared_with.clone();
            next.insert(grantee_id.to_string());

            match self
                .store
                .update_shared_with(&key, &next, &workbook.shared_with)
            {
                Ok(()) => {
                    info!(
                        "event=share module=service status=ok key={key} grantee={grantee_id} attempt={attempts}"
                    );
                    return Ok(());
                }
                Err(StoreError::ConditionFailed) => {
                    warn!(
                        "event=share module=service status=retry key={key} grantee={grantee_id} attempt={attempts}"
                    );
                    continue;
                }
                Err(StoreError::NotFound(missing)) => {
                    return Err(ServiceError::WorkbookNotFound(missing));
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(
            "event=share module=service status=error key={key} grantee={grantee_id} error_code=conflict_retry_exhausted attempts={attempts}"
        );
        Err(ServiceError::ConflictRetryExhausted { attempts })
    }

    /// Consumes the service, returning the wrapped store.
    pub fn into_store(self) -> S {
        self.store
    }
}
