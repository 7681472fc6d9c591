//! Core storage and access-control logic for Bindery workbooks.
//! This crate is the single source of truth for sharing invariants.

pub mod db;
pub mod keys;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use keys::{GrantKey, WorkbookKey};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::workbook::{
    AccessGrant, UserId, Workbook, WorkbookId, WorkbookValidationError, SOURCE_CODE_MAX_BYTES,
};
pub use repo::workbook_repo::{
    PutCondition, SqliteWorkbookStore, StoreError, StoreResult, WorkbookStore,
};
pub use service::workbook_service::{
    CreateWorkbookRequest, ServiceError, ServiceResult, ShareRetryPolicy, WorkbookService,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
