//! Workbook domain model.
//!
//! # Responsibility
//! - Define the canonical workbook record and its access-grant projection.
//! - Enforce content-size and sharing invariants before persistence.
//!
//! # Invariants
//! - `(owner_id, workbook_id)` is the immutable identity of a workbook.
//! - `source_code` never exceeds `SOURCE_CODE_MAX_BYTES` (inclusive bound).
//! - `shared_with` never contains the owner; the set type rules out duplicates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Opaque caller-supplied user identifier. Trusted as given; identity
/// verification happens outside this core.
pub type UserId = String;

/// Stable workbook identifier. Generated as a UUID v4 string by the service
/// layer; the store accepts any non-empty string so import paths can carry
/// externally assigned identity.
pub type WorkbookId = String;

/// Inclusive upper bound for `source_code`, in bytes.
pub const SOURCE_CODE_MAX_BYTES: usize = 1024;

/// Validation failures for workbook records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkbookValidationError {
    /// `source_code` exceeds the inclusive byte bound.
    SourceCodeTooLarge {
        actual_bytes: usize,
        max_bytes: usize,
    },
    /// `shared_with` lists the owner; the owner already has access.
    SharedWithContainsOwner,
}

impl Display for WorkbookValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceCodeTooLarge {
                actual_bytes,
                max_bytes,
            } => write!(
                f,
                "source_code is {actual_bytes} bytes, exceeding the {max_bytes}-byte limit"
            ),
            Self::SharedWithContainsOwner => {
                write!(f, "shared_with must not contain the workbook owner")
            }
        }
    }
}

impl Error for WorkbookValidationError {}

/// Canonical workbook record.
///
/// `shared_with` is a `BTreeSet` so membership is duplicate-free by
/// construction and iteration order is canonical, which the store relies on
/// for its compare-and-swap value encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workbook {
    /// Identifier of the owning user. Part of the primary key.
    pub owner_id: UserId,
    /// Stable workbook identifier. Part of the primary key.
    pub workbook_id: WorkbookId,
    /// Display title.
    pub name: String,
    /// Free-form description of what the workbook does.
    pub description: String,
    /// Workbook source, bounded to `SOURCE_CODE_MAX_BYTES`.
    pub source_code: String,
    /// Users this workbook is shared with. Never contains the owner.
    #[serde(default)]
    pub shared_with: BTreeSet<UserId>,
}

impl Workbook {
    /// Creates a workbook with an empty sharing set.
    ///
    /// Does not validate; write paths call [`Workbook::validate`] before
    /// any persistence.
    pub fn new(
        owner_id: impl Into<UserId>,
        workbook_id: impl Into<WorkbookId>,
        name: impl Into<String>,
        description: impl Into<String>,
        source_code: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            workbook_id: workbook_id.into(),
            name: name.into(),
            description: description.into(),
            source_code: source_code.into(),
            shared_with: BTreeSet::new(),
        }
    }

    /// Checks record invariants.
    ///
    /// # Errors
    /// - `SourceCodeTooLarge` when `source_code` is over the inclusive
    ///   byte bound.
    /// - `SharedWithContainsOwner` when the owner appears in `shared_with`.
    pub fn validate(&self) -> Result<(), WorkbookValidationError> {
        if self.source_code.len() > SOURCE_CODE_MAX_BYTES {
            return Err(WorkbookValidationError::SourceCodeTooLarge {
                actual_bytes: self.source_code.len(),
                max_bytes: SOURCE_CODE_MAX_BYTES,
            });
        }
        if self.shared_with.contains(&self.owner_id) {
            return Err(WorkbookValidationError::SharedWithContainsOwner);
        }
        Ok(())
    }

    /// Returns whether `user_id` may see this workbook through sharing.
    pub fn is_shared_with(&self, user_id: &str) -> bool {
        self.shared_with.contains(user_id)
    }
}

/// Join record representing "this user may see this workbook."
///
/// Grants are derived from `Workbook::shared_with` by the record store and
/// are never an independent write path; see the repo module for the
/// consistency rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Workbook being shared. Part of the grant primary key.
    pub workbook_id: WorkbookId,
    /// User receiving access. Part of the grant primary key.
    pub user_id: UserId,
}

impl AccessGrant {
    pub fn new(workbook_id: impl Into<WorkbookId>, user_id: impl Into<UserId>) -> Self {
        Self {
            workbook_id: workbook_id.into(),
            user_id: user_id.into(),
        }
    }
}
