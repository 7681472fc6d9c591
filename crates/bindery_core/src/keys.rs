//! Storage key schema: deterministic mapping from entity identity to
//! primary keys and secondary index keys. Key derivation is failure-free.

use crate::model::workbook::{AccessGrant, Workbook};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Primary key of a workbook record: `(owner_id, workbook_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkbookKey {
    owner_id: String,
    workbook_id: String,
}

impl WorkbookKey {
    pub fn new(owner_id: impl Into<String>, workbook_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            workbook_id: workbook_id.into(),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn workbook_id(&self) -> &str {
        &self.workbook_id
    }

    /// Secondary index key for "list my workbooks": the owner partition.
    pub fn owner_index_key(&self) -> &str {
        &self.owner_id
    }
}

impl Display for WorkbookKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.workbook_id)
    }
}

impl From<&Workbook> for WorkbookKey {
    fn from(workbook: &Workbook) -> Self {
        Self::new(workbook.owner_id.clone(), workbook.workbook_id.clone())
    }
}

/// Primary key of an access-grant record: `(workbook_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantKey {
    workbook_id: String,
    user_id: String,
}

impl GrantKey {
    pub fn new(workbook_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            workbook_id: workbook_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn workbook_id(&self) -> &str {
        &self.workbook_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Secondary index key for "list workbooks shared with me".
    pub fn user_index_key(&self) -> &str {
        &self.user_id
    }
}

impl Display for GrantKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.workbook_id, self.user_id)
    }
}

impl From<&AccessGrant> for GrantKey {
    fn from(grant: &AccessGrant) -> Self {
        Self::new(grant.workbook_id.clone(), grant.user_id.clone())
    }
}
