//! Workbook record-store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the only code path that touches the persistent medium.
//! - Expose conditional writes (must-not-exist put, compare-and-swap
//!   attribute update) and index-scoped queries.
//!
//! # Invariants
//! - Write paths call `Workbook::validate()` before SQL mutations.
//! - `shared_with` is persisted as canonical JSON (set members in their
//!   canonical order), so set equality is byte equality and the
//!   compare-and-swap condition is a plain value comparison.
//! - Access-grant rows are derived from `shared_with` and written only in
//!   the same transaction as the workbook row they mirror; the two
//!   representations cannot diverge. Grants are append-only (revocation is
//!   out of scope).
//! - Query operations are evaluated by SQLite against the named secondary
//!   indexes (`idx_workbooks_owner`, `idx_access_grants_user`): the index
//!   narrows the scanned set server-side, this process never filters a
//!   full table scan client-side.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::keys::{GrantKey, WorkbookKey};
use crate::model::workbook::{AccessGrant, UserId, Workbook, WorkbookValidationError};
use log::debug;
use rusqlite::{params, Connection, ErrorCode, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

const WORKBOOK_SELECT_SQL: &str = "SELECT
    owner_id,
    workbook_id,
    name,
    description,
    source_code,
    shared_with
FROM workbooks";

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors and expected non-success outcomes of record-store operations.
///
/// `ConditionFailed` and `NotFound` are outcomes callers branch on;
/// `Db` is the non-recoverable store-unavailable class.
#[derive(Debug)]
pub enum StoreError {
    /// Record violates a domain invariant; rejected before any SQL.
    Validation(WorkbookValidationError),
    /// Underlying SQLite/bootstrap failure. Not retried at this layer.
    Db(DbError),
    /// A write condition did not hold at commit time.
    ConditionFailed,
    /// Referenced workbook does not exist.
    NotFound(WorkbookKey),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::ConditionFailed => write!(f, "write condition failed"),
            Self::NotFound(key) => write!(f, "workbook not found: {key}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "required table `{table}` is missing")
            }
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column `{column}` is missing from table `{table}`")
            }
            Self::InvalidData(message) => {
                write!(f, "invalid persisted workbook data: {message}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<WorkbookValidationError> for StoreError {
    fn from(value: WorkbookValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Condition evaluated atomically with a workbook put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PutCondition {
    /// Unconditional write: last writer wins. Preserves `created_at` when
    /// the key already exists.
    #[default]
    None,
    /// The primary key must not already exist; the loser of a concurrent
    /// double-create receives `ConditionFailed` and never clobbers the
    /// winner.
    KeyMustNotExist,
}

/// Record-store contract for workbook and access-grant persistence.
///
/// The service layer depends only on this trait; tests substitute doubles
/// to exercise conflict handling deterministically.
pub trait WorkbookStore {
    /// Writes a workbook record, evaluating `condition` atomically with
    /// the write. Grant rows for `shared_with` members are maintained in
    /// the same transaction.
    fn put_workbook(&mut self, workbook: &Workbook, condition: PutCondition) -> StoreResult<()>;

    /// Point lookup by primary key. Absence is `Ok(None)`, not an error.
    fn get_workbook(&self, key: &WorkbookKey) -> StoreResult<Option<Workbook>>;

    /// Atomically replaces `shared_with` iff its stored value still equals
    /// `expected` (compare-and-swap). Newly granted members gain grant
    /// rows in the same transaction.
    ///
    /// # Errors
    /// - `ConditionFailed` when the record exists but the stored value
    ///   moved; callers re-read and retry.
    /// - `NotFound` when the record does not exist.
    fn update_shared_with(
        &mut self,
        key: &WorkbookKey,
        new_value: &BTreeSet<UserId>,
        expected: &BTreeSet<UserId>,
    ) -> StoreResult<()>;

    /// All workbooks owned by `owner_id`, via the owner secondary index.
    fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Workbook>>;

    /// All workbooks shared with `user_id`, via the grant secondary index
    /// joined back to workbook rows. Cost is proportional to the number of
    /// grants for the user, not to table size.
    fn list_shared_with(&self, user_id: &str) -> StoreResult<Vec<Workbook>>;

    /// All grant rows referencing `workbook_id`, in canonical user order.
    fn grants_for_workbook(&self, workbook_id: &str) -> StoreResult<Vec<AccessGrant>>;
}

/// SQLite-backed workbook store.
pub struct SqliteWorkbookStore<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteWorkbookStore<'conn> {
    /// Constructs a store from a migrated/ready connection.
    pub fn try_new(conn: &'conn mut Connection) -> StoreResult<Self> {
        ensure_workbook_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl WorkbookStore for SqliteWorkbookStore<'_> {
    fn put_workbook(&mut self, workbook: &Workbook, condition: PutCondition) -> StoreResult<()> {
        workbook.validate()?;
        let shared_with = encode_shared_with(&workbook.shared_with)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let insert_result = match condition {
            PutCondition::KeyMustNotExist => tx.execute(
                "INSERT INTO workbooks (
                    owner_id,
                    workbook_id,
                    name,
                    description,
                    source_code,
                    shared_with,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6,
                    (strftime('%s', 'now') * 1000),
                    (strftime('%s', 'now') * 1000));",
                params![
                    workbook.owner_id,
                    workbook.workbook_id,
                    workbook.name,
                    workbook.description,
                    workbook.source_code,
                    shared_with,
                ],
            ),
            PutCondition::None => tx.execute(
                "INSERT INTO workbooks (
                    owner_id,
                    workbook_id,
                    name,
                    description,
                    source_code,
                    shared_with,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6,
                    (strftime('%s', 'now') * 1000),
                    (strftime('%s', 'now') * 1000))
                ON CONFLICT (owner_id, workbook_id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    source_code = excluded.source_code,
                    shared_with = excluded.shared_with,
                    updated_at = (strftime('%s', 'now') * 1000);",
                params![
                    workbook.owner_id,
                    workbook.workbook_id,
                    workbook.name,
                    workbook.description,
                    workbook.source_code,
                    shared_with,
                ],
            ),
        };

        match insert_result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::ConditionFailed);
            }
            Err(err) => return Err(err.into()),
        }

        for member in &workbook.shared_with {
            insert_grant_in_tx(&tx, &GrantKey::new(workbook.workbook_id.clone(), member.clone()))?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_workbook(&self, key: &WorkbookKey) -> StoreResult<Option<Workbook>> {
        let mut stmt = self.conn.prepare(&format!(
            "{WORKBOOK_SELECT_SQL}
             WHERE owner_id = ?1
               AND workbook_id = ?2;"
        ))?;

        let mut rows = stmt.query(params![key.owner_id(), key.workbook_id()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_workbook_row(row)?));
        }

        Ok(None)
    }

    fn update_shared_with(
        &mut self,
        key: &WorkbookKey,
        new_value: &BTreeSet<UserId>,
        expected: &BTreeSet<UserId>,
    ) -> StoreResult<()> {
        if new_value.contains(key.owner_id()) {
            return Err(WorkbookValidationError::SharedWithContainsOwner.into());
        }
        let new_encoded = encode_shared_with(new_value)?;
        let expected_encoded = encode_shared_with(expected)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE workbooks
             SET
                shared_with = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE owner_id = ?1
               AND workbook_id = ?2
               AND shared_with = ?4;",
            params![
                key.owner_id(),
                key.workbook_id(),
                new_encoded,
                expected_encoded,
            ],
        )?;

        if changed == 0 {
            // Dropping the transaction rolls back; distinguish a moved
            // value from a missing record so callers can branch.
            return if workbook_exists_in_tx(&tx, key)? {
                Err(StoreError::ConditionFailed)
            } else {
                Err(StoreError::NotFound(key.clone()))
            };
        }

        for member in new_value.difference(expected) {
            insert_grant_in_tx(&tx, &GrantKey::new(key.workbook_id(), member.clone()))?;
        }

        tx.commit()?;
        Ok(())
    }

    fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Workbook>> {
        let mut stmt = self.conn.prepare(&format!(
            "{WORKBOOK_SELECT_SQL}
             WHERE owner_id = ?1
             ORDER BY workbook_id ASC;"
        ))?;

        let mut rows = stmt.query([owner_id])?;
        let mut workbooks = Vec::new();
        while let Some(row) = rows.next()? {
            workbooks.push(parse_workbook_row(row)?);
        }

        Ok(workbooks)
    }

    fn list_shared_with(&self, user_id: &str) -> StoreResult<Vec<Workbook>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                w.owner_id,
                w.workbook_id,
                w.name,
                w.description,
                w.source_code,
                w.shared_with
             FROM workbooks w
             INNER JOIN access_grants g ON g.workbook_id = w.workbook_id
             WHERE g.user_id = ?1
             ORDER BY w.owner_id ASC, w.workbook_id ASC;",
        )?;

        let mut rows = stmt.query([user_id])?;
        let mut workbooks = Vec::new();
        while let Some(row) = rows.next()? {
            workbooks.push(parse_workbook_row(row)?);
        }

        Ok(workbooks)
    }

    fn grants_for_workbook(&self, workbook_id: &str) -> StoreResult<Vec<AccessGrant>> {
        let mut stmt = self.conn.prepare(
            "SELECT workbook_id, user_id
             FROM access_grants
             WHERE workbook_id = ?1
             ORDER BY user_id ASC;",
        )?;

        let mut rows = stmt.query([workbook_id])?;
        let mut grants = Vec::new();
        while let Some(row) = rows.next()? {
            grants.push(AccessGrant {
                workbook_id: row.get("workbook_id")?,
                user_id: row.get("user_id")?,
            });
        }

        Ok(grants)
    }
}

fn insert_grant_in_tx(tx: &Transaction<'_>, key: &GrantKey) -> StoreResult<()> {
    // INSERT OR IGNORE is the uniqueness condition on (workbook_id,
    // user_id): a duplicate grant is a no-op rather than an error.
    tx.execute(
        "INSERT OR IGNORE INTO access_grants (workbook_id, user_id, granted_at)
         VALUES (?1, ?2, (strftime('%s', 'now') * 1000));",
        params![key.workbook_id(), key.user_id()],
    )?;
    debug!("event=grant_insert module=repo status=ok key={key}");
    Ok(())
}

fn workbook_exists_in_tx(tx: &Transaction<'_>, key: &WorkbookKey) -> StoreResult<bool> {
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM workbooks
            WHERE owner_id = ?1
              AND workbook_id = ?2
        );",
        params![key.owner_id(), key.workbook_id()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn parse_workbook_row(row: &Row<'_>) -> StoreResult<Workbook> {
    let shared_with_text: String = row.get("shared_with")?;
    let shared_with = decode_shared_with(&shared_with_text)?;

    let workbook = Workbook {
        owner_id: row.get("owner_id")?,
        workbook_id: row.get("workbook_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        source_code: row.get("source_code")?,
        shared_with,
    };
    workbook.validate()?;
    Ok(workbook)
}

fn encode_shared_with(shared_with: &BTreeSet<UserId>) -> StoreResult<String> {
    serde_json::to_string(shared_with)
        .map_err(|err| StoreError::InvalidData(format!("failed to encode shared_with: {err}")))
}

fn decode_shared_with(value: &str) -> StoreResult<BTreeSet<UserId>> {
    serde_json::from_str(value).map_err(|_| {
        StoreError::InvalidData(format!(
            "invalid shared_with value `{value}` in workbooks.shared_with"
        ))
    })
}

fn ensure_workbook_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "workbooks")? {
        return Err(StoreError::MissingRequiredTable("workbooks"));
    }
    for column in [
        "owner_id",
        "workbook_id",
        "name",
        "description",
        "source_code",
        "shared_with",
        "created_at",
        "updated_at",
    ] {
        if !table_has_column(conn, "workbooks", column)? {
            return Err(StoreError::MissingRequiredColumn {
                table: "workbooks",
                column,
            });
        }
    }

    if !table_exists(conn, "access_grants")? {
        return Err(StoreError::MissingRequiredTable("access_grants"));
    }
    for column in ["workbook_id", "user_id", "granted_at"] {
        if !table_has_column(conn, "access_grants", column)? {
            return Err(StoreError::MissingRequiredColumn {
                table: "access_grants",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
