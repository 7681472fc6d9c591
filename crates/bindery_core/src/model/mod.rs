//! Domain model for workbook records and access grants.
//!
//! # Responsibility
//! - Define the canonical data structures used by core business logic.
//! - Keep sharing invariants enforceable at one place (`Workbook::validate`).
//!
//! # Invariants
//! - Every workbook is identified by the composite `(owner_id, workbook_id)`.
//! - Sharing state lives in `shared_with`; grant records are derived from it.

pub mod workbook;
