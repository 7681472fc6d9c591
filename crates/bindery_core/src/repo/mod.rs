//! Record-store abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the storage contract the sharing and query layers depend on.
//! - Isolate SQLite details from service/business orchestration.
//!
//! # Invariants
//! - Store writes must enforce `Workbook::validate()` before persistence.
//! - Store APIs return semantic outcomes (`ConditionFailed`, `NotFound`)
//!   in addition to transport errors; callers branch on them.

pub mod workbook_repo;
