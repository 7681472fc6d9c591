//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate record-store calls into the consumer-facing contract.
//! - Keep adapters (CLI/HTTP) decoupled from storage details.

pub mod workbook_service;
