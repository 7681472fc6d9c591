//! Bindery command-line adapter.
//!
//! # Responsibility
//! - Convert an argv request into a call against the core service
//!   contract and serialize the result as JSON on stdout.
//! - Map the core error taxonomy to process exit codes so scripts can
//!   branch without parsing messages: 0 ok (including already-shared),
//!   1 usage/internal, 2 validation, 3 not-found, 4 conflict,
//!   5 persistence.

use bindery_core::db::{open_db, DbError};
use bindery_core::{
    default_log_level, init_logging, CreateWorkbookRequest, ServiceError, SqliteWorkbookStore,
    WorkbookService,
};
use serde_json::json;
use std::env;
use std::process::ExitCode;

const DEFAULT_DB_PATH: &str = "bindery.db";

const USAGE: &str = "usage: bindery [--db <path>] <command> [args]

commands:
  create <owner-id> <name> <description> <source-code>
  list <owner-id>
  shared <user-id>
  share <owner-id> <workbook-id> <grantee-id>";

enum CliError {
    Usage(String),
    Db(DbError),
    Service(ServiceError),
    Internal(String),
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<ServiceError> for CliError {
    fn from(value: ServiceError) -> Self {
        Self::Service(value)
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(message)) => {
            eprintln!("{message}\n\n{USAGE}");
            ExitCode::from(1)
        }
        Err(CliError::Internal(message)) => {
            eprintln!("error: {message}");
            ExitCode::from(1)
        }
        Err(CliError::Db(err)) => {
            eprintln!("error: {err}");
            ExitCode::from(5)
        }
        Err(CliError::Service(err)) => {
            eprintln!("error: {err}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run(mut args: Vec<String>) -> Result<(), CliError> {
    if let Ok(log_dir) = env::var("BINDERY_LOG_DIR") {
        // Logging is optional for the CLI; a bad directory should not
        // block the requested operation.
        if let Err(err) = init_logging(default_log_level(), &log_dir) {
            eprintln!("warning: {err}");
        }
    }

    let mut db_path = DEFAULT_DB_PATH.to_string();
    if args.first().map(String::as_str) == Some("--db") {
        if args.len() < 2 {
            return Err(CliError::Usage("--db requires a path".to_string()));
        }
        db_path = args[1].clone();
        args.drain(..2);
    }

    let Some((command, operands)) = args.split_first() else {
        return Err(CliError::Usage("missing command".to_string()));
    };

    let mut conn = open_db(&db_path)?;
    let store = SqliteWorkbookStore::try_new(&mut conn).map_err(ServiceError::from)?;
    let mut service = WorkbookService::new(store);

    match (command.as_str(), operands) {
        ("create", [owner_id, name, description, source_code]) => {
            let request = CreateWorkbookRequest {
                name: name.clone(),
                description: description.clone(),
                source_code: source_code.clone(),
            };
            let workbook_id = service.create_workbook(owner_id, &request)?;
            print_json(&json!({ "workbook_id": workbook_id }))
        }
        ("list", [owner_id]) => {
            let workbooks = service.list_owned(owner_id)?;
            let encoded = serde_json::to_value(&workbooks)
                .map_err(|err| CliError::Internal(format!("failed to encode workbooks: {err}")))?;
            print_json(&encoded)
        }
        ("shared", [user_id]) => {
            let workbooks = service.list_shared(user_id)?;
            let encoded = serde_json::to_value(&workbooks)
                .map_err(|err| CliError::Internal(format!("failed to encode workbooks: {err}")))?;
            print_json(&encoded)
        }
        ("share", [owner_id, workbook_id, grantee_id]) => {
            match service.share(owner_id, workbook_id, grantee_id) {
                Ok(()) => print_json(&json!({ "status": "shared" })),
                // Idempotent no-op; the grant is already in place.
                Err(ServiceError::AlreadyShared { .. }) => {
                    print_json(&json!({ "status": "already_shared" }))
                }
                Err(err) => Err(err.into()),
            }
        }
        (other, _) => Err(CliError::Usage(format!(
            "unknown command or wrong arguments for `{other}`"
        ))),
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    let encoded = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::Internal(format!("failed to encode response: {err}")))?;
    println!("{encoded}");
    Ok(())
}

fn exit_code_for(err: &ServiceError) -> u8 {
    match err {
        ServiceError::Validation(_) => 2,
        ServiceError::WorkbookNotFound(_) => 3,
        // Reported as success by the share path; mapped here for
        // completeness should other commands surface it.
        ServiceError::AlreadyShared { .. } => 0,
        ServiceError::CreateConflict(_) | ServiceError::ConflictRetryExhausted { .. } => 4,
        ServiceError::Persistence(_) => 5,
    }
}
