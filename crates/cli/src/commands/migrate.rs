//! Brings the deployment ledger schema up to date and reports what the
//! database now holds.

use serde::Serialize;

use azops_db::connect_with_settings;
use azops_db::migrations::{migrate_ledger, SchemaReport};

use crate::commands::{block_on, load_config, CommandResult, FailureClass};

#[derive(Debug, Serialize)]
struct MigrateDetails {
    database_url: String,
    applied: usize,
    known: usize,
    tables: Vec<String>,
}

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    // One connection: an in-memory ledger only exists on the connection that created it.
    let migrated = block_on(async {
        let pool = connect_with_settings(&config.database.url, 1, config.database.timeout_secs)
            .await
            .map_err(|error| (FailureClass::DbConnectivity, error.to_string()))?;
        let report = migrate_ledger(&pool)
            .await
            .map_err(|error| (FailureClass::Migration, error.to_string()));
        pool.close().await;
        report
    });

    let report: SchemaReport = match migrated {
        Ok(Ok(report)) => report,
        Ok(Err((class, message))) => return CommandResult::failed("migrate", class, message),
        Err(error) => {
            return CommandResult::failed(
                "migrate",
                FailureClass::RuntimeInit,
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let message = match report.applied {
        0 => "ledger schema already current".to_string(),
        applied => format!("applied {applied} of {} ledger migrations", report.known),
    };
    CommandResult::ok(
        "migrate",
        message,
        MigrateDetails {
            database_url: config.database.url.clone(),
            applied: report.applied,
            known: report.known,
            tables: report.tables,
        },
    )
}
