//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `zidu_core` linkage.
//! - Expose the read-only diagnostic surface (per-user blob sizes) for
//!   operational health checks.
//!
//! Usage: `zidu_cli [db_path [user]]`. Without a path an in-memory
//! database is used, which exercises migrations and prints an empty
//! diagnostic report.

use std::process::ExitCode;
use zidu_core::db::{open_db, open_db_in_memory};
use zidu_core::{MigrationGate, ProgressStore, SqliteProgressStore, UserId};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("zidu_cli: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    let mut args = std::env::args().skip(1);
    let db_path = args.next();
    let user_arg = args.next();

    println!("zidu_core version={}", zidu_core::core_version());

    let conn = match &db_path {
        Some(path) => open_db(path).map_err(|err| err.to_string())?,
        None => open_db_in_memory().map_err(|err| err.to_string())?,
    };
    let store = SqliteProgressStore::new(&conn);

    let gate = MigrationGate::new(SqliteProgressStore::new(&conn));
    let report = gate.migrate_if_needed().map_err(|err| err.to_string())?;
    println!("legacy_migrated={}", report.migrated);

    if let Some(user_arg) = user_arg {
        let user = UserId::new(user_arg).map_err(|err| err.to_string())?;
        let sizes = store.blob_sizes(&user).map_err(|err| err.to_string())?;
        if sizes.is_empty() {
            println!("user={user} blobs=none");
        }
        for (key, bytes) in sizes {
            println!("user={user} key={key} bytes={bytes}");
        }
    }

    Ok(())
}
