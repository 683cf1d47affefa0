//! Schema versions of the notification store.
//!
//! Each step is a SQL script tagged with the `PRAGMA user_version` it leaves
//! behind. Steps run oldest first, and a store is only ever moved forward.
//!
//! Several engine instances may bootstrap the same fresh file at once. The
//! version is therefore decided under the write lock: the runner takes an
//! `IMMEDIATE` transaction, reads the version inside it, and applies only the
//! steps still missing at that point. Late openers find the work done.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::{Connection, TransactionBehavior};

struct SchemaStep {
    version: u32,
    script: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    script: include_str!("0001_init.sql"),
}];

/// Newest schema version this build knows how to create.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Reads the schema version recorded in the store header.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?)
}

/// Brings the store up to [`latest_version`].
///
/// # Errors
/// - `DbError::UnsupportedSchemaVersion` when a newer build already wrote
///   the file.
/// - `DbError::Migration` when a step script fails; nothing is applied.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let latest = latest_version();
    // Versions only grow, so an up-to-date header needs no lock.
    if check_version(schema_version(conn)?, latest)? == latest {
        return Ok(());
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let found = check_version(schema_version(&tx)?, latest)?;
    if found == latest {
        debug!("event=db_migrate module=db status=skipped reason=applied_concurrently version={found}");
        return Ok(());
    }

    for step in SCHEMA_STEPS.iter().skip_while(|step| step.version <= found) {
        tx.execute_batch(step.script)
            .and_then(|()| tx.pragma_update(None, "user_version", step.version))
            .map_err(|source| DbError::Migration {
                version: step.version,
                source,
            })?;
    }
    tx.commit()?;

    info!("event=db_migrate module=db status=ok from_version={found} to_version={latest}");
    Ok(())
}

fn check_version(found: u32, latest: u32) -> DbResult<u32> {
    if found > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: found,
            latest_supported: latest,
        });
    }
    Ok(found)
}
