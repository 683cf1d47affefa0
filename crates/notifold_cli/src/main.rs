//! Command-line access to the notification store.
//!
//! # Responsibility
//! - Verify `notifold_core` linkage and report its version.
//! - Offer read-only inspection and bulk-read maintenance against a store file.
//!
//! File logging starts when `NOTIFOLD_LOG_DIR` is set. `NOTIFOLD_LOG_LEVEL`
//! overrides the build's default level.

use notifold_core::db::open_db;
use notifold_core::{
    init_logging, LoggingConfig, LoggingError, NotificationService, SqliteNotificationRepository,
    UserId,
};
use std::error::Error;
use std::process::ExitCode;

const USAGE: &str = "usage:
  notifold_cli version
  notifold_cli unread <db_path> <user_id>
  notifold_cli latest <db_path> <user_id> [limit]
  notifold_cli read-all <db_path> <user_id>";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), Box<dyn Error>> {
    let Some(command) = args.first() else {
        println!("{USAGE}");
        return Ok(());
    };

    if command == "version" {
        println!("notifold_core version={}", notifold_core::core_version());
        return Ok(());
    }

    let (db_path, user) = match (args.get(1), args.get(2)) {
        (Some(path), Some(user)) => (path, parse_user(user)?),
        _ => return Err(USAGE.into()),
    };
    if let Some(config) = logging_from_env()? {
        init_logging(&config)?;
    }
    let mut conn = open_db(db_path)?;
    let repo = SqliteNotificationRepository::try_new(&mut conn)?;
    let mut service = NotificationService::new(repo);

    match command.as_str() {
        "unread" => {
            println!("unread={}", service.get_unread_count_by_user(user)?);
        }
        "latest" => {
            let limit = args.get(3).map(|value| value.parse::<u32>()).transpose()?;
            let page = service.find_latest_by_user(user, limit, 0)?;
            println!("total={} applied_limit={}", page.total, page.applied_limit);
            for item in page.items {
                println!(
                    "{} {} {} {} activities={} updated_at={}",
                    item.id,
                    item.status.as_str(),
                    item.action.as_str(),
                    item.target,
                    item.activities.len(),
                    item.updated_at
                );
            }
        }
        "read-all" => {
            let summary = service.read(user)?;
            println!("matched={} modified={}", summary.matched, summary.modified);
        }
        _ => return Err(USAGE.into()),
    }
    Ok(())
}

fn parse_user(value: &str) -> Result<UserId, Box<dyn Error>> {
    UserId::parse_str(value.trim()).map_err(|err| format!("invalid user id `{value}`: {err}").into())
}

fn logging_from_env() -> Result<Option<LoggingConfig>, LoggingError> {
    let Ok(log_dir) = std::env::var("NOTIFOLD_LOG_DIR") else {
        return Ok(None);
    };
    let config = match std::env::var("NOTIFOLD_LOG_LEVEL") {
        Ok(level) => LoggingConfig::parse(&level, &log_dir)?,
        Err(_) => LoggingConfig::for_directory(&log_dir)?,
    };
    Ok(Some(config))
}
