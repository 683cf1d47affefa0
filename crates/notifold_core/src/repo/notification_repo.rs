//! Notification repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the storage primitives the aggregation engine consumes: keyed
//!   window upsert, conditional open, bulk read, count-by-filter, listing and
//!   activity removal.
//! - Keep SQL details inside the notification store boundary.
//!
//! # Invariants
//! - Every find-then-write sequence runs inside one `IMMEDIATE` transaction,
//!   so the write lock is held from lookup to commit.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Activity order within a notification follows `notification_activities.seq`.

use crate::config::EngineConfig;
use crate::db::DbError;
use crate::model::activity::{Activity, ActivityAction, ActivityId, TargetModel, UserId};
use crate::model::notification::{
    AggregationKey, Notification, NotificationId, NotificationStatus,
};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const NOTIFICATIONS_DEFAULT_LIMIT: u32 = 10;
const NOTIFICATIONS_LIMIT_MAX: u32 = 50;

const NOTIFICATION_SELECT_SQL: &str = "SELECT
    id,
    user_id,
    target_model,
    target_id,
    action,
    status,
    created_at,
    updated_at
FROM notifications";

const ACTIVITY_SELECT_SQL: &str = "SELECT
    a.id,
    a.actor_id,
    a.target_model,
    a.target_id,
    a.action,
    a.created_at
FROM activities a";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for notification persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(NotificationId),
    InvalidData(String),
    /// An activity id was replayed with fields that differ from the stored row.
    ConflictingActivity(ActivityId),
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "notification not found: {id}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted notification data: {message}")
            }
            Self::ConflictingActivity(id) => {
                write!(f, "activity {id} is already stored with different fields")
            }
            Self::MissingRequiredTable(table) => {
                write!(f, "notification store is missing table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "notification store table `{table}` is missing column `{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Result of a keyed window upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub notification: Notification,
    /// `true` when no open window existed and a new aggregate was inserted.
    pub created: bool,
}

/// Counts reported by the bulk read transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadSummary {
    /// Notifications owned by the recipient.
    pub matched: u64,
    /// Notifications whose status actually changed to `Read`.
    pub modified: u64,
}

/// Counts reported by administrative activity removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemovalSummary {
    /// Links between the activity and notifications that were removed.
    pub detached: u64,
    /// Notifications deleted because no activity was left in them.
    pub removed_notifications: u64,
}

/// Query options for listing a recipient's notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationListQuery {
    pub recipient: UserId,
    /// Maximum rows to return. Defaults to 10 and clamps to 50.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Storage primitives consumed by the aggregation engine and lifecycle
/// manager.
pub trait NotificationRepository {
    /// Folds `activity` into the most recent notification for its key whose
    /// window is still open at `reference_time`, or inserts a new one.
    ///
    /// Lookup and write are atomic with respect to other writers.
    fn upsert_in_window(
        &mut self,
        recipient: UserId,
        activity: &Activity,
        reference_time: i64,
        config: &EngineConfig,
    ) -> RepoResult<UpsertOutcome>;
    /// Sets status to `Opened` for one notification owned by `recipient`.
    fn open(&mut self, recipient: UserId, id: NotificationId) -> RepoResult<Notification>;
    /// Moves every `Unread`/`Opened` notification of `recipient` to `Read`.
    fn mark_all_read(&mut self, recipient: UserId) -> RepoResult<ReadSummary>;
    fn count_by_status(&self, recipient: UserId, status: NotificationStatus) -> RepoResult<u64>;
    fn count_by_user(&self, recipient: UserId) -> RepoResult<u64>;
    fn get_notification(&self, id: NotificationId) -> RepoResult<Option<Notification>>;
    /// Lists notifications ordered by `updated_at DESC, id ASC`.
    fn list_by_user(&self, query: &NotificationListQuery) -> RepoResult<Vec<Notification>>;
    /// Detaches one activity everywhere and deletes notifications left empty.
    fn remove_activity(&mut self, activity_id: ActivityId) -> RepoResult<RemovalSummary>;
}

/// SQLite-backed notification repository.
pub struct SqliteNotificationRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteNotificationRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    ///
    /// # Errors
    /// - `MissingRequiredTable`/`MissingRequiredColumn` when the connection
    ///   was not bootstrapped through `db::open_db*`.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl NotificationRepository for SqliteNotificationRepository<'_> {
    fn upsert_in_window(
        &mut self,
        recipient: UserId,
        activity: &Activity,
        reference_time: i64,
        config: &EngineConfig,
    ) -> RepoResult<UpsertOutcome> {
        let key = AggregationKey::for_activity(recipient, activity);
        let max_activities = config.max_activities_per_notification as usize;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_activity(&tx, activity)?;

        let open_aggregate = find_latest_for_key(&tx, &key)?
            .filter(|latest| latest.is_within_window(reference_time, config.aggregation_window_ms));

        let outcome = match open_aggregate {
            Some(mut notification) => {
                let dropped = notification.fold(activity.clone(), reference_time, max_activities);
                tx.execute(
                    "UPDATE notifications
                     SET
                        status = ?2,
                        updated_at = ?3
                     WHERE id = ?1;",
                    params![
                        notification.id.to_string(),
                        notification.status.as_str(),
                        notification.updated_at,
                    ],
                )?;
                link_activity(&tx, notification.id, activity.id)?;
                if !dropped.is_empty() {
                    tx.execute(
                        "DELETE FROM notification_activities
                         WHERE seq IN (
                            SELECT seq
                            FROM notification_activities
                            WHERE notification_id = ?1
                            ORDER BY seq ASC
                            LIMIT ?2
                         );",
                        params![notification.id.to_string(), dropped.len() as i64],
                    )?;
                    for trimmed in &dropped {
                        delete_activity_if_unlinked(&tx, trimmed.id)?;
                    }
                }
                UpsertOutcome {
                    notification,
                    created: false,
                }
            }
            None => {
                let notification =
                    Notification::from_first_activity(recipient, activity.clone(), reference_time);
                tx.execute(
                    "INSERT INTO notifications (
                        id,
                        user_id,
                        target_model,
                        target_id,
                        action,
                        status,
                        created_at,
                        updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
                    params![
                        notification.id.to_string(),
                        notification.user.to_string(),
                        notification.target_model.as_str(),
                        notification.target.to_string(),
                        notification.action.as_str(),
                        notification.status.as_str(),
                        notification.created_at,
                        notification.updated_at,
                    ],
                )?;
                link_activity(&tx, notification.id, activity.id)?;
                UpsertOutcome {
                    notification,
                    created: true,
                }
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn open(&mut self, recipient: UserId, id: NotificationId) -> RepoResult<Notification> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE notifications
             SET status = ?3
             WHERE id = ?1
               AND user_id = ?2;",
            params![
                id.to_string(),
                recipient.to_string(),
                NotificationStatus::Opened.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        let notification = load_notification(&tx, id)?.ok_or(RepoError::NotFound(id))?;
        tx.commit()?;
        Ok(notification)
    }

    fn mark_all_read(&mut self, recipient: UserId) -> RepoResult<ReadSummary> {
        let recipient = recipient.to_string();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let matched: i64 = tx.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1;",
            [recipient.as_str()],
            |row| row.get(0),
        )?;
        let modified = tx.execute(
            "UPDATE notifications
             SET status = ?2
             WHERE user_id = ?1
               AND status IN (?3, ?4);",
            params![
                recipient,
                NotificationStatus::Read.as_str(),
                NotificationStatus::Unread.as_str(),
                NotificationStatus::Opened.as_str(),
            ],
        )?;
        tx.commit()?;

        Ok(ReadSummary {
            matched: to_count(matched)?,
            modified: modified as u64,
        })
    }

    fn count_by_status(&self, recipient: UserId, status: NotificationStatus) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM notifications
             WHERE user_id = ?1
               AND status = ?2;",
            params![recipient.to_string(), status.as_str()],
            |row| row.get(0),
        )?;
        to_count(count)
    }

    fn count_by_user(&self, recipient: UserId) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1;",
            [recipient.to_string()],
            |row| row.get(0),
        )?;
        to_count(count)
    }

    fn get_notification(&self, id: NotificationId) -> RepoResult<Option<Notification>> {
        load_notification(self.conn, id)
    }

    fn list_by_user(&self, query: &NotificationListQuery) -> RepoResult<Vec<Notification>> {
        let limit = normalize_notification_limit(query.limit);
        let mut stmt = self.conn.prepare(&format!(
            "{NOTIFICATION_SELECT_SQL}
             WHERE user_id = ?1
             ORDER BY updated_at DESC, id ASC
             LIMIT ?2 OFFSET ?3;"
        ))?;
        let mut rows = stmt.query(params![
            query.recipient.to_string(),
            i64::from(limit),
            i64::from(query.offset),
        ])?;

        let mut notifications = Vec::new();
        while let Some(row) = rows.next()? {
            notifications.push(parse_notification_row(self.conn, row)?);
        }
        Ok(notifications)
    }

    fn remove_activity(&mut self, activity_id: ActivityId) -> RepoResult<RemovalSummary> {
        let activity_id = activity_id.to_string();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let detached = tx.execute(
            "DELETE FROM notification_activities WHERE activity_id = ?1;",
            [activity_id.as_str()],
        )?;
        let removed_notifications = tx.execute(
            "DELETE FROM notifications
             WHERE NOT EXISTS (
                SELECT 1
                FROM notification_activities na
                WHERE na.notification_id = notifications.id
             );",
            [],
        )?;
        tx.execute(
            "DELETE FROM activities WHERE id = ?1;",
            [activity_id.as_str()],
        )?;
        tx.commit()?;

        Ok(RemovalSummary {
            detached: detached as u64,
            removed_notifications: removed_notifications as u64,
        })
    }
}

/// Normalizes list limit according to the listing contract.
pub fn normalize_notification_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => NOTIFICATIONS_DEFAULT_LIMIT,
        Some(value) if value > NOTIFICATIONS_LIMIT_MAX => NOTIFICATIONS_LIMIT_MAX,
        Some(value) => value,
    }
}

fn insert_activity(conn: &Connection, activity: &Activity) -> RepoResult<()> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO activities (
            id,
            actor_id,
            target_model,
            target_id,
            action,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            activity.id.to_string(),
            activity.actor.to_string(),
            activity.target_model.as_str(),
            activity.target.to_string(),
            activity.action.as_str(),
            activity.created_at,
        ],
    )?;
    if inserted == 1 {
        return Ok(());
    }

    // Stored activities are immutable: a replay must match field for field.
    let stored = conn
        .query_row(
            &format!("{ACTIVITY_SELECT_SQL} WHERE a.id = ?1;"),
            [activity.id.to_string()],
            |row| Ok(parse_activity_row(row)),
        )
        .optional()?
        .transpose()?;
    match stored {
        Some(stored) if stored == *activity => Ok(()),
        Some(_) => Err(RepoError::ConflictingActivity(activity.id)),
        None => Err(RepoError::InvalidData(format!(
            "activity {} was neither inserted nor found",
            activity.id
        ))),
    }
}

/// Drops an activity row once no notification references it anymore.
fn delete_activity_if_unlinked(conn: &Connection, activity_id: ActivityId) -> RepoResult<()> {
    conn.execute(
        "DELETE FROM activities
         WHERE id = ?1
           AND NOT EXISTS (
              SELECT 1
              FROM notification_activities
              WHERE activity_id = ?1
           );",
        [activity_id.to_string()],
    )?;
    Ok(())
}

fn link_activity(
    conn: &Connection,
    notification_id: NotificationId,
    activity_id: ActivityId,
) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO notification_activities (notification_id, activity_id)
         VALUES (?1, ?2);",
        params![notification_id.to_string(), activity_id.to_string()],
    )?;
    Ok(())
}

fn find_latest_for_key(conn: &Connection, key: &AggregationKey) -> RepoResult<Option<Notification>> {
    let mut stmt = conn.prepare(&format!(
        "{NOTIFICATION_SELECT_SQL}
         WHERE user_id = ?1
           AND target_model = ?2
           AND target_id = ?3
           AND action = ?4
         ORDER BY updated_at DESC, id ASC
         LIMIT 1;"
    ))?;
    let mut rows = stmt.query(params![
        key.recipient.to_string(),
        key.target_model.as_str(),
        key.target.to_string(),
        key.action.as_str(),
    ])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_notification_row(conn, row)?));
    }
    Ok(None)
}

fn load_notification(conn: &Connection, id: NotificationId) -> RepoResult<Option<Notification>> {
    let mut stmt = conn.prepare(&format!("{NOTIFICATION_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_notification_row(conn, row)?));
    }
    Ok(None)
}

fn load_activities(conn: &Connection, notification_id: &str) -> RepoResult<Vec<Activity>> {
    let mut stmt = conn.prepare(&format!(
        "{ACTIVITY_SELECT_SQL}
         INNER JOIN notification_activities na ON na.activity_id = a.id
         WHERE na.notification_id = ?1
         ORDER BY na.seq ASC;"
    ))?;
    let mut rows = stmt.query([notification_id])?;
    let mut activities = Vec::new();
    while let Some(row) = rows.next()? {
        activities.push(parse_activity_row(row)?);
    }
    Ok(activities)
}

fn parse_activity_row(row: &Row<'_>) -> RepoResult<Activity> {
    Ok(Activity {
        id: parse_uuid(row, "id", "activities.id")?,
        actor: parse_uuid(row, "actor_id", "activities.actor_id")?,
        target_model: parse_target_model(row, "activities.target_model")?,
        target: parse_uuid(row, "target_id", "activities.target_id")?,
        action: parse_action(row, "activities.action")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_notification_row(conn: &Connection, row: &Row<'_>) -> RepoResult<Notification> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in notifications.id"))
    })?;

    let status_text: String = row.get("status")?;
    let status = NotificationStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in notifications.status"
        ))
    })?;

    let activities = load_activities(conn, &id_text)?;
    if activities.is_empty() {
        return Err(RepoError::InvalidData(format!(
            "notification {id_text} has no activities"
        )));
    }

    Ok(Notification {
        id,
        user: parse_uuid(row, "user_id", "notifications.user_id")?,
        target_model: parse_target_model(row, "notifications.target_model")?,
        target: parse_uuid(row, "target_id", "notifications.target_id")?,
        action: parse_action(row, "notifications.action")?,
        activities,
        status,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_uuid(row: &Row<'_>, column: &str, location: &str) -> RepoResult<Uuid> {
    let value: String = row.get(column)?;
    Uuid::parse_str(&value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {location}")))
}

fn parse_target_model(row: &Row<'_>, location: &str) -> RepoResult<TargetModel> {
    let value: String = row.get("target_model")?;
    TargetModel::parse(&value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid target model `{value}` in {location}")))
}

fn parse_action(row: &Row<'_>, location: &str) -> RepoResult<ActivityAction> {
    let value: String = row.get("action")?;
    ActivityAction::parse(&value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid action `{value}` in {location}")))
}

fn to_count(value: i64) -> RepoResult<u64> {
    u64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("negative row count `{value}`")))
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    const REQUIRED: &[(&str, &[&str])] = &[
        (
            "notifications",
            &[
                "id",
                "user_id",
                "target_model",
                "target_id",
                "action",
                "status",
                "created_at",
                "updated_at",
            ],
        ),
        (
            "activities",
            &["id", "actor_id", "target_model", "target_id", "action", "created_at"],
        ),
        (
            "notification_activities",
            &["seq", "notification_id", "activity_id"],
        ),
    ];

    for &(table, columns) in REQUIRED {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists = conn
        .query_row(
            "SELECT 1
             FROM sqlite_master
             WHERE type = 'table' AND name = ?1;",
            [table],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
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
