//! Notification aggregation and lifecycle service.
//!
//! # Responsibility
//! - Validate incoming activities and fold them into windowed notifications.
//! - Drive the `Unread -> Opened -> Read` status transitions.
//! - Answer unread-count and listing queries for recipients.
//!
//! # Invariants
//! - A rejected activity never creates or mutates a notification.
//! - Storage errors are returned unchanged; nothing is retried here.
//! - The service keeps no notification state of its own; the repository is
//!   the single source of truth, so several instances may share one store.

use crate::config::{ConfigError, EngineConfig};
use crate::model::activity::{ActivityId, ActivityPayload, ActivityValidationError, UserId};
use crate::model::notification::{Notification, NotificationId, NotificationStatus};
use crate::repo::notification_repo::{
    normalize_notification_limit, NotificationListQuery, NotificationRepository, ReadSummary,
    RemovalSummary, RepoError, RepoResult,
};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Service error for notification use-cases.
#[derive(Debug)]
pub enum NotificationServiceError {
    /// Activity payload failed validation; nothing was written.
    Validation(ActivityValidationError),
    /// Notification does not exist for the given recipient.
    NotFound(NotificationId),
    /// Persistence-layer failure, unmodified.
    Repo(RepoError),
    InvalidConfig(ConfigError),
}

impl Display for NotificationServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "notification not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InvalidConfig(err) => write!(f, "{err}"),
        }
    }
}

impl Error for NotificationServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::InvalidConfig(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<RepoError> for NotificationServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<ActivityValidationError> for NotificationServiceError {
    fn from(value: ActivityValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ConfigError> for NotificationServiceError {
    fn from(value: ConfigError) -> Self {
        Self::InvalidConfig(value)
    }
}

pub type ServiceResult<T> = Result<T, NotificationServiceError>;

/// Page envelope returned by `find_latest_by_user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPage {
    /// Items sorted by `updated_at DESC, id ASC`.
    pub items: Vec<Notification>,
    /// Effective normalized limit used by the query.
    pub applied_limit: u32,
    pub offset: u32,
    /// Total notifications owned by the recipient.
    pub total: u64,
}

/// Aggregation engine and lifecycle manager over a notification repository.
pub struct NotificationService<R: NotificationRepository> {
    repo: R,
    config: EngineConfig,
}

impl<R: NotificationRepository> NotificationService<R> {
    /// Creates a service with the default one-week window.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            config: EngineConfig::default(),
        }
    }

    /// Creates a service with explicit tunables.
    ///
    /// # Errors
    /// - `InvalidConfig` when `config` fails validation.
    pub fn with_config(repo: R, config: EngineConfig) -> ServiceResult<Self> {
        config.validate()?;
        Ok(Self { repo, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Folds one activity into the recipient's notifications.
    ///
    /// # Contract
    /// - `reference_time` defaults to now and anchors the window lookback;
    ///   it also becomes `createdAt` of an activity that has none.
    /// - A notification for the same key whose `updated_at` is less than one
    ///   window before `reference_time` receives the activity and goes back
    ///   to `Unread`; otherwise a new `Unread` notification is created.
    /// - Find-or-create is atomic per store.
    ///
    /// # Errors
    /// - `Validation` for a rejected payload (no write happened).
    /// - `Repo` for storage failures.
    pub fn upsert_by_activity(
        &mut self,
        recipient: UserId,
        payload: &ActivityPayload,
        reference_time: Option<i64>,
    ) -> ServiceResult<Notification> {
        let reference_time = reference_time.unwrap_or_else(now_epoch_ms);
        let activity = match payload.validate(reference_time) {
            Ok(activity) => activity,
            Err(err) => {
                warn!(
                    "event=notification_upsert module=service status=error error_code=validation_failed error={}",
                    err
                );
                return Err(err.into());
            }
        };

        let outcome =
            self.repo
                .upsert_in_window(recipient, &activity, reference_time, &self.config)?;
        debug!(
            "event=notification_upsert module=service status=ok outcome={} notification_id={} activity_id={} activities={}",
            if outcome.created { "created" } else { "folded" },
            outcome.notification.id,
            activity.id,
            outcome.notification.activities.len()
        );
        Ok(outcome.notification)
    }

    /// Marks one notification owned by `recipient` as opened.
    ///
    /// # Errors
    /// - `NotFound` when the id does not exist or belongs to someone else.
    pub fn open(&mut self, recipient: UserId, id: NotificationId) -> ServiceResult<Notification> {
        let notification = self.repo.open(recipient, id)?;
        debug!(
            "event=notification_open module=service status=ok notification_id={}",
            notification.id
        );
        Ok(notification)
    }

    /// Marks every unread or opened notification of `recipient` as read.
    ///
    /// Calling it again right away reports `modified = 0`.
    pub fn read(&mut self, recipient: UserId) -> ServiceResult<ReadSummary> {
        let summary = self.repo.mark_all_read(recipient)?;
        debug!(
            "event=notification_read_all module=service status=ok matched={} modified={}",
            summary.matched, summary.modified
        );
        Ok(summary)
    }

    /// Counts notifications in `Unread`. `Opened` ones are not counted.
    pub fn get_unread_count_by_user(&self, recipient: UserId) -> ServiceResult<u64> {
        Ok(self
            .repo
            .count_by_status(recipient, NotificationStatus::Unread)?)
    }

    /// Lists the recipient's most recently updated notifications.
    ///
    /// `limit` defaults to 10 and is clamped to 50.
    pub fn find_latest_by_user(
        &self,
        recipient: UserId,
        limit: Option<u32>,
        offset: u32,
    ) -> ServiceResult<NotificationPage> {
        let applied_limit = normalize_notification_limit(limit);
        let items = self.repo.list_by_user(&NotificationListQuery {
            recipient,
            limit: Some(applied_limit),
            offset,
        })?;
        let total = self.repo.count_by_user(recipient)?;
        Ok(NotificationPage {
            items,
            applied_limit,
            offset,
            total,
        })
    }

    pub fn get_notification(&self, id: NotificationId) -> RepoResult<Option<Notification>> {
        self.repo.get_notification(id)
    }

    /// Removes an activity from every notification and prunes empty ones.
    ///
    /// Administrative path; normal operation never deletes notifications.
    pub fn remove_activity(&mut self, activity_id: ActivityId) -> ServiceResult<RemovalSummary> {
        let summary = self.repo.remove_activity(activity_id)?;
        info!(
            "event=activity_remove module=service status=ok activity_id={} detached={} removed_notifications={}",
            activity_id, summary.detached, summary.removed_notifications
        );
        Ok(summary)
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}
