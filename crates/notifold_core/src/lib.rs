//! Activity-to-notification aggregation core.
//! This crate owns the fold/window rules and the notification status lifecycle.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, EngineConfig};
pub use logging::{init_logging, logging_status, LogLevel, LoggingConfig, LoggingError};
pub use model::activity::{
    Activity, ActivityAction, ActivityId, ActivityPayload, ActivityValidationError, TargetId,
    TargetModel, UserId,
};
pub use model::notification::{AggregationKey, Notification, NotificationId, NotificationStatus};
pub use repo::notification_repo::{
    NotificationListQuery, NotificationRepository, ReadSummary, RemovalSummary, RepoError,
    RepoResult, SqliteNotificationRepository, UpsertOutcome,
};
pub use service::notification_service::{
    now_epoch_ms, NotificationPage, NotificationService, NotificationServiceError, ServiceResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
