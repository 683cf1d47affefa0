//! Notification aggregate model.
//!
//! # Responsibility
//! - Define the recipient-facing aggregate of one or more activities.
//! - Own the fold rule and status transitions applied by services.
//!
//! # Invariants
//! - Every folded activity shares the notification's aggregation key.
//! - `activities` is in arrival order, newest last, and never empty for a
//!   persisted notification.
//! - Folding is the only transition that moves status back to `Unread`.

use crate::model::activity::{Activity, ActivityAction, TargetId, TargetModel, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type NotificationId = Uuid;

/// Delivery/read state of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    /// Initial state and the state after every fold.
    Unread,
    /// Recipient saw it in a list or summary.
    Opened,
    /// Recipient acknowledged it.
    Read,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unread => "UNREAD",
            Self::Opened => "OPENED",
            Self::Read => "READ",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "UNREAD" => Some(Self::Unread),
            "OPENED" => Some(Self::Opened),
            "READ" => Some(Self::Read),
            _ => None,
        }
    }
}

/// Grouping identity for folding: `(recipient, target_model, target, action)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregationKey {
    pub recipient: UserId,
    pub target_model: TargetModel,
    pub target: TargetId,
    pub action: ActivityAction,
}

impl AggregationKey {
    pub fn for_activity(recipient: UserId, activity: &Activity) -> Self {
        Self {
            recipient,
            target_model: activity.target_model,
            target: activity.target,
            action: activity.action,
        }
    }
}

/// Recipient-facing aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    /// Recipient, never the actor.
    pub user: UserId,
    pub target_model: TargetModel,
    pub target: TargetId,
    pub action: ActivityAction,
    pub activities: Vec<Activity>,
    pub status: NotificationStatus,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds of the most recent fold.
    pub updated_at: i64,
}

impl Notification {
    /// Starts a new aggregate from its first activity.
    pub fn from_first_activity(recipient: UserId, activity: Activity, at: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: recipient,
            target_model: activity.target_model,
            target: activity.target,
            action: activity.action,
            activities: vec![activity],
            status: NotificationStatus::Unread,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn key(&self) -> AggregationKey {
        AggregationKey {
            recipient: self.user,
            target_model: self.target_model,
            target: self.target,
            action: self.action,
        }
    }

    /// Whether an activity at `reference_time` still folds into this aggregate.
    ///
    /// The lookback is right-open: exactly `window_ms` after `updated_at`
    /// starts a new aggregate.
    pub fn is_within_window(&self, reference_time: i64, window_ms: i64) -> bool {
        reference_time.saturating_sub(self.updated_at) < window_ms
    }

    /// Folds one more activity into this aggregate.
    ///
    /// Appends the activity, drops the oldest entries beyond
    /// `max_activities`, bumps `updated_at` (never backward) and resets the
    /// status to `Unread`. Returns the activities that were dropped.
    pub fn fold(&mut self, activity: Activity, at: i64, max_activities: usize) -> Vec<Activity> {
        self.activities.push(activity);
        let overflow = self.activities.len().saturating_sub(max_activities.max(1));
        let dropped = self.activities.drain(..overflow).collect();
        self.updated_at = self.updated_at.max(at);
        self.status = NotificationStatus::Unread;
        dropped
    }

    /// Distinct actors of the folded activities, most recent first.
    pub fn actors(&self) -> Vec<UserId> {
        let mut actors: Vec<UserId> = Vec::new();
        for activity in self.activities.iter().rev() {
            if !actors.contains(&activity.actor) {
                actors.push(activity.actor);
            }
        }
        actors
    }
}
