//! Activity domain model and producer-payload validation.
//!
//! # Responsibility
//! - Define the immutable activity event consumed by the aggregation engine.
//! - Validate raw producer payloads before any notification is touched.
//!
//! # Invariants
//! - `target_model` always belongs to the closed `TargetModel` set.
//! - An `Activity` value is never mutated after validation.
//! - Validation failures carry a message prefixed with `Validation failed`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Producer-assigned activity identifier.
pub type ActivityId = Uuid;

/// User identifier for actors and recipients.
pub type UserId = Uuid;

/// Identifier of the entity an activity happened on.
pub type TargetId = Uuid;

/// Kind of entity an activity targets.
///
/// Closed set. Payloads naming anything else are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetModel {
    Page,
}

impl TargetModel {
    /// Stable tag used on the wire and in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "Page",
        }
    }

    /// Parses a wire/storage tag. Matching is exact.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Page" => Some(Self::Page),
            _ => None,
        }
    }
}

/// What happened to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    Comment,
    Update,
    Mention,
    Like,
    Bookmark,
}

impl ActivityAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Comment => "COMMENT",
            Self::Update => "UPDATE",
            Self::Mention => "MENTION",
            Self::Like => "LIKE",
            Self::Bookmark => "BOOKMARK",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "COMMENT" => Some(Self::Comment),
            "UPDATE" => Some(Self::Update),
            "MENTION" => Some(Self::Mention),
            "LIKE" => Some(Self::Like),
            "BOOKMARK" => Some(Self::Bookmark),
            _ => None,
        }
    }
}

/// Validated, immutable activity event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: ActivityId,
    /// User who performed the action.
    pub actor: UserId,
    pub target_model: TargetModel,
    pub target: TargetId,
    pub action: ActivityAction,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl Activity {
    /// Creates an activity with a generated id.
    pub fn new(
        actor: UserId,
        target_model: TargetModel,
        target: TargetId,
        action: ActivityAction,
        created_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor,
            target_model,
            target,
            action,
            created_at,
        }
    }

    /// Returns the raw payload shape of this activity.
    ///
    /// Useful for producers that already hold typed values.
    pub fn to_payload(&self) -> ActivityPayload {
        ActivityPayload {
            id: Some(self.id.to_string()),
            actor: Some(self.actor.to_string()),
            target_model: Some(self.target_model.as_str().to_string()),
            target: Some(self.target.to_string()),
            action: Some(self.action.as_str().to_string()),
            created_at: Some(self.created_at),
        }
    }
}

/// Raw activity as handed over by a producer.
///
/// Every field is optional text so that bad input surfaces as a
/// `ActivityValidationError` instead of a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPayload {
    pub id: Option<String>,
    pub actor: Option<String>,
    pub target_model: Option<String>,
    pub target: Option<String>,
    pub action: Option<String>,
    pub created_at: Option<i64>,
}

impl ActivityPayload {
    /// Validates this payload into an `Activity`.
    ///
    /// # Contract
    /// - `actor`, `target`, `targetModel` and `action` are required.
    /// - A missing `id` is generated; a missing `createdAt` becomes
    ///   `ingested_at`.
    /// - Identifiers must parse as UUIDs.
    ///
    /// # Errors
    /// - Returns the first failing check as `ActivityValidationError`.
    pub fn validate(&self, ingested_at: i64) -> Result<Activity, ActivityValidationError> {
        let actor = parse_id("actor", required("actor", self.actor.as_deref())?)?;
        let target = parse_id("target", required("target", self.target.as_deref())?)?;
        let action_text = required("action", self.action.as_deref())?;
        let model_text = required("targetModel", self.target_model.as_deref())?;

        let target_model = TargetModel::parse(model_text).ok_or_else(|| {
            ActivityValidationError::UnsupportedTargetModel(model_text.to_string())
        })?;
        let action = ActivityAction::parse(action_text)
            .ok_or_else(|| ActivityValidationError::UnsupportedAction(action_text.to_string()))?;

        let id = match self.id.as_deref() {
            Some(value) => parse_id("id", value)?,
            None => Uuid::new_v4(),
        };

        Ok(Activity {
            id,
            actor,
            target_model,
            target,
            action,
            created_at: self.created_at.unwrap_or(ingested_at),
        })
    }
}

/// Activity payload rejection reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityValidationError {
    MissingField(&'static str),
    InvalidId { field: &'static str, value: String },
    UnsupportedTargetModel(String),
    UnsupportedAction(String),
}

impl Display for ActivityValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => {
                write!(f, "Validation failed: `{field}` is required")
            }
            Self::InvalidId { field, value } => {
                write!(f, "Validation failed: `{field}` is not a valid id: `{value}`")
            }
            Self::UnsupportedTargetModel(value) => {
                write!(f, "Validation failed: unsupported targetModel `{value}`")
            }
            Self::UnsupportedAction(value) => {
                write!(f, "Validation failed: unsupported action `{value}`")
            }
        }
    }
}

impl Error for ActivityValidationError {}

fn required<'a>(
    field: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, ActivityValidationError> {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(ActivityValidationError::MissingField(field)),
    }
}

fn parse_id(field: &'static str, value: &str) -> Result<Uuid, ActivityValidationError> {
    Uuid::parse_str(value.trim()).map_err(|_| ActivityValidationError::InvalidId {
        field,
        value: value.to_string(),
    })
}
