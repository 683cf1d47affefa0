//! Domain model for activities and the notifications aggregated from them.
//!
//! # Responsibility
//! - Define the immutable activity input and its validation.
//! - Define the notification aggregate, its key and status lifecycle.
//!
//! # Invariants
//! - Activities are never mutated after validation.
//! - Every notification is owned by exactly one recipient.

pub mod activity;
pub mod notification;
