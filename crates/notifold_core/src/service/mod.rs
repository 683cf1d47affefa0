//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into aggregation and lifecycle APIs.
//! - Keep callers (workers, API layers) decoupled from storage details.

pub mod notification_service;
