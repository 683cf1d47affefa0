//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the storage primitives the notification services consume.
//! - Isolate SQLite query details from aggregation/lifecycle orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.
//! - Check-then-act sequences never span more than one transaction.

pub mod notification_repo;
