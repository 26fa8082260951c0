//! rbsync-core - domain logic for reconciling changelists with review requests.
//!
//! This crate owns correlation-key extraction, override directives, the build
//! history ledger and its search, the post-review subprocess protocol, the
//! review-system API contract, and the reconciliation engine that drives them.

pub mod api;
pub mod changelist;
pub mod config;
pub mod engine;
pub mod events;
pub mod history;
pub mod log;
pub mod matching;
pub mod postreview;
