//! Core domain types
//!
//! These types represent the fundamental business entities and are shared
//! between the orchestrator (persistence, triggering) and the runner
//! (execution).

pub mod app;
pub mod run;
pub mod step;
