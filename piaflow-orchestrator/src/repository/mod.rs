//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Each repository handles database operations for a specific table.

pub mod credential;
pub mod run;

// Re-export for convenience
pub use credential as credential_repository;
pub use run as run_repository;
