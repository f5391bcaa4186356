//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services sit between the HTTP handlers and the stores.

pub mod app;
pub mod run;

// Re-export for convenience
pub use app as app_service;
pub use run as run_service;
