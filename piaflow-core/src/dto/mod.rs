//! Data Transfer Objects (DTOs)
//!
//! Request and response shapes exchanged over the HTTP surface.

pub mod app;
pub mod run;
