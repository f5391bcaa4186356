//! PiaFlow Core
//!
//! Core types and abstractions for the PiaFlow CI/CD system.
//!
//! This crate contains:
//! - Domain types: Apps, steps, runs and pipeline results
//! - Validation: Rules an app must satisfy before it is stored
//! - DTOs: Data transfer objects for the HTTP surface

pub mod domain;
pub mod dto;
pub mod validation;
