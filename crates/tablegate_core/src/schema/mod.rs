//! Field declarations, validation registry and model configuration.
//!
//! # Responsibility
//! - Turn declarative field specs into validators.
//! - Hold construction-time model settings.
//!
//! # Invariants
//! - Everything in this module is immutable once a model is built.

pub mod config;
pub mod field;
