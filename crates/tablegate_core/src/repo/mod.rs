//! Data access contracts.
//!
//! # Responsibility
//! - Define the connection primitives the gateway delegates to.
//! - Isolate SQL execution details from validation and formatting.
//!
//! # Invariants
//! - Gateway code talks to storage only through [`connection::Connection`].

pub mod connection;
