#![deny(unsafe_code)]

//! Shared test utilities for the Tether workspace.
//!
//! Provides reusable fixtures, config builders, recording service doubles,
//! and tracing helpers so that individual crate tests stay concise.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! tether-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod fixtures;
pub mod services;
pub mod tracing_setup;
