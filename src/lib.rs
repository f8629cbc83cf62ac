//! amy library crate
//!
//! Exposes the session and its collaborators so the binary, integration tests
//! and benchmarks share one implementation.

pub mod config;
pub mod confirm;
pub mod environment;
pub mod executor;
pub mod explain;
pub mod history;
pub mod keyring;
pub mod llm;
pub mod logging;
pub mod prompt;
pub mod session;
pub mod update;
pub mod util;
