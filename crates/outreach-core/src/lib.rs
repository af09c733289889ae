//! # outreach-core
//!
//! Core types for the outreach engine.
//!
//! The engine drives a single logged-in browser session through a list of
//! profile targets, sending one personalized message per target. This crate
//! holds everything that does not touch the browser:
//!
//! - the data model (targets, outcomes, run counters)
//! - the unified error type
//! - configuration loading and validation
//! - credential resolution
//! - message template rendering

mod error;
mod query;
mod types;

pub mod config;
pub mod credential;
pub mod fail_open;
pub mod template;

pub use config::OutreachConfig;
pub use credential::{resolve_session_token, SessionToken};
pub use error::{OutreachError, Result};
pub use template::render;
pub use query::Query;
pub use types::*;
