//! # radar-agent
//!
//! Host process for the radar exposure-notification core.
//!
//! - [`host`] - file-backed status source and localization loader, logging
//!   notification and decoy dispatchers
//! - [`agent`] - wiring, the run loops and the status file watcher
//! - [`logging`] - tracing subscriber setup

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod agent;
pub mod host;
pub mod logging;

pub use agent::{Agent, AgentSettings};
