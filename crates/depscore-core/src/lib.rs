//! Core traits, types, and error handling for depscore.
//!
//! This crate provides the foundational abstractions shared by the scoring
//! client, the MCP server and the command-line entry point.

pub mod config;
pub mod error;
pub mod provider;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use provider::ScoreProvider;
pub use types::{PackageRef, PackageScore};
