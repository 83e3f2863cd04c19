//! # AgentDesk Core
//!
//! Error type and platform configuration shared by the server binary and the
//! platform crate.

pub mod config;
pub mod error;

pub use config::PlatformConfig;
pub use error::{DeskError, Result};
