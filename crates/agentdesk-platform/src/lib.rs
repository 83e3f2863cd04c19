//! # AgentDesk Platform
//!
//! Admin REST API for AgentDesk: agent roster management, contact-sheet
//! uploads distributed fairly across active agents, and task queries.

pub mod admin;
pub mod auth;
pub mod db;
pub mod pipeline;
pub mod tasks;

pub use admin::{AdminServer, AdminState};
pub use db::PlatformDb;
