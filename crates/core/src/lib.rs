//! Shared types and configuration for the wirebot workspace.

pub mod config;
pub mod types;
