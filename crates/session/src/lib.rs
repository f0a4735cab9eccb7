//! Credential-bundle persistence and bootstrap.
//!
//! A session with the messaging gateway is represented by an opaque
//! credential bundle. This crate stores the bundle on disk, fetches it
//! once from a remote blob store when no local copy exists, and exposes
//! the bootstrap entry point the bot runs before its first connection.

pub mod bootstrap;
pub mod fetch;
pub mod store;
