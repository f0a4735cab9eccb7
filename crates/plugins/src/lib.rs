//! Command plugins for the bot.
//!
//! Plugins form an explicit registration list built at startup: every
//! command handler implements [`registry::CommandPlugin`], and
//! per-plugin failures are isolated so one broken plugin never takes
//! down the rest.

pub mod builtin;
pub mod registry;
