//! Command listing.

use std::fmt::Write as _;

use async_trait::async_trait;

use crate::registry::{CommandContext, CommandPlugin, PluginError};

/// Lists every registered command with its help text.
pub struct MenuPlugin;

#[async_trait]
impl CommandPlugin for MenuPlugin {
    fn name(&self) -> &'static str {
        "menu"
    }

    fn description(&self) -> &'static str {
        "List available commands"
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<(), PluginError> {
        let mut text = String::from("Available commands:\n");
        for plugin in ctx.registry.plugins() {
            let _ = writeln!(
                text,
                "  {}{} - {}",
                ctx.prefix,
                plugin.name(),
                plugin.description(),
            );
        }
        ctx.reply(text.trim_end().to_string()).await
    }
}
