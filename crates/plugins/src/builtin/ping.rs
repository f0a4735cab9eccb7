//! Liveness check command.

use async_trait::async_trait;

use crate::registry::{CommandContext, CommandPlugin, PluginError};

/// Replies `pong` so users can tell the bot is connected.
pub struct PingPlugin;

#[async_trait]
impl CommandPlugin for PingPlugin {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn description(&self) -> &'static str {
        "Check that the bot is alive"
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<(), PluginError> {
        ctx.reply("pong").await
    }
}
