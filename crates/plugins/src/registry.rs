//! Plugin registration and command dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use wirebot_client::transport::{InboundMessage, MessageSender, OutboundMessage, SendError};

/// Errors surfaced by plugin construction or execution.
///
/// These are always caught at the dispatch boundary and logged; a
/// failing command never aborts the connection or the process.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The plugin could not be constructed at registration time.
    #[error("Plugin failed to initialize: {0}")]
    Init(String),

    /// The command ran but failed.
    #[error("Command failed: {0}")]
    Execution(String),

    /// The reply could not be queued because the connection is gone.
    #[error(transparent)]
    Send(#[from] SendError),
}

/// Everything a plugin gets when its command fires.
pub struct CommandContext<'a> {
    /// The triggering message.
    pub message: InboundMessage,
    /// Write half of the current connection.
    pub sender: MessageSender,
    /// The configured command prefix (for rendering help text).
    pub prefix: &'a str,
    /// The registry, so plugins like `menu` can enumerate commands.
    pub registry: &'a PluginRegistry,
}

impl CommandContext<'_> {
    /// Reply with plain text in the chat the command came from.
    pub async fn reply(&self, text: impl Into<String>) -> Result<(), PluginError> {
        self.sender
            .send(OutboundMessage {
                chat: self.message.chat.clone(),
                text: text.into(),
                image_url: None,
            })
            .await?;
        Ok(())
    }
}

/// One chat command.
#[async_trait]
pub trait CommandPlugin: Send + Sync {
    /// Command word, matched against prefixed input.
    fn name(&self) -> &'static str;

    /// One-line help text shown by the menu.
    fn description(&self) -> &'static str;

    /// Whether this plugin handles `command` (already lower-cased,
    /// prefix stripped). Defaults to an exact name match.
    fn matches(&self, command: &str) -> bool {
        command == self.name()
    }

    /// Run the command.
    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<(), PluginError>;
}

/// Startup-time list of registered command plugins.
pub struct PluginRegistry {
    prefix: String,
    plugins: Vec<Arc<dyn CommandPlugin>>,
}

impl PluginRegistry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            plugins: Vec::new(),
        }
    }

    /// Register one plugin.
    pub fn register(&mut self, plugin: Arc<dyn CommandPlugin>) {
        tracing::info!(plugin = plugin.name(), "Registered plugin");
        self.plugins.push(plugin);
    }

    /// Register a batch of fallible plugin constructors.
    ///
    /// Each failure is logged against the plugin's name and skipped;
    /// one broken plugin never aborts loading the rest.
    pub fn register_all<I>(&mut self, factories: I)
    where
        I: IntoIterator<Item = (&'static str, Result<Arc<dyn CommandPlugin>, PluginError>)>,
    {
        for (name, result) in factories {
            match result {
                Ok(plugin) => self.register(plugin),
                Err(e) => {
                    tracing::error!(plugin = name, error = %e, "Failed to load plugin");
                }
            }
        }
    }

    /// The configured command prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Registered plugins, in registration order.
    pub fn plugins(&self) -> &[Arc<dyn CommandPlugin>] {
        &self.plugins
    }

    /// Route one inbound message to the first matching plugin.
    ///
    /// Messages without the prefix and unknown commands are ignored.
    /// Execution failures are logged and swallowed.
    pub async fn dispatch(&self, message: InboundMessage, sender: MessageSender) {
        let Some(command) = parse_command(&message.text, &self.prefix) else {
            return;
        };

        let Some(plugin) = self.plugins.iter().find(|p| p.matches(&command)) else {
            tracing::debug!(command, "No plugin matches command");
            return;
        };

        let ctx = CommandContext {
            message,
            sender,
            prefix: &self.prefix,
            registry: self,
        };

        if let Err(e) = plugin.execute(&ctx).await {
            tracing::warn!(
                plugin = plugin.name(),
                command,
                error = %e,
                "Command execution failed",
            );
        }
    }
}

/// Extract the lower-cased command word from a prefixed message.
fn parse_command(text: &str, prefix: &str) -> Option<String> {
    let rest = text.trim_start().strip_prefix(prefix)?;
    let word = rest.split_whitespace().next()?;
    Some(word.to_ascii_lowercase())
}
