//! Bridges lifecycle events to the plugin layer.

use std::sync::Arc;

use async_trait::async_trait;
use wirebot_client::lifecycle::EventHandler;
use wirebot_client::transport::{InboundMessage, MessageSender, OutboundMessage};
use wirebot_core::types::Jid;
use wirebot_plugins::registry::PluginRegistry;

/// Routes inbound messages into the plugin registry and announces a
/// fresh connection with a greeting message.
pub struct BotHandler {
    registry: Arc<PluginRegistry>,
    owner_jid: Option<Jid>,
    menu_image_url: Option<String>,
}

impl BotHandler {
    pub fn new(
        registry: Arc<PluginRegistry>,
        owner_jid: Option<Jid>,
        menu_image_url: Option<String>,
    ) -> Self {
        Self {
            registry,
            owner_jid,
            menu_image_url,
        }
    }
}

#[async_trait]
impl EventHandler for BotHandler {
    async fn on_open(&self, self_jid: &Jid, sender: MessageSender) {
        // The greeting goes to the owner when configured, otherwise to
        // the bot's own chat.
        let chat = self.owner_jid.clone().unwrap_or_else(|| self_jid.clone());
        let text = format!(
            "wirebot connected successfully. Type {}menu for commands.",
            self.registry.prefix(),
        );

        // Best effort: a failed greeting never aborts the connection.
        if let Err(e) = sender
            .send(OutboundMessage {
                chat,
                text,
                image_url: self.menu_image_url.clone(),
            })
            .await
        {
            tracing::warn!(error = %e, "Failed to send greeting message");
        }
    }

    async fn on_message(&self, message: InboundMessage, sender: MessageSender) {
        self.registry.dispatch(message, sender).await;
    }
}
