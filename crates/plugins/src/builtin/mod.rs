//! Built-in commands shipped with the bot.

mod menu;
mod ping;

pub use menu::MenuPlugin;
pub use ping::PingPlugin;
