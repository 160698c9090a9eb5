//! Chat platform boundary.
//!
//! The engine never talks to a chat service directly: every outbound action
//! goes through [`ChatPlatform`], and inbound messages arrive as
//! [`InboundMessage`] values built by whatever drives the bot.

use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A message received from a user. Messages authored by the bot itself must
/// be filtered out before they reach the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: MessageId,
    pub sender: UserId,
    pub text: String,
}

impl InboundMessage {
    pub fn new(id: u64, sender: u64, text: impl Into<String>) -> Self {
        Self { id: MessageId(id), sender: UserId(sender), text: text.into() }
    }
}

/// A card-style reply (an embed on platforms that have them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RichContent {
    pub title: String,
    pub body: String,
    /// `0xRRGGBB`.
    pub color: u32,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("failed to deliver to chat: {0}")]
    Delivery(String),
}

/// Outbound capabilities of the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Reply to `to` with plain text.
    async fn send_text(&self, to: &InboundMessage, text: &str) -> Result<(), PlatformError>;
    async fn send_rich(&self, to: &InboundMessage, content: &RichContent) -> Result<(), PlatformError>;
    /// React to `to` with an already normalized emoji token.
    async fn add_reaction(&self, to: &InboundMessage, emoji: &str) -> Result<(), PlatformError>;

    /// Look up a custom emoji by name in the platform catalog.
    fn custom_emoji(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Turn an emoji name into something the platform can render.
///
/// Tokens already in `<...>` form pass through untouched. Otherwise colons
/// and whitespace are stripped and the name is resolved against the custom
/// emoji catalog, falling back to the literal `:name:` form.
pub fn normalize_emoji(platform: &dyn ChatPlatform, emoji: &str) -> String {
    if emoji.starts_with('<') && emoji.ends_with('>') {
        return emoji.to_string();
    }

    let name = emoji.trim_matches([' ', '\n', '\r', '\t', ':']);
    platform.custom_emoji(name).unwrap_or_else(|| format!(":{name}:"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::testing::RecordingPlatform;

    #[test]
    fn normalize_emoji_resolves_catalog_then_falls_back() {
        let platform = RecordingPlatform::with_emoji("clueless", "<:clueless:8812>");

        assert_eq!(normalize_emoji(&platform, "clueless"), "<:clueless:8812>");
        assert_eq!(normalize_emoji(&platform, " :clueless:\n"), "<:clueless:8812>");
        assert_eq!(normalize_emoji(&platform, "<a:party:1>"), "<a:party:1>");
        assert_eq!(normalize_emoji(&platform, ":thumbsup:"), ":thumbsup:");
    }
}
