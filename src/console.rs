//! Console chat driver: reads `[<user>:] text` lines and prints the bot's
//! side of the conversation.

use async_trait::async_trait;
use botislav::{ChatPlatform, InboundMessage, PlatformError, RichContent};
use std::io::Write;

/// Sender id the bot itself writes as. Lines from it are ignored.
pub const BOT_USER: u64 = 0;

/// Split a console line into an optional numeric sender and the text.
pub fn parse_line(line: &str) -> Option<(Option<u64>, &str)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Some((user, text)) = line.split_once(':') {
        if let Ok(user) = user.trim().parse::<u64>() {
            let text = text.trim();
            return (!text.is_empty()).then_some((Some(user), text));
        }
    }
    Some((None, line))
}

/// Prints every outbound action to stdout.
pub struct ConsolePlatform {
    color: bool,
}

impl ConsolePlatform {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn emit(&self, to: &InboundMessage, body: &str) -> Result<(), PlatformError> {
        let prefix = format!("bot → {} (#{}):", to.sender, to.id);
        let prefix = if self.color { format!("\x1b[36m{prefix}\x1b[0m") } else { prefix };
        let mut out = std::io::stdout().lock();
        writeln!(out, "{prefix} {body}").map_err(|e| PlatformError::Delivery(e.to_string()))
    }
}

#[async_trait]
impl ChatPlatform for ConsolePlatform {
    async fn send_text(&self, to: &InboundMessage, text: &str) -> Result<(), PlatformError> {
        self.emit(to, text)
    }

    async fn send_rich(&self, to: &InboundMessage, content: &RichContent) -> Result<(), PlatformError> {
        let mut card = format!("[#{:06x}] {}", content.color, content.title);
        for line in content.body.lines() {
            card.push_str("\n    ");
            card.push_str(line);
        }
        if let Some(url) = &content.thumbnail_url {
            card.push_str(&format!("\n    ({url})"));
        }
        self.emit(to, &card)
    }

    async fn add_reaction(&self, to: &InboundMessage, emoji: &str) -> Result<(), PlatformError> {
        self.emit(to, &format!("reacted {emoji}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_optional_sender_prefix() {
        assert_eq!(parse_line("42: привет"), Some((Some(42), "привет")));
        assert_eq!(parse_line("  lm dota  "), Some((None, "lm dota")));
        assert_eq!(parse_line("https://opendota.com/players/1"), Some((None, "https://opendota.com/players/1")));
        assert_eq!(parse_line("7:"), None);
        assert_eq!(parse_line("   "), None);
    }
}
