use crate::{Game, Marker, SlotValue, Token, TokenKind};

/// Return regex capture group `idx` from `tokens[0]`.
pub fn first_match_group(tokens: &[Token], idx: usize) -> Option<&str> {
    match &tokens.first()?.kind {
        TokenKind::RegexMatch(groups) => groups.get(idx).map(|s| s.as_str()).filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// The first game slot among `tokens`.
pub fn find_game(tokens: &[Token]) -> Option<Game> {
    tokens.iter().find_map(|t| match &t.kind {
        TokenKind::Slot(SlotValue::Game(game)) => Some(*game),
        _ => None,
    })
}

/// The first account reference among `tokens`, as a number.
///
/// Free digits that do not fit an account id yield `None`.
pub fn find_account_id(tokens: &[Token]) -> Option<u64> {
    tokens.iter().find_map(|t| match &t.kind {
        TokenKind::Slot(SlotValue::AccountId(id)) => Some(*id),
        TokenKind::Slot(SlotValue::Digits(digits)) => digits.parse().ok(),
        _ => None,
    })
}

pub fn has_marker(tokens: &[Token], marker: Marker) -> bool {
    tokens.iter().any(|t| t.kind == TokenKind::Marker(marker))
}

/// Map a matched game word onto a [`Game`].
pub fn game_from_word(word: &str) -> Option<Game> {
    const PUBG_PREFIXES: &[&str] = &["pubg", "пубг", "пабг", "пабж", "бабаджи", "baba"];
    const DOTA_PREFIXES: &[&str] = &["dota", "dotes", "дота", "доту", "дока", "доку"];

    if PUBG_PREFIXES.iter().any(|p| word.starts_with(p)) {
        Some(Game::Pubg)
    } else if DOTA_PREFIXES.iter().any(|p| word.starts_with(p)) {
        Some(Game::Dota)
    } else {
        None
    }
}
