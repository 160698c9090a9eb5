use crate::{Marker, SlotValue, Token, TokenKind};

pub fn is_greeting(t: &Token) -> bool {
    matches!(t.kind, TokenKind::Marker(Marker::Greeting))
}

pub fn is_last_match(t: &Token) -> bool {
    matches!(t.kind, TokenKind::Marker(Marker::LastMatch))
}

pub fn is_link_verb(t: &Token) -> bool {
    matches!(t.kind, TokenKind::Marker(Marker::Link))
}

pub fn is_game(t: &Token) -> bool {
    matches!(t.kind, TokenKind::Slot(SlotValue::Game(_)))
}

/// An account id taken from an OpenDota profile url.
pub fn is_profile_account(t: &Token) -> bool {
    matches!(t.kind, TokenKind::Slot(SlotValue::AccountId(_)))
}

/// A profile url or a bare run of digits.
pub fn is_account_ref(t: &Token) -> bool {
    matches!(t.kind, TokenKind::Slot(SlotValue::AccountId(_) | SlotValue::Digits(_)))
}
