//! Token resolution.
//!
//! Saturation leaves a stash full of markers, slots and partial intents.
//! Resolution keeps only what the classifier can hand out: intent nodes that
//! cover the entire normalized phrase.
//!
//! ```text
//! Node ──┬─ Intent, 0..len   -> ResolvedToken
//!        ├─ Intent, partial  -> None (phrase has unexplained text)
//!        └─ Marker/Slot/Regex -> None (not an intent)
//! ```

use crate::{Dimension, Node, ResolvedToken, TokenKind};

/// Turn `node` into a `ResolvedToken` when it is a whole-phrase intent.
pub(crate) fn resolve_node(input_len: usize, node: Node) -> Option<ResolvedToken> {
    if node.token.dim != Dimension::Intent || node.range.start != 0 || node.range.end != input_len {
        return None;
    }
    let meta = match &node.token.kind {
        TokenKind::Intent(meta) => meta.clone(),
        _ => return None,
    };

    tracing::trace!(rule = node.rule_name, range = ?node.range, intent = %meta, "resolved");

    Some(ResolvedToken { node, meta })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Game, IntentMeta, Marker, PARAM_GAME, ParamValue, Range, SlotValue, Token, intent_ids};

    fn node(start: usize, end: usize, dim: Dimension, kind: TokenKind) -> Node {
        Node { range: Range { start, end }, token: Token { dim, kind }, rule_name: "test", evidence: Vec::new() }
    }

    fn lastmatch() -> TokenKind {
        TokenKind::Intent(
            IntentMeta::new(intent_ids::LAST_MATCH).with_param(PARAM_GAME, ParamValue::Game(Game::Dota)),
        )
    }

    #[test]
    fn keeps_whole_phrase_intents() {
        let resolved = resolve_node(7, node(0, 7, Dimension::Intent, lastmatch())).unwrap();
        assert_eq!(resolved.meta.handler_id(), intent_ids::LAST_MATCH);
        assert_eq!(resolved.meta.game(), Some(Game::Dota));
    }

    #[test]
    fn drops_partial_spans_and_non_intents() {
        assert!(resolve_node(10, node(0, 7, Dimension::Intent, lastmatch())).is_none());
        assert!(resolve_node(10, node(3, 10, Dimension::Intent, lastmatch())).is_none());
        assert!(resolve_node(4, node(0, 4, Dimension::Marker, TokenKind::Marker(Marker::LastMatch))).is_none());
        assert!(resolve_node(4, node(0, 4, Dimension::Slot, TokenKind::Slot(SlotValue::Game(Game::Pubg)))).is_none());
    }
}
