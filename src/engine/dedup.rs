//! Deduplication keys for saturation.
//!
//! Saturation works by repeatedly applying rules and adding newly produced
//! `Node`s to a stash. Without a stable deduplication strategy the engine would
//! re-derive the same nodes on every pass and never reach a fixpoint.
//!
//! `NodeKey` is a compact, hashable representation of a node combining:
//!
//! - Span (`start`, `end`)
//! - Dimension (`dim`)
//! - Producing rule name (`rule_name`)
//! - A dimension-specific `kind_key`
//!
//! Including `rule_name` keeps distinct derivations of the same intent apart,
//! which the debug report shows as separate candidates.

use crate::{Dimension, IntentMeta, Marker, Node, SlotValue, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct NodeKey {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) dim: Dimension,
    pub(crate) rule_name: &'static str,
    pub(crate) kind_key: NodeKindKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum NodeKindKey {
    RegexMatch(String), // group 0 only
    Marker(Marker),
    Slot(SlotValue),
    Intent(IntentMeta),
}

impl NodeKey {
    pub(crate) fn from_node(node: &Node) -> Self {
        let kind_key = match &node.token.kind {
            TokenKind::RegexMatch(groups) => {
                NodeKindKey::RegexMatch(groups.first().map(|s| s.as_str()).unwrap_or("").to_string())
            }
            TokenKind::Marker(marker) => NodeKindKey::Marker(*marker),
            TokenKind::Slot(slot) => NodeKindKey::Slot(slot.clone()),
            TokenKind::Intent(meta) => NodeKindKey::Intent(meta.clone()),
        };

        NodeKey {
            start: node.range.start,
            end: node.range.end,
            dim: node.token.dim,
            rule_name: node.rule_name,
            kind_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Game, Range, Token};

    fn node(start: usize, end: usize, rule_name: &'static str, kind: TokenKind, dim: Dimension) -> Node {
        Node { range: Range { start, end }, token: Token { dim, kind }, rule_name, evidence: Vec::new() }
    }

    #[test]
    fn same_span_rule_and_value_share_a_key() {
        let a = node(0, 4, "game", TokenKind::Slot(SlotValue::Game(Game::Dota)), Dimension::Slot);
        let b = node(0, 4, "game", TokenKind::Slot(SlotValue::Game(Game::Dota)), Dimension::Slot);
        assert_eq!(NodeKey::from_node(&a), NodeKey::from_node(&b));
    }

    #[test]
    fn value_or_rule_changes_the_key() {
        let dota = node(0, 4, "game", TokenKind::Slot(SlotValue::Game(Game::Dota)), Dimension::Slot);
        let pubg = node(0, 4, "game", TokenKind::Slot(SlotValue::Game(Game::Pubg)), Dimension::Slot);
        let other_rule = node(0, 4, "game (alt)", TokenKind::Slot(SlotValue::Game(Game::Dota)), Dimension::Slot);

        assert_ne!(NodeKey::from_node(&dota), NodeKey::from_node(&pubg));
        assert_ne!(NodeKey::from_node(&dota), NodeKey::from_node(&other_rule));
    }
}
