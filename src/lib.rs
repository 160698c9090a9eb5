extern crate self as botislav;

use regex::Regex;

#[macro_use]
mod macros;
mod api;
mod dialog;
mod engine;
mod rules;

pub mod settings;
pub mod stats;

pub use api::{
    Candidate, Classification, ClassifyDetails, FALLBACK_INTENT, Game, GrammarError, IntentClassifier, IntentMeta,
    NodeSummary, PARAM_ACCOUNT_ID, PARAM_GAME, ParamValue, SaturationPass, intent_ids,
};
pub use dialog::{
    Cache, CacheStore, ChatPlatform, ConfigError, Context, DialogError, DialogManager, Dispatch, GreetingHandler,
    Handler, HandlerError, HandlerSet, InboundMessage, JsonFileCacheStore, LastMatchHandler, LinkAccountHandler,
    MemoryCacheStore, MessageId, PlatformError, RichContent, SessionRegistry, SessionState, SilenceHandler,
    StoreError, UserId, normalize_emoji,
};

// --- Internal types ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Dimension {
    RegexMatch,
    Marker,
    Slot,
    Intent,
}

/// Trigger words that carry no value of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Marker {
    Greeting,
    LastMatch,
    Link,
}

/// Typed slot values extracted by terminal rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum SlotValue {
    Game(Game),
    /// Account id taken from an OpenDota profile url.
    AccountId(u64),
    /// A bare run of digits, kept as text until a production needs a number.
    Digits(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub dim: Dimension,
    pub kind: TokenKind,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    RegexMatch(Vec<String>),
    Marker(Marker),
    Slot(SlotValue),
    Intent(IntentMeta),
}

// Trait to convert rule production results into tokens
pub(crate) trait IntoToken {
    fn into_token(self) -> Option<Token>;
}

impl IntoToken for Marker {
    fn into_token(self) -> Option<Token> {
        Some(Token { dim: Dimension::Marker, kind: TokenKind::Marker(self) })
    }
}

impl IntoToken for SlotValue {
    fn into_token(self) -> Option<Token> {
        Some(Token { dim: Dimension::Slot, kind: TokenKind::Slot(self) })
    }
}

impl IntoToken for IntentMeta {
    fn into_token(self) -> Option<Token> {
        Some(Token { dim: Dimension::Intent, kind: TokenKind::Intent(self) })
    }
}

// Pattern items used by rules: a Regex to match text, an Optional regex that
// may be skipped, or a Predicate that matches an existing token in the stash.
#[derive(Debug)]
pub(crate) enum Pattern {
    /// Match a regular expression at the current position of the normalized
    /// input. The `Regex` is a static reference (see `regex!` in
    /// `src/macros.rs`).
    Regex(&'static Regex),

    /// Like `Regex`, but the item may also be absent. Never leads a pattern.
    Optional(&'static Regex),

    /// Match an already-discovered `Token` using a predicate function. This
    /// allows rules to combine previously found tokens (from the `Stash`).
    Predicate(fn(&Token) -> bool),
}

pub(crate) type Production = Box<dyn Fn(&[Token]) -> Option<Token> + Send + Sync>;

/// A grammar rule: a unique name, an optional declared intent id, a positional
/// `pattern` and a `production` that receives the matched tokens and
/// optionally returns a new `Token`.
///
/// Rule order matters: when several intent rules derive the whole phrase, the
/// one declared first wins.
pub(crate) struct Rule {
    pub name: &'static str,
    /// Intent id this rule produces, if it is an intent rule.
    pub intent: Option<&'static str>,
    pub pattern: Vec<Pattern>,
    pub production: Production,
    /// Bucket mask - rule only activates if input has matching buckets.
    pub buckets: u32,
    /// Required dimensions in stash before this rule activates.
    pub deps: &'static [Dimension],
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("intent", &self.intent)
            .field("pattern", &self.pattern)
            .field("production", &"<function>")
            .field("buckets", &self.buckets)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Range {
    /// Start byte index (inclusive).
    pub start: usize,
    /// End byte index (exclusive).
    pub end: usize,
}

/// An intent node that spans the whole normalized phrase.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedToken {
    pub node: Node,
    pub meta: IntentMeta,
}

/// Basic parse tree node produced by rules. `Node` pairs a `Token` with the
/// consumed `Range` of the normalized input.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub range: Range,
    pub token: Token,
    /// Name of the rule that produced this node.
    pub rule_name: &'static str,
    /// Names of rules that directly contributed to producing this node.
    pub evidence: Vec<&'static str>,
}

// --- Stash: lightweight container for discovered nodes ----------------------

#[derive(Debug, Clone)]
pub(crate) struct Stash {
    nodes: Vec<Node>,
}

impl Stash {
    /// Create an empty `Stash`.
    pub fn empty() -> Self {
        Stash { nodes: Vec::new() }
    }

    /// Return true if the stash is empty.
    pub fn null(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get the nodes in this stash.
    pub fn get_nodes(&self) -> Vec<Node> {
        self.nodes.clone()
    }

    /// Return nodes sorted by `(start, end)`.
    pub fn to_pos_ordered_list(&self) -> Vec<Node> {
        let mut v = self.nodes.clone();
        v.sort_by_key(|n| (n.range.start, n.range.end));
        v
    }

    /// Nodes that start exactly at `position`, in `(start, end)` order.
    pub fn starting_at(&self, position: usize) -> Vec<Node> {
        self.to_pos_ordered_list().into_iter().filter(|n| n.range.start == position).collect()
    }

    /// Union two stashes, dropping nodes that share span, dimension, rule,
    /// evidence and value.
    pub fn union(&self, other: &Stash) -> Stash {
        let mut combined = self.nodes.clone();
        combined.extend(other.nodes.clone());

        // Stable sort keeps discovery order inside a span, which the
        // tie-break between equal candidates relies on.
        combined.sort_by_key(|n| (n.range.start, n.range.end));
        combined.dedup_by(|a, b| {
            a.range == b.range
                && a.token.dim == b.token.dim
                && a.rule_name == b.rule_name
                && a.evidence == b.evidence
                && a.token.kind == b.token.kind
        });

        Stash { nodes: combined }
    }

    /// Insert a node into the stash (appends to internal vector).
    pub fn insert(&mut self, node: Node) {
        self.nodes.push(node);
    }
}
