//! Matching and saturation parser.
//!
//! This module is the operational core of the engine:
//!
//! - Select the rules that are plausible for the phrase (bucket gating; see
//!   `compiled_rules.rs` and `trigger.rs`).
//! - Repeatedly apply those rules to build up a `Stash` of `Node`s.
//! - Deduplicate produced nodes to keep saturation finite and deterministic
//!   (see `dedup.rs`).
//! - Resolve whole-phrase intent nodes (see `resolve.rs`) and order them by
//!   rule declaration so the first-declared rule wins.
//!
//! ## Key concepts
//!
//! - **Rule**: a sequence of `Pattern`s with a production.
//! - **Node**: a matched token with a span (`Range`) and a `Token` value.
//! - **Stash**: the growing set of discovered nodes.
//! - **Saturation**: repeatedly apply rules until an iteration produces no new
//!   nodes (a fixpoint).
//!
//! ## Pass structure
//!
//! ```text
//! (0) trigger scan         -> buckets
//! (1) initial regex pass   -> markers + slots from the raw phrase
//! (2) iterative passes     -> predicate rules combine stash nodes into intents
//! (3) resolve + order      -> whole-phrase candidates, first declared wins
//! ```
//!
//! Items inside a pattern are separated by optional inline whitespace: the
//! parser skips spaces and tabs between items but never inside one.

use super::compiled_rules::{CompiledRules, DimensionSet, RuleId};
use super::dedup::NodeKey;
use super::metrics::{PassMetrics, RunMetrics, RunResult, SaturationMetrics};
use super::resolve::resolve_node;
use super::trigger::TriggerInfo;
use crate::{Dimension, Node, Pattern, Range, ResolvedToken, Rule, Stash, Token, TokenKind};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Internal helper representing a partially matched rule as the engine
/// advances through the pattern. `route` holds the matched `Node`s so far.
///
/// ```text
/// pattern: [Predicate(is_last_match), Optional("в|in"), Predicate(is_game)]
///                                     ^ next_idx when the marker is consumed
///
/// route: [ Node(range:0..10, dim:Marker) ]
/// position points to the end of the last consumed node (here: 10)
/// ```
struct PartialMatch<'a> {
    rule_id: RuleId,
    rule: &'a Rule,
    next_idx: usize,
    position: usize,
    route: Vec<Node>,
}

/// Parser orchestrates applying `Rule`s against a normalized phrase.
///
/// ```text
/// new() -> saturate() -> resolve_ordered()
///            │             └─ whole-phrase intents, declaration order
///            └─ repeatedly grow stash using rules
/// ```
#[derive(Debug)]
pub struct Parser<'a> {
    /// Normalized phrase to parse.
    input: &'a str,
    stash: Stash,
    /// Node keys already added, to avoid re-adding identical nodes.
    seen: HashSet<NodeKey>,
    compiled: CompiledRules<'a>,
    /// Active rules that start with a `Regex` item.
    regex_rules: Vec<RuleId>,
    /// Active rules that start with a `Predicate` item.
    predicate_rules: Vec<RuleId>,
    /// Keep per-pass node lists in the metrics.
    collect_nodes: bool,
}

impl<'a> Parser<'a> {
    /// Create a new `Parser` for `input` using pre-compiled rules.
    pub fn new_compiled(input: &'a str, compiled: CompiledRules<'a>) -> Self {
        let trigger_info = TriggerInfo::scan(input);
        let active = compiled.active_ids(trigger_info.buckets);

        tracing::trace!(
            buckets = ?trigger_info.buckets,
            active = active.len(),
            total = compiled.rules.len(),
            "trigger scan"
        );

        let (predicate_rules, regex_rules): (Vec<RuleId>, Vec<RuleId>) =
            active.into_iter().partition(|&id| matches!(compiled.rules[id].pattern.first(), Some(Pattern::Predicate(_))));

        Parser {
            input,
            stash: Stash::empty(),
            seen: HashSet::new(),
            compiled,
            regex_rules,
            predicate_rules,
            collect_nodes: false,
        }
    }

    /// Create a new `Parser` for `input` using `rules`.
    pub fn new(input: &'a str, rules: &'a [Rule]) -> Self {
        Self::new_compiled(input, CompiledRules::new(rules))
    }

    /// Record the nodes produced by each pass in the returned metrics.
    pub fn with_traces(mut self) -> Self {
        self.collect_nodes = true;
        self
    }

    pub(crate) fn active_rule_names(&self) -> Vec<&'static str> {
        let mut ids: Vec<RuleId> = self.regex_rules.iter().chain(self.predicate_rules.iter()).copied().collect();
        ids.sort_unstable();
        ids.into_iter().map(|id| self.compiled.rules[id].name).collect()
    }

    /// Advance `position` past spaces and tabs.
    fn skip_inline_ws(&self, position: usize) -> usize {
        let rest = &self.input[position..];
        position + (rest.len() - rest.trim_start_matches([' ', '\t']).len())
    }

    /// Match `re` so that it starts exactly at `position`.
    ///
    /// Empty matches are ignored: they would let a rule consume nothing and
    /// still claim a span.
    fn regex_node_at(&self, re: &Regex, position: usize) -> Option<Node> {
        let caps = re.captures(&self.input[position..])?;
        let m = caps.get(0)?;
        if m.start() != 0 || m.end() == 0 {
            return None;
        }
        let groups: Vec<String> = caps.iter().map(|g| g.map(|g| g.as_str().to_string()).unwrap_or_default()).collect();
        Some(Node {
            range: Range { start: position, end: position + m.end() },
            token: Token { dim: Dimension::RegexMatch, kind: TokenKind::RegexMatch(groups) },
            rule_name: "<regex>",
            evidence: Vec::new(),
        })
    }

    /// Find nodes that match `pat` and start exactly at `position`.
    fn lookup_item(&self, pat: &Pattern, position: usize) -> Vec<Node> {
        match pat {
            Pattern::Regex(re) | Pattern::Optional(re) => self.regex_node_at(re, position).into_iter().collect(),
            Pattern::Predicate(pred) => {
                self.stash.starting_at(position).into_iter().filter(|n| pred(&n.token)).collect()
            }
        }
    }

    /// Find nodes that match `pat` anywhere in the phrase.
    ///
    /// Regex items are tried at every char boundary so overlapping candidates
    /// (for example `катка` inside `ласт катка`) are all seeded.
    fn lookup_item_anywhere(&self, pat: &Pattern) -> Vec<Node> {
        match pat {
            Pattern::Regex(re) | Pattern::Optional(re) => self
                .input
                .char_indices()
                .map(|(i, _)| i)
                .filter_map(|i| self.regex_node_at(re, i))
                .collect(),
            Pattern::Predicate(pred) => {
                self.stash.to_pos_ordered_list().into_iter().filter(|n| pred(&n.token)).collect()
            }
        }
    }

    /// Match a rule's first pattern item anywhere and return the initial
    /// `PartialMatch`es.
    fn seed_first_pattern_anywhere(&self, rule_id: RuleId) -> Vec<PartialMatch<'a>> {
        let rule = self.compiled.rules[rule_id];
        let Some(first) = rule.pattern.first() else {
            return Vec::new();
        };
        self.lookup_item_anywhere(first)
            .into_iter()
            .map(|node| PartialMatch { rule_id, rule, next_idx: 1, position: node.range.end, route: vec![node] })
            .collect()
    }

    /// Depth-first expansion of `PartialMatch` objects until the entire rule
    /// is satisfied.
    ///
    /// An `Optional` item forks the match: one branch skips it, the other
    /// consumes it when it is present.
    fn match_all(&self, input_matches: Vec<PartialMatch<'a>>) -> Vec<PartialMatch<'a>> {
        let mut results = Vec::new();
        let mut stack: Vec<PartialMatch<'a>> = input_matches;

        while let Some(m) = stack.pop() {
            if m.next_idx >= m.rule.pattern.len() {
                results.push(m);
                continue;
            }

            let rule = m.rule;
            let pat = &rule.pattern[m.next_idx];
            let at = self.skip_inline_ws(m.position);
            let nodes = self.lookup_item(pat, at);

            // Push in reverse order so they are explored in forward order.
            for node in nodes.into_iter().rev() {
                let mut new_route = m.route.clone();
                let position = node.range.end;
                new_route.push(node);
                stack.push(PartialMatch {
                    rule_id: m.rule_id,
                    rule,
                    next_idx: m.next_idx + 1,
                    position,
                    route: new_route,
                });
            }

            if matches!(pat, Pattern::Optional(_)) {
                stack.push(PartialMatch { next_idx: m.next_idx + 1, ..m });
            }
        }

        results
    }

    /// Convert a completed `PartialMatch` into a `Node` by invoking the rule's
    /// production callback.
    fn produce_node(&self, m: &PartialMatch) -> Option<Node> {
        let (first, last) = (m.route.first()?, m.route.last()?);
        let tokens: Vec<Token> = m.route.iter().map(|n| n.token.clone()).collect();

        let Some(tok) = (m.rule.production)(&tokens) else {
            tracing::trace!(rule = m.rule.name, span = ?(first.range.start..last.range.end), "production declined");
            return None;
        };

        tracing::trace!(
            rule = m.rule.name,
            span = ?(first.range.start..last.range.end),
            text = &self.input[first.range.start..last.range.end],
            token = ?tok,
            "production ok"
        );

        let mut evidence = Vec::new();
        for node in &m.route {
            evidence.push(node.rule_name);
            evidence.extend_from_slice(&node.evidence);
        }
        Some(Node { range: Range { start: first.range.start, end: last.range.end }, token: tok, rule_name: m.rule.name, evidence })
    }

    /// Apply an ordered set of rules once and return the nodes produced plus
    /// the number of rules that seeded at least one match.
    fn apply_rules_once(&self, rule_set: &[RuleId]) -> (Vec<Node>, usize) {
        let mut discovered = Vec::new();
        let mut rules_seeded = 0;

        for &rule_id in rule_set {
            let starts = self.seed_first_pattern_anywhere(rule_id);
            if starts.is_empty() {
                continue;
            }
            rules_seeded += 1;

            for m in self.match_all(starts) {
                if let Some(node) = self.produce_node(&m) {
                    discovered.push(node);
                }
            }
        }
        (discovered, rules_seeded)
    }

    fn dimensions_in_stash(&self) -> DimensionSet {
        self.stash.get_nodes().iter().fold(DimensionSet::empty(), |acc, n| acc | DimensionSet::of(n.token.dim))
    }

    /// Add unseen nodes from `discovered` to the stash and report the pass.
    fn absorb(&mut self, discovered: Vec<Node>) -> (usize, Vec<Node>) {
        let mut newly_added = Stash::empty();
        let mut produced = 0;
        for node in discovered {
            if self.seen.insert(NodeKey::from_node(&node)) {
                newly_added.insert(node);
                produced += 1;
            }
        }
        let nodes = if self.collect_nodes { newly_added.get_nodes() } else { Vec::new() };
        if !newly_added.null() {
            self.stash = self.stash.union(&newly_added);
        }
        (produced, nodes)
    }

    /// Saturate the stash by repeatedly applying rules until a fixpoint.
    ///
    /// ```text
    /// regex_rules pass
    ///      │
    ///      ▼
    ///  stash grows ──┐
    ///                │ predicate + regex passes
    ///                └── repeat until fixed point
    /// ```
    fn saturate(&mut self) -> SaturationMetrics {
        let mut metrics = SaturationMetrics::default();
        let saturation_start = Instant::now();

        let regex_start = Instant::now();
        let regex_rules = self.regex_rules.clone();
        let (discovered, rules_seeded) = self.apply_rules_once(&regex_rules);
        let (produced, nodes) = self.absorb(discovered);
        metrics.initial_regex = PassMetrics {
            duration: regex_start.elapsed(),
            produced,
            nodes,
            rules_considered: regex_rules.len(),
            rules_seeded,
        };
        if produced == 0 {
            metrics.total = saturation_start.elapsed();
            return metrics;
        }

        let all_saturate_rules: Vec<RuleId> =
            self.predicate_rules.iter().chain(self.regex_rules.iter()).copied().collect();

        loop {
            let iteration_start = Instant::now();

            let dims_in_stash = self.dimensions_in_stash();
            let saturate_rules: Vec<RuleId> = all_saturate_rules
                .iter()
                .copied()
                .filter(|&id| dims_in_stash.contains(self.compiled.metas[id].deps))
                .collect();

            let (discovered, rules_seeded) = self.apply_rules_once(&saturate_rules);
            let (produced, nodes) = self.absorb(discovered);
            metrics.iterations.push(PassMetrics {
                duration: iteration_start.elapsed(),
                produced,
                nodes,
                rules_considered: saturate_rules.len(),
                rules_seeded,
            });
            if produced == 0 {
                break;
            }
        }

        metrics.total = saturation_start.elapsed();
        metrics
    }

    /// Resolve whole-phrase intent nodes and order them by the declaration
    /// index of the rule that produced them.
    fn resolve_ordered(&self) -> Vec<ResolvedToken> {
        let input_len = self.input.len();
        let order: HashMap<&str, RuleId> =
            self.compiled.rules.iter().enumerate().map(|(id, r)| (r.name, id)).collect();

        let mut resolved: Vec<ResolvedToken> =
            self.stash.get_nodes().into_iter().filter_map(|node| resolve_node(input_len, node)).collect();

        // Stable: equal rules keep discovery order.
        resolved.sort_by_key(|rt| order.get(rt.node.rule_name).copied().unwrap_or(usize::MAX));
        resolved
    }

    /// Saturate the stash, resolve candidates and return them with timing
    /// details.
    pub fn run(mut self) -> RunResult {
        let total_start = Instant::now();
        let saturation = self.saturate();
        let resolve_start = Instant::now();
        let candidates = self.resolve_ordered();
        let best = candidates.first().cloned();
        let resolve = resolve_start.elapsed();
        let total = total_start.elapsed();

        RunResult { candidates, best, metrics: RunMetrics { total, saturation, resolve } }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IntentMeta, Marker};

    fn is_hello(t: &Token) -> bool {
        matches!(t.kind, TokenKind::Marker(Marker::Greeting))
    }

    fn grammar() -> Vec<Rule> {
        vec![
            rule! {
                name: "hello word",
                pattern: [re!(r"hello|hi")],
                prod: |_t: &[Token]| -> Option<Marker> { Some(Marker::Greeting) },
            },
            rule! {
                name: "greeting with optional there",
                intent: "greeting",
                pattern: [pred!(is_hello), opt!(r"there")],
                deps: [Dimension::Marker],
                prod: |_t: &[Token]| -> Option<IntentMeta> { Some(IntentMeta::new("greeting")) },
            },
            rule! {
                name: "greeting twice",
                intent: "double",
                pattern: [pred!(is_hello), pred!(is_hello)],
                deps: [Dimension::Marker],
                prod: |_t: &[Token]| -> Option<IntentMeta> { Some(IntentMeta::new("double")) },
            },
        ]
    }

    #[test]
    fn optional_item_may_be_present_or_absent() {
        let rules = grammar();

        let run = Parser::new("hello there", &rules).run();
        assert_eq!(run.best.map(|b| b.meta.handler_id()), Some("greeting"));

        let run = Parser::new("hello", &rules).run();
        assert_eq!(run.best.map(|b| b.meta.handler_id()), Some("greeting"));
    }

    #[test]
    fn whitespace_between_items_is_optional() {
        let rules = grammar();
        let run = Parser::new("hihello", &rules).run();
        assert_eq!(run.best.map(|b| b.meta.handler_id()), Some("double"));

        let run = Parser::new("hi hello", &rules).run();
        assert_eq!(run.best.map(|b| b.meta.handler_id()), Some("double"));
    }

    #[test]
    fn partial_coverage_yields_no_candidate() {
        let rules = grammar();
        let run = Parser::new("hello world", &rules).run();
        assert!(run.best.is_none());
        assert!(run.candidates.is_empty());
    }

    #[test]
    fn traces_are_collected_on_request() {
        let rules = grammar();

        let run = Parser::new("hi", &rules).run();
        assert!(run.metrics.saturation.initial_regex.nodes.is_empty());
        assert_eq!(run.metrics.saturation.initial_regex.produced, 1);

        let run = Parser::new("hi", &rules).with_traces().run();
        assert_eq!(run.metrics.saturation.initial_regex.nodes.len(), 1);
        assert!(!run.metrics.saturation.iterations.is_empty());
    }
}
