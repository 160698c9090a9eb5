use crate::engine::{self, CompiledRules};
use crate::{Node, Pattern, ResolvedToken, Rule, TokenKind};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

static DEFAULT_RULES: Lazy<Arc<Vec<Rule>>> = Lazy::new(|| Arc::new(crate::rules::intents::rules::get()));

/// Intent id returned for phrases the grammar cannot derive.
pub const FALLBACK_INTENT: &str = intent_ids::SILENCE;

/// Parameter holding the [`Game`] of a last-match request.
pub const PARAM_GAME: &str = "game";
/// Parameter holding the numeric external account id to link.
pub const PARAM_ACCOUNT_ID: &str = "account_id";

/// Intent ids produced by the built-in grammar.
pub mod intent_ids {
    pub const GREETING: &str = "greeting";
    pub const LAST_MATCH: &str = "lastmatch";
    pub const LINK_ACCOUNT: &str = "link_account";
    pub const SILENCE: &str = "silence";
}

/// Games the bot knows how to talk about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Game {
    Dota,
    Pubg,
}

impl Game {
    pub fn as_str(self) -> &'static str {
        match self {
            Game::Dota => "DOTA",
            Game::Pubg => "PUBG",
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed intent parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamValue {
    Game(Game),
    Integer(u64),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Game(game) => game.fmt(f),
            ParamValue::Integer(n) => n.fmt(f),
        }
    }
}

/// The classified purpose of a phrase: the handler to run and the parameters
/// extracted from the phrase.
///
/// Parameters are only added while the value is being built; once handed out
/// an `IntentMeta` is read-only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntentMeta {
    handler_id: &'static str,
    parameters: BTreeMap<&'static str, ParamValue>,
}

impl IntentMeta {
    pub fn new(handler_id: &'static str) -> Self {
        IntentMeta { handler_id, parameters: BTreeMap::new() }
    }

    /// The fallback intent, returned when nothing in the grammar matches.
    pub fn fallback() -> Self {
        Self::new(FALLBACK_INTENT)
    }

    pub fn with_param(mut self, name: &'static str, value: ParamValue) -> Self {
        self.parameters.insert(name, value);
        self
    }

    pub fn handler_id(&self) -> &'static str {
        self.handler_id
    }

    pub fn parameters(&self) -> &BTreeMap<&'static str, ParamValue> {
        &self.parameters
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(name)
    }

    pub fn game(&self) -> Option<Game> {
        match self.param(PARAM_GAME)? {
            ParamValue::Game(game) => Some(*game),
            _ => None,
        }
    }

    pub fn account_id(&self) -> Option<u64> {
        match self.param(PARAM_ACCOUNT_ID)? {
            ParamValue::Integer(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.handler_id == FALLBACK_INTENT
    }
}

impl fmt::Display for IntentMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.handler_id)?;
        if self.parameters.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (idx, (name, value)) in self.parameters.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str("}")
    }
}

/// Problems found while validating a grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    #[error("rule name {0:?} is declared more than once")]
    DuplicateRule(&'static str),
    #[error("rule {0:?} has an empty pattern")]
    EmptyPattern(&'static str),
    #[error("rule {0:?} starts with an optional item")]
    OptionalLeading(&'static str),
}

/// A compact per-pass saturation trace.
#[derive(Debug, Clone)]
pub struct SaturationPass {
    pub pass: usize,
    pub duration: Duration,
    pub produced: usize,
    /// Rules tried in this pass.
    pub rules_considered: usize,
    /// Rules whose first item matched somewhere.
    pub rules_seeded: usize,
    pub samples: Vec<NodeSummary>,
}

/// A compact node summary used in verbose traces.
#[derive(Debug, Clone)]
pub struct NodeSummary {
    pub start: usize,
    pub end: usize,
    pub rule: String,
    pub preview: String,
}

/// A complete derivation of the phrase.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub intent: IntentMeta,
    pub rule: String,
    pub start: usize,
    pub end: usize,
}

/// Additional details returned by [`IntentClassifier::classify_verbose`].
///
/// This is meant for debugging grammar changes without dumping the entire
/// internal state.
#[derive(Debug, Clone)]
pub struct ClassifyDetails {
    pub total: Duration,
    /// Time spent in saturation (rule application) + per-pass trace.
    pub saturation_total: Duration,
    pub saturation: Vec<SaturationPass>,
    /// Time spent resolving and ordering candidates.
    pub resolve: Duration,
    /// Names of rules that were active for this phrase.
    pub active_rules: Vec<String>,
    /// Every whole-phrase derivation, winner first.
    pub candidates: Vec<Candidate>,
}

/// Result from [`IntentClassifier::classify_verbose`].
#[derive(Debug, Clone)]
pub struct Classification {
    /// The normalized phrase.
    pub text: String,
    pub meta: IntentMeta,
    pub elapsed: Duration,
    pub details: ClassifyDetails,
}

/// Turns phrases into [`IntentMeta`]s using a static grammar.
///
/// Cloning is cheap; clones share the same rule table.
///
/// # Example
/// ```
/// use botislav::{Game, IntentClassifier, intent_ids};
///
/// let classifier = IntentClassifier::new().unwrap();
/// let meta = classifier.classify("ласт катка в доту");
/// assert_eq!(meta.handler_id(), intent_ids::LAST_MATCH);
/// assert_eq!(meta.game(), Some(Game::Dota));
/// ```
#[derive(Clone)]
pub struct IntentClassifier {
    rules: Arc<Vec<Rule>>,
}

impl fmt::Debug for IntentClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentClassifier").field("rules", &self.rules.len()).finish()
    }
}

impl IntentClassifier {
    /// Build a classifier over the built-in grammar.
    pub fn new() -> Result<Self, GrammarError> {
        Self::from_shared(DEFAULT_RULES.clone())
    }

    #[cfg(test)]
    pub(crate) fn from_rules(rules: Vec<Rule>) -> Result<Self, GrammarError> {
        Self::from_shared(Arc::new(rules))
    }

    fn from_shared(rules: Arc<Vec<Rule>>) -> Result<Self, GrammarError> {
        validate(&rules)?;
        Ok(IntentClassifier { rules })
    }

    /// Every intent id this classifier can return, fallback included.
    pub fn intent_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = self.rules.iter().filter_map(|r| r.intent).collect();
        ids.push(FALLBACK_INTENT);
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Classify `phrase`. Never fails: phrases outside the grammar yield
    /// [`IntentMeta::fallback`].
    pub fn classify(&self, phrase: &str) -> IntentMeta {
        let text = engine::normalize(phrase);
        let run = engine::Parser::new(&text, &self.rules).run();
        let meta = run.best.map(|rt| rt.meta).unwrap_or_else(IntentMeta::fallback);

        if meta.is_fallback() {
            tracing::debug!(phrase = %text, "no intent matched");
        } else {
            tracing::info!(phrase = %text, intent = %meta, "intent matched");
        }
        meta
    }

    /// Classify `phrase` and return extra (compact) debug details.
    pub fn classify_verbose(&self, phrase: &str) -> Classification {
        let text = engine::normalize(phrase);
        let compiled = CompiledRules::new(&self.rules);
        let parser = engine::Parser::new_compiled(&text, compiled).with_traces();
        let active_rules = parser.active_rule_names().into_iter().map(|s| s.to_string()).collect();

        let run = parser.run();
        let meta = run.best.as_ref().map(|rt| rt.meta.clone()).unwrap_or_else(IntentMeta::fallback);
        let candidates = run.candidates.iter().map(to_candidate).collect();

        let mut saturation: Vec<SaturationPass> = Vec::new();

        let initial = &run.metrics.saturation.initial_regex;
        saturation.push(SaturationPass {
            pass: 0,
            duration: initial.duration,
            produced: initial.produced,
            rules_considered: initial.rules_considered,
            rules_seeded: initial.rules_seeded,
            samples: initial.nodes.iter().take(8).map(node_to_summary).collect(),
        });

        for (idx, pass) in run.metrics.saturation.iterations.iter().enumerate() {
            saturation.push(SaturationPass {
                pass: idx + 1,
                duration: pass.duration,
                produced: pass.produced,
                rules_considered: pass.rules_considered,
                rules_seeded: pass.rules_seeded,
                samples: pass.nodes.iter().take(8).map(node_to_summary).collect(),
            });
        }

        let details = ClassifyDetails {
            total: run.metrics.total,
            saturation_total: run.metrics.saturation.total,
            saturation,
            resolve: run.metrics.resolve,
            active_rules,
            candidates,
        };

        Classification { text, meta, elapsed: run.metrics.total, details }
    }
}

fn validate(rules: &[Rule]) -> Result<(), GrammarError> {
    let mut names = HashSet::new();
    for rule in rules {
        if !names.insert(rule.name) {
            return Err(GrammarError::DuplicateRule(rule.name));
        }
        match rule.pattern.first() {
            None => return Err(GrammarError::EmptyPattern(rule.name)),
            Some(Pattern::Optional(_)) => return Err(GrammarError::OptionalLeading(rule.name)),
            Some(_) => {}
        }
    }
    Ok(())
}

fn to_candidate(rt: &ResolvedToken) -> Candidate {
    Candidate {
        intent: rt.meta.clone(),
        rule: rt.node.rule_name.to_string(),
        start: rt.node.range.start,
        end: rt.node.range.end,
    }
}

fn node_to_summary(node: &Node) -> NodeSummary {
    NodeSummary {
        start: node.range.start,
        end: node.range.end,
        rule: node.rule_name.to_string(),
        preview: format_token_preview(&node.token.kind),
    }
}

fn format_token_preview(kind: &TokenKind) -> String {
    let s = match kind {
        TokenKind::RegexMatch(groups) => groups.first().cloned().unwrap_or_default(),
        TokenKind::Marker(marker) => format!("{marker:?}"),
        TokenKind::Slot(slot) => format!("{slot:?}"),
        TokenKind::Intent(meta) => meta.to_string(),
    };
    s.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dimension, Marker, Token};

    fn is_ping(t: &Token) -> bool {
        matches!(t.kind, TokenKind::Marker(Marker::Greeting))
    }

    fn overlapping_grammar() -> Vec<Rule> {
        vec![
            rule! {
                name: "ping word",
                pattern: [re!(r"ping")],
                prod: |_t: &[Token]| -> Option<Marker> { Some(Marker::Greeting) },
            },
            rule! {
                name: "ping as first",
                intent: "first",
                pattern: [pred!(is_ping)],
                deps: [Dimension::Marker],
                prod: |_t: &[Token]| -> Option<IntentMeta> { Some(IntentMeta::new("first")) },
            },
            rule! {
                name: "ping as second",
                intent: "second",
                pattern: [pred!(is_ping)],
                deps: [Dimension::Marker],
                prod: |_t: &[Token]| -> Option<IntentMeta> { Some(IntentMeta::new("second")) },
            },
        ]
    }

    #[test]
    fn first_declared_rule_wins_on_overlap() {
        let classifier = IntentClassifier::from_rules(overlapping_grammar()).unwrap();
        assert_eq!(classifier.classify("ping").handler_id(), "first");

        let mut reversed = overlapping_grammar();
        reversed.swap(1, 2);
        let classifier = IntentClassifier::from_rules(reversed).unwrap();
        assert_eq!(classifier.classify("ping").handler_id(), "second");
    }

    #[test]
    fn verbose_lists_every_candidate_winner_first() {
        let classifier = IntentClassifier::from_rules(overlapping_grammar()).unwrap();
        let res = classifier.classify_verbose("  PING ");

        assert_eq!(res.text, "ping");
        assert_eq!(res.meta.handler_id(), "first");
        assert_eq!(res.elapsed, res.details.total);
        assert!(res.details.saturation_total <= res.details.total);
        let rules: Vec<&str> = res.details.candidates.iter().map(|c| c.rule.as_str()).collect();
        assert_eq!(rules, vec!["ping as first", "ping as second"]);
        assert_eq!(res.details.active_rules.len(), 3);
        assert_eq!(res.details.saturation[0].samples.len(), 1);
        assert_eq!((res.details.saturation[0].rules_considered, res.details.saturation[0].rules_seeded), (1, 1));
        // The intent pass runs both predicate rules plus the regex rule again.
        assert_eq!((res.details.saturation[1].rules_considered, res.details.saturation[1].rules_seeded), (3, 3));
    }

    #[test]
    fn verbose_reports_fallback() {
        let classifier = IntentClassifier::new().unwrap();
        let res = classifier.classify_verbose("бла бла бла");
        assert!(res.meta.is_fallback());
        assert!(res.details.candidates.is_empty());
    }

    #[test]
    fn rejects_invalid_grammars() {
        let mut rules = overlapping_grammar();
        rules.push(rule! {
            name: "ping word",
            pattern: [re!(r"pong")],
            prod: |_t: &[Token]| -> Option<Marker> { None },
        });
        assert_eq!(IntentClassifier::from_rules(rules).unwrap_err(), GrammarError::DuplicateRule("ping word"));

        let rules = vec![rule! {
            name: "nothing",
            pattern: [],
            prod: |_t: &[Token]| -> Option<Marker> { None },
        }];
        assert_eq!(IntentClassifier::from_rules(rules).unwrap_err(), GrammarError::EmptyPattern("nothing"));

        let rules = vec![rule! {
            name: "maybe",
            pattern: [opt!(r"maybe"), re!(r"so")],
            prod: |_t: &[Token]| -> Option<Marker> { None },
        }];
        assert_eq!(IntentClassifier::from_rules(rules).unwrap_err(), GrammarError::OptionalLeading("maybe"));
    }

    #[test]
    fn intent_ids_cover_grammar_and_fallback() {
        let classifier = IntentClassifier::new().unwrap();
        assert_eq!(
            classifier.intent_ids(),
            vec![intent_ids::GREETING, intent_ids::LAST_MATCH, intent_ids::LINK_ACCOUNT, intent_ids::SILENCE]
        );
    }

    #[test]
    fn intent_meta_display_lists_parameters() {
        let meta = IntentMeta::new(intent_ids::LAST_MATCH).with_param(PARAM_GAME, ParamValue::Game(Game::Pubg));
        assert_eq!(meta.to_string(), "lastmatch{game=PUBG}");
        assert_eq!(IntentMeta::fallback().to_string(), "silence");
        assert!(IntentMeta::fallback().is_fallback());
        assert_eq!(meta.account_id(), None);
    }
}
