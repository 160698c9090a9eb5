//! Rule compilation and indexing.
//!
//! This module holds the *static* side of the engine: the structures derived
//! from the full rule list that make a parse run faster and more predictable.
//!
//! Parsing is split into two phases:
//!
//! 1. **Compile/index rules** (this module): create a cheap representation of
//!    the rule set (`CompiledRules`) and pre-index it with coarse metadata.
//! 2. **Run** (see `parser.rs`): scan the phrase for coarse triggers
//!    (`trigger.rs`), select a subset of rules, then saturate and resolve.
//!
//! ## Extension points
//!
//! - Adding a new bucket:
//!   1. Add a `BucketMask` bit.
//!   2. Add a `BUCKET_*` constant and bump `BUCKET_COUNT`.
//!   3. Teach `TriggerInfo::scan` (in `trigger.rs`) to detect it.
//!
//! ## Invariants
//!
//! - `RuleId` is an index into `CompiledRules::rules` and `CompiledRules::metas`.
//!   Those vectors must stay aligned, and the index doubles as the declaration
//!   order used to break ties between intent derivations.
//! - `RuleIndex::by_bucket` uses fixed indices (`BUCKET_*`) to avoid `HashMap`
//!   overhead in the hot path.

use crate::{Dimension, Rule};

/// Rule identifier (index into the rules vector).
pub(crate) type RuleId = usize;

bitflags::bitflags! {
    /// Coarse buckets for fast input classification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BucketMask: u32 {
        const HAS_DIGITS = 1 << 0;
        const HAS_URL    = 1 << 1;
        const CYRILLIC   = 1 << 2;
        const LATIN      = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Tracks which dimensions are present in the stash.
    ///
    /// This is used by the parser to skip rules that depend on dimensions that
    /// cannot possibly match yet.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DimensionSet: u8 {
        const REGEX  = 1 << 0;
        const MARKER = 1 << 1;
        const SLOT   = 1 << 2;
        const INTENT = 1 << 3;
    }
}

impl DimensionSet {
    pub fn of(dim: Dimension) -> Self {
        match dim {
            Dimension::RegexMatch => DimensionSet::REGEX,
            Dimension::Marker => DimensionSet::MARKER,
            Dimension::Slot => DimensionSet::SLOT,
            Dimension::Intent => DimensionSet::INTENT,
        }
    }
}

/// Per-rule metadata pulled out of the `Rule` at compile time.
#[derive(Clone, Copy, Debug)]
pub struct RuleMeta {
    pub buckets: BucketMask,
    pub deps: DimensionSet,
}

#[derive(Default, Debug)]
pub struct RuleIndex {
    pub always_on: Vec<RuleId>,
    pub by_bucket: [Vec<RuleId>; BUCKET_COUNT],
}

pub const BUCKET_COUNT: usize = 4;
pub const BUCKET_HAS_DIGITS: usize = 0;
pub const BUCKET_HAS_URL: usize = 1;
pub const BUCKET_CYRILLIC: usize = 2;
pub const BUCKET_LATIN: usize = 3;

const BUCKETS: [(BucketMask, usize); BUCKET_COUNT] = [
    (BucketMask::HAS_DIGITS, BUCKET_HAS_DIGITS),
    (BucketMask::HAS_URL, BUCKET_HAS_URL),
    (BucketMask::CYRILLIC, BUCKET_CYRILLIC),
    (BucketMask::LATIN, BUCKET_LATIN),
];

/// Pre-compiled rule set with metadata and indexes.
#[derive(Debug)]
pub struct CompiledRules<'a> {
    pub rules: Vec<&'a Rule>,
    pub metas: Vec<RuleMeta>,
    pub index: RuleIndex,
}

impl<'a> CompiledRules<'a> {
    /// Create a compiled rule set from a slice of rules.
    ///
    /// This does not rewrite patterns or build automata; it only records the
    /// bucket requirements and dependency sets of each rule.
    pub fn new(rules: &'a [Rule]) -> Self {
        let rule_refs: Vec<&Rule> = rules.iter().collect();

        let metas: Vec<RuleMeta> = rule_refs
            .iter()
            .map(|r| RuleMeta {
                buckets: BucketMask::from_bits_truncate(r.buckets),
                deps: r.deps.iter().fold(DimensionSet::empty(), |acc, &d| acc | DimensionSet::of(d)),
            })
            .collect();

        let mut index = RuleIndex::default();

        for (id, meta) in metas.iter().enumerate() {
            if meta.buckets.is_empty() {
                index.always_on.push(id);
                continue;
            }
            // A rule with several buckets is listed under each; activation
            // collects ids into a set so it is only run once.
            for (mask, slot) in BUCKETS {
                if meta.buckets.contains(mask) {
                    index.by_bucket[slot].push(id);
                }
            }
        }

        CompiledRules { rules: rule_refs, metas, index }
    }

    /// Rule ids whose bucket requirements are met by `buckets`, in
    /// declaration order.
    pub fn active_ids(&self, buckets: BucketMask) -> Vec<RuleId> {
        let mut ids: Vec<RuleId> = self.index.always_on.clone();
        for (mask, slot) in BUCKETS {
            if buckets.contains(mask) {
                ids.extend(&self.index.by_bucket[slot]);
            }
        }
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Marker, Token};

    fn rules() -> Vec<Rule> {
        vec![
            rule! {
                name: "digits",
                pattern: [re!(r"\d+")],
                buckets: BucketMask::HAS_DIGITS.bits(),
                prod: |_t: &[Token]| -> Option<Marker> { None },
            },
            rule! {
                name: "word",
                pattern: [re!(r"\w+")],
                buckets: (BucketMask::CYRILLIC | BucketMask::LATIN).bits(),
                prod: |_t: &[Token]| -> Option<Marker> { None },
            },
            rule! {
                name: "anything",
                pattern: [re!(r".+")],
                deps: [Dimension::RegexMatch],
                prod: |_t: &[Token]| -> Option<Marker> { None },
            },
        ]
    }

    #[test]
    fn indexes_rules_by_bucket() {
        let rules = rules();
        let compiled = CompiledRules::new(&rules);

        assert_eq!(compiled.index.always_on, vec![2]);
        assert_eq!(compiled.index.by_bucket[BUCKET_HAS_DIGITS], vec![0]);
        assert_eq!(compiled.index.by_bucket[BUCKET_CYRILLIC], vec![1]);
        assert_eq!(compiled.index.by_bucket[BUCKET_LATIN], vec![1]);
        assert!(compiled.metas[2].deps.contains(DimensionSet::REGEX));
    }

    #[test]
    fn active_ids_are_unique_and_ordered() {
        let rules = rules();
        let compiled = CompiledRules::new(&rules);

        assert_eq!(compiled.active_ids(BucketMask::empty()), vec![2]);
        assert_eq!(compiled.active_ids(BucketMask::CYRILLIC | BucketMask::LATIN), vec![1, 2]);
        assert_eq!(compiled.active_ids(BucketMask::all()), vec![0, 1, 2]);
    }
}
