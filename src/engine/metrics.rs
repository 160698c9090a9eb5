//! Engine run metrics.
//!
//! `Parser::run` always returns a `RunResult` with timings. Per-pass node
//! lists are only collected when the caller asks for them (the verbose
//! classification path), so the hot path does not clone nodes it never shows.

use crate::{Node, ResolvedToken};
use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct RunMetrics {
    /// Total elapsed time for [`Parser::run`](super::Parser::run).
    pub total: Duration,
    pub saturation: SaturationMetrics,
    /// Time spent resolving and ordering candidates after saturation.
    pub resolve: Duration,
}

/// Timings for the saturation phase.
#[derive(Debug, Default, Clone)]
pub struct SaturationMetrics {
    /// Total elapsed time for saturation (initial regex pass + iterations).
    pub total: Duration,
    /// Metrics for the initial regex-only pass.
    pub initial_regex: PassMetrics,
    /// Metrics for each subsequent saturation iteration.
    pub iterations: Vec<PassMetrics>,
}

/// Timing (and node discovery counts) for a single pass.
#[derive(Debug, Default, Clone)]
pub struct PassMetrics {
    pub duration: Duration,
    /// Number of new nodes added to the stash during the pass.
    pub produced: usize,
    /// New nodes produced in this pass, when traces were requested.
    pub nodes: Vec<Node>,
    /// Number of rules attempted during this pass.
    pub rules_considered: usize,
    /// Number of rules that had at least one first-pattern match.
    pub rules_seeded: usize,
}

/// Parser output bundled with timing information.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Every intent node covering the whole phrase, in rule declaration order.
    pub candidates: Vec<ResolvedToken>,
    /// The winning candidate (first declared), if any.
    pub best: Option<ResolvedToken>,
    pub metrics: RunMetrics,
}
