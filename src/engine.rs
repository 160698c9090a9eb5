//! Grammar matching engine.
//!
//! The classifier hands a normalized phrase and the grammar rules to this
//! module and gets back every intent derivation that covers the whole phrase.
//!
//! ## How the parts work together
//!
//! ```text
//! rules (all)  ──┐
//!               │  CompiledRules::new           (compiled_rules.rs)
//!               └───────────────┬──────────────
//!                               │
//! phrase ── TriggerInfo::scan ──┼─ select active rules (buckets)
//!         (trigger.rs)          │
//!                               v
//!                     Parser::saturate (parser.rs)
//!                       - seed matches (regex-first)
//!                       - iterate to fixpoint
//!                       - dedup via NodeKey (dedup.rs)
//!                               │
//!                               v
//!                     resolve_node (resolve.rs)
//!                       - keep whole-phrase intent nodes
//!                       - order by rule declaration
//!                               │
//!                               v
//!                        Vec<ResolvedToken>
//! ```
//!
//! The engine leans on **saturation**: repeatedly apply rules until an
//! iteration produces no new nodes. Terminal rules turn literal words into
//! markers and slots, intent rules combine those into intents, and nothing has
//! to be hand-ordered between the two layers.
//!
//! ## Responsibilities by module
//!
//! - `compiled_rules.rs`: derives `CompiledRules` from `Rule`s and builds the
//!   bucket index plus the declaration order used for tie-breaking.
//! - `trigger.rs`: normalizes phrases and scans them for coarse buckets.
//! - `parser.rs`: matching + saturation over a `Stash`.
//! - `dedup.rs`: stable dedup keys to keep saturation finite.
//! - `resolve.rs`: turns intent nodes into `ResolvedToken`s.
//! - `metrics.rs`: timing/debug data for runs and passes.
//!
//! ## Debugging
//!
//! Run with `RUST_LOG=botislav::engine=trace` to see activation and matching
//! traces.

#[path = "engine/compiled_rules.rs"]
mod compiled_rules;
#[path = "engine/dedup.rs"]
mod dedup;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/parser.rs"]
mod parser;
#[path = "engine/resolve.rs"]
mod resolve;
#[path = "engine/trigger.rs"]
mod trigger;

pub use compiled_rules::{BucketMask, CompiledRules};
pub use parser::Parser;
pub use trigger::normalize;
