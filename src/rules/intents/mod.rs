//! Built-in grammar: greeting, last match and account linking.
//!
//! Terminal rules turn surface words into markers and slots; intent rules
//! combine those into [`IntentMeta`](crate::IntentMeta) values. Intent rules
//! are declared in tie-break order.

pub(crate) mod helpers;
pub(crate) mod predicates;
pub(crate) mod rules;
