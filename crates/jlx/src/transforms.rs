//! 🔄 Transforms: the Rosetta Stone of stream reshaping 🎭
//!
//! 🎬 COLD OPEN. INT. UNITED NATIONS, SIMULTANEOUS TRANSLATION BOOTH, 2:47 AM.
//!
//! Raw GitLab records on the left screen, forty fields each. The shape the
//! dashboard team asked for on the right screen, nine fields each. In between:
//! this module. "It's just JSON to JSON," someone said in standup.
//! (Narrator: It was JSON to JSON. But the JSON had opinions.)
//!
//! ## How dispatch works 📐
//!
//! ```text
//!   stream name ──▶ rules table ──▶ fn(&[Value]) -> Result<Vec<Value>>
//!                       │                    │
//!                 no entry / not a list      └─ Err ──▶ Fallback(original)
//!                       ▼
//!                  PassedThrough
//! ```
//!
//! Every rule is a zero-sized marker type implementing [`StreamReshaper`]. The
//! table stores plain function pointers to their `reshape`, built once, never
//! mutated, shared by `Arc` with every request.
//!
//! ## The promise 🤝
//! Every stream that goes in comes out. Reshaped if we can, untouched if we
//! can't. Nobody's data gets dropped because a different stream had a bad day.
//!
//! 🦆

use std::collections::HashMap;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub mod commits;
pub mod projects;
pub mod users;

pub use commits::Commits;
pub use projects::Projects;
pub use users::Users;

/// 🔧 A reshaping rule, as a plain function value.
pub type ReshapeFn = fn(&[Value]) -> Result<Vec<Value>>;

/// 🔄 One stream's reshaping rule.
///
/// # Contract 📜
/// - `STREAM_NAME` is matched exactly against the stream name.
/// - `reshape` borrows the records; on error the caller keeps the originals.
/// - Non-object entries are dropped without comment.
pub trait StreamReshaper {
    const STREAM_NAME: &'static str;

    fn reshape(records: &[Value]) -> Result<Vec<Value>>;
}

/// 📬 What happened to one stream on its way through.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// ✅ A rule matched and did its job.
    Reshaped(Vec<Value>),
    /// 🚶 No rule for this stream, or it wasn't a list. Untouched.
    PassedThrough(Value),
    /// 💀 The rule choked. The originals are kept, the reason is kept for the logs.
    Fallback { original: Vec<Value>, reason: String },
}

impl StreamOutcome {
    pub fn into_value(self) -> Value {
        match self {
            StreamOutcome::Reshaped(the_records) => Value::Array(the_records),
            StreamOutcome::PassedThrough(the_value) => the_value,
            StreamOutcome::Fallback { original, .. } => Value::Array(original),
        }
    }
}

/// 🗺️ The immutable stream-name → rule table.
#[derive(Debug, Clone)]
pub struct Transformer {
    rules: HashMap<&'static str, ReshapeFn>,
}

impl Default for Transformer {
    /// 📋 The house rules: `commits`, `projects`, `users`. Everyone else passes through.
    fn default() -> Self {
        Self::empty()
            .with_rule::<Commits>()
            .with_rule::<Projects>()
            .with_rule::<Users>()
    }
}

impl Transformer {
    /// 🕳️ No rules at all. Everything passes through.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// ➕ Register a rule under its stream name. A later rule for the same name wins.
    pub fn with_rule<R: StreamReshaper>(mut self) -> Self {
        self.rules.insert(R::STREAM_NAME, R::reshape as ReshapeFn);
        self
    }

    pub fn has_rule(&self, stream: &str) -> bool {
        self.rules.contains_key(stream)
    }

    /// 🎯 Decide one stream's fate.
    pub fn outcome_for(&self, stream: &str, value: Value) -> StreamOutcome {
        let the_records = match value {
            Value::Array(the_records) => the_records,
            honestly_who_knows => {
                warn!(
                    "⚠️ Stream '{}' is not a list (it's {}), passing it through untouched",
                    stream,
                    json_kind(&honestly_who_knows)
                );
                return StreamOutcome::PassedThrough(honestly_who_knows);
            }
        };

        let Some(the_rule) = self.rules.get(stream) else {
            debug!("🚶 No rule for stream '{}', passing through", stream);
            return StreamOutcome::PassedThrough(Value::Array(the_records));
        };

        match the_rule(&the_records) {
            Ok(the_reshaped) => {
                debug!(
                    "✅ Reshaped stream '{}': {} in, {} out",
                    stream,
                    the_records.len(),
                    the_reshaped.len()
                );
                StreamOutcome::Reshaped(the_reshaped)
            }
            Err(err) => {
                let the_reason = format!("{err:#}");
                warn!(
                    "⚠️ Reshaping stream '{}' failed, keeping the original records: {}",
                    stream, the_reason
                );
                StreamOutcome::Fallback {
                    original: the_records,
                    reason: the_reason,
                }
            }
        }
    }

    /// 🔄 Reshape every stream in the document. Same keys out as in. Never fails.
    pub fn apply(&self, data: Map<String, Value>) -> Map<String, Value> {
        data.into_iter()
            .map(|(the_stream, the_value)| {
                let the_outcome = self.outcome_for(&the_stream, the_value);
                (the_stream, the_outcome.into_value())
            })
            .collect()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

// ============================================================
//  🧰 Field helpers shared by the rules
// ============================================================

/// 📦 `record[key]`, cloned, or `null` if it isn't there.
pub(crate) fn field(record: &Map<String, Value>, key: &str) -> Value {
    record.get(key).cloned().unwrap_or(Value::Null)
}

/// 🥇 The first of `keys` whose value is present: not missing, not `null`, not `""`.
/// Falls back to `null` when none qualify.
pub(crate) fn first_present(record: &Map<String, Value>, keys: &[&str]) -> Value {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find(|value| is_present(value))
        .cloned()
        .unwrap_or(Value::Null)
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// 🧹 Only the objects. Everything else in the list quietly leaves the party.
pub(crate) fn objects(records: &[Value]) -> impl Iterator<Item = &Map<String, Value>> {
    records.iter().filter_map(Value::as_object)
}
