//! 👥 Users: same person, many files, one entry.
//!
//! Incremental syncs love to write the same user twice. We keep the first
//! sighting of each id, in the order they arrived, and drop the rest. Records
//! without an id can't be deduplicated, so they don't make the cut either.
//!
//! Ids are compared by value: `42` and `"42"` are different people, while
//! `1` and `1.0` are the same one.
//! An id that is an object or a list has no sensible identity, and the whole
//! rule bails so the stream falls back to its original records.

use std::collections::HashSet;

use anyhow::{Result, bail};
use serde_json::{Number, Value, json};

use super::{StreamReshaper, field, objects};

/// 👥 The `users` stream rule.
pub struct Users;

// 🔑 Seen-set key. The type tag keeps 42 and "42" apart; numbers compare by value, so 1 and 1.0 meet.
#[derive(Debug, Hash, PartialEq, Eq)]
enum UserId {
    Integer(i128),
    // 🧮 non-integral floats, by bit pattern
    Fraction(u64),
    Text(String),
    Flag(bool),
}

// 2^53: past this an f64 stops being an exact integer.
const EXACT_F64_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0;

impl UserId {
    fn of(id: &Value) -> Result<Option<Self>> {
        Ok(match id {
            Value::Null => None,
            Value::Number(n) => Some(Self::of_number(n)),
            Value::String(s) => Some(UserId::Text(s.clone())),
            Value::Bool(b) => Some(UserId::Flag(*b)),
            honestly_who_knows => bail!(
                "💀 user id {} can't be compared; ids must be strings or numbers",
                honestly_who_knows
            ),
        })
    }

    fn of_number(n: &Number) -> Self {
        if let Some(the_int) = n.as_i64() {
            return UserId::Integer(i128::from(the_int));
        }
        if let Some(the_uint) = n.as_u64() {
            return UserId::Integer(i128::from(the_uint));
        }
        let the_float = n.as_f64().unwrap_or(f64::NAN);
        if the_float.fract() == 0.0 && the_float.abs() <= EXACT_F64_INTEGER_LIMIT {
            UserId::Integer(the_float as i128)
        } else {
            UserId::Fraction(the_float.to_bits())
        }
    }
}

impl StreamReshaper for Users {
    const STREAM_NAME: &'static str = "users";

    fn reshape(records: &[Value]) -> Result<Vec<Value>> {
        let mut the_seen_ids = HashSet::new();
        let mut the_unique_users = Vec::new();

        for user in objects(records) {
            let Some(the_id) = user.get("id").map(UserId::of).transpose()?.flatten() else {
                continue;
            };
            if !the_seen_ids.insert(the_id) {
                continue;
            }

            the_unique_users.push(json!({
                "id": field(user, "id"),
                "username": field(user, "username"),
                "name": field(user, "name"),
                "url": field(user, "web_url"),
                "avatar_url": field(user, "avatar_url"),
            }));
        }

        Ok(the_unique_users)
    }
}
