//! 📜 JSONL decoding: bytes in, records out, envelopes peeled.
//!
//! One object body becomes a list of records. The rules are short:
//! - whitespace around the whole body is trimmed, then it's split on `\n`
//!   (memchr does the scanning; we do the judging)
//! - empty lines are skipped; a line of only spaces is NOT empty
//! - every other line must be valid JSON, or the whole file is rejected
//! - objects carrying `_airbyte_data` are replaced by what's inside it
//!
//! ⚠️ "The whole file is rejected" is deliberate. One bad line and the records
//! parsed before it are thrown away with the rest. Callers treat that as a
//! file-level failure and move on to the next file.

use std::io::Read;

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use serde_json::Value;

/// 📦 The key an ingestion tool wraps the real payload in.
pub const ENVELOPE_KEY: &str = "_airbyte_data";

/// 🎁 Peel the envelope off a record, if it has one.
///
/// `{"_airbyte_data": {...}, "_airbyte_ab_id": "..."}` becomes `{...}`.
/// Anything without the key (including non-objects) comes back untouched.
pub fn unwrap_envelope(record: Value) -> Value {
    match record {
        Value::Object(mut map) => match map.remove(ENVELOPE_KEY) {
            Some(the_payload) => the_payload,
            None => Value::Object(map),
        },
        honestly_who_knows => honestly_who_knows,
    }
}

/// 🔬 Parse a JSONL body into unwrapped records.
///
/// # Errors
/// 💀 Non-UTF-8 bytes, or any non-blank line that isn't JSON. The error names
/// the 1-based line number so the logs can point a finger.
pub fn parse_records(bytes: &[u8]) -> Result<Vec<Value>> {
    let the_text =
        std::str::from_utf8(bytes).context("💀 object body is not UTF-8. It is something, but not text.")?;

    // ✂️ Trim the body, not the lines. Line numbers still count from the top of the file.
    let the_body = the_text.trim();
    let the_leading = the_text.len() - the_text.trim_start().len();
    let the_first_line_number = memchr::memchr_iter(b'\n', &bytes[..the_leading]).count() + 1;

    let the_body_bytes = the_body.as_bytes();
    let mut the_records = Vec::new();
    let mut the_line_start = 0usize;
    let the_line_ends =
        memchr::memchr_iter(b'\n', the_body_bytes).chain(std::iter::once(the_body_bytes.len()));

    for (the_line_index, the_line_end) in the_line_ends.enumerate() {
        // 🧮 '\n' is ASCII, so these byte offsets are always char boundaries.
        let the_line = &the_body[the_line_start..the_line_end];
        the_line_start = the_line_end + 1;

        if the_line.is_empty() {
            continue;
        }

        let the_value: Value = serde_json::from_str(the_line).with_context(|| {
            format!(
                "💀 line {} is not valid JSON",
                the_first_line_number + the_line_index
            )
        })?;
        the_records.push(unwrap_envelope(the_value));
    }

    Ok(the_records)
}

/// 🫁 Gunzip a body. Concatenated gzip members are fine; multipart writers love those.
pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut the_inflated = Vec::with_capacity(bytes.len() * 4);
    MultiGzDecoder::new(bytes)
        .read_to_end(&mut the_inflated)
        .context("💀 object claimed to be gzip. The decoder disagreed.")?;
    Ok(the_inflated)
}
