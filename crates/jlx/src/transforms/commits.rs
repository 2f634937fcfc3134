//! 📝 Commits: forty fields in, nine fields out, and the author finally gets an object.
//!
//! GitLab hands us `author_name` and `author_email` as two loose fields, like
//! socks that came out of the dryer separately. We pair them up into
//! `author: {name, email}` (same for the committer), rename `web_url` to `url`,
//! and pick a `created_at` that actually means "when was this written".
//!
//! ## Field map 🗺️
//! | out            | in                                         |
//! |----------------|--------------------------------------------|
//! | `created_at`   | `authored_date`, else `created_at`         |
//! | `committed_at` | `committed_date`                           |
//! | `url`          | `web_url`                                  |
//! | `author`       | `{name: author_name, email: author_email}` |
//! | `committer`    | `{name: committer_name, email: committer_email}` |

use anyhow::Result;
use serde_json::{Value, json};

use super::{StreamReshaper, field, first_present, objects};

/// 📝 The `commits` stream rule.
pub struct Commits;

impl StreamReshaper for Commits {
    const STREAM_NAME: &'static str = "commits";

    fn reshape(records: &[Value]) -> Result<Vec<Value>> {
        Ok(objects(records)
            .map(|commit| {
                json!({
                    "id": field(commit, "id"),
                    "short_id": field(commit, "short_id"),
                    "title": field(commit, "title"),
                    "message": field(commit, "message"),
                    "author": {
                        "name": field(commit, "author_name"),
                        "email": field(commit, "author_email"),
                    },
                    "committer": {
                        "name": field(commit, "committer_name"),
                        "email": field(commit, "committer_email"),
                    },
                    "created_at": first_present(commit, &["authored_date", "created_at"]),
                    "committed_at": field(commit, "committed_date"),
                    "url": field(commit, "web_url"),
                })
            })
            .collect())
    }
}
