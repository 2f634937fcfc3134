//! 🗂️ Projects: flattening the namespace, one identity crisis at a time.
//!
//! `namespace` shows up as an object (`{"id": 3, "name": "eng", ...}`) from the
//! API and sometimes as a bare string from older exports. We want a string
//! either way, or `null` when there's nothing to go on.
//!
//! `updated_at` prefers `last_activity_at` (what people actually mean by
//! "updated") and `description` prefers the rendered HTML, then the plain text,
//! then `""` so the dashboard never has to null-check it.

use anyhow::Result;
use serde_json::{Map, Value, json};

use super::{StreamReshaper, field, first_present, objects};

/// 🗂️ The `projects` stream rule.
pub struct Projects;

/// 🏷️ Object → its `name`. String → itself. Anything else → `null`.
fn namespace_of(project: &Map<String, Value>) -> Value {
    match project.get("namespace") {
        Some(Value::Object(the_namespace)) => field(the_namespace, "name"),
        Some(the_name @ Value::String(_)) => the_name.clone(),
        _ => Value::Null,
    }
}

fn description_of(project: &Map<String, Value>) -> Value {
    match first_present(project, &["description_html", "description"]) {
        Value::Null => Value::String(String::new()),
        the_description => the_description,
    }
}

impl StreamReshaper for Projects {
    const STREAM_NAME: &'static str = "projects";

    fn reshape(records: &[Value]) -> Result<Vec<Value>> {
        Ok(objects(records)
            .map(|project| {
                json!({
                    "id": field(project, "id"),
                    "name": field(project, "name"),
                    "path_with_namespace": field(project, "path_with_namespace"),
                    "url": field(project, "web_url"),
                    "namespace": namespace_of(project),
                    "created_at": field(project, "created_at"),
                    "updated_at": first_present(project, &["last_activity_at", "updated_at"]),
                    "visibility": field(project, "visibility"),
                    "description": description_of(project),
                })
            })
            .collect())
    }
}
