//! Starting content for new documents and the canonical JSON rendering used for generated ones.

use serde::Serialize;
use serde_json::{json, ser::PrettyFormatter, Map, Value};
use shared::domain::Category;

use crate::WorkflowError;

const INDENT: &[u8] = b"    ";

/// Schema-shaped record with empty scalar fields for the given category.
pub fn template_for(category: Category) -> Value {
    match category {
        Category::Environments => json!({
            "location_name": "New Environment",
            "lighting": "",
            "time_of_day": "",
            "mood": "",
            "weather": "Clear",
        }),
        Category::Styles => json!({
            "style_id": "",
            "description": "",
        }),
        Category::Characters | Category::Gallery => json!({
            "name": "New Character",
            "physical_traits": {
                "age_range": "",
                "hair": "",
                "eyes": "",
                "physique": "",
            },
            "clothing": "",
            "extra_details": "",
        }),
    }
}

pub fn template_text(category: Category) -> Result<String, WorkflowError> {
    to_pretty_json(&template_for(category))
}

/// Serializes with keys sorted at every level and four-space indentation, independent of how
/// the value was built.
pub fn to_pretty_json(value: &Value) -> Result<String, WorkflowError> {
    let sorted = sort_keys(value);
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(INDENT));
    sorted.serialize(&mut serializer).map_err(|err| {
        WorkflowError::GenerationError(format!("failed to render document: {err}"))
    })?;
    String::from_utf8(out).map_err(|err| {
        WorkflowError::GenerationError(format!("rendered document is not utf-8: {err}"))
    })
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
