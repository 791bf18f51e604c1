//! Parse model output into STIX objects

use crate::error::ExtractorError;
use serde_json::Value;
use stixweave_domain::StixObject;
use tracing::warn;

/// Parse a final answer into objects
///
/// Accepts a JSON array of objects, a bundle, or a single object, optionally
/// wrapped in a markdown code block or surrounded by prose. Elements that are
/// not typed objects are skipped. Objects without an `id` get a
/// `{type}--local-{n}` placeholder that the identifier normalizer rewrites.
///
/// # Errors
///
/// `InvalidFormat` when no JSON can be found or its shape is wrong,
/// `JsonParse` when the JSON itself is broken.
pub fn parse_objects(response: &str) -> Result<Vec<StixObject>, ExtractorError> {
    let json_str = extract_json(response)?;
    let json: Value = serde_json::from_str(json_str)?;
    Ok(objects_from_values(into_items(json)?))
}

/// Convert JSON values into objects, skipping untyped elements and filling
/// missing ids with placeholders
pub fn objects_from_values(items: Vec<Value>) -> Vec<StixObject> {
    let mut objects = Vec::with_capacity(items.len());
    let mut placeholders = 0;
    for (idx, item) in items.into_iter().enumerate() {
        match StixObject::from_value(item) {
            Ok(object) if object.object_type == "bundle" => {
                warn!("Skipping nested bundle at position {}", idx);
            }
            Ok(mut object) => {
                if object.id.trim().is_empty() {
                    object.id = format!("{}--local-{}", object.object_type, placeholders);
                    placeholders += 1;
                }
                objects.push(object);
            }
            Err(e) => warn!("Skipping element {}: {}", idx, e),
        }
    }
    objects
}

/// Candidate objects from `validate_draft` arguments
///
/// Accepts `{"objects": [...]}`, `{"objects": "<json>"}` or a bare array.
pub fn parse_draft_arguments(arguments: &Value) -> Result<Vec<Value>, String> {
    let objects = match arguments {
        Value::Object(map) => map
            .get("objects")
            .ok_or_else(|| "missing 'objects' argument".to_string())?,
        Value::Array(_) => arguments,
        Value::String(raw) => return Err(format!("arguments are not valid JSON: {}", raw)),
        _ => return Err("expected an object with an 'objects' array".to_string()),
    };
    match objects {
        Value::Array(items) => Ok(items.clone()),
        Value::String(raw) => {
            let json: Value = serde_json::from_str(extract_json(raw).map_err(|e| e.to_string())?)
                .map_err(|e| format!("'objects' is not valid JSON: {}", e))?;
            into_items(json).map_err(|e| e.to_string())
        }
        _ => Err("'objects' must be an array".to_string()),
    }
}

/// Locate the JSON payload in a response
fn extract_json(response: &str) -> Result<&str, ExtractorError> {
    let trimmed = response.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        // Skip the language tag line, stop at the closing fence
        let body = rest.split_once('\n').map_or("", |(_, body)| body);
        let body = body.rsplit_once("```").map_or(body, |(inner, _)| inner);
        return Ok(body.trim());
    }

    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        return Ok(trimmed);
    }

    let start = trimmed
        .find(['[', '{'])
        .ok_or_else(|| ExtractorError::InvalidFormat("no JSON found in answer".to_string()))?;
    let end = trimmed
        .rfind([']', '}'])
        .filter(|&end| end > start)
        .ok_or_else(|| ExtractorError::InvalidFormat("unterminated JSON in answer".to_string()))?;
    Ok(&trimmed[start..=end])
}

fn into_items(json: Value) -> Result<Vec<Value>, ExtractorError> {
    match json {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("objects") {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(ExtractorError::InvalidFormat(
                "'objects' must be an array".to_string(),
            )),
            None if map.contains_key("type") => Ok(vec![Value::Object(map)]),
            None => Err(ExtractorError::InvalidFormat(
                "expected a JSON array of objects or a bundle".to_string(),
            )),
        },
        _ => Err(ExtractorError::InvalidFormat(
            "expected a JSON array of objects or a bundle".to_string(),
        )),
    }
}
