//! Filter text for MongoDB collections.
//!
//! Two shapes are accepted: a JSON query document (`{"age": {"$gt": 21}}`,
//! extended JSON such as `{"$oid": ...}` included) or a comma separated
//! `key=value` list where each value is coerced to the narrowest type that
//! parses.

use mongodb::bson::{oid::ObjectId, Bson, Document};

use crate::errors::DriverError;

pub fn parse_filter(input: &str) -> Result<Document, DriverError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Document::new());
    }
    if input.starts_with('{') {
        return parse_json_filter(input);
    }

    let mut doc = Document::new();
    for pair in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| DriverError::Query(format!("expected key=value, got '{}'", pair)))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(DriverError::Query(format!("missing field name in '{}'", pair)));
        }
        doc.insert(key, coerce_value(key, value.trim()));
    }
    Ok(doc)
}

fn parse_json_filter(input: &str) -> Result<Document, DriverError> {
    let json: serde_json::Value = serde_json::from_str(input)
        .map_err(|e| DriverError::Query(format!("invalid JSON filter: {}", e)))?;
    match Bson::try_from(json) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(_) => Err(DriverError::Query("JSON filter must be an object".to_string())),
        Err(e) => Err(DriverError::Query(format!("invalid extended JSON: {}", e))),
    }
}

/// Integer, then finite float, then boolean, then (for `_id` only) ObjectId,
/// else the raw string.
pub fn coerce_value(key: &str, raw: &str) -> Bson {
    if let Ok(i) = raw.parse::<i64>() {
        return Bson::Int64(i);
    }
    if let Ok(f) = raw.parse::<f64>()
        && f.is_finite()
    {
        return Bson::Double(f);
    }
    match raw {
        "true" => return Bson::Boolean(true),
        "false" => return Bson::Boolean(false),
        _ => {}
    }
    if key == "_id"
        && let Ok(oid) = ObjectId::parse_str(raw)
    {
        return Bson::ObjectId(oid);
    }
    Bson::String(raw.to_string())
}

/// AND several filter texts into one JSON filter. A single term is returned
/// untouched.
pub fn combine_filters(terms: &[String]) -> Result<String, DriverError> {
    let terms: Vec<&str> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    match terms.as_slice() {
        [] => Ok(String::new()),
        [single] => Ok(single.to_string()),
        many => {
            let mut clauses = Vec::with_capacity(many.len());
            for term in many {
                let doc = parse_filter(term)?;
                clauses.push(Bson::Document(doc).into_canonical_extjson());
            }
            Ok(serde_json::json!({ "$and": clauses }).to_string())
        }
    }
}
