//! The subset of JSONPath used by JSON-paths mapping files:
//! `$.key`, `$['key']`, `$["key"]` and nested combinations of those.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JsonPathError {
    #[error("path `{0}` does not start with `$`")]
    MissingRoot(String),

    #[error("path `{path}` is malformed at byte {offset}")]
    Malformed { path: String, offset: usize },

    #[error("path `{0}` selects nothing")]
    Empty(String),
}

/// Object keys walked from the document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<String>,
}

impl JsonPath {
    pub fn parse(path: &str) -> Result<Self, JsonPathError> {
        let trimmed = path.trim();
        let mut rest = trimmed
            .strip_prefix('$')
            .ok_or_else(|| JsonPathError::MissingRoot(path.to_string()))?;
        let mut segments = Vec::new();

        while !rest.is_empty() {
            let offset = trimmed.len() - rest.len();
            let malformed = || JsonPathError::Malformed {
                path: path.to_string(),
                offset,
            };

            if let Some(after) = rest.strip_prefix('.') {
                let end = after.find(|c: char| c == '.' || c == '[').unwrap_or(after.len());
                if end == 0 {
                    return Err(malformed());
                }
                segments.push(after[..end].to_string());
                rest = &after[end..];
            } else if let Some(after) = rest.strip_prefix("['") {
                let end = after.find("']").ok_or_else(malformed)?;
                segments.push(after[..end].to_string());
                rest = &after[end + 2..];
            } else if let Some(after) = rest.strip_prefix("[\"") {
                let end = after.find("\"]").ok_or_else(malformed)?;
                segments.push(after[..end].to_string());
                rest = &after[end + 2..];
            } else {
                return Err(malformed());
            }
        }

        if segments.is_empty() {
            return Err(JsonPathError::Empty(path.to_string()));
        }
        Ok(Self { segments })
    }

    /// The value at this path, `None` when any key along the way is missing.
    pub fn select<'a>(&self, object: &'a Map<String, Value>) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let mut current = object.get(first)?;
        for key in rest {
            current = current.as_object()?.get(key)?;
        }
        Some(current)
    }
}

#[derive(Debug, Deserialize)]
struct JsonPathsFile {
    jsonpaths: Vec<String>,
}

/// Read a JSON-paths file: `{"jsonpaths": ["$['artist']", ...]}`, one path per
/// target column in column order.
pub fn read_paths_file(path: &Path) -> Result<Vec<JsonPath>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read JSON-paths file {}: {e}", path.display()))?;
    let file: JsonPathsFile = serde_json::from_str(&content)
        .map_err(|e| format!("invalid JSON-paths file {}: {e}", path.display()))?;
    file.jsonpaths
        .iter()
        .map(|p| JsonPath::parse(p).map_err(|e| e.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_bracket_and_dot_forms() {
        let bracket = JsonPath::parse("$['firstName']").expect("bracket");
        let double = JsonPath::parse("$[\"firstName\"]").expect("double quoted");
        let dot = JsonPath::parse("$.firstName").expect("dot");
        assert_eq!(bracket, dot);
        assert_eq!(double, dot);
    }

    #[test]
    fn selects_nested_values() {
        let doc = json!({"song": {"title": "Setanta matins"}, "ts": 1});
        let obj = doc.as_object().expect("object");
        let path = JsonPath::parse("$.song['title']").expect("nested");
        assert_eq!(path.select(obj), Some(&json!("Setanta matins")));
        assert_eq!(
            JsonPath::parse("$.missing").expect("parse").select(obj),
            None
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(matches!(
            JsonPath::parse("artist"),
            Err(JsonPathError::MissingRoot(_))
        ));
        assert!(matches!(
            JsonPath::parse("$['artist'"),
            Err(JsonPathError::Malformed { .. })
        ));
        assert!(matches!(JsonPath::parse("$"), Err(JsonPathError::Empty(_))));
        assert!(matches!(
            JsonPath::parse("$[0]"),
            Err(JsonPathError::Malformed { .. })
        ));
    }
}
