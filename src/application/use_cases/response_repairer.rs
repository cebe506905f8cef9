use crate::domain::error::{AppError, Result};
use crate::domain::test_case::{canonical_headers, canonical_rule_json, EMPTY_PARAM};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

pub const FALLBACK_NAME: &str = "Generated Test Case";

static THINK_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<think>[\s\S]*?</think>|<think\s*/>").unwrap());

static REASONING_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<reasoning>[\s\S]*?</reasoning>").unwrap());

static INTERNAL_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<internal>[\s\S]*?</internal>").unwrap());

static LEADING_FENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```(?:json|JSON)?[ \t]*\r?\n?").unwrap());

static TRAILING_FENCE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```\s*$").unwrap());

static SINGLE_QUOTED_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'([^']*)'\s*:").unwrap());

static SINGLE_QUOTED_VALUE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":\s*'([^']*)'").unwrap());

static TRAILING_COMMA_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());

static MISSING_COMMA_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([}\]])\s*([{"])"#).unwrap());

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""name"\s*:\s*"([^"]*)""#).unwrap());

static ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r#""id"\s*:\s*"([^"]*)""#).unwrap());

/// Outcome of [`ResponseRepairer::repair`].
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    pub value: Map<String, Value>,
    /// True when nothing parseable was found and `value` is a fallback case.
    pub salvaged: bool,
}

/// Turns raw model output into a JSON object.
pub struct ResponseRepairer;

impl ResponseRepairer {
    /// Extracts and parses the JSON object in `raw`, fixing the usual
    /// formatting slips of chat models along the way.
    pub fn try_repair(raw: &str) -> Result<Map<String, Value>> {
        let cleaned = strip_fences(&strip_reasoning(raw));

        // Whole-text parse first, so well-formed arrays keep their brackets.
        if let Some(object) = parse_object(&cleaned) {
            return Ok(unwrap_test_case(object));
        }

        let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) else {
            return Err(AppError::JsonProcessing(
                "No JSON object found in model response".to_string(),
            ));
        };
        if end < start {
            return Err(AppError::JsonProcessing(
                "No JSON object found in model response".to_string(),
            ));
        }
        let span = &cleaned[start..=end];

        if let Some(object) = parse_object(span) {
            return Ok(unwrap_test_case(object));
        }

        let quoted = SINGLE_QUOTED_KEY_PATTERN.replace_all(span, "\"$1\":");
        let quoted = SINGLE_QUOTED_VALUE_PATTERN.replace_all(&quoted, ": \"$1\"");
        let without_trailing = TRAILING_COMMA_PATTERN
            .replace_all(&quoted, "$1")
            .to_string();
        if let Some(object) = parse_object(&without_trailing) {
            return Ok(unwrap_test_case(object));
        }

        // Comma insertion can touch string contents, so it runs last.
        let with_commas = MISSING_COMMA_PATTERN
            .replace_all(&without_trailing, "$1, $2")
            .to_string();
        let candidates = [with_commas.clone(), format!("[{}]", with_commas)];
        for candidate in &candidates {
            if let Some(object) = parse_object(candidate) {
                return Ok(unwrap_test_case(object));
            }
        }

        let detail = serde_json::from_str::<Value>(&with_commas)
            .err()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "not a JSON object".to_string());
        Err(AppError::JsonProcessing(format!(
            "Could not parse model response: {}",
            detail
        )))
    }

    /// Like [`try_repair`](Self::try_repair) but never fails: unparseable
    /// text becomes a minimal fallback case built from whatever `name` and
    /// `id` can be recovered.
    pub fn repair(raw: &str) -> Repaired {
        match Self::try_repair(raw) {
            Ok(value) => Repaired {
                value,
                salvaged: false,
            },
            Err(e) => {
                tracing::warn!("Creating fallback test case: {}", e);
                Repaired {
                    value: fallback_case(raw),
                    salvaged: true,
                }
            }
        }
    }
}

fn strip_reasoning(raw: &str) -> String {
    let cleaned = THINK_TAG_PATTERN.replace_all(raw, "");
    let cleaned = REASONING_TAG_PATTERN.replace_all(&cleaned, "");
    INTERNAL_TAG_PATTERN.replace_all(&cleaned, "").to_string()
}

fn strip_fences(text: &str) -> String {
    let text = LEADING_FENCE_PATTERN.replace(text, "");
    TRAILING_FENCE_PATTERN.replace(&text, "").trim().to_string()
}

/// Parses `text` as an object, or as an array whose first object is taken.
fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Object(object) => Some(object),
        Value::Array(items) => items.into_iter().find_map(|item| match item {
            Value::Object(object) => Some(object),
            _ => None,
        }),
        _ => None,
    }
}

fn unwrap_test_case(mut object: Map<String, Value>) -> Map<String, Value> {
    for key in ["TestCase", "testCase"] {
        if matches!(object.get(key), Some(Value::Object(_))) {
            if let Some(Value::Object(inner)) = object.remove(key) {
                return inner;
            }
        }
    }
    object
}

fn fallback_case(raw: &str) -> Map<String, Value> {
    let name = NAME_PATTERN
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_NAME.to_string());
    let id = ID_PATTERN
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut case = Map::new();
    case.insert("id".to_string(), Value::String(id));
    case.insert("name".to_string(), Value::String(name));
    case.insert("param".to_string(), Value::String(EMPTY_PARAM.to_string()));
    case.insert("headers".to_string(), json!(canonical_headers()));
    case.insert("rule".to_string(), Value::String(canonical_rule_json()));
    case
}
