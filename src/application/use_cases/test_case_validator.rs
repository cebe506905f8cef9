use crate::domain::error::{AppError, Result};
use crate::domain::test_case::{
    canonical_headers, AssertionRule, MatchType, RuleSet, TestCase, TestType, EMPTY_PARAM,
};
use serde_json::{json, Map, Value};

const DEFAULT_INDEX: &str = "1";
const DEFAULT_DATA_PATH: &str = "result";

/// Drops escape sequences that models over-apply inside JSON-in-a-string
/// payloads: `\'`, `\"`, doubled backslashes and any backslash that does not
/// start a valid JSON escape.
pub fn sanitize_json_string(raw: &str) -> String {
    let unescaped = raw
        .replace("\\'", "'")
        .replace("\\\"", "\"")
        .replace("\\\\", "\\");

    let mut out = String::with_capacity(unescaped.len());
    let mut chars = unescaped.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&next) if "bfnrt/".contains(next) => {
                out.push(c);
                out.push(next);
                chars.next();
            }
            _ => {}
        }
    }
    out
}

fn is_json(text: &str) -> bool {
    serde_json::from_str::<Value>(text).is_ok()
}

fn non_empty_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalizes a repaired model object into a [`TestCase`].
pub struct TestCaseValidator;

impl TestCaseValidator {
    /// Only a missing or empty `name` is rejected; every other field is
    /// coerced or defaulted.
    pub fn validate(
        candidate: &Map<String, Value>,
        api_name: &str,
        test_type: TestType,
    ) -> Result<TestCase> {
        let name = match candidate.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
            _ => {
                return Err(AppError::Validation(format!(
                    "{} {} case is missing a name",
                    api_name, test_type
                )))
            }
        };

        let id = match candidate.get("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
            Some(Value::Null) | Some(Value::String(_)) | None => uuid::Uuid::new_v4().to_string(),
            Some(other) => other.to_string(),
        };

        let param = Self::normalize_param(candidate.get("param"));
        let rule = Self::normalize_rule(candidate.get("rule")).to_json_string();

        Ok(TestCase {
            id,
            name,
            param,
            headers: canonical_headers(),
            rule,
        })
    }

    /// JSON text for the `param` field, `"{}"` when nothing usable is present.
    pub fn normalize_param(value: Option<&Value>) -> String {
        match value {
            None | Some(Value::Null) => EMPTY_PARAM.to_string(),
            Some(Value::String(text)) => {
                if is_json(text) {
                    return text.clone();
                }
                let sanitized = sanitize_json_string(text);
                if is_json(&sanitized) {
                    sanitized
                } else {
                    tracing::warn!("Unparseable param payload, using {}", EMPTY_PARAM);
                    EMPTY_PARAM.to_string()
                }
            }
            Some(structured) => {
                serde_json::to_string(structured).unwrap_or_else(|_| EMPTY_PARAM.to_string())
            }
        }
    }

    /// Repairs a rule payload into a rule set that satisfies every invariant.
    pub fn normalize_rule(value: Option<&Value>) -> RuleSet {
        let parsed = match value {
            Some(Value::String(text)) => serde_json::from_str::<Value>(text)
                .or_else(|_| serde_json::from_str::<Value>(&sanitize_json_string(text)))
                .ok(),
            Some(other) => Some(other.clone()),
            None => None,
        };

        let entries = match parsed.as_ref().and_then(|v| v.get("rules")) {
            Some(Value::Array(entries)) if !entries.is_empty() => entries,
            _ => {
                tracing::warn!("Missing or invalid rules array, using the default rule set");
                return RuleSet::canonical();
            }
        };

        let rules = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| match entry.as_object() {
                Some(object) => Self::fix_rule(i, object),
                None => {
                    tracing::warn!("Rule {} is not an object, replacing it", i);
                    AssertionRule::canonical()
                }
            })
            .collect();

        RuleSet { rules }
    }

    fn fix_rule(position: usize, entry: &Map<String, Value>) -> AssertionRule {
        let match_type = match entry
            .get("matchType")
            .and_then(Value::as_str)
            .and_then(MatchType::parse)
        {
            Some(match_type) => match_type,
            None => {
                tracing::warn!(
                    "Invalid matchType in rule {}: {:?}",
                    position,
                    entry.get("matchType")
                );
                MatchType::Equal
            }
        };

        let mut index = non_empty_text(entry.get("index"));
        if index.is_none() && match_type.requires_index() {
            tracing::warn!(
                "Missing index for matchType {} in rule {}",
                match_type.as_str(),
                position
            );
            index = Some(DEFAULT_INDEX.to_string());
        }

        let data_path = match entry.get("dataPath") {
            Some(Value::String(path)) if !path.trim().is_empty() => path.clone(),
            _ => {
                tracing::warn!("Missing dataPath in rule {}", position);
                DEFAULT_DATA_PATH.to_string()
            }
        };

        let columns = match entry.get("columns") {
            Some(Value::Object(columns)) => columns.clone(),
            _ => {
                tracing::warn!("Missing columns in rule {}", position);
                let mut columns = Map::new();
                columns.insert("result".to_string(), json!(0));
                columns
            }
        };

        AssertionRule {
            match_type,
            index,
            data_path,
            columns,
        }
    }
}
