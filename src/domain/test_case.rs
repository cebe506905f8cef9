use crate::domain::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const EMPTY_PARAM: &str = "{}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Functional,
    Performance,
    Boundary,
    Exception,
}

impl TestType {
    pub const ALL: [TestType; 4] = [
        TestType::Functional,
        TestType::Performance,
        TestType::Boundary,
        TestType::Exception,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Functional => "functional",
            TestType::Performance => "performance",
            TestType::Boundary => "boundary",
            TestType::Exception => "exception",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "functional" => Ok(TestType::Functional),
            "performance" => Ok(TestType::Performance),
            "boundary" => Ok(TestType::Boundary),
            "exception" => Ok(TestType::Exception),
            other => Err(AppError::Validation(format!("Unknown test type: {}", other))),
        }
    }
}

/// Assertion semantics applied to the response of a generated case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    #[serde(rename = "top")]
    Top,
    #[serde(rename = "equal")]
    Equal,
    #[serde(rename = "min")]
    Min,
    #[serde(rename = "max")]
    Max,
    #[serde(rename = "pos")]
    Pos,
    #[serde(rename = "not_in")]
    NotIn,
}

impl MatchType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "top" => Some(MatchType::Top),
            "equal" => Some(MatchType::Equal),
            "min" => Some(MatchType::Min),
            "max" => Some(MatchType::Max),
            "pos" => Some(MatchType::Pos),
            "not_in" => Some(MatchType::NotIn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Top => "top",
            MatchType::Equal => "equal",
            MatchType::Min => "min",
            MatchType::Max => "max",
            MatchType::Pos => "pos",
            MatchType::NotIn => "not_in",
        }
    }

    /// `top`, `pos` and `not_in` address a position in the response and need an index.
    pub fn requires_index(&self) -> bool {
        matches!(self, MatchType::Top | MatchType::Pos | MatchType::NotIn)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionRule {
    #[serde(rename = "matchType")]
    pub match_type: MatchType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "dataPath")]
    pub data_path: String,
    pub columns: Map<String, Value>,
}

impl AssertionRule {
    /// `equal` on `result`, expecting `{"result": 0}`.
    pub fn canonical() -> Self {
        let mut columns = Map::new();
        columns.insert("result".to_string(), json!(0));
        Self {
            match_type: MatchType::Equal,
            index: None,
            data_path: "result".to_string(),
            columns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<AssertionRule>,
}

impl RuleSet {
    pub fn canonical() -> Self {
        Self {
            rules: vec![AssertionRule::canonical()],
        }
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| canonical_rule_json())
    }
}

pub fn canonical_rule_json() -> String {
    r#"{"rules":[{"matchType":"equal","dataPath":"result","columns":{"result":0}}]}"#.to_string()
}

pub fn canonical_headers() -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert(
        CONTENT_TYPE_HEADER.to_string(),
        JSON_CONTENT_TYPE.to_string(),
    );
    headers
}

/// A generated API test case.
///
/// `param` and `rule` hold JSON text; consumers parse them to reach the
/// structured payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub name: String,
    pub param: String,
    pub headers: BTreeMap<String, String>,
    pub rule: String,
}

impl TestCase {
    #[cfg(test)]
    pub fn rule_set(&self) -> Result<RuleSet> {
        serde_json::from_str(&self.rule)
            .map_err(|e| AppError::Validation(format!("Rule payload is not a rule set: {}", e)))
    }

    #[cfg(test)]
    pub fn param_value(&self) -> Result<Value> {
        serde_json::from_str(&self.param)
            .map_err(|e| AppError::Validation(format!("Param payload is not JSON: {}", e)))
    }

    /// Record written to the similarity index: the case plus its retrieval metadata.
    pub fn to_index_record(&self, api_name: &str, test_type: TestType) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("id".to_string(), Value::String(self.id.clone()));
        record.insert("name".to_string(), Value::String(self.name.clone()));
        record.insert("param".to_string(), Value::String(self.param.clone()));
        record.insert("headers".to_string(), json!(self.headers));
        record.insert("rule".to_string(), Value::String(self.rule.clone()));
        record.insert("api_name".to_string(), Value::String(api_name.to_string()));
        record.insert(
            "type".to_string(),
            Value::String(test_type.as_str().to_string()),
        );
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_round_trips_through_str() {
        for test_type in TestType::ALL {
            assert_eq!(test_type.as_str().parse::<TestType>().unwrap(), test_type);
        }
        assert_eq!(" Boundary ".parse::<TestType>().unwrap(), TestType::Boundary);
        assert!("smoke".parse::<TestType>().is_err());
    }

    #[test]
    fn test_canonical_rule_json_matches_rule_set() {
        let parsed: RuleSet = serde_json::from_str(&canonical_rule_json()).unwrap();
        assert_eq!(parsed, RuleSet::canonical());
        assert_eq!(RuleSet::canonical().to_json_string(), canonical_rule_json());
    }

    #[test]
    fn test_index_requirement() {
        assert!(MatchType::Top.requires_index());
        assert!(MatchType::Pos.requires_index());
        assert!(MatchType::NotIn.requires_index());
        assert!(!MatchType::Equal.requires_index());
        assert!(!MatchType::Min.requires_index());
        assert!(MatchType::parse("contains").is_none());
    }

    #[test]
    fn test_serializes_external_field_names() {
        let case = TestCase {
            id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            name: "Search for Disney in top 10 results".to_string(),
            param: r#"{"keyword":"disney","limit":10}"#.to_string(),
            headers: canonical_headers(),
            rule: RuleSet {
                rules: vec![AssertionRule {
                    match_type: MatchType::Top,
                    index: Some("10".to_string()),
                    data_path: "data".to_string(),
                    columns: serde_json::from_str(r#"{"name":"disney","id":123}"#).unwrap(),
                }],
            }
            .to_json_string(),
        };

        let value = serde_json::to_value(&case).unwrap();
        assert_eq!(value["headers"]["Content-Type"], "application/json");
        let rules = case.rule_set().unwrap();
        assert_eq!(rules.rules[0].index.as_deref(), Some("10"));
        assert!(case.rule.contains("\"matchType\":\"top\""));
        assert_eq!(case.param_value().unwrap()["limit"], 10);
    }

    #[test]
    fn test_index_record_carries_metadata() {
        let case = TestCase {
            id: "c1".to_string(),
            name: "n".to_string(),
            param: EMPTY_PARAM.to_string(),
            headers: canonical_headers(),
            rule: canonical_rule_json(),
        };
        let record = case.to_index_record("search", TestType::Exception);
        assert_eq!(record["type"], "exception");
        assert_eq!(record["api_name"], "search");
        assert_eq!(record["id"], "c1");
    }
}
