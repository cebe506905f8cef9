use crate::domain::error::{AppError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationError};

const HTTP_METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiParameter {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(rename = "type")]
    #[validate(length(min = 1))]
    pub param_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub constraints: Option<Map<String, Value>>,
}

fn default_required() -> bool {
    true
}

/// An API endpoint as loaded from a definition file. Read-only for the run.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiDefinition {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_method")]
    #[validate(custom(function = "validate_http_method"))]
    pub method: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub input_params: IndexMap<String, ApiParameter>,
    #[serde(default)]
    pub output_params: IndexMap<String, ApiParameter>,
    /// Prior cases used to seed the similarity index.
    #[serde(default)]
    pub example_cases: Option<Map<String, Value>>,
}

fn default_method() -> String {
    "POST".to_string()
}

fn validate_http_method(method: &str) -> std::result::Result<(), ValidationError> {
    if HTTP_METHODS.contains(&method.trim().to_uppercase().as_str()) {
        Ok(())
    } else {
        Err(ValidationError::new("unknown_http_method"))
    }
}

impl ApiDefinition {
    pub fn from_json(raw: &str) -> Result<Self> {
        let definition: ApiDefinition = serde_json::from_str(raw)
            .map_err(|e| AppError::ApiDefinition(format!("Invalid API definition JSON: {}", e)))?;
        definition.check()?;
        Ok(definition)
    }

    /// Runs field validation on the definition and every parameter.
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| AppError::ApiDefinition(format!("{}: {}", self.name, e)))?;

        for (key, param) in self.input_params.iter().chain(self.output_params.iter()) {
            param.validate().map_err(|e| {
                AppError::ApiDefinition(format!("{} parameter '{}': {}", self.name, key, e))
            })?;
        }

        Ok(())
    }

    /// Flattens `example_cases` into individual case objects tagged with a test type.
    ///
    /// Accepts either `{"<type>": [case, ...]}` groups or `{"<key>": case}` entries;
    /// a case's own `type` field wins over the group key.
    pub fn seed_cases(&self) -> Vec<Map<String, Value>> {
        let Some(examples) = self.example_cases.as_ref() else {
            return Vec::new();
        };

        let mut cases = Vec::new();
        for (key, value) in examples {
            let entries: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                Value::Object(_) => vec![value],
                _ => continue,
            };
            for entry in entries {
                let Some(object) = entry.as_object() else {
                    continue;
                };
                let mut case = object.clone();
                if !case.get("type").map(Value::is_string).unwrap_or(false) {
                    case.insert("type".to_string(), Value::String(key.clone()));
                }
                case.insert("api_name".to_string(), Value::String(self.name.clone()));
                cases.push(case);
            }
        }
        cases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER_REGISTRATION: &str = r#"{
        "name": "user_registration",
        "description": "Register a new user in the system",
        "method": "POST",
        "path": "/api/v1/users",
        "input_params": {
            "username": {
                "name": "username",
                "type": "string",
                "description": "User's username",
                "constraints": {"min_length": 3, "max_length": 50}
            },
            "age": {"name": "age", "type": "integer", "required": false}
        },
        "output_params": {
            "user_id": {"name": "user_id", "type": "string"}
        }
    }"#;

    #[test]
    fn test_parse_preserves_parameter_order_and_defaults() {
        let definition = ApiDefinition::from_json(USER_REGISTRATION).unwrap();
        let keys: Vec<&String> = definition.input_params.keys().collect();
        assert_eq!(keys, vec!["username", "age"]);
        assert!(definition.input_params["username"].required);
        assert!(!definition.input_params["age"].required);
        assert_eq!(definition.output_params["user_id"].param_type, "string");
    }

    #[test]
    fn test_method_defaults_to_post() {
        let definition = ApiDefinition::from_json(r#"{"name": "ping"}"#).unwrap();
        assert_eq!(definition.method, "POST");
        assert!(definition.input_params.is_empty());
    }

    #[test]
    fn test_rejects_unknown_method_and_empty_name() {
        let err = ApiDefinition::from_json(r#"{"name": "ping", "method": "FETCH"}"#).unwrap_err();
        assert!(matches!(err, AppError::ApiDefinition(_)));

        let err = ApiDefinition::from_json(r#"{"name": ""}"#).unwrap_err();
        assert!(matches!(err, AppError::ApiDefinition(_)));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = ApiDefinition::from_json("{not json").unwrap_err();
        assert!(matches!(err, AppError::ApiDefinition(_)));
    }

    #[test]
    fn test_seed_cases_tags_type_and_api_name() {
        let definition = ApiDefinition::from_json(
            r#"{
                "name": "search",
                "example_cases": {
                    "functional": [{"id": "a", "name": "basic search"}],
                    "legacy": {"id": "b", "name": "too long keyword", "type": "boundary"},
                    "ignored": 42
                }
            }"#,
        )
        .unwrap();

        let cases = definition.seed_cases();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0]["type"], "functional");
        assert_eq!(cases[1]["type"], "boundary");
        assert!(cases.iter().all(|c| c["api_name"] == "search"));
    }
}
