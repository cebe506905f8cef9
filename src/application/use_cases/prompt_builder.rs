use crate::domain::api_definition::{ApiDefinition, ApiParameter};
use crate::domain::llm_config::ChatMessage;
use crate::domain::test_case::TestType;
use indexmap::IndexMap;
use serde_json::{Map, Value};

pub const SYSTEM_MESSAGE: &str = "You are a test automation expert. You design precise API test \
cases and always answer with a single valid JSON object that follows the requested schema.";

pub const NO_SIMILAR_CASES: &str = "No similar test cases available.";

const FUNCTIONAL_GUIDELINES: &str = "\
- Verify the core functionality of the API across different business scenarios
- Cover main success scenarios with various valid input combinations
- Validate response format and content for different data types
- Check business logic implementation with different user roles/permissions
- Ensure data persistence and retrieval work correctly
- Test different workflow states and transitions
- Validate integration with dependent services
- Cover different authentication and authorization scenarios";

const PERFORMANCE_GUIDELINES: &str = "\
- Test response times under different load conditions (light, medium, heavy)
- Verify throughput capabilities with concurrent users
- Check resource utilization under stress conditions
- Test performance with large datasets and complex queries
- Measure performance degradation patterns
- Test memory usage and garbage collection impact
- Validate performance with different network conditions
- Include relevant performance metrics and acceptable thresholds";

const BOUNDARY_GUIDELINES: &str = "\
- Test edge cases for all input parameters (min/max values)
- Include minimum and maximum string lengths
- Test numerical boundaries (zero, negative, overflow)
- Verify handling of empty, null, and undefined values
- Check array/list size limits (empty, single item, maximum)
- Test special characters and encoding edge cases
- Validate date/time boundary conditions
- Test resource limits and capacity constraints";

const EXCEPTION_GUIDELINES: &str = "\
- Test comprehensive error handling scenarios
- Include invalid input format and type mismatches
- Verify authentication and authorization failures
- Test network timeout and connection errors
- Check resource not found and access denied scenarios
- Validate input validation errors with detailed messages
- Test system unavailability and service degradation
- Include security validation failures and injection attempts
- Verify proper error response format and HTTP status codes";

pub fn guidelines_for(test_type: TestType) -> &'static str {
    match test_type {
        TestType::Functional => FUNCTIONAL_GUIDELINES,
        TestType::Performance => PERFORMANCE_GUIDELINES,
        TestType::Boundary => BOUNDARY_GUIDELINES,
        TestType::Exception => EXCEPTION_GUIDELINES,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn field_or_na(case: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| case.get(*key).filter(|v| !v.is_null()))
        .map(display_value)
        .unwrap_or_else(|| "N/A".to_string())
}

/// Renders generation prompts. Output depends only on the arguments.
pub struct PromptBuilder;

impl PromptBuilder {
    /// System and user messages for one generation request.
    pub fn messages(
        api: &ApiDefinition,
        similar_cases: &[Map<String, Value>],
        test_type: TestType,
        scenario: Option<&str>,
    ) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(SYSTEM_MESSAGE),
            ChatMessage::user(Self::build(api, similar_cases, test_type, scenario)),
        ]
    }

    pub fn build(
        api: &ApiDefinition,
        similar_cases: &[Map<String, Value>],
        test_type: TestType,
        scenario: Option<&str>,
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "Generate a {} test case for this API.\n\n",
            test_type
        ));

        prompt.push_str("API Definition:\n");
        prompt.push_str(&Self::format_api_definition(api));
        prompt.push('\n');

        prompt.push_str("Similar Test Cases for Reference:\n");
        prompt.push_str(&Self::format_similar_cases(similar_cases));
        prompt.push_str("\n\n");

        if let Some(scenario) = scenario.map(str::trim).filter(|s| !s.is_empty()) {
            prompt.push_str("Target Scenario:\n");
            prompt.push_str(scenario);
            prompt.push_str("\n\n");
        }

        prompt.push_str("Test Guidelines:\n");
        prompt.push_str(guidelines_for(test_type));
        prompt.push_str("\n\n");

        prompt.push_str(&Self::format_schema_contract(test_type));

        prompt.push_str(
            "\nIMPORTANT: Return exactly one JSON object with these fields. \
No markdown fencing, no prose before or after the object.",
        );

        prompt
    }

    pub fn format_api_definition(api: &ApiDefinition) -> String {
        let mut out = String::new();
        out.push_str(&format!("Name: {}\n", api.name));
        out.push_str(&format!(
            "Description: {}\n",
            api.description.as_deref().unwrap_or("N/A")
        ));
        out.push_str(&format!("Method: {}\n", api.method));
        out.push_str(&format!("Path: {}\n", api.path.as_deref().unwrap_or("N/A")));
        out.push_str("\nInput Parameters:\n");
        out.push_str(&Self::format_parameters(&api.input_params));
        out.push_str("\n\nOutput Parameters:\n");
        out.push_str(&Self::format_parameters(&api.output_params));
        out.push('\n');
        out
    }

    pub fn format_similar_cases(cases: &[Map<String, Value>]) -> String {
        if cases.is_empty() {
            return NO_SIMILAR_CASES.to_string();
        }

        cases
            .iter()
            .map(|case| {
                let mut block = String::new();
                block.push_str(&format!("Test Case: {}\n", field_or_na(case, &["name"])));
                block.push_str(&format!("Type: {}\n", field_or_na(case, &["type"])));
                block.push_str(&format!(
                    "Description: {}\n",
                    field_or_na(case, &["description"])
                ));
                block.push_str(&format!(
                    "Input: {}\n",
                    field_or_na(case, &["param", "input_data"])
                ));
                block.push_str(&format!(
                    "Expected Output: {}",
                    field_or_na(case, &["rule", "expected_output"])
                ));
                block
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn format_parameters(params: &IndexMap<String, ApiParameter>) -> String {
        if params.is_empty() {
            return "None".to_string();
        }

        params
            .iter()
            .map(|(name, param)| {
                let constraints = match &param.constraints {
                    Some(map) if !map.is_empty() => map
                        .iter()
                        .map(|(k, v)| format!("{}={}", k, display_value(v)))
                        .collect::<Vec<_>>()
                        .join(", "),
                    _ => "None".to_string(),
                };

                let mut entry = format!(
                    "- {}:\n  Type: {}\n  Required: {}\n  Description: {}\n  Constraints: {}",
                    name,
                    param.param_type,
                    param.required,
                    param.description.as_deref().unwrap_or("N/A"),
                    constraints
                );
                if let Some(default) = &param.default {
                    entry.push_str(&format!("\n  Default: {}", display_value(default)));
                }
                entry
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_schema_contract(test_type: TestType) -> String {
        let mut out = String::from("Required fields:\n");
        out.push_str("- id: Unique identifier (UUID string; generated when omitted)\n");
        out.push_str("- name: Clear and descriptive name\n");
        out.push_str(
            "- param: JSON string with the request parameters, e.g. \"{\\\"userId\\\": 1}\"\n",
        );
        out.push_str(
            "- headers: Object with the request headers, always {\"Content-Type\": \"application/json\"}\n",
        );
        out.push_str(
            "- rule: JSON string of the form {\"rules\": [{\"matchType\": ..., \"index\": ..., \"dataPath\": ..., \"columns\": {...}}]}\n",
        );

        match test_type {
            TestType::Performance => out.push_str(
                "- performance_metrics: Object with the measured metrics and their acceptable thresholds\n",
            ),
            TestType::Exception => out.push_str(
                "- expected_exception: String naming the error the API must return\n",
            ),
            _ => {}
        }

        out.push_str("\nAssertion rules:\n");
        out.push_str("- matchType is one of: top, equal, min, max, pos, not_in\n");
        out.push_str("- top, pos and not_in rules require a non-empty \"index\" string\n");
        out.push_str("- dataPath is the response path to check, e.g. \"result\" or \"data.items\"\n");
        out.push_str("- columns maps response column names to expected values\n");
        out
    }
}
