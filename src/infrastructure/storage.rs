use crate::domain::api_definition::ApiDefinition;
use crate::domain::error::{AppError, Result};
use crate::domain::test_case::TestCase;
use std::fs;
use std::path::Path;

/// Reads and validates an API definition file.
pub fn load_api_definition(path: &Path) -> Result<ApiDefinition> {
    let raw = fs::read_to_string(path).map_err(|e| {
        AppError::ApiDefinition(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let definition = ApiDefinition::from_json(&raw)?;
    tracing::info!(
        "Loaded API definition '{}' ({} input, {} output parameter(s))",
        definition.name,
        definition.input_params.len(),
        definition.output_params.len()
    );
    Ok(definition)
}

/// Writes `cases` as a pretty JSON array, creating parent directories.
pub fn save_test_cases(path: &Path, cases: &[TestCase]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let json = serde_json::to_string_pretty(cases)
        .map_err(|e| AppError::JsonProcessing(format!("Failed to serialize test cases: {}", e)))?;
    fs::write(path, json)?;
    tracing::info!("Saved {} test case(s) to {}", cases.len(), path.display());
    Ok(())
}

fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_case::{canonical_headers, canonical_rule_json};
    use serde_json::Value;

    #[test]
    fn test_load_rejects_missing_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_api_definition(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, AppError::ApiDefinition(_)));

        let bad_method = dir.path().join("bad.json");
        fs::write(&bad_method, r#"{"name": "x", "method": "FETCH"}"#).unwrap();
        assert!(matches!(
            load_api_definition(&bad_method).unwrap_err(),
            AppError::ApiDefinition(_)
        ));
    }

    #[test]
    fn test_save_creates_directories_and_writes_array() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out").join("cases.json");
        let case = TestCase {
            id: "1".to_string(),
            name: "n".to_string(),
            param: "{}".to_string(),
            headers: canonical_headers(),
            rule: canonical_rule_json(),
        };

        save_test_cases(&output, &[case]).unwrap();
        let written: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        let records = written.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["headers"]["Content-Type"], "application/json");
        let keys: Vec<&str> = records[0].as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "name", "param", "headers", "rule"]);
    }
}
