use crate::application::use_cases::similarity_store::{SimilarityStore, META_API_NAME, META_TYPE};
use crate::domain::test_case::TestType;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Looks up prior test cases to show the model as examples.
///
/// Store failures are logged and yield no examples; generation continues
/// without context.
pub struct ExampleSelector<'a> {
    store: &'a SimilarityStore,
}

impl<'a> ExampleSelector<'a> {
    pub fn new(store: &'a SimilarityStore) -> Self {
        Self { store }
    }

    pub async fn by_type(
        &self,
        test_type: TestType,
        api_name: &str,
        k: usize,
    ) -> Vec<Map<String, Value>> {
        let mut filters = BTreeMap::new();
        filters.insert(META_TYPE.to_string(), test_type.as_str().to_string());
        filters.insert(META_API_NAME.to_string(), api_name.to_string());

        let query = format!("Test cases of type {}", test_type);
        self.search(&query, k, &filters).await
    }

    /// Free-text lookup; empty `api_name` or a missing `test_type` widen the search.
    pub async fn by_query(
        &self,
        query: &str,
        api_name: &str,
        test_type: Option<TestType>,
        k: usize,
    ) -> Vec<Map<String, Value>> {
        let mut filters = BTreeMap::new();
        if !api_name.trim().is_empty() {
            filters.insert(META_API_NAME.to_string(), api_name.to_string());
        }
        if let Some(test_type) = test_type {
            filters.insert(META_TYPE.to_string(), test_type.as_str().to_string());
        }

        self.search(query, k, &filters).await
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        filters: &BTreeMap<String, String>,
    ) -> Vec<Map<String, Value>> {
        match self.store.search(query, k, filters).await {
            Ok(examples) => {
                tracing::debug!("Selected {} example(s) for '{}'", examples.len(), query);
                examples
            }
            Err(e) => {
                tracing::warn!("Example lookup failed, continuing without examples: {}", e);
                Vec::new()
            }
        }
    }
}
