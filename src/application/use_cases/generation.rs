use crate::application::use_cases::example_selector::ExampleSelector;
use crate::application::use_cases::prompt_builder::PromptBuilder;
use crate::application::use_cases::response_repairer::ResponseRepairer;
use crate::application::use_cases::similarity_store::SimilarityStore;
use crate::application::use_cases::test_case_validator::TestCaseValidator;
use crate::domain::api_definition::ApiDefinition;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::ChatMessage;
use crate::domain::test_case::{TestCase, TestType};
use crate::infrastructure::config::GenerationConfig;
use crate::infrastructure::llm_clients::LLMClient;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Drives generation: examples, prompt, model call, repair, validation and
/// write-back into the similarity index, one case at a time.
pub struct TestCaseGenerator {
    client: Arc<dyn LLMClient>,
    store: SimilarityStore,
    config: GenerationConfig,
}

impl TestCaseGenerator {
    pub fn new(client: Arc<dyn LLMClient>, store: SimilarityStore, config: GenerationConfig) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    pub fn store(&self) -> &SimilarityStore {
        &self.store
    }

    /// Indexes the definition's `example_cases`. Returns the number of new chunks.
    pub async fn seed_examples(&self, api: &ApiDefinition) -> Result<u64> {
        let cases = api.seed_cases();
        if cases.is_empty() {
            return Ok(0);
        }

        let inserted = self.store.add(&cases).await?;
        tracing::info!(
            "Seeded {} example case(s) for {} ({} new chunk(s))",
            cases.len(),
            api.name,
            inserted
        );
        Ok(inserted)
    }

    /// Generates `num_cases` cases for every type in `test_types`.
    ///
    /// A case whose model call, repair or validation fails is logged and
    /// skipped, so the result may hold fewer cases than requested. Ids are
    /// unique within the returned cases.
    pub async fn generate(
        &self,
        api: &ApiDefinition,
        test_types: &[TestType],
        num_cases: usize,
    ) -> Vec<TestCase> {
        tracing::info!(
            "Generating {} test case(s) for each of {:?} on {}",
            num_cases,
            test_types.iter().map(TestType::as_str).collect::<Vec<_>>(),
            api.name
        );

        let mut generated: Vec<TestCase> = Vec::new();
        let mut batch_records: Vec<Map<String, Value>> = Vec::new();
        let mut used_ids: HashSet<String> = HashSet::new();

        for &test_type in test_types {
            for index in 0..num_cases {
                tracing::info!(
                    "Generating {} test case {} of {}",
                    test_type,
                    index + 1,
                    num_cases
                );

                let examples = ExampleSelector::new(&self.store)
                    .by_type(test_type, &api.name, self.config.examples_k)
                    .await;
                let context = self.merge_context(examples, &batch_records);

                match self.generate_one(api, test_type, &context, None).await {
                    Ok(mut case) => {
                        if !used_ids.insert(case.id.clone()) {
                            let fresh = uuid::Uuid::new_v4().to_string();
                            tracing::warn!(
                                "Test case id {} is already used in this run, replacing it with {}",
                                case.id,
                                fresh
                            );
                            case.id = fresh;
                            used_ids.insert(case.id.clone());
                        }
                        self.persist(&case, &api.name, test_type).await;
                        batch_records.push(case.to_index_record(&api.name, test_type));
                        generated.push(case);
                    }
                    Err(e) => {
                        tracing::error!(
                            "Skipping {} test case {} of {}: {}",
                            test_type,
                            index + 1,
                            num_cases,
                            e
                        );
                    }
                }
            }
        }

        tracing::info!("Generated {} test case(s) in total", generated.len());
        generated
    }

    /// One case aimed at a free-text scenario.
    pub async fn generate_for_scenario(
        &self,
        api: &ApiDefinition,
        test_type: TestType,
        scenario: &str,
    ) -> Result<TestCase> {
        tracing::info!("Generating {} test case for scenario: {}", test_type, scenario);
        let examples = ExampleSelector::new(&self.store)
            .by_query(scenario, &api.name, Some(test_type), self.config.examples_k)
            .await;

        let case = self
            .generate_one(api, test_type, &examples, Some(scenario))
            .await?;
        self.persist(&case, &api.name, test_type).await;
        Ok(case)
    }

    /// Retrieved examples first, then the most recent batch cases, each id once.
    fn merge_context(
        &self,
        examples: Vec<Map<String, Value>>,
        batch_records: &[Map<String, Value>],
    ) -> Vec<Map<String, Value>> {
        let recent_start = batch_records
            .len()
            .saturating_sub(self.config.max_batch_context);

        let mut seen = HashSet::new();
        let mut context = Vec::new();
        for case in examples
            .into_iter()
            .chain(batch_records[recent_start..].iter().cloned())
        {
            match case.get("id").and_then(Value::as_str) {
                Some(id) if !seen.insert(id.to_string()) => continue,
                _ => context.push(case),
            }
        }
        context
    }

    async fn generate_one(
        &self,
        api: &ApiDefinition,
        test_type: TestType,
        context: &[Map<String, Value>],
        scenario: Option<&str>,
    ) -> Result<TestCase> {
        let messages = PromptBuilder::messages(api, context, test_type, scenario);
        tracing::debug!(
            "Prompt for {} case with {} example(s):\n{}",
            test_type,
            context.len(),
            messages.last().map(|m| m.content.as_str()).unwrap_or_default()
        );

        let raw = self
            .invoke_model(&messages, self.config.temperature_for(test_type))
            .await?;
        tracing::debug!("Raw model response: {}", raw);

        let repaired = ResponseRepairer::repair(&raw);
        if repaired.salvaged {
            tracing::warn!("Model response for {} case was not parseable JSON", test_type);
        }
        TestCaseValidator::validate(&repaired.value, &api.name, test_type)
    }

    async fn invoke_model(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let attempts = self.config.llm_retries + 1;
        let mut last_error = AppError::Llm("Model was not called".to_string());

        for attempt in 1..=attempts {
            match self.client.complete(messages, temperature).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!("Model call failed (attempt {}/{}): {}", attempt, attempts, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn persist(&self, case: &TestCase, api_name: &str, test_type: TestType) {
        let record = case.to_index_record(api_name, test_type);
        if let Err(e) = self.store.add(&[record]).await {
            tracing::warn!("Failed to index test case {}: {}", case.id, e);
        }
    }
}
