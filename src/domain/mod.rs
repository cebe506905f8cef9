pub mod api_definition;
pub mod error;
pub mod llm_config;
pub mod test_case;
