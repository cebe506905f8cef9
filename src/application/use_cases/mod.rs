pub mod chunking;
pub mod example_selector;
pub mod generation;
pub mod prompt_builder;
pub mod response_repairer;
pub mod similarity_store;
pub mod test_case_validator;
