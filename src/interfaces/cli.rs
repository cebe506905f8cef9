use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueHint};

use crate::domain::error::Result;
use crate::domain::test_case::TestType;
use crate::infrastructure::bootstrap;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::storage::{load_api_definition, save_test_cases};

fn parse_test_type(value: &str) -> std::result::Result<TestType, String> {
    value.parse::<TestType>().map_err(|e| e.to_string())
}

#[derive(Debug, Parser)]
#[command(name = "interface-gen")]
#[command(about = "Generate API test cases with a language model", long_about = None)]
pub struct Cli {
    /// JSON file describing the API under test
    #[arg(value_name = "API_DEFINITION", value_hint = ValueHint::FilePath)]
    pub api_definition: PathBuf,

    /// Where the generated cases are written
    #[arg(short, long, default_value = "test_cases.json", value_hint = ValueHint::FilePath)]
    pub output: PathBuf,

    /// Test type to generate, repeatable (default: all)
    #[arg(short = 't', long, action = ArgAction::Append, value_parser = parse_test_type)]
    pub test_types: Vec<TestType>,

    /// Cases generated per test type
    #[arg(short = 'n', long, default_value_t = 5)]
    pub num_cases: usize,

    /// Generate one case for this scenario instead of a batch
    #[arg(long, requires = "scenario_type")]
    pub scenario: Option<String>,

    /// Test type of the scenario case
    #[arg(long, value_parser = parse_test_type, requires = "scenario")]
    pub scenario_type: Option<TestType>,

    /// Configuration file (default: ./interface-gen.toml when present)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Directory of the similarity index, overriding the configuration
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub index_path: Option<PathBuf>,

    /// Log prompts and raw model responses
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn selected_test_types(&self) -> Vec<TestType> {
        if self.test_types.is_empty() {
            TestType::ALL.to_vec()
        } else {
            self.test_types.clone()
        }
    }
}

pub async fn execute(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(path) = &cli.index_path {
        config.index.path = path.clone();
    }

    let api = load_api_definition(&cli.api_definition)?;
    let generator = bootstrap::setup(&config).await?;

    if let Err(e) = generator.seed_examples(&api).await {
        tracing::warn!("Failed to seed example cases: {}", e);
    }

    let cases = match (&cli.scenario, cli.scenario_type) {
        (Some(scenario), Some(test_type)) => {
            vec![
                generator
                    .generate_for_scenario(&api, test_type, scenario)
                    .await?,
            ]
        }
        _ => {
            generator
                .generate(&api, &cli.selected_test_types(), cli.num_cases)
                .await
        }
    };

    save_test_cases(&cli.output, &cases)?;
    println!(
        "Generated {} test case(s) and saved to {}",
        cases.len(),
        cli.output.display()
    );
    Ok(())
}
