//! annobench - Entity annotation benchmark runner

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use annobench_core::{ExperimentId, ExperimentTaskResult, TaskState};
use annobench_engine::metrics::collect_metrics;
use annobench_engine::{
    Config, ExperimentRunner, InMemoryExperimentStore, ReplayFixture, TaskOutcome, TaskStore,
};

/// annobench - Benchmark entity annotation services
#[derive(Parser)]
#[command(name = "annobench")]
#[command(about = "Benchmark entity annotation services", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an experiment over recorded annotator output
    Run {
        /// Replay fixture (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Experiment ID (generated if omitted)
        #[arg(long)]
        experiment_id: Option<String>,

        /// How long results may be reused (seconds, <= 0 disables caching)
        #[arg(long, env = "ANNOBENCH_RESULT_DURABILITY_SECS")]
        result_durability_secs: Option<i64>,

        /// Maximum number of tasks computed at the same time
        #[arg(long, env = "ANNOBENCH_MAX_CONCURRENT_TASKS")]
        max_concurrent_tasks: Option<usize>,

        /// Print task metrics after the results
        #[arg(long)]
        metrics: bool,
    },
}

/// One line of the result report.
#[derive(Serialize)]
struct TaskReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<u64>,
    annotator: String,
    dataset: String,
    experiment_type: String,
    matching: String,
    state: String,
    reused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ExperimentTaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            input,
            experiment_id,
            result_durability_secs,
            max_concurrent_tasks,
            metrics,
        } => {
            let mut config = Config::default();
            if let Some(secs) = result_durability_secs {
                config.result_durability_secs = secs;
            }
            if let Some(max) = max_concurrent_tasks {
                config.max_concurrent_tasks = max;
            }
            let experiment_id = experiment_id
                .map(ExperimentId::new)
                .unwrap_or_else(ExperimentId::generate);
            run(input, experiment_id, config, metrics).await?;
        }
    }

    Ok(())
}

/// Report label of a task state. Tasks missing from the store are unknown.
fn state_label(state: Option<TaskState>) -> String {
    state.map_or_else(|| "unknown".to_string(), |state| state.to_string())
}

async fn run(
    input: PathBuf,
    experiment_id: ExperimentId,
    config: Config,
    print_metrics: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(&input)
        .map_err(|e| format!("Failed to read fixture '{}': {}", input.display(), e))?;
    let fixture = ReplayFixture::from_json(&json)?;
    info!(
        dataset = %fixture.dataset.name,
        documents = fixture.dataset.len(),
        annotators = fixture.annotators.len(),
        experiment_type = %fixture.experiment_type,
        matching = %fixture.matching,
        "Loaded fixture"
    );

    let backend = Arc::new(InMemoryExperimentStore::new());
    let store = Arc::new(TaskStore::open(backend, config.result_durability_secs).await);
    let runner = ExperimentRunner::new(store.clone(), &config);

    let specs = fixture.task_specs();
    let outcomes = runner.run_experiment(&experiment_id, specs.clone()).await;

    let connected = store.get_results_of_experiment(&experiment_id).await;
    let mut reports = Vec::with_capacity(outcomes.len());
    for (spec, outcome) in specs.iter().zip(outcomes) {
        let task = spec.configuration();
        let report = match outcome {
            Ok(outcome) => {
                let stored = store.get_task(outcome.task_id()).await;
                let result = match &outcome {
                    TaskOutcome::Completed { result, .. } => Some(result.clone()),
                    TaskOutcome::Reused(_) => stored.as_ref().and_then(|t| t.result.clone()),
                };
                TaskReport {
                    task_id: Some(outcome.task_id().value()),
                    annotator: task.annotator_name,
                    dataset: task.dataset_name,
                    experiment_type: task.experiment_type.to_string(),
                    matching: task.matching.to_string(),
                    state: state_label(stored.map(|t| t.state)),
                    reused: matches!(outcome, TaskOutcome::Reused(_)),
                    result,
                    error: None,
                }
            }
            Err(err) => {
                let state = TaskState::Error(err.task_error_kind());
                let task_id = connected
                    .iter()
                    .filter(|t| t.config == task && t.state == state)
                    .map(|t| t.id.value())
                    .max();
                TaskReport {
                    task_id,
                    annotator: task.annotator_name,
                    dataset: task.dataset_name,
                    experiment_type: task.experiment_type.to_string(),
                    matching: task.matching.to_string(),
                    state: state_label(Some(state)),
                    reused: false,
                    result: None,
                    error: Some(err.to_string()),
                }
            }
        };
        reports.push(report);
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);

    if print_metrics {
        print!("{}", collect_metrics(&store).await);
    }

    Ok(())
}
