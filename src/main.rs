use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use forge::batch::load_batch;
use forge::config::Config;
use forge::core::{TaskPriority, TaskSpec, TaskStatus};
use forge::history::{HistoryRecorder, JsonlRecorder, NullRecorder};
use forge::phases::CliBackend;
use forge::run::{RunOptions, TaskMachine};
use forge::sandbox::ProcessSandbox;
use forge::sched::{BatchOptions, BatchScheduler};
use forge::{flog, Result};

#[derive(Parser)]
#[command(name = "forge")]
#[command(about = "Closed-loop code generation with batch scheduling")]
#[command(version)]
struct Cli {
    /// Enable debug logging to ~/.forge/forge.log
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single task from a description
    Run {
        /// Natural-language description of the code to produce
        description: String,

        /// Expression evaluated against the generated code to validate it
        #[arg(long)]
        test_call: Option<String>,

        /// Repair budget (execution attempts = this + 1)
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Sandbox time limit per execution attempt, in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Generation backend command (overrides config)
        #[arg(long)]
        backend: Option<String>,
    },
    /// Run a batch of tasks from a JSON file
    Batch {
        /// Path to the batch file (JSON array of tasks)
        file: PathBuf,

        /// Concurrent task worker limit
        #[arg(long)]
        workers: Option<usize>,

        /// Repair budget per task
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Sandbox time limit per execution attempt, in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Generation backend command (overrides config)
        #[arg(long)]
        backend: Option<String>,

        /// History file path (JSONL, defaults to ~/.forge/history.jsonl)
        #[arg(long)]
        history: Option<PathBuf>,

        /// Disable iteration history recording
        #[arg(long, conflicts_with = "history")]
        no_history: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    forge::log::init_with_debug(cli.debug);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            2
        }
    };
    process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = Config::load()?;
    config.ensure_dirs()?;

    match cli.command {
        Commands::Run {
            description,
            test_call,
            max_iterations,
            timeout_secs,
            backend,
        } => {
            let backend_command = backend.as_deref().unwrap_or(config.effective_backend_command());
            let backend = Arc::new(CliBackend::discover(backend_command)?);
            let executor = Arc::new(ProcessSandbox::new(
                config.workspace_dir()?,
                which::which(config.effective_python_command())
                    .map_err(|_| forge::Error::BackendNotFound(
                        config.effective_python_command().to_string(),
                    ))?,
            ));
            let recorder: Arc<dyn HistoryRecorder> =
                Arc::new(JsonlRecorder::new(config.history_path()?));

            let mut spec = TaskSpec::new("task", description).with_priority(TaskPriority::Normal);
            if let Some(call) = test_call {
                spec = spec.with_test_call(call);
            }
            let options = RunOptions {
                max_iterations: max_iterations.unwrap_or(config.max_iterations),
                timeout: Duration::from_secs(timeout_secs.unwrap_or(config.timeout_secs)),
            };

            let machine = TaskMachine::new(spec, backend, executor, recorder, options);
            let run = machine.run().await;

            println!("status: {}", run.status);
            println!("attempts: {}", run.attempt_count());
            if let Some(code) = &run.final_code {
                println!("\n{}", code);
            }
            Ok(if run.status == TaskStatus::Succeeded { 0 } else { 1 })
        }
        Commands::Batch {
            file,
            workers,
            max_iterations,
            timeout_secs,
            backend,
            history,
            no_history,
        } => {
            let specs = load_batch(&file)?;
            let backend_command = backend.as_deref().unwrap_or(config.effective_backend_command());
            let backend = Arc::new(CliBackend::discover(backend_command)?);
            let executor = Arc::new(ProcessSandbox::new(
                config.workspace_dir()?,
                which::which(config.effective_python_command())
                    .map_err(|_| forge::Error::BackendNotFound(
                        config.effective_python_command().to_string(),
                    ))?,
            ));
            let recorder: Arc<dyn HistoryRecorder> = if no_history {
                Arc::new(NullRecorder)
            } else {
                let path = match history {
                    Some(path) => path,
                    None => config.history_path()?,
                };
                Arc::new(JsonlRecorder::new(path))
            };

            let options = BatchOptions {
                workers: workers.unwrap_or(config.workers),
                max_iterations: max_iterations.unwrap_or(config.max_iterations),
                timeout: Duration::from_secs(timeout_secs.unwrap_or(config.timeout_secs)),
            };

            let scheduler = BatchScheduler::new(specs, backend, executor, recorder, options)?;
            let token = scheduler.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    flog!("ctrl-c received, cancelling batch");
                    token.cancel();
                }
            });

            let result = scheduler.run().await;

            let tasks: Vec<serde_json::Value> = result
                .order
                .iter()
                .filter_map(|id| result.runs.get(id))
                .map(|run| {
                    serde_json::json!({
                        "task_id": run.task_id,
                        "status": run.status,
                        "attempts": run.attempt_count(),
                    })
                })
                .collect();
            let summary = serde_json::json!({
                "batch_id": result.batch_id,
                "tasks": tasks,
                "succeeded": result.succeeded_count(),
                "failed": result.failed_count(),
                "skipped": result.skipped_count(),
                "all_succeeded": result.all_succeeded(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(if result.all_succeeded() { 0 } else { 1 })
        }
    }
}
