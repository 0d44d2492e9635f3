//! Tailor routing inspector
//!
//! Show which model the routing policy picks for a task, or report recorded
//! performance for a model.
//!
//! Usage:
//!   cargo run --bin tailor-route -- --task cv_generation --words 1500 --artifacts 12
//!   cargo run --bin tailor-route -- --task embedding --use-case complex_matching
//!   cargo run --bin tailor-route -- --report gpt-4o-mini --hours 48

use std::env;
use std::process::ExitCode;

use chrono::{Duration, Utc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tailor_db::Database;
use tailor_inference::{
    defaults, CircuitBreakers, EmbeddingUseCase, InvocationRepository, ModelSelector, RoutingConfig,
    TaskContext, TaskType,
};

#[derive(Debug)]
struct Args {
    task: TaskType,
    words: usize,
    artifacts: usize,
    creative: bool,
    use_case: EmbeddingUseCase,
    strategy: Option<String>,
    report: Option<String>,
    hours: i64,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            task: TaskType::JobParsing,
            words: 500,
            artifacts: 0,
            creative: false,
            use_case: EmbeddingUseCase::General,
            strategy: None,
            report: None,
            hours: defaults::AGGREGATE_WINDOW_HOURS,
        }
    }
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().collect();
    let mut result = Args::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| format!("Missing value for {}", flag))
        };
        match flag {
            "--task" | "-t" => result.task = value()?.parse()?,
            "--words" | "-w" => {
                result.words = value()?.parse().map_err(|e| format!("--words: {}", e))?
            }
            "--artifacts" | "-a" => {
                result.artifacts = value()?
                    .parse()
                    .map_err(|e| format!("--artifacts: {}", e))?
            }
            "--use-case" | "-u" => result.use_case = EmbeddingUseCase::from_label(&value()?),
            "--strategy" | "-s" => result.strategy = Some(value()?),
            "--report" | "-r" => result.report = Some(value()?),
            "--hours" => result.hours = value()?.parse().map_err(|e| format!("--hours: {}", e))?,
            "--creative" | "-c" => result.creative = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
        i += 1;
    }

    Ok(result)
}

fn print_help() {
    println!(
        r#"
Tailor Routing Inspector

Usage: cargo run --bin tailor-route -- [OPTIONS]

Options:
  -t, --task <TASK>         job_parsing, cv_generation, embedding (default: job_parsing)
  -w, --words <N>           Input word count (default: 500)
  -a, --artifacts <N>       Artifacts included in a CV (default: 0)
  -c, --creative            Request a creative tone
  -u, --use-case <LABEL>    Embedding use case (default: general)
  -s, --strategy <NAME>     Strategy to use instead of the configured one
  -r, --report <MODEL>      Print recorded performance for MODEL
      --hours <N>           Report window in hours (default: 24)
  -h, --help                Print help

Environment Variables:
  TAILOR_CONFIG   Routing config file (default: ~/.config/tailor/routing.toml)
  DATABASE_URL    PostgreSQL URL, required for --report
  LOG_FORMAT      "json" or "text" (default: "text")
  RUST_LOG        Log filter (default: "tailor_inference=info")
"#
    );
}

fn init_tracing() {
    let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tailor_inference=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn context(args: &Args) -> TaskContext {
    match args.task {
        TaskType::JobParsing => TaskContext::job_parsing(args.words),
        TaskType::CvGeneration => TaskContext::cv_generation(args.words, args.artifacts, args.creative),
        TaskType::Embedding => TaskContext {
            input_word_count: args.words,
            ..TaskContext::embedding(args.use_case)
        },
    }
}

fn select(config: &RoutingConfig, args: &Args) -> anyhow::Result<()> {
    let registry = std::sync::Arc::new(config.build_registry()?);
    let strategy = match &args.strategy {
        Some(name) => config.strategy(name, &registry)?,
        None => config.active(&registry)?,
    };
    let breakers = CircuitBreakers::new(config.breaker_config());
    let selector = ModelSelector::new(registry);

    let ctx = context(args);
    let selection = selector.select(&ctx, &strategy, &breakers)?;
    let profile = selector.registry().require(&selection.model_id)?;

    println!("Strategy:   {}", strategy.name);
    println!("Task:       {}", ctx.task_type);
    println!("Model:      {} ({})", selection.model_id, profile.provider);
    println!("Complexity: {:.2}", selection.complexity);
    println!("Reason:     {}", selection.selection_reason);
    println!(
        "Pricing:    ${:.2} in / ${:.2} out per 1M tokens",
        profile.cost_input_per_mtok, profile.cost_output_per_mtok
    );
    Ok(())
}

async fn report(config: &RoutingConfig, model_id: &str, hours: i64) -> anyhow::Result<()> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for --report"))?;
    let db = Database::connect(url).await?;

    let until = Utc::now();
    let since = until - Duration::hours(hours.max(1));
    let summary = db.invocations.aggregate(model_id, since, until).await?;

    println!("Model:        {}", summary.model_id);
    println!("Window:       {} .. {}", summary.since, summary.until);
    println!("Invocations:  {}", summary.invocations);
    println!("Success rate: {:.1}%", summary.success_rate * 100.0);
    println!("Avg latency:  {:.0} ms", summary.avg_latency_ms);
    println!("Total cost:   ${:.4}", summary.total_cost_usd);
    match summary.avg_quality_score {
        Some(q) => println!("Avg quality:  {:.2}", q),
        None => println!("Avg quality:  n/a"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\nRun with --help for usage.", e);
            return ExitCode::from(2);
        }
    };

    let outcome = async {
        let config = RoutingConfig::load()?;
        match &args.report {
            Some(model_id) => report(&config, model_id, args.hours).await,
            None => select(&config, &args),
        }
    }
    .await;

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
