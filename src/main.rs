//! # Helios CLI
//!
//! Compile rule files and run events against them from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Validate and compile a rule file, printing the compilation report
//! helios compile rules.json
//!
//! # Evaluate events (one JSON event per line) against a rule file
//! helios evaluate rules.json events.jsonl
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use helios::{Compiler, Config, Engine, Event, RuleSet, SelectionStrategy, TracingListener};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "helios", about = "High-throughput rule-matching engine", version)]
struct Cli {
    /// Configuration file (defaults to helios.toml + HELIOS_* environment)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a rule file and print the compilation report
    Compile {
        /// JSON array of rule definitions
        rules: PathBuf,
    },
    /// Evaluate events against a rule file, printing results as JSON lines
    Evaluate {
        /// JSON array of rule definitions
        rules: PathBuf,
        /// Events, one JSON object per line
        events: PathBuf,
        /// Selection strategy override
        #[arg(long)]
        strategy: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path.to_str().context("non-UTF-8 config path")?)?,
        None => Config::load()?,
    };
    init_logging(&config);

    match cli.command {
        Command::Compile { rules } => compile(&config, &rules),
        Command::Evaluate {
            rules,
            events,
            strategy,
        } => evaluate(&config, &rules, &events, strategy.as_deref()),
    }
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));
    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn compile(config: &Config, rules_path: &PathBuf) -> anyhow::Result<()> {
    let rules = RuleSet::from_json_file(rules_path)
        .with_context(|| format!("reading rules from {}", rules_path.display()))?;
    let model = Compiler::new(config.clone())
        .compile_with_listener(&rules, &mut TracingListener)
        .context("compilation failed")?;
    print!("{}", model.report().format_report());
    Ok(())
}

fn evaluate(
    config: &Config,
    rules_path: &PathBuf,
    events_path: &PathBuf,
    strategy: Option<&str>,
) -> anyhow::Result<()> {
    let rules = RuleSet::from_json_file(rules_path)
        .with_context(|| format!("reading rules from {}", rules_path.display()))?;
    let model = Compiler::new(config.clone())
        .compile(&rules)
        .context("compilation failed")?;
    let engine = Engine::new(model, config)?;

    let strategy = match strategy {
        Some(name) => serde_json::from_value(serde_json::Value::String(name.to_string()))
            .with_context(|| format!("unknown selection strategy '{}'", name))?,
        None => config.engine.selection_strategy,
    };

    let file = std::fs::File::open(events_path)
        .with_context(|| format!("reading events from {}", events_path.display()))?;
    for (line_number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = serde_json::from_str(&line)
            .with_context(|| format!("parsing event on line {}", line_number + 1))?;
        let result = evaluate_one(&engine, &event, strategy)?;
        println!("{}", serde_json::to_string(&result)?);
    }

    let metrics = engine.metrics();
    tracing::info!(
        evaluations = metrics.engine.evaluations,
        matched_events = metrics.engine.matched_events,
        base_cache_hit_rate = metrics.base_condition_cache.hit_rate,
        "batch complete"
    );
    Ok(())
}

fn evaluate_one(
    engine: &Engine,
    event: &Event,
    strategy: SelectionStrategy,
) -> anyhow::Result<helios::MatchResult> {
    Ok(engine.evaluate_with_strategy(event, strategy)?)
}
