use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{error, info};

use uase::config::load_config;
use uase::descriptor::{validate, Descriptor, StepSpec};
use uase::logging::init_logging;
use uase::EngineConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable debug mode
    #[arg(short, long)]
    debug: bool,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,

    /// Output format
    #[arg(short, long, default_value = "human")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Yaml,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and statically check a scenario descriptor
    Validate(ValidateArgs),

    /// Print the effective engine configuration
    Config,
}

#[derive(Args)]
struct ValidateArgs {
    /// Descriptor file (.yaml, .yml or .json)
    descriptor: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.debug, cli.json)?;
    info!("Starting uase v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.as_deref()).await?;

    let result = match cli.command {
        Commands::Validate(args) => cmd_validate(args, cli.output).await,
        Commands::Config => cmd_config(&config, cli.output),
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Command failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn cmd_validate(args: ValidateArgs, output: OutputFormat) -> Result<()> {
    let descriptor = Descriptor::load(&args.descriptor)
        .await
        .with_context(|| format!("Failed to load {}", args.descriptor.display()))?;
    validate(&descriptor).context("Descriptor is invalid")?;

    let summary = json!({
        "name": descriptor.name,
        "resources": descriptor.resources.iter().map(|r| r.kind()).collect::<Vec<_>>(),
        "steps": count_steps(&descriptor.steps),
        "teardown": count_steps(&descriptor.teardown),
        "histograms": descriptor
            .metrics
            .as_ref()
            .map(|m| m.histograms.iter().map(|h| h.name.clone()).collect::<Vec<_>>())
            .unwrap_or_default(),
        "ui_mode": descriptor.pinned_mode().map(|m| m.to_string()),
    });
    match output {
        OutputFormat::Human => {
            println!("{} is valid", descriptor.name);
            if let Some(description) = &descriptor.description {
                println!("  {}", description);
            }
            println!("  resources: {}", summary["resources"]);
            println!(
                "  steps: {} ({} in teardown)",
                summary["steps"], summary["teardown"]
            );
            println!("  histograms: {}", summary["histograms"]);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&summary)?),
    }
    Ok(())
}

fn cmd_config(config: &EngineConfig, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Human | OutputFormat::Yaml => print!("{}", serde_yaml::to_string(config)?),
    }
    Ok(())
}

/// Steps including nested ones.
fn count_steps(steps: &[StepSpec]) -> usize {
    steps.iter().map(count_step).sum()
}

fn count_step(step: &StepSpec) -> usize {
    1 + step
        .op
        .children()
        .into_iter()
        .map(count_step)
        .sum::<usize>()
}
