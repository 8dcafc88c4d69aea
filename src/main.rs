//! webpilot - drives a browser through a natural-language task
//!
//! Main entry point for the CLI application.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use webpilot::agent::{JsonlRunLog, Orchestrator, RunStatus, TerminalGate};
use webpilot::llm::OllamaClient;
use webpilot::tools::browser::AgentBrowser;
use webpilot::Config;

/// webpilot - browser agent for natural-language tasks
#[derive(Parser, Debug)]
#[command(name = "webpilot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Task to perform, e.g. "find the pricing page of example.com"
    task: Option<String>,

    /// Model that plans each step
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// Step budget
    #[arg(long)]
    max_steps: Option<usize>,

    /// Steps kept verbatim in the reasoning context
    #[arg(long)]
    memory_window: Option<usize>,

    /// Run in headed browser mode (visible window)
    #[arg(long)]
    headed: bool,

    /// Directory for run artifacts
    #[arg(long)]
    runs_dir: Option<PathBuf>,

    /// Page to open before the first step
    #[arg(long)]
    start_url: Option<String>,

    /// Enable debug output
    #[arg(long, short = 'd')]
    debug: bool,

    /// Write a default config file and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Build configuration
    let mut config = Config::load();

    // Apply CLI overrides
    if let Some(model) = args.model {
        config.reasoning.model = model;
    }
    if let Some(max_steps) = args.max_steps {
        config.agent.max_steps = max_steps;
    }
    if let Some(window) = args.memory_window {
        config.agent.memory_window = window;
    }
    if args.headed {
        config.browser.headed = true;
    }
    if let Some(dir) = args.runs_dir {
        config.logging.runs_dir = dir;
    }
    if args.start_url.is_some() {
        config.browser.start_url = args.start_url;
    }
    if args.debug {
        config.agent.debug = true;
    }

    let default_filter = if config.agent.debug {
        "webpilot=debug".to_string()
    } else {
        config.logging.filter.clone()
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if args.init_config {
        let path = config.save().context("writing config file")?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let Some(task) = args.task else {
        bail!("no task given; run `webpilot --help` for usage");
    };
    config.validate()?;

    if !AgentBrowser::is_available().await {
        bail!(webpilot::PilotError::AgentBrowserNotFound);
    }

    let reasoning = OllamaClient::from_config(&config)?;
    match reasoning.is_model_available(&config.reasoning.model).await {
        Ok(true) => {}
        Ok(false) => warn!(
            model = %config.reasoning.model,
            "Model not listed by Ollama; pull it with `ollama pull {}`",
            config.reasoning.model
        ),
        Err(e) => warn!(error = %e, "Could not check model availability"),
    }

    let sink = JsonlRunLog::create(
        &config.logging.runs_dir,
        chrono::Utc::now(),
        config.logging.screenshots,
    )?;
    let run_dir = sink.run_dir().to_path_buf();

    let browser = AgentBrowser::from_config(&config.browser);
    let orchestrator = Orchestrator::new(
        config,
        Arc::new(reasoning),
        Arc::new(browser),
        Arc::new(TerminalGate::new()),
    )?;

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping at the next safe point");
            token.cancel();
        }
    });

    info!(run_dir = %run_dir.display(), "Run artifacts");
    let report = orchestrator.run(task, Box::new(sink)).await?;

    println!("\n{}", "─".repeat(50));
    println!(
        "Status:  {}",
        match report.status {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    );
    println!("Summary: {}", report.summary);
    println!("Steps:   {}", report.steps().len());
    println!("Page:    {}", report.final_url);
    println!("Tokens:  {}", report.metadata.token_usage.total_tokens);
    println!("Logs:    {}", run_dir.display());

    if !report.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}
