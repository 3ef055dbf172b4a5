use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coordination::{Phase, PhaseResult, ReplySource, SinkError, StreamEvent, TurnOrchestrator};
use courtroom_agents::config::{check_endpoint, CourtConfig};
use courtroom_agents::court::build_orchestrator;
use courtroom_agents::telemetry::{append_telemetry, MetricsCollector};
use tracing::info;

/// Courtroom simulation: Opposing counsel, Judge, and Jury respond to your argument.
#[derive(Parser, Debug)]
#[command(name = "courtroom", author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML (or .yaml/.yml) configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a session, present an argument, and run Opposing → Judge → Jury
    Run {
        /// Case title
        #[arg(long, default_value = "Untitled case")]
        title: String,

        /// Pinned case facts
        #[arg(long)]
        facts: String,

        /// The argument to present
        #[arg(long)]
        argument: String,

        /// Print replies incrementally as they arrive
        #[arg(long, default_value_t = false)]
        stream: bool,

        /// Emit JSON (NDJSON events when streaming)
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Append sequence telemetry to this JSONL file (overrides config)
        #[arg(long)]
        telemetry: Option<PathBuf>,
    },

    /// List models served by the live capability
    Models,

    /// Report whether the live capability is configured and reachable
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = CourtConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            title,
            facts,
            argument,
            stream,
            json,
            telemetry,
        } => {
            let telemetry = telemetry.or_else(|| config.telemetry_path.clone());
            run(&config, &title, &facts, &argument, stream, json, telemetry).await
        }
        Command::Models => models(&config).await,
        Command::Check => check(&config).await,
    }
}

async fn run(
    config: &CourtConfig,
    title: &str,
    facts: &str,
    argument: &str,
    stream: bool,
    json: bool,
    telemetry: Option<PathBuf>,
) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let session_id = orchestrator.create_session(title, facts);
    orchestrator.append_user_presentation(&session_id, argument)?;
    info!(session_id = %session_id, title, stream, "Courtroom session started");

    let collector = MetricsCollector::new(
        &session_id,
        title,
        orchestrator.adapter().capability_name(),
        stream,
    );

    let metrics = if stream {
        let collector = Mutex::new(collector);
        run_streaming(&orchestrator, &session_id, argument, json, &collector).await?;
        collector
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .finalize()
    } else {
        let results = orchestrator
            .run_sequence(&session_id, argument)
            .await
            .context("Sequence failed")?;
        print_results(&session_id, &results, json)?;
        let mut collector = collector;
        collector.record_results(&results);
        collector.finalize()
    };

    if let Some(path) = telemetry {
        append_telemetry(&metrics, &path);
    }
    Ok(())
}

async fn run_streaming(
    orchestrator: &TurnOrchestrator,
    session_id: &str,
    argument: &str,
    json: bool,
    collector: &Mutex<MetricsCollector>,
) -> Result<()> {
    let printer = StreamPrinter::new(json);
    let sink = |event: StreamEvent| -> Result<(), SinkError> {
        collector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(&event);
        printer
            .print(&event)
            .map_err(|e| SinkError::Failed(e.to_string()))
    };

    orchestrator
        .run_sequence_streaming(session_id, argument, &sink)
        .await
        .context("Streaming sequence failed")?;
    Ok(())
}

/// Writes stream events to stdout, either as NDJSON or as readable text.
struct StreamPrinter {
    json: bool,
    speaking: Mutex<Option<Phase>>,
}

impl StreamPrinter {
    fn new(json: bool) -> Self {
        Self {
            json,
            speaking: Mutex::new(None),
        }
    }

    fn print(&self, event: &StreamEvent) -> std::io::Result<()> {
        let mut out = std::io::stdout().lock();
        if self.json {
            writeln!(out, "{}", serde_json::to_string(event)?)?;
            return out.flush();
        }

        let mut speaking = self.speaking.lock().unwrap_or_else(PoisonError::into_inner);
        match event {
            StreamEvent::Delta { agent, delta } => {
                if *speaking != Some(*agent) {
                    write!(out, "{agent}: ")?;
                    *speaking = Some(*agent);
                }
                write!(out, "{delta}")?;
            }
            StreamEvent::Done {
                agent,
                text,
                verdict,
                confidence,
                source,
            } => {
                if *speaking != Some(*agent) {
                    write!(out, "{agent}: {text}")?;
                } else if *source == ReplySource::Failed {
                    write!(out, " {text}")?;
                }
                writeln!(out)?;
                if let (Some(verdict), Some(confidence)) = (verdict, confidence) {
                    writeln!(out, "=> {verdict} ({confidence}% confidence)")?;
                }
                *speaking = None;
            }
            StreamEvent::Error { agent, error } => writeln!(out, "{agent}: error: {error}")?,
        }
        out.flush()
    }
}

fn print_results(session_id: &str, results: &[PhaseResult], json: bool) -> Result<()> {
    if json {
        let body = serde_json::json!({
            "session_id": session_id,
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("Session {session_id}");
    for result in results {
        println!("{}: {}", result.agent, result.text);
    }
    if let Some(jury) = results.last() {
        match (jury.verdict, jury.confidence) {
            (Some(verdict), Some(confidence)) => {
                println!("=> {verdict} ({confidence}% confidence)")
            }
            _ => println!("=> no parseable verdict"),
        }
    }
    Ok(())
}

async fn models(config: &CourtConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let models = orchestrator
        .adapter()
        .list_models()
        .await
        .context("Failed to list models")?;
    for model in models {
        println!("{model}");
    }
    Ok(())
}

async fn check(config: &CourtConfig) -> Result<()> {
    println!("base_url: {}", config.provider.base_url);
    for (phase, settings) in [
        ("opposing", &config.phases.opposing),
        ("judge", &config.phases.judge),
        ("jury", &config.phases.jury),
    ] {
        println!(
            "{phase}: {} (max_output_tokens: {})",
            settings.model,
            settings
                .max_output_tokens
                .map_or_else(|| "unset".to_string(), |t| t.to_string())
        );
    }

    match config.provider.api_key() {
        None => println!("capability: not configured (mock replies will be used)"),
        Some(key) => {
            let reachable = check_endpoint(&config.provider.base_url, key).await;
            println!(
                "capability: configured, endpoint {}",
                if reachable { "reachable" } else { "unreachable" }
            );
        }
    }
    Ok(())
}
