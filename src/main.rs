use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use std::io::Read;
use tracing::info;

use solace::app::AppConfig;
use solace::chat::{AiResponse, ResponseOrchestrator, ResponseSchema};

mod cli;

use cli::Cli;

/// Reply as serialized for the calling layer. The timestamp belongs to the
/// caller, so it is stamped here at serialization time rather than inside
/// the orchestrator.
#[derive(Serialize)]
struct TimestampedResponse {
    #[serde(flatten)]
    response: AiResponse,
    timestamp: DateTime<Utc>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directive = if cli.debug {
        "solace=debug"
    } else {
        "solace=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().expect("static directive parses")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = AppConfig::from_env().context("Failed to load configuration")?;
    if let Some(path) = &cli.schema {
        config.schema = ResponseSchema::load(path)
            .with_context(|| format!("Failed to load schema from {}", path.display()))?;
    }

    let orchestrator = ResponseOrchestrator::from_provider_config(
        &config.provider,
        config.schema,
        config.orchestrator,
    )
    .context("Failed to construct orchestrator")?;

    let message = match cli.message {
        Some(message) => message,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read message from stdin")?;
            buffer
        }
    };

    info!("Generating counseling reply");
    let report = orchestrator.generate_with_report(&message).await?;

    if cli.report {
        for attempt in &report.attempts {
            eprintln!(
                "attempt {}: success={} time={}ms{}",
                attempt.attempt_number,
                attempt.success,
                attempt.response_time_ms,
                attempt
                    .error
                    .as_deref()
                    .map(|e| format!(" error={}", e))
                    .unwrap_or_default()
            );
        }
        if let Some(failure) = report.failure {
            eprintln!("absorbed failure: {}", failure);
        }
    }

    let output = TimestampedResponse {
        response: report.response,
        timestamp: Utc::now(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
