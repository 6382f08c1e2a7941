use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "solace")]
#[command(about = "Counseling chat response engine with structured emotion/CBT metadata")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Message to respond to; read from stdin when omitted
    pub message: Option<String>,

    /// Response schema TOML file (overrides the RESPONSE_SCHEMA variable)
    #[arg(short, long)]
    pub schema: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Print the provider attempt report to stderr
    #[arg(long)]
    pub report: bool,
}
