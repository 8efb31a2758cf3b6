use std::path::PathBuf;

use clap::Parser;
use okrt_wire::ProviderKind;

/// okrt - stream OKR tool responses from any provider
#[derive(Parser, Debug, Clone)]
#[command(name = "okrt")]
#[command(about = "Streams normalized OKR tool events as NDJSON")]
#[command(version)]
pub struct Cli {
    /// Provider protocol family to speak
    #[arg(short = 'P', long, value_name = "NAME")]
    pub provider: Option<ProviderKind>,

    /// Model to request
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Prompt to send (reads stdin when omitted)
    #[arg(short, long, value_name = "TEXT")]
    pub prompt: Option<String>,

    /// Override the provider's default endpoint
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// API key; falls back to OKRT_API_KEY
    #[arg(long, value_name = "KEY", env = "OKRT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Path to configuration file
    #[arg(long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Append interaction captures to this file, one JSON line each
    #[arg(long, value_name = "FILE")]
    pub audit_log: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
