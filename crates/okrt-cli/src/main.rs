use std::process;

use anyhow::Result;
use clap::Parser;
use okrt_cli::{App, Cli};
use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let app = App::create(&cli)?;

    let prompt = match &cli.prompt {
        Some(prompt) => prompt.clone(),
        None => {
            use std::io::Read;
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            let input = input.trim().to_string();
            if input.is_empty() {
                anyhow::bail!("No input provided. Use -p/--prompt or pipe input.");
            }
            input
        }
    };

    app.run(&prompt).await
}

fn init_logging(verbose: bool) {
    // Events go to stdout, diagnostics to stderr.
    let filter = if verbose { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
