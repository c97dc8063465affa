use std::process::ExitCode;

use clap::Parser;

use chain_indexer_cli::{run, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            tracing::error!(error = %err, "chain-indexer exited with an error");
            ExitCode::from(1)
        }
    }
}
