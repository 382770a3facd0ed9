use clap::Parser;
use dotenvy::dotenv;
use research_aggregator::cli::{self, Cli};
use research_aggregator::layers::download::CancellationFlag;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // 0. Load Configuration
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Ctrl-C stops a download batch between papers instead of mid-write.
    let cancel = CancellationFlag::default();
    if cli.download {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing current download");
                cancel.cancel();
            }
        });
    }

    let mut stdout = std::io::stdout().lock();
    match cli::run(cli, cancel, &mut stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
