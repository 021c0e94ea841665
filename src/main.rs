use std::process;

use authorscope::Cli;
use clap::Parser;

#[tokio::main]
async fn main() {
    // Logs go to stderr at "warn" unless RUST_LOG says otherwise; stdout
    // carries only the rendered result.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = cli.execute().await {
        eprintln!("Error: {e}");

        for cause in e.chain().skip(1) {
            eprintln!("  Caused by: {cause}");
        }

        process::exit(1);
    }
}
