//! pass-broker - Native Messaging Host Entry Point
//!
//! Serves a single request over stdin/stdout, then exits.

use pass_broker::{config::Config, serve_once};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // stdout carries the protocol, so logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("PASS_BROKER_LOG")
                .unwrap_or_else(|_| "pass_broker=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();

    let config = Config::from_env()?;
    debug!(
        store = %config.store_dir.display(),
        args = ?std::env::args().skip(1).collect::<Vec<_>>(),
        "Loaded configuration"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> anyhow::Result<()> {
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    serve_once(&config, &mut stdin, &mut stdout).await
}
