use rmcp::{ServiceExt, transport::stdio};

use textlift::config::Config;
use textlift::server::TextliftServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the MCP transport; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // Prefer a .env next to the binary; MCP clients may start us from any CWD.
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(".env")))
        .filter(|path| path.exists());
    match beside_exe {
        Some(path) => {
            dotenvy::from_path(&path).ok();
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    tracing::info!("textlift starting");

    let config = Config::load().unwrap_or_else(|e| {
        tracing::error!("{e}; using default configuration");
        Config::default()
    });
    let server = TextliftServer::new(config);

    let service = server
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("serving error: {e:?}"))?;

    service.waiting().await?;

    tracing::info!("textlift shutting down");
    Ok(())
}
