//! Mockup Compositor - perspective-correct product mockups over HTTP
//!
//! Serves the compositing engine: full-fidelity warps with realism
//! blending, fast drag previews, placement helpers and blend tuning.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mockup_compositor::config::Config;
use mockup_compositor::server::{self, AppState};

/// Mockup Compositor - place designs onto product photos
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Web server host (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Web server port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Configuration file path
    #[arg(short, long, default_value = "compositor.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("Mockup Compositor v{}", env!("CARGO_PKG_VERSION"));

    // Load or create configuration
    let config = Config::load_or_create(&args.config)?;

    // Use config file values, with CLI args as overrides
    let host = args.host.clone().unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);

    info!(
        "Render: min resolution {}px, cache {} pairs",
        config.render.min_resolution, config.render.cache_capacity
    );
    info!(
        "Sessions: debounce {:?}, frame interval {:?}",
        config.render.debounce(),
        config.render.frame_interval()
    );
    info!(
        "Blend: fold strength {}, shadow ramp {}",
        config.blend.fold_strength, config.blend.shadow_ramp
    );

    let state = Arc::new(AppState::new(config, args.config.clone()));

    let addr = format!("{}:{}", host, port);
    info!("Starting web server at http://{}", addr);

    let server_handle = tokio::spawn(async move { server::run_server(&addr, state).await });

    tokio::select! {
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => tracing::error!("Server error: {}", e),
                Err(e) => tracing::error!("Server task panicked: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
