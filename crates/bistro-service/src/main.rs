//! Main entry point for the bistro service.
//!
//! Loads the configuration, builds the engine with every compiled-in storage
//! backend, starts the storage janitor and serves the HTTP API until
//! interrupted.

use bistro_config::Config;
use bistro_core::{BistroBuilder, BistroEngine, BistroFactories};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod server;

/// Command-line arguments for the bistro service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config/bistro.toml", env = "BISTRO_CONFIG")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	// RUST_LOG wins over --log-level
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started bistro");

	let config_path = args
		.config
		.to_str()
		.ok_or("Configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = Arc::new(build_engine(config.clone())?);
	let cleanup = engine.spawn_cleanup();

	match config.api.filter(|api| api.enabled) {
		Some(api_config) => {
			server::start_server(api_config, Arc::clone(&engine), shutdown_signal()).await?;
		},
		None => {
			tracing::warn!("API server disabled; running storage cleanup only");
			shutdown_signal().await;
		},
	}

	cleanup.abort();
	tracing::info!("Stopped bistro");
	Ok(())
}

/// Builds the engine with every storage backend compiled into the binary.
fn build_engine(config: Config) -> Result<BistroEngine, Box<dyn std::error::Error>> {
	Ok(BistroBuilder::new(config).build(BistroFactories::with_all_storage())?)
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!("Failed to listen for shutdown signal: {}", e);
	}
}
