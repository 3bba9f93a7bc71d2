pub mod server;
pub mod tools;

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use apollo_service::ApolloService;

#[derive(Debug, Parser)]
#[command(
	version = apollo_cli::VERSION,
	rename_all = "kebab",
	styles = apollo_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> Result<()> {
	let config = apollo_config::load(&args.config)?;

	init_tracing(&config);

	let mcp_bind = config.service.mcp_bind.clone();
	let service = ApolloService::connect(config).await?;

	tracing::info!(storage = service.storage_mode().as_str(), "Cache store ready.");

	server::serve_mcp(&mcp_bind, Arc::new(service)).await
}

fn init_tracing(config: &apollo_config::Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();
}
