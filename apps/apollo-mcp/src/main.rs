use clap::Parser;

use apollo_mcp::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	dotenvy::dotenv().ok();

	let args = Args::parse();

	apollo_mcp::run(args).await
}
