use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	dotenvy::dotenv().ok();

	let args = apollo_api::Args::parse();

	apollo_api::run(args).await
}
