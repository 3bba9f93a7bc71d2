use std::sync::Arc;

use apollo_service::ApolloService;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<ApolloService>,
}
impl AppState {
	pub async fn new(config: apollo_config::Config) -> color_eyre::Result<Self> {
		let service = ApolloService::connect(config).await?;

		tracing::info!(storage = service.storage_mode().as_str(), "Cache store ready.");

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: ApolloService) -> Self {
		Self { service: Arc::new(service) }
	}
}
