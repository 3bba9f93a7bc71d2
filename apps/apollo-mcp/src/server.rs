use std::{net::SocketAddr, sync::Arc};

use axum::Router;
use color_eyre::Result;
use rmcp::{
	ErrorData, ServerHandler,
	handler::server::router::tool::ToolRouter,
	model::{CallToolResult, JsonObject, ServerCapabilities, ServerInfo},
	transport::streamable_http_server::{
		StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
	},
};
use tokio::net::TcpListener;

use apollo_service::ApolloService;

use crate::tools;

pub const TOOL_SAVE_PATIENT_SESSION: &str = "save_patient_session";
pub const TOOL_GET_PATIENT_SESSION: &str = "get_patient_session";
pub const TOOL_DELETE_PATIENT_SESSION: &str = "delete_patient_session";
pub const TOOL_CACHE_MEDICAL_DATA: &str = "cache_medical_data";
pub const TOOL_GET_CACHED_DATA: &str = "get_cached_data";
pub const TOOL_LIST_ACTIVE_SESSIONS: &str = "list_active_sessions";

#[derive(Clone)]
pub struct ApolloMcp {
	service: Arc<ApolloService>,
	tool_router: ToolRouter<Self>,
}
impl ApolloMcp {
	pub fn new(service: Arc<ApolloService>) -> Self {
		Self { service, tool_router: Self::tool_router() }
	}

	pub fn tool_names(&self) -> Vec<String> {
		self.tool_router.list_all().into_iter().map(|tool| tool.name.to_string()).collect()
	}
}

#[rmcp::tool_router]
impl ApolloMcp {
	#[rmcp::tool(
		name = "save_patient_session",
		description = "Save patient data under a session id. A new id is generated when none is given.",
		input_schema = save_patient_session_schema()
	)]
	async fn save_patient_session(&self, params: JsonObject) -> Result<CallToolResult, ErrorData> {
		tools::into_tool_result(tools::save_patient_session(&self.service, params).await?)
	}

	#[rmcp::tool(
		name = "get_patient_session",
		description = "Fetch a saved patient session and record the access time.",
		input_schema = session_id_schema()
	)]
	async fn get_patient_session(&self, params: JsonObject) -> Result<CallToolResult, ErrorData> {
		tools::into_tool_result(tools::get_patient_session(&self.service, params).await?)
	}

	#[rmcp::tool(
		name = "delete_patient_session",
		description = "Delete a patient session. Deleting an unknown session succeeds.",
		input_schema = session_id_schema()
	)]
	async fn delete_patient_session(&self, params: JsonObject) -> Result<CallToolResult, ErrorData> {
		tools::into_tool_result(tools::delete_patient_session(&self.service, params).await?)
	}

	#[rmcp::tool(
		name = "cache_medical_data",
		description = "Cache arbitrary medical data under a source namespace and key.",
		input_schema = cache_medical_data_schema()
	)]
	async fn cache_medical_data(&self, params: JsonObject) -> Result<CallToolResult, ErrorData> {
		tools::into_tool_result(tools::cache_medical_data(&self.service, params).await?)
	}

	#[rmcp::tool(
		name = "get_cached_data",
		description = "Fetch cached medical data. Without a source, every data namespace is searched.",
		input_schema = get_cached_data_schema()
	)]
	async fn get_cached_data(&self, params: JsonObject) -> Result<CallToolResult, ErrorData> {
		tools::into_tool_result(tools::get_cached_data(&self.service, params).await?)
	}

	#[rmcp::tool(
		name = "list_active_sessions",
		description = "List active patient sessions with their timestamps.",
		input_schema = list_active_sessions_schema()
	)]
	async fn list_active_sessions(&self, params: JsonObject) -> Result<CallToolResult, ErrorData> {
		tools::into_tool_result(tools::list_active_sessions(&self.service, params).await?)
	}
}

#[rmcp::tool_handler]
impl ServerHandler for ApolloMcp {
	fn get_info(&self) -> ServerInfo {
		ServerInfo {
			instructions: Some(
				"Apollo MCP server for patient sessions and cached medical data.".to_string(),
			),
			capabilities: ServerCapabilities::builder().enable_tools().build(),
			..Default::default()
		}
	}
}

pub async fn serve_mcp(bind_addr: &str, service: Arc<ApolloService>) -> Result<()> {
	let bind_addr: SocketAddr = bind_addr.parse()?;
	let session_manager: Arc<LocalSessionManager> = Default::default();
	let mcp_service = StreamableHttpService::new(
		move || Ok(ApolloMcp::new(service.clone())),
		session_manager,
		StreamableHttpServerConfig::default(),
	);
	let router = Router::new().fallback_service(mcp_service);
	let listener = TcpListener::bind(bind_addr).await?;

	tracing::info!(%bind_addr, "MCP server listening.");

	axum::serve(listener, router).await?;

	Ok(())
}

fn save_patient_session_schema() -> Arc<JsonObject> {
	Arc::new(rmcp::object!({
		"type": "object",
		"additionalProperties": false,
		"required": ["patientData"],
		"properties": {
			"sessionId": { "type": "string", "description": "Existing session id to overwrite." },
			"patientData": { "description": "Patient data. Object fields are stored as is." },
			"expirationHours": { "type": "number", "exclusiveMinimum": 0, "default": 24 }
		}
	}))
}

fn session_id_schema() -> Arc<JsonObject> {
	Arc::new(rmcp::object!({
		"type": "object",
		"additionalProperties": false,
		"required": ["sessionId"],
		"properties": {
			"sessionId": { "type": "string" }
		}
	}))
}

fn cache_medical_data_schema() -> Arc<JsonObject> {
	Arc::new(rmcp::object!({
		"type": "object",
		"additionalProperties": false,
		"required": ["cacheKey", "data", "source"],
		"properties": {
			"cacheKey": { "type": "string" },
			"data": { "description": "Any JSON value." },
			"source": {
				"type": "string",
				"description": "Namespace such as pubmed or imaging. The session namespace is reserved."
			},
			"ttlMinutes": { "type": "number", "exclusiveMinimum": 0, "default": 60 }
		}
	}))
}

fn get_cached_data_schema() -> Arc<JsonObject> {
	Arc::new(rmcp::object!({
		"type": "object",
		"additionalProperties": false,
		"required": ["cacheKey"],
		"properties": {
			"cacheKey": { "type": "string" },
			"source": { "type": "string" }
		}
	}))
}

fn list_active_sessions_schema() -> Arc<JsonObject> {
	Arc::new(rmcp::object!({
		"type": "object",
		"additionalProperties": false,
		"properties": {
			"limit": { "type": "integer", "minimum": 1, "default": 50 }
		}
	}))
}
