use std::sync::Arc;

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode},
};
use serde_json::Value;
use tower::util::ServiceExt;

use apollo_api::{routes, state::AppState};
use apollo_domain::SearchSource;
use apollo_service::{ApolloService, Providers};
use apollo_storage::CacheStore;
use apollo_testkit::{FailingSearchProvider, ManualClock, StaticSearchProvider, test_config};

fn app(pubmed: Arc<StaticSearchProvider>) -> Router {
	let store = CacheStore::memory_only(Arc::new(ManualClock::default()));
	let providers = Providers::new(pubmed, Arc::new(FailingSearchProvider::default()));
	let service = ApolloService::new(test_config(), Arc::new(store), providers);

	routes::router(AppState::from_service(service))
}

fn pubmed() -> Arc<StaticSearchProvider> {
	Arc::new(
		StaticSearchProvider::new(SearchSource::PubMed)
			.with_page("Aortic dissection", &["12345", "67890"])
			.with_page("Aortic dissection AND CT scan", &["67890", "11111"]),
	)
}

async fn post_json(app: Router, uri: &str, payload: String) -> (StatusCode, Value) {
	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri(uri)
				.header("content-type", "application/json")
				.body(Body::from(payload))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call route.");
	let status = response.status();
	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json = serde_json::from_slice(&body).expect("Failed to parse response.");

	(status, json)
}

#[tokio::test]
async fn health_ok() {
	let response = app(pubmed())
		.oneshot(
			Request::builder()
				.uri("/api/health")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /api/health.");

	assert_eq!(response.status(), StatusCode::OK);

	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json: Value = serde_json::from_slice(&body).expect("Failed to parse response.");

	assert_eq!(json["status"], "OK");
	assert!(json["timestamp"].as_str().is_some_and(|stamp| stamp.ends_with('Z')));
	assert_eq!(json["storage"], "fallback");
}

#[tokio::test]
async fn search_external_ranks_articles() {
	let provider = pubmed();
	let payload = serde_json::json!({
		"structuredData": {
			"diagnosisTests": [{ "condition": "Aortic dissection", "test": "CT scan" }]
		},
		"source": "pubmed",
		"maxResults": 5
	});
	let (status, json) =
		post_json(app(provider.clone()), "/api/search-external", payload.to_string()).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["success"], true);
	assert_eq!(json["source"], "pubmed");
	assert_eq!(json["query"], "Aortic dissection AND CT scan");
	assert_eq!(json["total"], 3);
	assert_eq!(json["articles"][0]["id"], "12345");
	assert_eq!(json["articles"][0]["priorityWeight"], 5);
	assert_eq!(json["articles"][2]["id"], "11111");
	assert_eq!(json["articles"][2]["priorityWeight"], 1);
	assert_eq!(json["searchTerms"]["critical"][0], "Aortic dissection");
	assert_eq!(json["queries"].as_array().map(Vec::len), Some(3));
	assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn search_external_without_terms_reports_message() {
	let payload = serde_json::json!({ "structuredData": {} });
	let (status, json) = post_json(app(pubmed()), "/api/search-external", payload.to_string()).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["success"], true);
	assert_eq!(json["articles"], serde_json::json!([]));
	assert_eq!(json["total"], 0);
	assert!(json["message"].as_str().is_some_and(|msg| msg.starts_with("No searchable terms")));
}

#[tokio::test]
async fn search_external_requires_structured_data() {
	let payload = serde_json::json!({ "source": "pubmed" });
	let (status, json) = post_json(app(pubmed()), "/api/search-external", payload.to_string()).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["success"], false);
	assert_eq!(json["error"], "Structured data is required");
	assert!(json.get("details").is_none());
}

#[tokio::test]
async fn malformed_body_is_a_json_bad_request() {
	let (status, json) =
		post_json(app(pubmed()), "/api/search-external", "{not json".to_string()).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["success"], false);
	assert!(json["error"].as_str().is_some_and(|error| !error.is_empty()));
}

#[tokio::test]
async fn legacy_route_always_searches_pubmed() {
	let provider = pubmed();
	let payload = serde_json::json!({
		"structuredData": { "diagnosisTests": [{ "condition": "Aortic dissection" }] },
		"source": "clinicaltrials"
	});
	let (status, json) =
		post_json(app(provider.clone()), "/api/search-pubmed", payload.to_string()).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["source"], "pubmed");
	assert_eq!(json["articles"][0]["id"], "12345");
	assert!(json.get("trials").is_none());
	assert!(provider.calls() > 0);
}
