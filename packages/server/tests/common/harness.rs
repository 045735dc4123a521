//! Test harness wiring the router to a mock-backed orchestrator.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use scrape_engine::exporters::MemoryExporter;
use scrape_engine::testing::MockAdapter;
use scrape_engine::{
    ExporterRegistry, MemoryJobStore, Orchestrator, OrchestratorConfig, RateLimitConfig,
    SourceRegistry,
};
use serde_json::Value;
use server_core::server::build_app;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub struct TestHarness {
    pub app: Router,
    pub orchestrator: Orchestrator,
    pub adapter: MockAdapter,
    pub exporter: Arc<MemoryExporter>,
}

impl TestHarness {
    /// Router with one `listings` source and one `memory` destination.
    pub fn new(adapter: MockAdapter) -> Self {
        // Uses try_init() to avoid panicking if already initialized.
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let exporter = Arc::new(MemoryExporter::new());
        let sources = {
            let adapter = adapter.clone();
            SourceRegistry::new().with("listings", move || Box::new(adapter.clone()))
        };
        let exporters = ExporterRegistry::new().with("memory", exporter.clone());
        let config = OrchestratorConfig::new()
            .with_rate_limit(RateLimitConfig::unlimited())
            .with_page_delay(Duration::ZERO)
            .with_item_batch(3, Duration::ZERO);

        let orchestrator = Orchestrator::new(
            Arc::new(MemoryJobStore::new()),
            sources,
            exporters,
            config,
        );

        Self {
            app: build_app(orchestrator.clone()),
            orchestrator,
            adapter,
            exporter,
        }
    }

    /// Send one request and decode the JSON response body (Null when empty).
    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body)).await
    }
}
