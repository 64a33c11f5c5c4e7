//! Common test utilities for ledger integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dust_coord::{CoordStore, MemoryCoord};
use dust_core::{AppId, UserId};
use dust_service::{create_router, AppState, ServiceConfig};
use dust_store::PgStore;

/// Test harness containing everything needed for integration tests.
///
/// The Postgres pool connects lazily: tests that stop at validation, auth,
/// or collaborator lookups never touch a database. Tests that exercise the
/// full ledger path read `TEST_DATABASE_URL` and are `#[ignore]`d so the
/// suite passes without one.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Stubbed app-directory (and optionally pricing) collaborator.
    pub collaborators: MockServer,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// An app ID the stubbed directory reports as active.
    pub test_app_id: AppId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
    /// The admin API key for privileged requests.
    pub admin_api_key: String,
    /// Handle to the (lazily connected) store, for database-backed tests.
    pub store: Arc<PgStore>,
}

impl TestHarness {
    /// Create a harness with an active-app stub and no pricing service.
    pub async fn new() -> Self {
        Self::with_pricing(false).await
    }

    /// Create a harness, optionally routing pricing lookups at the stub.
    pub async fn with_pricing(pricing: bool) -> Self {
        let collaborators = MockServer::start().await;

        // Default stub: every app is valid and active. Individual tests
        // mount more specific mocks on top. The catch-all is given the
        // lowest priority so those specific mocks (default priority) win;
        // wiremock otherwise resolves equal-priority matches by insertion
        // order, which would let this broad stub shadow them.
        Mock::given(method("GET"))
            .and(path_regex(r"^/v1/apps/[0-9a-f-]+/status$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "is_valid": true,
                "is_active": true,
            })))
            .with_priority(255)
            .mount(&collaborators)
            .await;

        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/dust_test".into());

        let config = ServiceConfig {
            database_url: database_url.clone(),
            service_api_key: Some("test-service-key".into()),
            admin_api_key: Some("test-admin-key".into()),
            app_directory_url: collaborators.uri(),
            pricing_url: pricing.then(|| collaborators.uri()),
            ..ServiceConfig::default()
        };

        let store = Arc::new(PgStore::connect_lazy(&database_url).expect("store"));
        let coord: Arc<dyn CoordStore> = Arc::new(MemoryCoord::new());
        let state = AppState::new(Arc::clone(&store), coord, config);

        let router: Router = create_router(state);
        let server = TestServer::new(router).expect("test server");

        Self {
            server,
            collaborators,
            test_user_id: UserId::generate(),
            test_app_id: AppId::generate(),
            service_api_key: "test-service-key".into(),
            admin_api_key: "test-admin-key".into(),
            store,
        }
    }

    /// Authorization header value for the harness user.
    pub fn user_auth_header(&self) -> String {
        format!("Bearer test-token:{}", self.test_user_id)
    }

    /// Authorization header value for a different user.
    pub fn other_user_auth_header() -> String {
        format!("Bearer test-token:{}", UserId::generate())
    }
}
