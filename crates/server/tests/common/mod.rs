//! Shared test fixtures.

use alcove_core::Tenant;
use alcove_core::config::{AppConfig, DatabaseConfig, ServerConfig};
use alcove_server::identity::{PERMISSIONS_HEADER, TENANT_HEADER, USER_HEADER};
use alcove_server::{AppState, create_router};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const TENANT: &str = "diku";

/// An in-process server over a throwaway SQLite database.
pub struct TestApp {
    router: Router,
    _dir: tempfile::TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig::Sqlite {
                path: dir.path().join("settings.db"),
            },
        };
        let store = alcove_storage::from_config(&config.database)
            .await
            .expect("open store");
        store
            .init_tenant(&Tenant::parse(TENANT).expect("tenant"))
            .await
            .expect("init tenant");
        Self {
            router: create_router(AppState::new(config, store)),
            _dir: dir,
        }
    }

    /// Send a request carrying the standard identity headers.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        caller: Option<Uuid>,
        permissions: &[&str],
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(TENANT_HEADER, TENANT)
            .header(
                PERMISSIONS_HEADER,
                serde_json::to_string(permissions).unwrap(),
            );
        if let Some(caller) = caller {
            builder = builder.header(USER_HEADER, caller.to_string());
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .expect("request")
    }

    /// Send a request with raw headers and body, for malformed-input tests.
    pub async fn raw(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.expect("request")
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}
