mod appointments;
pub mod auth;
pub mod error;
mod installation;
mod users;
pub mod validation;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Installation wizard (public)
    let installation_routes = Router::new()
        .route("/status", get(installation::status))
        .route("/test-connection", post(installation::test_connection))
        .route("/perform", post(installation::perform));

    // Auth routes (public)
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/check", get(auth::check));

    // Protected API routes
    let api_routes = Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/:id", get(users::get_user))
        .route("/company", get(users::get_company))
        .route(
            "/appointments",
            get(appointments::list_appointments).post(appointments::create_appointment),
        )
        .route("/appointments/:id", get(appointments::get_appointment))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/", get(banner))
        .route("/health", get(health_check))
        .nest("/api/installation", installation_routes)
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(cors_layer(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS follows the installed settings, falling back to the configured default
/// before installation.
fn cors_layer(state: Arc<AppState>) -> CorsLayer {
    let allow = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let allowed = match state.runtime() {
            Some(runtime) => runtime.settings.cors_origin.clone(),
            None => state.config.installation.cors_origin.clone(),
        };
        origin.as_bytes() == allowed.as_bytes()
    });

    CorsLayer::new()
        .allow_origin(allow)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn banner() -> Json<Value> {
    Json(json!({ "message": "WebSchedulr API" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(root: &TempDir) -> Router {
        let mut config = Config::default();
        config.server.app_root = root.path().to_path_buf();
        create_router(Arc::new(AppState::new(config)))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let root = TempDir::new().unwrap();
        let response = app(&root)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_before_install() {
        let root = TempDir::new().unwrap();
        let response = app(&root)
            .oneshot(
                Request::get("/api/installation/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "installed": false }));
    }

    #[tokio::test]
    async fn test_protected_routes_before_install() {
        let root = TempDir::new().unwrap();
        let response = app(&root)
            .oneshot(Request::get("/api/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["code"], "NOT_INSTALLED");
    }

    #[tokio::test]
    async fn test_unsupported_type_connection_test() {
        let root = TempDir::new().unwrap();
        let response = app(&root)
            .oneshot(
                Request::post("/api/installation/test-connection")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"type":"postgres"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "success": false, "message": "Unsupported database type" })
        );
    }

    #[tokio::test]
    async fn test_perform_short_password() {
        let root = TempDir::new().unwrap();
        let body = json!({
            "admin": { "email": "a@b.com", "username": "a", "password": "short" },
            "company": { "name": "Acme" },
            "database": { "type": "sqlite", "filename": "test.db" }
        });
        let response = app(&root)
            .oneshot(
                Request::post("/api/installation/perform")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["details"].as_str().unwrap().contains("at least 7"));
        assert!(!root.path().join(".env").exists());
    }

    #[tokio::test]
    async fn test_cors_preflight_uses_default_origin() {
        let root = TempDir::new().unwrap();
        let response = app(&root)
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/installation/status")
                    .header("origin", "http://localhost:5173")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "http://localhost:5173"
        );
    }
}
