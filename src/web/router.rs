//! Route definitions for the coordinator.

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::protocol::Rendezvous;

use super::api;
use super::framing::{framing_middleware, task_id_middleware, TaskId};

/// Create the protocol router.
pub fn create_api_router(rendezvous: Rendezvous) -> Router {
    Router::new()
        .route("/register/:name", post(api::register_client))
        .route("/listen/:name", get(api::listen))
        .route("/send/:name", post(api::send_command))
        .route("/clients", get(api::list_clients))
        .route("/clients/", get(api::list_clients))
        .route("/clients/:name", delete(api::remove_client))
        .with_state(rendezvous)
}

/// Create the full app router with framing, tracing and limits applied.
pub fn create_app_router(rendezvous: Rendezvous, config: &ServerConfig) -> Router {
    let mut router = create_api_router(rendezvous).route("/health", get(health_check));

    if let Some(dir) = &config.static_dir {
        tracing::info!("Serving static files from {}", dir.display());
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(middleware::from_fn(framing_middleware))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let task_id = request
                    .extensions()
                    .get::<TaskId>()
                    .map(|t| t.0.as_str())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    task_id = %task_id,
                )
            }),
        )
        .layer(middleware::from_fn(task_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::time::Duration;

    use axum::{
        http::{header, Method, StatusCode},
        response::Response,
    };
    use flate2::read::GzDecoder;
    use tower::ServiceExt;

    use crate::core::Registry;
    use crate::protocol::ClientList;
    use crate::web::framing::TASK_ID_HEADER;

    fn app() -> Router {
        let config = ServerConfig::default();
        let registry = Registry::new(config.liveness_interval());
        create_app_router(Rendezvous::new(registry, config.poll_timeout()), &config)
    }

    fn request(method: Method, uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body))
            .unwrap()
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, body_bytes(response).await)
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test(start_paused = true)]
    async fn test_alice_scenario() {
        let app = app();

        let (status, body) = call(&app, request(Method::POST, "/register/alice", r#"{"X":"1"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok\r\n");

        let (status, _) = call(&app, request(Method::POST, "/register/alice", r#"{"X":"1"}"#)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&app, request(Method::POST, "/send/alice", "echo hi")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok\r\n");

        let (status, body) = call(&app, request(Method::GET, "/listen/alice", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"echo hi");

        let (status, body) = call(&app, request(Method::GET, "/listen/alice", "")).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body, b"timeout\r\n");
    }

    #[tokio::test]
    async fn test_send_unknown_is_404() {
        let app = app();
        let (status, _) = call(&app, request(Method::POST, "/send/nobody", "ls")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, request(Method::GET, "/listen/nobody", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_clients() {
        let app = app();
        call(&app, request(Method::POST, "/register/a", r#"{"X":"1"}"#)).await;
        call(&app, request(Method::POST, "/register/b", "Y=2")).await;

        let (status, body) = call(&app, request(Method::GET, "/clients/", "")).await;
        assert_eq!(status, StatusCode::OK);

        let list: ClientList = serde_json::from_slice(&body).unwrap();
        let mut names: Vec<_> = list.clients.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["a", "b"]);

        let a = list.clients.iter().find(|c| c.name == "a").unwrap();
        assert_eq!(a.env, serde_json::json!({"X": "1"}));
    }

    #[tokio::test]
    async fn test_delete_client() {
        let app = app();
        call(&app, request(Method::POST, "/register/a", "")).await;

        let (status, body) = call(&app, request(Method::DELETE, "/clients/a", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok\r\n");

        let (status, _) = call(&app, request(Method::DELETE, "/clients/a", "")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, request(Method::POST, "/send/a", "ls")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_paths_rejected() {
        let app = app();
        let (status, _) = call(&app, request(Method::POST, "/register/", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, request(Method::GET, "/send/alice", "")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) = call(&app, request(Method::POST, "/register/bad%0Aname", "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_static_dir_fallback() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("index.html"), "<h1>swarm</h1>").unwrap();
        let config = ServerConfig {
            static_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let registry = Registry::new(config.liveness_interval());
        let app = create_app_router(Rendezvous::new(registry, config.poll_timeout()), &config);

        let (status, body) = call(&app, request(Method::GET, "/index.html", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"<h1>swarm</h1>");

        let (status, _) = call(&app, request(Method::GET, "/clients/", "")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let config = ServerConfig {
            max_body_bytes: 4,
            ..Default::default()
        };
        let registry = Registry::new(config.liveness_interval());
        let app = create_app_router(Rendezvous::new(registry.clone(), config.poll_timeout()), &config);

        let (status, _) = call(&app, request(Method::POST, "/register/alice", "0123456789")).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_gzip_and_content_length() {
        let app = app();
        call(&app, request(Method::POST, "/register/alice", "")).await;
        call(&app, request(Method::POST, "/send/alice", "echo compressed")).await;

        let req = Request::builder()
            .uri("/listen/alice")
            .header(header::ACCEPT_ENCODING, "gzip")
            .header(header::CONNECTION, "keep-alive")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(response.headers()[header::CONNECTION], "keep-alive");
        let length: usize = response.headers()[header::CONTENT_LENGTH]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();

        let body = body_bytes(response).await;
        assert_eq!(body.len(), length);

        let mut decoded = String::new();
        GzDecoder::new(&body[..]).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, "echo compressed");
    }

    #[tokio::test]
    async fn test_identity_has_content_length() {
        let app = app();
        let response = app
            .clone()
            .oneshot(request(Method::GET, "/health", ""))
            .await
            .unwrap();

        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert!(response.headers().get(header::CONNECTION).is_none());
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "2");
    }

    #[tokio::test]
    async fn test_task_id_propagated() {
        let app = app();
        let req = Request::builder()
            .uri("/health")
            .header(TASK_ID_HEADER, "c6b1e0d2@/1")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.headers()[TASK_ID_HEADER], "c6b1e0d2@/1");

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/health", ""))
            .await
            .unwrap();
        let minted = response.headers()[TASK_ID_HEADER].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(minted).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_send_wakes_listener() {
        let app = app();
        call(&app, request(Method::POST, "/register/alice", "")).await;

        let listener = {
            let app = app.clone();
            tokio::spawn(async move { call(&app, request(Method::GET, "/listen/alice", "")).await })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;
        call(&app, request(Method::POST, "/send/alice", "whoami")).await;

        let (status, body) = listener.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"whoami");
    }
}
