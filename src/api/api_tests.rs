#[cfg(test)]
mod router_tests {
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::api::{app_state::AppState, create_router};
    use crate::config::config::EngineConfig;
    use crate::engine::EngineHandle;

    async fn app() -> Router {
        let handle = EngineHandle::start(EngineConfig::local(":memory:"))
            .await
            .unwrap();
        create_router(AppState::new(handle))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_root_redirects_to_docs() {
        let app = app().await;
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/docs");
    }

    #[tokio::test]
    async fn test_docs_serves_openapi() {
        let app = app().await;
        let (status, body) = send(&app, "GET", "/docs", None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["openapi"].as_str().unwrap().starts_with("3."));
        assert!(body["paths"]["/memories"].is_object());
    }

    #[tokio::test]
    async fn test_health_reports_generation() {
        let app = app().await;
        let (status, body) = send(&app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "memgate");
        assert_eq!(body["generation"], 1);
    }

    #[tokio::test]
    async fn test_malformed_json_uses_error_body() {
        let app = app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/memories")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(body["details"].is_null());
    }

    #[tokio::test]
    async fn test_create_requires_scope() {
        let app = app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/memories",
            Some(json!({"messages": [{"role": "user", "content": "hi"}]})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_list_rejects_bad_filters() {
        let app = app().await;
        let (status, _) = send(&app, "GET", "/memories?user_id=u1&filters=oops", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_memory_is_404() {
        let app = app().await;
        let (status, body) = send(&app, "GET", "/memories/does-not-exist", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, _) = send(&app, "DELETE", "/memories/does-not-exist", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_configure_rejects_unknown_fields() {
        let app = app().await;
        let (status, _) = send(
            &app,
            "POST",
            "/configure",
            Some(json!({"vectorstore": {"provider": "memory"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metrics_counts_requests() {
        let app = app().await;
        send(&app, "GET", "/health", None).await;
        send(&app, "GET", "/memories/missing", None).await;

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("memgate_http_requests_total 2"));
        assert!(text.contains(r#"memgate_http_errors_total{class="4xx"} 1"#));
    }
}
