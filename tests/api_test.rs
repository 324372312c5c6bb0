#[cfg(test)]
mod api_integration_tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use diesel::r2d2::{ConnectionManager, Pool};
    use diesel::PgConnection;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    use grcserver::core::config::AppConfig;
    use grcserver::main_module::build_router;
    use grcserver::notifications::mailer::RecordingMailer;
    use grcserver::reports::documents::DocumentStore;
    use grcserver::reports::pdf::StaticPdfConverter;
    use grcserver::reports::worker::ReportQueue;
    use grcserver::shared::state::AppState;

    // Nothing listens on the discard port, so any handler that reaches the
    // database fails; these tests only cover paths that answer before that.
    fn router() -> axum::Router {
        let manager = ConnectionManager::<PgConnection>::new("postgres://grc@127.0.0.1:9/none");
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(0))
            .connection_timeout(Duration::from_millis(250))
            .build_unchecked(manager);
        let dir = std::env::temp_dir().join(format!("grcserver-api-{}", Uuid::new_v4()));
        let (report_queue, _rx) = ReportQueue::new(4);
        let state = AppState {
            conn: pool,
            config: Arc::new(AppConfig::default()),
            mailer: Arc::new(RecordingMailer::new()),
            pdf_converter: Arc::new(StaticPdfConverter::new()),
            documents: DocumentStore::new(dir),
            report_queue,
        };
        build_router(Arc::new(state))
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn json_request(method: &str, uri: &str, org: Option<Uuid>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(org) = org {
            builder = builder.header("x-organization-id", org.to_string());
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_simple_health_is_ok() {
        let (status, body) = send(Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "grcserver");
    }

    #[tokio::test]
    async fn test_api_health_reports_degraded_database() {
        let (status, body) =
            send(Request::get("/api/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["database"], false);
    }

    #[tokio::test]
    async fn test_openapi_document_served_without_tenant() {
        let (status, body) =
            send(Request::get("/api/openapi.json").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/api/reports"].is_object());
    }

    #[tokio::test]
    async fn test_missing_organization_header_rejected() {
        let (status, body) = send(Request::get("/api/risks").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Organization context required");
    }

    #[tokio::test]
    async fn test_malformed_organization_header_rejected() {
        let request = Request::get("/api/frameworks")
            .header("x-organization-id", "acme")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("must be a UUID"));
    }

    #[tokio::test]
    async fn test_risk_rating_out_of_range() {
        let request = json_request(
            "POST",
            "/api/risks",
            Some(Uuid::new_v4()),
            json!({ "title": "Data centre flood", "impact": 6, "likelihood": 2 }),
        );
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("impact"));
    }

    #[tokio::test]
    async fn test_risk_calculation_validates_before_lookup() {
        let request = Request::get("/api/risk-matrices/calculate?impact=0&likelihood=3")
            .header("x-organization-id", Uuid::new_v4().to_string())
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_framework_report_needs_framework_id() {
        let request = json_request(
            "POST",
            "/api/reports",
            Some(Uuid::new_v4()),
            json!({ "report_type": "framework_assessment" }),
        );
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("framework_id"));
    }

    #[tokio::test]
    async fn test_reminder_config_requires_user() {
        let request = json_request(
            "PUT",
            "/api/reminders/config",
            Some(Uuid::new_v4()),
            json!({ "days_before_due": [7, 1] }),
        );
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("X-User-Id"));
    }
}
