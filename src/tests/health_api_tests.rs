#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::middleware::validation::max_body_size;
    use crate::tests::support::{body_bytes, setup};

    #[tokio::test]
    async fn test_healthz_endpoint() {
        let t = setup().await;

        let response = t.send("GET", "/healthz", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&body_bytes(response).await[..], b"ok");
    }

    #[tokio::test]
    async fn test_security_headers_present() {
        let t = setup().await;

        let response = t.send("GET", "/api/tags/", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert!(headers.contains_key("x-content-type-options"));
        assert!(headers.contains_key("x-frame-options"));
        assert!(headers.contains_key("referrer-policy"));
        assert!(headers.contains_key("permissions-policy"));
        assert!(headers.contains_key("cross-origin-opener-policy"));
        assert!(headers.contains_key("cross-origin-resource-policy"));
    }

    #[tokio::test]
    async fn test_readyz_endpoint() {
        let t = setup().await;

        let response = t.send("GET", "/readyz", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&body_bytes(response).await[..], b"ready");
    }

    #[tokio::test]
    async fn test_readyz_endpoint_db_closed() {
        let t = setup().await;
        t.state.db.close().await;

        let response = t.send("GET", "/readyz", None, None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(String::from_utf8_lossy(&body_bytes(response).await).contains("not ready"));
    }

    #[tokio::test]
    async fn test_version_endpoint() {
        let t = setup().await;

        let (status, v) = t.json("GET", "/version", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["name"], "foodgram");
        assert!(!v["version"].as_str().unwrap().is_empty());
        assert!(v.get("build").is_some());
    }

    #[tokio::test]
    async fn test_metrics_endpoints() {
        let t = setup().await;
        t.create_user("chef", false).await;

        let (status, v) = t.json("GET", "/metrics", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["recipes_created"], 0);
        assert!(v.get("uptime_seconds").is_some());

        let response = t.send("GET", "/metrics/prometheus", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(body.contains("foodgram_recipes_created 0"));
        assert!(body.contains("# TYPE foodgram_logins counter"));
        assert!(body.contains("# TYPE foodgram_uptime_seconds gauge"));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let t = setup().await;

        let (status, body) = t.json("GET", "/media/../foodgram.db", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_PATH");
        assert_eq!(body["status"], 400);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_oversized_body_rejected_early() {
        let t = setup().await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/recipes/")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, (max_body_size() + 1).to_string())
            .body(Body::empty())
            .unwrap();
        let response = t.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
        assert!(body["timestamp"].is_string());
    }
}
