use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::Level;

use crate::cors::cors_middleware;
use crate::endpoints;
use crate::utils::gateway::AppStateData;

/// Room for the text fields and multipart framing on top of the photo itself
const FORM_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Build the full router with all layers applied.
/// `/metrics` is only mounted when a Prometheus handle is given.
pub fn build_router(app_state: AppStateData, metrics_handle: Option<PrometheusHandle>) -> Router {
    let body_limit = app_state
        .config
        .gateway
        .max_photo_size_bytes
        .saturating_add(FORM_OVERHEAD_BYTES);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    let mut router = Router::new()
        .route(
            "/get-feedback-data",
            get(endpoints::feedback::get_feedback_data::get_feedback_data_handler),
        )
        .route(
            "/feedback",
            post(endpoints::feedback::submit_feedback::submit_feedback_handler),
        )
        .route("/status", get(endpoints::status::status_handler))
        .route("/health", get(endpoints::status::health_handler));

    if let Some(metrics_handle) = metrics_handle {
        router = router.route(
            "/metrics",
            get(move || std::future::ready(metrics_handle.render())),
        );
    }

    router
        .fallback(endpoints::fallback::handle_404)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(cors_middleware))
        // We log failed requests messages at 'DEBUG', since we already have our own error-logging code
        .layer(TraceLayer::new_for_http().on_failure(DefaultOnFailure::new().level(Level::DEBUG)))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use object_store::memory::InMemory;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::cors::{ALLOWED_HEADERS, ALLOWED_ORIGIN};
    use crate::db::memory::InMemoryFeedbackStore;
    use crate::db::{FeedbackQueries, FeedbackRecord, MockFeedbackQueries};
    use crate::error::{Error, ErrorDetails};
    use crate::storage::PhotoStorageInfo;

    const BOUNDARY: &str = "survei-test-boundary";

    fn record(id: u64, jenis_feedback: &str, rating: i64, created_at: &str) -> FeedbackRecord {
        serde_json::from_value(json!({
            "id": id,
            "nama": "Tamu",
            "jenis_feedback": jenis_feedback,
            "rating_kepuasan": rating,
            "created_at": created_at,
            "subjek": "Layanan",
        }))
        .unwrap()
    }

    fn seeded_store() -> Arc<InMemoryFeedbackStore> {
        Arc::new(InMemoryFeedbackStore::with_records(vec![
            record(1, "saran", 5, "2024-05-01T08:00:00Z"),
            record(2, "keluhan", 2, "2024-05-02T08:00:00Z"),
            record(3, "saran", 4, "2024-05-03T08:00:00Z"),
            record(4, "keluhan", 3, "2024-05-04T08:00:00Z"),
            record(5, "saran", 5, "2024-05-05T08:00:00Z"),
        ]))
    }

    fn router_with(
        store: Arc<dyn FeedbackQueries + Send + Sync>,
        photo_storage: PhotoStorageInfo,
    ) -> Router {
        let app_state =
            AppStateData::new_with_store(Arc::new(Config::default()), store, photo_storage);
        build_router(app_state, None)
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body.to_vec())
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, _, body) = send(router, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn assert_cors_headers(headers: &axum::http::HeaderMap) {
        assert_eq!(
            headers.get("access-control-allow-origin").unwrap(),
            ALLOWED_ORIGIN
        );
        assert_eq!(
            headers.get("access-control-allow-headers").unwrap(),
            ALLOWED_HEADERS
        );
    }

    enum Part<'a> {
        Text(&'a str, &'a str),
        File {
            name: &'a str,
            file_name: &'a str,
            content_type: &'a str,
            data: &'a [u8],
        },
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                            .as_bytes(),
                    );
                }
                Part::File {
                    name,
                    file_name,
                    content_type,
                    data,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn form_parts<'a>(rating: &'a str, jenis_feedback: &'a str) -> Vec<Part<'a>> {
        vec![
            Part::Text("nama", "Wati"),
            Part::Text("email", ""),
            Part::Text("jenis_feedback", jenis_feedback),
            Part::Text("subjek", "Kebersihan"),
            Part::Text("pesan_feedback", "Lantai licin"),
            Part::Text("rating_kepuasan", rating),
        ]
    }

    fn post_form(parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/feedback")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_listing_with_filter_keeps_global_statistics() {
        let router = router_with(seeded_store(), PhotoStorageInfo::disabled());
        let (status, body) = get_json(router, "/get-feedback-data?jenis_feedback=saran").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["total_records"], json!(3));
        let ids: Vec<u64> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![5, 3, 1]);
        assert_eq!(body["data"][0]["subjek"], json!("Layanan"));
        assert_eq!(
            body["statistics"],
            json!({
                "total_feedback": 5,
                "average_rating": 3.8,
                "feedback_types": {"saran": 3, "keluhan": 2},
                "rating_distribution": {"2": 1, "3": 1, "4": 1, "5": 2},
            })
        );
        assert_eq!(
            body["filters_applied"],
            json!({"limit": 50, "jenis_feedback": "saran", "start_date": null, "end_date": null})
        );
    }

    #[tokio::test]
    async fn test_listing_date_range_and_limit() {
        let router = router_with(seeded_store(), PhotoStorageInfo::disabled());
        let (status, body) = get_json(
            router,
            "/get-feedback-data?start_date=2024-05-02&end_date=2024-05-04T23:59:59Z&limit=2",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let ids: Vec<u64> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![4, 3]);
        assert_eq!(body["total_records"], json!(2));
        assert_eq!(body["statistics"]["total_feedback"], json!(5));
    }

    #[tokio::test]
    async fn test_listing_limit_zero() {
        let router = router_with(seeded_store(), PhotoStorageInfo::disabled());
        let (status, body) = get_json(router, "/get-feedback-data?limit=0").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));
        assert_eq!(body["total_records"], json!(0));
        assert_eq!(body["statistics"]["total_feedback"], json!(5));
    }

    #[tokio::test]
    async fn test_listing_empty_table() {
        let router = router_with(
            Arc::new(InMemoryFeedbackStore::new()),
            PhotoStorageInfo::disabled(),
        );
        let (status, body) = get_json(router, "/get-feedback-data").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));
        assert_eq!(body["statistics"]["total_feedback"], json!(0));
        assert_eq!(body["statistics"]["average_rating"], Value::Null);
    }

    #[tokio::test]
    async fn test_listing_unparseable_limit_does_not_touch_store() {
        // No expectations, so any store call would panic
        let mock_db = MockFeedbackQueries::new();
        let router = router_with(Arc::new(mock_db), PhotoStorageInfo::disabled());
        let (status, body) = get_json(router, "/get-feedback-data?limit=semua").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({"success": false, "error": "Failed to fetch data"})
        );
    }

    #[tokio::test]
    async fn test_listing_store_failure() {
        let mut mock_db = MockFeedbackQueries::new();
        mock_db.expect_query_feedback().returning(|_| {
            Box::pin(async move {
                Err(Error::new(ErrorDetails::StoreConnection {
                    message: "connection reset".to_string(),
                }))
            })
        });
        mock_db
            .expect_query_feedback_statistics_rows()
            .returning(|| Box::pin(async move { Ok(vec![]) }));
        let router = router_with(Arc::new(mock_db), PhotoStorageInfo::disabled());
        let request = Request::builder()
            .uri("/get-feedback-data")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(router, request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_cors_headers(&headers);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body,
            json!({"success": false, "error": "Failed to fetch data"})
        );
    }

    #[tokio::test]
    async fn test_options_short_circuits() {
        let mock_db = MockFeedbackQueries::new();
        let router = router_with(Arc::new(mock_db), PhotoStorageInfo::disabled());
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/get-feedback-data")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_cors_headers(&headers);
    }

    #[tokio::test]
    async fn test_unknown_route_has_cors_headers() {
        let router = router_with(seeded_store(), PhotoStorageInfo::disabled());
        let request = Request::builder()
            .uri("/get-feedback")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(router, request).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_cors_headers(&headers);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn test_submit_valid_form() {
        let store = Arc::new(InMemoryFeedbackStore::new());
        let router = router_with(store.clone(), PhotoStorageInfo::disabled());
        let (status, headers, body) = send(router, post_form(&form_parts("4", "saran"))).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_cors_headers(&headers);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["status"], json!("menunggu"));
        assert_eq!(body["data"]["email"], Value::Null);
        assert_eq!(body["data"]["rating_kepuasan"], json!(4));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_submit_with_photo() {
        let store = Arc::new(InMemoryFeedbackStore::new());
        let photo_storage = PhotoStorageInfo::new_with_object_store(
            Arc::new(InMemory::new()),
            "http://localhost/photos".to_string(),
        );
        let router = router_with(store, photo_storage);
        let mut parts = form_parts("5", "pujian");
        parts.push(Part::File {
            name: "foto",
            file_name: "bukti.jpg",
            content_type: "image/jpeg",
            data: b"\xff\xd8\xff\xe0fake-jpeg",
        });
        let (status, _, body) = send(router, post_form(&parts)).await;

        assert_eq!(status, StatusCode::CREATED);
        let body: Value = serde_json::from_slice(&body).unwrap();
        let photo_url = body["data"]["photo_url"].as_str().unwrap();
        assert!(photo_url.starts_with("http://localhost/photos/"));
        assert!(photo_url.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_submit_empty_file_part_means_no_photo() {
        let store = Arc::new(InMemoryFeedbackStore::new());
        let router = router_with(store, PhotoStorageInfo::disabled());
        let mut parts = form_parts("3", "keluhan");
        parts.push(Part::File {
            name: "foto",
            file_name: "",
            content_type: "application/octet-stream",
            data: b"",
        });
        let (status, _, body) = send(router, post_form(&parts)).await;

        assert_eq!(status, StatusCode::CREATED);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["data"]["photo_url"], Value::Null);
    }

    #[tokio::test]
    async fn test_submit_rejections() {
        let cases: Vec<(Vec<Part<'_>>, StatusCode)> = vec![
            (form_parts("0", "saran"), StatusCode::BAD_REQUEST),
            (form_parts("6", "saran"), StatusCode::BAD_REQUEST),
            (form_parts("4", "kritik"), StatusCode::BAD_REQUEST),
            (
                {
                    let mut parts = form_parts("4", "saran");
                    parts.push(Part::Text("alamat", "Jl. Merdeka"));
                    parts
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                {
                    let mut parts = form_parts("4", "saran");
                    parts.push(Part::File {
                        name: "foto",
                        file_name: "anim.gif",
                        content_type: "image/gif",
                        data: b"GIF89a",
                    });
                    parts
                },
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
        ];
        for (parts, expected) in cases {
            let store = Arc::new(InMemoryFeedbackStore::new());
            let photo_storage = PhotoStorageInfo::new_with_object_store(
                Arc::new(InMemory::new()),
                "http://localhost/photos".to_string(),
            );
            let router = router_with(store.clone(), photo_storage);
            let (status, headers, body) = send(router, post_form(&parts)).await;

            assert_eq!(status, expected);
            assert_cors_headers(&headers);
            let body: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(body["success"], json!(false));
            assert!(body["error"].is_string());
            assert!(store.is_empty().await);
        }
    }

    #[tokio::test]
    async fn test_submit_photo_too_large() {
        let store = Arc::new(InMemoryFeedbackStore::new());
        let photo_storage = PhotoStorageInfo::new_with_object_store(
            Arc::new(InMemory::new()),
            "http://localhost/photos".to_string(),
        );
        let router = router_with(store.clone(), photo_storage);
        let photo = vec![0u8; 6 * 1024 * 1024];
        let mut parts = form_parts("4", "saran");
        parts.push(Part::File {
            name: "foto",
            file_name: "besar.png",
            content_type: "image/png",
            data: &photo,
        });
        let (status, _, _) = send(router, post_form(&parts)).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_submit_requires_multipart() {
        let router = router_with(seeded_store(), PhotoStorageInfo::disabled());
        let request = Request::builder()
            .method(Method::POST)
            .uri("/feedback")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"nama": "Wati"}"#))
            .unwrap();
        let (status, _, body) = send(router, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn test_health_route() {
        let router = router_with(seeded_store(), PhotoStorageInfo::disabled());
        let (status, body) = get_json(router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"gateway": "ok", "store": "ok"}));
    }
}
