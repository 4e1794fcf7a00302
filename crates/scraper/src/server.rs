// ABOUTME: HTTP service exposing async and sync scraping, job polling and health over axum.
// ABOUTME: JSON bodies are camelCase; a background task prunes expired jobs and cache entries.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::jobs::JobStatus;
use crate::orchestrator::{Orchestrator, ScrapeRequest};
use crate::record::ProductRecord;

/// How often expired jobs and cache entries are swept.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Accepted {
    job_id: Uuid,
    status: JobStatus,
    url: String,
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ProductRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Error reply with a status code and `{error}` body.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Builds the service router.
pub fn create_router(orchestrator: Orchestrator) -> Router {
    Router::new()
        .route("/api/scrape", post(scrape_async))
        .route("/api/scrape/sync", post(scrape_sync))
        .route("/api/job/:job_id", get(get_job))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(orchestrator)
}

/// Serves the router on `addr` until the process exits.
pub async fn serve(orchestrator: Orchestrator, addr: SocketAddr) -> anyhow::Result<()> {
    spawn_pruner(orchestrator.clone(), PRUNE_INTERVAL);

    let app = create_router(orchestrator);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting server at http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_pruner(orchestrator: Orchestrator, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            orchestrator.prune().await;
        }
    })
}

async fn scrape_async(
    State(orchestrator): State<Orchestrator>,
    body: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;

    let job = orchestrator
        .submit(request)
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.detail()))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            job_id: job.id,
            status: job.status,
            url: job.url,
        }),
    ))
}

async fn get_job(
    State(orchestrator): State<Orchestrator>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = Uuid::parse_str(&job_id)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "invalid job id"))?;
    orchestrator
        .get_job(&id)
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "job not found"))
}

async fn scrape_sync(
    State(orchestrator): State<Orchestrator>,
    body: Result<Json<ScrapeRequest>, JsonRejection>,
) -> (StatusCode, Json<SyncResponse>) {
    let failure = |status: StatusCode, error: String| {
        (
            status,
            Json(SyncResponse {
                success: false,
                result: None,
                error: Some(error),
            }),
        )
    };

    let request = match body {
        Ok(Json(request)) => request,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.body_text()),
    };

    match orchestrator.scrape_sync(request, None).await {
        Ok(record) => (
            StatusCode::OK,
            Json(SyncResponse {
                success: true,
                result: Some(record),
                error: None,
            }),
        ),
        Err(e) => match e.code {
            _ if e.is_sync_timeout() => {
                failure(StatusCode::GATEWAY_TIMEOUT, "timeout".to_string())
            }
            ErrorCode::InvalidRequest => failure(StatusCode::BAD_REQUEST, e.detail()),
            _ => failure(StatusCode::BAD_GATEWAY, e.detail()),
        },
    }
}

async fn health(State(orchestrator): State<Orchestrator>) -> impl IntoResponse {
    Json(orchestrator.health().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Availability, Document, FetchBackend};
    use crate::error::ScrapeError;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    const PRODUCT_HTML: &str = r#"<html><head><title>Walnut Desk Lamp</title>
        <meta property="og:image" content="/img/lamp.jpg"></head>
        <body><h1>Walnut Desk Lamp</h1><span class="price">$49.99</span></body></html>"#;

    struct StaticBackend {
        html: Option<&'static str>,
        delay: Duration,
    }

    #[async_trait]
    impl FetchBackend for StaticBackend {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn availability(&self) -> Availability {
            Availability::up()
        }

        async fn fetch(&self, url: &str) -> Result<Document, ScrapeError> {
            tokio::time::sleep(self.delay).await;
            match self.html {
                Some(html) => Ok(Document {
                    url: url.to_string(),
                    final_url: url.to_string(),
                    status: 200,
                    html: html.to_string(),
                }),
                None => Err(ScrapeError::backend_unavailable(
                    url,
                    "StaticFetch",
                    Some(anyhow::anyhow!("no browser")),
                )),
            }
        }
    }

    fn app(light: Option<&'static str>, delay: Duration) -> Router {
        let orchestrator = Orchestrator::builder()
            .light_backend(Arc::new(StaticBackend { html: light, delay }))
            .heavy_backend(Arc::new(StaticBackend {
                html: None,
                delay: Duration::ZERO,
            }))
            .sync_wait(Duration::from_millis(200))
            .build();
        create_router(orchestrator)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn scrape_returns_accepted_job() {
        let app = app(Some(PRODUCT_HTML), Duration::ZERO);
        let response = app
            .oneshot(post_json("/api/scrape", json!({"url": "https://shop.test/p/1"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = json_body(response).await;
        assert_eq!(json["status"], "processing");
        assert_eq!(json["url"], "https://shop.test/p/1");
        assert!(Uuid::parse_str(json["jobId"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn scrape_rejects_invalid_url() {
        let app = app(Some(PRODUCT_HTML), Duration::ZERO);
        let response = app
            .oneshot(post_json("/api/scrape", json!({"url": "not a url"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn job_lookup_statuses() {
        let app = app(Some(PRODUCT_HTML), Duration::ZERO);

        let missing = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/job/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let malformed = app
            .oneshot(
                Request::builder()
                    .uri("/api/job/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn submitted_job_can_be_polled() {
        let app = app(Some(PRODUCT_HTML), Duration::ZERO);
        let accepted = app
            .clone()
            .oneshot(post_json("/api/scrape", json!({"url": "https://shop.test/p/2"})))
            .await
            .unwrap();
        let job_id = json_body(accepted).await["jobId"].as_str().unwrap().to_string();

        let mut status = String::new();
        for _ in 0..50 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(format!("/api/job/{}", job_id))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let json = json_body(response).await;
            status = json["status"].as_str().unwrap().to_string();
            if status != "processing" {
                assert_eq!(json["result"]["title"], "Walnut Desk Lamp");
                assert_eq!(json["result"]["extractionMethod"], "light");
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, "completed");
    }

    #[tokio::test]
    async fn sync_scrape_returns_record() {
        let app = app(Some(PRODUCT_HTML), Duration::ZERO);
        let response = app
            .oneshot(post_json("/api/scrape/sync", json!({"url": "https://shop.test/p/3"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["result"]["price"], 49.99);
        assert_eq!(json["result"]["image"], "https://shop.test/img/lamp.jpg");
    }

    #[tokio::test]
    async fn sync_scrape_times_out_with_504() {
        let app = app(Some(PRODUCT_HTML), Duration::from_secs(5));
        let response = app
            .oneshot(post_json("/api/scrape/sync", json!({"url": "https://shop.test/slow"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let json = json_body(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "timeout");
    }

    #[tokio::test]
    async fn job_timeout_within_sync_wait_is_502() {
        let orchestrator = Orchestrator::builder()
            .light_backend(Arc::new(StaticBackend {
                html: Some(PRODUCT_HTML),
                delay: Duration::from_secs(5),
            }))
            .pipeline_timeout(Duration::from_millis(50))
            .sync_wait(Duration::from_secs(2))
            .build();
        let response = create_router(orchestrator)
            .oneshot(post_json("/api/scrape/sync", json!({"url": "https://shop.test/p/5"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(json_body(response).await["error"], "timeout");
    }

    #[tokio::test]
    async fn sync_scrape_failure_is_502() {
        let blocked = "<html><head><title>Robot Check</title></head></html>";
        let app = app(Some(blocked), Duration::ZERO);
        let response = app
            .oneshot(post_json("/api/scrape/sync", json!({"url": "https://shop.test/p/4"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = json_body(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "heavy backend unavailable: no browser");
    }

    #[tokio::test]
    async fn health_reports_backends() {
        let app = app(None, Duration::ZERO);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "wist-scraper");
        assert_eq!(json["backends"]["light"]["available"], true);
    }
}
