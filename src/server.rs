//! Sign Station HTTP server
//!
//! Every response uses the `{code, message, result}` envelope except
//! `/nft/verify`, which answers with a bare verification outcome. Failures
//! are logged and normalized to the "invalid key" envelope; internal error
//! details never reach the client.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::callback::Resolution;
use crate::config::ServerConfig;
use crate::error::ServiceError;
use crate::nft::VerifyOutcome;
use crate::request::RequestStatus;
use crate::station::Station;

const BODY_LIMIT: usize = 10 * 1024 * 1024;

const CODE_SUCCESS: i32 = 0;
const CODE_INVALID_KEY: i32 = 1;

pub struct AppState {
    pub station: Arc<Station>,
    pub started_at: Instant,
}

pub fn create_router(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/nft/requests/:request_key", get(nft_status_handler))
        .route("/nft/sign/login", post(nft_login_handler))
        .route("/nft/sign/mint", post(nft_mint_handler))
        .route("/nft/callback", post(nft_callback_handler))
        .route("/nft/verify", post(nft_verify_handler))
        .route("/nft/:dapp_nft_id", get(nft_draft_handler))
        .route("/gallery", post(gallery_submit_handler))
        .route("/gallery/requests/:request_key", get(gallery_status_handler))
        .route("/gallery/sign/login", post(gallery_login_handler))
        .route("/gallery/latest", get(gallery_latest_handler))
        .route("/gallery/latest/featured", get(gallery_featured_handler))
        .route("/gallery/:address", get(my_gallery_handler))
        .layer(middleware::from_fn(log_requests))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
}

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub code: i32,
    pub message: String,
    pub result: Value,
}

fn success<T: Serialize>(result: T) -> Json<Envelope> {
    match serde_json::to_value(result) {
        Ok(result) => Json(Envelope {
            code: CODE_SUCCESS,
            message: "success".to_string(),
            result,
        }),
        Err(e) => {
            warn!("Failed to serialize response: {}", e);
            invalid_key()
        }
    }
}

fn invalid_key() -> Json<Envelope> {
    Json(Envelope {
        code: CODE_INVALID_KEY,
        message: "invalid key".to_string(),
        result: json!({}),
    })
}

fn respond<T: Serialize>(route: &str, outcome: Result<T, ServiceError>) -> Json<Envelope> {
    match outcome {
        Ok(result) => success(result),
        Err(e) => {
            warn!("{} failed: {}", route, e);
            invalid_key()
        }
    }
}

fn parse_body<T>(route: &str, payload: Result<Json<T>, JsonRejection>) -> Option<T> {
    match payload {
        Ok(Json(value)) => Some(value),
        Err(e) => {
            warn!("{} rejected body: {}", route, e);
            None
        }
    }
}

// ============================================================================
// Request logging
// ============================================================================

/// Status polling and feed reads are too frequent to log
fn is_quiet_route(path: &str) -> bool {
    path.contains("/requests/") || path.starts_with("/gallery/latest")
}

async fn log_requests(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if is_quiet_route(&path) {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let start = Instant::now();
    info!("--> {} {}", method, path);

    let response = next.run(request).await;

    info!(
        "<-- {} {} {} {}ms",
        method,
        path,
        response.status().as_u16(),
        start.elapsed().as_millis()
    );
    response
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}

async fn nft_status_handler(
    State(state): State<Arc<AppState>>,
    Path(request_key): Path<String>,
) -> Json<Envelope> {
    respond("nft status", state.station.nft.status(&request_key).await)
}

async fn nft_draft_handler(
    State(state): State<Arc<AppState>>,
    Path(dapp_nft_id): Path<String>,
) -> Json<Envelope> {
    let draft = state
        .station
        .nft
        .nft(&dapp_nft_id)
        .await
        .and_then(|draft| draft.ok_or(ServiceError::RequestNotFound));
    respond("nft draft", draft)
}

async fn nft_login_handler(State(state): State<Arc<AppState>>) -> Json<Envelope> {
    respond("nft login", state.station.nft.login_qr().await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintBody {
    pub signer: String,
    #[serde(default)]
    pub nft_image: String,
    pub nft_name: String,
    #[serde(default)]
    pub nft_description: String,
}

async fn nft_mint_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MintBody>, JsonRejection>,
) -> Json<Envelope> {
    let Some(body) = parse_body("nft mint", payload) else {
        return invalid_key();
    };
    respond(
        "nft mint",
        state
            .station
            .nft
            .mint_qr(&body.signer, &body.nft_image, &body.nft_name, &body.nft_description)
            .await,
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackBody {
    pub request_key: String,
    pub approve: bool,
    #[serde(default)]
    pub sign_data: Value,
}

fn resolution_status(resolution: Resolution) -> RequestStatus {
    match resolution {
        Resolution::Success => RequestStatus::Success,
        Resolution::Invalid => RequestStatus::Invalid,
        Resolution::AlreadyResolved(status) => status,
    }
}

async fn nft_callback_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CallbackBody>, JsonRejection>,
) -> Json<Envelope> {
    let Some(body) = parse_body("nft callback", payload) else {
        return invalid_key();
    };
    let outcome = state
        .station
        .nft
        .callback(&body.request_key, body.approve, &body.sign_data)
        .await
        .map(|resolution| json!({ "status": resolution_status(resolution).code() }));
    respond("nft callback", outcome)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyBody {
    #[serde(default)]
    pub request_key: String,
    #[serde(default)]
    pub signature: String,
}

async fn nft_verify_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VerifyBody>, JsonRejection>,
) -> Json<VerifyOutcome> {
    let Some(body) = parse_body("nft verify", payload) else {
        return Json(VerifyOutcome {
            request_key: String::new(),
            signature: String::new(),
            is_valid: false,
        });
    };
    Json(
        state
            .station
            .nft
            .verify(&body.request_key, &body.signature)
            .await,
    )
}

async fn gallery_status_handler(
    State(state): State<Arc<AppState>>,
    Path(request_key): Path<String>,
) -> Json<Envelope> {
    respond("gallery status", state.station.gallery.status(&request_key).await)
}

async fn gallery_login_handler(State(state): State<Arc<AppState>>) -> Json<Envelope> {
    respond("gallery login", state.station.gallery.login_qr().await)
}

async fn gallery_latest_handler(State(state): State<Arc<AppState>>) -> Json<Envelope> {
    respond("gallery latest", state.station.gallery.latest().await)
}

async fn gallery_featured_handler(State(state): State<Arc<AppState>>) -> Json<Envelope> {
    respond(
        "gallery featured",
        state.station.gallery.latest_featured().await,
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryBody {
    pub signer: String,
    pub nft_id: String,
    #[serde(default)]
    pub code: String,
}

async fn gallery_submit_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GalleryBody>, JsonRejection>,
) -> Json<Envelope> {
    let Some(body) = parse_body("gallery submit", payload) else {
        return invalid_key();
    };
    let outcome = state
        .station
        .gallery
        .submit(&body.signer, &body.nft_id, &body.code)
        .await
        .map(|_| json!({}));
    respond("gallery submit", outcome)
}

async fn my_gallery_handler(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Json<Envelope> {
    respond("my gallery", state.station.gallery.my_gallery(&address).await)
}

/// Run the server until `shutdown` resolves
pub async fn run_server(
    config: &ServerConfig,
    station: Arc<Station>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState {
        station,
        started_at: Instant::now(),
    });

    let app = create_router(state, &config.allowed_origins);
    let addr = format!("{}:{}", config.host, config.port);

    info!("Starting Sign Station server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{station, FakeLedger};
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<Station>, Arc<FakeLedger>) {
        let (station, ledger, _) = station();
        let station = Arc::new(station);
        let state = Arc::new(AppState {
            station: station.clone(),
            started_at: Instant::now(),
        });
        (create_router(state, &[]), station, ledger)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = HttpRequest::builder().method(method).uri(uri);
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
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_quiet_routes() {
        assert!(is_quiet_route("/nft/requests/abc"));
        assert!(is_quiet_route("/gallery/requests/abc"));
        assert!(is_quiet_route("/gallery/latest"));
        assert!(is_quiet_route("/gallery/latest/featured"));
        assert!(!is_quiet_route("/nft/callback"));
        assert!(!is_quiet_route("/gallery/addr1"));
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, _) = app();
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["healthy"], true);
    }

    #[tokio::test]
    async fn test_login_then_poll() {
        let (app, _, _) = app();
        let (_, body) = call(&app, Method::POST, "/nft/sign/login", None).await;
        assert_eq!(body["code"], 0);
        assert_eq!(body["message"], "success");
        let key = body["result"]["requestKey"].as_str().unwrap().to_string();
        assert_eq!(body["result"]["qrcode"], format!("station://{}", key));

        let (_, body) = call(&app, Method::GET, &format!("/nft/requests/{}", key), None).await;
        assert_eq!(body["code"], 0);
        assert_eq!(body["result"]["status"], 0);
        assert_eq!(body["result"]["type"], "LOGIN");

        let (_, body) = call(&app, Method::GET, "/gallery/requests/unknown", None).await;
        assert_eq!(body["code"], 0);
        assert_eq!(body["result"]["status"], -1);
    }

    #[tokio::test]
    async fn test_callback_flow() {
        let (app, station, _) = app();
        let key = station
            .requests
            .open(crate::request::RequestKind::Login, "m1", "", "")
            .await
            .unwrap();

        let (_, body) = call(
            &app,
            Method::POST,
            "/nft/callback",
            Some(json!({
                "requestKey": key,
                "approve": true,
                "signData": { "address": "A", "rawData": "{\"pubkey\":\"PK\"}" }
            })),
        )
        .await;
        assert_eq!(body["code"], 0);
        assert_eq!(body["result"]["status"], 1);

        let (_, body) = call(&app, Method::GET, &format!("/nft/requests/{}", key), None).await;
        assert_eq!(body["result"]["signer"], "A");
    }

    #[tokio::test]
    async fn test_failures_are_normalized() {
        let (app, _, _) = app();

        let (status, body) = call(
            &app,
            Method::POST,
            "/nft/callback",
            Some(json!({ "requestKey": "missing", "approve": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "code": 1, "message": "invalid key", "result": {} }));

        let (_, body) = call(&app, Method::POST, "/nft/callback", Some(json!({ "bogus": 1 }))).await;
        assert_eq!(body["code"], 1);

        let (_, body) = call(&app, Method::GET, "/nft/unknown-draft", None).await;
        assert_eq!(body["code"], 1);

        let (_, body) = call(
            &app,
            Method::POST,
            "/nft/sign/mint",
            Some(json!({ "signer": "stranger", "nftName": "Cat" })),
        )
        .await;
        assert_eq!(body["code"], 1);
    }

    #[tokio::test]
    async fn test_verify_is_bare() {
        let (app, _, ledger) = app();
        ledger.set_verify(Ok(true));

        let (_, body) = call(
            &app,
            Method::POST,
            "/nft/verify",
            Some(json!({ "requestKey": "missing", "signature": "sig" })),
        )
        .await;
        assert_eq!(
            body,
            json!({ "requestKey": "missing", "signature": "sig", "isValid": false })
        );
    }

    #[tokio::test]
    async fn test_gallery_routes() {
        let (app, _, _) = app();

        let (_, body) = call(
            &app,
            Method::POST,
            "/gallery",
            Some(json!({ "signer": "A", "nftId": "n1", "code": "1" })),
        )
        .await;
        assert_eq!(body["code"], 0);

        let (_, body) = call(&app, Method::GET, "/gallery/latest", None).await;
        assert_eq!(body["result"]["nftList"][0]["nftId"], "n1");

        let (_, body) = call(&app, Method::GET, "/gallery/latest/featured", None).await;
        assert_eq!(body["result"]["nftList"].as_array().unwrap().len(), 1);

        let (_, body) = call(&app, Method::GET, "/gallery/A", None).await;
        assert_eq!(body["result"], json!({ "nftIdList": ["n1"], "rewarded": true }));
    }
}
