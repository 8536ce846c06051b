use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::controller::ViewController;
use crate::error::WebError;
use crate::presentation::{PresentationState, VisitPresentation};
use crate::stream_session::SessionPair;
use crate::transport::LoopbackSession;
use crate::types::{CameraChannel, RenderState, StreamQuality, ViewMode};

/// One open live view page
pub struct LiveVisit {
    pub controller: ViewController,
    pub presentation: VisitPresentation,
    pub created_at: DateTime<Utc>,
}

pub type Visits = Arc<RwLock<HashMap<String, Arc<Mutex<LiveVisit>>>>>;

pub struct WebServerState {
    pub visits: Visits,
    pub config: AppConfig,
}

impl WebServerState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            visits: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ChannelRequest {
    /// Transport numbering, 1 = front, 2 = rear
    pub channel: u8,
}

#[derive(Serialize, Deserialize)]
pub struct ModeRequest {
    pub mode: ViewMode,
}

#[derive(Serialize, Deserialize)]
pub struct QualityRequest {
    /// 0 = HD main stream, 1 = SD sub stream
    pub quality: u8,
}

#[derive(Serialize, Deserialize)]
pub struct DeviceRequest {
    pub imei: String,
}

#[derive(Serialize, Deserialize, Default)]
pub struct ReconnectRequest {
    pub channel: Option<u8>,
}

#[derive(Serialize, Deserialize, Default)]
pub struct PipRequest {
    /// Surface to float; the active channel when absent
    pub channel: Option<u8>,
}

#[derive(Serialize, Deserialize)]
pub struct VisitResponse {
    pub visit_id: String,
    pub created_at: String,
    pub state: RenderState,
    pub presentation: PresentationState,
}

/// Create the web server router with all endpoints
pub fn create_web_router(state: Arc<WebServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/live/:imei", post(open_visit))
        .route("/api/live/visit/:visit_id", get(get_visit).delete(close_visit))
        .route("/api/live/visit/:visit_id/channel", post(switch_channel))
        .route("/api/live/visit/:visit_id/mode", post(switch_mode))
        .route("/api/live/visit/:visit_id/quality", post(switch_quality))
        .route("/api/live/visit/:visit_id/device", post(change_device))
        .route("/api/live/visit/:visit_id/reconnect", post(reconnect))
        .route("/api/live/visit/:visit_id/swap", post(swap_pip))
        .route("/api/live/visit/:visit_id/dismiss", post(dismiss_error))
        .route("/api/live/visit/:visit_id/fullscreen", post(toggle_fullscreen))
        .route("/api/live/visit/:visit_id/pip", post(toggle_pip))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the web API until the listener fails
pub async fn start_web_server(state: Arc<WebServerState>) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", state.config.web_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 Live view API listening on {}", addr);

    axum::serve(listener, create_web_router(state)).await?;
    Ok(())
}

/// Unmount every open visit so no stream outlives the server
pub async fn close_all_visits(visits: &Visits) {
    let drained: Vec<_> = visits.write().await.drain().collect();
    for (visit_id, visit) in drained {
        visit.lock().await.controller.unmount();
        info!("📴 Closed visit {} on shutdown", visit_id);
    }
}

fn envelope(message: &str, data: Value) -> Json<Value> {
    Json(json!({
        "code": 200,
        "message": message,
        "data": data
    }))
}

fn visit_json(visit_id: &str, visit: &LiveVisit) -> Result<Value, WebError> {
    let response = VisitResponse {
        visit_id: visit_id.to_string(),
        created_at: visit.created_at.to_rfc3339(),
        state: visit.controller.render_state(),
        presentation: visit.presentation.snapshot(),
    };
    Ok(serde_json::to_value(response)?)
}

async fn find_visit(state: &WebServerState, visit_id: &str) -> Result<Arc<Mutex<LiveVisit>>, WebError> {
    state
        .visits
        .read()
        .await
        .get(visit_id)
        .cloned()
        .ok_or_else(|| WebError::VisitNotFound(visit_id.to_string()))
}

fn parse_channel(id: u8) -> Result<CameraChannel, WebError> {
    CameraChannel::from_id(id).ok_or_else(|| WebError::InvalidChannel(id.to_string()))
}

async fn health() -> Json<Value> {
    envelope("OK", json!({ "timestamp": Utc::now().to_rfc3339() }))
}

/// Open the live view for a device: new controller, two fresh sessions
async fn open_visit(
    Path(imei): Path<String>,
    State(state): State<Arc<WebServerState>>,
) -> Result<Json<Value>, WebError> {
    let imei = imei.trim().to_string();
    if imei.is_empty() {
        return Err(WebError::MissingImei);
    }

    let visit_id = format!("{:016x}", rand::thread_rng().gen::<u64>());
    let timing = state.config.loopback_timing();
    let surfaces: Vec<String> = CameraChannel::ALL
        .iter()
        .map(|channel| format!("{}-{}", visit_id, channel))
        .collect();
    let sessions = SessionPair::new(
        Arc::new(LoopbackSession::new(surfaces[0].clone(), timing.clone())),
        Arc::new(LoopbackSession::new(surfaces[1].clone(), timing)),
    );

    let mut controller = ViewController::new(Some(imei.clone()), sessions, state.config.controller_config());
    controller.mount();
    info!("📺 Opened visit {} for {}", visit_id, imei);

    let visit = LiveVisit {
        controller,
        presentation: VisitPresentation::new(surfaces),
        created_at: Utc::now(),
    };
    let data = visit_json(&visit_id, &visit)?;
    state
        .visits
        .write()
        .await
        .insert(visit_id, Arc::new(Mutex::new(visit)));

    Ok(envelope("Live view opened", data))
}

async fn get_visit(
    Path(visit_id): Path<String>,
    State(state): State<Arc<WebServerState>>,
) -> Result<Json<Value>, WebError> {
    let visit = find_visit(&state, &visit_id).await?;
    let visit = visit.lock().await;
    Ok(envelope("OK", visit_json(&visit_id, &visit)?))
}

async fn close_visit(
    Path(visit_id): Path<String>,
    State(state): State<Arc<WebServerState>>,
) -> Result<Json<Value>, WebError> {
    let visit = state
        .visits
        .write()
        .await
        .remove(&visit_id)
        .ok_or_else(|| WebError::VisitNotFound(visit_id.clone()))?;

    let mut visit = visit.lock().await;
    visit.controller.unmount();
    info!("📴 Closed visit {}", visit_id);

    Ok(envelope("Live view closed", visit_json(&visit_id, &visit)?))
}

/// Run a command against one visit and return its new state
async fn with_visit<F>(
    state: &WebServerState,
    visit_id: &str,
    message: &str,
    command: F,
) -> Result<Json<Value>, WebError>
where
    F: FnOnce(&mut LiveVisit),
{
    let visit = find_visit(state, visit_id).await?;
    let mut visit = visit.lock().await;
    command(&mut *visit);
    Ok(envelope(message, visit_json(visit_id, &visit)?))
}

async fn switch_channel(
    Path(visit_id): Path<String>,
    State(state): State<Arc<WebServerState>>,
    Json(request): Json<ChannelRequest>,
) -> Result<Json<Value>, WebError> {
    let channel = parse_channel(request.channel)?;
    with_visit(&state, &visit_id, "Channel switched", |visit| {
        visit.controller.switch_channel(channel)
    })
    .await
}

async fn switch_mode(
    Path(visit_id): Path<String>,
    State(state): State<Arc<WebServerState>>,
    Json(request): Json<ModeRequest>,
) -> Result<Json<Value>, WebError> {
    with_visit(&state, &visit_id, "View mode switched", |visit| {
        visit.controller.switch_view_mode(request.mode)
    })
    .await
}

async fn switch_quality(
    Path(visit_id): Path<String>,
    State(state): State<Arc<WebServerState>>,
    Json(request): Json<QualityRequest>,
) -> Result<Json<Value>, WebError> {
    let quality = StreamQuality::from_stream_type(request.quality)
        .ok_or_else(|| WebError::InvalidQuality(request.quality.to_string()))?;
    with_visit(&state, &visit_id, "Quality switched", |visit| {
        visit.controller.switch_quality(quality)
    })
    .await
}

/// The hosting route now points at another device
async fn change_device(
    Path(visit_id): Path<String>,
    State(state): State<Arc<WebServerState>>,
    Json(request): Json<DeviceRequest>,
) -> Result<Json<Value>, WebError> {
    let imei = request.imei.trim().to_string();
    if imei.is_empty() {
        return Err(WebError::MissingImei);
    }
    with_visit(&state, &visit_id, "Device changed", |visit| {
        visit.controller.set_imei(Some(imei))
    })
    .await
}

async fn reconnect(
    Path(visit_id): Path<String>,
    State(state): State<Arc<WebServerState>>,
    request: Option<Json<ReconnectRequest>>,
) -> Result<Json<Value>, WebError> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let channel = request.channel.map(parse_channel).transpose()?;

    with_visit(&state, &visit_id, "Reconnect requested", |visit| match channel {
        Some(channel) => visit.controller.reconnect(channel),
        None => visit.controller.reconnect_active(),
    })
    .await
}

async fn swap_pip(
    Path(visit_id): Path<String>,
    State(state): State<Arc<WebServerState>>,
) -> Result<Json<Value>, WebError> {
    with_visit(&state, &visit_id, "Picture-in-picture swapped", |visit| {
        if visit.controller.view_mode() != ViewMode::PictureInPicture {
            warn!("Swap requested outside picture-in-picture mode");
        }
        visit.controller.swap_pip_channels()
    })
    .await
}

async fn dismiss_error(
    Path(visit_id): Path<String>,
    State(state): State<Arc<WebServerState>>,
) -> Result<Json<Value>, WebError> {
    with_visit(&state, &visit_id, "Error dismissed", |visit| {
        visit.controller.dismiss_error()
    })
    .await
}

async fn toggle_fullscreen(
    Path(visit_id): Path<String>,
    State(state): State<Arc<WebServerState>>,
) -> Result<Json<Value>, WebError> {
    with_visit(&state, &visit_id, "Fullscreen toggled", |visit| {
        visit.controller.toggle_fullscreen(&visit.presentation)
    })
    .await
}

async fn toggle_pip(
    Path(visit_id): Path<String>,
    State(state): State<Arc<WebServerState>>,
    request: Option<Json<PipRequest>>,
) -> Result<Json<Value>, WebError> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let channel = request.channel.map(parse_channel).transpose()?;

    with_visit(&state, &visit_id, "Picture-in-picture toggled", |visit| {
        let channel = channel.unwrap_or(visit.controller.active_channel());
        visit.controller.toggle_pip(&visit.presentation, channel)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<WebServerState>) {
        let state = Arc::new(WebServerState::new(AppConfig::default()));
        (create_web_router(state.clone()), state)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                request = request.header("content-type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn open(app: &Router) -> String {
        let (status, json) = call(app, "POST", "/api/live/860000000000001", None).await;
        assert_eq!(status, StatusCode::OK);
        json["data"]["visit_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let (status, json) = call(&app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["code"], 200);
    }

    #[tokio::test]
    async fn test_open_visit_mounts_controller() {
        let (app, state) = app();
        let (status, json) = call(&app, "POST", "/api/live/860000000000001", None).await;

        assert_eq!(status, StatusCode::OK);
        let data = &json["data"];
        assert_eq!(data["state"]["phase"], "ready");
        assert_eq!(data["state"]["view_mode"], "single");
        assert_eq!(data["state"]["active_channel"], "front");
        assert_eq!(data["state"]["imei"], "860000000000001");
        assert_eq!(state.visits.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_imei_is_rejected() {
        let (app, state) = app();
        let (status, json) = call(&app, "POST", "/api/live/%20", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], 400);
        assert!(state.visits.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_commands_update_render_state() {
        let (app, _) = app();
        let visit_id = open(&app).await;
        let base = format!("/api/live/visit/{}", visit_id);

        let (status, json) = call(&app, "POST", &format!("{}/mode", base), Some(json!({"mode": "picture_in_picture"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["state"]["view_mode"], "picture_in_picture");

        let (_, json) = call(&app, "POST", &format!("{}/swap", base), None).await;
        assert_eq!(json["data"]["state"]["active_channel"], "rear");

        let (_, json) = call(&app, "POST", &format!("{}/quality", base), Some(json!({"quality": 1}))).await;
        assert_eq!(json["data"]["state"]["quality"], "sd");
        assert_eq!(json["data"]["state"]["restart_pending"], true);

        let (_, json) = call(&app, "POST", &format!("{}/channel", base), Some(json!({"channel": 1}))).await;
        assert_eq!(json["data"]["state"]["active_channel"], "front");

        let (status, _) = call(&app, "POST", &format!("{}/reconnect", base), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, "POST", &format!("{}/dismiss", base), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_presentation_toggles() {
        let (app, _) = app();
        let visit_id = open(&app).await;
        let base = format!("/api/live/visit/{}", visit_id);

        let (status, json) = call(&app, "POST", &format!("{}/fullscreen", base), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["presentation"]["fullscreen"], true);

        let (_, json) = call(&app, "POST", &format!("{}/pip", base), Some(json!({"channel": 2}))).await;
        assert_eq!(
            json["data"]["presentation"]["pip_surface"],
            format!("{}-rear", visit_id)
        );

        let (_, json) = call(&app, "POST", &format!("{}/pip", base), None).await;
        assert_eq!(
            json["data"]["presentation"]["pip_surface"],
            format!("{}-front", visit_id)
        );

        let (_, json) = call(&app, "POST", &format!("{}/fullscreen", base), None).await;
        assert_eq!(json["data"]["presentation"]["fullscreen"], false);
        assert_eq!(json["data"]["state"]["phase"], "ready");
    }

    #[tokio::test]
    async fn test_reconnect_of_hidden_channel_raises_no_error() {
        let (app, _) = app();
        let visit_id = open(&app).await;
        let uri = format!("/api/live/visit/{}/reconnect", visit_id);

        let (status, json) = call(&app, "POST", &uri, Some(json!({"channel": 2}))).await;

        assert_eq!(status, StatusCode::OK);
        assert!(json["data"]["state"]["error"].is_null());
        assert!(json["data"]["state"]["rear"]["error"].is_null());
        assert_eq!(json["data"]["state"]["rear"]["isConnected"], false);
    }

    #[tokio::test]
    async fn test_change_device_remounts() {
        let (app, _) = app();
        let visit_id = open(&app).await;
        let uri = format!("/api/live/visit/{}/device", visit_id);

        let (status, json) = call(&app, "POST", &uri, Some(json!({"imei": "860000000000002"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["state"]["imei"], "860000000000002");
        assert_eq!(json["data"]["state"]["phase"], "ready");

        let (status, _) = call(&app, "POST", &uri, Some(json!({"imei": " "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_channel_and_quality() {
        let (app, _) = app();
        let visit_id = open(&app).await;
        let base = format!("/api/live/visit/{}", visit_id);

        let (status, json) = call(&app, "POST", &format!("{}/channel", base), Some(json!({"channel": 3}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "invalid channel: 3");

        let (status, _) = call(&app, "POST", &format!("{}/quality", base), Some(json!({"quality": 7}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "POST", &format!("{}/reconnect", base), Some(json!({"channel": 9}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_visit_is_not_found() {
        let (app, _) = app();
        let (status, json) = call(&app, "GET", "/api/live/visit/nope", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["code"], 404);
    }

    #[tokio::test]
    async fn test_close_visit_unmounts_and_forgets() {
        let (app, state) = app();
        let visit_id = open(&app).await;
        let uri = format!("/api/live/visit/{}", visit_id);

        let (status, json) = call(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["state"]["phase"], "uninitialized");
        assert!(state.visits.read().await.is_empty());

        let (status, _) = call(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_close_all_visits() {
        let (app, state) = app();
        open(&app).await;
        open(&app).await;

        close_all_visits(&state.visits).await;

        assert!(state.visits.read().await.is_empty());
    }
}
