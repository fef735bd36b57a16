// Control API: JSON over HTTP in front of the supervisor and the wifi scanner

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::error::{SupervisorError, WifiScanError};
use crate::supervisor::{StartRequest, Supervisor};
use crate::wifi::{Network, WifiScanner};

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub wifi: Arc<WifiScanner>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/start", post(start))
        .route("/stop", get(stop))
        .route("/status", get(status))
        .route("/scan-wifi", get(scan_wifi))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct StartBody {
    #[serde(alias = "whip_server_url", alias = "janus_endpoint")]
    pub endpoint_base_url: String,
    pub room: String,
    pub board_cam_display: String,
    pub player_cam_display: String,
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub room: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NetworksBody {
    pub networks: Vec<Network>,
}

/// Error response: `{message}` plus the active room for conflicts.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    room: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    room: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
            room: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            message: self.message,
            room: self.room,
        });
        (self.status, body).into_response()
    }
}

impl From<SupervisorError> for ApiError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::AlreadyStreaming { room } => ApiError {
                status: StatusCode::UNAUTHORIZED,
                message: "Already streaming".to_owned(),
                room: Some(room),
            },
            SupervisorError::NotStreaming => ApiError::new(StatusCode::CONFLICT, "Not streaming"),
            SupervisorError::Busy { phase } => {
                ApiError::new(StatusCode::CONFLICT, format!("Session is {phase}"))
            }
            SupervisorError::Registration(err) => {
                log::error!("Endpoint registration failed: {err}");
                ApiError::new(StatusCode::BAD_GATEWAY, "Failed to register endpoints")
            }
        }
    }
}

impl From<WifiScanError> for ApiError {
    fn from(err: WifiScanError) -> Self {
        log::error!("Wifi scan failed: {err}");
        match err {
            WifiScanError::Interfaces(_) | WifiScanError::NoInterfaces => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "No wireless interfaces found or error occurred.",
            ),
            WifiScanError::Scan { .. } => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to scan networks.")
            }
        }
    }
}

async fn start(
    State(state): State<AppState>,
    Json(body): Json<StartBody>,
) -> Result<StatusCode, ApiError> {
    state
        .supervisor
        .start(StartRequest {
            endpoint_base_url: body.endpoint_base_url,
            room: body.room,
            board_label: body.board_cam_display,
            player_label: body.player_cam_display,
        })
        .await?;
    Ok(StatusCode::OK)
}

async fn stop(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.supervisor.stop().await?;
    Ok(StatusCode::OK)
}

async fn status(State(state): State<AppState>) -> Json<StatusBody> {
    Json(StatusBody {
        room: state.supervisor.status().await,
    })
}

async fn scan_wifi(State(state): State<AppState>) -> Result<Json<NetworksBody>, ApiError> {
    let networks = state.wifi.scan_networks().await?;
    Ok(Json(NetworksBody { networks }))
}
