// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! HTTP 处理函数

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{ApiError, ApiResult};
use super::mjpeg;
use super::AppState;
use crate::config::StatusCount;
use crate::geometry::Point;
use crate::pipeline::PipelineState;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    /// 稳定计数或原始计数 (由 `--status-count` 决定)
    pub count: u32,
    pub ts: f64,
    pub raw: u32,
    pub stable: u32,
    pub armed: bool,
}

/// GET /status
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let s = state.pipeline.status();
    let count = match state.config.status_count {
        StatusCount::Stable => s.stable_count,
        StatusCount::Raw => s.raw_count,
    };
    Json(StatusResponse {
        count,
        ts: s.timestamp,
        raw: s.raw_count,
        stable: s.stable_count,
        armed: state.pipeline.state() == PipelineState::Armed,
    })
}

/// GET /video
pub async fn video(State(state): State<AppState>) -> Response {
    let stream = mjpeg::frame_stream(
        state.pipeline.subscribe_frames(),
        state.config.stream_quality,
    );
    (
        [
            (header::CONTENT_TYPE, mjpeg::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
            (header::PRAGMA, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// GET /snapshot
pub async fn snapshot(State(state): State<AppState>) -> ApiResult<Response> {
    let frame = state
        .pipeline
        .latest_frame()
        .filter(|f| !f.placeholder)
        .ok_or_else(|| ApiError::unavailable("no camera frame"))?;

    let jpeg = mjpeg::encode_frame(frame, state.config.snapshot_quality).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        jpeg,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub frame_number: u64,
    pub camera: bool,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let frame = state.pipeline.latest_frame();
    Json(HealthResponse {
        status: "ok",
        frame_number: frame.as_ref().map(|f| f.frame_number).unwrap_or(0),
        camera: frame.map(|f| !f.placeholder).unwrap_or(false),
    })
}

#[derive(Debug, Deserialize)]
pub struct ZoneRequest {
    pub points: Vec<[i32; 2]>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ZoneResponse {
    pub state: PipelineState,
    pub points: Vec<[i32; 2]>,
}

impl ZoneResponse {
    fn from_state(state: &AppState) -> Self {
        Self {
            state: state.pipeline.state(),
            points: state.pipeline.zone().iter().map(|p| [p.x, p.y]).collect(),
        }
    }
}

/// GET /zone
pub async fn get_zone(State(state): State<AppState>) -> Json<ZoneResponse> {
    Json(ZoneResponse::from_state(&state))
}

/// POST /zone: 替换区域并启用
pub async fn set_zone(
    State(state): State<AppState>,
    Json(req): Json<ZoneRequest>,
) -> ApiResult<Json<ZoneResponse>> {
    let points: Vec<Point> = req.points.into_iter().map(Point::from).collect();
    let n = state.pipeline.replace_zone(points.clone()).await?;
    info!("🌐 区域已通过 HTTP 设置: {} 个点", n);

    // 回复以驱动器确认的结果为准,不等待 watch 传播
    let mut closed: Vec<[i32; 2]> = points.iter().map(|p| [p.x, p.y]).collect();
    if closed.len() < n {
        if let Some(&first) = closed.first() {
            closed.push(first);
        }
    }
    Ok(Json(ZoneResponse {
        state: PipelineState::Armed,
        points: closed,
    }))
}

/// DELETE /zone: 清空区域
pub async fn clear_zone(State(state): State<AppState>) -> ApiResult<Json<ZoneResponse>> {
    state.pipeline.reset()?;
    info!("🌐 区域已通过 HTTP 重置");
    Ok(Json(ZoneResponse {
        state: PipelineState::Idle,
        points: Vec::new(),
    }))
}
