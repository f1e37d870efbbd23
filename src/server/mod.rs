// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! HTTP 服务 (axum)
//!
//! - GET    /status    最新计数 `{ count, ts, raw, stable, armed }`
//! - GET    /video     MJPEG 推流 (multipart/x-mixed-replace)
//! - GET    /snapshot  最新标注帧 JPEG
//! - GET    /health    存活检查
//! - GET    /zone      当前区域
//! - POST   /zone      替换并启用区域 `{ "points": [[x, y], ...] }`
//! - DELETE /zone      清空区域

pub mod error;
pub mod handlers;
pub mod mjpeg;

use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{HttpArgs, StatusCount};
use crate::pipeline::PipelineHandle;

pub use error::{ApiError, ApiResult};

/// 服务参数
#[derive(Clone, Copy, Debug)]
pub struct ServerConfig {
    pub stream_quality: u8,
    pub snapshot_quality: u8,
    pub status_count: StatusCount,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            stream_quality: 80,
            snapshot_quality: 85,
            status_count: StatusCount::Stable,
        }
    }
}

impl From<&HttpArgs> for ServerConfig {
    fn from(args: &HttpArgs) -> Self {
        Self {
            stream_quality: args.stream_quality,
            snapshot_quality: args.snapshot_quality,
            status_count: args.status_count,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: PipelineHandle,
    pub config: ServerConfig,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(handlers::status))
        .route("/video", get(handlers::video))
        .route("/snapshot", get(handlers::snapshot))
        .route("/health", get(handlers::health))
        .route(
            "/zone",
            get(handlers::get_zone)
                .post(handlers::set_zone)
                .delete(handlers::clear_zone),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 监听并服务,直到 `shutdown` 完成
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("监听失败: {}", addr))?;
    info!("🌐 HTTP 服务: http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP 服务异常退出")?;

    info!("🛑 HTTP 服务已关闭");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread::JoinHandle;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use futures_util::StreamExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::detection::Detection;
    use crate::pipeline::testing::{FakeDetector, FakeSource};
    use crate::pipeline::{DriverConfig, PipelineDriver, PipelineState};
    use crate::renderer::Annotator;

    fn person_at(cx: f32, cy: f32) -> Detection {
        Detection::new(0, 0.9, cx - 10., cy - 10., cx + 10., cy + 10.)
    }

    fn state_for(handle: PipelineHandle, config: ServerConfig) -> AppState {
        AppState {
            pipeline: handle,
            config,
        }
    }

    /// 驱动器跑在后台线程,返回句柄与停止开关
    struct Running {
        handle: PipelineHandle,
        flag: Arc<AtomicBool>,
        worker: Option<JoinHandle<()>>,
    }

    impl Running {
        fn start(source: FakeSource, detector: FakeDetector) -> Self {
            let mut driver = PipelineDriver::new(
                source,
                detector,
                Annotator::default(),
                DriverConfig::default(),
            );
            let handle = driver.handle();
            let flag = Arc::new(AtomicBool::new(true));
            let worker_flag = flag.clone();
            let worker = std::thread::spawn(move || driver.run(&worker_flag));
            Self {
                handle,
                flag,
                worker: Some(worker),
            }
        }
    }

    impl Drop for Running {
        fn drop(&mut self) {
            self.flag.store(false, Ordering::Relaxed);
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        }
    }

    async fn json_of(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn zone_req(method: Method, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("/zone")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_status_defaults_to_stable_count() {
        let mut driver = PipelineDriver::new(
            FakeSource::always(),
            FakeDetector::new(vec![person_at(50., 50.), person_at(60., 60.)])
                .then(Some(vec![person_at(50., 50.)])),
            Annotator::default(),
            DriverConfig {
                count_when_idle: true,
                ..Default::default()
            },
        );
        let handle = driver.handle();
        // raw: 1, 2, 2, 2 → stable 2
        for _ in 0..4 {
            driver.tick().unwrap();
        }

        let app = create_router(state_for(handle.clone(), ServerConfig::default()));
        let resp = app.oneshot(get_req("/status")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_of(resp).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["stable"], 2);
        assert_eq!(body["raw"], 2);
        assert_eq!(body["armed"], false);
        assert!(body["ts"].as_f64().unwrap() > 0.0);

        let raw_cfg = ServerConfig {
            status_count: StatusCount::Raw,
            ..Default::default()
        };
        let app = create_router(state_for(handle, raw_cfg));
        let body = json_of(app.oneshot(get_req("/status")).await.unwrap()).await;
        assert_eq!(body["count"], body["raw"]);
    }

    #[tokio::test]
    async fn test_snapshot_unavailable_without_frame() {
        let driver = PipelineDriver::new(
            FakeSource::always(),
            FakeDetector::new(vec![]),
            Annotator::default(),
            DriverConfig::default(),
        );
        let app = create_router(state_for(driver.handle(), ServerConfig::default()));
        let resp = app.oneshot(get_req("/snapshot")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_of(resp).await;
        assert!(body["detail"].as_str().unwrap().contains("no camera frame"));
    }

    #[tokio::test]
    async fn test_snapshot_rejects_placeholder() {
        let mut driver = PipelineDriver::new(
            FakeSource::dead(),
            FakeDetector::new(vec![]),
            Annotator::default(),
            DriverConfig::default(),
        );
        let _ = driver.tick();
        let app = create_router(state_for(driver.handle(), ServerConfig::default()));
        let resp = app.oneshot(get_req("/snapshot")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_snapshot_returns_jpeg() {
        let mut driver = PipelineDriver::new(
            FakeSource::always(),
            FakeDetector::new(vec![]),
            Annotator::default(),
            DriverConfig::default(),
        );
        driver.tick().unwrap();
        let app = create_router(state_for(driver.handle(), ServerConfig::default()));
        let resp = app.oneshot(get_req("/snapshot")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_video_streams_placeholder_frames() {
        let mut driver = PipelineDriver::new(
            FakeSource::dead(),
            FakeDetector::new(vec![]),
            Annotator::default(),
            DriverConfig::default(),
        );
        let _ = driver.tick();
        let app = create_router(state_for(driver.handle(), ServerConfig::default()));
        let resp = app.oneshot(get_req("/video")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );

        let mut body = resp.into_body().into_data_stream();
        let chunk = body.next().await.unwrap().unwrap();
        assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n"));
    }

    #[tokio::test]
    async fn test_health() {
        let driver = PipelineDriver::new(
            FakeSource::always(),
            FakeDetector::new(vec![]),
            Annotator::default(),
            DriverConfig::default(),
        );
        let app = create_router(state_for(driver.handle(), ServerConfig::default()));
        let body = json_of(app.oneshot(get_req("/health")).await.unwrap()).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["camera"], false);
    }

    #[tokio::test]
    async fn test_zone_lifecycle() {
        let running = Running::start(FakeSource::always(), FakeDetector::new(vec![]));
        let app = create_router(state_for(running.handle.clone(), ServerConfig::default()));

        // 点数不足
        let resp = app
            .clone()
            .oneshot(zone_req(Method::POST, r#"{"points": [[0, 0], [10, 10]]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .clone()
            .oneshot(zone_req(
                Method::POST,
                r#"{"points": [[0, 0], [0, 100], [100, 100]]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_of(resp).await;
        assert_eq!(body["state"], "armed");
        assert_eq!(body["points"].as_array().unwrap().len(), 4);
        assert_eq!(running.handle.state(), PipelineState::Armed);

        let resp = app
            .clone()
            .oneshot(zone_req(Method::DELETE, ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_of(resp).await["state"], "idle");
    }
}
