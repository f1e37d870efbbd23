// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 无界面区域计数服务
//!
//! cargo run --bin zone-server --release -- --source 0 --zone "100,100;600,100;600,500"

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use zone_sentinel::config::{CountingProfile, ServerArgs};
use zone_sentinel::detection::Detector;
use zone_sentinel::input::open_source;
use zone_sentinel::pipeline::{DriverConfig, PipelineDriver};
use zone_sentinel::renderer::Annotator;
use zone_sentinel::server::{self, AppState, ServerConfig};
use zone_sentinel::telemetry::init_tracing;
use zone_sentinel::{YOLOv8, YOLOv8Config};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = ServerArgs::parse();
    let common = &args.common;

    let profile = CountingProfile::resolve(&common.counting);
    profile.print_summary();

    let model = YOLOv8::new(YOLOv8Config {
        model: common.model.model.clone(),
        ep: common.model.ep(),
        size: profile.imgsz,
        intra_threads: common.model.threads,
        profile: common.model.timing,
    })
    .with_context(|| format!("加载模型失败: {}", common.model.model))?;

    let source = open_source(&common.source)?;
    let config = DriverConfig {
        mirror: common.source.mirror,
        count_when_idle: args.http.count_when_idle,
        placeholder_size: (common.source.width, common.source.height),
        ..DriverConfig::from_profile(&profile, model.names())
    };
    let annotator = Annotator::from_font_path(common.display.font.as_deref());

    let detector: Box<dyn Detector> = Box::new(model);
    let mut driver: PipelineDriver = PipelineDriver::new(source, detector, annotator, config);
    if !profile.zone.is_empty() {
        if let Err(e) = driver.replace_zone(profile.zone.clone()) {
            warn!("⚠️ 启动区域无效,保持 IDLE: {}", e);
        }
    }
    let handle = driver.handle();

    let running = Arc::new(AtomicBool::new(true));
    let worker = {
        let running = running.clone();
        std::thread::Builder::new()
            .name("pipeline".into())
            .spawn(move || driver.run(&running))
            .context("启动流水线线程失败")?
    };

    let addr: SocketAddr = format!("{}:{}", args.http.host, args.http.port)
        .parse()
        .with_context(|| format!("监听地址无效: {}:{}", args.http.host, args.http.port))?;
    let state = AppState {
        pipeline: handle,
        config: ServerConfig::from(&args.http),
    };

    let served = server::serve(addr, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("⚠️ 监听退出信号失败: {}", e);
        }
        info!("🛑 收到退出信号");
    })
    .await;

    running.store(false, Ordering::Relaxed);
    if worker.join().is_err() {
        warn!("⚠️ 流水线线程异常退出");
    }
    served
}
