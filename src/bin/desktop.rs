// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 桌面区域计数 (macroquad)
//!
//! 左键依次点击区域顶点,D 启用,R 重置,Q / Esc 退出。

use clap::Parser;
use macroquad::prelude::*;
use tracing::{error, info, warn};

use zone_sentinel::config::{Args, CountingProfile};
use zone_sentinel::detection::Detector;
use zone_sentinel::error::PipelineError;
use zone_sentinel::input::open_source;
use zone_sentinel::pipeline::{DriverConfig, PipelineDriver};
use zone_sentinel::renderer::{Annotator, Viewer, ViewerCommand};
use zone_sentinel::telemetry::init_tracing;
use zone_sentinel::{YOLOv8, YOLOv8Config};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn window_conf() -> Conf {
    Conf {
        window_title: "Zone Sentinel".to_owned(),
        window_width: 1280,
        window_height: 720,
        window_resizable: true,
        high_dpi: false,
        ..Default::default()
    }
}

fn build_driver(args: &Args) -> anyhow::Result<PipelineDriver> {
    let profile = CountingProfile::resolve(&args.counting);
    profile.print_summary();

    let model = YOLOv8::new(YOLOv8Config {
        model: args.model.model.clone(),
        ep: args.model.ep(),
        size: profile.imgsz,
        intra_threads: args.model.threads,
        profile: args.model.timing,
    })?;
    let source = open_source(&args.source)?;

    // 桌面模式严格 IDLE: 区域启用前不计数
    let config = DriverConfig {
        mirror: args.source.mirror,
        count_when_idle: false,
        placeholder_size: (args.source.width, args.source.height),
        ..DriverConfig::from_profile(&profile, model.names())
    };
    let annotator = Annotator::from_font_path(args.display.font.as_deref());

    let detector: Box<dyn Detector> = Box::new(model);
    let mut driver: PipelineDriver = PipelineDriver::new(source, detector, annotator, config);
    if !profile.zone.is_empty() {
        if let Err(e) = driver.replace_zone(profile.zone) {
            warn!("⚠️ 启动区域无效,保持 IDLE: {}", e);
        }
    }
    Ok(driver)
}

#[macroquad::main(window_conf)]
async fn main() {
    init_tracing();
    let args = Args::parse();

    let mut driver = match build_driver(&args) {
        Ok(driver) => driver,
        Err(e) => {
            error!("❌ 初始化失败: {:#}", e);
            return;
        }
    };
    let handle = driver.handle();
    let mut viewer = Viewer::new();
    info!("🚀 桌面计数启动: {}", driver.source_description());

    let mut source_down = false;
    'main: loop {
        for command in viewer.handle_input() {
            match command {
                ViewerCommand::AddPoint(p) => driver.add_point(p),
                ViewerCommand::Arm => {
                    if let Err(e) = driver.arm() {
                        warn!("⚠️ {}", e);
                    }
                }
                ViewerCommand::Reset => driver.reset(),
                ViewerCommand::Quit => break 'main,
            }
        }

        match driver.tick() {
            Ok(_) => source_down = false,
            Err(PipelineError::SourceUnavailable) => {
                if !source_down {
                    warn!("⚠️ 视频源无帧,显示占位帧");
                    source_down = true;
                }
            }
            Err(e) => error!("❌ {}", e),
        }

        if let Some(frame) = handle.latest_frame() {
            viewer.update(&frame.image, frame.frame_number);
        }
        viewer.draw();

        next_frame().await;
    }

    info!("👋 退出");
}
