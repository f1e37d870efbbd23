// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 配置: 命令行参数 + JSON 计数配置文件
//!
//! 计数参数先取配置文件 (或默认值),命令行显式给出的再覆盖。

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Args as ClapArgs, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detection::{InferenceParams, ReduceOptions};
use crate::geometry::{parse_points, Point};
use crate::ort_backend::OrtEP;

/// 命令行里的区域点列表 `"x,y;x,y;x,y"`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZonePoints(pub Vec<Point>);

impl FromStr for ZonePoints {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_points(s).map(ZonePoints)
    }
}

/// 视频输入参数
#[derive(ClapArgs, Debug, Clone)]
pub struct SourceArgs {
    /// 视频源: 摄像头序号 / 设备路径 / RTSP 或 HTTP 地址 / 视频文件 / 图片或图片目录
    #[arg(short, long, default_value = "0")]
    pub source: String,

    /// 采集宽度
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// 采集高度
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// 水平镜像 (前置摄像头)
    #[arg(long)]
    pub mirror: bool,
}

/// 模型参数
#[derive(ClapArgs, Debug, Clone)]
pub struct ModelArgs {
    /// ONNX 模型路径
    #[arg(short, long, default_value = "models/yolov8n.onnx")]
    pub model: String,

    /// 使用 CUDA
    #[arg(long)]
    pub cuda: bool,

    /// 使用 TensorRT
    #[arg(long)]
    pub trt: bool,

    /// GPU 设备号
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// ONNX Runtime 线程数
    #[arg(long, default_value_t = 4)]
    pub threads: usize,

    /// 打印每帧预处理/推理/后处理耗时
    #[arg(long)]
    pub timing: bool,
}

impl ModelArgs {
    pub fn ep(&self) -> OrtEP {
        if self.trt {
            OrtEP::Trt(self.device_id)
        } else if self.cuda {
            OrtEP::CUDA(self.device_id)
        } else {
            OrtEP::CPU
        }
    }
}

/// 计数参数 (显式给出时覆盖配置文件)
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct CountingArgs {
    /// 计数配置文件 (JSON),不存在时写出默认配置
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// 统计的类别名,逗号分隔,"all" 表示全部
    #[arg(long, value_delimiter = ',')]
    pub classes: Option<Vec<String>>,

    /// 置信度阈值
    #[arg(long)]
    pub conf: Option<f32>,

    /// NMS IOU 阈值
    #[arg(long)]
    pub iou: Option<f32>,

    /// 推理尺寸
    #[arg(long)]
    pub imgsz: Option<u32>,

    /// 平滑窗口 (帧数,最小 3)
    #[arg(long)]
    pub smooth_window: Option<usize>,

    /// 只统计区域内目标
    #[arg(long, value_name = "BOOL")]
    pub only_inside: Option<bool>,

    /// 区域外目标仍然绘制
    #[arg(long, value_name = "BOOL")]
    pub keep_outside: Option<bool>,

    /// 启动即生效的区域 "x,y;x,y;x,y"
    #[arg(long)]
    pub zone: Option<ZonePoints>,
}

/// 标注显示参数
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct DisplayArgs {
    /// TrueType 字体文件 (缺省使用内置点阵字体)
    #[arg(long)]
    pub font: Option<PathBuf>,
}

/// 两个可执行文件共用的参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "区域目标计数")]
pub struct Args {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub counting: CountingArgs,

    #[command(flatten)]
    pub display: DisplayArgs,
}

/// `/status` 中 `count` 字段的取值
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusCount {
    #[default]
    Stable,
    Raw,
}

/// HTTP 服务参数
#[derive(ClapArgs, Debug, Clone)]
pub struct HttpArgs {
    /// 监听地址
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// 监听端口
    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// MJPEG 流 JPEG 质量
    #[arg(long, default_value_t = 80)]
    pub stream_quality: u8,

    /// 快照 JPEG 质量
    #[arg(long, default_value_t = 85)]
    pub snapshot_quality: u8,

    /// `/status` 的 count 取稳定值还是原始值
    #[arg(long, value_enum, default_value_t = StatusCount::Stable)]
    pub status_count: StatusCount,

    /// 未设置区域时仍统计整幅画面
    #[arg(long, value_name = "BOOL", default_value_t = true, action = clap::ArgAction::Set)]
    pub count_when_idle: bool,
}

/// 无界面服务参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "区域目标计数 HTTP 服务")]
pub struct ServerArgs {
    #[command(flatten)]
    pub common: Args,

    #[command(flatten)]
    pub http: HttpArgs,
}

/// 计数配置 - 通过JSON文件调整参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountingProfile {
    // === 检测参数 ===
    pub classes: Vec<String>, // 统计类别
    pub conf: f32,            // 置信度阈值
    pub iou: f32,             // NMS IOU阈值
    pub imgsz: u32,           // 推理尺寸

    // === 计数参数 ===
    pub smooth_window: usize, // 中位数窗口
    pub only_inside: bool,    // 只统计区域内
    pub keep_outside: bool,   // 绘制区域外目标

    // === 区域 ===
    pub zone: Vec<Point>,
}

impl Default for CountingProfile {
    fn default() -> Self {
        let params = InferenceParams::default();
        let options = ReduceOptions::default();
        Self {
            classes: vec!["person".to_string()],
            conf: params.conf,
            iou: params.iou,
            imgsz: params.size,
            smooth_window: 7,
            only_inside: options.only_inside,
            keep_outside: options.keep_outside,
            zone: Vec::new(),
        }
    }
}

impl CountingProfile {
    /// 从JSON文件加载配置
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(profile) => {
                    info!("✅ 计数配置已从 {} 加载", path.display());
                    profile
                }
                Err(e) => {
                    warn!("⚠️  计数配置解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 计数配置不存在,创建默认配置...");
                let profile = Self::default();
                profile.save(path);
                profile
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("❌ 保存计数配置失败: {}", e);
                } else {
                    info!("💾 计数配置已保存到 {}", path.display());
                }
            }
            Err(e) => warn!("❌ 序列化计数配置失败: {}", e),
        }
    }

    /// 配置文件 (若给出) + 命令行覆盖
    pub fn resolve(args: &CountingArgs) -> Self {
        let mut profile = match &args.profile {
            Some(path) => Self::load(path),
            None => Self::default(),
        };
        profile.apply(args);
        profile
    }

    /// 命令行显式给出的参数覆盖配置
    pub fn apply(&mut self, args: &CountingArgs) {
        if let Some(classes) = &args.classes {
            self.classes = classes
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
        }
        if let Some(conf) = args.conf {
            self.conf = conf;
        }
        if let Some(iou) = args.iou {
            self.iou = iou;
        }
        if let Some(imgsz) = args.imgsz {
            self.imgsz = imgsz;
        }
        if let Some(window) = args.smooth_window {
            self.smooth_window = window;
        }
        if let Some(only_inside) = args.only_inside {
            self.only_inside = only_inside;
        }
        if let Some(keep_outside) = args.keep_outside {
            self.keep_outside = keep_outside;
        }
        if let Some(zone) = &args.zone {
            self.zone = zone.0.clone();
        }
    }

    pub fn inference_params(&self) -> InferenceParams {
        InferenceParams {
            conf: self.conf,
            iou: self.iou,
            size: self.imgsz,
        }
    }

    pub fn reduce_options(&self) -> ReduceOptions {
        ReduceOptions {
            only_inside: self.only_inside,
            keep_outside: self.keep_outside,
        }
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前计数配置:");
        info!("  类别: {}", self.classes.join(","));
        info!(
            "  置信度: {:.2}  IOU: {:.2}  尺寸: {}",
            self.conf, self.iou, self.imgsz
        );
        info!("  平滑窗口: {}", self.smooth_window);
        info!(
            "  只统计区域内: {}  绘制区域外: {}",
            self.only_inside, self.keep_outside
        );
        if !self.zone.is_empty() {
            info!("  启动区域: {} 个点", self.zone.len());
        }
    }
}
