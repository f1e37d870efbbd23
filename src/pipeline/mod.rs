// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 计数流水线 (Counting Pipeline)
///
/// 驱动器独占区域点列、计数历史与最新状态 (单写者):
/// - 状态 / 标注帧: `watch` 单槽信箱整体替换,读者不会读到半更新
/// - 区域修改: 其他线程经控制队列发送,驱动器在两帧之间应用
pub mod driver;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crossbeam_channel::Sender;
use image::RgbImage;
use serde::Serialize;
use tokio::sync::{oneshot, watch};

use crate::error::PipelineError;
use crate::geometry::Point;

pub use driver::{DriverConfig, PipelineDriver};

// ========== 发布的数据 ==========

/// 计数状态,每帧整体替换
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Status {
    pub raw_count: u32,
    pub stable_count: u32,
    /// Unix 时间戳 (秒)
    pub timestamp: f64,
}

/// 已标注帧 (只读共享)
#[derive(Debug)]
pub struct AnnotatedFrame {
    pub image: RgbImage,
    pub frame_number: u64,
    /// 视频源无帧时合成的占位帧
    pub placeholder: bool,
}

/// 区域状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// 绘制中,不计数
    #[default]
    Idle,
    /// 区域已启用,逐帧计数
    Armed,
}

pub type Reply = oneshot::Sender<Result<usize, PipelineError>>;

/// 控制消息 (其他线程 → 驱动器)
#[derive(Debug)]
pub enum ControlMessage {
    AddPoint(Point),
    Arm { reply: Option<Reply> },
    ReplaceZone { points: Vec<Point>, reply: Option<Reply> },
    Reset,
}

/// 流水线读端 + 控制端,可随意克隆
#[derive(Clone)]
pub struct PipelineHandle {
    pub(crate) status: watch::Receiver<Status>,
    pub(crate) frame: watch::Receiver<Option<Arc<AnnotatedFrame>>>,
    pub(crate) state: watch::Receiver<PipelineState>,
    pub(crate) zone: watch::Receiver<Vec<Point>>,
    pub(crate) control: Sender<ControlMessage>,
}

impl PipelineHandle {
    /// 最新计数状态
    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    /// 最新标注帧
    pub fn latest_frame(&self) -> Option<Arc<AnnotatedFrame>> {
        self.frame.borrow().clone()
    }

    /// 订阅标注帧更新 (MJPEG 推流用)
    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Arc<AnnotatedFrame>>> {
        self.frame.clone()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// 当前区域点列
    pub fn zone(&self) -> Vec<Point> {
        self.zone.borrow().clone()
    }

    pub fn add_point(&self, p: Point) -> Result<(), PipelineError> {
        self.send(ControlMessage::AddPoint(p))
    }

    pub fn reset(&self) -> Result<(), PipelineError> {
        self.send(ControlMessage::Reset)
    }

    /// 启用当前点列,返回闭合后的点数
    pub async fn arm(&self) -> Result<usize, PipelineError> {
        let (tx, rx) = oneshot::channel();
        self.send(ControlMessage::Arm { reply: Some(tx) })?;
        rx.await.map_err(|_| PipelineError::Stopped)?
    }

    /// 替换区域并启用
    pub async fn replace_zone(&self, points: Vec<Point>) -> Result<usize, PipelineError> {
        let (tx, rx) = oneshot::channel();
        self.send(ControlMessage::ReplaceZone {
            points,
            reply: Some(tx),
        })?;
        rx.await.map_err(|_| PipelineError::Stopped)?
    }

    fn send(&self, msg: ControlMessage) -> Result<(), PipelineError> {
        self.control.send(msg).map_err(|_| PipelineError::Stopped)
    }
}
