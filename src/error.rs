// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 流水线错误类型

use thiserror::Error;

use crate::geometry::Point;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// 视频源本帧没有数据 (用占位帧代替)
    #[error("视频源无帧")]
    SourceUnavailable,

    /// 区域点数不足,不能启用
    #[error("区域无效: 需要至少 3 个不同的点,当前 {} 个", .points.len())]
    InvalidRegion { points: Vec<Point> },

    /// JPEG 编码失败
    #[error("图像编码失败: {0}")]
    EncodeFailure(#[from] image::ImageError),

    /// 检测器推理失败
    #[error("检测失败: {0:#}")]
    Detector(anyhow::Error),

    /// 驱动器已停止
    #[error("流水线已停止")]
    Stopped,
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
