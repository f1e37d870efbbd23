#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 命令行参数与计数配置
pub mod detection; // 检测、过滤与计数平滑
pub mod error; // 错误类型
pub mod geometry; // 区域多边形
pub mod input; // 视频输入系统
pub mod models; // 模型实现
pub mod ort_backend; // ONNX Runtime 后端
pub mod pipeline; // 逐帧驱动与状态发布
pub mod renderer; // 帧标注与桌面显示
pub mod server; // HTTP 服务 (状态 / MJPEG / 快照)
pub mod telemetry; // 日志初始化

pub use crate::config::{Args, CountingProfile};
pub use crate::detection::{Detection, Detector};
pub use crate::error::PipelineError;
pub use crate::geometry::{Point, Region};
pub use crate::models::{YOLOv8, YOLOv8Config};
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
pub use crate::pipeline::{AnnotatedFrame, PipelineDriver, PipelineHandle, Status};

/// 按类别做非极大值抑制,结果按置信度降序
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].class_id != xs[index].class_id {
                continue;
            }
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// 当前 Unix 时间戳 (秒)
pub fn unix_timestamp() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nms_keeps_highest_per_class() {
        let mut xs = vec![
            Detection::new(0, 0.6, 10., 10., 110., 110.),
            Detection::new(0, 0.9, 12., 12., 112., 112.),
            Detection::new(1, 0.5, 12., 12., 112., 112.),
            Detection::new(0, 0.7, 300., 300., 350., 350.),
        ];
        non_max_suppression(&mut xs, 0.45);
        assert_eq!(xs.len(), 3);
        assert!((xs[0].confidence - 0.9).abs() < 1e-6);
        assert!((xs[1].confidence - 0.7).abs() < 1e-6);
        assert_eq!(xs[2].class_id, 1);
    }

    #[test]
    fn test_nms_empty() {
        let mut xs: Vec<Detection> = vec![];
        non_max_suppression(&mut xs, 0.5);
        assert!(xs.is_empty());
    }

    #[test]
    fn test_unix_timestamp_is_recent() {
        // 2020-01-01 之后
        assert!(unix_timestamp() > 1_577_836_800.0);
    }
}
