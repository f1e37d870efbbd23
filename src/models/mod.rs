// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 模型实现
///
/// - **YOLOv8**: 加载 → 预处理 (letterbox) → 推理 → 后处理 (解码 + NMS)
///   实现 [`crate::detection::Detector`],由流水线驱动器逐帧调用。
pub mod yolov8;

pub use yolov8::{YOLOv8, YOLOv8Config};
