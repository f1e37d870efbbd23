// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 渲染系统
///
/// - Annotator: 在帧上绘制区域、检测框与计数 (imageproc)
/// - glyphs:    内置点阵字体
/// - Viewer:    桌面窗口显示与交互 (macroquad)
pub mod annotator;
pub mod glyphs;
pub mod viewer;

pub use annotator::{Annotator, Overlay, PLACEHOLDER_SIZE};
pub use viewer::{FrameView, Viewer, ViewerCommand};
