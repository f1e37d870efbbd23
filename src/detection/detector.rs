// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测器接口 (Detector)
//! 职责: 图像 → 检测框列表,对输入帧无副作用

use anyhow::Result;
use image::RgbImage;

use super::names::ClassNames;
use super::types::{Detection, InferenceParams};

/// 目标检测器
///
/// 每次调用同步阻塞,驱动器在上一次推理返回前不会发起下一次。
pub trait Detector: Send {
    /// 对一帧做推理,返回原图坐标下的检测框 (可能为空)
    fn predict(&mut self, frame: &RgbImage, params: &InferenceParams) -> Result<Vec<Detection>>;

    /// 模型类别表
    fn names(&self) -> &ClassNames;

    /// 打印模型信息
    fn summary(&self) {}
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn predict(&mut self, frame: &RgbImage, params: &InferenceParams) -> Result<Vec<Detection>> {
        (**self).predict(frame, params)
    }

    fn names(&self) -> &ClassNames {
        (**self).names()
    }

    fn summary(&self) {
        (**self).summary()
    }
}
