// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 测试用视频源与检测器

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::RgbImage;

use crate::detection::{ClassNames, Detection, Detector, InferenceParams};
use crate::input::VideoSource;

/// 按脚本出帧 (true 出帧, false 无帧); 脚本耗尽后一直出帧
pub struct FakeSource {
    script: VecDeque<bool>,
}

impl FakeSource {
    pub fn always() -> Self {
        Self {
            script: VecDeque::new(),
        }
    }

    pub fn scripted(script: &[bool]) -> Self {
        Self {
            script: script.iter().copied().collect(),
        }
    }

    /// 始终无帧
    pub fn dead() -> Self {
        Self::scripted(&[false; 1024])
    }
}

impl VideoSource for FakeSource {
    fn read(&mut self) -> Option<RgbImage> {
        if self.script.pop_front().unwrap_or(true) {
            Some(RgbImage::new(200, 200))
        } else {
            None
        }
    }

    fn describe(&self) -> String {
        "fake".into()
    }
}

/// 按脚本返回检测结果 (None 表示推理失败); 脚本耗尽后返回固定结果
pub struct FakeDetector {
    names: ClassNames,
    script: VecDeque<Option<Vec<Detection>>>,
    fallback: Vec<Detection>,
    calls: Arc<AtomicUsize>,
}

impl FakeDetector {
    pub fn new(fallback: Vec<Detection>) -> Self {
        Self {
            names: ClassNames::coco(),
            script: VecDeque::new(),
            fallback,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn then(mut self, step: Option<Vec<Detection>>) -> Self {
        self.script.push_back(step);
        self
    }

    /// 调用计数 (移交驱动器后仍可读取)
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Detector for FakeDetector {
    fn predict(
        &mut self,
        _frame: &RgbImage,
        _params: &InferenceParams,
    ) -> anyhow::Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(Some(dets)) => Ok(dets),
            Some(None) => Err(anyhow::anyhow!("inference failed")),
            None => Ok(self.fallback.clone()),
        }
    }

    fn names(&self) -> &ClassNames {
        &self.names
    }
}
