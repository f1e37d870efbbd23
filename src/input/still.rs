// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 图片输入: 单张图片或目录内图片按文件名顺序循环

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use tracing::{info, warn};

use super::{is_image_path, VideoSource};

/// 默认出帧间隔 (10 FPS)
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

pub struct StillSource {
    root: PathBuf,
    frames: Vec<RgbImage>,
    cursor: usize,
    interval: Duration,
    last: Option<Instant>,
}

impl StillSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();

        let files = if root.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(&root)
                .with_context(|| format!("读取目录失败: {}", root.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image_path(p))
                .collect();
            files.sort();
            files
        } else {
            vec![root.clone()]
        };

        let mut frames = Vec::with_capacity(files.len());
        for file in &files {
            match image::open(file) {
                Ok(img) => frames.push(img.to_rgb8()),
                Err(e) => warn!("⚠️ 跳过无法解码的图片 {}: {}", file.display(), e),
            }
        }
        if frames.is_empty() {
            return Err(anyhow!("没有可用的图片: {}", root.display()));
        }
        info!("🖼️ 已加载 {} 张图片: {}", frames.len(), root.display());

        Ok(Self {
            root,
            frames,
            cursor: 0,
            interval: FRAME_INTERVAL,
            last: None,
        })
    }

    /// 设置出帧间隔 (0 表示不限速)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl VideoSource for StillSource {
    fn read(&mut self) -> Option<RgbImage> {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        self.last = Some(Instant::now());

        let frame = self.frames.get(self.cursor)?.clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        Some(frame)
    }

    fn describe(&self) -> String {
        format!("images {} ({} 张)", self.root.display(), self.frames.len())
    }
}
