// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频输入系统 (Video Input System)
///
/// - FfmpegSource: ffmpeg 子进程解码 (摄像头 / 设备 / RTSP / 视频文件)
/// - StillSource:  单张图片或图片目录循环播放
pub mod ffmpeg;
pub mod still;

use std::path::Path;

use anyhow::Result;
use image::RgbImage;
use tracing::info;

use crate::config::SourceArgs;

pub use ffmpeg::FfmpegSource;
pub use still::StillSource;

/// 视频源
///
/// `read` 返回 `None` 表示本次取不到帧 (断流/重连中),调用方用占位帧顶上。
pub trait VideoSource: Send {
    fn read(&mut self) -> Option<RgbImage>;

    fn describe(&self) -> String;
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn read(&mut self) -> Option<RgbImage> {
        (**self).read()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "webp", "tiff"];

/// 输入源类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// 本地摄像头序号
    Camera(usize),
    /// 设备路径 (/dev/videoN) 或 dshow 设备名 (video=...)
    Device(String),
    /// 网络流 (rtsp://, http://, ...)
    Stream(String),
    /// 视频文件
    File(String),
    /// 图片或图片目录
    Still(String),
}

impl SourceKind {
    pub fn parse(source: &str) -> Self {
        let source = source.trim();
        if let Ok(index) = source.parse::<usize>() {
            return SourceKind::Camera(index);
        }
        if source.starts_with("/dev/") || source.starts_with("video=") {
            return SourceKind::Device(source.to_string());
        }
        if source.contains("://") {
            return SourceKind::Stream(source.to_string());
        }
        let path = Path::new(source);
        if path.is_dir() || is_image_path(path) {
            return SourceKind::Still(source.to_string());
        }
        SourceKind::File(source.to_string())
    }
}

pub(crate) fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 按参数打开视频源
pub fn open_source(args: &SourceArgs) -> Result<Box<dyn VideoSource>> {
    let kind = SourceKind::parse(&args.source);
    info!("📹 视频源: {:?}", kind);

    let source: Box<dyn VideoSource> = match kind {
        SourceKind::Still(path) => Box::new(StillSource::open(path)?),
        kind => Box::new(FfmpegSource::spawn(kind, args.width, args.height)?),
    };
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_kind() {
        assert_eq!(SourceKind::parse("0"), SourceKind::Camera(0));
        assert_eq!(SourceKind::parse(" 2 "), SourceKind::Camera(2));
        assert_eq!(
            SourceKind::parse("/dev/video1"),
            SourceKind::Device("/dev/video1".into())
        );
        assert_eq!(
            SourceKind::parse("video=USB Camera"),
            SourceKind::Device("video=USB Camera".into())
        );
        assert_eq!(
            SourceKind::parse("rtsp://10.0.0.2/stream"),
            SourceKind::Stream("rtsp://10.0.0.2/stream".into())
        );
        assert_eq!(
            SourceKind::parse("clip.mp4"),
            SourceKind::File("clip.mp4".into())
        );
        assert_eq!(
            SourceKind::parse("frame.JPG"),
            SourceKind::Still("frame.JPG".into())
        );
    }
}
