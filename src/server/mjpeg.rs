// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! JPEG 编码与 MJPEG multipart 分片

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use futures_util::stream::{self, Stream};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tokio::sync::watch;
use tracing::debug;

use crate::error::PipelineError;
use crate::pipeline::AnnotatedFrame;

pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// 编码 JPEG
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::with_capacity(img.width() as usize * img.height() as usize / 4);
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder.encode_image(img)?;
    Ok(buf)
}

/// 在阻塞线程池上编码,不占用异步运行时
pub async fn encode_frame(
    frame: Arc<AnnotatedFrame>,
    quality: u8,
) -> Result<Vec<u8>, PipelineError> {
    match tokio::task::spawn_blocking(move || encode_jpeg(&frame.image, quality)).await {
        Ok(result) => result,
        Err(e) => Err(PipelineError::EncodeFailure(image::ImageError::IoError(
            std::io::Error::other(e.to_string()),
        ))),
    }
}

/// multipart 分片
pub fn part(jpeg: &[u8]) -> Bytes {
    let mut payload = Vec::with_capacity(jpeg.len() + 96);
    payload.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    payload.extend_from_slice(b"Content-Type: image/jpeg\r\n");
    payload.extend_from_slice(format!("Content-Length: {}\r\n", jpeg.len()).as_bytes());
    payload.extend_from_slice(b"Cache-Control: no-cache\r\n\r\n");
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

/// 每次标注帧更新推送一个分片; 编码失败的帧直接跳过,驱动器停止时流结束
pub fn frame_stream(
    mut rx: watch::Receiver<Option<Arc<AnnotatedFrame>>>,
    quality: u8,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    // 新连接立即推送当前帧
    rx.mark_changed();

    stream::unfold(rx, move |mut rx| async move {
        loop {
            if rx.changed().await.is_err() {
                return None;
            }
            let frame = rx.borrow_and_update().clone();
            let Some(frame) = frame else {
                continue;
            };
            let frame_number = frame.frame_number;
            match encode_frame(frame, quality).await {
                Ok(jpeg) => return Some((Ok(part(&jpeg)), rx)),
                Err(e) => debug!("跳过第 {} 帧: {}", frame_number, e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn test_encode_jpeg() {
        let img = RgbImage::from_pixel(16, 16, image::Rgb([200, 10, 10]));
        let jpeg = encode_jpeg(&img, 80).unwrap();
        // SOI 标记
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_part_framing() {
        let p = part(b"JPEG");
        let text = String::from_utf8_lossy(&p);
        assert!(text.starts_with("--frame\r\nContent-Type: image/jpeg\r\n"));
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.ends_with("\r\n\r\nJPEG\r\n"));
    }

    #[tokio::test]
    async fn test_stream_yields_current_then_ends() {
        let (tx, rx) = watch::channel(Some(Arc::new(AnnotatedFrame {
            image: RgbImage::new(8, 8),
            frame_number: 1,
            placeholder: true,
        })));
        let mut s = Box::pin(frame_stream(rx, 80));

        let first = s.next().await.unwrap().unwrap();
        assert!(first.starts_with(b"--frame\r\n"));

        drop(tx);
        assert!(s.next().await.is_none());
    }
}
