// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! ffmpeg 子进程解码
//!
//! ffmpeg 输出 rgb24 rawvideo 到 stdout,读线程按帧切分后送入有界通道。
//! 通道满时淘汰最旧的帧,`read` 总是取最新的一帧。
//! 子进程退出 (断流/文件结束) 后按退避间隔自动重启。

use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use image::RgbImage;
use tracing::{debug, error, info, warn};

use super::{SourceKind, VideoSource};

/// 读帧等待上限,超时即视为本次无帧
const READ_TIMEOUT: Duration = Duration::from_millis(200);
/// 重启退避上限
const MAX_BACKOFF: Duration = Duration::from_secs(5);
/// 通道容量 (只保留最新的少量帧)
const QUEUE_SIZE: usize = 2;

/// 当前 ffmpeg 子进程,读线程与 `Drop` 共享
type ChildSlot = Arc<Mutex<Option<Child>>>;

pub struct FfmpegSource {
    kind: SourceKind,
    width: u32,
    height: u32,
    rx: Receiver<RgbImage>,
    running: Arc<AtomicBool>,
    child: ChildSlot,
}

impl FfmpegSource {
    /// 启动解码线程
    pub fn spawn(kind: SourceKind, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("采集尺寸无效: {}x{}", width, height));
        }
        if let SourceKind::Still(path) = &kind {
            return Err(anyhow!("图片输入不经过 ffmpeg: {}", path));
        }
        // 参数不合法时立即失败,不进入重启循环
        build_command(&kind, width, height)?;

        let (tx, rx) = bounded(QUEUE_SIZE);
        let running = Arc::new(AtomicBool::new(true));
        let child = ChildSlot::default();

        let reader = FrameReader {
            kind: kind.clone(),
            width,
            height,
            tx,
            evict: rx.clone(),
            running: running.clone(),
            child: child.clone(),
        };
        thread::Builder::new()
            .name("ffmpeg-reader".into())
            .spawn(move || reader.run())
            .context("启动解码线程失败")?;

        Ok(Self {
            kind,
            width,
            height,
            rx,
            running,
            child,
        })
    }
}

impl VideoSource for FfmpegSource {
    fn read(&mut self) -> Option<RgbImage> {
        // 积压的旧帧直接丢弃
        if let Some(frame) = self.rx.try_iter().last() {
            return Some(frame);
        }
        match self.rx.recv_timeout(READ_TIMEOUT) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(READ_TIMEOUT);
                None
            }
        }
    }

    fn describe(&self) -> String {
        format!("ffmpeg {:?} @ {}x{}", self.kind, self.width, self.height)
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        // 读线程可能阻塞在 read_exact 上,杀掉子进程让它返回
        kill_child(&self.child);
    }
}

fn kill_child(slot: &ChildSlot) {
    let child = match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    if let Some(mut child) = child {
        let _ = child.kill();
        let _ = child.wait();
    }
}

/// 摄像头输入格式 - 根据平台选择
fn camera_format() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "dshow" // DirectShow
    }
    #[cfg(target_os = "macos")]
    {
        "avfoundation" // AVFoundation
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        "v4l2" // Video4Linux2
    }
}

/// 摄像头序号 → ffmpeg 输入名
fn camera_input(index: usize) -> Result<String> {
    #[cfg(target_os = "macos")]
    {
        Ok(format!("{}", index))
    }
    #[cfg(target_os = "windows")]
    {
        // dshow 只认设备名
        Err(anyhow!(
            "Windows 不支持摄像头序号 {}: 请使用 --source \"video=<设备名>\" \
             (ffmpeg -list_devices true -f dshow -i dummy 列出设备)",
            index
        ))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        Ok(format!("/dev/video{}", index))
    }
}

/// 构建 ffmpeg 命令
pub(crate) fn build_command(kind: &SourceKind, width: u32, height: u32) -> Result<Command> {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner").arg("-loglevel").arg("error");

    match kind {
        SourceKind::Camera(index) => {
            cmd.arg("-f")
                .arg(camera_format())
                .arg("-framerate")
                .arg("30")
                .arg("-video_size")
                .arg(format!("{}x{}", width, height))
                .arg("-i")
                .arg(camera_input(*index)?);
        }
        SourceKind::Device(device) => {
            cmd.arg("-f").arg(camera_format()).arg("-i").arg(device);
        }
        SourceKind::Stream(url) => {
            if url.starts_with("rtsp://") {
                cmd.arg("-rtsp_transport").arg("tcp");
            }
            cmd.arg("-fflags")
                .arg("nobuffer")
                .arg("-flags")
                .arg("low_delay")
                .arg("-i")
                .arg(url);
        }
        SourceKind::File(path) | SourceKind::Still(path) => {
            // 按原始帧率播放
            cmd.arg("-re").arg("-i").arg(path);
        }
    }

    cmd.arg("-an")
        .arg("-vf")
        .arg(format!("scale={}:{}", width, height))
        .arg("-pix_fmt")
        .arg("rgb24")
        .arg("-f")
        .arg("rawvideo")
        .arg("-");
    Ok(cmd)
}

/// 读线程状态
struct FrameReader {
    kind: SourceKind,
    width: u32,
    height: u32,
    tx: Sender<RgbImage>,
    /// 同一通道的接收端,通道满时用来淘汰最旧的帧
    evict: Receiver<RgbImage>,
    running: Arc<AtomicBool>,
    child: ChildSlot,
}

impl FrameReader {
    fn run(self) {
        let mut backoff = Duration::from_millis(500);

        while self.running.load(Ordering::Relaxed) {
            match self.start() {
                Ok(stdout) => {
                    info!("🎬 ffmpeg 已启动: {:?}", self.kind);
                    let pumped = self.pump(stdout);
                    kill_child(&self.child);
                    match pumped {
                        Ok(0) => warn!("⚠️ ffmpeg 未输出任何帧: {:?}", self.kind),
                        Ok(frames) => {
                            info!("📴 ffmpeg 结束, 共 {} 帧", frames);
                            backoff = Duration::from_millis(500);
                        }
                        Err(e) => {
                            debug!("解码线程退出: {}", e);
                            break;
                        }
                    }
                }
                Err(e) => error!("❌ 无法启动 ffmpeg: {:#}", e),
            }

            if !self.running.load(Ordering::Relaxed) {
                break;
            }
            warn!("🔄 {:?} 后重启 ffmpeg", backoff);
            thread::sleep(backoff);
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
        info!("🛑 解码线程已停止");
    }

    /// 启动子进程并登记,返回其 stdout
    fn start(&self) -> Result<ChildStdout> {
        let mut cmd = build_command(&self.kind, self.width, self.height)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().context("spawn ffmpeg")?;
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!("无法获取 ffmpeg stdout"));
            }
        };

        match self.child.lock() {
            Ok(mut guard) => *guard = Some(child),
            Err(poisoned) => *poisoned.into_inner() = Some(child),
        }
        // 登记前已被 Drop 的情况
        if !self.running.load(Ordering::Relaxed) {
            kill_child(&self.child);
        }
        Ok(stdout)
    }

    fn pump(&self, stdout: impl Read) -> Result<u64> {
        pump_frames(
            stdout,
            self.width,
            self.height,
            &self.tx,
            &self.evict,
            &self.running,
        )
    }
}

/// 按帧切分原始输出直到结束,返回帧数; 停止或接收端关闭时返回 Err
fn pump_frames(
    mut reader: impl Read,
    width: u32,
    height: u32,
    tx: &Sender<RgbImage>,
    evict: &Receiver<RgbImage>,
    running: &AtomicBool,
) -> Result<u64> {
    let frame_bytes = width as usize * height as usize * 3;
    let mut frames = 0u64;
    loop {
        if !running.load(Ordering::Relaxed) {
            return Err(anyhow!("已停止"));
        }

        let mut buffer = vec![0u8; frame_bytes];
        if let Err(e) = reader.read_exact(&mut buffer) {
            debug!("ffmpeg 输出结束: {}", e);
            return Ok(frames);
        }

        let Some(frame) = RgbImage::from_raw(width, height, buffer) else {
            return Ok(frames);
        };
        frames += 1;

        match tx.try_send(frame) {
            Ok(()) => {}
            // 消费慢: 淘汰最旧的一帧,给新帧腾位置
            Err(TrySendError::Full(frame)) => {
                let _ = evict.try_recv();
                if let Err(TrySendError::Disconnected(_)) = tx.try_send(frame) {
                    return Err(anyhow!("接收端已关闭"));
                }
            }
            Err(TrySendError::Disconnected(_)) => return Err(anyhow!("接收端已关闭")),
        }
    }
}
