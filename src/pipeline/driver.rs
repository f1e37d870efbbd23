// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 流水线驱动器 (Pipeline Driver)
//! 职责: 取帧 → 检测 → 区域归约 → 平滑 → 标注 → 发布状态
//!
//! 状态机: IDLE (绘制区域) ⇄ ARMED (逐帧计数)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::{imageops, RgbImage};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{AnnotatedFrame, ControlMessage, PipelineHandle, PipelineState, Reply, Status};
use crate::config::CountingProfile;
use crate::detection::{
    reduce, ClassFilter, ClassNames, CountSmoother, Detector, FilteredDetection,
    InferenceParams, ReduceOptions,
};
use crate::error::{PipelineError, Result};
use crate::geometry::{Point, Region};
use crate::input::VideoSource;
use crate::renderer::{Annotator, Overlay, PLACEHOLDER_SIZE};
use crate::unix_timestamp;

/// 统计日志间隔
const STATS_INTERVAL: Duration = Duration::from_secs(5);
/// 视频源无帧时的等待
const SOURCE_RETRY: Duration = Duration::from_millis(50);

/// 驱动器参数
#[derive(Clone, Debug)]
pub struct DriverConfig {
    pub params: InferenceParams,
    pub classes: ClassFilter,
    pub options: ReduceOptions,
    pub smooth_window: usize,
    /// 水平镜像输入帧
    pub mirror: bool,
    /// IDLE 时仍对整幅画面计数 (无区域 = 全部放行)
    pub count_when_idle: bool,
    pub placeholder_size: (u32, u32),
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            params: InferenceParams::default(),
            classes: ClassFilter::All,
            options: ReduceOptions::default(),
            smooth_window: 7,
            mirror: false,
            count_when_idle: false,
            placeholder_size: PLACEHOLDER_SIZE,
        }
    }
}

impl DriverConfig {
    pub fn from_profile(profile: &CountingProfile, names: &ClassNames) -> Self {
        Self {
            params: profile.inference_params(),
            classes: names.resolve(&profile.classes),
            options: profile.reduce_options(),
            smooth_window: profile.smooth_window,
            ..Default::default()
        }
    }
}

/// 吞吐统计
struct TickStats {
    ticks: u64,
    detect_time: Duration,
    detect_calls: u64,
    last: Instant,
}

impl TickStats {
    fn new() -> Self {
        Self {
            ticks: 0,
            detect_time: Duration::ZERO,
            detect_calls: 0,
            last: Instant::now(),
        }
    }

    fn maybe_log(&mut self, status: &Status, state: PipelineState) {
        let elapsed = self.last.elapsed();
        if elapsed < STATS_INTERVAL {
            return;
        }
        let fps = self.ticks as f64 / elapsed.as_secs_f64();
        let detect_ms = if self.detect_calls > 0 {
            self.detect_time.as_secs_f64() * 1000.0 / self.detect_calls as f64
        } else {
            0.0
        };
        info!(
            "📊 {:.1} 帧/秒 | 推理 {:.1} ms | {:?} | 计数 {} (原始 {})",
            fps, detect_ms, state, status.stable_count, status.raw_count
        );
        *self = Self::new();
    }
}

pub struct PipelineDriver<S = Box<dyn VideoSource>, D = Box<dyn Detector>> {
    source: S,
    detector: D,
    annotator: Annotator,
    config: DriverConfig,

    // 驱动器独占状态
    points: Vec<Point>,
    state: PipelineState,
    smoother: CountSmoother,
    status: Status,
    frame_number: u64,

    // 发布
    status_tx: watch::Sender<Status>,
    frame_tx: watch::Sender<Option<Arc<AnnotatedFrame>>>,
    state_tx: watch::Sender<PipelineState>,
    zone_tx: watch::Sender<Vec<Point>>,

    // 控制
    control_tx: Sender<ControlMessage>,
    control_rx: Receiver<ControlMessage>,

    stats: TickStats,
}

impl<S: VideoSource, D: Detector> PipelineDriver<S, D> {
    pub fn new(source: S, detector: D, annotator: Annotator, config: DriverConfig) -> Self {
        let (status_tx, _) = watch::channel(Status::default());
        let (frame_tx, _) = watch::channel(None);
        let (state_tx, _) = watch::channel(PipelineState::Idle);
        let (zone_tx, _) = watch::channel(Vec::new());
        let (control_tx, control_rx) = unbounded();

        if config.classes.is_empty() {
            warn!("⚠️ 没有可统计的类别,计数将始终为 0");
        }

        Self {
            source,
            detector,
            annotator,
            smoother: CountSmoother::new(config.smooth_window),
            config,
            points: Vec::new(),
            state: PipelineState::Idle,
            status: Status::default(),
            frame_number: 0,
            status_tx,
            frame_tx,
            state_tx,
            zone_tx,
            control_tx,
            control_rx,
            stats: TickStats::new(),
        }
    }

    /// 读端句柄
    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            status: self.status_tx.subscribe(),
            frame: self.frame_tx.subscribe(),
            state: self.state_tx.subscribe(),
            zone: self.zone_tx.subscribe(),
            control: self.control_tx.clone(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn smoother(&self) -> &CountSmoother {
        &self.smoother
    }

    pub fn source_description(&self) -> String {
        self.source.describe()
    }

    // ========== 区域控制 ==========

    /// 追加区域点 (仅 IDLE)
    pub fn add_point(&mut self, p: Point) {
        if self.state == PipelineState::Armed {
            warn!("⚠️ 区域已启用,忽略新点 {} (先重置)", p);
            return;
        }
        self.points.push(p);
        debug!("📍 区域点 #{}: {}", self.points.len(), p);
        self.publish_zone();
    }

    /// IDLE → ARMED,必要时补上闭合点; 返回点数
    pub fn arm(&mut self) -> Result<usize> {
        if self.state == PipelineState::Armed {
            return Ok(self.points.len());
        }
        if Region::build(&self.points).is_none() {
            return Err(PipelineError::InvalidRegion {
                points: self.points.clone(),
            });
        }

        if let (Some(&first), Some(&last)) = (self.points.first(), self.points.last()) {
            if first != last {
                self.points.push(first);
            }
        }
        self.smoother.reset();
        self.set_state(PipelineState::Armed);
        self.publish_zone();
        info!("✅ 区域已启用: {} 个点", self.points.len());
        Ok(self.points.len())
    }

    /// 替换区域并启用; 点列无效时保持原状
    pub fn replace_zone(&mut self, points: Vec<Point>) -> Result<usize> {
        if Region::build(&points).is_none() {
            return Err(PipelineError::InvalidRegion { points });
        }
        self.points = points;
        self.state = PipelineState::Idle;
        self.arm()
    }

    /// ARMED → IDLE,清空点列与计数历史
    pub fn reset(&mut self) {
        self.points.clear();
        self.smoother.reset();
        self.set_state(PipelineState::Idle);
        self.publish_zone();
        info!("🔄 区域已重置");
    }

    fn set_state(&mut self, state: PipelineState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn publish_zone(&self) {
        self.zone_tx.send_replace(self.points.clone());
    }

    /// 应用排队的控制消息
    fn drain_control(&mut self) {
        while let Ok(msg) = self.control_rx.try_recv() {
            match msg {
                ControlMessage::AddPoint(p) => self.add_point(p),
                ControlMessage::Arm { reply } => {
                    let result = self.arm();
                    Self::respond(reply, result);
                }
                ControlMessage::ReplaceZone { points, reply } => {
                    let result = self.replace_zone(points);
                    Self::respond(reply, result);
                }
                ControlMessage::Reset => self.reset(),
            }
        }
    }

    fn respond(reply: Option<Reply>, result: Result<usize>) {
        match reply {
            Some(tx) => {
                // 请求方可能已放弃等待
                let _ = tx.send(result);
            }
            None => {
                if let Err(e) = result {
                    warn!("⚠️ {}", e);
                }
            }
        }
    }

    // ========== 逐帧处理 ==========

    /// 执行一帧
    ///
    /// 视频源无帧时发布占位帧并返回 `SourceUnavailable`; 检测失败时发布未标注检测的帧,
    /// 状态保持上一帧的值。
    pub fn tick(&mut self) -> Result<Status> {
        self.drain_control();
        self.stats.ticks += 1;

        let Some(mut img) = self.source.read() else {
            let (w, h) = self.config.placeholder_size;
            let placeholder = self.annotator.placeholder(w, h);
            self.publish_frame(placeholder, true);
            return Err(PipelineError::SourceUnavailable);
        };
        if self.config.mirror {
            imageops::flip_horizontal_in_place(&mut img);
        }

        let counting = self.state == PipelineState::Armed || self.config.count_when_idle;
        if !counting {
            self.draw(&mut img, None, &[], None);
            self.publish_frame(img, false);
            return Ok(self.status);
        }

        let region = match self.state {
            PipelineState::Armed => Region::build(&self.points),
            PipelineState::Idle => None,
        };

        let t = Instant::now();
        let predicted = self.detector.predict(&img, &self.config.params);
        self.stats.detect_time += t.elapsed();
        self.stats.detect_calls += 1;

        let detections = match predicted {
            Ok(dets) => dets,
            Err(e) => {
                let held = Some((self.status.stable_count, self.status.raw_count));
                self.draw(&mut img, region.as_ref(), &[], held);
                self.publish_frame(img, false);
                return Err(PipelineError::Detector(e));
            }
        };

        let reduction = reduce(
            &detections,
            &self.config.classes,
            region.as_ref(),
            self.config.options,
        );
        self.smoother.push(reduction.raw_count);
        let status = Status {
            raw_count: reduction.raw_count,
            stable_count: self.smoother.stable(),
            timestamp: unix_timestamp(),
        };

        self.draw(
            &mut img,
            region.as_ref(),
            &reduction.detections,
            Some((status.stable_count, status.raw_count)),
        );

        self.status = status;
        self.status_tx.send_replace(status);
        self.publish_frame(img, false);
        Ok(status)
    }

    fn draw(
        &self,
        img: &mut RgbImage,
        region: Option<&Region>,
        detections: &[FilteredDetection],
        counts: Option<(u32, u32)>,
    ) {
        let overlay = Overlay {
            points: &self.points,
            region,
            armed: self.state == PipelineState::Armed,
            detections,
            names: self.detector.names(),
            counts,
        };
        self.annotator.annotate(Some(img), &overlay);
    }

    fn publish_frame(&mut self, image: RgbImage, placeholder: bool) {
        self.frame_number += 1;
        self.frame_tx.send_replace(Some(Arc::new(AnnotatedFrame {
            image,
            frame_number: self.frame_number,
            placeholder,
        })));
    }

    /// 循环执行直到 `running` 被清除; 单帧失败只记录日志
    pub fn run(&mut self, running: &AtomicBool) {
        info!("🚀 流水线启动: {}", self.source.describe());
        self.detector.summary();

        let mut source_down = false;
        while running.load(Ordering::Relaxed) {
            match self.tick() {
                Ok(_) => {
                    if source_down {
                        info!("✅ 视频源已恢复");
                        source_down = false;
                    }
                }
                Err(PipelineError::SourceUnavailable) => {
                    if !source_down {
                        warn!("⚠️ 视频源无帧,输出占位帧");
                        source_down = true;
                    }
                    std::thread::sleep(SOURCE_RETRY);
                }
                Err(e) => error!("❌ {}", e),
            }
            self.stats.maybe_log(&self.status, self.state);
        }

        info!("🛑 流水线已停止");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Detection;
    use crate::pipeline::testing::{FakeDetector, FakeSource};

    /// 中心点在 (cx, cy) 的人
    fn person_at(cx: f32, cy: f32) -> Detection {
        Detection::new(0, 0.9, cx - 10., cy - 10., cx + 10., cy + 10.)
    }

    fn square() -> Vec<Point> {
        vec![
            Point::new(0, 0),
            Point::new(0, 100),
            Point::new(100, 100),
            Point::new(100, 0),
        ]
    }

    fn driver(
        source: FakeSource,
        detector: FakeDetector,
        config: DriverConfig,
    ) -> PipelineDriver<FakeSource, FakeDetector> {
        PipelineDriver::new(source, detector, Annotator::default(), config)
    }

    #[test]
    fn test_idle_does_not_call_detector() {
        let det = FakeDetector::new(vec![person_at(50., 50.)]);
        let calls = det.calls();
        let mut d = driver(FakeSource::always(), det, DriverConfig::default());
        let handle = d.handle();

        let status = d.tick().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(status, Status::default());
        assert_eq!(handle.status().timestamp, 0.0);
        let frame = handle.latest_frame().unwrap();
        assert!(!frame.placeholder);
        assert_eq!(frame.frame_number, 1);
    }

    #[test]
    fn test_arm_requires_three_points() {
        let mut d = driver(
            FakeSource::always(),
            FakeDetector::new(vec![]),
            DriverConfig::default(),
        );
        d.add_point(Point::new(0, 0));
        d.add_point(Point::new(10, 0));
        assert!(matches!(
            d.arm(),
            Err(PipelineError::InvalidRegion { ref points }) if points.len() == 2
        ));
        assert_eq!(d.state(), PipelineState::Idle);
    }

    #[test]
    fn test_arm_appends_closing_point() {
        let mut d = driver(
            FakeSource::always(),
            FakeDetector::new(vec![]),
            DriverConfig::default(),
        );
        for p in [Point::new(0, 0), Point::new(0, 100), Point::new(100, 100)] {
            d.add_point(p);
        }
        assert_eq!(d.arm().unwrap(), 4);
        assert_eq!(d.points().first(), d.points().last());
        assert_eq!(d.state(), PipelineState::Armed);

        // 重复启用不再追加
        assert_eq!(d.arm().unwrap(), 4);

        // 闭合前后包含测试一致
        let open = Region::build(&d.points()[..3]).unwrap();
        let closed = Region::build(d.points()).unwrap();
        for p in [Point::new(10, 50), Point::new(90, 10), Point::new(50, 50), Point::new(200, 5)] {
            assert_eq!(open.contains_point(p), closed.contains_point(p));
        }
    }

    #[test]
    fn test_armed_counts_inside_only() {
        let det = FakeDetector::new(vec![person_at(50., 50.), person_at(150., 150.)]);
        let mut d = driver(FakeSource::always(), det, DriverConfig::default());
        d.replace_zone(square()).unwrap();
        let handle = d.handle();

        let status = d.tick().unwrap();
        assert_eq!(status.raw_count, 1);
        assert_eq!(status.stable_count, 1);
        assert!(status.timestamp > 0.0);
        assert_eq!(handle.status(), status);
    }

    #[test]
    fn test_add_point_ignored_while_armed() {
        let mut d = driver(
            FakeSource::always(),
            FakeDetector::new(vec![]),
            DriverConfig::default(),
        );
        d.replace_zone(square()).unwrap();
        let n = d.points().len();
        d.add_point(Point::new(500, 500));
        assert_eq!(d.points().len(), n);
    }

    #[test]
    fn test_smoothing_over_ticks() {
        let det = FakeDetector::new(vec![person_at(50., 50.)])
            .then(Some(vec![person_at(50., 50.)]))
            .then(Some(vec![person_at(50., 50.)]))
            .then(Some(vec![]))
            .then(Some(vec![person_at(50., 50.)]));
        let mut d = driver(FakeSource::always(), det, DriverConfig::default());
        d.replace_zone(square()).unwrap();

        let mut last = Status::default();
        for _ in 0..3 {
            last = d.tick().unwrap();
        }
        // 第 3 帧漏检: raw=0, 中位数仍为 1
        assert_eq!(last.raw_count, 0);
        assert_eq!(last.stable_count, 1);
    }

    #[test]
    fn test_missing_frame_keeps_status() {
        let det = FakeDetector::new(vec![person_at(50., 50.)]);
        let calls = det.calls();
        let mut d = driver(FakeSource::scripted(&[true, false]), det, DriverConfig::default());
        d.replace_zone(square()).unwrap();
        let handle = d.handle();

        let first = d.tick().unwrap();
        assert!(matches!(d.tick(), Err(PipelineError::SourceUnavailable)));
        assert_eq!(handle.status(), first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let frame = handle.latest_frame().unwrap();
        assert!(frame.placeholder);
        assert_eq!(frame.image.dimensions(), PLACEHOLDER_SIZE);
    }

    #[test]
    fn test_detector_failure_holds_status() {
        let det = FakeDetector::new(vec![person_at(50., 50.)])
            .then(Some(vec![person_at(50., 50.), person_at(60., 60.)]))
            .then(None);
        let mut d = driver(FakeSource::always(), det, DriverConfig::default());
        d.replace_zone(square()).unwrap();
        let handle = d.handle();

        let first = d.tick().unwrap();
        assert_eq!(first.raw_count, 2);
        assert!(matches!(d.tick(), Err(PipelineError::Detector(_))));
        assert_eq!(handle.status(), first);
        assert_eq!(d.smoother().len(), 1);
        assert!(!handle.latest_frame().unwrap().placeholder);

        // 下一帧恢复
        assert_eq!(d.tick().unwrap().raw_count, 1);
    }

    #[test]
    fn test_reset_clears_zone_and_history() {
        let mut d = driver(
            FakeSource::always(),
            FakeDetector::new(vec![person_at(50., 50.)]),
            DriverConfig::default(),
        );
        d.replace_zone(square()).unwrap();
        d.tick().unwrap();
        d.reset();
        assert_eq!(d.state(), PipelineState::Idle);
        assert!(d.points().is_empty());
        assert!(d.smoother().is_empty());
    }

    #[test]
    fn test_count_when_idle_counts_everything() {
        let det = FakeDetector::new(vec![
            person_at(50., 50.),
            person_at(150., 150.),
            person_at(10., 190.),
        ]);
        let config = DriverConfig {
            count_when_idle: true,
            ..Default::default()
        };
        let mut d = driver(FakeSource::always(), det, config);
        assert_eq!(d.tick().unwrap().raw_count, 3);
    }

    #[test]
    fn test_class_filter_applies() {
        let det = FakeDetector::new(vec![
            person_at(50., 50.),
            Detection::new(2, 0.9, 40., 40., 60., 60.),
        ]);
        let config = DriverConfig {
            classes: ClassFilter::only([2]),
            ..Default::default()
        };
        let mut d = driver(FakeSource::always(), det, config);
        d.replace_zone(square()).unwrap();
        assert_eq!(d.tick().unwrap().raw_count, 1);
    }

    #[test]
    fn test_control_messages_apply_between_ticks() {
        let mut d = driver(
            FakeSource::always(),
            FakeDetector::new(vec![person_at(50., 50.)]),
            DriverConfig::default(),
        );
        let handle = d.handle();
        for p in square() {
            handle.add_point(p).unwrap();
        }
        // 未处理前仍为 IDLE
        assert_eq!(d.state(), PipelineState::Idle);

        d.tick().unwrap();
        assert_eq!(handle.zone().len(), 4);
        assert_eq!(handle.state(), PipelineState::Idle);

        handle
            .control
            .send(ControlMessage::Arm { reply: None })
            .unwrap();
        let status = d.tick().unwrap();
        assert_eq!(handle.state(), PipelineState::Armed);
        assert_eq!(handle.zone().len(), 5);
        assert_eq!(status.raw_count, 1);

        handle.reset().unwrap();
        d.tick().unwrap();
        assert_eq!(handle.state(), PipelineState::Idle);
        assert!(handle.zone().is_empty());
    }

    #[test]
    fn test_run_stops_on_flag() {
        let running = Arc::new(AtomicBool::new(true));
        let mut d = driver(
            FakeSource::always(),
            FakeDetector::new(vec![]),
            DriverConfig::default(),
        );
        let handle = d.handle();
        let flag = running.clone();
        let worker = std::thread::spawn(move || d.run(&flag));

        let started = Instant::now();
        while handle.latest_frame().is_none() && started.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(5));
        }
        running.store(false, Ordering::Relaxed);
        worker.join().unwrap();
        assert!(handle.latest_frame().is_some());
    }
}
