/// 控制循环 (Control loop)
///
/// 每个tick: 轮询 → 码流落盘 → 视差转深度 → 检测融合 → 叠加渲染 → 显示 → 检查退出。
/// 状态: Polling (还没有视差帧) / Rendering / Terminated (终态)。
use crate::display::{Display, QuitSignal, QUIT_KEY};
use crate::fusion::{
    AnnotatedFrame, CalibrationConstants, ConvertedDepth, DepthConverter, DetectionFuser,
    EnrichedDetection, OverlayRenderer,
};
use crate::sink::StreamSink;
use crate::stream::{DeviceStreams, PollReport, StreamSynchronizer, SynchronizerState};
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Polling,
    Rendering,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Stop,
}

/// 额外的退出条件
#[derive(Debug, Clone, Copy)]
pub struct LoopOptions {
    pub idle_sleep: Duration,
    pub max_ticks: Option<u64>,
    pub timeout: Option<Duration>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            idle_sleep: Duration::from_millis(1),
            max_ticks: None,
            timeout: None,
        }
    }
}

/// 一次融合的输出
#[derive(Clone, Debug)]
pub struct FusedFrame {
    pub annotated: AnnotatedFrame,
    pub detections: Vec<EnrichedDetection>,
    pub disparity_tick: u64,
    /// 检测结果比视差帧旧多少个tick (负数表示更新)
    pub detection_age_ticks: Option<i64>,
}

/// 运行统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub ticks: u64,
    pub rendered: u64,
    pub chunks: u64,
    pub bytes: u64,
}

pub struct ControlLoop<W: Write, D: Display> {
    synchronizer: StreamSynchronizer,
    state: SynchronizerState,
    converter: DepthConverter,
    fuser: DetectionFuser,
    renderer: OverlayRenderer,
    sink: StreamSink<W>,
    display: D,
    quit: QuitSignal,
    options: LoopOptions,

    loop_state: LoopState,
    tick: u64,
    started: Instant,
    converted: Option<(u64, ConvertedDepth)>, // (视差帧tick, 转换结果)
    last_frame: Option<FusedFrame>,
    last_report: PollReport,
    last_chunks: usize,

    // 统计
    summary: LoopSummary,
    stats_last: Instant,
    stats_rendered: u64,
}

impl<W: Write, D: Display> ControlLoop<W, D> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        streams: DeviceStreams,
        calibration: CalibrationConstants,
        fuser: DetectionFuser,
        renderer: OverlayRenderer,
        sink: StreamSink<W>,
        display: D,
        quit: QuitSignal,
        options: LoopOptions,
    ) -> Self {
        Self {
            synchronizer: StreamSynchronizer::new(streams),
            state: SynchronizerState::default(),
            converter: DepthConverter::new(calibration),
            fuser,
            renderer,
            sink,
            display,
            quit,
            options,
            loop_state: LoopState::Polling,
            tick: 0,
            started: Instant::now(),
            converted: None,
            last_frame: None,
            last_report: PollReport::default(),
            last_chunks: 0,
            summary: LoopSummary::default(),
            stats_last: Instant::now(),
            stats_rendered: 0,
        }
    }

    pub fn loop_state(&self) -> LoopState {
        self.loop_state
    }

    pub fn state(&self) -> &SynchronizerState {
        &self.state
    }

    pub fn last_frame(&self) -> Option<&FusedFrame> {
        self.last_frame.as_ref()
    }

    pub fn sink(&self) -> &StreamSink<W> {
        &self.sink
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn summary(&self) -> LoopSummary {
        self.summary
    }

    /// 本tick是否没有任何新数据
    fn idle(&self) -> bool {
        !self.last_report.any() && self.last_chunks == 0
    }

    /// 执行一次tick
    pub fn tick(&mut self) -> TickOutcome {
        if self.loop_state == LoopState::Terminated {
            return TickOutcome::Stop;
        }

        self.tick += 1;
        self.summary.ticks = self.tick;

        // 1. 轮询缓存通道
        self.last_report = self.synchronizer.poll(&mut self.state, self.tick);

        // 2. 码流全部取出并按顺序写入
        let chunks = self.synchronizer.drain_all();
        self.last_chunks = chunks.len();
        for chunk in &chunks {
            if let Err(e) = self.sink.write_chunk(chunk) {
                error!("❌ 码流写入失败: {}", e);
                self.terminate();
                return TickOutcome::Stop;
            }
            self.summary.chunks += 1;
            self.summary.bytes += chunk.len() as u64;
        }
        if !chunks.is_empty() {
            if let Err(e) = self.sink.flush() {
                error!("❌ 码流刷新失败: {}", e);
                self.terminate();
                return TickOutcome::Stop;
            }
        }

        // 3. 只要缓存过视差帧就渲染 (转换结果按帧复用)
        if self.state.disparity.is_some() {
            self.loop_state = LoopState::Rendering;
            self.render();
        }

        // 4. 每tick检查一次退出
        if self.should_quit() {
            self.terminate();
            return TickOutcome::Stop;
        }

        self.log_stats();
        TickOutcome::Continue
    }

    fn render(&mut self) {
        let Some(disparity) = self.state.disparity.as_ref() else {
            return;
        };

        // 同一视差帧只转换一次
        let fresh = !matches!(&self.converted, Some((tick, _)) if *tick == disparity.tick);
        if fresh {
            let converted = self.converter.convert(&disparity.value);
            self.converted = Some((disparity.tick, converted));
        }
        let Some((disparity_tick, converted)) = self.converted.as_ref() else {
            return;
        };

        // 检测结果可能比视差帧旧或新,尽力而为
        let detections = self
            .state
            .detections
            .as_ref()
            .map(|c| c.value.as_slice())
            .unwrap_or(&[]);
        let detection_age_ticks = self.state.detection_age_ticks();
        if let Some(age) = detection_age_ticks.filter(|age| *age != 0) {
            debug!("检测结果与视差帧相差 {} tick", age);
        }

        let enriched = self.fuser.fuse(detections, &converted.depth);
        let annotated = self.renderer.render(&converted.colorized, &enriched);

        if let Err(e) = self.display.show(&annotated.image) {
            warn!("⚠️  显示失败: {}", e);
        }

        self.summary.rendered += 1;
        self.stats_rendered += 1;
        self.last_frame = Some(FusedFrame {
            annotated,
            detections: enriched,
            disparity_tick: *disparity_tick,
            detection_age_ticks,
        });
    }

    fn should_quit(&mut self) -> bool {
        if self.quit.is_set() {
            info!("🛑 收到退出信号");
            return true;
        }
        if self.display.poll_key() == Some(QUIT_KEY) {
            info!("🛑 按键退出");
            return true;
        }
        if self.options.max_ticks.is_some_and(|max| self.tick >= max) {
            info!("🛑 达到tick上限 {}", self.tick);
            return true;
        }
        if self
            .options
            .timeout
            .is_some_and(|timeout| self.started.elapsed() >= timeout)
        {
            info!("🛑 运行超时");
            return true;
        }
        false
    }

    /// 进入终态并释放资源 (只执行一次)
    fn terminate(&mut self) {
        if self.loop_state == LoopState::Terminated {
            return;
        }
        self.loop_state = LoopState::Terminated;
        match self.sink.close() {
            Ok(true) => {
                let path = self.sink.path().display();
                info!(
                    "💾 码流已保存 {} ({} 字节)",
                    path,
                    self.sink.bytes_written()
                );
                info!("💡 转换为MP4: ffmpeg -framerate 30 -i {} -c copy {}.mp4", path, path);
            }
            Ok(false) => {}
            Err(e) => error!("❌ 关闭码流文件失败: {}", e),
        }
        self.display.close();
    }

    fn log_stats(&mut self) {
        let elapsed = self.stats_last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            info!(
                "📊 融合统计: tick {} | 渲染{}帧 | {:.1}fps | 码流{}块/{}字节",
                self.tick,
                self.summary.rendered,
                self.stats_rendered as f64 / elapsed,
                self.summary.chunks,
                self.summary.bytes
            );
            self.stats_last = Instant::now();
            self.stats_rendered = 0;
        }
    }

    /// 运行直到终止; 空闲tick短暂休眠避免占满CPU
    pub fn run(&mut self) -> LoopSummary {
        info!("✅ 控制循环启动,按 Ctrl+C 或 '{}' 退出", QUIT_KEY);
        while self.tick() == TickOutcome::Continue {
            if self.idle() {
                std::thread::sleep(self.options.idle_sleep);
            }
        }
        info!(
            "✅ 控制循环结束: {} tick, 渲染{}帧, 码流{}字节",
            self.summary.ticks, self.summary.rendered, self.summary.bytes
        );
        self.summary
    }
}

impl<W: Write, D: Display> Drop for ControlLoop<W, D> {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::{
        AllowList, Detection, DisparityMap, Label, OverlayStyle, SensorGeometry,
    };
    use crate::sink::tests::{FailingWriter, SharedBuffer};
    use crate::stream::{device_channels, DeviceProducers, QueueDepths};
    use anyhow::Result;
    use image::RgbImage;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::rc::Rc;

    /// 记录显示帧并按脚本返回按键
    #[derive(Default)]
    struct ScriptedDisplay {
        frames: Rc<RefCell<Vec<RgbImage>>>,
        keys: VecDeque<Option<char>>,
        closes: Rc<RefCell<u32>>,
    }

    impl Display for ScriptedDisplay {
        fn show(&mut self, frame: &RgbImage) -> Result<()> {
            self.frames.borrow_mut().push(frame.clone());
            Ok(())
        }

        fn poll_key(&mut self) -> Option<char> {
            self.keys.pop_front().flatten()
        }

        fn close(&mut self) {
            *self.closes.borrow_mut() += 1;
        }
    }

    struct Harness {
        producers: DeviceProducers,
        control: ControlLoop<SharedBuffer, ScriptedDisplay>,
        buffer: SharedBuffer,
        frames: Rc<RefCell<Vec<RgbImage>>>,
        closes: Rc<RefCell<u32>>,
        quit: QuitSignal,
    }

    fn harness(keys: Vec<Option<char>>, options: LoopOptions) -> Harness {
        let (producers, streams) = device_channels(QueueDepths::default());
        let buffer = SharedBuffer::default();
        let sink = StreamSink::from_writer(buffer.handle(), PathBuf::from("mem.h265"));
        let display = ScriptedDisplay {
            keys: keys.into(),
            ..Default::default()
        };
        let frames = display.frames.clone();
        let closes = display.closes.clone();
        let quit = QuitSignal::new();
        let calibration = CalibrationConstants::new(450.0, 0.075, 96.0).unwrap();
        let fuser = DetectionFuser::new(AllowList::default(), SensorGeometry::new(640, 400).unwrap());
        let control = ControlLoop::new(
            streams,
            calibration,
            fuser,
            OverlayRenderer::new(OverlayStyle::default()),
            sink,
            display,
            quit.clone(),
            options,
        );
        Harness {
            producers,
            control,
            buffer,
            frames,
            closes,
            quit,
        }
    }

    fn person() -> Detection {
        Detection::new(Label::Person, 0.8, [0.4, 0.4, 0.6, 0.6])
    }

    #[test]
    fn test_polling_until_disparity_arrives() {
        let mut h = harness(vec![], LoopOptions::default());
        h.producers.nn.send(vec![person()]);
        h.producers.h265.send(vec![0, 0, 0, 1, 2]).unwrap();

        assert_eq!(h.control.tick(), TickOutcome::Continue);
        assert_eq!(h.control.loop_state(), LoopState::Polling);
        assert!(h.frames.borrow().is_empty());
        // 码流不依赖渲染
        assert_eq!(*h.buffer.data.borrow(), vec![0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_render_with_cached_detections() {
        let mut h = harness(vec![], LoopOptions::default());
        h.producers.nn.send(vec![person()]);
        h.control.tick();

        // 检测结果来自更早的tick
        h.producers.disparity.send(DisparityMap::from_elem((400, 640), 48));
        h.control.tick();
        assert_eq!(h.control.loop_state(), LoopState::Rendering);
        assert_eq!(h.frames.borrow().len(), 1);

        let frame = h.control.last_frame().unwrap();
        assert_eq!(frame.detection_age_ticks, Some(1));
        assert_eq!(frame.detections.len(), 1);
        // 48 * 255/96 = 127.5 → 128, 深度 = 33.75/128
        assert!((frame.detections[0].center_depth_m - 33.75 / 128.0).abs() < 1e-6);
        assert_eq!(
            frame.annotated.log_lines,
            vec!["Item Classification: person, Distance: 0.26m, Confidence: 80%".to_string()]
        );
    }

    #[test]
    fn test_disallowed_label_renders_nothing() {
        let mut h = harness(vec![], LoopOptions::default());
        h.producers
            .nn
            .send(vec![Detection::new(Label::Dog, 0.9, [0.1, 0.1, 0.5, 0.5])]);
        h.producers.disparity.send(DisparityMap::from_elem((400, 640), 10));
        h.control.tick();
        let frame = h.control.last_frame().unwrap();
        assert!(frame.detections.is_empty());
        assert!(frame.annotated.log_lines.is_empty());
    }

    #[test]
    fn test_idle_tick_still_renders_cached_frame() {
        let mut h = harness(vec![], LoopOptions::default());
        h.producers.disparity.send(DisparityMap::zeros((400, 640)));
        h.control.tick();
        h.control.tick();
        h.control.tick();
        assert_eq!(h.control.loop_state(), LoopState::Rendering);
        assert!(h.control.idle());
        // 每个tick都显示一帧,但同一视差帧只转换一次
        assert_eq!(h.frames.borrow().len(), 3);
        assert_eq!(h.control.summary().rendered, 3);
        assert_eq!(h.control.last_frame().unwrap().disparity_tick, 1);
        let frames = h.frames.borrow();
        assert_eq!(frames[0].as_raw(), frames[2].as_raw());
    }

    #[test]
    fn test_sink_failure_terminates_loop() {
        let (producers, streams) = device_channels(QueueDepths::default());
        let display = ScriptedDisplay::default();
        let closes = display.closes.clone();
        let mut control = ControlLoop::new(
            streams,
            CalibrationConstants::new(450.0, 0.075, 96.0).unwrap(),
            DetectionFuser::new(AllowList::default(), SensorGeometry::new(640, 400).unwrap()),
            OverlayRenderer::new(OverlayStyle::default()),
            StreamSink::from_writer(FailingWriter, PathBuf::from("full.h265")),
            display,
            QuitSignal::new(),
            LoopOptions::default(),
        );
        producers.h265.send(vec![0, 0, 0, 1, 0x26]).unwrap();

        assert_eq!(control.tick(), TickOutcome::Stop);
        assert_eq!(control.loop_state(), LoopState::Terminated);
        assert_eq!(*closes.borrow(), 1);
        assert_eq!(control.tick(), TickOutcome::Stop);
        drop(control);
        assert_eq!(*closes.borrow(), 1);
    }

    #[test]
    fn test_quit_mid_tick_terminates_and_closes_once() {
        let mut h = harness(vec![], LoopOptions::default());
        h.producers.h265.send(vec![1, 2, 3]).unwrap();
        h.quit.trigger();

        assert_eq!(h.control.tick(), TickOutcome::Stop);
        assert_eq!(h.control.loop_state(), LoopState::Terminated);
        assert!(h.control.sink().is_closed());
        assert_eq!(*h.buffer.drops.borrow(), 1);
        assert_eq!(*h.closes.borrow(), 1);

        // 终态吸收: 之后的码流不再写入
        h.producers.h265.send(vec![4, 5]).unwrap();
        assert_eq!(h.control.tick(), TickOutcome::Stop);
        drop(h.control);
        assert_eq!(*h.buffer.data.borrow(), vec![1, 2, 3]);
        assert_eq!(*h.buffer.drops.borrow(), 1);
        assert_eq!(*h.closes.borrow(), 1);
    }

    #[test]
    fn test_quit_key() {
        let mut h = harness(vec![None, Some('x'), Some('q')], LoopOptions::default());
        assert_eq!(h.control.tick(), TickOutcome::Continue);
        assert_eq!(h.control.tick(), TickOutcome::Continue);
        assert_eq!(h.control.tick(), TickOutcome::Stop);
        assert_eq!(h.control.loop_state(), LoopState::Terminated);
    }

    #[test]
    fn test_run_stops_at_max_ticks() {
        let options = LoopOptions {
            idle_sleep: Duration::from_millis(0),
            max_ticks: Some(5),
            timeout: None,
        };
        let mut h = harness(vec![], options);
        h.producers.h265.send(vec![7; 10]).unwrap();
        let summary = h.control.run();
        assert_eq!(summary.ticks, 5);
        assert_eq!(summary.chunks, 1);
        assert_eq!(summary.bytes, 10);
        assert_eq!(summary.rendered, 0);
    }
}
