/// 双目测距实时叠加 - 视差转深度 + 目标检测融合
///
/// 主程序入口 - 直接运行: cargo run --bin stereo-distance --release
use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use stereo_distance::device::{Calibration, SimulatedDevice};
use stereo_distance::display::{HeadlessDisplay, QuitSignal};
use stereo_distance::fusion::OverlayRenderer;
use stereo_distance::sink::StreamSink;
use stereo_distance::stream::device_channels;
use stereo_distance::{Args, ControlLoop, DetectionFuser, FusionConfig, FusionError, LoopOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stereo_distance={},detections=info", args.log_level)));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    info!("🚀 双目测距叠加启动");

    // 1. 配置
    let mut config = FusionConfig::load(&args.config)?;
    config.apply_args(&args);
    config.print_summary();

    // 2. 启动资源校验 (连接设备前)
    if let Some(model) = &args.model {
        if !model.exists() {
            return Err(FusionError::MissingAsset(model.clone()).into());
        }
        info!("🧠 检测模型: {}", model.display());
    }
    let geometry = config.geometry()?;
    let allow = config.allow_list()?;
    let calibration = match &args.calibration {
        Some(path) => Calibration::load(path)?,
        None => {
            info!("📐 未指定标定文件,使用理想内参");
            Calibration::nominal(&geometry, config.baseline_m)
        }
    };
    let constants = calibration.constants(config.max_disparity)?;
    let renderer = match &args.font {
        Some(font) => OverlayRenderer::with_font(config.overlay.clone(), font)?,
        None => OverlayRenderer::new(config.overlay.clone()),
    };
    info!(
        "🔤 叠加文字: {}",
        if renderer.has_font() { "TTF字体" } else { "内置点阵字" }
    );

    // 3. 输出端
    let sink = StreamSink::create(&args.output)?;
    let display = HeadlessDisplay::new(args.snapshot_dir.clone(), args.snapshot_every)?;
    let quit = QuitSignal::new();
    quit.install_ctrlc()?;

    // 4. 设备
    let (producers, streams) = device_channels(config.queues);
    let device = SimulatedDevice::new(config.simulation.clone(), geometry, config.max_disparity);
    let mut device = device.spawn(producers).context("启动模拟设备失败")?;

    // 5. 控制循环
    let options = LoopOptions {
        idle_sleep: Duration::from_millis(config.idle_sleep_ms),
        max_ticks: args.max_ticks,
        timeout: args.timeout.map(Duration::from_secs),
    };
    let mut control = ControlLoop::new(
        streams,
        constants,
        DetectionFuser::new(allow, geometry),
        renderer,
        sink,
        display,
        quit,
        options,
    );
    let summary = control.run();
    drop(control);
    device.stop();

    info!(
        "👋 退出: {} tick, 渲染{}帧, 码流{}块",
        summary.ticks, summary.rendered, summary.chunks
    );
    Ok(())
}
