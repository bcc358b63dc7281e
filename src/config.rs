//! 配置 - 命令行参数 + JSON配置文件

use crate::device::SimulationConfig;
use crate::error::FusionResult;
use crate::fusion::labels::DEFAULT_INCLUDED;
use crate::fusion::{AllowList, OverlayStyle, SensorGeometry, types};
use crate::stream::QueueDepths;
use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 双目测距叠加程序参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "双目视差 + 目标检测 实时测距叠加", long_about = None)]
pub struct Args {
    /// JSON配置文件 (不存在时写入默认配置)
    #[arg(short, long, default_value = "stereo_distance.json")]
    pub config: PathBuf,

    /// H.265裸码流输出文件
    #[arg(short, long, default_value = "video.h265")]
    pub output: PathBuf,

    /// 检测模型文件 (指定时必须存在)
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// 标定文件 (JSON: intrinsics + baseline_m)
    #[arg(long)]
    pub calibration: Option<PathBuf>,

    /// 叠加文字字体 (TTF/OTF), 不指定时使用内置点阵字
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// 叠加结果快照目录
    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,

    /// 每隔多少帧保存一张快照
    #[arg(long, default_value_t = 30)]
    pub snapshot_every: u64,

    /// 覆盖配置中的传感器宽度
    #[arg(long)]
    pub sensor_width: Option<u32>,

    /// 覆盖配置中的传感器高度
    #[arg(long)]
    pub sensor_height: Option<u32>,

    /// 最多运行的tick数
    #[arg(long)]
    pub max_ticks: Option<u64>,

    /// 运行时长上限 (秒)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// 日志级别 (RUST_LOG 优先)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// 融合参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    // === 传感器 ===
    pub sensor_width: u32,  // 400P 单目分辨率
    pub sensor_height: u32,

    // === 标定 ===
    pub baseline_m: f32,    // 双目基线(米)
    pub max_disparity: f32, // 最大视差,用于归一化

    // === 队列 ===
    pub queues: QueueDepths,

    // === 渲染 ===
    pub included_labels: Vec<String>, // 渲染白名单
    pub overlay: OverlayStyle,

    // === 控制循环 ===
    pub idle_sleep_ms: u64, // 所有通道都为空时的休眠

    // === 模拟设备 ===
    pub simulation: SimulationConfig,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            sensor_width: 640,
            sensor_height: 400,
            baseline_m: types::DEFAULT_BASELINE_M,
            max_disparity: types::DEFAULT_MAX_DISPARITY,
            queues: QueueDepths::default(),
            included_labels: DEFAULT_INCLUDED.iter().map(|s| s.to_string()).collect(),
            overlay: OverlayStyle::default(),
            idle_sleep_ms: 1,
            simulation: SimulationConfig::default(),
        }
    }
}

impl FusionConfig {
    /// 从JSON文件加载配置
    ///
    /// 文件不存在时写入并使用默认配置; 文件存在但解析失败是启动错误,
    /// 不会悄悄退回默认白名单。
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(json) => {
                let config = serde_json::from_str(&json)
                    .with_context(|| format!("配置文件解析失败 {}", path.display()))?;
                info!("✅ 配置已从 {} 加载", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                config.save(path);
                Ok(config)
            }
            Err(e) => Err(e).with_context(|| format!("无法读取配置文件 {}", path.display())),
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("❌ 保存配置失败: {}", e);
                } else {
                    info!("💾 配置已保存到 {}", path.display());
                }
            }
            Err(e) => warn!("❌ 序列化配置失败: {}", e),
        }
    }

    /// 命令行参数覆盖配置文件
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(width) = args.sensor_width {
            self.sensor_width = width;
        }
        if let Some(height) = args.sensor_height {
            self.sensor_height = height;
        }
    }

    /// 校验白名单,未知类别名直接报错
    pub fn allow_list(&self) -> FusionResult<AllowList> {
        AllowList::from_names(&self.included_labels)
    }

    pub fn geometry(&self) -> FusionResult<SensorGeometry> {
        SensorGeometry::new(self.sensor_width, self.sensor_height)
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前融合配置:");
        info!("  传感器: {}x{}", self.sensor_width, self.sensor_height);
        info!("  基线: {:.3}m | 最大视差: {}", self.baseline_m, self.max_disparity);
        info!(
            "  队列深度: 视觉{} | 码流{}",
            self.queues.vision, self.queues.encoded
        );
        info!("  渲染类别: {}", self.included_labels.join(", "));
    }
}
