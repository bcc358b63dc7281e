//! 标定数据 (Calibration collaborator)
//!
//! 设备启动时提供右目内参矩阵,焦距取左上角元素;基线使用固定物理常量。

use crate::error::FusionResult;
use crate::fusion::{CalibrationConstants, SensorGeometry};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// OV9282 单目水平视场角 (度)
const MONO_HFOV_DEG: f32 = 71.86;

fn default_baseline() -> f32 {
    crate::fusion::types::DEFAULT_BASELINE_M
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub intrinsics: [[f32; 3]; 3],
    #[serde(default = "default_baseline")]
    pub baseline_m: f32,
}

impl Calibration {
    /// 从JSON文件读取
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取标定文件 {}", path.display()))?;
        let calib: Calibration = serde_json::from_str(&json)
            .with_context(|| format!("标定文件格式错误 {}", path.display()))?;
        info!(
            "📐 标定已加载: fx={:.2}, baseline={:.3}m",
            calib.intrinsics[0][0], calib.baseline_m
        );
        Ok(calib)
    }

    /// 没有标定文件时,按视场角估算的理想针孔内参
    pub fn nominal(geometry: &SensorGeometry, baseline_m: f32) -> Self {
        let w = geometry.width() as f32;
        let h = geometry.height() as f32;
        let fx = (w / 2.0) / (MONO_HFOV_DEG.to_radians() / 2.0).tan();
        Self {
            intrinsics: [[fx, 0.0, w / 2.0], [0.0, fx, h / 2.0], [0.0, 0.0, 1.0]],
            baseline_m,
        }
    }

    pub fn focal_length_px(&self) -> f32 {
        self.intrinsics[0][0]
    }

    pub fn constants(&self, max_disparity: f32) -> FusionResult<CalibrationConstants> {
        CalibrationConstants::from_intrinsics(&self.intrinsics, self.baseline_m, max_disparity)
    }
}
