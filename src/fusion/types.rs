/// 融合系统数据结构定义
/// Data structures for the stereo fusion pipeline
use super::labels::Label;
use crate::error::{FusionError, FusionResult};
use image::RgbImage;
use ndarray::Array2;

// ========== 公共常量 ==========

/// OAK-D Pro 双目基线 (米)
pub const DEFAULT_BASELINE_M: f32 = 0.075;

/// 立体匹配默认最大视差 (设备默认配置)
pub const DEFAULT_MAX_DISPARITY: f32 = 95.0;

// ========== 图像/网格 ==========

/// 原始视差图 (rows = 高, cols = 宽)
pub type DisparityMap = Array2<u16>;

/// 深度可视化底图 (jet伪彩色, RGB)
pub type ColorizedDepthBase = RgbImage;

/// 深度图 (米)
///
/// 每个像素要么是正的有限距离,要么是哨兵值0 (无法计算)。
/// 创建后只读。
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    meters: Array2<f32>,
}

impl DepthMap {
    pub(crate) fn from_array(meters: Array2<f32>) -> Self {
        Self { meters }
    }

    pub fn width(&self) -> u32 {
        self.meters.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.meters.nrows() as u32
    }

    /// 按 (x, y) 取值,越界返回 None
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        self.meters.get((y as usize, x as usize)).copied()
    }

    pub fn as_array(&self) -> &Array2<f32> {
        &self.meters
    }
}

/// 原始图像帧 (right / manip 通道)
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

// ========== 检测 ==========

/// 设备端检测结果 (归一化坐标)
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: Label,
    pub confidence: f32,
    /// (xmin, ymin, xmax, ymax), 名义范围 [0,1]
    pub bbox: [f32; 4],
}

impl Detection {
    pub fn new(label: Label, confidence: f32, bbox: [f32; 4]) -> Self {
        Self {
            label,
            confidence,
            bbox,
        }
    }

    /// 置信度整数百分比 (截断)
    pub fn confidence_percent(&self) -> i32 {
        (self.confidence * 100.0) as i32
    }
}

/// 一次推理输出的检测集合,可为空
pub type DetectionSet = Vec<Detection>;

/// 传感器像素坐标系下的检测框 (已加裁剪偏移)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PixelBox {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

impl PixelBox {
    pub fn width(&self) -> i32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> i32 {
        self.ymax - self.ymin
    }
}

/// 附带像素框和中心深度的检测
#[derive(Clone, Debug, PartialEq)]
pub struct EnrichedDetection {
    pub detection: Detection,
    pub pixel_box: PixelBox,
    pub center: (u32, u32),
    pub center_depth_m: f32,
}

impl EnrichedDetection {
    pub fn label_name(&self) -> &'static str {
        self.detection.label.name()
    }

    /// 可观测输出行
    pub fn log_line(&self) -> String {
        format!(
            "Item Classification: {}, Distance: {:.2}m, Confidence: {}%",
            self.label_name(),
            self.center_depth_m,
            self.detection.confidence_percent()
        )
    }
}

// ========== 标定 ==========

/// 标定常量,会话内固定
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationConstants {
    focal_length_px: f32,
    baseline_m: f32,
    max_disparity: f32,
}

impl CalibrationConstants {
    pub fn new(focal_length_px: f32, baseline_m: f32, max_disparity: f32) -> FusionResult<Self> {
        for (name, value) in [
            ("focal length", focal_length_px),
            ("baseline", baseline_m),
            ("max disparity", max_disparity),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(FusionError::InvalidCalibration(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }
        Ok(Self {
            focal_length_px,
            baseline_m,
            max_disparity,
        })
    }

    /// 从3x3内参矩阵取焦距 (左上角元素)
    pub fn from_intrinsics(
        intrinsics: &[[f32; 3]; 3],
        baseline_m: f32,
        max_disparity: f32,
    ) -> FusionResult<Self> {
        Self::new(intrinsics[0][0], baseline_m, max_disparity)
    }

    pub fn focal_length_px(&self) -> f32 {
        self.focal_length_px
    }

    pub fn baseline_m(&self) -> f32 {
        self.baseline_m
    }

    pub fn max_disparity(&self) -> f32 {
        self.max_disparity
    }

    /// 视差 → 8位归一化倍率
    pub fn disparity_multiplier(&self) -> f32 {
        255.0 / self.max_disparity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_rejects_invalid() {
        assert!(CalibrationConstants::new(0.0, 0.075, 95.0).is_err());
        assert!(CalibrationConstants::new(450.0, -1.0, 95.0).is_err());
        assert!(CalibrationConstants::new(450.0, 0.075, f32::NAN).is_err());
        assert!(CalibrationConstants::new(450.0, 0.075, 95.0).is_ok());
    }

    #[test]
    fn test_focal_from_intrinsics() {
        let k = [[451.5, 0.0, 320.0], [0.0, 451.5, 200.0], [0.0, 0.0, 1.0]];
        let calib = CalibrationConstants::from_intrinsics(&k, 0.075, 96.0).unwrap();
        assert_eq!(calib.focal_length_px(), 451.5);
        assert!((calib.disparity_multiplier() - 2.65625).abs() < 1e-6);
    }

    #[test]
    fn test_log_line_format() {
        let det = EnrichedDetection {
            detection: Detection::new(Label::Person, 0.876, [0.1, 0.1, 0.2, 0.2]),
            pixel_box: PixelBox::default(),
            center: (0, 0),
            center_depth_m: 1.234,
        };
        assert_eq!(
            det.log_line(),
            "Item Classification: person, Distance: 1.23m, Confidence: 87%"
        );
    }
}
