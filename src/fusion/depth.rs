/// 视差 → 深度转换 (Disparity to depth conversion)
///
/// 1. 视差按 255/maxDisparity 归一化到8位 (四舍五入并截断到 [0,255])
/// 2. depth = focal * baseline / 归一化视差, 归一化视差为0时深度为0
/// 3. 归一化视差经jet伪彩色映射生成可视化底图
use super::types::{CalibrationConstants, ColorizedDepthBase, DepthMap, DisparityMap};
use image::{Rgb, RgbImage};
use ndarray::Array2;

/// 转换结果: 深度图 + 可视化底图,尺寸与输入视差图一致
#[derive(Clone, Debug)]
pub struct ConvertedDepth {
    pub depth: DepthMap,
    pub colorized: ColorizedDepthBase,
}

pub struct DepthConverter {
    multiplier: f32,
    depth_scale: f32, // focal * baseline
    jet: [Rgb<u8>; 256],
}

impl DepthConverter {
    pub fn new(calibration: CalibrationConstants) -> Self {
        Self {
            multiplier: calibration.disparity_multiplier(),
            depth_scale: calibration.focal_length_px() * calibration.baseline_m(),
            jet: jet_lut(),
        }
    }

    /// 单个原始视差 → 8位归一化视差
    pub fn normalize(&self, raw: u16) -> u8 {
        (raw as f32 * self.multiplier).round().clamp(0.0, 255.0) as u8
    }

    /// 单个归一化视差 → 深度(米), 0 表示无法计算
    pub fn depth_from_normalized(&self, normalized: u8) -> f32 {
        if normalized == 0 {
            return 0.0;
        }
        let depth = self.depth_scale / normalized as f32;
        if depth.is_finite() {
            depth
        } else {
            0.0
        }
    }

    pub fn convert(&self, disparity: &DisparityMap) -> ConvertedDepth {
        let normalized: Array2<u8> = disparity.mapv(|d| self.normalize(d));
        let depth = DepthMap::from_array(normalized.mapv(|n| self.depth_from_normalized(n)));

        let (h, w) = normalized.dim();
        let colorized = RgbImage::from_fn(w as u32, h as u32, |x, y| {
            self.jet[normalized[[y as usize, x as usize]] as usize]
        });

        ConvertedDepth { depth, colorized }
    }
}

/// 经典jet色表: 蓝 → 青 → 黄 → 红
fn jet_lut() -> [Rgb<u8>; 256] {
    let channel = |v: f32, center: f32| -> u8 {
        let c = (1.5 - (4.0 * v - center).abs()).clamp(0.0, 1.0);
        (c * 255.0).round() as u8
    };
    let mut lut = [Rgb([0, 0, 0]); 256];
    for (i, px) in lut.iter_mut().enumerate() {
        let v = i as f32 / 255.0;
        *px = Rgb([channel(v, 3.0), channel(v, 2.0), channel(v, 1.0)]);
    }
    lut
}
