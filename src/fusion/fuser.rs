/// 检测-深度关联 (Detection to depth fusion)
///
/// 检测网络运行在从传感器中间裁出的正方形画面上,
/// 因此归一化坐标两轴都按正方形边长还原,再加回裁剪偏移得到传感器像素坐标,
/// 最后在框中心采样深度。
use super::labels::AllowList;
use super::types::{DepthMap, Detection, EnrichedDetection, PixelBox};
use crate::error::{FusionError, FusionResult};

/// 传感器尺寸与中心正方形裁剪
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SensorGeometry {
    width: u32,
    height: u32,
}

impl SensorGeometry {
    pub fn new(width: u32, height: u32) -> FusionResult<Self> {
        if width == 0 || height == 0 {
            return Err(FusionError::InvalidGeometry { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// 正方形裁剪边长 min(w, h)
    pub fn square_dim(&self) -> u32 {
        self.width.min(self.height)
    }

    /// 宽大于高时的水平偏移
    pub fn crop_offset_x(&self) -> i32 {
        (self.width.saturating_sub(self.height) / 2) as i32
    }

    /// 高大于宽时的垂直偏移
    pub fn crop_offset_y(&self) -> i32 {
        (self.height.saturating_sub(self.width) / 2) as i32
    }
}

pub struct DetectionFuser {
    allow: AllowList,
    geometry: SensorGeometry,
}

impl DetectionFuser {
    pub fn new(allow: AllowList, geometry: SensorGeometry) -> Self {
        Self { allow, geometry }
    }

    pub fn geometry(&self) -> &SensorGeometry {
        &self.geometry
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow
    }

    /// 归一化检测框 → 正方形裁剪内的像素框 (未加偏移)
    pub fn scale_box(&self, bbox: &[f32; 4]) -> PixelBox {
        let dim = self.geometry.square_dim() as f64;
        let px = |v: f32| (v.clamp(0.0, 1.0) as f64 * dim) as i32;
        PixelBox {
            xmin: px(bbox[0]),
            ymin: px(bbox[1]),
            xmax: px(bbox[2]),
            ymax: px(bbox[3]),
        }
    }

    /// 归一化检测框 → 传感器像素框
    pub fn pixel_box(&self, bbox: &[f32; 4]) -> PixelBox {
        let scaled = self.scale_box(bbox);
        let (dx, dy) = (self.geometry.crop_offset_x(), self.geometry.crop_offset_y());
        PixelBox {
            xmin: scaled.xmin + dx,
            ymin: scaled.ymin + dy,
            xmax: scaled.xmax + dx,
            ymax: scaled.ymax + dy,
        }
    }

    /// 框中心,截断到深度图范围内
    fn center(&self, pixel_box: &PixelBox, depth: &DepthMap) -> (u32, u32) {
        let max_x = depth.width().saturating_sub(1) as f64;
        let max_y = depth.height().saturating_sub(1) as f64;
        let cx = ((pixel_box.xmin + pixel_box.xmax) as f64 / 2.0).round();
        let cy = ((pixel_box.ymin + pixel_box.ymax) as f64 / 2.0).round();
        (cx.clamp(0.0, max_x) as u32, cy.clamp(0.0, max_y) as u32)
    }

    pub fn fuse(&self, detections: &[Detection], depth: &DepthMap) -> Vec<EnrichedDetection> {
        detections
            .iter()
            .filter(|det| self.allow.contains(det.label))
            .map(|det| {
                let pixel_box = self.pixel_box(&det.bbox);
                let center = self.center(&pixel_box, depth);
                EnrichedDetection {
                    detection: det.clone(),
                    pixel_box,
                    center,
                    center_depth_m: depth.get(center.0, center.1).unwrap_or(0.0),
                }
            })
            .collect()
    }
}
