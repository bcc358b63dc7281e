/// 叠加渲染 (Overlay rendering)
///
/// 在深度伪彩色底图上绘制检测框、类别名、置信度和距离。
/// 先生成绘制元素列表,再光栅化到新的图像缓冲区; 不做任何I/O。
use super::glyphs;
use super::types::{ColorizedDepthBase, EnrichedDetection, PixelBox};
use crate::error::{FusionError, FusionResult};
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// 文字相对框左上角的偏移 (基线位置)
const TEXT_OFFSET_X: i32 = 10;
const CLASS_OFFSET_Y: i32 = 20;
const CONFIDENCE_OFFSET_Y: i32 = 40;
const DISTANCE_OFFSET_Y: i32 = 60;

/// 叠加样式
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    pub color: [u8; 3],      // 框和文字颜色 (RGB)
    pub thickness: u32,      // 框线宽
    pub font_px: f32,        // TTF字号 (像素)
    pub glyph_scale: u32,    // 点阵字放大倍数
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: [0, 255, 0], // 绿色
            thickness: 2,
            font_px: 14.0,
            glyph_scale: 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextKind {
    ClassName,
    Confidence,
    Distance,
}

/// 单个绘制元素
#[derive(Clone, Debug, PartialEq)]
pub enum OverlayElement {
    Box(PixelBox),
    Text {
        kind: TextKind,
        x: i32,
        baseline: i32,
        text: String,
    },
}

/// 渲染结果: 叠加后的图像 + 每个检测一行的日志
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub image: RgbImage,
    pub log_lines: Vec<String>,
}

pub struct OverlayRenderer {
    style: OverlayStyle,
    font: Option<FontVec>,
}

impl OverlayRenderer {
    /// 使用内置点阵字
    pub fn new(style: OverlayStyle) -> Self {
        Self { style, font: None }
    }

    /// 加载TTF/OTF字体
    pub fn with_font(style: OverlayStyle, path: &Path) -> FusionResult<Self> {
        let bytes =
            std::fs::read(path).map_err(|_| FusionError::MissingAsset(path.to_path_buf()))?;
        let font =
            FontVec::try_from_vec(bytes).map_err(|_| FusionError::InvalidFont(path.to_path_buf()))?;
        Ok(Self {
            style,
            font: Some(font),
        })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 生成绘制元素: 每个检测一个框 + 三行文字
    pub fn plan(&self, detections: &[EnrichedDetection]) -> Vec<OverlayElement> {
        let mut elements = Vec::with_capacity(detections.len() * 4);
        for det in detections {
            let b = det.pixel_box;
            let x = b.xmin + TEXT_OFFSET_X;
            elements.push(OverlayElement::Box(b));
            elements.push(OverlayElement::Text {
                kind: TextKind::ClassName,
                x,
                baseline: b.ymin + CLASS_OFFSET_Y,
                text: det.label_name().to_string(),
            });
            elements.push(OverlayElement::Text {
                kind: TextKind::Confidence,
                x,
                baseline: b.ymin + CONFIDENCE_OFFSET_Y,
                text: format!("{}%", det.detection.confidence_percent()),
            });
            elements.push(OverlayElement::Text {
                kind: TextKind::Distance,
                x,
                baseline: b.ymin + DISTANCE_OFFSET_Y,
                text: format!("{:.2}m", det.center_depth_m),
            });
        }
        elements
    }

    pub fn render(
        &self,
        base: &ColorizedDepthBase,
        detections: &[EnrichedDetection],
    ) -> AnnotatedFrame {
        let mut image = base.clone();
        for element in self.plan(detections) {
            self.draw(&mut image, &element);
        }

        let log_lines: Vec<String> = detections.iter().map(|d| d.log_line()).collect();
        for line in &log_lines {
            info!(target: "detections", "{}", line);
        }

        AnnotatedFrame { image, log_lines }
    }

    fn draw(&self, image: &mut RgbImage, element: &OverlayElement) {
        let color = Rgb(self.style.color);
        match element {
            OverlayElement::Box(b) => {
                // 线宽向外扩展,零宽框按1像素处理
                for i in 0..self.style.thickness.max(1) as i32 {
                    let w = (b.width() + 2 * i).max(1) as u32;
                    let h = (b.height() + 2 * i).max(1) as u32;
                    let rect = Rect::at(b.xmin - i, b.ymin - i).of_size(w, h);
                    draw_hollow_rect_mut(image, rect, color);
                }
            }
            OverlayElement::Text {
                x, baseline, text, ..
            } => match &self.font {
                Some(font) => {
                    let top = baseline - self.style.font_px.round() as i32;
                    draw_text_mut(image, color, *x, top, PxScale::from(self.style.font_px), font, text);
                }
                None => {
                    let scale = self.style.glyph_scale.max(1);
                    let top = baseline - (glyphs::GLYPH_HEIGHT * scale) as i32;
                    glyphs::draw_text(image, *x, top, text, color, scale);
                }
            },
        }
    }
}
