/// 融合核心 (Fusion Core)
///
/// 与设备无关的纯计算部分:
/// - DepthConverter: 视差 → 深度图 + 伪彩色底图
/// - DetectionFuser: 检测框 → 传感器像素框 + 中心深度
/// - OverlayRenderer: 底图 + 检测 → 叠加图像
pub mod depth;
pub mod fuser;
pub mod glyphs;
pub mod labels;
pub mod overlay;
pub mod types;

pub use depth::{ConvertedDepth, DepthConverter};
pub use fuser::{DetectionFuser, SensorGeometry};
pub use labels::{AllowList, Label};
pub use overlay::{AnnotatedFrame, OverlayElement, OverlayRenderer, OverlayStyle, TextKind};
pub use types::{
    CalibrationConstants, ColorizedDepthBase, DepthMap, Detection, DetectionSet, DisparityMap,
    EnrichedDetection, Frame, PixelBox,
};
