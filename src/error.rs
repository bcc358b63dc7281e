/// 错误类型 (Error taxonomy)
///
/// 启动阶段的配置错误是致命的,在连接设备之前抛出;
/// 运行阶段的数据缺失/无效深度不是错误,由各模块就地降级处理。
use std::path::PathBuf;

pub type FusionResult<T> = Result<T, FusionError>;

#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    /// 缺少启动所需的资源文件 (例如推理模型)
    #[error("required asset not found: {}", .0.display())]
    MissingAsset(PathBuf),

    /// 标定参数无效 (焦距/基线/最大视差必须为正有限值)
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),

    /// 传感器尺寸无效
    #[error("invalid sensor geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    /// 设备发来的类别ID不在标签表内
    #[error("label id {0} is outside the label taxonomy")]
    UnknownLabelId(u32),

    /// 白名单中的类别名不在标签表内
    #[error("label name {0:?} is not part of the label taxonomy")]
    UnknownLabelName(String),

    /// 字体文件无法解析
    #[error("font {} could not be parsed", .0.display())]
    InvalidFont(PathBuf),
}
