pub mod config; // 命令行参数与JSON配置
pub mod control; // 控制循环
pub mod device; // 标定与模拟设备
pub mod display; // 显示接口与退出信号
pub mod error; // 错误类型
pub mod fusion; // 视差转深度 + 检测融合 + 叠加渲染
pub mod sink; // H.265码流落盘
pub mod stream; // 设备数据流与同步

pub use crate::config::{Args, FusionConfig};
pub use crate::control::{ControlLoop, LoopOptions, LoopState, LoopSummary, TickOutcome};
pub use crate::error::{FusionError, FusionResult};
pub use crate::fusion::{
    AllowList, DepthConverter, DetectionFuser, Label, OverlayRenderer, SensorGeometry,
};

/// 当前北京时间字符串,用于快照文件名
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = match chrono::FixedOffset::east_opt(8 * 60 * 60) {
        Some(offset) => chrono::Utc::now().with_timezone(&offset).naive_local(),
        None => chrono::Utc::now().naive_utc(),
    };
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_string_layout() {
        let plain = gen_time_string("");
        assert!(plain.chars().all(|c| c.is_ascii_digit()));
        // %f 为9位纳秒
        assert_eq!(plain.len(), 4 + 2 * 5 + 9);
        assert_eq!(gen_time_string("-").matches('-').count(), 6);
    }
}
