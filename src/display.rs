//! 显示与退出信号 (Display and quit signal)
//!
//! 显示层是外部协作者,这里只定义接口和一个无窗口实现:
//! 可选地把叠加结果按间隔保存为PNG快照。

use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// 退出键
pub const QUIT_KEY: char = 'q';

pub trait Display {
    /// 显示一帧叠加结果
    fn show(&mut self, frame: &RgbImage) -> Result<()>;

    /// 读取一次按键 (不阻塞)
    fn poll_key(&mut self) -> Option<char>;

    /// 释放显示资源
    fn close(&mut self);
}

/// 无窗口显示: 统计帧数,按间隔保存快照
pub struct HeadlessDisplay {
    snapshot_dir: Option<PathBuf>,
    snapshot_every: u64,
    shown: u64,
    closed: bool,
}

impl HeadlessDisplay {
    pub fn new(snapshot_dir: Option<PathBuf>, snapshot_every: u64) -> Result<Self> {
        if let Some(dir) = &snapshot_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("无法创建快照目录 {}", dir.display()))?;
            info!("📸 快照目录: {} (每{}帧)", dir.display(), snapshot_every.max(1));
        }
        Ok(Self {
            snapshot_dir,
            snapshot_every: snapshot_every.max(1),
            shown: 0,
            closed: false,
        })
    }
}

impl Display for HeadlessDisplay {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        self.shown += 1;
        if let Some(dir) = &self.snapshot_dir {
            if self.shown % self.snapshot_every == 0 {
                let path = dir.join(format!("disparity_{}.png", crate::gen_time_string("")));
                frame
                    .save_with_format(&path, ImageFormat::Png)
                    .with_context(|| format!("保存快照失败 {}", path.display()))?;
            }
        }
        Ok(())
    }

    fn poll_key(&mut self) -> Option<char> {
        None
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            info!("🖼️  显示已关闭,共显示 {} 帧", self.shown);
        }
    }
}

/// 外部退出信号 (Ctrl+C / 按键 / 超时共用)
#[derive(Clone, Default)]
pub struct QuitSignal {
    flag: Arc<AtomicBool>,
}

impl QuitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册Ctrl+C处理
    pub fn install_ctrlc(&self) -> Result<()> {
        let flag = self.flag.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
        .context("注册Ctrl+C处理失败")?;
        Ok(())
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_signal_shared_between_clones() {
        let quit = QuitSignal::new();
        let other = quit.clone();
        assert!(!other.is_set());
        quit.trigger();
        assert!(other.is_set());
    }

    #[test]
    fn test_headless_counts_and_closes_once() {
        let mut display = HeadlessDisplay::new(None, 10).unwrap();
        display.show(&RgbImage::new(4, 4)).unwrap();
        display.show(&RgbImage::new(4, 4)).unwrap();
        assert_eq!(display.shown, 2);
        assert_eq!(display.poll_key(), None);
        display.close();
        display.close();
        assert!(display.closed);
    }
}
