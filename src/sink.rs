//! 码流落盘 (Elementary stream sink)
//!
//! 按到达顺序追加写入H.265裸码流,不做封装和时间戳;
//! 需要播放时用ffmpeg封装成mp4。

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct StreamSink<W: Write> {
    writer: Option<BufWriter<W>>,
    path: PathBuf,
    bytes_written: u64,
    chunks_written: u64,
}

impl StreamSink<File> {
    /// 创建 (覆盖) 输出文件
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("无法创建码流文件 {}", path.display()))?;
        info!("💾 码流输出: {}", path.display());
        Ok(Self::from_writer(file, path.to_path_buf()))
    }
}

impl<W: Write> StreamSink<W> {
    pub fn from_writer(writer: W, path: PathBuf) -> Self {
        Self {
            writer: Some(BufWriter::new(writer)),
            path,
            bytes_written: 0,
            chunks_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// 追加一个码流块; 关闭后写入返回错误
    pub fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "sink already closed"))?;
        writer.write_all(chunk)?;
        self.bytes_written += chunk.len() as u64;
        self.chunks_written += 1;
        Ok(())
    }

    /// 把缓冲区内容推到底层写入端,每个tick结束时调用
    pub fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink already closed")),
        }
    }

    /// 刷新并释放底层句柄; 只有第一次调用真正关闭,返回是否执行了关闭
    pub fn close(&mut self) -> io::Result<bool> {
        match self.writer.take() {
            Some(mut writer) => {
                writer.flush()?;
                drop(writer);
                info!(
                    "✅ 码流文件已关闭: {} ({} 块, {} 字节)",
                    self.path.display(),
                    self.chunks_written,
                    self.bytes_written
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl<W: Write> Drop for StreamSink<W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("⚠️  关闭码流文件失败: {}", e);
        }
    }
}
