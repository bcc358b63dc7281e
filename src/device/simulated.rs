//! 模拟设备 (Simulated device)
//!
//! 没有硬件时在独立线程上生成五路数据:
//! 视差图中有若干运动的矩形物体,检测网络以较低帧率输出这些物体的检测框,
//! 码流通道输出伪造的NAL块。设备端类别ID在这里转换为 `Label`。

use crate::fusion::{Detection, DetectionSet, DisparityMap, Frame, Label, SensorGeometry};
use crate::stream::{DeviceProducers, EncodedChunk, StreamName};
use anyhow::{Context, Result};
use crossbeam_channel::SendTimeoutError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 检测网络输入尺寸
const NN_INPUT_SIZE: u32 = 300;

/// 模拟参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub fps: f32,                  // 相机帧率
    pub nn_every: u32,             // 每N帧输出一次检测
    pub objects: usize,            // 场景内物体数量
    pub label_ids: Vec<u32>,       // 物体的设备端类别ID
    pub confidence_threshold: f32, // 低于该置信度的检测不输出
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            nn_every: 3,
            objects: 3,
            label_ids: vec![15, 7, 12], // person, car, dog
            confidence_threshold: 0.5,
            seed: None,
        }
    }
}

/// 场景中的一个物体 (坐标为正方形裁剪内的归一化值)
#[derive(Clone, Debug)]
struct SimObject {
    label_id: u32,
    cx: f32,
    cy: f32,
    half: f32,
    vx: f32,
    vy: f32,
    disparity: u16,
}

pub struct SimulatedDevice {
    config: SimulationConfig,
    geometry: SensorGeometry,
    max_disparity: u16,
    rng: StdRng,
    objects: Vec<SimObject>,
    frame: u64,
}

impl SimulatedDevice {
    pub fn new(config: SimulationConfig, geometry: SensorGeometry, max_disparity: f32) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let max_disparity = max_disparity.max(1.0) as u16;
        let objects = (0..config.objects)
            .map(|i| SimObject {
                label_id: config
                    .label_ids
                    .get(i % config.label_ids.len().max(1))
                    .copied()
                    .unwrap_or(Label::Person.id()),
                cx: rng.gen_range(0.2..0.8),
                cy: rng.gen_range(0.2..0.8),
                half: rng.gen_range(0.06..0.15),
                vx: rng.gen_range(-0.01..0.01),
                vy: rng.gen_range(-0.01..0.01),
                disparity: rng.gen_range(max_disparity / 8..=max_disparity.max(2) - 1),
            })
            .collect();

        Self {
            config,
            geometry,
            max_disparity,
            rng,
            objects,
            frame: 0,
        }
    }

    fn step(&mut self) {
        for obj in &mut self.objects {
            obj.cx += obj.vx;
            obj.cy += obj.vy;
            if obj.cx - obj.half < 0.0 || obj.cx + obj.half > 1.0 {
                obj.vx = -obj.vx;
                obj.cx = obj.cx.clamp(obj.half, 1.0 - obj.half);
            }
            if obj.cy - obj.half < 0.0 || obj.cy + obj.half > 1.0 {
                obj.vy = -obj.vy;
                obj.cy = obj.cy.clamp(obj.half, 1.0 - obj.half);
            }
        }
        self.frame += 1;
    }

    /// 归一化坐标 → 传感器像素
    fn to_sensor(&self, nx: f32, ny: f32) -> (i64, i64) {
        let dim = self.geometry.square_dim() as f32;
        (
            (nx * dim) as i64 + self.geometry.crop_offset_x() as i64,
            (ny * dim) as i64 + self.geometry.crop_offset_y() as i64,
        )
    }

    /// 背景为自下而上递减的地面视差,物体区域为其自身视差,左侧留出无效带
    pub fn disparity_frame(&mut self) -> DisparityMap {
        let (w, h) = (self.geometry.width() as usize, self.geometry.height() as usize);
        let floor = (self.max_disparity / 4).max(1) as f32;
        let invalid_band = w / 16;
        let mut map = DisparityMap::from_shape_fn((h, w), |(y, x)| {
            if x < invalid_band {
                0
            } else {
                (floor * y as f32 / h as f32) as u16
            }
        });

        for obj in &self.objects {
            let (x0, y0) = self.to_sensor(obj.cx - obj.half, obj.cy - obj.half);
            let (x1, y1) = self.to_sensor(obj.cx + obj.half, obj.cy + obj.half);
            for y in y0.max(0)..y1.min(h as i64) {
                for x in x0.max(0)..x1.min(w as i64) {
                    let noise: i32 = self.rng.gen_range(-1..=1);
                    map[[y as usize, x as usize]] = (obj.disparity as i32 + noise).max(0) as u16;
                }
            }
        }
        map
    }

    /// 设备端检测结果,类别ID在此转换,越界ID被丢弃
    pub fn detections(&mut self) -> DetectionSet {
        let mut set = Vec::with_capacity(self.objects.len());
        for obj in &self.objects {
            let confidence = self.rng.gen_range(0.4..0.99);
            if confidence < self.config.confidence_threshold {
                continue;
            }
            match Label::try_from(obj.label_id) {
                Ok(label) => set.push(Detection::new(
                    label,
                    confidence,
                    [
                        obj.cx - obj.half + self.rng.gen_range(-0.01..0.01),
                        obj.cy - obj.half,
                        obj.cx + obj.half,
                        obj.cy + obj.half + self.rng.gen_range(-0.01..0.01),
                    ],
                )),
                Err(e) => warn!("⚠️  丢弃检测: {}", e),
            }
        }
        set
    }

    fn mono_frame(disparity: &DisparityMap) -> Frame {
        let (h, w) = disparity.dim();
        Frame {
            width: w as u32,
            height: h as u32,
            channels: 1,
            data: disparity.iter().map(|d| (*d).min(255) as u8).collect(),
        }
    }

    fn manip_frame(&self, mono: &Frame) -> Frame {
        let dim = self.geometry.square_dim();
        let (ox, oy) = (
            self.geometry.crop_offset_x() as u32,
            self.geometry.crop_offset_y() as u32,
        );
        let mut data = Vec::with_capacity((NN_INPUT_SIZE * NN_INPUT_SIZE * 3) as usize);
        for y in 0..NN_INPUT_SIZE {
            for x in 0..NN_INPUT_SIZE {
                let sx = ox + x * dim / NN_INPUT_SIZE;
                let sy = oy + y * dim / NN_INPUT_SIZE;
                let v = mono.data[(sy * mono.width + sx) as usize];
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame {
            width: NN_INPUT_SIZE,
            height: NN_INPUT_SIZE,
            channels: 3,
            data,
        }
    }

    /// 伪造的H.265 NAL块: 起始码 + NAL头 + 随机负载
    fn encoded_chunk(&mut self) -> EncodedChunk {
        let len = self.rng.gen_range(256..2048);
        let nal_type: u8 = if self.frame % 30 == 1 { 19 } else { 1 }; // IDR / TRAIL_R
        let mut chunk = vec![0, 0, 0, 1, nal_type << 1, 1];
        chunk.extend((0..len).map(|_| self.rng.gen::<u8>()));
        chunk
    }

    /// 在独立线程上运行,直到stop被设置或通道断开
    pub fn spawn(mut self, producers: DeviceProducers) -> Result<DeviceHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let period = Duration::from_secs_f32(1.0 / self.config.fps.max(1.0));
        let nn_every = self.config.nn_every.max(1) as u64;

        let join = std::thread::Builder::new()
            .name("simulated-device".into())
            .spawn(move || {
                info!(
                    "🎬 模拟设备启动: {}x{} @ {:.0}fps, 检测每{}帧",
                    self.geometry.width(),
                    self.geometry.height(),
                    self.config.fps,
                    nn_every
                );
                while !stop_flag.load(Ordering::SeqCst) {
                    let started = Instant::now();
                    self.step();

                    let disparity = self.disparity_frame();
                    let mono = Self::mono_frame(&disparity);
                    let manip = self.manip_frame(&mono);
                    producers.right.send(mono);
                    producers.manip.send(manip);
                    producers.disparity.send(disparity);
                    if self.frame % nn_every == 0 {
                        let detections = self.detections();
                        producers.nn.send(detections);
                    }

                    // 码流通道阻塞发送,定期检查stop避免关闭时卡死
                    let mut chunk = self.encoded_chunk();
                    loop {
                        match producers.h265.send_timeout(chunk, Duration::from_millis(50)) {
                            Ok(()) => break,
                            Err(SendTimeoutError::Timeout(back)) => {
                                if stop_flag.load(Ordering::SeqCst) {
                                    break;
                                }
                                chunk = back;
                            }
                            Err(SendTimeoutError::Disconnected(_)) => {
                                debug!("{} 通道已断开", StreamName::H265);
                                stop_flag.store(true, Ordering::SeqCst);
                                break;
                            }
                        }
                    }

                    if let Some(rest) = period.checked_sub(started.elapsed()) {
                        std::thread::sleep(rest);
                    }
                }
                info!("✅ 模拟设备退出 (共{}帧)", self.frame);
                for (name, dropped) in [
                    (StreamName::Right, producers.right.dropped()),
                    (StreamName::Disparity, producers.disparity.dropped()),
                    (StreamName::Manip, producers.manip.dropped()),
                    (StreamName::Nn, producers.nn.dropped()),
                ] {
                    if dropped > 0 {
                        info!("  {} 通道溢出丢弃 {} 项", name, dropped);
                    }
                }
            })
            .context("无法启动模拟设备线程")?;

        Ok(DeviceHandle {
            stop,
            join: Some(join),
        })
    }
}

/// 设备线程句柄,drop时停止并等待线程退出
pub struct DeviceHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl DeviceHandle {
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("⚠️  模拟设备线程异常退出");
            }
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
