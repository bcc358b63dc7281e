/// 多流同步器 (Stream synchronizer)
///
/// 每个tick对四个视觉通道做一次非阻塞读取,只保留每个通道最新的一项;
/// 没有新数据时保留上一次缓存。码流通道不缓存,每次把当前可读的块全部取出。
/// 这是尽力而为的近似对齐,不保证时间戳一致。
use super::{DeviceStreams, EncodedChunk};
use crate::fusion::{DetectionSet, DisparityMap, Frame};
use crossbeam_channel::Receiver;

/// 缓存项,记录接收时的tick序号
#[derive(Clone, Debug, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub tick: u64,
}

/// 各通道的最新缓存,由控制循环独占
#[derive(Debug, Default)]
pub struct SynchronizerState {
    pub right: Option<Cached<Frame>>,
    pub manip: Option<Cached<Frame>>,
    pub disparity: Option<Cached<DisparityMap>>,
    pub detections: Option<Cached<DetectionSet>>,
}

impl SynchronizerState {
    /// 检测结果相对视差帧的新旧程度 (正数表示检测更旧)
    pub fn detection_age_ticks(&self) -> Option<i64> {
        match (&self.disparity, &self.detections) {
            (Some(d), Some(n)) => Some(d.tick as i64 - n.tick as i64),
            _ => None,
        }
    }
}

/// 本次poll各通道是否有新数据
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub right: bool,
    pub manip: bool,
    pub disparity: bool,
    pub detections: bool,
}

impl PollReport {
    pub fn any(&self) -> bool {
        self.right || self.manip || self.disparity || self.detections
    }
}

pub struct StreamSynchronizer {
    streams: DeviceStreams,
}

/// 取出通道内当前全部可读项,只返回最新的一个
fn latest<T>(rx: &Receiver<T>) -> Option<T> {
    rx.try_iter().last()
}

fn refresh<T>(slot: &mut Option<Cached<T>>, rx: &Receiver<T>, tick: u64) -> bool {
    match latest(rx) {
        Some(value) => {
            *slot = Some(Cached { value, tick });
            true
        }
        None => false,
    }
}

impl StreamSynchronizer {
    pub fn new(streams: DeviceStreams) -> Self {
        Self { streams }
    }

    /// 非阻塞轮询四个缓存通道
    pub fn poll(&self, state: &mut SynchronizerState, tick: u64) -> PollReport {
        PollReport {
            right: refresh(&mut state.right, &self.streams.right, tick),
            manip: refresh(&mut state.manip, &self.streams.manip, tick),
            disparity: refresh(&mut state.disparity, &self.streams.disparity, tick),
            detections: refresh(&mut state.detections, &self.streams.nn, tick),
        }
    }

    /// 按到达顺序取出当前全部码流块
    pub fn drain_all(&self) -> Vec<EncodedChunk> {
        self.streams.h265.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::{Detection, Label};
    use crate::stream::{device_channels, QueueDepths};

    #[test]
    fn test_first_poll_is_empty() {
        let (_producers, streams) = device_channels(QueueDepths::default());
        let sync = StreamSynchronizer::new(streams);
        let mut state = SynchronizerState::default();
        let report = sync.poll(&mut state, 0);
        assert!(!report.any());
        assert!(state.disparity.is_none());
        assert!(state.detections.is_none());
        assert!(sync.drain_all().is_empty());
    }

    #[test]
    fn test_latest_wins_and_absent_keeps_cache() {
        let (producers, streams) = device_channels(QueueDepths::default());
        let sync = StreamSynchronizer::new(streams);
        let mut state = SynchronizerState::default();

        producers.disparity.send(DisparityMap::from_elem((2, 2), 1));
        producers.disparity.send(DisparityMap::from_elem((2, 2), 7));
        assert!(sync.poll(&mut state, 1).disparity);
        let cached = state.disparity.as_ref().unwrap();
        assert_eq!(cached.tick, 1);
        assert_eq!(cached.value[[0, 0]], 7);

        // 无新数据: 缓存保持不变
        assert!(!sync.poll(&mut state, 2).disparity);
        assert_eq!(state.disparity.as_ref().unwrap().tick, 1);
        assert_eq!(state.disparity.as_ref().unwrap().value[[0, 0]], 7);
    }

    #[test]
    fn test_drain_preserves_arrival_order() {
        let (producers, streams) = device_channels(QueueDepths::default());
        let sync = StreamSynchronizer::new(streams);
        producers.h265.send(vec![0, 0, 0, 1]).unwrap();
        producers.h265.send(vec![0x40, 0x01]).unwrap();
        assert_eq!(sync.drain_all(), vec![vec![0, 0, 0, 1], vec![0x40, 0x01]]);
        assert!(sync.drain_all().is_empty());
    }

    #[test]
    fn test_detection_age() {
        let (producers, streams) = device_channels(QueueDepths::default());
        let sync = StreamSynchronizer::new(streams);
        let mut state = SynchronizerState::default();
        producers
            .nn
            .send(vec![Detection::new(Label::Person, 0.8, [0.1, 0.1, 0.3, 0.3])]);
        sync.poll(&mut state, 3);
        assert_eq!(state.detection_age_ticks(), None);
        producers.disparity.send(DisparityMap::zeros((2, 2)));
        sync.poll(&mut state, 5);
        assert_eq!(state.detection_age_ticks(), Some(2));
    }

    #[test]
    fn test_disconnected_device_reads_as_absent() {
        let (producers, streams) = device_channels(QueueDepths::default());
        let sync = StreamSynchronizer::new(streams);
        drop(producers);
        let mut state = SynchronizerState::default();
        assert!(!sync.poll(&mut state, 0).any());
        assert!(sync.drain_all().is_empty());
    }
}
