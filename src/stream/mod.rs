/// 设备数据流 (Device streams)
///
/// 设备端五个具名通道:
/// - right:     校正后的右目灰度帧
/// - disparity: 原始视差图
/// - manip:     送入检测网络的裁剪BGR帧
/// - nn:        检测结果
/// - h265:      编码码流块
pub mod queue;
pub mod synchronizer;

pub use queue::{blocking_bounded, lossy_bounded, LossySender};
pub use synchronizer::{Cached, PollReport, StreamSynchronizer, SynchronizerState};

use crate::fusion::{DetectionSet, DisparityMap, Frame};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 编码码流块
pub type EncodedChunk = Vec<u8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamName {
    Right,
    Disparity,
    Manip,
    Nn,
    H265,
}

impl StreamName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamName::Right => "right",
            StreamName::Disparity => "disparity",
            StreamName::Manip => "manip",
            StreamName::Nn => "nn",
            StreamName::H265 => "h265",
        }
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 队列深度
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueDepths {
    pub vision: usize,  // right/disparity/manip/nn
    pub encoded: usize, // h265
}

impl Default for QueueDepths {
    fn default() -> Self {
        Self {
            vision: 8,
            encoded: 30,
        }
    }
}

/// 主机端接收句柄
pub struct DeviceStreams {
    pub right: Receiver<Frame>,
    pub disparity: Receiver<DisparityMap>,
    pub manip: Receiver<Frame>,
    pub nn: Receiver<DetectionSet>,
    pub h265: Receiver<EncodedChunk>,
}

/// 设备端发送句柄
pub struct DeviceProducers {
    pub right: LossySender<Frame>,
    pub disparity: LossySender<DisparityMap>,
    pub manip: LossySender<Frame>,
    pub nn: LossySender<DetectionSet>,
    pub h265: Sender<EncodedChunk>,
}

/// 创建五个具名通道
pub fn device_channels(depths: QueueDepths) -> (DeviceProducers, DeviceStreams) {
    let (right_tx, right_rx) = lossy_bounded(depths.vision);
    let (disparity_tx, disparity_rx) = lossy_bounded(depths.vision);
    let (manip_tx, manip_rx) = lossy_bounded(depths.vision);
    let (nn_tx, nn_rx) = lossy_bounded(depths.vision);
    let (h265_tx, h265_rx) = blocking_bounded(depths.encoded);

    (
        DeviceProducers {
            right: right_tx,
            disparity: disparity_tx,
            manip: manip_tx,
            nn: nn_tx,
            h265: h265_tx,
        },
        DeviceStreams {
            right: right_rx,
            disparity: disparity_rx,
            manip: manip_rx,
            nn: nn_rx,
            h265: h265_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_names_match_device_channels() {
        let names: Vec<String> = [
            StreamName::Right,
            StreamName::Disparity,
            StreamName::Manip,
            StreamName::Nn,
            StreamName::H265,
        ]
        .iter()
        .map(|n| n.to_string())
        .collect();
        assert_eq!(names, vec!["right", "disparity", "manip", "nn", "h265"]);
    }

    #[test]
    fn test_device_channels_use_configured_depths() {
        let (producers, streams) = device_channels(QueueDepths {
            vision: 2,
            encoded: 3,
        });
        for i in 0..5u8 {
            producers.nn.send(Vec::new());
            let _ = producers.h265.try_send(vec![i]);
        }
        assert_eq!(streams.nn.len(), 2);
        assert_eq!(producers.nn.dropped(), 3);
        assert_eq!(streams.h265.len(), 3);
    }
}
