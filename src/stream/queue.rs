//! 有界队列 (Bounded queues)
//!
//! - 视觉通道: 满时丢弃最旧的一项,生产者永不阻塞 (实时预览,不需要持久)
//! - 码流通道: 满时阻塞生产者,保证码流字节不丢

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};

/// 丢弃最旧项的发送端
///
/// 持有一个接收端句柄用于在队列满时弹出最旧的一项。
/// 因此只要发送端存在,通道就不会因消费者退出而断开。
pub struct LossySender<T> {
    tx: Sender<T>,
    evict: Receiver<T>,
    dropped: AtomicU64,
}

/// 创建丢弃最旧项的有界通道
pub fn lossy_bounded<T>(capacity: usize) -> (LossySender<T>, Receiver<T>) {
    let (tx, rx) = bounded(capacity.max(1));
    let sender = LossySender {
        tx,
        evict: rx.clone(),
        dropped: AtomicU64::new(0),
    };
    (sender, rx)
}

/// 创建阻塞生产者的有界通道
pub fn blocking_bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    bounded(capacity.max(1))
}

impl<T> LossySender<T> {
    /// 发送,队列满时先丢弃最旧的一项; 不阻塞
    pub fn send(&self, item: T) {
        let mut item = item;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    if self.evict.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    item = back;
                }
                // 持有evict接收端时不会发生
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// 因溢出被丢弃的项数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}
