//! 实时帧源 - 外部采集线程 → 通道 → 会话
//!
//! 采集线程(摄像头/RTSP解码)只负责把帧推入有界通道,
//! 会话按需取帧,单次等待有上限,保证断开能被及时发现

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use image::RgbImage;

use super::{FrameRead, FrameSource, SourceKind};
use crate::config::MonitorConfig;
use crate::error::Result;

/// 采集端与会话之间的队列长度
pub const LIVE_QUEUE: usize = 2;

pub struct ChannelSource {
    rx: Receiver<RgbImage>,
    read_timeout: Duration,
    opened: bool,
    name: String,
}

impl ChannelSource {
    pub fn new(rx: Receiver<RgbImage>, read_timeout: Duration, name: impl Into<String>) -> Self {
        Self {
            rx,
            read_timeout,
            opened: true,
            name: name.into(),
        }
    }

    /// 创建 (推送端, 帧源) 对; 队列很短,采集端应使用 try_send 丢弃旧帧
    pub fn bounded(
        capacity: usize,
        read_timeout: Duration,
        name: impl Into<String>,
    ) -> (Sender<RgbImage>, Self) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (tx, Self::new(rx, read_timeout, name))
    }

    /// 按配置的取帧超时创建
    pub fn from_config(config: &MonitorConfig, name: impl Into<String>) -> (Sender<RgbImage>, Self) {
        Self::bounded(LIVE_QUEUE, config.live_read_timeout(), name)
    }
}

impl FrameSource for ChannelSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }

    fn is_opened(&self) -> bool {
        self.opened
    }

    fn read(&mut self) -> Result<FrameRead> {
        if !self.opened {
            return Ok(FrameRead::End);
        }
        match self.rx.recv_timeout(self.read_timeout) {
            Ok(frame) => Ok(FrameRead::Frame(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(FrameRead::Skipped),
            Err(RecvTimeoutError::Disconnected) => Ok(FrameRead::End),
        }
    }

    fn release(&mut self) {
        self.opened = false;
    }

    fn describe(&self) -> String {
        format!("live {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_skipped_and_hangup_is_end() {
        let (tx, mut src) = ChannelSource::bounded(2, Duration::from_millis(10), "cam0");
        assert!(matches!(src.read().unwrap(), FrameRead::Skipped));
        tx.send(RgbImage::new(2, 2)).unwrap();
        assert!(matches!(src.read().unwrap(), FrameRead::Frame(_)));
        drop(tx);
        assert!(matches!(src.read().unwrap(), FrameRead::End));
    }

    #[test]
    fn test_from_config_uses_read_timeout() {
        let config = MonitorConfig {
            live_read_timeout_ms: 20,
            ..MonitorConfig::default()
        };
        let (_tx, mut src) = ChannelSource::from_config(&config, "cam1");
        assert_eq!(src.read_timeout, Duration::from_millis(20));
        assert_eq!(src.kind(), SourceKind::Live);
        assert!(matches!(src.read().unwrap(), FrameRead::Skipped));
    }
}
