/// 视频输入系统 (Video Input System)
///
/// 外部帧源的统一抽象
/// - ImageSequenceSource: 文件源 (图片序列目录, 有原生帧率)
/// - ChannelSource:       实时源 (外部采集线程通过通道推送帧)
pub mod channel;
pub mod sequence;

use image::RgbImage;

use crate::error::Result;

pub use channel::ChannelSource;
pub use sequence::ImageSequenceSource;

/// 帧源类型 (决定节流策略与单帧错误语义)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Live,
    File,
}

/// 单次取帧结果
#[derive(Debug)]
pub enum FrameRead {
    Frame(RgbImage),
    /// 暂时无帧 (实时源超时/坏帧),调用方跳过并重试
    Skipped,
    /// 流结束
    End,
}

/// 帧源接口
pub trait FrameSource: Send {
    fn kind(&self) -> SourceKind;

    fn is_opened(&self) -> bool;

    /// 文件源的原生帧率
    fn native_fps(&self) -> Option<f64> {
        None
    }

    /// 读取下一帧,等待时间必须有界
    fn read(&mut self) -> Result<FrameRead>;

    /// 释放底层资源 (可重复调用)
    fn release(&mut self);

    fn describe(&self) -> String {
        format!("{:?} source", self.kind())
    }
}

/// 作用域内持有帧源,任何退出路径都会释放
pub struct SourceGuard<'a> {
    source: &'a mut dyn FrameSource,
}

impl<'a> SourceGuard<'a> {
    pub fn new(source: &'a mut dyn FrameSource) -> Self {
        Self { source }
    }

    pub fn source(&mut self) -> &mut dyn FrameSource {
        &mut *self.source
    }
}

impl Drop for SourceGuard<'_> {
    fn drop(&mut self) {
        self.source.release();
    }
}
