/// 帧处理流水线 (Frame Processing Pipeline)
///
/// 每帧: 测FPS → 缩放 → 节奏决策(完整追踪 / 仅检测+复用缓存) →
///       场景过滤 + 裁剪 → 测速 + 告警去重 → 标注 → 统计
/// - Processor: 流水线本体
/// - Renderer:  帧标注与JPEG编码
pub mod processor;
pub mod renderer;

use std::time::Instant;

use image::RgbImage;
use serde::Serialize;

use crate::detection::Track;
use crate::events::AlertEvent;

pub use processor::FramePipeline;
pub use renderer::{encode_jpeg, Annotator};

// ========== 输出类型定义 ==========

/// 单类别本帧可见数
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassCount {
    pub label: String,
    pub count: usize,
}

/// 每帧统计快照 (不持久化,每帧重算)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameStats {
    pub fps: f64,
    /// 按场景顺序,包含计数为0的类别
    pub counts: Vec<ClassCount>,
    pub total: usize,
    /// 累计已告警的不同目标数
    pub total_tracked: usize,
    pub use_case: String,
}

/// 通过过滤后本帧可见的目标
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VisibleTrack {
    /// 已裁剪到帧范围
    pub track: Track,
    pub label: &'static str,
    pub speed_kmh: f64,
}

/// 单帧处理结果
pub struct FrameOutput {
    pub frame: RgbImage,
    pub stats: FrameStats,
    pub tracks: Vec<VisibleTrack>,
    pub alerts: Vec<AlertEvent>,
    /// 本帧是否做了完整追踪
    pub full_pass: bool,
}

// ========== FPS统计 ==========

/// 每秒采样一次的吞吐统计,避免逐帧抖动
pub struct FpsMeter {
    count: u64,
    last: Instant,
    current_fps: f64,
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl FpsMeter {
    pub fn new() -> Self {
        Self {
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
        }
    }

    /// 记一帧,满1秒时刷新
    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> f64 {
        self.count += 1;
        let elapsed = now.duration_since(self.last);
        if elapsed.as_secs() >= 1 {
            self.current_fps = self.count as f64 / elapsed.as_secs_f64();
            self.count = 0;
            self.last = now;
        }
        self.current_fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fps_sampled_once_per_second() {
        let start = Instant::now();
        let mut meter = FpsMeter {
            count: 0,
            last: start,
            current_fps: 0.0,
        };
        for i in 1..=9 {
            assert_eq!(meter.tick_at(start + Duration::from_millis(i * 100)), 0.0);
        }
        let fps = meter.tick_at(start + Duration::from_millis(1000));
        assert!((fps - 10.0).abs() < 1e-9);
        // 下一秒内保持不变
        assert_eq!(meter.tick_at(start + Duration::from_millis(1100)), fps);
    }
}
