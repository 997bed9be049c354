// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 视频分析监控 (Video analytics monitor)
//!
//! 帧 → 检测/追踪 (每N帧完整追踪) → 场景过滤 → 测速 + 一次性告警 → 标注 → 推流
pub mod analytics; // 测速 + 告警去重
pub mod config; // 监控配置参数
pub mod control; // 控制面
pub mod detection; // 检测器接口与数据结构
pub mod error;
pub mod events; // 事件日志 + 提醒
pub mod input; // 帧源
pub mod pipeline; // 帧处理流水线
pub mod session; // 推流会话
pub mod usecase; // 场景配置

pub use crate::analytics::{AlertDeduplicator, SpeedEstimator};
pub use crate::config::MonitorConfig;
pub use crate::control::Monitor;
pub use crate::detection::{BBox, DetectMode, ObjectDetector, ReplayDetector, Track};
pub use crate::error::{MonitorError, Result};
pub use crate::events::{AlertEvent, EventLog, LogEntry, Notifier, SilentNotifier, TerminalBell};
pub use crate::input::{ChannelSource, FrameRead, FrameSource, ImageSequenceSource, SourceKind};
pub use crate::pipeline::{FrameOutput, FramePipeline, FrameStats};
pub use crate::session::{spawn_session, SessionControl, SessionEnd, SessionHandle, StreamMessage};
pub use crate::usecase::UseCaseProfile;

/// 带时间戳的文件名片段 (本地时间)
pub fn gen_time_string(delimiter: &str) -> String {
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    chrono::Local::now().format(&fmt).to_string()
}
