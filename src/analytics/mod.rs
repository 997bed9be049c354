/// 分析模块 (Analytics)
///
/// - Speed: 每个跟踪目标的滚动窗口测速
/// - Alert: 每个目标一次性告警去重
pub mod alert;
pub mod speed;

pub use alert::AlertDeduplicator;
pub use speed::{SpeedEstimator, PIXELS_PER_METER, SPEED_WINDOW};
