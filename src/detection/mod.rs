/// 检测系统 (Detection System)
///
/// 外部检测/追踪能力的接入层
/// - Detector: 检测器接口 (追踪 / 仅检测 两种模式)
/// - Types:    跟踪结果数据结构
pub mod detector;
pub mod types;

pub use detector::{DetectMode, ObjectDetector, ReplayDetector};
pub use types::{BBox, Track};
