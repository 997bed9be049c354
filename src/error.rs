use thiserror::Error;

/// 监控系统错误类型 (Monitor error taxonomy)
#[derive(Debug, Error)]
pub enum MonitorError {
    /// 配置错误: 未知场景名称,状态保持不变
    #[error("Unknown use case: {0}")]
    UnknownUseCase(String),

    /// 视频源无法打开 (摄像头不可用 / 文件不存在)
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Resize error: {0}")]
    Resize(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid log row: {0}")]
    InvalidLogRow(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
