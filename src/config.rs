//! 监控配置 - 通过JSON文件调整参数

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analytics::{PIXELS_PER_METER, SPEED_WINDOW};
use crate::usecase::DEFAULT_USE_CASE;

/// 流水线与会话参数配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    // === 检测参数 ===
    pub conf_threshold: f32, // 检测置信度阈值
    pub frame_width: u32,    // 推理前最大帧宽 (越小CPU推理越快)
    pub track_every: u64,    // 每N帧做一次完整追踪

    // === 测速参数 ===
    pub pixels_per_meter: f64,     // 标定: 每米像素数
    pub default_fps: f64,          // 尚无实测FPS时使用
    pub speed_window: usize,       // 测速窗口长度
    pub alert_speed_threshold: f64, // 超速标记阈值 (km/h)
    pub stale_track_passes: u32,   // 连续缺席多少次完整追踪后清除测速历史

    // === 输出参数 ===
    pub jpeg_quality: u8,
    pub font_path: String,

    // === 会话参数 ===
    pub live_fps_cap: f64,        // 实时源的推送上限
    pub file_fps_fallback: f64,   // 文件源缺少帧率时使用
    pub deliver_timeout_ms: u64,  // 推送给消费者的最长等待
    pub live_read_timeout_ms: u64, // 实时源单次取帧的最长等待

    // === 其他 ===
    pub default_use_case: String,
    pub event_log_path: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            // 检测参数
            conf_threshold: 0.5,
            frame_width: 640,
            track_every: 3,

            // 测速
            pixels_per_meter: PIXELS_PER_METER,
            default_fps: 25.0,
            speed_window: SPEED_WINDOW,
            alert_speed_threshold: 80.0,
            stale_track_passes: 1,

            // 输出
            jpeg_quality: 85, // 越高框线越清晰
            font_path: "assets/font/DejaVuSans.ttf".to_string(),

            // 会话
            live_fps_cap: 60.0,
            file_fps_fallback: 25.0,
            deliver_timeout_ms: 2000,
            live_read_timeout_ms: 500,

            default_use_case: DEFAULT_USE_CASE.to_string(),
            event_log_path: "logs/detections.csv".to_string(),
        }
    }
}

impl MonitorConfig {
    /// 从JSON文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    let _ = fs::create_dir_all(parent);
                }
                if let Err(e) = fs::write(path, json) {
                    warn!("❌ 保存配置失败: {}", e);
                } else {
                    info!("💾 配置已保存到 {}", path.display());
                }
            }
            Err(e) => warn!("❌ 序列化配置失败: {}", e),
        }
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前监控配置:");
        info!("  检测置信度: {:.2}", self.conf_threshold);
        info!("  最大帧宽: {}", self.frame_width);
        info!("  完整追踪间隔: 每{}帧", self.track_every);
        info!("  标定: {:.1} 像素/米", self.pixels_per_meter);
        info!("  默认场景: {}", self.default_use_case);
        info!("  事件日志: {}", self.event_log_path);
    }

    pub fn deliver_timeout(&self) -> Duration {
        Duration::from_millis(self.deliver_timeout_ms)
    }

    pub fn live_read_timeout(&self) -> Duration {
        Duration::from_millis(self.live_read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.json");
        let config = MonitorConfig::load(&path);
        assert_eq!(config.track_every, 3);
        assert!(path.exists());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.json");
        fs::write(&path, r#"{"track_every": 5, "default_use_case": "security"}"#).unwrap();
        let config = MonitorConfig::load(&path);
        assert_eq!(config.track_every, 5);
        assert_eq!(config.default_use_case, "security");
        assert_eq!(config.frame_width, 640);
    }

    #[test]
    fn test_garbage_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.json");
        fs::write(&path, "not json").unwrap();
        let config = MonitorConfig::load(&path);
        assert_eq!(config.jpeg_quality, 85);
    }
}
