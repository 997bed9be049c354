//! 检测器接口 (Detector capability)
//! 外部视觉模型的统一抽象: 帧 + 置信度阈值 + 类别过滤 + 模式 → 跟踪结果

use std::fs;
use std::path::Path;

use image::RgbImage;
use serde::Deserialize;
use tracing::{info, warn};

use super::types::{BBox, Track};
use crate::error::Result;

/// 调用模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectMode {
    /// 检测 + 追踪 (更新追踪器连续性状态, persist)
    Track,
    /// 仅检测 (不更新追踪状态,用于保持模型缓冲区热身)
    DetectOnly,
}

/// 统一的检测/追踪接口
///
/// 所有外部模型(YOLO+ByteTrack等)都应实现此 trait
///
/// ## 约定
/// - `Track` 模式下返回带稳定 `track_id` 的对象
/// - `DetectOnly` 模式的返回值可被调用方忽略
/// - 返回的 `Track` 坐标位于传入帧的像素空间
pub trait ObjectDetector: Send {
    /// # Arguments
    /// * `frame` - 输入帧 (已缩放)
    /// * `conf_threshold` - 置信度阈值
    /// * `classes` - 只关心的类别ID
    /// * `mode` - 追踪 / 仅检测
    fn detect(
        &mut self,
        frame: &RgbImage,
        conf_threshold: f32,
        classes: &[u32],
        mode: DetectMode,
    ) -> Result<Vec<Track>>;

    /// 检测器名称 (日志用)
    fn name(&self) -> &str {
        "detector"
    }
}

impl<D: ObjectDetector + ?Sized> ObjectDetector for Box<D> {
    fn detect(
        &mut self,
        frame: &RgbImage,
        conf_threshold: f32,
        classes: &[u32],
        mode: DetectMode,
    ) -> Result<Vec<Track>> {
        (**self).detect(frame, conf_threshold, classes, mode)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ========== 离线回放检测器 ==========

#[derive(Debug, Deserialize)]
struct RecordedTrack {
    track_id: u32,
    class_id: u32,
    confidence: f32,
    bbox: [f32; 4],
}

#[derive(Debug, Default, Deserialize)]
struct RecordedFrame {
    #[serde(default)]
    tracks: Vec<RecordedTrack>,
}

/// 回放检测器: 按帧读取预先录制的追踪器输出 (JSON Lines, 每行一帧)
///
/// 每次调用消费一帧,无论模式;仅检测模式的结果照常返回
pub struct ReplayDetector {
    frames: Vec<Vec<Track>>,
    cursor: usize,
}

impl ReplayDetector {
    pub fn new(frames: Vec<Vec<Track>>) -> Self {
        Self { frames, cursor: 0 }
    }

    /// 从 JSONL 文件加载;无法解析的行按空帧处理
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let frames: Vec<Vec<Track>> = text
            .lines()
            .enumerate()
            .map(|(line_no, line)| Self::parse_line(line_no, line))
            .collect();
        info!("📼 回放检测器已加载 {} 帧 ({})", frames.len(), path.display());
        Ok(Self::new(frames))
    }

    fn parse_line(line_no: usize, line: &str) -> Vec<Track> {
        if line.trim().is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<RecordedFrame>(line) {
            Ok(frame) => frame
                .tracks
                .into_iter()
                .map(|t| {
                    let [x1, y1, x2, y2] = t.bbox;
                    Track::new(t.track_id, t.class_id, t.confidence, BBox::new(x1, y1, x2, y2))
                })
                .collect(),
            Err(e) => {
                warn!("⚠️ 第{}行追踪记录解析失败: {}, 按空帧处理", line_no + 1, e);
                Vec::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl ObjectDetector for ReplayDetector {
    fn detect(
        &mut self,
        _frame: &RgbImage,
        conf_threshold: f32,
        classes: &[u32],
        _mode: DetectMode,
    ) -> Result<Vec<Track>> {
        let tracks = match self.frames.get(self.cursor) {
            Some(tracks) => tracks
                .iter()
                .filter(|t| t.confidence >= conf_threshold && classes.contains(&t.class_id))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        self.cursor += 1;
        Ok(tracks)
    }

    fn name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_filters_by_class_and_confidence() {
        let mut det = ReplayDetector::new(vec![vec![
            Track::new(1, 2, 0.9, BBox::new(0.0, 0.0, 10.0, 10.0)),
            Track::new(2, 0, 0.9, BBox::new(0.0, 0.0, 10.0, 10.0)),
            Track::new(3, 2, 0.3, BBox::new(0.0, 0.0, 10.0, 10.0)),
        ]]);
        let frame = RgbImage::new(16, 16);
        let out = det.detect(&frame, 0.5, &[2], DetectMode::Track).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].track_id, 1);

        // 回放结束后返回空
        let out = det.detect(&frame, 0.5, &[2], DetectMode::Track).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_malformed_line_is_empty_frame() {
        assert!(ReplayDetector::parse_line(0, "{not json").is_empty());
        let tracks = ReplayDetector::parse_line(
            1,
            r#"{"tracks":[{"track_id":4,"class_id":2,"confidence":0.8,"bbox":[1,2,30,40]}]}"#,
        );
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].bbox, BBox::new(1.0, 2.0, 30.0, 40.0));
    }

    #[test]
    fn test_load_jsonl_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.jsonl");
        std::fs::write(
            &path,
            "{\"tracks\":[]}\n\n{\"tracks\":[{\"track_id\":1,\"class_id\":2,\"confidence\":0.9,\"bbox\":[0,0,5,5]}]}\n",
        )
        .unwrap();
        let det = ReplayDetector::load(&path).unwrap();
        assert_eq!(det.len(), 3);
    }
}
