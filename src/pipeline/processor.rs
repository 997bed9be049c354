//! 流水线本体 (FramePipeline)
//!
//! 节奏策略: 每 N 帧做一次完整 检测+追踪,中间帧只做轻量检测保持模型热身,
//! 下游逻辑复用上一次完整追踪的结果 (最多滞后 N-1 帧)

use std::collections::HashMap;
use std::sync::Arc;

use fast_image_resize as fr;
use image::RgbImage;
use tracing::{debug, info, warn};

use super::{Annotator, ClassCount, FpsMeter, FrameOutput, FrameStats, VisibleTrack};
use crate::analytics::{AlertDeduplicator, SpeedEstimator};
use crate::config::MonitorConfig;
use crate::detection::{DetectMode, ObjectDetector, Track};
use crate::error::{MonitorError, Result};
use crate::events::{timestamp_now, AlertEvent, EventLog, Notifier, SilentNotifier};
use crate::usecase::UseCaseProfile;

pub struct FramePipeline {
    detector: Box<dyn ObjectDetector>,
    annotator: Annotator,
    event_log: Option<Arc<EventLog>>,
    notifier: Arc<dyn Notifier>,

    // 参数
    conf_threshold: f32,
    frame_width: u32,
    track_every: u64,
    default_fps: f64,
    alert_speed_threshold: f64,
    stale_track_passes: u64,

    // 场景 (同一时刻只有一个生效)
    profile: &'static UseCaseProfile,
    class_ids: Vec<u32>,

    // 派生状态 (切换场景/重置时全部清空)
    speed: SpeedEstimator,
    alerts: AlertDeduplicator,
    cached_tracks: Vec<Track>,
    frame_idx: u64,
    full_passes: u64,
    last_seen_pass: HashMap<u32, u64>,

    // 统计
    fps: FpsMeter,
}

impl FramePipeline {
    pub fn new(detector: Box<dyn ObjectDetector>, config: &MonitorConfig) -> Result<Self> {
        let profile = UseCaseProfile::get(&config.default_use_case)?;
        info!(
            "🔍 流水线启动: 检测器={} 场景={} 每{}帧完整追踪",
            detector.name(),
            profile.name,
            config.track_every.max(1)
        );
        Ok(Self {
            detector,
            annotator: Annotator::new(None),
            event_log: None,
            notifier: Arc::new(SilentNotifier),
            conf_threshold: config.conf_threshold,
            frame_width: config.frame_width.max(1),
            track_every: config.track_every.max(1),
            default_fps: config.default_fps,
            alert_speed_threshold: config.alert_speed_threshold,
            stale_track_passes: u64::from(config.stale_track_passes.max(1)),
            profile,
            class_ids: profile.class_ids(),
            speed: SpeedEstimator::new(config.pixels_per_meter, config.speed_window),
            alerts: AlertDeduplicator::new(),
            cached_tracks: Vec::new(),
            frame_idx: 0,
            full_passes: 0,
            last_seen_pass: HashMap::new(),
            fps: FpsMeter::new(),
        })
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_event_log(mut self, event_log: Arc<EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn use_case(&self) -> &'static str {
        self.profile.name
    }

    /// 切换场景: 名称无效时报错且状态不变;成功后清空全部派生状态
    pub fn set_use_case(&mut self, name: &str) -> Result<()> {
        let profile = UseCaseProfile::get(name)?;
        self.profile = profile;
        self.class_ids = profile.class_ids();
        self.reset_stats();
        info!("🔄 场景切换为 {}", profile.name);
        Ok(())
    }

    /// 清空告警记忆、测速历史、跳帧缓存与帧计数
    pub fn reset_stats(&mut self) {
        self.alerts.reset();
        self.speed.reset();
        self.cached_tracks.clear();
        self.frame_idx = 0;
        self.full_passes = 0;
        self.last_seen_pass.clear();
    }

    pub fn alerted_count(&self) -> usize {
        self.alerts.alerted_count()
    }

    /// 当前持有测速历史的目标数
    pub fn speed_track_count(&self) -> usize {
        self.speed.track_count()
    }

    pub fn cached_tracks(&self) -> &[Track] {
        &self.cached_tracks
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_idx
    }

    /// 处理单帧
    pub fn process_frame(&mut self, frame: RgbImage) -> Result<FrameOutput> {
        // 1. FPS (每秒刷新)
        let measured_fps = self.fps.tick();
        let speed_fps = if measured_fps > 0.0 {
            measured_fps
        } else {
            self.default_fps
        };

        // 2. 缩放到最大宽度 (保持宽高比)
        let mut frame = resize_to_width(frame, self.frame_width)?;
        let (w, h) = frame.dimensions();

        // 3. 节奏决策
        let full_pass = self.frame_idx % self.track_every == 0;
        if full_pass {
            self.run_tracking_pass(&frame);
        } else {
            self.run_warmup_pass(&frame);
        }
        self.frame_idx += 1;

        // 4. 过滤 / 裁剪 / 测速 / 告警 / 计数
        let mut counts: Vec<ClassCount> = self
            .profile
            .classes
            .iter()
            .map(|(_, label)| ClassCount {
                label: label.to_string(),
                count: 0,
            })
            .collect();
        let mut visible = Vec::with_capacity(self.cached_tracks.len());
        let mut alerts = Vec::new();

        for track in &self.cached_tracks {
            let Some(slot) = self
                .profile
                .classes
                .iter()
                .position(|(id, _)| *id == track.class_id)
            else {
                continue;
            };
            let label = self.profile.classes[slot].1;

            let bbox = track.bbox.clamp_to(w, h);
            if !bbox.is_valid() {
                continue;
            }

            let speed_kmh = self.speed.update(track.track_id, &bbox, speed_fps);

            if self.alerts.should_alert(track.track_id) {
                let event = AlertEvent {
                    timestamp: timestamp_now(),
                    track_id: track.track_id,
                    class_id: track.class_id,
                    label: label.to_string(),
                    confidence: track.confidence,
                    speed_kmh,
                    bbox,
                    overspeed: speed_kmh > self.alert_speed_threshold,
                };
                if let Some(log) = &self.event_log {
                    if let Err(e) = log.record(&event) {
                        warn!("❌ 事件日志写入失败 (#{}): {}", event.track_id, e);
                    }
                }
                self.notifier.notify(&event);
                alerts.push(event);
            }

            counts[slot].count += 1;
            visible.push(VisibleTrack {
                track: Track { bbox, ..track.clone() },
                label,
                speed_kmh,
            });
        }
        self.speed.advance_frame();

        let stats = FrameStats {
            fps: (measured_fps * 10.0).round() / 10.0,
            total: visible.len(),
            counts,
            total_tracked: self.alerts.alerted_count(),
            use_case: self.profile.name.to_string(),
        };

        // 5. 标注 (失败对本帧是致命的)
        self.annotator.draw(&mut frame, &visible, &stats)?;

        if self.frame_idx % 60 == 0 {
            debug!(
                "🎯 第{}帧: 可见{} | 累计告警{} | 测速历史{} | {:.1}fps",
                self.frame_idx,
                stats.total,
                stats.total_tracked,
                self.speed.track_count(),
                measured_fps
            );
        }

        Ok(FrameOutput {
            frame,
            stats,
            tracks: visible,
            alerts,
            full_pass,
        })
    }

    /// 完整追踪: 结果整体替换缓存;出错或数据损坏按0个目标处理
    fn run_tracking_pass(&mut self, frame: &RgbImage) {
        let tracks = match self.detector.detect(
            frame,
            self.conf_threshold,
            &self.class_ids,
            DetectMode::Track,
        ) {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!("⚠️ 追踪失败,按0个目标处理: {}", e);
                Vec::new()
            }
        };
        let before = tracks.len();
        let tracks: Vec<Track> = tracks.into_iter().filter(Track::is_well_formed).collect();
        if tracks.len() < before {
            warn!("⚠️ 丢弃{}个损坏的追踪结果", before - tracks.len());
        }

        self.full_passes += 1;
        for track in &tracks {
            self.last_seen_pass.insert(track.track_id, self.full_passes);
        }
        self.cached_tracks = tracks;
        self.evict_stale_tracks();
    }

    /// 仅检测: 结果丢弃,缓存不变
    fn run_warmup_pass(&mut self, frame: &RgbImage) {
        if let Err(e) = self.detector.detect(
            frame,
            self.conf_threshold,
            &self.class_ids,
            DetectMode::DetectOnly,
        ) {
            debug!("仅检测调用失败 (忽略): {}", e);
        }
    }

    /// 连续缺席 stale_track_passes 次完整追踪的目标,清除其记录与测速历史
    ///
    /// 以 last_seen_pass 为准遍历: 从未进入测速的ID (场景外类别/裁剪后无效) 同样会被清除
    fn evict_stale_tracks(&mut self) {
        let full_passes = self.full_passes;
        let limit = self.stale_track_passes;
        let mut stale = Vec::new();
        self.last_seen_pass.retain(|&track_id, &mut seen| {
            let keep = full_passes - seen < limit;
            if !keep {
                stale.push(track_id);
            }
            keep
        });
        for track_id in stale {
            self.speed.remove_track(track_id);
            debug!("🧹 清除消失目标 #{}", track_id);
        }
    }
}

/// 宽度超过上限时等比缩小
fn resize_to_width(frame: RgbImage, max_width: u32) -> Result<RgbImage> {
    let (w, h) = frame.dimensions();
    if w <= max_width || h == 0 {
        return Ok(frame);
    }
    let scale = max_width as f64 / w as f64;
    let new_h = ((h as f64 * scale) as u32).max(1);

    let src = fr::images::Image::from_vec_u8(w, h, frame.into_raw(), fr::PixelType::U8x3)
        .map_err(|e| MonitorError::Resize(e.to_string()))?;
    let mut dst = fr::images::Image::new(max_width, new_h, fr::PixelType::U8x3);
    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src,
            &mut dst,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .map_err(|e| MonitorError::Resize(e.to_string()))?;

    RgbImage::from_raw(max_width, new_h, dst.buffer().to_vec())
        .ok_or_else(|| MonitorError::Resize("resized buffer size mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;

    #[test]
    fn test_resize_keeps_aspect_ratio() {
        let frame = RgbImage::new(1280, 720);
        let out = resize_to_width(frame, 640).unwrap();
        assert_eq!(out.dimensions(), (640, 360));
    }

    #[test]
    fn test_narrow_frame_is_untouched() {
        let frame = RgbImage::new(320, 240);
        let out = resize_to_width(frame, 640).unwrap();
        assert_eq!(out.dimensions(), (320, 240));
    }

    struct Fixed(Vec<Track>);

    impl ObjectDetector for Fixed {
        fn detect(&mut self, _: &RgbImage, _: f32, _: &[u32], _: DetectMode) -> Result<Vec<Track>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_stale_history_is_evicted() {
        let config = MonitorConfig {
            track_every: 1,
            ..MonitorConfig::default()
        };
        let car = Track::new(1, 2, 0.9, BBox::new(10.0, 10.0, 50.0, 50.0));
        let mut pipeline = FramePipeline::new(Box::new(Fixed(vec![car])), &config).unwrap();
        pipeline.process_frame(RgbImage::new(100, 100)).unwrap();
        assert_eq!(pipeline.speed_track_count(), 1);

        pipeline.detector = Box::new(Fixed(Vec::new()));
        pipeline.process_frame(RgbImage::new(100, 100)).unwrap();
        assert_eq!(pipeline.speed_track_count(), 0);
    }

    #[test]
    fn test_malformed_tracks_are_dropped() {
        let config = MonitorConfig::default();
        let bad = Track::new(1, 2, 0.9, BBox::new(f32::NAN, 10.0, 50.0, 50.0));
        let good = Track::new(2, 2, 0.9, BBox::new(10.0, 10.0, 50.0, 50.0));
        let mut pipeline = FramePipeline::new(Box::new(Fixed(vec![bad, good])), &config).unwrap();
        let out = pipeline.process_frame(RgbImage::new(100, 100)).unwrap();
        assert_eq!(out.tracks.len(), 1);
        assert_eq!(out.tracks[0].track.track_id, 2);
    }

    /// 每次完整追踪都换一批场景外的新ID
    struct Churning(u32);

    impl ObjectDetector for Churning {
        fn detect(&mut self, _: &RgbImage, _: f32, _: &[u32], _: DetectMode) -> Result<Vec<Track>> {
            self.0 += 1;
            Ok(vec![
                Track::new(self.0, 0, 0.9, BBox::new(10.0, 10.0, 50.0, 50.0)),
                Track::new(100_000 + self.0, 2, 0.9, BBox::new(200.0, 10.0, 250.0, 50.0)),
            ])
        }
    }

    #[test]
    fn test_unrendered_ids_do_not_accumulate() {
        let config = MonitorConfig {
            track_every: 1,
            ..MonitorConfig::default()
        };
        let mut pipeline = FramePipeline::new(Box::new(Churning(0)), &config).unwrap();
        for _ in 0..1000 {
            let out = pipeline.process_frame(RgbImage::new(100, 100)).unwrap();
            // 人不属于 traffic,车的框完全在画面外
            assert!(out.tracks.is_empty());
        }
        assert_eq!(pipeline.speed_track_count(), 0);
        assert!(pipeline.last_seen_pass.len() <= 2);
    }
}
