//! 速度估计器 (Speed estimator)
//!
//! 基于像素位移的滚动窗口测速:
//! 每个跟踪ID保存最近 N 个 (帧序号, 中心点y) 样本,
//! 用窗口内最老与最新样本的纵向位移换算 km/h

use std::collections::{HashMap, VecDeque};

use crate::detection::BBox;

/// 默认标定: 每米像素数 (与摄像头高度/角度相关)
pub const PIXELS_PER_METER: f64 = 8.0;

/// 默认窗口长度
pub const SPEED_WINDOW: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Sample {
    frame_index: u64,
    centroid_y: f64,
}

pub struct SpeedEstimator {
    pixels_per_meter: f64,
    window: usize,
    frame_index: u64,
    history: HashMap<u32, VecDeque<Sample>>,
    speeds: HashMap<u32, f64>,
}

impl Default for SpeedEstimator {
    fn default() -> Self {
        Self::new(PIXELS_PER_METER, SPEED_WINDOW)
    }
}

impl SpeedEstimator {
    pub fn new(pixels_per_meter: f64, window: usize) -> Self {
        Self {
            pixels_per_meter,
            window: window.max(2),
            frame_index: 0,
            history: HashMap::new(),
            speeds: HashMap::new(),
        }
    }

    /// 更新跟踪对象的位置并返回速度 (km/h, 保留两位小数)
    ///
    /// `fps` 为调用方实测吞吐,下限 1.0
    pub fn update(&mut self, track_id: u32, bbox: &BBox, fps: f64) -> f64 {
        let (_, cy) = bbox.center();
        let history = self.history.entry(track_id).or_default();
        history.push_back(Sample {
            frame_index: self.frame_index,
            centroid_y: cy as f64,
        });
        while history.len() > self.window {
            history.pop_front();
        }

        let speed_kmh = match (history.front(), history.back()) {
            (Some(oldest), Some(newest)) if history.len() >= 2 => {
                // 重复帧或非单调输入时 frame_span <= 0,速度为0
                if newest.frame_index > oldest.frame_index {
                    let frame_span = (newest.frame_index - oldest.frame_index) as f64;
                    let pixel_distance = (newest.centroid_y - oldest.centroid_y).abs();
                    let meters = pixel_distance / self.pixels_per_meter;
                    let seconds = frame_span / fps.max(1.0);
                    meters / seconds * 3.6
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        let speed_kmh = round2(speed_kmh);
        self.speeds.insert(track_id, speed_kmh);
        speed_kmh
    }

    /// 帧序号前进一帧 (每处理完一帧调用一次)
    pub fn advance_frame(&mut self) {
        self.frame_index += 1;
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// 最近一次计算的速度
    pub fn get_speed(&self, track_id: u32) -> f64 {
        self.speeds.get(&track_id).copied().unwrap_or(0.0)
    }

    /// 丢弃已消失目标的历史
    pub fn remove_track(&mut self, track_id: u32) {
        self.history.remove(&track_id);
        self.speeds.remove(&track_id);
    }

    pub fn track_ids(&self) -> Vec<u32> {
        self.history.keys().copied().collect()
    }

    pub fn track_count(&self) -> usize {
        self.history.len()
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.speeds.clear();
        self.frame_index = 0;
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bbox_at(cy: f32) -> BBox {
        BBox::new(100.0, cy - 20.0, 140.0, cy + 20.0)
    }

    #[test]
    fn test_single_sample_is_zero() {
        let mut est = SpeedEstimator::default();
        assert_eq!(est.update(1, &bbox_at(100.0), 25.0), 0.0);
    }

    #[test]
    fn test_eighty_pixels_over_ten_frames() {
        // (80/8) / (10/25) * 3.6 = 90 km/h
        let mut est = SpeedEstimator::default();
        est.update(7, &bbox_at(100.0), 25.0);
        for _ in 0..10 {
            est.advance_frame();
        }
        let speed = est.update(7, &bbox_at(180.0), 25.0);
        assert_relative_eq!(speed, 90.0, epsilon = 1e-9);
        assert_relative_eq!(est.get_speed(7), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_duplicate_frame_index_is_zero() {
        let mut est = SpeedEstimator::default();
        est.update(1, &bbox_at(100.0), 25.0);
        // 同一帧内再次更新: frame_span == 0
        assert_eq!(est.update(1, &bbox_at(300.0), 25.0), 0.0);
    }

    #[test]
    fn test_window_is_capped() {
        let mut est = SpeedEstimator::new(8.0, 10);
        for i in 0..25 {
            est.update(3, &bbox_at(100.0 + i as f32 * 8.0), 25.0);
            est.advance_frame();
        }
        assert_eq!(est.history[&3].len(), 10);
        // 窗口内: 9帧 × 8像素 → (72/8)/(9/25)*3.6 = 90
        assert_relative_eq!(est.get_speed(3), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fps_is_floored() {
        let mut est = SpeedEstimator::default();
        est.update(1, &bbox_at(100.0), 0.0);
        est.advance_frame();
        // fps=0 → 1.0: (8/8)/(1/1)*3.6 = 3.6
        assert_relative_eq!(est.update(1, &bbox_at(108.0), 0.0), 3.6, epsilon = 1e-9);
    }

    #[test]
    fn test_remove_track() {
        let mut est = SpeedEstimator::default();
        est.update(1, &bbox_at(100.0), 25.0);
        est.update(2, &bbox_at(100.0), 25.0);
        est.remove_track(1);
        assert_eq!(est.track_ids(), vec![2]);
        assert_eq!(est.get_speed(1), 0.0);
    }
}
