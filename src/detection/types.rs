/// 检测/追踪数据结构定义
/// Data structures for detector/tracker output
use serde::{Deserialize, Serialize};

// ========== 数据结构 ==========

/// 检测框 (axis-aligned bounding box, 像素坐标 x1<x2, y1<y2)
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// 获取中心点
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// 裁剪到画面范围内 (坐标取整,与绘制/日志保持一致)
    pub fn clamp_to(&self, width: u32, height: u32) -> BBox {
        let (w, h) = (width as f32, height as f32);
        BBox {
            x1: self.x1.trunc().max(0.0),
            y1: self.y1.trunc().max(0.0),
            x2: self.x2.trunc().min(w),
            y2: self.y2.trunc().min(h),
        }
    }

    /// 裁剪后宽高必须为正
    pub fn is_valid(&self) -> bool {
        self.x2 > self.x1 && self.y2 > self.y1
    }

    /// 整数坐标 [x1, y1, x2, y2]
    pub fn to_ltrb(&self) -> [i32; 4] {
        [
            self.x1 as i32,
            self.y1 as i32,
            self.x2 as i32,
            self.y2 as i32,
        ]
    }
}

/// 跟踪对象 (由外部追踪器产生,跨帧保持稳定ID)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: u32,
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BBox,
}

impl Track {
    pub fn new(track_id: u32, class_id: u32, confidence: f32, bbox: BBox) -> Self {
        Self {
            track_id,
            class_id,
            confidence,
            bbox,
        }
    }

    /// 追踪器输出是否可用 (非有限坐标或置信度视为损坏数据)
    pub fn is_well_formed(&self) -> bool {
        self.bbox.is_finite() && self.confidence.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_to_frame_bounds() {
        let b = BBox::new(-10.4, 5.9, 700.2, 300.0).clamp_to(640, 480);
        assert_eq!(b, BBox::new(0.0, 5.0, 640.0, 300.0));
        assert!(b.is_valid());
    }

    #[test]
    fn test_box_outside_frame_becomes_invalid() {
        let b = BBox::new(650.0, 10.0, 700.0, 50.0).clamp_to(640, 480);
        assert!(!b.is_valid());
    }

    #[test]
    fn test_non_finite_track_is_malformed() {
        let t = Track::new(1, 2, 0.9, BBox::new(f32::NAN, 0.0, 10.0, 10.0));
        assert!(!t.is_well_formed());
        let t = Track::new(1, 2, 0.9, BBox::new(0.0, 0.0, 10.0, 10.0));
        assert!(t.is_well_formed());
    }

    #[test]
    fn test_center() {
        assert_eq!(BBox::new(0.0, 10.0, 20.0, 30.0).center(), (10.0, 20.0));
    }
}
