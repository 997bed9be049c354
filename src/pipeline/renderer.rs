//! 帧标注 (Frame annotation)
//! 检测框 + 白色描边 + 标签,左下角FPS/场景,右上角半透明计数面板

use std::fs;
use std::io::Cursor;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{info, warn};

use super::{FrameStats, VisibleTrack};
use crate::error::{MonitorError, Result};
use crate::usecase::class_color;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
const LIGHT_GRAY: Rgb<u8> = Rgb([220, 220, 220]);

const LABEL_SCALE: f32 = 16.0;
const OVERLAY_SCALE: f32 = 20.0;
const PANEL_LINE_H: i32 = 24;
const PANEL_W: i32 = 170;
const PANEL_ALPHA: f32 = 0.6;

pub struct Annotator {
    font: Option<FontArc>,
}

impl Annotator {
    pub fn new(font: Option<FontArc>) -> Self {
        Self { font }
    }

    /// 加载字体文件;失败时只画框不画字
    pub fn from_font_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let font = match fs::read(path) {
            Ok(bytes) => match FontArc::try_from_vec(bytes) {
                Ok(font) => {
                    info!("✅ 字体加载成功: {}", path.display());
                    Some(font)
                }
                Err(e) => {
                    warn!("⚠️ 字体加载失败: {}", e);
                    None
                }
            },
            Err(_) => {
                warn!("⚠️ 未找到字体文件: {}, 标签文字将不绘制", path.display());
                None
            }
        };
        Self { font }
    }

    pub fn draw(&self, frame: &mut RgbImage, tracks: &[VisibleTrack], stats: &FrameStats) -> Result<()> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(MonitorError::Render(format!(
                "empty frame {}x{}",
                frame.width(),
                frame.height()
            )));
        }

        for visible in tracks {
            self.draw_track(frame, visible);
        }
        self.draw_status(frame, stats);
        self.draw_count_panel(frame, stats);
        Ok(())
    }

    fn draw_track(&self, frame: &mut RgbImage, visible: &VisibleTrack) {
        let [x1, y1, x2, y2] = visible.track.bbox.to_ltrb();
        let (w, h) = ((x2 - x1) as u32, (y2 - y1) as u32);
        let color = Rgb(class_color(visible.track.class_id));

        // 白色描边 + 彩色框 (2像素)
        draw_hollow_rect_mut(frame, Rect::at(x1 - 1, y1 - 1).of_size(w + 2, h + 2), WHITE);
        draw_hollow_rect_mut(frame, Rect::at(x1, y1).of_size(w, h), color);
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(frame, Rect::at(x1 + 1, y1 + 1).of_size(w - 2, h - 2), color);
        }

        let Some(font) = &self.font else {
            return;
        };
        let label = format!(
            "#{} {} {:.2}",
            visible.track.track_id, visible.label, visible.track.confidence
        );
        let scale = PxScale::from(LABEL_SCALE);
        let (lw, lh) = text_size(scale, font, &label);
        let top = (y1 - lh as i32 - 6).max(0);
        draw_filled_rect_mut(frame, Rect::at(x1, top).of_size(lw + 2, lh + 6), color);
        draw_text_mut(frame, BLACK, x1 + 1, top + 3, scale, font, &label);
    }

    fn draw_status(&self, frame: &mut RgbImage, stats: &FrameStats) {
        let Some(font) = &self.font else {
            return;
        };
        let text = format!("FPS: {:.1}  [{}]", stats.fps, stats.use_case.to_uppercase());
        let scale = PxScale::from(OVERLAY_SCALE);
        let (_, th) = text_size(scale, font, &text);
        let y = frame.height() as i32 - th as i32 - 10;
        draw_text_mut(frame, YELLOW, 8, y.max(0), scale, font, &text);
    }

    fn draw_count_panel(&self, frame: &mut RgbImage, stats: &FrameStats) {
        let mut lines = vec![format!("Total: {}", stats.total)];
        lines.extend(
            stats
                .counts
                .iter()
                .filter(|c| c.count > 0)
                .map(|c| format!("{}: {}", c.label, c.count)),
        );

        let w = frame.width() as i32;
        let panel_h = lines.len() as i32 * PANEL_LINE_H + 10;
        let px = w - PANEL_W - 8;
        blend_dark(frame, px - 4, 8, w - 8, 8 + panel_h);

        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(OVERLAY_SCALE);
        for (i, line) in lines.iter().enumerate() {
            let color = if i == 0 { YELLOW } else { LIGHT_GRAY };
            let y = 8 + i as i32 * PANEL_LINE_H + 4;
            draw_text_mut(frame, color, px.max(0), y, scale, font, line);
        }
    }
}

/// 半透明黑色面板: pixel * (1 - alpha)
fn blend_dark(frame: &mut RgbImage, x0: i32, y0: i32, x1: i32, y1: i32) {
    let x0 = x0.clamp(0, frame.width() as i32) as u32;
    let x1 = x1.clamp(0, frame.width() as i32) as u32;
    let y0 = y0.clamp(0, frame.height() as i32) as u32;
    let y1 = y1.clamp(0, frame.height() as i32) as u32;
    let keep = 1.0 - PANEL_ALPHA;
    for y in y0..y1 {
        for x in x0..x1 {
            let p = frame.get_pixel_mut(x, y);
            for c in p.0.iter_mut() {
                *c = (*c as f32 * keep).round() as u8;
            }
        }
    }
}

/// JPEG 编码 (传输用)
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        encoder.encode_image(frame)?;
    }
    Ok(buf.into_inner())
}
