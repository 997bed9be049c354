//! 图片序列文件源
//!
//! 目录下的图片按文件名排序后逐帧读取,帧率由调用方给定

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::{FrameRead, FrameSource, SourceKind};
use crate::error::Result;

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    fps: Option<f64>,
    opened: bool,
}

impl ImageSequenceSource {
    /// 打开图片目录;目录不存在或没有图片时 `is_opened()` 为 false
    pub fn open(dir: impl AsRef<Path>, fps: Option<f64>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let files = match fs::read_dir(&dir) {
            Ok(entries) => {
                let mut files: Vec<PathBuf> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| is_image(p))
                    .collect();
                files.sort();
                files
            }
            Err(e) => {
                warn!("⚠️ 无法读取帧目录 {}: {}", dir.display(), e);
                Vec::new()
            }
        };
        let opened = !files.is_empty();
        if opened {
            info!("🎞️ 图片序列: {} 帧 ({})", files.len(), dir.display());
        }
        Self {
            dir,
            files,
            cursor: 0,
            fps: fps.filter(|f| f.is_finite() && *f > 0.0),
            opened,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn is_opened(&self) -> bool {
        self.opened
    }

    fn native_fps(&self) -> Option<f64> {
        self.fps
    }

    fn read(&mut self) -> Result<FrameRead> {
        if !self.opened {
            return Ok(FrameRead::End);
        }
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(FrameRead::End);
        };
        self.cursor += 1;
        match image::open(path) {
            Ok(img) => Ok(FrameRead::Frame(img.to_rgb8())),
            Err(e) => {
                // 文件源的坏帧按流结束处理
                warn!("⚠️ 帧解码失败 {}: {}, 视为流结束", path.display(), e);
                Ok(FrameRead::End)
            }
        }
    }

    fn release(&mut self) {
        self.opened = false;
    }

    fn describe(&self) -> String {
        format!("image sequence {}", self.dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_missing_dir_is_not_opened() {
        let src = ImageSequenceSource::open("/definitely/not/here", Some(25.0));
        assert!(!src.is_opened());
    }

    #[test]
    fn test_reads_sorted_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(4, 2).save(dir.path().join("b.png")).unwrap();
        RgbImage::new(8, 2).save(dir.path().join("a.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let mut src = ImageSequenceSource::open(dir.path(), Some(30.0));
        assert_eq!(src.len(), 2);
        assert_eq!(src.native_fps(), Some(30.0));
        match src.read().unwrap() {
            FrameRead::Frame(f) => assert_eq!(f.width(), 8),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(src.read().unwrap(), FrameRead::Frame(_)));
        assert!(matches!(src.read().unwrap(), FrameRead::End));
    }

    #[test]
    fn test_corrupt_frame_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0001.jpg"), b"not a jpeg").unwrap();
        let mut src = ImageSequenceSource::open(dir.path(), None);
        assert!(src.is_opened());
        assert!(matches!(src.read().unwrap(), FrameRead::End));
    }

    #[test]
    fn test_release_stops_reading() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(4, 4).save(dir.path().join("a.png")).unwrap();
        let mut src = ImageSequenceSource::open(dir.path(), None);
        src.release();
        assert!(!src.is_opened());
        assert!(matches!(src.read().unwrap(), FrameRead::End));
    }
}
