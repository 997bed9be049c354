//! 场景配置 (Use-case profiles)
//! 命名场景 → 关心的类别 (COCO类别ID → 显示标签)

use phf::phf_map;

use crate::error::{MonitorError, Result};

/// 场景: 有序的 类别ID → 标签 映射
#[derive(Debug, PartialEq, Eq)]
pub struct UseCaseProfile {
    pub name: &'static str,
    pub classes: &'static [(u32, &'static str)],
}

impl UseCaseProfile {
    /// 按名称查找场景
    pub fn get(name: &str) -> Result<&'static UseCaseProfile> {
        USE_CASE_INDICES
            .get(name)
            .map(|&index| &USE_CASES[index])
            .ok_or_else(|| MonitorError::UnknownUseCase(name.to_string()))
    }

    pub fn label(&self, class_id: u32) -> Option<&'static str> {
        self.classes
            .iter()
            .find(|(id, _)| *id == class_id)
            .map(|(_, label)| *label)
    }

    pub fn contains(&self, class_id: u32) -> bool {
        self.label(class_id).is_some()
    }

    /// 送给检测器的类别过滤列表
    pub fn class_ids(&self) -> Vec<u32> {
        self.classes.iter().map(|(id, _)| *id).collect()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.classes.iter().map(|(_, label)| *label).collect()
    }
}

pub static USE_CASES: [UseCaseProfile; 5] = [
    UseCaseProfile {
        name: "traffic",
        classes: &[
            (2, "car"),
            (5, "bus"),
            (7, "truck"),
            (3, "motorcycle"),
            (1, "bicycle"),
            (9, "traffic light"),
            (11, "stop sign"),
        ],
    },
    UseCaseProfile {
        name: "security",
        classes: &[(0, "person"), (24, "backpack"), (26, "handbag"), (28, "suitcase")],
    },
    UseCaseProfile {
        name: "wildlife",
        classes: &[
            (14, "bird"),
            (15, "cat"),
            (16, "dog"),
            (17, "horse"),
            (18, "sheep"),
            (19, "cow"),
            (20, "elephant"),
            (21, "bear"),
            (22, "zebra"),
            (23, "giraffe"),
        ],
    },
    UseCaseProfile {
        name: "retail",
        classes: &[(0, "person"), (39, "bottle"), (41, "cup"), (24, "backpack")],
    },
    UseCaseProfile {
        name: "airport",
        classes: &[
            (0, "person"),
            (28, "suitcase"),
            (24, "backpack"),
            (4, "airplane"),
            (6, "train"), // 铁路场景同样适用
        ],
    },
];

static USE_CASE_INDICES: phf::Map<&'static str, usize> = phf_map! {
    "traffic" => 0,
    "security" => 1,
    "wildlife" => 2,
    "retail" => 3,
    "airport" => 4,
};

pub const DEFAULT_USE_CASE: &str = "traffic";

/// 所有场景名称 (按表顺序)
pub fn use_case_names() -> Vec<&'static str> {
    USE_CASES.iter().map(|p| p.name).collect()
}

// 每个类别固定颜色 (RGB)
const PALETTE: [[u8; 3]; 12] = [
    [0, 255, 0],
    [0, 165, 255],
    [255, 0, 0],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
    [255, 0, 128],
    [255, 128, 0],
    [0, 128, 255],
    [128, 255, 0],
    [0, 255, 128],
    [128, 0, 255],
];

pub fn class_color(class_id: u32) -> [u8; 3] {
    PALETTE[class_id as usize % PALETTE.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_match_table() {
        for (index, profile) in USE_CASES.iter().enumerate() {
            assert_eq!(USE_CASE_INDICES.get(profile.name), Some(&index));
        }
        assert_eq!(USE_CASE_INDICES.len(), USE_CASES.len());
    }

    #[test]
    fn test_unknown_use_case() {
        let err = UseCaseProfile::get("parking").unwrap_err();
        assert!(matches!(err, MonitorError::UnknownUseCase(ref n) if n == "parking"));
    }

    #[test]
    fn test_profile_order_is_preserved() {
        let traffic = UseCaseProfile::get("traffic").unwrap();
        assert_eq!(traffic.class_ids(), vec![2, 5, 7, 3, 1, 9, 11]);
        assert_eq!(traffic.label(7), Some("truck"));
        assert!(!traffic.contains(0));
    }

    #[test]
    fn test_palette_wraps() {
        assert_eq!(class_color(0), class_color(12));
    }
}
