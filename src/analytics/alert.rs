//! 告警去重 (Alert deduplication)
//! 每个跟踪ID在一个场景会话内只告警一次

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct AlertDeduplicator {
    alerted: HashSet<u32>,
}

impl AlertDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 首次出现返回 true,之后返回 false,直到 `reset()`
    pub fn should_alert(&mut self, track_id: u32) -> bool {
        self.alerted.insert(track_id)
    }

    /// 已告警的不同目标数
    pub fn alerted_count(&self) -> usize {
        self.alerted.len()
    }

    pub fn reset(&mut self) {
        self.alerted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alerts_exactly_once() {
        let mut dedup = AlertDeduplicator::new();
        let results: Vec<bool> = (0..5).map(|_| dedup.should_alert(42)).collect();
        assert_eq!(results, vec![true, false, false, false, false]);
        assert_eq!(dedup.alerted_count(), 1);
    }

    #[test]
    fn test_reset_re_arms() {
        let mut dedup = AlertDeduplicator::new();
        assert!(dedup.should_alert(1));
        assert!(!dedup.should_alert(1));
        dedup.reset();
        assert!(dedup.should_alert(1));
    }

    #[test]
    fn test_ids_are_independent() {
        let mut dedup = AlertDeduplicator::new();
        assert!(dedup.should_alert(1));
        assert!(dedup.should_alert(2));
        assert_eq!(dedup.alerted_count(), 2);
    }
}
