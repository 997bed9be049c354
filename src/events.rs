//! 告警事件 (Alert events)
//!
//! - EventLog: 追加写入的CSV事件日志 (固定表头,每个事件一行)
//! - Notifier: 即发即忘的提醒 (失败全部吞掉)

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::detection::BBox;
use crate::error::{MonitorError, Result};

pub const LOG_HEADER: &str = "timestamp,track_id,class,confidence,speed_kmh,bbox";

/// 一次性告警事件
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertEvent {
    pub timestamp: String,
    pub track_id: u32,
    pub class_id: u32,
    pub label: String,
    pub confidence: f32,
    pub speed_kmh: f64,
    pub bbox: BBox,
    /// 速度超过配置阈值
    pub overspeed: bool,
}

/// 本地时间 ISO-8601 (微秒精度)
pub fn timestamp_now() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// 日志中的一行
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub track_id: u32,
    pub class: String,
    pub confidence: f32,
    pub speed_kmh: f64,
    pub bbox: [i32; 4],
}

impl LogEntry {
    fn parse(line: &str) -> Result<Self> {
        let fields = split_csv_line(line);
        if fields.len() != 6 {
            return Err(MonitorError::InvalidLogRow(line.to_string()));
        }
        let invalid = || MonitorError::InvalidLogRow(line.to_string());
        Ok(Self {
            timestamp: fields[0].clone(),
            track_id: fields[1].parse().map_err(|_| invalid())?,
            class: fields[2].clone(),
            confidence: fields[3].parse().map_err(|_| invalid())?,
            speed_kmh: fields[4].parse().map_err(|_| invalid())?,
            bbox: parse_bbox(&fields[5]).ok_or_else(invalid)?,
        })
    }
}

/// 追加写入的事件日志,多个会话可共享 (写入串行化)
pub struct EventLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl EventLog {
    /// 打开日志,不存在时创建并写入表头
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            let mut f = File::create(&path)?;
            writeln!(f, "{}", LOG_HEADER)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条事件记录
    pub fn record(&self, event: &AlertEvent) -> Result<()> {
        let [x1, y1, x2, y2] = event.bbox.to_ltrb();
        let row = [
            csv_field(&event.timestamp),
            event.track_id.to_string(),
            csv_field(&event.label),
            format!("{}", round_to(event.confidence as f64, 3)),
            format!("{}", round_to(event.speed_kmh, 2)),
            csv_field(&format!("[{}, {}, {}, {}]", x1, y1, x2, y2)),
        ]
        .join(",");

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut f = OpenOptions::new().append(true).create(true).open(&self.path)?;
        writeln!(f, "{}", row)?;
        debug!("📝 记录事件 #{} {}", event.track_id, event.label);
        Ok(())
    }

    /// 最近 N 条记录 (无法解析的行跳过)
    pub fn recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let f = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut rows = Vec::new();
        for line in BufReader::new(f).lines().skip(1) {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match LogEntry::parse(&line) {
                Ok(entry) => rows.push(entry),
                Err(e) => warn!("⚠️ 跳过无效日志行: {}", e),
            }
        }
        let start = rows.len().saturating_sub(limit);
        Ok(rows.split_off(start))
    }
}

fn round_to(v: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (v * factor).round() / factor
}

fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_bbox(s: &str) -> Option<[i32; 4]> {
    let inner = s.trim().strip_prefix('[')?.strip_suffix(']')?;
    let values: Vec<i32> = inner
        .split(',')
        .map(|v| v.trim().parse().ok())
        .collect::<Option<_>>()?;
    values.try_into().ok()
}

// ========== 提醒 ==========

/// 即发即忘的提醒,不得阻塞调用方,失败不得外抛
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &AlertEvent);
}

/// 终端响铃 (后台线程,失败忽略)
pub struct TerminalBell;

impl Notifier for TerminalBell {
    fn notify(&self, _event: &AlertEvent) {
        let _ = thread::Builder::new().name("bell".into()).spawn(|| {
            let mut err = io::stderr();
            let _ = err.write_all(b"\x07");
            let _ = err.flush();
        });
    }
}

/// 静默 (无头运行 / 测试)
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _event: &AlertEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(track_id: u32, label: &str) -> AlertEvent {
        AlertEvent {
            timestamp: timestamp_now(),
            track_id,
            class_id: 2,
            label: label.to_string(),
            confidence: 0.87654,
            speed_kmh: 42.456,
            bbox: BBox::new(10.0, 20.0, 110.0, 220.0),
            overspeed: false,
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/detections.csv");
        let log = EventLog::open(&path).unwrap();
        log.record(&event(1, "car")).unwrap();
        let log = EventLog::open(&path).unwrap();
        log.record(&event(2, "traffic light")).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], LOG_HEADER);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with(",1,car,0.877,42.46,\"[10, 20, 110, 220]\""));
    }

    #[test]
    fn test_recent_returns_last_rows() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::open(dir.path().join("d.csv")).unwrap();
        for id in 1..=5 {
            log.record(&event(id, "car")).unwrap();
        }
        let rows = log.recent(2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].track_id, 4);
        assert_eq!(rows[1].track_id, 5);
        assert_eq!(rows[1].bbox, [10, 20, 110, 220]);
        assert_eq!(rows[1].confidence, 0.877);
        assert_eq!(rows[1].speed_kmh, 42.46);
    }

    #[test]
    fn test_recent_skips_garbage_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.csv");
        let log = EventLog::open(&path).unwrap();
        log.record(&event(1, "car")).unwrap();
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "garbage").unwrap();
        assert_eq!(log.recent(100).unwrap().len(), 1);
    }

    #[test]
    fn test_split_quoted_fields() {
        let fields = split_csv_line("a,\"[1, 2]\",\"say \"\"hi\"\"\"");
        assert_eq!(fields, vec!["a", "[1, 2]", "say \"hi\""]);
    }

    #[test]
    fn test_notifiers_never_fail() {
        let notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(SilentNotifier), Box::new(TerminalBell)];
        for n in &notifiers {
            n.notify(&event(1, "car"));
        }
    }
}
