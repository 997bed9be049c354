/// 视频分析监控 (Video analytics monitor)
///
/// 离线回放: 图片序列 + 录制的追踪器输出 → 推流会话 → 标注帧 + 每帧统计
///
/// 主程序入口 - 直接运行: cargo run --bin monitor --release -- --frames data/frames
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use yolo_monitor::events::{Notifier, SilentNotifier, TerminalBell};
use yolo_monitor::{
    gen_time_string, EventLog, ImageSequenceSource, Monitor, MonitorConfig, ReplayDetector,
    StreamMessage,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// 监控参数
#[derive(Parser, Debug)]
#[command(author, version, about = "视频分析监控 - 离线回放", long_about = None)]
struct Args {
    /// 图片序列目录 (按文件名排序)
    #[arg(short, long)]
    frames: PathBuf,

    /// 录制的追踪器输出 (JSON Lines, 每行一帧)
    #[arg(short, long)]
    detections: Option<PathBuf>,

    /// 图片序列的原生帧率
    #[arg(long, default_value_t = 25.0)]
    fps: f64,

    /// 场景: traffic / security / wildlife / retail / airport
    #[arg(short, long)]
    use_case: Option<String>,

    /// 配置文件
    #[arg(short, long, default_value = "monitor.json")]
    config: PathBuf,

    /// 输出目录 (标注帧 + stats.jsonl),默认 runs/<时间>
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// 告警时响铃
    #[arg(long)]
    bell: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = MonitorConfig::load(&args.config);
    if let Some(use_case) = &args.use_case {
        config.default_use_case = use_case.clone();
    }
    config.print_summary();

    let event_log = EventLog::open(&config.event_log_path)
        .with_context(|| format!("无法打开事件日志 {}", config.event_log_path))?;
    let notifier: Arc<dyn Notifier> = if args.bell {
        Arc::new(TerminalBell)
    } else {
        Arc::new(SilentNotifier)
    };
    let monitor = Monitor::new(config)
        .context("监控初始化失败")?
        .with_event_log(Arc::new(event_log))
        .with_notifier(notifier);

    let detector = match &args.detections {
        Some(path) => ReplayDetector::load(path)
            .with_context(|| format!("无法加载追踪记录 {}", path.display()))?,
        None => {
            warn!("⚠️ 未提供追踪记录,所有帧按0个目标处理");
            ReplayDetector::new(Vec::new())
        }
    };
    let source = ImageSequenceSource::open(&args.frames, Some(args.fps));

    let out_dir = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from("runs").join(gen_time_string("")));
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("无法创建输出目录 {}", out_dir.display()))?;
    let mut stats_file = BufWriter::new(
        File::create(out_dir.join("stats.jsonl")).context("无法创建 stats.jsonl")?,
    );

    info!("🚀 监控启动 | 场景={} | 输出={}", monitor.current_use_case(), out_dir.display());
    let handle = monitor
        .open_stream(Box::new(source), Box::new(detector))
        .context("无法打开推流会话")?;
    info!("📺 会话#{} 已启动", handle.id());

    let mut frames: u64 = 0;
    let mut alerts: usize = 0;
    for message in handle.messages().iter() {
        match message {
            StreamMessage::Frame {
                jpeg,
                stats,
                alerts: new_alerts,
            } => {
                fs::write(out_dir.join(format!("frame_{:06}.jpg", frames)), &jpeg)?;
                let line = json!({ "frame": frames, "stats": stats, "alerts": new_alerts });
                writeln!(stats_file, "{}", line)?;
                for alert in &new_alerts {
                    info!(
                        "🚨 #{} {} conf={:.2} speed={:.1}km/h{}",
                        alert.track_id,
                        alert.label,
                        alert.confidence,
                        alert.speed_kmh,
                        if alert.overspeed { " [超速]" } else { "" }
                    );
                }
                alerts += new_alerts.len();
                frames += 1;
            }
            StreamMessage::Done => break,
            StreamMessage::Error(e) => {
                error!("❌ 会话错误: {}", e);
                break;
            }
        }
    }
    stats_file.flush()?;

    match handle.join() {
        Ok(end) => info!("🏁 会话结束: {:?}", end),
        Err(e) => error!("❌ 会话失败: {}", e),
    }

    info!("📊 共处理 {} 帧, {} 次告警", frames, alerts);
    for entry in monitor.logs(5)? {
        info!(
            "  {} #{} {} {:.3} {:.2}km/h {:?}",
            entry.timestamp, entry.track_id, entry.class, entry.confidence, entry.speed_kmh, entry.bbox
        );
    }
    Ok(())
}
