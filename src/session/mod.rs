/// 推流会话 (Stream Session)
///
/// 一个消费者连接 = 一个会话线程 = 一个帧源 + 独立的 FramePipeline
/// 循环: 取帧 → 流水线 → JPEG编码 → 推送 → 节流
/// - 帧源结束: 发送 Done
/// - 帧源不可用/出错: 发送 Error 后结束
/// - 消费者断开或停止信号: 立即退出
/// 任何退出路径都会释放帧源
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, SendTimeoutError, Sender, TryRecvError};
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::events::AlertEvent;
use crate::input::{FrameRead, FrameSource, SourceGuard, SourceKind};
use crate::pipeline::{encode_jpeg, FramePipeline, FrameStats};

/// 推送给消费者的消息
#[derive(Clone, Debug)]
pub enum StreamMessage {
    Frame {
        jpeg: Vec<u8>,
        stats: FrameStats,
        alerts: Vec<AlertEvent>,
    },
    /// 帧源正常结束
    Done,
    /// 致命错误,会话随即结束
    Error(String),
}

/// 会话控制消息 (在两帧之间生效)
#[derive(Clone, Debug, PartialEq)]
pub enum SessionControl {
    SwitchUseCase(String),
    Reset,
}

/// 会话结束原因
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// 帧源耗尽
    Completed,
    /// 收到停止信号
    Stopped,
    /// 消费者断开或长时间不取
    ConsumerGone,
}

pub struct StreamSession {
    id: u64,
    pipeline: FramePipeline,
    source: Box<dyn FrameSource>,
    messages: Sender<StreamMessage>,
    stop: Receiver<()>,
    control: Receiver<SessionControl>,

    jpeg_quality: u8,
    deliver_timeout: Duration,
    live_fps_cap: f64,
    file_fps_fallback: f64,
}

impl StreamSession {
    pub fn new(
        id: u64,
        pipeline: FramePipeline,
        source: Box<dyn FrameSource>,
        config: &MonitorConfig,
        messages: Sender<StreamMessage>,
        stop: Receiver<()>,
        control: Receiver<SessionControl>,
    ) -> Self {
        Self {
            id,
            pipeline,
            source,
            messages,
            stop,
            control,
            jpeg_quality: config.jpeg_quality,
            deliver_timeout: config.deliver_timeout(),
            live_fps_cap: config.live_fps_cap,
            file_fps_fallback: config.file_fps_fallback,
        }
    }

    /// 目标帧间隔: 文件源按原生帧率,实时源按上限
    pub fn frame_interval(&self) -> Duration {
        let fps = match self.source.kind() {
            SourceKind::File => self
                .source
                .native_fps()
                .filter(|f| f.is_finite() && *f > 0.0)
                .unwrap_or(self.file_fps_fallback),
            SourceKind::Live => self.live_fps_cap,
        };
        if fps.is_finite() && fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            Duration::ZERO
        }
    }

    pub fn run(self) -> Result<SessionEnd> {
        let interval = self.frame_interval();
        let Self {
            id,
            mut pipeline,
            mut source,
            messages,
            stop,
            control,
            jpeg_quality,
            deliver_timeout,
            ..
        } = self;

        let mut guard = SourceGuard::new(source.as_mut());

        if !guard.source().is_opened() {
            let desc = guard.source().describe();
            error!("❌ 会话#{} 帧源不可用: {}", id, desc);
            let _ = messages.send_timeout(
                StreamMessage::Error(format!("source unavailable: {}", desc)),
                deliver_timeout,
            );
            return Err(MonitorError::SourceUnavailable(desc));
        }

        info!(
            "📺 会话#{} 开始: {} | 场景={} | 帧间隔{:.1}ms",
            id,
            guard.source().describe(),
            pipeline.use_case(),
            interval.as_secs_f64() * 1000.0
        );

        let mut delivered: u64 = 0;
        let end = loop {
            // 停止信号优先
            match stop.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break SessionEnd::Stopped,
                Err(TryRecvError::Empty) => {}
            }
            apply_controls(id, &control, &mut pipeline);

            let started = Instant::now();
            let frame = match guard.source().read() {
                Ok(FrameRead::Frame(frame)) => frame,
                Ok(FrameRead::Skipped) => continue,
                Ok(FrameRead::End) => {
                    info!("🏁 会话#{} 帧源结束,共推送{}帧", id, delivered);
                    match messages.send_timeout(StreamMessage::Done, deliver_timeout) {
                        Ok(()) => break SessionEnd::Completed,
                        Err(_) => break SessionEnd::ConsumerGone,
                    }
                }
                Err(e) => {
                    error!("❌ 会话#{} 帧源错误: {}", id, e);
                    let _ = messages.send_timeout(StreamMessage::Error(e.to_string()), deliver_timeout);
                    return Err(e);
                }
            };

            let message = match process_and_encode(&mut pipeline, frame, jpeg_quality) {
                Ok(message) => message,
                Err(e) => {
                    error!("❌ 会话#{} 帧处理失败: {}", id, e);
                    let _ = messages.send_timeout(StreamMessage::Error(e.to_string()), deliver_timeout);
                    return Err(e);
                }
            };

            match messages.send_timeout(message, deliver_timeout) {
                Ok(()) => delivered += 1,
                Err(SendTimeoutError::Disconnected(_)) => {
                    info!("🔌 会话#{} 消费者已断开", id);
                    break SessionEnd::ConsumerGone;
                }
                Err(SendTimeoutError::Timeout(_)) => {
                    warn!("⚠️ 会话#{} 消费者{}ms未取帧,视为断开", id, deliver_timeout.as_millis());
                    break SessionEnd::ConsumerGone;
                }
            }

            // 节流: 扣除本帧耗时;等待期间可被停止信号打断
            let delay = interval.saturating_sub(started.elapsed());
            if delay.is_zero() {
                continue;
            }
            select! {
                recv(stop) -> _ => break SessionEnd::Stopped,
                default(delay) => {}
            }
        };

        drop(guard);
        debug!("会话#{} 结束: {:?}, 帧源已释放", id, end);
        Ok(end)
    }
}

fn process_and_encode(
    pipeline: &mut FramePipeline,
    frame: image::RgbImage,
    jpeg_quality: u8,
) -> Result<StreamMessage> {
    let output = pipeline.process_frame(frame)?;
    let jpeg = encode_jpeg(&output.frame, jpeg_quality)?;
    Ok(StreamMessage::Frame {
        jpeg,
        stats: output.stats,
        alerts: output.alerts,
    })
}

/// 处理积压的控制消息
fn apply_controls(id: u64, control: &Receiver<SessionControl>, pipeline: &mut FramePipeline) {
    while let Ok(msg) = control.try_recv() {
        match msg {
            SessionControl::SwitchUseCase(name) => {
                if let Err(e) = pipeline.set_use_case(&name) {
                    warn!("⚠️ 会话#{} 场景切换被拒绝: {}", id, e);
                }
            }
            SessionControl::Reset => {
                pipeline.reset_stats();
                info!("🔄 会话#{} 统计已重置", id);
            }
        }
    }
}

/// 会话句柄: 停止 / 控制 / 取消息 / 等待结束
pub struct SessionHandle {
    id: u64,
    stop: Sender<()>,
    control: Sender<SessionControl>,
    messages: Receiver<StreamMessage>,
    alive: Receiver<()>,
    thread: JoinHandle<Result<SessionEnd>>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn messages(&self) -> &Receiver<StreamMessage> {
        &self.messages
    }

    pub fn control(&self) -> Sender<SessionControl> {
        self.control.clone()
    }

    /// 存活标记: 会话线程退出后 `try_recv` 返回 Disconnected
    pub fn liveness(&self) -> Receiver<()> {
        self.alive.clone()
    }

    /// 请求停止 (不等待)
    pub fn stop(&self) {
        let _ = self.stop.try_send(());
    }

    /// 放弃句柄并回收会话线程
    ///
    /// 会同时丢弃停止端与消息端: 已结束的会话直接返回结果,
    /// 仍在运行的会话会被取消 (下一次检查停止信号或推送时退出)。
    /// 需要完整数据时应先把 `messages()` 读到 Done / Error
    pub fn join(self) -> Result<SessionEnd> {
        let Self {
            id,
            stop,
            messages,
            thread,
            ..
        } = self;
        drop(stop);
        drop(messages);
        thread
            .join()
            .unwrap_or_else(|_| Err(MonitorError::Source(format!("session #{} panicked", id))))
    }

    /// 停止并等待结束
    pub fn shutdown(self) -> Result<SessionEnd> {
        self.stop();
        self.join()
    }
}

/// 在独立线程上启动会话
pub fn spawn_session(
    id: u64,
    pipeline: FramePipeline,
    source: Box<dyn FrameSource>,
    config: &MonitorConfig,
    buffer: usize,
) -> Result<SessionHandle> {
    let (msg_tx, msg_rx) = crossbeam_channel::bounded(buffer.max(1));
    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    let (ctl_tx, ctl_rx) = crossbeam_channel::unbounded();
    let (alive_tx, alive_rx) = crossbeam_channel::bounded::<()>(0);

    let session = StreamSession::new(id, pipeline, source, config, msg_tx, stop_rx, ctl_rx);
    let thread = thread::Builder::new()
        .name(format!("session-{}", id))
        .spawn(move || {
            let _alive = alive_tx;
            session.run()
        })?;

    Ok(SessionHandle {
        id,
        stop: stop_tx,
        control: ctl_tx,
        messages: msg_rx,
        alive: alive_rx,
        thread,
    })
}
