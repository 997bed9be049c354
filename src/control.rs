//! 控制面 (Control surface)
//!
//! 场景列表 / 切换场景 / 重置统计 / 查询日志 / 健康检查 / 打开推流会话
//! 每个会话持有独立的流水线,这里只负责把控制消息广播给仍在运行的会话;
//! 事件日志是会话之间唯一共享的可变资源

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use image::RgbImage;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MonitorConfig;
use crate::detection::ObjectDetector;
use crate::error::Result;
use crate::events::{EventLog, LogEntry, Notifier, SilentNotifier};
use crate::input::{ChannelSource, FrameSource};
use crate::pipeline::{Annotator, FramePipeline};
use crate::session::{spawn_session, SessionControl, SessionHandle};
use crate::usecase::{use_case_names, UseCaseProfile};

/// 每个会话的待推送消息上限
const SESSION_BUFFER: usize = 2;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UseCaseList {
    pub use_cases: Vec<&'static str>,
    pub current: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SwitchResult {
    pub use_case: &'static str,
    pub classes: Vec<&'static str>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub use_case: &'static str,
    pub active_sessions: usize,
}

struct SessionEntry {
    id: u64,
    control: Sender<SessionControl>,
    alive: Receiver<()>,
}

impl SessionEntry {
    fn is_finished(&self) -> bool {
        matches!(self.alive.try_recv(), Err(TryRecvError::Disconnected))
    }
}

struct ControlState {
    profile: &'static UseCaseProfile,
    sessions: Vec<SessionEntry>,
}

pub struct Monitor {
    config: MonitorConfig,
    event_log: Option<Arc<EventLog>>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<ControlState>,
    next_session: AtomicU64,
}

impl Monitor {
    /// 默认场景名无效时报错
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let profile = UseCaseProfile::get(&config.default_use_case)?;
        Ok(Self {
            config,
            event_log: None,
            notifier: Arc::new(SilentNotifier),
            state: Mutex::new(ControlState {
                profile,
                sessions: Vec::new(),
            }),
            next_session: AtomicU64::new(1),
        })
    }

    pub fn with_event_log(mut self, event_log: Arc<EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    fn state(&self) -> MutexGuard<'_, ControlState> {
        // 锁内不会 panic,中毒时沿用数据
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn use_cases(&self) -> UseCaseList {
        UseCaseList {
            use_cases: use_case_names(),
            current: self.state().profile.name,
        }
    }

    pub fn current_use_case(&self) -> &'static str {
        self.state().profile.name
    }

    /// 切换场景: 先校验,成功后广播给所有会话 (各会话在下一帧前生效)
    pub fn switch_use_case(&self, name: &str) -> Result<SwitchResult> {
        let profile = UseCaseProfile::get(name)?;
        let mut state = self.state();
        state.profile = profile;
        broadcast(&mut state.sessions, SessionControl::SwitchUseCase(profile.name.to_string()));
        info!("🔄 场景切换为 {} ({}个会话)", profile.name, state.sessions.len());
        Ok(SwitchResult {
            use_case: profile.name,
            classes: profile.labels(),
        })
    }

    /// 重置所有会话的派生状态
    pub fn reset(&self) {
        let mut state = self.state();
        broadcast(&mut state.sessions, SessionControl::Reset);
        info!("🔄 统计已重置 ({}个会话)", state.sessions.len());
    }

    /// 最近的事件日志 (未配置日志时为空)
    pub fn logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
        match &self.event_log {
            Some(log) => log.recent(limit),
            None => Ok(Vec::new()),
        }
    }

    pub fn health(&self) -> Health {
        let mut state = self.state();
        prune(&mut state.sessions);
        Health {
            status: "ok",
            use_case: state.profile.name,
            active_sessions: state.sessions.len(),
        }
    }

    /// 为一个消费者打开推流会话: 独立流水线,当前场景
    pub fn open_stream(
        &self,
        source: Box<dyn FrameSource>,
        detector: Box<dyn ObjectDetector>,
    ) -> Result<SessionHandle> {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state();
        let mut pipeline = FramePipeline::new(detector, &self.config)?
            .with_annotator(Annotator::from_font_file(&self.config.font_path))
            .with_notifier(self.notifier.clone());
        if let Some(log) = &self.event_log {
            pipeline = pipeline.with_event_log(log.clone());
        }
        if pipeline.use_case() != state.profile.name {
            pipeline.set_use_case(state.profile.name)?;
        }

        let handle = spawn_session(id, pipeline, source, &self.config, SESSION_BUFFER)?;
        prune(&mut state.sessions);
        state.sessions.push(SessionEntry {
            id,
            control: handle.control(),
            alive: handle.liveness(),
        });
        info!("📺 会话#{} 已打开 (活跃{}个)", id, state.sessions.len());
        Ok(handle)
    }

    /// 实时推流: 返回采集端的推送口 (丢弃即结束) 与会话句柄
    pub fn open_live_stream(
        &self,
        name: &str,
        detector: Box<dyn ObjectDetector>,
    ) -> Result<(Sender<RgbImage>, SessionHandle)> {
        let (frames, source) = ChannelSource::from_config(&self.config, name);
        let handle = self.open_stream(Box::new(source), detector)?;
        Ok((frames, handle))
    }
}

/// 发送失败说明会话已结束,顺便移除
fn broadcast(sessions: &mut Vec<SessionEntry>, msg: SessionControl) {
    sessions.retain(|entry| match entry.control.send(msg.clone()) {
        Ok(()) => true,
        Err(_) => {
            warn!("会话#{} 已结束,移除", entry.id);
            false
        }
    });
}

fn prune(sessions: &mut Vec<SessionEntry>) {
    sessions.retain(|entry| !entry.is_finished());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;

    #[test]
    fn test_switch_unknown_keeps_current() {
        let monitor = Monitor::new(MonitorConfig::default()).unwrap();
        let err = monitor.switch_use_case("aquarium").unwrap_err();
        assert!(matches!(err, MonitorError::UnknownUseCase(_)));
        assert_eq!(monitor.current_use_case(), "traffic");
    }

    #[test]
    fn test_switch_returns_labels() {
        let monitor = Monitor::new(MonitorConfig::default()).unwrap();
        let result = monitor.switch_use_case("security").unwrap();
        assert_eq!(result.classes, vec!["person", "backpack", "handbag", "suitcase"]);
        assert_eq!(monitor.use_cases().current, "security");
        assert_eq!(monitor.use_cases().use_cases.len(), 5);
    }

    #[test]
    fn test_health_without_sessions() {
        let monitor = Monitor::new(MonitorConfig::default()).unwrap();
        let health = monitor.health();
        assert_eq!(health.status, "ok");
        assert_eq!(health.active_sessions, 0);
        assert!(monitor.logs(10).unwrap().is_empty());
    }
}
