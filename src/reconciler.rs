//! 本地 run 状态与远端报告的对账
//!
//! 对账不修改任何东西：输入本地快照，返回合并了远端观测的新快照。
//! 阶段迁移由控制器根据 `RunStatus::remote_phase` 决定。

use tracing::debug;

use crate::controller::{RunPhase, RunStatus};
use crate::error::ProbeError;
use crate::remote::{ControlApi, RemotePhase, WriterStatistics};

/// 一次远端轮询的结果
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObservation {
    pub phase: RemotePhase,
    /// 写入进程活跃时的统计；写入进程 API 不可达时为 `None`
    pub statistics: Option<WriterStatistics>,
    /// 远端报告错误阶段时的错误信息
    pub error: Option<String>,
}

/// 状态对账器
pub struct StatusReconciler<'a> {
    api: &'a dyn ControlApi,
}

impl<'a> StatusReconciler<'a> {
    pub fn new(api: &'a dyn ControlApi) -> Self {
        Self { api }
    }

    /// 轮询当前 run：状态，活跃时的统计，出错时的错误信息
    pub fn poll_current(&self) -> Result<RemoteObservation, ProbeError> {
        let phase = self.api.status()?;

        let statistics = if phase.is_active() || phase.is_error() {
            self.api.statistics()?
        } else {
            None
        };

        let error = if phase.is_error() {
            match self.api.error() {
                Ok(message) => message,
                Err(e) => {
                    debug!(error = %e, "Could not fetch remote error message");
                    None
                }
            }
        } else {
            None
        };

        debug!(remote = %phase, has_stats = statistics.is_some(), "Polled writer status");
        Ok(RemoteObservation {
            phase,
            statistics,
            error,
        })
    }

    /// 上一次 run 的统计
    pub fn poll_last_run(&self) -> Result<WriterStatistics, ProbeError> {
        self.api.last_run_statistics()
    }

    /// 把远端观测合并进本地快照
    ///
    /// 远端不可达时返回错误，调用方的快照保持不变。
    pub fn reconcile(&self, local: &RunStatus) -> Result<RunStatus, ProbeError> {
        let observation = self.poll_current()?;
        Ok(merge(local, observation))
    }

    /// 已写入帧数：run 活跃时取当前统计，否则取上一次 run 的统计
    pub fn get_written_frames(&self, phase: RunPhase) -> Result<Option<u64>, ProbeError> {
        if phase.is_active() {
            Ok(self.api.statistics()?.and_then(|s| s.n_written_frames))
        } else {
            Ok(self.poll_last_run()?.n_written_frames)
        }
    }
}

/// 合并观测；帧数只在远端给出时更新
pub fn merge(local: &RunStatus, observation: RemoteObservation) -> RunStatus {
    let mut next = local.clone();

    if let Some(stats) = &observation.statistics {
        if let Some(n) = stats.n_written_frames {
            next.written_frames = n;
        }
        if let Some(n) = stats.n_received_frames {
            next.received_frames = n;
        }
        if next.expected_frames == 0 {
            if let Some(n) = stats.n_frames {
                next.expected_frames = n;
            }
        }
    }

    if observation.phase.is_error() {
        next.last_error = Some(
            observation
                .error
                .unwrap_or_else(|| "writer reported an error".to_string()),
        );
    }

    next.remote_phase = Some(observation.phase);
    next
}
