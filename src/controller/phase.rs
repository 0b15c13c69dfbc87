//! 生命周期阶段
//!
//! ```text
//! IDLE → CONFIGURED → RUNNING → STOPPING → FINISHED
//!                        └──────────┴──────→ ERROR
//! ```
//! FINISHED / ERROR 只能通过 reset 回到 IDLE。

use std::fmt;

use serde::Serialize;

use crate::remote::RemotePhase;

/// 控制器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunPhase {
    Idle,
    Configured,
    Running,
    Stopping,
    Finished,
    Error,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Configured => "CONFIGURED",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Finished => "FINISHED",
            Self::Error => "ERROR",
        }
    }

    /// FINISHED 或 ERROR
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }

    /// 远端写入进程可能正在运行
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }

    /// 是否允许（重新）配置
    pub fn accepts_configuration(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 根据远端观测计算下一阶段
///
/// `seen_active` 表示本次 run 中远端是否已报告过活跃状态。在此之前，
/// 任何非活跃、非错误的状态（包括上一次 run 留下的 finished）都视为写入进程仍在启动；
/// 之后则视为已结束。
pub fn observe(phase: RunPhase, remote: &RemotePhase, seen_active: bool) -> RunPhase {
    match phase {
        RunPhase::Running => {
            if remote.is_error() {
                RunPhase::Error
            } else if seen_active && !remote.is_active() {
                RunPhase::Finished
            } else {
                RunPhase::Running
            }
        }
        RunPhase::Stopping => {
            if remote.is_error() {
                RunPhase::Error
            } else if remote.is_active() {
                RunPhase::Stopping
            } else {
                RunPhase::Finished
            }
        }
        other => other,
    }
}
