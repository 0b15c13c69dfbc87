//! run 状态快照和"当前 run / 上一次 run"两个槽位

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::phase::RunPhase;
use crate::remote::RemotePhase;

/// 一次 run 的状态快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    /// run 序号，每次确认启动加一；0 表示还没有 run
    pub run_id: u64,
    /// 控制器阶段
    pub phase: RunPhase,
    /// 远端最近一次报告的状态
    pub remote_phase: Option<RemotePhase>,
    /// 已写入帧数
    pub written_frames: u64,
    /// 已接收帧数
    pub received_frames: u64,
    /// 期望帧数，0 表示不限
    pub expected_frames: u64,
    /// 远端报告的最近错误
    pub last_error: Option<String>,
    /// 启动被确认的时间
    pub started_at: Option<DateTime<Utc>>,
    /// 自启动以来的时长
    pub uptime: Option<Duration>,
}

impl RunStatus {
    /// 空快照
    pub fn idle(phase: RunPhase) -> Self {
        Self {
            run_id: 0,
            phase,
            remote_phase: None,
            written_frames: 0,
            received_frames: 0,
            expected_frames: 0,
            last_error: None,
            started_at: None,
            uptime: None,
        }
    }

    /// 新 run 的初始快照
    pub fn started(run_id: u64, expected_frames: u64) -> Self {
        Self {
            run_id,
            phase: RunPhase::Running,
            expected_frames,
            started_at: Some(Utc::now()),
            uptime: Some(Duration::ZERO),
            ..Self::idle(RunPhase::Running)
        }
    }
}

/// 当前 run 和上一次 run
///
/// 当前 run 每次轮询都会被替换；上一次 run 只在当前 run 进入终止阶段时写入一次。
#[derive(Debug, Clone)]
pub struct RunSlots {
    current: RunStatus,
    last_run: Option<RunStatus>,
}

impl RunSlots {
    pub fn new() -> Self {
        Self {
            current: RunStatus::idle(RunPhase::Idle),
            last_run: None,
        }
    }

    pub fn current(&self) -> &RunStatus {
        &self.current
    }

    pub fn last_run(&self) -> Option<&RunStatus> {
        self.last_run.as_ref()
    }

    /// 替换当前 run
    pub fn replace_current(&mut self, status: RunStatus) {
        self.current = status;
    }

    pub fn set_phase(&mut self, phase: RunPhase) {
        self.current.phase = phase;
    }

    pub fn current_mut(&mut self) -> &mut RunStatus {
        &mut self.current
    }

    /// 当前 run 进入终止阶段，复制到上一次 run
    pub fn complete(&mut self) {
        self.last_run = Some(self.current.clone());
    }

    /// 丢弃当前 run，上一次 run 保留
    pub fn clear_current(&mut self, phase: RunPhase) {
        self.current = RunStatus::idle(phase);
    }
}

impl Default for RunSlots {
    fn default() -> Self {
        Self::new()
    }
}
