//! 轮询等待用的截止时间和帧数停滞检测

use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::status::RunStatus;

/// 等待类操作的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// 命令已被远端确认，未等待
    Accepted(RunStatus),
    /// run 已进入 FINISHED
    Finished(RunStatus),
    /// 已写入帧数达到目标
    FramesReached(RunStatus),
    /// 等待超时，远端可能仍在运行
    TimedOut(RunStatus),
    /// 调用前 run 已经处于终止阶段，未做任何操作
    AlreadyFinished(RunStatus),
}

impl Outcome {
    pub fn status(&self) -> &RunStatus {
        match self {
            Self::Accepted(s)
            | Self::Finished(s)
            | Self::FramesReached(s)
            | Self::TimedOut(s)
            | Self::AlreadyFinished(s) => s,
        }
    }

    pub fn into_status(self) -> RunStatus {
        match self {
            Self::Accepted(s)
            | Self::Finished(s)
            | Self::FramesReached(s)
            | Self::TimedOut(s)
            | Self::AlreadyFinished(s) => s,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted(_) => "accepted",
            Self::Finished(_) => "finished",
            Self::FramesReached(_) => "frames reached",
            Self::TimedOut(_) => "timed out",
            Self::AlreadyFinished(_) => "already finished",
        }
    }
}

/// 截止时间
///
/// `timeout` 大到无法表示为 `Instant` 时视为没有截止时间。
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    end: Option<Instant>,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            end: Instant::now().checked_add(timeout),
        }
    }

    pub fn remaining(&self) -> Duration {
        match self.end {
            Some(end) => end.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// 睡眠一个轮询间隔，但不越过截止时间
    pub fn sleep(&self, interval: Duration) {
        let nap = interval.min(self.remaining());
        if !nap.is_zero() {
            thread::sleep(nap);
        }
    }
}

/// 已写入帧数的停滞检测
///
/// 只有超过历史最大值才算进展并重新计时；返回自上次进展以来的时长。
#[derive(Debug, Clone)]
pub struct InactivityTracker {
    high_water: u64,
    last_change: Instant,
}

impl InactivityTracker {
    pub fn new(initial: u64) -> Self {
        Self {
            high_water: initial,
            last_change: Instant::now(),
        }
    }

    pub fn observe(&mut self, value: u64) -> Duration {
        if value > self.high_water {
            self.high_water = value;
            self.last_change = Instant::now();
        }
        self.last_change.elapsed()
    }

    /// 距离 `limit` 还剩多久
    pub fn remaining(&self, limit: Duration) -> Duration {
        limit.saturating_sub(self.last_change.elapsed())
    }
}
