//! 错误类型
//!
//! `WriterError` 对应控制面的五类错误；`ProbeError` 单独描述与远端
//! （控制 API / 数据流）通信失败的原因，由 `WriterError::Probe` 包装。

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::controller::RunPhase;

/// 库内统一的 Result 别名
pub type WriterResult<T> = std::result::Result<T, WriterError>;

/// 单个配置字段的校验失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigViolation {
    /// 字段名
    pub field: &'static str,
    /// 失败原因
    pub message: String,
}

impl ConfigViolation {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_violations(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

fn seconds(duration: &Duration) -> f64 {
    duration.as_secs_f64()
}

/// 控制面错误
#[derive(Debug, Error)]
pub enum WriterError {
    /// 配置不完整或不合法，需要重新 configure
    #[error("invalid writer configuration: {}", join_violations(.violations))]
    Configuration { violations: Vec<ConfigViolation> },

    /// 当前阶段不允许该操作
    #[error("cannot {operation} while the controller is {phase}{}", detail_suffix(.detail))]
    InvalidState {
        operation: &'static str,
        phase: RunPhase,
        detail: Option<String>,
    },

    /// 远端不可达或响应无法解析
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// 远端明确报告了错误阶段
    #[error("acquisition failed (run {run_id}): {reason}")]
    AcquisitionFailed { run_id: u64, reason: String },

    /// wait_n_frames 期间帧数长时间没有增长
    #[error(
        "acquisition stalled (run {run_id}): {written} of {expected} frames written, no progress for {:.1}s",
        seconds(.idle)
    )]
    AcquisitionStalled {
        run_id: u64,
        written: u64,
        expected: u64,
        idle: Duration,
    },
}

impl WriterError {
    pub(crate) fn invalid_state(operation: &'static str, phase: RunPhase) -> Self {
        Self::InvalidState {
            operation,
            phase,
            detail: None,
        }
    }

    /// 调用方是否可以在不 reset 的情况下重试
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::AcquisitionFailed { .. })
    }

    /// 配置错误时返回全部违规字段
    pub fn violations(&self) -> &[ConfigViolation] {
        match self {
            Self::Configuration { violations } => violations,
            _ => &[],
        }
    }
}

/// 与远端通信的失败原因
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("writer service at {url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("request to {url} timed out after {timeout_ms} ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("writer service at {url} answered with HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    /// 远端正常应答，但拒绝执行命令
    #[error("writer service refused '{command}': {reason}")]
    Rejected { command: &'static str, reason: String },

    #[error("stream transport {address} failed: {reason}")]
    Stream { address: String, reason: String },
}

impl ProbeError {
    /// 是否属于"远端不可达"（相对于"远端应答了但内容有问题"）
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. } | Self::Timeout { .. } | Self::Stream { .. }
        )
    }
}
