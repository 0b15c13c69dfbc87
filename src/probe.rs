//! 连通性检查
//!
//! 每次调用都重新探测，结果不缓存。

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::error::ProbeError;
use crate::remote::{ControlApi, StreamConnector};

/// 一次探测得到的连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    /// 控制 API 是否可达
    pub control_api: bool,
    /// 数据流是否可连接
    pub stream: bool,
}

/// 轮询失败的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 远端不可达（连接失败、超时）
    Unreachable,
    /// 远端应答了，但应答本身有问题
    Application,
}

/// 控制 API / 数据流连通性检查
pub struct ServiceProbe;

impl ServiceProbe {
    /// 控制 API 是否可达（不检查数据流）
    pub fn is_connected(api: &dyn ControlApi) -> bool {
        match api.ack() {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Control API probe failed");
                false
            }
        }
    }

    /// 同时检查控制 API 和数据流
    pub fn connection_state(
        api: &dyn ControlApi,
        stream: &dyn StreamConnector,
        stream_address: &str,
        timeout: Duration,
    ) -> ConnectionState {
        let stream_ok = match stream.connect(stream_address, timeout) {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Stream probe failed");
                false
            }
        };
        ConnectionState {
            control_api: Self::is_connected(api),
            stream: stream_ok,
        }
    }

    pub fn classify(error: &ProbeError) -> FailureKind {
        if error.is_unreachable() {
            FailureKind::Unreachable
        } else {
            FailureKind::Application
        }
    }
}
