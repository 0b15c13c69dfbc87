//! 远端接口
//!
//! 控制 API 和数据流只通过这里的 trait 访问，生产实现位于 `infra`，
//! 测试使用 mock 实现。

pub mod types;

use std::time::Duration;

use crate::error::ProbeError;

pub use types::{CommandResponse, Endpoints, RemotePhase, StartRequest, WriterStatistics};

/// 写入服务的控制 API
pub trait ControlApi: Send {
    /// 当前目标地址
    fn endpoints(&self) -> &Endpoints;

    /// 配置变化后切换目标地址
    fn set_endpoints(&mut self, endpoints: Endpoints);

    /// 轻量存活检查
    fn ack(&self) -> Result<(), ProbeError>;

    /// 提交启动请求
    fn start(&self, request: &StartRequest) -> Result<CommandResponse, ProbeError>;

    /// 请求写入进程优雅停止
    fn stop(&self) -> Result<CommandResponse, ProbeError>;

    /// 立即终止写入进程，返回远端报告的状态
    fn kill(&self) -> Result<RemotePhase, ProbeError>;

    /// 当前写入进程状态
    fn status(&self) -> Result<RemotePhase, ProbeError>;

    /// 运行中写入进程的统计；写入进程 API 不可达时返回 `None`
    fn statistics(&self) -> Result<Option<WriterStatistics>, ProbeError>;

    /// 上一次 run 的统计（包含状态）
    fn last_run_statistics(&self) -> Result<WriterStatistics, ProbeError>;

    /// 最近一次错误信息
    fn error(&self) -> Result<Option<String>, ProbeError>;

    /// 服务端日志末尾
    fn log(&self) -> Result<String, ProbeError>;

    /// 服务端运行时长
    fn uptime(&self) -> Result<String, ProbeError>;
}

/// 数据流接收端
pub trait StreamReceiver {
    /// 在 `timeout` 内接收一条消息，超时返回 `None`
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ProbeError>;
}

/// 数据流连接工厂，地址随配置变化
pub trait StreamConnector: Send {
    fn connect(&self, address: &str, timeout: Duration) -> Result<Box<dyn StreamReceiver>, ProbeError>;
}
