//! Frame Writer Client - 远端帧写入服务的控制面客户端
//!
//! 控制器通过 HTTP 控制 API 配置、启动、停止远端写入进程，并与其报告的状态对账；
//! 数据流（ZeroMQ PULL）只用于连通性检查和清空残留消息。

pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod flusher;
pub mod infra;
pub mod probe;
pub mod progress;
pub mod reconciler;
pub mod remote;

pub use config::{CameraProfile, CameraProfiles, ClientSettings, ConfigPatch, WriterConfig};
pub use controller::{LifecycleController, Outcome, RunPhase, RunSlots, RunStatus};
pub use error::{ConfigViolation, ProbeError, WriterError, WriterResult};
pub use flusher::{FlushReport, StreamFlusher};
pub use infra::{HttpControlApi, ZmqStreamConnector};
pub use probe::{ConnectionState, FailureKind, ServiceProbe};
pub use progress::progress_message;
pub use reconciler::{RemoteObservation, StatusReconciler};
pub use remote::{
    CommandResponse, ControlApi, Endpoints, RemotePhase, StartRequest, StreamConnector,
    StreamReceiver, WriterStatistics,
};
