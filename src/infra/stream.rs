//! 数据流传输（ZeroMQ PULL）
//!
//! 控制器是同步阻塞的，这里在单线程 tokio runtime 上驱动 zeromq 的异步 socket，
//! 每次接收都有独立的超时。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::runtime::Runtime;
use tracing::debug;
use zeromq::{PullSocket, Socket, SocketRecv};

use crate::error::ProbeError;
use crate::remote::{StreamConnector, StreamReceiver};

/// ZeroMQ 数据流连接工厂
pub struct ZmqStreamConnector {
    runtime: Arc<Runtime>,
}

impl ZmqStreamConnector {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| anyhow!("Cannot create stream runtime: {}", e))?;
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }
}

impl StreamConnector for ZmqStreamConnector {
    fn connect(&self, address: &str, timeout: Duration) -> Result<Box<dyn StreamReceiver>, ProbeError> {
        let stream_error = |reason: String| ProbeError::Stream {
            address: address.to_string(),
            reason,
        };

        let socket = self.runtime.block_on(async {
            let mut socket = PullSocket::new();
            match tokio::time::timeout(timeout, socket.connect(address)).await {
                Ok(Ok(())) => Ok(socket),
                Ok(Err(e)) => Err(stream_error(e.to_string())),
                Err(_) => Err(stream_error(format!(
                    "connect timed out after {} ms",
                    timeout.as_millis()
                ))),
            }
        })?;

        debug!(address, "Connected to stream");
        Ok(Box::new(ZmqPullReceiver {
            runtime: Arc::clone(&self.runtime),
            socket,
            address: address.to_string(),
        }))
    }
}

/// 已连接的 PULL socket
struct ZmqPullReceiver {
    runtime: Arc<Runtime>,
    socket: PullSocket,
    address: String,
}

impl StreamReceiver for ZmqPullReceiver {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ProbeError> {
        let socket = &mut self.socket;
        let received = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, socket.recv()).await });

        match received {
            Err(_) => Ok(None),
            Ok(Ok(message)) => Ok(Some(
                message
                    .into_vec()
                    .into_iter()
                    .flat_map(|frame| frame.to_vec())
                    .collect(),
            )),
            Ok(Err(e)) => Err(ProbeError::Stream {
                address: self.address.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
