//! 清空数据流中上一次 run 残留的消息

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::controller::Deadline;
use crate::error::ProbeError;
use crate::remote::StreamConnector;

/// 清空结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// 丢弃的消息数
    pub drained: usize,
    /// 是否因整体超时而停止（此时数据流可能仍有消息）
    pub timed_out: bool,
}

/// 数据流清空器
pub struct StreamFlusher {
    /// 单次接收等待时间，期间没有消息即认为数据流已空
    attempt_interval: Duration,
}

impl StreamFlusher {
    pub fn new(attempt_interval: Duration) -> Self {
        Self { attempt_interval }
    }

    /// 反复接收并丢弃消息，直到某次接收在间隔内无消息，或累计超过 `timeout`
    ///
    /// 空数据流不是错误，返回 `drained == 0`。
    pub fn flush(
        &self,
        connector: &dyn StreamConnector,
        address: &str,
        timeout: Duration,
        verbose: bool,
    ) -> Result<FlushReport, ProbeError> {
        let deadline = Deadline::after(timeout);
        let connect_timeout = self.attempt_interval.min(timeout).max(Duration::from_millis(1));
        let mut receiver = connector.connect(address, connect_timeout)?;
        let mut drained = 0usize;

        loop {
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                break;
            }
            match receiver.recv_timeout(self.attempt_interval.min(remaining))? {
                Some(message) => {
                    drained += 1;
                    if verbose {
                        debug!(drained, bytes = message.len(), "Discarded stale message");
                    }
                }
                None => {
                    report(address, drained, false, verbose);
                    return Ok(FlushReport {
                        drained,
                        timed_out: false,
                    });
                }
            }
        }

        report(address, drained, true, verbose);
        Ok(FlushReport {
            drained,
            timed_out: true,
        })
    }
}

fn report(address: &str, drained: usize, timed_out: bool, verbose: bool) {
    if verbose {
        info!(address, drained, timed_out, "Stream flush finished");
    } else {
        debug!(address, drained, timed_out, "Stream flush finished");
    }
}
