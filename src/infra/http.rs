//! 控制 API 的 HTTP 实现（reqwest blocking）
//!
//! 路由：
//! - 控制 API：`/start_pco_writer`、`/status/<writer-port>`、`/finished`、`/error`、
//!   `/server_log/<service>`、`/server_uptime/<service>`、`/ack`
//! - 写入进程 API（仅在 run 期间存在）：`/statistics`、`/stop`、`/kill`

use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ClientSettings;
use crate::error::ProbeError;
use crate::remote::{CommandResponse, ControlApi, Endpoints, RemotePhase, StartRequest, WriterStatistics};

/// 控制 API 路由
pub mod routes {
    pub const START: &str = "/start_pco_writer";
    pub const STATUS: &str = "/status";
    pub const STATISTICS: &str = "/statistics";
    pub const STOP: &str = "/stop";
    pub const KILL: &str = "/kill";
    pub const ERROR: &str = "/error";
    pub const SERVER_LOG: &str = "/server_log";
    pub const SERVER_UPTIME: &str = "/server_uptime";
    pub const ACK: &str = "/ack";
    pub const FINISHED: &str = "/finished";
}

/// 基于 HTTP 的控制 API 客户端
pub struct HttpControlApi {
    client: reqwest::blocking::Client,
    endpoints: Endpoints,
    timeout: Duration,
}

impl HttpControlApi {
    /// 创建客户端，`timeout` 为单次请求超时
    pub fn new(endpoints: Endpoints, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Cannot create HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoints,
            timeout,
        })
    }

    /// 按客户端设置创建
    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let endpoints = Endpoints {
            control_api_address: settings.control_api_address.clone(),
            writer_api_address: settings.writer_api_address.clone(),
            service_name: settings.resolved_service_name(),
        };
        Self::new(endpoints, settings.request_timeout())
    }

    fn control_url(&self, route: &str) -> String {
        format!("{}{}", self.endpoints.control_api_address.trim_end_matches('/'), route)
    }

    fn writer_url(&self, route: &str) -> String {
        format!("{}{}", self.endpoints.writer_api_address.trim_end_matches('/'), route)
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> ProbeError {
        if e.is_timeout() {
            ProbeError::Timeout {
                url: url.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            ProbeError::Unreachable {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }

    fn read_json(&self, url: &str, response: reqwest::blocking::Response) -> Result<Value, ProbeError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().map_err(|e| self.transport_error(url, e))?;
        serde_json::from_str(&body).map_err(|e| ProbeError::Malformed {
            url: url.to_string(),
            reason: format!("{} - body: {}", e, truncate(&body, 200)),
        })
    }

    fn get_json(&self, url: &str) -> Result<Value, ProbeError> {
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| self.transport_error(url, e))?;
        debug!(url, elapsed_ms = start.elapsed().as_millis() as u64, "GET completed");
        self.read_json(url, response)
    }

    fn post_json<T: Serialize>(&self, url: &str, body: &T) -> Result<Value, ProbeError> {
        let start = Instant::now();
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .map_err(|e| self.transport_error(url, e))?;
        debug!(url, elapsed_ms = start.elapsed().as_millis() as u64, "POST completed");
        self.read_json(url, response)
    }
}

fn decode<T: DeserializeOwned>(url: &str, value: Value) -> Result<T, ProbeError> {
    serde_json::from_value(value).map_err(|e| ProbeError::Malformed {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// 取出字符串字段；非字符串值按 JSON 文本返回
fn text_field(url: &str, value: &Value, field: &str) -> Result<String, ProbeError> {
    match value.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(ProbeError::Malformed {
            url: url.to_string(),
            reason: format!("missing '{}' field", field),
        }),
        Some(other) => Ok(other.to_string()),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

impl ControlApi for HttpControlApi {
    fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn set_endpoints(&mut self, endpoints: Endpoints) {
        debug!(
            control = %endpoints.control_api_address,
            writer = %endpoints.writer_api_address,
            "Retargeting control API client"
        );
        self.endpoints = endpoints;
    }

    fn ack(&self) -> Result<(), ProbeError> {
        let url = self.control_url(routes::ACK);
        let value = self.get_json(&url)?;
        if value.get("success").is_some() {
            Ok(())
        } else {
            Err(ProbeError::Malformed {
                url,
                reason: "ack response has no 'success' field".to_string(),
            })
        }
    }

    fn start(&self, request: &StartRequest) -> Result<CommandResponse, ProbeError> {
        let url = self.control_url(routes::START);
        let value = self.post_json(&url, request)?;
        decode(&url, value)
    }

    fn stop(&self) -> Result<CommandResponse, ProbeError> {
        let url = self.writer_url(routes::STOP);
        let value = self.get_json(&url)?;
        decode(&url, value)
    }

    fn kill(&self) -> Result<RemotePhase, ProbeError> {
        let url = self.writer_url(routes::KILL);
        let value = self.get_json(&url)?;
        Ok(RemotePhase::parse(&text_field(&url, &value, "status")?))
    }

    fn status(&self) -> Result<RemotePhase, ProbeError> {
        let url = format!(
            "{}/{}",
            self.control_url(routes::STATUS),
            self.endpoints.writer_port()
        );
        let value = self.get_json(&url)?;
        Ok(RemotePhase::parse(&text_field(&url, &value, "status")?))
    }

    fn statistics(&self) -> Result<Option<WriterStatistics>, ProbeError> {
        let url = self.writer_url(routes::STATISTICS);
        match self.get_json(&url) {
            Ok(value) => decode(&url, value).map(Some),
            // 写入进程 API 只在 run 期间存在，连接失败说明进程不在运行
            Err(ProbeError::Unreachable { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn last_run_statistics(&self) -> Result<WriterStatistics, ProbeError> {
        let url = self.control_url(routes::FINISHED);
        let value = self.get_json(&url)?;
        decode(&url, value)
    }

    fn error(&self) -> Result<Option<String>, ProbeError> {
        let url = self.control_url(routes::ERROR);
        let value = self.get_json(&url)?;
        Ok(match value.get("error") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        })
    }

    fn log(&self) -> Result<String, ProbeError> {
        let url = format!(
            "{}/{}",
            self.control_url(routes::SERVER_LOG),
            self.endpoints.service_name
        );
        let value = self.get_json(&url)?;
        text_field(&url, &value, "log")
    }

    fn uptime(&self) -> Result<String, ProbeError> {
        let url = format!(
            "{}/{}",
            self.control_url(routes::SERVER_UPTIME),
            self.endpoints.service_name
        );
        let value = self.get_json(&url)?;
        text_field(&url, &value, "uptime")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Endpoints {
        Endpoints {
            control_api_address: "http://localhost:9901/".to_string(),
            writer_api_address: "http://localhost:9555".to_string(),
            service_name: "pco_writer-pco1".to_string(),
        }
    }

    #[test]
    fn test_urls() {
        let api = HttpControlApi::new(endpoints(), Duration::from_millis(100)).unwrap();
        assert_eq!(api.control_url(routes::ACK), "http://localhost:9901/ack");
        assert_eq!(api.writer_url(routes::KILL), "http://localhost:9555/kill");
        assert_eq!(api.endpoints().writer_port(), "9555");
    }

    #[test]
    fn test_text_field() {
        let value: Value = serde_json::json!({"status": "writing", "n": 3});
        assert_eq!(text_field("u", &value, "status").unwrap(), "writing");
        assert_eq!(text_field("u", &value, "n").unwrap(), "3");
        assert!(matches!(
            text_field("u", &value, "log"),
            Err(ProbeError::Malformed { .. })
        ));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("写入器状态", 2), "写入");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
