//! 控制 API 的请求/响应类型

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::address::port_of;
use crate::config::WriterConfig;

/// 远端报告的写入进程状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemotePhase {
    /// 正在接收数据
    Receiving,
    /// 正在写文件
    Writing,
    /// 正常结束
    Finished,
    /// 被 stop 停止
    Stopped,
    /// 被 kill 终止
    Killed,
    /// 远端报告错误
    Error,
    /// 其他状态（初始化中、unknown 等）
    Other(String),
}

impl RemotePhase {
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "receiving" => Self::Receiving,
            "writing" => Self::Writing,
            "finished" => Self::Finished,
            "stopped" => Self::Stopped,
            "killed" => Self::Killed,
            "error" | "failed" => Self::Error,
            _ => Self::Other(status.trim().to_string()),
        }
    }

    /// 写入进程是否活跃
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Receiving | Self::Writing)
    }

    /// 远端明确报告已结束
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Finished | Self::Stopped | Self::Killed)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Receiving => "receiving",
            Self::Writing => "writing",
            Self::Finished => "finished",
            Self::Stopped => "stopped",
            Self::Killed => "killed",
            Self::Error => "error",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for RemotePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RemotePhase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// 控制 API 与写入进程 API 的地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub control_api_address: String,
    pub writer_api_address: String,
    pub service_name: String,
}

impl Endpoints {
    /// 写入进程 API 端口，控制 API 的 `/status/<port>` 需要
    pub fn writer_port(&self) -> String {
        port_of(&self.writer_api_address)
            .map(|p| p.to_string())
            .unwrap_or_default()
    }
}

/// 启动请求；远端要求所有值都以字符串传递
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartRequest {
    pub connection_address: String,
    pub output_file: String,
    pub n_frames: String,
    pub user_id: String,
    pub dataset_name: String,
    pub max_frames_per_file: String,
    pub rest_api_port: String,
    pub n_modules: String,
    pub writer_rest_port: String,
    pub flask_api_address: String,
}

impl StartRequest {
    pub fn from_config(config: &WriterConfig) -> Self {
        let port = |address: &str| port_of(address).map(|p| p.to_string()).unwrap_or_default();
        Self {
            connection_address: config.stream_address.clone(),
            output_file: config.output_file.clone(),
            n_frames: config.n_frames.to_string(),
            user_id: config.user_id.to_string(),
            dataset_name: config.dataset_name.clone(),
            max_frames_per_file: config.max_frames_per_file.to_string(),
            rest_api_port: port(&config.control_api_address),
            n_modules: "1".to_string(),
            writer_rest_port: port(&config.writer_api_address),
            flask_api_address: config.control_api_address.clone(),
        }
    }
}

/// start / stop 的通用应答
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<String>,
}

impl CommandResponse {
    /// 远端给出的说明文字
    pub fn reason(&self) -> String {
        match &self.value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => self
                .status
                .clone()
                .unwrap_or_else(|| "no reason given".to_string()),
        }
    }
}

/// 写入进程统计信息
///
/// 所有字段可选；数字字段可能以数字或数字字符串出现。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriterStatistics {
    #[serde(default)]
    pub dataset_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration_sec: Option<f64>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub first_frame_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub n_frames: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub n_lost_frames: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub n_received_frames: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub n_written_frames: Option<u64>,
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub user_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub writing_rate: Option<f64>,
}

impl WriterStatistics {
    pub fn phase(&self) -> Option<RemotePhase> {
        self.status.as_deref().map(RemotePhase::parse)
    }
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_phase_parse() {
        assert_eq!(RemotePhase::parse("receiving"), RemotePhase::Receiving);
        assert_eq!(RemotePhase::parse(" Writing "), RemotePhase::Writing);
        assert_eq!(RemotePhase::parse("failed"), RemotePhase::Error);
        assert_eq!(
            RemotePhase::parse("initialized"),
            RemotePhase::Other("initialized".to_string())
        );
        assert!(RemotePhase::Killed.is_completed());
        assert!(!RemotePhase::Other("unknown".to_string()).is_active());
    }

    #[test]
    fn test_statistics_accepts_numeric_strings() {
        let stats: WriterStatistics = serde_json::from_str(
            r#"{"n_written_frames": "40", "n_frames": 100, "writing_rate": "12.5",
                "status": "writing", "unexpected": true}"#,
        )
        .unwrap();
        assert_eq!(stats.n_written_frames, Some(40));
        assert_eq!(stats.n_frames, Some(100));
        assert_eq!(stats.writing_rate, Some(12.5));
        assert_eq!(stats.phase(), Some(RemotePhase::Writing));
        assert_eq!(stats.n_lost_frames, None);
    }

    #[test]
    fn test_start_request_uses_string_values() {
        let config = WriterConfig {
            output_file: "/tmp/a.h5".to_string(),
            dataset_name: "data".to_string(),
            n_frames: 5,
            stream_address: "tcp://10.10.1.26:8080".to_string(),
            control_api_address: "http://xbl-daq-34:9901".to_string(),
            writer_api_address: "http://xbl-daq-34:9555".to_string(),
            user_id: 0,
            max_frames_per_file: 20000,
            debug: false,
        };
        let json = serde_json::to_value(StartRequest::from_config(&config)).unwrap();
        assert_eq!(json["n_frames"], "5");
        assert_eq!(json["rest_api_port"], "9901");
        assert_eq!(json["writer_rest_port"], "9555");
        assert_eq!(json["n_modules"], "1");
    }

    #[test]
    fn test_command_response_reason() {
        let resp: CommandResponse =
            serde_json::from_str(r#"{"success": false, "value": "writer busy"}"#).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.reason(), "writer busy");
    }
}
