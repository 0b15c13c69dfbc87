//! 客户端配置
//!
//! 默认地址和超时由 `ClientSettings` 在构造时显式提供。
//!
//! 读取优先级（后者覆盖前者）：
//! 1. 内置默认值
//! 2. 配置文件 `~/.config/frame-writer-client/config.json`
//! 3. 环境变量 `FWC_CONTROL_API` / `FWC_WRITER_API` / `FWC_STREAM_ADDRESS` /
//!    `FWC_REQUEST_TIMEOUT_MS` / `FWC_POLL_INTERVAL_MS`

pub mod address;
pub mod writer;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigViolation, WriterError, WriterResult};
use address::{parse_address, port_of, Protocol};

pub use writer::{ConfigPatch, WriterConfig, DEFAULT_MAX_FRAMES_PER_FILE, DEFAULT_USER_ID};

/// 默认控制 API 地址
pub const DEFAULT_CONTROL_API: &str = "http://localhost:9901";

/// 默认写入进程 API 地址
pub const DEFAULT_WRITER_API: &str = "http://localhost:9555";

/// 默认数据流地址
pub const DEFAULT_STREAM_ADDRESS: &str = "tcp://localhost:8080";

/// 单次请求超时（毫秒）
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3000;

/// 轮询间隔（毫秒）
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 150;

/// 清空数据流时单次接收的等待时间（毫秒）
pub const DEFAULT_FLUSH_ATTEMPT_MS: u64 = 500;

/// 客户端设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// 控制 API 地址
    pub control_api_address: String,
    /// 写入进程 API 地址
    pub writer_api_address: String,
    /// 数据流地址
    pub stream_address: String,
    /// 单次请求超时（毫秒），与整体等待超时相互独立
    pub request_timeout_ms: u64,
    /// 轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 清空数据流时单次接收等待（毫秒）
    pub flush_attempt_ms: u64,
    /// 服务端 systemd 服务名，用于日志和 uptime 查询；为空时按控制端口推断
    pub service_name: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            control_api_address: DEFAULT_CONTROL_API.to_string(),
            writer_api_address: DEFAULT_WRITER_API.to_string(),
            stream_address: DEFAULT_STREAM_ADDRESS.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            flush_attempt_ms: DEFAULT_FLUSH_ATTEMPT_MS,
            service_name: None,
        }
    }
}

impl ClientSettings {
    /// 默认配置文件路径
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/frame-writer-client/config.json"))
    }

    /// 从默认配置文件和环境变量加载
    pub fn auto_load() -> Self {
        let base = Self::default_path()
            .filter(|p| p.exists())
            .and_then(|p| match Self::from_file(&p) {
                Ok(settings) => {
                    debug!(path = %p.display(), "Loaded client settings");
                    Some(settings)
                }
                Err(e) => {
                    warn!(path = %p.display(), error = %e, "Ignoring unreadable client settings");
                    None
                }
            })
            .unwrap_or_default();
        base.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// 从 JSON 文件加载，缺失字段取默认值
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// 用环境变量覆盖（`lookup` 便于测试注入）
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("FWC_CONTROL_API") {
            self.control_api_address = v;
        }
        if let Some(v) = non_empty("FWC_WRITER_API") {
            self.writer_api_address = v;
        }
        if let Some(v) = non_empty("FWC_STREAM_ADDRESS") {
            self.stream_address = v;
        }
        if let Some(v) = non_empty("FWC_REQUEST_TIMEOUT_MS") {
            match v.trim().parse() {
                Ok(ms) => self.request_timeout_ms = ms,
                Err(_) => warn!(value = %v, "FWC_REQUEST_TIMEOUT_MS is not a number, ignored"),
            }
        }
        if let Some(v) = non_empty("FWC_POLL_INTERVAL_MS") {
            match v.trim().parse() {
                Ok(ms) => self.poll_interval_ms = ms,
                Err(_) => warn!(value = %v, "FWC_POLL_INTERVAL_MS is not a number, ignored"),
            }
        }
        self
    }

    /// 使用某个相机的地址
    pub fn with_camera(mut self, camera: &CameraProfile) -> Self {
        self.control_api_address = camera.control_api_address.clone();
        self.writer_api_address = camera.writer_api_address.clone();
        self.stream_address = camera.stream_address.clone();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn flush_attempt(&self) -> Duration {
        Duration::from_millis(self.flush_attempt_ms.max(1))
    }

    /// 服务端服务名：显式配置优先，否则 9901 端口对应 pco1，其余 pco2
    pub fn resolved_service_name(&self) -> String {
        if let Some(name) = self.service_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        match port_of(&self.control_api_address) {
            Some(9901) => "pco_writer-pco1".to_string(),
            _ => "pco_writer-pco2".to_string(),
        }
    }
}

/// 单个相机的连接信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraProfile {
    pub name: String,
    #[serde(rename = "connection_address")]
    pub stream_address: String,
    #[serde(rename = "flask_api_address")]
    pub control_api_address: String,
    pub writer_api_address: String,
}

/// 相机配置文件 `{"cameras": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraProfiles {
    pub cameras: Vec<CameraProfile>,
}

impl CameraProfiles {
    /// 读取并校验相机配置文件
    pub fn load(path: &Path) -> WriterResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| WriterError::Configuration {
            violations: vec![ConfigViolation::new(
                "camera_file",
                format!("cannot read {}: {}", path.display(), e),
            )],
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> WriterResult<Self> {
        let profiles: Self = serde_json::from_str(content).map_err(|e| WriterError::Configuration {
            violations: vec![ConfigViolation::new("camera_file", format!("not a valid camera file: {}", e))],
        })?;

        let mut violations = Vec::new();
        for camera in &profiles.cameras {
            let checks = [
                ("connection_address", &camera.stream_address, Protocol::Tcp),
                ("flask_api_address", &camera.control_api_address, Protocol::Http),
                ("writer_api_address", &camera.writer_api_address, Protocol::Http),
            ];
            for (field, address, protocol) in checks {
                if let Err(message) = parse_address(address, protocol) {
                    violations.push(ConfigViolation::new(field, format!("camera '{}': {}", camera.name, message)));
                }
            }
        }
        if !violations.is_empty() {
            return Err(WriterError::Configuration { violations });
        }
        Ok(profiles)
    }

    /// 按名称查找相机
    pub fn find(&self, name: &str) -> WriterResult<&CameraProfile> {
        self.cameras
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| WriterError::Configuration {
                violations: vec![ConfigViolation::new(
                    "camera",
                    format!("camera '{}' not found in camera file", name),
                )],
            })
    }
}
