//! 采集参数（一次 run 的配置）

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::address::{parse_address, Protocol};
use super::ClientSettings;
use crate::error::ConfigViolation;

/// 默认写入数据的用户 ID
pub const DEFAULT_USER_ID: u32 = 503;

/// 默认单个文件最多帧数
pub const DEFAULT_MAX_FRAMES_PER_FILE: u64 = 20000;

/// 写入器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// 输出文件路径（或带 `%0Nd` 编号占位符的模板），以 `.h5` 结尾
    pub output_file: String,
    /// 文件中数据集名称
    pub dataset_name: String,
    /// 期望帧数，0 表示不限
    pub n_frames: u64,
    /// 数据流地址（tcp://）
    pub stream_address: String,
    /// 写入服务的控制 API 地址（http://）
    pub control_api_address: String,
    /// 运行中写入进程自身的 API 地址（http://），提供统计信息与 stop/kill
    pub writer_api_address: String,
    /// 写文件使用的用户 ID
    pub user_id: u32,
    /// 单个文件最多帧数，0 表示不拆分
    pub max_frames_per_file: u64,
    /// 调试模式：记录完整请求/响应
    #[serde(default)]
    pub debug: bool,
}

impl WriterConfig {
    /// 以客户端默认地址为基础创建空配置
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            output_file: String::new(),
            dataset_name: String::new(),
            n_frames: 0,
            stream_address: settings.stream_address.clone(),
            control_api_address: settings.control_api_address.clone(),
            writer_api_address: settings.writer_api_address.clone(),
            user_id: DEFAULT_USER_ID,
            max_frames_per_file: DEFAULT_MAX_FRAMES_PER_FILE,
            debug: false,
        }
    }

    /// 检查全部字段，返回所有违规项（不会在第一个错误处停下）
    pub fn violations(&self) -> Vec<ConfigViolation> {
        let mut violations = Vec::new();

        if let Err(message) = check_output_file(&self.output_file) {
            violations.push(ConfigViolation::new("output_file", message));
        } else if self.needs_file_number() && !has_file_number(&self.output_file) {
            violations.push(ConfigViolation::new(
                "output_file",
                format!(
                    "{} frames exceed {} frames per file but the name has no %d file-number placeholder",
                    self.n_frames, self.max_frames_per_file
                ),
            ));
        }

        if self.dataset_name.trim().is_empty() {
            violations.push(ConfigViolation::new("dataset_name", "must not be empty"));
        }

        let addresses = [
            ("stream_address", &self.stream_address, Protocol::Tcp),
            ("control_api_address", &self.control_api_address, Protocol::Http),
            ("writer_api_address", &self.writer_api_address, Protocol::Http),
        ];
        for (field, address, protocol) in addresses {
            if let Err(message) = parse_address(address, protocol) {
                violations.push(ConfigViolation::new(field, message));
            }
        }

        violations
    }

    pub fn is_valid(&self) -> bool {
        self.violations().is_empty()
    }

    /// 需要分文件写入时是否要求编号占位符
    fn needs_file_number(&self) -> bool {
        self.max_frames_per_file > 0 && self.n_frames >= self.max_frames_per_file
    }

    /// 规范化：展开 `~/`，必要时插入 `_%03d` 文件编号占位符
    pub fn normalized(mut self) -> Self {
        self.output_file = expand_home(&self.output_file);
        self.dataset_name = self.dataset_name.trim().to_string();
        if self.needs_file_number()
            && !has_file_number(&self.output_file)
            && self.output_file.ends_with(".h5")
        {
            let stem_len = self.output_file.len() - ".h5".len();
            self.output_file.insert_str(stem_len, "_%03d");
        }
        self
    }

    /// 合并部分更新
    pub fn apply(mut self, patch: ConfigPatch) -> Self {
        if let Some(v) = patch.output_file {
            self.output_file = v;
        }
        if let Some(v) = patch.dataset_name {
            self.dataset_name = v;
        }
        if let Some(v) = patch.n_frames {
            self.n_frames = v;
        }
        if let Some(v) = patch.stream_address {
            self.stream_address = v;
        }
        if let Some(v) = patch.control_api_address {
            self.control_api_address = v;
        }
        if let Some(v) = patch.writer_api_address {
            self.writer_api_address = v;
        }
        if let Some(v) = patch.user_id {
            self.user_id = v;
        }
        if let Some(v) = patch.max_frames_per_file {
            self.max_frames_per_file = v;
        }
        if let Some(v) = patch.debug {
            self.debug = v;
        }
        self
    }
}

/// 配置的部分更新，未设置的字段保持原值
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub output_file: Option<String>,
    pub dataset_name: Option<String>,
    pub n_frames: Option<u64>,
    pub stream_address: Option<String>,
    pub control_api_address: Option<String>,
    pub writer_api_address: Option<String>,
    pub user_id: Option<u32>,
    pub max_frames_per_file: Option<u64>,
    pub debug: Option<bool>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn output_file_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[%./a-zA-Z0-9_\-]+\.h5$").expect("output file pattern is a valid regex"))
}

fn file_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%(0?\d+)?d").expect("file number pattern is a valid regex"))
}

fn check_output_file(output_file: &str) -> Result<(), String> {
    if output_file.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    let expanded = expand_home(output_file);
    if !output_file_regex().is_match(&expanded) {
        return Err(format!(
            "'{}' must end in .h5 and contain only [%./a-zA-Z0-9_-]",
            output_file
        ));
    }
    Ok(())
}

fn has_file_number(output_file: &str) -> bool {
    file_number_regex().is_match(output_file)
}

fn expand_home(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|h| h.join(rest).to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string()),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> WriterConfig {
        WriterConfig {
            output_file: "/tmp/scan_001.h5".to_string(),
            dataset_name: "data".to_string(),
            n_frames: 100,
            stream_address: "tcp://10.10.1.26:8080".to_string(),
            control_api_address: "http://xbl-daq-34:9901".to_string(),
            writer_api_address: "http://xbl-daq-34:9555".to_string(),
            user_id: 503,
            max_frames_per_file: 20000,
            debug: false,
        }
    }

    #[test]
    fn test_valid_config_has_no_violations() {
        assert!(valid().violations().is_empty());
    }

    #[test]
    fn test_collects_every_violation() {
        let config = WriterConfig {
            output_file: String::new(),
            dataset_name: "  ".to_string(),
            stream_address: "udp://host:8080".to_string(),
            ..valid()
        };
        let fields: Vec<_> = config.violations().iter().map(|v| v.field).collect();
        assert_eq!(fields, vec!["output_file", "dataset_name", "stream_address"]);
    }

    #[test]
    fn test_output_file_must_be_h5() {
        let config = WriterConfig {
            output_file: "/tmp/scan.tiff".to_string(),
            ..valid()
        };
        assert_eq!(config.violations()[0].field, "output_file");
    }

    #[test]
    fn test_placeholder_inserted_when_sharding() {
        let config = WriterConfig {
            n_frames: 50000,
            ..valid()
        }
        .normalized();
        assert_eq!(config.output_file, "/tmp/scan_001_%03d.h5");
        assert!(config.is_valid());
    }

    #[test]
    fn test_existing_placeholder_kept() {
        let config = WriterConfig {
            output_file: "/tmp/scan_%05d.h5".to_string(),
            n_frames: 50000,
            ..valid()
        }
        .normalized();
        assert_eq!(config.output_file, "/tmp/scan_%05d.h5");
    }

    #[test]
    fn test_no_placeholder_without_sharding() {
        let config = WriterConfig {
            n_frames: 50000,
            max_frames_per_file: 0,
            ..valid()
        }
        .normalized();
        assert_eq!(config.output_file, "/tmp/scan_001.h5");
    }

    #[test]
    fn test_sharded_config_without_placeholder_is_reported() {
        let config = WriterConfig {
            n_frames: 50000,
            ..valid()
        };
        let violations = config.violations();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("placeholder"));
    }

    #[test]
    fn test_apply_patch_only_touches_given_fields() {
        let patch = ConfigPatch {
            n_frames: Some(7),
            dataset_name: Some("flat".to_string()),
            ..Default::default()
        };
        let config = valid().apply(patch);
        assert_eq!(config.n_frames, 7);
        assert_eq!(config.dataset_name, "flat");
        assert_eq!(config.output_file, "/tmp/scan_001.h5");
    }

    #[test]
    fn test_home_expansion() {
        let config = WriterConfig {
            output_file: "~/scan.h5".to_string(),
            ..valid()
        }
        .normalized();
        assert!(!config.output_file.starts_with('~'));
        assert!(config.output_file.ends_with("scan.h5"));
    }
}
