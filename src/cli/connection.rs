//! 全局连接参数
//!
//! 优先级：命令行 > 相机配置 > 环境变量 > 配置文件 > 默认值

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::config::{CameraProfiles, ClientSettings};
use crate::controller::LifecycleController;

/// 连接参数，对所有子命令有效
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// 客户端配置文件（默认 ~/.config/frame-writer-client/config.json）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 控制 API 地址，例如 http://xbl-daq-34:9901
    #[arg(long, global = true)]
    pub control_api: Option<String>,

    /// 写入进程 API 地址，例如 http://xbl-daq-34:9555
    #[arg(long, global = true)]
    pub writer_api: Option<String>,

    /// 数据流地址，例如 tcp://10.10.1.26:8080
    #[arg(long, global = true)]
    pub stream_address: Option<String>,

    /// 使用相机配置文件中的某个相机
    #[arg(long, global = true, requires = "camera_file")]
    pub camera: Option<String>,

    /// 相机配置文件
    #[arg(long, global = true)]
    pub camera_file: Option<PathBuf>,
}

impl ConnectionArgs {
    /// 合并出最终的客户端设置
    pub fn settings(&self) -> Result<ClientSettings> {
        let mut settings = match &self.config {
            Some(path) => ClientSettings::from_file(path)
                .with_context(|| format!("Cannot read client settings {}", path.display()))?
                .with_env_overrides(|key| std::env::var(key).ok()),
            None => ClientSettings::auto_load(),
        };

        if let (Some(name), Some(path)) = (&self.camera, &self.camera_file) {
            let profiles = CameraProfiles::load(path)?;
            settings = settings.with_camera(profiles.find(name)?);
        }

        if let Some(v) = &self.control_api {
            settings.control_api_address = v.clone();
        }
        if let Some(v) = &self.writer_api {
            settings.writer_api_address = v.clone();
        }
        if let Some(v) = &self.stream_address {
            settings.stream_address = v.clone();
        }
        Ok(settings)
    }

    /// 按设置创建控制器
    pub fn controller(&self) -> Result<LifecycleController> {
        LifecycleController::connect(self.settings()?)
    }
}
