//! Run 命令 - 配置并启动一次采集

use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Args;
use serde::Serialize;

use super::connection::ConnectionArgs;
use super::output::{format_outcome, format_output};
use crate::config::{WriterConfig, DEFAULT_MAX_FRAMES_PER_FILE, DEFAULT_USER_ID};
use crate::controller::Outcome;
use crate::flusher::FlushReport;

/// Run 命令参数
#[derive(Args, Debug)]
pub struct RunArgs {
    /// 输出文件（.h5），可包含 %03d 文件编号占位符
    #[arg(long, short = 'o')]
    pub output_file: String,

    /// 数据集名称
    #[arg(long, short = 'd', default_value = "data")]
    pub dataset_name: String,

    /// 期望帧数，0 表示不限
    #[arg(long, short = 'n', default_value_t = 0)]
    pub n_frames: u64,

    /// 写文件使用的用户 ID
    #[arg(long, default_value_t = DEFAULT_USER_ID)]
    pub user_id: u32,

    /// 单个文件最多帧数
    #[arg(long, default_value_t = DEFAULT_MAX_FRAMES_PER_FILE)]
    pub max_frames_per_file: u64,

    /// 启动前清空数据流中的残留消息
    #[arg(long)]
    pub flush: bool,

    /// 清空数据流的超时（秒）
    #[arg(long, default_value_t = 2.0)]
    pub flush_timeout: f64,

    /// 等待 run 结束
    #[arg(long)]
    pub wait: bool,

    /// 等待超时（秒）
    #[arg(long, default_value_t = 60.0)]
    pub timeout: f64,

    /// 等待写入指定帧数后返回
    #[arg(long, conflicts_with = "wait")]
    pub wait_frames: Option<u64>,

    /// 帧数停止增长多久（秒）后判定为停滞，0 或负数表示不限
    #[arg(long, default_value_t = -1.0, allow_hyphen_values = true)]
    pub inactivity_timeout: f64,

    /// 调试模式：记录完整启动请求
    #[arg(long)]
    pub debug: bool,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// Run 命令输出
#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub output_file: String,
    pub flush: Option<FlushReport>,
    pub outcome: Outcome,
}

/// 秒数转为 `Duration`，负数、NaN 返回 `None`
pub fn duration_from_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

/// 停滞超时：0、负数、NaN 都表示不检测停滞
pub fn inactivity_from_secs(secs: f64) -> Option<Duration> {
    duration_from_secs(secs).filter(|d| !d.is_zero())
}

/// 处理 run 命令
pub fn handle_run(connection: &ConnectionArgs, args: RunArgs, verbose: bool) -> Result<()> {
    let timeout = duration_from_secs(args.timeout)
        .ok_or_else(|| anyhow!("--timeout 必须是非负秒数: {}", args.timeout))?;
    let inactivity = inactivity_from_secs(args.inactivity_timeout);

    let mut controller = connection.controller()?;

    let config = WriterConfig {
        output_file: args.output_file,
        dataset_name: args.dataset_name,
        n_frames: args.n_frames,
        user_id: args.user_id,
        max_frames_per_file: args.max_frames_per_file,
        debug: args.debug,
        ..WriterConfig::from_settings(controller.settings())
    };
    let output_file = controller.configure(config, verbose)?.output_file.clone();

    let flush = if args.flush {
        let flush_timeout = duration_from_secs(args.flush_timeout)
            .ok_or_else(|| anyhow!("--flush-timeout 必须是非负秒数: {}", args.flush_timeout))?;
        Some(controller.flush_stream(flush_timeout, verbose)?)
    } else {
        None
    };

    let mut outcome = controller.start(args.wait, timeout, verbose)?;
    if let Some(n) = args.wait_frames {
        outcome = controller.wait_n_frames(n, inactivity, verbose)?;
    }

    if args.json {
        let output = RunOutput {
            output_file,
            flush,
            outcome,
        };
        println!("{}", format_output(&output));
    } else {
        println!("输出文件: {}", output_file);
        if let Some(report) = flush {
            println!("已清空数据流: {} 条消息{}", report.drained, if report.timed_out { "（超时）" } else { "" });
        }
        println!("{}", format_outcome(&outcome, false));
        println!("{}", controller.get_progress_message());
    }
    Ok(())
}
