//! Stop / Kill / Flush 命令
//!
//! stop 和 kill 由新进程发出，先接管远端正在运行的写入进程。

use anyhow::{anyhow, Result};
use clap::Args;

use super::connection::ConnectionArgs;
use super::output::{format_outcome, format_output};
use super::run::duration_from_secs;

/// Stop 命令参数
#[derive(Args, Debug)]
pub struct StopArgs {
    /// 等待写入进程结束
    #[arg(long)]
    pub wait: bool,

    /// 等待超时（秒）
    #[arg(long, default_value_t = 30.0)]
    pub timeout: f64,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// Flush 命令参数
#[derive(Args, Debug)]
pub struct FlushArgs {
    /// 超时（秒）
    #[arg(long, default_value_t = 2.0)]
    pub timeout: f64,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// 处理 stop 命令
pub fn handle_stop(connection: &ConnectionArgs, args: StopArgs, verbose: bool) -> Result<()> {
    let timeout = duration_from_secs(args.timeout)
        .ok_or_else(|| anyhow!("--timeout 必须是非负秒数: {}", args.timeout))?;
    let mut controller = connection.controller()?;

    if !controller.attach(verbose)? {
        println!("没有正在运行的写入进程");
        return Ok(());
    }
    let outcome = controller.stop(args.wait, timeout, verbose)?;
    println!("{}", format_outcome(&outcome, args.json));
    Ok(())
}

/// 处理 kill 命令
pub fn handle_kill(connection: &ConnectionArgs, json: bool, verbose: bool) -> Result<()> {
    let mut controller = connection.controller()?;

    if !controller.attach(verbose)? {
        println!("没有正在运行的写入进程");
        return Ok(());
    }
    let outcome = controller.kill(verbose)?;
    println!("{}", format_outcome(&outcome, json));
    Ok(())
}

/// 处理 flush 命令
pub fn handle_flush(connection: &ConnectionArgs, args: FlushArgs, verbose: bool) -> Result<()> {
    let timeout = duration_from_secs(args.timeout)
        .ok_or_else(|| anyhow!("--timeout 必须是非负秒数: {}", args.timeout))?;
    let controller = connection.controller()?;
    let report = controller.flush_stream(timeout, verbose)?;

    if args.json {
        println!("{}", format_output(&report));
    } else if report.timed_out {
        println!("已丢弃 {} 条消息，超时时数据流仍未清空", report.drained);
    } else {
        println!("已丢弃 {} 条消息", report.drained);
    }
    Ok(())
}
