//! 查询命令：ping / status / stats / log / uptime / error

use anyhow::Result;
use serde::Serialize;

use super::connection::ConnectionArgs;
use super::output::{format_output, format_run_status};
use crate::controller::RunStatus;
use crate::probe::ConnectionState;
use crate::remote::RemotePhase;

/// status 命令输出
#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StatusOutput {
    /// 远端有活跃写入进程
    Active { run: RunStatus, progress: String },
    /// 没有活跃写入进程，给出上一次 run 的状态
    Idle { last_run: RemotePhase },
}

/// 处理 ping 命令
pub fn handle_ping(connection: &ConnectionArgs, json: bool, verbose: bool) -> Result<()> {
    let controller = connection.controller()?;
    let state: ConnectionState = controller.connection_state(verbose);

    if json {
        println!("{}", format_output(&state));
    } else {
        println!("控制 API: {}", if state.control_api { "可达" } else { "不可达" });
        println!("数据流:   {}", if state.stream { "可连接" } else { "不可连接" });
    }
    Ok(())
}

/// 处理 status 命令
pub fn handle_status(connection: &ConnectionArgs, json: bool, verbose: bool) -> Result<()> {
    let mut controller = connection.controller()?;

    let output = if controller.attach(verbose)? {
        StatusOutput::Active {
            run: controller.get_status(verbose)?,
            progress: controller.get_progress_message(),
        }
    } else {
        StatusOutput::Idle {
            last_run: controller.get_status_last_run(verbose)?,
        }
    };

    if json {
        println!("{}", format_output(&output));
    } else {
        match &output {
            StatusOutput::Active { run, progress } => {
                println!("{}", format_run_status(run));
                println!("{}", progress);
            }
            StatusOutput::Idle { last_run } => {
                println!("没有正在运行的写入进程，上一次 run: {}", last_run);
            }
        }
    }
    Ok(())
}

/// 处理 stats 命令
pub fn handle_stats(connection: &ConnectionArgs, last_run: bool, json: bool, verbose: bool) -> Result<()> {
    let mut controller = connection.controller()?;

    let stats = if last_run {
        Some(controller.get_statistics_last_run(verbose)?)
    } else {
        controller.attach(verbose)?;
        controller.get_statistics(verbose)?
    };

    match stats {
        Some(stats) if json => println!("{}", format_output(&stats)),
        Some(stats) => {
            let value = serde_json::to_value(&stats)?;
            if let Some(map) = value.as_object() {
                for (key, v) in map.iter().filter(|(_, v)| !v.is_null()) {
                    println!("{:<20} {}", key, v);
                }
            }
        }
        None => println!("统计信息不可用"),
    }
    Ok(())
}

/// 处理 log 命令
pub fn handle_log(connection: &ConnectionArgs, verbose: bool) -> Result<()> {
    let controller = connection.controller()?;
    println!("{}", controller.get_server_log(verbose)?);
    Ok(())
}

/// 处理 uptime 命令
pub fn handle_uptime(connection: &ConnectionArgs, verbose: bool) -> Result<()> {
    let controller = connection.controller()?;
    println!("{}", controller.get_server_uptime(verbose)?);
    Ok(())
}

/// 处理 error 命令
pub fn handle_error(connection: &ConnectionArgs, verbose: bool) -> Result<()> {
    let controller = connection.controller()?;
    match controller.get_server_error(verbose)? {
        Some(message) => println!("{}", message),
        None => println!("没有错误记录"),
    }
    Ok(())
}
