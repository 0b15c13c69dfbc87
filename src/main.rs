//! Frame Writer Client CLI
//!
//! 控制远端帧写入服务：配置、启动、停止、查询状态

use anyhow::Result;
use clap::{Parser, Subcommand};
use frame_writer_client::cli::{
    handle_error, handle_flush, handle_kill, handle_log, handle_ping, handle_run, handle_stats,
    handle_status, handle_stop, handle_uptime, ConnectionArgs, FlushArgs, RunArgs, StopArgs,
};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "fwc")]
#[command(about = "Frame Writer Client - 远端帧写入服务的控制面客户端")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// 输出详细日志
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 检查控制 API 和数据流是否可达
    Ping {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 查看写入进程状态
    Status {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 查看写入统计
    Stats {
        /// 查看上一次 run 的统计
        #[arg(long)]
        last_run: bool,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 查看服务端日志
    Log,
    /// 查看服务端运行时长
    Uptime,
    /// 查看服务端最近一次错误
    Error,
    /// 清空数据流中的残留消息
    Flush(FlushArgs),
    /// 配置并启动一次采集
    Run(RunArgs),
    /// 优雅停止正在运行的写入进程
    Stop(StopArgs),
    /// 立即终止正在运行的写入进程
    Kill {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 通过 RUST_LOG 控制日志级别，--verbose 时默认 debug
    // 例如: RUST_LOG=debug fwc status
    let default_filter = if cli.verbose {
        "frame_writer_client=debug,fwc=debug"
    } else {
        "frame_writer_client=info,fwc=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    debug!(connection = ?cli.connection, "Parsed connection arguments");

    let connection = &cli.connection;
    let verbose = cli.verbose;

    match cli.command {
        Commands::Ping { json } => handle_ping(connection, json, verbose)?,
        Commands::Status { json } => handle_status(connection, json, verbose)?,
        Commands::Stats { last_run, json } => handle_stats(connection, last_run, json, verbose)?,
        Commands::Log => handle_log(connection, verbose)?,
        Commands::Uptime => handle_uptime(connection, verbose)?,
        Commands::Error => handle_error(connection, verbose)?,
        Commands::Flush(args) => handle_flush(connection, args, verbose)?,
        Commands::Run(args) => handle_run(connection, args, verbose)?,
        Commands::Stop(args) => handle_stop(connection, args, verbose)?,
        Commands::Kill { json } => handle_kill(connection, json, verbose)?,
    }

    Ok(())
}
