// aeroflex\apps\af_cli\src/main.rs

//! AeroFlex 命令行界面
//!
//! 提供气动/结构网格间传递方案的命令行工具。
//!
//! # 架构层级
//!
//! 本模块属于应用层，遵循以下原则：
//! - 零泛型语法：标量表示经 `--complex-step` 开关在入口处选定
//! - 进程组经线程宇宙模拟，单条命令即可演练多 rank 布局

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// AeroFlex 网格间传递方案命令行工具
#[derive(Parser)]
#[command(name = "af_cli")]
#[command(author = "AeroFlex Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Aeroelastic mesh-to-mesh transfer toolkit", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行导数核查
    Verify(commands::verify::VerifyArgs),
    /// 显示信息
    Info(commands::info::InfoArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // 执行命令
    match cli.command {
        Commands::Verify(args) => commands::verify::execute(args),
        Commands::Info(args) => commands::info::execute(args),
    }
}
