// aeroflex\apps\af_cli\src/commands/info.rs

//! 信息显示命令
//!
//! 显示系统信息与方案默认配置。

use anyhow::Result;
use clap::Args;
use tracing::info;

use af_transfer::{MeldConfig, RbfConfig, SchemeConfig};

/// 信息显示参数
#[derive(Args)]
pub struct InfoArgs {
    /// 显示系统信息
    #[arg(long)]
    pub system: bool,

    /// 显示方案默认配置
    #[arg(long)]
    pub defaults: bool,
}

/// 执行信息命令
pub fn execute(args: InfoArgs) -> Result<()> {
    info!("=== AeroFlex 信息 ===");

    if args.system {
        print_system_info();
    }

    if args.defaults {
        print_default_configs()?;
    }

    if !args.system && !args.defaults {
        // 默认显示所有信息
        print_system_info();
        println!();
        print_default_configs()?;
    }

    Ok(())
}

fn print_system_info() {
    println!("=== 系统信息 ===");
    println!("AeroFlex CLI 版本: {}", env!("CARGO_PKG_VERSION"));
    println!("目标平台: {}", std::env::consts::ARCH);
    println!("操作系统: {}", std::env::consts::OS);

    println!("\n可用标量表示:");
    println!("  - f64 (生产): ✓");
    println!("  - Complex<f64> (复步长验证): ✓");
}

fn print_default_configs() -> Result<()> {
    println!("=== 方案默认配置 ===");

    let meld = SchemeConfig::Meld(MeldConfig::new());
    println!("meld: {}", serde_json::to_string_pretty(&meld)?);

    let rbf = SchemeConfig::Rbf(RbfConfig::new());
    println!("rbf: {}", serde_json::to_string_pretty(&rbf)?);

    Ok(())
}
