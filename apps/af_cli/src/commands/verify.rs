// aeroflex\apps\af_cli\src/commands/verify.rs

//! 导数核查命令
//!
//! 在线程宇宙里搭起"前若干 rank 为结构侧、其余为气动侧"的布局，
//! 用随机节点云与随机基准场跑全通道导数核查。

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use num_complex::Complex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use tracing::info;

use af_comm::mailbox::spawn_universe;
use af_comm::topology::split_front_back;
use af_comm::Collective;
use af_foundation::{TransferResult, TransferScalar};
use af_transfer::{
    MeldConfig, RbfConfig, RbfKernel, SchemeConfig, SymmetryAxis, TransferScheme,
};
use af_verify::{DerivativeTester, DerivativeTestReport};

/// 传递方案选择
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SchemeKind {
    /// 最近邻移动最小二乘
    Meld,
    /// 径向基插值
    Rbf,
}

/// 对称面选择
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SymmetryArg {
    /// 无对称面
    None,
    /// x = 0 平面
    X,
    /// y = 0 平面
    Y,
    /// z = 0 平面
    Z,
}

impl From<SymmetryArg> for SymmetryAxis {
    fn from(value: SymmetryArg) -> Self {
        match value {
            SymmetryArg::None => SymmetryAxis::None,
            SymmetryArg::X => SymmetryAxis::X,
            SymmetryArg::Y => SymmetryAxis::Y,
            SymmetryArg::Z => SymmetryAxis::Z,
        }
    }
}

/// 径向基核函数选择
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KernelKind {
    /// sqrt(r² + c²)
    Multiquadric,
    /// 1 / sqrt(r² + c²)
    InverseMultiquadric,
    /// r² ln r
    ThinPlateSpline,
    /// exp(-r² / c²)
    Gaussian,
}

/// 导数核查参数
#[derive(Args)]
pub struct VerifyArgs {
    /// 总 rank 数
    #[arg(long, default_value_t = 5)]
    pub ranks: usize,

    /// 结构侧 rank 数（占据前若干个全局 rank）
    #[arg(long, default_value_t = 2)]
    pub structural_ranks: usize,

    /// 传递方案
    #[arg(long, value_enum, default_value_t = SchemeKind::Meld)]
    pub scheme: SchemeKind,

    /// 对称面
    #[arg(long, value_enum, default_value_t = SymmetryArg::None)]
    pub symmetry: SymmetryArg,

    /// 最近邻数（meld）
    #[arg(long, default_value_t = 10)]
    pub nearest_neighbors: usize,

    /// 衰减因子（meld）
    #[arg(long, default_value_t = 0.5)]
    pub decay_factor: f64,

    /// 核函数（rbf）
    #[arg(long, value_enum, default_value_t = KernelKind::Multiquadric)]
    pub kernel: KernelKind,

    /// 核形状参数（rbf）
    #[arg(long, default_value_t = 0.5)]
    pub shape_parameter: f64,

    /// 结构中心抽样比例（rbf）
    #[arg(long, default_value_t = 1.0)]
    pub sampling_ratio: f64,

    /// 每个结构 rank 的节点数
    #[arg(long, default_value_t = 40)]
    pub structural_nodes: usize,

    /// 每个气动 rank 的节点数
    #[arg(long, default_value_t = 60)]
    pub aerodynamic_nodes: usize,

    /// 使用复步长参考（默认中心差分）
    #[arg(long)]
    pub complex_step: bool,

    /// 扰动步长（缺省：实数 1e-6，复数 1e-30）
    #[arg(long)]
    pub step: Option<f64>,

    /// 相对容差（缺省：实数 1e-5，复数 1e-9）
    #[arg(long)]
    pub rtol: Option<f64>,

    /// 绝对容差
    #[arg(long, default_value_t = 1e-30)]
    pub atol: f64,

    /// 随机种子
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// 报告输出路径
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl VerifyArgs {
    fn scheme_config(&self) -> SchemeConfig {
        match self.scheme {
            SchemeKind::Meld => SchemeConfig::Meld(
                MeldConfig::new()
                    .with_symmetry(self.symmetry.into())
                    .with_nearest_neighbors(self.nearest_neighbors)
                    .with_decay_factor(self.decay_factor),
            ),
            SchemeKind::Rbf => {
                let c = self.shape_parameter;
                let kernel = match self.kernel {
                    KernelKind::Multiquadric => RbfKernel::Multiquadric { c },
                    KernelKind::InverseMultiquadric => RbfKernel::InverseMultiquadric { c },
                    KernelKind::ThinPlateSpline => RbfKernel::ThinPlateSpline,
                    KernelKind::Gaussian => RbfKernel::Gaussian { c },
                };
                SchemeConfig::Rbf(
                    RbfConfig::new()
                        .with_symmetry(self.symmetry.into())
                        .with_kernel(kernel)
                        .with_sampling_ratio(self.sampling_ratio),
                )
            }
        }
    }
}

/// 执行导数核查命令
pub fn execute(args: VerifyArgs) -> Result<()> {
    if args.structural_ranks == 0 || args.structural_ranks >= args.ranks {
        bail!(
            "结构侧 rank 数 {} 必须落在 (0, {}) 内",
            args.structural_ranks,
            args.ranks
        );
    }
    info!(
        "导数核查: {} rank ({} 结构 + {} 气动), 方案 {:?}, {}",
        args.ranks,
        args.structural_ranks,
        args.ranks - args.structural_ranks,
        args.scheme,
        if args.complex_step { "复步长" } else { "中心差分" }
    );

    let report = if args.complex_step {
        run::<Complex<f64>>(&args)?
    } else {
        run::<f64>(&args)?
    };

    println!("{}", report);
    if let Some(path) = &args.report {
        report
            .write_report(path)
            .with_context(|| format!("报告写入失败: {}", path.display()))?;
        info!("报告已写入 {}", path.display());
    }

    if !report.passed() {
        bail!("{} 个导数通道未通过核查", report.fail_count());
    }
    Ok(())
}

fn run<S: TransferScalar>(args: &VerifyArgs) -> Result<DerivativeTestReport> {
    let config = args.scheme_config();
    let step = args.step.unwrap_or(if S::IS_COMPLEX { 1e-30 } else { 1e-6 });
    let rtol = args.rtol.unwrap_or(if S::IS_COMPLEX { 1e-9 } else { 1e-5 });

    let results = spawn_universe(args.ranks, |comm| -> TransferResult<DerivativeTestReport> {
        let rank = comm.rank();
        let topo = split_front_back(comm, args.structural_ranks)?;
        let structural = rank < args.structural_ranks;
        let n = if structural {
            args.structural_nodes
        } else {
            args.aerodynamic_nodes
        };
        let mut rng = StdRng::seed_from_u64(args.seed.wrapping_add(rank as u64));
        let cloud: Vec<S> = (0..3 * n)
            .map(|_| S::from_re(rng.gen::<f64>() * 2.0 - 1.0))
            .collect();

        let mut scheme = TransferScheme::new(topo, config.clone())?;
        if structural {
            scheme.set_structural_nodes(cloud)?;
        } else {
            scheme.set_aerodynamic_nodes(cloud)?;
        }
        scheme.initialize()?;

        let us: Vec<S> = if structural {
            (0..3 * n).map(|_| S::from_re(rng.gen::<f64>() - 0.5)).collect()
        } else {
            vec![]
        };
        let fa: Vec<S> = if structural {
            vec![]
        } else {
            (0..3 * n).map(|_| S::from_re(rng.gen::<f64>() - 0.5)).collect()
        };

        let tester = DerivativeTester::new(&scheme)?;
        tester.test_all_derivatives(&us, &fa, step, rtol, args.atol)
    });

    // 报告经全归约，各 rank 副本一致，取第一份即可
    let mut reports = results
        .into_iter()
        .collect::<TransferResult<Vec<_>>>()
        .context("导数核查执行失败")?;
    Ok(reports.swap_remove(0))
}
