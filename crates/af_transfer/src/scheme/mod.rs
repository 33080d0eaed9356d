// aeroflex\crates\af_transfer\src/scheme/mod.rs

//! 插值/加权算子构建
//!
//! 两种方案把结构节点运动映射到气动节点、并经转置关系把气动载荷
//! 映射回结构节点：
//!
//! - [`meld`]: 最近邻移动最小二乘（指数衰减权 + 仿射一致性约束）
//! - [`rbf`]: 径向基全局插值（线性多项式增广）
//!
//! 两者都精确再现仿射位移场。刚体平动/转动的位移场对未变形坐标是
//! 仿射的，因此刚体一致性精确成立；权行和为 1 且再现坐标本身，
//! 转置映射因而精确守恒总力与总矩（虚功一致）。
//!
//! 算子构建是纯函数：给定相同坐标与配置，结果确定。

pub mod meld;
pub mod rbf;

use serde::{Deserialize, Serialize};

use af_foundation::{Side, TransferError, TransferResult, TransferScalar};

/// 对称面设置
///
/// 设定后，每个结构候选节点关于该坐标面镜像一份加入候选集；
/// 镜像节点的位移贡献在镜像分量上反号，载荷贡献反射回真实节点。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SymmetryAxis {
    /// 无对称面
    #[default]
    None,
    /// 关于 x = 0 平面对称
    X,
    /// 关于 y = 0 平面对称
    Y,
    /// 关于 z = 0 平面对称
    Z,
}

impl SymmetryAxis {
    /// 镜像分量下标（无对称面时为 None）
    #[inline]
    pub fn mirror_component(self) -> Option<usize> {
        match self {
            SymmetryAxis::None => None,
            SymmetryAxis::X => Some(0),
            SymmetryAxis::Y => Some(1),
            SymmetryAxis::Z => Some(2),
        }
    }
}

/// 径向基核函数类型
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RbfKernel {
    /// 多二次曲面 sqrt(r² + c²)
    Multiquadric {
        /// 形状参数
        c: f64,
    },
    /// 逆多二次曲面 1 / sqrt(r² + c²)
    InverseMultiquadric {
        /// 形状参数
        c: f64,
    },
    /// 薄板样条 r² ln r
    ThinPlateSpline,
    /// 高斯核 exp(-r² / c²)
    Gaussian {
        /// 形状参数
        c: f64,
    },
}

impl RbfKernel {
    /// 以距离平方为自变量求核值（解析，复步长安全）
    #[inline]
    pub fn phi<S: TransferScalar>(&self, d2: S) -> S {
        match *self {
            RbfKernel::Multiquadric { c } => (d2 + S::from_re(c * c)).sqrt(),
            RbfKernel::InverseMultiquadric { c } => {
                S::one() / (d2 + S::from_re(c * c)).sqrt()
            }
            RbfKernel::ThinPlateSpline => {
                // r² ln r = d2 · ln(d2) / 2，r → 0 时取极限 0
                if d2.re() <= f64::MIN_POSITIVE {
                    S::zero()
                } else {
                    d2 * d2.ln() * S::from_re(0.5)
                }
            }
            RbfKernel::Gaussian { c } => (-d2 / S::from_re(c * c)).exp(),
        }
    }

    /// 核值对距离平方的方向导数：dφ = φ'(d2) · dd2
    #[inline]
    pub fn dphi<S: TransferScalar>(&self, d2: S, dd2: S) -> S {
        match *self {
            RbfKernel::Multiquadric { c } => {
                dd2 / ((d2 + S::from_re(c * c)).sqrt() * S::from_re(2.0))
            }
            RbfKernel::InverseMultiquadric { c } => {
                let s = d2 + S::from_re(c * c);
                -dd2 / (s.sqrt() * s * S::from_re(2.0))
            }
            RbfKernel::ThinPlateSpline => {
                if d2.re() <= f64::MIN_POSITIVE {
                    S::zero()
                } else {
                    dd2 * (d2.ln() + S::one()) * S::from_re(0.5)
                }
            }
            RbfKernel::Gaussian { c } => {
                let inv_c2 = S::from_re(1.0 / (c * c));
                -dd2 * inv_c2 * (-d2 * inv_c2).exp()
            }
        }
    }
}

/// 最近邻移动最小二乘方案配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeldConfig {
    /// 对称面
    pub symmetry: SymmetryAxis,
    /// 每个气动节点的最近邻数
    pub nearest_neighbors: usize,
    /// 相对衰减因子 beta
    pub decay_factor: f64,
}

impl Default for MeldConfig {
    fn default() -> Self {
        Self {
            symmetry: SymmetryAxis::None,
            nearest_neighbors: 10,
            decay_factor: 0.5,
        }
    }
}

impl MeldConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置对称面
    pub fn with_symmetry(mut self, axis: SymmetryAxis) -> Self {
        self.symmetry = axis;
        self
    }

    /// 设置最近邻数
    pub fn with_nearest_neighbors(mut self, nn: usize) -> Self {
        self.nearest_neighbors = nn;
        self
    }

    /// 设置衰减因子
    pub fn with_decay_factor(mut self, beta: f64) -> Self {
        self.decay_factor = beta;
        self
    }

    /// 校验配置
    ///
    /// 仿射一致性约束要求每个模板至少 4 个候选节点。
    pub fn validate(&self, rank: usize) -> TransferResult<()> {
        if self.nearest_neighbors < 4 {
            return Err(TransferError::configuration(
                Side::Aerodynamic,
                rank,
                format!("最近邻数 {} 不足以约束仿射一致性（至少 4）", self.nearest_neighbors),
            ));
        }
        if self.decay_factor <= 0.0 || !self.decay_factor.is_finite() {
            return Err(TransferError::configuration(
                Side::Aerodynamic,
                rank,
                format!("衰减因子 {} 必须为正实数", self.decay_factor),
            ));
        }
        Ok(())
    }
}

/// 径向基方案配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbfConfig {
    /// 对称面
    pub symmetry: SymmetryAxis,
    /// 核函数
    pub kernel: RbfKernel,
    /// 结构节点抽样比例，(0, 1]，大网格上用于限制稠密求解成本
    pub sampling_ratio: f64,
}

impl Default for RbfConfig {
    fn default() -> Self {
        Self {
            symmetry: SymmetryAxis::None,
            kernel: RbfKernel::Multiquadric { c: 0.5 },
            sampling_ratio: 1.0,
        }
    }
}

impl RbfConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置对称面
    pub fn with_symmetry(mut self, axis: SymmetryAxis) -> Self {
        self.symmetry = axis;
        self
    }

    /// 设置核函数
    pub fn with_kernel(mut self, kernel: RbfKernel) -> Self {
        self.kernel = kernel;
        self
    }

    /// 设置抽样比例
    pub fn with_sampling_ratio(mut self, ratio: f64) -> Self {
        self.sampling_ratio = ratio;
        self
    }

    /// 校验配置
    pub fn validate(&self, rank: usize) -> TransferResult<()> {
        if !(self.sampling_ratio > 0.0 && self.sampling_ratio <= 1.0) {
            return Err(TransferError::configuration(
                Side::Structural,
                rank,
                format!("抽样比例 {} 必须落在 (0, 1]", self.sampling_ratio),
            ));
        }
        Ok(())
    }
}

/// 方案选择
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SchemeConfig {
    /// 最近邻移动最小二乘
    Meld(MeldConfig),
    /// 径向基插值
    Rbf(RbfConfig),
}

impl SchemeConfig {
    /// 校验配置
    pub fn validate(&self, rank: usize) -> TransferResult<()> {
        match self {
            SchemeConfig::Meld(cfg) => cfg.validate(rank),
            SchemeConfig::Rbf(cfg) => cfg.validate(rank),
        }
    }

    /// 方案名称
    pub fn name(&self) -> &'static str {
        match self {
            SchemeConfig::Meld(_) => "meld",
            SchemeConfig::Rbf(_) => "rbf",
        }
    }
}

/// 结构候选节点（可能是镜像）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Candidate {
    /// 真实结构节点下标
    pub index: usize,
    /// 是否为镜像候选
    pub mirrored: bool,
}

impl Candidate {
    /// 候选坐标：镜像候选在对称分量上反号
    #[inline]
    pub fn coords<S: TransferScalar>(&self, struct_full: &[S], mirror: Option<usize>) -> [S; 3] {
        let mut x = [
            struct_full[3 * self.index],
            struct_full[3 * self.index + 1],
            struct_full[3 * self.index + 2],
        ];
        if self.mirrored {
            if let Some(m) = mirror {
                x[m] = -x[m];
            }
        }
        x
    }

    /// 把三维值从真实节点系反射到候选系（反射自逆，反向同此）
    #[inline]
    pub fn reflect<S: TransferScalar>(&self, v: [S; 3], mirror: Option<usize>) -> [S; 3] {
        let mut out = v;
        if self.mirrored {
            if let Some(m) = mirror {
                out[m] = -out[m];
            }
        }
        out
    }
}

/// 已构建的传递算子
///
/// 构建者独占权结构；执行器每次调用只读借用。载荷映射是位移映射的
/// 代数转置，必须精确保持。
pub trait TransferOperator<S: TransferScalar>: Send + Sync {
    /// 本 rank 的气动节点数
    fn n_aero_local(&self) -> usize;

    /// 全局结构节点数
    fn n_struct_global(&self) -> usize;

    /// 位移前传：全量结构位移 (3·nS) → 本地气动位移 (3·na)
    fn apply_displacements(&self, us_full: &[S]) -> Vec<S>;

    /// 载荷回传：本地气动载荷 (3·na) → 全量结构载荷累加 (3·nS)
    fn apply_loads(&self, fa_local: &[S]) -> Vec<S>;

    /// 温度前传：全量结构标量 (nS) → 本地气动标量 (na)
    fn apply_scalar_forward(&self, ts_full: &[S]) -> Vec<S>;

    /// 热流回传：本地气动标量 (na) → 全量结构标量累加 (nS)
    fn apply_scalar_backward(&self, qa_local: &[S]) -> Vec<S>;

    /// 位移输出对节点坐标的方向导数
    ///
    /// `ha_local` 为本地气动坐标扰动方向 (3·na)，`hs_full` 为全量结构
    /// 坐标扰动方向 (3·nS)；邻接模板视作固定（扰动不改变近邻选择）。
    fn jvp_displacements_coords(&self, us_full: &[S], ha_local: &[S], hs_full: &[S]) -> Vec<S>;

    /// 载荷输出对节点坐标的方向导数（返回全量结构累加 3·nS）
    fn jvp_loads_coords(&self, fa_local: &[S], ha_local: &[S], hs_full: &[S]) -> Vec<S>;
}

/// 两点间距离平方（解析，复步长安全）
#[inline]
pub(crate) fn dist2<S: TransferScalar>(a: &[S], b: &[S; 3]) -> S {
    debug_assert_eq!(a.len(), 3);
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}
