// aeroflex\crates\af_foundation\src/scalar.rs

//! TransferScalar - 密封的标量类型抽象
//!
//! 提供实数/复数双表示的唯一接口。整个传递算子核心对 `S: TransferScalar`
//! 泛型化，使同一份代码既能以 `f64` 运行生产传递，也能以
//! `Complex<f64>` 运行复步长（complex-step）导数参考，
//! 后者给出接近机器精度的参考导数。
//!
//! # 设计原则
//!
//! 1. **密封 Trait**: 只有 f64 和 Complex<f64> 可以实现（通过 private::Sealed）
//! 2. **解析延拓**: 所有几何量（距离、核函数）都必须经由本 trait 的解析
//!    运算计算，不得取模截断虚部，否则复步长导数失效
//! 3. **Pod 约束**: 标量可按原始字节参与集合通信（bytemuck 转换）
//!
//! # 使用规范
//!
//! ```
//! use af_foundation::scalar::TransferScalar;
//!
//! fn decay<S: TransferScalar>(d2: S, beta: f64) -> S {
//!     (-S::from_re(beta) * d2).exp()
//! }
//! assert!((decay(1.0f64, 0.5) - (-0.5f64).exp()).abs() < 1e-15);
//! ```

use bytemuck::Pod;
use nalgebra::ComplexField;
use num_complex::Complex;

/// 密封模块，禁止外部实现
mod private {
    /// 密封 trait
    pub trait Sealed {}
    impl Sealed for f64 {}
    impl Sealed for num_complex::Complex<f64> {}
}

/// 传递算子标量类型（密封，仅 f64/Complex<f64> 可实现）
///
/// # 实现类型
///
/// - `f64`: 生产模式，导数参考采用中心差分
/// - `Complex<f64>`: 验证模式，导数参考采用复步长，精度 ~1e-15
pub trait TransferScalar:
    private::Sealed + ComplexField<RealField = f64> + Pod + Copy + Send + Sync + 'static
{
    /// 是否为复数表示
    const IS_COMPLEX: bool;

    /// 从实数构造
    fn from_re(v: f64) -> Self;

    /// 实部
    fn re(self) -> f64;

    /// 虚部（实数表示恒为 0）
    fn im(self) -> f64;

    /// 沿导数方向施加步长扰动
    ///
    /// 实数表示返回 `x + h`（差分），复数表示返回 `x + i·h`（复步长）。
    fn perturb(self, h: f64) -> Self;

    /// 从扰动后的输出提取方向导数
    ///
    /// 实数表示为前向差分 `(y - base) / h`，复数表示为 `Im(y) / h`。
    fn extract_derivative(self, base: f64, h: f64) -> f64;
}

impl TransferScalar for f64 {
    const IS_COMPLEX: bool = false;

    #[inline]
    fn from_re(v: f64) -> Self {
        v
    }

    #[inline]
    fn re(self) -> f64 {
        self
    }

    #[inline]
    fn im(self) -> f64 {
        0.0
    }

    #[inline]
    fn perturb(self, h: f64) -> Self {
        self + h
    }

    #[inline]
    fn extract_derivative(self, base: f64, h: f64) -> f64 {
        (self - base) / h
    }
}

impl TransferScalar for Complex<f64> {
    const IS_COMPLEX: bool = true;

    #[inline]
    fn from_re(v: f64) -> Self {
        Complex::new(v, 0.0)
    }

    #[inline]
    fn re(self) -> f64 {
        self.re
    }

    #[inline]
    fn im(self) -> f64 {
        self.im
    }

    #[inline]
    fn perturb(self, h: f64) -> Self {
        Complex::new(self.re, self.im + h)
    }

    #[inline]
    fn extract_derivative(self, _base: f64, h: f64) -> f64 {
        self.im / h
    }
}

/// 非共轭内积 `Σ a_i b_i`
///
/// 注意与 nalgebra 的 `dotc` 区别：这里是解析双线性形式，
/// 虚功恒等式 `⟨f_S, u_S⟩ == ⟨f_A, u_A⟩` 依赖于此。
pub fn dot<S: TransferScalar>(a: &[S], b: &[S]) -> S {
    debug_assert_eq!(a.len(), b.len());
    let mut acc = S::zero();
    for (x, y) in a.iter().zip(b.iter()) {
        acc += *x * *y;
    }
    acc
}

/// 实部最大绝对值
pub fn norm_inf_re<S: TransferScalar>(v: &[S]) -> f64 {
    v.iter().fold(0.0f64, |m, x| m.max(x.re().abs()))
}
