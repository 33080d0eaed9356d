// aeroflex\crates\af_transfer\src/scheme/meld.rs

//! 最近邻移动最小二乘传递算子
//!
//! 对每个气动节点选取 `nn` 个最近结构候选节点（欧氏距离，平距离时
//! 按结构节点下标升序决胜），以指数衰减权作偏好、以仿射一致性为硬
//! 约束求解单节点小规模最小二乘：
//!
//! ```text
//! min ½ Σ w_j² / ψ_j   s.t.  Σ w_j = 1,  Σ w_j x_j = x_a
//! ```
//!
//! KKT 解为 `w = Ψ P (Pᵀ Ψ P)⁻¹ q`，基在取值点处中心化：
//! `P_j = [1, x_j - x_a]`、`q = [1, 0]`，与未中心化形式等价但 4×4
//! 矩阵条件数好得多。`ψ_j = exp(-β d_j² / σ)`（σ 为模板内距离平方
//! 均值，保持权对几何尺度不敏感）。约束保证算子精确再现一切仿射
//! 位移场，刚体一致性与转置载荷映射的力/矩守恒由此精确成立。
//!
//! 4×4 KKT 矩阵奇异（模板几何退化，如候选共面）报
//! `SingularSystem`；候选不足报 `Underdetermined`。

use nalgebra::{Matrix4, Vector4};
use rayon::prelude::*;

use af_foundation::{Side, TransferError, TransferResult, TransferScalar};

use super::{dist2, Candidate, MeldConfig, SymmetryAxis, TransferOperator};

/// 单个气动节点的插值模板
#[derive(Debug, Clone)]
struct Stencil<S> {
    candidates: Vec<Candidate>,
    weights: Vec<S>,
    psi: Vec<S>,
    lambda: Vector4<S>,
    m_inv: Matrix4<S>,
    /// 衰减归一化尺度 σ（退化模板固定为 1）
    sigma: S,
    /// σ 被钳制时为真，导数链视 σ 为常数
    sigma_clamped: bool,
}

/// 最近邻移动最小二乘算子
///
/// 行按本 rank 的气动节点分块；每行是对全量结构节点集的稀疏加权。
#[derive(Debug)]
pub struct MeldOperator<S> {
    symmetry: SymmetryAxis,
    beta: f64,
    aero_local: Vec<S>,
    struct_full: Vec<S>,
    stencils: Vec<Stencil<S>>,
}

/// 构建最近邻移动最小二乘算子
///
/// `aero_local` 为本 rank 气动坐标 (3·na)，`struct_full` 为全量结构
/// 坐标 (3·nS)。纯函数：相同输入给出相同算子。
pub fn build_meld<S: TransferScalar>(
    aero_local: &[S],
    struct_full: &[S],
    cfg: &MeldConfig,
    rank: usize,
) -> TransferResult<MeldOperator<S>> {
    cfg.validate(rank)?;
    let na = aero_local.len() / 3;
    let ns = struct_full.len() / 3;
    let mirror = cfg.symmetry.mirror_component();
    let available = if mirror.is_some() { 2 * ns } else { ns };

    if na > 0 && available < cfg.nearest_neighbors {
        return Err(TransferError::underdetermined(
            Side::Structural,
            rank,
            cfg.nearest_neighbors,
            available,
        ));
    }

    let stencils: Vec<Stencil<S>> = (0..na)
        .into_par_iter()
        .map(|a| build_stencil(&aero_local[3 * a..3 * a + 3], struct_full, cfg, mirror, rank))
        .collect::<TransferResult<Vec<_>>>()?;

    log::debug!(
        "MELD 算子构建完成: rank {}, {} 气动节点 × {} 近邻, beta={}",
        rank,
        na,
        cfg.nearest_neighbors,
        cfg.decay_factor
    );

    Ok(MeldOperator {
        symmetry: cfg.symmetry,
        beta: cfg.decay_factor,
        aero_local: aero_local.to_vec(),
        struct_full: struct_full.to_vec(),
        stencils,
    })
}

fn build_stencil<S: TransferScalar>(
    xa: &[S],
    struct_full: &[S],
    cfg: &MeldConfig,
    mirror: Option<usize>,
    rank: usize,
) -> TransferResult<Stencil<S>> {
    let ns = struct_full.len() / 3;

    // 候选排序键用实部距离；镜像候选排在同距真实候选之后
    let mut ranked: Vec<(f64, Candidate)> = Vec::with_capacity(if mirror.is_some() {
        2 * ns
    } else {
        ns
    });
    for index in 0..ns {
        let real = Candidate { index, mirrored: false };
        ranked.push((dist2(xa, &real.coords(struct_full, mirror)).re(), real));
        if mirror.is_some() {
            let ghost = Candidate { index, mirrored: true };
            ranked.push((dist2(xa, &ghost.coords(struct_full, mirror)).re(), ghost));
        }
    }
    ranked.sort_by(|a, b| {
        a.0.total_cmp(&b.0)
            .then_with(|| a.1.index.cmp(&b.1.index))
            .then_with(|| a.1.mirrored.cmp(&b.1.mirrored))
    });
    ranked.truncate(cfg.nearest_neighbors);
    let candidates: Vec<Candidate> = ranked.iter().map(|(_, c)| *c).collect();
    let n = candidates.len();

    // 距离平方与衰减尺度
    let d2: Vec<S> = candidates
        .iter()
        .map(|c| dist2(xa, &c.coords(struct_full, mirror)))
        .collect();
    let mut sigma = d2.iter().fold(S::zero(), |acc, &v| acc + v) / S::from_re(n as f64);
    let sigma_clamped = sigma.re() <= f64::MIN_POSITIVE;
    if sigma_clamped {
        sigma = S::one();
    }

    let beta = S::from_re(cfg.decay_factor);
    let psi: Vec<S> = d2.iter().map(|&v| (-beta * v / sigma).exp()).collect();

    // KKT 矩阵 M = Pᵀ Ψ P，基在气动节点处中心化
    let mut m = Matrix4::<S>::zeros();
    for (c, &psi_j) in candidates.iter().zip(psi.iter()) {
        let x = c.coords(struct_full, mirror);
        let p = Vector4::new(S::one(), x[0] - xa[0], x[1] - xa[1], x[2] - xa[2]);
        m += p * p.transpose() * psi_j;
    }
    let m_inv = m.try_inverse().ok_or_else(|| {
        TransferError::singular(
            Side::Structural,
            rank,
            "meld_kkt_inverse",
            "模板几何退化，仿射约束矩阵不可逆",
        )
    })?;

    // 中心化基下取值点本身对应 q = e₀
    let q = Vector4::new(S::one(), S::zero(), S::zero(), S::zero());
    let lambda = m_inv * q;

    let weights: Vec<S> = candidates
        .iter()
        .zip(psi.iter())
        .map(|(c, &psi_j)| {
            let x = c.coords(struct_full, mirror);
            let p = Vector4::new(S::one(), x[0] - xa[0], x[1] - xa[1], x[2] - xa[2]);
            psi_j * p.dot(&lambda)
        })
        .collect();

    Ok(Stencil {
        candidates,
        weights,
        psi,
        lambda,
        m_inv,
        sigma,
        sigma_clamped,
    })
}

impl<S: TransferScalar> MeldOperator<S> {
    fn mirror(&self) -> Option<usize> {
        self.symmetry.mirror_component()
    }

    /// 单模板权重对坐标的方向导数（邻接固定）
    ///
    /// 链式法则贯穿衰减权 ψ、中心化基 P 与 KKT 逆。
    fn stencil_dw(&self, a: usize, ha: &[S], hs_full: &[S]) -> Vec<S> {
        let stencil = &self.stencils[a];
        let mirror = self.mirror();
        let xa = &self.aero_local[3 * a..3 * a + 3];
        let n = stencil.candidates.len();

        // dd2_j = 2 r_j · (ha - h̃_j)
        let mut dd2 = Vec::with_capacity(n);
        for c in &stencil.candidates {
            let x = c.coords(&self.struct_full, mirror);
            let h = c.reflect(
                [
                    hs_full[3 * c.index],
                    hs_full[3 * c.index + 1],
                    hs_full[3 * c.index + 2],
                ],
                mirror,
            );
            let mut acc = S::zero();
            for k in 0..3 {
                acc += (xa[k] - x[k]) * (ha[k] - h[k]);
            }
            dd2.push(acc * S::from_re(2.0));
        }

        let dsigma = if stencil.sigma_clamped {
            S::zero()
        } else {
            dd2.iter().fold(S::zero(), |acc, &v| acc + v) / S::from_re(n as f64)
        };

        // dψ_j = ψ_j · (-β) · (dd2_j σ - d2_j dσ) / σ²
        let beta = S::from_re(self.beta);
        let sigma2 = stencil.sigma * stencil.sigma;
        let dpsi: Vec<S> = stencil
            .candidates
            .iter()
            .enumerate()
            .map(|(j, c)| {
                let d2_j = dist2(xa, &c.coords(&self.struct_full, mirror));
                stencil.psi[j] * (-beta) * (dd2[j] * stencil.sigma - d2_j * dsigma) / sigma2
            })
            .collect();

        // 中心化基下 q 为常向量，dp_j = h̃_j - h_a，dλ = -M⁻¹ dM λ
        let mut dm = Matrix4::<S>::zeros();
        for (j, c) in stencil.candidates.iter().enumerate() {
            let x = c.coords(&self.struct_full, mirror);
            let h = c.reflect(
                [
                    hs_full[3 * c.index],
                    hs_full[3 * c.index + 1],
                    hs_full[3 * c.index + 2],
                ],
                mirror,
            );
            let p = Vector4::new(S::one(), x[0] - xa[0], x[1] - xa[1], x[2] - xa[2]);
            let dp = Vector4::new(S::zero(), h[0] - ha[0], h[1] - ha[1], h[2] - ha[2]);
            dm += p * p.transpose() * dpsi[j];
            dm += (dp * p.transpose() + p * dp.transpose()) * stencil.psi[j];
        }
        let dlambda = -(stencil.m_inv * (dm * stencil.lambda));

        // dw_j = dψ_j (p_j·λ) + ψ_j (dp_j·λ + p_j·dλ)
        stencil
            .candidates
            .iter()
            .enumerate()
            .map(|(j, c)| {
                let x = c.coords(&self.struct_full, mirror);
                let h = c.reflect(
                    [
                        hs_full[3 * c.index],
                        hs_full[3 * c.index + 1],
                        hs_full[3 * c.index + 2],
                    ],
                    mirror,
                );
                let p = Vector4::new(S::one(), x[0] - xa[0], x[1] - xa[1], x[2] - xa[2]);
                let dp = Vector4::new(S::zero(), h[0] - ha[0], h[1] - ha[1], h[2] - ha[2]);
                dpsi[j] * p.dot(&stencil.lambda)
                    + stencil.psi[j] * (dp.dot(&stencil.lambda) + p.dot(&dlambda))
            })
            .collect()
    }
}

impl<S: TransferScalar> TransferOperator<S> for MeldOperator<S> {
    fn n_aero_local(&self) -> usize {
        self.aero_local.len() / 3
    }

    fn n_struct_global(&self) -> usize {
        self.struct_full.len() / 3
    }

    fn apply_displacements(&self, us_full: &[S]) -> Vec<S> {
        let mirror = self.mirror();
        let mut out = vec![S::zero(); self.aero_local.len()];
        for (a, stencil) in self.stencils.iter().enumerate() {
            for (c, &w) in stencil.candidates.iter().zip(stencil.weights.iter()) {
                let u = c.reflect(
                    [
                        us_full[3 * c.index],
                        us_full[3 * c.index + 1],
                        us_full[3 * c.index + 2],
                    ],
                    mirror,
                );
                for k in 0..3 {
                    out[3 * a + k] += w * u[k];
                }
            }
        }
        out
    }

    fn apply_loads(&self, fa_local: &[S]) -> Vec<S> {
        let mirror = self.mirror();
        let mut out = vec![S::zero(); self.struct_full.len()];
        for (a, stencil) in self.stencils.iter().enumerate() {
            let fa = [fa_local[3 * a], fa_local[3 * a + 1], fa_local[3 * a + 2]];
            for (c, &w) in stencil.candidates.iter().zip(stencil.weights.iter()) {
                let f = c.reflect(fa, mirror);
                for k in 0..3 {
                    out[3 * c.index + k] += w * f[k];
                }
            }
        }
        out
    }

    fn apply_scalar_forward(&self, ts_full: &[S]) -> Vec<S> {
        let mut out = vec![S::zero(); self.stencils.len()];
        for (a, stencil) in self.stencils.iter().enumerate() {
            for (c, &w) in stencil.candidates.iter().zip(stencil.weights.iter()) {
                out[a] += w * ts_full[c.index];
            }
        }
        out
    }

    fn apply_scalar_backward(&self, qa_local: &[S]) -> Vec<S> {
        let mut out = vec![S::zero(); self.struct_full.len() / 3];
        for (a, stencil) in self.stencils.iter().enumerate() {
            for (c, &w) in stencil.candidates.iter().zip(stencil.weights.iter()) {
                out[c.index] += w * qa_local[a];
            }
        }
        out
    }

    fn jvp_displacements_coords(&self, us_full: &[S], ha_local: &[S], hs_full: &[S]) -> Vec<S> {
        let mirror = self.mirror();
        let mut out = vec![S::zero(); self.aero_local.len()];
        for (a, stencil) in self.stencils.iter().enumerate() {
            let dw = self.stencil_dw(a, &ha_local[3 * a..3 * a + 3], hs_full);
            for (c, &dw_j) in stencil.candidates.iter().zip(dw.iter()) {
                let u = c.reflect(
                    [
                        us_full[3 * c.index],
                        us_full[3 * c.index + 1],
                        us_full[3 * c.index + 2],
                    ],
                    mirror,
                );
                for k in 0..3 {
                    out[3 * a + k] += dw_j * u[k];
                }
            }
        }
        out
    }

    fn jvp_loads_coords(&self, fa_local: &[S], ha_local: &[S], hs_full: &[S]) -> Vec<S> {
        let mirror = self.mirror();
        let mut out = vec![S::zero(); self.struct_full.len()];
        for (a, stencil) in self.stencils.iter().enumerate() {
            let dw = self.stencil_dw(a, &ha_local[3 * a..3 * a + 3], hs_full);
            let fa = [fa_local[3 * a], fa_local[3 * a + 1], fa_local[3 * a + 2]];
            for (c, &dw_j) in stencil.candidates.iter().zip(dw.iter()) {
                let f = c.reflect(fa, mirror);
                for k in 0..3 {
                    out[3 * c.index + k] += dw_j * f[k];
                }
            }
        }
        out
    }
}
