// aeroflex\crates\af_transfer\src/scheme/rbf.rs

//! 径向基全局插值算子
//!
//! 以（可抽样的）结构节点为中心、线性多项式增广的径向基插值：
//!
//! ```text
//! K [α; γ] = [ũ; 0],   K = [Φ  P]
//!                          [Pᵀ 0]
//! ```
//!
//! 其中 `Φ_ij = φ(|c_i - c_j|)`、`P_i = [1, c_i]`。气动点求值矩阵
//! `A = [φ(|x_a - c_j|), 1, x_a]`，位移映射 `W = (A K⁻¹)` 取中心列，
//! 载荷映射为其转置。多项式增广保证仿射位移场精确再现，权行和为 1、
//! 坐标被再现，转置映射因而精确守恒总力与总矩。
//!
//! 稠密 K 的规模随中心数平方增长，大结构网格用 `sampling_ratio`
//! 按固定步长抽样中心；抽样后载荷只落到被抽样的结构节点上。

use nalgebra::{DMatrix, Dyn, LU};

use af_foundation::{Side, TransferError, TransferResult, TransferScalar};

use super::{dist2, Candidate, RbfConfig, RbfKernel, SymmetryAxis, TransferOperator};

/// 径向基插值算子
#[derive(Debug)]
pub struct RbfOperator<S: TransferScalar> {
    symmetry: SymmetryAxis,
    kernel: RbfKernel,
    /// 插值中心（抽样后的真实节点与镜像节点）
    centers: Vec<Candidate>,
    aero_local: Vec<S>,
    struct_full: Vec<S>,
    /// K 的 LU 分解，导数传播时复用
    lu: LU<S, Dyn, Dyn>,
    /// 位移映射的转置 Wᵀ（m × na），载荷回传直接按列累加
    wt: DMatrix<S>,
}

/// 构建径向基插值算子
pub fn build_rbf<S: TransferScalar>(
    aero_local: &[S],
    struct_full: &[S],
    cfg: &RbfConfig,
    rank: usize,
) -> TransferResult<RbfOperator<S>> {
    cfg.validate(rank)?;
    let na = aero_local.len() / 3;
    let ns = struct_full.len() / 3;
    let mirror = cfg.symmetry.mirror_component();

    // 固定步长抽样，步长 = ceil(1 / ratio)
    let stride = (1.0 / cfg.sampling_ratio).ceil() as usize;
    let mut centers = Vec::new();
    for index in (0..ns).step_by(stride.max(1)) {
        centers.push(Candidate { index, mirrored: false });
        if let Some(m) = mirror {
            // 落在对称面上的节点镜像到自身，剔除以免核矩阵奇异
            if struct_full[3 * index + m].re().abs() > f64::MIN_POSITIVE {
                centers.push(Candidate { index, mirrored: true });
            }
        }
    }
    let m = centers.len();
    if m < 4 {
        return Err(TransferError::underdetermined(Side::Structural, rank, 4, m));
    }

    // 核矩阵 K = [Φ P; Pᵀ 0]
    let dim = m + 4;
    let mut k = DMatrix::<S>::zeros(dim, dim);
    let coords: Vec<[S; 3]> = centers.iter().map(|c| c.coords(struct_full, mirror)).collect();
    for i in 0..m {
        for j in 0..m {
            k[(i, j)] = cfg.kernel.phi(dist2(&coords[i], &coords[j]));
        }
        k[(i, m)] = S::one();
        k[(m, i)] = S::one();
        for d in 0..3 {
            k[(i, m + 1 + d)] = coords[i][d];
            k[(m + 1 + d, i)] = coords[i][d];
        }
    }
    let lu = k.lu();

    // Wᵀ = K⁻¹ Aᵀ 的前 m 行（K 对称）
    let mut at = DMatrix::<S>::zeros(dim, na);
    for a in 0..na {
        let xa = &aero_local[3 * a..3 * a + 3];
        for j in 0..m {
            at[(j, a)] = cfg.kernel.phi(dist2(xa, &coords[j]));
        }
        at[(m, a)] = S::one();
        for d in 0..3 {
            at[(m + 1 + d, a)] = xa[d];
        }
    }
    let solved = lu.solve(&at).ok_or_else(|| {
        TransferError::singular(
            Side::Structural,
            rank,
            "rbf_kernel_solve",
            "径向基核矩阵奇异（中心重合或多项式基退化）",
        )
    })?;
    let wt = solved.rows(0, m).into_owned();

    log::debug!(
        "RBF 算子构建完成: rank {}, {} 中心 × {} 气动节点, 核 {:?}",
        rank,
        m,
        na,
        cfg.kernel
    );

    Ok(RbfOperator {
        symmetry: cfg.symmetry,
        kernel: cfg.kernel,
        centers,
        aero_local: aero_local.to_vec(),
        struct_full: struct_full.to_vec(),
        lu,
        wt,
    })
}

impl<S: TransferScalar> RbfOperator<S> {
    fn mirror(&self) -> Option<usize> {
        self.symmetry.mirror_component()
    }

    fn center_coords(&self) -> Vec<[S; 3]> {
        let mirror = self.mirror();
        self.centers
            .iter()
            .map(|c| c.coords(&self.struct_full, mirror))
            .collect()
    }

    /// 中心的坐标扰动（镜像中心在对称分量上反号）
    fn center_perturbations(&self, hs_full: &[S]) -> Vec<[S; 3]> {
        let mirror = self.mirror();
        self.centers
            .iter()
            .map(|c| {
                c.reflect(
                    [
                        hs_full[3 * c.index],
                        hs_full[3 * c.index + 1],
                        hs_full[3 * c.index + 2],
                    ],
                    mirror,
                )
            })
            .collect()
    }

    /// 核矩阵沿给定结构扰动方向的方向导数 dK
    fn kernel_directional(&self, coords: &[[S; 3]], h: &[[S; 3]]) -> DMatrix<S> {
        let m = self.centers.len();
        let dim = m + 4;
        let mut dk = DMatrix::<S>::zeros(dim, dim);
        for i in 0..m {
            for j in 0..m {
                let mut dd2 = S::zero();
                for d in 0..3 {
                    dd2 += (coords[i][d] - coords[j][d]) * (h[i][d] - h[j][d]);
                }
                dd2 *= S::from_re(2.0);
                dk[(i, j)] = self.kernel.dphi(dist2(&coords[i], &coords[j]), dd2);
            }
            for d in 0..3 {
                dk[(i, m + 1 + d)] = h[i][d];
                dk[(m + 1 + d, i)] = h[i][d];
            }
        }
        dk
    }

    /// 把插值值向量 [ũ; 0] 组装为 dim × ncol 右端
    fn assemble_rhs(&self, values: &[S], ncol: usize) -> DMatrix<S> {
        let mirror = self.mirror();
        let m = self.centers.len();
        let mut rhs = DMatrix::<S>::zeros(m + 4, ncol);
        for (j, c) in self.centers.iter().enumerate() {
            if ncol == 3 {
                let v = c.reflect(
                    [
                        values[3 * c.index],
                        values[3 * c.index + 1],
                        values[3 * c.index + 2],
                    ],
                    mirror,
                );
                for d in 0..3 {
                    rhs[(j, d)] = v[d];
                }
            } else {
                rhs[(j, 0)] = values[c.index];
            }
        }
        rhs
    }
}

impl<S: TransferScalar> TransferOperator<S> for RbfOperator<S> {
    fn n_aero_local(&self) -> usize {
        self.aero_local.len() / 3
    }

    fn n_struct_global(&self) -> usize {
        self.struct_full.len() / 3
    }

    fn apply_displacements(&self, us_full: &[S]) -> Vec<S> {
        let na = self.n_aero_local();
        let m = self.centers.len();
        let rhs = self.assemble_rhs(us_full, 3);
        let mut out = vec![S::zero(); 3 * na];
        for a in 0..na {
            for j in 0..m {
                for d in 0..3 {
                    out[3 * a + d] += self.wt[(j, a)] * rhs[(j, d)];
                }
            }
        }
        out
    }

    fn apply_loads(&self, fa_local: &[S]) -> Vec<S> {
        let mirror = self.mirror();
        let na = self.n_aero_local();
        let mut out = vec![S::zero(); self.struct_full.len()];
        for a in 0..na {
            let fa = [fa_local[3 * a], fa_local[3 * a + 1], fa_local[3 * a + 2]];
            for (j, c) in self.centers.iter().enumerate() {
                let f = c.reflect(fa, mirror);
                for d in 0..3 {
                    out[3 * c.index + d] += self.wt[(j, a)] * f[d];
                }
            }
        }
        out
    }

    fn apply_scalar_forward(&self, ts_full: &[S]) -> Vec<S> {
        let na = self.n_aero_local();
        let m = self.centers.len();
        let rhs = self.assemble_rhs(ts_full, 1);
        let mut out = vec![S::zero(); na];
        for a in 0..na {
            for j in 0..m {
                out[a] += self.wt[(j, a)] * rhs[(j, 0)];
            }
        }
        out
    }

    fn apply_scalar_backward(&self, qa_local: &[S]) -> Vec<S> {
        let na = self.n_aero_local();
        let mut out = vec![S::zero(); self.struct_full.len() / 3];
        for a in 0..na {
            for (j, c) in self.centers.iter().enumerate() {
                out[c.index] += self.wt[(j, a)] * qa_local[a];
            }
        }
        out
    }

    fn jvp_displacements_coords(&self, us_full: &[S], ha_local: &[S], hs_full: &[S]) -> Vec<S> {
        let na = self.n_aero_local();
        let m = self.centers.len();
        let coords = self.center_coords();
        let h = self.center_perturbations(hs_full);

        // y = A z，z = K⁻¹ [ũ; 0]；dy = dA z - A K⁻¹ (dK z)
        let rhs = self.assemble_rhs(us_full, 3);
        let z = match self.lu.solve(&rhs) {
            Some(z) => z,
            // 构建期已验证 K 可逆
            None => return vec![S::zero(); 3 * na],
        };
        let dk = self.kernel_directional(&coords, &h);
        let dkz = &dk * &z;
        let dz = match self.lu.solve(&dkz) {
            Some(v) => -v,
            None => return vec![S::zero(); 3 * na],
        };

        let mut out = vec![S::zero(); 3 * na];
        for a in 0..na {
            let xa = &self.aero_local[3 * a..3 * a + 3];
            let ha = &ha_local[3 * a..3 * a + 3];
            for j in 0..m {
                let d2 = dist2(xa, &coords[j]);
                let mut dd2 = S::zero();
                for d in 0..3 {
                    dd2 += (xa[d] - coords[j][d]) * (ha[d] - h[j][d]);
                }
                dd2 *= S::from_re(2.0);
                let phi = self.kernel.phi(d2);
                let dphi = self.kernel.dphi(d2, dd2);
                for d in 0..3 {
                    out[3 * a + d] += dphi * z[(j, d)] + phi * dz[(j, d)];
                }
            }
            // 多项式项：A 的尾列为 [1, x_a]，dA 尾列为 [0, ha]
            for d in 0..3 {
                out[3 * a + d] += z[(m + 1, d)] * ha[0]
                    + z[(m + 2, d)] * ha[1]
                    + z[(m + 3, d)] * ha[2];
                out[3 * a + d] += dz[(m, d)];
                for e in 0..3 {
                    out[3 * a + d] += dz[(m + 1 + e, d)] * xa[e];
                }
            }
        }
        out
    }

    fn jvp_loads_coords(&self, fa_local: &[S], ha_local: &[S], hs_full: &[S]) -> Vec<S> {
        let mirror = self.mirror();
        let na = self.n_aero_local();
        let m = self.centers.len();
        let dim = m + 4;
        let coords = self.center_coords();
        let h = self.center_perturbations(hs_full);

        // g = K⁻¹ Aᵀ f；dg = K⁻¹ (dAᵀ f - dK g)
        let mut b = DMatrix::<S>::zeros(dim, 3);
        let mut db = DMatrix::<S>::zeros(dim, 3);
        for a in 0..na {
            let xa = &self.aero_local[3 * a..3 * a + 3];
            let ha = &ha_local[3 * a..3 * a + 3];
            let fa = [fa_local[3 * a], fa_local[3 * a + 1], fa_local[3 * a + 2]];
            for j in 0..m {
                let d2 = dist2(xa, &coords[j]);
                let mut dd2 = S::zero();
                for d in 0..3 {
                    dd2 += (xa[d] - coords[j][d]) * (ha[d] - h[j][d]);
                }
                dd2 *= S::from_re(2.0);
                let phi = self.kernel.phi(d2);
                let dphi = self.kernel.dphi(d2, dd2);
                for d in 0..3 {
                    b[(j, d)] += phi * fa[d];
                    db[(j, d)] += dphi * fa[d];
                }
            }
            for d in 0..3 {
                b[(m, d)] += fa[d];
                for e in 0..3 {
                    b[(m + 1 + e, d)] += xa[e] * fa[d];
                    db[(m + 1 + e, d)] += ha[e] * fa[d];
                }
            }
        }
        let g = match self.lu.solve(&b) {
            Some(g) => g,
            None => return vec![S::zero(); self.struct_full.len()],
        };
        let dk = self.kernel_directional(&coords, &h);
        let rhs = db - &dk * &g;
        let dg = match self.lu.solve(&rhs) {
            Some(dg) => dg,
            None => return vec![S::zero(); self.struct_full.len()],
        };

        let mut out = vec![S::zero(); self.struct_full.len()];
        for (j, c) in self.centers.iter().enumerate() {
            let v = c.reflect([dg[(j, 0)], dg[(j, 1)], dg[(j, 2)]], mirror);
            for d in 0..3 {
                out[3 * c.index + d] += v[d];
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_cloud(rng: &mut StdRng, n: usize) -> Vec<f64> {
        (0..3 * n).map(|_| rng.gen::<f64>()).collect()
    }

    #[test]
    fn test_affine_field_reproduced_exactly() {
        let mut rng = StdRng::seed_from_u64(5);
        let xs = random_cloud(&mut rng, 20);
        let xa = random_cloud(&mut rng, 12);
        for kernel in [
            RbfKernel::Multiquadric { c: 0.5 },
            RbfKernel::ThinPlateSpline,
            RbfKernel::Gaussian { c: 1.2 },
        ] {
            let op = build_rbf(&xa, &xs, &RbfConfig::new().with_kernel(kernel), 0).unwrap();
            let field = |x: &[f64]| [0.2 * x[0] - 0.1 * x[1] + 1.0, x[2] * 0.4 - 2.0, x[0] + x[1]];
            let us: Vec<f64> = (0..20).flat_map(|j| field(&xs[3 * j..3 * j + 3])).collect();
            let ua = op.apply_displacements(&us);
            for a in 0..12 {
                let expected = field(&xa[3 * a..3 * a + 3]);
                for d in 0..3 {
                    assert!(
                        (ua[3 * a + d] - expected[d]).abs() < 1e-6,
                        "{:?} 气动节点 {} 分量 {} 偏差 {}",
                        kernel,
                        a,
                        d,
                        (ua[3 * a + d] - expected[d]).abs()
                    );
                }
            }
        }
    }

    #[test]
    fn test_load_transfer_is_transpose() {
        let mut rng = StdRng::seed_from_u64(8);
        let xs = random_cloud(&mut rng, 15);
        let xa = random_cloud(&mut rng, 10);
        let op = build_rbf(&xa, &xs, &RbfConfig::new(), 0).unwrap();

        let us: Vec<f64> = (0..45).map(|_| rng.gen::<f64>() - 0.5).collect();
        let fa: Vec<f64> = (0..30).map(|_| rng.gen::<f64>() - 0.5).collect();
        let ua = op.apply_displacements(&us);
        let fs = op.apply_loads(&fa);

        // 虚功一致：faᵀ (W uS) = (Wᵀ fa)ᵀ uS
        let lhs: f64 = fa.iter().zip(ua.iter()).map(|(a, b)| a * b).sum();
        let rhs: f64 = fs.iter().zip(us.iter()).map(|(a, b)| a * b).sum();
        assert!((lhs - rhs).abs() < 1e-10 * (1.0 + lhs.abs()));

        // 权行和为 1，总力守恒
        for d in 0..3 {
            let total_a: f64 = (0..10).map(|a| fa[3 * a + d]).sum();
            let total_s: f64 = (0..15).map(|j| fs[3 * j + d]).sum();
            assert!((total_a - total_s).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sampling_restricts_loaded_nodes() {
        let mut rng = StdRng::seed_from_u64(21);
        let xs = random_cloud(&mut rng, 24);
        let xa = random_cloud(&mut rng, 6);
        let op = build_rbf(&xa, &xs, &RbfConfig::new().with_sampling_ratio(0.5), 0).unwrap();
        // 步长 2：奇数下标节点不是中心，载荷必须为零
        let fa = vec![1.0f64; 18];
        let fs = op.apply_loads(&fa);
        for j in (1..24).step_by(2) {
            for d in 0..3 {
                assert_eq!(fs[3 * j + d], 0.0);
            }
        }
    }

    #[test]
    fn test_underdetermined_with_too_few_centers() {
        let xs = vec![0.0f64; 9];
        let xa = vec![0.5f64; 3];
        let err = build_rbf(&xa, &xs, &RbfConfig::new(), 0).unwrap_err();
        assert!(matches!(err, TransferError::Underdetermined { .. }));
    }

    #[test]
    fn test_jvp_coords_matches_complex_step() {
        let mut rng = StdRng::seed_from_u64(33);
        let ns = 14;
        let na = 7;
        let xs = random_cloud(&mut rng, ns);
        let xa = random_cloud(&mut rng, na);
        let us: Vec<f64> = (0..3 * ns).map(|_| rng.gen::<f64>() - 0.5).collect();
        let fa: Vec<f64> = (0..3 * na).map(|_| rng.gen::<f64>() - 0.5).collect();
        let ha: Vec<f64> = (0..3 * na).map(|_| rng.gen::<f64>() - 0.5).collect();
        let hs: Vec<f64> = (0..3 * ns).map(|_| rng.gen::<f64>() - 0.5).collect();

        let cfg = RbfConfig::new().with_kernel(RbfKernel::Multiquadric { c: 0.8 });
        let op = build_rbf(&xa, &xs, &cfg, 0).unwrap();
        let dy = op.jvp_displacements_coords(&us, &ha, &hs);
        let df = op.jvp_loads_coords(&fa, &ha, &hs);

        let h = 1e-30;
        let lift = |x: &[f64], d: &[f64]| -> Vec<Complex<f64>> {
            x.iter()
                .zip(d.iter())
                .map(|(&v, &p)| Complex::new(v, h * p))
                .collect()
        };
        let op_c = build_rbf(&lift(&xa, &ha), &lift(&xs, &hs), &cfg, 0).unwrap();
        let us_c: Vec<Complex<f64>> = us.iter().map(|&v| Complex::new(v, 0.0)).collect();
        let fa_c: Vec<Complex<f64>> = fa.iter().map(|&v| Complex::new(v, 0.0)).collect();
        let ua_c = op_c.apply_displacements(&us_c);
        let fs_c = op_c.apply_loads(&fa_c);

        for i in 0..3 * na {
            let reference = ua_c[i].im / h;
            assert!(
                (dy[i] - reference).abs() < 1e-9 * (1.0 + reference.abs()),
                "位移分量 {}: analytic={} reference={}",
                i,
                dy[i],
                reference
            );
        }
        for i in 0..3 * ns {
            let reference = fs_c[i].im / h;
            assert!(
                (df[i] - reference).abs() < 1e-9 * (1.0 + reference.abs()),
                "载荷分量 {}: analytic={} reference={}",
                i,
                df[i],
                reference
            );
        }
    }
}
