// aeroflex\crates\af_verify\src/tester.rs

//! 导数核查器
//!
//! 对已初始化的传递执行器核查四个导数通道：
//!
//! 1. 气动位移对结构位移（线性通道）
//! 2. 结构载荷对气动载荷（线性通道）
//! 3. 气动位移对节点坐标（解析方向导数 vs 扰动重建参考）
//! 4. 结构载荷对节点坐标（同上）
//!
//! 每个通道把导数向量投影到固定随机探测向量上，比较解析值与参考值
//! 的全局标量投影。参考值在实数表示下用中心差分、复数表示下用复步长
//! （机器精度级，无相消误差）。投影经全局求和归约，全体 rank 得到
//! 一致的报告副本。
//!
//! 核查方法本身是集合操作：全体 rank 必须以相同输入维度参与。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use af_comm::collective::{broadcast, reduce_sum};
use af_foundation::{TransferError, TransferResult, TransferScalar};
use af_transfer::TransferScheme;

use crate::report::{ChannelResult, DerivativeTestReport};

/// 探测向量与扰动方向的种子基
const DIRECTION_SEED: u64 = 0x5EED_CA7;

/// 传递执行器的导数核查器
pub struct DerivativeTester<'a, S: TransferScalar> {
    scheme: &'a TransferScheme<S>,
}

impl<'a, S: TransferScalar> DerivativeTester<'a, S> {
    /// 创建核查器，要求执行器已初始化
    pub fn new(scheme: &'a TransferScheme<S>) -> TransferResult<Self> {
        if !scheme.is_initialized() {
            return Err(TransferError::uninitialized("derivative_test"));
        }
        Ok(Self { scheme })
    }

    /// 核查全部导数通道（集合操作）
    ///
    /// `us_local`/`fa_local` 为基准结构位移与气动载荷（复数表示下应为
    /// 实嵌入值）。返回未通过通道数为 0 时表示全通过的报告。
    pub fn test_all_derivatives(
        &self,
        us_local: &[S],
        fa_local: &[S],
        step: f64,
        rtol: f64,
        atol: f64,
    ) -> TransferResult<DerivativeTestReport> {
        let reg = self.scheme.registry();
        let rank = reg.topology().rank();
        let mut rng = StdRng::seed_from_u64(DIRECTION_SEED.wrapping_add(rank as u64));
        let mut direction =
            |len: usize| -> Vec<f64> { (0..len).map(|_| rng.gen::<f64>() - 0.5).collect() };

        let n_sd = 3 * reg.n_structural_local();
        let n_ad = 3 * reg.n_aerodynamic_local();
        let du = direction(n_sd);
        let dfa = direction(n_ad);
        let hs = direction(n_sd);
        let ha = direction(n_ad);
        // 探测向量：位移类输出投影到气动自由度，载荷类投影到结构自由度
        let w_ua = direction(n_ad);
        let w_fs = direction(n_sd);

        let mut channels = Vec::with_capacity(4);

        // 通道 1：气动位移对结构位移（传递映射线性，解析导数即映射本身）
        {
            let analytic = self.scheme.transfer_displacements(&lift::<S>(&du))?;
            let a = self.allreduce_scalar(project(&analytic, &w_ua))?.re();
            let reference = self.input_reference(
                |v| self.scheme.transfer_displacements(v),
                us_local,
                &du,
                &w_ua,
                step,
            )?;
            channels.push(assess("displacements/d_struct_disp", a, reference, rtol, atol));
        }

        // 通道 2：结构载荷对气动载荷
        {
            let analytic = self.scheme.transfer_loads(&lift::<S>(&dfa))?;
            let a = self.allreduce_scalar(project(&analytic, &w_fs))?.re();
            let reference = self.input_reference(
                |v| self.scheme.transfer_loads(v),
                fa_local,
                &dfa,
                &w_fs,
                step,
            )?;
            channels.push(assess("loads/d_aero_loads", a, reference, rtol, atol));
        }

        // 通道 3：气动位移对节点坐标
        {
            let analytic =
                self.scheme
                    .jvp_displacements_coords(us_local, &lift::<S>(&ha), &lift::<S>(&hs))?;
            let a = self.allreduce_scalar(project(&analytic, &w_ua))?.re();
            let reference = self.coords_reference(
                |s| s.transfer_displacements(us_local),
                &ha,
                &hs,
                &w_ua,
                step,
            )?;
            channels.push(assess("displacements/d_coords", a, reference, rtol, atol));
        }

        // 通道 4：结构载荷对节点坐标
        {
            let analytic =
                self.scheme
                    .jvp_loads_coords(fa_local, &lift::<S>(&ha), &lift::<S>(&hs))?;
            let a = self.allreduce_scalar(project(&analytic, &w_fs))?.re();
            let reference = self.coords_reference(
                |s| s.transfer_loads(fa_local),
                &ha,
                &hs,
                &w_fs,
                step,
            )?;
            channels.push(assess("loads/d_coords", a, reference, rtol, atol));
        }

        let report = DerivativeTestReport {
            scheme: self.scheme.config().name().to_string(),
            step,
            rtol,
            atol,
            complex_step: S::IS_COMPLEX,
            channels,
        };
        log::info!(
            "导数核查完成: rank {}, {} / {} 通道通过",
            rank,
            report.channels.len() - report.fail_count(),
            report.channels.len()
        );
        Ok(report)
    }

    /// 线性通道的参考导数：沿 `dir` 扰动输入后重新求值
    fn input_reference<F>(
        &self,
        eval: F,
        base: &[S],
        dir: &[f64],
        probe: &[f64],
        step: f64,
    ) -> TransferResult<f64>
    where
        F: Fn(&[S]) -> TransferResult<Vec<S>>,
    {
        if S::IS_COMPLEX {
            let perturbed = perturb_along(base, dir, step);
            let y = eval(&perturbed)?;
            Ok(self.allreduce_scalar(project(&y, probe))?.im() / step)
        } else {
            let plus = eval(&perturb_along(base, dir, step))?;
            let minus = eval(&perturb_along(base, dir, -step))?;
            let p = self.allreduce_scalar(project(&plus, probe))?.re();
            let m = self.allreduce_scalar(project(&minus, probe))?.re();
            Ok((p - m) / (2.0 * step))
        }
    }

    /// 坐标通道的参考导数：沿 (ha, hs) 扰动节点坐标后重建执行器求值
    fn coords_reference<F>(
        &self,
        eval: F,
        ha: &[f64],
        hs: &[f64],
        probe: &[f64],
        step: f64,
    ) -> TransferResult<f64>
    where
        F: Fn(&TransferScheme<S>) -> TransferResult<Vec<S>>,
    {
        if S::IS_COMPLEX {
            let perturbed = self.rebuilt_scheme(ha, hs, step)?;
            let y = eval(&perturbed)?;
            Ok(self.allreduce_scalar(project(&y, probe))?.im() / step)
        } else {
            let plus = self.rebuilt_scheme(ha, hs, step)?;
            let minus = self.rebuilt_scheme(ha, hs, -step)?;
            let p = self.allreduce_scalar(project(&eval(&plus)?, probe))?.re();
            let m = self.allreduce_scalar(project(&eval(&minus)?, probe))?.re();
            Ok((p - m) / (2.0 * step))
        }
    }

    /// 节点坐标沿给定方向扰动后的执行器副本（集合操作）
    fn rebuilt_scheme(&self, ha: &[f64], hs: &[f64], signed_step: f64) -> TransferResult<TransferScheme<S>> {
        let reg = self.scheme.registry();
        let mut scheme =
            TransferScheme::new(reg.topology().clone(), self.scheme.config().clone())?;
        scheme.set_structural_nodes(perturb_along(reg.structural_local(), hs, signed_step))?;
        scheme.set_aerodynamic_nodes(perturb_along(reg.aerodynamic_local(), ha, signed_step))?;
        scheme.initialize()?;
        Ok(scheme)
    }

    /// 全局标量求和归约，全体 rank 得到一致结果
    fn allreduce_scalar(&self, value: S) -> TransferResult<S> {
        let global = self.scheme.registry().topology().global();
        let mut buf = match reduce_sum(global, &[value], 0)? {
            Some(v) => v,
            None => vec![S::zero()],
        };
        broadcast(global, &mut buf, 0)?;
        Ok(buf[0])
    }
}

fn lift<S: TransferScalar>(dir: &[f64]) -> Vec<S> {
    dir.iter().map(|&d| S::from_re(d)).collect()
}

fn perturb_along<S: TransferScalar>(base: &[S], dir: &[f64], step: f64) -> Vec<S> {
    base.iter()
        .zip(dir.iter())
        .map(|(&v, &d)| v.perturb(step * d))
        .collect()
}

/// 向量对实探测向量的投影（无共轭）
fn project<S: TransferScalar>(v: &[S], probe: &[f64]) -> S {
    v.iter()
        .zip(probe.iter())
        .fold(S::zero(), |acc, (&a, &w)| acc + a * S::from_re(w))
}

fn assess(name: &'static str, analytic: f64, reference: f64, rtol: f64, atol: f64) -> ChannelResult {
    let error = (analytic - reference).abs();
    let ratio = error / (atol + rtol * reference.abs());
    ChannelResult {
        name,
        max_error: error,
        reference_norm: reference.abs(),
        max_ratio: ratio,
        passed: ratio <= 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assess_tolerance_boundary() {
        let ok = assess("c", 1.0 + 5e-6, 1.0, 1e-5, 1e-30);
        assert!(ok.passed);
        let bad = assess("c", 1.1, 1.0, 1e-5, 1e-30);
        assert!(!bad.passed);
        assert!((bad.max_error - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_project_is_unconjugated_dot() {
        let v = vec![1.0f64, 2.0, -3.0];
        let w = vec![0.5, 0.25, 1.0];
        assert!((project(&v, &w) - (0.5 + 0.5 - 3.0)).abs() < 1e-15);
    }
}
