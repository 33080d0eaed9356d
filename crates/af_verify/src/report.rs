// aeroflex\crates\af_verify\src/report.rs

//! 导数核查报告

use std::fmt;
use std::io::Write;
use std::path::Path;

use af_foundation::TransferResult;

/// 单个导数通道的核查结果
#[derive(Debug, Clone)]
pub struct ChannelResult {
    /// 通道名（输出量 / 微分变量）
    pub name: &'static str,
    /// 全局最大绝对偏差 |analytic - reference|
    pub max_error: f64,
    /// 参考导数的全局无穷范数
    pub reference_norm: f64,
    /// 全局最大归一化偏差 |analytic - reference| / (atol + rtol·|reference|)
    pub max_ratio: f64,
    /// 归一化偏差是否全部落入容差
    pub passed: bool,
}

/// 全通道导数核查报告
///
/// 所有统计量经全归约，各 rank 持有一致副本。
#[derive(Debug, Clone)]
pub struct DerivativeTestReport {
    /// 方案名
    pub scheme: String,
    /// 扰动步长
    pub step: f64,
    /// 相对容差
    pub rtol: f64,
    /// 绝对容差
    pub atol: f64,
    /// 是否使用复步长参考
    pub complex_step: bool,
    /// 各通道结果
    pub channels: Vec<ChannelResult>,
}

impl DerivativeTestReport {
    /// 未通过的通道数（0 为全通过）
    pub fn fail_count(&self) -> usize {
        self.channels.iter().filter(|c| !c.passed).count()
    }

    /// 是否全通道通过
    pub fn passed(&self) -> bool {
        self.fail_count() == 0
    }

    /// 把报告写入文本文件
    pub fn write_report(&self, path: &Path) -> TransferResult<()> {
        let mut file = std::fs::File::create(path)?;
        write!(file, "{}", self)?;
        Ok(())
    }
}

impl fmt::Display for DerivativeTestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "导数核查报告: 方案 {}", self.scheme)?;
        writeln!(
            f,
            "步长 {:e}, rtol {:e}, atol {:e}, 参考 {}",
            self.step,
            self.rtol,
            self.atol,
            if self.complex_step { "复步长" } else { "中心差分" }
        )?;
        for c in &self.channels {
            writeln!(
                f,
                "  [{}] {:24} 最大偏差 {:12.5e}  参考范数 {:12.5e}  归一化 {:10.3e}",
                if c.passed { "通过" } else { "失败" },
                c.name,
                c.max_error,
                c.reference_norm,
                c.max_ratio,
            )?;
        }
        writeln!(f, "结论: {} / {} 通道通过", self.channels.len() - self.fail_count(), self.channels.len())
    }
}
