// aeroflex\crates\af_verify\src/lib.rs

//! AeroFlex Verification Layer
//!
//! 验证层，核查传递执行器的导数正确性并生成报告。
//!
//! # 模块概览
//!
//! - [`tester`]: 四通道导数核查（解析 vs 中心差分/复步长）
//! - [`report`]: 通道结果汇总与文本报告输出
//!
//! # 使用方式
//!
//! 对已初始化的执行器构造 [`DerivativeTester`]，调用
//! `test_all_derivatives`；返回报告的 `fail_count()` 为 0 表示
//! 全部导数通道在给定容差内一致。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod report;
pub mod tester;

pub use report::{ChannelResult, DerivativeTestReport};
pub use tester::DerivativeTester;
