// aeroflex\crates\af_foundation\src/lib.rs

//! AeroFlex Foundation Layer
//!
//! 基础层，提供整个项目的基础抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型，携带侧别/进程号/操作上下文
//! - [`scalar`]: 密封标量抽象，f64 生产 / Complex 复步长验证双表示
//!
//! # 设计原则
//!
//! 1. **最小依赖**: 仅依赖 thiserror、nalgebra 与数值基础 crate
//! 2. **类型安全**: 标量表示在编译期选定，不走运行时分派
//! 3. **可诊断**: 多进程故障必须能从错误文本直接定位

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod scalar;

pub use error::{Side, TransferError, TransferResult};
pub use scalar::TransferScalar;

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::error::{Side, TransferError, TransferResult};
    pub use crate::scalar::{dot, norm_inf_re, TransferScalar};
}
