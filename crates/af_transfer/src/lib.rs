// aeroflex\crates\af_transfer\src/lib.rs

//! AeroFlex Transfer Layer
//!
//! 传递层，负责非匹配网格之间的位移/载荷/温度/热流交换。
//!
//! # 模块概览
//!
//! - [`registry`]: 两侧网格登记表与"本地-全局"同步
//! - [`scheme`]: 插值算子构建（最近邻移动最小二乘 / 径向基）
//! - [`executor`]: 面向求解器的集合式传递接口
//!
//! # 核心保证
//!
//! 1. **刚体一致性**: 仿射位移场（含刚体运动）被精确再现
//! 2. **守恒性**: 载荷映射是位移映射的代数转置，总力/总矩精确守恒
//! 3. **可微性**: 所有输出对输入与节点坐标提供解析方向导数

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod executor;
pub mod registry;
pub mod scheme;

pub use executor::TransferScheme;
pub use registry::MeshRegistry;
pub use scheme::{MeldConfig, RbfConfig, RbfKernel, SchemeConfig, SymmetryAxis, TransferOperator};
