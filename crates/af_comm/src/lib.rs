// aeroflex\crates\af_comm\src/lib.rs

//! AeroFlex Communication Layer
//!
//! 通信层，提供耦合传递所需的进程组抽象与集合操作。
//!
//! # 模块概览
//!
//! - [`collective`]: 对象安全的点对点抽象与 Pod 泛型集合操作
//! - [`mailbox`]: 进程内多线程信箱通信域（线程即 rank）
//! - [`topology`]: 结构侧/气动侧/全局三域拓扑与校验
//!
//! # 设计原则
//!
//! 1. **确定性**: 集合操作按 rank 升序累加，重复运行逐位一致
//! 2. **无悬挂**: 拓扑约定使根配置错误在本地即可发现
//! 3. **可替换**: 算法层只见 [`collective::Collective`]，后端可换

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collective;
pub mod mailbox;
pub mod topology;

pub use collective::Collective;
pub use mailbox::{spawn_universe, MailboxComm};
pub use topology::ProcessTopology;
