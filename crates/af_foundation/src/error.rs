// aeroflex\crates\af_foundation\src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `TransferError` 枚举和 `TransferResult` 类型别名，用于整个项目的错误处理。
//!
//! # 设计原则
//!
//! 1. **可定位**: 多进程环境下的故障极难排查，每个错误都携带出错的
//!    侧别（结构侧/气动侧/全局）、进程号和操作名
//! 2. **不可恢复即中止**: 构造期错误（通信域/配置/尺寸）表示调用方编程错误，
//!    立即沿调用链中止，不做重试
//! 3. **数值奇异单独分类**: 算子构建中的奇异系统对本次构建是致命的，
//!    调用方可放宽参数后重建

use thiserror::Error;

/// 统一结果类型
pub type TransferResult<T> = Result<T, TransferError>;

/// 参与耦合的侧别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// 结构侧
    Structural,
    /// 气动侧
    Aerodynamic,
    /// 全局（不属于任何一侧的操作）
    Global,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Structural => write!(f, "结构侧"),
            Side::Aerodynamic => write!(f, "气动侧"),
            Side::Global => write!(f, "全局"),
        }
    }
}

/// AeroFlex 错误类型
///
/// 核心错误类型，用于整个项目。导数验证的超差不在此处：
/// 它被设计为非致命，聚合进 `DerivativeTestReport` 统计。
#[derive(Error, Debug)]
pub enum TransferError {
    /// 通信域或根进程配置错误
    #[error("配置错误 [{side} rank {rank}]: {message}")]
    Configuration {
        /// 出错侧别
        side: Side,
        /// 全局进程号
        rank: usize,
        /// 具体错误信息
        message: String,
    },

    /// 缓冲区尺寸不匹配
    #[error("尺寸错误 [{side} rank {rank}]: {name} 期望 {expected}, 实际 {actual}")]
    Dimension {
        /// 出错侧别
        side: Side,
        /// 全局进程号
        rank: usize,
        /// 缓冲区名称
        name: &'static str,
        /// 期望长度
        expected: usize,
        /// 实际长度
        actual: usize,
    },

    /// 结构节点不足以满足一致性约束
    #[error("欠定系统 [{side} rank {rank}]: 需要 {needed} 个候选节点, 仅有 {available}")]
    Underdetermined {
        /// 出错侧别
        side: Side,
        /// 全局进程号
        rank: usize,
        /// 约束所需的最小候选数
        needed: usize,
        /// 实际可用候选数（含对称镜像）
        available: usize,
    },

    /// 算子构建中的线性系统数值奇异
    #[error("奇异系统 [{side} rank {rank}]: {operation} 失败, {message}")]
    SingularSystem {
        /// 出错侧别
        side: Side,
        /// 全局进程号
        rank: usize,
        /// 失败的操作
        operation: &'static str,
        /// 具体错误信息
        message: String,
    },

    /// 点对点或集合通信失败
    #[error("通信错误 [rank {rank}]: {operation} 失败, {message}")]
    Communication {
        /// 全局进程号
        rank: usize,
        /// 失败的操作
        operation: &'static str,
        /// 具体错误信息
        message: String,
    },

    /// 在 initialize() 之前（或节点重定义之后）调用传递操作
    #[error("算子未就绪: {operation} 要求先完成 initialize()")]
    Uninitialized {
        /// 被拒绝的操作
        operation: &'static str,
    },

    /// IO 错误（仅报告文件写出使用）
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        #[source]
        /// 可选的底层 IO 错误
        source: Option<std::io::Error>,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl TransferError {
    /// 配置错误
    pub fn configuration(side: Side, rank: usize, message: impl Into<String>) -> Self {
        Self::Configuration {
            side,
            rank,
            message: message.into(),
        }
    }

    /// 尺寸不匹配
    pub fn dimension(
        side: Side,
        rank: usize,
        name: &'static str,
        expected: usize,
        actual: usize,
    ) -> Self {
        Self::Dimension {
            side,
            rank,
            name,
            expected,
            actual,
        }
    }

    /// 欠定系统
    pub fn underdetermined(side: Side, rank: usize, needed: usize, available: usize) -> Self {
        Self::Underdetermined {
            side,
            rank,
            needed,
            available,
        }
    }

    /// 奇异系统
    pub fn singular(
        side: Side,
        rank: usize,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::SingularSystem {
            side,
            rank,
            operation,
            message: message.into(),
        }
    }

    /// 通信错误
    pub fn communication(rank: usize, operation: &'static str, message: impl Into<String>) -> Self {
        Self::Communication {
            rank,
            operation,
            message: message.into(),
        }
    }

    /// 算子未就绪
    pub fn uninitialized(operation: &'static str) -> Self {
        Self::Uninitialized { operation }
    }

    /// IO 错误
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl TransferError {
    /// 检查坐标缓冲区长度是 3 的倍数
    #[inline]
    pub fn check_coord_len(
        side: Side,
        rank: usize,
        name: &'static str,
        len: usize,
    ) -> TransferResult<()> {
        if len % 3 != 0 {
            Err(Self::configuration(
                side,
                rank,
                format!("{} 长度 {} 不是 3 的倍数", name, len),
            ))
        } else {
            Ok(())
        }
    }

    /// 检查缓冲区长度恰好匹配
    #[inline]
    pub fn check_len(
        side: Side,
        rank: usize,
        name: &'static str,
        expected: usize,
        actual: usize,
    ) -> TransferResult<()> {
        if expected != actual {
            Err(Self::dimension(side, rank, name, expected, actual))
        } else {
            Ok(())
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

// ========================================================================
// 测试
// ========================================================================
