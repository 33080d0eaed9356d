// aeroflex\crates\af_comm\src/topology.rs

//! 进程拓扑管理
//!
//! 三个通信域参与耦合：气动侧子域、结构侧子域，以及覆盖二者的全局域。
//! 两侧的 rank 集合互不重叠（可以不覆盖全局域：落在两侧之外的 rank
//! 只参与全局集合操作）。每侧指定一个根 rank，承担全量节点集的
//! 收集与散发。
//!
//! 约定：侧别根在其子域内编号为 0，其全局编号必须等于声明的根 rank。
//! 该约定使"根是否存在于所声明的通信域内"可以在本地完成校验，
//! 避免悬挂式的运行期发现。

use std::sync::Arc;

use af_foundation::{Side, TransferError, TransferResult};

use crate::collective::Collective;

/// 进程拓扑（构造后不可变）
///
/// 不变量：任一全局 rank 至多属于 {结构侧, 气动侧} 之一。
#[derive(Clone)]
pub struct ProcessTopology {
    global: Arc<dyn Collective>,
    structural: Option<Arc<dyn Collective>>,
    aerodynamic: Option<Arc<dyn Collective>>,
    structural_root: usize,
    aerodynamic_root: usize,
}

impl ProcessTopology {
    /// 构造拓扑并校验配置
    ///
    /// # 校验项
    ///
    /// - 两侧通信域在同一 rank 上同时非空 → 重叠违例
    /// - 声明的根 rank 超出全局域 → 配置错误
    /// - 本 rank 为侧别子域的 0 号成员时，其全局编号必须等于声明的根
    /// - 本 rank 的全局编号等于某侧根时，必须持有该侧通信域
    pub fn new(
        global: Arc<dyn Collective>,
        structural: Option<Arc<dyn Collective>>,
        structural_root: usize,
        aerodynamic: Option<Arc<dyn Collective>>,
        aerodynamic_root: usize,
    ) -> TransferResult<Self> {
        let rank = global.rank();

        if structural.is_some() && aerodynamic.is_some() {
            return Err(TransferError::configuration(
                Side::Global,
                rank,
                "结构侧与气动侧通信域在同一 rank 上重叠",
            ));
        }
        for (side, root) in [
            (Side::Structural, structural_root),
            (Side::Aerodynamic, aerodynamic_root),
        ] {
            if root >= global.size() {
                return Err(TransferError::configuration(
                    side,
                    rank,
                    format!("根 rank {} 超出全局通信域大小 {}", root, global.size()),
                ));
            }
        }

        if let Some(comm) = &structural {
            if comm.rank() == 0 && rank != structural_root {
                return Err(TransferError::configuration(
                    Side::Structural,
                    rank,
                    format!("子域 0 号成员的全局编号 {} 与声明的根 {} 不符", rank, structural_root),
                ));
            }
        } else if rank == structural_root {
            return Err(TransferError::configuration(
                Side::Structural,
                rank,
                "声明的结构侧根不持有结构侧通信域",
            ));
        }
        if let Some(comm) = &aerodynamic {
            if comm.rank() == 0 && rank != aerodynamic_root {
                return Err(TransferError::configuration(
                    Side::Aerodynamic,
                    rank,
                    format!("子域 0 号成员的全局编号 {} 与声明的根 {} 不符", rank, aerodynamic_root),
                ));
            }
        } else if rank == aerodynamic_root {
            return Err(TransferError::configuration(
                Side::Aerodynamic,
                rank,
                "声明的气动侧根不持有气动侧通信域",
            ));
        }

        log::debug!(
            "进程拓扑就绪: rank {}/{}, 结构侧={}, 气动侧={}",
            rank,
            global.size(),
            structural.is_some(),
            aerodynamic.is_some()
        );

        Ok(Self {
            global,
            structural,
            aerodynamic,
            structural_root,
            aerodynamic_root,
        })
    }

    /// 本 rank 是否属于结构侧
    pub fn is_structural(&self) -> bool {
        self.structural.is_some()
    }

    /// 本 rank 是否属于气动侧
    pub fn is_aerodynamic(&self) -> bool {
        self.aerodynamic.is_some()
    }

    /// 结构侧根的全局编号
    pub fn structural_root(&self) -> usize {
        self.structural_root
    }

    /// 气动侧根的全局编号
    pub fn aerodynamic_root(&self) -> usize {
        self.aerodynamic_root
    }

    /// 全局通信域
    pub fn global(&self) -> &dyn Collective {
        self.global.as_ref()
    }

    /// 结构侧通信域（本 rank 属于结构侧时为 Some）
    pub fn structural(&self) -> Option<&dyn Collective> {
        self.structural.as_deref()
    }

    /// 气动侧通信域（本 rank 属于气动侧时为 Some）
    pub fn aerodynamic(&self) -> Option<&dyn Collective> {
        self.aerodynamic.as_deref()
    }

    /// 本 rank 的全局编号
    pub fn rank(&self) -> usize {
        self.global.rank()
    }
}

impl std::fmt::Debug for ProcessTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTopology")
            .field("rank", &self.global.rank())
            .field("size", &self.global.size())
            .field("structural", &self.structural.is_some())
            .field("aerodynamic", &self.aerodynamic.is_some())
            .field("structural_root", &self.structural_root)
            .field("aerodynamic_root", &self.aerodynamic_root)
            .finish()
    }
}

/// 按"前 `n_structural` 个 rank 为结构侧、其余为气动侧"分裂拓扑
///
/// 原型问题的标准布局；结构侧根为全局 0，气动侧根为全局
/// `n_structural`。要求 `0 < n_structural < size`。
pub fn split_front_back(
    comm: crate::mailbox::MailboxComm,
    n_structural: usize,
) -> TransferResult<ProcessTopology> {
    let size = comm.size();
    let rank = comm.rank();
    if n_structural == 0 || n_structural >= size {
        return Err(TransferError::configuration(
            Side::Global,
            rank,
            format!("结构侧 rank 数 {} 必须落在 (0, {}) 内", n_structural, size),
        ));
    }
    let color = if rank < n_structural { 55 } else { 66 };
    let sub = Arc::new(comm.split(color)?) as Arc<dyn Collective>;
    let (structural, aerodynamic) = if rank < n_structural {
        (Some(sub), None)
    } else {
        (None, Some(sub))
    };
    ProcessTopology::new(Arc::new(comm), structural, 0, aerodynamic, n_structural)
}
