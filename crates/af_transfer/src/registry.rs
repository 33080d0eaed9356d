// aeroflex\crates\af_transfer\src/registry.rs

//! 网格登记表
//!
//! 保存两侧按 rank 分块的节点坐标，维护"本地-全局"计数/偏移表，
//! 并在算子构建前把全量节点集收集到各侧根、再把结构侧全量集广播到
//! 全局域。坐标缓冲的唯一属主是登记表；执行器仅在单次调用范围内
//! 借用。
//!
//! 节点重定义（网格大变形后的重建、或新一轮仿真）通过 `set_*_nodes`
//! 重新写入并置脏，脏状态下禁止套用旧算子。

use af_comm::collective::{allgather_counts, broadcast, gatherv};
use af_comm::topology::ProcessTopology;
use af_foundation::{Side, TransferError, TransferResult, TransferScalar};

/// 单侧节点集
#[derive(Debug, Clone)]
struct SideNodes<S> {
    /// 本 rank 持有的坐标，长度 3 * n_local
    local: Vec<S>,
    /// 各侧别 rank 的节点数（在侧别域内全员可见；域外为空）
    counts: Vec<usize>,
    /// 全量坐标：结构侧广播后全员持有；气动侧仅根持有
    full: Vec<S>,
}

impl<S> Default for SideNodes<S> {
    fn default() -> Self {
        Self {
            local: Vec::new(),
            counts: Vec::new(),
            full: Vec::new(),
        }
    }
}

impl<S: TransferScalar> SideNodes<S> {
    fn n_local(&self) -> usize {
        self.local.len() / 3
    }
}

/// 两侧网格登记表
pub struct MeshRegistry<S> {
    topology: ProcessTopology,
    structural: SideNodes<S>,
    aerodynamic: SideNodes<S>,
    /// 节点写入后、同步完成前为脏
    dirty: bool,
}

impl<S: TransferScalar> MeshRegistry<S> {
    /// 创建空登记表
    pub fn new(topology: ProcessTopology) -> Self {
        Self {
            topology,
            structural: SideNodes::default(),
            aerodynamic: SideNodes::default(),
            dirty: true,
        }
    }

    /// 进程拓扑
    pub fn topology(&self) -> &ProcessTopology {
        &self.topology
    }

    /// 写入本 rank 的结构节点坐标（长度 3 * n_local，侧外 rank 必须为空）
    pub fn set_structural_nodes(&mut self, coords: Vec<S>) -> TransferResult<()> {
        self.set_side_nodes(Side::Structural, coords)
    }

    /// 写入本 rank 的气动节点坐标（长度 3 * n_local，侧外 rank 必须为空）
    pub fn set_aerodynamic_nodes(&mut self, coords: Vec<S>) -> TransferResult<()> {
        self.set_side_nodes(Side::Aerodynamic, coords)
    }

    fn set_side_nodes(&mut self, side: Side, coords: Vec<S>) -> TransferResult<()> {
        let rank = self.topology.rank();
        TransferError::check_coord_len(side, rank, "node_coords", coords.len())?;
        let in_side = match side {
            Side::Structural => self.topology.is_structural(),
            Side::Aerodynamic => self.topology.is_aerodynamic(),
            Side::Global => false,
        };
        if !in_side && !coords.is_empty() {
            return Err(TransferError::configuration(
                side,
                rank,
                "侧外 rank 不得提供非空节点缓冲",
            ));
        }
        let slot = match side {
            Side::Structural => &mut self.structural,
            _ => &mut self.aerodynamic,
        };
        slot.local = coords;
        slot.counts.clear();
        slot.full.clear();
        self.dirty = true;
        Ok(())
    }

    /// 是否存在未同步的节点写入
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 同步节点集（集合操作，全局域全员参与）
    ///
    /// 1. 两侧各自在侧别域内收集计数与全量坐标到侧根
    /// 2. 结构侧全量坐标从结构根经全局域广播到所有 rank
    ///
    /// 完成后登记表转为干净状态。
    pub fn synchronize(&mut self) -> TransferResult<()> {
        // 侧别域内的收集只允许持侧 rank 参与
        if let Some(comm) = self.topology.structural() {
            self.structural.counts = allgather_counts(comm, self.structural.n_local())?;
            self.structural.full = match gatherv(comm, &self.structural.local, 0)? {
                Some((full, _)) => full,
                None => vec![],
            };
        }
        if let Some(comm) = self.topology.aerodynamic() {
            self.aerodynamic.counts = allgather_counts(comm, self.aerodynamic.n_local())?;
            self.aerodynamic.full = match gatherv(comm, &self.aerodynamic.local, 0)? {
                Some((full, _)) => full,
                None => vec![],
            };
        }

        // 结构全量集向全局域广播，供气动侧就地构建算子行
        let root = self.topology.structural_root();
        let mut buf = std::mem::take(&mut self.structural.full);
        broadcast(self.topology.global(), &mut buf, root)?;
        self.structural.full = buf;

        log::debug!(
            "登记表同步完成: rank {}, 结构全量 {} 节点, 本地气动 {} 节点",
            self.topology.rank(),
            self.structural.full.len() / 3,
            self.aerodynamic.n_local()
        );
        self.dirty = false;
        Ok(())
    }

    /// 本地结构坐标
    pub fn structural_local(&self) -> &[S] {
        &self.structural.local
    }

    /// 本地气动坐标
    pub fn aerodynamic_local(&self) -> &[S] {
        &self.aerodynamic.local
    }

    /// 全量结构坐标（synchronize 后全员可用）
    pub fn structural_full(&self) -> &[S] {
        &self.structural.full
    }

    /// 气动全量坐标（仅气动根非空）
    pub fn aerodynamic_full(&self) -> &[S] {
        &self.aerodynamic.full
    }

    /// 本地结构节点数
    pub fn n_structural_local(&self) -> usize {
        self.structural.n_local()
    }

    /// 本地气动节点数
    pub fn n_aerodynamic_local(&self) -> usize {
        self.aerodynamic.n_local()
    }

    /// 全局结构节点数（synchronize 后全员可用）
    pub fn n_structural_global(&self) -> usize {
        self.structural.full.len() / 3
    }

    /// 结构侧各 rank 节点数表（侧内 rank 可用）
    pub fn structural_counts(&self) -> &[usize] {
        &self.structural.counts
    }

    /// 气动侧各 rank 节点数表（侧内 rank 可用）
    pub fn aerodynamic_counts(&self) -> &[usize] {
        &self.aerodynamic.counts
    }
}
