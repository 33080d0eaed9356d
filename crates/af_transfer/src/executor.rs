// aeroflex\crates\af_transfer\src/executor.rs

//! 传递执行器
//!
//! 把登记表、插值算子与通信拓扑装配成面向求解器的传递接口。
//! 所有 `transfer_*` 与 `jvp_*` 方法都是全局域上的集合操作：
//! 全体 rank 必须以相同程序序调用，侧外 rank 传空缓冲即可。
//!
//! 数据流（正向）：结构位移在侧别域内收集到侧根，经全局域广播后
//! 各气动 rank 就地套用本地算子行；（反向）各气动 rank 把本地载荷
//! 行转置累加进全量结构缓冲，经全局求和归约到结构根后按块散发回
//! 结构侧各 rank。归约按 rank 升序累加，结果逐位确定。
//!
//! 节点写入会使执行器转脏，重新 `initialize` 前任何套用都报
//! `Uninitialized`。

use af_comm::collective::{broadcast, gatherv, reduce_sum, scatterv};
use af_comm::topology::ProcessTopology;
use af_foundation::{Side, TransferError, TransferResult, TransferScalar};

use crate::registry::MeshRegistry;
use crate::scheme::meld::build_meld;
use crate::scheme::rbf::build_rbf;
use crate::scheme::{SchemeConfig, TransferOperator};

/// 网格间传递执行器
///
/// 持有登记表与（初始化后的）本 rank 算子行。结构侧 rank 不构建
/// 算子，仅参与收集/散发。
pub struct TransferScheme<S: TransferScalar> {
    registry: MeshRegistry<S>,
    config: SchemeConfig,
    operator: Option<Box<dyn TransferOperator<S>>>,
    initialized: bool,
}

impl<S: TransferScalar> TransferScheme<S> {
    /// 创建执行器（校验方案配置）
    pub fn new(topology: ProcessTopology, config: SchemeConfig) -> TransferResult<Self> {
        config.validate(topology.rank())?;
        Ok(Self {
            registry: MeshRegistry::new(topology),
            config,
            operator: None,
            initialized: false,
        })
    }

    /// 写入本 rank 的结构节点坐标（使执行器转脏）
    pub fn set_structural_nodes(&mut self, coords: Vec<S>) -> TransferResult<()> {
        self.operator = None;
        self.initialized = false;
        self.registry.set_structural_nodes(coords)
    }

    /// 写入本 rank 的气动节点坐标（使执行器转脏）
    pub fn set_aerodynamic_nodes(&mut self, coords: Vec<S>) -> TransferResult<()> {
        self.operator = None;
        self.initialized = false;
        self.registry.set_aerodynamic_nodes(coords)
    }

    /// 同步节点集并构建本 rank 的算子行（集合操作）
    pub fn initialize(&mut self) -> TransferResult<()> {
        self.registry.synchronize()?;
        let rank = self.registry.topology().rank();
        if self.registry.topology().is_aerodynamic() {
            let aero = self.registry.aerodynamic_local();
            let full = self.registry.structural_full();
            let op: Box<dyn TransferOperator<S>> = match &self.config {
                SchemeConfig::Meld(cfg) => Box::new(build_meld(aero, full, cfg, rank)?),
                SchemeConfig::Rbf(cfg) => Box::new(build_rbf(aero, full, cfg, rank)?),
            };
            self.operator = Some(op);
        }
        self.initialized = true;
        log::info!(
            "传递执行器初始化完成: rank {}, 方案 {}, 结构 {} 节点 / 本地气动 {} 节点",
            rank,
            self.config.name(),
            self.registry.n_structural_global(),
            self.registry.n_aerodynamic_local()
        );
        Ok(())
    }

    /// 是否已初始化且无未同步的节点写入
    pub fn is_initialized(&self) -> bool {
        self.initialized && !self.registry.is_dirty()
    }

    /// 网格登记表
    pub fn registry(&self) -> &MeshRegistry<S> {
        &self.registry
    }

    /// 方案配置
    pub fn config(&self) -> &SchemeConfig {
        &self.config
    }

    fn ensure_ready(&self, operation: &'static str) -> TransferResult<()> {
        if !self.is_initialized() {
            return Err(TransferError::uninitialized(operation));
        }
        Ok(())
    }

    /// 位移前传（集合操作）
    ///
    /// `us_local` 为本 rank 结构位移 (3·n_local)；返回本 rank 气动
    /// 位移 (3·na)，侧外 rank 得到空缓冲。
    pub fn transfer_displacements(&self, us_local: &[S]) -> TransferResult<Vec<S>> {
        self.ensure_ready("transfer_displacements")?;
        self.check_structural_input("transfer_displacements", us_local, 3)?;
        let full = self.gather_structural_field(us_local, 3)?;
        Ok(match &self.operator {
            Some(op) => op.apply_displacements(&full),
            None => vec![],
        })
    }

    /// 载荷回传（集合操作，位移映射的精确转置）
    ///
    /// `fa_local` 为本 rank 气动载荷 (3·na)；返回本 rank 结构载荷
    /// (3·n_local)，侧外 rank 得到空缓冲。
    pub fn transfer_loads(&self, fa_local: &[S]) -> TransferResult<Vec<S>> {
        self.ensure_ready("transfer_loads")?;
        self.check_aerodynamic_input("transfer_loads", fa_local, 3)?;
        let contribution = match &self.operator {
            Some(op) => op.apply_loads(fa_local),
            None => vec![S::zero(); 3 * self.registry.n_structural_global()],
        };
        self.reduce_scatter_structural(contribution, 3)
    }

    /// 温度前传（集合操作，每节点 1 自由度）
    pub fn transfer_temperature(&self, ts_local: &[S]) -> TransferResult<Vec<S>> {
        self.ensure_ready("transfer_temperature")?;
        self.check_structural_input("transfer_temperature", ts_local, 1)?;
        let full = self.gather_structural_field(ts_local, 1)?;
        Ok(match &self.operator {
            Some(op) => op.apply_scalar_forward(&full),
            None => vec![],
        })
    }

    /// 热流回传（集合操作，温度前传的精确转置）
    pub fn transfer_flux(&self, qa_local: &[S]) -> TransferResult<Vec<S>> {
        self.ensure_ready("transfer_flux")?;
        self.check_aerodynamic_input("transfer_flux", qa_local, 1)?;
        let contribution = match &self.operator {
            Some(op) => op.apply_scalar_backward(qa_local),
            None => vec![S::zero(); self.registry.n_structural_global()],
        };
        self.reduce_scatter_structural(contribution, 1)
    }

    /// 位移输出对节点坐标的方向导数（集合操作）
    ///
    /// 扰动方向按坐标同样的分布方式给出：`ha_local` 为本 rank 气动
    /// 坐标扰动，`hs_local` 为本 rank 结构坐标扰动。
    pub fn jvp_displacements_coords(
        &self,
        us_local: &[S],
        ha_local: &[S],
        hs_local: &[S],
    ) -> TransferResult<Vec<S>> {
        self.ensure_ready("jvp_displacements_coords")?;
        self.check_structural_input("jvp_displacements_coords", us_local, 3)?;
        self.check_structural_input("jvp_displacements_coords", hs_local, 3)?;
        self.check_aerodynamic_input("jvp_displacements_coords", ha_local, 3)?;
        let us_full = self.gather_structural_field(us_local, 3)?;
        let hs_full = self.gather_structural_field(hs_local, 3)?;
        Ok(match &self.operator {
            Some(op) => op.jvp_displacements_coords(&us_full, ha_local, &hs_full),
            None => vec![],
        })
    }

    /// 载荷输出对节点坐标的方向导数（集合操作）
    pub fn jvp_loads_coords(
        &self,
        fa_local: &[S],
        ha_local: &[S],
        hs_local: &[S],
    ) -> TransferResult<Vec<S>> {
        self.ensure_ready("jvp_loads_coords")?;
        self.check_structural_input("jvp_loads_coords", hs_local, 3)?;
        self.check_aerodynamic_input("jvp_loads_coords", fa_local, 3)?;
        self.check_aerodynamic_input("jvp_loads_coords", ha_local, 3)?;
        let hs_full = self.gather_structural_field(hs_local, 3)?;
        let contribution = match &self.operator {
            Some(op) => op.jvp_loads_coords(fa_local, ha_local, &hs_full),
            None => vec![S::zero(); 3 * self.registry.n_structural_global()],
        };
        self.reduce_scatter_structural(contribution, 3)
    }

    // ------------------------------------------------------------------
    // 内部：分布数据的收集与散发
    // ------------------------------------------------------------------

    fn check_structural_input(
        &self,
        name: &'static str,
        buf: &[S],
        dof: usize,
    ) -> TransferResult<()> {
        TransferError::check_len(
            Side::Structural,
            self.registry.topology().rank(),
            name,
            dof * self.registry.n_structural_local(),
            buf.len(),
        )
    }

    fn check_aerodynamic_input(
        &self,
        name: &'static str,
        buf: &[S],
        dof: usize,
    ) -> TransferResult<()> {
        TransferError::check_len(
            Side::Aerodynamic,
            self.registry.topology().rank(),
            name,
            dof * self.registry.n_aerodynamic_local(),
            buf.len(),
        )
    }

    /// 结构侧分布场 → 全量场（侧内收集到侧根 + 全局广播）
    fn gather_structural_field(&self, local: &[S], dof: usize) -> TransferResult<Vec<S>> {
        let topo = self.registry.topology();
        let mut full = if let Some(comm) = topo.structural() {
            match gatherv(comm, local, 0)? {
                Some((full, _)) => full,
                None => vec![],
            }
        } else {
            vec![]
        };
        broadcast(topo.global(), &mut full, topo.structural_root())?;
        TransferError::check_len(
            Side::Structural,
            topo.rank(),
            "gather_structural_field",
            dof * self.registry.n_structural_global(),
            full.len(),
        )?;
        Ok(full)
    }

    /// 全量结构累加 → 结构侧分布场（全局求和归约到结构根 + 侧内散发）
    fn reduce_scatter_structural(
        &self,
        contribution: Vec<S>,
        dof: usize,
    ) -> TransferResult<Vec<S>> {
        let topo = self.registry.topology();
        let reduced = reduce_sum(topo.global(), &contribution, topo.structural_root())?;
        if let Some(comm) = topo.structural() {
            let counts: Vec<usize> = self
                .registry
                .structural_counts()
                .iter()
                .map(|&c| dof * c)
                .collect();
            scatterv(comm, reduced.as_deref(), &counts, 0)
        } else {
            Ok(vec![])
        }
    }
}
