// aeroflex\crates\af_transfer\tests/consistency.rs

//! 跨进程组传递一致性测试
//!
//! 5 rank 布局（2 结构 + 3 气动，互不重叠）下检验：
//! 刚体一致性、总力/总矩守恒、虚功一致与标量通道的行和归一。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use af_comm::mailbox::spawn_universe;
use af_comm::topology::split_front_back;
use af_comm::Collective;
use af_transfer::{MeldConfig, RbfConfig, SchemeConfig, SymmetryAxis, TransferScheme};

const N_STRUCT_RANKS: usize = 2;
const N_RANKS: usize = 5;

/// 结构侧 rank r 持有 37 + 7r 个节点，气动侧 rank r 持有 55 + 11r 个
fn side_node_count(structural: bool, side_rank: usize) -> usize {
    if structural {
        37 + 7 * side_rank
    } else {
        55 + 11 * side_rank
    }
}

fn node_cloud(structural: bool, side_rank: usize) -> Vec<f64> {
    let seed = if structural { 100 + side_rank } else { 200 + side_rank } as u64;
    let mut rng = StdRng::seed_from_u64(seed);
    let n = side_node_count(structural, side_rank);
    (0..3 * n).map(|_| rng.gen::<f64>() * 2.0 - 1.0).collect()
}

/// 有限转角刚体位移场：u(x) = R x + t - x
fn rigid_field(x: &[f64]) -> [f64; 3] {
    let (s, c) = 0.35f64.sin_cos();
    let rotated = [
        c * x[0] - s * x[1],
        s * x[0] + c * x[1],
        x[2],
    ];
    [rotated[0] + 0.7 - x[0], rotated[1] - 0.2 - x[1], rotated[2] + 1.1 - x[2]]
}

fn build_scheme(
    comm: af_comm::MailboxComm,
    config: SchemeConfig,
) -> (TransferScheme<f64>, usize, Vec<f64>) {
    let rank = comm.rank();
    let topo = split_front_back(comm, N_STRUCT_RANKS).unwrap();
    let structural = rank < N_STRUCT_RANKS;
    let side_rank = if structural { rank } else { rank - N_STRUCT_RANKS };
    let cloud = node_cloud(structural, side_rank);

    let mut scheme = TransferScheme::new(topo, config).unwrap();
    if structural {
        scheme.set_structural_nodes(cloud.clone()).unwrap();
    } else {
        scheme.set_aerodynamic_nodes(cloud.clone()).unwrap();
    }
    scheme.initialize().unwrap();
    (scheme, rank, cloud)
}

#[test]
fn test_five_rank_counts_and_rigid_consistency() {
    spawn_universe(N_RANKS, |comm| {
        let (scheme, rank, cloud) =
            build_scheme(comm, SchemeConfig::Meld(MeldConfig::new()));

        assert_eq!(scheme.registry().n_structural_global(), 81);
        if rank < N_STRUCT_RANKS {
            assert_eq!(scheme.registry().structural_counts(), &[37, 44]);
        } else {
            assert_eq!(scheme.registry().aerodynamic_counts(), &[55, 66, 77]);
        }

        let us: Vec<f64> = if rank < N_STRUCT_RANKS {
            (0..cloud.len() / 3)
                .flat_map(|j| rigid_field(&cloud[3 * j..3 * j + 3]))
                .collect()
        } else {
            vec![]
        };
        let ua = scheme.transfer_displacements(&us).unwrap();
        if rank >= N_STRUCT_RANKS {
            for a in 0..cloud.len() / 3 {
                let expected = rigid_field(&cloud[3 * a..3 * a + 3]);
                for d in 0..3 {
                    assert!(
                        (ua[3 * a + d] - expected[d]).abs() < 1e-9,
                        "rank {} 气动节点 {} 分量 {} 偏差 {:e}",
                        rank,
                        a,
                        d,
                        (ua[3 * a + d] - expected[d]).abs()
                    );
                }
            }
        } else {
            assert!(ua.is_empty());
        }
    });
}

#[test]
fn test_five_rank_force_and_moment_conservation() {
    // (总力, 总矩) 的本 rank 部分和，最后全局汇总比对
    let results = spawn_universe(N_RANKS, |comm| {
        let (scheme, rank, cloud) =
            build_scheme(comm, SchemeConfig::Meld(MeldConfig::new()));
        let structural = rank < N_STRUCT_RANKS;

        let fa: Vec<f64> = if structural {
            vec![]
        } else {
            let mut rng = StdRng::seed_from_u64(900 + rank as u64);
            (0..cloud.len()).map(|_| rng.gen::<f64>() - 0.5).collect()
        };
        let fs = scheme.transfer_loads(&fa).unwrap();

        let totals = |coords: &[f64], f: &[f64]| -> ([f64; 3], [f64; 3]) {
            let mut force = [0.0; 3];
            let mut moment = [0.0; 3];
            for i in 0..f.len() / 3 {
                let x = &coords[3 * i..3 * i + 3];
                let fi = &f[3 * i..3 * i + 3];
                for d in 0..3 {
                    force[d] += fi[d];
                }
                moment[0] += x[1] * fi[2] - x[2] * fi[1];
                moment[1] += x[2] * fi[0] - x[0] * fi[2];
                moment[2] += x[0] * fi[1] - x[1] * fi[0];
            }
            (force, moment)
        };
        if structural {
            (totals(&cloud, &fs), ([0.0; 3], [0.0; 3]))
        } else {
            (([0.0; 3], [0.0; 3]), totals(&cloud, &fa))
        }
    });

    for d in 0..3 {
        let fs: f64 = results.iter().map(|((f, _), _)| f[d]).sum();
        let fa: f64 = results.iter().map(|(_, (f, _))| f[d]).sum();
        assert!((fs - fa).abs() < 1e-9, "总力分量 {}: {} vs {}", d, fs, fa);
        let ms: f64 = results.iter().map(|((_, m), _)| m[d]).sum();
        let ma: f64 = results.iter().map(|(_, (_, m))| m[d]).sum();
        assert!((ms - ma).abs() < 1e-9, "总矩分量 {}: {} vs {}", d, ms, ma);
    }
}

#[test]
fn test_five_rank_virtual_work_identity() {
    // faᵀ (W uS) 与 (Wᵀ fa)ᵀ uS 的本 rank 部分和必须全局相等
    let results = spawn_universe(N_RANKS, |comm| {
        let (scheme, rank, cloud) =
            build_scheme(comm, SchemeConfig::Meld(MeldConfig::new()));
        let structural = rank < N_STRUCT_RANKS;
        let mut rng = StdRng::seed_from_u64(777 + rank as u64);

        let us: Vec<f64> = if structural {
            (0..cloud.len()).map(|_| rng.gen::<f64>() - 0.5).collect()
        } else {
            vec![]
        };
        let fa: Vec<f64> = if structural {
            vec![]
        } else {
            (0..cloud.len()).map(|_| rng.gen::<f64>() - 0.5).collect()
        };

        let ua = scheme.transfer_displacements(&us).unwrap();
        let fs = scheme.transfer_loads(&fa).unwrap();

        let aero_work: f64 = fa.iter().zip(ua.iter()).map(|(a, b)| a * b).sum();
        let struct_work: f64 = fs.iter().zip(us.iter()).map(|(a, b)| a * b).sum();
        (aero_work, struct_work)
    });

    let aero: f64 = results.iter().map(|(a, _)| a).sum();
    let structural: f64 = results.iter().map(|(_, s)| s).sum();
    assert!(
        (aero - structural).abs() < 1e-10 * (1.0 + aero.abs()),
        "虚功不一致: {} vs {}",
        aero,
        structural
    );
}

#[test]
fn test_five_rank_scalar_channels() {
    let results = spawn_universe(N_RANKS, |comm| {
        let (scheme, rank, cloud) =
            build_scheme(comm, SchemeConfig::Rbf(RbfConfig::new()));
        let structural = rank < N_STRUCT_RANKS;
        let n = cloud.len() / 3;

        // 常温场精确保持
        let ts: Vec<f64> = if structural { vec![450.0; n] } else { vec![] };
        let ta = scheme.transfer_temperature(&ts).unwrap();
        if !structural {
            for &t in &ta {
                assert!((t - 450.0).abs() < 1e-7);
            }
        }

        // 热流总量守恒
        let qa: Vec<f64> = if structural {
            vec![]
        } else {
            let mut rng = StdRng::seed_from_u64(50 + rank as u64);
            (0..n).map(|_| rng.gen::<f64>()).collect()
        };
        let qs = scheme.transfer_flux(&qa).unwrap();
        (qa.iter().sum::<f64>(), qs.iter().sum::<f64>())
    });

    let aero: f64 = results.iter().map(|(a, _)| a).sum();
    let structural: f64 = results.iter().map(|(_, s)| s).sum();
    assert!((aero - structural).abs() < 1e-8, "热流不守恒: {} vs {}", aero, structural);
}

#[test]
fn test_symmetry_half_model_matches_mirrored_full_model() {
    // 半模 + 对称面 与 显式镜像全模 给出相同的气动位移
    let half = spawn_universe(2, |comm| {
        let rank = comm.rank();
        let topo = split_front_back(comm, 1).unwrap();
        let mut rng = StdRng::seed_from_u64(61);
        let xs: Vec<f64> = (0..45)
            .map(|i| {
                let v = rng.gen::<f64>();
                // y 分量保持正侧，避免节点落在对称面上
                if i % 3 == 1 {
                    v + 0.1
                } else {
                    v * 2.0 - 1.0
                }
            })
            .collect();
        let xa: Vec<f64> = (0..21).map(|_| rng.gen::<f64>() * 2.0 - 1.0).collect();

        let cfg = MeldConfig::new()
            .with_nearest_neighbors(6)
            .with_symmetry(SymmetryAxis::Y);
        let mut scheme = TransferScheme::new(topo, SchemeConfig::Meld(cfg)).unwrap();
        if rank == 0 {
            scheme.set_structural_nodes(xs.clone()).unwrap();
        } else {
            scheme.set_aerodynamic_nodes(xa).unwrap();
        }
        scheme.initialize().unwrap();

        let us: Vec<f64> = if rank == 0 {
            let mut r = StdRng::seed_from_u64(62);
            (0..45).map(|_| r.gen::<f64>() - 0.5).collect()
        } else {
            vec![]
        };
        scheme.transfer_displacements(&us).unwrap()
    });

    let full = spawn_universe(2, |comm| {
        let rank = comm.rank();
        let topo = split_front_back(comm, 1).unwrap();
        let mut rng = StdRng::seed_from_u64(61);
        let xs_half: Vec<f64> = (0..45)
            .map(|i| {
                let v = rng.gen::<f64>();
                if i % 3 == 1 {
                    v + 0.1
                } else {
                    v * 2.0 - 1.0
                }
            })
            .collect();
        let xa: Vec<f64> = (0..21).map(|_| rng.gen::<f64>() * 2.0 - 1.0).collect();

        // 显式镜像：y 反号的节点接在半模之后
        let mut xs = xs_half.clone();
        for j in 0..15 {
            xs.push(xs_half[3 * j]);
            xs.push(-xs_half[3 * j + 1]);
            xs.push(xs_half[3 * j + 2]);
        }

        let cfg = MeldConfig::new().with_nearest_neighbors(6);
        let mut scheme = TransferScheme::new(topo, SchemeConfig::Meld(cfg)).unwrap();
        if rank == 0 {
            scheme.set_structural_nodes(xs).unwrap();
        } else {
            scheme.set_aerodynamic_nodes(xa).unwrap();
        }
        scheme.initialize().unwrap();

        let us: Vec<f64> = if rank == 0 {
            let mut r = StdRng::seed_from_u64(62);
            let us_half: Vec<f64> = (0..45).map(|_| r.gen::<f64>() - 0.5).collect();
            let mut us = us_half.clone();
            // 镜像节点的位移在 y 分量上反号
            for j in 0..15 {
                us.push(us_half[3 * j]);
                us.push(-us_half[3 * j + 1]);
                us.push(us_half[3 * j + 2]);
            }
            us
        } else {
            vec![]
        };
        scheme.transfer_displacements(&us).unwrap()
    });

    let ua_half = &half[1];
    let ua_full = &full[1];
    assert_eq!(ua_half.len(), ua_full.len());
    for (i, (a, b)) in ua_half.iter().zip(ua_full.iter()).enumerate() {
        assert!((a - b).abs() < 1e-9, "分量 {}: 半模 {} vs 全模 {}", i, a, b);
    }
}
