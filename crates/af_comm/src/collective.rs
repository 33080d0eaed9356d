// aeroflex\crates\af_comm\src/collective.rs

//! 阻塞式集合通信原语
//!
//! [`Collective`] 是对象安全的点对点抽象；集合操作以自由函数组合实现，
//! 对元素类型 `T: Pod` 泛型化，经 bytemuck 在字节缓冲与类型化缓冲之间
//! 零拷贝/对齐安全地转换。
//!
//! 所有集合操作要求本域全体成员以相同程序序调用；根 rank 不向自身
//! 发送消息，因此大小为 1 的通信域上所有集合操作退化为本地拷贝。

use bytemuck::Pod;

use af_foundation::{Side, TransferError, TransferResult};

/// 点对点通信抽象（对象安全）
///
/// `rank`/`size` 均相对于本通信域。实现必须保证同一对 rank 之间
/// 的消息先进先出。
pub trait Collective: Send + Sync {
    /// 本 rank 在此通信域内的编号
    fn rank(&self) -> usize;
    /// 通信域大小
    fn size(&self) -> usize;
    /// 向 `dest` 发送一条消息（不阻塞于对端接收）
    fn send_bytes(&self, dest: usize, payload: Vec<u8>) -> TransferResult<()>;
    /// 阻塞接收来自 `src` 的下一条消息
    fn recv_bytes(&self, src: usize) -> TransferResult<Vec<u8>>;
}

fn check_root(comm: &dyn Collective, root: usize, operation: &'static str) -> TransferResult<()> {
    if root >= comm.size() {
        return Err(TransferError::communication(
            comm.rank(),
            operation,
            format!("根 rank {} 超出通信域大小 {}", root, comm.size()),
        ));
    }
    Ok(())
}

/// 从 `root` 广播缓冲区，非根成员的缓冲区被整体替换
pub fn broadcast<T: Pod>(
    comm: &dyn Collective,
    buf: &mut Vec<T>,
    root: usize,
) -> TransferResult<()> {
    check_root(comm, root, "broadcast")?;
    if comm.size() == 1 {
        return Ok(());
    }
    if comm.rank() == root {
        let bytes: &[u8] = bytemuck::cast_slice(buf.as_slice());
        for dst in 0..comm.size() {
            if dst != root {
                comm.send_bytes(dst, bytes.to_vec())?;
            }
        }
    } else {
        let bytes = comm.recv_bytes(root)?;
        *buf = bytemuck::pod_collect_to_vec(&bytes);
    }
    Ok(())
}

/// 变长收集：根得到按 rank 顺序拼接的全量缓冲与各 rank 元素数
///
/// 非根成员返回 `None`。
pub fn gatherv<T: Pod>(
    comm: &dyn Collective,
    local: &[T],
    root: usize,
) -> TransferResult<Option<(Vec<T>, Vec<usize>)>> {
    check_root(comm, root, "gatherv")?;
    if comm.rank() != root {
        comm.send_bytes(root, bytemuck::cast_slice(local).to_vec())?;
        return Ok(None);
    }
    let mut parts: Vec<Vec<T>> = Vec::with_capacity(comm.size());
    for src in 0..comm.size() {
        if src == root {
            parts.push(local.to_vec());
        } else {
            let bytes = comm.recv_bytes(src)?;
            parts.push(bytemuck::pod_collect_to_vec(&bytes));
        }
    }
    let counts: Vec<usize> = parts.iter().map(|p| p.len()).collect();
    let mut full = Vec::with_capacity(counts.iter().sum());
    for part in parts {
        full.extend_from_slice(&part);
    }
    Ok(Some((full, counts)))
}

/// 变长散发：根按 `counts` 切分 `global` 并分发，返回本 rank 的分片
pub fn scatterv<T: Pod>(
    comm: &dyn Collective,
    global: Option<&[T]>,
    counts: &[usize],
    root: usize,
) -> TransferResult<Vec<T>> {
    check_root(comm, root, "scatterv")?;
    if comm.rank() == root {
        let global = global.ok_or_else(|| {
            TransferError::communication(comm.rank(), "scatterv", "根 rank 缺少全量缓冲")
        })?;
        TransferError::check_len(
            Side::Global,
            comm.rank(),
            "scatterv_counts",
            comm.size(),
            counts.len(),
        )?;
        let total: usize = counts.iter().sum();
        TransferError::check_len(Side::Global, comm.rank(), "scatterv_global", total, global.len())?;
        let mut offset = 0usize;
        let mut own: Vec<T> = Vec::new();
        for (dst, &count) in counts.iter().enumerate() {
            let slice = &global[offset..offset + count];
            if dst == root {
                own = slice.to_vec();
            } else {
                comm.send_bytes(dst, bytemuck::cast_slice(slice).to_vec())?;
            }
            offset += count;
        }
        Ok(own)
    } else {
        let bytes = comm.recv_bytes(root)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}

/// 逐元素求和归约到根，非根成员返回 `None`
///
/// 按 rank 升序确定性累加，同一输入在重复运行间结果逐位一致。
pub fn reduce_sum<S>(comm: &dyn Collective, local: &[S], root: usize) -> TransferResult<Option<Vec<S>>>
where
    S: Pod + Copy + std::ops::AddAssign,
{
    check_root(comm, root, "reduce_sum")?;
    if comm.rank() != root {
        comm.send_bytes(root, bytemuck::cast_slice(local).to_vec())?;
        return Ok(None);
    }
    let mut acc: Vec<S> = vec![];
    for src in 0..comm.size() {
        let part: Vec<S> = if src == root {
            local.to_vec()
        } else {
            let bytes = comm.recv_bytes(src)?;
            bytemuck::pod_collect_to_vec(&bytes)
        };
        if acc.is_empty() {
            acc = part;
            continue;
        }
        TransferError::check_len(Side::Global, comm.rank(), "reduce_sum", acc.len(), part.len())?;
        for (a, b) in acc.iter_mut().zip(part.iter()) {
            *a += *b;
        }
    }
    Ok(Some(acc))
}

/// 全归约取最大值（f64），所有成员得到一致结果
pub fn allreduce_max(comm: &dyn Collective, value: f64) -> TransferResult<f64> {
    let gathered = gatherv(comm, &[value], 0)?;
    let mut buf = match gathered {
        Some((values, _)) => vec![values.into_iter().fold(f64::NEG_INFINITY, f64::max)],
        None => vec![0.0f64],
    };
    broadcast(comm, &mut buf, 0)?;
    Ok(buf[0])
}

/// 收集各 rank 的计数并广播给全体成员
///
/// 返回的表按 rank 顺序排列，是"本地-全局"偏移重建的依据。
pub fn allgather_counts(comm: &dyn Collective, local_count: usize) -> TransferResult<Vec<usize>> {
    let gathered = gatherv(comm, &[local_count as u64], 0)?;
    let mut buf: Vec<u64> = match gathered {
        Some((counts, _)) => counts,
        None => vec![],
    };
    broadcast(comm, &mut buf, 0)?;
    Ok(buf.into_iter().map(|c| c as usize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::spawn_universe;

    #[test]
    fn test_broadcast() {
        spawn_universe(4, |comm| {
            let mut buf = if comm.rank() == 1 {
                vec![1.0f64, 2.0, 3.0]
            } else {
                vec![]
            };
            broadcast(&comm, &mut buf, 1).unwrap();
            assert_eq!(buf, vec![1.0, 2.0, 3.0]);
        });
    }

    #[test]
    fn test_gatherv_rank_order() {
        let results = spawn_universe(3, |comm| {
            let local: Vec<u64> = (0..=comm.rank() as u64).collect();
            gatherv(&comm, &local, 0).unwrap()
        });
        let (full, counts) = results[0].clone().unwrap();
        assert_eq!(full, vec![0, 0, 1, 0, 1, 2]);
        assert_eq!(counts, vec![1, 2, 3]);
        assert!(results[1].is_none());
    }

    #[test]
    fn test_scatterv_roundtrip() {
        spawn_universe(3, |comm| {
            let counts = vec![2usize, 1, 3];
            let global: Vec<f64> = (0..6).map(|i| i as f64).collect();
            let local = if comm.rank() == 0 {
                scatterv(&comm, Some(&global), &counts, 0).unwrap()
            } else {
                scatterv::<f64>(&comm, None, &[], 0).unwrap()
            };
            assert_eq!(local.len(), counts[comm.rank()]);
            match comm.rank() {
                0 => assert_eq!(local, vec![0.0, 1.0]),
                1 => assert_eq!(local, vec![2.0]),
                _ => assert_eq!(local, vec![3.0, 4.0, 5.0]),
            }
        });
    }

    #[test]
    fn test_reduce_sum() {
        let results = spawn_universe(4, |comm| {
            let local = vec![comm.rank() as f64, 1.0];
            reduce_sum(&comm, &local, 2).unwrap()
        });
        assert_eq!(results[2], Some(vec![6.0, 4.0]));
        assert!(results[0].is_none());
    }

    #[test]
    fn test_allreduce_max() {
        let results = spawn_universe(3, |comm| {
            allreduce_max(&comm, comm.rank() as f64 * 1.5).unwrap()
        });
        assert!(results.iter().all(|&v| (v - 3.0).abs() < 1e-15));
    }

    #[test]
    fn test_allgather_counts() {
        let results = spawn_universe(3, |comm| {
            allgather_counts(&comm, 10 + comm.rank()).unwrap()
        });
        for counts in results {
            assert_eq!(counts, vec![10, 11, 12]);
        }
    }

    #[test]
    fn test_size_one_degenerates() {
        let comms = crate::mailbox::MailboxComm::universe(1);
        let mut buf = vec![5.0f64];
        broadcast(&comms[0], &mut buf, 0).unwrap();
        assert_eq!(buf, vec![5.0]);
        let (full, counts) = gatherv(&comms[0], &buf, 0).unwrap().unwrap();
        assert_eq!(full, vec![5.0]);
        assert_eq!(counts, vec![1]);
    }
}
