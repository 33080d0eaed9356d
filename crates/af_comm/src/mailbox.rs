// aeroflex\crates\af_comm\src/mailbox.rs

//! 进程内多 rank 通信域
//!
//! 以每 rank 一个 FIFO 信箱实现阻塞式点对点消息传递，
//! 确定性的分组元数据加显式的打包/交换原语，后续可平移到 rsmpi 后端。
//! 集合操作（广播、收集、散发、归约）在 [`crate::collective`]
//! 中以点对点原语组合而成。
//!
//! # 消息匹配
//!
//! 消息按 `(源全局槽位, 通信域上下文)` 入队。同一对 rank 之间的消息
//! 先进先出；不同通信域（如全局域与侧别子域）通过上下文标识区分，
//! 互不串扰。集合操作在所有成员上以相同程序序调用，因此 FIFO 匹配
//! 即可保证正确配对。
//!
//! # 阻塞语义
//!
//! `recv_bytes` 阻塞调用线程直到消息到达。参与方缺失导致的悬挂是
//! 致命条件，由上层在构造拓扑时做参与性预检查，而不是静默等待。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use af_foundation::{TransferError, TransferResult};

use crate::collective::Collective;

/// 单个 rank 的信箱
#[derive(Default)]
struct Mailbox {
    /// (源全局槽位, 上下文) -> 消息队列
    queues: Mutex<HashMap<(usize, u64), VecDeque<Vec<u8>>>>,
    arrived: Condvar,
}

/// 全体 rank 共享的信箱组
struct Shared {
    boxes: Vec<Mailbox>,
}

/// 进程内通信域
///
/// 持有共享信箱组的引用、本域成员的全局槽位表和本 rank 在成员表中的
/// 下标。子域通过 [`MailboxComm::split`] 从父域派生，成员表按全局
/// 槽位升序排列，保证各成员推导出一致的 rank 编号。
pub struct MailboxComm {
    shared: Arc<Shared>,
    /// 通信域上下文标识，区分同一对 rank 上的不同域
    context: u64,
    /// 本域成员的全局槽位（升序）
    members: Vec<usize>,
    /// 本 rank 在 members 中的下标
    me: usize,
    /// 本域已执行的分裂次数，混入子域上下文。
    /// 集合操作按相同程序序调用，各成员计数一致。
    split_seq: AtomicU64,
}

impl Clone for MailboxComm {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            context: self.context,
            members: self.members.clone(),
            me: self.me,
            split_seq: AtomicU64::new(self.split_seq.load(Ordering::Relaxed)),
        }
    }
}

impl MailboxComm {
    /// 创建含 `n` 个 rank 的世界域，返回每个 rank 的端点
    ///
    /// 端点按 rank 顺序返回，通常随后被移交给各自的工作线程。
    pub fn universe(n: usize) -> Vec<MailboxComm> {
        assert!(n > 0, "通信域至少需要 1 个 rank");
        let shared = Arc::new(Shared {
            boxes: (0..n).map(|_| Mailbox::default()).collect(),
        });
        (0..n)
            .map(|r| MailboxComm {
                shared: Arc::clone(&shared),
                context: 0,
                members: (0..n).collect(),
                me: r,
                split_seq: AtomicU64::new(0),
            })
            .collect()
    }

    /// 本 rank 的全局槽位
    pub fn global_slot(&self) -> usize {
        self.members[self.me]
    }

    /// 按颜色分裂出子域（集合操作）
    ///
    /// 同色 rank 进入同一子域，子域内 rank 编号按父域 rank 升序。
    /// 所有成员必须以相同程序序调用。同一父域的先后两次分裂即使
    /// 颜色相同，子域上下文也不同。
    pub fn split(&self, color: u64) -> TransferResult<MailboxComm> {
        let seq = self.split_seq.fetch_add(1, Ordering::Relaxed);
        // rank 0 收齐所有颜色后广播，成员本地推导分组
        let n = self.members.len();
        let colors: Vec<u64> = if self.me == 0 {
            let mut colors = vec![0u64; n];
            colors[0] = color;
            for src in 1..n {
                let bytes = self.recv_bytes(src)?;
                colors[src] = u64::from_le_bytes(bytes.try_into().map_err(|_| {
                    TransferError::communication(self.global_slot(), "split", "颜色消息长度异常")
                })?);
            }
            for dst in 1..n {
                let payload: Vec<u8> = colors.iter().flat_map(|c| c.to_le_bytes()).collect();
                self.send_bytes(dst, payload)?;
            }
            colors
        } else {
            self.send_bytes(0, color.to_le_bytes().to_vec())?;
            let bytes = self.recv_bytes(0)?;
            bytes
                .chunks_exact(8)
                .map(|c| u64::from_le_bytes(c.try_into().unwrap_or_default()))
                .collect()
        };

        let members: Vec<usize> = (0..n)
            .filter(|&r| colors[r] == color)
            .map(|r| self.members[r])
            .collect();
        let me = members
            .iter()
            .position(|&g| g == self.global_slot())
            .ok_or_else(|| {
                TransferError::communication(self.global_slot(), "split", "本 rank 不在分组结果中")
            })?;

        let context = self
            .context
            .wrapping_mul(31)
            .wrapping_add(seq)
            .wrapping_mul(31)
            .wrapping_add(color)
            .wrapping_add(1);
        Ok(MailboxComm {
            shared: Arc::clone(&self.shared),
            context,
            members,
            me,
            split_seq: AtomicU64::new(0),
        })
    }
}

impl Collective for MailboxComm {
    fn rank(&self) -> usize {
        self.me
    }

    fn size(&self) -> usize {
        self.members.len()
    }

    fn send_bytes(&self, dest: usize, payload: Vec<u8>) -> TransferResult<()> {
        let slot = *self.members.get(dest).ok_or_else(|| {
            TransferError::communication(
                self.global_slot(),
                "send",
                format!("目标 rank {} 超出通信域大小 {}", dest, self.members.len()),
            )
        })?;
        let mailbox = &self.shared.boxes[slot];
        let key = (self.global_slot(), self.context);
        let mut queues = mailbox.queues.lock();
        queues.entry(key).or_default().push_back(payload);
        mailbox.arrived.notify_all();
        Ok(())
    }

    fn recv_bytes(&self, src: usize) -> TransferResult<Vec<u8>> {
        let slot = *self.members.get(src).ok_or_else(|| {
            TransferError::communication(
                self.global_slot(),
                "recv",
                format!("源 rank {} 超出通信域大小 {}", src, self.members.len()),
            )
        })?;
        let mailbox = &self.shared.boxes[self.global_slot()];
        let key = (slot, self.context);
        let mut queues = mailbox.queues.lock();
        loop {
            if let Some(queue) = queues.get_mut(&key) {
                if let Some(payload) = queue.pop_front() {
                    return Ok(payload);
                }
            }
            mailbox.arrived.wait(&mut queues);
        }
    }
}

/// 以 `n` 个线程各持一个世界域端点运行 `f`，返回各 rank 的结果
///
/// 测试与应用层的多 rank 驱动入口。任一 rank panic 会传播到调用方。
pub fn spawn_universe<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(MailboxComm) -> T + Send + Sync,
{
    let endpoints = MailboxComm::universe(n);
    let f = &f;
    std::thread::scope(|scope| {
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|comm| scope.spawn(move || f(comm)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank 线程 panic"))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_universe_ranks() {
        let comms = MailboxComm::universe(3);
        for (i, c) in comms.iter().enumerate() {
            assert_eq!(c.rank(), i);
            assert_eq!(c.size(), 3);
        }
    }

    #[test]
    fn test_point_to_point_fifo() {
        spawn_universe(2, |comm| {
            if comm.rank() == 0 {
                comm.send_bytes(1, vec![1]).unwrap();
                comm.send_bytes(1, vec![2]).unwrap();
            } else {
                assert_eq!(comm.recv_bytes(0).unwrap(), vec![1]);
                assert_eq!(comm.recv_bytes(0).unwrap(), vec![2]);
            }
        });
    }

    #[test]
    fn test_split_disjoint_groups() {
        let sizes = spawn_universe(5, |comm| {
            let color = if comm.rank() < 2 { 55 } else { 66 };
            let sub = comm.split(color).unwrap();
            // 子域内再做一次点对点，确认编号一致
            if sub.rank() == 0 {
                for src in 1..sub.size() {
                    let got = sub.recv_bytes(src).unwrap();
                    assert_eq!(got, vec![src as u8]);
                }
            } else {
                sub.send_bytes(0, vec![sub.rank() as u8]).unwrap();
            }
            (color, sub.size())
        });
        assert_eq!(sizes[0], (55, 2));
        assert_eq!(sizes[1], (55, 2));
        assert_eq!(sizes[2], (66, 3));
        assert_eq!(sizes[4], (66, 3));
    }

    #[test]
    fn test_parent_and_child_do_not_cross_talk() {
        spawn_universe(2, |comm| {
            let sub = comm.split(7).unwrap();
            // 同一对 rank 上，父域与子域的消息互不干扰
            if comm.rank() == 0 {
                comm.send_bytes(1, vec![10]).unwrap();
                sub.send_bytes(1, vec![20]).unwrap();
            } else {
                // 先取子域消息，再取父域消息，与发送顺序无关
                assert_eq!(sub.recv_bytes(0).unwrap(), vec![20]);
                assert_eq!(comm.recv_bytes(0).unwrap(), vec![10]);
            }
        });
    }

    #[test]
    fn test_repeated_same_color_splits_do_not_cross_talk() {
        spawn_universe(2, |comm| {
            let first = comm.split(7).unwrap();
            let second = comm.split(7).unwrap();
            // 同色的先后两次分裂产生独立的子域，消息互不干扰
            if comm.rank() == 0 {
                second.send_bytes(1, vec![2]).unwrap();
                first.send_bytes(1, vec![1]).unwrap();
            } else {
                assert_eq!(first.recv_bytes(0).unwrap(), vec![1]);
                assert_eq!(second.recv_bytes(0).unwrap(), vec![2]);
            }
        });
    }

    #[test]
    fn test_send_out_of_range() {
        let comms = MailboxComm::universe(1);
        let err = comms[0].send_bytes(3, vec![]).unwrap_err();
        assert!(err.to_string().contains("通信错误"));
    }
}
