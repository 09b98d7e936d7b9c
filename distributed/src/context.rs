use std::{future::Future, sync::Arc, time::Duration};

use log::debug;

use crate::{
    Backend, Device, Result,
    local::{LocalComm, LocalGroup},
    tcp::TcpComm,
};

/// Where a participant sits in the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub local_rank: usize,
    pub node_rank: usize,
    pub nproc_per_node: usize,
    pub nnodes: usize,
}

impl Placement {
    pub fn single() -> Self {
        Self {
            local_rank: 0,
            node_rank: 0,
            nproc_per_node: 1,
            nnodes: 1,
        }
    }

    pub fn rank(&self) -> usize {
        self.node_rank * self.nproc_per_node + self.local_rank
    }

    pub fn world_size(&self) -> usize {
        self.nnodes * self.nproc_per_node
    }
}

enum Comm {
    Serial,
    Local(LocalComm),
    Tcp(TcpComm),
}

/// A participant's view of the process group.
///
/// Every participant must issue the same sequence of collectives.
pub struct Context {
    backend: Backend,
    placement: Placement,
    rank: usize,
    world_size: usize,
    comm: Comm,
}

impl Context {
    /// A group of one.
    pub fn serial() -> Self {
        Self {
            backend: Backend::Serial,
            placement: Placement::single(),
            rank: 0,
            world_size: 1,
            comm: Comm::Serial,
        }
    }

    /// Joins an in process group, `group.world_size()` must match the placement.
    pub fn local(group: Arc<LocalGroup>, local_rank: usize) -> Self {
        let world_size = group.world_size();
        let placement = Placement {
            local_rank,
            node_rank: 0,
            nproc_per_node: world_size,
            nnodes: 1,
        };

        Self {
            backend: Backend::Local,
            placement,
            rank: local_rank,
            world_size,
            comm: Comm::Local(LocalComm::new(local_rank, group)),
        }
    }

    /// Joins a tcp group, rank 0 listens at `master_addr` and everyone else connects to it.
    ///
    /// # Arguments
    /// * `placement` - Where this participant sits.
    /// * `rank` - The global rank.
    /// * `world_size` - The total amount of participants.
    /// * `master_addr` - The coordinator's `host:port`.
    /// * `timeout` - How long to keep retrying the connection.
    ///
    /// # Returns
    /// The context once the whole group joined or an error if the handshake failed.
    pub async fn tcp(
        placement: Placement,
        rank: usize,
        world_size: usize,
        master_addr: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let comm = if world_size == 1 {
            Comm::Serial
        } else if rank == 0 {
            Comm::Tcp(TcpComm::listen(master_addr, world_size).await?)
        } else {
            Comm::Tcp(TcpComm::connect(master_addr, rank, world_size, timeout).await?)
        };

        debug!(rank = rank, world_size = world_size; "joined the tcp group");
        Ok(Self {
            backend: Backend::Tcp,
            placement,
            rank,
            world_size,
            comm,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    pub fn local_rank(&self) -> usize {
        self.placement.local_rank
    }

    pub fn node_rank(&self) -> usize {
        self.placement.node_rank
    }

    pub fn nnodes(&self) -> usize {
        self.placement.nnodes
    }

    pub fn nproc_per_node(&self) -> usize {
        self.placement.nproc_per_node
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn device(&self) -> Device {
        Device::Cpu
    }

    pub fn is_leader(&self) -> bool {
        self.rank == 0
    }

    /// Blocks until every participant arrives.
    pub async fn barrier(&mut self) -> Result<()> {
        match &mut self.comm {
            Comm::Serial => Ok(()),
            Comm::Local(comm) => comm.barrier().await,
            Comm::Tcp(comm) => comm.barrier().await,
        }
    }

    /// Sums `buf` element-wise across participants, in rank order.
    pub async fn all_reduce(&mut self, buf: &mut [f32]) -> Result<()> {
        match &mut self.comm {
            Comm::Serial => Ok(()),
            Comm::Local(comm) => comm.all_reduce(buf).await,
            Comm::Tcp(comm) => comm.all_reduce(buf).await,
        }
    }

    pub async fn all_reduce_scalar(&mut self, value: f32) -> Result<f32> {
        let mut buf = [value];
        self.all_reduce(&mut buf).await?;
        Ok(buf[0])
    }

    /// Overwrites every participant's `buf` with the one of rank `src`.
    pub async fn broadcast(&mut self, buf: &mut [f32], src: usize) -> Result<()> {
        let rank = self.rank;

        match &mut self.comm {
            Comm::Serial => Ok(()),
            Comm::Local(comm) => comm.broadcast(buf, src).await,
            Comm::Tcp(comm) => comm.broadcast(buf, rank, src).await,
        }
    }

    /// Runs `f` on rank 0 only, the others wait until it is done.
    ///
    /// Ranks other than 0 wait at a barrier before `f` runs and rank 0 joins
    /// them after it, so whatever `f` leaves on disk is visible to everyone
    /// once this returns.
    ///
    /// # Returns
    /// `f`'s output on rank 0 and `None` anywhere else.
    pub async fn run_once<F, Fut, T>(&mut self, f: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.is_leader() {
            self.barrier().await?;
            return Ok(None);
        }

        let out = f().await;
        self.barrier().await?;
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DistErr;

    #[tokio::test]
    async fn serial_collectives_are_the_identity() {
        let mut ctx = Context::serial();
        let mut buf = [1.0, 2.0];

        ctx.barrier().await.unwrap();
        ctx.all_reduce(&mut buf).await.unwrap();
        ctx.broadcast(&mut buf, 0).await.unwrap();

        assert_eq!(buf, [1.0, 2.0]);
        assert_eq!((ctx.rank(), ctx.world_size()), (0, 1));
        assert!(ctx.is_leader());
    }

    #[test]
    fn placement_rank_arithmetic() {
        let placement = Placement {
            local_rank: 1,
            node_rank: 2,
            nproc_per_node: 4,
            nnodes: 3,
        };
        assert_eq!(placement.rank(), 9);
        assert_eq!(placement.world_size(), 12);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn local_group_broadcasts_and_reduces() {
        let group = LocalGroup::new(3);
        let tasks: Vec<_> = (0..3)
            .map(|r| {
                let mut ctx = Context::local(Arc::clone(&group), r);
                tokio::spawn(async move {
                    let mut params = [r as f32; 2];
                    ctx.broadcast(&mut params, 2).await.unwrap();

                    let mut grad = [1.0, r as f32];
                    ctx.all_reduce(&mut grad).await.unwrap();
                    (params, grad)
                })
            })
            .collect();

        for res in futures::future::join_all(tasks).await {
            let (params, grad) = res.unwrap();
            assert_eq!(params, [2.0, 2.0]);
            assert_eq!(grad, [3.0, 3.0]);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn local_size_mismatch_fails_every_rank() {
        let group = LocalGroup::new(2);
        let tasks: Vec<_> = (0..2)
            .map(|r| {
                let mut ctx = Context::local(Arc::clone(&group), r);
                tokio::spawn(async move {
                    let mut buf = vec![0.0; r + 1];
                    ctx.all_reduce(&mut buf).await
                })
            })
            .collect();

        for res in futures::future::join_all(tasks).await {
            assert!(res.unwrap().is_err());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn a_participant_leaving_releases_the_others() {
        let group = LocalGroup::new(3);
        let waiting: Vec<_> = (1..3)
            .map(|r| {
                let mut ctx = Context::local(Arc::clone(&group), r);
                tokio::spawn(async move {
                    let mut grad = [1.0];
                    let reduced = ctx.all_reduce(&mut grad).await;
                    let synced = ctx.run_once(|| async {}).await;
                    (reduced, synced)
                })
            })
            .collect();

        // Rank 0 bails out before its first collective.
        drop(Context::local(Arc::clone(&group), 0));

        let results = tokio::time::timeout(
            Duration::from_secs(10),
            futures::future::join_all(waiting),
        )
        .await
        .expect("the group stayed blocked");

        for res in results {
            let (reduced, synced) = res.unwrap();
            assert!(matches!(reduced, Err(DistErr::PeerLeft)));
            assert!(matches!(synced, Err(DistErr::PeerLeft)));
        }
        assert!(group.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn finished_groups_close_without_failing_anyone() {
        let group = LocalGroup::new(2);
        let tasks: Vec<_> = (0..2)
            .map(|r| {
                let mut ctx = Context::local(Arc::clone(&group), r);
                tokio::spawn(async move {
                    let mut sum = 0.0;
                    for _ in 0..50 {
                        sum = ctx.all_reduce_scalar(1.0).await?;
                    }
                    Ok::<_, DistErr>(sum)
                })
            })
            .collect();

        for res in futures::future::join_all(tasks).await {
            assert_eq!(res.unwrap().unwrap(), 2.0);
        }
        assert!(group.is_closed());
    }

    #[tokio::test]
    async fn local_broadcast_from_an_unknown_rank_fails() {
        let mut ctx = Context::local(LocalGroup::new(1), 0);
        let mut buf = [1.0, 2.0];

        let res = ctx.broadcast(&mut buf, 3).await;
        assert!(matches!(
            res,
            Err(DistErr::SizeMismatch {
                what: "broadcast source",
                got: 3,
                expected: 1,
            })
        ));
        assert_eq!(buf, [1.0, 2.0]);
    }
}
