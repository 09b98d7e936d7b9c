//! A star shaped process group over tcp: rank 0 accepts every other rank and
//! relays all collectives.

use std::time::Duration;

use comms::{
    FrameReceiver, FrameSender,
    msg::{Command, Msg},
};
use log::{debug, info};
use tokio::{
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::{Instant, sleep},
};

use crate::{DistErr, Result};

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// A framed connection with its own receive buffer.
struct Link {
    rx: FrameReceiver<OwnedReadHalf>,
    tx: FrameSender<OwnedWriteHalf>,
    buf: Vec<u32>,
}

impl Link {
    fn new(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let (rx, tx) = stream.into_split();
        let (rx, tx) = comms::framed(rx, tx);

        Ok(Self {
            rx,
            tx,
            buf: Vec::new(),
        })
    }

    async fn send(&mut self, msg: &Msg<'_>) -> Result<()> {
        self.tx.send(msg).await?;
        Ok(())
    }

    async fn expect_control(&mut self, op: &'static str, expected: Command) -> Result<()> {
        let msg: Msg = self.rx.recv_into(&mut self.buf).await?;
        match msg {
            Msg::Control(cmd) if cmd == expected => Ok(()),
            Msg::Err(detail) => Err(DistErr::Remote(detail.into_owned())),
            msg => Err(DistErr::UnexpectedMessage {
                op,
                got: msg.kind(),
            }),
        }
    }

    /// Receives a data message and hands its payload to `f`.
    async fn recv_data<T>(&mut self, op: &'static str, f: impl FnOnce(&[f32]) -> T) -> Result<T> {
        let msg: Msg = self.rx.recv_into(&mut self.buf).await?;
        match msg {
            Msg::Data(nums) => Ok(f(nums)),
            Msg::Err(detail) => Err(DistErr::Remote(detail.into_owned())),
            msg => Err(DistErr::UnexpectedMessage {
                op,
                got: msg.kind(),
            }),
        }
    }

    async fn recv_into_slice(&mut self, op: &'static str, buf: &mut [f32]) -> Result<()> {
        self.recv_data(op, |nums| {
            if nums.len() != buf.len() {
                return Err(DistErr::SizeMismatch {
                    what: op,
                    got: nums.len(),
                    expected: buf.len(),
                });
            }

            buf.copy_from_slice(nums);
            Ok(())
        })
        .await?
    }
}

/// One participant's end of the tcp group.
pub(crate) enum TcpComm {
    /// Rank 0, holds a link to every other rank ordered by rank.
    Coordinator { peers: Vec<Link> },
    Peer { link: Link },
}

impl TcpComm {
    /// Binds `addr` and waits for the other `world_size - 1` ranks.
    pub(crate) async fn listen(addr: &str, world_size: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(world_size = world_size; "coordinator listening at {addr}");

        let mut slots: Vec<Option<Link>> = (1..world_size).map(|_| None).collect();

        for _ in 1..world_size {
            let (stream, peer_addr) = listener.accept().await?;
            let mut link = Link::new(stream)?;

            let hello: Msg = link.rx.recv_into(&mut link.buf).await?;
            let Msg::Control(Command::Hello {
                rank,
                world_size: peer_world_size,
            }) = hello
            else {
                return Err(DistErr::Handshake(format!(
                    "{peer_addr} did not introduce itself"
                )));
            };

            if peer_world_size != world_size {
                return Err(DistErr::Handshake(format!(
                    "rank {rank} expects a world size of {peer_world_size}, the group has {world_size}"
                )));
            }

            let slot = rank
                .checked_sub(1)
                .and_then(|i| slots.get_mut(i))
                .ok_or_else(|| DistErr::Handshake(format!("rank {rank} is out of range")))?;

            if slot.is_some() {
                return Err(DistErr::Handshake(format!("rank {rank} joined twice")));
            }

            debug!(rank = rank; "peer joined from {peer_addr}");
            *slot = Some(link);
        }

        let mut peers: Vec<Link> = slots.into_iter().flatten().collect();
        for link in peers.iter_mut() {
            link.send(&Msg::Control(Command::Ready)).await?;
        }

        Ok(Self::Coordinator { peers })
    }

    /// Connects to the coordinator at `addr`, retrying until `timeout` elapses.
    pub(crate) async fn connect(
        addr: &str,
        rank: usize,
        world_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let deadline = Instant::now() + timeout;

        let stream = loop {
            match TcpStream::connect(addr).await {
                Ok(stream) => break stream,
                Err(e) if Instant::now() < deadline => {
                    debug!(rank = rank; "coordinator not reachable yet: {e}");
                    sleep(RETRY_INTERVAL).await;
                }
                Err(source) => {
                    return Err(DistErr::Connect {
                        addr: addr.to_string(),
                        source,
                    });
                }
            }
        };

        let mut link = Link::new(stream)?;
        link.send(&Msg::Control(Command::Hello { rank, world_size }))
            .await?;
        link.expect_control("handshake", Command::Ready).await?;

        Ok(Self::Peer { link })
    }

    pub(crate) async fn barrier(&mut self) -> Result<()> {
        const OP: &str = "barrier";

        match self {
            TcpComm::Coordinator { peers } => {
                for link in peers.iter_mut() {
                    link.expect_control(OP, Command::Barrier).await?;
                }
                for link in peers.iter_mut() {
                    link.send(&Msg::Control(Command::Barrier)).await?;
                }
            }
            TcpComm::Peer { link } => {
                link.send(&Msg::Control(Command::Barrier)).await?;
                link.expect_control(OP, Command::Barrier).await?;
            }
        }

        Ok(())
    }

    pub(crate) async fn all_reduce(&mut self, buf: &mut [f32]) -> Result<()> {
        const OP: &str = "all reduce buffer";

        match self {
            TcpComm::Coordinator { peers } => {
                // Summed in rank order, so the result is the same as the local backend's.
                let mut acc = vec![0.0; buf.len()];
                acc.iter_mut().zip(buf.iter()).for_each(|(a, b)| *a += b);

                // Keep draining on mismatch so every stream stays in sync.
                let mut mismatch = None;
                for link in peers.iter_mut() {
                    let got = link
                        .recv_data(OP, |nums| {
                            if nums.len() == acc.len() {
                                acc.iter_mut().zip(nums).for_each(|(a, n)| *a += n);
                            }
                            nums.len()
                        })
                        .await?;

                    if got != acc.len() && mismatch.is_none() {
                        mismatch = Some(got);
                    }
                }

                if let Some(got) = mismatch {
                    let err = DistErr::SizeMismatch {
                        what: OP,
                        got,
                        expected: acc.len(),
                    };
                    let detail = err.to_string();
                    for link in peers.iter_mut() {
                        link.send(&Msg::Err(detail.as_str().into())).await?;
                    }
                    return Err(err);
                }

                for link in peers.iter_mut() {
                    link.send(&Msg::Data(&acc)).await?;
                }
                buf.copy_from_slice(&acc);
            }
            TcpComm::Peer { link } => {
                link.send(&Msg::Data(buf)).await?;
                link.recv_into_slice(OP, buf).await?;
            }
        }

        Ok(())
    }

    pub(crate) async fn broadcast(&mut self, buf: &mut [f32], rank: usize, src: usize) -> Result<()> {
        const OP: &str = "broadcast buffer";

        match self {
            TcpComm::Coordinator { peers } => {
                if src != 0 {
                    let n_peers = peers.len();
                    let link = peers.get_mut(src - 1).ok_or(DistErr::SizeMismatch {
                        what: "broadcast source",
                        got: src,
                        expected: n_peers,
                    })?;
                    link.recv_into_slice(OP, buf).await?;
                }

                for link in peers.iter_mut() {
                    link.send(&Msg::Data(buf)).await?;
                }
            }
            TcpComm::Peer { link } => {
                if rank == src {
                    link.send(&Msg::Data(buf)).await?;
                }
                link.recv_into_slice(OP, buf).await?;
            }
        }

        Ok(())
    }
}
