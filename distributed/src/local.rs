use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use tokio::{
    sync::{Barrier, watch},
    task,
};

use crate::{DistErr, Result};

/// State shared by the participants of an in process group.
///
/// Each rank owns one slot. A collective writes the slots, waits for every
/// rank, reads them and waits again so the slots can be reused right away.
///
/// Once a participant drops its handle the group is closed: pending and
/// future collectives fail with `DistErr::PeerLeft` instead of waiting for
/// a rank that will never arrive.
#[derive(Debug)]
pub struct LocalGroup {
    barrier: Barrier,
    slots: Vec<Mutex<Vec<f32>>>,
    closed: watch::Sender<bool>,
}

impl LocalGroup {
    /// Creates a new `LocalGroup`.
    ///
    /// # Arguments
    /// * `world_size` - The amount of participants.
    ///
    /// # Returns
    /// The group, shared by every participant.
    pub fn new(world_size: usize) -> Arc<Self> {
        let (closed, _) = watch::channel(false);
        Arc::new(Self {
            barrier: Barrier::new(world_size),
            slots: (0..world_size).map(|_| Mutex::new(Vec::new())).collect(),
            closed,
        })
    }

    pub fn world_size(&self) -> usize {
        self.slots.len()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// One participant's handle on a `LocalGroup`, dropping it closes the group.
#[derive(Debug)]
pub(crate) struct LocalComm {
    rank: usize,
    group: Arc<LocalGroup>,
}

impl LocalComm {
    pub(crate) fn new(rank: usize, group: Arc<LocalGroup>) -> Self {
        Self { rank, group }
    }

    pub(crate) async fn barrier(&self) -> Result<()> {
        let mut closed = self.group.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(DistErr::PeerLeft);
        }

        // A released barrier wins over a participant leaving right after it.
        tokio::select! {
            biased;
            _ = task::unconstrained(self.group.barrier.wait()) => Ok(()),
            _ = closed.wait_for(|left| *left) => Err(DistErr::PeerLeft),
        }
    }

    pub(crate) async fn all_reduce(&self, buf: &mut [f32]) -> Result<()> {
        self.write_slot(buf);
        self.barrier().await?;

        // Every rank sees the same slots, so every rank agrees on the outcome.
        let ret = match self.check_slots(buf.len()) {
            Ok(()) => {
                buf.fill(0.0);
                for slot in &self.group.slots {
                    let slot = slot.lock();
                    buf.iter_mut().zip(slot.iter()).for_each(|(b, s)| *b += s);
                }
                Ok(())
            }
            Err(e) => Err(e),
        };

        self.barrier().await?;
        ret
    }

    pub(crate) async fn broadcast(&self, buf: &mut [f32], src: usize) -> Result<()> {
        let source = self.group.slots.get(src).ok_or(DistErr::SizeMismatch {
            what: "broadcast source",
            got: src,
            expected: self.group.world_size(),
        })?;

        if self.rank == src {
            self.write_slot(buf);
        }
        self.barrier().await?;

        let ret = if self.rank == src {
            Ok(())
        } else {
            let slot = source.lock();
            if slot.len() == buf.len() {
                buf.copy_from_slice(&slot);
                Ok(())
            } else {
                Err(DistErr::SizeMismatch {
                    what: "broadcast buffer",
                    got: slot.len(),
                    expected: buf.len(),
                })
            }
        };

        self.barrier().await?;
        ret
    }

    fn write_slot(&self, buf: &[f32]) {
        let mut slot = self.group.slots[self.rank].lock();
        slot.clear();
        slot.extend_from_slice(buf);
    }

    fn check_slots(&self, expected: usize) -> Result<()> {
        for slot in &self.group.slots {
            let got = slot.lock().len();
            if got != expected {
                return Err(DistErr::SizeMismatch {
                    what: "all reduce buffer",
                    got,
                    expected,
                });
            }
        }

        Ok(())
    }
}

impl Drop for LocalComm {
    fn drop(&mut self) {
        if !self.group.closed.send_replace(true) {
            debug!(rank = self.rank; "left the local group");
        }
    }
}
