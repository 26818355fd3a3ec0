//! In-process team backed by crossbeam channels
//!
//! Each member is meant to be moved onto its own thread. Collectives are
//! rooted at rank 0: every member sends its payload to the root, the root
//! orders the payloads by rank and sends the full set back to everyone.

use super::{Team, TeamId};
use crate::error::{LocalityError, Result};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Default time a member waits for a collective to complete
pub const DEFAULT_COLLECTIVE_TIMEOUT: Duration = Duration::from_secs(30);

type Contribution = (usize, Vec<u8>);

/// One member of an in-process team
pub struct ThreadTeam {
    id: TeamId,
    rank: usize,
    size: usize,
    timeout: Duration,
    to_root: Sender<Contribution>,
    from_root: Receiver<Vec<Vec<u8>>>,
    /// Only present on rank 0
    root: Option<RootChannels>,
}

struct RootChannels {
    gather: Receiver<Contribution>,
    broadcast: Vec<Sender<Vec<Vec<u8>>>>,
}

impl ThreadTeam {
    /// Create all `size` members of team `id`, indexed by rank
    pub fn create(id: TeamId, size: usize) -> Vec<ThreadTeam> {
        Self::create_with_timeout(id, size, DEFAULT_COLLECTIVE_TIMEOUT)
    }

    /// Create members that give up on a collective after `timeout`
    pub fn create_with_timeout(id: TeamId, size: usize, timeout: Duration) -> Vec<ThreadTeam> {
        let (gather_tx, gather_rx) = unbounded::<Contribution>();
        let (broadcast, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();

        let mut root = Some(RootChannels {
            gather: gather_rx,
            broadcast,
        });

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, from_root)| ThreadTeam {
                id,
                rank,
                size,
                timeout,
                to_root: gather_tx.clone(),
                from_root,
                root: if rank == 0 { root.take() } else { None },
            })
            .collect()
    }

    fn recv<T>(&self, rx: &Receiver<T>) -> Result<T> {
        rx.recv_timeout(self.timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => LocalityError::Collective(format!(
                "rank {} timed out after {:?}",
                self.rank, self.timeout
            )),
            RecvTimeoutError::Disconnected => {
                LocalityError::Collective(format!("rank {}: team member disconnected", self.rank))
            }
        })
    }
}

impl Team for ThreadTeam {
    fn id(&self) -> TeamId {
        self.id
    }

    fn size(&self) -> usize {
        self.size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn all_gather(&self, local: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.to_root
            .send((self.rank, local.to_vec()))
            .map_err(|_| LocalityError::Collective("root of team has gone away".into()))?;

        if let Some(root) = &self.root {
            let mut slots: Vec<Option<Vec<u8>>> = vec![None; self.size];
            for _ in 0..self.size {
                let (rank, payload) = self.recv(&root.gather)?;
                if let Some(slot) = slots.get_mut(rank) {
                    *slot = Some(payload);
                }
            }
            let gathered: Vec<Vec<u8>> = slots.into_iter().map(|s| s.unwrap_or_default()).collect();

            for (rank, tx) in root.broadcast.iter().enumerate() {
                if tx.send(gathered.clone()).is_err() {
                    tracing::debug!(rank, "team member left before broadcast");
                }
            }
        }

        self.recv(&self.from_root)
    }
}
