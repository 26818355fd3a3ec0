//! Team membership as seen by the locality subsystem
//!
//! The runtime owns team membership and transport. This crate only needs a
//! team's id, its size, the calling unit's rank, and one blocking collective
//! used by accelerator discovery.

mod thread;

pub use thread::ThreadTeam;

use crate::error::Result;

/// Team id
pub type TeamId = u32;

/// The set of units a locality tree is computed for
pub trait Team {
    /// Team id stamped onto every domain
    fn id(&self) -> TeamId;

    /// Number of units in the team
    fn size(&self) -> usize;

    /// Rank of the calling unit
    fn rank(&self) -> usize;

    /// Blocking all-gather: every unit contributes `local` and receives the
    /// contributions of all units, ordered by rank.
    fn all_gather(&self, local: &[u8]) -> Result<Vec<Vec<u8>>>;
}

/// Team whose collectives never leave the calling process
///
/// Every unit is local, so a gather returns just the caller's contribution.
/// Used when the whole team description is already known, e.g. when loaded
/// from a layout file.
#[derive(Debug, Clone, Copy)]
pub struct SoloTeam {
    id: TeamId,
    size: usize,
}

impl SoloTeam {
    /// Team `id` with `size` units, observed from rank 0
    pub fn new(id: TeamId, size: usize) -> Self {
        Self { id, size }
    }
}

impl Team for SoloTeam {
    fn id(&self) -> TeamId {
        self.id
    }

    fn size(&self) -> usize {
        self.size
    }

    fn rank(&self) -> usize {
        0
    }

    fn all_gather(&self, local: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(vec![local.to_vec()])
    }
}
