//! Replication: a follower task tailing a configured master's update log,
//! and the master-side streaming handler the `repl` command drives
//! (spec.md §2.10, §4.8).

pub mod follower;
pub mod state;

use tokio::sync::watch;

use crate::config::MasterTarget;

/// Owns the follower's current target so `setmst` can retarget it without
/// restarting the follower task (spec.md §4.6: "mutate the follower's
/// target atomically; the follower observes and reconnects").
pub struct ReplicationSupervisor {
    target_tx: watch::Sender<Option<MasterTarget>>,
}

impl ReplicationSupervisor {
    pub fn new(initial: Option<MasterTarget>) -> (Self, watch::Receiver<Option<MasterTarget>>) {
        let (target_tx, target_rx) = watch::channel(initial);
        (Self { target_tx }, target_rx)
    }

    pub fn current(&self) -> Option<MasterTarget> {
        self.target_tx.borrow().clone()
    }

    /// Atomically replaces the follower's target. `setmst` with an empty
    /// host stops replication.
    pub fn set_target(&self, target: Option<MasterTarget>) {
        let _ = self.target_tx.send(target);
    }
}
