//! The shared state every connection, handler, and background task reads
//! from: one instance, wrapped in `Arc`, created once in `main`.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::mask::AccessMask;
use crate::mutation::MutationWrapper;
use crate::replication::ReplicationSupervisor;
use crate::script::{ScriptEngine, ScriptStash};
use crate::storage::StorageEngine;
use crate::stripes::LockStripes;
use crate::ulog::UpdateLog;

pub struct ServerContext {
    pub config: Config,
    pub mutation: Arc<MutationWrapper>,
    pub storage: Arc<dyn StorageEngine>,
    pub stripes: Arc<LockStripes>,
    pub ulog: Arc<UpdateLog>,
    pub script: Arc<dyn ScriptEngine>,
    pub stash: Arc<ScriptStash>,
    pub mask: AccessMask,
    pub replication: Arc<ReplicationSupervisor>,
    pub started_at: Instant,
}
