//! Immutable macro cache snapshot

use crate::entity::HostMacros;
use crate::{GLOBAL_SCOPE, HostId};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// One generation of the macro cache
///
/// Maps host ids to shared [`HostMacros`]; global macros live under
/// [`GLOBAL_SCOPE`]. Published snapshots are only ever read. A new
/// generation is built from a private copy that re-references every host.
#[derive(Debug, Clone, Default)]
pub struct Manager {
    hosts: FxHashMap<HostId, Arc<HostMacros>>,
}

impl Manager {
    /// Creates an empty snapshot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty snapshot with room for `capacity` hosts
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            hosts: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Macros and templates of one host
    #[must_use]
    pub fn host(&self, id: HostId) -> Option<&Arc<HostMacros>> {
        self.hosts.get(&id)
    }

    /// Global macros, if any are defined
    #[must_use]
    pub fn globals(&self) -> Option<&Arc<HostMacros>> {
        self.host(GLOBAL_SCOPE)
    }

    /// All cached hosts, in no particular order
    pub fn hosts(&self) -> impl Iterator<Item = &Arc<HostMacros>> {
        self.hosts.values()
    }

    /// Number of cached hosts, including the global scope
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// True when nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Total number of macros over all hosts
    #[must_use]
    pub fn macro_count(&self) -> usize {
        self.hosts.values().map(|host| host.macros().len()).sum()
    }

    pub(crate) fn hosts_mut(&mut self) -> &mut FxHashMap<HostId, Arc<HostMacros>> {
        &mut self.hosts
    }
}
