//! Incremental snapshot construction from change batches
//!
//! A sync cycle runs in three phases:
//! 1. Host and global macro rows are turned into new [`UserMacro`]s and
//!    grouped per scope, together with the ids they supersede.
//! 2. Every touched scope is rebuilt once: surviving macros of the old host
//!    are shared, new ones appended, and the list re-sorted.
//! 3. Template links are added and removed.
//!
//! Hosts are copied only when another snapshot still references them, so
//! untouched hosts stay pointer-identical between generations.

use crate::change::{Change, ChangeSet, LinkChange, MacroBatch, MacroRow};
use crate::entity::{HostMacros, UserMacro};
use crate::error::SyncAnomaly;
use crate::manager::Manager;
use crate::{GLOBAL_SCOPE, HostId, MacroId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info_span, warn};
use um_intern::StringPool;
use um_syntax::parse_user_macro;

/// Default number of host slots reserved for a fresh snapshot
pub const DEFAULT_HOST_CAPACITY: usize = 100;

/// Counters collected while applying one change set
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncStats {
    /// Macros added
    pub added: usize,
    /// Macros updated
    pub updated: usize,
    /// Macros removed
    pub removed: usize,
    /// Rows skipped because of an anomaly
    pub skipped: usize,
    /// Scopes whose macro list was rebuilt
    pub scopes_rebuilt: usize,
    /// Template links added or removed
    pub links_changed: usize,
    /// Wall time spent in `apply`
    pub elapsed: Duration,
}

/// Outcome of one sync cycle
#[derive(Debug)]
pub struct SyncResult {
    /// The new snapshot
    pub manager: Arc<Manager>,
    /// Rows that were skipped and why
    pub anomalies: Vec<SyncAnomaly>,
    /// Cycle counters
    pub stats: SyncStats,
}

/// Pending rebuild of one scope's macro list
#[derive(Default)]
struct ScopeUpdate {
    added: Vec<Arc<UserMacro>>,
    superseded: FxHashSet<MacroId>,
}

/// State that only lives for one `apply` call
#[derive(Default)]
struct SyncCycle {
    updates: FxHashMap<HostId, ScopeUpdate>,
    anomalies: Vec<SyncAnomaly>,
    stats: SyncStats,
}

impl SyncCycle {
    fn scope(&mut self, scope: HostId) -> &mut ScopeUpdate {
        self.updates.entry(scope).or_default()
    }
}

/// Builds new snapshots from change batches
///
/// Keeps the index of live macros (id to owning scope) between cycles, so
/// calls must be serialized and each call must receive the snapshot
/// produced by the previous one.
#[derive(Debug)]
pub struct SyncEngine {
    pool: StringPool,
    global_index: FxHashMap<MacroId, HostId>,
    host_index: FxHashMap<MacroId, HostId>,
    host_capacity: usize,
}

impl SyncEngine {
    /// Creates an engine interning strings into `pool`
    #[must_use]
    pub fn new(pool: StringPool) -> Self {
        Self::with_capacity(pool, DEFAULT_HOST_CAPACITY)
    }

    /// Creates an engine that sizes fresh snapshots for `host_capacity` hosts
    #[must_use]
    pub fn with_capacity(pool: StringPool, host_capacity: usize) -> Self {
        Self {
            pool,
            global_index: FxHashMap::default(),
            host_index: FxHashMap::default(),
            host_capacity,
        }
    }

    /// Number of macros currently known to be live
    #[must_use]
    pub fn live_macros(&self) -> usize {
        self.global_index.len() + self.host_index.len()
    }

    /// Applies one change set on top of `old` and returns the new snapshot
    ///
    /// `old` is consumed: if nobody else holds it, it is updated in place,
    /// otherwise a private copy sharing all hosts is made. Passing `None`
    /// starts from an empty snapshot and forgets every live macro.
    pub fn apply(&mut self, old: Option<Arc<Manager>>, changes: &ChangeSet) -> SyncResult {
        let span = info_span!(
            "um_sync",
            global = changes.global.len(),
            host = changes.host.len(),
            links = changes.links.len()
        );
        let _entered = span.enter();
        let started = Instant::now();

        let mut manager = match old {
            Some(old) => Arc::unwrap_or_clone(old),
            None => {
                self.global_index.clear();
                self.host_index.clear();
                Manager::with_capacity(self.host_capacity)
            }
        };
        let mut cycle = SyncCycle::default();

        for change in &changes.host {
            match change {
                Change::Add(row) | Change::Update(row) if row.host_id == GLOBAL_SCOPE => {
                    warn!(macro_id = row.row.macro_id, "skipping host macro in global scope");
                    cycle.stats.skipped += 1;
                    cycle.anomalies.push(SyncAnomaly::HostMacroInGlobalScope {
                        macro_id: row.row.macro_id,
                    });
                }
                Change::Add(row) => {
                    self.prepare_row(MacroBatch::Host, row.host_id, &row.row, false, &mut cycle);
                }
                Change::Update(row) => {
                    self.prepare_row(MacroBatch::Host, row.host_id, &row.row, true, &mut cycle);
                }
                Change::Remove(macro_id) => {
                    self.prepare_removal(MacroBatch::Host, *macro_id, &mut cycle);
                }
            }
        }
        for change in &changes.global {
            match change {
                Change::Add(row) => {
                    self.prepare_row(MacroBatch::Global, GLOBAL_SCOPE, row, false, &mut cycle);
                }
                Change::Update(row) => {
                    self.prepare_row(MacroBatch::Global, GLOBAL_SCOPE, row, true, &mut cycle);
                }
                Change::Remove(macro_id) => {
                    self.prepare_removal(MacroBatch::Global, *macro_id, &mut cycle);
                }
            }
        }
        debug!(scopes = cycle.updates.len(), "prepared macro updates");

        rebuild_scopes(&mut manager, &mut cycle);
        apply_links(&mut manager, &changes.links, &mut cycle);

        cycle.stats.elapsed = started.elapsed();
        let stats = cycle.stats;
        debug!(
            hosts = manager.len(),
            added = stats.added,
            updated = stats.updated,
            removed = stats.removed,
            skipped = stats.skipped,
            scopes_rebuilt = stats.scopes_rebuilt,
            links_changed = stats.links_changed,
            elapsed = ?stats.elapsed,
            "macro sync finished"
        );

        SyncResult {
            manager: Arc::new(manager),
            anomalies: cycle.anomalies,
            stats,
        }
    }

    fn index_mut(&mut self, batch: MacroBatch) -> &mut FxHashMap<MacroId, HostId> {
        match batch {
            MacroBatch::Global => &mut self.global_index,
            MacroBatch::Host => &mut self.host_index,
        }
    }

    /// Turns an add/update row into a pending macro of `scope`
    fn prepare_row(
        &mut self,
        batch: MacroBatch,
        scope: HostId,
        row: &MacroRow,
        is_update: bool,
        cycle: &mut SyncCycle,
    ) {
        let token = match parse_user_macro(&row.token) {
            Ok(token) => token,
            Err(reason) => {
                warn!(
                    macro_id = row.macro_id,
                    host_id = scope,
                    token = %row.token,
                    %reason,
                    "skipping macro with invalid syntax"
                );
                cycle.stats.skipped += 1;
                cycle.anomalies.push(SyncAnomaly::InvalidMacroSyntax {
                    macro_id: row.macro_id,
                    token: row.token.clone(),
                    reason,
                });
                return;
            }
        };

        let user_macro = Arc::new(UserMacro {
            id: row.macro_id,
            scope,
            name: self.pool.intern(token.name),
            context: token.context().map(|context| self.pool.intern(context)),
            value: self.pool.intern(&row.value),
            kind: row.kind,
        });

        // A live copy, possibly owned by another host, is replaced.
        if let Some(previous) = self.index_mut(batch).insert(row.macro_id, scope) {
            let update = cycle.scope(previous);
            update.superseded.insert(row.macro_id);
            update.added.retain(|pending| pending.id != row.macro_id);
        }

        if is_update {
            cycle.stats.updated += 1;
        } else {
            cycle.stats.added += 1;
        }
        let update = cycle.scope(scope);
        if is_update {
            update.superseded.insert(row.macro_id);
        }
        update.added.push(user_macro);
    }

    /// Marks a live macro as removed from its owning scope
    fn prepare_removal(&mut self, batch: MacroBatch, macro_id: MacroId, cycle: &mut SyncCycle) {
        let Some(scope) = self.index_mut(batch).remove(&macro_id) else {
            warn!(macro_id, %batch, "removal of unknown macro");
            cycle.stats.skipped += 1;
            cycle
                .anomalies
                .push(SyncAnomaly::DanglingRemoval { macro_id, batch });
            return;
        };

        let update = cycle.scope(scope);
        update.superseded.insert(macro_id);
        update.added.retain(|pending| pending.id != macro_id);
        cycle.stats.removed += 1;
    }
}

/// Replaces the macro list of every touched scope
fn rebuild_scopes(manager: &mut Manager, cycle: &mut SyncCycle) {
    for (scope, update) in cycle.updates.drain() {
        cycle.stats.scopes_rebuilt += 1;
        match manager.hosts_mut().entry(scope) {
            Entry::Occupied(mut entry) => {
                let host = Arc::make_mut(entry.get_mut());
                host.replace_macros(&update.superseded, update.added);
                if host.is_empty() {
                    debug!(host_id = scope, "dropping empty host");
                    entry.remove();
                }
            }
            Entry::Vacant(entry) => {
                if !update.added.is_empty() {
                    let mut host = HostMacros::new(scope);
                    host.replace_macros(&FxHashSet::default(), update.added);
                    entry.insert(Arc::new(host));
                }
            }
        }
    }
}

/// Applies host-template link changes
fn apply_links(manager: &mut Manager, links: &[LinkChange], cycle: &mut SyncCycle) {
    for change in links {
        match change {
            Change::Add(link) | Change::Update(link) if link.host_id == GLOBAL_SCOPE => {
                warn!(parent_id = link.parent_id, "skipping template link from global scope");
                cycle.stats.skipped += 1;
                cycle.anomalies.push(SyncAnomaly::GlobalTemplateLink {
                    parent_id: link.parent_id,
                });
            }
            Change::Add(link) | Change::Update(link) => {
                let host = manager
                    .hosts_mut()
                    .entry(link.host_id)
                    .or_insert_with(|| Arc::new(HostMacros::new(link.host_id)));
                if !host.parents().contains(&link.parent_id) {
                    Arc::make_mut(host).add_parent(link.parent_id);
                    cycle.stats.links_changed += 1;
                }
            }
            Change::Remove(link) => {
                let mut entry = match manager.hosts_mut().entry(link.host_id) {
                    Entry::Occupied(entry) if entry.get().parents().contains(&link.parent_id) => {
                        entry
                    }
                    Entry::Occupied(_) | Entry::Vacant(_) => {
                        warn!(
                            host_id = link.host_id,
                            parent_id = link.parent_id,
                            "removal of unknown template link"
                        );
                        cycle.stats.skipped += 1;
                        cycle.anomalies.push(SyncAnomaly::DanglingLinkRemoval {
                            host_id: link.host_id,
                            parent_id: link.parent_id,
                        });
                        continue;
                    }
                };

                let host = Arc::make_mut(entry.get_mut());
                host.remove_parent(link.parent_id);
                cycle.stats.links_changed += 1;
                if host.is_empty() {
                    debug!(host_id = link.host_id, "dropping empty host");
                    entry.remove();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{HostMacroRow, TemplateLink};
    use crate::resolve::resolve;

    fn engine() -> SyncEngine {
        SyncEngine::new(StringPool::new())
    }

    fn host_add(macro_id: MacroId, host_id: HostId, token: &str, value: &str) -> Change<HostMacroRow, MacroId> {
        Change::Add(HostMacroRow::new(macro_id, host_id, token, value))
    }

    fn values(manager: &Manager, host_id: HostId) -> Vec<String> {
        manager
            .host(host_id)
            .map(|host| {
                host.macros()
                    .iter()
                    .map(|user_macro| format!("{}={}", user_macro.name(), user_macro.value()))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_initial_sync_groups_by_scope() {
        let mut engine = engine();
        let changes = ChangeSet {
            global: vec![Change::Add(MacroRow::new(1, "{$G}", "g"))],
            host: vec![
                host_add(1, 10, "{$B}", "b"),
                host_add(2, 10, "{$A}", "a"),
                host_add(3, 11, "{$C}", "c"),
            ],
            links: Vec::new(),
        };

        let result = engine.apply(None, &changes);
        let manager = &result.manager;

        assert!(result.anomalies.is_empty());
        assert_eq!(manager.len(), 3);
        assert_eq!(values(manager, 10), vec!["A=a", "B=b"]);
        assert_eq!(values(manager, 11), vec!["C=c"]);
        assert_eq!(values(manager, GLOBAL_SCOPE), vec!["G=g"]);
        assert_eq!(result.stats.added, 4);
        assert_eq!(result.stats.scopes_rebuilt, 3);
        assert_eq!(engine.live_macros(), 4);
    }

    #[test]
    fn test_global_and_host_ids_do_not_collide() {
        let mut engine = engine();
        let first = engine.apply(
            None,
            &ChangeSet {
                global: vec![Change::Add(MacroRow::new(5, "{$G}", "g"))],
                host: vec![host_add(5, 10, "{$H}", "h")],
                links: Vec::new(),
            },
        );

        let second = engine.apply(
            Some(first.manager),
            &ChangeSet {
                global: vec![Change::Update(MacroRow::new(5, "{$G}", "g2"))],
                ..ChangeSet::default()
            },
        );

        assert_eq!(values(&second.manager, 10), vec!["H=h"]);
        assert_eq!(values(&second.manager, GLOBAL_SCOPE), vec!["G=g2"]);
    }

    #[test]
    fn test_update_replaces_and_remove_drops() {
        let mut engine = engine();
        let first = engine.apply(
            None,
            &ChangeSet {
                host: vec![host_add(1, 10, "{$A}", "1"), host_add(2, 10, "{$B}", "2")],
                ..ChangeSet::default()
            },
        );

        let second = engine.apply(
            Some(first.manager),
            &ChangeSet {
                host: vec![
                    Change::Update(HostMacroRow::new(1, 10, "{$A}", "one")),
                    Change::Remove(2),
                ],
                ..ChangeSet::default()
            },
        );

        assert_eq!(values(&second.manager, 10), vec!["A=one"]);
        assert_eq!(second.stats.updated, 1);
        assert_eq!(second.stats.removed, 1);
        assert_eq!(engine.live_macros(), 1);
    }

    #[test]
    fn test_update_moving_macro_rebuilds_old_host() {
        let mut engine = engine();
        let first = engine.apply(
            None,
            &ChangeSet {
                host: vec![host_add(1, 10, "{$A}", "a"), host_add(2, 10, "{$B}", "b")],
                ..ChangeSet::default()
            },
        );

        let second = engine.apply(
            Some(first.manager),
            &ChangeSet {
                host: vec![Change::Update(HostMacroRow::new(1, 20, "{$A}", "a"))],
                ..ChangeSet::default()
            },
        );

        assert_eq!(values(&second.manager, 10), vec!["B=b"]);
        assert_eq!(values(&second.manager, 20), vec!["A=a"]);
        assert_eq!(second.manager.host(20).unwrap().macros()[0].scope(), 20);
    }

    #[test]
    fn test_removing_last_macro_drops_host() {
        let mut engine = engine();
        let first = engine.apply(
            None,
            &ChangeSet {
                host: vec![host_add(1, 10, "{$A}", "a")],
                ..ChangeSet::default()
            },
        );
        let second = engine.apply(
            Some(first.manager),
            &ChangeSet {
                host: vec![Change::Remove(1)],
                ..ChangeSet::default()
            },
        );

        assert!(second.manager.host(10).is_none());
        assert!(second.manager.is_empty());
    }

    #[test]
    fn test_host_with_links_survives_losing_macros() {
        let mut engine = engine();
        let first = engine.apply(
            None,
            &ChangeSet {
                host: vec![host_add(1, 10, "{$A}", "a")],
                links: vec![Change::Add(TemplateLink::new(10, 500))],
                ..ChangeSet::default()
            },
        );
        let second = engine.apply(
            Some(first.manager),
            &ChangeSet {
                host: vec![Change::Remove(1)],
                ..ChangeSet::default()
            },
        );

        let host = second.manager.host(10).unwrap();
        assert!(host.macros().is_empty());
        assert_eq!(host.parents(), &[500]);
    }

    #[test]
    fn test_add_then_remove_in_same_cycle() {
        let mut engine = engine();
        let result = engine.apply(
            None,
            &ChangeSet {
                host: vec![host_add(1, 10, "{$A}", "a"), Change::Remove(1)],
                ..ChangeSet::default()
            },
        );

        assert!(result.manager.host(10).is_none());
        assert_eq!(engine.live_macros(), 0);
    }

    #[test]
    fn test_anomalies_do_not_abort() {
        let mut engine = engine();
        let result = engine.apply(
            None,
            &ChangeSet {
                host: vec![
                    host_add(1, 10, "{$bad}", "x"),
                    host_add(2, 10, "{$GOOD}", "y"),
                    Change::Remove(99),
                ],
                links: vec![Change::Remove(TemplateLink::new(10, 7))],
                ..ChangeSet::default()
            },
        );

        assert_eq!(values(&result.manager, 10), vec!["GOOD=y"]);
        assert_eq!(result.stats.skipped, 3);
        assert!(matches!(
            result.anomalies.as_slice(),
            [
                SyncAnomaly::InvalidMacroSyntax { macro_id: 1, .. },
                SyncAnomaly::DanglingRemoval {
                    macro_id: 99,
                    batch: MacroBatch::Host
                },
                SyncAnomaly::DanglingLinkRemoval {
                    host_id: 10,
                    parent_id: 7
                },
            ]
        ));
    }

    #[test]
    fn test_global_scope_rejects_links_and_host_rows() {
        let mut engine = engine();
        let result = engine.apply(
            None,
            &ChangeSet {
                global: vec![Change::Add(MacroRow::new(1, "{$G}", "g"))],
                host: vec![
                    host_add(1, 500, "{$T}", "template-only"),
                    host_add(2, GLOBAL_SCOPE, "{$H}", "h"),
                ],
                links: vec![Change::Add(TemplateLink::new(GLOBAL_SCOPE, 500))],
            },
        );

        let globals = result.manager.globals().unwrap();
        assert!(globals.parents().is_empty());
        assert_eq!(values(&result.manager, GLOBAL_SCOPE), vec!["G=g"]);
        assert!(resolve(&result.manager, &[10], "{$T}").is_err());
        assert_eq!(result.stats.skipped, 2);
        assert_eq!(
            result.anomalies,
            vec![
                SyncAnomaly::HostMacroInGlobalScope { macro_id: 2 },
                SyncAnomaly::GlobalTemplateLink { parent_id: 500 },
            ]
        );
        assert_eq!(engine.live_macros(), 2);
    }

    #[test]
    fn test_link_changes() {
        let mut engine = engine();
        let first = engine.apply(
            None,
            &ChangeSet {
                links: vec![
                    Change::Add(TemplateLink::new(10, 1)),
                    Change::Add(TemplateLink::new(10, 2)),
                    Change::Update(TemplateLink::new(10, 2)),
                ],
                ..ChangeSet::default()
            },
        );
        assert_eq!(first.manager.host(10).unwrap().parents(), &[1, 2]);
        assert_eq!(first.stats.links_changed, 2);

        let second = engine.apply(
            Some(first.manager),
            &ChangeSet {
                links: vec![
                    Change::Remove(TemplateLink::new(10, 1)),
                    Change::Remove(TemplateLink::new(10, 2)),
                ],
                ..ChangeSet::default()
            },
        );
        assert!(second.manager.host(10).is_none());
    }

    #[test]
    fn test_shared_snapshot_is_copied_not_mutated() {
        let mut engine = engine();
        let first = engine.apply(
            None,
            &ChangeSet {
                host: vec![host_add(1, 10, "{$A}", "old"), host_add(2, 11, "{$B}", "b")],
                ..ChangeSet::default()
            },
        );
        let pinned = Arc::clone(&first.manager);

        let second = engine.apply(
            Some(first.manager),
            &ChangeSet {
                host: vec![Change::Update(HostMacroRow::new(1, 10, "{$A}", "new"))],
                ..ChangeSet::default()
            },
        );

        assert_eq!(values(&pinned, 10), vec!["A=old"]);
        assert_eq!(values(&second.manager, 10), vec!["A=new"]);

        let old_untouched = pinned.host(11).unwrap();
        let new_untouched = second.manager.host(11).unwrap();
        assert!(Arc::ptr_eq(old_untouched, new_untouched));
        assert_eq!(Arc::strong_count(new_untouched), 2);
        assert!(!Arc::ptr_eq(pinned.host(10).unwrap(), second.manager.host(10).unwrap()));
    }

    #[test]
    fn test_exclusive_snapshot_is_updated_in_place() {
        let mut engine = engine();
        let first = engine.apply(
            None,
            &ChangeSet {
                host: vec![host_add(1, 10, "{$A}", "a")],
                ..ChangeSet::default()
            },
        );
        let host_before = Arc::as_ptr(first.manager.host(10).unwrap());

        let second = engine.apply(
            Some(first.manager),
            &ChangeSet {
                host: vec![host_add(2, 10, "{$B}", "b")],
                ..ChangeSet::default()
            },
        );

        assert_eq!(Arc::as_ptr(second.manager.host(10).unwrap()), host_before);
        assert_eq!(values(&second.manager, 10), vec!["A=a", "B=b"]);
    }
}
