//! Human-readable dumps of a snapshot for diagnostics
//!
//! Both dumps list hosts in ascending id order and mask secret values.
//! Reference counts include the snapshot itself.

use crate::entity::{HostMacros, UserMacro};
use crate::manager::Manager;
use crate::HostId;
use rustc_hash::FxHashSet;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use um_syntax::MacroToken;

/// Flat listing of every host, its templates and macros
#[must_use]
pub fn manager(manager: &Manager) -> ManagerDump<'_> {
    ManagerDump { manager }
}

/// Host-template hierarchy rooted at hosts nobody inherits from
#[must_use]
pub fn tree(manager: &Manager) -> TreeDump<'_> {
    TreeDump { manager }
}

/// See [`manager`]
#[derive(Debug, Clone, Copy)]
pub struct ManagerDump<'snap> {
    manager: &'snap Manager,
}

/// See [`tree`]
#[derive(Debug, Clone, Copy)]
pub struct TreeDump<'snap> {
    manager: &'snap Manager,
}

fn sorted_hosts(manager: &Manager) -> Vec<&Arc<HostMacros>> {
    let mut hosts: Vec<_> = manager.hosts().collect();
    hosts.sort_unstable_by_key(|host| host.id());
    hosts
}

fn write_macro(formatter: &mut fmt::Formatter<'_>, indent: usize, user_macro: &Arc<UserMacro>) -> fmt::Result {
    let token = MacroToken {
        name: user_macro.name(),
        context: user_macro.context().map(Cow::Borrowed),
    };
    writeln!(
        formatter,
        "{:indent$}{token} = {:?} ({}, id {}, refs {})",
        "",
        user_macro.display_value(),
        user_macro.kind(),
        user_macro.id(),
        Arc::strong_count(user_macro)
    )
}

impl fmt::Display for ManagerDump<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(formatter, "hosts: {}", self.manager.len())?;
        for host in sorted_hosts(self.manager) {
            writeln!(formatter, "host {} (refs {})", host.id(), Arc::strong_count(host))?;
            if !host.parents().is_empty() {
                let mut parents = host.parents().to_vec();
                parents.sort_unstable();
                writeln!(formatter, "  templates: {parents:?}")?;
            }
            for user_macro in host.macros() {
                write_macro(formatter, 2, user_macro)?;
            }
        }
        Ok(())
    }
}

impl TreeDump<'_> {
    fn write_host(
        &self,
        formatter: &mut fmt::Formatter<'_>,
        host_id: HostId,
        depth: usize,
        path: &mut Vec<HostId>,
        printed: &mut FxHashSet<HostId>,
    ) -> fmt::Result {
        let indent = depth * 2;
        if path.contains(&host_id) {
            return writeln!(formatter, "{:indent$}{host_id} (cycle)", "");
        }
        let Some(host) = self.manager.host(host_id) else {
            return writeln!(formatter, "{:indent$}{host_id} (not cached)", "");
        };
        if !printed.insert(host_id) {
            return writeln!(formatter, "{:indent$}{host_id} (see above)", "");
        }

        writeln!(formatter, "{:indent$}{host_id}", "")?;
        for user_macro in host.macros() {
            write_macro(formatter, indent + 4, user_macro)?;
        }

        let mut parents = host.parents().to_vec();
        parents.sort_unstable();
        path.push(host_id);
        for parent in parents {
            self.write_host(formatter, parent, depth + 1, path, printed)?;
        }
        path.pop();
        Ok(())
    }
}

impl fmt::Display for TreeDump<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hosts = sorted_hosts(self.manager);
        let inherited: FxHashSet<HostId> = hosts
            .iter()
            .flat_map(|host| host.parents().iter().copied())
            .collect();

        let mut printed = FxHashSet::default();
        let mut path = Vec::new();
        for host in &hosts {
            if !inherited.contains(&host.id()) {
                self.write_host(formatter, host.id(), 0, &mut path, &mut printed)?;
            }
        }
        // Hosts reachable only through a cycle
        for host in &hosts {
            if !printed.contains(&host.id()) {
                self.write_host(formatter, host.id(), 0, &mut path, &mut printed)?;
            }
        }
        Ok(())
    }
}
