//! Macro resolution over the host/template graph
//!
//! Hosts are searched level by level: first the requested hosts, then the
//! union of their templates, then the templates of those, and so on. An
//! exact context match anywhere stops the walk. Otherwise the first
//! context-less macro with the requested name is remembered as the default.
//! Global macros are searched last.

use crate::entity::UserMacro;
use crate::error::ResolveError;
use crate::manager::Manager;
use crate::{GLOBAL_SCOPE, HostId};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use um_syntax::parse_user_macro;

/// Resolves a raw macro token such as `{$NAME:context}` for `host_ids`
///
/// # Errors
///
/// Returns `ResolveError::InvalidMacroSyntax` if the token cannot be parsed
/// and `ResolveError::NotFound` if no definition applies.
pub fn resolve<'snap>(
    manager: &'snap Manager,
    host_ids: &[HostId],
    raw_token: &str,
) -> Result<&'snap Arc<UserMacro>, ResolveError> {
    let token = parse_user_macro(raw_token)?;
    resolve_parsed(manager, host_ids, token.name, token.context()).ok_or_else(|| {
        ResolveError::NotFound {
            name: token.name.to_owned(),
            context: token.context().map(str::to_owned),
        }
    })
}

/// Resolves an already split macro name and context for `host_ids`
///
/// Returns the exact match if one is reachable, otherwise the first
/// context-less macro of that name met on the way.
#[must_use]
pub fn resolve_parsed<'snap>(
    manager: &'snap Manager,
    host_ids: &[HostId],
    name: &str,
    context: Option<&str>,
) -> Option<&'snap Arc<UserMacro>> {
    let mut default = None;

    if let Some(exact) = search(manager, host_ids, name, context, &mut default) {
        return Some(exact);
    }
    if host_ids != [GLOBAL_SCOPE].as_slice() {
        if let Some(exact) = search(manager, &[GLOBAL_SCOPE], name, context, &mut default) {
            return Some(exact);
        }
    }

    default
}

/// Breadth-first walk from `start` up the template links
///
/// Each host is visited at most once, so template cycles terminate.
fn search<'snap>(
    manager: &'snap Manager,
    start: &[HostId],
    name: &str,
    context: Option<&str>,
    default: &mut Option<&'snap Arc<UserMacro>>,
) -> Option<&'snap Arc<UserMacro>> {
    let mut visited: FxHashSet<HostId> = start.iter().copied().collect();
    let mut level = start.to_vec();

    while !level.is_empty() {
        let mut parents = Vec::new();

        for &host_id in &level {
            let Some(host) = manager.host(host_id) else {
                continue;
            };

            for candidate in host.named(name) {
                if candidate.context().is_none() && default.is_none() {
                    *default = Some(candidate);
                }
                if candidate.context() == context {
                    return Some(candidate);
                }
            }

            parents.extend(
                host.parents()
                    .iter()
                    .copied()
                    .filter(|parent| !visited.contains(parent)),
            );
        }

        parents.sort_unstable();
        parents.dedup();
        visited.extend(parents.iter().copied());
        level = parents;
    }

    None
}
