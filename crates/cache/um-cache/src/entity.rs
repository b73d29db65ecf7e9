//! Cached macro and host entities

use crate::{HostId, MacroId};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use um_intern::Interned;

/// Replacement shown for secret macro values
pub const SECRET_MASK: &str = "******";

/// How the macro value is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroKind {
    /// Plain text value
    #[default]
    Text,
    /// Secret text, never shown in diagnostics
    Secret,
    /// Path to a value in an external vault
    Vault,
}

impl fmt::Display for MacroKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Text => "text",
            Self::Secret => "secret",
            Self::Vault => "vault",
        })
    }
}

/// One user macro bound to a scope
///
/// Immutable once created; shared between snapshots through `Arc`.
#[derive(Clone, PartialEq, Eq)]
pub struct UserMacro {
    pub(crate) id: MacroId,
    pub(crate) scope: HostId,
    pub(crate) name: Interned,
    pub(crate) context: Option<Interned>,
    pub(crate) value: Interned,
    pub(crate) kind: MacroKind,
}

impl UserMacro {
    /// Row id in the backing store
    #[must_use]
    pub fn id(&self) -> MacroId {
        self.id
    }

    /// Owning host, or [`crate::GLOBAL_SCOPE`]
    #[must_use]
    pub fn scope(&self) -> HostId {
        self.scope
    }

    /// Macro name without delimiters
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Context, if the macro has one
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Raw value
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Storage kind of the value
    #[must_use]
    pub fn kind(&self) -> MacroKind {
        self.kind
    }

    /// Value safe for logs and dumps
    #[must_use]
    pub fn display_value(&self) -> &str {
        match self.kind {
            MacroKind::Secret => SECRET_MASK,
            MacroKind::Text | MacroKind::Vault => &self.value,
        }
    }

    /// Ordering used for host macro lists: name, then context-less first,
    /// then context
    #[must_use]
    pub fn cmp_key(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.context.cmp(&other.context))
    }
}

impl fmt::Debug for UserMacro {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("UserMacro")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("name", &self.name)
            .field("context", &self.context)
            .field("value", &self.display_value())
            .field("kind", &self.kind)
            .finish()
    }
}

/// Macros and template links of one host
///
/// `macros` is kept sorted by [`UserMacro::cmp_key`]; `parents` holds each
/// template id at most once.
#[derive(Debug, Clone)]
pub struct HostMacros {
    id: HostId,
    macros: Vec<Arc<UserMacro>>,
    parents: Vec<HostId>,
}

impl HostMacros {
    /// Creates a host with no macros and no templates
    #[must_use]
    pub fn new(id: HostId) -> Self {
        Self {
            id,
            macros: Vec::new(),
            parents: Vec::new(),
        }
    }

    /// Host id
    #[must_use]
    pub fn id(&self) -> HostId {
        self.id
    }

    /// Sorted macro list
    #[must_use]
    pub fn macros(&self) -> &[Arc<UserMacro>] {
        &self.macros
    }

    /// Direct template links
    #[must_use]
    pub fn parents(&self) -> &[HostId] {
        &self.parents
    }

    /// True when the host has neither macros nor templates
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.macros.is_empty() && self.parents.is_empty()
    }

    /// All macros called `name`, context-less entry first
    #[must_use]
    pub fn named(&self, name: &str) -> &[Arc<UserMacro>] {
        let start = self.macros.partition_point(|user_macro| user_macro.name() < name);
        let len = self.macros[start..]
            .iter()
            .take_while(|user_macro| user_macro.name() == name)
            .count();
        &self.macros[start..start + len]
    }

    /// Drops superseded macros, appends new ones and restores the order
    pub(crate) fn replace_macros(
        &mut self,
        superseded: &FxHashSet<MacroId>,
        added: Vec<Arc<UserMacro>>,
    ) {
        if !superseded.is_empty() {
            self.macros
                .retain(|user_macro| !superseded.contains(&user_macro.id));
        }
        self.macros.extend(added);
        self.macros.sort_by(|left, right| left.cmp_key(right));
    }

    /// Adds a template link; returns false if it was already present
    pub(crate) fn add_parent(&mut self, parent: HostId) -> bool {
        if self.parents.contains(&parent) {
            return false;
        }
        self.parents.push(parent);
        true
    }

    /// Removes a template link; returns false if it was not present
    pub(crate) fn remove_parent(&mut self, parent: HostId) -> bool {
        match self.parents.iter().position(|&id| id == parent) {
            Some(index) => {
                self.parents.swap_remove(index);
                true
            }
            None => false,
        }
    }
}
