//! Change rows delivered by the backing store synchronization feed

use crate::entity::MacroKind;
use crate::{HostId, MacroId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One add/update/remove instruction
///
/// `Add` and `Update` carry the full row; `Remove` carries only the key.
/// Within a batch every `Add`/`Update` precedes every `Remove`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag", content = "row", rename_all = "snake_case")]
pub enum Change<R, K> {
    /// New row
    Add(R),
    /// Replacement of an existing row
    Update(R),
    /// Deleted row
    Remove(K),
}

/// Macro fields shared by global and host rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroRow {
    /// Row id
    pub macro_id: MacroId,
    /// Raw macro token, e.g. `{$NAME:context}`
    #[serde(rename = "macro")]
    pub token: String,
    /// Macro value
    pub value: String,
    /// Value kind
    #[serde(default)]
    pub kind: MacroKind,
}

impl MacroRow {
    /// Creates a plain text macro row
    pub fn new(macro_id: MacroId, token: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            macro_id,
            token: token.into(),
            value: value.into(),
            kind: MacroKind::Text,
        }
    }

    /// Sets the value kind
    #[must_use]
    pub fn with_kind(mut self, kind: MacroKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Host-level macro row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMacroRow {
    /// Owning host
    pub host_id: HostId,
    /// Macro fields
    #[serde(flatten)]
    pub row: MacroRow,
}

impl HostMacroRow {
    /// Creates a plain text macro row owned by `host_id`
    pub fn new(
        macro_id: MacroId,
        host_id: HostId,
        token: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            host_id,
            row: MacroRow::new(macro_id, token, value),
        }
    }

    /// Sets the value kind
    #[must_use]
    pub fn with_kind(mut self, kind: MacroKind) -> Self {
        self.row.kind = kind;
        self
    }
}

/// Directed link from a host to a template it inherits macros from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateLink {
    /// Inheriting host
    pub host_id: HostId,
    /// Template
    pub parent_id: HostId,
}

impl TemplateLink {
    /// Creates a link from `host_id` to `parent_id`
    #[must_use]
    pub fn new(host_id: HostId, parent_id: HostId) -> Self {
        Self { host_id, parent_id }
    }
}

/// Change to a global macro
pub type GlobalMacroChange = Change<MacroRow, MacroId>;

/// Change to a host macro
pub type HostMacroChange = Change<HostMacroRow, MacroId>;

/// Change to a host-template link
pub type LinkChange = Change<TemplateLink, TemplateLink>;

/// The three batches of one sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeSet {
    /// Global macro changes
    pub global: Vec<GlobalMacroChange>,
    /// Host macro changes
    pub host: Vec<HostMacroChange>,
    /// Host-template link changes
    pub links: Vec<LinkChange>,
}

impl ChangeSet {
    /// Total number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.global.len() + self.host.len() + self.links.len()
    }

    /// True when no batch has rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which macro table a row came from
///
/// Global and host macro ids are independent sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacroBatch {
    /// Global macro table
    Global,
    /// Host macro table
    Host,
}

impl fmt::Display for MacroBatch {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Global => "global",
            Self::Host => "host",
        })
    }
}
