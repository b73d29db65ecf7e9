//! Error types for synchronization, resolution and configuration

use crate::change::MacroBatch;
use crate::{HostId, MacroId};
use std::io;
use std::path::PathBuf;
use um_syntax::MacroSyntaxError;

/// Non-fatal problem found while applying a change set
///
/// The offending row is skipped and the rest of the batch is applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncAnomaly {
    /// Macro token in an add/update row could not be parsed
    #[error("skipped macro {macro_id} {token:?}: {reason}")]
    InvalidMacroSyntax {
        /// Row id
        macro_id: MacroId,
        /// Raw macro token
        token: String,
        /// Parser error
        #[source]
        reason: MacroSyntaxError,
    },
    /// Remove row for a macro that is not live
    #[error("cannot remove unknown {batch} macro {macro_id}")]
    DanglingRemoval {
        /// Row id
        macro_id: MacroId,
        /// Table the row came from
        batch: MacroBatch,
    },
    /// Host macro row that names the global scope as its host
    #[error("host macro {macro_id} cannot be owned by the global scope")]
    HostMacroInGlobalScope {
        /// Row id
        macro_id: MacroId,
    },
    /// Template link from the global scope, which never inherits
    #[error("global scope cannot link to template {parent_id}")]
    GlobalTemplateLink {
        /// Template
        parent_id: HostId,
    },
    /// Remove row for a template link that is not cached
    #[error("cannot remove unknown template link {host_id} -> {parent_id}")]
    DanglingLinkRemoval {
        /// Inheriting host
        host_id: HostId,
        /// Template
        parent_id: HostId,
    },
}

/// Error returned by macro resolution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// Requested macro token is malformed
    #[error("invalid macro syntax: {0}")]
    InvalidMacroSyntax(#[from] MacroSyntaxError),
    /// No host, template or global definition matched
    #[error("undefined macro {name} (context {context:?})")]
    NotFound {
        /// Macro name
        name: String,
        /// Requested context
        context: Option<String>,
    },
}

/// Error loading [`crate::CacheConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file exists but cannot be read
    #[error("failed to read config file {}", .path.display())]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
    /// Config file is not valid TOML for [`crate::CacheConfig`]
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
