//! User macro cache
//!
//! Holds every global and host-level user macro together with the
//! host-to-template links, as an immutable [`Manager`] snapshot. A
//! [`SyncEngine`] turns change batches from the backing store into a new
//! snapshot that shares every untouched host and macro with the previous
//! one; [`resolve`] walks the template graph of a snapshot to find the value
//! of `{$NAME:context}` for a set of hosts.
//!
//! [`MacroCache`] ties both sides together: a single writer publishes new
//! snapshots while any number of readers keep using the one they checked out.

pub mod cache;
pub mod change;
pub mod config;
pub mod dump;
pub mod entity;
pub mod error;
pub mod manager;
pub mod resolve;
pub mod sync;

pub use cache::MacroCache;
pub use change::{
    Change, ChangeSet, GlobalMacroChange, HostMacroChange, HostMacroRow, LinkChange, MacroBatch,
    MacroRow, TemplateLink,
};
pub use config::CacheConfig;
pub use entity::{HostMacros, MacroKind, UserMacro};
pub use error::{ConfigError, ResolveError, SyncAnomaly};
pub use manager::Manager;
pub use resolve::{resolve, resolve_parsed};
pub use sync::{SyncEngine, SyncResult, SyncStats};

/// Identifier of a host or template
pub type HostId = u64;

/// Identifier of a macro row in the backing store
pub type MacroId = u64;

/// Reserved host id under which global macros are stored
pub const GLOBAL_SCOPE: HostId = 0;
