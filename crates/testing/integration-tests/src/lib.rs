//! Integration test utilities for the user macro cache

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use um_cache::{CacheConfig, ChangeSet, MacroCache, SyncResult};

/// Installs a test-writer tracing subscriber honouring `RUST_LOG`
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    drop(
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init(),
    );
}

/// Directory holding the JSON change-set fixtures
#[must_use]
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Parses a change set in the JSON feed format
///
/// # Errors
///
/// Returns an error if `json` is not a valid change set
pub fn parse_changes(json: &str) -> Result<ChangeSet> {
    serde_json::from_str(json).context("invalid change set")
}

/// Loads `fixtures/<name>.json`
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed
pub fn load_changes(name: &str) -> Result<ChangeSet> {
    let path = fixtures_dir().join(format!("{name}.json"));
    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    parse_changes(&text).with_context(|| format!("in fixture {}", path.display()))
}

/// Cache plus the results of every sync applied through it
pub struct TestFixture {
    /// Cache under test
    pub cache: MacroCache,
    /// Results in application order
    pub results: Vec<SyncResult>,
}

impl TestFixture {
    /// Creates a fixture around an empty cache with default config
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Creates a fixture around an empty cache with `config`
    #[must_use]
    pub fn with_config(config: CacheConfig) -> Self {
        init_tracing();
        Self {
            cache: MacroCache::new(config),
            results: Vec::new(),
        }
    }

    /// Syncs `changes` and records the result
    pub fn sync(&mut self, changes: &ChangeSet) -> &SyncResult {
        let result = self.cache.sync(changes);
        self.results.push(result);
        &self.results[self.results.len() - 1]
    }

    /// Syncs the named fixture
    ///
    /// # Errors
    ///
    /// Returns an error if the fixture cannot be loaded
    pub fn sync_fixture(&mut self, name: &str) -> Result<&SyncResult> {
        let changes = load_changes(name)?;
        Ok(self.sync(&changes))
    }

    /// Resolved value of `token` for `host_ids`, `None` if not found
    #[must_use]
    pub fn value(&self, host_ids: &[u64], token: &str) -> Option<String> {
        self.cache
            .resolve(host_ids, token)
            .ok()
            .map(|user_macro| user_macro.value().to_owned())
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
