//! Reference-counted string interning for macro names, contexts and values
//!
//! Every distinct string is stored once. Handles are plain `Arc<str>`, so
//! releasing a handle is just dropping it. The pool keeps one reference of
//! its own and [`StringPool::purge`] evicts strings nobody else holds.

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

/// Shared handle to an interned string
pub type Interned = Arc<str>;

/// Thread-safe reference-counted string pool
#[derive(Clone, Default)]
pub struct StringPool {
    inner: Arc<Mutex<FxHashSet<Interned>>>,
}

impl StringPool {
    /// Creates an empty pool
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared handle for `text`, inserting it on first use
    pub fn intern(&self, text: &str) -> Interned {
        let mut strings = self.inner.lock();
        if let Some(existing) = strings.get(text) {
            return Arc::clone(existing);
        }

        let interned: Interned = Arc::from(text);
        strings.insert(Arc::clone(&interned));
        interned
    }

    /// Number of live handles to `text` outside the pool, if it is interned
    #[must_use]
    pub fn handles(&self, text: &str) -> Option<usize> {
        self.inner
            .lock()
            .get(text)
            .map(|interned| Arc::strong_count(interned) - 1)
    }

    /// Returns true if `text` is currently interned
    #[must_use]
    pub fn contains(&self, text: &str) -> bool {
        self.inner.lock().contains(text)
    }

    /// Evicts every string that is referenced only by the pool itself
    ///
    /// Returns the number of evicted strings.
    pub fn purge(&self) -> usize {
        let mut strings = self.inner.lock();
        let before = strings.len();
        strings.retain(|interned| Arc::strong_count(interned) > 1);
        before - strings.len()
    }

    /// Number of distinct strings held by the pool
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if the pool holds no strings
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl fmt::Debug for StringPool {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StringPool")
            .field("len", &self.len())
            .finish()
    }
}
