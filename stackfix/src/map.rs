use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::types::MethodId;

type Entries = HashMap<MethodId, MethodId>;

/// Maps the identity visible at the end of a redirection chain back to the
/// identity that was originally targeted.
///
/// Writers serialize on a mutex around the master table and publish an
/// immutable snapshot when they finish. Readers only clone the published
/// `Arc`, so a lookup never waits on a writer that is still computing its
/// entry, even on the writer's own thread, and sees either the old or the
/// new table. Entries are never removed: a stale key belongs to a stub that
/// no longer runs, so it can only leave an answer unchanged.
#[derive(Debug, Default)]
pub struct IdentityMap {
    master: Mutex<Entries>,
    published: RwLock<Arc<Entries>>,
}

/// Exclusive write access handed out by [`IdentityMap::update`].
pub struct MapWriter<'a> {
    entries: MutexGuard<'a, Entries>,
    dirty: bool,
}

impl MapWriter<'_> {
    /// Record `from -> to`, overwriting any earlier entry for `from`.
    pub fn put(&mut self, from: MethodId, to: MethodId) {
        self.entries.insert(from, to);
        self.dirty = true;
    }
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Arc<Entries> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, from: MethodId) -> Option<MethodId> {
        self.current().get(&from).copied()
    }

    pub fn put(&self, from: MethodId, to: MethodId) {
        self.update(|w| w.put(from, to));
    }

    /// Run `f` as the only writer, then publish what it wrote.
    ///
    /// `f` may call [`get`](Self::get); it sees the table as published
    /// before this update.
    pub fn update<R>(&self, f: impl FnOnce(&mut MapWriter<'_>) -> R) -> R {
        let mut writer = MapWriter {
            entries: self.master.lock().unwrap_or_else(PoisonError::into_inner),
            dirty: false,
        };
        let result = f(&mut writer);
        if writer.dirty {
            let snapshot = Arc::new(writer.entries.clone());
            *self.published.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
        }
        result
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current entries sorted by key, for diagnostics.
    pub fn snapshot(&self) -> Vec<(MethodId, MethodId)> {
        let mut pairs: Vec<_> = self.current().iter().map(|(k, v)| (*k, *v)).collect();
        pairs.sort_unstable();
        pairs
    }
}
