// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Thread-safe cell holding an immutable snapshot that is replaced wholesale.
//!
//! [`SnapshotCell<T>`] wraps `Arc<RwLock<Arc<T>>>`: readers clone the inner
//! `Arc` and keep using it for as long as they like, writers swap in a new
//! `Arc` under the write lock.  A reader therefore sees either the previous
//! value or the new one, never a partially written value.

use std::sync::{Arc, RwLock};

pub struct SnapshotCell<T: Send + Sync + 'static>(Arc<RwLock<Arc<T>>>);

impl<T: Send + Sync + 'static> SnapshotCell<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(value))))
    }

    /// Return a cheap snapshot of the current value.
    #[must_use]
    pub fn get(&self) -> Arc<T> {
        self.0.read().expect("snapshot lock poisoned").clone()
    }

    /// Atomically replace the value.  Snapshots obtained earlier stay valid
    /// and keep referring to the old value.
    pub fn set(&self, value: T) {
        let new = Arc::new(value);
        *self.0.write().expect("snapshot lock poisoned") = new;
    }
}

impl<T: Send + Sync + 'static> Clone for SnapshotCell<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Send + Sync + Default + 'static> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
