//! Shared state of the multi-reader / multi-loader / single-editor protocol.
//!
//! Three roles over one mutex and one condition variable:
//! readers hold handles or probe the cache map; loaders run a database fetch
//! for one `(type, major_id)` key, no two for the same key; the editor
//! mutates the LRU structure and excludes everyone else.
//!
//! A thread keeps its `loading` slot set from the moment it wins the load
//! until its entry is spliced into the cache, so a second thread asking for
//! the same key waits and then hits the cache instead of reloading.

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::cache::{Key, LruCache};

pub struct Shared {
    pub readers: usize,
    pub loaders: usize,
    pub editor: bool,
    pub loading: Vec<Option<Key>>,
    pub cache: LruCache,
}

impl Shared {
    pub fn loading_key(&self, key: &Key) -> bool {
        self.loading.iter().any(|slot| slot.as_ref() == Some(key))
    }
}

pub struct Monitor {
    state: Mutex<Shared>,
    cond: Condvar,
}

impl Monitor {
    pub fn new(nth: usize) -> Self {
        Self {
            state: Mutex::new(Shared {
                readers: 0,
                loaders: 0,
                editor: false,
                loading: vec![None; nth.max(1)],
                cache: LruCache::new(),
            }),
            cond: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Shared> {
        self.state.lock()
    }

    pub fn wait(&self, guard: &mut MutexGuard<'_, Shared>) {
        self.cond.wait(guard);
    }

    pub fn notify_all(&self) {
        self.cond.notify_all();
    }
}
