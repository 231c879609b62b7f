use crate::cht::map::table::Table;

use std::{fmt, marker::PhantomData};

use crossbeam_epoch::Guard;

/// A lazy, restartable traversal over the entries of one table.
///
/// A `Snapshot` is weakly consistent: it walks the table that was current
/// when the snapshot was taken, and it yields every entry that was present
/// then and not removed before the traversal reached it. Entries inserted or
/// moved into a newer table after the snapshot was taken may be missed, and
/// the order of the entries is unspecified.
///
/// A `Snapshot` keeps the current thread pinned to the epoch-based garbage
/// collector, so memory retired by the map is not reclaimed while it is alive.
/// Drop it when you are done with it.
///
/// Created by [`NonBlockingMap::snapshot`][snapshot].
///
/// [snapshot]: ./struct.NonBlockingMap.html#method.snapshot
pub struct Snapshot<'a, K, V> {
    guard: Guard,
    table: *const Table<K, V>,
    index: usize,
    count: usize,
    current: Option<(*const K, *const V)>,
    _marker: PhantomData<&'a Table<K, V>>,
}

impl<'a, K, V> Snapshot<'a, K, V> {
    /// # Safety
    ///
    /// `table` must stay alive while `guard` is pinned.
    pub(crate) unsafe fn new(guard: Guard, table: *const Table<K, V>) -> Self {
        let count = (*table).generation().size.estimated_value().max(0) as usize;

        Self {
            guard,
            table,
            index: 0,
            count,
            current: None,
            _marker: PhantomData,
        }
    }

    /// Advances to the next live entry. Returns `false` when the end of the
    /// table was reached.
    pub fn move_next(&mut self) -> bool {
        // SAFETY: The table is retired only after `self.guard` is unpinned.
        let table = unsafe { &*self.table };

        while self.index < table.capacity() {
            let index = self.index;
            self.index += 1;

            if let Some((key, value)) = table.entry_at(&self.guard, index) {
                self.current = Some((key as *const K, value as *const V));
                return true;
            }
        }

        self.current = None;
        false
    }

    /// Returns the entry the last successful [`move_next`](#method.move_next)
    /// stopped at.
    pub fn current(&self) -> Option<(&K, &V)> {
        // SAFETY: Keys and values read from the table are released only after
        // `self.guard` is unpinned.
        self.current
            .map(|(key, value)| unsafe { (&*key, &*value) })
    }

    /// Restarts the traversal from the first slot of the same table.
    pub fn reset(&mut self) {
        self.index = 0;
        self.current = None;
    }

    /// Returns the estimated number of entries at the time the snapshot was
    /// taken.
    pub fn count(&self) -> usize {
        self.count
    }
}

impl<K, V> fmt::Debug for Snapshot<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("index", &self.index)
            .field("count", &self.count)
            .finish()
    }
}
