use super::{
    round_capacity,
    table::{Key, PutOutcome, Table, ValueMatch},
    value::{self, has_value, is_unset, unbox, ValuePtr},
};
use crate::cht::snapshot::Snapshot;

use std::{borrow::Borrow, ptr, sync::atomic::Ordering, sync::Arc};

use crossbeam_epoch::{Atomic, Guard, Owned, Shared};
use triomphe::Arc as TrioArc;

pub(crate) struct TableRef<'a, K, V> {
    pub(crate) root: &'a Atomic<Table<K, V>>,
}

/// The result of a conditional write, with the value passed through the
/// caller's closure.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PutResult<T> {
    /// The write happened. Holds the value it replaced, if the key was
    /// present.
    Replaced(Option<T>),
    /// The match condition failed. Holds the value that was observed, if the
    /// key was present.
    Rejected(Option<T>),
}

impl<T> PutResult<T> {
    pub(crate) fn is_replaced(&self) -> bool {
        matches!(self, Self::Replaced(_))
    }

    pub(crate) fn into_previous(self) -> Option<T> {
        match self {
            Self::Replaced(previous) => previous,
            Self::Rejected(_) => None,
        }
    }
}

impl<'a, K: Eq, V> TableRef<'a, K, V> {
    pub(crate) fn get_key_value_and<Q, F, T>(&self, key: &Q, hash: u32, with_entry: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        F: FnOnce(&K, &V) -> T,
    {
        let guard = &crossbeam_epoch::pin();

        let result = self
            .get_in_chain(guard, hash, key)
            .map(|(k, v)| with_entry(k, unsafe { unbox(v) }));

        self.promote(guard);

        result
    }

    /// Writes `value` (or removes the key if `value` is `None`) when `matcher`
    /// accepts the current value of the key.
    pub(crate) fn put_if_match_and<Q, F, T>(
        &self,
        key: Key<'_, K, Q>,
        hash: u32,
        value: Option<V>,
        matcher: &ValueMatch<'_, V>,
        with_value: F,
    ) -> PutResult<T>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        F: FnOnce(&V) -> T,
    {
        let guard = &crossbeam_epoch::pin();
        let new = value.map_or_else(value::tombstone, value::boxed);

        let result = match self.put_in_chain(guard, hash, key, new, matcher) {
            PutOutcome::Replaced(previous) => {
                let previous_value =
                    has_value(previous).then(|| with_value(unsafe { unbox(previous) }));
                unsafe { value::defer_release_value(guard, previous) };
                PutResult::Replaced(previous_value)
            }
            PutOutcome::Rejected(current) => {
                // Never published.
                unsafe { value::release_value(new) };
                let current_value =
                    has_value(current).then(|| with_value(unsafe { unbox(current) }));
                PutResult::Rejected(current_value)
            }
        };

        self.promote(guard);

        result
    }

    /// Returns the value of `key`, inserting the value returned by `init` if
    /// the key is absent. When threads race on an absent key, `init` may run
    /// on several of them but only one value is ever stored, and every racer
    /// sees that one.
    pub(crate) fn get_or_insert_with_and<F, G, T>(
        &self,
        key: K,
        hash: u32,
        init: F,
        with_value: G,
    ) -> T
    where
        F: FnOnce() -> V,
        G: FnOnce(&V) -> T,
    {
        let guard = &crossbeam_epoch::pin();

        if let Some((_, current)) = self.get_in_chain(guard, hash, &key) {
            let result = with_value(unsafe { unbox(current) });
            self.promote(guard);
            return result;
        }

        let key = TrioArc::new(key);
        let new = value::boxed(init());

        let result = match self.put_in_chain(
            guard,
            hash,
            Key::<K, K>::Shared(&*key),
            new,
            &ValueMatch::NullOrDead,
        ) {
            PutOutcome::Replaced(previous) => {
                unsafe { value::defer_release_value(guard, previous) };
                with_value(unsafe { unbox(new) })
            }
            PutOutcome::Rejected(current) => {
                assert!(
                    has_value(current),
                    "an insert-if-absent was rejected by an absent key"
                );
                unsafe { value::release_value(new) };
                with_value(unsafe { unbox(current) })
            }
        };

        self.promote(guard);

        result
    }

    /// Inserts the value returned by `add` if `key` is absent, or replaces
    /// the present value with the one `update` computes from it. `update` is
    /// called again whenever another thread changed the value in between.
    pub(crate) fn add_or_update_with_and<F, G, H, T>(
        &self,
        key: K,
        hash: u32,
        add: F,
        mut update: G,
        with_value: H,
    ) -> T
    where
        F: FnOnce() -> V,
        G: FnMut(&K, &V) -> V,
        H: FnOnce(&V) -> T,
    {
        let guard = &crossbeam_epoch::pin();
        let key = TrioArc::new(key);

        let mut add = Some(add);
        let mut add_value: ValuePtr<'_, V> = Shared::null();
        let mut add_value_stored = false;

        let result = loop {
            match self.get_in_chain(guard, hash, &*key) {
                None => {
                    if let Some(add) = add.take() {
                        add_value = value::boxed(add());
                    }

                    match self.put_in_chain(
                        guard,
                        hash,
                        Key::<K, K>::Shared(&*key),
                        add_value,
                        &ValueMatch::NullOrDead,
                    ) {
                        PutOutcome::Replaced(previous) => {
                            add_value_stored = true;
                            unsafe { value::defer_release_value(guard, previous) };
                            break with_value(unsafe { unbox(add_value) });
                        }
                        // Added by another thread. Update it.
                        PutOutcome::Rejected(_) => continue,
                    }
                }
                Some((this_key, current)) => {
                    let current_ref = unsafe { unbox(current) };
                    let new = value::boxed(update(this_key, current_ref));
                    let is_current = |v: &V| ptr::eq(v, current_ref);

                    match self.put_in_chain(
                        guard,
                        hash,
                        Key::<K, K>::Shared(&*key),
                        new,
                        &ValueMatch::OldValue(&is_current),
                    ) {
                        PutOutcome::Replaced(previous) => {
                            unsafe { value::defer_release_value(guard, previous) };
                            break with_value(unsafe { unbox(new) });
                        }
                        PutOutcome::Rejected(_) => unsafe { value::release_value(new) },
                    }
                }
            }
        };

        if !add_value_stored && !is_unset(add_value) {
            unsafe { value::release_value(add_value) };
        }

        self.promote(guard);

        result
    }

    fn get_in_chain<'g, Q>(
        &self,
        guard: &'g Guard,
        hash: u32,
        key: &Q,
    ) -> Option<(&'g K, ValuePtr<'g, V>)>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let mut table = self.current(guard);
        loop {
            match table.get(guard, hash, key) {
                Ok(found) => return found,
                Err(next) => table = next,
            }
        }
    }

    fn put_in_chain<'g, Q>(
        &self,
        guard: &'g Guard,
        hash: u32,
        key: Key<'_, K, Q>,
        new: ValuePtr<'g, V>,
        matcher: &ValueMatch<'_, V>,
    ) -> PutOutcome<'g, V>
    where
        K: Borrow<Q> + 'g,
        Q: Eq + ?Sized,
    {
        let mut table = self.current(guard);
        loop {
            match table.put_if_match(guard, hash, key, new, matcher) {
                Ok(outcome) => return outcome,
                Err(next) => {
                    table.help_copy(guard);
                    table = next;
                }
            }
        }
    }

    /// Captures a table to enumerate. An in-progress migration is finished
    /// first so that the captured table holds every entry.
    pub(crate) fn snapshot(&self) -> Snapshot<'a, K, V> {
        let guard = crossbeam_epoch::pin();

        let table = {
            let mut table = self.current(&guard);
            while let Some(next) = table.next(&guard) {
                table.copy_all(&guard);
                table = next;
            }
            self.promote(&guard);
            table as *const Table<K, V>
        };

        unsafe { Snapshot::new(guard, table) }
    }
}

impl<'a, K, V> TableRef<'a, K, V> {
    fn current<'g>(&self, guard: &'g Guard) -> &'g Table<K, V> {
        let root = self.root.load(Ordering::Acquire, guard);
        assert!(!root.is_null());

        unsafe { root.deref() }
    }

    /// Advances the root past every table whose copy is complete.
    fn promote(&self, guard: &Guard) {
        loop {
            let root_ptr = self.root.load(Ordering::Acquire, guard);
            let root = unsafe { root_ptr.deref() };
            let next_ptr = root.next_ptr(guard);

            if next_ptr.is_null() || !root.is_copy_done() {
                return;
            }

            if self
                .root
                .compare_exchange(root_ptr, next_ptr, Ordering::AcqRel, Ordering::Acquire, guard)
                .is_ok()
            {
                root.mark_promoted();

                #[cfg(feature = "logging")]
                log::debug!(
                    "Promoted a successor table. capacity: {} -> {}",
                    root.capacity(),
                    unsafe { next_ptr.deref() }.capacity()
                );

                unsafe { guard.defer_destroy(root_ptr) };
            }
        }
    }

    /// Replaces the whole table chain with an empty table. Writers that are
    /// still working on the old chain are ordered before the clear.
    pub(crate) fn clear(&self, capacity: usize) {
        let guard = &crossbeam_epoch::pin();

        let generation = Arc::new(self.current(guard).generation().renew());
        let capacity = round_capacity(capacity);
        let table = Owned::new(Table::new(capacity, generation));

        let old = self.root.swap(table, Ordering::AcqRel, guard);
        // The old table owns its unpromoted successors.
        unsafe { guard.defer_destroy(old) };

        #[cfg(feature = "logging")]
        log::trace!("Cleared the map. capacity: {capacity}");
    }

    pub(crate) fn len(&self) -> usize {
        let guard = &crossbeam_epoch::pin();
        self.current(guard).generation().size.value().max(0) as usize
    }

    pub(crate) fn estimated_len(&self) -> usize {
        let guard = &crossbeam_epoch::pin();
        self.current(guard)
            .generation()
            .size
            .estimated_value()
            .max(0) as usize
    }

    pub(crate) fn capacity(&self) -> usize {
        let guard = &crossbeam_epoch::pin();
        self.current(guard).capacity()
    }
}
