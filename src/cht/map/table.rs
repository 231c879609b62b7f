use super::{
    reduce_hash_to_index, reprobe_limit, round_capacity,
    value::{
        self, empty_prime, has_value, is_dead_prime, is_empty_prime, is_prime, is_tombprime,
        is_tombstone, is_unset, prime, tombprime, unbox, unprime, Boxed, ValuePtr,
    },
    COPY_CHUNK, REPROBE_LIMIT, RESIZE_MILLIS_TARGET, TOMBPRIMEHASH,
};
use crate::common::counter::Counter;

use std::{
    borrow::Borrow,
    ptr,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use crossbeam_epoch::{Atomic, Guard, Owned, Shared};

/// State shared by a table and every successor it migrates into.
pub(crate) struct Generation {
    pub(crate) size: Counter,
    // Raw clock reading of the last resize. `u64::MAX` means never.
    last_resize: AtomicU64,
}

impl Generation {
    pub(crate) fn new(size: Counter) -> Self {
        Self {
            size,
            last_resize: AtomicU64::new(u64::MAX),
        }
    }

    /// Creates an empty generation with the same counter layout and clock.
    pub(crate) fn renew(&self) -> Self {
        let size = Counter::with_stripes(self.size.num_stripes(), self.size.clock().clone());
        Self::new(size)
    }
}

pub(crate) struct Slot<K, V> {
    hash: AtomicU32,
    key: Atomic<K>,
    value: Atomic<Boxed<V>>,
}

impl<K, V> Default for Slot<K, V> {
    fn default() -> Self {
        Self {
            hash: AtomicU32::new(0),
            key: Atomic::null(),
            value: Atomic::null(),
        }
    }
}

pub(crate) struct Table<K, V> {
    slots: Box<[Slot<K, V>]>,
    len_mask: usize,
    generation: Arc<Generation>,
    next: Atomic<Table<K, V>>,
    // Number of slots whose key was published by a put.
    claimed: AtomicUsize,
    copy_index: AtomicUsize,
    copy_done: AtomicUsize,
    // Set by the thread that advanced the root past this table. A promoted
    // table no longer owns its successor.
    promoted: AtomicBool,
}

/// The condition a conditional write checks against the current value.
pub(crate) enum ValueMatch<'a, V> {
    /// Always write. A removal still needs a live value to remove.
    Any,
    /// The key must be absent.
    NullOrDead,
    /// The key must be present.
    NotNullOrDead,
    /// The key must be present and its value must satisfy the predicate.
    OldValue(&'a dyn Fn(&V) -> bool),
    /// The value field must never have been written. Used to copy a frozen
    /// value into a successor table without overwriting newer writes.
    Unset,
}

impl<V> ValueMatch<'_, V> {
    fn matches(&self, current: ValuePtr<'_, V>, new: ValuePtr<'_, V>) -> bool {
        match self {
            Self::Any => !is_tombstone(new) || has_value(current),
            Self::NullOrDead => !has_value(current),
            Self::NotNullOrDead => has_value(current),
            Self::OldValue(predicate) => has_value(current) && predicate(unsafe { unbox(current) }),
            Self::Unset => is_unset(current),
        }
    }

    /// Whether this write may succeed on a key that has no slot yet.
    fn allows_absent(&self, new: ValuePtr<'_, V>) -> bool {
        !is_tombstone(new) && matches!(self, Self::Any | Self::NullOrDead | Self::Unset)
    }

    fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

pub(crate) enum PutOutcome<'g, V> {
    /// The new value was stored. Holds the value it replaced, whose reference
    /// now belongs to the caller.
    Replaced(ValuePtr<'g, V>),
    /// The match condition failed. Holds the value that was observed.
    Rejected(ValuePtr<'g, V>),
}

/// The key of a table operation.
pub(crate) enum Key<'a, K, Q: ?Sized> {
    /// Look for an existing slot only.
    Borrowed(&'a Q),
    /// A key living in a `triomphe::Arc`. It may be published in an empty
    /// slot, in which case the slot takes its own strong reference.
    Shared(&'a K),
}

impl<K, Q: ?Sized> Clone for Key<'_, K, Q> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, Q: ?Sized> Copy for Key<'_, K, Q> {}

impl<'a, K, Q> Key<'a, K, Q>
where
    K: Borrow<Q>,
    Q: Eq + ?Sized,
{
    fn is_equal(&self, other: &K) -> bool {
        match self {
            Self::Borrowed(q) => Borrow::<Q>::borrow(other) == *q,
            Self::Shared(k) => {
                ptr::eq(*k, other) || Borrow::<Q>::borrow(other) == Borrow::<Q>::borrow(*k)
            }
        }
    }

    fn shared(&self) -> Option<&'a K> {
        match self {
            Self::Borrowed(_) => None,
            Self::Shared(k) => Some(k),
        }
    }
}

impl<K, V> Table<K, V> {
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two.
    pub(crate) fn new(capacity: usize, generation: Arc<Generation>) -> Self {
        assert!(capacity.is_power_of_two());

        let slots = std::iter::repeat_with(Slot::default)
            .take(capacity)
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            len_mask: capacity - 1,
            generation,
            next: Atomic::null(),
            claimed: AtomicUsize::default(),
            copy_index: AtomicUsize::default(),
            copy_done: AtomicUsize::default(),
            promoted: AtomicBool::new(false),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn generation(&self) -> &Arc<Generation> {
        &self.generation
    }

    pub(crate) fn next<'g>(&'g self, guard: &'g Guard) -> Option<&'g Table<K, V>> {
        unsafe { self.next.load(Ordering::Acquire, guard).as_ref() }
    }

    pub(crate) fn next_ptr<'g>(&self, guard: &'g Guard) -> Shared<'g, Table<K, V>> {
        self.next.load(Ordering::Acquire, guard)
    }

    pub(crate) fn is_copy_done(&self) -> bool {
        self.copy_done.load(Ordering::Acquire) >= self.capacity()
    }

    pub(crate) fn mark_promoted(&self) {
        self.promoted.store(true, Ordering::Release);
    }

    /// Returns the live entry at `idx`, if any. A slot frozen for migration
    /// still yields the value it was frozen with.
    pub(crate) fn entry_at<'g>(&'g self, guard: &'g Guard, idx: usize) -> Option<(&'g K, &'g V)> {
        let slot = &self.slots[idx];
        let value = slot.value.load(Ordering::Acquire, guard);
        if !has_value(value) {
            return None;
        }
        let key = unsafe { slot.key.load(Ordering::Acquire, guard).as_ref() }?;
        Some((key, unsafe { unbox(unprime(value)) }))
    }

    fn adjust_size(&self, current: ValuePtr<'_, V>, new: ValuePtr<'_, V>) {
        match (has_value(current), has_value(new)) {
            (false, true) => self.generation.size.increment(),
            (true, false) => self.generation.size.decrement(),
            _ => (),
        }
    }
}

impl<K: Eq, V> Table<K, V> {
    /// Looks `key` up in this table. `Err` means the lookup has to be redone
    /// in the returned successor.
    ///
    /// The returned value pointer always holds a value and is never primed.
    #[allow(clippy::type_complexity)]
    pub(crate) fn get<'g, Q>(
        &'g self,
        guard: &'g Guard,
        hash: u32,
        key: &Q,
    ) -> Result<Option<(&'g K, ValuePtr<'g, V>)>, &'g Table<K, V>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let limit = reprobe_limit(self.len_mask);
        let mut idx = reduce_hash_to_index(hash, self.len_mask);
        let mut reprobes = 0;

        loop {
            let slot = &self.slots[idx];
            let this_hash = slot.hash.load(Ordering::Acquire);

            if this_hash == 0 {
                return self.miss(guard).map(|_| None);
            }

            if this_hash == TOMBPRIMEHASH {
                return Err(self.successor(guard));
            }

            if this_hash == hash {
                let this_key = unsafe { slot.key.load(Ordering::Acquire, guard).as_ref() };
                if let Some(this_key) = this_key.filter(|k| Borrow::<Q>::borrow(*k) == key) {
                    let value = slot.value.load(Ordering::Acquire, guard);
                    if is_prime(value) {
                        let next = self.successor(guard);
                        self.copy_slot_and_check(guard, idx, next);
                        return Err(next);
                    }
                    return Ok(has_value(value).then_some((this_key, value)));
                }
            }

            reprobes += 1;
            if reprobes >= limit {
                return self.miss(guard).map(|_| None);
            }
            idx = (idx + 1) & self.len_mask;
        }
    }

    /// Stores `new` into the slot of `key` if `matcher` accepts the current
    /// value. `Err` means the write has to be redone in the returned
    /// successor.
    ///
    /// `new` is either a boxed value owned by the caller or a tombstone. On
    /// `Replaced` its reference moves into the table.
    pub(crate) fn put_if_match<'g, Q>(
        &'g self,
        guard: &'g Guard,
        hash: u32,
        key: Key<'_, K, Q>,
        new: ValuePtr<'g, V>,
        matcher: &ValueMatch<'_, V>,
    ) -> Result<PutOutcome<'g, V>, &'g Table<K, V>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        assert!(!is_prime(new) && !is_unset(new));

        let limit = reprobe_limit(self.len_mask);
        let may_claim = key.shared().is_some() && matcher.allows_absent(new);

        let mut idx = reduce_hash_to_index(hash, self.len_mask);
        let mut reprobes = 0;
        let mut claimed = false;

        loop {
            let slot = &self.slots[idx];
            let mut this_hash = slot.hash.load(Ordering::Acquire);

            if this_hash == 0 {
                if !may_claim {
                    return self.miss(guard).map(|_| PutOutcome::Rejected(Shared::null()));
                }
                this_hash = match slot.hash.compare_exchange(
                    0,
                    hash,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => hash,
                    Err(actual) => actual,
                };
            }

            if this_hash == TOMBPRIMEHASH {
                return Err(self.successor(guard));
            }

            if this_hash == hash {
                let mut this_key = slot.key.load(Ordering::Acquire, guard);

                if this_key.is_null() && may_claim {
                    if let Some(shared) = key.shared() {
                        let owned = Shared::from(unsafe { value::retain_raw(shared as *const K) });
                        match slot.key.compare_exchange(
                            Shared::null(),
                            owned,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                            guard,
                        ) {
                            Ok(_) => {
                                claimed = true;
                                self.claimed.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => {
                                unsafe { value::release_raw(owned.as_raw()) };
                                this_key = e.current;
                            }
                        }
                    }
                }

                if claimed || unsafe { this_key.as_ref() }.map_or(false, |k| key.is_equal(k)) {
                    break;
                }
            }

            reprobes += 1;
            if reprobes >= limit {
                if may_claim {
                    // The table is too crowded for this key.
                    return Err(self.resize(guard));
                }
                return self.miss(guard).map(|_| PutOutcome::Rejected(Shared::null()));
            }
            idx = (idx + 1) & self.len_mask;
        }

        if claimed
            && reprobes >= REPROBE_LIMIT
            && self.next_ptr(guard).is_null()
            && self.claimed.load(Ordering::Relaxed) >= REPROBE_LIMIT + (self.capacity() >> 2)
        {
            self.resize(guard);
        }

        // A table with a successor accepts no more writes.
        if let Some(next) = self.next(guard) {
            self.copy_slot_and_check(guard, idx, next);
            return self.forward(guard, idx, next, matcher);
        }

        let slot = &self.slots[idx];
        let mut current = slot.value.load(Ordering::Acquire, guard);

        loop {
            if is_prime(current) {
                let next = self.successor(guard);
                self.copy_slot_and_check(guard, idx, next);
                return self.forward(guard, idx, next, matcher);
            }

            if !matcher.matches(current, new) {
                return Ok(PutOutcome::Rejected(current));
            }

            match slot.value.compare_exchange(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    if !matcher.is_unset() {
                        self.adjust_size(current, new);
                    }
                    return Ok(PutOutcome::Replaced(current));
                }
                // Lost a race. Test the condition again against the winner.
                Err(e) => current = e.current,
            }
        }
    }

    /// Decides where a write goes after the slot at `idx` was frozen. A copy
    /// of a frozen value only passes through a slot that was never written;
    /// anything else in the slot is newer than the copy.
    fn forward<'g>(
        &'g self,
        guard: &'g Guard,
        idx: usize,
        next: &'g Table<K, V>,
        matcher: &ValueMatch<'_, V>,
    ) -> Result<PutOutcome<'g, V>, &'g Table<K, V>> {
        if matcher.is_unset() {
            let frozen = self.slots[idx].value.load(Ordering::Acquire, guard);
            if !is_empty_prime(frozen) {
                return Ok(PutOutcome::Rejected(unprime(frozen)));
            }
        }
        Err(next)
    }

    /// Cooperatively copies a chunk of this table into its successor.
    pub(crate) fn help_copy<'g>(&'g self, guard: &'g Guard) {
        let Some(next) = self.next(guard) else {
            return;
        };

        if self.is_copy_done() {
            return;
        }

        let capacity = self.capacity();
        let chunk = COPY_CHUNK.min(capacity);
        let mut start = self.copy_index.load(Ordering::Acquire);

        loop {
            if start >= capacity << 1 {
                // Every chunk was handed out twice and the copy is still not
                // done. Some helper is slow; copy everything ourselves.
                self.copy_all(guard);
                return;
            }

            match self.copy_index.compare_exchange_weak(
                start,
                start + chunk,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => start = actual,
            }
        }

        let work_done = (start..start + chunk)
            .filter(|i| self.copy_slot(guard, i & self.len_mask, next))
            .count();
        self.add_copy_done(work_done);
    }

    /// Copies every slot of this table into its successor.
    pub(crate) fn copy_all<'g>(&'g self, guard: &'g Guard) {
        let Some(next) = self.next(guard) else {
            return;
        };

        let work_done = (0..self.capacity())
            .filter(|&i| self.copy_slot(guard, i, next))
            .count();
        self.add_copy_done(work_done);
    }

    /// Allocates the successor table, or returns the one another thread
    /// already allocated.
    pub(crate) fn resize<'g>(&'g self, guard: &'g Guard) -> &'g Table<K, V> {
        if let Some(next) = self.next(guard) {
            return next;
        }

        let old_capacity = self.capacity();
        let live = self.generation.size.value().max(0) as usize;

        let mut new_capacity = live;
        if live >= old_capacity >> 2 {
            new_capacity = old_capacity << 1;
            if live >= old_capacity >> 1 {
                new_capacity = old_capacity << 2;
            }
        }

        let clock = self.generation.size.clock();
        let now = clock.raw();
        let last = self.generation.last_resize.load(Ordering::Acquire);

        // Resizing again so soon into a table that is not larger means the
        // reprobe limit keeps being hit. Grow instead.
        if new_capacity <= old_capacity
            && last != u64::MAX
            && clock.delta_as_nanos(last, now) < RESIZE_MILLIS_TARGET * 1_000_000
        {
            new_capacity = old_capacity << 1;
        }

        let new_capacity = round_capacity(new_capacity.max(old_capacity));
        let new_table = Owned::new(Table::new(new_capacity, Arc::clone(&self.generation)));

        match self.next.compare_exchange(
            Shared::null(),
            new_table,
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        ) {
            Ok(next) => {
                self.generation.last_resize.store(now, Ordering::Release);

                #[cfg(feature = "logging")]
                log::debug!(
                    "Allocated a successor table. capacity: {old_capacity} -> {new_capacity}, \
                    live entries: {live}"
                );

                unsafe { next.deref() }
            }
            // Another thread won. Our table is dropped here.
            Err(e) => unsafe { e.current.deref() },
        }
    }

    fn successor<'g>(&'g self, guard: &'g Guard) -> &'g Table<K, V> {
        match self.next(guard) {
            Some(next) => next,
            None => self.resize(guard),
        }
    }

    /// The key has no slot in this table. It may still live in the successor.
    fn miss<'g>(&'g self, guard: &'g Guard) -> Result<(), &'g Table<K, V>> {
        match self.next(guard) {
            Some(next) => Err(next),
            None => Ok(()),
        }
    }

    fn add_copy_done(&self, work_done: usize) {
        if work_done > 0 {
            let done = self.copy_done.fetch_add(work_done, Ordering::AcqRel) + work_done;
            assert!(
                done <= self.capacity(),
                "copied more slots ({done}) than the table has ({})",
                self.capacity()
            );
        }
    }

    fn copy_slot_and_check<'g>(&'g self, guard: &'g Guard, idx: usize, next: &'g Table<K, V>) {
        if self.copy_slot(guard, idx, next) {
            self.add_copy_done(1);
        }
    }

    /// Freezes the slot at `idx` and copies its value into `next`. Returns
    /// `true` if this call finished the slot, so the caller accounts for it.
    fn copy_slot<'g>(&'g self, guard: &'g Guard, idx: usize, next: &'g Table<K, V>) -> bool {
        let slot = &self.slots[idx];

        // Retire an empty slot so that no key can land in it anymore.
        let _ = slot.hash.compare_exchange(
            0,
            TOMBPRIMEHASH,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        let mut old = slot.value.load(Ordering::Acquire, guard);
        while !is_prime(old) {
            let frozen = if has_value(old) {
                prime(old)
            } else if is_tombstone(old) {
                tombprime()
            } else {
                empty_prime()
            };
            match slot.value.compare_exchange(
                old,
                frozen,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    if is_dead_prime(frozen) {
                        // Nothing to copy.
                        return true;
                    }
                    old = frozen;
                }
                Err(e) => old = e.current,
            }
        }

        if is_dead_prime(old) {
            // Somebody else finished this slot.
            return false;
        }

        let payload = unprime(old);
        let hash = slot.hash.load(Ordering::Acquire);
        let key = unsafe { slot.key.load(Ordering::Acquire, guard).as_ref() }
            .unwrap_or_else(|| panic!("a slot with a value has no key (index {idx})"));

        let copy = unsafe { value::retain_value(payload) };
        if !next.copy_in(guard, hash, key, copy) {
            // A copy already made it. Ours was never published.
            unsafe { value::release_value(copy) };
        }

        match slot.value.compare_exchange(
            old,
            tombprime(),
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        ) {
            Ok(_) => {
                unsafe { value::defer_release_value(guard, payload) };
                true
            }
            Err(e) => {
                assert!(
                    is_tombprime(e.current),
                    "a frozen slot changed to something other than TOMBPRIME"
                );
                false
            }
        }
    }

    /// Installs a frozen value into this table, or into a later successor,
    /// unless the slot of `key` was already written. A slot that was frozen
    /// before anything was written to it passes the copy on to the next
    /// table. Returns `true` if `value` was installed.
    fn copy_in<'g>(&'g self, guard: &'g Guard, hash: u32, key: &K, value: ValuePtr<'g, V>) -> bool {
        let mut table = self;
        loop {
            match table.put_if_match(guard, hash, Key::<K, K>::Shared(key), value, &ValueMatch::Unset)
            {
                Ok(PutOutcome::Replaced(_)) => return true,
                Ok(PutOutcome::Rejected(_)) => return false,
                Err(next) => table = next,
            }
        }
    }
}

impl<K, V> Drop for Table<K, V> {
    fn drop(&mut self) {
        let guard = unsafe { crossbeam_epoch::unprotected() };

        for slot in self.slots.iter() {
            let key = slot.key.load(Ordering::Relaxed, guard);
            if !key.is_null() {
                unsafe { value::release_raw(key.as_raw()) };
            }
            unsafe { value::release_value(unprime(slot.value.load(Ordering::Relaxed, guard))) };
        }

        if !self.promoted.load(Ordering::Relaxed) {
            let next = self.next.load(Ordering::Relaxed, guard);
            if !next.is_null() {
                std::mem::drop(unsafe { next.into_owned() });
            }
        }
    }
}
