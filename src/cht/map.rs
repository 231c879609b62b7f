//! A lock-free hash map implemented with a slot array, open addressing, linear
//! probing and cooperative incremental resizing.

pub(crate) mod table;
pub(crate) mod table_ref;
pub(crate) mod value;

use self::{
    table::{Generation, Key, Table, ValueMatch},
    table_ref::{PutResult, TableRef},
};
use crate::{cht::snapshot::Snapshot, common::counter::Counter};

use std::{
    borrow::Borrow,
    hash::{BuildHasher, Hash, Hasher},
    sync::{atomic::Ordering, Arc},
};

use crossbeam_epoch::{Atomic, Shared};
use triomphe::Arc as TrioArc;

/// Default hasher for `HashMap`.
pub type DefaultHashBuilder = std::collections::hash_map::RandomState;

/// Marks a key whose folded hash is zero, because `0` means an empty slot.
pub(crate) const ZEROHASH: u32 = 1 << 30;
/// Marks an empty slot that was retired while its table was being copied.
pub(crate) const TOMBPRIMEHASH: u32 = 1 << 31;
/// Set on every regular hash.
pub(crate) const SPECIAL_HASH_BITS: u32 = ZEROHASH | TOMBPRIMEHASH;

pub(crate) const REPROBE_LIMIT: usize = 4;
pub(crate) const REPROBE_LIMIT_SHIFT: u32 = 8;

pub(crate) const MIN_CAPACITY: usize = 8;
pub(crate) const DEFAULT_CAPACITY: usize = 16;
// The two top bits of a hash are reserved, so an index never needs them.
pub(crate) const MAX_CAPACITY: usize = 1 << 30;

pub(crate) const COPY_CHUNK: usize = 1024;
pub(crate) const RESIZE_MILLIS_TARGET: u64 = 1000;

pub(crate) fn hash<K, H>(build_hasher: &H, key: &K) -> u64
where
    K: ?Sized + Hash,
    H: BuildHasher,
{
    let mut hasher = build_hasher.build_hasher();
    key.hash(&mut hasher);

    hasher.finish()
}

/// Folds a 64-bit hash into the 32-bit form stored in a slot.
pub(crate) fn full_hash(hash: u64) -> u32 {
    let folded = (hash ^ (hash >> 32)) as u32;
    if folded == 0 {
        ZEROHASH
    } else {
        folded | SPECIAL_HASH_BITS
    }
}

#[inline]
pub(crate) fn reduce_hash_to_index(full_hash: u32, len_mask: usize) -> usize {
    full_hash as usize & len_mask
}

/// How many slots an operation probes before giving up on a table.
#[inline]
pub(crate) fn reprobe_limit(len_mask: usize) -> usize {
    REPROBE_LIMIT + (len_mask >> REPROBE_LIMIT_SHIFT)
}

/// Rounds a requested capacity to the power of two a table is created with.
pub(crate) fn round_capacity(requested: usize) -> usize {
    requested
        .max(MIN_CAPACITY)
        .checked_next_power_of_two()
        .unwrap_or(MAX_CAPACITY)
        .min(MAX_CAPACITY)
}

pub(crate) struct HashMap<K, V, S = DefaultHashBuilder> {
    root: Atomic<Table<K, V>>,
    build_hasher: S,
    initial_capacity: usize,
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates an empty `HashMap` whose first table holds `capacity` slots
    /// (rounded up to a power of two, at least `MIN_CAPACITY`), and whose entry
    /// counter has `num_stripes` stripes, or a default number of stripes.
    pub(crate) fn with_everything(
        capacity: usize,
        num_stripes: Option<usize>,
        build_hasher: S,
    ) -> Self {
        let size = num_stripes.map_or_else(Counter::default, |n| {
            Counter::with_stripes(n, quanta::Clock::new())
        });
        let generation = Generation::new(size);
        let initial_capacity = round_capacity(capacity);
        let table = Table::new(initial_capacity, Arc::new(generation));

        Self {
            root: Atomic::new(table),
            build_hasher,
            initial_capacity,
        }
    }

    pub(crate) fn hasher(&self) -> &S {
        &self.build_hasher
    }

    /// Returns the number of entries. Concurrent writers can change it at any
    /// time.
    pub(crate) fn len(&self) -> usize {
        self.tables().len()
    }

    /// Returns a cheaper, possibly stale, number of entries.
    pub(crate) fn estimated_len(&self) -> usize {
        self.tables().estimated_len()
    }

    /// Returns the number of slots of the current table.
    pub(crate) fn capacity(&self) -> usize {
        self.tables().capacity()
    }

    /// Replaces every table with an empty one of `capacity` slots, or of the
    /// initial capacity if `None`.
    pub(crate) fn clear(&self, capacity: Option<usize>) {
        self.tables()
            .clear(capacity.unwrap_or(self.initial_capacity));
    }

    fn tables(&self) -> TableRef<'_, K, V> {
        TableRef { root: &self.root }
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    #[inline]
    pub(crate) fn hash<Q>(&self, key: &Q) -> u32
    where
        Q: Hash + ?Sized,
    {
        full_hash(hash(&self.build_hasher, key))
    }

    pub(crate) fn get_key_value_and<Q, F, T>(&self, key: &Q, with_entry: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&K, &V) -> T,
    {
        let hash = self.hash(key);
        self.tables().get_key_value_and(key, hash, with_entry)
    }

    /// Writes `value` for `key` if `matcher` accepts the current value. The
    /// key gets a slot if it has none and the condition allows absent keys.
    pub(crate) fn insert_if_match_and<F, T>(
        &self,
        key: K,
        value: V,
        matcher: &ValueMatch<'_, V>,
        with_value: F,
    ) -> PutResult<T>
    where
        F: FnOnce(&V) -> T,
    {
        let hash = self.hash(&key);
        let key = TrioArc::new(key);
        self.tables().put_if_match_and(
            Key::<K, K>::Shared(&*key),
            hash,
            Some(value),
            matcher,
            with_value,
        )
    }

    /// Writes `value`, or removes the entry if `value` is `None`, for an
    /// existing `key` if `matcher` accepts its current value.
    pub(crate) fn update_if_match_and<Q, F, T>(
        &self,
        key: &Q,
        value: Option<V>,
        matcher: &ValueMatch<'_, V>,
        with_value: F,
    ) -> PutResult<T>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> T,
    {
        let hash = self.hash(key);
        self.tables()
            .put_if_match_and(Key::Borrowed(key), hash, value, matcher, with_value)
    }

    pub(crate) fn get_or_insert_with_and<F, G, T>(&self, key: K, init: F, with_value: G) -> T
    where
        F: FnOnce() -> V,
        G: FnOnce(&V) -> T,
    {
        let hash = self.hash(&key);
        self.tables()
            .get_or_insert_with_and(key, hash, init, with_value)
    }

    pub(crate) fn add_or_update_with_and<F, G, H, T>(
        &self,
        key: K,
        add: F,
        update: G,
        with_value: H,
    ) -> T
    where
        F: FnOnce() -> V,
        G: FnMut(&K, &V) -> V,
        H: FnOnce(&V) -> T,
    {
        let hash = self.hash(&key);
        self.tables()
            .add_or_update_with_and(key, hash, add, update, with_value)
    }

    pub(crate) fn snapshot(&self) -> Snapshot<'_, K, V> {
        self.tables().snapshot()
    }
}

impl<K, V, S> Drop for HashMap<K, V, S> {
    fn drop(&mut self) {
        // `&mut self` proves that no other thread can reach the tables.
        let guard = unsafe { crossbeam_epoch::unprotected() };
        let root = self.root.swap(Shared::null(), Ordering::Relaxed, guard);
        if !root.is_null() {
            std::mem::drop(unsafe { root.into_owned() });
        }
    }
}
