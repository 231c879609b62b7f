use super::{
    iter::{Iter, Keys, Values},
    MapBuilder,
};
use crate::{
    cht::{
        map::{table::ValueMatch, DEFAULT_CAPACITY},
        HashMap, Snapshot,
    },
    common::error::Error,
};

use std::{
    borrow::Borrow,
    collections::hash_map::RandomState,
    fmt,
    hash::{BuildHasher, Hash},
};

/// A thread-safe, lock-free concurrent hash map.
///
/// `NonBlockingMap` supports full concurrency of retrievals and updates. No
/// operation ever takes a lock. A lookup only reads the table unless it runs
/// into a table being copied, and a single-key update is a few
/// compare-and-swap operations on one slot of an open-addressing table. An
/// operation that loses a race retries, so the map is lock-free rather than
/// wait-free.
///
/// When the table gets crowded, a larger table is allocated and the entries
/// are copied into it incrementally. Threads that run into a table being
/// copied help with the copy before they proceed, so no thread ever waits for
/// another one.
///
/// # Examples
///
/// ```rust
/// use nonblocking::NonBlockingMap;
///
/// use std::{sync::Arc, thread};
///
/// fn value(n: usize) -> String {
///     format!("value {}", n)
/// }
///
/// const NUM_THREADS: usize = 16;
/// const NUM_KEYS_PER_THREAD: usize = 64;
///
/// let map = Arc::new(NonBlockingMap::new());
///
/// // Spawn threads and read and update the map simultaneously.
/// let threads: Vec<_> = (0..NUM_THREADS)
///     .map(|i| {
///         let my_map = Arc::clone(&map);
///         let start = i * NUM_KEYS_PER_THREAD;
///         let end = (i + 1) * NUM_KEYS_PER_THREAD;
///
///         thread::spawn(move || {
///             for key in start..end {
///                 my_map.insert(key, value(key));
///                 // get() returns Option<String>, a clone of the stored value.
///                 assert_eq!(my_map.get(&key), Some(value(key)));
///             }
///
///             // Remove every 4th entry.
///             for key in (start..end).step_by(4) {
///                 my_map.remove(&key);
///             }
///         })
///     })
///     .collect();
///
/// threads.into_iter().for_each(|t| t.join().expect("Failed"));
///
/// for key in 0..(NUM_THREADS * NUM_KEYS_PER_THREAD) {
///     if key % 4 == 0 {
///         assert_eq!(map.get(&key), None);
///     } else {
///         assert_eq!(map.get(&key), Some(value(key)));
///     }
/// }
/// ```
///
/// # Avoiding to clone the value at `get`
///
/// The return type of `get` method is `Option<V>` instead of `Option<&V>`,
/// because another thread can replace or remove the value at any time. If
/// cloning is expensive, either wrap the values in `std::sync::Arc`, or use
/// [`get_and`](#method.get_and) to work with a reference inside a closure.
///
/// # Consistency
///
/// Every operation on a single key is linearizable. `len` and iteration are
/// not atomic with respect to concurrent writers: an iterator walks the table
/// that was current when it was created and may miss entries written after
/// that.
///
/// # Hashing Algorithm
///
/// By default, `NonBlockingMap` uses a hashing algorithm selected to provide
/// resistance against HashDoS attacks. It will be the same one used by
/// `std::collections::HashMap`, which is currently SipHash 1-3.
///
/// The hashing algorithm can be replaced on a per-`NonBlockingMap` basis using
/// the [`build_with_hasher`][build-with-hasher-method] method of the
/// `MapBuilder`, or [`with_hasher`](#method.with_hasher).
///
/// [build-with-hasher-method]: ./struct.MapBuilder.html#method.build_with_hasher
pub struct NonBlockingMap<K, V, S = RandomState> {
    base: HashMap<K, V, S>,
}

impl<K, V> NonBlockingMap<K, V, RandomState>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Constructs a new, empty `NonBlockingMap` with the default initial
    /// capacity.
    pub fn new() -> Self {
        Self::with_everything(None, None, RandomState::default())
    }

    /// Constructs a new, empty `NonBlockingMap` whose first table has at least
    /// `capacity` slots.
    ///
    /// The capacity is rounded up to a power of two. It is the number of
    /// slots, not the number of entries the map can hold without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_everything(Some(capacity), None, RandomState::default())
    }

    /// Returns a [`MapBuilder`][builder-struct], which can build a
    /// `NonBlockingMap` with a custom concurrency level or hasher.
    ///
    /// [builder-struct]: ./struct.MapBuilder.html
    pub fn builder() -> MapBuilder<K, V, NonBlockingMap<K, V, RandomState>> {
        MapBuilder::default()
    }
}

impl<K, V, S> NonBlockingMap<K, V, S> {
    /// Returns the number of entries in this map.
    ///
    /// This sums the striped entry counter. Concurrent writers can make the
    /// result stale as soon as it is returned.
    pub fn len(&self) -> usize {
        self.base.len()
    }

    /// Returns a cheaper approximation of `len`, refreshed at most once per
    /// millisecond.
    pub fn estimated_len(&self) -> usize {
        self.base.estimated_len()
    }

    /// Returns `true` if this map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of slots of the current table.
    pub fn capacity(&self) -> usize {
        self.base.capacity()
    }

    /// Removes every entry.
    ///
    /// The map starts over with an empty table of the initial capacity. A
    /// write that races with `clear` may land in the discarded table, in which
    /// case it is ordered before the clear.
    pub fn clear(&self) {
        self.base.clear(None);
    }

    /// Removes every entry and starts over with an empty table of at least
    /// `capacity` slots.
    pub fn clear_with_capacity(&self, capacity: usize) {
        self.base.clear(Some(capacity));
    }

    /// Returns a reference to the map's `BuildHasher`.
    pub fn hasher(&self) -> &S {
        self.base.hasher()
    }
}

impl<K, V, S> NonBlockingMap<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    /// Constructs a new, empty `NonBlockingMap` that uses `build_hasher` to
    /// hash the keys.
    pub fn with_hasher(build_hasher: S) -> Self {
        Self::with_everything(None, None, build_hasher)
    }

    /// Constructs a new, empty `NonBlockingMap` with at least `capacity` slots
    /// that uses `build_hasher` to hash the keys.
    pub fn with_capacity_and_hasher(capacity: usize, build_hasher: S) -> Self {
        Self::with_everything(Some(capacity), None, build_hasher)
    }

    pub(crate) fn with_everything(
        initial_capacity: Option<usize>,
        concurrency_level: Option<usize>,
        build_hasher: S,
    ) -> Self {
        Self {
            base: HashMap::with_everything(
                initial_capacity.unwrap_or(DEFAULT_CAPACITY),
                concurrency_level,
                build_hasher,
            ),
        }
    }

    /// Returns a _clone_ of the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but `Hash` and
    /// `Eq` on the borrowed form _must_ match those for the key type.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.base.get_key_value_and(key, |_, v| v.clone())
    }

    /// Calls `with_value` with a reference to the value corresponding to the
    /// key, and returns its result.
    ///
    /// The reference stays valid for the whole call even if another thread
    /// removes the entry meanwhile.
    pub fn get_and<Q, F, T>(&self, key: &Q, with_value: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> T,
    {
        self.base.get_key_value_and(key, |_, v| with_value(v))
    }

    /// Returns clones of the stored key and the value corresponding to `key`.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q> + Clone,
        Q: Hash + Eq + ?Sized,
    {
        self.base
            .get_key_value_and(key, |k, v| (k.clone(), v.clone()))
    }

    /// Returns `true` if the map contains a value for the key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.base.get_key_value_and(key, |_, _| ()).is_some()
    }

    /// Returns a _clone_ of the value corresponding to the key, or
    /// [`Error::KeyNotFound`][key-not-found] if the key is absent.
    ///
    /// [key-not-found]: ./enum.Error.html#variant.KeyNotFound
    pub fn try_get<Q>(&self, key: &Q) -> Result<V, Error>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).ok_or(Error::KeyNotFound)
    }

    /// Inserts a key-value pair into the map if the key is absent. Returns
    /// `true` if the pair was inserted.
    pub fn try_insert(&self, key: K, value: V) -> bool {
        self.base
            .insert_if_match_and(key, value, &ValueMatch::NullOrDead, |_| ())
            .is_replaced()
    }

    /// Inserts a key-value pair into the map, replacing the current value if
    /// the key is present. Returns the replaced value.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.base
            .insert_if_match_and(key, value, &ValueMatch::Any, V::clone)
            .into_previous()
    }

    /// Replaces the value of the key with `new_value` if its current value is
    /// equal to `comparison`. Returns `true` if the value was replaced.
    pub fn try_update<Q>(&self, key: &Q, new_value: V, comparison: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let is_expected = |current: &V| current == comparison;
        self.base
            .update_if_match_and(
                key,
                Some(new_value),
                &ValueMatch::OldValue(&is_expected),
                |_| (),
            )
            .is_replaced()
    }

    /// Replaces the value of the key if the key is present. Returns the
    /// replaced value. Does nothing if the key is absent.
    pub fn update<Q>(&self, key: &Q, value: V) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.base
            .update_if_match_and(key, Some(value), &ValueMatch::NotNullOrDead, V::clone)
            .into_previous()
    }

    /// Removes the key from the map, returning the value it had.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_and(key, V::clone)
    }

    /// Removes the key from the map, and returns the result of calling
    /// `with_previous_value` with the value it had.
    pub fn remove_and<Q, F, T>(&self, key: &Q, with_previous_value: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> T,
    {
        self.base
            .update_if_match_and(key, None, &ValueMatch::Any, with_previous_value)
            .into_previous()
    }

    /// Removes the key from the map if its current value is equal to `value`.
    /// Returns `true` if the entry was removed.
    pub fn remove_if_eq<Q>(&self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let is_expected = |current: &V| current == value;
        self.base
            .update_if_match_and(key, None, &ValueMatch::OldValue(&is_expected), |_| ())
            .is_replaced()
    }

    /// Inserts `value` if the key is absent, or replaces the current value
    /// with the result of `update`. Returns a _clone_ of the value that ended
    /// up stored.
    ///
    /// `update` may be called more than once when other threads update the
    /// same key concurrently. Only the value computed from the latest current
    /// value is stored.
    pub fn add_or_update(
        &self,
        key: K,
        value: V,
        update: impl FnMut(&K, &V) -> V,
    ) -> V {
        self.base
            .add_or_update_with_and(key, || value, update, V::clone)
    }

    /// Like [`add_or_update`](#method.add_or_update), but computes the value
    /// to insert with `add`, which is called at most once.
    pub fn add_or_update_with(
        &self,
        key: K,
        add: impl FnOnce() -> V,
        update: impl FnMut(&K, &V) -> V,
    ) -> V {
        self.base
            .add_or_update_with_and(key, add, update, V::clone)
    }

    /// Returns a _clone_ of the value corresponding to the key. If the key is
    /// absent, inserts `value` and returns a clone of it.
    pub fn get_or_insert(&self, key: K, value: V) -> V {
        self.base.get_or_insert_with_and(key, || value, V::clone)
    }

    /// Returns a _clone_ of the value corresponding to the key. If the key is
    /// absent, inserts the value returned by `init`.
    ///
    /// When several threads race on an absent key, `init` may run on more than
    /// one of them, but exactly one value is stored and every racer returns
    /// that value.
    pub fn get_or_insert_with(&self, key: K, init: impl FnOnce() -> V) -> V {
        self.base.get_or_insert_with_and(key, init, V::clone)
    }

    /// Returns a lazy, restartable traversal over the entries of this map.
    ///
    /// See [`Snapshot`][snapshot-struct] for the consistency it offers.
    ///
    /// [snapshot-struct]: ./struct.Snapshot.html
    pub fn snapshot(&self) -> Snapshot<'_, K, V> {
        self.base.snapshot()
    }

    /// Creates an iterator visiting all key-value pairs in arbitrary order. The
    /// iterator element type is `(K, V)`, a clone of each entry.
    ///
    /// The iterator keeps the current thread pinned to the garbage collector
    /// of the map. Drop it when you are done with it.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self.snapshot())
    }

    /// Creates an iterator visiting a clone of every key in arbitrary order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys::new(self.snapshot())
    }

    /// Creates an iterator visiting a clone of every value in arbitrary order.
    pub fn values(&self) -> Values<'_, K, V> {
        Values::new(self.snapshot())
    }
}

impl<K, V, S> Default for NonBlockingMap<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> fmt::Debug for NonBlockingMap<K, V, S>
where
    K: fmt::Debug + Hash + Eq + Send + Sync + 'static,
    V: fmt::Debug + Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d_map = f.debug_map();
        let mut snapshot = self.snapshot();

        while snapshot.move_next() {
            if let Some((k, v)) = snapshot.current() {
                d_map.entry(k, v);
            }
        }

        d_map.finish()
    }
}

impl<K, V, S> FromIterator<(K, V)> for NonBlockingMap<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Default + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let map = Self::with_capacity_and_hasher(iter.size_hint().0, S::default());
        iter.for_each(|(k, v)| {
            map.insert(k, v);
        });
        map
    }
}

impl<K, V, S> Extend<(K, V)> for NonBlockingMap<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        iter.into_iter().for_each(|(k, v)| {
            self.insert(k, v);
        });
    }
}
