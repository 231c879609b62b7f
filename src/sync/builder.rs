use super::NonBlockingMap;

use std::{
    collections::hash_map::RandomState,
    hash::{BuildHasher, Hash},
    marker::PhantomData,
};

/// Builds a [`NonBlockingMap`][map-struct] with various configuration knobs.
///
/// [map-struct]: ./struct.NonBlockingMap.html
///
/// # Examples
///
/// ```rust
/// use nonblocking::MapBuilder;
///
/// let map = MapBuilder::new()
///     // Start with 1,024 slots.
///     .initial_capacity(1024)
///     // Expect up to 8 threads updating the map at the same time.
///     .concurrency_level(8)
///     // Create the map.
///     .build();
///
/// map.insert(0, "zero");
/// assert_eq!(map.get(&0), Some("zero"));
/// assert_eq!(map.capacity(), 1024);
/// ```
///
pub struct MapBuilder<K, V, C> {
    initial_capacity: Option<usize>,
    concurrency_level: Option<usize>,
    map_type: PhantomData<(K, V, C)>,
}

impl<K, V> Default for MapBuilder<K, V, NonBlockingMap<K, V, RandomState>>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            initial_capacity: None,
            concurrency_level: None,
            map_type: PhantomData,
        }
    }
}

impl<K, V> MapBuilder<K, V, NonBlockingMap<K, V, RandomState>>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Construct a new `MapBuilder` that will be used to build a
    /// `NonBlockingMap` with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a `NonBlockingMap<K, V>`.
    pub fn build(self) -> NonBlockingMap<K, V, RandomState> {
        let build_hasher = RandomState::default();
        NonBlockingMap::with_everything(
            self.initial_capacity,
            self.concurrency_level,
            build_hasher,
        )
    }

    /// Builds a `NonBlockingMap<K, V, S>`, with the given `hasher`.
    pub fn build_with_hasher<S>(self, hasher: S) -> NonBlockingMap<K, V, S>
    where
        S: BuildHasher + Clone + Send + Sync + 'static,
    {
        NonBlockingMap::with_everything(self.initial_capacity, self.concurrency_level, hasher)
    }
}

impl<K, V, C> MapBuilder<K, V, C> {
    /// Sets the initial capacity of the map.
    ///
    /// The capacity is the number of slots of the first table. It is rounded up
    /// to a power of two.
    pub fn initial_capacity(self, capacity: usize) -> Self {
        Self {
            initial_capacity: Some(capacity),
            ..self
        }
    }

    /// Sets the expected number of threads updating the map concurrently.
    ///
    /// It only sizes the striped counter that keeps the number of entries.
    /// Zero is treated as one.
    pub fn concurrency_level(self, concurrency_level: usize) -> Self {
        Self {
            concurrency_level: Some(concurrency_level),
            ..self
        }
    }
}
