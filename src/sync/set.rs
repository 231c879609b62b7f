use super::{iter::SetIter, NonBlockingMap};
use crate::common::error::Error;

use std::{
    borrow::Borrow,
    collections::hash_map::RandomState,
    fmt,
    hash::{BuildHasher, Hash},
};

/// A thread-safe, lock-free concurrent hash set.
///
/// `NonBlockingSet` is a [`NonBlockingMap`][map-struct] whose values carry no
/// payload. It has the same progress and consistency guarantees.
///
/// The set algebra operations (`union_with`, `is_subset_of` and so on) cannot
/// be made atomic against concurrent writers, so they are not supported and
/// return [`Error::Unsupported`][unsupported].
///
/// # Examples
///
/// ```rust
/// use nonblocking::{Error, NonBlockingSet};
///
/// let set = NonBlockingSet::new();
///
/// assert!(set.insert("apple"));
/// assert!(!set.insert("apple"));
/// assert!(set.contains(&"apple"));
///
/// assert_eq!(
///     set.union_with(["banana"]),
///     Err(Error::Unsupported("union_with"))
/// );
///
/// assert!(set.remove(&"apple"));
/// assert!(set.is_empty());
/// ```
///
/// [map-struct]: ./struct.NonBlockingMap.html
/// [unsupported]: ./enum.Error.html#variant.Unsupported
pub struct NonBlockingSet<T, S = RandomState> {
    map: NonBlockingMap<T, (), S>,
}

impl<T> NonBlockingSet<T, RandomState>
where
    T: Hash + Eq + Send + Sync + 'static,
{
    /// Constructs a new, empty `NonBlockingSet` with the default initial
    /// capacity.
    pub fn new() -> Self {
        Self {
            map: NonBlockingMap::new(),
        }
    }

    /// Constructs a new, empty `NonBlockingSet` whose first table has at least
    /// `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: NonBlockingMap::with_capacity(capacity),
        }
    }
}

impl<T, S> NonBlockingSet<T, S> {
    /// Returns the number of elements in this set.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns a cheaper approximation of `len`.
    pub fn estimated_len(&self) -> usize {
        self.map.estimated_len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the number of slots of the current table.
    pub fn capacity(&self) -> usize {
        self.map.capacity()
    }

    /// Removes every element.
    pub fn clear(&self) {
        self.map.clear();
    }
}

impl<T, S> NonBlockingSet<T, S>
where
    T: Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub fn with_hasher(build_hasher: S) -> Self {
        Self {
            map: NonBlockingMap::with_hasher(build_hasher),
        }
    }

    pub fn with_capacity_and_hasher(capacity: usize, build_hasher: S) -> Self {
        Self {
            map: NonBlockingMap::with_capacity_and_hasher(capacity, build_hasher),
        }
    }

    /// Adds `value` to the set. Returns `true` if it was not present.
    pub fn insert(&self, value: T) -> bool {
        self.map.try_insert(value, ())
    }

    /// Removes `value` from the set. Returns `true` if it was present.
    pub fn remove<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.remove_and(value, |_| ()).is_some()
    }

    /// Returns `true` if the set contains `value`.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(value)
    }

    /// Creates an iterator visiting a clone of every element in arbitrary
    /// order.
    pub fn iter(&self) -> SetIter<'_, T> {
        SetIter::new(self.map.snapshot())
    }

    pub fn union_with<I>(&self, _other: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
    {
        Err(Error::Unsupported("union_with"))
    }

    pub fn intersect_with<I>(&self, _other: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
    {
        Err(Error::Unsupported("intersect_with"))
    }

    pub fn except_with<I>(&self, _other: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
    {
        Err(Error::Unsupported("except_with"))
    }

    pub fn symmetric_except_with<I>(&self, _other: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
    {
        Err(Error::Unsupported("symmetric_except_with"))
    }

    pub fn is_subset_of<I>(&self, _other: I) -> Result<bool, Error>
    where
        I: IntoIterator<Item = T>,
    {
        Err(Error::Unsupported("is_subset_of"))
    }

    pub fn is_superset_of<I>(&self, _other: I) -> Result<bool, Error>
    where
        I: IntoIterator<Item = T>,
    {
        Err(Error::Unsupported("is_superset_of"))
    }

    pub fn is_proper_subset_of<I>(&self, _other: I) -> Result<bool, Error>
    where
        I: IntoIterator<Item = T>,
    {
        Err(Error::Unsupported("is_proper_subset_of"))
    }

    pub fn is_proper_superset_of<I>(&self, _other: I) -> Result<bool, Error>
    where
        I: IntoIterator<Item = T>,
    {
        Err(Error::Unsupported("is_proper_superset_of"))
    }

    pub fn overlaps<I>(&self, _other: I) -> Result<bool, Error>
    where
        I: IntoIterator<Item = T>,
    {
        Err(Error::Unsupported("overlaps"))
    }

    pub fn set_equals<I>(&self, _other: I) -> Result<bool, Error>
    where
        I: IntoIterator<Item = T>,
    {
        Err(Error::Unsupported("set_equals"))
    }
}

impl<T, S> Default for NonBlockingSet<T, S>
where
    T: Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<T, S> fmt::Debug for NonBlockingSet<T, S>
where
    T: fmt::Debug + Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d_set = f.debug_set();
        let mut snapshot = self.map.snapshot();

        while snapshot.move_next() {
            if let Some((element, _)) = snapshot.current() {
                d_set.entry(element);
            }
        }

        d_set.finish()
    }
}

impl<T, S> FromIterator<T> for NonBlockingSet<T, S>
where
    T: Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Clone + Default + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let set = Self::with_capacity_and_hasher(iter.size_hint().0, S::default());
        iter.for_each(|element| {
            set.insert(element);
        });
        set
    }
}

impl<T, S> Extend<T> for NonBlockingSet<T, S>
where
    T: Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        iter.into_iter().for_each(|element| {
            self.insert(element);
        });
    }
}
