use crate::cht::Snapshot;

use std::fmt;

/// An iterator over the entries of a `NonBlockingMap`, yielding clones of
/// each key and value.
///
/// Created by [`NonBlockingMap::iter`][iter]. It walks one table and is weakly
/// consistent; see [`Snapshot`][snapshot-struct].
///
/// [iter]: ./struct.NonBlockingMap.html#method.iter
/// [snapshot-struct]: ./struct.Snapshot.html
pub struct Iter<'a, K, V> {
    snapshot: Snapshot<'a, K, V>,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(crate) fn new(snapshot: Snapshot<'a, K, V>) -> Self {
        Self { snapshot }
    }
}

impl<K, V> Iterator for Iter<'_, K, V>
where
    K: Clone,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.snapshot.move_next() {
            return None;
        }
        self.snapshot
            .current()
            .map(|(k, v)| (k.clone(), v.clone()))
    }
}

impl<K, V> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

/// An iterator over the keys of a `NonBlockingMap`.
///
/// Created by [`NonBlockingMap::keys`][keys].
///
/// [keys]: ./struct.NonBlockingMap.html#method.keys
pub struct Keys<'a, K, V> {
    snapshot: Snapshot<'a, K, V>,
}

impl<'a, K, V> Keys<'a, K, V> {
    pub(crate) fn new(snapshot: Snapshot<'a, K, V>) -> Self {
        Self { snapshot }
    }
}

impl<K: Clone, V> Iterator for Keys<'_, K, V> {
    type Item = K;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.snapshot.move_next() {
            return None;
        }
        self.snapshot.current().map(|(k, _)| k.clone())
    }
}

impl<K, V> fmt::Debug for Keys<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keys")
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

/// An iterator over the values of a `NonBlockingMap`.
///
/// Created by [`NonBlockingMap::values`][values].
///
/// [values]: ./struct.NonBlockingMap.html#method.values
pub struct Values<'a, K, V> {
    snapshot: Snapshot<'a, K, V>,
}

impl<'a, K, V> Values<'a, K, V> {
    pub(crate) fn new(snapshot: Snapshot<'a, K, V>) -> Self {
        Self { snapshot }
    }
}

impl<K, V: Clone> Iterator for Values<'_, K, V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.snapshot.move_next() {
            return None;
        }
        self.snapshot.current().map(|(_, v)| v.clone())
    }
}

impl<K, V> fmt::Debug for Values<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Values")
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

/// An iterator over the elements of a `NonBlockingSet`, yielding clones.
///
/// Created by [`NonBlockingSet::iter`][iter].
///
/// [iter]: ./struct.NonBlockingSet.html#method.iter
pub struct SetIter<'a, T> {
    keys: Keys<'a, T, ()>,
}

impl<'a, T> SetIter<'a, T> {
    pub(crate) fn new(snapshot: Snapshot<'a, T, ()>) -> Self {
        Self {
            keys: Keys::new(snapshot),
        }
    }
}

impl<T: Clone> Iterator for SetIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.keys.next()
    }
}

impl<T> fmt::Debug for SetIter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetIter")
            .field("snapshot", &self.keys.snapshot)
            .finish()
    }
}
