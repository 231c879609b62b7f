#[macro_use]
mod tests;

use std::{
    borrow::Borrow,
    hash::{Hash, Hasher},
    ops::Deref,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use crossbeam_epoch::Owned;

/// A value that reports its drop to a shared `DropNotifier`.
///
/// `Clone` is derived so that it fits maps that require cloneable values, but
/// a clone shares the notifier and dropping it counts as a second drop. Tests
/// that track drops must only look at values through closures.
#[derive(Clone, Debug)]
pub(crate) struct NoisyDropper<T: ?Sized> {
    parent: Arc<DropNotifier>,
    pub elem: T,
}

impl<T> NoisyDropper<T> {
    pub(crate) fn new(parent: Arc<DropNotifier>, elem: T) -> Self {
        Self { parent, elem }
    }
}

impl<T: ?Sized> Drop for NoisyDropper<T> {
    fn drop(&mut self) {
        let previous = self.parent.drops.fetch_add(1, Ordering::Relaxed);
        assert_eq!(previous, 0, "a value was dropped more than once");
    }
}

impl<T: ?Sized + PartialEq> PartialEq for NoisyDropper<T> {
    fn eq(&self, other: &Self) -> bool {
        self.elem == other.elem
    }
}

impl<T: ?Sized + PartialEq> PartialEq<T> for NoisyDropper<T> {
    fn eq(&self, other: &T) -> bool {
        &self.elem == other
    }
}

impl<T: ?Sized + Eq> Eq for NoisyDropper<T> {}

impl<T: ?Sized + Hash> Hash for NoisyDropper<T> {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.elem.hash(hasher);
    }
}

impl<T: ?Sized> Borrow<T> for NoisyDropper<T> {
    fn borrow(&self) -> &T {
        &self.elem
    }
}

impl<T: ?Sized> Deref for NoisyDropper<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.elem
    }
}

#[derive(Debug, Default)]
pub(crate) struct DropNotifier {
    drops: AtomicUsize,
}

impl DropNotifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn was_dropped(&self) -> bool {
        self.drops.load(Ordering::Relaxed) > 0
    }
}

/// Pins and unpins the current thread until the garbage deferred by every
/// thread, including threads that already exited, has been collected.
pub(crate) fn run_deferred() {
    for _ in 0..65536 {
        let guard = crossbeam_epoch::pin();

        unsafe { guard.defer_destroy(Owned::new(0).into_shared(&guard)) };

        guard.flush();
    }
}
