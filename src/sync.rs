//! Provides thread-safe, lock-free concurrent map and set implementations.

mod builder;
mod iter;
mod map;
mod set;

pub use {
    builder::MapBuilder,
    iter::{Iter, Keys, SetIter, Values},
    map::NonBlockingMap,
    set::NonBlockingSet,
};
