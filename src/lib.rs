#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Nonblocking provides a lock-free, resizable concurrent hash map and a hash
//! set built on top of it.
//!
//! The map is an open-addressing hash table in the style of Cliff Click's
//! non-blocking hash map. It is lock-free: no thread ever waits for another
//! one, and some thread always makes progress. A single operation may have to
//! retry after losing a compare-and-swap race, and a thread that finds the
//! table being resized helps the resize instead of waiting for it.
//!
//! # Features
//!
//! - Thread-safe, lock-free [`NonBlockingMap`][map-struct] and
//!   [`NonBlockingSet`][set-struct].
//!     - Lookups only read the table, unless they run into a resize that they
//!       then help finish.
//!     - Single-key updates are linearizable: conditional inserts, compare and
//!       swap style updates and removals, get-or-insert and add-or-update.
//!     - The table grows incrementally. Every thread that touches a table being
//!       copied moves a chunk of it.
//! - Weakly consistent iteration through [`Snapshot`][snapshot-struct].
//! - Exact and estimated entry counts, backed by a striped counter.
//!
//! [map-struct]: ./struct.NonBlockingMap.html
//! [set-struct]: ./struct.NonBlockingSet.html
//! [snapshot-struct]: ./struct.Snapshot.html
//!
//! # Examples
//!
//! ```rust
//! use nonblocking::NonBlockingMap;
//!
//! use std::{sync::Arc, thread};
//!
//! let map = Arc::new(NonBlockingMap::new());
//!
//! let threads: Vec<_> = (0..4u64)
//!     .map(|i| {
//!         let map = Arc::clone(&map);
//!         thread::spawn(move || {
//!             for j in 0..1000 {
//!                 // Every thread counts the same keys.
//!                 map.add_or_update(j, 1, |_, count| count + 1);
//!             }
//!             map.insert(10_000 + i, i);
//!         })
//!     })
//!     .collect();
//!
//! threads.into_iter().for_each(|t| t.join().expect("Failed"));
//!
//! assert_eq!(map.get(&0), Some(4));
//! assert_eq!(map.len(), 1004);
//! ```
//!
//! # Memory reclamation
//!
//! Values, keys and retired tables are reclaimed with
//! [`crossbeam-epoch`][crossbeam-epoch]. A value removed from the map is
//! dropped once no thread can still be reading it, which may be some time
//! after the removal.
//!
//! [crossbeam-epoch]: https://docs.rs/crossbeam-epoch
//!
//! # Minimum Supported Rust Version
//!
//! This crate requires Rust 1.65 or newer.

pub(crate) mod cht;
pub(crate) mod common;
pub mod sync;

pub use crate::{
    cht::{map::DefaultHashBuilder, snapshot::Snapshot},
    common::error::Error,
    sync::{MapBuilder, NonBlockingMap, NonBlockingSet},
};
