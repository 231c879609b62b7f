//! Lock-free hash tables.
//!
//! The hash table in this crate is, at its core, an open addressing hash table
//! with linear probing. Its core is a table of slots, where each slot consists
//! of three independently settable atomic fields: a 32-bit hash, a pointer to a
//! reference-counted key and a tagged pointer to a reference-counted value.
//! Every mutation of the table is a single-word compare-and-swap (CAS) on one of
//! these fields; there are no locks anywhere in the algorithm.
//!
//! A slot goes through a fixed life cycle. It starts empty (hash `0`, no key, no
//! value). A writer claims it by CAS-ing the hash from `0` to the full hash of
//! its key and then CAS-ing the key pointer from null to its key. Once a key is
//! published in a slot it never changes for the lifetime of that table. The
//! value field then moves between unset, live values and tombstones. Removing a
//! key replaces its value with a tombstone but keeps the slot claimed; adding the
//! key again overwrites the tombstone in the same slot.
//!
//! Whether a conditional write may replace the current value is decided by a
//! match policy (`ValueMatch`): unconditionally, only if the key is absent, only
//! if it is present, or only if the current value satisfies a caller-supplied
//! predicate. A lost CAS race is always resolved by re-reading the slot and
//! re-testing the policy against the value that won.
//!
//! The key insight into making the hash table resizable is to incrementally copy
//! slots from the old table to a successor table while other threads keep using
//! both. Copying a slot first freezes it by setting a "prime" tag bit on its
//! value pointer. A frozen slot never accepts a further direct mutation: any
//! thread that observes a primed value must help finish copying that slot and
//! then redo its operation against the successor. The frozen value is installed
//! into the successor only if the successor slot for that key is still unset, so
//! a late copy never clobbers a fresher value that a writer already stored
//! there. Finally the old slot is CAS-ed to the `TOMBPRIME` sentinel, and the
//! thread that wins this CAS accounts for the copied slot. Empty slots are
//! retired with the reserved `TOMBPRIMEHASH` hash so no new key can land in a
//! table that is being drained.
//!
//! A slot whose value field was never written is frozen as `EMPTYPRIME`
//! instead of `TOMBPRIME`. A late copy arriving from an older table may pass
//! through such a slot into the next table, because no write for that key ever
//! happened there. Any other frozen slot stops the copy: its key was already
//! written in this table (by an earlier copy or by a writer), and that write
//! is newer than the late copy.
//!
//! Copying is cooperative: every thread that runs into a migration copies the
//! slot it needs and then claims a chunk of the remaining slots through an
//! atomic copy cursor. When the number of copied slots reaches the capacity of
//! the old table, the root table pointer is CAS-ed from the old table to its
//! successor, and the old table is handed to the epoch-based garbage collector.
//!
//! Memory reclamation relies on `crossbeam-epoch`. Every operation pins the
//! current thread for its whole duration, and replaced values, retired keys and
//! promoted tables are only destroyed after all pinned threads have moved on.
//! Keys and values are reference counted so that a successor table can share
//! them with the table it was copied from; each table slot owns one reference.
//!
//! This hash table algorithm follows the non-blocking hash table described by
//! Cliff Click in [a tech talk] given at Google in 2007. Additional inspiration
//! was drawn from [a blog post by Jeff Phreshing] that describes the
//! implementation of the Linear hash table in [Junction], a C++ library of
//! concurrent data structures.
//!
//! [a tech talk]: https://youtu.be/HJ-719EGIts
//! [a blog post by Jeff Phreshing]: https://preshing.com/20160222/a-resizable-concurrent-map/
//! [Junction]: https://github.com/preshing/junction

pub(crate) mod map;
pub(crate) mod snapshot;

#[cfg(test)]
#[macro_use]
pub(crate) mod test_util;

pub(crate) use map::HashMap;
pub(crate) use snapshot::Snapshot;
