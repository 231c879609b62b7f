//! Value boxing and the sentinel values stored in a slot's value field.
//!
//! A value field is a tagged pointer to a reference counted [`Boxed`] value.
//! The three low bits of the pointer (available because `Boxed` is 8-byte
//! aligned) carry the slot state:
//!
//! - `PRIME_TAG`: the slot is frozen for migration.
//! - `TOMBSTONE_TAG`: the key was removed.
//! - `NULL_VALUE_TAG`: the slot holds a payload-free value (e.g. `()`).
//!
//! Sentinels are null pointers carrying tag bits, so they are compared by
//! their bit pattern and can never collide with a user value. Two of them
//! mark a frozen slot with nothing left to copy: `TOMBPRIME` (the slot held a
//! tombstone, or its value was already copied) and `EMPTYPRIME` (the value
//! field was never written).

use std::{
    mem::{self, ManuallyDrop},
    ptr::NonNull,
};

use crossbeam_epoch::{Guard, Shared};
use triomphe::Arc as TrioArc;

pub(crate) const PRIME_TAG: usize = 0b001;
pub(crate) const TOMBSTONE_TAG: usize = 0b010;
pub(crate) const NULL_VALUE_TAG: usize = 0b100;

#[repr(align(8))]
pub(crate) struct Boxed<V> {
    pub(crate) value: V,
}

pub(crate) type ValuePtr<'g, V> = Shared<'g, Boxed<V>>;

/// Returns `true` when values of type `V` carry no data and need no drop, so
/// they can be stored as the `NULLVALUE` sentinel without an allocation.
#[inline]
pub(crate) fn is_payload_free<V>() -> bool {
    mem::size_of::<V>() == 0 && !mem::needs_drop::<V>()
}

#[inline]
pub(crate) fn tombstone<'g, V>() -> ValuePtr<'g, V> {
    Shared::null().with_tag(TOMBSTONE_TAG)
}

#[inline]
pub(crate) fn tombprime<'g, V>() -> ValuePtr<'g, V> {
    Shared::null().with_tag(TOMBSTONE_TAG | PRIME_TAG)
}

#[inline]
pub(crate) fn empty_prime<'g, V>() -> ValuePtr<'g, V> {
    Shared::null().with_tag(PRIME_TAG)
}

#[inline]
pub(crate) fn null_value<'g, V>() -> ValuePtr<'g, V> {
    Shared::null().with_tag(NULL_VALUE_TAG)
}

#[inline]
pub(crate) fn is_prime<V>(ptr: ValuePtr<'_, V>) -> bool {
    ptr.tag() & PRIME_TAG != 0
}

#[inline]
pub(crate) fn prime<V>(ptr: ValuePtr<'_, V>) -> ValuePtr<'_, V> {
    ptr.with_tag(ptr.tag() | PRIME_TAG)
}

#[inline]
pub(crate) fn unprime<V>(ptr: ValuePtr<'_, V>) -> ValuePtr<'_, V> {
    ptr.with_tag(ptr.tag() & !PRIME_TAG)
}

#[inline]
pub(crate) fn is_tombstone<V>(ptr: ValuePtr<'_, V>) -> bool {
    ptr.tag() & TOMBSTONE_TAG != 0
}

#[inline]
pub(crate) fn is_tombprime<V>(ptr: ValuePtr<'_, V>) -> bool {
    ptr == tombprime()
}

#[inline]
pub(crate) fn is_empty_prime<V>(ptr: ValuePtr<'_, V>) -> bool {
    ptr == empty_prime()
}

/// The slot is frozen and holds no value (`TOMBPRIME` or `EMPTYPRIME`).
#[inline]
pub(crate) fn is_dead_prime<V>(ptr: ValuePtr<'_, V>) -> bool {
    is_prime(ptr) && !has_value(ptr)
}

/// The value field was never written.
#[inline]
pub(crate) fn is_unset<V>(ptr: ValuePtr<'_, V>) -> bool {
    ptr.is_null() && ptr.tag() == 0
}

/// The value field holds a live value (an allocated payload or `NULLVALUE`),
/// ignoring the prime bit.
#[inline]
pub(crate) fn has_value<V>(ptr: ValuePtr<'_, V>) -> bool {
    !ptr.is_null() || ptr.tag() & NULL_VALUE_TAG != 0
}

/// Boxes `value`. The returned pointer owns one strong reference.
pub(crate) fn boxed<'g, V>(value: V) -> ValuePtr<'g, V> {
    if is_payload_free::<V>() {
        mem::forget(value);
        null_value()
    } else {
        let raw = TrioArc::into_raw(TrioArc::new(Boxed { value }));
        Shared::from(raw)
    }
}

/// # Safety
///
/// `ptr` must hold a value (see [`has_value`]) that stays alive for `'g`.
#[inline]
pub(crate) unsafe fn unbox<'g, V>(ptr: ValuePtr<'g, V>) -> &'g V {
    if ptr.is_null() {
        debug_assert!(ptr.tag() & NULL_VALUE_TAG != 0);
        // Only payload-free values are stored without an allocation.
        NonNull::<V>::dangling().as_ref()
    } else {
        &ptr.deref().value
    }
}

/// Takes one more strong reference to the payload of `ptr` and returns the
/// pointer (with its tag bits cleared) that owns it.
///
/// # Safety
///
/// `ptr` must hold a value that stays alive for `'g`.
pub(crate) unsafe fn retain_value<V>(ptr: ValuePtr<'_, V>) -> ValuePtr<'_, V> {
    let ptr = unprime(ptr);
    if ptr.is_null() {
        ptr
    } else {
        Shared::from(retain_raw(ptr.as_raw()))
    }
}

/// Gives back the strong reference owned by `ptr`. Sentinels own nothing.
///
/// # Safety
///
/// The caller must own the reference.
pub(crate) unsafe fn release_value<V>(ptr: ValuePtr<'_, V>) {
    if !ptr.is_null() {
        release_raw(ptr.as_raw());
    }
}

/// Gives back the strong reference owned by `ptr` once every thread that is
/// currently pinned has unpinned.
///
/// # Safety
///
/// The caller must own the reference and no longer publish it.
pub(crate) unsafe fn defer_release_value<V>(guard: &Guard, ptr: ValuePtr<'_, V>) {
    if !ptr.is_null() {
        let raw = ptr.as_raw();
        guard.defer_unchecked(move || release_raw(raw));
    }
}

/// # Safety
///
/// `raw` must come from `TrioArc::into_raw` and still be alive.
pub(crate) unsafe fn retain_raw<T>(raw: *const T) -> *const T {
    let arc = ManuallyDrop::new(TrioArc::from_raw(raw));
    TrioArc::into_raw(TrioArc::clone(&arc))
}

/// # Safety
///
/// `raw` must come from `TrioArc::into_raw` and the caller must own the
/// reference.
pub(crate) unsafe fn release_raw<T>(raw: *const T) {
    mem::drop(TrioArc::from_raw(raw));
}
