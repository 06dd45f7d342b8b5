// Copyright 2025 the Engraft Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Equality predicates used to gate recomputation.
//!
//! Memoization decisions in this crate never look deeper than one level.
//! Two traits capture the two depths that matter:
//!
//! - [`RefEq`]: identity. Shared handles ([`Rc`], [`Arc`]) compare by pointer;
//!   plain values (numbers, strings, `bool`) have no identity and compare by
//!   value.
//! - [`ShallowEq`]: one level down. Sequences compare element by element,
//!   mappings compare value by value under matching keys, and tuples or props
//!   structs compare field by field, each with [`RefEq`].
//!
//! The free functions cover the cases where an explicit element equality is
//! wanted instead of [`RefEq`].
//!
//! ```rust
//! use std::rc::Rc;
//! use engraft_refunc::eq::{RefEq, ShallowEq};
//!
//! let a = Rc::new(String::from("a"));
//! let a2 = Rc::new(String::from("a"));
//!
//! // Equal contents, different allocations.
//! assert!(!a.ref_eq(&a2));
//! assert!(vec![a.clone(), a.clone()].shallow_eq(&vec![a.clone(), a.clone()]));
//! assert!(!vec![a.clone()].shallow_eq(&vec![a2]));
//! ```

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::rc::Rc;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::hash::{BuildHasher, Hash};

use hashbrown::{HashMap, HashSet};

/// Identity equality.
///
/// For shared handles this is pointer equality. Values without identity
/// (scalars, strings) compare by value.
pub trait RefEq {
    /// Returns `true` if `self` and `other` are the same reference.
    fn ref_eq(&self, other: &Self) -> bool;
}

/// Equality one level deep, using [`RefEq`] on each component.
pub trait ShallowEq {
    /// Returns `true` if every component of `self` is [`RefEq`] to the
    /// matching component of `other`.
    fn shallow_eq(&self, other: &Self) -> bool;
}

/// Free-function form of [`RefEq::ref_eq`].
#[inline]
pub fn ref_eq<T: RefEq + ?Sized>(a: &T, b: &T) -> bool {
    a.ref_eq(b)
}

/// Same length, and every pair of elements is equal under `eq`, in order.
pub fn arr_eq_with<T>(a: &[T], b: &[T], eq: impl Fn(&T, &T) -> bool) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| eq(x, y))
}

/// [`arr_eq_with`] using [`RefEq`] on the elements.
pub fn arr_eq_with_ref_eq<T: RefEq>(a: &[T], b: &[T]) -> bool {
    arr_eq_with(a, b, T::ref_eq)
}

/// Same key set, and the values under each key are equal under `eq`.
///
/// Key order is irrelevant.
pub fn map_eq_with<K, V, S>(
    a: &HashMap<K, V, S>,
    b: &HashMap<K, V, S>,
    eq: impl Fn(&V, &V) -> bool,
) -> bool
where
    K: Eq + Hash,
    S: BuildHasher,
{
    a.len() == b.len()
        && a.iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| eq(value, other)))
}

/// [`map_eq_with`] using [`RefEq`] on the values.
pub fn map_eq_with_ref_eq<K, V, S>(a: &HashMap<K, V, S>, b: &HashMap<K, V, S>) -> bool
where
    K: Eq + Hash,
    V: RefEq,
    S: BuildHasher,
{
    map_eq_with(a, b, V::ref_eq)
}

/// Same cardinality, and every element of `a` is present in `b`.
///
/// Membership uses the element's own `Eq`/`Hash`.
pub fn set_eq<T, S>(a: &HashSet<T, S>, b: &HashSet<T, S>) -> bool
where
    T: Eq + Hash,
    S: BuildHasher,
{
    a.len() == b.len() && a.iter().all(|elem| b.contains(elem))
}

/// Compares pairs component-wise with one equality per component.
pub fn pair_eq_with<A, B>(
    eq_a: impl Fn(&A, &A) -> bool,
    eq_b: impl Fn(&B, &B) -> bool,
) -> impl Fn(&(A, B), &(A, B)) -> bool {
    move |x, y| eq_a(&x.0, &y.0) && eq_b(&x.1, &y.1)
}

// -----------------------------------------------------------------------------
// RefEq impls

impl<T: ?Sized> RefEq for Rc<T> {
    #[inline]
    fn ref_eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl<T: ?Sized> RefEq for Arc<T> {
    #[inline]
    fn ref_eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl<T: RefEq + ?Sized> RefEq for &T {
    #[inline]
    fn ref_eq(&self, other: &Self) -> bool {
        (**self).ref_eq(*other)
    }
}

impl<T: RefEq> RefEq for Option<T> {
    fn ref_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.ref_eq(b),
            (None, None) => true,
            _ => false,
        }
    }
}

macro_rules! value_ref_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl RefEq for $ty {
                #[inline]
                fn ref_eq(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

value_ref_eq!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    str,
    String,
);

// -----------------------------------------------------------------------------
// ShallowEq impls

impl ShallowEq for () {
    #[inline]
    fn shallow_eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T: RefEq> ShallowEq for [T] {
    fn shallow_eq(&self, other: &Self) -> bool {
        arr_eq_with_ref_eq(self, other)
    }
}

impl<T: RefEq, const N: usize> ShallowEq for [T; N] {
    fn shallow_eq(&self, other: &Self) -> bool {
        arr_eq_with_ref_eq(self, other)
    }
}

impl<T: RefEq> ShallowEq for Vec<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        arr_eq_with_ref_eq(self, other)
    }
}

impl<K, V, S> ShallowEq for HashMap<K, V, S>
where
    K: Eq + Hash,
    V: RefEq,
    S: BuildHasher,
{
    fn shallow_eq(&self, other: &Self) -> bool {
        map_eq_with_ref_eq(self, other)
    }
}

impl<K: Ord, V: RefEq> ShallowEq for BTreeMap<K, V> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|o| value.ref_eq(o)))
    }
}

impl<T, S> ShallowEq for HashSet<T, S>
where
    T: Eq + Hash,
    S: BuildHasher,
{
    fn shallow_eq(&self, other: &Self) -> bool {
        set_eq(self, other)
    }
}

impl<T: Ord> ShallowEq for BTreeSet<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self == other
    }
}

/// A shared handle is shallow-equal to another if it is the same handle, or
/// if the values behind both are shallow-equal.
impl<T: ShallowEq + ?Sized> ShallowEq for Rc<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other) || (**self).shallow_eq(other)
    }
}

macro_rules! tuple_eq {
    ($($name:ident $idx:tt),+) => {
        impl<$($name: RefEq),+> RefEq for ($($name,)+) {
            #[inline]
            fn ref_eq(&self, other: &Self) -> bool {
                $(self.$idx.ref_eq(&other.$idx))&&+
            }
        }

        impl<$($name: RefEq),+> ShallowEq for ($($name,)+) {
            #[inline]
            fn shallow_eq(&self, other: &Self) -> bool {
                $(self.$idx.ref_eq(&other.$idx))&&+
            }
        }
    };
}

tuple_eq!(A 0);
tuple_eq!(A 0, B 1);
tuple_eq!(A 0, B 1, C 2);
tuple_eq!(A 0, B 1, C 2, D 3);
tuple_eq!(A 0, B 1, C 2, D 3, E 4);
tuple_eq!(A 0, B 1, C 2, D 3, E 4, F 5);
