#![allow(unstable_name_collisions)]
//! A lock-free, dynamically resizable hash table keyed by 64-bit integers,
//! based on split-ordered lists.
//!
//! All entries live in a single sorted linked list; buckets are lazily
//! created anchors into it. Growing the table publishes a new array
//! segment of bucket slots and nothing else: no entry is ever rehashed or
//! moved, and no operation ever takes a lock.
//!
//! # Usage
//!
//! Operations require a [`Guard`], which keeps the memory an operation
//! may be reading from alive until the guard is dropped. Guards are
//! created with [`HashMap::guard`], or managed implicitly with the
//! [`HashMap::pin`] API:
//!
//! ```
//! let map = guava::HashMap::new();
//!
//! let m = map.pin();
//! assert!(m.insert(37, "a"));
//! assert_eq!(m.get(37), Some(&"a"));
//! assert_eq!(m.remove(37), Some(&"a"));
//! assert_eq!(m.get(37), None);
//! ```
//!
//! Note that inserts never replace an existing value: the first write for
//! a key wins until the key is removed.

mod map;
mod raw;

pub use map::{HashMap, HashMapBuilder, HashMapRef};
pub use seize::{Guard, LocalGuard, OwnedGuard};
