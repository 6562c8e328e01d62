//! The split-ordered list: a single sorted, lock-free linked list holding
//! every entry in the table.
//!
//! The list contains two kinds of nodes. *Real* nodes carry a user value.
//! *Dummy* nodes anchor a bucket; a bucket slot in the index is a pointer
//! to its dummy, so a traversal that starts at the slot scans exactly that
//! bucket's real nodes before crossing into the next bucket's dummy.
//!
//! Removal is in two phases: a CAS sets the deletion mark in the low bit of
//! the node's successor pointer, then a second CAS swings the predecessor
//! past the node. Any traversal that encounters a marked node helps with
//! the second phase, so the list converges even if the remover stalls.

use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use seize::{Collector, Guard};

use super::utils::{untagged, StrictProvenance, Tagged, Unpack};

/// A node in the split-ordered list.
pub struct Node<V> {
    /// The split-order key: the bit-reversed, tagged form of the scrambled
    /// user key (real node, low bit one) or of the bucket index (dummy
    /// node, low bit zero).
    pub key: u64,

    /// The user value. Only initialized for real nodes.
    pub value: MaybeUninit<V>,

    /// The successor. The low bit is the logical-deletion mark.
    pub next: AtomicPtr<Node<V>>,
}

impl<V> Node<V> {
    /// The logical-deletion mark, stored in the low bit of `next`.
    ///
    /// A marked successor means this node is deleted. The node stays
    /// physically linked until a traversal swings the predecessor past it.
    pub const DELETED: usize = 0b1;

    /// Allocates a real node holding `value`.
    pub fn real(key: u64, value: V) -> Box<Node<V>> {
        debug_assert!(key & 1 == 1);
        Box::new(Node {
            key,
            value: MaybeUninit::new(value),
            next: AtomicPtr::new(ptr::null_mut()),
        })
    }

    /// Allocates a dummy node anchoring a bucket.
    pub fn dummy(key: u64) -> Box<Node<V>> {
        debug_assert!(key & 1 == 0);
        Box::new(Node {
            key,
            value: MaybeUninit::uninit(),
            next: AtomicPtr::new(ptr::null_mut()),
        })
    }

    /// Frees a retired node.
    ///
    /// # Safety
    ///
    /// `node` must have been allocated with `Box::new` and unlinked from
    /// the list.
    pub unsafe fn reclaim(node: *mut Node<V>, _collector: &Collector) {
        drop(unsafe { Box::from_raw(node) });
    }
}

impl<V> Unpack for Node<V> {
    /// Mask for a node pointer, ignoring the deletion mark.
    const MASK: usize = !Self::DELETED;
}

impl<V> Drop for Node<V> {
    fn drop(&mut self) {
        // Dummy nodes never initialize their value.
        if self.key & 1 == 1 {
            // Safety: Real nodes initialize their value at construction and
            // never move it out.
            unsafe { self.value.assume_init_drop() }
        }
    }
}

/// A search window: `prev` is the link that led to `cur`, and `cur` is the
/// first live node with a key not less than the target, or null at the end
/// of the list.
struct Window<'g, V> {
    prev: &'g AtomicPtr<Node<V>>,
    cur: Tagged<Node<V>>,
}

/// The result of a list insert.
pub enum InsertResult<V> {
    /// The node was linked into the list.
    Inserted(*mut Node<V>),

    /// A live node with the same key already exists. Ownership of the new
    /// node returns to the caller.
    Exists(*mut Node<V>, Box<Node<V>>),
}

/// Searches for the first node with a key not less than `key`.
///
/// The returned window is consistent at the instant of its last load:
/// `prev` held an unmarked pointer to `cur`, and every node before `cur`
/// had a smaller key. Marked nodes encountered along the way are unlinked.
fn search<'g, V>(
    head: &'g AtomicPtr<Node<V>>,
    key: u64,
    guard: &'g impl Guard,
) -> Window<'g, V> {
    'search: loop {
        let mut prev = head;
        let mut cur = untagged(guard.protect(prev, Ordering::Acquire));

        loop {
            // The end of the list.
            let Some(node) = (unsafe { cur.ptr.as_ref() }) else {
                return Window { prev, cur };
            };

            let next = guard.protect(&node.next, Ordering::Acquire).unpack();

            // `cur` is logically deleted. Unlink it before moving on; if
            // the CAS fails the window went stale and we start over.
            if next.tag() & Node::<V>::DELETED != 0 {
                if prev
                    .compare_exchange(cur.raw, next.ptr, Ordering::Release, Ordering::Relaxed)
                    .is_err()
                {
                    continue 'search;
                }

                // Safety: We hold the CAS that unlinked `cur`, so no other
                // thread retires it, and it was reachable until now so any
                // concurrent reader is protected by its own guard.
                unsafe { guard.defer_retire(cur.ptr, Node::reclaim) };

                cur = untagged(next.ptr);
                continue;
            }

            if node.key >= key {
                return Window { prev, cur };
            }

            prev = &node.next;
            cur = next;
        }
    }
}

/// Inserts a fully initialized node into its sorted position.
///
/// Fails if a live node with the same key exists, returning the node to
/// the caller.
pub fn insert<'g, V>(
    head: &'g AtomicPtr<Node<V>>,
    mut node: Box<Node<V>>,
    guard: &'g impl Guard,
) -> InsertResult<V> {
    let key = node.key;

    loop {
        let window = search(head, key, guard);

        if let Some(found) = unsafe { window.cur.ptr.as_ref() } {
            if found.key == key {
                return InsertResult::Exists(window.cur.ptr, node);
            }
        }

        // Link the node in front of `cur`. The store is published by the
        // release CAS below.
        node.next.store(window.cur.raw, Ordering::Relaxed);
        let ptr = Box::into_raw(node);

        match window
            .prev
            .compare_exchange(window.cur.raw, ptr, Ordering::Release, Ordering::Relaxed)
        {
            Ok(_) => return InsertResult::Inserted(ptr),
            // The window moved under us. Take the node back and retry.
            //
            // Safety: The CAS failed, so `ptr` was never published.
            Err(_) => node = unsafe { Box::from_raw(ptr) },
        }
    }
}

/// Returns a reference to the value of the live node with the given key.
pub fn find<'g, V>(head: &'g AtomicPtr<Node<V>>, key: u64, guard: &'g impl Guard) -> Option<&'g V> {
    debug_assert!(key & 1 == 1);

    let window = search(head, key, guard);
    let node = unsafe { window.cur.ptr.as_ref() }?;

    if node.key != key {
        return None;
    }

    // Safety: The key's tag bit marks this as a real node, so the value is
    // initialized. The guard keeps the node alive even if it is removed
    // concurrently.
    Some(unsafe { node.value.assume_init_ref() })
}

/// Logically deletes the live node with the given key, then attempts to
/// unlink it. Returns a reference to the removed value.
pub fn remove<'g, V>(
    head: &'g AtomicPtr<Node<V>>,
    key: u64,
    guard: &'g impl Guard,
) -> Option<&'g V> {
    debug_assert!(key & 1 == 1);

    loop {
        let window = search(head, key, guard);
        let node = unsafe { window.cur.ptr.as_ref() }?;

        if node.key != key {
            return None;
        }

        let next = guard.protect(&node.next, Ordering::Acquire).unpack();

        // A concurrent remove already claimed this node; re-search to help
        // the unlink along and observe the key as absent.
        if next.tag() & Node::<V>::DELETED != 0 {
            continue;
        }

        // Claim the node by marking its successor. This is the point at
        // which the key leaves the table. The CAS fails if the successor
        // changed, so the mark never detaches a concurrent insert.
        let marked = next.raw.map_addr(|addr| addr | Node::<V>::DELETED);
        if node
            .next
            .compare_exchange(next.raw, marked, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            continue;
        }

        // Unlink the node, or leave it to the next search that passes by.
        if window
            .prev
            .compare_exchange(window.cur.raw, next.ptr, Ordering::Release, Ordering::Relaxed)
            .is_ok()
        {
            // Safety: As in `search`, the successful unlink CAS makes us
            // responsible for retiring the node.
            unsafe { guard.defer_retire(window.cur.ptr, Node::reclaim) };
        } else {
            let _ = search(head, key, guard);
        }

        // Safety: We marked the node, so the value stays initialized until
        // the node is reclaimed, which the guard delays.
        return Some(unsafe { node.value.assume_init_ref() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seize::Collector;

    fn keys(head: &AtomicPtr<Node<u64>>) -> Vec<u64> {
        let mut keys = Vec::new();
        let mut cur = head.load(Ordering::Acquire);

        while !cur.is_null() {
            let node = unsafe { &*cur };
            keys.push(node.key);
            cur = node.next.load(Ordering::Acquire).unpack().ptr;
        }

        keys
    }

    fn free(head: &AtomicPtr<Node<u64>>) {
        let mut cur = head.load(Ordering::Acquire);

        while !cur.is_null() {
            let node = unsafe { Box::from_raw(cur) };
            cur = node.next.load(Ordering::Relaxed).unpack().ptr;
        }
    }

    #[test]
    fn sorted_and_unique() {
        let collector = Collector::new();
        let head = AtomicPtr::new(ptr::null_mut());

        {
            let guard = collector.enter();
            for key in [9, 3, 7, 1, 5, 3, 9] {
                let _ = insert(&head, Node::real(key, key), &guard);
            }

            // Duplicate inserts were rejected and the walk is sorted.
            assert_eq!(keys(&head), [1, 3, 5, 7, 9]);

            assert_eq!(find(&head, 7, &guard), Some(&7));
            assert_eq!(find(&head, 11, &guard), None);
        }

        free(&head);
    }

    #[test]
    fn remove_unlinks() {
        let collector = Collector::new();
        let head = AtomicPtr::new(ptr::null_mut());

        {
            let guard = collector.enter();
            for key in [1, 3, 5] {
                let _ = insert(&head, Node::real(key, key), &guard);
            }

            assert_eq!(remove(&head, 3, &guard), Some(&3));
            assert_eq!(remove(&head, 3, &guard), None);
            assert_eq!(keys(&head), [1, 5]);
        }

        free(&head);
    }

    #[test]
    fn dummies_partition_reals() {
        let collector = Collector::new();
        let head = AtomicPtr::new(ptr::null_mut());

        {
            let guard = collector.enter();
            let _ = insert(&head, Node::dummy(0), &guard);
            let _ = insert(&head, Node::real(3, 3), &guard);
            let _ = insert(&head, Node::dummy(2), &guard);
            let _ = insert(&head, Node::real(1, 1), &guard);

            // Each real node sits after its bucket's dummy.
            assert_eq!(keys(&head), [0, 1, 2, 3]);

            // Dummies are invisible to a keyed lookup.
            assert_eq!(find(&head, 1, &guard), Some(&1));
            assert_eq!(find(&head, 3, &guard), Some(&3));
        }

        free(&head);
    }
}
