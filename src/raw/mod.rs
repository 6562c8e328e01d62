mod index;
mod list;
mod order;
mod utils;

use std::sync::atomic::{AtomicPtr, Ordering};
use std::{hint, ptr};

use seize::{Collector, Guard, LocalGuard, OwnedGuard};

use self::index::BucketIndex;
use self::list::{InsertResult, Node};
use self::utils::{Counter, StrictProvenance};

/// The target upper bound on `len / buckets`.
///
/// An insert that pushes the table past this load factor publishes a new
/// bucket segment. Growth only ever adds buckets; entries never move.
pub const MAX_LOAD: usize = 4;

/// A lock-free hash table keyed by 64-bit integers.
///
/// All entries live in a single sorted list; buckets alias into it through
/// dummy nodes. Doubling the bucket count splits every bucket in place, so
/// the table grows without rehashing a single entry.
pub struct HashMap<V> {
    /// The doubling index of bucket anchors.
    buckets: BucketIndex<V>,

    /// The number of live entries.
    count: Counter,

    /// Collector for memory reclamation.
    collector: Collector,
}

// Safety: We only ever hand out `&V` through shared references to the map,
// and retired values may be dropped on whichever thread reclaims them.
unsafe impl<V: Send> Send for HashMap<V> {}
unsafe impl<V: Send + Sync> Sync for HashMap<V> {}

impl<V> HashMap<V> {
    /// Creates a table able to hold `capacity` entries before growing.
    pub fn new(capacity: usize, collector: Collector) -> HashMap<V> {
        let buckets = BucketIndex::with_capacity(capacity.div_ceil(MAX_LOAD));

        // Bucket 0 anchors the list and exists for the table's lifetime.
        let head = Box::into_raw(Node::dummy(0));
        buckets.slot(0).store(head, Ordering::Relaxed);

        HashMap {
            buckets,
            count: Counter::default(),
            collector,
        }
    }

    /// Returns a guard for use with this table.
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Returns an owned guard for use with this table.
    #[inline]
    pub fn owned_guard(&self) -> OwnedGuard<'_> {
        self.collector.enter_owned()
    }

    /// Verify a guard is valid to use with this table.
    #[inline]
    fn verify(&self, guard: &impl Guard) {
        assert_eq!(
            *guard.collector(),
            self.collector,
            "attempted to access the map with a guard from a different collector"
        );
    }

    /// Returns the number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.count.len()
    }

    /// Returns the current number of addressable buckets.
    #[inline]
    pub fn buckets(&self) -> usize {
        self.buckets.len()
    }
}

impl<V> HashMap<V>
where
    V: Send + Sync,
{
    /// Inserts a key-value pair, failing if the key is already present.
    #[inline]
    pub fn insert(&self, key: u64, value: V, guard: &impl Guard) -> bool {
        self.verify(guard);

        let hash = order::scramble(key);
        let buckets = self.buckets.len();
        let head = self.bucket((hash % buckets as u64) as usize, guard);

        let node = Node::real(order::real_key(hash), value);
        match list::insert(head, node, guard) {
            InsertResult::Exists(_, node) => {
                drop(node);
                false
            }
            InsertResult::Inserted(_) => {
                // The fetched prior value keeps the load-factor check
                // coherent under concurrent inserts.
                let count = self.count.increment() + 1;

                if count > (MAX_LOAD * buckets) as isize {
                    // A lost race means another thread already grew the
                    // table past the size we observed.
                    self.buckets.grow(buckets);
                }

                true
            }
        }
    }

    /// Returns a reference to the value corresponding to the key.
    #[inline]
    pub fn get<'g>(&'g self, key: u64, guard: &'g impl Guard) -> Option<&'g V> {
        self.verify(guard);

        let hash = order::scramble(key);
        let head = self.bucket((hash % self.buckets.len() as u64) as usize, guard);

        list::find(head, order::real_key(hash), guard)
    }

    /// Removes the key from the table, returning its value.
    #[inline]
    pub fn remove<'g>(&'g self, key: u64, guard: &'g impl Guard) -> Option<&'g V> {
        self.verify(guard);

        let hash = order::scramble(key);
        let head = self.bucket((hash % self.buckets.len() as u64) as usize, guard);

        let value = list::remove(head, order::real_key(hash), guard)?;
        self.count.decrement();
        Some(value)
    }

    /// Returns the anchor slot for the given bucket, initializing the
    /// bucket on first touch.
    #[inline]
    fn bucket<'g>(&'g self, bucket: usize, guard: &'g impl Guard) -> &'g AtomicPtr<Node<V>> {
        let slot = self.buckets.slot(bucket);

        if slot.load(Ordering::Acquire).is_null() {
            self.initialize_bucket(bucket, guard);
        }

        slot
    }

    /// Splices the bucket's dummy node into the list and publishes it.
    ///
    /// On return the slot is published, whether by us or by the thread
    /// that won the race to insert the dummy.
    #[cold]
    fn initialize_bucket(&self, bucket: usize, guard: &impl Guard) {
        // Bucket 0 is created with the table.
        debug_assert!(bucket > 0);

        // The parent's anchor precedes ours in the list, so inserting from
        // it places the dummy correctly and cheaply.
        let parent = self.bucket(order::parent(bucket), guard);

        let slot = self.buckets.slot(bucket);
        let dummy = Node::dummy(order::dummy_key(bucket as u64));

        match list::insert(parent, dummy, guard) {
            InsertResult::Inserted(node) => {
                // Publish the anchor. The slot moves from uninitialized to
                // published exactly once, and only the inserting thread
                // attempts the transition.
                let _ = slot.compare_exchange(
                    ptr::null_mut(),
                    node,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
            }
            InsertResult::Exists(winner, dummy) => {
                drop(dummy);

                // The thread that inserted the dummy publishes the slot
                // unconditionally, so this wait is bounded by its progress.
                while slot.load(Ordering::Acquire) != winner {
                    hint::spin_loop();
                }
            }
        }
    }
}

impl<V> Drop for HashMap<V> {
    fn drop(&mut self) {
        // Walk the list from bucket 0's anchor, freeing every node still
        // linked. Nodes that were unlinked are reclaimed by the collector
        // when it drops.
        let mut cur = self.buckets.slot(0).load(Ordering::Acquire);

        while !cur.is_null() {
            // Safety: We have unique access, and every linked node is a
            // `Box` allocation that has not been retired.
            let node = unsafe { Box::from_raw(cur) };

            // A marked node that no traversal got around to unlinking is
            // still linked, so the deletion mark may be set here.
            cur = node.next.load(Ordering::Relaxed).unpack().ptr;
        }
    }
}

