//! The bucket index: an append-only array of power-of-two segments.
//!
//! Doubling the table publishes one new segment and touches nothing else.
//! Existing segments are never moved or resized, so a reader holding a slot
//! reference never races a grower.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use super::list::Node;

/// The maximum number of segments.
///
/// Segment `k >= 1` holds the `2^(k-1)` buckets that become addressable
/// when the table first doubles to `2^k` buckets, so 64 segments cover
/// every bucket a 63-bit scrambled key can select.
const SEGMENTS: usize = usize::BITS as usize;

/// An expandable array of bucket slots.
///
/// Each slot is either null (the bucket has not been touched) or an
/// unmarked pointer to the bucket's dummy node. Slots move from null to
/// published exactly once and are never mutated afterwards.
pub struct BucketIndex<V> {
    /// Lazily published segment allocations.
    segments: [AtomicPtr<AtomicPtr<Node<V>>>; SEGMENTS],

    /// The number of populated segments. The bucket count is
    /// `2^(populated - 1)`.
    populated: AtomicU32,
}

impl<V> BucketIndex<V> {
    /// Creates an index able to address at least `buckets` buckets, with a
    /// minimum of two.
    pub fn with_capacity(buckets: usize) -> BucketIndex<V> {
        let populated = match buckets.next_power_of_two().trailing_zeros() + 1 {
            n if n < 2 => 2,
            n => n,
        };

        let index = BucketIndex {
            segments: [(); SEGMENTS].map(|_| AtomicPtr::new(ptr::null_mut())),
            populated: AtomicU32::new(populated),
        };

        for segment in 0..populated as usize {
            index.segments[segment]
                .store(Self::alloc_segment(Self::capacity(segment)), Ordering::Relaxed);
        }

        index
    }

    /// Returns the slot for the given bucket.
    ///
    /// The bucket must be within `len()`.
    #[inline]
    pub fn slot(&self, bucket: usize) -> &AtomicPtr<Node<V>> {
        let (segment, offset) = Self::location(bucket);

        // The acquire load of `populated` in `len` synchronizes with the
        // grower's release increment, which follows the segment store, so
        // any in-bounds bucket has a published segment.
        let segment = self.segments[segment].load(Ordering::Acquire);
        debug_assert!(!segment.is_null());

        // Safety: `offset` is within the segment's capacity by the
        // invariant of `location`.
        unsafe { &*segment.add(offset) }
    }

    /// Returns the current number of addressable buckets.
    #[inline]
    pub fn len(&self) -> usize {
        1 << (self.populated.load(Ordering::Acquire) - 1)
    }

    /// Doubles the number of addressable buckets if it is still `expected`.
    ///
    /// At most one thread publishes the new segment; a thread that loses
    /// the race frees its allocation and returns as if it had won. Returns
    /// the bucket count after the attempt.
    pub fn grow(&self, expected: usize) -> usize {
        let populated = self.populated.load(Ordering::Acquire) as usize;

        if populated < SEGMENTS && expected == 1 << (populated - 1) {
            let capacity = Self::capacity(populated);
            let segment = Self::alloc_segment(capacity);

            match self.segments[populated].compare_exchange(
                ptr::null_mut(),
                segment,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                // Make the new buckets addressable.
                Ok(_) => {
                    self.populated.fetch_add(1, Ordering::Release);
                }
                // Another thread published this segment first.
                //
                // Safety: The segment was never published and holds no
                // initialized slots.
                Err(_) => unsafe { Self::dealloc_segment(segment, capacity) },
            }
        }

        self.len()
    }

    /// Returns the segment and offset for the given bucket.
    ///
    /// Bucket `0` is the sole occupant of segment `0`; bucket `i > 0` lives
    /// in the segment published when the table first grew past `i`, at the
    /// offset given by clearing `i`'s highest set bit.
    #[inline]
    fn location(bucket: usize) -> (usize, usize) {
        if bucket == 0 {
            return (0, 0);
        }

        let log2 = usize::BITS as usize - 1 - bucket.leading_zeros() as usize;
        (log2 + 1, bucket ^ (1 << log2))
    }

    /// Returns the capacity of the given segment.
    #[inline]
    fn capacity(segment: usize) -> usize {
        match segment {
            0 => 1,
            _ => 1 << (segment - 1),
        }
    }

    /// Allocates a segment of `capacity` slots, all uninitialized.
    fn alloc_segment(capacity: usize) -> *mut AtomicPtr<Node<V>> {
        let layout = Layout::array::<AtomicPtr<Node<V>>>(capacity).unwrap();

        // Null is the uninitialized state for every slot, so zeroed memory
        // is already valid.
        let ptr = unsafe { alloc_zeroed(layout) };

        if ptr.is_null() {
            handle_alloc_error(layout);
        }

        ptr.cast()
    }

    /// Frees a segment allocated by `alloc_segment`.
    ///
    /// # Safety
    ///
    /// The segment must be unpublished, or the index must be being dropped.
    unsafe fn dealloc_segment(segment: *mut AtomicPtr<Node<V>>, capacity: usize) {
        let layout = Layout::array::<AtomicPtr<Node<V>>>(capacity).unwrap();
        unsafe { dealloc(segment.cast(), layout) }
    }
}

impl<V> Drop for BucketIndex<V> {
    fn drop(&mut self) {
        for (i, segment) in self.segments.iter_mut().enumerate() {
            let ptr = *segment.get_mut();

            if !ptr.is_null() {
                // Safety: We have unique access and the nodes the slots
                // point to are freed by the table, not the index.
                unsafe { Self::dealloc_segment(ptr, Self::capacity(i)) }
            }
        }
    }
}
