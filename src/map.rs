use crate::raw;
use seize::{Collector, Guard, LocalGuard, OwnedGuard};

use std::fmt;
use std::marker::PhantomData;

/// A lock-free hash table keyed by 64-bit integers.
///
/// The table is built on a split-ordered list: every entry lives in one
/// sorted linked list, and buckets are lazily materialized anchors into
/// it. Doubling the bucket count never rehashes or moves an entry.
///
/// Unlike a standard map, [`insert`](HashMap::insert) never replaces an
/// existing value; the first write for a key wins until the key is
/// removed.
///
/// Most operations require a [`Guard`], which can be acquired through
/// [`HashMap::guard`] or using the [`HashMap::pin`] API. See the
/// [crate-level documentation](crate#usage) for details.
pub struct HashMap<V> {
    raw: raw::HashMap<V>,
}

/// A builder for a [`HashMap`].
///
/// # Examples
///
/// ```rust
/// use guava::HashMap;
/// use seize::Collector;
///
/// let map: HashMap<i32> = HashMap::builder()
///     // Set the initial capacity.
///     .capacity(2048)
///     // Set a custom garbage collector.
///     .collector(Collector::new().batch_size(128))
///     // Construct the hash map.
///     .build();
/// ```
pub struct HashMapBuilder<V> {
    capacity: usize,
    collector: Collector,
    _v: PhantomData<V>,
}

impl<V> HashMapBuilder<V> {
    /// Set the initial capacity of the map.
    ///
    /// The table should be able to hold at least `capacity` entries before
    /// growing. The capacity is an estimate: the scrambled keys may
    /// distribute unevenly, and buckets themselves are only materialized
    /// when first touched.
    pub fn capacity(self, capacity: usize) -> HashMapBuilder<V> {
        HashMapBuilder {
            capacity,
            collector: self.collector,
            _v: PhantomData,
        }
    }

    /// Set the [`seize::Collector`] used for garbage collection.
    ///
    /// This method may be useful when you want more control over garbage
    /// collection.
    ///
    /// Note that all `Guard` references used to access the map must be
    /// produced by the provided `collector`.
    pub fn collector(self, collector: Collector) -> HashMapBuilder<V> {
        HashMapBuilder {
            collector,
            capacity: self.capacity,
            _v: PhantomData,
        }
    }

    /// Construct a [`HashMap`] from the builder, using the configured
    /// options.
    pub fn build(self) -> HashMap<V> {
        HashMap {
            raw: raw::HashMap::new(self.capacity, self.collector),
        }
    }
}

impl<V> fmt::Debug for HashMapBuilder<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashMapBuilder")
            .field("capacity", &self.capacity)
            .field("collector", &self.collector)
            .finish()
    }
}

impl<V> HashMap<V> {
    /// Creates an empty `HashMap`.
    ///
    /// The new table has two addressable buckets and grows as entries are
    /// inserted.
    ///
    /// # Examples
    ///
    /// ```
    /// use guava::HashMap;
    /// let map: HashMap<i32> = HashMap::new();
    /// ```
    pub fn new() -> HashMap<V> {
        HashMap::with_capacity(0)
    }

    /// Creates an empty `HashMap` with the specified capacity.
    ///
    /// The table should be able to hold at least `capacity` entries before
    /// growing.
    ///
    /// # Examples
    ///
    /// ```
    /// use guava::HashMap;
    /// let map: HashMap<i32> = HashMap::with_capacity(10);
    /// ```
    pub fn with_capacity(capacity: usize) -> HashMap<V> {
        HashMap {
            raw: raw::HashMap::new(capacity, Collector::new()),
        }
    }

    /// Returns a builder for a `HashMap`.
    ///
    /// The builder can be used for more complex configuration, such as
    /// using a custom [`Collector`].
    pub fn builder() -> HashMapBuilder<V> {
        HashMapBuilder {
            capacity: 0,
            collector: Collector::new(),
            _v: PhantomData,
        }
    }

    /// Returns a pinned reference to the map.
    ///
    /// The returned reference manages a guard internally, preventing
    /// garbage collection for as long as it is held. See the [crate-level
    /// documentation](crate#usage) for details.
    #[inline]
    pub fn pin(&self) -> HashMapRef<'_, V, LocalGuard<'_>> {
        HashMapRef {
            guard: self.guard(),
            map: self,
        }
    }

    /// Returns a pinned reference to the map.
    ///
    /// Unlike [`HashMap::pin`], the returned reference implements `Send`
    /// and `Sync`, allowing it to be held across `.await` points in
    /// work-stealing schedulers.
    ///
    /// The returned reference manages a guard internally, preventing
    /// garbage collection for as long as it is held. See the [crate-level
    /// documentation](crate#usage) for details.
    #[inline]
    pub fn pin_owned(&self) -> HashMapRef<'_, V, OwnedGuard<'_>> {
        HashMapRef {
            guard: self.owned_guard(),
            map: self,
        }
    }

    /// Returns a guard for use with this map.
    ///
    /// Note that holding on to a guard prevents garbage collection.
    /// See the [crate-level documentation](crate#usage) for details.
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.raw.guard()
    }

    /// Returns an owned guard for use with this map.
    ///
    /// Owned guards implement `Send` and `Sync`, allowing them to be held
    /// across `.await` points in work-stealing schedulers.
    ///
    /// Note that holding on to a guard prevents garbage collection.
    /// See the [crate-level documentation](crate#usage) for details.
    #[inline]
    pub fn owned_guard(&self) -> OwnedGuard<'_> {
        self.raw.owned_guard()
    }

    /// Returns the number of entries in the map.
    ///
    /// The value is approximate while other threads are inserting or
    /// removing entries concurrently.
    ///
    /// # Examples
    ///
    /// ```
    /// use guava::HashMap;
    ///
    /// let map = HashMap::new();
    ///
    /// map.pin().insert(1, "a");
    /// map.pin().insert(2, "b");
    /// assert!(map.len() == 2);
    /// ```
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the map is empty. Otherwise returns `false`.
    ///
    /// # Examples
    ///
    /// ```
    /// use guava::HashMap;
    ///
    /// let map = HashMap::new();
    /// assert!(map.is_empty());
    /// map.pin().insert(1, "a");
    /// assert!(!map.is_empty());
    /// ```
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current number of addressable buckets.
    ///
    /// The bucket count starts at two and doubles whenever an insert
    /// pushes the table past its target load factor. It never shrinks.
    #[inline]
    pub fn buckets(&self) -> usize {
        self.raw.buckets()
    }
}

impl<V> HashMap<V>
where
    V: Send + Sync,
{
    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// # Examples
    ///
    /// ```
    /// use guava::HashMap;
    ///
    /// let map = HashMap::new();
    /// let guard = map.guard();
    ///
    /// map.insert(1, "a", &guard);
    /// assert!(map.contains_key(1, &guard));
    /// assert!(!map.contains_key(2, &guard));
    /// ```
    #[inline]
    pub fn contains_key(&self, key: u64, guard: &impl Guard) -> bool {
        self.get(key, guard).is_some()
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use guava::HashMap;
    ///
    /// let map = HashMap::new();
    /// let guard = map.guard();
    ///
    /// map.insert(1, "a", &guard);
    /// assert_eq!(map.get(1, &guard), Some(&"a"));
    /// assert_eq!(map.get(2, &guard), None);
    /// ```
    #[inline]
    pub fn get<'g>(&'g self, key: u64, guard: &'g impl Guard) -> Option<&'g V> {
        self.raw.get(key, guard)
    }

    /// Inserts a key-value pair into the map.
    ///
    /// Returns `true` if the key was inserted, and `false` if the map
    /// already contained the key. An existing value is never replaced;
    /// remove the key first to write a new value for it.
    ///
    /// # Examples
    ///
    /// ```
    /// use guava::HashMap;
    ///
    /// let map = HashMap::new();
    /// let guard = map.guard();
    ///
    /// assert!(map.insert(37, "a", &guard));
    /// assert!(!map.insert(37, "b", &guard));
    /// assert_eq!(map.get(37, &guard), Some(&"a"));
    /// ```
    #[inline]
    pub fn insert(&self, key: u64, value: V, guard: &impl Guard) -> bool {
        self.raw.insert(key, value, guard)
    }

    /// Removes a key from the map, returning the value at the key if the
    /// key was previously in the map.
    ///
    /// # Examples
    ///
    /// ```
    /// use guava::HashMap;
    ///
    /// let map = HashMap::new();
    /// let guard = map.guard();
    ///
    /// map.insert(1, "a", &guard);
    /// assert_eq!(map.remove(1, &guard), Some(&"a"));
    /// assert_eq!(map.remove(1, &guard), None);
    /// ```
    #[inline]
    pub fn remove<'g>(&'g self, key: u64, guard: &'g impl Guard) -> Option<&'g V> {
        self.raw.remove(key, guard)
    }
}

impl<V> Default for HashMap<V> {
    fn default() -> Self {
        HashMap::new()
    }
}

impl<V> fmt::Debug for HashMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashMap")
            .field("len", &self.len())
            .field("buckets", &self.buckets())
            .finish_non_exhaustive()
    }
}

/// A pinned reference to a [`HashMap`].
///
/// The reference manages a guard internally, preventing garbage collection
/// for as long as it is held. Keeping a pinned reference alive for long
/// periods of time can delay reclamation; prefer re-pinning in long-running
/// loops.
pub struct HashMapRef<'map, V, G> {
    guard: G,
    map: &'map HashMap<V>,
}

impl<'map, V, G> HashMapRef<'map, V, G>
where
    V: Send + Sync,
    G: Guard,
{
    /// Returns a reference to the inner [`HashMap`].
    #[inline]
    pub fn map(&self) -> &'map HashMap<V> {
        self.map
    }

    /// Returns the number of entries in the map.
    ///
    /// See [`HashMap::len`] for details.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the map is empty. Otherwise returns `false`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current number of addressable buckets.
    ///
    /// See [`HashMap::buckets`] for details.
    #[inline]
    pub fn buckets(&self) -> usize {
        self.map.buckets()
    }

    /// Returns `true` if the map contains a value for the specified key.
    #[inline]
    pub fn contains_key(&self, key: u64) -> bool {
        self.map.contains_key(key, &self.guard)
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// See [`HashMap::get`] for details.
    #[inline]
    pub fn get(&self, key: u64) -> Option<&V> {
        self.map.get(key, &self.guard)
    }

    /// Inserts a key-value pair into the map.
    ///
    /// See [`HashMap::insert`] for details.
    #[inline]
    pub fn insert(&self, key: u64, value: V) -> bool {
        self.map.insert(key, value, &self.guard)
    }

    /// Removes a key from the map, returning the value at the key if the
    /// key was previously in the map.
    ///
    /// See [`HashMap::remove`] for details.
    #[inline]
    pub fn remove(&self, key: u64) -> Option<&V> {
        self.map.remove(key, &self.guard)
    }
}

impl<V, G> fmt::Debug for HashMapRef<'_, V, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashMapRef")
            .field("len", &self.map.len())
            .field("buckets", &self.map.buckets())
            .finish_non_exhaustive()
    }
}
