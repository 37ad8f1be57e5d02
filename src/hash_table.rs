//! The untyped core: an open-addressing table probed linearly.
//!
//! [`HashTable<V>`] knows nothing about keys. Every lookup and insertion is
//! driven by a caller-computed `u64` hash and an equality predicate over the
//! stored values, which is what lets one implementation back any key/value
//! layout. [`HashMap`](crate::HashMap) is the typed facade on top of it.

use alloc::alloc::handle_alloc_error;
use alloc::vec::Vec;
use core::alloc::Layout;
use core::fmt::Debug;
use core::iter::FusedIterator;

use crate::DEFAULT_SLOTS;
use crate::MIN_SLOTS;
use crate::error::TryReserveError;

/// Whether allocation failures are returned to the caller or abort.
#[derive(Clone, Copy)]
enum Fallibility {
    Fallible,
    Infallible,
}

impl Fallibility {
    #[cold]
    fn capacity_overflow(self) -> TryReserveError {
        match self {
            Fallibility::Fallible => TryReserveError::CapacityOverflow,
            Fallibility::Infallible => panic!("hash table capacity overflow"),
        }
    }

    #[cold]
    fn alloc_err(self, layout: Layout) -> TryReserveError {
        tracing::error!(bytes = layout.size(), "hash table slot allocation failed");
        match self {
            Fallibility::Fallible => TryReserveError::AllocError { layout },
            Fallibility::Infallible => handle_alloc_error(layout),
        }
    }
}

/// Unwraps the result of an operation run with [`Fallibility::Infallible`].
#[inline(always)]
fn infallible<T>(result: Result<T, TryReserveError>) -> T {
    match result {
        Ok(value) => value,
        // Infallible paths panic or abort instead of returning.
        Err(_) => unreachable!(),
    }
}

/// One storage unit of the table.
///
/// The hash is cached next to the value so growth can re-probe every entry
/// without asking the caller to hash anything again.
#[derive(Clone)]
enum Slot<V> {
    Empty,
    Occupied { hash: u64, value: V },
}

impl<V> Slot<V> {
    #[inline(always)]
    fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
}

/// Result of walking the probe sequence for a hash.
enum Probe {
    /// An occupied slot whose value satisfied the predicate.
    Found(usize),
    /// The first empty slot on the sequence. The key is absent and a new
    /// entry belongs here.
    Vacant(usize),
    /// Every slot was visited without finding a match or a hole.
    Exhausted,
}

#[inline(always)]
fn home_index(hash: u64, slots: usize) -> usize {
    (hash % slots as u64) as usize
}

#[inline(always)]
fn wrap_index(home: usize, offset: usize, slots: usize) -> usize {
    let index = home + offset;
    if index >= slots { index - slots } else { index }
}

/// Distance, with wraparound, from the home slot of `hash` to `index`.
#[inline(always)]
fn displacement(index: usize, hash: u64, slots: usize) -> usize {
    let home = home_index(hash, slots);
    if index >= home {
        index - home
    } else {
        index + slots - home
    }
}

/// The load factor threshold is one half: growth happens before any insertion
/// that finds at least half of the slots occupied.
#[inline(always)]
fn is_over_load_threshold(populated: usize, slots: usize) -> bool {
    populated * 2 >= slots
}

/// Number of entries a table with `slots` slots accepts before the next
/// insertion has to grow it.
#[inline(always)]
fn capacity_for(slots: usize) -> usize {
    slots.div_ceil(2)
}

/// Smallest slot count that accepts `items` insertions without growing.
#[inline]
fn slots_for(items: usize) -> Option<usize> {
    Some(items.checked_mul(2)?.saturating_sub(1).max(MIN_SLOTS))
}

/// Smallest slot count that holds `items` entries strictly below the load
/// factor threshold.
#[inline]
fn shrunk_slot_count(items: usize) -> Option<usize> {
    items.checked_mul(2)?.checked_add(1)
}

cfg_if::cfg_if! {
    if #[cfg(feature = "growth-three-halves")] {
        #[inline]
        fn grown_slot_count(slots: usize) -> Option<usize> {
            Some(slots.checked_mul(3)? / 2 + 1)
        }
    } else {
        #[inline]
        fn grown_slot_count(slots: usize) -> Option<usize> {
            slots.checked_mul(2)
        }
    }
}

fn allocate_slots<V>(count: usize, fallibility: Fallibility) -> Result<Vec<Slot<V>>, TryReserveError> {
    let layout = Layout::array::<Slot<V>>(count).map_err(|_| fallibility.capacity_overflow())?;

    let mut slots = Vec::new();
    if slots.try_reserve_exact(count).is_err() {
        return Err(fallibility.alloc_err(layout));
    }
    slots.resize_with(count, || Slot::Empty);

    Ok(slots)
}

/// Displacement statistics for a [`HashTable`].
///
/// Available with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHistogram {
    /// `bins[d]` is the number of entries stored `d` slots past their home
    /// slot.
    pub bins: Vec<usize>,
}

#[cfg(any(test, feature = "stats"))]
impl ProbeHistogram {
    /// Number of entries counted by the histogram.
    pub fn total(&self) -> usize {
        self.bins.iter().sum()
    }

    /// Largest displacement of any entry, or `None` for an empty table.
    pub fn max_displacement(&self) -> Option<usize> {
        self.bins.iter().rposition(|&count| count != 0)
    }

    /// Pretty-prints the histogram horizontally using stdout.
    ///
    /// Each row corresponds to a displacement, bars are scaled to the
    /// fullest row.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        let max = self.bins.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        println!("probe histogram ({} entries):", self.total());

        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let full = units / 8;
            let rem = units % 8;
            let mut bar = "█".repeat(full);
            if rem > 0 {
                let ch = match rem {
                    1 => '▏',
                    2 => '▎',
                    3 => '▍',
                    4 => '▌',
                    5 => '▋',
                    6 => '▊',
                    7 => '▉',
                    _ => unreachable!(),
                };
                bar.push(ch);
            }
            bar
        };

        for (displacement, &count) in self.bins.iter().enumerate() {
            println!("{:>4} | {} ({})", displacement, make_bar(count), count);
        }
    }
}

/// Debug statistics for hash table analysis.
///
/// Available with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of elements currently in the table
    pub populated: usize,
    /// Number of elements the table accepts before it grows
    pub capacity: usize,
    /// Total number of slots allocated
    pub total_slots: usize,
    /// Load factor (populated / total_slots)
    pub load_factor: f64,
    /// Largest distance of an entry from its home slot
    pub max_displacement: usize,
    /// Average distance of an entry from its home slot
    pub mean_displacement: f64,
    /// Total memory in bytes used by the slot buffer
    pub total_bytes: usize,
    /// Bytes held by empty slots
    pub wasted_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} slots ({:.2}% load factor, grows past {})",
            self.populated,
            self.total_slots,
            self.load_factor * 100.0,
            self.capacity
        );
        println!(
            "Displacement: max {}, mean {:.3}",
            self.max_displacement, self.mean_displacement
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
        println!(
            "Memory: {} bytes wasted ({:.02}%)",
            self.wasted_bytes,
            if self.total_bytes == 0 {
                0.0
            } else {
                (self.wasted_bytes as f64 / self.total_bytes as f64) * 100.0
            }
        );
    }
}

/// An open-addressing hash table using linear probing.
///
/// `HashTable<V>` stores values of type `V` in one contiguous buffer of
/// slots. Like [`hashbrown::HashTable`], it requires you to provide both the
/// hash value and an equality predicate for each operation; the table never
/// hashes anything itself.
///
/// Lookups start at slot `hash % slot_count()` and walk forward, wrapping at
/// the end, until they hit a matching entry or an empty slot. Before every
/// insertion the table checks whether at least half of its slots are in use,
/// and if so moves every entry into a larger buffer first. Entries are never
/// removed individually, so a hole on the probe sequence always means the
/// key is absent.
///
/// [`hashbrown::HashTable`]: https://docs.rs/hashbrown/latest/hashbrown/struct.HashTable.html
///
/// ## Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use probe_hash::hash_table::HashTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # #[derive(Debug, PartialEq)]
/// # struct Person {
/// #     id: u64,
/// #     name: String,
/// # }
/// #
/// # fn hash_id(id: u64) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     id.hash(&mut hasher);
/// #     hasher.finish()
/// # }
///
/// let mut table = HashTable::new();
/// let hash = hash_id(123);
///
/// match table.entry(hash, |p: &Person| p.id == 123) {
///     probe_hash::hash_table::Entry::Vacant(entry) => {
///         entry.insert(Person {
///             id: 123,
///             name: "Alice".to_string(),
///         });
///     }
///     probe_hash::hash_table::Entry::Occupied(_) => {
///         println!("Person already exists");
///     }
/// }
/// ```
#[derive(Clone)]
pub struct HashTable<V> {
    slots: Vec<Slot<V>>,
    populated: usize,
}

impl<V> Debug for HashTable<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::String;
        use alloc::string::ToString;

        let slot_count = self.slots.len();
        let rows = self
            .slots
            .chunks(16)
            .enumerate()
            .map(|(row, chunk)| {
                chunk
                    .iter()
                    .enumerate()
                    .map(|(column, slot)| match slot {
                        Slot::Empty => "..".to_string(),
                        Slot::Occupied { hash, .. } => {
                            format!("{:02}", displacement(row * 16 + column, *hash, slot_count))
                        }
                    })
                    .collect::<Vec<String>>()
                    .join(", ")
            })
            .collect::<Vec<_>>();

        f.debug_struct("HashTable")
            .field("displacements", &rows)
            .field("populated", &self.populated)
            .field("slots", &slot_count)
            .finish()
    }
}

impl<V> Default for HashTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> HashTable<V> {
    /// Creates an empty table with [`DEFAULT_SLOTS`] slots.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64> = HashTable::new();
    /// assert_eq!(table.slot_count(), probe_hash::DEFAULT_SLOTS);
    /// assert!(table.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_slots(DEFAULT_SLOTS)
    }

    /// Creates an empty table with exactly `slots` slots.
    ///
    /// Zero selects [`DEFAULT_SLOTS`]. Half of the slots can be filled before
    /// the first growth.
    ///
    /// # Panics
    ///
    /// Panics if the slot buffer would exceed `isize::MAX` bytes, and aborts
    /// through [`handle_alloc_error`] if the allocator fails. Use
    /// [`try_with_slots`](Self::try_with_slots) to handle both.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let table: HashTable<String> = HashTable::with_slots(42);
    /// assert_eq!(table.slot_count(), 42);
    /// assert_eq!(table.capacity(), 21);
    /// ```
    pub fn with_slots(slots: usize) -> Self {
        infallible(Self::from_slot_count(
            Self::requested_slots(slots),
            Fallibility::Infallible,
        ))
    }

    /// Fallible version of [`with_slots`](Self::with_slots).
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::TryReserveError;
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let table: HashTable<u32> = HashTable::try_with_slots(8).unwrap();
    /// assert_eq!(table.slot_count(), 8);
    ///
    /// let err = HashTable::<u32>::try_with_slots(usize::MAX).unwrap_err();
    /// assert_eq!(err, TryReserveError::CapacityOverflow);
    /// ```
    pub fn try_with_slots(slots: usize) -> Result<Self, TryReserveError> {
        Self::from_slot_count(Self::requested_slots(slots), Fallibility::Fallible)
    }

    /// Creates an empty table that accepts at least `capacity` insertions
    /// before it grows.
    ///
    /// Zero selects [`DEFAULT_SLOTS`] slots.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// // Create a table that can hold at least 100 items without resizing
    /// let table: HashTable<String> = HashTable::with_capacity(100);
    /// assert!(table.capacity() >= 100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        infallible(Self::from_capacity(capacity, Fallibility::Infallible))
    }

    /// Fallible version of [`with_capacity`](Self::with_capacity).
    pub fn try_with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        Self::from_capacity(capacity, Fallibility::Fallible)
    }

    #[inline]
    fn requested_slots(slots: usize) -> usize {
        if slots == 0 {
            DEFAULT_SLOTS
        } else {
            slots.max(MIN_SLOTS)
        }
    }

    fn from_capacity(capacity: usize, fallibility: Fallibility) -> Result<Self, TryReserveError> {
        let slots = if capacity == 0 {
            DEFAULT_SLOTS
        } else {
            slots_for(capacity).ok_or_else(|| fallibility.capacity_overflow())?
        };
        Self::from_slot_count(slots, fallibility)
    }

    fn from_slot_count(slots: usize, fallibility: Fallibility) -> Result<Self, TryReserveError> {
        debug_assert!(slots >= MIN_SLOTS);
        Ok(Self {
            slots: allocate_slots(slots, fallibility)?,
            populated: 0,
        })
    }

    /// Returns an iterator over all values in the table.
    ///
    /// The iterator walks the slot buffer front to back, so values come out
    /// in placement order. That order is unspecified and changes whenever
    /// the table grows.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use probe_hash::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_str(s: &str) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     s.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::new();
    /// table
    ///     .entry(hash_str("key1"), |s: &String| s == "key1")
    ///     .or_insert("key1".to_string());
    /// table
    ///     .entry(hash_str("key2"), |s: &String| s == "key2")
    ///     .or_insert("key2".to_string());
    ///
    /// assert_eq!(table.iter().count(), 2);
    /// ```
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            table: self,
            slot_index: 0,
            remaining: self.populated,
        }
    }

    /// Returns an iterator yielding mutable references to every value.
    ///
    /// Only the value may be changed through these references; rewriting the
    /// part of `V` that the hash and predicate look at corrupts the table.
    pub fn iter_mut(&mut self) -> IterMut<'_, V> {
        IterMut {
            remaining: self.populated,
            inner: self.slots.iter_mut(),
        }
    }

    /// Returns an iterator that removes and yields all values from the table.
    ///
    /// The slot count is kept. Dropping the iterator early still empties the
    /// table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.entry(7, |&n: &u64| n == 7).or_insert(7);
    ///
    /// let values: Vec<u64> = table.drain().collect();
    /// assert!(table.is_empty());
    /// assert_eq!(values, vec![7]);
    /// ```
    pub fn drain(&mut self) -> Drain<'_, V> {
        Drain {
            table: self,
            slot_index: 0,
        }
    }

    /// Returns `true` if the table contains no elements.
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the number of elements in the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// assert_eq!(table.len(), 0);
    ///
    /// table.entry(1, |&n: &u64| n == 1).or_insert(1);
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns the number of slots in the buffer.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns how many elements the table holds before an insertion grows
    /// it.
    ///
    /// This is half of [`slot_count`](Self::slot_count), rounded up.
    pub fn capacity(&self) -> usize {
        capacity_for(self.slots.len())
    }

    /// Returns `len() / slot_count()`.
    pub fn load_factor(&self) -> f64 {
        self.populated as f64 / self.slots.len() as f64
    }

    /// Removes all elements from the table.
    ///
    /// Every value is dropped; the slot count is kept.
    pub fn clear(&mut self) {
        if self.populated == 0 {
            return;
        }

        for slot in self.slots.iter_mut() {
            *slot = Slot::Empty;
        }
        self.populated = 0;
    }

    /// Shrinks the slot buffer to the smallest size that keeps every
    /// element below the load factor threshold.
    ///
    /// A table holding `n` elements ends up with `2 * n + 1` slots, so
    /// overwriting an existing entry or adding one new entry does not grow it.
    /// An empty table shrinks to [`MIN_SLOTS`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_hash::HashTable;
    ///
    /// let mut table: HashTable<i32> = HashTable::with_capacity(1000);
    /// table.entry(42, |&v| v == 5).or_insert(5);
    /// table.entry(123, |&v| v == 10).or_insert(10);
    ///
    /// table.shrink_to_fit();
    /// assert!(table.capacity() < 1000);
    /// assert!(table.capacity() >= 2);
    /// ```
    pub fn shrink_to_fit(&mut self) {
        match shrunk_slot_count(self.populated) {
            Some(slots) if slots < self.slots.len() => {
                infallible(self.resize_rehash(slots, Fallibility::Infallible));
            }
            _ => {}
        }
    }

    /// Reserves capacity for at least `additional` more elements.
    ///
    /// After this call `additional` insertions of new keys do not grow the
    /// table. Does nothing if capacity is already sufficient.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<i32> = HashTable::with_capacity(15);
    /// for i in 0..15 {
    ///     table.entry(i as u64, |&n: &i32| n == i).or_insert(i);
    /// }
    ///
    /// table.reserve(50);
    /// assert!(table.capacity() >= 65);
    /// ```
    pub fn reserve(&mut self, additional: usize) {
        infallible(self.reserve_impl(additional, Fallibility::Infallible));
    }

    /// Fallible version of [`reserve`](Self::reserve).
    ///
    /// On error the table is left unchanged.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.reserve_impl(additional, Fallibility::Fallible)
    }

    fn reserve_impl(&mut self, additional: usize, fallibility: Fallibility) -> Result<(), TryReserveError> {
        let required = self
            .populated
            .checked_add(additional)
            .ok_or_else(|| fallibility.capacity_overflow())?;
        if required <= self.capacity() {
            return Ok(());
        }

        let slots = slots_for(required).ok_or_else(|| fallibility.capacity_overflow())?;
        self.resize_rehash(slots, fallibility)
    }

    /// Gets an entry for the given hash and equality predicate.
    ///
    /// If at least half of the slots are occupied the table grows before the
    /// lookup runs, whether or not the entry turns out to be vacant. Any
    /// reference obtained earlier is therefore unusable after this call,
    /// which the borrow on `self` enforces.
    ///
    /// # Panics
    ///
    /// Panics on capacity overflow and aborts on allocation failure while
    /// growing. See [`try_entry`](Self::try_entry).
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use probe_hash::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_str(s: &str) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     s.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::new();
    /// let hash = hash_str("hello");
    ///
    /// match table.entry(hash, |s: &String| s == "hello") {
    ///     probe_hash::hash_table::Entry::Vacant(entry) => {
    ///         entry.insert("hello".to_string());
    ///     }
    ///     probe_hash::hash_table::Entry::Occupied(mut entry) => {
    ///         entry.get_mut().push('!');
    ///     }
    /// }
    ///
    /// assert_eq!(table.find(hash, |s| s == "hello"), Some(&"hello".to_string()));
    /// ```
    #[inline]
    pub fn entry(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Entry<'_, V> {
        infallible(self.reserve_for_insert(Fallibility::Infallible));
        self.entry_impl(hash, eq)
    }

    /// Fallible version of [`entry`](Self::entry).
    ///
    /// Returns an error instead of aborting when the table has to grow and
    /// the new slot buffer cannot be allocated. The table is untouched in
    /// that case.
    #[inline]
    pub fn try_entry(
        &mut self,
        hash: u64,
        eq: impl Fn(&V) -> bool,
    ) -> Result<Entry<'_, V>, TryReserveError> {
        self.reserve_for_insert(Fallibility::Fallible)?;
        Ok(self.entry_impl(hash, eq))
    }

    fn entry_impl(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Entry<'_, V> {
        match self.probe(hash, eq) {
            Probe::Found(index) => Entry::Occupied(OccupiedEntry { table: self, index }),
            Probe::Vacant(index) => Entry::Vacant(VacantEntry {
                table: self,
                hash,
                index,
            }),
            Probe::Exhausted => unreachable!(
                "probe sequence exhausted with {} of {} slots occupied",
                self.populated,
                self.slots.len()
            ),
        }
    }

    /// Walks the probe sequence of `hash`.
    ///
    /// Stored hashes are compared first so `eq` only runs on likely matches.
    #[inline]
    fn probe(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Probe {
        let slots = self.slots.len();
        let home = home_index(hash, slots);

        for offset in 0..slots {
            let index = wrap_index(home, offset, slots);
            match &self.slots[index] {
                Slot::Empty => return Probe::Vacant(index),
                Slot::Occupied {
                    hash: stored,
                    value,
                } if *stored == hash && eq(value) => return Probe::Found(index),
                Slot::Occupied { .. } => {}
            }
        }

        Probe::Exhausted
    }

    /// First empty slot on the probe sequence of `hash`.
    ///
    /// Only used while rehashing, where every entry is known to be distinct.
    fn find_vacant(&self, hash: u64) -> usize {
        let slots = self.slots.len();
        let home = home_index(hash, slots);

        (0..slots)
            .map(|offset| wrap_index(home, offset, slots))
            .find(|&index| self.slots[index].is_empty())
            .unwrap_or_else(|| {
                unreachable!(
                    "no empty slot for rehash with {} of {} slots occupied",
                    self.populated, slots
                )
            })
    }

    /// Writes a new entry into the empty slot at `index`.
    fn occupy(&mut self, index: usize, hash: u64, value: V) -> &mut V {
        debug_assert!(self.slots[index].is_empty());
        self.populated += 1;
        tracing::trace!(
            home = home_index(hash, self.slots.len()),
            index,
            populated = self.populated,
            "placed new entry"
        );

        let slot = &mut self.slots[index];
        *slot = Slot::Occupied { hash, value };
        match slot {
            Slot::Occupied { value, .. } => value,
            Slot::Empty => unreachable!(),
        }
    }

    fn value_at(&self, index: usize) -> &V {
        match &self.slots[index] {
            Slot::Occupied { value, .. } => value,
            Slot::Empty => unreachable!("slot {index} is empty"),
        }
    }

    fn value_at_mut(&mut self, index: usize) -> &mut V {
        match &mut self.slots[index] {
            Slot::Occupied { value, .. } => value,
            Slot::Empty => unreachable!("slot {index} is empty"),
        }
    }

    /// Finds a value in the table by hash and equality predicate.
    ///
    /// Returns a reference to the value if found, or `None` if no matching
    /// value exists. Lookups never change the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use probe_hash::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::new();
    /// table.entry(hash_u64(42), |&n: &u64| n == 42).or_insert(42);
    ///
    /// assert_eq!(table.find(hash_u64(42), |&n| n == 42), Some(&42));
    /// assert_eq!(table.find(hash_u64(99), |&n| n == 99), None);
    /// ```
    #[inline]
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        if self.populated == 0 {
            return None;
        }

        match self.probe(hash, eq) {
            Probe::Found(index) => Some(self.value_at(index)),
            Probe::Vacant(_) | Probe::Exhausted => None,
        }
    }

    /// Finds a value in the table by hash and equality predicate, returning a
    /// mutable reference.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.entry(42, |&(k, _): &(u64, u64)| k == 42).or_insert((42, 1));
    ///
    /// if let Some((_, value)) = table.find_mut(42, |&(k, _)| k == 42) {
    ///     *value = 100;
    /// }
    ///
    /// assert_eq!(table.find(42, |&(k, _)| k == 42), Some(&(42, 100)));
    /// ```
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        if self.populated == 0 {
            return None;
        }

        match self.probe(hash, eq) {
            Probe::Found(index) => Some(self.value_at_mut(index)),
            Probe::Vacant(_) | Probe::Exhausted => None,
        }
    }

    /// Consumes the table, passing every stored value to `destructor` once
    /// before the slot buffer is released.
    ///
    /// Values are handed over by value, so the callback decides what happens
    /// to resources they own.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// for n in 0..4u64 {
    ///     table.entry(n, |&v: &u64| v == n).or_insert(n);
    /// }
    ///
    /// let mut released = 0;
    /// table.free_with(|_| released += 1);
    /// assert_eq!(released, 4);
    /// ```
    pub fn free_with(self, mut destructor: impl FnMut(V)) {
        for value in self {
            destructor(value);
        }
    }

    #[inline]
    fn reserve_for_insert(&mut self, fallibility: Fallibility) -> Result<(), TryReserveError> {
        if is_over_load_threshold(self.populated, self.slots.len()) {
            return self.grow_and_rehash(fallibility);
        }
        Ok(())
    }

    #[cold]
    #[inline(never)]
    fn grow_and_rehash(&mut self, fallibility: Fallibility) -> Result<(), TryReserveError> {
        let mut slots = self.slots.len();
        // A single growth step is not always enough for tiny tables.
        while is_over_load_threshold(self.populated, slots) {
            slots = grown_slot_count(slots).ok_or_else(|| fallibility.capacity_overflow())?;
        }

        self.resize_rehash(slots, fallibility)
    }

    /// Moves every entry into a freshly allocated buffer of `slot_count`
    /// slots.
    ///
    /// The new buffer is allocated before anything is touched, so a failed
    /// allocation leaves the table as it was.
    fn resize_rehash(&mut self, slot_count: usize, fallibility: Fallibility) -> Result<(), TryReserveError> {
        debug_assert!(slot_count > self.populated || slot_count == MIN_SLOTS);

        let new_slots = allocate_slots(slot_count, fallibility)?;
        let old_slots = core::mem::replace(&mut self.slots, new_slots);
        tracing::debug!(
            from = old_slots.len(),
            to = slot_count,
            populated = self.populated,
            "resizing hash table"
        );

        self.populated = 0;
        for slot in old_slots {
            if let Slot::Occupied { hash, value } = slot {
                self.insert_ignoring_load(hash, value);
            }
        }

        Ok(())
    }

    fn insert_ignoring_load(&mut self, hash: u64, value: V) {
        let index = self.find_vacant(hash);
        self.occupy(index, hash, value);
    }

    /// Computes a histogram of entry displacements.
    ///
    /// Displacement is the number of slots between an entry's home slot
    /// (`hash % slot_count()`) and the slot it lives in, counting across the
    /// wraparound. It is the number of extra slots a successful lookup for
    /// that entry inspects.
    ///
    /// Available with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> ProbeHistogram {
        let slot_count = self.slots.len();
        let mut bins = Vec::new();

        for (index, slot) in self.slots.iter().enumerate() {
            if let Slot::Occupied { hash, .. } = slot {
                let distance = displacement(index, *hash, slot_count);
                if bins.len() <= distance {
                    bins.resize(distance + 1, 0);
                }
                bins[distance] += 1;
            }
        }

        ProbeHistogram { bins }
    }

    /// Returns detailed utilization statistics for debugging.
    ///
    /// Available with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let histogram = self.probe_histogram();
        let total_displacement: usize = histogram
            .bins
            .iter()
            .enumerate()
            .map(|(distance, &count)| distance * count)
            .sum();
        let slot_bytes = core::mem::size_of::<Slot<V>>();

        DebugStats {
            populated: self.populated,
            capacity: self.capacity(),
            total_slots: self.slots.len(),
            load_factor: self.load_factor(),
            max_displacement: histogram.max_displacement().unwrap_or(0),
            mean_displacement: if self.populated == 0 {
                0.0
            } else {
                total_displacement as f64 / self.populated as f64
            },
            total_bytes: self.slots.len() * slot_bytes,
            wasted_bytes: (self.slots.len() - self.populated) * slot_bytes,
        }
    }
}

/// A view into a single entry in the hash table, which may be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashTable`].
///
/// [`entry`]: HashTable::entry
pub enum Entry<'a, V> {
    /// A vacant entry - the key is not present in the table
    Vacant(VacantEntry<'a, V>),
    /// An occupied entry - the key is present in the table
    Occupied(OccupiedEntry<'a, V>),
}

impl<'a, V> Entry<'a, V> {
    /// Inserts a default value if the entry is vacant and returns a mutable
    /// reference.
    ///
    /// If the entry is occupied, returns a mutable reference to the existing
    /// value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    ///
    /// let value = table.entry(1, |s: &String| s == "key").or_insert("key".to_string());
    /// assert_eq!(value, "key");
    ///
    /// let existing = table.entry(1, |s: &String| s == "key").or_insert("other".to_string());
    /// assert_eq!(existing, "key");
    /// ```
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts a value computed from a closure if the entry is vacant and
    /// returns a mutable reference.
    ///
    /// The closure only runs for a vacant entry.
    pub fn or_insert_with(self, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Provides in-place mutable access to an occupied entry.
    ///
    /// Returns `None` without inserting anything if the entry is vacant.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Option<&'a mut V> {
        match self {
            Entry::Occupied(entry) => {
                let value = entry.into_mut();
                f(value);
                Some(value)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Inserts `V::default()` if the entry is vacant and returns a mutable
    /// reference.
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(V::default)
    }
}

/// A view into a vacant entry in the hash table.
///
/// Holds the first empty slot on the probe sequence, which is where the
/// value will be written.
pub struct VacantEntry<'a, V> {
    table: &'a mut HashTable<V>,
    hash: u64,
    index: usize,
}

impl<'a, V> VacantEntry<'a, V> {
    /// Inserts a value into the vacant entry and returns a mutable reference to
    /// it.
    pub fn insert(self, value: V) -> &'a mut V {
        self.table.occupy(self.index, self.hash, value)
    }
}

/// A view into an occupied entry in the hash table.
pub struct OccupiedEntry<'a, V> {
    table: &'a mut HashTable<V>,
    index: usize,
}

impl<'a, V> OccupiedEntry<'a, V> {
    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        self.table.value_at(self.index)
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        self.table.value_at_mut(self.index)
    }

    /// Converts the entry into a mutable reference to the value, bound to the
    /// lifetime of the table borrow.
    pub fn into_mut(self) -> &'a mut V {
        self.table.value_at_mut(self.index)
    }

    /// Replaces the value in the entry and returns the old one.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(self.get_mut(), value)
    }
}

/// An iterator over the values in a [`HashTable`].
///
/// Holds a slot index and scans forward to the next occupied slot on every
/// call to `next`.
pub struct Iter<'a, V> {
    table: &'a HashTable<V>,
    slot_index: usize,
    remaining: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let slots: &'a [Slot<V>] = &self.table.slots;
        while self.slot_index < slots.len() {
            let slot = &slots[self.slot_index];
            self.slot_index += 1;
            if let Slot::Occupied { value, .. } = slot {
                self.remaining -= 1;
                return Some(value);
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}

impl<V> FusedIterator for Iter<'_, V> {}

impl<V> Clone for Iter<'_, V> {
    fn clone(&self) -> Self {
        Self {
            table: self.table,
            slot_index: self.slot_index,
            remaining: self.remaining,
        }
    }
}

/// A mutable iterator over the values in a [`HashTable`].
pub struct IterMut<'a, V> {
    inner: core::slice::IterMut<'a, Slot<V>>,
    remaining: usize,
}

impl<'a, V> Iterator for IterMut<'a, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        for slot in self.inner.by_ref() {
            if let Slot::Occupied { value, .. } = slot {
                self.remaining -= 1;
                return Some(value);
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for IterMut<'_, V> {}

impl<V> FusedIterator for IterMut<'_, V> {}

/// A draining iterator over the values in a [`HashTable`].
///
/// This struct is created by the [`drain`] method on [`HashTable`].
/// It yields owned `V` values and empties the table as it iterates.
///
/// [`drain`]: HashTable::drain
pub struct Drain<'a, V> {
    table: &'a mut HashTable<V>,
    slot_index: usize,
}

impl<V> Drop for Drain<'_, V> {
    fn drop(&mut self) {
        for _ in &mut *self {}
    }
}

impl<V> Iterator for Drain<'_, V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.table.populated == 0 {
            return None;
        }

        while self.slot_index < self.table.slots.len() {
            let slot = core::mem::replace(&mut self.table.slots[self.slot_index], Slot::Empty);
            self.slot_index += 1;
            if let Slot::Occupied { value, .. } = slot {
                self.table.populated -= 1;
                return Some(value);
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.populated, Some(self.table.populated))
    }
}

impl<V> ExactSizeIterator for Drain<'_, V> {}

impl<V> FusedIterator for Drain<'_, V> {}

/// An owning iterator over the values of a [`HashTable`].
pub struct IntoIter<V> {
    inner: alloc::vec::IntoIter<Slot<V>>,
    remaining: usize,
}

impl<V> Iterator for IntoIter<V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        for slot in self.inner.by_ref() {
            if let Slot::Occupied { value, .. } = slot {
                self.remaining -= 1;
                return Some(value);
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for IntoIter<V> {}

impl<V> FusedIterator for IntoIter<V> {}

impl<V> IntoIterator for HashTable<V> {
    type IntoIter = IntoIter<V>;
    type Item = V;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            remaining: self.populated,
            inner: self.slots.into_iter(),
        }
    }
}

impl<'a, V> IntoIterator for &'a HashTable<V> {
    type IntoIter = Iter<'a, V>;
    type Item = &'a V;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, V> IntoIterator for &'a mut HashTable<V> {
    type IntoIter = IterMut<'a, V>;
    type Item = &'a mut V;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use core::cell::Cell;
    use core::hash::Hasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    struct HashState {
        k0: u64,
        k1: u64,
    }

    impl HashState {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }

        fn build_hasher(&self) -> SipHasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    #[derive(Debug, PartialEq, Eq, Clone)]
    struct Item {
        key: u64,
        value: i32,
    }

    fn hash_key(state: &HashState, key: u64) -> u64 {
        let mut h = state.build_hasher();
        h.write_u64(key);
        h.finish()
    }

    fn insert_item(table: &mut HashTable<Item>, hash: u64, key: u64, value: i32) {
        match table.entry(hash, |v| v.key == key) {
            Entry::Vacant(v) => {
                v.insert(Item { key, value });
            }
            Entry::Occupied(_) => panic!("unexpected occupied entry for {key}: {table:#?}"),
        }
    }

    #[test]
    fn insert_and_find() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..32u64 {
            let hash = hash_key(&state, k);
            insert_item(&mut table, hash, k, (k as i32) * 2);
            assert_eq!(
                table.find(hash, |v| v.key == k),
                Some(&Item {
                    key: k,
                    value: (k as i32) * 2
                }),
                "{:#?}",
                table
            );
        }
        assert_eq!(table.len(), 32);
        for k in 0..32u64 {
            let hash = hash_key(&state, k);
            assert_eq!(
                table.find(hash, |v| v.key == k),
                Some(&Item {
                    key: k,
                    value: (k as i32) * 2
                }),
                "{:#?}",
                table
            );
        }

        let miss_hash = hash_key(&state, 999);
        assert!(table.find(miss_hash, |v| v.key == 999).is_none());
    }

    #[test]
    fn empty_table_finds_nothing() {
        let state = HashState::default();
        let table: HashTable<Item> = HashTable::new();
        for k in 0..100u64 {
            assert!(table.find(hash_key(&state, k), |v| v.key == k).is_none());
        }
    }

    #[test]
    fn duplicate_entry_is_occupied() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        let k = 42u64;
        let hash = hash_key(&state, k);

        insert_item(&mut table, hash, k, 7);

        match table.entry(hash, |v| v.key == k) {
            Entry::Occupied(mut occ) => {
                let prev = occ.insert(Item { key: k, value: 11 });
                assert_eq!(prev.value, 7);
            }
            Entry::Vacant(_) => panic!("should be occupied: {}#{:02X} in {:#?}", k, hash, table),
        }
        let found = table.find(hash, |v| v.key == k).unwrap();
        assert_eq!(found.value, 11);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn find_mut_and_modify() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..5u64 {
            insert_item(&mut table, hash_key(&state, k), k, 1);
        }

        for k in 0..5u64 {
            let hash = hash_key(&state, k);
            if let Some(v) = table.find_mut(hash, |v| v.key == k) {
                v.value += 9;
            }
        }
        for k in 0..5u64 {
            let hash = hash_key(&state, k);
            let v = table.find(hash, |v| v.key == k).unwrap();
            assert_eq!(v.value, 10);
        }
    }

    #[test]
    fn default_and_requested_slot_counts() {
        let table: HashTable<Item> = HashTable::new();
        assert_eq!(table.slot_count(), DEFAULT_SLOTS);

        let table: HashTable<Item> = HashTable::with_slots(0);
        assert_eq!(table.slot_count(), DEFAULT_SLOTS);

        let table: HashTable<Item> = HashTable::with_slots(42);
        assert_eq!(table.slot_count(), 42);
        assert_eq!(table.capacity(), 21);

        let table: HashTable<Item> = HashTable::with_capacity(0);
        assert_eq!(table.slot_count(), DEFAULT_SLOTS);

        let table: HashTable<Item> = HashTable::with_capacity(10);
        assert_eq!(table.capacity(), 10);
        assert_eq!(table.slot_count(), 19);
    }

    #[test]
    fn grows_on_insert_after_half_full() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_slots(32);

        for k in 0..16u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }
        assert_eq!(table.slot_count(), 32, "{:#?}", table);
        assert_eq!(table.load_factor(), 0.5);

        insert_item(&mut table, hash_key(&state, 16), 16, 16);
        assert_eq!(table.slot_count(), grown_slot_count(32).unwrap());
        assert_eq!(table.len(), 17);

        for k in 0..17u64 {
            let found = table.find(hash_key(&state, k), |v| v.key == k);
            assert_eq!(found.map(|v| v.value), Some(k as i32), "{:#?}", table);
        }
    }

    #[test]
    fn overwrite_at_threshold_still_grows_first() {
        let mut table: HashTable<Item> = HashTable::with_slots(4);
        insert_item(&mut table, 0, 0, 0);
        insert_item(&mut table, 1, 1, 1);
        assert_eq!(table.slot_count(), 4);

        table.entry(0, |v| v.key == 0).or_insert(Item { key: 0, value: 5 });
        assert!(table.slot_count() > 4);
        assert_eq!(table.len(), 2);
        assert_eq!(table.find(0, |v| v.key == 0).map(|v| v.value), Some(0));
    }

    #[test]
    fn single_slot_table_grows_and_misses_cleanly() {
        let mut table: HashTable<Item> = HashTable::with_slots(MIN_SLOTS);
        insert_item(&mut table, 5, 5, 50);
        assert_eq!(table.slot_count(), 1);

        // The only slot is taken; a miss must still terminate.
        assert!(table.find(6, |v| v.key == 6).is_none());

        for k in 6..40u64 {
            insert_item(&mut table, k, k, k as i32 * 10);
            assert!(table.len() * 2 <= table.slot_count() + 1);
        }
        for k in 5..40u64 {
            assert_eq!(table.find(k, |v| v.key == k).map(|v| v.value), Some(k as i32 * 10));
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn insert_many() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..100000u64 {
            let hash = hash_key(&state, k);
            insert_item(&mut table, hash, k, k as i32);
        }

        assert_eq!(table.len(), 100000);
        assert!(table.len() * 2 <= table.slot_count() + 1);
        for k in 0..100000u64 {
            let hash = hash_key(&state, k);
            assert_eq!(
                table.find(hash, |v| v.key == k),
                Some(&Item {
                    key: k,
                    value: k as i32
                })
            );
        }
    }

    #[test]
    fn explicit_collision() {
        let mut table: HashTable<Item> = HashTable::new();
        let hash = 0;
        for k in 0..65u64 {
            insert_item(&mut table, hash, k, k as i32);
        }

        assert_eq!(table.len(), 65);
        for k in 0..65u64 {
            assert_eq!(
                table.find(hash, |v| v.key == k),
                Some(&Item {
                    key: k,
                    value: k as i32
                }),
                "{:#?}",
                table
            );
        }
        assert!(table.find(hash, |v| v.key == 1000).is_none());

        // Every entry sits in one run starting at slot 0.
        let histogram = table.probe_histogram();
        assert_eq!(histogram.bins, vec![1; 65]);
    }

    #[test]
    fn iter_and_drain() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 10..20u64 {
            insert_item(&mut table, hash_key(&state, k), k, (k as i32) + 1);
        }
        let collected: Vec<u64> = table.iter().map(|v| v.key).collect();
        assert_eq!(collected.len(), 10, "{:#?}", table);
        assert_eq!(table.iter().len(), 10);
        for k in 10..20u64 {
            assert_eq!(collected.iter().filter(|&&c| c == k).count(), 1);
        }

        let slots_before = table.slot_count();
        let drained: Vec<Item> = table.drain().collect();
        assert_eq!(drained.len(), 10);
        assert_eq!(table.len(), 0);
        assert_eq!(table.slot_count(), slots_before);

        for k in 10..20u64 {
            let hash = hash_key(&state, k);
            assert!(table.find(hash, |v| v.key == k).is_none());
        }
    }

    #[test]
    fn dropped_drain_empties_table() {
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..8u64 {
            insert_item(&mut table, k, k, 0);
        }

        let mut drain = table.drain();
        assert!(drain.next().is_some());
        drop(drain);

        assert!(table.is_empty());
        assert_eq!(table.iter().count(), 0);
    }

    #[test]
    fn iter_mut_updates_values() {
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..20u64 {
            insert_item(&mut table, k.wrapping_mul(0x9E37_79B9_7F4A_7C15), k, 1);
        }

        for item in table.iter_mut() {
            item.value = item.key as i32 * 3;
        }
        for item in &table {
            assert_eq!(item.value, item.key as i32 * 3);
        }
    }

    #[derive(Debug, PartialEq, Eq, Clone)]
    struct StringItem {
        key: String,
        value: i32,
    }

    fn hash_string_key(state: &HashState, key: &str) -> u64 {
        let mut h = state.build_hasher();
        h.write(key.as_bytes());
        h.finish()
    }

    #[test]
    fn insert_and_find_string_keys() {
        let state = HashState::default();
        let mut table: HashTable<StringItem> = HashTable::new();
        let keys = ["apple", "banana", "cherry", "date", "elderberry"];

        for (i, key) in keys.iter().enumerate() {
            let hash = hash_string_key(&state, key);
            table
                .entry(hash, |v| v.key == *key)
                .or_insert_with(|| StringItem {
                    key: key.to_string(),
                    value: i as i32,
                });
        }

        assert_eq!(table.len(), keys.len());
        for (i, key) in keys.iter().enumerate() {
            let hash = hash_string_key(&state, key);
            let found = table.find(hash, |v| v.key == *key).unwrap();
            assert_eq!(found.value, i as i32);
        }

        let hash = hash_string_key(&state, "fig");
        assert!(table.find(hash, |v| v.key == "fig").is_none());
    }

    #[test]
    fn entry_or_insert_with() {
        let mut table: HashTable<StringItem> = HashTable::new();
        let calls = Cell::new(0);

        for _ in 0..3 {
            table.entry(7, |v| v.key == "seven").or_insert_with(|| {
                calls.set(calls.get() + 1);
                StringItem {
                    key: "seven".to_string(),
                    value: 7,
                }
            });
        }

        assert_eq!(calls.get(), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn entry_into_mut_and_modify() {
        let mut table: HashTable<Item> = HashTable::new();
        let value = table.entry(3, |v| v.key == 3).or_insert(Item { key: 3, value: 1 });
        value.value = 2;

        let modified = table.entry(3, |v| v.key == 3).and_modify(|v| v.value *= 10);
        assert_eq!(modified.map(|v| v.value), Some(20));
        assert!(table.entry(4, |v| v.key == 4).and_modify(|v| v.value = 0).is_none());
        assert_eq!(table.len(), 1);

        *table.entry(5, |v: &Item| v.key == 5).or_default() = Item { key: 5, value: 5 };
        assert_eq!(table.find(5, |v| v.key == 5).map(|v| v.value), Some(5));
    }

    impl Default for Item {
        fn default() -> Self {
            Item { key: 0, value: 0 }
        }
    }

    #[test]
    fn try_entry_inserts_and_grows() {
        let mut table: HashTable<Item> = HashTable::try_with_slots(2).unwrap();
        for k in 0..10u64 {
            match table.try_entry(k, |v| v.key == k).unwrap() {
                Entry::Vacant(v) => {
                    v.insert(Item { key: k, value: 0 });
                }
                Entry::Occupied(_) => unreachable!(),
            }
        }
        assert_eq!(table.len(), 10);
        assert!(table.slot_count() >= 20);
    }

    #[test]
    fn capacity_overflow_is_reported() {
        assert_eq!(
            HashTable::<Item>::try_with_slots(usize::MAX).unwrap_err(),
            TryReserveError::CapacityOverflow
        );
        assert_eq!(
            HashTable::<Item>::try_with_capacity(usize::MAX).unwrap_err(),
            TryReserveError::CapacityOverflow
        );

        let mut table: HashTable<Item> = HashTable::new();
        insert_item(&mut table, 1, 1, 1);
        assert_eq!(
            table.try_reserve(usize::MAX).unwrap_err(),
            TryReserveError::CapacityOverflow
        );
        assert_eq!(
            table.try_reserve(usize::MAX / 2).unwrap_err(),
            TryReserveError::CapacityOverflow
        );

        // Failed growth leaves the table usable.
        assert_eq!(table.slot_count(), DEFAULT_SLOTS);
        assert_eq!(table.find(1, |v| v.key == 1).map(|v| v.value), Some(1));
    }

    #[test]
    fn allocation_failure_is_reported() {
        // Passes the layout check but no allocator can satisfy it.
        let slots = isize::MAX as usize / 64;
        match HashTable::<u64>::try_with_slots(slots) {
            Err(TryReserveError::AllocError { layout }) => {
                assert_eq!(layout.size(), slots * core::mem::size_of::<Slot<u64>>());
            }
            other => panic!("expected an allocation error, got {other:?}"),
        }

        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..10u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }
        let slot_count = table.slot_count();

        assert!(matches!(
            table.try_reserve(isize::MAX as usize / 256),
            Err(TryReserveError::AllocError { .. })
        ));
        assert_eq!(table.slot_count(), slot_count);
        assert_eq!(table.len(), 10);
        for k in 0..10u64 {
            let found = table.find(hash_key(&state, k), |v| v.key == k);
            assert_eq!(found.map(|v| v.value), Some(k as i32));
        }
    }

    #[test]
    fn reserve_avoids_growth() {
        let mut table: HashTable<Item> = HashTable::with_slots(4);
        table.reserve(100);
        let slots = table.slot_count();
        assert!(table.capacity() >= 100);

        for k in 0..100u64 {
            insert_item(&mut table, k, k, 0);
        }
        assert_eq!(table.slot_count(), slots);
    }

    #[test]
    fn free_with_visits_every_entry_once() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..50u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }

        let mut seen = vec![0usize; 50];
        table.free_with(|item| seen[item.key as usize] += 1);
        assert!(seen.iter().all(|&count| count == 1));
    }

    #[test]
    fn drop_releases_owned_values() {
        let shared = Rc::new(());
        {
            let mut table: HashTable<(u64, Rc<()>)> = HashTable::new();
            for k in 0..40u64 {
                table.entry(k, |v| v.0 == k).or_insert((k, Rc::clone(&shared)));
            }
            assert_eq!(Rc::strong_count(&shared), 41);

            table.clear();
            assert_eq!(Rc::strong_count(&shared), 1);

            for k in 0..10u64 {
                table.entry(k, |v| v.0 == k).or_insert((k, Rc::clone(&shared)));
            }
        }
        assert_eq!(Rc::strong_count(&shared), 1);
    }

    #[test]
    #[cfg(feature = "std")]
    fn histogram_output() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..1000u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }

        let histogram = table.probe_histogram();
        assert_eq!(histogram.total(), 1000);
        histogram.print();

        let stats = table.debug_stats();
        assert_eq!(stats.populated, 1000);
        assert_eq!(stats.total_slots, table.slot_count());
        assert_eq!(stats.max_displacement, histogram.max_displacement().unwrap());
        assert!(stats.load_factor <= 0.5);
        stats.print();
    }

    #[test]
    fn test_clone() {
        let state = HashState::default();
        let mut table: HashTable<StringItem> = HashTable::new();
        for i in 0..100 {
            let key = alloc::format!("key_{i}");
            let hash = hash_string_key(&state, &key);
            table.entry(hash, |v| v.key == key).or_insert(StringItem {
                key: key.clone(),
                value: i,
            });
        }

        let cloned = table.clone();
        assert_eq!(cloned.len(), table.len());
        assert_eq!(cloned.slot_count(), table.slot_count());

        for i in 0..100 {
            let key = alloc::format!("key_{i}");
            let hash = hash_string_key(&state, &key);
            assert_eq!(cloned.find(hash, |v| v.key == key).map(|v| v.value), Some(i));
        }
    }

    #[test]
    fn test_shrink_to_fit_with_items() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(1000);
        for k in 0..10u64 {
            insert_item(&mut table, hash_key(&state, k), k, k as i32);
        }

        table.shrink_to_fit();
        assert_eq!(table.slot_count(), 21);
        assert_eq!(table.len(), 10);
        assert!(table.load_factor() <= 0.5);
        for k in 0..10u64 {
            let found = table.find(hash_key(&state, k), |v| v.key == k);
            assert_eq!(found.map(|v| v.value), Some(k as i32));
        }

        // Overwriting an entry right after the shrink keeps the slot buffer.
        let hash = hash_key(&state, 3);
        match table.entry(hash, |v| v.key == 3) {
            Entry::Occupied(mut entry) => entry.get_mut().value = 99,
            Entry::Vacant(_) => unreachable!("key 3 should be present"),
        }
        assert_eq!(table.slot_count(), 21);

        insert_item(&mut table, hash_key(&state, 10), 10, 10);
        assert_eq!(table.slot_count(), 21);
        insert_item(&mut table, hash_key(&state, 11), 11, 11);
        assert!(table.slot_count() > 21);
        assert_eq!(table.find(hash, |v| v.key == 3).map(|v| v.value), Some(99));
    }

    #[test]
    fn test_shrink_to_fit_empty_table() {
        let mut table: HashTable<Item> = HashTable::with_capacity(1000);
        table.shrink_to_fit();
        assert_eq!(table.slot_count(), MIN_SLOTS);
        assert_eq!(table.load_factor(), 0.0);

        insert_item(&mut table, 3, 3, 3);
        insert_item(&mut table, 4, 4, 4);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn debug_output_marks_empty_slots() {
        let mut table: HashTable<Item> = HashTable::with_slots(4);
        insert_item(&mut table, 1, 1, 1);
        let rendered = alloc::format!("{table:?}");
        assert!(rendered.contains(".., 00, .., .."), "{rendered}");
    }
}
