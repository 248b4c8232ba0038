use alloc::vec::Vec;
use core::borrow::Borrow;
use core::fmt::Debug;
use core::marker::PhantomData;
use core::mem;

use crate::group::EMPTY;
use crate::group::GROUP_SIZE;
use crate::group::MAX_AVG_GROUP_LOAD;
use crate::group::Metadata;
use crate::group::TOMBSTONE;
use crate::group::is_full;
use crate::group::num_groups;
use crate::group::probe_start;
use crate::group::split_hash;
use crate::key::TableKey;

/// Capacity used by [`HashTable::new`].
const DEFAULT_CAPACITY: usize = 16;

/// Key/value storage for one group, positionally aligned with its
/// [`Metadata`]. A slot holds `Some` exactly when its control byte is a tag.
#[derive(Clone)]
struct Group<K, V> {
    slots: [Option<(K, V)>; GROUP_SIZE],
}

impl<K, V> Group<K, V> {
    fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }
}

fn storage<K, V>(groups: usize) -> (Vec<Group<K, V>>, Vec<Metadata>) {
    debug_assert!(groups > 0);
    let mut slots = Vec::with_capacity(groups);
    slots.resize_with(groups, Group::new);
    (slots, alloc::vec![Metadata::new(); groups])
}

/// Debug statistics for hash table analysis.
///
/// Compiled only with `cfg(test)` or the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of live entries
    pub resident: usize,
    /// Number of tombstoned slots
    pub dead: usize,
    /// Occupancy (live plus tombstoned) that triggers a rehash
    pub limit: usize,
    /// Number of groups
    pub groups: usize,
    /// Total number of slots allocated
    pub total_slots: usize,
    /// Live entries over total slots
    pub load_factor: f64,
    /// Tombstones over total slots
    pub tombstone_ratio: f64,
    /// Number of rehashes performed since construction or the last `clear`
    pub rehashes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load factor)",
            self.resident,
            self.limit,
            self.load_factor * 100.0
        );
        println!(
            "Groups: {} ({} slots, {} tombstones, {:.2}%)",
            self.groups,
            self.total_slots,
            self.dead,
            self.tombstone_ratio * 100.0
        );
        println!("Rehashes: {}", self.rehashes);
    }
}

/// Distribution of probe lengths, measured in groups from an entry's probe
/// start to the group that holds it.
///
/// Compiled only with `cfg(test)` or the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHistogram {
    /// `buckets[d]` is the number of live entries found `d` groups past their
    /// probe start.
    pub buckets: Vec<usize>,
}

#[cfg(any(test, feature = "stats"))]
impl ProbeHistogram {
    /// Total number of entries counted.
    pub fn total(&self) -> usize {
        self.buckets.iter().sum()
    }

    /// Longest probe distance observed, if any entry was counted.
    pub fn max_distance(&self) -> Option<usize> {
        self.buckets.iter().rposition(|&count| count > 0)
    }

    /// Pretty-print the histogram.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        let total = self.total();
        println!("=== Probe Length Histogram ===");
        for (distance, count) in self.buckets.iter().enumerate() {
            if *count == 0 {
                continue;
            }
            println!(
                "{distance:>4} groups: {count:>10} ({:.2}%)",
                *count as f64 / total as f64 * 100.0
            );
        }
    }
}

/// An open-addressing hash table that stores entries in groups of eight
/// slots, each group guarded by eight control bytes.
///
/// Keys implement [`TableKey`], which routes them through the table's own
/// [`SipHasher13`](crate::SipHasher13). A hash is split into a 57-bit group
/// selector and a 7-bit tag. Lookups start at the selected group and walk
/// forward one group at a time. In each group, the control bytes are compared
/// against the tag in a single word operation, and only tag hits are checked
/// for full key equality. A group with an `EMPTY` lane ends the probe.
///
/// Removals leave a tombstone when the group had no `EMPTY` lane, so probes
/// that passed through the group keep walking. The table rehashes when live
/// entries plus tombstones reach 7/8 of its slots. If tombstones make up at
/// least a third of that occupancy, the rehash keeps the group count and only
/// compacts. Otherwise it doubles the group count.
///
/// ## Example
///
/// ```rust
/// use group_hash::HashTable;
///
/// let mut table = HashTable::new();
/// assert_eq!(table.insert("alice".to_string(), 1), None);
/// assert_eq!(table.insert("alice".to_string(), 2), Some(1));
///
/// assert_eq!(table.get("alice"), Some(&2));
/// assert!(table.contains_key("alice"));
///
/// assert_eq!(table.remove("alice"), Some(2));
/// assert_eq!(table.get("alice"), None);
/// ```
#[derive(Clone)]
pub struct HashTable<K, V> {
    groups: Vec<Group<K, V>>,
    ctrl: Vec<Metadata>,

    resident: usize,
    dead: usize,
    limit: usize,

    #[cfg(any(test, feature = "stats"))]
    rehashes: usize,
}

impl<K, V> Debug for HashTable<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;

        f.debug_struct("HashTable")
            .field("resident", &self.resident)
            .field("dead", &self.dead)
            .field("limit", &self.limit)
            .field(
                "ctrl",
                &self
                    .ctrl
                    .iter()
                    .map(|meta| format!("{meta:?}"))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<K, V> Default for HashTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> HashTable<K, V> {
    /// Creates an empty table sized for 16 entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a new hash table with room for at least `capacity` entries
    /// before the first rehash.
    ///
    /// The capacity is rounded up to whole groups, and there is always at least
    /// one group.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use group_hash::HashTable;
    ///
    /// let table: HashTable<u64, String> = HashTable::with_capacity(100);
    /// assert!(table.capacity() >= 100);
    ///
    /// let tiny: HashTable<u64, String> = HashTable::with_capacity(0);
    /// assert_eq!(tiny.capacity(), 7);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        let groups = num_groups(capacity);
        let (groups_vec, ctrl) = storage(groups);

        Self {
            groups: groups_vec,
            ctrl,
            resident: 0,
            dead: 0,
            limit: groups * MAX_AVG_GROUP_LOAD,
            #[cfg(any(test, feature = "stats"))]
            rehashes: 0,
        }
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.resident
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.resident == 0
    }

    /// Returns the number of occupied slots (live entries plus tombstones) the
    /// table tolerates before its next insert rehashes.
    pub fn capacity(&self) -> usize {
        self.limit
    }

    /// Removes every entry and shrinks the table back to a single group.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use group_hash::HashTable;
    ///
    /// let mut table: HashTable<u32, u32> = (0..100).map(|i| (i, i)).collect();
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert_eq!(table.capacity(), 7);
    /// ```
    pub fn clear(&mut self) {
        let (groups, ctrl) = storage(1);
        self.groups = groups;
        self.ctrl = ctrl;
        self.resident = 0;
        self.dead = 0;
        self.limit = MAX_AVG_GROUP_LOAD;
        #[cfg(any(test, feature = "stats"))]
        {
            self.rehashes = 0;
        }
    }

    /// Returns an iterator over every live entry, in storage order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use group_hash::HashTable;
    ///
    /// let table: HashTable<&str, i32> = [("a", 1), ("b", 2)].into_iter().collect();
    /// let mut sum = 0;
    /// for (_, value) in table.iter() {
    ///     sum += value;
    /// }
    /// assert_eq!(sum, 3);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            table: self,
            group: 0,
            slot: 0,
            remaining: self.resident,
        }
    }

    /// Removes every entry, returning them as an iterator.
    ///
    /// The table keeps its group count. Entries not consumed before the
    /// iterator is dropped are dropped with it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use group_hash::HashTable;
    ///
    /// let mut table: HashTable<u8, u8> = (0..10).map(|i| (i, i)).collect();
    /// let mut drained: Vec<(u8, u8)> = table.drain().collect();
    /// drained.sort();
    ///
    /// assert!(table.is_empty());
    /// assert_eq!(drained.len(), 10);
    /// assert_eq!(drained[3], (3, 3));
    /// ```
    pub fn drain(&mut self) -> Drain<'_, K, V> {
        let (groups, ctrl) = storage(self.groups.len());
        let old = mem::replace(&mut self.groups, groups);
        self.ctrl = ctrl;

        let remaining = mem::take(&mut self.resident);
        self.dead = 0;

        Drain {
            groups: old.into_iter(),
            slots: Group::new().slots.into_iter(),
            remaining,
            _table: PhantomData,
        }
    }

    fn next_group(&self, group: usize) -> usize {
        let next = group + 1;
        if next == self.groups.len() { 0 } else { next }
    }
}

impl<K: TableKey, V> HashTable<K, V> {
    /// Returns a reference to the value stored for `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use group_hash::HashTable;
    ///
    /// let mut table = HashTable::new();
    /// table.insert(42u64, "answer");
    /// assert_eq!(table.get(&42), Some(&"answer"));
    /// assert_eq!(table.get(&7), None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: TableKey + ?Sized,
    {
        let (group, slot) = self.find(key)?;
        self.groups[group].slots[slot].as_ref().map(|(_, v)| v)
    }

    /// Returns the stored key and value for `key`.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: TableKey + ?Sized,
    {
        let (group, slot) = self.find(key)?;
        self.groups[group].slots[slot].as_ref().map(|(k, v)| (k, v))
    }

    /// Returns a mutable reference to the value stored for `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use group_hash::HashTable;
    ///
    /// let mut table = HashTable::new();
    /// table.insert("hits", 1);
    /// if let Some(hits) = table.get_mut("hits") {
    ///     *hits += 1;
    /// }
    /// assert_eq!(table.get("hits"), Some(&2));
    /// ```
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: TableKey + ?Sized,
    {
        let (group, slot) = self.find(key)?;
        self.groups[group].slots[slot].as_mut().map(|(_, v)| v)
    }

    /// Returns `true` if the table holds an entry for `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: TableKey + ?Sized,
    {
        self.find(key).is_some()
    }

    /// Inserts `value` for `key`, returning the value it replaced.
    ///
    /// An existing entry keeps its original key and has its value
    /// overwritten in place. If occupancy has reached the limit, the table
    /// rehashes before searching.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use group_hash::HashTable;
    ///
    /// let mut table = HashTable::new();
    /// assert_eq!(table.insert(1, "a"), None);
    /// assert_eq!(table.insert(1, "b"), Some("a"));
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if self.resident + self.dead >= self.limit {
            self.rehash();
        }

        let hash = key.table_hash();
        self.insert_hashed(hash, key, value)
    }

    /// Removes the entry for `key`, returning its value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use group_hash::HashTable;
    ///
    /// let mut table = HashTable::new();
    /// table.insert(5, "five");
    /// assert_eq!(table.remove(&5), Some("five"));
    /// assert_eq!(table.remove(&5), None);
    /// ```
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: TableKey + ?Sized,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes the entry for `key`, returning the stored key and value.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: TableKey + ?Sized,
    {
        let (group, slot) = self.find(key)?;

        // Must be checked while the slot still holds its tag.
        let ctrl = if self.ctrl[group].match_empty().any() {
            EMPTY
        } else {
            self.dead += 1;
            TOMBSTONE
        };
        self.ctrl[group].set(slot, ctrl);
        self.resident -= 1;

        let entry = self.groups[group].slots[slot].take();
        debug_assert!(entry.is_some(), "tagged slot held no entry");
        entry
    }

    fn find<Q>(&self, key: &Q) -> Option<(usize, usize)>
    where
        K: Borrow<Q>,
        Q: TableKey + ?Sized,
    {
        let (h1, h2) = split_hash(key.table_hash());
        let mut group = probe_start(h1, self.groups.len());

        loop {
            let meta = &self.ctrl[group];
            for slot in meta.match_tag(h2) {
                if let Some((k, _)) = &self.groups[group].slots[slot]
                    && Borrow::<Q>::borrow(k) == key
                {
                    return Some((group, slot));
                }
            }

            if meta.match_empty().any() {
                return None;
            }

            group = self.next_group(group);
        }
    }

    fn insert_hashed(&mut self, hash: u64, key: K, value: V) -> Option<V> {
        let (h1, h2) = split_hash(hash);
        let mut group = probe_start(h1, self.groups.len());

        loop {
            for slot in self.ctrl[group].match_tag(h2) {
                if let Some((k, v)) = &mut self.groups[group].slots[slot]
                    && *k == key
                {
                    return Some(mem::replace(v, value));
                }
            }

            if let Some(slot) = self.ctrl[group].match_empty().lowest() {
                self.groups[group].slots[slot] = Some((key, value));
                self.ctrl[group].set(slot, h2);
                self.resident += 1;
                return None;
            }

            group = self.next_group(group);
        }
    }

    #[cold]
    #[inline(never)]
    fn rehash(&mut self) {
        let groups = if self.dead >= self.resident / 2 {
            self.groups.len()
        } else {
            self.groups.len() * 2
        };

        let (new_groups, new_ctrl) = storage(groups);
        let old_groups = mem::replace(&mut self.groups, new_groups);
        let old_ctrl = mem::replace(&mut self.ctrl, new_ctrl);
        debug_assert_eq!(old_groups.len(), old_ctrl.len());

        #[cfg(debug_assertions)]
        let expected = self.resident;

        self.limit = groups * MAX_AVG_GROUP_LOAD;
        self.resident = 0;
        self.dead = 0;
        #[cfg(any(test, feature = "stats"))]
        {
            self.rehashes += 1;
        }

        for (group, meta) in old_groups.into_iter().zip(old_ctrl) {
            for (slot, entry) in group.slots.into_iter().enumerate() {
                if !is_full(meta.get(slot)) {
                    debug_assert!(entry.is_none());
                    continue;
                }

                if let Some((key, value)) = entry {
                    let hash = key.table_hash();
                    self.insert_hashed(hash, key, value);
                }
            }
        }

        #[cfg(debug_assertions)]
        debug_assert_eq!(self.resident, expected, "rehash lost or duplicated entries");
        debug_assert!(self.resident < self.limit);
    }

    /// Returns a snapshot of the table's occupancy counters.
    ///
    /// Compiled only with `cfg(test)` or the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let total_slots = self.groups.len() * GROUP_SIZE;
        DebugStats {
            resident: self.resident,
            dead: self.dead,
            limit: self.limit,
            groups: self.groups.len(),
            total_slots,
            load_factor: self.resident as f64 / total_slots as f64,
            tombstone_ratio: self.dead as f64 / total_slots as f64,
            rehashes: self.rehashes,
        }
    }

    /// Computes how far each live entry sits from its probe start.
    ///
    /// Compiled only with `cfg(test)` or the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> ProbeHistogram {
        let groups = self.groups.len();
        let mut buckets = alloc::vec![0usize; groups];
        for (index, group) in self.groups.iter().enumerate() {
            for (key, _) in group.slots.iter().flatten() {
                let (h1, _) = split_hash(key.table_hash());
                let start = probe_start(h1, groups);
                buckets[(index + groups - start) % groups] += 1;
            }
        }

        if let Some(last) = buckets.iter().rposition(|&count| count > 0) {
            buckets.truncate(last + 1);
        } else {
            buckets.clear();
        }
        ProbeHistogram { buckets }
    }
}

impl<K: TableKey, V> Extend<(K, V)> for HashTable<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K: TableKey, V> FromIterator<(K, V)> for HashTable<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut table = Self::with_capacity(iter.size_hint().0.max(DEFAULT_CAPACITY));
        table.extend(iter);
        table
    }
}

impl<'a, K, V> IntoIterator for &'a HashTable<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the entries of a [`HashTable`].
///
/// This struct is created by [`HashTable::iter`].
pub struct Iter<'a, K, V> {
    table: &'a HashTable<K, V>,
    group: usize,
    slot: usize,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let table = self.table;
        while self.group < table.groups.len() {
            while self.slot < GROUP_SIZE {
                let slot = self.slot;
                self.slot += 1;
                if let Some((k, v)) = &table.groups[self.group].slots[slot] {
                    self.remaining -= 1;
                    return Some((k, v));
                }
            }

            self.group += 1;
            self.slot = 0;
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// A draining iterator over the entries of a [`HashTable`].
///
/// This struct is created by [`HashTable::drain`].
pub struct Drain<'a, K, V> {
    groups: alloc::vec::IntoIter<Group<K, V>>,
    slots: core::array::IntoIter<Option<(K, V)>, GROUP_SIZE>,
    remaining: usize,
    _table: PhantomData<&'a mut HashTable<K, V>>,
}

impl<K, V> Iterator for Drain<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            for entry in self.slots.by_ref() {
                if entry.is_some() {
                    self.remaining -= 1;
                    return entry;
                }
            }

            self.slots = self.groups.next()?.slots.into_iter();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Drain<'_, K, V> {}

#[cfg(test)]
mod tests {
    use alloc::format;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec::Vec;
    use core::hash::Hasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::IdentityKey;
    use crate::SipHasher13;

    /// A key whose hash is chosen by the test.
    #[derive(Debug, Clone, PartialEq)]
    struct Fixed {
        id: u32,
        hash: u64,
    }

    impl TableKey for Fixed {
        fn encode(&self, hasher: &mut SipHasher13) {
            hasher.write(&self.hash.to_le_bytes());
        }

        fn table_hash(&self) -> u64 {
            self.hash
        }
    }

    fn fixed(id: u32) -> Fixed {
        Fixed {
            id,
            hash: 0xDEAD_BEEF_0000_0042,
        }
    }

    /// Walks the storage and checks it against the counters.
    fn check_invariants<K, V>(table: &HashTable<K, V>) {
        assert_eq!(table.groups.len(), table.ctrl.len());

        let mut full = 0;
        let mut tombstones = 0;
        for (group, meta) in table.groups.iter().zip(&table.ctrl) {
            for (slot, ctrl) in meta.bytes().iter().enumerate() {
                if is_full(*ctrl) {
                    full += 1;
                    assert!(group.slots[slot].is_some());
                } else {
                    if *ctrl == TOMBSTONE {
                        tombstones += 1;
                    }
                    assert!(group.slots[slot].is_none());
                }
            }
        }

        assert_eq!(full, table.resident);
        assert_eq!(tombstones, table.dead);
        assert!(table.resident + table.dead <= table.limit);
        assert!(table.limit < table.groups.len() * GROUP_SIZE);
    }

    #[test]
    fn insert_and_get() {
        let mut table: HashTable<u64, u64> = HashTable::new();
        for k in 0..32u64 {
            assert_eq!(table.insert(k, k * 2), None);
            assert_eq!(table.get(&k), Some(&(k * 2)), "{table:#?}");
        }

        assert_eq!(table.len(), 32);
        for k in 0..32u64 {
            assert_eq!(table.get(&k), Some(&(k * 2)));
            assert!(table.contains_key(&k));
        }

        assert_eq!(table.get(&999), None);
        assert!(!table.contains_key(&999));
        check_invariants(&table);
    }

    #[test]
    fn overwrite_keeps_len() {
        let mut table = HashTable::new();
        assert_eq!(table.insert(7u32, "first"), None);
        assert_eq!(table.insert(7u32, "second"), Some("first"));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&7), Some(&"second"));
    }

    #[test]
    fn overwrite_keeps_original_key() {
        let mut table = HashTable::new();
        let a = Fixed { id: 1, hash: 5 };
        table.insert(a.clone(), 1);
        table.insert(a.clone(), 2);

        let (key, value) = table.get_key_value(&a).unwrap();
        assert_eq!(key, &a);
        assert_eq!(*value, 2);
    }

    #[test]
    fn remove_then_absent() {
        let mut table: HashTable<u64, String> = HashTable::new();
        for k in 0..8u64 {
            table.insert(k, k.to_string());
        }

        assert_eq!(table.remove(&3), Some("3".to_string()));
        assert_eq!(table.get(&3), None);
        assert_eq!(table.remove(&3), None);
        assert_eq!(table.len(), 7);
        assert_eq!(table.remove(&1000), None);

        assert_eq!(table.remove_entry(&4), Some((4, "4".to_string())));
        check_invariants(&table);
    }

    #[test]
    fn get_mut_modifies() {
        let mut table: HashTable<u64, i32> = HashTable::new();
        for k in 0..5u64 {
            table.insert(k, 1);
        }
        for k in 0..5u64 {
            *table.get_mut(&k).unwrap() += 9;
        }
        for k in 0..5u64 {
            assert_eq!(table.get(&k), Some(&10));
        }
        assert!(table.get_mut(&5).is_none());
    }

    #[test]
    fn string_keys_borrow_as_str() {
        let mut table: HashTable<String, usize> = HashTable::new();
        let words = ["alpha", "beta", "gamma", "delta", "", "epsilon"];
        for (i, word) in words.iter().enumerate() {
            table.insert(word.to_string(), i);
        }

        for (i, word) in words.iter().enumerate() {
            assert_eq!(table.get(*word), Some(&i));
        }
        assert_eq!(table.get(""), Some(&4));
        assert_eq!(table.get("zeta"), None);

        assert_eq!(table.remove("beta"), Some(1));
        assert!(!table.contains_key("beta"));
    }

    #[test]
    fn mixed_scalar_keys() {
        let mut floats = HashTable::new();
        floats.insert(1.5f64, "a");
        floats.insert(-0.0f64, "b");
        assert_eq!(floats.get(&1.5), Some(&"a"));
        assert_eq!(floats.get(&-0.0), Some(&"b"));

        let mut flags = HashTable::new();
        flags.insert(true, 1);
        flags.insert(false, 0);
        assert_eq!(flags.get(&true), Some(&1));
        assert_eq!(flags.len(), 2);

        let mut optional = HashTable::new();
        optional.insert(None, "none");
        optional.insert(Some(0u8), "zero");
        assert_eq!(optional.get(&None), Some(&"none"));
        assert_eq!(optional.get(&Some(0)), Some(&"zero"));
    }

    #[test]
    fn identity_keys() {
        let a = IdentityKey::new(String::from("same"));
        let b = IdentityKey::new(String::from("same"));

        let mut table = HashTable::new();
        table.insert(a.clone(), 1);
        table.insert(b.clone(), 2);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&a), Some(&1));
        assert_eq!(table.get(&b), Some(&2));
        assert_eq!(table.get(&IdentityKey::new(String::from("same"))), None);
    }

    #[test]
    fn concrete_scenario() {
        let mut table: HashTable<i64, i64> = HashTable::with_capacity(16);
        let initial_groups = table.debug_stats().groups;
        for k in 0..100 {
            table.insert(k, k * 10);
        }

        let stats = table.debug_stats();
        assert_eq!(table.len(), 100);
        assert!(stats.rehashes >= 1);
        assert!(stats.groups > initial_groups);
        assert_eq!(table.get(&57), Some(&570));

        assert_eq!(table.remove(&57), Some(570));
        assert_eq!(table.get(&57), None);
        assert_eq!(table.get(&56), Some(&560));
        assert_eq!(table.get(&58), Some(&580));
        check_invariants(&table);
    }

    #[test]
    fn growth_preserves_content() {
        let mut table: HashTable<u64, u64> = HashTable::with_capacity(0);
        let mut rehashes = 0;
        let mut k = 0u64;
        while rehashes < 4 {
            table.insert(k, k);
            if k % 3 == 0 {
                table.insert(k, k + 1);
            }

            let stats = table.debug_stats();
            if stats.rehashes != rehashes {
                rehashes = stats.rehashes;
                assert_eq!(stats.dead, 0);
                for j in 0..=k {
                    let expected = if j % 3 == 0 { j + 1 } else { j };
                    assert_eq!(table.get(&j), Some(&expected), "{table:#?}");
                }
                check_invariants(&table);
            }

            assert_eq!(table.len() as u64, k + 1);
            k += 1;
        }
    }

    #[test]
    fn growth_doubles_groups() {
        let mut table: HashTable<u64, ()> = HashTable::with_capacity(8);
        assert_eq!(table.debug_stats().groups, 2);
        for k in 0..14 {
            table.insert(k, ());
        }
        assert_eq!(table.debug_stats().rehashes, 0);

        table.insert(14, ());
        let stats = table.debug_stats();
        assert_eq!(stats.rehashes, 1);
        assert_eq!(stats.groups, 4);
        assert_eq!(stats.limit, 28);
    }

    #[test]
    fn saturated_group_leaves_tombstone() {
        let mut table = HashTable::with_capacity(8);
        for id in 0..9 {
            table.insert(fixed(id), id);
        }
        // Ids 0..8 fill the probe-start group, id 8 spills into the next one.
        assert_eq!(table.debug_stats().dead, 0);

        assert_eq!(table.remove(&fixed(3)), Some(3));
        assert_eq!(table.debug_stats().dead, 1);
        assert_eq!(table.len(), 8);
        assert_eq!(table.get(&fixed(8)), Some(&8), "{table:#?}");
        assert_eq!(table.get(&fixed(3)), None);

        // The spill group still has empty lanes.
        assert_eq!(table.remove(&fixed(8)), Some(8));
        assert_eq!(table.debug_stats().dead, 1);
        assert_eq!(table.len(), 7);

        // Tombstones are not reused by insertion.
        table.insert(fixed(9), 9);
        assert_eq!(table.debug_stats().dead, 1);
        assert_eq!(table.get(&fixed(9)), Some(&9));
        for id in [0, 1, 2, 4, 5, 6, 7] {
            assert_eq!(table.get(&fixed(id)), Some(&id));
        }
        check_invariants(&table);
    }

    #[test]
    fn tombstone_heavy_rehash_compacts() {
        let mut table = HashTable::with_capacity(8);
        for id in 0..9 {
            table.insert(fixed(id), id);
        }
        for id in 0..8 {
            assert_eq!(table.remove(&fixed(id)), Some(id));
        }

        let stats = table.debug_stats();
        assert_eq!(stats.dead, 8);
        assert_eq!(stats.resident, 1);

        for id in 9..14 {
            table.insert(fixed(id), id);
        }
        assert_eq!(table.debug_stats().rehashes, 0);

        table.insert(fixed(14), 14);
        let stats = table.debug_stats();
        assert_eq!(stats.rehashes, 1);
        assert_eq!(stats.groups, 2);
        assert_eq!(stats.dead, 0);
        assert_eq!(stats.resident, 7);

        for id in 0..8 {
            assert_eq!(table.get(&fixed(id)), None);
        }
        for id in 8..15 {
            assert_eq!(table.get(&fixed(id)), Some(&id));
        }
        check_invariants(&table);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn tombstone_liveness() {
        let mut table: HashTable<u64, u64> = HashTable::with_capacity(16);
        let mut expected: hashbrown::HashMap<u64, u64> = hashbrown::HashMap::new();

        for k in 0..200u64 {
            table.insert(k, k);
            expected.insert(k, k);
        }

        for k in 0..200u64 {
            if k % 2 == 0 {
                assert_eq!(table.remove(&k), expected.remove(&k));
            }
            let fresh = 1_000 + k;
            table.insert(fresh, fresh * 3);
            expected.insert(fresh, fresh * 3);
            if k % 5 == 0 {
                assert_eq!(table.remove(&(fresh - 1)), expected.remove(&(fresh - 1)));
            }
        }

        assert_eq!(table.len(), expected.len());
        for k in (0..200u64).chain(1_000..1_200) {
            assert_eq!(table.get(&k), expected.get(&k), "key {k}");
        }
        check_invariants(&table);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn colliding_tags_all_retrievable() {
        let keys: Vec<u64> = (0u64..)
            .filter(|k| k.table_hash() & 0x7F == 0x2A)
            .take(256)
            .collect();

        let mut table = HashTable::with_capacity(0);
        for (i, k) in keys.iter().enumerate() {
            table.insert(*k, i);
        }

        assert_eq!(table.len(), keys.len());
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(table.get(k), Some(&i));
        }
        check_invariants(&table);
    }

    #[test]
    fn explicit_collision() {
        let mut table = HashTable::with_capacity(0);
        for id in 0..65 {
            table.insert(fixed(id), id);
        }

        assert_eq!(table.len(), 65);
        for id in 0..65 {
            assert_eq!(table.get(&fixed(id)), Some(&id), "{table:#?}");
        }

        for id in (0..65).step_by(2) {
            assert_eq!(table.remove(&fixed(id)), Some(id));
        }
        for id in 0..65 {
            let expected = if id % 2 == 0 { None } else { Some(&id) };
            assert_eq!(table.get(&fixed(id)), expected);
        }
        check_invariants(&table);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn random_ops_match_reference() {
        let mut rng = SmallRng::seed_from_u64(0x6a09_e667);
        let mut table: HashTable<u32, u64> = HashTable::with_capacity(0);
        let mut expected: hashbrown::HashMap<u32, u64> = hashbrown::HashMap::new();

        for step in 0..50_000u64 {
            let key = rng.random_range(0..600u32);
            match rng.random_range(0..10) {
                0..=4 => assert_eq!(table.insert(key, step), expected.insert(key, step)),
                5..=7 => assert_eq!(table.remove(&key), expected.remove(&key)),
                _ => assert_eq!(table.get(&key), expected.get(&key)),
            }
            assert_eq!(table.len(), expected.len());

            if step % 5_000 == 0 {
                check_invariants(&table);
            }
        }

        for (k, v) in &expected {
            assert_eq!(table.get(k), Some(v));
        }
        check_invariants(&table);
    }

    #[test]
    fn clear_resets_to_single_group() {
        let mut table: HashTable<u64, u64> = (0..100).map(|k| (k, k)).collect();
        table.remove(&3);
        table.clear();

        let stats = table.debug_stats();
        assert_eq!(stats.groups, 1);
        assert_eq!(stats.resident, 0);
        assert_eq!(stats.dead, 0);
        assert_eq!(stats.limit, 7);
        assert_eq!(table.get(&5), None);

        for k in 0..20 {
            table.insert(k, k + 1);
        }
        assert_eq!(table.get(&19), Some(&20));
        check_invariants(&table);
    }

    #[test]
    fn iter_visits_each_entry_once() {
        let mut table: HashTable<u64, u64> = HashTable::with_capacity(0);
        for k in 10..60u64 {
            table.insert(k, k * 2);
        }
        for k in (10..60u64).step_by(3) {
            table.remove(&k);
        }

        let iter = table.iter();
        assert_eq!(iter.len(), table.len());

        let mut seen: Vec<(u64, u64)> = iter.map(|(k, v)| (*k, *v)).collect();
        seen.sort_unstable();
        let expected: Vec<(u64, u64)> = (10..60u64)
            .filter(|k| (k - 10) % 3 != 0)
            .map(|k| (k, k * 2))
            .collect();
        assert_eq!(seen, expected);
        assert_eq!((&table).into_iter().count(), expected.len());
    }

    #[test]
    fn drain_empties_table() {
        let mut table: HashTable<String, usize> = HashTable::new();
        for i in 0..30 {
            table.insert(format!("key-{i}"), i);
        }
        let groups = table.debug_stats().groups;

        let mut drained: Vec<usize> = table.drain().map(|(_, v)| v).collect();
        drained.sort_unstable();
        assert_eq!(drained, (0..30).collect::<Vec<_>>());

        assert!(table.is_empty());
        assert_eq!(table.iter().count(), 0);
        assert_eq!(table.debug_stats().groups, groups);
        assert_eq!(table.get("key-1"), None);

        table.insert("again".to_string(), 1);
        assert_eq!(table.get("again"), Some(&1));
        check_invariants(&table);
    }

    #[test]
    fn partial_drain_still_empties() {
        let mut table: HashTable<u64, u64> = (0..20).map(|k| (k, k)).collect();
        {
            let mut drain = table.drain();
            assert_eq!(drain.len(), 20);
            drain.next();
            assert_eq!(drain.len(), 19);
        }
        assert!(table.is_empty());
        check_invariants(&table);
    }

    #[test]
    fn clone_is_independent() {
        let mut original: HashTable<u64, String> = HashTable::new();
        for k in 0..40u64 {
            original.insert(k, k.to_string());
        }
        original.remove(&10);

        let mut copy = original.clone();
        assert_eq!(copy.len(), original.len());
        copy.insert(10, "ten".to_string());
        copy.remove(&11);

        assert_eq!(original.get(&10), None);
        assert_eq!(original.get(&11), Some(&"11".to_string()));
        assert_eq!(copy.get(&10), Some(&"ten".to_string()));
        assert_eq!(copy.get(&11), None);
        check_invariants(&original);
        check_invariants(&copy);
    }

    #[test]
    fn probe_histogram_counts_live_entries() {
        let mut table: HashTable<u64, u64> = HashTable::with_capacity(0);
        assert_eq!(table.probe_histogram().total(), 0);
        assert_eq!(table.probe_histogram().max_distance(), None);

        for k in 0..500u64 {
            table.insert(k, k);
        }
        for k in 0..100u64 {
            table.remove(&k);
        }

        let histogram = table.probe_histogram();
        assert_eq!(histogram.total(), table.len());
        assert!(histogram.buckets[0] > 0);
    }

    #[test]
    fn debug_shows_control_bytes() {
        let mut table = HashTable::with_capacity(0);
        table.insert(fixed(1), 1);
        let rendered = format!("{table:?}");
        assert!(rendered.contains("resident: 1"));
        assert!(rendered.contains(".."));

        let tag = (fixed(1).hash & 0x7F) as u8;
        assert!(rendered.contains(&format!("{tag:02x}")));
    }
}
