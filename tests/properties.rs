#![cfg(feature = "foldhash")]

use std::collections::HashMap as ModelMap;
use std::collections::HashSet;
use std::hash::Hash;
use std::hash::Hasher;

use probe_hash::DEFAULT_SLOTS;
use probe_hash::HashMap;
use probe_hash::HashTable;
use probe_hash::hash_table::Entry;
use proptest::prelude::*;

/// Compares and hashes by `id` only, so two keys can be equal while still
/// telling apart which one the map kept.
#[derive(Debug, Clone)]
struct TaggedKey {
    id: u16,
    tag: u32,
}

impl PartialEq for TaggedKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TaggedKey {}

impl Hash for TaggedKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

fn assert_load_below_threshold<K, V>(m: &HashMap<K, V>) -> Result<(), TestCaseError> {
    // The check runs before each insertion, so one entry past half is allowed.
    prop_assert!(m.len() * 2 <= m.slot_count() + 1, "{} entries in {} slots", m.len(), m.slot_count());
    Ok(())
}

proptest! {
    // Every stored key reads back its last written value, and size tracks the
    // number of distinct keys.
    #[test]
    fn prop_matches_model(ops in proptest::collection::vec((0u8..=2u8, 0u32..200u32, any::<i64>()), 1..400)) {
        let mut m: HashMap<u32, i64> = HashMap::new();
        let mut model: ModelMap<u32, i64> = ModelMap::new();

        for (op, key, value) in ops {
            match op {
                // put
                0 => {
                    let stored = *m.put(key, value).unwrap();
                    prop_assert_eq!(stored, value);
                    model.insert(key, value);
                }
                // insert reports the previous value
                1 => {
                    prop_assert_eq!(m.insert(key, value), model.insert(key, value));
                }
                // lookup
                2 => {
                    prop_assert_eq!(m.get(&key), model.get(&key));
                    prop_assert_eq!(m.contains_key(&key), model.contains_key(&key));
                }
                _ => unreachable!(),
            }

            prop_assert_eq!(m.len(), model.len());
            assert_load_below_threshold(&m)?;
        }

        for (key, value) in &model {
            prop_assert_eq!(m.get(key), Some(value));
        }
    }

    // Writing an existing key again leaves the size alone.
    #[test]
    fn prop_overwrite_keeps_size(keys in proptest::collection::hash_set(any::<u64>(), 1..100), rounds in 1usize..4) {
        let mut m: HashMap<u64, usize> = HashMap::new();
        for round in 0..rounds {
            for &key in &keys {
                m.put(key, round).unwrap();
            }
            prop_assert_eq!(m.len(), keys.len());
        }

        for key in &keys {
            prop_assert_eq!(m.get(key), Some(&(rounds - 1)));
        }
    }

    // A freshly created table, of any size, contains nothing.
    #[test]
    fn prop_empty_table_finds_nothing(slots in 0usize..512, probes in proptest::collection::vec(any::<u64>(), 1..64)) {
        let m: HashMap<u64, u64> = HashMap::with_slots(slots);
        prop_assert!(m.is_empty());
        for key in probes {
            prop_assert_eq!(m.get(&key), None);
        }
    }

    // All keys sharing one hash stay distinct and retrievable.
    #[test]
    fn prop_constant_hash(hash in any::<u64>(), count in 1u64..300) {
        let mut table: HashTable<(u64, u64)> = HashTable::new();
        for key in 0..count {
            match table.entry(hash, |&(k, _)| k == key) {
                Entry::Vacant(entry) => {
                    entry.insert((key, key * 3));
                }
                Entry::Occupied(_) => prop_assert!(false, "key {} collided with itself", key),
            }
        }

        prop_assert_eq!(table.len(), count as usize);
        for key in 0..count {
            prop_assert_eq!(table.find(hash, |&(k, _)| k == key), Some(&(key, key * 3)));
        }
        prop_assert_eq!(table.find(hash, |&(k, _)| k == count), None);
    }

    // Growth from any starting size keeps every entry reachable.
    #[test]
    fn prop_growth_keeps_entries(slots in 1usize..64, keys in proptest::collection::vec(any::<u32>(), 1..500)) {
        let mut m: HashMap<u32, u32> = HashMap::with_slots(slots);
        let mut model: ModelMap<u32, u32> = ModelMap::new();
        let mut last_slots = m.slot_count();

        for key in keys {
            m.put(key, key.wrapping_mul(7)).unwrap();
            model.insert(key, key.wrapping_mul(7));

            prop_assert!(m.slot_count() >= last_slots);
            last_slots = m.slot_count();
            assert_load_below_threshold(&m)?;
        }

        prop_assert_eq!(m.len(), model.len());
        for (key, value) in &model {
            prop_assert_eq!(m.get(key), Some(value));
        }
    }

    // Iteration yields each stored pair exactly once.
    #[test]
    fn prop_iteration_complete(pairs in proptest::collection::vec((any::<u16>(), any::<u8>()), 0..300)) {
        let m: HashMap<u16, u8> = pairs.iter().copied().collect();
        let model: ModelMap<u16, u8> = pairs.iter().copied().collect();

        prop_assert_eq!(m.iter().len(), model.len());
        let mut seen = HashSet::new();
        for (key, value) in m.iter() {
            prop_assert!(seen.insert(*key), "key {} yielded twice", key);
            prop_assert_eq!(model.get(key), Some(value));
        }
        prop_assert_eq!(seen.len(), model.len());

        let mut released = 0;
        m.free_with(|key, value| {
            assert_eq!(model.get(&key), Some(&value));
            released += 1;
        });
        prop_assert_eq!(released, model.len());
    }

    // The first key object written for an equal key is the one kept.
    #[test]
    fn prop_first_key_wins(writes in proptest::collection::vec((0u16..32, any::<u32>()), 1..200)) {
        let mut m: HashMap<TaggedKey, usize> = HashMap::new();
        let mut first_tags: ModelMap<u16, u32> = ModelMap::new();

        for (index, (id, tag)) in writes.iter().copied().enumerate() {
            m.put(TaggedKey { id, tag }, index).unwrap();
            first_tags.entry(id).or_insert(tag);
        }

        prop_assert_eq!(m.len(), first_tags.len());
        for (key, _) in m.iter() {
            prop_assert_eq!(Some(&key.tag), first_tags.get(&key.id));
        }
    }
}

#[test]
fn default_table_grows_on_seventeenth_insert() {
    let mut m: HashMap<u32, u32> = HashMap::new();
    assert_eq!(m.slot_count(), DEFAULT_SLOTS);

    for key in 0..16 {
        m.put(key, key).unwrap();
    }
    assert_eq!(m.slot_count(), 32);

    m.put(16, 16).unwrap();
    if cfg!(feature = "growth-three-halves") {
        assert_eq!(m.slot_count(), 49);
    } else {
        assert_eq!(m.slot_count(), 64);
    }

    for key in 0..17 {
        assert_eq!(m.get(&key), Some(&key));
    }
}

#[test]
fn requested_slot_count_is_exact() {
    let m: HashMap<u8, u8> = HashMap::with_slots(42);
    assert_eq!(m.slot_count(), 42);

    let m: HashMap<u8, u8> = HashMap::with_slots(0);
    assert_eq!(m.slot_count(), DEFAULT_SLOTS);
}
