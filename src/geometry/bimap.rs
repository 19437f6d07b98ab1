use std::hash::Hash;

use ahash::AHashMap;

/// Two-way lookup table between sensor identifiers and z-order indices.
///
/// Both directions are kept in sync; an insertion that would break the bijection is refused.
#[derive(Debug, Clone)]
pub struct BiMap<K, V>
where
    K: Eq + Hash + Copy,
    V: Eq + Hash + Copy,
{
    forward: AHashMap<K, V>,
    reverse: AHashMap<V, K>,
}

impl<K, V> Default for BiMap<K, V>
where
    K: Eq + Hash + Copy,
    V: Eq + Hash + Copy,
{
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<K, V> BiMap<K, V>
where
    K: Eq + Hash + Copy,
    V: Eq + Hash + Copy,
{
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            forward: AHashMap::with_capacity(capacity),
            reverse: AHashMap::with_capacity(capacity),
        }
    }

    /// Insert the pair `key ↔ value`.
    ///
    /// Returns the key already bound to either side when the pair would make the map
    /// non-injective; the map is left unchanged in that case.
    pub fn try_insert(&mut self, key: K, value: V) -> Result<(), K> {
        if self.forward.contains_key(&key) {
            return Err(key);
        }
        if let Some(existing) = self.reverse.get(&value) {
            return Err(*existing);
        }
        self.forward.insert(key, value);
        self.reverse.insert(value, key);
        Ok(())
    }

    pub fn get_by_key(&self, key: &K) -> Option<V> {
        self.forward.get(key).copied()
    }

    pub fn get_by_value(&self, value: &V) -> Option<K> {
        self.reverse.get(value).copied()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.forward.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod bimap_tests {
    use super::*;

    #[test]
    fn lookups_work_both_ways() {
        let mut map: BiMap<i32, usize> = BiMap::default();
        map.try_insert(20, 0).unwrap();
        map.try_insert(3, 1).unwrap();

        assert_eq!(map.get_by_key(&3), Some(1));
        assert_eq!(map.get_by_value(&0), Some(20));
        assert_eq!(map.get_by_key(&7), None);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn refuses_to_break_the_bijection() {
        let mut map: BiMap<i32, usize> = BiMap::with_capacity(2);
        map.try_insert(20, 0).unwrap();

        assert_eq!(map.try_insert(20, 1), Err(20));
        assert_eq!(map.try_insert(5, 0), Err(20));
        assert_eq!(map.len(), 1);
        assert!(!map.contains_key(&5));
    }
}
