use std::collections::HashMap;
use std::hash::Hash;

/// Allocates dense ids `0, 1, 2, ...` to keys in the order they are first seen.
///
/// Ids are never reused or reassigned until [`DenseIdMap::clear`] is called.
#[derive(Debug, Clone)]
pub struct DenseIdMap<K> {
    ids: HashMap<K, usize>,
    keys: Vec<K>,
}

impl<K> DenseIdMap<K>
where
    K: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `key` and whether it was allocated by this call.
    pub fn id_for(&mut self, key: K) -> (usize, bool) {
        if let Some(&id) = self.ids.get(&key) {
            return (id, false);
        }
        let id = self.keys.len();
        self.ids.insert(key.clone(), id);
        self.keys.push(key);
        (id, true)
    }

    pub fn get(&self, key: &K) -> Option<usize> {
        self.ids.get(key).copied()
    }

    /// The key that was given `id`.
    pub fn key(&self, id: usize) -> Option<&K> {
        self.keys.get(id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.keys.clear();
    }

    /// Iterates over `(id, key)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &K)> + '_ {
        self.keys.iter().enumerate()
    }
}

impl<K> Default for DenseIdMap<K> {
    fn default() -> Self {
        Self {
            ids: HashMap::new(),
            keys: Vec::new(),
        }
    }
}
