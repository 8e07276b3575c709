//! Separately chained hash map
//!
//! Entries remember their full hash, so growth never rehashes keys and lookups
//! compare hashes before keys. The `_hashed` methods take the hash and key
//! comparison from the caller, which lets runtime values use
//! [`Runtime::hash`](crate::runtime::Runtime::hash) and
//! [`Runtime::equals`](crate::runtime::Runtime::equals) even though those can
//! fail.

use std::fmt;
use std::hash::{BuildHasher, Hash};

use rustc_hash::FxBuildHasher;

use crate::error::{CoreResult, Status};

const INITIAL_BUCKETS: usize = 8;

#[derive(Clone)]
struct Entry<K, V> {
    hash: u64,
    key: K,
    value: V,
}

/// Hash map with separate chaining; doubles its bucket count at load 3/4
#[derive(Clone)]
pub struct ChainedMap<K, V, S = FxBuildHasher> {
    buckets: Vec<Vec<Entry<K, V>>>,
    len: usize,
    hasher: S,
}

impl<K, V> ChainedMap<K, V, FxBuildHasher> {
    pub fn new() -> Self {
        Self::with_hasher(FxBuildHasher)
    }
}

impl<K, V> Default for ChainedMap<K, V, FxBuildHasher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> ChainedMap<K, V, S> {
    /// Create an empty map; buckets are allocated on first insert
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            buckets: Vec::new(),
            len: 0,
            hasher,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current number of chains
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_index(&self, hash: u64) -> usize {
        (hash as usize) & (self.buckets.len() - 1)
    }

    /// Grow before holding `len + 1` entries would pass load 3/4
    fn reserve_one(&mut self) -> CoreResult<()> {
        let count = self.buckets.len();
        if count != 0 && (self.len + 1) * 4 <= count * 3 {
            return Ok(());
        }
        let target = if count == 0 {
            INITIAL_BUCKETS
        } else {
            count
                .checked_mul(2)
                .ok_or_else(|| Status::allocation_failed("hash map bucket count overflow"))?
        };

        let mut buckets: Vec<Vec<Entry<K, V>>> = Vec::new();
        buckets
            .try_reserve_exact(target)
            .map_err(|err| Status::allocation_failed(err.to_string()))?;
        buckets.resize_with(target, Vec::new);

        for entry in self.buckets.drain(..).flatten() {
            let index = (entry.hash as usize) & (target - 1);
            buckets[index].push(entry);
        }
        self.buckets = buckets;
        Ok(())
    }

    /// Insert with a caller-supplied hash and key comparison.
    ///
    /// Returns the previous value when `eq` matched an existing key; the stored
    /// key is kept in that case.
    pub fn insert_hashed<F>(&mut self, hash: u64, key: K, value: V, mut eq: F) -> CoreResult<Option<V>>
    where
        F: FnMut(&K, &K) -> CoreResult<bool>,
    {
        if !self.buckets.is_empty() {
            let index = self.bucket_index(hash);
            for entry in &mut self.buckets[index] {
                if entry.hash == hash && eq(&entry.key, &key)? {
                    return Ok(Some(std::mem::replace(&mut entry.value, value)));
                }
            }
        }

        self.reserve_one()?;
        let index = self.bucket_index(hash);
        self.buckets[index].push(Entry { hash, key, value });
        self.len += 1;
        Ok(None)
    }

    /// Find the value whose key satisfies `matches`
    pub fn get_hashed<F>(&self, hash: u64, mut matches: F) -> CoreResult<Option<&V>>
    where
        F: FnMut(&K) -> CoreResult<bool>,
    {
        if self.buckets.is_empty() {
            return Ok(None);
        }
        for entry in &self.buckets[self.bucket_index(hash)] {
            if entry.hash == hash && matches(&entry.key)? {
                return Ok(Some(&entry.value));
            }
        }
        Ok(None)
    }

    /// Remove the entry whose key satisfies `matches`
    pub fn remove_hashed<F>(&mut self, hash: u64, mut matches: F) -> CoreResult<Option<(K, V)>>
    where
        F: FnMut(&K) -> CoreResult<bool>,
    {
        if self.buckets.is_empty() {
            return Ok(None);
        }
        let index = self.bucket_index(hash);
        let chain = &mut self.buckets[index];
        let mut found = None;
        for (position, entry) in chain.iter().enumerate() {
            if entry.hash == hash && matches(&entry.key)? {
                found = Some(position);
                break;
            }
        }
        Ok(found.map(|position| {
            let entry = chain.swap_remove(position);
            self.len -= 1;
            (entry.key, entry.value)
        }))
    }

    /// Every entry, in bucket order
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.buckets
            .iter()
            .flatten()
            .map(|entry| (&entry.key, &entry.value))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    /// Remove every entry, keeping the buckets
    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.len = 0;
        self.buckets
            .iter_mut()
            .flat_map(|chain| chain.drain(..))
            .map(|entry| (entry.key, entry.value))
            .collect()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for ChainedMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> ChainedMap<K, V, S> {
    /// Insert or update; returns the previous value
    pub fn insert(&mut self, key: K, value: V) -> CoreResult<Option<V>> {
        let hash = self.hasher.hash_one(&key);
        self.insert_hashed(hash, key, value, |a, b| Ok(a == b))
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = self.hasher.hash_one(key);
        self.get_hashed(hash, |candidate| Ok(candidate == key))
            .ok()
            .flatten()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let hash = self.hasher.hash_one(key);
        self.remove_hashed(hash, |candidate| Ok(candidate == key))
            .ok()
            .flatten()
            .map(|(_, value)| value)
    }
}
