//! In-process store
//!
//! Behaves like the Redis-backed store for every operation the service uses,
//! including TTL expiry. Expiry is measured with `tokio::time::Instant`, so
//! tests can drive it with a paused clock. Used by the test-suite and by the
//! server's `--memory` development mode.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{Result, Scored, Store, StoreError};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    SortedSet(Vec<(f64, String)>),
}

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, Value>,
    expires_at: HashMap<String, Instant>,
}

impl Inner {
    fn purge(&mut self, key: &str) {
        if let Some(deadline) = self.expires_at.get(key) {
            if Instant::now() >= *deadline {
                self.values.remove(key);
                self.expires_at.remove(key);
            }
        }
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
        self.expires_at.remove(key);
    }

    fn hash(&mut self, key: &str) -> Result<Option<&mut HashMap<String, String>>> {
        self.purge(key);
        match self.values.get_mut(key) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(Some(h)),
            Some(_) => Err(wrong_type(key, "hash")),
        }
    }

    fn hash_or_insert(&mut self, key: &str) -> Result<&mut HashMap<String, String>> {
        self.purge(key);
        let value = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()));
        match value {
            Value::Hash(h) => Ok(h),
            _ => Err(wrong_type(key, "hash")),
        }
    }

    fn list(&mut self, key: &str) -> Result<Option<&mut VecDeque<String>>> {
        self.purge(key);
        match self.values.get_mut(key) {
            None => Ok(None),
            Some(Value::List(l)) => Ok(Some(l)),
            Some(_) => Err(wrong_type(key, "list")),
        }
    }

    fn list_or_insert(&mut self, key: &str) -> Result<&mut VecDeque<String>> {
        self.purge(key);
        let value = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| Value::List(VecDeque::new()));
        match value {
            Value::List(l) => Ok(l),
            _ => Err(wrong_type(key, "list")),
        }
    }

    fn sorted_set(&mut self, key: &str) -> Result<Option<&mut Vec<(f64, String)>>> {
        self.purge(key);
        match self.values.get_mut(key) {
            None => Ok(None),
            Some(Value::SortedSet(z)) => Ok(Some(z)),
            Some(_) => Err(wrong_type(key, "sorted set")),
        }
    }

    /// Redis drops empty collections; mirror that so EXISTS-style checks agree
    fn drop_if_empty(&mut self, key: &str) {
        let empty = match self.values.get(key) {
            Some(Value::List(l)) => l.is_empty(),
            Some(Value::Hash(h)) => h.is_empty(),
            Some(Value::SortedSet(z)) => z.is_empty(),
            _ => false,
        };
        if empty {
            self.remove(key);
        }
    }
}

fn wrong_type(key: &str, expected: &str) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("expected {}", expected),
    }
}

/// Descending by score, ties broken by descending member like ZREVRANGE
fn sort_descending(members: &mut [(f64, String)]) {
    members.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.1.cmp(&a.1))
    });
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut inner = self.inner.lock();
        inner.purge(key);
        match inner.values.get(key) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key, "string")),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.remove(key);
        inner
            .values
            .insert(key.to_string(), Value::Str(value.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.lock().remove(key);
        Ok(())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner
            .hash_or_insert(key)?
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut inner = self.inner.lock();
        Ok(inner.hash(key)?.and_then(|h| h.get(field).cloned()))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut inner = self.inner.lock();
        Ok(inner.hash(key)?.cloned().unwrap_or_default())
    }

    async fn hash_set_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        let hash = inner.hash_or_insert(key)?;
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn hash_set_if_exists(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        match inner.hash(key)? {
            Some(hash) => {
                hash.insert(field.to_string(), value.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn hash_compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: &str,
        updates: &[(&str, String)],
    ) -> Result<bool> {
        let mut inner = self.inner.lock();
        let Some(hash) = inner.hash(key)? else {
            return Ok(false);
        };
        if hash.get(field).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        for (name, value) in updates {
            hash.insert(name.to_string(), value.clone());
        }
        Ok(true)
    }

    async fn hash_create(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock();
        inner.purge(key);
        if inner.values.contains_key(key) {
            return Ok(false);
        }
        let hash = fields
            .iter()
            .map(|(f, v)| (f.to_string(), v.clone()))
            .collect();
        inner.values.insert(key.to_string(), Value::Hash(hash));
        if let Some(ttl) = ttl {
            inner.expires_at.insert(key.to_string(), Instant::now() + ttl);
        }
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.purge(key);
        if inner.values.contains_key(key) {
            inner.expires_at.insert(key.to_string(), Instant::now() + ttl);
        }
        Ok(())
    }

    async fn sorted_set_add(&self, key: &str, score: f64, value: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.purge(key);
        let entry = inner
            .values
            .entry(key.to_string())
            .or_insert_with(|| Value::SortedSet(Vec::new()));
        let Value::SortedSet(members) = entry else {
            return Err(wrong_type(key, "sorted set"));
        };
        match members.iter_mut().find(|(_, m)| m == value) {
            Some(existing) => existing.0 = score,
            None => members.push((score, value.to_string())),
        }
        Ok(())
    }

    async fn sorted_set_top(&self, key: &str, n: usize) -> Result<Vec<Scored>> {
        let mut inner = self.inner.lock();
        let Some(members) = inner.sorted_set(key)? else {
            return Ok(Vec::new());
        };
        let mut sorted = members.clone();
        sort_descending(&mut sorted);
        Ok(sorted
            .into_iter()
            .take(n)
            .map(|(score, value)| Scored { value, score })
            .collect())
    }

    async fn sorted_set_trim(&self, key: &str, keep: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(members) = inner.sorted_set(key)? {
            sort_descending(members);
            members.truncate(keep);
        }
        inner.drop_if_empty(key);
        Ok(())
    }

    async fn sorted_set_append(
        &self,
        key: &str,
        min_score: f64,
        value: &str,
        keep: usize,
    ) -> Result<f64> {
        let mut inner = self.inner.lock();
        inner.purge(key);
        let entry = inner
            .values
            .entry(key.to_string())
            .or_insert_with(|| Value::SortedSet(Vec::new()));
        let Value::SortedSet(members) = entry else {
            return Err(wrong_type(key, "sorted set"));
        };
        let top = members
            .iter()
            .map(|(score, _)| *score)
            .fold(f64::NEG_INFINITY, f64::max);
        let score = if top >= min_score { top + 1.0 } else { min_score };
        members.retain(|(_, m)| m != value);
        members.push((score, value.to_string()));
        sort_descending(members);
        members.truncate(keep);
        inner.drop_if_empty(key);
        Ok(score)
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.list_or_insert(key)?.push_front(value.to_string());
        Ok(())
    }

    async fn list_pop_tail(&self, key: &str) -> Result<Option<String>> {
        let mut inner = self.inner.lock();
        let popped = inner.list(key)?.and_then(|l| l.pop_back());
        inner.drop_if_empty(key);
        Ok(popped)
    }

    async fn list_move(&self, source: &str, destination: &str) -> Result<Option<String>> {
        let mut inner = self.inner.lock();
        // Check the destination type before mutating the source.
        inner.list(destination)?;
        let Some(item) = inner.list(source)?.and_then(|l| l.pop_back()) else {
            return Ok(None);
        };
        inner.drop_if_empty(source);
        inner.list_or_insert(destination)?.push_front(item.clone());
        Ok(Some(item))
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        let removed = match inner.list(key)? {
            Some(list) => match list.iter().position(|v| v == value) {
                Some(index) => {
                    list.remove(index);
                    true
                }
                None => false,
            },
            None => false,
        };
        inner.drop_if_empty(key);
        Ok(removed)
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>> {
        let mut inner = self.inner.lock();
        Ok(inner
            .list(key)?
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let mut inner = self.inner.lock();
        Ok(inner.list(key)?.map(|l| l.len()).unwrap_or(0))
    }

    async fn claim_and_push(
        &self,
        hash_key: &str,
        field: &str,
        marker: &str,
        list_key: &str,
        item: &str,
    ) -> Result<bool> {
        let mut inner = self.inner.lock();
        // Validate both keys first so a type error cannot leave a half-done claim.
        inner.list(list_key)?;
        let hash = inner.hash_or_insert(hash_key)?;
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), marker.to_string());
        inner.list_or_insert(list_key)?.push_front(item.to_string());
        Ok(true)
    }
}
