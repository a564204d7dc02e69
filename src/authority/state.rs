//! Ownership and waiter bookkeeping
//!
//! Owned by exactly one authority task. Nothing here is synchronized: the
//! authority's request loop is the only writer.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

use super::protocol::ClientId;

#[derive(Debug, Default)]
pub struct LockState {
    /// key → owner
    table: HashMap<String, ClientId>,
    /// key → waiters in arrival order, never empty
    waiters: HashMap<String, VecDeque<ClientId>>,
    /// owner → keys in grant order, never empty.
    /// Invariant: `holdings[c]` contains `k` iff `table[k] == c`
    holdings: HashMap<ClientId, Vec<String>>,
}

impl LockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(&self, key: &str) -> Option<&ClientId> {
        self.table.get(key)
    }

    pub fn holdings(&self, client: &ClientId) -> &[String] {
        self.holdings.get(client).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn waiters(&self, key: &str) -> Vec<ClientId> {
        self.waiters
            .get(key)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn held_count(&self) -> usize {
        self.table.len()
    }

    /// Record `owner` as holder of an unheld key
    pub fn grant(&mut self, key: &str, owner: &ClientId) {
        debug_assert!(!self.table.contains_key(key), "grant of held key {}", key);
        self.table.insert(key.to_string(), owner.clone());
        self.holdings
            .entry(owner.clone())
            .or_default()
            .push(key.to_string());
    }

    /// Forget that `owner` holds `key`
    pub fn release(&mut self, key: &str, owner: &ClientId) {
        debug_assert_eq!(self.table.get(key), Some(owner));
        self.table.remove(key);
        if let Some(keys) = self.holdings.get_mut(owner) {
            keys.retain(|k| k != key);
            if keys.is_empty() {
                self.holdings.remove(owner);
            }
        }
    }

    /// Append `client` to the key's queue. Returns false, leaving the queue
    /// untouched, if the client is already waiting for this key.
    pub fn enqueue_waiter(&mut self, key: &str, client: &ClientId) -> bool {
        let queue = self.waiters.entry(key.to_string()).or_default();
        if queue.contains(client) {
            return false;
        }
        queue.push_back(client.clone());
        true
    }

    /// Pop the head of the key's queue, pruning the queue once empty
    pub fn dequeue_waiter(&mut self, key: &str) -> Option<ClientId> {
        let queue = self.waiters.get_mut(key)?;
        let head = queue.pop_front();
        if queue.is_empty() {
            self.waiters.remove(key);
        }
        head
    }

    pub fn clear(&mut self) {
        self.table.clear();
        self.waiters.clear();
        self.holdings.clear();
    }

    pub fn snapshot(&self) -> AuthoritySnapshot {
        AuthoritySnapshot {
            locks: self
                .table
                .iter()
                .map(|(k, c)| (k.clone(), c.clone()))
                .collect(),
            waiters: self
                .waiters
                .iter()
                .map(|(k, q)| (k.clone(), q.iter().cloned().collect()))
                .collect(),
            holdings: self
                .holdings
                .iter()
                .map(|(c, keys)| (c.clone(), keys.clone()))
                .collect(),
        }
    }
}

/// Point-in-time copy of one or more authorities' state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoritySnapshot {
    pub locks: BTreeMap<String, ClientId>,
    pub waiters: BTreeMap<String, Vec<ClientId>>,
    pub holdings: BTreeMap<ClientId, Vec<String>>,
}

impl AuthoritySnapshot {
    /// Fold another shard's snapshot into this one. Shards own disjoint
    /// keys, so only a client's holdings can appear on both sides.
    pub fn merge(&mut self, other: AuthoritySnapshot) {
        self.locks.extend(other.locks);
        self.waiters.extend(other.waiters);
        for (client, keys) in other.holdings {
            self.holdings.entry(client).or_default().extend(keys);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty() && self.waiters.is_empty() && self.holdings.is_empty()
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ClientId {
        ClientId::from(s)
    }

    #[test]
    fn test_grant_and_release_keep_holdings_in_sync() {
        let mut state = LockState::new();
        state.grant("k1", &id("a"));
        state.grant("k2", &id("a"));

        assert_eq!(state.holder("k1"), Some(&id("a")));
        assert_eq!(state.holdings(&id("a")), ["k1", "k2"]);

        state.release("k1", &id("a"));
        assert_eq!(state.holder("k1"), None);
        assert_eq!(state.holdings(&id("a")), ["k2"]);

        state.release("k2", &id("a"));
        assert!(state.holdings(&id("a")).is_empty());
        assert!(state.snapshot().is_empty());
    }

    #[test]
    fn test_waiter_queue_is_fifo_and_pruned() {
        let mut state = LockState::new();
        assert!(state.enqueue_waiter("k", &id("w1")));
        assert!(state.enqueue_waiter("k", &id("w2")));
        assert_eq!(state.waiters("k"), vec![id("w1"), id("w2")]);

        assert_eq!(state.dequeue_waiter("k"), Some(id("w1")));
        assert_eq!(state.dequeue_waiter("k"), Some(id("w2")));
        assert_eq!(state.dequeue_waiter("k"), None);
        assert!(state.snapshot().waiters.is_empty());
    }

    #[test]
    fn test_requeue_is_deduplicated() {
        let mut state = LockState::new();
        assert!(state.enqueue_waiter("k", &id("w1")));
        assert!(!state.enqueue_waiter("k", &id("w1")));
        assert!(state.enqueue_waiter("other", &id("w1")));
        assert_eq!(state.waiters("k"), vec![id("w1")]);
    }

    #[test]
    fn test_clear() {
        let mut state = LockState::new();
        state.grant("k", &id("a"));
        state.enqueue_waiter("k", &id("b"));
        state.clear();
        assert_eq!(state.held_count(), 0);
        assert!(state.snapshot().is_empty());
    }

    #[test]
    fn test_snapshot_merge_and_json() {
        let mut left = LockState::new();
        left.grant("k1", &id("a"));
        let mut right = LockState::new();
        right.grant("k2", &id("a"));
        right.enqueue_waiter("k2", &id("b"));

        let mut snapshot = left.snapshot();
        snapshot.merge(right.snapshot());
        assert_eq!(snapshot.locks.len(), 2);
        assert_eq!(snapshot.holdings[&id("a")], vec!["k1", "k2"]);
        assert_eq!(snapshot.waiters["k2"], vec![id("b")]);

        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"k2\""));
        let back: AuthoritySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
