//! Recency ordering of loaded aggregates.

use std::collections::{HashSet, VecDeque};

/// Ordered set of keys, least recently used first.
#[derive(Debug, Default)]
pub struct RecencyList {
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl RecencyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `key` or move it to the most-recently-used end.
    pub fn touch(&mut self, key: &str) {
        if self.members.contains(key) {
            self.order.retain(|k| k != key);
        } else {
            self.members.insert(key.to_string());
        }
        self.order.push_back(key.to_string());
    }

    pub fn remove(&mut self, key: &str) -> bool {
        if !self.members.remove(key) {
            return false;
        }
        self.order.retain(|k| k != key);
        true
    }

    /// Remove and return the least recently used key.
    pub fn pop_lru(&mut self) -> Option<String> {
        let key = self.order.pop_front()?;
        self.members.remove(&key);
        Some(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.members.contains(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Keys from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}
