// Copyright 2024 Zinc Labs Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Bounded LRU cache of measurement schemas pulled from remote replica
//! groups, plus the puller that backs local cache misses.

use std::collections::HashMap;

use async_trait::async_trait;
use config::meta::cluster::Node;
use parking_lot::Mutex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    pub fields: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LastValuePair {
    pub timestamp: i64,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug)]
struct Entry {
    schema: Schema,
    last_value: Option<LastValuePair>,
}

/// `fullPath -> (schema, lastValuePair)`, eviction = least-recently-used,
/// invalidation = whole-subtree prefix removal.
pub struct RemoteMetaCache {
    capacity: usize,
    // Order tracks recency: front = most recently used.
    order: Mutex<Vec<String>>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl RemoteMetaCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: Mutex::new(Vec::new()),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, full_path: &str) -> Option<(Schema, Option<LastValuePair>)> {
        let entries = self.entries.lock();
        let entry = entries.get(full_path)?;
        let result = (entry.schema.clone(), entry.last_value.clone());
        drop(entries);
        self.touch(full_path);
        Some(result)
    }

    pub fn put(&self, full_path: String, schema: Schema, last_value: Option<LastValuePair>) {
        {
            let mut entries = self.entries.lock();
            let is_new = !entries.contains_key(&full_path);
            entries.insert(full_path.clone(), Entry { schema, last_value });
            if is_new {
                let mut order = self.order.lock();
                order.insert(0, full_path.clone());
                if order.len() > self.capacity {
                    if let Some(evicted) = order.pop() {
                        entries.remove(&evicted);
                    }
                }
                return;
            }
        }
        self.touch(&full_path);
    }

    /// Deletes every entry whose full path begins with `prefix`.
    pub fn remove_prefix(&self, prefix: &str) {
        let mut entries = self.entries.lock();
        entries.retain(|path, _| !path.starts_with(prefix));
        let mut order = self.order.lock();
        order.retain(|path| entries.contains_key(path));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn touch(&self, full_path: &str) {
        let mut order = self.order.lock();
        if let Some(pos) = order.iter().position(|p| p == full_path) {
            let path = order.remove(pos);
            order.insert(0, path);
        }
    }
}

/// The collaborator that fills a cache miss by pulling a schema from its
/// owning replica group. Chooses the target node from a
/// latency-ordered list, tried in order until a non-null, non-error
/// response.
#[async_trait]
pub trait MetaPuller: Send + Sync {
    async fn pull_schema(
        &self,
        candidates: &[Node],
        prefix_paths: &[String],
    ) -> anyhow::Result<Vec<(String, Schema)>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema { fields: vec!["s1".into()] }
    }

    #[test]
    fn test_eviction_is_least_recently_used() {
        let cache = RemoteMetaCache::new(2);
        cache.put("root.sg.d1.s1".into(), schema(), None);
        cache.put("root.sg.d2.s1".into(), schema(), None);
        // touch d1 so d2 becomes the least-recently-used entry.
        assert!(cache.get("root.sg.d1.s1").is_some());
        cache.put("root.sg.d3.s1".into(), schema(), None);
        assert!(cache.get("root.sg.d2.s1").is_none());
        assert!(cache.get("root.sg.d1.s1").is_some());
        assert!(cache.get("root.sg.d3.s1").is_some());
    }

    #[test]
    fn test_remove_prefix_clears_subtree() {
        let cache = RemoteMetaCache::new(10);
        cache.put("root.sg.d1.s1".into(), schema(), None);
        cache.put("root.sg.d1.s2".into(), schema(), None);
        cache.put("root.sg.d2.s1".into(), schema(), None);
        cache.remove_prefix("root.sg.d1");
        assert!(cache.get("root.sg.d1.s1").is_none());
        assert!(cache.get("root.sg.d1.s2").is_none());
        assert!(cache.get("root.sg.d2.s1").is_some());
    }
}
