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

//! `TsFileResource` and its ordered list.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::RwLock;

/// A handle to one on-disk time-series file. `merging`/`closed` are plain
/// atomics rather than fields behind the list's lock: a selector only ever
/// needs to read them while holding the list's read lock, and a task sets
/// `merging` under the list's write lock, so no separate synchronisation is
/// needed for these two flags.
#[derive(Debug)]
pub struct TsFileResource {
    pub path: PathBuf,
    pub mods_path: PathBuf,
    pub byte_size: u64,
    device_time_ranges: HashMap<String, (i64, i64)>,
    merging: AtomicBool,
    closed: AtomicBool,
}

impl TsFileResource {
    pub fn new(path: impl Into<PathBuf>, byte_size: u64) -> Self {
        let path = path.into();
        let mods_path = mods_path_for(&path);
        Self {
            path,
            mods_path,
            byte_size,
            device_time_ranges: HashMap::new(),
            merging: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_device_range(mut self, device: impl Into<String>, min_ts: i64, max_ts: i64) -> Self {
        self.device_time_ranges.insert(device.into(), (min_ts, max_ts));
        self
    }

    pub fn is_merging(&self) -> bool {
        self.merging.load(Ordering::Acquire)
    }

    pub fn set_merging(&self, value: bool) {
        self.merging.store(value, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self.device_time_ranges.keys().cloned().collect();
        devices.sort();
        devices
    }

    pub fn device_range(&self, device: &str) -> Option<(i64, i64)> {
        self.device_time_ranges.get(device).copied()
    }
}

fn mods_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".mods");
    path.with_file_name(name)
}

/// Compaction-scoped modification file suffix, distinct from the
/// always-open `.mods` file a resource accrues deletions into.
pub fn compaction_mods_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".compaction.mods");
    path.with_file_name(name)
}

/// An ordered, time-ascending sequence of `TsFileResource`, guarded by a
/// single RW lock: writers are compaction-commit and node-add-flush only.
pub struct TsFileResourceList {
    inner: RwLock<Vec<std::sync::Arc<TsFileResource>>>,
}

impl Default for TsFileResourceList {
    fn default() -> Self {
        Self::new()
    }
}

impl TsFileResourceList {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Vec::new()) }
    }

    pub fn push_back(&self, resource: std::sync::Arc<TsFileResource>) {
        self.inner.write().push(resource);
    }

    /// A read-locked snapshot; cheap because it clones `Arc`s, not files.
    pub fn snapshot(&self) -> Vec<std::sync::Arc<TsFileResource>> {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn find_by_path(&self, path: &Path) -> Option<std::sync::Arc<TsFileResource>> {
        self.inner.read().iter().find(|r| r.path == path).cloned()
    }

    /// Commits a compaction: inserts `target` immediately before the first
    /// source still present in the list, then removes every source.
    pub fn commit_merge(&self, sources: &[std::sync::Arc<TsFileResource>], target: std::sync::Arc<TsFileResource>) {
        let mut list = self.inner.write();
        let source_paths: std::collections::HashSet<&Path> =
            sources.iter().map(|r| r.path.as_path()).collect();
        let insert_at = list
            .iter()
            .position(|r| source_paths.contains(r.path.as_path()))
            .unwrap_or(list.len());
        list.insert(insert_at, target);
        list.retain(|r| !source_paths.contains(r.path.as_path()));
    }

    pub fn clear_merging(&self, resources: &[std::sync::Arc<TsFileResource>]) {
        for r in resources {
            r.set_merging(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_merge_inserts_before_first_source_and_removes_sources() {
        let list = TsFileResourceList::new();
        let a = std::sync::Arc::new(TsFileResource::new("/data/a.tsfile", 30));
        let b = std::sync::Arc::new(TsFileResource::new("/data/b.tsfile", 30));
        let c = std::sync::Arc::new(TsFileResource::new("/data/c.tsfile", 30));
        list.push_back(a.clone());
        list.push_back(b.clone());
        list.push_back(c.clone());

        let target = std::sync::Arc::new(TsFileResource::new("/data/merged.tsfile", 60));
        list.commit_merge(&[a.clone(), b.clone()], target.clone());

        let snapshot = list.snapshot();
        let paths: Vec<_> = snapshot.iter().map(|r| r.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/data/merged.tsfile"), PathBuf::from("/data/c.tsfile")]
        );
    }

    #[test]
    fn test_mods_path_derivation() {
        let r = TsFileResource::new("/data/1.tsfile", 10);
        assert_eq!(r.mods_path, PathBuf::from("/data/1.tsfile.mods"));
        assert_eq!(compaction_mods_path_for(&r.path), PathBuf::from("/data/1.tsfile.compaction.mods"));
    }
}
