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

//! Stateless selection of file sets from an ordered resource list.

use std::sync::Arc;

use crate::compaction::resource::TsFileResource;

/// Scans `resources` from newest to oldest, grouping consecutive
/// compactable files (not merging, closed, individually under `target`
/// bytes) into candidate sets once their accumulated size reaches
/// `target`. A file that fails the predicate discards whatever had
/// accumulated so far rather than emitting it early - a partial group
/// interrupted by an uncompactable file is not a useful merge target.
/// Any non-empty remainder at the end of the scan is still emitted, even
/// under `target`, since there is no newer file left to extend it.
pub fn try_to_submit_inner_space_compaction_task(
    resources: &[Arc<TsFileResource>],
    target_bytes: u64,
) -> Vec<Vec<Arc<TsFileResource>>> {
    let mut tasks = Vec::new();
    let mut current: Vec<Arc<TsFileResource>> = Vec::new();
    let mut accumulated: u64 = 0;

    for resource in resources.iter().rev() {
        if resource.byte_size <= target_bytes && !resource.is_merging() && resource.is_closed() {
            current.push(resource.clone());
            accumulated += resource.byte_size;
            if accumulated >= target_bytes {
                current.reverse();
                tasks.push(std::mem::take(&mut current));
                accumulated = 0;
            }
        } else {
            current.clear();
            accumulated = 0;
        }
    }

    // A trailing remainder below target is only worth a task if it actually
    // combines more than one file; a lone leftover file is left untouched.
    if current.len() > 1 {
        current.reverse();
        tasks.push(current);
    }

    // Groups were discovered newest-first during the reverse scan; restore
    // chronological (oldest-first) order to match the resource list itself.
    tasks.reverse();
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(byte_size: u64) -> Arc<TsFileResource> {
        Arc::new(TsFileResource::new(format!("/data/{byte_size}-{}.tsfile", rand_suffix()), byte_size))
    }

    fn rand_suffix() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }

    fn closed(r: Arc<TsFileResource>) -> Arc<TsFileResource> {
        r.close();
        r
    }

    #[test]
    fn test_balanced_sizes_emit_three_groups() {
        let sizes = [30, 30, 30, 100, 30, 40, 40];
        let resources: Vec<_> = sizes.iter().map(|&s| closed(resource(s))).collect();

        let tasks = try_to_submit_inner_space_compaction_task(&resources, 100);
        let grouped_sizes: Vec<u64> = tasks.iter().map(|g| g.iter().map(|r| r.byte_size).sum()).collect();

        assert_eq!(grouped_sizes, vec![90, 100, 110]);
    }

    #[test]
    fn test_merging_file_blocks_any_task() {
        // A file mid-merge breaks accumulation on both sides of it, and the
        // lone leftover file on each side is too small on its own to submit.
        let resources = vec![closed(resource(30)), closed(resource(40)), closed(resource(40))];
        resources[1].set_merging(true);

        let tasks = try_to_submit_inner_space_compaction_task(&resources, 100);

        assert!(tasks.is_empty());
    }

    #[test]
    fn test_unclosed_file_blocks_the_group_behind_it() {
        let a = resource(50);
        let b = closed(resource(60));
        let resources = vec![a, b];

        let tasks = try_to_submit_inner_space_compaction_task(&resources, 100);

        assert!(tasks.is_empty());
    }

    #[test]
    fn test_oversized_file_splits_the_scan_into_singletons() {
        let resources = vec![closed(resource(30)), closed(resource(200)), closed(resource(30))];

        let tasks = try_to_submit_inner_space_compaction_task(&resources, 100);

        assert!(tasks.is_empty());
    }

    #[test]
    fn test_two_file_trailing_remainder_is_submitted() {
        let resources = vec![closed(resource(30)), closed(resource(40))];

        let tasks = try_to_submit_inner_space_compaction_task(&resources, 100);
        let grouped_sizes: Vec<u64> = tasks.iter().map(|g| g.iter().map(|r| r.byte_size).sum()).collect();

        assert_eq!(grouped_sizes, vec![70]);
    }
}
