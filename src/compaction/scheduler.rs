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

//! Per-storage-group-partition admission and dispatch of compaction tasks
//! under a concurrency cap.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use dashmap::DashMap;

use crate::compaction::{
    resource::{TsFileResource, TsFileResourceList},
    selector::try_to_submit_inner_space_compaction_task,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub storage_group: String,
    pub time_partition: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionPriority {
    Balance,
    InnerCross,
    CrossInner,
}

impl CompactionPriority {
    /// `compaction_priority` is validated at config load time to be one of
    /// these three strings (config::config::Config::sanity_check); any
    /// other value falls back to the system default, BALANCE.
    pub fn from_config_str(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "inner_cross" => Self::InnerCross,
            "cross_inner" => Self::CrossInner,
            _ => Self::Balance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    InnerSeq,
    InnerUnseq,
    Cross,
}

pub struct SelectedTask {
    pub partition: PartitionKey,
    pub space: Space,
    pub resources: Vec<Arc<TsFileResource>>,
}

pub struct CompactionScheduler {
    current_task_num: AtomicUsize,
    concurrent_compaction_thread: usize,
    target_compaction_file_size: u64,
    enable_seq_space_compaction: bool,
    enable_unseq_space_compaction: bool,
    priority: CompactionPriority,
    active_partitions: DashMap<PartitionKey, usize>,
}

impl CompactionScheduler {
    pub fn new(cfg: &config::Config) -> Self {
        Self {
            current_task_num: AtomicUsize::new(0),
            concurrent_compaction_thread: cfg.limit.concurrent_compaction_thread,
            target_compaction_file_size: cfg.limit.target_compaction_file_size,
            enable_seq_space_compaction: cfg.limit.enable_seq_space_compaction,
            enable_unseq_space_compaction: cfg.limit.enable_unseq_space_compaction,
            priority: CompactionPriority::from_config_str(&cfg.limit.compaction_priority),
            active_partitions: DashMap::new(),
        }
    }

    pub fn current_task_num(&self) -> usize {
        self.current_task_num.load(Ordering::Acquire)
    }

    pub fn is_partition_compacting(&self, partition: &PartitionKey) -> bool {
        self.active_partitions.get(partition).map(|n| *n > 0).unwrap_or(false)
    }

    /// Returns the file sets selected for
    /// compaction this tick; the caller is responsible for turning each
    /// into a running `CompactionTask` and calling `task_submitted`/
    /// `task_completed` around it.
    pub fn compaction_schedule(
        &self,
        partition: PartitionKey,
        seq_list: &TsFileResourceList,
        unseq_list: &TsFileResourceList,
    ) -> Vec<SelectedTask> {
        if self.current_task_num() >= self.concurrent_compaction_thread {
            return Vec::new();
        }

        let seq = seq_list.snapshot();
        let unseq = unseq_list.snapshot();

        match self.priority {
            CompactionPriority::Balance => self.dispatch_balance(&partition, &seq, &unseq),
            CompactionPriority::InnerCross => {
                let mut tasks = Vec::new();
                self.try_inner_seq(&partition, &seq, &mut tasks);
                self.try_inner_unseq(&partition, &unseq, &mut tasks);
                self.try_cross(&partition, &seq, &unseq, &mut tasks);
                tasks
            }
            CompactionPriority::CrossInner => {
                let mut tasks = Vec::new();
                self.try_cross(&partition, &seq, &unseq, &mut tasks);
                self.try_inner_unseq(&partition, &unseq, &mut tasks);
                self.try_inner_seq(&partition, &seq, &mut tasks);
                tasks
            }
        }
    }

    /// Round-robins inner-seq, inner-unseq, and cross-space submission
    /// until a full round submits nothing or the concurrency cap is
    /// reached.
    ///
    /// The selectors are stateless functions of the `seq`/`unseq`
    /// snapshots, and nothing marks a resource `merging` until the
    /// caller actually hands the selected task off to a running
    /// `CompactionTask`. Since a single tick can run several rounds of
    /// this loop before that happens, each round marks its own
    /// selections `merging` immediately so the next round's selectors
    /// see them as ineligible instead of re-emitting the same files.
    fn dispatch_balance(
        &self,
        partition: &PartitionKey,
        seq: &[Arc<TsFileResource>],
        unseq: &[Arc<TsFileResource>],
    ) -> Vec<SelectedTask> {
        let mut tasks = Vec::new();
        loop {
            if self.current_task_num() + tasks.len() >= self.concurrent_compaction_thread {
                break;
            }
            let round_start = tasks.len();

            let before = tasks.len();
            self.try_inner_seq(partition, seq, &mut tasks);
            mark_merging(&mut tasks[before..]);
            if self.current_task_num() + tasks.len() >= self.concurrent_compaction_thread {
                break;
            }

            let before = tasks.len();
            self.try_inner_unseq(partition, unseq, &mut tasks);
            mark_merging(&mut tasks[before..]);
            if self.current_task_num() + tasks.len() >= self.concurrent_compaction_thread {
                break;
            }

            let before = tasks.len();
            self.try_cross(partition, seq, unseq, &mut tasks);
            mark_merging(&mut tasks[before..]);

            if tasks.len() == round_start {
                break;
            }
        }
        tasks
    }

    fn try_inner_seq(&self, partition: &PartitionKey, seq: &[Arc<TsFileResource>], tasks: &mut Vec<SelectedTask>) {
        if !self.enable_seq_space_compaction {
            return;
        }
        for group in try_to_submit_inner_space_compaction_task(seq, self.target_compaction_file_size) {
            tasks.push(SelectedTask { partition: partition.clone(), space: Space::InnerSeq, resources: group });
        }
    }

    fn try_inner_unseq(&self, partition: &PartitionKey, unseq: &[Arc<TsFileResource>], tasks: &mut Vec<SelectedTask>) {
        if !self.enable_unseq_space_compaction {
            return;
        }
        for group in try_to_submit_inner_space_compaction_task(unseq, self.target_compaction_file_size) {
            tasks.push(SelectedTask { partition: partition.clone(), space: Space::InnerUnseq, resources: group });
        }
    }

    /// Cross-space selection is not pinned down by an inner-space-style
    /// contract; this implementation takes every eligible unsequence file
    /// together with every eligible sequence file whose device time
    /// range overlaps at least one device in the unsequence set, which is
    /// the minimal set worth merging together.
    fn try_cross(
        &self,
        partition: &PartitionKey,
        seq: &[Arc<TsFileResource>],
        unseq: &[Arc<TsFileResource>],
        tasks: &mut Vec<SelectedTask>,
    ) {
        let eligible_unseq: Vec<_> =
            unseq.iter().filter(|r| !r.is_merging() && r.is_closed()).cloned().collect();
        if eligible_unseq.is_empty() {
            return;
        }

        let overlapping_seq: Vec<_> = seq
            .iter()
            .filter(|r| !r.is_merging() && r.is_closed())
            .filter(|r| r.devices().iter().any(|d| {
                eligible_unseq.iter().any(|u| ranges_overlap(r.device_range(d), u.device_range(d)))
            }))
            .cloned()
            .collect();
        if overlapping_seq.is_empty() {
            return;
        }

        let mut resources = overlapping_seq;
        resources.extend(eligible_unseq);
        tasks.push(SelectedTask { partition: partition.clone(), space: Space::Cross, resources });
    }

    /// Call once per task actually handed off to execution; increments the
    /// admission counter and the partition's active-task count.
    pub fn task_submitted(&self, partition: &PartitionKey) {
        self.current_task_num.fetch_add(1, Ordering::AcqRel);
        *self.active_partitions.entry(partition.clone()).or_insert(0) += 1;
    }

    /// Call from the task's completion handler (success or failure),
    /// mirroring the original `finally`-block decrement.
    pub fn task_completed(&self, partition: &PartitionKey) {
        self.current_task_num.fetch_sub(1, Ordering::AcqRel);
        if let Some(mut count) = self.active_partitions.get_mut(partition) {
            *count = count.saturating_sub(1);
        }
    }
}

/// Marks every resource in newly selected tasks as merging, so that a
/// later selection round in the same tick treats them as unavailable
/// instead of re-emitting the same files.
fn mark_merging(tasks: &mut [SelectedTask]) {
    for task in tasks {
        for resource in &task.resources {
            resource.set_merging(true);
        }
    }
}

fn ranges_overlap(a: Option<(i64, i64)>, b: Option<(i64, i64)>) -> bool {
    match (a, b) {
        (Some((a_min, a_max)), Some((b_min, b_max))) => a_min <= b_max && b_min <= a_max,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition() -> PartitionKey {
        PartitionKey { storage_group: "root.sg1".into(), time_partition: 0 }
    }

    fn closed(byte_size: u64) -> Arc<TsFileResource> {
        let r = Arc::new(TsFileResource::new(format!("/data/{byte_size}-{}.tsfile", next_id()), byte_size));
        r.close();
        r
    }

    fn next_id() -> u64 {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed) as u64
    }

    fn scheduler(priority: CompactionPriority) -> CompactionScheduler {
        CompactionScheduler {
            current_task_num: AtomicUsize::new(0),
            concurrent_compaction_thread: 2,
            target_compaction_file_size: 100,
            enable_seq_space_compaction: true,
            enable_unseq_space_compaction: true,
            priority,
            active_partitions: DashMap::new(),
        }
    }

    #[test]
    fn test_early_exit_when_at_capacity() {
        let sched = scheduler(CompactionPriority::Balance);
        let key = partition();
        sched.task_submitted(&key);
        sched.task_submitted(&key);

        let seq_list = TsFileResourceList::new();
        seq_list.push_back(closed(30));
        seq_list.push_back(closed(40));
        seq_list.push_back(closed(40));
        let unseq_list = TsFileResourceList::new();

        let tasks = sched.compaction_schedule(key, &seq_list, &unseq_list);
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_inner_cross_tries_seq_then_unseq_then_cross() {
        let sched = scheduler(CompactionPriority::InnerCross);
        let key = partition();

        let seq_list = TsFileResourceList::new();
        seq_list.push_back(closed(30));
        seq_list.push_back(closed(40));
        seq_list.push_back(closed(40));
        let unseq_list = TsFileResourceList::new();

        let tasks = sched.compaction_schedule(key, &seq_list, &unseq_list);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].space, Space::InnerSeq);
    }

    #[test]
    fn test_task_submitted_and_completed_track_partition_activity() {
        let sched = scheduler(CompactionPriority::Balance);
        let key = partition();
        assert!(!sched.is_partition_compacting(&key));
        sched.task_submitted(&key);
        assert!(sched.is_partition_compacting(&key));
        assert_eq!(sched.current_task_num(), 1);
        sched.task_completed(&key);
        assert!(!sched.is_partition_compacting(&key));
        assert_eq!(sched.current_task_num(), 0);
    }
}
