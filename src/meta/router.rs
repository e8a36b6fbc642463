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

//! Splits a parsed plan into sub-plans each targeting exactly one replica
//! group.

use std::collections::HashMap;

use config::{meta::cluster::Node, utils::time::time_partition};
use snafu::Snafu;

use crate::meta::{
    partition_table::{PartitionTable, ReplicaGroup},
    plan::{Plan, TabletRow},
};

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum Error {
    #[snafu(display("storage group not set: {storage_group}"))]
    StorageGroupNotSet { storage_group: String },
    #[snafu(display("routing error: {source}"))]
    Routing { source: crate::meta::partition_table::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A sub-plan produced by splitting a batch insert: the rows that landed
/// in one replica group, tagged with their original row indices so the
/// combined per-row response can be rewoven.
#[derive(Debug, Clone)]
pub struct SubPlan {
    pub group: ReplicaGroup,
    pub plan: Plan,
    pub row_indices: Vec<usize>,
}

pub struct PartitionRouter;

impl PartitionRouter {
    /// `Split(plan)`. Storage groups that are not locally
    /// known surface `StorageGroupNotSet`; the caller synchronises with
    /// the leader once and retries before giving up.
    pub fn split(
        plan: &Plan,
        table: &PartitionTable,
        partition_interval_secs: i64,
        known_storage_groups: &dyn Fn(&str) -> bool,
        default_storage_group_level: usize,
    ) -> Result<Vec<SubPlan>> {
        match plan {
            Plan::PointInsert { device, timestamp, .. } => {
                let sg = Plan::storage_group_of(device, default_storage_group_level);
                Self::ensure_known(&sg, known_storage_groups)?;
                let tp = time_partition(*timestamp, partition_interval_secs);
                let group = table.route(&sg, tp).context_routing()?;
                Ok(vec![SubPlan { group, plan: plan.clone(), row_indices: vec![0] }])
            }
            Plan::CreateTimeSeries { path } => {
                let sg = Plan::storage_group_of(path, default_storage_group_level);
                Self::ensure_known(&sg, known_storage_groups)?;
                let group = table.route(&sg, 0).context_routing()?;
                Ok(vec![SubPlan { group, plan: plan.clone(), row_indices: vec![0] }])
            }
            Plan::BatchInsert { rows } => {
                Self::split_tablet(rows, table, partition_interval_secs, known_storage_groups, default_storage_group_level)
            }
            // Deletion/SetStorageGroup are not partitioned plans; the
            // dispatcher never routes them through the splitter.
            Plan::Deletion { .. } | Plan::SetStorageGroup { .. } => Ok(Vec::new()),
        }
    }

    fn split_tablet(
        rows: &[TabletRow],
        table: &PartitionTable,
        partition_interval_secs: i64,
        known_storage_groups: &dyn Fn(&str) -> bool,
        default_storage_group_level: usize,
    ) -> Result<Vec<SubPlan>> {
        let mut by_group: HashMap<i32, (ReplicaGroup, Vec<TabletRow>, Vec<usize>)> = HashMap::new();
        for (idx, row) in rows.iter().enumerate() {
            let sg = Plan::storage_group_of(&row.device, default_storage_group_level);
            Self::ensure_known(&sg, known_storage_groups)?;
            let tp = time_partition(row.timestamp, partition_interval_secs);
            let group = table.route(&sg, tp).context_routing()?;
            let entry = by_group
                .entry(group.header().identifier)
                .or_insert_with(|| (group.clone(), Vec::new(), Vec::new()));
            entry.1.push(row.clone());
            entry.2.push(idx);
        }
        Ok(by_group
            .into_values()
            .map(|(group, rows, row_indices)| SubPlan {
                group,
                plan: Plan::BatchInsert { rows },
                row_indices,
            })
            .collect())
    }

    fn ensure_known(storage_group: &str, known: &dyn Fn(&str) -> bool) -> Result<()> {
        if known(storage_group) {
            Ok(())
        } else {
            StorageGroupNotSetSnafu { storage_group }.fail()
        }
    }
}

trait RoutingResultExt<T> {
    fn context_routing(self) -> Result<T>;
}

impl<T> RoutingResultExt<T> for std::result::Result<T, crate::meta::partition_table::Error> {
    fn context_routing(self) -> Result<T> {
        self.map_err(|source| Error::Routing { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::partition_table::PartitionTable;

    fn node(id: i32) -> Node {
        Node::new(id, format!("host-{id}"), 9190, 9191, 9192)
    }

    #[test]
    fn test_batch_split_carries_row_indices() {
        // A tablet whose rows route to different groups must carry back
        // the original indices.
        let table = PartitionTable::new(vec![node(1), node(2), node(3), node(4)], "salt", 2).unwrap();
        let rows = vec![
            TabletRow { device: "root.sg1.d1".into(), timestamp: 1, row: vec![] },
            TabletRow { device: "root.sg2.d1".into(), timestamp: 1, row: vec![] },
            TabletRow { device: "root.sg1.d1".into(), timestamp: 2, row: vec![] },
        ];
        let plan = Plan::BatchInsert { rows };
        let sub_plans = PartitionRouter::split(&plan, &table, 86400, &|_| true, 2).unwrap();
        let total_rows: usize = sub_plans.iter().map(|p| p.row_indices.len()).sum();
        assert_eq!(total_rows, 3);
        let mut all_indices: Vec<usize> =
            sub_plans.iter().flat_map(|p| p.row_indices.clone()).collect();
        all_indices.sort_unstable();
        assert_eq!(all_indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_unknown_storage_group_is_rejected() {
        let table = PartitionTable::new(vec![node(1), node(2)], "salt", 2).unwrap();
        let plan = Plan::PointInsert { device: "root.sg1.d1".into(), timestamp: 0, row: vec![] };
        let err = PartitionRouter::split(&plan, &table, 86400, &|_| false, 2).unwrap_err();
        assert_eq!(err, Error::StorageGroupNotSet { storage_group: "root.sg1".into() });
    }
}
