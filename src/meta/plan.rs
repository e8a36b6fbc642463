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

//! Parsed write plans and their routing classification. Plan bodies arrive
//! as already-parsed opaque values tagged by kind; only the shape the
//! router and the dispatcher need is modelled.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TabletRow {
    pub device: String,
    pub timestamp: i64,
    /// Opaque row payload, e.g. pre-encoded column values.
    pub row: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Plan {
    /// A single-row insert.
    PointInsert { device: String, timestamp: i64, row: Vec<u8> },
    /// A batch ("tablet") insert: many rows, possibly interleaved across
    /// time partitions.
    BatchInsert { rows: Vec<TabletRow> },
    /// CreateTimeSeries, routed to the owner of the storage group's slot.
    CreateTimeSeries { path: String },
    /// DeleteTimeSeries / generic deletion, broadcast to every group after
    /// wildcard expansion.
    Deletion { paths: Vec<String> },
    /// SetStorageGroup and other schema-affecting global plans.
    SetStorageGroup { storage_group: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanClass {
    /// No cluster effect; handled entirely by the local executor.
    Local,
    /// Forwarded to the meta-group leader for Raft replication.
    GlobalMeta,
    /// Broadcast to every replica group.
    GlobalData,
    /// Split by the router across one or more replica groups.
    Partitioned,
}

impl Plan {
    pub fn classify(&self) -> PlanClass {
        match self {
            Plan::PointInsert { .. } | Plan::BatchInsert { .. } | Plan::CreateTimeSeries { .. } => {
                PlanClass::Partitioned
            }
            Plan::Deletion { .. } => PlanClass::GlobalData,
            Plan::SetStorageGroup { .. } => PlanClass::GlobalMeta,
        }
    }

    /// The storage group a point/tablet row or schema-creation plan
    /// belongs to, derived from the leading path segment up to
    /// `default_storage_group_level`.
    pub fn storage_group_of(path: &str, default_storage_group_level: usize) -> String {
        path.splitn(default_storage_group_level + 1, '.')
            .take(default_storage_group_level)
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            Plan::PointInsert { device: "d".into(), timestamp: 0, row: vec![] }.classify(),
            PlanClass::Partitioned
        );
        assert_eq!(
            Plan::Deletion { paths: vec![] }.classify(),
            PlanClass::GlobalData
        );
        assert_eq!(
            Plan::SetStorageGroup { storage_group: "sg".into() }.classify(),
            PlanClass::GlobalMeta
        );
    }

    #[test]
    fn test_storage_group_of() {
        assert_eq!(Plan::storage_group_of("root.sg1.d1.s1", 2), "root.sg1");
    }
}
