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

//! The cluster control plane: membership, the partition table, plan
//! routing, and the Raft-driven top-level actor that ties them together.

pub mod group_member;
pub mod node;
pub mod partition_table;
pub mod plan;
pub mod raft_log;
pub mod remote_cache;
pub mod router;
pub mod rpc;
pub mod startup;

pub use group_member::MetaGroupMember;
pub use partition_table::{NodeAdditionResult, NodeRemovalResult, PartitionTable, ReplicaGroup};
pub use startup::StartUpStatus;
