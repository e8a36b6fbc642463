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

//! Wire message kinds and response codes. Payload encoding and the
//! transport beneath this level are collaborator-defined; only the shapes
//! the control plane itself branches on are modelled.

use serde::{Deserialize, Serialize};

use crate::meta::{raft_log::RaftLogEntry, startup::StartUpStatusDiff};
use config::meta::cluster::Node;

/// Exact values must round-trip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RespCode {
    Agree,
    IdentifierConflict,
    NewNodeParameterConflict,
    PartitionTableUnavailable,
    ClusterTooSmall,
    Null,
    Reject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TsStatus {
    Success,
    MultipleError,
    TimeseriesNotExist,
    ExecuteStatementError,
    InternalServerError,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddNodeReq {
    pub node: Node,
    pub status: crate::meta::startup::StartUpStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddNodeResp {
    pub code: RespCode,
    pub partition_table_bytes: Option<Vec<u8>>,
    pub check_status_detail: Option<StartUpStatusDiff>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoveNodeReq {
    pub node: Node,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Heartbeat {
    pub term: u64,
    pub leader: Option<Node>,
    pub last_log_index: u64,
    pub last_log_term: u64,
    pub require_identifier: bool,
    pub partition_table_bytes: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatResp {
    pub term: u64,
    pub follower_identifier: Option<i32>,
    pub require_partition_table: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppendEntryReq {
    pub term: u64,
    pub prev_index: u64,
    pub prev_term: u64,
    pub entry: RaftLogEntry,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppendEntryResp {
    pub term: u64,
    pub accepted: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PullSchemaRequest {
    pub header: Node,
    pub prefix_paths: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PullSchemaResp {
    pub schema_bytes: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckStatusResponse {
    pub code: RespCode,
    pub diff: Option<StartUpStatusDiff>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Exile {
    pub removed: Node,
}
