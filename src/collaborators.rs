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

//! Minimal stand-ins for the two collaborators that sit outside this
//! crate's scope: the physical tablet writer/reader and the RPC transport
//! beneath the message level. A production deployment injects real
//! implementations (a storage engine, a gRPC/HTTP client) satisfying
//! `LocalExecutor`/`ClusterTransport`. These exist so `tsnode run` is a
//! runnable single-node skeleton: a node with no configured seeds never
//! calls `transport`, and `executor` only needs to answer for plans this
//! node itself owns.

use async_trait::async_trait;
use config::meta::cluster::Node;
use log::info;

use crate::meta::{
    group_member::{ClusterTransport, LocalExecutor, PlanOutcome},
    plan::Plan,
    rpc::{AddNodeReq, AddNodeResp, AppendEntryReq, AppendEntryResp, TsStatus},
    startup::StartUpStatus,
};

/// Logs and reports success for any plan, standing in for the real
/// storage engine (the physical file format of stored time-series
/// chunks is out of scope here).
pub struct LoggingLocalExecutor;

#[async_trait]
impl LocalExecutor for LoggingLocalExecutor {
    async fn execute_local(&self, plan: &Plan) -> anyhow::Result<TsStatus> {
        info!("[EXECUTOR] executing plan locally: {plan:?}");
        Ok(TsStatus::Success)
    }

    async fn create_schema(&self, paths: &[String]) -> anyhow::Result<()> {
        info!("[EXECUTOR] auto-creating schema for {} path(s)", paths.len());
        Ok(())
    }

    async fn expand_wildcards(&self, paths: &[String]) -> anyhow::Result<Vec<String>> {
        Ok(paths.to_vec())
    }
}

/// Rejects every call: a node started without peers has nothing to
/// transport to, and a real wire client (the consensus log transport and
/// heartbeat protocol mechanics below the message level) is out of this
/// crate's scope.
pub struct UnreachableClusterTransport;

#[async_trait]
impl ClusterTransport for UnreachableClusterTransport {
    async fn add_node(&self, _seed: &Node, _req: AddNodeReq) -> anyhow::Result<AddNodeResp> {
        anyhow::bail!("no cluster transport configured for this node")
    }

    async fn append_entry_to_group(&self, _node: &Node, _req: AppendEntryReq) -> anyhow::Result<AppendEntryResp> {
        anyhow::bail!("no cluster transport configured for this node")
    }

    async fn forward_plan(&self, _node: &Node, _plan: Plan) -> anyhow::Result<PlanOutcome> {
        anyhow::bail!("no cluster transport configured for this node")
    }

    async fn exile(&self, _node: &Node, _removed: Node) -> anyhow::Result<()> {
        anyhow::bail!("no cluster transport configured for this node")
    }

    async fn check_status(&self, _seed: &Node, _status: StartUpStatus) -> anyhow::Result<bool> {
        anyhow::bail!("no cluster transport configured for this node")
    }
}
