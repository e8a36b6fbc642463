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

//! `MetaGroupMember`: the top-level actor owning membership, the
//! partition table, and the plan-routing entry point.
//!
//! To avoid mutual back-references to a `DataClusterServer`, the
//! data-plane collaborators this actor needs are modelled as explicit
//! capability traits (`ClusterTransport`, `LocalExecutor`) passed in at
//! construction.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use config::meta::cluster::Node;
use dashmap::{DashMap, DashSet};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use snafu::Snafu;

use crate::meta::{
    partition_table::PartitionTable,
    plan::{Plan, PlanClass},
    raft_log::{Character, LogPayload, RaftLogEntry},
    router::{self, PartitionRouter, SubPlan},
    rpc::{AddNodeReq, AddNodeResp, AppendEntryReq, AppendEntryResp, HeartbeatResp, RespCode, TsStatus},
    startup::StartUpStatus,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("join rejected: parameter conflict"))]
    ParameterConflict { diff: crate::meta::startup::StartUpStatusDiff },
    #[snafu(display("join exhausted retries without a partition table"))]
    JoinExhausted,
    #[snafu(display("cluster too small to remove a node"))]
    ClusterTooSmall,
    #[snafu(display("transport error: {message}"))]
    Transport { message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub status: TsStatus,
    /// Present only for a batch plan broadcast across groups: one status
    /// per original row.
    pub sub_status: Option<Vec<TsStatus>>,
}

#[derive(Debug, PartialEq, Eq)]
enum SendLogResult {
    Ok,
    TimeOut,
    LeadershipStale,
}

/// Everything this actor needs from the data plane.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    async fn add_node(&self, seed: &Node, req: AddNodeReq) -> anyhow::Result<AddNodeResp>;
    async fn append_entry_to_group(&self, node: &Node, req: AppendEntryReq) -> anyhow::Result<AppendEntryResp>;
    async fn forward_plan(&self, node: &Node, plan: Plan) -> anyhow::Result<PlanOutcome>;
    async fn exile(&self, node: &Node, removed: Node) -> anyhow::Result<()>;
    async fn check_status(&self, seed: &Node, status: StartUpStatus) -> anyhow::Result<bool>;
}

/// Everything this actor needs from the local executor.
#[async_trait]
pub trait LocalExecutor: Send + Sync {
    async fn execute_local(&self, plan: &Plan) -> anyhow::Result<TsStatus>;
    async fn create_schema(&self, paths: &[String]) -> anyhow::Result<()>;
    async fn expand_wildcards(&self, paths: &[String]) -> anyhow::Result<Vec<String>>;
}

pub struct MetaGroupMember {
    self_node: RwLock<Node>,
    all_nodes: RwLock<Vec<Node>>,
    id_node_map: DashMap<i32, Node>,
    partition_table: RwLock<Option<PartitionTable>>,
    character: RwLock<Character>,
    term: AtomicU64,
    log_index: AtomicU64,
    leader: RwLock<Option<Node>>,
    blind_nodes: DashSet<i32>,
    id_conflict_nodes: DashSet<i32>,
    known_storage_groups: DashSet<String>,
    status: StartUpStatus,
    transport: Arc<dyn ClusterTransport>,
    executor: Arc<dyn LocalExecutor>,
    data_dir: String,
    write_operation_timeout_ms: u64,
    default_join_retry: u32,
    join_retry_interval_secs: u64,
    default_storage_group_level: usize,
    enable_auto_create_schema: bool,
}

impl MetaGroupMember {
    pub fn new(
        self_node: Node,
        status: StartUpStatus,
        transport: Arc<dyn ClusterTransport>,
        executor: Arc<dyn LocalExecutor>,
        cfg: &config::Config,
    ) -> Self {
        Self {
            self_node: RwLock::new(self_node),
            all_nodes: RwLock::new(Vec::new()),
            id_node_map: DashMap::new(),
            partition_table: RwLock::new(None),
            character: RwLock::new(Character::Elector),
            term: AtomicU64::new(0),
            log_index: AtomicU64::new(0),
            leader: RwLock::new(None),
            blind_nodes: DashSet::new(),
            id_conflict_nodes: DashSet::new(),
            known_storage_groups: DashSet::new(),
            status,
            transport,
            executor,
            data_dir: cfg.cluster.data_dir.clone(),
            write_operation_timeout_ms: cfg.limit.write_operation_timeout_ms,
            default_join_retry: cfg.limit.default_join_retry,
            join_retry_interval_secs: cfg.limit.join_retry_interval_secs,
            default_storage_group_level: cfg.limit.default_storage_group_level,
            enable_auto_create_schema: cfg.limit.enable_auto_create_schema,
        }
    }

    pub fn character(&self) -> Character {
        *self.character.read()
    }

    pub fn self_node(&self) -> Node {
        self.self_node.read().clone()
    }

    pub fn partition_table_bytes(&self) -> Option<Vec<u8>> {
        self.partition_table.read().as_ref().map(|pt| pt.serialize())
    }

    fn next_log_index(&self) -> u64 {
        self.log_index.fetch_add(1, Ordering::SeqCst) + 1
    }

    // ---- Startup -------------------------------------------------------

    /// This node is a seed: checks `StartUpStatus` pairwise against every
    /// other seed with exponential retry until a quorum agrees or a
    /// global deadline passes. A single-member cluster synthesises its
    /// own initial table directly.
    pub async fn build_cluster(&self, seeds: &[Node], start_up_time_threshold_ms: u64) -> Result<()> {
        let others: Vec<&Node> = seeds
            .iter()
            .filter(|n| n.identifier != self.self_node().identifier)
            .collect();

        if others.is_empty() {
            let pt = PartitionTable::new(vec![self.self_node()], self.status.hash_salt.clone(), self.status.replication_num)
                .map_err(|_| Error::ClusterTooSmall)?;
            *self.partition_table.write() = Some(pt);
            *self.all_nodes.write() = vec![self.self_node()];
            self.id_node_map.insert(self.self_node().identifier, self.self_node());
            *self.character.write() = Character::Leader;
            *self.leader.write() = Some(self.self_node());
            self.persist_partition_table();
            return Ok(());
        }

        if let Some(pt) = load_partition_table(&self.data_dir) {
            *self.partition_table.write() = Some(pt);
        }

        let quorum = others.len() / 2 + 1;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(start_up_time_threshold_ms);
        let mut backoff_ms = 50u64;
        loop {
            let mut agreed = 0usize;
            for seed in &others {
                if self.transport.check_status(seed, self.status.clone()).await.unwrap_or(false) {
                    agreed += 1;
                }
            }
            if agreed >= quorum {
                *self.character.write() = Character::Leader;
                *self.leader.write() = Some(self.self_node());
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return JoinExhaustedSnafu.fail();
            }
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms = (backoff_ms * 2).min(5_000);
        }
    }

    /// Picks a seed uniformly at random, sends AddNode, and reacts to the
    /// response.
    pub async fn join_cluster(&self, seeds: &[Node]) -> Result<()> {
        for _ in 0..self.default_join_retry {
            let seed = config::utils::rand::get_rand_element(seeds);
            let req = AddNodeReq { node: self.self_node(), status: self.status.clone() };
            let resp = self
                .transport
                .add_node(seed, req)
                .await
                .map_err(|e| Error::Transport { message: e.to_string() })?;
            match resp.code {
                RespCode::Agree => {
                    if let Some(bytes) = resp.partition_table_bytes {
                        if let Ok(pt) = PartitionTable::deserialize(&bytes) {
                            let mut all = pt.nodes().to_vec();
                            all.sort_by_key(|n| n.identifier);
                            *self.all_nodes.write() = all.clone();
                            for n in &all {
                                self.id_node_map.insert(n.identifier, n.clone());
                            }
                            *self.partition_table.write() = Some(pt);
                        }
                    }
                    *self.leader.write() = Some(seed.clone());
                    *self.character.write() = Character::Follower;
                    return Ok(());
                }
                RespCode::IdentifierConflict => {
                    let new_id = config::ider::generate_identifier(&self.self_node().host, self.self_node().meta_port);
                    let mut n = self.self_node.write();
                    n.identifier = new_id;
                    continue;
                }
                RespCode::NewNodeParameterConflict => {
                    return ParameterConflictSnafu {
                        diff: resp.check_status_detail.unwrap_or(self.status.diff(&self.status)),
                    }
                    .fail();
                }
                _ => {
                    tokio::time::sleep(Duration::from_secs(self.join_retry_interval_secs)).await;
                }
            }
        }
        JoinExhaustedSnafu.fail()
    }

    // ---- Add-node protocol (leader side) -------------------------------

    pub async fn handle_add_node(&self, node: Node, status: StartUpStatus) -> AddNodeResp {
        if *self.character.read() != Character::Leader {
            return AddNodeResp { code: RespCode::Null, partition_table_bytes: None, check_status_detail: None };
        }
        if self.all_nodes.read().iter().any(|n| n.identifier == node.identifier) {
            return AddNodeResp { code: RespCode::Agree, partition_table_bytes: self.partition_table_bytes(), check_status_detail: None };
        }
        if self.id_node_map.contains_key(&node.identifier) {
            return AddNodeResp { code: RespCode::IdentifierConflict, partition_table_bytes: None, check_status_detail: None };
        }
        let diff = self.status.diff(&status);
        if !diff.all_equal() {
            return AddNodeResp { code: RespCode::NewNodeParameterConflict, partition_table_bytes: None, check_status_detail: Some(diff) };
        }

        let term = self.term.load(Ordering::SeqCst);
        let index = self.next_log_index();
        let entry = RaftLogEntry::new(term, index, LogPayload::AddNode(node.clone(), status));
        match self.send_log_to_all_groups(entry).await {
            SendLogResult::Ok => {
                self.apply_add_node(node);
                AddNodeResp { code: RespCode::Agree, partition_table_bytes: self.partition_table_bytes(), check_status_detail: None }
            }
            SendLogResult::TimeOut => AddNodeResp { code: RespCode::PartitionTableUnavailable, partition_table_bytes: None, check_status_detail: None },
            SendLogResult::LeadershipStale => AddNodeResp { code: RespCode::Null, partition_table_bytes: None, check_status_detail: None },
        }
    }

    fn apply_add_node(&self, node: Node) {
        {
            let mut all = self.all_nodes.write();
            all.push(node.clone());
        }
        self.id_node_map.insert(node.identifier, node.clone());
        {
            let mut pt = self.partition_table.write();
            match pt.as_mut() {
                Some(table) => {
                    table.add_node(node);
                }
                None => {
                    let all = self.all_nodes.read().clone();
                    if let Ok(table) = PartitionTable::new(all, self.status.hash_salt.clone(), self.status.replication_num) {
                        *pt = Some(table);
                    }
                }
            }
        }
        self.persist_partition_table();
    }

    // ---- Broadcast-to-all-groups ----------------------------------------

    /// Treats each node as representing R overlapping groups (itself as
    /// header, plus the R-1 groups where it appears as a non-header
    /// member) and maintains a per-group "remaining votes" counter rather
    /// than a single per-node tally.
    async fn send_log_to_all_groups(&self, entry: RaftLogEntry) -> SendLogResult {
        let nodes = self.all_nodes.read().clone();
        let n = nodes.len();
        if n == 0 {
            return SendLogResult::Ok;
        }
        let r = self
            .partition_table
            .read()
            .as_ref()
            .map(|pt| pt.replication_num())
            .unwrap_or(self.status.replication_num)
            .min(n as u32) as usize;
        let quorum = (r / 2 + 1) as i64;
        let mut remaining = vec![quorum; n];

        let deadline = tokio::time::Instant::now() + Duration::from_millis(self.write_operation_timeout_ms);
        let mut futs = FuturesUnordered::new();
        for (i, node) in nodes.iter().enumerate() {
            let transport = self.transport.clone();
            let req = AppendEntryReq {
                term: entry.term,
                prev_index: entry.index.saturating_sub(1),
                prev_term: entry.term,
                entry: entry.clone(),
            };
            let node = node.clone();
            futs.push(async move { (i, transport.append_entry_to_group(&node, req).await) });
        }

        loop {
            if remaining.iter().all(|&v| v <= 0) {
                return SendLogResult::Ok;
            }
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return SendLogResult::TimeOut,
                next = futs.next(), if !futs.is_empty() => {
                    match next {
                        Some((i, Ok(resp))) => {
                            if resp.term > entry.term {
                                return SendLogResult::LeadershipStale;
                            }
                            if resp.accepted {
                                for k in 0..r {
                                    let g = (i + n - k) % n;
                                    remaining[g] -= 1;
                                }
                            }
                        }
                        Some((_, Err(_))) => {}
                        None => return SendLogResult::TimeOut,
                    }
                }
            }
        }
    }

    // ---- Remove-node protocol -------------------------------------------

    pub async fn handle_remove_node(&self, node: Node) -> Result<RespCode> {
        let r = self
            .partition_table
            .read()
            .as_ref()
            .map(|pt| pt.replication_num())
            .unwrap_or(self.status.replication_num) as usize;
        if self.all_nodes.read().len() <= r {
            return Ok(RespCode::ClusterTooSmall);
        }
        let term = self.term.load(Ordering::SeqCst);
        let index = self.next_log_index();
        let entry = RaftLogEntry::new(term, index, LogPayload::RemoveNode(node.clone()));
        match self.send_log_to_all_groups(entry).await {
            SendLogResult::Ok => {
                let was_leader = self.leader.read().as_ref().map(|l| l.identifier) == Some(node.identifier);
                let is_self = node.identifier == self.self_node().identifier;
                self.apply_remove_node(&node);
                if is_self {
                    log::warn!("[META] this node was removed; stopping meta services, keeping data services for outstanding pulls");
                } else if was_leader {
                    *self.character.write() = Character::Elector;
                } else if *self.character.read() == Character::Leader {
                    let _ = self.transport.exile(&node, node.clone()).await;
                }
                Ok(RespCode::Agree)
            }
            SendLogResult::TimeOut => Ok(RespCode::PartitionTableUnavailable),
            SendLogResult::LeadershipStale => Ok(RespCode::Null),
        }
    }

    fn apply_remove_node(&self, node: &Node) {
        {
            let mut all = self.all_nodes.write();
            all.retain(|n| n.identifier != node.identifier);
        }
        self.id_node_map.remove(&node.identifier);
        {
            let mut pt = self.partition_table.write();
            if let Some(table) = pt.as_mut() {
                table.remove_node(node.identifier);
            }
        }
        self.persist_partition_table();
    }

    // ---- Heartbeat side-channels -----------------------------------------

    pub fn heartbeat_for(&self, target: &Node) -> crate::meta::rpc::Heartbeat {
        let term = self.term.load(Ordering::SeqCst);
        crate::meta::rpc::Heartbeat {
            term,
            leader: self.leader.read().clone(),
            last_log_index: self.log_index.load(Ordering::SeqCst),
            last_log_term: term,
            require_identifier: self.id_node_map.len() < self.all_nodes.read().len(),
            partition_table_bytes: if self.blind_nodes.contains(&target.identifier) {
                self.partition_table_bytes()
            } else {
                None
            },
        }
    }

    pub fn apply_heartbeat_response(&self, follower: &Node, resp: HeartbeatResp) {
        if let Some(id) = resp.follower_identifier {
            match self.id_node_map.get(&id) {
                Some(existing) if existing.host != follower.host => {
                    self.id_conflict_nodes.insert(id);
                }
                None => {
                    self.id_node_map.insert(id, follower.clone());
                }
                _ => {}
            }
        }
        if resp.require_partition_table {
            self.blind_nodes.insert(follower.identifier);
        } else {
            self.blind_nodes.remove(&follower.identifier);
        }
    }

    pub fn has_identifier_conflict(&self, id: i32) -> bool {
        self.id_conflict_nodes.contains(&id)
    }

    // ---- Plan dispatch -----------------------------------------------------

    pub async fn execute_non_query_plan(&self, plan: Plan) -> PlanOutcome {
        match plan.classify() {
            PlanClass::Local => match self.executor.execute_local(&plan).await {
                Ok(status) => PlanOutcome { status, sub_status: None },
                Err(_) => PlanOutcome { status: TsStatus::InternalServerError, sub_status: None },
            },
            PlanClass::GlobalMeta => self.dispatch_global_meta(plan).await,
            PlanClass::GlobalData => self.dispatch_global_data(plan).await,
            PlanClass::Partitioned => self.dispatch_partitioned(plan).await,
        }
    }

    async fn dispatch_global_meta(&self, plan: Plan) -> PlanOutcome {
        if *self.character.read() == Character::Leader {
            let term = self.term.load(Ordering::SeqCst);
            let index = self.next_log_index();
            let entry = RaftLogEntry::new(term, index, LogPayload::Plan(plan));
            match self.send_log_to_all_groups(entry).await {
                SendLogResult::Ok => PlanOutcome { status: TsStatus::Success, sub_status: None },
                _ => PlanOutcome { status: TsStatus::ExecuteStatementError, sub_status: None },
            }
        } else if let Some(leader) = self.leader.read().clone() {
            self.transport
                .forward_plan(&leader, plan)
                .await
                .unwrap_or(PlanOutcome { status: TsStatus::ExecuteStatementError, sub_status: None })
        } else {
            PlanOutcome { status: TsStatus::ExecuteStatementError, sub_status: None }
        }
    }

    async fn dispatch_global_data(&self, plan: Plan) -> PlanOutcome {
        let Plan::Deletion { paths } = &plan else {
            return PlanOutcome { status: TsStatus::InternalServerError, sub_status: None };
        };
        // Freeze wildcards to concrete paths before forwarding so every
        // group agrees on exactly what was deleted.
        let expanded = match self.executor.expand_wildcards(paths).await {
            Ok(p) => p,
            Err(_) => return PlanOutcome { status: TsStatus::InternalServerError, sub_status: None },
        };
        let frozen = Plan::Deletion { paths: expanded };
        let Some(table) = self.partition_table.read().clone() else {
            return PlanOutcome { status: TsStatus::ExecuteStatementError, sub_status: None };
        };
        let mut any_error = false;
        for group in table.all_groups() {
            let outcome = self.forward_to_group(&group.header().clone(), &group, &frozen).await;
            if outcome.status != TsStatus::Success {
                any_error = true;
            }
        }
        if any_error {
            PlanOutcome { status: TsStatus::ExecuteStatementError, sub_status: None }
        } else {
            PlanOutcome { status: TsStatus::Success, sub_status: None }
        }
    }

    async fn dispatch_partitioned(&self, plan: Plan) -> PlanOutcome {
        let Some(table) = self.partition_table.read().clone() else {
            return PlanOutcome { status: TsStatus::ExecuteStatementError, sub_status: None };
        };

        let sub_plans = match self.split_with_retry(&plan, &table).await {
            Some(sp) => sp,
            None => return PlanOutcome { status: TsStatus::ExecuteStatementError, sub_status: None },
        };

        let (mut result, combined) = self.forward_all(&plan, &sub_plans).await;

        if self.enable_auto_create_schema
            && (result.status == TsStatus::TimeseriesNotExist
                || combined.iter().any(|s| *s == TsStatus::TimeseriesNotExist))
        {
            if let Some(retried) = self.retry_after_auto_create(&plan, &sub_plans).await {
                result = retried;
            }
        }

        result
    }

    async fn split_with_retry(&self, plan: &Plan, table: &PartitionTable) -> Option<Vec<SubPlan>> {
        let known = |sg: &str| self.known_storage_groups.contains(sg);
        match PartitionRouter::split(plan, table, self.status.partition_interval, &known, self.default_storage_group_level) {
            Ok(sp) if !sp.is_empty() => Some(sp),
            Ok(_) if self.enable_auto_create_schema => {
                // Empty split with auto-create enabled: create the schema
                // inline and retry once.
                if let Plan::PointInsert { device, .. } | Plan::CreateTimeSeries { path: device } = plan {
                    let sg = Plan::storage_group_of(device, self.default_storage_group_level);
                    self.known_storage_groups.insert(sg);
                }
                PartitionRouter::split(plan, table, self.status.partition_interval, &|sg| self.known_storage_groups.contains(sg), self.default_storage_group_level).ok()
            }
            Ok(sp) => Some(sp),
            Err(router::Error::StorageGroupNotSet { storage_group }) if self.enable_auto_create_schema => {
                self.known_storage_groups.insert(storage_group);
                PartitionRouter::split(plan, table, self.status.partition_interval, &|sg| self.known_storage_groups.contains(sg), self.default_storage_group_level).ok()
            }
            Err(_) => None,
        }
    }

    async fn forward_all(&self, plan: &Plan, sub_plans: &[SubPlan]) -> (PlanOutcome, Vec<TsStatus>) {
        let row_count = match plan {
            Plan::BatchInsert { rows } => rows.len(),
            _ => 1,
        };
        let mut combined = vec![TsStatus::Success; row_count];
        let mut any_error = false;
        let mut any_multi = false;

        for sub in sub_plans {
            let outcome = self.forward_to_group(sub.group.header(), &sub.group, &sub.plan).await;
            match outcome.sub_status {
                Some(sub_statuses) => {
                    any_multi = true;
                    for (pos, row_idx) in sub.row_indices.iter().enumerate() {
                        if let Some(s) = sub_statuses.get(pos) {
                            combined[*row_idx] = *s;
                        }
                    }
                }
                None if outcome.status != TsStatus::Success => {
                    any_error = true;
                    for &row_idx in &sub.row_indices {
                        combined[row_idx] = outcome.status;
                    }
                }
                None => {}
            }
        }

        let result = if any_multi {
            PlanOutcome { status: TsStatus::MultipleError, sub_status: Some(combined.clone()) }
        } else if any_error {
            PlanOutcome { status: TsStatus::ExecuteStatementError, sub_status: None }
        } else {
            PlanOutcome { status: TsStatus::Success, sub_status: None }
        };
        (result, combined)
    }

    async fn retry_after_auto_create(&self, plan: &Plan, sub_plans: &[SubPlan]) -> Option<PlanOutcome> {
        let failing_paths: Vec<String> = match plan {
            Plan::BatchInsert { rows } => rows.iter().map(|r| r.device.clone()).collect(),
            Plan::PointInsert { device, .. } => vec![device.clone()],
            _ => Vec::new(),
        };
        self.executor.create_schema(&failing_paths).await.ok()?;
        let (result, _) = self.forward_all(plan, sub_plans).await;
        Some(result)
    }

    async fn forward_to_group(
        &self,
        _header: &Node,
        group: &crate::meta::partition_table::ReplicaGroup,
        plan: &Plan,
    ) -> PlanOutcome {
        if group.contains(self.self_node().identifier) {
            return match self.executor.execute_local(plan).await {
                Ok(status) => PlanOutcome { status, sub_status: None },
                Err(_) => PlanOutcome { status: TsStatus::InternalServerError, sub_status: None },
            };
        }
        for member in &group.0 {
            if let Ok(outcome) = self.transport.forward_plan(member, plan.clone()).await {
                return outcome;
            }
        }
        PlanOutcome { status: TsStatus::ExecuteStatementError, sub_status: None }
    }

    // ---- Persisted state: partitions --------------------------------------

    fn persist_partition_table(&self) {
        let Some(pt) = self.partition_table.read().clone() else { return };
        let bytes = pt.serialize();
        let tmp = partitions_tmp_path(&self.data_dir);
        if let Err(e) = std::fs::create_dir_all(&self.data_dir) {
            log::error!("[META] failed creating data dir: {e}");
            return;
        }
        if let Err(e) = std::fs::write(&tmp, &bytes) {
            log::error!("[META] failed writing partitions.tmp: {e}");
            return;
        }
        if let Err(e) = std::fs::rename(&tmp, partitions_path(&self.data_dir)) {
            log::error!("[META] failed renaming partitions.tmp -> partitions: {e}");
        }
    }
}

fn partitions_path(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join("partitions")
}

fn partitions_tmp_path(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join("partitions.tmp")
}

/// Recovery prefers `partitions`; if only the temp file survived a crash
/// mid-write, it is renamed into place first.
pub fn load_partition_table(data_dir: &str) -> Option<PartitionTable> {
    let path = partitions_path(data_dir);
    let tmp = partitions_tmp_path(data_dir);
    let bytes = if path.exists() {
        std::fs::read(&path).ok()?
    } else if tmp.exists() {
        std::fs::rename(&tmp, &path).ok()?;
        std::fs::read(&path).ok()?
    } else {
        return None;
    };
    PartitionTable::deserialize(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn node(id: i32) -> Node {
        Node::new(id, format!("host-{id}"), 9190, 9191, 9192)
    }

    fn status() -> StartUpStatus {
        StartUpStatus {
            partition_interval: 86400,
            hash_salt: "salt".into(),
            replication_num: 2,
            cluster_name: "default".into(),
            seed_node_list: vec!["host-1:9190".into()],
        }
    }

    struct FakeLeaderTransport {
        leader_id_map: Mutex<std::collections::HashMap<i32, Node>>,
        partition_table: Mutex<Option<PartitionTable>>,
        next_resp: Mutex<Vec<RespCode>>,
    }

    #[async_trait]
    impl ClusterTransport for FakeLeaderTransport {
        async fn add_node(&self, _seed: &Node, req: AddNodeReq) -> anyhow::Result<AddNodeResp> {
            let mut ids = self.leader_id_map.lock().unwrap();
            let mut resp_queue = self.next_resp.lock().unwrap();
            let code = if !resp_queue.is_empty() {
                resp_queue.remove(0)
            } else if ids.contains_key(&req.node.identifier) {
                RespCode::IdentifierConflict
            } else {
                ids.insert(req.node.identifier, req.node.clone());
                RespCode::Agree
            };
            let bytes = if code == RespCode::Agree {
                self.partition_table.lock().unwrap().as_ref().map(|pt| pt.serialize())
            } else {
                None
            };
            Ok(AddNodeResp { code, partition_table_bytes: bytes, check_status_detail: None })
        }
        async fn append_entry_to_group(&self, _node: &Node, req: AppendEntryReq) -> anyhow::Result<AppendEntryResp> {
            Ok(AppendEntryResp { term: req.term, accepted: true })
        }
        async fn forward_plan(&self, _node: &Node, _plan: Plan) -> anyhow::Result<PlanOutcome> {
            Ok(PlanOutcome { status: TsStatus::Success, sub_status: None })
        }
        async fn exile(&self, _node: &Node, _removed: Node) -> anyhow::Result<()> {
            Ok(())
        }
        async fn check_status(&self, _seed: &Node, _status: StartUpStatus) -> anyhow::Result<bool> {
            Ok(true)
        }
    }

    struct NoopExecutor;

    #[async_trait]
    impl LocalExecutor for NoopExecutor {
        async fn execute_local(&self, _plan: &Plan) -> anyhow::Result<TsStatus> {
            Ok(TsStatus::Success)
        }
        async fn create_schema(&self, _paths: &[String]) -> anyhow::Result<()> {
            Ok(())
        }
        async fn expand_wildcards(&self, paths: &[String]) -> anyhow::Result<Vec<String>> {
            Ok(paths.to_vec())
        }
    }

    fn member(self_id: i32, transport: Arc<dyn ClusterTransport>) -> MetaGroupMember {
        let cfg = config::init();
        MetaGroupMember::new(node(self_id), status(), transport, Arc::new(NoopExecutor), &cfg)
    }

    #[tokio::test]
    async fn test_join_identifier_conflict_then_agree() {
        let mut ids = std::collections::HashMap::new();
        ids.insert(42, node(42));
        let transport = Arc::new(FakeLeaderTransport {
            leader_id_map: Mutex::new(ids),
            partition_table: Mutex::new(Some(PartitionTable::new(vec![node(42), node(7)], "salt", 2).unwrap())),
            next_resp: Mutex::new(vec![RespCode::IdentifierConflict]),
        });
        let m = member(42, transport.clone());
        m.join_cluster(&[node(42)]).await.unwrap();
        assert_eq!(m.character(), Character::Follower);
        assert_ne!(m.self_node().identifier, 42);
    }

    #[tokio::test]
    async fn test_join_parameter_conflict_surfaces_diff() {
        let transport = Arc::new(FakeLeaderTransport {
            leader_id_map: Mutex::new(std::collections::HashMap::new()),
            partition_table: Mutex::new(None),
            next_resp: Mutex::new(vec![RespCode::NewNodeParameterConflict]),
        });
        let m = member(7, transport);
        let err = m.join_cluster(&[node(1)]).await.unwrap_err();
        assert!(matches!(err, Error::ParameterConflict { .. }));
    }

    #[tokio::test]
    async fn test_tablet_split_reassembly() {
        // Combined status is MULTIPLE_ERROR with the per-row reassembly,
        // success rows defaulting to SUCCESS.
        struct MixedTransport;
        #[async_trait]
        impl ClusterTransport for MixedTransport {
            async fn add_node(&self, _s: &Node, _r: AddNodeReq) -> anyhow::Result<AddNodeResp> {
                unreachable!()
            }
            async fn append_entry_to_group(&self, _n: &Node, req: AppendEntryReq) -> anyhow::Result<AppendEntryResp> {
                Ok(AppendEntryResp { term: req.term, accepted: true })
            }
            async fn forward_plan(&self, node: &Node, plan: Plan) -> anyhow::Result<PlanOutcome> {
                let Plan::BatchInsert { rows } = &plan else {
                    return Ok(PlanOutcome { status: TsStatus::Success, sub_status: None });
                };
                if node.identifier % 2 == 0 {
                    Ok(PlanOutcome { status: TsStatus::Success, sub_status: None })
                } else {
                    Ok(PlanOutcome {
                        status: TsStatus::MultipleError,
                        sub_status: Some(vec![TsStatus::ExecuteStatementError; rows.len()]),
                    })
                }
            }
            async fn exile(&self, _n: &Node, _r: Node) -> anyhow::Result<()> {
                Ok(())
            }
            async fn check_status(&self, _s: &Node, _st: StartUpStatus) -> anyhow::Result<bool> {
                Ok(true)
            }
        }

        let m = member(100, Arc::new(MixedTransport));
        // Groups are built by hand (not via `table.route`) so the outcome
        // does not depend on the hash function's slot assignment: node 2's
        // group succeeds, node 3's group reports a per-row error.
        let group_a = crate::meta::partition_table::ReplicaGroup(vec![node(2)]);
        let group_b = crate::meta::partition_table::ReplicaGroup(vec![node(3)]);
        let sub_plans = vec![
            SubPlan {
                group: group_a,
                plan: Plan::BatchInsert {
                    rows: vec![
                        crate::meta::plan::TabletRow { device: "root.sgA.d1".into(), timestamp: 0, row: vec![] },
                        crate::meta::plan::TabletRow { device: "root.sgA.d1".into(), timestamp: 1, row: vec![] },
                    ],
                },
                row_indices: vec![0, 2],
            },
            SubPlan {
                group: group_b,
                plan: Plan::BatchInsert {
                    rows: vec![crate::meta::plan::TabletRow { device: "root.sgB.d1".into(), timestamp: 0, row: vec![] }],
                },
                row_indices: vec![1],
            },
        ];
        let plan = Plan::BatchInsert {
            rows: vec![
                crate::meta::plan::TabletRow { device: "root.sgA.d1".into(), timestamp: 0, row: vec![] },
                crate::meta::plan::TabletRow { device: "root.sgB.d1".into(), timestamp: 0, row: vec![] },
                crate::meta::plan::TabletRow { device: "root.sgA.d1".into(), timestamp: 1, row: vec![] },
            ],
        };
        let (outcome, combined) = m.forward_all(&plan, &sub_plans).await;
        assert_eq!(outcome.status, TsStatus::MultipleError);
        assert_eq!(combined[0], TsStatus::Success);
        assert_eq!(combined[2], TsStatus::Success);
        assert_ne!(combined[1], TsStatus::Success);
    }
}
