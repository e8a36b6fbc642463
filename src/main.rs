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

mod cli;
mod collaborators;
mod compaction;
mod errors;
mod meta;

use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use tokio::time;

use crate::{
    cli::Command,
    collaborators::{LoggingLocalExecutor, UnreachableClusterTransport},
    errors::{ConfigSnafu, IngesterSnafu, Result},
    meta::{
        group_member::{load_partition_table, MetaGroupMember},
        node,
        startup::StartUpStatus,
    },
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = cli::parse();
    match cli.command {
        Command::Run => run().await.map_err(|e| anyhow::anyhow!(e)),
        Command::ShowPartitions => show_partitions().map_err(|e| anyhow::anyhow!(e)),
    }
}

async fn run() -> Result<()> {
    config::init_runtime().map_err(|e| ConfigSnafu { cause: e }.build())?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = config::get_config();
    info!("[TSNODE] starting node, data_dir={}", cfg.cluster.data_dir);

    ingester::init().await.map_err(|e| IngesterSnafu { cause: anyhow::Error::from(e) }.build())?;

    let auto_detected_host = config::cluster::get_local_node_ip();
    let host = if cfg.cluster.meta_addr.is_empty() { &auto_detected_host } else { &cfg.cluster.meta_addr };
    let identifier = node::load_or_create_identifier(&cfg.cluster.data_dir, host, cfg.cluster.meta_port)?;
    let self_node = node::self_node(identifier, host, cfg.cluster.meta_port, cfg.cluster.data_port, cfg.cluster.client_port);
    info!("[TSNODE] node identity: {self_node}");

    let status = StartUpStatus::from_config(&cfg);
    let member = Arc::new(MetaGroupMember::new(
        self_node,
        status,
        Arc::new(UnreachableClusterTransport),
        Arc::new(LoggingLocalExecutor),
        &cfg,
    ));

    let seeds = node::seed_nodes_as_nodes(&cfg);
    if seeds.is_empty() {
        // This node is its own seed: BuildCluster with no peers synthesises
        // a single-member partition table directly.
        member.build_cluster(&[member.self_node()], cfg.limit.start_up_time_threshold_ms).await?;
    } else {
        match member.build_cluster(&seeds, cfg.limit.start_up_time_threshold_ms).await {
            Ok(()) => {}
            Err(_) => member.join_cluster(&seeds).await?,
        }
    }
    info!("[TSNODE] cluster ready as {:?}", member.character());

    let scheduler = Arc::new(compaction::CompactionScheduler::new(&cfg));
    spawn_node_report(member.clone(), scheduler.clone(), cfg.compact.node_report_interval_secs);
    spawn_hard_link_cleaner(cfg.cluster.data_dir.clone(), cfg.compact.hard_link_cleaner_interval_secs);

    // Parks the process; the spawned background tasks above are where the
    // actual ongoing work happens.
    std::future::pending::<()>().await;
    Ok(())
}

fn show_partitions() -> Result<()> {
    config::init_runtime().map_err(|e| ConfigSnafu { cause: e }.build())?;
    let cfg = config::get_config();
    match load_partition_table(&cfg.cluster.data_dir) {
        Some(table) => {
            println!("replication factor: {}", table.replication_num());
            println!("nodes: {:?}", table.nodes());
            for group in table.all_groups() {
                println!("group header {}: {:?}", group.header(), group);
            }
        }
        None => println!("no partition table persisted under {}", cfg.cluster.data_dir),
    }
    Ok(())
}

/// Logs node role, term, leader, and current compaction task count every
/// `interval_secs`.
fn spawn_node_report(member: Arc<MetaGroupMember>, scheduler: Arc<compaction::CompactionScheduler>, interval_secs: u64) {
    tokio::task::spawn(async move {
        let mut interval = time::interval(time::Duration::from_secs(interval_secs));
        interval.tick().await;
        loop {
            interval.tick().await;
            info!(
                "[NODE_REPORT] role={:?} node={} current_task_num={}",
                member.character(),
                member.self_node(),
                scheduler.current_task_num(),
            );
        }
    });
}

/// Periodic sweep removing zero-reference hard-linked mods files left
/// behind by completed merges. Grounded in the
/// rename/cleanup step of a completed `CompactionTask` commit
/// (`compaction::task::rename_queued_deletions`): any `.compaction.mods`
/// file still present after a merge committed belongs to a source that
/// no longer exists, so it is safe to remove.
fn spawn_hard_link_cleaner(data_dir: String, interval_secs: u64) {
    tokio::task::spawn(async move {
        let mut interval = time::interval(time::Duration::from_secs(interval_secs));
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = sweep_orphaned_mods_files(&data_dir) {
                error!("[HARD_LINK_CLEANER] sweep failed: {e}");
            }
        }
    });
}

fn sweep_orphaned_mods_files(data_dir: &str) -> std::io::Result<()> {
    let root = std::path::Path::new(data_dir);
    if !root.exists() {
        return Ok(());
    }
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        let Some(source_name) = name.strip_suffix(".compaction.mods") else { continue };
        let source = path.with_file_name(source_name);
        if !source.exists() {
            std::fs::remove_file(path)?;
            info!("[HARD_LINK_CLEANER] removed orphaned {}", path.display());
        }
    }
    Ok(())
}
