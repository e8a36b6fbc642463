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

use std::{collections::BTreeMap, sync::Arc};

use arc_swap::ArcSwap;
use dotenv_config::EnvConfig;
use dotenvy::dotenv_override;
use once_cell::sync::Lazy;
use sysinfo::SystemExt;

pub type RwHashMap<K, V> = dashmap::DashMap<K, V, ahash::RandomState>;
pub type RwHashSet<K> = dashmap::DashSet<K, ahash::RandomState>;
pub type RwBTreeMap<K, V> = tokio::sync::RwLock<BTreeMap<K, V>>;

/// Number of virtual slots the hash ring is divided into.
pub const SLOT_COUNT: usize = 10_000;

static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from(Arc::new(init())));

pub fn get_config() -> Arc<Config> {
    CONFIG.load().clone()
}

pub fn refresh_config() -> Result<(), anyhow::Error> {
    CONFIG.store(Arc::new(init()));
    Ok(())
}

#[derive(EnvConfig)]
pub struct Config {
    pub cluster: Cluster,
    pub limit: Limit,
    pub compact: Compact,
    pub log: Log,
}

#[derive(EnvConfig)]
pub struct Cluster {
    // no need set by environment
    pub cpu_num: usize,
    #[env_config(name = "ZO_NODE_ROLE", default = "all")]
    pub node_role: String,
    #[env_config(name = "ZO_DATA_DIR", default = "./data/tsnode/")]
    pub data_dir: String,
    #[env_config(name = "ZO_CLUSTER_META_ADDR", default = "")] // empty -> autodetect
    pub meta_addr: String,
    #[env_config(name = "ZO_CLUSTER_META_PORT", default = 9190)]
    pub meta_port: u16,
    #[env_config(name = "ZO_CLUSTER_DATA_PORT", default = 9191)]
    pub data_port: u16,
    #[env_config(name = "ZO_CLUSTER_CLIENT_PORT", default = 9192)]
    pub client_port: u16,
    #[env_config(name = "ZO_CLUSTER_NAME", default = "default")]
    pub cluster_name: String,
    #[env_config(name = "ZO_CLUSTER_SEED_NODES", default = "")] // comma separated host:meta_port
    pub seed_node_urls: String,
    #[env_config(name = "ZO_CLUSTER_HASH_SALT", default = "tsnode")]
    pub hash_salt: String,
    #[env_config(name = "ZO_CLUSTER_REPLICATION_NUM", default = 3)]
    pub replication_num: u32,
    #[env_config(name = "ZO_CLUSTER_PARTITION_INTERVAL", default = 86400)] // seconds
    pub partition_interval_secs: i64,
    #[env_config(name = "ZO_CLUSTER_HEARTBEAT_INTERVAL_MS", default = 1000)]
    pub heartbeat_interval_ms: u64,
}

#[derive(EnvConfig)]
pub struct Limit {
    #[env_config(name = "ZO_CONCURRENT_COMPACTION_THREAD", default = 0)] // 0 -> cpu_num
    pub concurrent_compaction_thread: usize,
    #[env_config(name = "ZO_TARGET_COMPACTION_FILE_SIZE", default = 134217728)] // bytes (128MB)
    pub target_compaction_file_size: u64,
    #[env_config(name = "ZO_ENABLE_SEQ_SPACE_COMPACTION", default = true)]
    pub enable_seq_space_compaction: bool,
    #[env_config(name = "ZO_ENABLE_UNSEQ_SPACE_COMPACTION", default = true)]
    pub enable_unseq_space_compaction: bool,
    #[env_config(name = "ZO_COMPACTION_PRIORITY", default = "balance")]
    pub compaction_priority: String, // balance | inner_cross | cross_inner
    #[env_config(name = "ZO_DEFAULT_STORAGE_GROUP_LEVEL", default = 1)]
    pub default_storage_group_level: usize,
    #[env_config(name = "ZO_ENABLE_AUTO_CREATE_SCHEMA", default = true)]
    pub enable_auto_create_schema: bool,
    #[env_config(name = "ZO_REMOTE_SCHEMA_CACHE_SIZE", default = 10000)]
    pub remote_schema_cache_size: usize,
    #[env_config(name = "ZO_READ_OPERATION_TIMEOUT_MS", default = 30000)]
    pub read_operation_timeout_ms: u64,
    #[env_config(name = "ZO_WRITE_OPERATION_TIMEOUT_MS", default = 30000)]
    pub write_operation_timeout_ms: u64,
    #[env_config(name = "ZO_DEFAULT_JOIN_RETRY", default = 10)]
    pub default_join_retry: u32,
    #[env_config(name = "ZO_JOIN_RETRY_INTERVAL_SECS", default = 5)]
    pub join_retry_interval_secs: u64,
    #[env_config(name = "ZO_START_UP_TIME_THRESHOLD_MS", default = 120000)]
    pub start_up_time_threshold_ms: u64,
}

#[derive(EnvConfig)]
pub struct Compact {
    #[env_config(name = "ZO_COMPACT_SCHEDULE_INTERVAL_SECS", default = 10)]
    pub schedule_interval_secs: u64,
    #[env_config(name = "ZO_COMPACT_NODE_REPORT_INTERVAL_SECS", default = 10)]
    pub node_report_interval_secs: u64,
    #[env_config(name = "ZO_COMPACT_HARD_LINK_CLEANER_INTERVAL_SECS", default = 3600)]
    pub hard_link_cleaner_interval_secs: u64,
}

#[derive(EnvConfig)]
pub struct Log {
    #[env_config(name = "RUST_LOG", default = "info")]
    pub level: String,
}

fn detect_cpu_num() -> usize {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.cpus().len().max(1)
}

pub fn init() -> Config {
    dotenv_override().ok();
    let mut cfg = Config::init().unwrap();
    cfg.cluster.cpu_num = detect_cpu_num();
    if cfg.limit.concurrent_compaction_thread == 0 {
        cfg.limit.concurrent_compaction_thread = cfg.cluster.cpu_num;
    }
    cfg
}

impl Config {
    /// Rejects configuration that cannot possibly run, rather than letting
    /// the problem surface later as a confusing runtime panic.
    pub fn sanity_check(&self) -> Result<(), anyhow::Error> {
        if self.cluster.replication_num == 0 {
            anyhow::bail!("cluster.replication_num must be >= 1");
        }
        if self.limit.concurrent_compaction_thread == 0 {
            anyhow::bail!("limit.concurrent_compaction_thread must be >= 1");
        }
        if self.limit.target_compaction_file_size == 0 {
            anyhow::bail!("limit.target_compaction_file_size must be > 0");
        }
        match self.limit.compaction_priority.to_lowercase().as_str() {
            "balance" | "inner_cross" | "cross_inner" => {}
            other => anyhow::bail!("unknown limit.compaction_priority: {other}"),
        }
        Ok(())
    }

    pub fn seed_nodes(&self) -> Vec<String> {
        self.cluster
            .seed_node_urls
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanity_check_rejects_zero_replication() {
        let mut cfg = init();
        cfg.cluster.replication_num = 0;
        assert!(cfg.sanity_check().is_err());
    }

    #[test]
    fn test_sanity_check_accepts_defaults() {
        let cfg = init();
        assert!(cfg.sanity_check().is_ok());
    }

    #[test]
    fn test_seed_nodes_parses_csv() {
        let mut cfg = init();
        cfg.cluster.seed_node_urls = "a:1, b:2 ,,c:3".to_string();
        assert_eq!(cfg.seed_nodes(), vec!["a:1", "b:2", "c:3"]);
    }
}
