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

//! `StartUpStatus`: the set of cluster-wide parameters that must match
//! bit-for-bit across every member.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartUpStatus {
    pub partition_interval: i64,
    pub hash_salt: String,
    pub replication_num: u32,
    pub cluster_name: String,
    pub seed_node_list: Vec<String>,
}

impl StartUpStatus {
    pub fn from_config(cfg: &config::Config) -> Self {
        Self {
            partition_interval: cfg.cluster.partition_interval_secs,
            hash_salt: cfg.cluster.hash_salt.clone(),
            replication_num: cfg.cluster.replication_num,
            cluster_name: cfg.cluster.cluster_name.clone(),
            seed_node_list: cfg.seed_nodes(),
        }
    }

    /// A field-by-field comparison used both to reject a join with
    /// `PARAMETER_CONFLICT` and to report the diagnostic.
    pub fn diff(&self, other: &StartUpStatus) -> StartUpStatusDiff {
        StartUpStatusDiff {
            partition_interval_equals: self.partition_interval == other.partition_interval,
            hash_salt_equals: self.hash_salt == other.hash_salt,
            replication_num_equals: self.replication_num == other.replication_num,
            cluster_name_equals: self.cluster_name == other.cluster_name,
            seed_node_list_equals: self.seed_node_list == other.seed_node_list,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartUpStatusDiff {
    pub partition_interval_equals: bool,
    pub hash_salt_equals: bool,
    pub replication_num_equals: bool,
    pub cluster_name_equals: bool,
    pub seed_node_list_equals: bool,
}

impl StartUpStatusDiff {
    pub fn all_equal(&self) -> bool {
        self.partition_interval_equals
            && self.hash_salt_equals
            && self.replication_num_equals
            && self.cluster_name_equals
            && self.seed_node_list_equals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(salt: &str) -> StartUpStatus {
        StartUpStatus {
            partition_interval: 86400,
            hash_salt: salt.to_string(),
            replication_num: 3,
            cluster_name: "default".to_string(),
            seed_node_list: vec!["a:1".to_string()],
        }
    }

    #[test]
    fn test_diff_salt_mismatch_only() {
        // A salt mismatch surfaces with every other field reported equal.
        let leader = status("salt-a");
        let joiner = status("salt-b");
        let diff = leader.diff(&joiner);
        assert!(!diff.hash_salt_equals);
        assert!(diff.partition_interval_equals);
        assert!(diff.replication_num_equals);
        assert!(diff.cluster_name_equals);
        assert!(diff.seed_node_list_equals);
        assert!(!diff.all_equal());
    }

    #[test]
    fn test_diff_identical_all_equal() {
        let a = status("salt");
        let b = status("salt");
        assert!(a.diff(&b).all_equal());
    }
}
