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

//! Deterministic mapping of (storage-group, time-partition) to a replica
//! group. A pure function of (node list, salt, R): any two
//! replicas holding the same inputs compute the same table.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use config::{
    meta::cluster::Node,
    utils::hash::{murmur3, Sum64},
    SLOT_COUNT,
};
use snafu::Snafu;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum Error {
    #[snafu(display("need at least {r} nodes to route with replication factor {r}, have {have}"))]
    NotEnoughNodes { r: u32, have: usize },
    #[snafu(display("malformed partition table bytes"))]
    Malformed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An ordered list of R nodes; the first is the group header, used as the
/// group's stable identity in routing and logging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicaGroup(pub Vec<Node>);

impl ReplicaGroup {
    pub fn header(&self) -> &Node {
        &self.0[0]
    }

    pub fn contains(&self, identifier: i32) -> bool {
        self.0.iter().any(|n| n.identifier == identifier)
    }
}

#[derive(Clone, Debug)]
pub struct PartitionTable {
    salt: String,
    replication_num: u32,
    /// Ring order: nodes sorted by identifier ascending.
    nodes: Vec<Node>,
    /// `slot_owners[slot]` is an index into `nodes`.
    slot_owners: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAdditionResult {
    /// (slot, previous owner identifier) pairs moved to the new node.
    pub moved: Vec<(usize, i32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRemovalResult {
    /// (slot, new owner identifier) pairs redistributed from the removed
    /// node.
    pub moved: Vec<(usize, i32)>,
}

fn sorted_ring(mut nodes: Vec<Node>) -> Vec<Node> {
    nodes.sort_by_key(|n| n.identifier);
    nodes
}

fn hash_slot(salt: &str, storage_group: &str, time_partition: i64) -> usize {
    let key = format!("{salt}:{storage_group}:{time_partition}");
    (murmur3::new().sum64(&key) as usize) % SLOT_COUNT
}

impl PartitionTable {
    /// Synthesises the initial table for a brand-new cluster: every slot
    /// evenly distributed across the seed node set in ring order.
    pub fn new(nodes: Vec<Node>, salt: impl Into<String>, replication_num: u32) -> Result<Self> {
        let nodes = sorted_ring(nodes);
        if nodes.len() < replication_num as usize {
            return NotEnoughNodesSnafu {
                r: replication_num,
                have: nodes.len(),
            }
            .fail();
        }
        let n = nodes.len() as u32;
        let slot_owners = (0..SLOT_COUNT as u32).map(|slot| slot % n).collect();
        Ok(Self {
            salt: salt.into(),
            replication_num,
            nodes,
            slot_owners,
        })
    }

    pub fn replication_num(&self) -> u32 {
        self.replication_num
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// `Route(sg, time) -> ReplicaGroup`.
    pub fn route(&self, storage_group: &str, time_partition: i64) -> Result<ReplicaGroup> {
        let r = self.replication_num as usize;
        if self.nodes.len() < r {
            return NotEnoughNodesSnafu {
                r: self.replication_num,
                have: self.nodes.len(),
            }
            .fail();
        }
        let slot = hash_slot(&self.salt, storage_group, time_partition);
        let owner_idx = self.slot_owners[slot] as usize;
        let group = (0..r)
            .map(|i| self.nodes[(owner_idx + i) % self.nodes.len()].clone())
            .collect();
        Ok(ReplicaGroup(group))
    }

    /// Enumerates every distinct replica group currently owning at least
    /// one slot.
    pub fn all_groups(&self) -> Vec<ReplicaGroup> {
        let r = self.replication_num as usize;
        if self.nodes.len() < r {
            return Vec::new();
        }
        let mut owners: Vec<u32> = self.slot_owners.clone();
        owners.sort_unstable();
        owners.dedup();
        owners
            .into_iter()
            .map(|owner_idx| {
                let group = (0..r)
                    .map(|i| self.nodes[(owner_idx as usize + i) % self.nodes.len()].clone())
                    .collect();
                ReplicaGroup(group)
            })
            .collect()
    }

    /// `AddNode(n) -> NodeAdditionResult`. Moves
    /// `SLOT_COUNT / N_after` slots from existing owners to `n`, the same
    /// quota taken from every existing owner (remainder to the
    /// lowest-identifier owners) so the outcome is a pure function of the
    /// pre-add state.
    pub fn add_node(&mut self, node: Node) -> NodeAdditionResult {
        if self.nodes.iter().any(|n| n.identifier == node.identifier) {
            return NodeAdditionResult { moved: Vec::new() };
        }
        let n_before = self.nodes.len();
        let n_after = n_before + 1;
        let target_total = SLOT_COUNT / n_after;

        let quota = target_total / n_before.max(1);
        let remainder = target_total - quota * n_before.max(1);

        // Slots owned by each existing node, in slot-index ascending order.
        let mut by_owner: Vec<Vec<usize>> = vec![Vec::new(); n_before];
        for (slot, &owner_idx) in self.slot_owners.iter().enumerate() {
            by_owner[owner_idx as usize].push(slot);
        }

        let mut moved = Vec::new();
        for (owner_idx, slots) in by_owner.iter().enumerate() {
            let take = quota + usize::from(owner_idx < remainder);
            for &slot in slots.iter().take(take) {
                moved.push((slot, self.nodes[owner_idx].identifier));
            }
        }

        // Snapshot each slot's current owner identifier before re-sorting
        // the ring, since the ring resort may shift every other node's
        // index too (if the new identifier sorts before them).
        let owner_identifier_by_slot: Vec<i32> = self
            .slot_owners
            .iter()
            .map(|&idx| self.nodes[idx as usize].identifier)
            .collect();
        let moved_slots: std::collections::HashSet<usize> =
            moved.iter().map(|&(slot, _)| slot).collect();

        self.nodes.push(node.clone());
        self.nodes = sorted_ring(std::mem::take(&mut self.nodes));

        let mut idx_by_identifier = std::collections::HashMap::new();
        for (idx, n) in self.nodes.iter().enumerate() {
            idx_by_identifier.insert(n.identifier, idx as u32);
        }
        let new_node_idx = idx_by_identifier[&node.identifier];

        for (slot, owner_id) in owner_identifier_by_slot.into_iter().enumerate() {
            self.slot_owners[slot] = if moved_slots.contains(&slot) {
                new_node_idx
            } else {
                idx_by_identifier[&owner_id]
            };
        }

        NodeAdditionResult { moved }
    }

    /// `RemoveNode(n) -> NodeRemovalResult`. Redistributes
    /// the removed node's slots round-robin across the remaining ring,
    /// starting from the removed node's former ring successor.
    pub fn remove_node(&mut self, identifier: i32) -> NodeRemovalResult {
        let Some(removed_idx) = self.nodes.iter().position(|n| n.identifier == identifier) else {
            return NodeRemovalResult { moved: Vec::new() };
        };
        let owned_slots: Vec<usize> = self
            .slot_owners
            .iter()
            .enumerate()
            .filter(|&(_, &owner)| owner == removed_idx as u32)
            .map(|(slot, _)| slot)
            .collect();

        let mut remaining = self.nodes.clone();
        remaining.remove(removed_idx);

        let mut moved = Vec::new();
        if !remaining.is_empty() {
            for (i, slot) in owned_slots.into_iter().enumerate() {
                let new_owner = &remaining[i % remaining.len()];
                moved.push((slot, new_owner.identifier));
            }
        }

        self.nodes = remaining;
        let mut owner_by_identifier = std::collections::HashMap::new();
        for (idx, n) in self.nodes.iter().enumerate() {
            owner_by_identifier.insert(n.identifier, idx as u32);
        }
        // Shift every owner index above the removed slot down by one, then
        // apply the redistribution.
        for owner in self.slot_owners.iter_mut() {
            if *owner > removed_idx as u32 {
                *owner -= 1;
            }
        }
        for &(slot, new_owner_id) in &moved {
            self.slot_owners[slot] = owner_by_identifier[&new_owner_id];
        }

        NodeRemovalResult { moved }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u16::<BigEndian>(1).unwrap(); // version
        let salt_bytes = self.salt.as_bytes();
        buf.write_u32::<BigEndian>(salt_bytes.len() as u32).unwrap();
        buf.extend_from_slice(salt_bytes);
        buf.write_u32::<BigEndian>(self.replication_num).unwrap();
        buf.write_u32::<BigEndian>(self.nodes.len() as u32).unwrap();
        for node in &self.nodes {
            buf.write_i32::<BigEndian>(node.identifier).unwrap();
            let host_bytes = node.host.as_bytes();
            buf.write_u32::<BigEndian>(host_bytes.len() as u32).unwrap();
            buf.extend_from_slice(host_bytes);
            buf.write_u16::<BigEndian>(node.meta_port).unwrap();
            buf.write_u16::<BigEndian>(node.data_port).unwrap();
            buf.write_u16::<BigEndian>(node.client_port).unwrap();
        }
        buf.write_u32::<BigEndian>(self.slot_owners.len() as u32).unwrap();
        for &owner in &self.slot_owners {
            buf.write_u32::<BigEndian>(owner).unwrap();
        }
        buf
    }

    pub fn deserialize(mut bytes: &[u8]) -> Result<Self> {
        let _version = bytes.read_u16::<BigEndian>().map_err(|_| Error::Malformed)?;
        let salt_len = bytes.read_u32::<BigEndian>().map_err(|_| Error::Malformed)? as usize;
        if bytes.len() < salt_len {
            return Err(Error::Malformed);
        }
        let salt = String::from_utf8(bytes[..salt_len].to_vec()).map_err(|_| Error::Malformed)?;
        bytes = &bytes[salt_len..];
        let replication_num = bytes.read_u32::<BigEndian>().map_err(|_| Error::Malformed)?;
        let node_count = bytes.read_u32::<BigEndian>().map_err(|_| Error::Malformed)? as usize;
        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let identifier = bytes.read_i32::<BigEndian>().map_err(|_| Error::Malformed)?;
            let host_len = bytes.read_u32::<BigEndian>().map_err(|_| Error::Malformed)? as usize;
            if bytes.len() < host_len {
                return Err(Error::Malformed);
            }
            let host = String::from_utf8(bytes[..host_len].to_vec()).map_err(|_| Error::Malformed)?;
            bytes = &bytes[host_len..];
            let meta_port = bytes.read_u16::<BigEndian>().map_err(|_| Error::Malformed)?;
            let data_port = bytes.read_u16::<BigEndian>().map_err(|_| Error::Malformed)?;
            let client_port = bytes.read_u16::<BigEndian>().map_err(|_| Error::Malformed)?;
            nodes.push(Node::new(identifier, host, meta_port, data_port, client_port));
        }
        let slot_count = bytes.read_u32::<BigEndian>().map_err(|_| Error::Malformed)? as usize;
        let mut slot_owners = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            slot_owners.push(bytes.read_u32::<BigEndian>().map_err(|_| Error::Malformed)?);
        }
        Ok(Self {
            salt,
            replication_num,
            nodes,
            slot_owners,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i32) -> Node {
        Node::new(id, format!("host-{id}"), 9190, 9191, 9192)
    }

    fn three_node_table() -> PartitionTable {
        PartitionTable::new(vec![node(3), node(1), node(2)], "salt", 2).unwrap()
    }

    #[test]
    fn test_route_is_pure_and_has_r_distinct_nodes() {
        let pt = three_node_table();
        let a = pt.route("sg1", 5).unwrap();
        let b = pt.route("sg1", 5).unwrap();
        assert_eq!(a, b);
        let ids: std::collections::HashSet<_> = a.0.iter().map(|n| n.identifier).collect();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_route_fails_below_replication_factor() {
        let pt = PartitionTable::new(vec![node(1)], "salt", 2);
        assert!(pt.is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let pt = three_node_table();
        let bytes = pt.serialize();
        let back = PartitionTable::deserialize(&bytes).unwrap();
        assert_eq!(back.serialize(), bytes);
        assert_eq!(pt.route("sg", 1).unwrap(), back.route("sg", 1).unwrap());
    }

    #[test]
    fn test_add_node_moves_quota_from_every_owner() {
        let mut pt = PartitionTable::new(vec![node(1), node(2)], "salt", 2).unwrap();
        let result = pt.add_node(node(3));
        assert!(!result.moved.is_empty());
        // every moved slot's new owner is indeed node 3
        for &(slot, _) in &result.moved {
            let owner_idx = pt.slot_owners[slot] as usize;
            assert_eq!(pt.nodes[owner_idx].identifier, 3);
        }
    }

    #[test]
    fn test_remove_node_redistributes_to_remaining() {
        let mut pt = PartitionTable::new(vec![node(1), node(2), node(3)], "salt", 2).unwrap();
        let result = pt.remove_node(2);
        assert!(!result.moved.is_empty());
        assert!(pt.nodes.iter().all(|n| n.identifier != 2));
        for &(slot, new_owner) in &result.moved {
            let owner_idx = pt.slot_owners[slot] as usize;
            assert_eq!(pt.nodes[owner_idx].identifier, new_owner);
        }
    }

    #[test]
    fn test_deterministic_application_order_independent_of_insertion_order() {
        let mut a = PartitionTable::new(vec![node(1), node(2)], "salt", 2).unwrap();
        let mut b = PartitionTable::new(vec![node(2), node(1)], "salt", 2).unwrap();
        a.add_node(node(3));
        b.add_node(node(3));
        assert_eq!(a.serialize(), b.serialize());
    }
}
