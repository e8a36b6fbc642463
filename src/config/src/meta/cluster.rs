// Copyright 2023 Zinc Labs Inc.
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

use serde::{Deserialize, Serialize};

/// A cluster member, identified by (host, meta-port, data-port, client-port)
/// plus a 32-bit `identifier` derived from host+port+wall-clock at first
/// boot and persisted. Identifier uniqueness is enforced by the leader
/// at join time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub identifier: i32,
    pub host: String,
    pub meta_port: u16,
    pub data_port: u16,
    pub client_port: u16,
}

impl Node {
    pub fn new(
        identifier: i32,
        host: impl Into<String>,
        meta_port: u16,
        data_port: u16,
        client_port: u16,
    ) -> Self {
        Node {
            identifier,
            host: host.into(),
            meta_port,
            data_port,
            client_port,
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}(#{})", self.host, self.meta_port, self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_display() {
        let n = Node::new(1, "10.0.0.1", 9000, 9001, 9002);
        assert_eq!(n.to_string(), "10.0.0.1:9000(#1)");
    }

    #[test]
    fn test_node_eq() {
        let a = Node::new(1, "h", 1, 2, 3);
        let b = Node::new(1, "h", 1, 2, 3);
        let c = Node::new(2, "h", 1, 2, 3);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
