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

//! Node identity: persisted once at first boot, then reused across restarts.

use std::path::{Path, PathBuf};

use config::{ider, meta::cluster::Node, utils::file};
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("unable to read node_identifier at {}: {}", path.display(), source))]
    ReadIdentifier { source: std::io::Error, path: PathBuf },
    #[snafu(display("unable to write node_identifier at {}: {}", path.display(), source))]
    WriteIdentifier { source: std::io::Error, path: PathBuf },
    #[snafu(display("node_identifier file at {} does not contain a valid decimal id", path.display()))]
    InvalidIdentifier { path: PathBuf },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub fn identifier_path(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join("node_identifier")
}

/// Loads the persisted 32-bit node identifier, or derives and persists a
/// fresh one on first boot.
pub fn load_or_create_identifier(data_dir: &str, host: &str, meta_port: u16) -> Result<i32> {
    let path = identifier_path(data_dir);
    if path.exists() {
        let bytes = file::get_file_contents(path.to_str().unwrap())
            .context(ReadIdentifierSnafu { path: path.clone() })?;
        let text = String::from_utf8_lossy(&bytes);
        return text
            .trim()
            .parse::<i32>()
            .ok()
            .context(InvalidIdentifierSnafu { path });
    }
    let id = ider::generate_identifier(host, meta_port);
    persist_identifier(data_dir, id)?;
    Ok(id)
}

pub fn persist_identifier(data_dir: &str, id: i32) -> Result<()> {
    let path = identifier_path(data_dir);
    file::put_file_contents(path.to_str().unwrap(), format!("{id}\n").as_bytes())
        .context(WriteIdentifierSnafu { path })
}

pub fn self_node(identifier: i32, host: &str, meta_port: u16, data_port: u16, client_port: u16) -> Node {
    Node::new(identifier, host, meta_port, data_port, client_port)
}

/// Parses `cluster.seed_node_urls` (comma-separated `host:meta_port`
/// entries, see `config::Config::seed_nodes`) into addressable `Node`s.
/// A seed's real identifier, data-port, and client-port are unknown
/// until it responds to a status check or add-node request, so they are
/// left as placeholders; nothing before that first contact reads them.
pub fn seed_nodes_as_nodes(cfg: &config::Config) -> Vec<Node> {
    cfg.seed_nodes()
        .into_iter()
        .filter_map(|entry| {
            let (host, port) = entry.split_once(':')?;
            let meta_port: u16 = port.parse().ok()?;
            Some(Node::new(0, host, meta_port, 0, 0))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_persisted_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();
        let first = load_or_create_identifier(data_dir, "127.0.0.1", 9190).unwrap();
        let second = load_or_create_identifier(data_dir, "127.0.0.1", 9190).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_identifier_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();
        std::fs::write(identifier_path(data_dir), b"not-a-number").unwrap();
        assert!(load_or_create_identifier(data_dir, "h", 1).is_err());
    }
}
