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

//! Command-line surface: `run` starts a node, `show-partitions` is a
//! read-only operational helper.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tsnode", about = "A clustered time-series database node")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the node: load config, validate it, join or build the cluster.
    Run,
    /// Print the locally held partition table, for operational debugging.
    ShowPartitions,
}

pub fn parse() -> Cli {
    Cli::parse()
}
