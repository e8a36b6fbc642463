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

//! The binary crate's own error type, aggregating every workspace crate's
//! `Error` plus the node-level variants that do not belong to any single
//! submodule.

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("configuration error: {cause}"))]
    Config { cause: anyhow::Error },

    #[snafu(display("node identity error: {source}"))]
    #[snafu(context(false))]
    Node { source: crate::meta::node::Error },

    #[snafu(display("meta membership error: {source}"))]
    #[snafu(context(false))]
    GroupMember { source: crate::meta::group_member::Error },

    #[snafu(display("compaction task error: {source}"))]
    #[snafu(context(false))]
    CompactionTask { source: crate::compaction::task::Error },

    #[snafu(display("compaction recovery error: {source}"))]
    #[snafu(context(false))]
    CompactionRecover { source: crate::compaction::recover::Error },

    #[snafu(display("compaction log error: {source}"))]
    #[snafu(context(false))]
    CompactionLog { source: crate::compaction::log::Error },

    #[snafu(display("ingester error: {cause}"))]
    Ingester { cause: anyhow::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
