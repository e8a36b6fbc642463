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

//! Raft log entries and the follower state machine's role.

use serde::{Deserialize, Serialize};

use crate::meta::{plan::Plan, startup::StartUpStatus};
use config::meta::cluster::Node;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Character {
    Follower,
    Candidate,
    Leader,
    Elector,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LogPayload {
    AddNode(Node, StartUpStatus),
    RemoveNode(Node),
    Plan(Plan),
}

/// A term-indexed record of one of AddNode, RemoveNode, or a deferred user
/// plan.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RaftLogEntry {
    pub term: u64,
    pub index: u64,
    pub payload: LogPayload,
}

impl RaftLogEntry {
    pub fn new(term: u64, index: u64, payload: LogPayload) -> Self {
        Self { term, index, payload }
    }
}
