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

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use arrow::record_batch::RecordBatch;
use arrow_schema::Schema;
use once_cell::sync::Lazy;
use tokio::sync::RwLock;

use crate::{errors::Result, memtable::MemTable, writer::WriterKey};

/// Memtables that have been rotated out of the active `Writer` but not yet
/// flushed to parquet, keyed by the WAL file they were sealed against. A
/// read has to check here too -- between rotation and flush, the data only
/// lives in memory.
pub(crate) static IMMUTABLES: Lazy<RwLock<HashMap<PathBuf, Immutable>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

pub(crate) struct Immutable {
    key: WriterKey,
    memtable: MemTable,
}

impl Immutable {
    pub(crate) fn new(key: WriterKey, memtable: MemTable) -> Self {
        Self { key, memtable }
    }
}

/// Flushes every immutable memtable queued since the last tick to parquet,
/// then drops its now-redundant WAL file. Returns `true` if anything was
/// flushed.
pub async fn persist() -> Result<bool> {
    let queued = {
        let mut w = IMMUTABLES.write().await;
        std::mem::take(&mut *w)
    };
    if queued.is_empty() {
        return Ok(false);
    }
    for (wal_path, immutable) in queued {
        immutable
            .memtable
            .persist(&immutable.key.org_id, &immutable.key.stream_type)
            .await?;
        if let Err(e) = std::fs::remove_file(&wal_path) {
            log::warn!("failed to remove flushed wal file {wal_path:?}: {e}");
        }
    }
    Ok(true)
}

/// Reads matching record batches still held only in a flushing (immutable)
/// memtable -- the window between a WAL rotation and its parquet landing on
/// disk, during which the data is invisible to a plain directory scan.
pub async fn read_from_immutable(
    stream_name: &str,
    time_range: Option<(i64, i64)>,
) -> Result<Vec<(Arc<Schema>, Vec<RecordBatch>)>> {
    let r = IMMUTABLES.read().await;
    let mut out = Vec::new();
    for immutable in r.values() {
        out.extend(immutable.memtable.read(stream_name, time_range).await?);
    }
    Ok(out)
}
