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

//! Executes one selected file set into a single target file, with a
//! crash-safe redo log.

use std::{collections::BTreeSet, io, path::Path, sync::Arc};

use snafu::{ResultExt, Snafu};

use crate::compaction::{
    log::{self, CompactionLog},
    resource::{compaction_mods_path_for, TsFileResource, TsFileResourceList},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("compaction I/O error: {source}"))]
    Io { source: io::Error },

    #[snafu(display("compaction log error: {source}"))]
    Log { source: log::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// One (timestamp, opaque-encoded-value) point read back from a source
/// file for a single device. The physical tablet chunk format is an
/// external collaborator's concern; the task only needs a time-ordered
/// stream per device.
pub type Point = (i64, Vec<u8>);

/// Reads the devices and per-device time series out of one source file.
/// A stand-in for the real tablet-chunk reader, which this task treats
/// as opaque.
pub trait MergeReader: Send + Sync {
    fn devices(&self) -> Vec<String>;
    fn read_device(&self, device: &str) -> io::Result<Vec<Point>>;
}

/// Appends points to the target file in device order, each device's
/// points in ascending timestamp order. A stand-in for the real
/// tablet-chunk writer.
pub trait MergeWriter: Send + Sync {
    fn write_point(&mut self, device: &str, timestamp: i64, value: &[u8]) -> io::Result<()>;
    /// Byte offset in the target file after the last write, recorded as
    /// the `deviceFinished` marker.
    fn current_offset(&self) -> u64;
    fn flush(&mut self) -> io::Result<()>;
}

pub struct CompactionTask {
    sources: Vec<Arc<TsFileResource>>,
    target: Arc<TsFileResource>,
    is_seq: bool,
}

impl CompactionTask {
    pub fn new(sources: Vec<Arc<TsFileResource>>, target: Arc<TsFileResource>, is_seq: bool) -> Self {
        Self { sources, target, is_seq }
    }

    pub fn sources(&self) -> &[Arc<TsFileResource>] {
        &self.sources
    }

    pub fn target(&self) -> &Arc<TsFileResource> {
        &self.target
    }

    /// Runs the merge to completion against `list`, using `open_reader` to
    /// obtain a reader for each source path and `writer` as the target's
    /// opaque chunk writer. `log_path` is the per-storage-group
    /// `<sg>.compaction.log`.
    ///
    /// On any error before `mergeEnd` is fsync'd, the target file is
    /// discarded and every source's `merging` flag is cleared, leaving
    /// the sources in the list untouched.
    pub fn execute(
        &self,
        list: &TsFileResourceList,
        log_path: &Path,
        open_reader: impl Fn(&Path) -> io::Result<Box<dyn MergeReader>>,
        mut writer: Box<dyn MergeWriter>,
    ) -> Result<()> {
        for source in &self.sources {
            source.set_merging(true);
        }

        let mut compaction_log = CompactionLog::create(log_path).context(LogSnafu)?;
        if let Err(err) = self.run_merge(&mut compaction_log, &open_reader, writer.as_mut()) {
            self.rollback();
            let _ = compaction_log.delete();
            return Err(err);
        }

        self.commit(list, compaction_log)
    }

    fn run_merge(
        &self,
        compaction_log: &mut CompactionLog,
        open_reader: &impl Fn(&Path) -> io::Result<Box<dyn MergeReader>>,
        writer: &mut dyn MergeWriter,
    ) -> Result<()> {
        for source in &self.sources {
            compaction_log.record_source(&source.path).context(LogSnafu)?;
        }
        compaction_log.record_target(&self.target.path).context(LogSnafu)?;
        compaction_log.record_seq(self.is_seq).context(LogSnafu)?;

        let readers: Vec<Box<dyn MergeReader>> =
            self.sources.iter().map(|s| open_reader(&s.path)).collect::<io::Result<_>>().context(IoSnafu)?;

        let mut devices: BTreeSet<String> = BTreeSet::new();
        for reader in &readers {
            devices.extend(reader.devices());
        }

        for device in &devices {
            let mut points: Vec<Point> = Vec::new();
            for reader in &readers {
                points.extend(reader.read_device(device).context(IoSnafu)?);
            }
            points.sort_by_key(|(ts, _)| *ts);

            for (timestamp, value) in &points {
                writer.write_point(device, *timestamp, value).context(IoSnafu)?;
            }
            writer.flush().context(IoSnafu)?;
            compaction_log.record_device_finished(device, writer.current_offset()).context(LogSnafu)?;
        }

        compaction_log.record_merge_end().context(LogSnafu)
    }

    fn rollback(&self) {
        for source in &self.sources {
            source.set_merging(false);
        }
        let _ = std::fs::remove_file(&self.target.path);
    }

    /// Inserts the target into the list, removes the sources, deletes
    /// source files and their mods files, and removes the compaction log.
    /// Shared with `CompactionRecoverTask` when it resumes a merge whose
    /// log already has `mergeEnd`.
    pub fn commit(&self, list: &TsFileResourceList, compaction_log: CompactionLog) -> Result<()> {
        list.commit_merge(&self.sources, self.target.clone());

        for source in &self.sources {
            let _ = std::fs::remove_file(&source.path);
            let _ = std::fs::remove_file(&source.mods_path);
            rename_queued_deletions(source, &self.target);
        }

        compaction_log.delete().context(IoSnafu)
    }
}

/// Any deletions queued against a source during the merge now apply to
/// the target instead.
fn rename_queued_deletions(source: &TsFileResource, target: &Arc<TsFileResource>) {
    let queued = compaction_mods_path_for(&source.path);
    if queued.exists() {
        let _ = std::fs::rename(&queued, &target.mods_path);
    }
}

/// Truncates a crashed target writer's backing file to `offset - 1`
/// before resuming a merge from the last recorded device boundary.
pub fn truncate_crashed_target(target_path: &Path, offset: u64) -> io::Result<()> {
    let file = std::fs::OpenOptions::new().write(true).open(target_path)?;
    file.set_len(offset.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::{collections::HashMap, path::PathBuf};

    struct FakeReader {
        data: HashMap<String, Vec<Point>>,
    }

    impl MergeReader for FakeReader {
        fn devices(&self) -> Vec<String> {
            let mut d: Vec<String> = self.data.keys().cloned().collect();
            d.sort();
            d
        }

        fn read_device(&self, device: &str) -> io::Result<Vec<Point>> {
            Ok(self.data.get(device).cloned().unwrap_or_default())
        }
    }

    struct FakeWriter {
        offset: Mutex<u64>,
        written: Mutex<Vec<(String, i64, Vec<u8>)>>,
    }

    impl FakeWriter {
        fn new() -> Self {
            Self { offset: Mutex::new(0), written: Mutex::new(Vec::new()) }
        }
    }

    impl MergeWriter for FakeWriter {
        fn write_point(&mut self, device: &str, timestamp: i64, value: &[u8]) -> io::Result<()> {
            *self.offset.lock() += value.len() as u64;
            self.written.lock().push((device.to_string(), timestamp, value.to_vec()));
            Ok(())
        }

        fn current_offset(&self) -> u64 {
            *self.offset.lock()
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn resource(dir: &Path, name: &str, byte_size: u64) -> Arc<TsFileResource> {
        let r = Arc::new(TsFileResource::new(dir.join(name), byte_size));
        std::fs::write(&r.path, b"stub").unwrap();
        r.close();
        r
    }

    #[test]
    fn test_successful_merge_commits_and_cleans_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = resource(dir.path(), "a.tsfile", 30);
        let b = resource(dir.path(), "b.tsfile", 30);
        let target = Arc::new(TsFileResource::new(dir.path().join("merged.tsfile"), 60));
        std::fs::write(&target.path, b"stub").unwrap();

        let list = TsFileResourceList::new();
        list.push_back(a.clone());
        list.push_back(b.clone());

        let task = CompactionTask::new(vec![a.clone(), b.clone()], target.clone(), true);
        let log_path = dir.path().join("root.sg1.compaction.log");

        let readers: HashMap<PathBuf, Vec<Point>> = [
            (a.path.clone(), vec![(2, b"v2".to_vec())]),
            (b.path.clone(), vec![(1, b"v1".to_vec())]),
        ]
        .into_iter()
        .collect();

        let writer = Box::new(FakeWriter::new());
        let result = task.execute(
            &list,
            &log_path,
            |path| {
                let points = readers.get(path).cloned().unwrap_or_default();
                let mut data = HashMap::new();
                data.insert("root.sg1.d1".to_string(), points);
                Ok(Box::new(FakeReader { data }) as Box<dyn MergeReader>)
            },
            writer,
        );

        assert!(result.is_ok());
        assert!(!log_path.exists());
        assert!(!a.path.exists());
        assert!(!b.path.exists());
        let snapshot = list.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].path, target.path);
    }

    #[test]
    fn test_reader_failure_rolls_back_and_preserves_sources() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = resource(dir.path(), "a.tsfile", 30);
        let target = Arc::new(TsFileResource::new(dir.path().join("merged.tsfile"), 30));
        std::fs::write(&target.path, b"stub").unwrap();

        let list = TsFileResourceList::new();
        list.push_back(a.clone());

        let task = CompactionTask::new(vec![a.clone()], target.clone(), true);
        let log_path = dir.path().join("root.sg1.compaction.log");

        let writer = Box::new(FakeWriter::new());
        let result = task.execute(
            &list,
            &log_path,
            |_path| Err(io::Error::new(io::ErrorKind::Other, "disk error")),
            writer,
        );

        assert!(result.is_err());
        assert!(!target.path.exists());
        assert!(!a.is_merging());
        assert_eq!(list.len(), 1);
        assert!(a.path.exists());
    }
}
