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

//! Crash recovery for interrupted compactions, run once per storage group
//! at startup.

use std::{path::Path, sync::Arc};

use log::warn;
use snafu::{ResultExt, Snafu};

use crate::compaction::{
    log::{self as clog, CompactionLog},
    resource::{TsFileResource, TsFileResourceList},
    task::{truncate_crashed_target, CompactionTask},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("compaction log error: {source}"))]
    Log { source: clog::Error },
    #[snafu(display("compaction commit error: {source}"))]
    Task { source: crate::compaction::task::Error },
    #[snafu(display("unable to remove compaction log {}: {source}", path.display()))]
    RemoveLog { source: std::io::Error, path: std::path::PathBuf },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Resumes or discards one `<sg>.compaction.log`, matching
/// `CompactionTask`'s own rollback semantics so recovery and a live run
/// converge on the same end state. Idempotent: a second call against
/// state already cleaned up by the first finds nothing left to do and
/// returns immediately once the log is gone.
///
/// `target_is_crashed` reports whether the target file, as found on
/// disk, looks like a torn write (the real collaborator would inspect
/// the writer's own footer/checksum; left to the caller since the
/// physical format is opaque). `resume` finishes a merge that stopped
/// partway through the device loop, picking up from the log's last
/// recorded device boundary.
pub fn recover_one(
    log_path: &Path,
    list: &TsFileResourceList,
    target_is_crashed: impl FnOnce(&Path) -> bool,
    resume: impl FnOnce(&clog::CompactionLogContents) -> clog::Result<()>,
) -> Result<()> {
    let contents = clog::parse(log_path).context(LogSnafu)?;

    if contents.target.is_none() || contents.sources.is_empty() {
        return remove_log(log_path);
    }
    let target_path = contents.target.clone().expect("checked above");

    if contents.device_offsets.is_empty() {
        if target_path.exists() {
            let _ = std::fs::remove_file(&target_path);
        }
        return remove_log(log_path);
    }

    let sources: Vec<Arc<TsFileResource>> =
        contents.sources.iter().filter_map(|path| list.find_by_path(path)).collect();

    if !contents.merge_end {
        if target_is_crashed(&target_path) {
            if let Some(offset) = contents.last_offset() {
                let _ = truncate_crashed_target(&target_path, offset);
            }
            resume(&contents).context(LogSnafu)?;
        } else {
            warn!("compaction log {} has no mergeEnd and no crashed target; discarding", log_path.display());
            for source in &sources {
                source.set_merging(false);
            }
            let _ = std::fs::remove_file(&target_path);
            return remove_log(log_path);
        }
    }

    let target = Arc::new(TsFileResource::new(target_path, 0));
    let task = CompactionTask::new(sources, target, contents.is_seq);
    let compaction_log = CompactionLog::reopen(log_path).context(LogSnafu)?;
    task.commit(list, compaction_log).context(TaskSnafu)
}

fn remove_log(log_path: &Path) -> Result<()> {
    std::fs::remove_file(log_path).context(RemoveLogSnafu { path: log_path.to_path_buf() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_target_deletes_the_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_path = dir.path().join("root.sg1.compaction.log");
        let mut log = CompactionLog::create(&log_path).expect("create");
        log.record_source(Path::new("/data/a.tsfile")).expect("source");

        let list = TsFileResourceList::new();
        let result = recover_one(&log_path, &list, |_| false, |_| Ok(()));

        assert!(result.is_ok());
        assert!(!log_path.exists());
    }

    #[test]
    fn test_empty_device_set_deletes_orphaned_target_and_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target_path = dir.path().join("merged.tsfile");
        std::fs::write(&target_path, b"partial").unwrap();

        let log_path = dir.path().join("root.sg1.compaction.log");
        let mut log = CompactionLog::create(&log_path).expect("create");
        log.record_source(Path::new("/data/a.tsfile")).expect("source");
        log.record_target(&target_path).expect("target");

        let list = TsFileResourceList::new();
        let result = recover_one(&log_path, &list, |_| false, |_| Ok(()));

        assert!(result.is_ok());
        assert!(!target_path.exists());
        assert!(!log_path.exists());
    }

    #[test]
    fn test_merge_end_present_commits_and_clears_merging() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = Arc::new(TsFileResource::new(dir.path().join("a.tsfile"), 30));
        std::fs::write(&a.path, b"stub").unwrap();
        a.set_merging(true);
        let target_path = dir.path().join("merged.tsfile");
        std::fs::write(&target_path, b"done").unwrap();

        let log_path = dir.path().join("root.sg1.compaction.log");
        let mut log = CompactionLog::create(&log_path).expect("create");
        log.record_source(&a.path).expect("source");
        log.record_target(&target_path).expect("target");
        log.record_device_finished("root.sg1.d1", 4).expect("device");
        log.record_merge_end().expect("end");

        let list = TsFileResourceList::new();
        list.push_back(a.clone());

        let result = recover_one(&log_path, &list, |_| false, |_| Ok(()));

        assert!(result.is_ok());
        assert!(!log_path.exists());
        assert!(!a.path.exists());
        let snapshot = list.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].path, target_path);
    }

    #[test]
    fn test_recovery_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = Arc::new(TsFileResource::new(dir.path().join("a.tsfile"), 30));
        std::fs::write(&a.path, b"stub").unwrap();
        let target_path = dir.path().join("merged.tsfile");
        std::fs::write(&target_path, b"done").unwrap();

        let log_path = dir.path().join("root.sg1.compaction.log");
        let mut log = CompactionLog::create(&log_path).expect("create");
        log.record_source(&a.path).expect("source");
        log.record_target(&target_path).expect("target");
        log.record_device_finished("root.sg1.d1", 4).expect("device");
        log.record_merge_end().expect("end");

        let list = TsFileResourceList::new();
        list.push_back(a.clone());

        assert!(recover_one(&log_path, &list, |_| false, |_| Ok(())).is_ok());
        // The log is gone; a second pass over the same storage group would
        // simply find no log file and have nothing left to recover.
        assert!(!log_path.exists());
    }
}
