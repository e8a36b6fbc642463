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

//! An append-only per-storage-group compaction log: source paths, target
//! path, sequence flag, per-device offset markers, and a terminal `end`
//! marker.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("unable to open compaction log {}: {}", path.display(), source))]
    UnableToOpenFile { source: io::Error, path: PathBuf },

    #[snafu(display("unable to write compaction log record: {}", source))]
    UnableToWriteData { source: io::Error },

    #[snafu(display("unable to sync compaction log: {}", source))]
    UnableToSyncFile { source: io::Error },

    #[snafu(display("unable to read compaction log {}: {}", path.display(), source))]
    UnableToReadData { source: io::Error, path: PathBuf },

    #[snafu(display("malformed compaction log record: {line}"))]
    MalformedRecord { line: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A device-offset marker recorded after a device finishes merging into
/// the target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOffset {
    pub device: String,
    pub offset: u64,
}

/// The parsed contents of a compaction log, as read back at recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionLogContents {
    pub sources: Vec<PathBuf>,
    pub target: Option<PathBuf>,
    pub is_seq: bool,
    pub device_offsets: Vec<DeviceOffset>,
    pub merge_end: bool,
}

impl CompactionLogContents {
    pub fn last_offset(&self) -> Option<u64> {
        self.device_offsets.last().map(|d| d.offset)
    }

    pub fn last_device(&self) -> Option<&str> {
        self.device_offsets.last().map(|d| d.device.as_str())
    }
}

/// A live, append-only writer over a `<sg>.compaction.log` file. Every
/// record is followed by an fsync so a crash never leaves a torn record.
pub struct CompactionLog {
    path: PathBuf,
    file: File,
}

impl CompactionLog {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(UnableToOpenFileSnafu { path: path.clone() })?;
        Ok(Self { path, file })
    }

    /// Reopens an existing log for appending, used when recovery resumes
    /// a merge in place.
    pub fn reopen(path: impl Into<PathBuf>) -> Result<Self> {
        Self::create(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_source(&mut self, source: &Path) -> Result<()> {
        self.write_line(&format!("source {}", source.display()))
    }

    pub fn record_target(&mut self, target: &Path) -> Result<()> {
        self.write_line(&format!("target {}", target.display()))
    }

    pub fn record_seq(&mut self, is_seq: bool) -> Result<()> {
        self.write_line(&format!("seq {is_seq}"))
    }

    pub fn record_device_finished(&mut self, device: &str, target_offset: u64) -> Result<()> {
        self.write_line(&format!("device {device}"))?;
        self.write_line(&format!("offset {target_offset}"))
    }

    pub fn record_merge_end(&mut self) -> Result<()> {
        self.write_line("end")
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.file, "{line}").context(UnableToWriteDataSnafu)?;
        self.file.sync_all().context(UnableToSyncFileSnafu)?;
        Ok(())
    }

    /// Deletes this compaction log.
    pub fn delete(self) -> io::Result<()> {
        std::fs::remove_file(&self.path)
    }
}

/// Parses an on-disk compaction log without holding it open for writing,
/// used by `CompactionRecoverTask`.
pub fn parse(path: &Path) -> Result<CompactionLogContents> {
    let file = File::open(path).context(UnableToReadDataSnafu { path: path.to_path_buf() })?;
    let reader = BufReader::new(file);

    let mut sources = Vec::new();
    let mut target = None;
    let mut is_seq = false;
    let mut device_offsets: Vec<DeviceOffset> = Vec::new();
    let mut merge_end = false;
    let mut pending_device: Option<String> = None;

    for line in reader.lines() {
        let line = line.context(UnableToReadDataSnafu { path: path.to_path_buf() })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, ' ');
        let keyword = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default();
        match keyword {
            "source" => sources.push(PathBuf::from(rest)),
            "target" => target = Some(PathBuf::from(rest)),
            "seq" => is_seq = rest == "true",
            "device" => pending_device = Some(rest.to_string()),
            "offset" => {
                let offset: u64 = rest
                    .parse()
                    .map_err(|_| Error::MalformedRecord { line: line.to_string() })?;
                let device = pending_device.take().ok_or_else(|| Error::MalformedRecord {
                    line: line.to_string(),
                })?;
                device_offsets.push(DeviceOffset { device, offset });
            }
            "end" => merge_end = true,
            _ => return Err(Error::MalformedRecord { line: line.to_string() }),
        }
    }

    Ok(CompactionLogContents { sources, target, is_seq, device_offsets, merge_end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_without_merge_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_path = dir.path().join("root.sg1.compaction.log");

        let mut log = CompactionLog::create(&log_path).expect("create");
        log.record_source(Path::new("/data/a.tsfile")).expect("source");
        log.record_source(Path::new("/data/b.tsfile")).expect("source");
        log.record_target(Path::new("/data/merged.tsfile")).expect("target");
        log.record_seq(true).expect("seq");
        log.record_device_finished("root.sg1.d1", 4096).expect("device");

        let contents = parse(&log_path).expect("parse");
        assert_eq!(contents.sources, vec![PathBuf::from("/data/a.tsfile"), PathBuf::from("/data/b.tsfile")]);
        assert_eq!(contents.target, Some(PathBuf::from("/data/merged.tsfile")));
        assert!(contents.is_seq);
        assert_eq!(contents.last_device(), Some("root.sg1.d1"));
        assert_eq!(contents.last_offset(), Some(4096));
        assert!(!contents.merge_end);
    }

    #[test]
    fn test_merge_end_recorded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_path = dir.path().join("root.sg1.compaction.log");

        let mut log = CompactionLog::create(&log_path).expect("create");
        log.record_source(Path::new("/data/a.tsfile")).expect("source");
        log.record_target(Path::new("/data/merged.tsfile")).expect("target");
        log.record_merge_end().expect("end");

        let contents = parse(&log_path).expect("parse");
        assert!(contents.merge_end);
    }
}
