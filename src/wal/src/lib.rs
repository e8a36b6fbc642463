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

pub mod errors;

use std::{
    fs::{create_dir_all, File, OpenOptions},
    io::{BufReader, Read, Write},
    path::{Path, PathBuf},
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use snafu::ResultExt;

pub use crate::errors::{Error, Result};

/// Builds the on-disk path for a WAL file covering one `(org_id,
/// stream_type)` rotation, identified by a monotonically increasing `id`.
pub fn build_file_path(
    dir: impl AsRef<Path>,
    org_id: &str,
    stream_type: &str,
    id: u64,
) -> PathBuf {
    dir.as_ref()
        .join(format!("{org_id}_{stream_type}_{id}.wal"))
}

/// Append-only log file. Each entry is framed as
/// `[len: u32][crc32: u32][snappy-compressed payload]` and fsynced on
/// request, so a reader can always tell a truncated tail entry (from a crash
/// mid-write) from a complete one.
pub struct Writer {
    path: PathBuf,
    file: File,
    size: usize,
}

impl Writer {
    pub fn new(
        dir: impl AsRef<Path>,
        org_id: &str,
        stream_type: &str,
        id: u64,
        _max_size: usize,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        create_dir_all(dir).context(errors::UnableToCreateDirSnafu {
            path: dir.to_path_buf(),
        })?;
        let path = build_file_path(dir, org_id, stream_type, id);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(errors::UnableToOpenFileSnafu { path: path.clone() })?;
        let size = file
            .metadata()
            .context(errors::UnableToOpenFileSnafu { path: path.clone() })?
            .len() as usize;
        Ok(Self { path, file, size })
    }

    /// Appends one entry, returning the number of bytes written to disk
    /// (frame header included). Pass `sync = true` to fsync before
    /// returning -- callers on the hot write path typically batch several
    /// entries and only sync the last one.
    pub fn write(&mut self, data: &[u8], sync: bool) -> Result<usize> {
        let compressed = snap::raw::Encoder::new()
            .compress_vec(data)
            .context(errors::UnableToCompressDataSnafu)?;
        let crc = crc32fast::hash(&compressed);
        self.file
            .write_u32::<BigEndian>(compressed.len() as u32)
            .context(errors::UnableToWriteDataSnafu)?;
        self.file
            .write_u32::<BigEndian>(crc)
            .context(errors::UnableToWriteDataSnafu)?;
        self.file
            .write_all(&compressed)
            .context(errors::UnableToWriteDataSnafu)?;
        if sync {
            self.file
                .sync_data()
                .context(errors::UnableToSyncFileSnafu)?;
        }
        let written = 4 + 4 + compressed.len();
        self.size += written;
        Ok(written)
    }

    pub fn close(mut self) -> Result<()> {
        self.file.sync_all().context(errors::UnableToSyncFileSnafu)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

pub struct Reader {
    path: PathBuf,
    file: BufReader<File>,
}

impl Reader {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).context(errors::UnableToOpenFileSnafu { path: path.clone() })?;
        Ok(Self {
            path,
            file: BufReader::new(file),
        })
    }

    /// Reads the next entry, returning `Ok(None)` at a clean end of file.
    /// A length header present with no matching body (a write truncated
    /// mid-entry by a crash) surfaces as `UnableToReadData`, matching the
    /// partial-frame recovery contract the storage layer relies on.
    pub fn read_entry(&mut self) -> Result<Option<Bytes>> {
        let len = match self.file.read_u32::<BigEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(source) => return Err(Error::UnableToReadData { source }),
        };
        let crc = self
            .file
            .read_u32::<BigEndian>()
            .context(errors::UnableToReadDataSnafu)?;
        let mut buf = vec![0u8; len as usize];
        self.file
            .read_exact(&mut buf)
            .context(errors::UnableToReadDataSnafu)?;
        if crc32fast::hash(&buf) != crc {
            log::warn!("wal entry checksum mismatch in {}", self.path.display());
            return Err(Error::ChecksumMismatch {
                path: self.path.clone(),
            });
        }
        let data = snap::raw::Decoder::new()
            .decompress_vec(&buf)
            .context(errors::UnableToDecompressDataSnafu)?;
        Ok(Some(Bytes::from(data)))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_build_file_path() {
        let dir = tempdir().unwrap();
        let path = build_file_path(dir.path(), "org", "stream", 1);
        assert_eq!(path.file_name().unwrap(), "org_stream_1.wal");
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let mut writer = Writer::new(dir.path(), "org", "stream", 1, 1024 * 1024).unwrap();
        writer.write(b"hello", true).unwrap();
        writer.write(b"world", false).unwrap();
        writer.close().unwrap();

        let path = build_file_path(dir.path(), "org", "stream", 1);
        let mut reader = Reader::from_path(path).unwrap();
        assert_eq!(reader.read_entry().unwrap().unwrap(), b"hello");
        assert_eq!(reader.read_entry().unwrap().unwrap(), b"world");
        assert!(reader.read_entry().unwrap().is_none());
    }

    #[test]
    fn test_read_truncated_tail_is_an_error_not_a_panic() {
        let dir = tempdir().unwrap();
        let mut writer = Writer::new(dir.path(), "org", "stream", 2, 1024 * 1024).unwrap();
        writer.write(b"hello", true).unwrap();
        writer.close().unwrap();

        let path = build_file_path(dir.path(), "org", "stream", 2);
        let contents = std::fs::read(&path).unwrap();
        std::fs::write(&path, &contents[..contents.len() - 2]).unwrap();

        let mut reader = Reader::from_path(path).unwrap();
        assert!(reader.read_entry().is_err());
    }
}
