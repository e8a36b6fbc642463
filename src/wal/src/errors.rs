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

use std::{io, path::PathBuf};

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("unable to create wal dir {}: {}", path.display(), source))]
    UnableToCreateDir { source: io::Error, path: PathBuf },

    #[snafu(display("unable to open wal file {}: {}", path.display(), source))]
    UnableToOpenFile { source: io::Error, path: PathBuf },

    #[snafu(display("unable to write wal entry: {}", source))]
    UnableToWriteData { source: io::Error },

    #[snafu(display("unable to sync wal file: {}", source))]
    UnableToSyncFile { source: io::Error },

    #[snafu(display("unable to read wal entry: {}", source))]
    UnableToReadData { source: io::Error },

    #[snafu(display("unable to compress wal entry: {}", source))]
    UnableToCompressData { source: snap::Error },

    #[snafu(display("unable to decompress wal entry: {}", source))]
    UnableToDecompressData { source: snap::Error },

    #[snafu(display("wal entry checksum mismatch at {}", path.display()))]
    ChecksumMismatch { path: PathBuf },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
