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

/// Time partition index for a microsecond timestamp:
/// `floor(timestamp / partitionInterval)`. `partition_interval_secs` is
/// given in seconds, timestamps in microseconds, matching the rest of the
/// ingestion path's unit convention.
#[inline(always)]
pub fn time_partition(timestamp_micros: i64, partition_interval_secs: i64) -> i64 {
    let interval_micros = partition_interval_secs.max(1) * 1_000_000;
    timestamp_micros.div_euclid(interval_micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_partition_basic() {
        // 3600s partitions, timestamp at exactly 2 intervals in.
        let ts = 3600 * 2 * 1_000_000;
        assert_eq!(time_partition(ts, 3600), 2);
    }

    #[test]
    fn test_time_partition_negative() {
        assert_eq!(time_partition(-1, 3600), -1);
    }
}
