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

use std::time::{SystemTime, UNIX_EPOCH};

use crate::utils::hash::{murmur3, Sum64};

pub fn init() {}

/// Derives a node identifier from host+port+wall-clock at first boot.
/// The result is folded into 31 bits so it is always a non-negative
/// `i32`, matching the on-disk `node_identifier` format (a decimal
/// 32-bit id).
pub fn generate_identifier(host: &str, meta_port: u16) -> i32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let key = format!("{host}:{meta_port}:{nanos}");
    let hash = murmur3::new().sum64(&key);
    (hash & 0x7fff_ffff) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_identifier_nonnegative() {
        let id = generate_identifier("127.0.0.1", 9000);
        assert!(id >= 0);
    }

    #[test]
    fn test_generate_identifier_varies_with_input() {
        let a = generate_identifier("host-a", 9000);
        let b = generate_identifier("host-b", 9000);
        // Extremely unlikely to collide for distinct inputs with a
        // wall-clock nanosecond component folded in.
        assert_ne!(a, b);
    }
}
