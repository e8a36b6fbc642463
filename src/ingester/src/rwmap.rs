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

use std::{collections::HashMap, hash::Hash};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) struct RwMap<K, V>(RwLock<HashMap<K, V>>);

impl<K, V> RwMap<K, V> {
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.0.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.0.write()
    }
}

impl<K: Eq + Hash, V> Default for RwMap<K, V> {
    fn default() -> Self {
        Self(RwLock::new(HashMap::new()))
    }
}
