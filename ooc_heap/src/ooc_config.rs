/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use crate::modules::memory_provider::{MMapMemoryProvider, MemoryProviderModule};

/// Configuration of an [`OOCHeap`](crate::OOCHeap)
#[derive(Debug, Clone)]
pub struct OOCConfig {
    /// Size of the in-RAM cache in bytes, has to be a multiple of `page_size`
    pub cache_size: usize,

    /// Size of a single page in bytes, has to be a multiple of the system page size
    pub page_size: usize,

    /// Swap file used by [`OOCConfig::file_backing_store`]
    pub cache_file: String,

    /// Header file used by [`OOCConfig::file_backing_store`]
    pub header_file: String,

    /// Page timestamps are renumbered once the access timer reaches this value
    pub max_page_age: u32,
}

impl Default for OOCConfig {
    fn default() -> Self {
        let cache_file = "temp_mem".to_string();
        Self {
            cache_size: 256 * 1024,
            page_size: 4096,
            header_file: format!("{}.header", cache_file),
            cache_file,
            max_page_age: u32::MAX,
        }
    }
}

impl OOCConfig {
    /// Number of pages that fit into the cache at the same time
    pub fn cache_slots(&self) -> usize {
        self.cache_size / self.page_size
    }

    /// Checks the configuration and panics if it can not be used.
    pub(crate) fn validate(&self) {
        let system_page_size = MMapMemoryProvider::min_size();
        assert!(
            self.page_size > 0 && self.page_size % system_page_size == 0,
            "page size {} has to be a multiple of the system page size {}",
            self.page_size,
            system_page_size
        );
        assert!(
            self.cache_size >= self.page_size && self.cache_size % self.page_size == 0,
            "cache size {} has to be a non-zero multiple of the page size {}",
            self.cache_size,
            self.page_size
        );
        assert!(self.max_page_age > 0, "max page age has to be greater than zero");
    }

    /// Opens the backing store described by `cache_file` and `header_file`
    pub fn file_backing_store(
        &self,
    ) -> std::io::Result<crate::modules::backing_store::FileBackingStore> {
        crate::modules::backing_store::FileBackingStore::new(
            self.cache_file.clone(),
            self.header_file.clone(),
            self.page_size,
        )
    }
}
