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

use crate::{
    modules::{
        backing_store::{FileBackingStore, MemoryBackingStore},
        memory_provider::{MMapMemoryProvider, MemoryProviderModule},
    },
    OOCConfig, OOCHeap,
};

mod fatal;
mod persistency;

pub(crate) fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Config with the smallest possible pages and `cache_slots` slots
pub(crate) fn get_test_config(test_name: &str, cache_slots: usize) -> OOCConfig {
    let page_size = MMapMemoryProvider::min_size();
    OOCConfig {
        cache_size: page_size * cache_slots,
        page_size,
        cache_file: format!("/tmp/{}.tmp", test_name),
        header_file: format!("/tmp/{}.tmp.header", test_name),
        ..Default::default()
    }
}

pub(crate) fn get_test_heap(cache_slots: usize) -> OOCHeap<MemoryBackingStore> {
    init_test_logger();

    OOCHeap::init(
        get_test_config("unused", cache_slots),
        MemoryBackingStore::new(),
    )
    .unwrap()
}

pub(crate) fn get_file_test_heap(test_name: &str, cache_slots: usize) -> OOCHeap<FileBackingStore> {
    init_test_logger();

    let config = get_test_config(test_name, cache_slots);
    let store = config.file_backing_store().unwrap();
    OOCHeap::init(config, store).unwrap()
}
