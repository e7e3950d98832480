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

use std::io::ErrorKind;

use crate::{
    modules::{
        backing_store::{BackingStoreModule, MemoryBackingStore, PageFileHeader},
        memory_provider::{MMapMemoryProvider, MemoryProviderModule},
    },
    Address, OOCHeap, OOCPtr,
};

use super::{get_test_config, get_test_heap};

#[test]
#[should_panic(expected = "does not fit into a page")]
fn test_allocation_bigger_than_page() {
    let heap = get_test_heap(2);
    let _ = heap.allocate_raw(heap.page_size() + 1, 1);
}

#[test]
#[should_panic(expected = "without a matching lock")]
fn test_unlock_without_lock() {
    let heap = get_test_heap(2);
    let ptr = heap.allocate(5u32).unwrap();
    heap.unlock_raw(ptr.address());
}

#[test]
#[should_panic(expected = "page size mismatch")]
fn test_reopen_with_different_page_size() {
    let heap = get_test_heap(2);
    heap.allocate(5u32).unwrap();
    let store = heap.destruct().unwrap();

    let mut config = get_test_config("unused", 2);
    config.page_size = MMapMemoryProvider::min_size() * 2;
    config.cache_size = config.page_size * 2;
    let _ = OOCHeap::load(config, store);
}

#[test]
#[should_panic(expected = "cache slots are pinned")]
fn test_too_many_locked_pages() {
    let heap = get_test_heap(2);
    let page_size = heap.page_size();
    let pages: Vec<_> = (0..3)
        .map(|_| heap.allocate_array::<u8>(page_size, 0).unwrap())
        .collect();

    let _first = pages[0].lock().unwrap();
    let _second = pages[1].lock().unwrap();
    let _ = pages[2].lock();
}

#[test]
#[should_panic(expected = "is already locked")]
fn test_double_lock_of_object() {
    let heap = get_test_heap(2);
    let ptr = heap.allocate(5u32).unwrap();
    let alias = ptr;

    let _guard = ptr.lock().unwrap();
    let _ = alias.lock();
}

#[test]
#[should_panic(expected = "lock of a null pointer")]
fn test_lock_null() {
    let heap = get_test_heap(2);
    let mut ptr = heap.allocate(5u32).unwrap();
    ptr.set_null();
    assert!(ptr.is_null());

    let _ = ptr.lock();
}

#[test]
fn test_null_pointer() {
    let heap = get_test_heap(2);
    let ptr = OOCPtr::<u64, _>::null(&heap);
    assert!(ptr.is_null());
    heap.free(ptr.address());
}

#[test]
fn test_load_without_header() {
    let res = OOCHeap::load(get_test_config("unused", 2), MemoryBackingStore::new());
    assert_eq!(res.err().map(|err| err.kind()), Some(ErrorKind::NotFound));
}

#[test]
fn test_load_with_usage_outside_of_page() {
    let config = get_test_config("unused", 2);
    let mut store = MemoryBackingStore::new();
    store.append_page(&vec![0u8; config.page_size]).unwrap();
    store
        .write_header(&PageFileHeader::new(
            config.page_size,
            1,
            config.cache_size,
            config.page_size + 1,
        ))
        .unwrap();

    let res = OOCHeap::load(config, store);
    assert_eq!(res.err().map(|err| err.kind()), Some(ErrorKind::InvalidData));
}

#[test]
fn test_free_of_allocated_address() {
    let heap = get_test_heap(2);
    let ptr = heap.allocate(5u32).unwrap();
    heap.free(ptr.address());
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "which was never allocated")]
fn test_free_of_frontier() {
    let heap = get_test_heap(2);
    heap.allocate(5u32).unwrap();

    // first byte behind the only object
    heap.free(Address(4));
}
