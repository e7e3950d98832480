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

use rand::{rngs::SmallRng, RngCore, SeedableRng};
use std::{array, mem};

use crate::{modules::backing_store::BackingStoreModule, Address, OOCArrayPtr, OOCHeap, OOCPtr};

use super::{get_file_test_heap, get_test_config, get_test_heap};

#[test]
fn test_heap_persistency() {
    type TestType = [u32; 25];

    fn rand_data(rand: &mut SmallRng) -> TestType {
        array::from_fn(|_| rand.next_u32())
    }

    let heap = get_test_heap(2);
    const SEED: u64 = 5446535461589659585;
    const OBJECT_COUNT: usize = 200;

    let mut rand = SmallRng::seed_from_u64(SEED);

    let mut objects = vec![];
    let mut check_states = vec![];

    macro_rules! allocate {
        () => {
            let data = rand_data(&mut rand);

            objects.push(heap.allocate(data).unwrap());
            check_states.push(data);
        };
    }

    macro_rules! single_test {
        () => {
            let i = rand.next_u32() as usize % objects.len();
            let test_type = rand.next_u32() % 10;
            if test_type == 0 {
                // lock and change data
                let mut guard = objects[i].lock().unwrap();
                assert_eq!(*guard, check_states[i], "Failed assertion for test_type {}", test_type);

                let data = rand_data(&mut rand);
                *guard = data;
                check_states[i] = data;
            } else if test_type < 2 {
                // lock and only change a single element
                let mut guard = objects[i].lock().unwrap();
                assert_eq!(*guard, check_states[i], "Failed assertion for test_type {}", test_type);

                guard[0] = guard[0].wrapping_add(1);
                check_states[i][0] = guard[0];
            } else {
                // lock and read
                let guard = objects[i].lock().unwrap();
                assert_eq!(*guard, check_states[i], "Failed assertion for test_type {}", test_type);
            }
        };
    }

    // start allocating some first objects
    for _ in 0..OBJECT_COUNT / 2 {
        allocate!();
    }

    for _ in 0..5_000 {
        single_test!();
    }

    // keep one page pinned for a while
    let pinned_data = rand_data(&mut rand);
    let pinned = heap.allocate([0u32; 25]).unwrap();
    let mut pinned_guard = pinned.lock().unwrap();
    *pinned_guard = pinned_data;

    for _ in 0..5_000 {
        single_test!();
    }
    assert!(heap.stats().pinned_pages >= 1);
    drop(pinned_guard);

    // start allocating last objects
    for _ in 0..(OBJECT_COUNT - objects.len()) {
        allocate!();
    }

    for _ in 0..20_000 {
        single_test!();
    }

    let stats = heap.stats();
    assert!(stats.total_pages > stats.cache_slots);
    assert!(stats.page_faults > stats.total_pages as u64);
    assert_eq!(stats.pinned_pages, 0);

    let addresses: Vec<Address> = objects.iter().map(|obj| obj.address()).collect();
    let pinned_address = pinned.address();
    drop(objects);

    // reopen and compare everything
    let store = heap.destruct().unwrap();
    let heap = OOCHeap::load(get_test_config("unused", 2), store).unwrap();
    assert_eq!(heap.stats().total_pages, stats.total_pages);
    assert_eq!(heap.stats().usage, stats.usage);

    for (address, data) in addresses.iter().zip(check_states.iter()) {
        let ptr = unsafe { OOCPtr::<TestType, _>::from_address(&heap, *address) };
        assert_eq!(*ptr.lock().unwrap(), *data, "object at {} differs", address);
    }

    let pinned = unsafe { OOCPtr::<TestType, _>::from_address(&heap, pinned_address) };
    assert_eq!(*pinned.lock().unwrap(), pinned_data);
}

#[test]
fn test_file_heap_reopen() {
    const NAME: &str = "test_file_heap_reopen";

    let heap = get_file_test_heap(NAME, 2);
    let counter = heap.allocate(0xdead_beef_u32).unwrap().address();
    let array = heap.allocate_array(300, 7u16).unwrap().address();
    let usage = heap.stats().usage;
    drop(heap.destruct().unwrap());

    let config = get_test_config(NAME, 2);
    let store = config.file_backing_store().unwrap();
    let heap = OOCHeap::load(config, store).unwrap();
    assert_eq!(heap.stats().usage, usage);

    let counter_ptr = unsafe { OOCPtr::<u32, _>::from_address(&heap, counter) };
    assert_eq!(*counter_ptr.lock().unwrap(), 0xdead_beef);

    let array_ptr = unsafe { OOCArrayPtr::<u16, _>::from_address(&heap, array, 300) };
    assert!(array_ptr.lock().unwrap().iter().all(|value| *value == 7));

    // allocation continues behind the old objects
    let next = heap.allocate(1u8).unwrap().address();
    assert!(next > array);
    assert_eq!(next.0, usage);
}

#[test]
fn test_drop_persists_heap() {
    const NAME: &str = "test_drop_persists_heap";

    let address = {
        let heap = get_file_test_heap(NAME, 1);
        let ptr = heap.allocate(0u64).unwrap();
        *ptr.lock().unwrap() = 42;
        ptr.address()
    };

    let config = get_test_config(NAME, 1);
    let store = config.file_backing_store().unwrap();
    let heap = OOCHeap::load(config, store).unwrap();

    let ptr = unsafe { OOCPtr::<u64, _>::from_address(&heap, address) };
    assert_eq!(*ptr.lock().unwrap(), 42);
}

#[test]
fn test_pages_behind_last_save_are_dropped() {
    const NAME: &str = "test_pages_behind_last_save_are_dropped";

    let heap = get_file_test_heap(NAME, 2);
    let page_size = heap.page_size();
    let saved = heap.allocate_array(page_size, 1u8).unwrap().address();
    heap.allocate_array(page_size, 2u8).unwrap();
    heap.flush().unwrap();

    // never saved, the heap vanishes without writing its header again
    heap.allocate_array(page_size, 3u8).unwrap();
    heap.allocate_array(page_size, 4u8).unwrap();
    assert_eq!(heap.stats().total_pages, 4);

    // evicts the third page, so its content reaches the store
    unsafe {
        heap.lock_raw(saved).unwrap();
    }
    heap.unlock_raw(saved);
    assert!(!heap.is_resident(Address(2 * page_size)));
    mem::forget(heap);

    let config = get_test_config(NAME, 2);
    let store = config.file_backing_store().unwrap();
    assert_eq!(store.page_count(), 4);

    let heap = OOCHeap::load(config, store).unwrap();
    assert_eq!(heap.stats().total_pages, 2);

    // the next page is a fresh one, not the stale third page
    let address = heap.allocate_raw(page_size, 1).unwrap();
    assert_eq!(address, Address(2 * page_size));
    let array = unsafe { OOCArrayPtr::<u8, _>::from_address(&heap, address, page_size) };
    assert!(array.lock().unwrap().iter().all(|value| *value == 0));

    let saved = unsafe { OOCArrayPtr::<u8, _>::from_address(&heap, saved, page_size) };
    assert!(saved.lock().unwrap().iter().all(|value| *value == 1));
}
