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

use env_logger::{Builder, Env};
use ooc_heap::{modules::backing_store::FileBackingStore, Address, OOCConfig, OOCHeap, OOCPtr};

#[derive(Clone, Copy)]
struct Counter {
    val: u32,
}

impl Counter {
    fn new(initial_value: u32) -> Self { Self { val: initial_value } }
    fn increase(&mut self) { self.val += 1; }
    fn increase_by(&mut self, inc: u32) { self.val += inc; }
    fn get_val(&self) -> u32 { self.val }
}

/// The counter is the first object ever allocated
const COUNTER_ADDRESS: Address = Address(0);

fn open_heap(config: OOCConfig) -> std::io::Result<(OOCHeap<FileBackingStore>, bool)> {
    let store = config.file_backing_store()?;
    match OOCHeap::load(config.clone(), store) {
        Ok(heap) => Ok((heap, false)),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            let store = config.file_backing_store()?;
            Ok((OOCHeap::init(config, store)?, true))
        }
        Err(err) => Err(err),
    }
}

fn main() -> std::io::Result<()> {
    Builder::from_env(Env::default())
        .filter_level(log::LevelFilter::Warn)
        .format_module_path(false)
        .init();

    let config = OOCConfig {
        cache_file: "counter.data".to_string(),
        header_file: "counter.data.header".to_string(),
        ..Default::default()
    };

    let (heap, created) = open_heap(config)?;

    {
        let counter = if created {
            // allocate new counter
            let obj = heap.allocate(Counter::new(0))?;
            assert_eq!(obj.address(), COUNTER_ADDRESS);
            obj
        } else {
            unsafe { OOCPtr::<Counter, _>::from_address(&heap, COUNTER_ADDRESS) }
        };

        {
            // print current value
            let obj_ref = counter.lock()?;
            println!("counter: {}", obj_ref.get_val());
        } // implicit unlock: page could be evicted now

        {
            // increase the value by 101
            let mut obj_ref = counter.lock()?;
            obj_ref.increase();
            obj_ref.increase_by(100);
            println!("counter: {}", obj_ref.get_val());
        } // implicit unlock: page is dirty and written back on eviction

        let stats = heap.stats();
        log::info!(
            "{} page(s), {} page fault(s), {} protection fault(s)",
            stats.total_pages,
            stats.page_faults,
            stats.protection_faults
        );
    }

    // write everything back, the next run continues counting
    heap.destruct()?;
    Ok(())
}
