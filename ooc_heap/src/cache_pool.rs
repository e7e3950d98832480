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

use core::{mem::ManuallyDrop, slice};
use std::io;

use log::trace;

use crate::{
    fault_handler::ProtectedRegion,
    modules::{
        backing_store::BackingStoreModule,
        memory_provider::{MMapMemoryProvider, MemoryProviderModule},
    },
    util::round_up_to_nearest,
};

/// Fixed number of equally sized slots, each able to hold one resident page.
///
/// Slots are write protected after every load and every write back, so the
/// first write into a resident page is detected by the fault handler.
pub(crate) struct CachePool {
    /// has to be dropped before the buffer is unmapped
    region: ManuallyDrop<ProtectedRegion>,
    buffer: *mut u8,
    mapped_size: usize,
    page_size: usize,
    slot_count: usize,
}

impl CachePool {
    pub(crate) fn new(page_size: usize, slot_count: usize) -> io::Result<Self> {
        debug_assert!(slot_count > 0, "cache needs at least one slot");

        let mapped_size = round_up_to_nearest(page_size * slot_count, MMapMemoryProvider::min_size());
        let buffer = unsafe { MMapMemoryProvider::map_block(mapped_size)? };
        let region = unsafe { ProtectedRegion::register(buffer, page_size, slot_count) };

        trace!(
            "Mapped cache buffer at {:p} with {} slot(s) of {} bytes",
            buffer,
            slot_count,
            page_size
        );

        Ok(Self {
            region: ManuallyDrop::new(region),
            buffer,
            mapped_size,
            page_size,
            slot_count,
        })
    }

    #[inline]
    pub(crate) fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Pointer to the first byte of `slot`
    #[inline]
    pub(crate) fn slot_base(&self, slot: usize) -> *mut u8 {
        debug_assert!(slot < self.slot_count, "slot {} out of range", slot);
        unsafe { self.buffer.add(slot * self.page_size) }
    }

    /// Returns the slot that contains `ptr` and the offset of `ptr` inside of it
    pub(crate) fn locate(&self, ptr: *const u8) -> Option<(usize, usize)> {
        let offset = (ptr as usize).checked_sub(self.buffer as usize)?;
        if offset >= self.page_size * self.slot_count {
            return None;
        }

        Some((offset / self.page_size, offset % self.page_size))
    }

    fn slot_data(&self, slot: usize) -> &[u8] {
        unsafe { slice::from_raw_parts(self.slot_base(slot), self.page_size) }
    }

    /// Reads `page` from `store` into `slot` and arms the write detection.
    pub(crate) fn load<S: BackingStoreModule>(
        &mut self,
        page: usize,
        slot: usize,
        store: &mut S,
    ) -> io::Result<()> {
        self.region.unprotect(slot)?;

        let dest = unsafe { slice::from_raw_parts_mut(self.slot_base(slot), self.page_size) };
        store.read_page(page, dest)?;

        self.region.protect(slot)?;
        self.region.clear_dirty(slot);

        Ok(())
    }

    /// Writes the content of `slot` back to `page` if it was modified.
    ///
    /// Returns `true` if data was written.
    pub(crate) fn write_back<S: BackingStoreModule>(
        &mut self,
        page: usize,
        slot: usize,
        store: &mut S,
    ) -> io::Result<bool> {
        if !self.region.is_dirty(slot) {
            return Ok(false);
        }

        store.write_page(page, self.slot_data(slot))?;
        self.clear_dirty(slot)?;

        Ok(true)
    }

    #[inline]
    pub(crate) fn is_dirty(&self, slot: usize) -> bool {
        self.region.is_dirty(slot)
    }

    #[inline]
    pub(crate) fn mark_dirty(&mut self, slot: usize) -> io::Result<()> {
        self.region.mark_dirty(slot);
        self.region.unprotect(slot)
    }

    /// Re-arms the write detection of `slot`
    #[inline]
    pub(crate) fn clear_dirty(&mut self, slot: usize) -> io::Result<()> {
        // protect before clearing, so no write can slip through undetected
        self.region.protect(slot)?;
        self.region.clear_dirty(slot);
        Ok(())
    }

    pub(crate) fn protection_faults(&self) -> u64 {
        self.region.protection_faults()
    }
}

impl Drop for CachePool {
    fn drop(&mut self) {
        // unregister first, unmap afterwards
        unsafe { ManuallyDrop::drop(&mut self.region) };

        unsafe { MMapMemoryProvider::unmap_block(self.buffer, self.mapped_size) };
    }
}
