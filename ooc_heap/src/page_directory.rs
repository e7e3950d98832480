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

use std::io;

use log::{debug, trace};

use crate::{cache_pool::CachePool, modules::backing_store::BackingStoreModule};

/// Bookkeeping for a single page of the logical address space
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct PageMetadata {
    /// Cache slot holding this page, `None` if the page only lives in the backing store
    pub(crate) resident_slot: Option<usize>,

    /// How many pins are currently held, a pinned page is always resident
    pub(crate) lock_count: usize,

    /// Value of the access timer at the last access
    pub(crate) last_touch: u32,
}

/// Maps pages to cache slots and decides which page has to leave the cache.
///
/// Dirty flags are kept per cache slot (see [`CachePool`]), the page based
/// accessors in here translate through the page to slot mapping.
pub(crate) struct PageDirectory {
    pages: Vec<PageMetadata>,

    /// Inverse of `PageMetadata::resident_slot`
    slot_to_page: Vec<Option<usize>>,

    /// Access timer, increased on every `ensure_resident` call
    page_timer: u32,

    /// Once the timer reaches this value, all timestamps are renumbered
    max_page_age: u32,

    /// Total number of pages that had to be loaded from the backing store
    total_page_faults: u64,
}

impl PageDirectory {
    pub(crate) fn new(slot_count: usize, page_count: usize, max_page_age: u32) -> Self {
        Self {
            pages: vec![PageMetadata::default(); page_count],
            slot_to_page: vec![None; slot_count],
            page_timer: 0,
            max_page_age,
            total_page_faults: 0,
        }
    }

    /// Registers a page that was just appended to the backing store
    pub(crate) fn add_page(&mut self) -> usize {
        self.pages.push(PageMetadata::default());
        self.pages.len() - 1
    }

    #[inline]
    pub(crate) fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[inline]
    pub(crate) fn total_page_faults(&self) -> u64 {
        self.total_page_faults
    }

    #[inline]
    pub(crate) fn slot_of(&self, page: usize) -> Option<usize> {
        self.pages[page].resident_slot
    }

    #[inline]
    pub(crate) fn page_in_slot(&self, slot: usize) -> Option<usize> {
        self.slot_to_page[slot]
    }

    #[cfg(test)]
    pub(crate) fn metadata(&self, page: usize) -> &PageMetadata {
        &self.pages[page]
    }

    /// Iterates over all `(slot, page)` pairs of resident pages
    pub(crate) fn resident_pages(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.slot_to_page
            .iter()
            .enumerate()
            .filter_map(|(slot, page)| page.map(|page| (slot, page)))
    }

    pub(crate) fn pinned_pages(&self) -> usize {
        self.resident_pages()
            .filter(|(_, page)| self.pages[*page].lock_count > 0)
            .count()
    }

    /// Makes sure `page` is resident and returns its slot.
    ///
    /// If the page is not resident, it is loaded into a free slot or into the
    /// slot of the least recently used unpinned page.
    pub(crate) fn ensure_resident<S: BackingStoreModule>(
        &mut self,
        page: usize,
        pool: &mut CachePool,
        store: &mut S,
    ) -> io::Result<usize> {
        debug_assert!(page < self.pages.len(), "page {} does not exist", page);

        let now = self.next_tick();
        let slot = match self.pages[page].resident_slot {
            Some(slot) => slot,
            None => self.handle_page_fault(page, pool, store)?,
        };

        self.pages[page].last_touch = now;
        Ok(slot)
    }

    fn handle_page_fault<S: BackingStoreModule>(
        &mut self,
        page: usize,
        pool: &mut CachePool,
        store: &mut S,
    ) -> io::Result<usize> {
        let slot = match self.free_slot() {
            Some(slot) => slot,
            None => {
                let victim = self.select_victim();
                self.evict(victim, pool, store)?
            }
        };

        pool.load(page, slot, store)?;
        self.map(page, slot);
        self.total_page_faults += 1;

        trace!("Page fault: loaded page {} into slot {}", page, slot);
        Ok(slot)
    }

    fn free_slot(&self) -> Option<usize> {
        self.slot_to_page.iter().position(|page| page.is_none())
    }

    /// Returns the least recently touched resident page that is not pinned.
    ///
    /// Ties are broken by the lowest page index.
    ///
    /// Panics if every resident page is pinned.
    pub(crate) fn select_victim(&self) -> usize {
        self.resident_pages()
            .map(|(_, page)| page)
            .filter(|page| self.pages[*page].lock_count == 0)
            .min_by_key(|page| (self.pages[*page].last_touch, *page))
            .unwrap_or_else(|| {
                panic!(
                    "all {} cache slots are pinned, can not make another page resident \
                    (too many objects locked at the same time)",
                    self.slot_to_page.len()
                )
            })
    }

    /// Writes `page` back if it is dirty and removes it from the cache.
    ///
    /// Returns the slot that is free now.
    pub(crate) fn evict<S: BackingStoreModule>(
        &mut self,
        page: usize,
        pool: &mut CachePool,
        store: &mut S,
    ) -> io::Result<usize> {
        let slot = self.pages[page]
            .resident_slot
            .expect("only resident pages can be evicted");
        debug_assert_eq!(self.pages[page].lock_count, 0, "pinned page {} evicted", page);

        let written = pool.write_back(page, slot, store)?;
        self.unmap(page);

        debug!(
            "Evicted page {} from slot {} (written back: {})",
            page, slot, written
        );
        Ok(slot)
    }

    /// Writes all dirty resident pages back, they stay resident
    pub(crate) fn flush_all<S: BackingStoreModule>(
        &self,
        pool: &mut CachePool,
        store: &mut S,
    ) -> io::Result<usize> {
        let mut written = 0;
        for (slot, page) in self.resident_pages() {
            if pool.write_back(page, slot, store)? {
                written += 1;
            }
        }

        Ok(written)
    }

    pub(crate) fn map(&mut self, page: usize, slot: usize) {
        debug_assert!(self.slot_to_page[slot].is_none(), "slot {} is occupied", slot);
        debug_assert!(self.pages[page].resident_slot.is_none(), "page {} is resident", page);

        self.slot_to_page[slot] = Some(page);
        self.pages[page].resident_slot = Some(slot);
    }

    fn unmap(&mut self, page: usize) {
        if let Some(slot) = self.pages[page].resident_slot.take() {
            self.slot_to_page[slot] = None;
        }
    }

    pub(crate) fn pin(&mut self, page: usize) {
        let metadata = &mut self.pages[page];
        debug_assert!(metadata.resident_slot.is_some(), "only resident pages can be pinned");
        metadata.lock_count += 1;
    }

    pub(crate) fn unpin(&mut self, page: usize) {
        let metadata = &mut self.pages[page];
        if metadata.lock_count == 0 {
            panic!("unlock of page {} without a matching lock", page);
        }
        metadata.lock_count -= 1;
    }

    pub(crate) fn is_dirty(&self, page: usize, pool: &CachePool) -> bool {
        self.slot_of(page)
            .map(|slot| pool.is_dirty(slot))
            .unwrap_or(false)
    }

    pub(crate) fn mark_dirty(&self, page: usize, pool: &mut CachePool) -> io::Result<()> {
        match self.slot_of(page) {
            Some(slot) => pool.mark_dirty(slot),
            None => panic!("page {} is not resident and can not be marked dirty", page),
        }
    }

    fn next_tick(&mut self) -> u32 {
        if self.page_timer >= self.max_page_age {
            self.reset_page_timers();
        }

        self.page_timer += 1;
        self.page_timer
    }

    /// Renumbers the timestamps of all resident pages to `0..n` keeping their order
    fn reset_page_timers(&mut self) {
        let mut resident: Vec<usize> = self.resident_pages().map(|(_, page)| page).collect();
        resident.sort_by_key(|page| (self.pages[*page].last_touch, *page));

        for metadata in self.pages.iter_mut() {
            metadata.last_touch = 0;
        }
        for (age, page) in resident.iter().enumerate() {
            self.pages[*page].last_touch = age as u32;
        }

        self.page_timer = resident.len().saturating_sub(1) as u32;
        debug!("Reset page timers of {} resident page(s)", resident.len());
    }
}
