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

use core::{
    alloc::Layout,
    cell::RefCell,
    mem::{size_of, ManuallyDrop},
    ptr,
};
use std::{collections::HashSet, io};

use log::{debug, error, info, trace, warn};

use crate::{
    address_allocator::{Address, AddressAllocator},
    cache_pool::CachePool,
    modules::backing_store::{BackingStoreModule, PageFileHeader},
    ooc_array::OOCArrayPtr,
    ooc_ptr::OOCPtr,
    page_directory::PageDirectory,
    OOCConfig,
};

/// Usage statistics of an [`OOCHeap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Number of pages that exist in the backing store
    pub total_pages: usize,

    /// Number of pages that had to be loaded from the backing store so far
    pub page_faults: u64,

    /// Number of first writes into a resident page detected so far
    pub protection_faults: u64,

    /// Pages that are currently held in the cache
    pub resident_pages: usize,

    /// Resident pages with at least one active lock
    pub pinned_pages: usize,

    /// Capacity of the cache in pages
    pub cache_slots: usize,

    /// Bytes used in the page that receives the next allocation
    pub usage: usize,
}

/// Heap whose objects live in a backing store and are cached in RAM
/// page by page while they are locked.
///
/// Objects are identified by [`Address`]es and only accessible while
/// locked (see [`OOCPtr::lock`]). Writes are detected automatically, dirty
/// pages are written back once they are evicted or the heap is flushed.
pub struct OOCHeap<S: BackingStoreModule> {
    inner: ManuallyDrop<RefCell<OOCHeapInner<S>>>,
}

impl<S: BackingStoreModule> OOCHeap<S> {
    /// Creates a new, empty heap. Everything inside of `store` is discarded.
    pub fn init(config: OOCConfig, mut store: S) -> io::Result<Self> {
        config.validate();

        store.reset()?;
        store.write_header(&PageFileHeader::new(
            config.page_size,
            0,
            config.cache_size,
            0,
        ))?;

        let inner = OOCHeapInner {
            pool: CachePool::new(config.page_size, config.cache_slots())?,
            directory: PageDirectory::new(config.cache_slots(), 0, config.max_page_age),
            allocator: AddressAllocator::new(config.page_size),
            locked_objects: HashSet::new(),
            store,
            config,
        };

        info!(
            "Initialized heap with {} cache slot(s) of {} bytes",
            inner.config.cache_slots(),
            inner.config.page_size
        );
        Ok(Self::from_inner(inner))
    }

    /// Reopens a heap that was persisted to `store` before.
    ///
    /// Panics if the stored page size (or format version) does not match `config`.
    pub fn load(config: OOCConfig, mut store: S) -> io::Result<Self> {
        config.validate();

        let header = store.read_header()?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "backing store does not contain a page file header",
            )
        })?;

        assert_eq!(
            header.version,
            PageFileHeader::VERSION,
            "page file version mismatch: stored {}, supported {}",
            header.version,
            PageFileHeader::VERSION
        );
        assert_eq!(
            header.page_size, config.page_size,
            "page size mismatch: backing store uses {} bytes, configured are {} bytes",
            header.page_size, config.page_size
        );

        if header.usage > header.page_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "invalid page file header: frontier usage {} exceeds the page size {}",
                    header.usage, header.page_size
                ),
            ));
        }

        if store.page_count() < header.page_count {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "header lists {} page(s) but backing store only contains {}",
                    header.page_count,
                    store.page_count()
                ),
            ));
        }

        if store.page_count() > header.page_count {
            // pages appended after the last save, their content was never committed
            warn!(
                "Backing store contains {} page(s) but header lists {}, dropping the rest",
                store.page_count(),
                header.page_count
            );
            store.truncate(header.page_count)?;
        }

        if header.cache_size != config.cache_size {
            debug!(
                "Cache size changed from {} to {} bytes",
                header.cache_size, config.cache_size
            );
        }

        let inner = OOCHeapInner {
            pool: CachePool::new(config.page_size, config.cache_slots())?,
            directory: PageDirectory::new(
                config.cache_slots(),
                header.page_count,
                config.max_page_age,
            ),
            allocator: AddressAllocator::restore(config.page_size, header.page_count, header.usage),
            locked_objects: HashSet::new(),
            store,
            config,
        };

        info!("Loaded heap with {} page(s)", header.page_count);
        Ok(Self::from_inner(inner))
    }

    fn from_inner(inner: OOCHeapInner<S>) -> Self {
        Self {
            inner: ManuallyDrop::new(RefCell::new(inner)),
        }
    }

    /// Writes all dirty pages and the header back, releases the cache and
    /// returns the backing store.
    pub fn destruct(self) -> io::Result<S> {
        let mut this = ManuallyDrop::new(self);
        let mut inner = unsafe { ManuallyDrop::take(&mut this.inner) }.into_inner();

        inner.persist()?;

        info!(
            "Destructed heap with {} page(s)",
            inner.directory.page_count()
        );
        Ok(inner.into_store())
    }

    /// Writes all dirty pages and the header back, everything stays resident.
    pub fn flush(&self) -> io::Result<()> {
        self.inner.borrow_mut().persist()
    }

    /// Reserves `size` zeroed bytes aligned to `align` within a single page.
    ///
    /// Panics if `size` does not fit into one page.
    pub fn allocate_raw(&self, size: usize, align: usize) -> io::Result<Address> {
        self.inner.borrow_mut().allocate(size, align)
    }

    /// Allocates a new object and initializes it with `initial_value`
    pub fn allocate<T: Copy>(&self, initial_value: T) -> io::Result<OOCPtr<'_, T, S>> {
        let layout = Layout::new::<T>();
        let address = self.allocate_raw(layout.size(), layout.align())?;

        unsafe {
            let ptr = self.lock_raw(address)? as *mut T;
            ptr::write(ptr, initial_value);
            self.unlock_raw(address);

            Ok(OOCPtr::from_address(self, address))
        }
    }

    /// Allocates `len` consecutive objects, all initialized with `initial_value`
    pub fn allocate_array<T: Copy>(
        &self,
        len: usize,
        initial_value: T,
    ) -> io::Result<OOCArrayPtr<'_, T, S>> {
        let layout = Layout::array::<T>(len).unwrap_or_else(|_| {
            panic!(
                "array of {} elements with {} bytes each is too big",
                len,
                size_of::<T>()
            )
        });
        let address = self.allocate_raw(layout.size(), layout.align())?;

        unsafe {
            let ptr = self.lock_raw(address)? as *mut T;
            for i in 0..len {
                ptr::write(ptr.add(i), initial_value);
            }
            self.unlock_raw(address);

            Ok(OOCArrayPtr::from_address(self, address, len))
        }
    }

    /// Does nothing, memory is never reclaimed.
    pub fn free(&self, address: Address) {
        let inner = self.inner.borrow();
        debug_assert!(
            address.is_null() || address < inner.allocator.frontier(),
            "free of {} which was never allocated",
            address
        );
        trace!("Free {} (not reclaimed)", address);
    }

    /// Pins the page of `address` and returns a pointer to it that stays
    /// valid until the matching `unlock_raw` call.
    ///
    /// ### Safety
    ///
    /// The returned pointer must not be used after `unlock_raw(address)`.
    pub unsafe fn lock_raw(&self, address: Address) -> io::Result<*mut u8> {
        self.inner.borrow_mut().lock(address)
    }

    /// Releases a pin acquired by `lock_raw`.
    ///
    /// Panics if the page of `address` is not locked.
    pub fn unlock_raw(&self, address: Address) {
        self.inner.borrow_mut().unlock(address)
    }

    /// Locks an object for exclusive access by a pin guard
    pub(crate) fn lock_object(&self, address: Address) -> io::Result<*mut u8> {
        let mut inner = self.inner.borrow_mut();
        assert!(
            !inner.locked_objects.contains(&address),
            "object at {} is already locked",
            address
        );

        let ptr = inner.lock(address)?;
        inner.locked_objects.insert(address);
        Ok(ptr)
    }

    pub(crate) fn release_object(&self, address: Address) {
        let mut inner = self.inner.borrow_mut();
        inner.locked_objects.remove(&address);
        inner.unlock(address);
    }

    /// Returns `true` if the page of `address` was modified since it was loaded
    /// or written back the last time
    pub fn is_dirty(&self, address: Address) -> bool {
        let inner = self.inner.borrow();
        let page = address.page(inner.config.page_size);
        page < inner.directory.page_count() && inner.directory.is_dirty(page, &inner.pool)
    }

    /// Marks the page of the locked `address` as modified.
    ///
    /// Writes by the CPU are detected automatically. Writes done by the
    /// kernel (e.g. `read(2)` into a locked pointer) are not, and would even
    /// fail with `EFAULT` on a clean page, so call this before.
    pub fn mark_dirty(&self, address: Address) -> io::Result<()> {
        let mut inner = self.inner.borrow_mut();
        let page = address.page(inner.config.page_size);
        assert!(
            page < inner.directory.page_count() && inner.directory.slot_of(page).is_some(),
            "mark_dirty of {} whose page is not resident",
            address
        );

        let OOCHeapInner { directory, pool, .. } = &mut *inner;
        directory.mark_dirty(page, pool)
    }

    pub fn is_resident(&self, address: Address) -> bool {
        let inner = self.inner.borrow();
        let page = address.page(inner.config.page_size);
        page < inner.directory.page_count() && inner.directory.slot_of(page).is_some()
    }

    /// Translates a pointer into a resident page back to its address
    pub fn address_of(&self, ptr: *const u8) -> Option<Address> {
        let inner = self.inner.borrow();
        let (slot, offset) = inner.pool.locate(ptr)?;
        let page = inner.directory.page_in_slot(slot)?;
        Some(Address(page * inner.config.page_size + offset))
    }

    pub fn page_size(&self) -> usize {
        self.inner.borrow().config.page_size
    }

    pub fn stats(&self) -> HeapStats {
        let inner = self.inner.borrow();
        HeapStats {
            total_pages: inner.directory.page_count(),
            page_faults: inner.directory.total_page_faults(),
            protection_faults: inner.pool.protection_faults(),
            resident_pages: inner.directory.resident_pages().count(),
            pinned_pages: inner.directory.pinned_pages(),
            cache_slots: inner.pool.slot_count(),
            usage: inner.allocator.usage(),
        }
    }
}

impl<S: BackingStoreModule> Drop for OOCHeap<S> {
    fn drop(&mut self) {
        let mut inner = unsafe { ManuallyDrop::take(&mut self.inner) }.into_inner();

        if let Err(err) = inner.persist() {
            error!("Could not persist heap while dropping it: {}", err);
        }
    }
}

pub(crate) struct OOCHeapInner<S: BackingStoreModule> {
    config: OOCConfig,
    pool: CachePool,
    directory: PageDirectory,
    allocator: AddressAllocator,

    /// Objects that are currently borrowed by a pin guard
    locked_objects: HashSet<Address>,

    store: S,
}

impl<S: BackingStoreModule> OOCHeapInner<S> {
    fn allocate(&mut self, size: usize, align: usize) -> io::Result<Address> {
        let Self {
            config,
            directory,
            allocator,
            store,
            ..
        } = self;

        allocator.allocate(size, align, || {
            let index = store.append_page(&vec![0u8; config.page_size])?;
            let page = directory.add_page();
            debug_assert_eq!(index, page, "backing store and page directory diverged");

            debug!("Created page {}", page);
            Ok(page)
        })
    }

    fn lock(&mut self, address: Address) -> io::Result<*mut u8> {
        assert!(!address.is_null(), "lock of a null address");

        let page_size = self.config.page_size;
        let page = address.page(page_size);
        assert!(
            page < self.directory.page_count(),
            "lock of {} which lies behind the last page",
            address
        );

        let slot = self
            .directory
            .ensure_resident(page, &mut self.pool, &mut self.store)?;
        self.directory.pin(page);

        trace!("Lock {} (page {} in slot {})", address, page, slot);
        Ok(unsafe { self.pool.slot_base(slot).add(address.page_offset(page_size)) })
    }

    fn unlock(&mut self, address: Address) {
        assert!(!address.is_null(), "unlock of a null address");

        let page = address.page(self.config.page_size);
        assert!(
            page < self.directory.page_count(),
            "unlock of {} which lies behind the last page",
            address
        );

        self.directory.unpin(page);
        trace!("Unlock {} (page {})", address, page);
    }

    /// Writes dirty pages and the header back
    fn persist(&mut self) -> io::Result<()> {
        let pinned = self.directory.pinned_pages();
        if pinned > 0 {
            warn!("Persisting heap while {} page(s) are still locked", pinned);
        }

        let written = self.directory.flush_all(&mut self.pool, &mut self.store)?;
        self.store.write_header(&PageFileHeader::new(
            self.config.page_size,
            self.directory.page_count(),
            self.config.cache_size,
            self.allocator.usage(),
        ))?;
        self.store.sync()?;

        debug!("Persisted heap ({} dirty page(s) written)", written);
        Ok(())
    }

    fn into_store(self) -> S {
        let Self { store, .. } = self;
        store
    }
}
