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

use core::fmt;
use std::io;

use log::trace;

use crate::util::{padding_needed_for, round_up_to_nearest};

/// Opaque position of an object in the logical (disk backed) address space.
///
/// Addresses are never reused, the address space only grows.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct Address(pub usize);

impl Address {
    /// Address that points to nothing
    pub const NULL: Address = Address(usize::MAX);

    #[inline]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    #[inline]
    pub(crate) fn page(self, page_size: usize) -> usize {
        self.0 / page_size
    }

    #[inline]
    pub(crate) fn page_offset(self, page_size: usize) -> usize {
        self.0 % page_size
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "NULL")
        } else {
            write!(f, "{:#x}", self.0)
        }
    }
}

/// Bump allocator that never lets an object cross a page boundary
pub(crate) struct AddressAllocator {
    page_size: usize,

    /// page that receives the next object, `None` if no page was created yet
    current_page: Option<usize>,

    /// next free byte inside of `current_page`
    current_offset: usize,
}

impl AddressAllocator {
    pub(crate) fn new(page_size: usize) -> Self {
        Self {
            page_size,
            current_page: None,
            current_offset: 0,
        }
    }

    /// Continues allocating behind an existing frontier
    pub(crate) fn restore(page_size: usize, page_count: usize, usage: usize) -> Self {
        assert!(usage <= page_size, "frontier {} lies outside of a page", usage);

        Self {
            page_size,
            current_page: page_count.checked_sub(1),
            current_offset: if page_count == 0 { 0 } else { usage },
        }
    }

    /// Offset of the frontier inside of the current page
    #[inline]
    pub(crate) fn usage(&self) -> usize {
        self.current_offset
    }

    /// Address at which the next object could start at the earliest
    pub(crate) fn frontier(&self) -> Address {
        match self.current_page {
            Some(page) => Address(page * self.page_size + self.current_offset),
            None => Address(0),
        }
    }

    /// Reserves `size` bytes aligned to `align` inside of a single page.
    ///
    /// `create_page` is called whenever the object does not fit into the
    /// current page and has to return the index of a newly created page.
    pub(crate) fn allocate<F: FnOnce() -> io::Result<usize>>(
        &mut self,
        size: usize,
        align: usize,
        create_page: F,
    ) -> io::Result<Address> {
        assert!(
            align.is_power_of_two() && align <= self.page_size,
            "alignment {} has to be a power of two not bigger than the page size {}",
            align,
            self.page_size
        );

        // stride of the object, so arrays of it stay aligned
        let padded_size = round_up_to_nearest(size, align);
        assert!(
            padded_size <= self.page_size,
            "allocation of {} bytes does not fit into a page of {} bytes",
            size,
            self.page_size
        );

        let offset = self.current_offset + padding_needed_for(self.current_offset, align);
        let page = match self.current_page {
            // zero sized objects must not end up at the start of the next page either
            Some(page) if offset < self.page_size && offset + padded_size <= self.page_size => {
                self.current_offset = offset;
                page
            }
            _ => {
                let page = create_page()?;
                debug_assert!(
                    self.current_page.map(|curr| curr + 1).unwrap_or(0) == page,
                    "pages have to be created in order"
                );

                self.current_page = Some(page);
                self.current_offset = 0;
                page
            }
        };

        let address = Address(page * self.page_size + self.current_offset);
        self.current_offset += padded_size;

        trace!(
            "Allocated {} bytes (stride {}) at {} in page {}",
            size,
            padded_size,
            address,
            page
        );
        Ok(address)
    }
}

#[cfg(test)]
mod test {
    use std::{cell::Cell, io};

    use super::{Address, AddressAllocator};

    fn counting_page_source(counter: &Cell<usize>) -> impl FnOnce() -> io::Result<usize> + '_ {
        move || {
            let page = counter.get();
            counter.set(page + 1);
            Ok(page)
        }
    }

    #[test]
    fn test_objects_never_span_pages() {
        let pages = Cell::new(0);
        let mut allocator = AddressAllocator::new(4096);

        let first = allocator.allocate(4000, 8, counting_page_source(&pages)).unwrap();
        let second = allocator.allocate(200, 8, counting_page_source(&pages)).unwrap();
        let third = allocator.allocate(100, 8, counting_page_source(&pages)).unwrap();

        assert_eq!(first, Address(0));
        // 96 bytes left in page 0, not enough for 200
        assert_eq!(second, Address(4096));
        assert_eq!(third, Address(4096 + 200));
        assert_eq!(pages.get(), 2);

        for (addr, size) in [(first, 4000), (second, 200), (third, 100)] {
            assert_eq!(addr.page(4096), (addr.0 + size - 1) / 4096);
        }
        assert!(first < second && second < third);
    }

    #[test]
    fn test_alignment_and_stride() {
        let pages = Cell::new(0);
        let mut allocator = AddressAllocator::new(4096);

        let a = allocator.allocate(3, 1, counting_page_source(&pages)).unwrap();
        let b = allocator.allocate(12, 8, counting_page_source(&pages)).unwrap();
        let c = allocator.allocate(1, 1, counting_page_source(&pages)).unwrap();

        assert_eq!(a, Address(0));
        assert_eq!(b, Address(8));
        // stride of b is 16
        assert_eq!(c, Address(24));
        assert_eq!(allocator.usage(), 25);
        assert_eq!(allocator.frontier(), Address(25));
    }

    #[test]
    fn test_exactly_full_page() {
        let pages = Cell::new(0);
        let mut allocator = AddressAllocator::new(4096);

        allocator.allocate(4096, 1, counting_page_source(&pages)).unwrap();
        assert_eq!(allocator.usage(), 4096);
        assert_eq!(pages.get(), 1);

        // even an empty object starts a new page once the current one is full
        let empty = allocator.allocate(0, 1, counting_page_source(&pages)).unwrap();
        assert_eq!(empty, Address(4096));
        assert_eq!(pages.get(), 2);

        let next = allocator.allocate(1, 1, counting_page_source(&pages)).unwrap();
        assert_eq!(next, Address(4096));
        assert_eq!(pages.get(), 2);
    }

    #[test]
    fn test_restore_frontier() {
        let pages = Cell::new(3);
        let mut allocator = AddressAllocator::restore(4096, 3, 1000);
        assert_eq!(allocator.frontier(), Address(2 * 4096 + 1000));

        let addr = allocator.allocate(8, 8, counting_page_source(&pages)).unwrap();
        assert_eq!(addr, Address(2 * 4096 + 1000));
        assert_eq!(pages.get(), 3);
    }

    #[test]
    fn test_failed_page_creation_keeps_frontier() {
        let mut allocator = AddressAllocator::new(4096);
        let res = allocator.allocate(8, 8, || {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        });

        assert!(res.is_err());
        assert_eq!(allocator.frontier(), Address(0));
        assert_eq!(allocator.usage(), 0);
    }

    #[test]
    #[should_panic(expected = "does not fit into a page")]
    fn test_allocation_bigger_than_page() {
        let pages = Cell::new(0);
        let mut allocator = AddressAllocator::new(4096);
        let _ = allocator.allocate(4097, 1, counting_page_source(&pages));
    }

    #[test]
    fn test_null_address() {
        assert!(Address::NULL.is_null());
        assert!(!Address(0).is_null());
        assert_eq!(Address::NULL.to_string(), "NULL");
        assert_eq!(Address(255).to_string(), "0xff");
    }
}
