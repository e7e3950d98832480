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

mod file_storage;
mod header;
mod memory_storage;

pub use file_storage::FileBackingStore;
pub use header::PageFileHeader;
pub use memory_storage::MemoryBackingStore;

use std::io;

/// Page indexed persistent storage for the out-of-core heap.
///
/// Pages are opaque byte blocks, all of the same size for one heap.
/// Page `i` always exists once `append_page` returned `i`.
pub trait BackingStoreModule {
    /// Appends a new page with the content `src` and returns its index.
    fn append_page(&mut self, src: &[u8]) -> io::Result<usize>;

    /// Reads the page `index` into `dest`. `dest.len()` has to be the page size.
    ///
    /// If this call fails, it could be that already some data was written to `dest`.
    fn read_page(&mut self, index: usize, dest: &mut [u8]) -> io::Result<()>;

    /// Overwrites the existing page `index` with `src`.
    fn write_page(&mut self, index: usize, src: &[u8]) -> io::Result<()>;

    /// Returns the number of pages that were created so far
    fn page_count(&self) -> usize;

    /// Reads the header record, `None` if no header was written yet
    fn read_header(&mut self) -> io::Result<Option<PageFileHeader>>;

    fn write_header(&mut self, header: &PageFileHeader) -> io::Result<()>;

    /// Removes all pages and the header
    fn reset(&mut self) -> io::Result<()>;

    /// Drops every page with an index of `page_count` or higher
    fn truncate(&mut self, page_count: usize) -> io::Result<()>;

    /// Makes sure that everything written so far reached the underlying medium.
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub(crate) fn page_not_found(index: usize, page_count: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("page {} does not exist (page count: {})", index, page_count),
    )
}
