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

use super::{page_not_found, BackingStoreModule, PageFileHeader};

/// Keeps all pages in RAM.
///
/// Useful for tests and for moving a heap between `destruct` and `load`
/// without touching the file system.
#[derive(Default)]
pub struct MemoryBackingStore {
    pages: Vec<Box<[u8]>>,
    header: Option<PageFileHeader>,
}

impl MemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackingStoreModule for MemoryBackingStore {
    fn append_page(&mut self, src: &[u8]) -> io::Result<usize> {
        self.pages.push(src.into());
        Ok(self.pages.len() - 1)
    }

    fn read_page(&mut self, index: usize, dest: &mut [u8]) -> io::Result<()> {
        let page = self
            .pages
            .get(index)
            .ok_or_else(|| page_not_found(index, self.pages.len()))?;
        dest.copy_from_slice(page);
        Ok(())
    }

    fn write_page(&mut self, index: usize, src: &[u8]) -> io::Result<()> {
        let page_count = self.pages.len();
        let page = self
            .pages
            .get_mut(index)
            .ok_or_else(|| page_not_found(index, page_count))?;
        page.copy_from_slice(src);
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn read_header(&mut self) -> io::Result<Option<PageFileHeader>> {
        Ok(self.header)
    }

    fn write_header(&mut self, header: &PageFileHeader) -> io::Result<()> {
        self.header = Some(*header);
        Ok(())
    }

    fn truncate(&mut self, page_count: usize) -> io::Result<()> {
        self.pages.truncate(page_count);
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        self.pages.clear();
        self.header = None;
        Ok(())
    }
}
