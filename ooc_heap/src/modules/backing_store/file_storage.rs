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

use std::{
    fs::File,
    io::{self, ErrorKind, Read, Seek, SeekFrom, Write},
};

use log::{debug, warn};

use super::{page_not_found, BackingStoreModule, PageFileHeader};

/// Stores pages back to back in one file and the header in a second file.
///
/// Unlike a scratch swap file, both files outlive this module so a heap can
/// be loaded again later.
pub struct FileBackingStore {
    /// underlying page file
    file: File,

    /// path of the header file, which is (re)written as a whole
    header_path: String,

    page_size: usize,

    /// cached page count, so no `metadata` call necessary
    page_count: usize,
}

impl FileBackingStore {
    /// Opens `file_path` (or creates it if it does not exist yet) as page file.
    ///
    /// Existing pages are kept, call `reset` to start from scratch.
    pub fn new(file_path: String, header_path: String, page_size: usize) -> io::Result<Self> {
        assert!(page_size > 0, "page size has to be greater than zero");

        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&file_path)?;

        let file_len = file.metadata()?.len() as usize;
        if file_len % page_size != 0 {
            warn!(
                "Page file {} has a trailing partial page ({} bytes, page size {})",
                file_path, file_len, page_size
            );
        }

        debug!(
            "Opened page file {} with {} page(s)",
            file_path,
            file_len / page_size
        );

        Ok(Self {
            file,
            header_path,
            page_size,
            page_count: file_len / page_size,
        })
    }

    fn seek_page(&mut self, index: usize) -> io::Result<()> {
        self.file
            .seek(SeekFrom::Start((index * self.page_size) as u64))
            .map(|_| ())
    }
}

impl BackingStoreModule for FileBackingStore {
    fn append_page(&mut self, src: &[u8]) -> io::Result<usize> {
        debug_assert_eq!(src.len(), self.page_size, "illegal page length");

        let index = self.page_count;
        self.seek_page(index)?;
        self.file.write_all(src)?;
        self.page_count += 1;

        Ok(index)
    }

    fn read_page(&mut self, index: usize, dest: &mut [u8]) -> io::Result<()> {
        debug_assert_eq!(dest.len(), self.page_size, "illegal page length");
        if index >= self.page_count {
            return Err(page_not_found(index, self.page_count));
        }

        self.seek_page(index)?;
        self.file.read_exact(dest)
    }

    fn write_page(&mut self, index: usize, src: &[u8]) -> io::Result<()> {
        debug_assert_eq!(src.len(), self.page_size, "illegal page length");
        if index >= self.page_count {
            return Err(page_not_found(index, self.page_count));
        }

        self.seek_page(index)?;
        self.file.write_all(src)
    }

    fn page_count(&self) -> usize {
        self.page_count
    }

    fn read_header(&mut self) -> io::Result<Option<PageFileHeader>> {
        let mut buf = vec![];
        match File::open(&self.header_path) {
            Ok(mut file) => file.read_to_end(&mut buf)?,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };

        PageFileHeader::from_bytes(&buf).map(Some)
    }

    fn write_header(&mut self, header: &PageFileHeader) -> io::Result<()> {
        let mut file = File::create(&self.header_path)?;
        file.write_all(&header.to_bytes())?;
        file.sync_all()
    }

    fn truncate(&mut self, page_count: usize) -> io::Result<()> {
        if page_count < self.page_count {
            self.file.set_len((page_count * self.page_size) as u64)?;
            self.page_count = page_count;
        }

        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        self.file.set_len(0)?;
        self.page_count = 0;

        match std::fs::remove_file(&self.header_path) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}
