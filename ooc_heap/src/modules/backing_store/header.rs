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

use core::mem::size_of;
use std::io;

use static_assertions::const_assert_eq;

const HEADER_MAGIC: [u8; 8] = *b"OOCHEAP\0";
const HEADER_FIELDS: usize = 6;

const_assert_eq!(PageFileHeader::ENCODED_SIZE, HEADER_FIELDS * size_of::<u64>());

/// Small record stored next to the pages describing how the heap was configured
/// when it was saved the last time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFileHeader {
    pub version: u64,
    pub page_size: usize,
    pub page_count: usize,
    /// Cache size at the time of the last save, only informational
    pub cache_size: usize,
    /// Offset of the allocation frontier inside the last page
    pub usage: usize,
}

impl PageFileHeader {
    pub const VERSION: u64 = 1;
    pub const ENCODED_SIZE: usize = 48;

    pub fn new(page_size: usize, page_count: usize, cache_size: usize, usage: usize) -> Self {
        Self {
            version: Self::VERSION,
            page_size,
            page_count,
            cache_size,
            usage,
        }
    }

    /// Fixed size little endian encoding
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_SIZE] {
        let fields = [
            u64::from_le_bytes(HEADER_MAGIC),
            self.version,
            self.page_size as u64,
            self.page_count as u64,
            self.cache_size as u64,
            self.usage as u64,
        ];

        let mut buf = [0u8; Self::ENCODED_SIZE];
        for (chunk, field) in buf.chunks_exact_mut(size_of::<u64>()).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> io::Result<Self> {
        if buf.len() != Self::ENCODED_SIZE {
            return Err(invalid_header(format!(
                "expected {} bytes, got {}",
                Self::ENCODED_SIZE,
                buf.len()
            )));
        }

        let mut fields = [0u64; HEADER_FIELDS];
        for (field, chunk) in fields.iter_mut().zip(buf.chunks_exact(size_of::<u64>())) {
            let mut raw = [0u8; size_of::<u64>()];
            raw.copy_from_slice(chunk);
            *field = u64::from_le_bytes(raw);
        }

        if fields[0].to_le_bytes() != HEADER_MAGIC {
            return Err(invalid_header("magic number does not match".to_string()));
        }

        Ok(Self {
            version: fields[1],
            page_size: to_usize(fields[2])?,
            page_count: to_usize(fields[3])?,
            cache_size: to_usize(fields[4])?,
            usage: to_usize(fields[5])?,
        })
    }
}

fn to_usize(value: u64) -> io::Result<usize> {
    usize::try_from(value).map_err(|_| invalid_header(format!("value {} out of range", value)))
}

fn invalid_header(reason: String) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("invalid page file header: {}", reason),
    )
}
