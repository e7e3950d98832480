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

use std::{io, ptr::null_mut};

use libc::{
    c_void, mmap, munmap, sysconf, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE,
    _SC_PAGE_SIZE,
};
use log::error;

use super::MemoryProviderModule;

pub struct MMapMemoryProvider;

impl MemoryProviderModule for MMapMemoryProvider {
    unsafe fn map_block(size: usize) -> io::Result<*mut u8> {
        debug_assert_eq!(size % Self::min_size(), 0, "size has to be page aligned");

        let base_ptr = unsafe {
            mmap(
                null_mut(),
                size,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if base_ptr == MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(base_ptr as *mut u8)
    }

    unsafe fn unmap_block(ptr: *mut u8, size: usize) {
        let code = unsafe { munmap(ptr as *mut c_void, size) };

        if code != 0 {
            error!(
                "Could not unmap {} bytes at {:p}: {}",
                size,
                ptr,
                io::Error::last_os_error()
            );
        }
    }

    fn min_size() -> usize {
        unsafe { sysconf(_SC_PAGE_SIZE) as usize }
    }
}

#[cfg(test)]
mod test {
    use super::{MMapMemoryProvider, MemoryProviderModule};

    #[test]
    fn test_map_block_is_zeroed_and_aligned() {
        let size = MMapMemoryProvider::min_size() * 3;
        unsafe {
            let ptr = MMapMemoryProvider::map_block(size).unwrap();
            assert_eq!(ptr as usize % MMapMemoryProvider::min_size(), 0);

            let block = core::slice::from_raw_parts_mut(ptr, size);
            assert!(block.iter().all(|x| *x == 0));
            block[size - 1] = 7;
            assert_eq!(block[size - 1], 7);

            MMapMemoryProvider::unmap_block(ptr, size);
        }
    }
}
