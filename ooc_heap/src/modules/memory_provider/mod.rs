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

mod mmap;

pub use mmap::MMapMemoryProvider;

use std::io;

/// A module that provides page aligned memory blocks during runtime
/// (e.g. trough `mmap`)
pub trait MemoryProviderModule {
    /// Returns a new, zeroed memory block with `size` bytes.
    ///
    /// `size` has to be a multiple of `min_size()`.
    unsafe fn map_block(size: usize) -> io::Result<*mut u8>;

    /// Removes the memory block.
    ///
    /// `ptr` and `size` have to be the exact values of a previous `map_block` call.
    unsafe fn unmap_block(ptr: *mut u8, size: usize);

    /// Gets the minimum size (and alignment) of a memory block.
    /// This should be the same value on every call or things might break.
    fn min_size() -> usize;
}
