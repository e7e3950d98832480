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

mod address_allocator;
mod cache_pool;
mod fault_handler;
mod ooc_array;
mod ooc_config;
mod ooc_heap;
mod ooc_pin_guard;
mod ooc_ptr;
mod page_directory;
mod util;

#[cfg(test)]
mod test;

pub use crate::address_allocator::Address;
pub use crate::ooc_array::{OOCArrayPinGuard, OOCArrayPtr};
pub use crate::ooc_heap::{HeapStats, OOCHeap};
pub use crate::ooc_pin_guard::OOCPinGuard;
pub use crate::ooc_ptr::OOCPtr;
pub use ooc_config::OOCConfig;
pub mod modules;
