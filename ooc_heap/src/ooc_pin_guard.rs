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
    ops::{Deref, DerefMut},
    ptr::NonNull,
};

use static_assertions::assert_not_impl_any;

use crate::{
    address_allocator::Address,
    modules::backing_store::{BackingStoreModule, MemoryBackingStore},
    ooc_heap::OOCHeap,
};

/// Owning pin of an object, created by [`OOCPtr::lock`](crate::OOCPtr::lock).
///
/// While it exists, the page of the object stays resident. Dropping it (or
/// calling [`OOCPinGuard::unlock`]) releases the pin. Only the guard can
/// unlock, aliases of the pointer can not.
pub struct OOCPinGuard<'a, T: Copy, S: BackingStoreModule> {
    heap: &'a OOCHeap<S>,
    address: Address,
    data_ref: NonNull<T>,
}

assert_not_impl_any!(OOCPinGuard<'static, u64, MemoryBackingStore>: Clone, Copy, Send, Sync);

impl<'a, T: Copy, S: BackingStoreModule> OOCPinGuard<'a, T, S> {
    /// ### Safety
    ///
    /// `data_ref` has to point to the resident object at `address` whose page was pinned.
    pub(crate) unsafe fn new(heap: &'a OOCHeap<S>, address: Address, data_ref: NonNull<T>) -> Self {
        Self {
            heap,
            address,
            data_ref,
        }
    }

    #[inline]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Releases the pin, same as dropping this guard
    pub fn unlock(self) {}
}

impl<T: Copy, S: BackingStoreModule> Deref for OOCPinGuard<'_, T, S> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { self.data_ref.as_ref() }
    }
}

impl<T: Copy, S: BackingStoreModule> DerefMut for OOCPinGuard<'_, T, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { self.data_ref.as_mut() }
    }
}

impl<T: Copy, S: BackingStoreModule> Drop for OOCPinGuard<'_, T, S> {
    fn drop(&mut self) {
        self.heap.release_object(self.address)
    }
}
