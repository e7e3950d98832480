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

use core::{marker::PhantomData, ptr::NonNull};
use std::io;

use static_assertions::assert_impl_all;

use crate::{
    address_allocator::Address,
    modules::backing_store::{BackingStoreModule, MemoryBackingStore},
    ooc_heap::OOCHeap,
    ooc_pin_guard::OOCPinGuard,
};

/// Reference to an object of type `T` inside of an [`OOCHeap`].
///
/// An `OOCPtr` is only an address. Copies of it are aliases that all
/// refer to the same object. The object can only be accessed through the
/// [`OOCPinGuard`] returned by [`OOCPtr::lock`], which keeps the page of the
/// object resident until it is dropped.
pub struct OOCPtr<'a, T: Copy, S: BackingStoreModule> {
    heap: &'a OOCHeap<S>,
    address: Address,
    _phantom_data: PhantomData<T>,
}

assert_impl_all!(OOCPtr<'static, u64, MemoryBackingStore>: Copy);

impl<'a, T: Copy, S: BackingStoreModule> OOCPtr<'a, T, S> {
    pub fn null(heap: &'a OOCHeap<S>) -> Self {
        Self {
            heap,
            address: Address::NULL,
            _phantom_data: PhantomData,
        }
    }

    /// Creates a pointer to an already existing object.
    ///
    /// ### Safety
    ///
    /// A valid `T` has to be stored at `address` (e.g. it was returned by
    /// `OOCHeap::allocate::<T>` before).
    pub unsafe fn from_address(heap: &'a OOCHeap<S>, address: Address) -> Self {
        Self {
            heap,
            address,
            _phantom_data: PhantomData,
        }
    }

    #[inline]
    pub fn address(&self) -> Address {
        self.address
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.address.is_null()
    }

    pub fn set_null(&mut self) {
        self.address = Address::NULL;
    }

    /// Makes the object resident and pins it until the returned guard is dropped.
    ///
    /// Panics if this pointer is null, if the object is already locked or if
    /// every cache slot is pinned.
    pub fn lock(&self) -> io::Result<OOCPinGuard<'a, T, S>> {
        assert!(!self.is_null(), "lock of a null pointer");

        let ptr = self.heap.lock_object(self.address)? as *mut T;
        debug_assert!(
            ptr as usize % core::mem::align_of::<T>() == 0,
            "object at {} is misaligned",
            self.address
        );

        Ok(unsafe {
            OOCPinGuard::new(self.heap, self.address, NonNull::new_unchecked(ptr))
        })
    }
}

impl<T: Copy, S: BackingStoreModule> Clone for OOCPtr<'_, T, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Copy, S: BackingStoreModule> Copy for OOCPtr<'_, T, S> {}

impl<T: Copy, S: BackingStoreModule> PartialEq for OOCPtr<'_, T, S> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl<T: Copy, S: BackingStoreModule> Eq for OOCPtr<'_, T, S> {}

impl<T: Copy, S: BackingStoreModule> core::fmt::Debug for OOCPtr<'_, T, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("OOCPtr").field(&self.address).finish()
    }
}
