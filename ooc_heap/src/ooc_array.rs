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
    marker::PhantomData,
    mem::size_of,
    ops::{Deref, DerefMut},
    ptr::NonNull,
    slice,
};
use std::io;

use crate::{
    address_allocator::Address, modules::backing_store::BackingStoreModule, ooc_heap::OOCHeap,
};

/// Reference to `len` consecutive objects of type `T` inside of an [`OOCHeap`].
///
/// Works like [`OOCPtr`](crate::OOCPtr), the whole array lives in one page.
pub struct OOCArrayPtr<'a, T: Copy, S: BackingStoreModule> {
    heap: &'a OOCHeap<S>,
    address: Address,
    len: usize,
    _phantom_data: PhantomData<T>,
}

impl<'a, T: Copy, S: BackingStoreModule> OOCArrayPtr<'a, T, S> {
    /// ### Safety
    ///
    /// `len` valid objects of type `T` have to be stored at `address`.
    pub unsafe fn from_address(heap: &'a OOCHeap<S>, address: Address, len: usize) -> Self {
        Self {
            heap,
            address,
            len,
            _phantom_data: PhantomData,
        }
    }

    #[inline]
    pub fn address(&self) -> Address {
        self.address
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn lock(&self) -> io::Result<OOCArrayPinGuard<'a, T, S>> {
        assert!(!self.address.is_null(), "lock of a null pointer");

        let ptr = self.heap.lock_object(self.address)? as *mut T;
        Ok(OOCArrayPinGuard {
            heap: self.heap,
            address: self.address,
            data_ref: unsafe { NonNull::new_unchecked(ptr) },
            len: self.len,
        })
    }
}

impl<T: Copy, S: BackingStoreModule> Clone for OOCArrayPtr<'_, T, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Copy, S: BackingStoreModule> Copy for OOCArrayPtr<'_, T, S> {}

pub struct OOCArrayPinGuard<'a, T: Copy, S: BackingStoreModule> {
    heap: &'a OOCHeap<S>,
    address: Address,
    data_ref: NonNull<T>,
    len: usize,
}

impl<T: Copy, S: BackingStoreModule> OOCArrayPinGuard<'_, T, S> {
    #[inline]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Copies all elements of `src` into this array.
    ///
    /// Panics if the lengths differ.
    pub fn copy_from(&mut self, src: &[T]) {
        assert_eq!(
            src.len(),
            self.len,
            "can not copy {} element(s) into an array of {} element(s)",
            src.len(),
            self.len
        );

        self.copy_from_slice(src);
    }

    /// Releases the pin, same as dropping this guard
    pub fn unlock(self) {}
}

impl<T: Copy, S: BackingStoreModule> Deref for OOCArrayPinGuard<'_, T, S> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        unsafe { slice::from_raw_parts(self.data_ref.as_ptr(), self.len) }
    }
}

impl<T: Copy, S: BackingStoreModule> DerefMut for OOCArrayPinGuard<'_, T, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { slice::from_raw_parts_mut(self.data_ref.as_ptr(), self.len) }
    }
}

impl<T: Copy, S: BackingStoreModule> Drop for OOCArrayPinGuard<'_, T, S> {
    fn drop(&mut self) {
        debug_assert!(self.len * size_of::<T>() <= self.heap.page_size());
        self.heap.release_object(self.address)
    }
}
