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

//! Write fault interception for the cache buffer.
//!
//! Every cache slot starts out write protected after it was loaded. The first
//! write into such a slot raises `SIGSEGV` (or `SIGBUS` on some platforms).
//! The handler installed here looks the faulting address up in a registry of
//! protected regions, marks the slot dirty, removes the write protection and
//! returns so the faulting write is executed again.
//!
//! This is the only place that deals with page protection and signals.
//! Everything else talks to a [`ProtectedRegion`].

use core::{
    ptr::{null_mut, NonNull},
    sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering},
};
use std::{io, mem, sync::OnceLock};

use libc::{c_int, c_void, siginfo_t, PROT_READ, PROT_WRITE};
use log::trace;

/// Maximum number of heaps that can be alive at the same time
const MAX_REGIONS: usize = 64;

struct RegionState {
    base: usize,
    slot_size: usize,
    dirty: Box<[AtomicBool]>,
    protection_faults: AtomicU64,
}

/// Lookup entry that can be read from the signal handler without locking.
///
/// `base` and `len` are duplicated here, so a lookup never has to dereference
/// the state of a region that does not contain the faulting address.
struct RegistryEntry {
    base: AtomicUsize,
    len: AtomicUsize,
    state: AtomicPtr<RegionState>,
}

impl RegistryEntry {
    const fn empty() -> Self {
        Self {
            base: AtomicUsize::new(0),
            len: AtomicUsize::new(0),
            state: AtomicPtr::new(null_mut()),
        }
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_ENTRY: RegistryEntry = RegistryEntry::empty();
static REGISTRY: [RegistryEntry; MAX_REGIONS] = [EMPTY_ENTRY; MAX_REGIONS];

/// Signals caught by [`handle_fault`]
const FAULT_SIGNALS: [c_int; 2] = [libc::SIGSEGV, libc::SIGBUS];

/// Actions that were installed before ours, in the order of `FAULT_SIGNALS`.
/// Set once the handler is installed.
static PREVIOUS_ACTIONS: OnceLock<[libc::sigaction; 2]> = OnceLock::new();

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FaultResolution {
    /// First write into a protected slot, the slot is writable now
    Resolved,
    /// Fault inside a registered region whose slot was already writable,
    /// so this is not a protection fault
    Repeated,
    /// Fault outside of every registered cache buffer
    Foreign,
}

/// A memory area `[base, base + slot_size * slot_count)` whose slots can be
/// write protected individually.
///
/// The area itself is not owned, the owner has to keep it mapped for as
/// long as this region exists.
pub(crate) struct ProtectedRegion {
    entry: &'static RegistryEntry,
    state: NonNull<RegionState>,
}

impl ProtectedRegion {
    /// Registers a new region so that write faults inside of it are converted
    /// into dirty markers.
    ///
    /// ### Safety
    ///
    /// `base` has to be aligned to the system page size and `slot_size` has to
    /// be a multiple of it. `[base, base + slot_size * slot_count)` has to stay
    /// mapped until this region is dropped.
    pub(crate) unsafe fn register(base: *mut u8, slot_size: usize, slot_count: usize) -> Self {
        install_handler();

        let state = Box::into_raw(Box::new(RegionState {
            base: base as usize,
            slot_size,
            dirty: (0..slot_count).map(|_| AtomicBool::new(false)).collect(),
            protection_faults: AtomicU64::new(0),
        }));

        for entry in REGISTRY.iter() {
            if entry
                .state
                .compare_exchange(null_mut(), state, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                entry.base.store(base as usize, Ordering::Relaxed);
                entry.len.store(slot_size * slot_count, Ordering::Release);

                trace!(
                    "Registered protected region at {:p} ({} slot(s) with {} bytes)",
                    base,
                    slot_count,
                    slot_size
                );

                return Self {
                    entry,
                    state: NonNull::new_unchecked(state),
                };
            }
        }

        drop(Box::from_raw(state));
        panic!(
            "too many out-of-core heaps alive at the same time (maximum: {})",
            MAX_REGIONS
        );
    }

    fn state(&self) -> &RegionState {
        unsafe { self.state.as_ref() }
    }

    /// Removes write access from `slot`, the next write will be detected
    pub(crate) fn protect(&self, slot: usize) -> io::Result<()> {
        self.set_protection(slot, PROT_READ)
    }

    /// Allows writes to `slot` without faulting
    pub(crate) fn unprotect(&self, slot: usize) -> io::Result<()> {
        self.set_protection(slot, PROT_READ | PROT_WRITE)
    }

    fn set_protection(&self, slot: usize, protection: c_int) -> io::Result<()> {
        let state = self.state();
        debug_assert!(slot < state.dirty.len(), "slot {} out of range", slot);

        let ptr = (state.base + slot * state.slot_size) as *mut c_void;
        if unsafe { libc::mprotect(ptr, state.slot_size, protection) } != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    pub(crate) fn is_dirty(&self, slot: usize) -> bool {
        self.state().dirty[slot].load(Ordering::Acquire)
    }

    pub(crate) fn mark_dirty(&self, slot: usize) {
        self.state().dirty[slot].store(true, Ordering::Release);
    }

    pub(crate) fn clear_dirty(&self, slot: usize) {
        self.state().dirty[slot].store(false, Ordering::Release);
    }

    /// How many first writes were detected so far
    pub(crate) fn protection_faults(&self) -> u64 {
        self.state().protection_faults.load(Ordering::Relaxed)
    }
}

impl Drop for ProtectedRegion {
    fn drop(&mut self) {
        self.entry.len.store(0, Ordering::Release);
        self.entry.base.store(0, Ordering::Relaxed);
        self.entry.state.store(null_mut(), Ordering::Release);

        unsafe { drop(Box::from_raw(self.state.as_ptr())) };
    }
}

/// Handles a write fault at `address`.
///
/// Called from the signal handler, so this must neither allocate nor panic.
pub(crate) fn resolve_fault(address: usize) -> FaultResolution {
    for entry in REGISTRY.iter() {
        let len = entry.len.load(Ordering::Acquire);
        let base = entry.base.load(Ordering::Relaxed);
        if len == 0 || address < base || address >= base + len {
            continue;
        }

        let state = entry.state.load(Ordering::Acquire);
        if state.is_null() {
            continue;
        }

        // only the thread owning a heap writes into its buffer,
        // so the region can not be unregistered while we are in here
        let state = unsafe { &*state };
        let slot = (address - state.base) / state.slot_size;

        if state.dirty[slot].swap(true, Ordering::AcqRel) {
            return FaultResolution::Repeated;
        }
        state.protection_faults.fetch_add(1, Ordering::Relaxed);

        let ptr = (state.base + slot * state.slot_size) as *mut c_void;
        if unsafe { libc::mprotect(ptr, state.slot_size, PROT_READ | PROT_WRITE) } != 0 {
            return FaultResolution::Repeated;
        }

        return FaultResolution::Resolved;
    }

    FaultResolution::Foreign
}

fn install_handler() {
    PREVIOUS_ACTIONS.get_or_init(|| unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = handle_fault as usize;
        // std sets up an alternate signal stack for its threads,
        // stack overflows are forwarded to its handler on that stack
        action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
        libc::sigemptyset(&mut action.sa_mask);

        let mut previous: [libc::sigaction; 2] = mem::zeroed();
        for (signal, previous) in FAULT_SIGNALS.iter().zip(previous.iter_mut()) {
            if libc::sigaction(*signal, &action, previous) != 0 {
                panic!(
                    "failed to install write fault handler: {}",
                    io::Error::last_os_error()
                );
            }
        }

        previous
    });
}

/// Hands a fault that does not belong to any heap to the action that was
/// installed before ours (e.g. the stack overflow detection of std).
///
/// Returns `false` if that action is the default one or ignores the signal.
unsafe fn forward_fault(signal: c_int, info: *mut siginfo_t, context: *mut c_void) -> bool {
    let Some(previous) = PREVIOUS_ACTIONS.get().and_then(|actions| {
        FAULT_SIGNALS
            .iter()
            .position(|s| *s == signal)
            .map(|i| &actions[i])
    }) else {
        return false;
    };

    match previous.sa_sigaction {
        libc::SIG_DFL | libc::SIG_IGN => false,
        handler if previous.sa_flags & libc::SA_SIGINFO != 0 => {
            let handler: extern "C" fn(c_int, *mut siginfo_t, *mut c_void) =
                mem::transmute(handler);
            handler(signal, info, context);
            true
        }
        handler => {
            let handler: extern "C" fn(c_int) = mem::transmute(handler);
            handler(signal);
            true
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn fault_address(info: *const siginfo_t) -> usize {
    (*info).si_addr() as usize
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
unsafe fn fault_address(info: *const siginfo_t) -> usize {
    (*info).si_addr as usize
}

extern "C" fn handle_fault(signal: c_int, info: *mut siginfo_t, context: *mut c_void) {
    let address = unsafe { fault_address(info) };

    let reason: &[u8] = match resolve_fault(address) {
        FaultResolution::Resolved => return,
        FaultResolution::Repeated => b"repeated fault inside a writable cache slot\n",
        FaultResolution::Foreign => {
            if unsafe { forward_fault(signal, info, context) } {
                return;
            }
            b"segmentation violation outside of every cache buffer, there is a bug somewhere\n"
        }
    };

    // we are inside of a signal handler, so do not use print
    write_stderr(b"fatal memory fault at address 0x");
    write_hex(address);
    write_stderr(b": ");
    write_stderr(reason);

    unsafe { libc::abort() };
}

fn write_stderr(text: &[u8]) {
    unsafe { libc::write(libc::STDERR_FILENO, text.as_ptr() as *const c_void, text.len()) };
}

fn write_hex(mut value: usize) {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut buf = [b'0'; 2 * mem::size_of::<usize>()];
    let mut pos = buf.len();

    loop {
        pos -= 1;
        buf[pos] = DIGITS[value % 16];
        value /= 16;
        if value == 0 {
            break;
        }
    }

    write_stderr(&buf[pos..]);
}

#[cfg(test)]
mod test {
    use core::ptr::write_volatile;

    use core::{mem, ptr::null};

    use super::{
        handle_fault, install_handler, resolve_fault, FaultResolution, ProtectedRegion,
        FAULT_SIGNALS, PREVIOUS_ACTIONS,
    };
    use crate::modules::memory_provider::{MMapMemoryProvider, MemoryProviderModule};

    #[test]
    fn test_previous_actions_are_kept() {
        install_handler();
        let previous = PREVIOUS_ACTIONS.get().unwrap();

        for (signal, previous) in FAULT_SIGNALS.iter().zip(previous.iter()) {
            let mut current: libc::sigaction = unsafe { mem::zeroed() };
            assert_eq!(unsafe { libc::sigaction(*signal, null(), &mut current) }, 0);

            assert_eq!(current.sa_sigaction, handle_fault as usize);
            assert_ne!(current.sa_flags & libc::SA_ONSTACK, 0);

            // faults outside of the heaps are handed to this one
            assert_ne!(previous.sa_sigaction, handle_fault as usize);
        }
    }

    #[test]
    fn test_first_write_marks_slot_dirty() {
        let slot_size = MMapMemoryProvider::min_size();
        unsafe {
            let base = MMapMemoryProvider::map_block(slot_size * 2).unwrap();
            let region = ProtectedRegion::register(base, slot_size, 2);

            region.protect(0).unwrap();
            region.protect(1).unwrap();

            // reading does not fault
            assert_eq!(*base.add(slot_size + 10), 0);
            assert!(!region.is_dirty(1));

            write_volatile(base.add(slot_size + 10), 42);
            assert!(region.is_dirty(1));
            assert!(!region.is_dirty(0));
            assert_eq!(region.protection_faults(), 1);

            // slot is writable now, no more faults
            write_volatile(base.add(slot_size + 11), 43);
            write_volatile(base.add(slot_size + 12), 44);
            assert_eq!(region.protection_faults(), 1);
            assert_eq!(*base.add(slot_size + 10), 42);

            // protecting again re-arms the detection
            region.protect(1).unwrap();
            region.clear_dirty(1);
            write_volatile(base.add(slot_size), 1);
            assert!(region.is_dirty(1));
            assert_eq!(region.protection_faults(), 2);

            drop(region);
            MMapMemoryProvider::unmap_block(base, slot_size * 2);
        }
    }

    #[test]
    fn test_resolve_fault_outside_of_regions() {
        let local = 0u64;
        assert_eq!(
            resolve_fault(&local as *const u64 as usize),
            FaultResolution::Foreign
        );
    }

    #[test]
    fn test_resolve_fault_on_writable_slot() {
        let slot_size = MMapMemoryProvider::min_size();
        unsafe {
            let base = MMapMemoryProvider::map_block(slot_size).unwrap();
            let region = ProtectedRegion::register(base, slot_size, 1);

            assert_eq!(resolve_fault(base as usize + 8), FaultResolution::Resolved);
            assert!(region.is_dirty(0));
            assert_eq!(resolve_fault(base as usize + 8), FaultResolution::Repeated);

            drop(region);
            assert_eq!(resolve_fault(base as usize + 8), FaultResolution::Foreign);
            MMapMemoryProvider::unmap_block(base, slot_size);
        }
    }
}
