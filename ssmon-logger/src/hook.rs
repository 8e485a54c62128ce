//! Hook engine
//!
//! Two kinds of redirection, both applied with every other processor parked:
//!
//! - [`CodeHook`] overwrites the first bytes of a function with a relative
//!   transfer to a replacement and keeps the original bytes for removal.
//! - [`PointerHook`] swaps a function-pointer slot.
//!
//! Neither supports installing twice; callers track hook identity.

use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;
use ssmon_api::platform::{CodePatchBackend, TRANSFER_SIZE};
use ssmon_api::{Error, Result};

use crate::quiesce::ProcessorLock;

/// Inline code patch over a function prologue
pub struct CodeHook {
    target: u64,
    replacement: u64,
    saved: Mutex<Option<[u8; TRANSFER_SIZE]>>,
}

impl CodeHook {
    pub fn new(target: u64, replacement: u64) -> Self {
        Self { target, replacement, saved: Mutex::new(None) }
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    /// Address the replacement jumps back to once it is done
    pub fn continuation(&self) -> u64 {
        self.target + TRANSFER_SIZE as u64
    }

    pub fn is_hooked(&self) -> bool {
        self.saved.lock().is_some()
    }

    /// Prologue bytes displaced by the patch, while installed
    pub fn original_bytes(&self) -> Option<[u8; TRANSFER_SIZE]> {
        *self.saved.lock()
    }

    /// Writes the transfer over the target
    ///
    /// On failure the target is left untouched.
    pub fn install(&self, lock: &ProcessorLock, code: &dyn CodePatchBackend) -> Result<()> {
        let mut saved = self.saved.lock();
        if saved.is_some() {
            return Err(Error::InvalidState("already hooked"));
        }

        let transfer = code.transfer_bytes(self.target, self.replacement)?;
        let mut original = [0u8; TRANSFER_SIZE];

        let token = lock.acquire()?;
        code.read(self.target, &mut original)?;
        code.with_writable_alias(self.target, TRANSFER_SIZE, &mut |bytes| {
            bytes.copy_from_slice(&transfer)
        })?;
        token.release();

        *saved = Some(original);
        ss_debug!("hook: patched {:#x} -> {:#x}", self.target, self.replacement);
        Ok(())
    }

    /// Restores the saved prologue
    pub fn remove(&self, lock: &ProcessorLock, code: &dyn CodePatchBackend) -> Result<()> {
        let mut saved = self.saved.lock();
        let original = (*saved).ok_or(Error::NotHooked)?;

        let token = lock.acquire()?;
        code.with_writable_alias(self.target, TRANSFER_SIZE, &mut |bytes| {
            bytes.copy_from_slice(&original)
        })?;
        token.release();

        *saved = None;
        ss_debug!("hook: restored {:#x}", self.target);
        Ok(())
    }
}

/// Function-pointer slot swap
pub struct PointerHook<'a> {
    slot: &'a AtomicU64,
    replacement: u64,
    saved: Mutex<Option<u64>>,
}

impl<'a> PointerHook<'a> {
    pub fn new(slot: &'a AtomicU64, replacement: u64) -> Self {
        Self { slot, replacement, saved: Mutex::new(None) }
    }

    pub fn is_hooked(&self) -> bool {
        self.saved.lock().is_some()
    }

    /// Pointer that was in the slot before installation
    pub fn original(&self) -> Option<u64> {
        *self.saved.lock()
    }

    pub fn install(&self, lock: &ProcessorLock) -> Result<()> {
        let mut saved = self.saved.lock();
        if saved.is_some() {
            return Err(Error::InvalidState("already hooked"));
        }

        let token = lock.acquire()?;
        let original = self.slot.swap(self.replacement, Ordering::AcqRel);
        token.release();

        *saved = Some(original);
        Ok(())
    }

    pub fn remove(&self, lock: &ProcessorLock) -> Result<()> {
        let mut saved = self.saved.lock();
        let original = (*saved).ok_or(Error::NotHooked)?;

        let token = lock.acquire()?;
        self.slot.store(original, Ordering::Release);
        token.release();

        *saved = None;
        Ok(())
    }
}
