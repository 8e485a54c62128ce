//! Client transport
//!
//! Each subscriber owns a ring buffer in its own address space and two
//! counting semaphores. The producer takes one unit of the write semaphore
//! per block (never waiting: no unit means the block is dropped) and
//! releases one unit of the read semaphore after the block is in place.
//!
//! Writes for one event go through a [`Sequence`], which holds the buffer
//! lock so that blocks of different events never interleave.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use spin::{Mutex, MutexGuard};
use ssmon_api::platform::{ClientProcess, Semaphore};
use ssmon_api::wire::{reset_block, BLOCK_HEADER_SIZE};
use ssmon_api::{Error, Result};

/// What happened to one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The subscriber had no free space; counted in `blocks_dropped`
    Dropped,
}

/// Snapshot returned by a client query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientInformation {
    pub process_id: u64,
    pub buffer_base: u64,
    pub buffer_size: usize,
    pub blocks_written: u64,
    pub blocks_dropped: u64,
}

/// One registered subscriber
pub struct ClientEntry {
    process: Arc<dyn ClientProcess>,
    read_semaphore: Arc<dyn Semaphore>,
    write_semaphore: Arc<dyn Semaphore>,
    buffer_base: u64,
    buffer_size: usize,
    cursor: Mutex<usize>,
    enabled: AtomicBool,
    blocks_written: AtomicU64,
    blocks_dropped: AtomicU64,
}

impl ClientEntry {
    /// Creates a disabled client
    pub fn new(
        process: Arc<dyn ClientProcess>,
        read_semaphore: Arc<dyn Semaphore>,
        write_semaphore: Arc<dyn Semaphore>,
        buffer_base: u64,
        buffer_size: usize,
    ) -> Self {
        Self {
            process,
            read_semaphore,
            write_semaphore,
            buffer_base,
            buffer_size,
            cursor: Mutex::new(0),
            enabled: AtomicBool::new(false),
            blocks_written: AtomicU64::new(0),
            blocks_dropped: AtomicU64::new(0),
        }
    }

    pub fn process_id(&self) -> u64 {
        self.process.process_id()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written.load(Ordering::Relaxed)
    }

    pub fn blocks_dropped(&self) -> u64 {
        self.blocks_dropped.load(Ordering::Relaxed)
    }

    /// Current write offset into the subscriber buffer
    pub fn cursor(&self) -> usize {
        *self.cursor.lock()
    }

    pub fn information(&self) -> ClientInformation {
        ClientInformation {
            process_id: self.process_id(),
            buffer_base: self.buffer_base,
            buffer_size: self.buffer_size,
            blocks_written: self.blocks_written(),
            blocks_dropped: self.blocks_dropped(),
        }
    }

    /// Takes the buffer lock for the blocks of one event
    pub fn begin_sequence(&self) -> Sequence<'_> {
        Sequence { client: self, cursor: self.cursor.lock() }
    }

    /// Writes a single block as its own sequence
    pub fn write_block(&self, block: &[u8]) -> Result<WriteOutcome> {
        self.begin_sequence().write_block(block)
    }

    fn place(&self, cursor: &mut usize, block: &[u8]) -> Result<()> {
        let remaining = self.buffer_size.saturating_sub(*cursor);
        if remaining < BLOCK_HEADER_SIZE {
            ss_trace!("transport: pid {} implicit wrap at {}", self.process_id(), *cursor);
            *cursor = 0;
        } else if remaining < block.len() {
            self.process
                .write(self.buffer_base + *cursor as u64, &reset_block())?;
            ss_trace!("transport: pid {} reset block at {}", self.process_id(), *cursor);
            *cursor = 0;
        }

        if self.buffer_size - *cursor < block.len() {
            return Err(Error::BufferTooSmall);
        }

        self.process.write(self.buffer_base + *cursor as u64, block)?;
        self.read_semaphore.release(1)?;
        *cursor += block.len();
        self.blocks_written.fetch_add(1, Ordering::Relaxed);
        ss_trace!("transport: pid {} wrote {} bytes, cursor {}", self.process_id(), block.len(), *cursor);
        Ok(())
    }
}

impl Drop for ClientEntry {
    fn drop(&mut self) {
        ss_info!(
            "transport: client for pid {} destroyed ({} written, {} dropped)",
            self.process.process_id(),
            self.blocks_written(),
            self.blocks_dropped()
        );
    }
}

impl core::fmt::Debug for ClientEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClientEntry")
            .field("process_id", &self.process_id())
            .field("buffer_base", &self.buffer_base)
            .field("buffer_size", &self.buffer_size)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Exclusive access to a client's buffer for the blocks of one event
pub struct Sequence<'a> {
    client: &'a ClientEntry,
    cursor: MutexGuard<'a, usize>,
}

impl Sequence<'_> {
    /// Appends one block to the subscriber buffer
    ///
    /// `Ok(Dropped)` when the subscriber has no free space.
    /// `Err(BufferTooSmall)` when the buffer cannot hold the block even from
    /// offset zero; any other error is a fault writing into the subscriber.
    /// Neither error consumes a unit of free space.
    pub fn write_block(&mut self, block: &[u8]) -> Result<WriteOutcome> {
        let client = self.client;
        if !client.write_semaphore.try_acquire() {
            client.blocks_dropped.fetch_add(1, Ordering::Relaxed);
            ss_warn!("transport: pid {} buffer full, block dropped", client.process_id());
            return Ok(WriteOutcome::Dropped);
        }

        match client.place(&mut self.cursor, block) {
            Ok(()) => Ok(WriteOutcome::Written),
            Err(err) => {
                match err {
                    Error::BufferTooSmall => ss_warn!(
                        "transport: pid {} buffer of {} bytes cannot hold a {} byte block",
                        client.process_id(),
                        client.buffer_size,
                        block.len()
                    ),
                    _ => ss_error!("transport: pid {} write failed: {}", client.process_id(), err),
                }
                // Hand the unit back; nothing was published for it.
                let _ = client.write_semaphore.release(1);
                Err(err)
            }
        }
    }

    pub fn client(&self) -> &ClientEntry {
        self.client
    }
}
