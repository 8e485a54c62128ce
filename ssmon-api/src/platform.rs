//! Platform collaborator interfaces
//!
//! Everything the logger needs from the host kernel goes through these
//! traits. The logger core is portable; an implementation of this module is
//! the only per-build piece.

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::abi::ClientId;
use crate::error::{Error, Result};

/// Privilege of the context that issued a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ProcessorMode {
    Kernel = 0,
    User = 1,
}

impl ProcessorMode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ProcessorMode::Kernel),
            1 => Some(ProcessorMode::User),
            _ => None,
        }
    }
}

/// Interrupt priority of the running processor, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExecutionLevel {
    Passive,
    Apc,
    Dispatch,
    High,
}

/// Deferred work handed to another processor
pub type ProcessorWork = Box<dyn FnOnce() + Send + 'static>;

/// Processing units of the machine
pub trait Processors: Send + Sync {
    /// Number of active processing units
    fn count(&self) -> usize;

    /// Index of the unit running the caller
    fn current(&self) -> usize;

    /// Queues `work` to run on unit `index` at dispatch level
    fn queue_on(&self, index: usize, work: ProcessorWork) -> Result<()>;

    /// Level of the calling processor
    fn current_level(&self) -> ExecutionLevel;

    /// Raises the caller to dispatch level and returns the previous level
    fn raise_level(&self) -> ExecutionLevel;

    /// Restores a level returned by [`Processors::raise_level`]
    fn lower_level(&self, previous: ExecutionLevel);
}

/// Size of the relative transfer written over a hooked prologue
pub const TRANSFER_SIZE: usize = 5;

/// Access to executable memory
pub trait CodePatchBackend: Send + Sync {
    /// Copies code bytes starting at `address`
    fn read(&self, address: u64, buf: &mut [u8]) -> Result<()>;

    /// Maps `len` bytes at `address` writable for the duration of `patch`
    ///
    /// The alias is torn down before this returns; page protections of the
    /// original mapping are never changed.
    fn with_writable_alias(
        &self,
        address: u64,
        len: usize,
        patch: &mut dyn FnMut(&mut [u8]),
    ) -> Result<()>;

    /// Encodes an unconditional transfer placed at `from` that lands on `to`
    fn transfer_bytes(&self, from: u64, to: u64) -> Result<[u8; TRANSFER_SIZE]> {
        let next = from.wrapping_add(TRANSFER_SIZE as u64);
        let displacement = to.wrapping_sub(next) as i64;
        let displacement =
            i32::try_from(displacement).map_err(|_| Error::NotSupported("transfer out of range"))?;
        let rel = displacement.to_le_bytes();
        Ok([0xe9, rel[0], rel[1], rel[2], rel[3]])
    }
}

/// Memory of the thread that made the intercepted call
pub trait CallerMemory: Send + Sync {
    /// Copies `buf.len()` bytes from `address`; a fault is reported as
    /// [`Error::AccessFault`]
    fn read(&self, address: u64, buf: &mut [u8]) -> Result<()>;
}

/// Opaque reference to a resolved object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// Object manager services used by handle capture
pub trait ObjectResolver: Send + Sync {
    /// References the object behind `handle` in the caller's handle table
    fn reference_by_handle(&self, handle: u64, mode: ProcessorMode) -> Result<ObjectId>;

    /// Writes the object's type name into `buf` and returns its length
    fn type_name(&self, object: ObjectId, buf: &mut [u8]) -> Result<usize>;

    /// Writes the object's name into `buf` and returns its length; a name
    /// that does not fit fails with [`Error::NameTooLong`]
    fn query_name(&self, object: ObjectId, buf: &mut [u8]) -> Result<usize>;

    /// Identity of a process or thread object
    fn identity(&self, object: ObjectId) -> Option<ClientId>;

    /// Drops a reference taken by [`ObjectResolver::reference_by_handle`]
    fn dereference(&self, object: ObjectId);
}

/// A subscriber process, referenced for as long as its client lives
pub trait ClientProcess: Send + Sync {
    fn process_id(&self) -> u64;

    /// Copies `data` into the process at `address`
    ///
    /// Runs attached to the process; a fault is reported as
    /// [`Error::AccessFault`].
    fn write(&self, address: u64, data: &[u8]) -> Result<()>;
}

/// A counting semaphore shared with a subscriber
pub trait Semaphore: Send + Sync {
    /// Takes one unit without waiting
    fn try_acquire(&self) -> bool;

    /// Adds `count` units; fails with [`Error::SemaphoreLimitExceeded`]
    fn release(&self, count: u32) -> Result<()>;
}

/// Resolves the handles a subscriber hands over at registration
pub trait ClientObjects: Send + Sync {
    fn open_process(&self, handle: u64, mode: ProcessorMode) -> Result<Arc<dyn ClientProcess>>;
    fn open_semaphore(&self, handle: u64, mode: ProcessorMode) -> Result<Arc<dyn Semaphore>>;
}

/// Call stack capture
pub trait StackTracer: Send + Sync {
    /// Fills `frames` with return addresses and returns how many were written
    fn capture(&self, frames: &mut [u64], user: bool) -> usize;
}

/// System time source
pub trait Clock: Send + Sync {
    /// Current system time in 100ns units
    fn now(&self) -> i64;
}

/// Where the logger's hook goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookTarget {
    /// Address inside the call-table dispatch path to patch
    pub target: u64,
    /// Entry stub that calls into the logger
    pub replacement: u64,
}

/// The collaborators bundled for one logger instance
#[derive(Clone)]
pub struct Platform {
    pub processors: Arc<dyn Processors>,
    pub code: Arc<dyn CodePatchBackend>,
    pub memory: Arc<dyn CallerMemory>,
    pub objects: Arc<dyn ObjectResolver>,
    pub clients: Arc<dyn ClientObjects>,
    pub tracer: Arc<dyn StackTracer>,
    pub clock: Arc<dyn Clock>,
    /// `None` on builds where the dispatch path is unknown
    pub hook_target: Option<HookTarget>,
}
