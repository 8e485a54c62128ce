//! Error handling module for the system service monitor
//!
//! Setup and teardown failures are reported through [`Error`]. Per-argument
//! capture failures use the separate [`CaptureError`] so they can never be
//! mistaken for something the management caller has to handle.

use core::fmt;

/// Common error type used throughout the system service monitor
///
/// Context payloads are `&'static str` so that building an error never
/// allocates; several of these are produced on the interception path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A parameter was rejected (1-based index, as in status codes)
    InvalidParameter(u8, &'static str),
    /// A handle did not refer to a live object of the expected kind
    InvalidHandle(&'static str),
    /// The operation is not valid in the current state
    InvalidState(&'static str),
    /// The platform build does not support the operation
    NotSupported(&'static str),
    /// An allocation or other resource reservation failed
    InsufficientResources(&'static str),
    /// A hook was removed that is not installed
    NotHooked,
    /// The destination cannot hold the data even when empty
    BufferTooSmall,
    /// Touching memory at the given address faulted
    AccessFault(u64),
    /// Releasing a semaphore would exceed its limit
    SemaphoreLimitExceeded,
    /// Resource not found
    NotFound(&'static str),
    /// A name did not fit the fixed scratch buffer
    NameTooLong,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidParameter(index, msg) => {
                write!(f, "Invalid parameter {}: {}", index, msg)
            }
            Error::InvalidHandle(msg) => write!(f, "Invalid handle: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::NotSupported(msg) => write!(f, "Not supported: {}", msg),
            Error::InsufficientResources(msg) => write!(f, "Insufficient resources: {}", msg),
            Error::NotHooked => write!(f, "Not hooked"),
            Error::BufferTooSmall => write!(f, "Buffer too small"),
            Error::AccessFault(address) => write!(f, "Access fault at {:#x}", address),
            Error::SemaphoreLimitExceeded => write!(f, "Semaphore limit exceeded"),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::NameTooLong => write!(f, "Name too long"),
        }
    }
}

/// Result type for operations that can fail
pub type Result<T> = core::result::Result<T, Error>;

/// Why a single argument could not be captured
///
/// None of these escalate: the argument is left out of the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureError {
    /// The pointer or handle was null
    Null,
    /// Probing or copying caller memory faulted
    Unreadable(u64),
    /// The payload is larger than the capture limit
    Oversize,
    /// The argument type has no capture routine
    Unsupported,
    /// A kernel handle was passed by a less trusted caller
    InvalidHandle,
    /// The object behind a handle could not be resolved or named
    ResolutionFailed,
    /// The record would not fit a block
    TooLarge,
    /// Allocating the record failed
    NoMemory,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Null => write!(f, "null argument"),
            CaptureError::Unreadable(address) => write!(f, "unreadable at {:#x}", address),
            CaptureError::Oversize => write!(f, "payload exceeds capture limit"),
            CaptureError::Unsupported => write!(f, "unsupported argument type"),
            CaptureError::InvalidHandle => write!(f, "invalid handle for caller"),
            CaptureError::ResolutionFailed => write!(f, "object resolution failed"),
            CaptureError::TooLarge => write!(f, "record exceeds block size"),
            CaptureError::NoMemory => write!(f, "out of memory"),
        }
    }
}

impl From<Error> for CaptureError {
    fn from(err: Error) -> Self {
        match err {
            Error::AccessFault(address) => CaptureError::Unreadable(address),
            Error::InsufficientResources(_) => CaptureError::NoMemory,
            Error::InvalidHandle(_) => CaptureError::InvalidHandle,
            Error::NameTooLong => CaptureError::Oversize,
            Error::BufferTooSmall => CaptureError::TooLarge,
            _ => CaptureError::ResolutionFailed,
        }
    }
}
