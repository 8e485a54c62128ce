//! SSMON API - Shared types for the system service monitor
//!
//! This crate holds what both sides of the monitor agree on:
//!
//! - **Error**: the crate-wide error type and the per-argument capture error
//! - **Wire**: the block format written into subscriber buffers, and a reader for it
//! - **ABI**: layouts of the caller structures that argument capture copies
//! - **Platform**: the collaborator traits the logger core is written against
//!
//! # Usage
//!
//! ```rust
//! use ssmon_api::wire::{Block, BlockReader};
//!
//! fn drain(buffer: &[u8], reader: &mut BlockReader, available: usize) -> usize {
//!     let mut events = 0;
//!     for _ in 0..available {
//!         if let Ok(Block::Event(_)) = reader.next_block(buffer) {
//!             events += 1;
//!         }
//!     }
//!     events
//! }
//! ```

#![no_std]

#[cfg(any(test, feature = "std"))]
extern crate std;

extern crate alloc;

pub mod abi;
pub mod error;
pub mod platform;
pub mod wire;

// Re-export commonly used types
pub use crate::error::{CaptureError, Error, Result};
pub use crate::platform::{ExecutionLevel, Platform, ProcessorMode};
pub use crate::wire::{ArgumentType, BlockType, EventFlags};
