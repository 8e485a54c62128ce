//! Guest ABI layouts
//!
//! Layouts of the caller structures that argument capture copies, for the
//! supported 64-bit build. Everything is little-endian; padding is spelled
//! out so the sizes match what the caller passes.

use crate::wire::{read_u16, read_u32, read_u64};
use static_assertions::const_assert_eq;

/// Counted string: length u16, maximum length u16, padding u32, buffer u64
pub const UNICODE_STRING_SIZE: usize = 16;
/// Attribute bundle as passed to object open/create calls
pub const OBJECT_ATTRIBUTES_SIZE: usize = 48;
/// Process id and thread id pair
pub const CLIENT_ID_SIZE: usize = 16;
/// Initial stack descriptor: five pointer-sized fields
pub const INITIAL_TEB_SIZE: usize = 40;
/// Globally unique identifier
pub const GUID_SIZE: usize = 16;

const_assert_eq!(OBJECT_ATTRIBUTES_SIZE, 4 + 4 + 8 + 8 + 4 + 4 + 8 + 8);
const_assert_eq!(INITIAL_TEB_SIZE, 5 * 8);

/// Pseudo handle for the current process
pub const CURRENT_PROCESS_HANDLE: u64 = u64::MAX;
/// Pseudo handle for the current thread
pub const CURRENT_THREAD_HANDLE: u64 = u64::MAX - 1;

/// Whether a handle value refers to the kernel handle table
///
/// Kernel handles have the sign bit set. The two pseudo handles also do but
/// are valid from any caller.
pub fn is_kernel_handle(handle: u64) -> bool {
    (handle as i64) < 0 && handle != CURRENT_PROCESS_HANDLE && handle != CURRENT_THREAD_HANDLE
}

/// Caller's counted string header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnicodeString {
    /// Length in bytes, not counting any terminator
    pub length: u16,
    pub maximum_length: u16,
    pub buffer: u64,
}

impl UnicodeString {
    pub fn parse(bytes: &[u8]) -> Self {
        Self {
            length: read_u16(bytes, 0),
            maximum_length: read_u16(bytes, 2),
            buffer: read_u64(bytes, 8),
        }
    }
}

/// Caller's attribute bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectAttributes {
    pub length: u32,
    pub root_directory: u64,
    pub object_name: u64,
    pub attributes: u32,
    pub security_descriptor: u64,
    pub security_quality_of_service: u64,
}

impl ObjectAttributes {
    pub fn parse(bytes: &[u8]) -> Self {
        Self {
            length: read_u32(bytes, 0),
            root_directory: read_u64(bytes, 8),
            object_name: read_u64(bytes, 16),
            attributes: read_u32(bytes, 24),
            security_descriptor: read_u64(bytes, 32),
            security_quality_of_service: read_u64(bytes, 40),
        }
    }

    pub fn to_bytes(&self) -> [u8; OBJECT_ATTRIBUTES_SIZE] {
        let mut bytes = [0u8; OBJECT_ATTRIBUTES_SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.root_directory.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.object_name.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.attributes.to_le_bytes());
        bytes[32..40].copy_from_slice(&self.security_descriptor.to_le_bytes());
        bytes[40..48].copy_from_slice(&self.security_quality_of_service.to_le_bytes());
        bytes
    }
}

/// Process and thread identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ClientId {
    pub process_id: u64,
    pub thread_id: u64,
}

/// Register context geometry for the supported build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLayout {
    /// Size of the whole context record
    pub size: usize,
    /// Offset of the instruction pointer within the record
    pub instruction_pointer_offset: usize,
}

impl ContextLayout {
    /// x86-64 context record
    pub const AMD64: ContextLayout = ContextLayout { size: 1232, instruction_pointer_offset: 0xf8 };

    /// Reads the instruction pointer out of a copied context record
    pub fn instruction_pointer(&self, context: &[u8]) -> Option<u64> {
        let offset = self.instruction_pointer_offset;
        if context.len() < offset + 8 {
            return None;
        }
        Some(read_u64(context, offset))
    }
}

impl Default for ContextLayout {
    fn default() -> Self {
        Self::AMD64
    }
}
