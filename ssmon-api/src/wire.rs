//! Subscriber wire format
//!
//! The producer writes a stream of variable-size blocks into the subscriber's
//! buffer. Every block starts with a 4-byte [`BlockHeader`] (total size
//! including the header, then the type tag); all integers are little-endian
//! and nothing is padded.
//!
//! ```text
//! event block     header | flags u32 | time i64 | pid u64 | tid u64 | number u32
//!                 | argc u16 | args off u16 | trace count u16 | trace off u16
//!                 | args [u64; argc] | trace [u64; trace count]
//! argument block  header | index u8 | type u8 | reserved u16 | payload
//! reset block     header
//! ```
//!
//! A reset block, or a tail shorter than a header, means "continue reading at
//! offset zero". [`BlockReader`] implements the consumer side of that rule.

use alloc::vec::Vec;
use bitflags::bitflags;
use static_assertions::const_assert_eq;

use crate::error::{Error, Result};

/// Size of the common block header
pub const BLOCK_HEADER_SIZE: usize = 4;
/// Largest block the 16-bit size field can describe
pub const MAX_BLOCK_SIZE: usize = u16::MAX as usize;

/// Size of the fixed part of an event block
pub const EVENT_BLOCK_SIZE: usize = 44;
/// Size of the fixed part of an argument block
pub const ARGUMENT_BLOCK_OVERHEAD: usize = 8;
/// Size of a reset block
pub const RESET_BLOCK_SIZE: usize = BLOCK_HEADER_SIZE;

/// Fixed part of a handle payload (two offsets and an id pair)
pub const HANDLE_PAYLOAD_SIZE: usize = 20;
/// Fixed part of a counted string payload (length, maximum length, pointer)
pub const COUNTED_STRING_PAYLOAD_SIZE: usize = 12;
/// Fixed part of a length-prefixed string or byte payload
pub const LENGTH_PREFIX_SIZE: usize = 2;
/// Fixed part of an attribute bundle payload (two offsets plus the raw bundle)
pub const ATTRIBUTE_BUNDLE_PAYLOAD_SIZE: usize = 4 + crate::abi::OBJECT_ATTRIBUTES_SIZE;

const_assert_eq!(EVENT_BLOCK_SIZE, 4 + 4 + 8 + 8 + 8 + 4 + 2 + 2 + 2 + 2);
const_assert_eq!(ARGUMENT_BLOCK_OVERHEAD, 4 + 1 + 1 + 2);
const_assert_eq!(HANDLE_PAYLOAD_SIZE, 2 + 2 + 8 + 8);

/// Byte offsets of the event block fields
pub mod event_offsets {
    pub const FLAGS: usize = 4;
    pub const TIME: usize = 8;
    pub const PROCESS_ID: usize = 16;
    pub const THREAD_ID: usize = 24;
    pub const NUMBER: usize = 32;
    pub const ARGUMENT_COUNT: usize = 36;
    pub const ARGUMENTS_OFFSET: usize = 38;
    pub const TRACE_COUNT: usize = 40;
    pub const TRACE_OFFSET: usize = 42;
}

/// Block type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BlockType {
    Reset = 1,
    Event = 2,
    Argument = 3,
}

impl BlockType {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(BlockType::Reset),
            2 => Some(BlockType::Event),
            3 => Some(BlockType::Argument),
            _ => None,
        }
    }
}

/// Common block header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Total size of the block, header included
    pub size: u16,
    /// Raw type tag
    pub block_type: u16,
}

impl BlockHeader {
    pub fn new(size: u16, block_type: BlockType) -> Self {
        Self { size, block_type: block_type as u16 }
    }

    pub fn to_bytes(self) -> [u8; BLOCK_HEADER_SIZE] {
        let size = self.size.to_le_bytes();
        let ty = self.block_type.to_le_bytes();
        [size[0], size[1], ty[0], ty[1]]
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < BLOCK_HEADER_SIZE {
            return None;
        }
        Some(Self { size: read_u16(bytes, 0), block_type: read_u16(bytes, 2) })
    }
}

/// The bytes of a reset block
pub fn reset_block() -> [u8; RESET_BLOCK_SIZE] {
    BlockHeader::new(RESET_BLOCK_SIZE as u16, BlockType::Reset).to_bytes()
}

bitflags! {
    /// Event block flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventFlags: u32 {
        /// The raw argument array failed the readability probe
        const PROBE_ARGUMENTS_FAILED = 0x1;
        /// Copying the raw argument array faulted
        const COPY_ARGUMENTS_FAILED = 0x2;
        /// The caller was unprivileged
        const USER_MODE = 0x4;
        /// The caller was privileged
        const KERNEL_MODE = 0x8;
    }
}

/// Semantic type of a call argument
///
/// The discriminant is the tag stored in argument blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ArgumentType {
    /// Plain value; the raw argument already carries everything
    Value = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    Handle = 5,
    NarrowString = 6,
    WideString = 7,
    CountedString = 8,
    AttributeBundle = 9,
    IdPair = 10,
    RegisterContext = 11,
    StackDescriptor = 12,
    Guid = 13,
    Bytes = 14,
}

impl ArgumentType {
    /// Number of argument types
    pub const COUNT: usize = 15;

    pub fn from_raw(raw: u8) -> Option<Self> {
        use ArgumentType::*;
        const ALL: [ArgumentType; ArgumentType::COUNT] = [
            Value,
            Int8,
            Int16,
            Int32,
            Int64,
            Handle,
            NarrowString,
            WideString,
            CountedString,
            AttributeBundle,
            IdPair,
            RegisterContext,
            StackDescriptor,
            Guid,
            Bytes,
        ];
        ALL.get(raw as usize).copied()
    }

    /// Width of a by-reference integer, if this is one
    pub fn scalar_size(self) -> Option<usize> {
        match self {
            ArgumentType::Int8 => Some(1),
            ArgumentType::Int16 => Some(2),
            ArgumentType::Int32 => Some(4),
            ArgumentType::Int64 => Some(8),
            _ => None,
        }
    }
}

/// Appends typed fields to a payload and hands back their offsets
///
/// Offsets are relative to the start of the payload. Every append is
/// fallible so a capture under memory pressure fails instead of aborting.
#[derive(Debug, Default)]
pub struct PayloadBuilder {
    bytes: Vec<u8>,
}

/// Position of a reserved 16-bit field, filled in later with [`PayloadBuilder::patch_u16`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot(usize);

impl PayloadBuilder {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(capacity)
            .map_err(|_| Error::InsufficientResources("payload"))?;
        Ok(Self { bytes })
    }

    /// Current length, which is also the offset of the next append
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Appends raw bytes and returns where they start
    pub fn put_bytes(&mut self, data: &[u8]) -> Result<usize> {
        let offset = self.bytes.len();
        if offset + data.len() > MAX_BLOCK_SIZE {
            return Err(Error::BufferTooSmall);
        }
        self.bytes
            .try_reserve(data.len())
            .map_err(|_| Error::InsufficientResources("payload"))?;
        self.bytes.extend_from_slice(data);
        Ok(offset)
    }

    pub fn put_u8(&mut self, value: u8) -> Result<usize> {
        self.put_bytes(&[value])
    }

    pub fn put_u16(&mut self, value: u16) -> Result<usize> {
        self.put_bytes(&value.to_le_bytes())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<usize> {
        self.put_bytes(&value.to_le_bytes())
    }

    pub fn put_u64(&mut self, value: u64) -> Result<usize> {
        self.put_bytes(&value.to_le_bytes())
    }

    /// Reserves a 16-bit field to be patched once its value is known
    pub fn reserve_u16(&mut self) -> Result<Slot> {
        self.put_u16(0).map(Slot)
    }

    pub fn patch_u16(&mut self, slot: Slot, value: u16) {
        self.bytes[slot.0..slot.0 + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Appends a length-prefixed string and returns the offset of its prefix
    pub fn put_string(&mut self, data: &[u8]) -> Result<u16> {
        let length = u16::try_from(data.len()).map_err(|_| Error::BufferTooSmall)?;
        let offset = self.put_u16(length)?;
        self.put_bytes(data)?;
        to_offset(offset)
    }

    /// Splices another payload in and returns its offset
    pub fn splice(&mut self, payload: &[u8]) -> Result<u16> {
        let offset = self.put_bytes(payload)?;
        to_offset(offset)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

fn to_offset(offset: usize) -> Result<u16> {
    u16::try_from(offset).map_err(|_| Error::BufferTooSmall)
}

/// Wraps a finished payload in an argument block
pub fn encode_argument_block(index: u8, arg_type: ArgumentType, payload: &[u8]) -> Result<Vec<u8>> {
    let size = ARGUMENT_BLOCK_OVERHEAD + payload.len();
    if size > MAX_BLOCK_SIZE {
        return Err(Error::BufferTooSmall);
    }
    let mut block = Vec::new();
    block
        .try_reserve_exact(size)
        .map_err(|_| Error::InsufficientResources("argument block"))?;
    block.extend_from_slice(&BlockHeader::new(size as u16, BlockType::Argument).to_bytes());
    block.push(index);
    block.push(arg_type as u8);
    block.extend_from_slice(&0u16.to_le_bytes());
    block.extend_from_slice(payload);
    Ok(block)
}

/// Problems found while decoding a subscriber buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// A block claims to extend past the end of the buffer
    Truncated { offset: usize },
    /// A block's size is smaller than its fixed part
    Malformed { offset: usize },
    /// Unknown block or argument type tag
    UnknownType(u16),
}

/// A decoded block borrowed from the subscriber buffer
#[derive(Debug, Clone, Copy)]
pub enum Block<'a> {
    Event(EventView<'a>),
    Argument(ArgumentView<'a>),
}

/// Read-only view of an event block
#[derive(Debug, Clone, Copy)]
pub struct EventView<'a> {
    bytes: &'a [u8],
}

impl<'a> EventView<'a> {
    pub fn parse(bytes: &'a [u8]) -> core::result::Result<Self, WireError> {
        if bytes.len() < EVENT_BLOCK_SIZE {
            return Err(WireError::Malformed { offset: 0 });
        }
        let view = Self { bytes };
        let args_end = view.arguments_offset() as usize + view.argument_count() as usize * 8;
        let trace_end = view.trace_offset() as usize + view.trace_count() as usize * 8;
        if args_end > bytes.len() || trace_end > bytes.len() {
            return Err(WireError::Malformed { offset: 0 });
        }
        Ok(view)
    }

    pub fn flags(&self) -> EventFlags {
        EventFlags::from_bits_retain(read_u32(self.bytes, event_offsets::FLAGS))
    }

    pub fn time(&self) -> i64 {
        read_u64(self.bytes, event_offsets::TIME) as i64
    }

    pub fn process_id(&self) -> u64 {
        read_u64(self.bytes, event_offsets::PROCESS_ID)
    }

    pub fn thread_id(&self) -> u64 {
        read_u64(self.bytes, event_offsets::THREAD_ID)
    }

    pub fn number(&self) -> u32 {
        read_u32(self.bytes, event_offsets::NUMBER)
    }

    pub fn argument_count(&self) -> u16 {
        read_u16(self.bytes, event_offsets::ARGUMENT_COUNT)
    }

    pub fn arguments_offset(&self) -> u16 {
        read_u16(self.bytes, event_offsets::ARGUMENTS_OFFSET)
    }

    pub fn trace_count(&self) -> u16 {
        read_u16(self.bytes, event_offsets::TRACE_COUNT)
    }

    pub fn trace_offset(&self) -> u16 {
        read_u16(self.bytes, event_offsets::TRACE_OFFSET)
    }

    /// Raw value of argument `index`
    pub fn argument(&self, index: usize) -> Option<u64> {
        if index >= self.argument_count() as usize {
            return None;
        }
        Some(read_u64(self.bytes, self.arguments_offset() as usize + index * 8))
    }

    /// Return address of trace frame `index`
    pub fn frame(&self, index: usize) -> Option<u64> {
        if index >= self.trace_count() as usize {
            return None;
        }
        Some(read_u64(self.bytes, self.trace_offset() as usize + index * 8))
    }
}

/// Read-only view of an argument block
#[derive(Debug, Clone, Copy)]
pub struct ArgumentView<'a> {
    bytes: &'a [u8],
}

impl<'a> ArgumentView<'a> {
    pub fn parse(bytes: &'a [u8]) -> core::result::Result<Self, WireError> {
        if bytes.len() < ARGUMENT_BLOCK_OVERHEAD {
            return Err(WireError::Malformed { offset: 0 });
        }
        if ArgumentType::from_raw(bytes[5]).is_none() {
            return Err(WireError::UnknownType(bytes[5] as u16));
        }
        Ok(Self { bytes })
    }

    pub fn index(&self) -> u8 {
        self.bytes[4]
    }

    pub fn arg_type(&self) -> ArgumentType {
        // Checked in `parse`.
        ArgumentType::from_raw(self.bytes[5]).unwrap_or(ArgumentType::Value)
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[ARGUMENT_BLOCK_OVERHEAD..]
    }

    /// Scalar value of an integer argument, widened to 64 bits
    pub fn scalar(&self) -> Option<u64> {
        let size = self.arg_type().scalar_size()?;
        let payload = self.payload();
        if payload.len() < size {
            return None;
        }
        let mut raw = [0u8; 8];
        raw[..size].copy_from_slice(&payload[..size]);
        Some(u64::from_le_bytes(raw))
    }

    /// Bytes of a narrow, wide or raw-bytes argument
    pub fn string(&self) -> Option<&'a [u8]> {
        match self.arg_type() {
            ArgumentType::NarrowString | ArgumentType::WideString | ArgumentType::Bytes => {
                read_string(self.payload(), 0)
            }
            ArgumentType::CountedString => read_counted_string(self.payload()).map(|s| s.buffer),
            _ => None,
        }
    }

    /// Decoded handle payload
    pub fn handle(&self) -> Option<HandleView<'a>> {
        if self.arg_type() != ArgumentType::Handle {
            return None;
        }
        HandleView::parse(self.payload())
    }

    /// Decoded attribute bundle payload
    pub fn attribute_bundle(&self) -> Option<AttributeBundleView<'a>> {
        if self.arg_type() != ArgumentType::AttributeBundle {
            return None;
        }
        AttributeBundleView::parse(self.payload())
    }
}

/// Decoded handle payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleView<'a> {
    pub type_name: &'a [u8],
    pub name: &'a [u8],
    pub process_id: u64,
    pub thread_id: u64,
}

impl<'a> HandleView<'a> {
    pub fn parse(payload: &'a [u8]) -> Option<Self> {
        if payload.len() < HANDLE_PAYLOAD_SIZE {
            return None;
        }
        Some(Self {
            type_name: read_string(payload, read_u16(payload, 0) as usize)?,
            name: read_string(payload, read_u16(payload, 2) as usize)?,
            process_id: read_u64(payload, 4),
            thread_id: read_u64(payload, 12),
        })
    }
}

/// Decoded counted string payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountedStringView<'a> {
    pub maximum_length: u16,
    pub pointer: u64,
    pub buffer: &'a [u8],
}

fn read_counted_string(payload: &[u8]) -> Option<CountedStringView<'_>> {
    if payload.len() < COUNTED_STRING_PAYLOAD_SIZE {
        return None;
    }
    let length = read_u16(payload, 0) as usize;
    let buffer = payload.get(COUNTED_STRING_PAYLOAD_SIZE..COUNTED_STRING_PAYLOAD_SIZE + length)?;
    Some(CountedStringView {
        maximum_length: read_u16(payload, 2),
        pointer: read_u64(payload, 4),
        buffer,
    })
}

/// Decoded attribute bundle payload
#[derive(Debug, Clone, Copy)]
pub struct AttributeBundleView<'a> {
    payload: &'a [u8],
}

impl<'a> AttributeBundleView<'a> {
    pub fn parse(payload: &'a [u8]) -> Option<Self> {
        if payload.len() < ATTRIBUTE_BUNDLE_PAYLOAD_SIZE {
            return None;
        }
        Some(Self { payload })
    }

    /// The bundle's fields as copied from the caller
    pub fn attributes(&self) -> crate::abi::ObjectAttributes {
        crate::abi::ObjectAttributes::parse(&self.payload[4..ATTRIBUTE_BUNDLE_PAYLOAD_SIZE])
    }

    pub fn root_directory(&self) -> Option<HandleView<'a>> {
        match read_u16(self.payload, 0) as usize {
            0 => None,
            offset => HandleView::parse(self.payload.get(offset..)?),
        }
    }

    pub fn object_name(&self) -> Option<CountedStringView<'a>> {
        match read_u16(self.payload, 2) as usize {
            0 => None,
            offset => read_counted_string(self.payload.get(offset..)?),
        }
    }
}

/// Consumer-side cursor over a subscriber buffer
///
/// Call [`BlockReader::next_block`] once per unit taken from the "block
/// available" semaphore.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockReader {
    cursor: usize,
}

impl BlockReader {
    pub fn new() -> Self {
        Self { cursor: 0 }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Decodes the next block, following reset blocks and implicit wraps
    pub fn next_block<'a>(&mut self, buffer: &'a [u8]) -> core::result::Result<Block<'a>, WireError> {
        let mut wrapped = false;
        loop {
            if buffer.len() - self.cursor.min(buffer.len()) < BLOCK_HEADER_SIZE {
                if wrapped {
                    return Err(WireError::Truncated { offset: self.cursor });
                }
                self.cursor = 0;
                wrapped = true;
                continue;
            }
            let header = BlockHeader::parse(&buffer[self.cursor..])
                .ok_or(WireError::Truncated { offset: self.cursor })?;
            let block_type = BlockType::from_raw(header.block_type)
                .ok_or(WireError::UnknownType(header.block_type))?;
            if block_type == BlockType::Reset {
                if wrapped || self.cursor == 0 {
                    return Err(WireError::Malformed { offset: self.cursor });
                }
                self.cursor = 0;
                wrapped = true;
                continue;
            }
            let size = header.size as usize;
            if size < BLOCK_HEADER_SIZE {
                return Err(WireError::Malformed { offset: self.cursor });
            }
            let end = self.cursor + size;
            if end > buffer.len() {
                return Err(WireError::Truncated { offset: self.cursor });
            }
            let bytes = &buffer[self.cursor..end];
            let offset = self.cursor;
            let block = match block_type {
                BlockType::Event => EventView::parse(bytes).map(Block::Event),
                BlockType::Argument => ArgumentView::parse(bytes).map(Block::Argument),
                BlockType::Reset => unreachable!(),
            }
            .map_err(|err| match err {
                WireError::Malformed { .. } => WireError::Malformed { offset },
                other => other,
            })?;
            self.cursor = end;
            return Ok(block);
        }
    }
}

pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

pub(crate) fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

fn read_string(payload: &[u8], offset: usize) -> Option<&[u8]> {
    let length = u16::from_le_bytes([*payload.get(offset)?, *payload.get(offset + 1)?]) as usize;
    payload.get(offset + LENGTH_PREFIX_SIZE..offset + LENGTH_PREFIX_SIZE + length)
}
