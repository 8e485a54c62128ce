//! Argument capture
//!
//! Turns a raw argument value plus its semantic type into the payload of an
//! argument block. Each type has one [`ArgumentCapture`] implementation,
//! picked from a table indexed by the type tag.
//!
//! Every read of caller memory goes through [`CaptureContext`], which probes
//! the range for less trusted callers and reports faults as
//! [`CaptureError`]. A failed capture only means the argument is left out of
//! the event.

use alloc::vec::Vec;

use ssmon_api::abi::{
    self, ContextLayout, ObjectAttributes, UnicodeString, CLIENT_ID_SIZE, GUID_SIZE,
    INITIAL_TEB_SIZE, OBJECT_ATTRIBUTES_SIZE, UNICODE_STRING_SIZE,
};
use ssmon_api::platform::{CallerMemory, ObjectResolver, ProcessorMode};
use ssmon_api::wire::{encode_argument_block, PayloadBuilder};
use ssmon_api::{ArgumentType, CaptureError};

use crate::config::CaptureLimits;

/// What a capture routine may touch
pub struct CaptureContext<'a> {
    pub memory: &'a dyn CallerMemory,
    pub objects: &'a dyn ObjectResolver,
    /// Privilege of the intercepted caller
    pub mode: ProcessorMode,
    pub limits: CaptureLimits,
    pub highest_user_address: u64,
    pub context_layout: ContextLayout,
}

impl CaptureContext<'_> {
    /// Checks that a less trusted caller may read `[address, address + len)`
    pub fn probe(&self, address: u64, len: usize) -> Result<(), CaptureError> {
        if self.mode == ProcessorMode::Kernel || len == 0 {
            return Ok(());
        }
        match address.checked_add(len as u64) {
            Some(end) if end <= self.highest_user_address.saturating_add(1) => Ok(()),
            _ => Err(CaptureError::Unreadable(address)),
        }
    }

    /// Probes then copies into `buf`
    pub fn copy(&self, address: u64, buf: &mut [u8]) -> Result<(), CaptureError> {
        self.probe(address, buf.len())?;
        self.memory.read(address, buf).map_err(CaptureError::from)
    }

    /// Probes then copies `len` bytes into a new buffer
    pub fn copy_vec(&self, address: u64, len: usize) -> Result<Vec<u8>, CaptureError> {
        let mut bytes = zeroed(len)?;
        self.copy(address, &mut bytes)?;
        Ok(bytes)
    }
}

fn zeroed(len: usize) -> Result<Vec<u8>, CaptureError> {
    let mut bytes = Vec::new();
    bytes.try_reserve_exact(len).map_err(|_| CaptureError::NoMemory)?;
    bytes.resize(len, 0);
    Ok(bytes)
}

/// One argument as seen by a capture routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawArgument {
    /// The argument value from the caller's argument array
    pub value: u64,
    /// Byte count taken from a sibling argument, for sized buffers
    pub length: Option<u64>,
}

impl RawArgument {
    pub fn new(value: u64) -> Self {
        Self { value, length: None }
    }

    pub fn with_length(value: u64, length: u64) -> Self {
        Self { value, length: Some(length) }
    }
}

/// Capture routine for one semantic type
pub trait ArgumentCapture: Sync {
    fn capture(
        &self,
        raw: &RawArgument,
        cx: &CaptureContext<'_>,
        out: &mut PayloadBuilder,
    ) -> Result<(), CaptureError>;
}

/// Plain values carry nothing beyond the raw argument
struct NotCaptured;

impl ArgumentCapture for NotCaptured {
    fn capture(&self, _: &RawArgument, _: &CaptureContext<'_>, _: &mut PayloadBuilder) -> Result<(), CaptureError> {
        Err(CaptureError::Unsupported)
    }
}

/// Fixed-size copy through a pointer: by-reference integers and plain structures
struct FixedCopy(usize);

impl ArgumentCapture for FixedCopy {
    fn capture(
        &self,
        raw: &RawArgument,
        cx: &CaptureContext<'_>,
        out: &mut PayloadBuilder,
    ) -> Result<(), CaptureError> {
        let mut value = [0u8; 64];
        let value = value.get_mut(..self.0).ok_or(CaptureError::Unsupported)?;
        cx.copy(raw.value, value)?;
        out.put_bytes(value)?;
        Ok(())
    }
}

struct RegisterContextCapture;

impl ArgumentCapture for RegisterContextCapture {
    fn capture(
        &self,
        raw: &RawArgument,
        cx: &CaptureContext<'_>,
        out: &mut PayloadBuilder,
    ) -> Result<(), CaptureError> {
        let context = cx.copy_vec(raw.value, cx.context_layout.size)?;
        out.put_bytes(&context)?;
        Ok(())
    }
}

/// Handle: object type name, object name, and identity for processes and threads
struct HandleCapture;

impl ArgumentCapture for HandleCapture {
    fn capture(
        &self,
        raw: &RawArgument,
        cx: &CaptureContext<'_>,
        out: &mut PayloadBuilder,
    ) -> Result<(), CaptureError> {
        capture_handle(raw.value, cx, out)
    }
}

fn capture_handle(handle: u64, cx: &CaptureContext<'_>, out: &mut PayloadBuilder) -> Result<(), CaptureError> {
    if handle == 0 {
        return Err(CaptureError::Null);
    }
    if cx.mode != ProcessorMode::Kernel && abi::is_kernel_handle(handle) {
        return Err(CaptureError::InvalidHandle);
    }

    let object = cx
        .objects
        .reference_by_handle(handle, cx.mode)
        .map_err(|_| CaptureError::ResolutionFailed)?;

    let result = (|| -> Result<(), CaptureError> {
        let mut scratch = zeroed(cx.limits.name_scratch_bytes)?;
        let type_slot = out.reserve_u16()?;
        let name_slot = out.reserve_u16()?;
        let identity = cx.objects.identity(object).unwrap_or_default();
        out.put_u64(identity.process_id)?;
        out.put_u64(identity.thread_id)?;

        let length = cx.objects.type_name(object, &mut scratch)?;
        if length > scratch.len() {
            return Err(CaptureError::Oversize);
        }
        let type_name = out.put_string(&scratch[..length])?;
        out.patch_u16(type_slot, type_name);

        let length = cx.objects.query_name(object, &mut scratch)?;
        if length > scratch.len() {
            return Err(CaptureError::Oversize);
        }
        let name = out.put_string(&scratch[..length])?;
        out.patch_u16(name_slot, name);
        Ok(())
    })();

    cx.objects.dereference(object);
    result
}

/// Zero-terminated string, or one sized by a sibling argument
struct TerminatedString {
    unit: usize,
}

impl ArgumentCapture for TerminatedString {
    fn capture(
        &self,
        raw: &RawArgument,
        cx: &CaptureContext<'_>,
        out: &mut PayloadBuilder,
    ) -> Result<(), CaptureError> {
        let max = cx.limits.string_max_bytes;
        let bytes = match raw.length {
            Some(length) => {
                let length = usize::try_from(length).map_err(|_| CaptureError::Oversize)?;
                if length > max {
                    return Err(CaptureError::Oversize);
                }
                cx.copy_vec(raw.value, length)?
            }
            None => self.scan(raw.value, cx, max)?,
        };
        out.put_string(&bytes)?;
        Ok(())
    }
}

impl TerminatedString {
    fn scan(&self, address: u64, cx: &CaptureContext<'_>, max: usize) -> Result<Vec<u8>, CaptureError> {
        let mut bytes = Vec::new();
        let mut unit = [0u8; 2];
        let unit = &mut unit[..self.unit];
        loop {
            let at = address.wrapping_add(bytes.len() as u64);
            cx.copy(at, unit)?;
            if unit.iter().all(|&b| b == 0) {
                return Ok(bytes);
            }
            if bytes.len() + unit.len() > max {
                return Err(CaptureError::Oversize);
            }
            bytes.try_reserve(unit.len()).map_err(|_| CaptureError::NoMemory)?;
            bytes.extend_from_slice(unit);
        }
    }
}

struct CountedStringCapture;

impl ArgumentCapture for CountedStringCapture {
    fn capture(
        &self,
        raw: &RawArgument,
        cx: &CaptureContext<'_>,
        out: &mut PayloadBuilder,
    ) -> Result<(), CaptureError> {
        capture_counted_string(raw.value, cx, out)
    }
}

fn capture_counted_string(address: u64, cx: &CaptureContext<'_>, out: &mut PayloadBuilder) -> Result<(), CaptureError> {
    if address == 0 {
        return Err(CaptureError::Null);
    }
    let mut header = [0u8; UNICODE_STRING_SIZE];
    cx.copy(address, &mut header)?;
    let string = UnicodeString::parse(&header);

    let length = string.length as usize;
    if length > cx.limits.string_max_bytes {
        return Err(CaptureError::Oversize);
    }
    if length > 0 && string.buffer == 0 {
        return Err(CaptureError::Null);
    }
    let bytes = cx.copy_vec(string.buffer, length)?;

    out.put_u16(string.length)?;
    out.put_u16(string.maximum_length)?;
    out.put_u64(string.buffer)?;
    out.put_bytes(&bytes)?;
    Ok(())
}

/// Attribute bundle with nested root directory and object name records
struct AttributeBundleCapture;

impl ArgumentCapture for AttributeBundleCapture {
    fn capture(
        &self,
        raw: &RawArgument,
        cx: &CaptureContext<'_>,
        out: &mut PayloadBuilder,
    ) -> Result<(), CaptureError> {
        let mut bundle = [0u8; OBJECT_ATTRIBUTES_SIZE];
        cx.copy(raw.value, &mut bundle)?;
        let attributes = ObjectAttributes::parse(&bundle);

        let root_slot = out.reserve_u16()?;
        let name_slot = out.reserve_u16()?;
        out.put_bytes(&bundle)?;

        if attributes.root_directory != 0 {
            let mut nested = PayloadBuilder::new();
            match capture_handle(attributes.root_directory, cx, &mut nested) {
                Ok(()) => {
                    let offset = out.splice(nested.as_bytes())?;
                    out.patch_u16(root_slot, offset);
                }
                Err(err) => ss_trace!("capture: root directory omitted: {}", err),
            }
        }

        if attributes.object_name != 0 {
            let mut nested = PayloadBuilder::new();
            match capture_counted_string(attributes.object_name, cx, &mut nested) {
                Ok(()) => {
                    let offset = out.splice(nested.as_bytes())?;
                    out.patch_u16(name_slot, offset);
                }
                Err(err) => ss_trace!("capture: object name omitted: {}", err),
            }
        }
        Ok(())
    }
}

/// Raw buffer sized by a sibling argument
struct BytesCapture;

impl ArgumentCapture for BytesCapture {
    fn capture(
        &self,
        raw: &RawArgument,
        cx: &CaptureContext<'_>,
        out: &mut PayloadBuilder,
    ) -> Result<(), CaptureError> {
        let length = raw.length.ok_or(CaptureError::Unsupported)?;
        let length = usize::try_from(length).map_err(|_| CaptureError::Oversize)?;
        if length > cx.limits.bytes_max {
            return Err(CaptureError::Oversize);
        }
        let bytes = cx.copy_vec(raw.value, length)?;
        out.put_string(&bytes)?;
        Ok(())
    }
}

static CAPTURERS: [&dyn ArgumentCapture; ArgumentType::COUNT] = [
    &NotCaptured,
    &FixedCopy(1),
    &FixedCopy(2),
    &FixedCopy(4),
    &FixedCopy(8),
    &HandleCapture,
    &TerminatedString { unit: 1 },
    &TerminatedString { unit: 2 },
    &CountedStringCapture,
    &AttributeBundleCapture,
    &FixedCopy(CLIENT_ID_SIZE),
    &RegisterContextCapture,
    &FixedCopy(INITIAL_TEB_SIZE),
    &FixedCopy(GUID_SIZE),
    &BytesCapture,
];

/// Capture routine for `arg_type`
pub fn capturer(arg_type: ArgumentType) -> &'static dyn ArgumentCapture {
    CAPTURERS[arg_type as usize]
}

/// Captures one argument and wraps it in an argument block
pub fn capture_argument(
    index: u8,
    arg_type: ArgumentType,
    raw: &RawArgument,
    cx: &CaptureContext<'_>,
) -> Result<Vec<u8>, CaptureError> {
    if arg_type == ArgumentType::Value {
        return Err(CaptureError::Unsupported);
    }
    if raw.value == 0 {
        return Err(CaptureError::Null);
    }
    let mut payload = PayloadBuilder::new();
    capturer(arg_type).capture(raw, cx, &mut payload)?;
    encode_argument_block(index, arg_type, payload.as_bytes()).map_err(CaptureError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;
    use ssmon_api::abi::{ClientId, CURRENT_PROCESS_HANDLE};
    use ssmon_api::platform::ObjectId;
    use ssmon_api::wire::ArgumentView;
    use ssmon_api::{Error, Result};
    use spin::Mutex;

    #[derive(Default)]
    struct Memory {
        regions: BTreeMap<u64, Vec<u8>>,
    }

    impl Memory {
        fn map(&mut self, base: u64, bytes: &[u8]) {
            self.regions.insert(base, bytes.to_vec());
        }
    }

    impl CallerMemory for Memory {
        fn read(&self, address: u64, buf: &mut [u8]) -> Result<()> {
            let (base, bytes) = self
                .regions
                .range(..=address)
                .next_back()
                .ok_or(Error::AccessFault(address))?;
            let start = (address - base) as usize;
            let region = bytes
                .get(start..start + buf.len())
                .ok_or(Error::AccessFault(address))?;
            buf.copy_from_slice(region);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Objects {
        names: BTreeMap<u64, (&'static [u8], &'static [u8], Option<ClientId>)>,
        outstanding: Mutex<i64>,
    }

    impl ObjectResolver for Objects {
        fn reference_by_handle(&self, handle: u64, _mode: ProcessorMode) -> Result<ObjectId> {
            if self.names.contains_key(&handle) {
                *self.outstanding.lock() += 1;
                Ok(ObjectId(handle))
            } else {
                Err(Error::InvalidHandle("unknown"))
            }
        }

        fn type_name(&self, object: ObjectId, buf: &mut [u8]) -> Result<usize> {
            let name = self.names[&object.0].0;
            buf[..name.len()].copy_from_slice(name);
            Ok(name.len())
        }

        fn query_name(&self, object: ObjectId, buf: &mut [u8]) -> Result<usize> {
            let name = self.names[&object.0].1;
            if name.len() > buf.len() {
                return Err(Error::NameTooLong);
            }
            buf[..name.len()].copy_from_slice(name);
            Ok(name.len())
        }

        fn identity(&self, object: ObjectId) -> Option<ClientId> {
            self.names[&object.0].2
        }

        fn dereference(&self, _object: ObjectId) {
            *self.outstanding.lock() -= 1;
        }
    }

    fn context<'a>(memory: &'a Memory, objects: &'a dyn ObjectResolver, mode: ProcessorMode) -> CaptureContext<'a> {
        CaptureContext {
            memory,
            objects,
            mode,
            limits: CaptureLimits { string_max_bytes: 64, bytes_max: 32, name_scratch_bytes: 16 },
            highest_user_address: 0x7fff_ffff,
            context_layout: ContextLayout::AMD64,
        }
    }

    fn unicode_string(length: u16, maximum: u16, buffer: u64) -> [u8; UNICODE_STRING_SIZE] {
        let mut bytes = [0u8; UNICODE_STRING_SIZE];
        bytes[0..2].copy_from_slice(&length.to_le_bytes());
        bytes[2..4].copy_from_slice(&maximum.to_le_bytes());
        bytes[8..16].copy_from_slice(&buffer.to_le_bytes());
        bytes
    }

    #[test]
    fn test_scalar_capture() {
        let mut memory = Memory::default();
        memory.map(0x1000, &0x1122_3344u32.to_le_bytes());
        let objects = Objects::default();
        let cx = context(&memory, &objects, ProcessorMode::User);

        let block = capture_argument(3, ArgumentType::Int32, &RawArgument::new(0x1000), &cx).unwrap();
        let view = ArgumentView::parse(&block).unwrap();
        assert_eq!(view.index(), 3);
        assert_eq!(view.scalar(), Some(0x1122_3344));

        assert_eq!(
            capture_argument(0, ArgumentType::Int64, &RawArgument::new(0x1000), &cx),
            Err(CaptureError::Unreadable(0x1000))
        );
    }

    #[test]
    fn test_user_probe_rejects_kernel_addresses() {
        let mut memory = Memory::default();
        memory.map(0xffff_8000_0000_0000, &[1, 2, 3, 4]);
        let objects = Objects::default();

        let user = context(&memory, &objects, ProcessorMode::User);
        assert_eq!(
            capture_argument(0, ArgumentType::Int8, &RawArgument::new(0xffff_8000_0000_0000), &user),
            Err(CaptureError::Unreadable(0xffff_8000_0000_0000))
        );

        let kernel = context(&memory, &objects, ProcessorMode::Kernel);
        assert!(capture_argument(0, ArgumentType::Int8, &RawArgument::new(0xffff_8000_0000_0000), &kernel).is_ok());
    }

    #[test]
    fn test_value_and_null_are_not_captured() {
        let memory = Memory::default();
        let objects = Objects::default();
        let cx = context(&memory, &objects, ProcessorMode::Kernel);
        assert_eq!(
            capture_argument(0, ArgumentType::Value, &RawArgument::new(5), &cx),
            Err(CaptureError::Unsupported)
        );
        assert_eq!(
            capture_argument(0, ArgumentType::Int32, &RawArgument::new(0), &cx),
            Err(CaptureError::Null)
        );
    }

    #[test]
    fn test_handle_capture() {
        let memory = Memory::default();
        let mut objects = Objects::default();
        let identity = ClientId { process_id: 640, thread_id: 0 };
        objects.names.insert(0x44, (b"Process", b"", Some(identity)));
        objects.names.insert(0x48, (b"File", b"\\Device\\X", None));
        let cx = context(&memory, &objects, ProcessorMode::User);

        let block = capture_argument(0, ArgumentType::Handle, &RawArgument::new(0x44), &cx).unwrap();
        let handle = ArgumentView::parse(&block).unwrap().handle().unwrap();
        assert_eq!(handle.type_name, b"Process");
        assert_eq!(handle.process_id, 640);

        let block = capture_argument(1, ArgumentType::Handle, &RawArgument::new(0x48), &cx).unwrap();
        let handle = ArgumentView::parse(&block).unwrap().handle().unwrap();
        assert_eq!(handle.name, b"\\Device\\X");
        assert_eq!((handle.process_id, handle.thread_id), (0, 0));
        assert_eq!(*objects.outstanding.lock(), 0);
    }

    #[test]
    fn test_handle_capture_fails_closed() {
        let memory = Memory::default();
        let mut objects = Objects::default();
        objects.names.insert(0x4c, (b"Key", b"\\REGISTRY\\MACHINE\\SOFTWARE", None));
        objects.names.insert(0xffff_ffff_8000_0010, (b"Event", b"", None));
        objects.names.insert(CURRENT_PROCESS_HANDLE, (b"Process", b"", None));
        let cx = context(&memory, &objects, ProcessorMode::User);

        assert_eq!(
            capture_argument(0, ArgumentType::Handle, &RawArgument::new(0x4c), &cx),
            Err(CaptureError::Oversize)
        );
        assert_eq!(
            capture_argument(0, ArgumentType::Handle, &RawArgument::new(0xffff_ffff_8000_0010), &cx),
            Err(CaptureError::InvalidHandle)
        );
        assert!(capture_argument(0, ArgumentType::Handle, &RawArgument::new(CURRENT_PROCESS_HANDLE), &cx).is_ok());
        assert_eq!(
            capture_argument(0, ArgumentType::Handle, &RawArgument::new(0x99), &cx),
            Err(CaptureError::ResolutionFailed)
        );
        assert_eq!(*objects.outstanding.lock(), 0);
    }

    /// Reports the length a name needs, as a native name query does
    struct RequiredLength {
        type_extra: usize,
        name_extra: usize,
        outstanding: Mutex<i64>,
    }

    impl ObjectResolver for RequiredLength {
        fn reference_by_handle(&self, handle: u64, _mode: ProcessorMode) -> Result<ObjectId> {
            *self.outstanding.lock() += 1;
            Ok(ObjectId(handle))
        }

        fn type_name(&self, _object: ObjectId, buf: &mut [u8]) -> Result<usize> {
            buf.fill(b'T');
            Ok(buf.len().min(4) + self.type_extra)
        }

        fn query_name(&self, _object: ObjectId, buf: &mut [u8]) -> Result<usize> {
            buf.fill(b'N');
            Ok(buf.len().min(4) + self.name_extra)
        }

        fn identity(&self, _object: ObjectId) -> Option<ClientId> {
            None
        }

        fn dereference(&self, _object: ObjectId) {
            *self.outstanding.lock() -= 1;
        }
    }

    #[test]
    fn test_handle_names_longer_than_scratch_are_rejected() {
        let memory = Memory::default();
        for (type_extra, name_extra) in [(30, 0), (0, 30), (30, 30)] {
            let objects = RequiredLength { type_extra, name_extra, outstanding: Mutex::new(0) };
            let cx = context(&memory, &objects, ProcessorMode::User);
            assert_eq!(
                capture_argument(0, ArgumentType::Handle, &RawArgument::new(0x44), &cx),
                Err(CaptureError::Oversize)
            );
            assert_eq!(*objects.outstanding.lock(), 0);
        }

        // A name exactly filling the scratch buffer still fits.
        let objects = RequiredLength { type_extra: 12, name_extra: 0, outstanding: Mutex::new(0) };
        let cx = context(&memory, &objects, ProcessorMode::User);
        let block = capture_argument(0, ArgumentType::Handle, &RawArgument::new(0x44), &cx).unwrap();
        let handle = ArgumentView::parse(&block).unwrap().handle().unwrap();
        assert_eq!(handle.type_name, &[b'T'; 16][..]);
        assert_eq!(handle.name, b"NNNN");
    }

    #[test]
    fn test_wide_string_scan() {
        let mut memory = Memory::default();
        memory.map(0x2000, b"a\0b\0\0\0");
        memory.map(0x3000, &[b'x'; 80]);
        let objects = Objects::default();
        let cx = context(&memory, &objects, ProcessorMode::User);

        let block = capture_argument(0, ArgumentType::WideString, &RawArgument::new(0x2000), &cx).unwrap();
        assert_eq!(ArgumentView::parse(&block).unwrap().string(), Some(&b"a\0b\0"[..]));

        assert_eq!(
            capture_argument(0, ArgumentType::NarrowString, &RawArgument::new(0x3000), &cx),
            Err(CaptureError::Oversize)
        );
    }

    #[test]
    fn test_sized_string_and_bytes() {
        let mut memory = Memory::default();
        memory.map(0x2000, b"h\0i\0");
        memory.map(0x4000, &[7u8; 40]);
        let objects = Objects::default();
        let cx = context(&memory, &objects, ProcessorMode::User);

        let block =
            capture_argument(0, ArgumentType::WideString, &RawArgument::with_length(0x2000, 4), &cx).unwrap();
        assert_eq!(ArgumentView::parse(&block).unwrap().string(), Some(&b"h\0i\0"[..]));

        let block = capture_argument(5, ArgumentType::Bytes, &RawArgument::with_length(0x4000, 32), &cx).unwrap();
        assert_eq!(ArgumentView::parse(&block).unwrap().string().map(|b| b.len()), Some(32));

        assert_eq!(
            capture_argument(5, ArgumentType::Bytes, &RawArgument::with_length(0x4000, 33), &cx),
            Err(CaptureError::Oversize)
        );
        assert_eq!(
            capture_argument(5, ArgumentType::Bytes, &RawArgument::new(0x4000), &cx),
            Err(CaptureError::Unsupported)
        );
    }

    #[test]
    fn test_counted_string() {
        let mut memory = Memory::default();
        memory.map(0x5000, &unicode_string(6, 8, 0x5100));
        memory.map(0x5100, b"k\0e\0y\0\0\0");
        memory.map(0x5200, &unicode_string(200, 200, 0x5100));
        let objects = Objects::default();
        let cx = context(&memory, &objects, ProcessorMode::User);

        let block = capture_argument(4, ArgumentType::CountedString, &RawArgument::new(0x5000), &cx).unwrap();
        let view = ArgumentView::parse(&block).unwrap();
        assert_eq!(view.string(), Some(&b"k\0e\0y\0"[..]));
        assert_eq!(u16::from_le_bytes([view.payload()[2], view.payload()[3]]), 8);

        assert_eq!(
            capture_argument(4, ArgumentType::CountedString, &RawArgument::new(0x5200), &cx),
            Err(CaptureError::Oversize)
        );
    }

    #[test]
    fn test_attribute_bundle_nesting() {
        let mut memory = Memory::default();
        let attributes = ObjectAttributes {
            length: OBJECT_ATTRIBUTES_SIZE as u32,
            root_directory: 0x50,
            object_name: 0x6100,
            attributes: 0x40,
            ..Default::default()
        };
        memory.map(0x6000, &attributes.to_bytes());
        memory.map(0x6100, &unicode_string(4, 4, 0x6200));
        memory.map(0x6200, b"f\0s\0");
        let mut objects = Objects::default();
        objects.names.insert(0x50, (b"Directory", b"\\Base", None));
        let cx = context(&memory, &objects, ProcessorMode::User);

        let block = capture_argument(2, ArgumentType::AttributeBundle, &RawArgument::new(0x6000), &cx).unwrap();
        let bundle = ArgumentView::parse(&block).unwrap().attribute_bundle().unwrap();
        assert_eq!(bundle.attributes(), attributes);
        assert_eq!(bundle.root_directory().unwrap().name, b"\\Base");
        assert_eq!(bundle.object_name().unwrap().buffer, b"f\0s\0");
    }

    #[test]
    fn test_attribute_bundle_omits_failed_nested_capture() {
        let mut memory = Memory::default();
        let attributes = ObjectAttributes {
            length: OBJECT_ATTRIBUTES_SIZE as u32,
            root_directory: 0x99,
            object_name: 0x7fff_0000,
            ..Default::default()
        };
        memory.map(0x6000, &attributes.to_bytes());
        let objects = Objects::default();
        let cx = context(&memory, &objects, ProcessorMode::User);

        let block = capture_argument(2, ArgumentType::AttributeBundle, &RawArgument::new(0x6000), &cx).unwrap();
        let bundle = ArgumentView::parse(&block).unwrap().attribute_bundle().unwrap();
        assert!(bundle.root_directory().is_none());
        assert!(bundle.object_name().is_none());
        assert_eq!(bundle.attributes().root_directory, 0x99);
    }

    #[test]
    fn test_fixed_structures() {
        let mut memory = Memory::default();
        let mut id = [0u8; CLIENT_ID_SIZE];
        id[..8].copy_from_slice(&4u64.to_le_bytes());
        id[8..].copy_from_slice(&8u64.to_le_bytes());
        memory.map(0x8000, &id);
        memory.map(0x9000, &[0xcc; 1232]);
        let objects = Objects::default();
        let cx = context(&memory, &objects, ProcessorMode::Kernel);

        let block = capture_argument(3, ArgumentType::IdPair, &RawArgument::new(0x8000), &cx).unwrap();
        assert_eq!(ArgumentView::parse(&block).unwrap().payload(), &id[..]);

        let block = capture_argument(0, ArgumentType::RegisterContext, &RawArgument::new(0x9000), &cx).unwrap();
        assert_eq!(ArgumentView::parse(&block).unwrap().payload().len(), 1232);

        assert_eq!(
            capture_argument(6, ArgumentType::StackDescriptor, &RawArgument::new(0x8000), &cx),
            Err(CaptureError::Unreadable(0x8000))
        );
    }
}
