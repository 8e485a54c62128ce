//! Call descriptor registry
//!
//! Maps a service number to its name and the semantic type of each
//! argument. The table is fixed per supported build and is loaded once when
//! the logger is created; there is no dynamic registration.

use alloc::collections::BTreeMap;

use ssmon_api::ArgumentType;

use ArgumentType::{
    AttributeBundle as Oa, Bytes, CountedString as Us, Guid, Handle as H, IdPair as Cid,
    Int16, Int32, Int64, RegisterContext as Ctx, StackDescriptor as Teb, Value as V,
    WideString as Ws,
};

/// Service numbers of the supported build (x64, 6.1)
pub mod numbers {
    pub const NT_MAP_USER_PHYSICAL_PAGES_SCATTER: u32 = 0x00;
    pub const NT_CALLBACK_RETURN: u32 = 0x02;
    pub const NT_READ_FILE: u32 = 0x03;
    pub const NT_DEVICE_IO_CONTROL_FILE: u32 = 0x04;
    pub const NT_WRITE_FILE: u32 = 0x05;
    pub const NT_SET_EVENT: u32 = 0x0b;
    pub const NT_CLOSE: u32 = 0x0c;
    pub const NT_OPEN_KEY: u32 = 0x0f;
    pub const NT_ENUMERATE_VALUE_KEY: u32 = 0x10;
    pub const NT_FIND_ATOM: u32 = 0x11;
    pub const NT_ALLOCATE_VIRTUAL_MEMORY: u32 = 0x15;
    pub const NT_CREATE_KEY: u32 = 0x1a;
    pub const NT_FREE_VIRTUAL_MEMORY: u32 = 0x1b;
    pub const NT_IMPERSONATE_CLIENT_OF_PORT: u32 = 0x1c;
    pub const NT_OPEN_THREAD_TOKEN: u32 = 0x21;
    pub const NT_OPEN_PROCESS: u32 = 0x23;
    pub const NT_MAP_VIEW_OF_SECTION: u32 = 0x25;
    pub const NT_OPEN_THREAD_TOKEN_EX: u32 = 0x2c;
    pub const NT_OPEN_PROCESS_TOKEN_EX: u32 = 0x2d;
    pub const NT_ENUMERATE_KEY: u32 = 0x2f;
    pub const NT_OPEN_FILE: u32 = 0x30;
    pub const NT_DELAY_EXECUTION: u32 = 0x31;
    pub const NT_OPEN_SECTION: u32 = 0x34;
    pub const NT_FS_CONTROL_FILE: u32 = 0x36;
    pub const NT_DUPLICATE_OBJECT: u32 = 0x39;
    pub const NT_CLEAR_EVENT: u32 = 0x3b;
    pub const NT_OPEN_EVENT: u32 = 0x3d;
    pub const NT_DUPLICATE_TOKEN: u32 = 0x3f;
    pub const NT_CONTINUE: u32 = 0x40;
    pub const NT_ADD_ATOM: u32 = 0x44;
    pub const NT_CREATE_EVENT: u32 = 0x45;
    pub const NT_CREATE_SECTION: u32 = 0x47;
    pub const NT_FLUSH_BUFFERS_FILE: u32 = 0x48;
    pub const NT_APPHELP_CACHE_CONTROL: u32 = 0x49;
    pub const NT_CREATE_PROCESS_EX: u32 = 0x4a;
    pub const NT_CREATE_THREAD: u32 = 0x4b;
    pub const NT_IS_PROCESS_IN_JOB: u32 = 0x4c;
    pub const NT_CREATE_FILE: u32 = 0x52;
    pub const NT_OPEN_DIRECTORY_OBJECT: u32 = 0x55;
    pub const NT_CANCEL_TIMER: u32 = 0x5e;
    pub const NT_ALERT_RESUME_THREAD: u32 = 0x63;
    pub const NT_ALERT_THREAD: u32 = 0x64;
    pub const NT_ALLOCATE_LOCALLY_UNIQUE_ID: u32 = 0x65;
    pub const NT_ALLOCATE_USER_PHYSICAL_PAGES: u32 = 0x66;
    pub const NT_ALLOCATE_UUIDS: u32 = 0x67;
    pub const NT_ARE_MAPPED_FILES_THE_SAME: u32 = 0x69;
    pub const NT_ASSIGN_PROCESS_TO_JOB_OBJECT: u32 = 0x6b;
    pub const NT_CANCEL_DEVICE_WAKEUP_REQUEST: u32 = 0x6c;
    pub const NT_CANCEL_IO_FILE: u32 = 0x6f;
    pub const NT_CREATE_DEBUG_OBJECT: u32 = 0x76;
    pub const NT_CREATE_DIRECTORY_OBJECT: u32 = 0x77;
    pub const NT_CREATE_EVENT_PAIR: u32 = 0x79;
    pub const NT_CREATE_IO_COMPLETION: u32 = 0x7a;
    pub const NT_CREATE_JOB_OBJECT: u32 = 0x7b;
    pub const NT_CREATE_JOB_SET: u32 = 0x7c;
    pub const NT_CREATE_KEYED_EVENT: u32 = 0x7e;
    pub const NT_CREATE_MAILSLOT_FILE: u32 = 0x80;
    pub const NT_CREATE_MUTANT: u32 = 0x82;
    pub const NT_CREATE_NAMED_PIPE_FILE: u32 = 0x83;
    pub const NT_CREATE_PAGING_FILE: u32 = 0x84;
    pub const NT_CREATE_PORT: u32 = 0x85;
    pub const NT_CREATE_PRIVATE_NAMESPACE: u32 = 0x86;
    pub const NT_CREATE_PROCESS: u32 = 0x87;
    pub const NT_CREATE_PROFILE: u32 = 0x88;
    pub const NT_CREATE_SEMAPHORE: u32 = 0x8d;
    pub const NT_CREATE_SYMBOLIC_LINK_OBJECT: u32 = 0x8e;
    pub const NT_CREATE_TIMER: u32 = 0x91;
    pub const NT_CREATE_TOKEN: u32 = 0x92;
    pub const NT_CREATE_TRANSACTION: u32 = 0x95;
    pub const NT_CREATE_WAITABLE_PORT: u32 = 0x98;
    pub const NT_DEBUG_ACTIVE_PROCESS: u32 = 0x9b;
    pub const NT_DEBUG_CONTINUE: u32 = 0x9c;
    pub const NT_DELETE_ATOM: u32 = 0x9e;
    pub const NT_DELETE_BOOT_ENTRY: u32 = 0x9f;
    pub const NT_DELETE_DRIVER_ENTRY: u32 = 0xa0;
    pub const NT_DELETE_FILE: u32 = 0xa1;
    pub const NT_DELETE_KEY: u32 = 0xa2;
    pub const NT_DELETE_OBJECT_AUDIT_ALARM: u32 = 0xa3;
    pub const NT_DELETE_PRIVATE_NAMESPACE: u32 = 0xa4;
    pub const NT_DELETE_VALUE_KEY: u32 = 0xa6;
    pub const NT_DISPLAY_STRING: u32 = 0xaa;
    pub const NT_ENUMERATE_BOOT_ENTRIES: u32 = 0xac;
    pub const NT_ENUMERATE_DRIVER_ENTRIES: u32 = 0xad;
    pub const NT_ENUMERATE_SYSTEM_ENVIRONMENT_VALUES_EX: u32 = 0xae;
    pub const NT_EXTEND_SECTION: u32 = 0xb0;
    pub const NT_FILTER_TOKEN: u32 = 0xb1;
    pub const NT_FLUSH_INSTRUCTION_CACHE: u32 = 0xb3;
    pub const NT_FLUSH_KEY: u32 = 0xb4;
    pub const NT_FLUSH_PROCESS_WRITE_BUFFERS: u32 = 0xb5;
    pub const NT_FLUSH_VIRTUAL_MEMORY: u32 = 0xb6;
    pub const NT_FLUSH_WRITE_BUFFER: u32 = 0xb7;
    pub const NT_FREE_USER_PHYSICAL_PAGES: u32 = 0xb8;
    pub const NT_GET_CONTEXT_THREAD: u32 = 0xbb;
    pub const NT_GET_CURRENT_PROCESSOR_NUMBER: u32 = 0xbc;
    pub const NT_GET_DEVICE_POWER_STATE: u32 = 0xbd;
    pub const NT_GET_NEXT_PROCESS: u32 = 0xbf;
    pub const NT_GET_NEXT_THREAD: u32 = 0xc0;
    pub const NT_GET_PLUG_PLAY_EVENT: u32 = 0xc3;
    pub const NT_GET_WRITE_WATCH: u32 = 0xc4;
    pub const NT_IMPERSONATE_ANONYMOUS_TOKEN: u32 = 0xc5;
    pub const NT_IMPERSONATE_THREAD: u32 = 0xc6;
    pub const NT_INITIATE_POWER_ACTION: u32 = 0xc9;
    pub const NT_IS_SYSTEM_RESUME_AUTOMATIC: u32 = 0xca;
    pub const NT_LISTEN_PORT: u32 = 0xcc;
    pub const NT_LOAD_DRIVER: u32 = 0xd5;
    pub const NT_LOAD_KEY: u32 = 0xd6;
    pub const NT_LOAD_KEY_2: u32 = 0xd7;
    pub const NT_LOCK_FILE: u32 = 0xd9;
    pub const NT_LOCK_VIRTUAL_MEMORY: u32 = 0xdc;
    pub const NT_MAKE_PERMANENT_OBJECT: u32 = 0xdd;
    pub const NT_MAKE_TEMPORARY_OBJECT: u32 = 0xde;
    pub const NT_MAP_USER_PHYSICAL_PAGES: u32 = 0xe0;
    pub const NT_MODIFY_BOOT_ENTRY: u32 = 0xe1;
    pub const NT_MODIFY_DRIVER_ENTRY: u32 = 0xe2;
    pub const NT_NOTIFY_CHANGE_DIRECTORY_FILE: u32 = 0xe3;
    pub const NT_NOTIFY_CHANGE_KEY: u32 = 0xe4;
    pub const NT_NOTIFY_CHANGE_MULTIPLE_KEYS: u32 = 0xe5;
    pub const NT_OPEN_EVENT_PAIR: u32 = 0xe8;
    pub const NT_OPEN_IO_COMPLETION: u32 = 0xe9;
    pub const NT_OPEN_JOB_OBJECT: u32 = 0xea;
    pub const NT_OPEN_KEYED_EVENT: u32 = 0xee;
    pub const NT_OPEN_MUTANT: u32 = 0xf2;
    pub const NT_OPEN_OBJECT_AUDIT_ALARM: u32 = 0xf3;
    pub const NT_OPEN_PROCESS_TOKEN: u32 = 0xf5;
    pub const NT_OPEN_SEMAPHORE: u32 = 0xf7;
    pub const NT_OPEN_SYMBOLIC_LINK_OBJECT: u32 = 0xf9;
    pub const NT_OPEN_THREAD: u32 = 0xfe;
    pub const NT_OPEN_TIMER: u32 = 0xff;
}

/// Static description of one service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallDescriptor {
    pub number: u32,
    pub name: &'static str,
    /// Semantic type of each argument, in order
    pub arguments: &'static [ArgumentType],
    /// `(buffer index, length index)` pairs: the buffer's byte count is the
    /// value of another argument of the same call
    pub lengths: &'static [(u8, u8)],
}

impl CallDescriptor {
    const fn new(number: u32, name: &'static str, arguments: &'static [ArgumentType]) -> Self {
        Self { number, name, arguments, lengths: &[] }
    }

    const fn with_lengths(mut self, lengths: &'static [(u8, u8)]) -> Self {
        self.lengths = lengths;
        self
    }

    pub fn argument_count(&self) -> usize {
        self.arguments.len()
    }

    pub fn argument_type(&self, index: usize) -> Option<ArgumentType> {
        self.arguments.get(index).copied()
    }

    /// Index of the argument holding the byte count of argument `index`
    pub fn length_argument(&self, index: usize) -> Option<usize> {
        self.lengths
            .iter()
            .find(|(buffer, _)| *buffer as usize == index)
            .map(|(_, length)| *length as usize)
    }
}

use numbers::*;

static CALL_TABLE: &[CallDescriptor] = &[
    CallDescriptor::new(NT_ADD_ATOM, "NtAddAtom", &[Ws, V, Int16]).with_lengths(&[(0, 1)]),
    CallDescriptor::new(NT_ALERT_RESUME_THREAD, "NtAlertResumeThread", &[H, V]),
    CallDescriptor::new(NT_ALERT_THREAD, "NtAlertThread", &[H]),
    CallDescriptor::new(NT_ALLOCATE_LOCALLY_UNIQUE_ID, "NtAllocateLocallyUniqueId", &[V]),
    CallDescriptor::new(NT_ALLOCATE_USER_PHYSICAL_PAGES, "NtAllocateUserPhysicalPages", &[H, Int32, V]),
    CallDescriptor::new(NT_ALLOCATE_UUIDS, "NtAllocateUuids", &[Int64, V, V, V]),
    CallDescriptor::new(NT_ALLOCATE_VIRTUAL_MEMORY, "NtAllocateVirtualMemory", &[H, Int32, V, Int32, V, V]),
    CallDescriptor::new(NT_APPHELP_CACHE_CONTROL, "NtApphelpCacheControl", &[V, Us]),
    CallDescriptor::new(NT_ARE_MAPPED_FILES_THE_SAME, "NtAreMappedFilesTheSame", &[V, V]),
    CallDescriptor::new(NT_ASSIGN_PROCESS_TO_JOB_OBJECT, "NtAssignProcessToJobObject", &[H, H]),
    CallDescriptor::new(NT_CALLBACK_RETURN, "NtCallbackReturn", &[V, V, V]),
    CallDescriptor::new(NT_CANCEL_DEVICE_WAKEUP_REQUEST, "NtCancelDeviceWakeupRequest", &[H]),
    CallDescriptor::new(NT_CANCEL_IO_FILE, "NtCancelIoFile", &[H, V]),
    CallDescriptor::new(NT_CANCEL_TIMER, "NtCancelTimer", &[H, V]),
    CallDescriptor::new(NT_CLEAR_EVENT, "NtClearEvent", &[H]),
    CallDescriptor::new(NT_CLOSE, "NtClose", &[H]),
    CallDescriptor::new(NT_CONTINUE, "NtContinue", &[Ctx, V]),
    CallDescriptor::new(NT_CREATE_DEBUG_OBJECT, "NtCreateDebugObject", &[V, V, Oa, V]),
    CallDescriptor::new(NT_CREATE_DIRECTORY_OBJECT, "NtCreateDirectoryObject", &[V, V, Oa]),
    CallDescriptor::new(NT_CREATE_EVENT, "NtCreateEvent", &[V, V, Oa, V, V]),
    CallDescriptor::new(NT_CREATE_EVENT_PAIR, "NtCreateEventPair", &[V, V, Oa]),
    CallDescriptor::new(NT_CREATE_FILE, "NtCreateFile", &[V, V, Oa, V, Int64, V, V, V, V, V, V]),
    CallDescriptor::new(NT_CREATE_IO_COMPLETION, "NtCreateIoCompletion", &[V, V, Oa, V]),
    CallDescriptor::new(NT_CREATE_JOB_OBJECT, "NtCreateJobObject", &[V, V, Oa]),
    CallDescriptor::new(NT_CREATE_JOB_SET, "NtCreateJobSet", &[V, V, V]),
    CallDescriptor::new(NT_CREATE_KEY, "NtCreateKey", &[V, V, Oa, V, Us, V, V]),
    CallDescriptor::new(NT_CREATE_KEYED_EVENT, "NtCreateKeyedEvent", &[V, V, Oa, V]),
    CallDescriptor::new(NT_CREATE_MAILSLOT_FILE, "NtCreateMailslotFile", &[V, V, Oa, V, V, V, V, Int64]),
    CallDescriptor::new(NT_CREATE_MUTANT, "NtCreateMutant", &[V, V, Oa, V]),
    CallDescriptor::new(
        NT_CREATE_NAMED_PIPE_FILE,
        "NtCreateNamedPipeFile",
        &[V, V, Oa, V, V, V, V, V, V, V, V, V, V, Int64],
    ),
    CallDescriptor::new(NT_CREATE_PAGING_FILE, "NtCreatePagingFile", &[Us, Int64, Int64, V]),
    CallDescriptor::new(NT_CREATE_PORT, "NtCreatePort", &[V, Oa, V, V, V]),
    CallDescriptor::new(NT_CREATE_PRIVATE_NAMESPACE, "NtCreatePrivateNamespace", &[V, V, Oa, V]),
    CallDescriptor::new(NT_CREATE_PROCESS, "NtCreateProcess", &[V, V, Oa, H, V, H, H, H]),
    CallDescriptor::new(NT_CREATE_PROCESS_EX, "NtCreateProcessEx", &[V, V, Oa, H, V, H, H, H, V]),
    CallDescriptor::new(NT_CREATE_PROFILE, "NtCreateProfile", &[V, H, V, V, V, V, V, V, V]),
    CallDescriptor::new(NT_CREATE_SECTION, "NtCreateSection", &[V, V, Oa, Int64, V, V, H]),
    CallDescriptor::new(NT_CREATE_SEMAPHORE, "NtCreateSemaphore", &[V, V, Oa, V, V]),
    CallDescriptor::new(NT_CREATE_SYMBOLIC_LINK_OBJECT, "NtCreateSymbolicLinkObject", &[V, V, Oa, Us]),
    CallDescriptor::new(NT_CREATE_THREAD, "NtCreateThread", &[V, V, Oa, H, V, Ctx, Teb, V]),
    CallDescriptor::new(NT_CREATE_TIMER, "NtCreateTimer", &[V, V, Oa, V]),
    CallDescriptor::new(NT_CREATE_TOKEN, "NtCreateToken", &[V, V, Oa, V, Int64, Int64, V, V, V, V, V, V, V]),
    CallDescriptor::new(NT_CREATE_TRANSACTION, "NtCreateTransaction", &[V, V, Oa, Guid, H, V, V, V, Int64, Us]),
    CallDescriptor::new(NT_CREATE_WAITABLE_PORT, "NtCreateWaitablePort", &[V, Oa, V, V, V]),
    CallDescriptor::new(NT_DEBUG_ACTIVE_PROCESS, "NtDebugActiveProcess", &[H, H]),
    CallDescriptor::new(NT_DEBUG_CONTINUE, "NtDebugContinue", &[H, Cid, V]),
    CallDescriptor::new(NT_DELAY_EXECUTION, "NtDelayExecution", &[V, Int64]),
    CallDescriptor::new(NT_DELETE_ATOM, "NtDeleteAtom", &[V]),
    CallDescriptor::new(NT_DELETE_BOOT_ENTRY, "NtDeleteBootEntry", &[V]),
    CallDescriptor::new(NT_DELETE_DRIVER_ENTRY, "NtDeleteDriverEntry", &[V]),
    CallDescriptor::new(NT_DELETE_FILE, "NtDeleteFile", &[Oa]),
    CallDescriptor::new(NT_DELETE_KEY, "NtDeleteKey", &[H]),
    CallDescriptor::new(NT_DELETE_OBJECT_AUDIT_ALARM, "NtDeleteObjectAuditAlarm", &[Us, V, V]),
    CallDescriptor::new(NT_DELETE_PRIVATE_NAMESPACE, "NtDeletePrivateNamespace", &[H]),
    CallDescriptor::new(NT_DELETE_VALUE_KEY, "NtDeleteValueKey", &[H, Us]),
    CallDescriptor::new(NT_DEVICE_IO_CONTROL_FILE, "NtDeviceIoControlFile", &[H, H, V, V, V, V, V, V, V, V]),
    CallDescriptor::new(NT_DISPLAY_STRING, "NtDisplayString", &[Us]),
    CallDescriptor::new(NT_DUPLICATE_OBJECT, "NtDuplicateObject", &[H, H, H, V, V, V, V]),
    CallDescriptor::new(NT_DUPLICATE_TOKEN, "NtDuplicateToken", &[H, V, Oa, V, V, V]),
    CallDescriptor::new(NT_ENUMERATE_BOOT_ENTRIES, "NtEnumerateBootEntries", &[V, Int32]),
    CallDescriptor::new(NT_ENUMERATE_DRIVER_ENTRIES, "NtEnumerateDriverEntries", &[V, Int32]),
    CallDescriptor::new(NT_ENUMERATE_KEY, "NtEnumerateKey", &[H, V, V, V, V, V]),
    CallDescriptor::new(
        NT_ENUMERATE_SYSTEM_ENVIRONMENT_VALUES_EX,
        "NtEnumerateSystemEnvironmentValuesEx",
        &[V, V, Int32],
    ),
    CallDescriptor::new(NT_ENUMERATE_VALUE_KEY, "NtEnumerateValueKey", &[H, V, V, V, V, V]),
    CallDescriptor::new(NT_EXTEND_SECTION, "NtExtendSection", &[H, Int64]),
    CallDescriptor::new(NT_FILTER_TOKEN, "NtFilterToken", &[H, V, V, V, V, V]),
    CallDescriptor::new(NT_FIND_ATOM, "NtFindAtom", &[Ws, V, V]).with_lengths(&[(0, 1)]),
    CallDescriptor::new(NT_FLUSH_BUFFERS_FILE, "NtFlushBuffersFile", &[H, V]),
    CallDescriptor::new(NT_FLUSH_INSTRUCTION_CACHE, "NtFlushInstructionCache", &[H, V, V]),
    CallDescriptor::new(NT_FLUSH_KEY, "NtFlushKey", &[H]),
    CallDescriptor::new(NT_FLUSH_PROCESS_WRITE_BUFFERS, "NtFlushProcessWriteBuffers", &[]),
    CallDescriptor::new(NT_FLUSH_VIRTUAL_MEMORY, "NtFlushVirtualMemory", &[H, Int32, Int32, V]),
    CallDescriptor::new(NT_FLUSH_WRITE_BUFFER, "NtFlushWriteBuffer", &[]),
    CallDescriptor::new(NT_FREE_USER_PHYSICAL_PAGES, "NtFreeUserPhysicalPages", &[H, Int32, V]),
    CallDescriptor::new(NT_FREE_VIRTUAL_MEMORY, "NtFreeVirtualMemory", &[H, Int32, Int32, V]),
    CallDescriptor::new(NT_FS_CONTROL_FILE, "NtFsControlFile", &[H, H, V, V, V, V, V, V, V, V]),
    CallDescriptor::new(NT_GET_CONTEXT_THREAD, "NtGetContextThread", &[H, Ctx]),
    CallDescriptor::new(NT_GET_CURRENT_PROCESSOR_NUMBER, "NtGetCurrentProcessorNumber", &[]),
    CallDescriptor::new(NT_GET_DEVICE_POWER_STATE, "NtGetDevicePowerState", &[H, V]),
    CallDescriptor::new(NT_GET_NEXT_PROCESS, "NtGetNextProcess", &[H, V, V, V, V]),
    CallDescriptor::new(NT_GET_NEXT_THREAD, "NtGetNextThread", &[H, H, V, V, V, V]),
    CallDescriptor::new(NT_GET_PLUG_PLAY_EVENT, "NtGetPlugPlayEvent", &[H, V, V, V]),
    CallDescriptor::new(NT_GET_WRITE_WATCH, "NtGetWriteWatch", &[H, V, V, V, V, V, V]),
    CallDescriptor::new(NT_IMPERSONATE_ANONYMOUS_TOKEN, "NtImpersonateAnonymousToken", &[H]),
    CallDescriptor::new(NT_IMPERSONATE_CLIENT_OF_PORT, "NtImpersonateClientOfPort", &[H, V]),
    CallDescriptor::new(NT_IMPERSONATE_THREAD, "NtImpersonateThread", &[H, H, V]),
    CallDescriptor::new(NT_INITIATE_POWER_ACTION, "NtInitiatePowerAction", &[V, V, V, V]),
    CallDescriptor::new(NT_IS_PROCESS_IN_JOB, "NtIsProcessInJob", &[H, H]),
    CallDescriptor::new(NT_IS_SYSTEM_RESUME_AUTOMATIC, "NtIsSystemResumeAutomatic", &[]),
    CallDescriptor::new(NT_LISTEN_PORT, "NtListenPort", &[H, V]),
    CallDescriptor::new(NT_LOAD_DRIVER, "NtLoadDriver", &[Us]),
    CallDescriptor::new(NT_LOAD_KEY, "NtLoadKey", &[Oa, Oa]),
    CallDescriptor::new(NT_LOAD_KEY_2, "NtLoadKey2", &[Oa, Oa, V]),
    CallDescriptor::new(NT_LOCK_FILE, "NtLockFile", &[H, H, V, V, V, Int64, Int64, V, V, V]),
    CallDescriptor::new(NT_LOCK_VIRTUAL_MEMORY, "NtLockVirtualMemory", &[H, Int32, Int32, V]),
    CallDescriptor::new(NT_MAKE_PERMANENT_OBJECT, "NtMakePermanentObject", &[H]),
    CallDescriptor::new(NT_MAKE_TEMPORARY_OBJECT, "NtMakeTemporaryObject", &[H]),
    CallDescriptor::new(NT_MAP_USER_PHYSICAL_PAGES, "NtMapUserPhysicalPages", &[V, Int32, V]),
    CallDescriptor::new(NT_MAP_USER_PHYSICAL_PAGES_SCATTER, "NtMapUserPhysicalPagesScatter", &[V, Int32, V]),
    CallDescriptor::new(
        NT_MAP_VIEW_OF_SECTION,
        "NtMapViewOfSection",
        &[H, H, Int32, V, V, Int64, Int32, V, V, V],
    ),
    CallDescriptor::new(NT_MODIFY_BOOT_ENTRY, "NtModifyBootEntry", &[V]),
    CallDescriptor::new(NT_MODIFY_DRIVER_ENTRY, "NtModifyDriverEntry", &[V]),
    CallDescriptor::new(
        NT_NOTIFY_CHANGE_DIRECTORY_FILE,
        "NtNotifyChangeDirectoryFile",
        &[H, H, V, V, V, V, V, V, V],
    ),
    CallDescriptor::new(NT_NOTIFY_CHANGE_KEY, "NtNotifyChangeKey", &[H, H, V, V, V, V, V, V, V, V]),
    CallDescriptor::new(
        NT_NOTIFY_CHANGE_MULTIPLE_KEYS,
        "NtNotifyChangeMultipleKeys",
        &[H, V, Oa, H, V, V, V, V, V, V, V, V],
    ),
    CallDescriptor::new(NT_OPEN_DIRECTORY_OBJECT, "NtOpenDirectoryObject", &[V, V, Oa]),
    CallDescriptor::new(NT_OPEN_EVENT, "NtOpenEvent", &[V, V, Oa]),
    CallDescriptor::new(NT_OPEN_EVENT_PAIR, "NtOpenEventPair", &[V, V, Oa]),
    CallDescriptor::new(NT_OPEN_FILE, "NtOpenFile", &[V, V, Oa, V, V, V]),
    CallDescriptor::new(NT_OPEN_IO_COMPLETION, "NtOpenIoCompletion", &[V, V, Oa]),
    CallDescriptor::new(NT_OPEN_JOB_OBJECT, "NtOpenJobObject", &[V, V, Oa]),
    CallDescriptor::new(NT_OPEN_KEY, "NtOpenKey", &[V, V, Oa]),
    CallDescriptor::new(NT_OPEN_KEYED_EVENT, "NtOpenKeyedEvent", &[V, V, Oa]),
    CallDescriptor::new(NT_OPEN_MUTANT, "NtOpenMutant", &[V, V, Oa]),
    CallDescriptor::new(
        NT_OPEN_OBJECT_AUDIT_ALARM,
        "NtOpenObjectAuditAlarm",
        &[Us, Int32, Us, Us, V, H, V, V, V, V, V, V],
    ),
    CallDescriptor::new(NT_OPEN_PROCESS, "NtOpenProcess", &[V, V, Oa, Cid]),
    CallDescriptor::new(NT_OPEN_PROCESS_TOKEN, "NtOpenProcessToken", &[H, V, V]),
    CallDescriptor::new(NT_OPEN_PROCESS_TOKEN_EX, "NtOpenProcessTokenEx", &[H, V, V, V]),
    CallDescriptor::new(NT_OPEN_SECTION, "NtOpenSection", &[V, V, Oa]),
    CallDescriptor::new(NT_OPEN_SEMAPHORE, "NtOpenSemaphore", &[V, V, Oa]),
    CallDescriptor::new(NT_OPEN_SYMBOLIC_LINK_OBJECT, "NtOpenSymbolicLinkObject", &[V, V, Oa]),
    CallDescriptor::new(NT_OPEN_THREAD, "NtOpenThread", &[V, V, Oa, Cid]),
    CallDescriptor::new(NT_OPEN_THREAD_TOKEN, "NtOpenThreadToken", &[H, V, V, V]),
    CallDescriptor::new(NT_OPEN_THREAD_TOKEN_EX, "NtOpenThreadTokenEx", &[H, V, V, V, V]),
    CallDescriptor::new(NT_OPEN_TIMER, "NtOpenTimer", &[V, V, Oa]),
    CallDescriptor::new(NT_READ_FILE, "NtReadFile", &[H, H, V, V, V, V, V, Int64, Int32]),
    CallDescriptor::new(NT_SET_EVENT, "NtSetEvent", &[H, V]),
    CallDescriptor::new(NT_WRITE_FILE, "NtWriteFile", &[H, H, V, V, V, Bytes, V, Int64, Int32])
        .with_lengths(&[(5, 6)]),
];

/// Lookup structure over the static call table
#[derive(Debug, Default)]
pub struct CallRegistry {
    entries: BTreeMap<u32, &'static CallDescriptor>,
}

impl CallRegistry {
    /// Loads the table for the supported build
    pub fn load() -> Self {
        Self::from_table(CALL_TABLE)
    }

    /// Loads an explicit table; later duplicates of a number are ignored
    pub fn from_table(table: &'static [CallDescriptor]) -> Self {
        let mut entries = BTreeMap::new();
        for descriptor in table {
            entries.entry(descriptor.number).or_insert(descriptor);
        }
        Self { entries }
    }

    pub fn lookup(&self, number: u32) -> Option<&'static CallDescriptor> {
        self.entries.get(&number).copied()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&'static CallDescriptor> {
        self.entries.values().find(|d| d.name == name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
