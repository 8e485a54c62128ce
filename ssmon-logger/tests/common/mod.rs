//! Simulated platform shared by the integration tests
//!
//! Threads stand in for processing units, plain vectors for code pages and
//! caller memory, and a vector per subscriber for its ring buffer.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use mockall::mock;
use ssmon_api::abi::ClientId;
use ssmon_api::platform::*;
use ssmon_api::wire::{ArgumentType, Block, BlockReader};
use ssmon_api::{Error, Result};
use ssmon_logger::{
    ClientHandle, ClientRequest, FilterType, InterceptedCall, Logger, LoggerConfig, RuleSetAction,
    RuleSetHandle, ServiceTable,
};

mock! {
    pub Tracer {}
    impl StackTracer for Tracer {
        fn capture(&self, frames: &mut [u64], user: bool) -> usize;
    }
}

mock! {
    pub Time {}
    impl Clock for Time {
        fn now(&self) -> i64;
    }
}

/// A tracer that reports no frames
pub fn quiet_tracer() -> MockTracer {
    let mut tracer = MockTracer::new();
    tracer.expect_capture().returning(|_, _| 0);
    tracer
}

/// A clock stuck at `time`
pub fn fixed_clock(time: i64) -> MockTime {
    let mut clock = MockTime::new();
    clock.expect_now().return_const(time);
    clock
}

/// Processing units backed by threads
pub struct ThreadCpus {
    pub count: usize,
    pub raised: AtomicUsize,
    pub level: Mutex<ExecutionLevel>,
}

impl ThreadCpus {
    pub fn new(count: usize) -> Arc<Self> {
        Arc::new(Self { count, raised: AtomicUsize::new(0), level: Mutex::new(ExecutionLevel::Passive) })
    }
}

impl Processors for ThreadCpus {
    fn count(&self) -> usize {
        self.count
    }

    fn current(&self) -> usize {
        0
    }

    fn queue_on(&self, index: usize, work: ProcessorWork) -> Result<()> {
        if index >= self.count {
            return Err(Error::InvalidParameter(1, "processor index"));
        }
        thread::spawn(work);
        Ok(())
    }

    fn current_level(&self) -> ExecutionLevel {
        *self.level.lock().unwrap()
    }

    fn raise_level(&self) -> ExecutionLevel {
        self.raised.fetch_add(1, Ordering::SeqCst);
        ExecutionLevel::Passive
    }

    fn lower_level(&self, _previous: ExecutionLevel) {
        self.raised.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Executable memory at a fixed base
pub struct CodeRegion {
    pub base: u64,
    pub bytes: Mutex<Vec<u8>>,
}

impl CodeRegion {
    pub fn new(base: u64, bytes: &[u8]) -> Arc<Self> {
        Arc::new(Self { base, bytes: Mutex::new(bytes.to_vec()) })
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().unwrap().clone()
    }

    fn range(&self, address: u64, len: usize) -> Result<std::ops::Range<usize>> {
        let start = address.checked_sub(self.base).ok_or(Error::AccessFault(address))? as usize;
        if start + len > self.bytes.lock().unwrap().len() {
            return Err(Error::AccessFault(address));
        }
        Ok(start..start + len)
    }
}

impl CodePatchBackend for CodeRegion {
    fn read(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        let range = self.range(address, buf.len())?;
        buf.copy_from_slice(&self.bytes.lock().unwrap()[range]);
        Ok(())
    }

    fn with_writable_alias(&self, address: u64, len: usize, patch: &mut dyn FnMut(&mut [u8])) -> Result<()> {
        let range = self.range(address, len)?;
        patch(&mut self.bytes.lock().unwrap()[range]);
        Ok(())
    }
}

/// Holds readers of one address until opened
#[derive(Default)]
pub struct Gate {
    pub address: u64,
    pub entered: AtomicBool,
    open: AtomicBool,
}

impl Gate {
    pub fn wait_entered(&self) {
        while !self.entered.load(Ordering::SeqCst) {
            thread::yield_now();
        }
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    fn pass(&self) {
        self.entered.store(true, Ordering::SeqCst);
        while !self.open.load(Ordering::SeqCst) {
            thread::yield_now();
        }
    }
}

/// Caller memory; anything not mapped faults
#[derive(Default)]
pub struct CallerSpace {
    regions: Mutex<BTreeMap<u64, Vec<u8>>>,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl CallerSpace {
    pub fn map(&self, address: u64, bytes: Vec<u8>) {
        self.regions.lock().unwrap().insert(address, bytes);
    }

    /// Blocks the next reads of `address` until the gate opens
    pub fn gate(&self, address: u64) -> Arc<Gate> {
        let gate = Arc::new(Gate { address, ..Gate::default() });
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Maps an argument array of 64-bit values
    pub fn map_arguments(&self, address: u64, values: &[u64]) {
        self.map(address, values.iter().flat_map(|value| value.to_le_bytes()).collect());
    }
}

impl CallerMemory for CallerSpace {
    fn read(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate.filter(|gate| gate.address == address) {
            gate.pass();
        }
        let regions = self.regions.lock().unwrap();
        let (base, bytes) = regions.range(..=address).next_back().ok_or(Error::AccessFault(address))?;
        let start = (address - base) as usize;
        let source = bytes.get(start..start + buf.len()).ok_or(Error::AccessFault(address))?;
        buf.copy_from_slice(source);
        Ok(())
    }
}

/// A named object in the caller's handle table
#[derive(Clone)]
pub struct SimObject {
    pub type_name: &'static [u8],
    pub name: &'static [u8],
    pub identity: Option<ClientId>,
}

/// Object manager over a handle table; counts outstanding references
#[derive(Default)]
pub struct ObjectTable {
    objects: Mutex<HashMap<u64, SimObject>>,
    pub outstanding: AtomicUsize,
}

impl ObjectTable {
    pub fn insert(&self, handle: u64, object: SimObject) {
        self.objects.lock().unwrap().insert(handle, object);
    }

    fn get(&self, object: ObjectId) -> Result<SimObject> {
        self.objects.lock().unwrap().get(&object.0).cloned().ok_or(Error::InvalidHandle("object"))
    }
}

impl ObjectResolver for ObjectTable {
    fn reference_by_handle(&self, handle: u64, _mode: ProcessorMode) -> Result<ObjectId> {
        self.get(ObjectId(handle))?;
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(ObjectId(handle))
    }

    fn type_name(&self, object: ObjectId, buf: &mut [u8]) -> Result<usize> {
        let name = self.get(object)?.type_name;
        buf[..name.len()].copy_from_slice(name);
        Ok(name.len())
    }

    fn query_name(&self, object: ObjectId, buf: &mut [u8]) -> Result<usize> {
        let name = self.get(object)?.name;
        if name.len() > buf.len() {
            return Err(Error::NameTooLong);
        }
        buf[..name.len()].copy_from_slice(name);
        Ok(name.len())
    }

    fn identity(&self, object: ObjectId) -> Option<ClientId> {
        self.get(object).ok()?.identity
    }

    fn dereference(&self, _object: ObjectId) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Counting semaphore with a limit
pub struct Counter {
    pub count: AtomicU32,
    limit: u32,
}

impl Counter {
    pub fn new(count: u32, limit: u32) -> Arc<Self> {
        Arc::new(Self { count: AtomicU32::new(count), limit })
    }

    pub fn value(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Semaphore for Counter {
    fn try_acquire(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1))
            .is_ok()
    }

    fn release(&self, count: u32) -> Result<()> {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(count).filter(|next| *next <= self.limit)
            })
            .map(|_| ())
            .map_err(|_| Error::SemaphoreLimitExceeded)
    }
}

/// A subscriber process and its ring buffer
pub struct Subscriber {
    pub pid: u64,
    pub base: u64,
    pub buffer: Mutex<Vec<u8>>,
}

impl Subscriber {
    pub fn new(pid: u64, base: u64, size: usize) -> Arc<Self> {
        Arc::new(Self { pid, base, buffer: Mutex::new(vec![0; size]) })
    }
}

impl ClientProcess for Subscriber {
    fn process_id(&self) -> u64 {
        self.pid
    }

    fn write(&self, address: u64, data: &[u8]) -> Result<()> {
        let mut buffer = self.buffer.lock().unwrap();
        let start = address.checked_sub(self.base).ok_or(Error::AccessFault(address))? as usize;
        let target = buffer.get_mut(start..start + data.len()).ok_or(Error::AccessFault(address))?;
        target.copy_from_slice(data);
        Ok(())
    }
}

/// Handles a subscriber passes at registration
#[derive(Default)]
pub struct HandleSpace {
    processes: Mutex<HashMap<u64, Arc<Subscriber>>>,
    semaphores: Mutex<HashMap<u64, Arc<Counter>>>,
}

impl ClientObjects for HandleSpace {
    fn open_process(&self, handle: u64, _mode: ProcessorMode) -> Result<Arc<dyn ClientProcess>> {
        let process = self.processes.lock().unwrap().get(&handle).cloned();
        process.map(|p| p as Arc<dyn ClientProcess>).ok_or(Error::InvalidHandle("process"))
    }

    fn open_semaphore(&self, handle: u64, _mode: ProcessorMode) -> Result<Arc<dyn Semaphore>> {
        let semaphore = self.semaphores.lock().unwrap().get(&handle).cloned();
        semaphore.map(|s| s as Arc<dyn Semaphore>).ok_or(Error::InvalidHandle("semaphore"))
    }
}

pub const HOOK_TARGET: u64 = 0xffff_f800_0040_0000;
pub const HOOK_STUB: u64 = 0xffff_f800_0050_0000;
pub const PROLOGUE: [u8; 8] = [0x4c, 0x8b, 0xd1, 0xb8, 0x0c, 0x00, 0x00, 0x00];

/// Everything a test needs around one logger
pub struct Sim {
    pub cpus: Arc<ThreadCpus>,
    pub code: Arc<CodeRegion>,
    pub memory: Arc<CallerSpace>,
    pub objects: Arc<ObjectTable>,
    pub handles: Arc<HandleSpace>,
    next_handle: AtomicU32,
}

impl Sim {
    pub fn new(cpus: usize) -> Self {
        Self {
            cpus: ThreadCpus::new(cpus),
            code: CodeRegion::new(HOOK_TARGET, &PROLOGUE),
            memory: Arc::new(CallerSpace::default()),
            objects: Arc::new(ObjectTable::default()),
            handles: Arc::new(HandleSpace::default()),
            next_handle: AtomicU32::new(0x100),
        }
    }

    pub fn platform(&self, tracer: MockTracer, clock: MockTime) -> Platform {
        Platform {
            processors: self.cpus.clone(),
            code: self.code.clone(),
            memory: self.memory.clone(),
            objects: self.objects.clone(),
            clients: self.handles.clone(),
            tracer: Arc::new(tracer),
            clock: Arc::new(clock),
            hook_target: Some(HookTarget { target: HOOK_TARGET, replacement: HOOK_STUB }),
        }
    }

    pub fn logger(&self) -> Logger {
        self.logger_with(LoggerConfig::default())
    }

    pub fn logger_with(&self, config: LoggerConfig) -> Logger {
        Logger::new(self.platform(quiet_tracer(), fixed_clock(0x01d0_0000_0000_0000)), config)
    }

    fn handle(&self) -> u64 {
        self.next_handle.fetch_add(4, Ordering::SeqCst) as u64
    }

    /// Hands out handles for a new subscriber
    pub fn subscriber(&self, pid: u64, size: usize, space: u32) -> Endpoint {
        let base = 0x0000_0100_0000_0000 + pid * 0x10_0000;
        let process = Subscriber::new(pid, base, size);
        let read = Counter::new(0, u32::MAX);
        let write = Counter::new(space, u32::MAX);
        let request = ClientRequest {
            process_handle: self.handle(),
            read_semaphore: self.handle(),
            write_semaphore: self.handle(),
            buffer_base: base,
            buffer_size: size,
        };
        self.handles.processes.lock().unwrap().insert(request.process_handle, process.clone());
        let mut semaphores = self.handles.semaphores.lock().unwrap();
        semaphores.insert(request.read_semaphore, read.clone());
        semaphores.insert(request.write_semaphore, write.clone());
        Endpoint { process, read, write, request, reader: Mutex::new(BlockReader::new()) }
    }
}

/// The subscriber side of one client
pub struct Endpoint {
    pub process: Arc<Subscriber>,
    pub read: Arc<Counter>,
    pub write: Arc<Counter>,
    pub request: ClientRequest,
    reader: Mutex<BlockReader>,
}

/// A block as seen by a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Event { number: u32, process_id: u64, arguments: Vec<u64>, trace: Vec<u64> },
    Argument { index: u8, arg_type: ArgumentType },
}

impl Endpoint {
    /// Registers, enables and attaches one ruleset
    pub fn attach(&self, logger: &Logger, default: FilterType) -> (ClientHandle, RuleSetHandle) {
        let client = logger.create_client(&self.request, ProcessorMode::User).unwrap();
        let ruleset = logger.create_ruleset(client, default, RuleSetAction::Deliver).unwrap();
        logger.enable_client(client, true).unwrap();
        (client, ruleset)
    }

    /// Consumes every signalled block
    pub fn drain(&self) -> Vec<Seen> {
        let buffer = self.process.buffer.lock().unwrap().clone();
        let mut reader = self.reader.lock().unwrap();
        let mut seen = Vec::new();
        while self.read.try_acquire() {
            let block = reader.next_block(&buffer).expect("well-formed block");
            seen.push(match block {
                Block::Event(event) => Seen::Event {
                    number: event.number(),
                    process_id: event.process_id(),
                    arguments: (0..event.argument_count() as usize).filter_map(|i| event.argument(i)).collect(),
                    trace: (0..event.trace_count() as usize).filter_map(|i| event.frame(i)).collect(),
                },
                Block::Argument(argument) => Seen::Argument { index: argument.index(), arg_type: argument.arg_type() },
            });
            self.write.release(1).unwrap();
        }
        seen
    }
}

/// A user-mode call from `pid` through the primary table
pub fn call(number: u32, pid: u64, arguments: u64, argument_count: u32) -> InterceptedCall {
    InterceptedCall {
        number,
        arguments,
        argument_count,
        table: ServiceTable::Primary,
        previous_mode: ProcessorMode::User,
        process_id: pid,
        thread_id: pid + 4,
        system_process: false,
    }
}
