//! Interception dispatcher
//!
//! Runs inline on the thread that made an intercepted call:
//!
//! 1. enter the in-flight count, then pre-checks (running, execution level,
//!    call table, self-exclusion)
//! 2. snapshot the rulesets that match, under the shared list lock
//! 3. build the event block and the argument blocks
//! 4. write them to every matched subscriber, one sequence each
//!
//! Nothing in here waits. Failures are logged and swallowed; the
//! intercepted call never sees them.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::RwLock;
use ssmon_api::platform::{ExecutionLevel, Platform, ProcessorMode};
use ssmon_api::wire::{BlockHeader, BlockType, EventFlags, PayloadBuilder, EVENT_BLOCK_SIZE, MAX_BLOCK_SIZE};
use ssmon_api::{Error, Result};

use crate::calls::CallRegistry;
use crate::capture::{capture_argument, CaptureContext, RawArgument};
use crate::config::LoggerConfig;
use crate::object::DeferredRelease;
use crate::rules::{CallFacts, RuleSet};
use crate::transport::ClientEntry;

/// Which call table the call went through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceTable {
    Primary,
    /// Any other table, e.g. the graphics table
    Other,
}

/// One intercepted call, as handed over by the entry stub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterceptedCall {
    pub number: u32,
    /// Address of the argument array
    pub arguments: u64,
    pub argument_count: u32,
    pub table: ServiceTable,
    pub previous_mode: ProcessorMode,
    pub process_id: u64,
    pub thread_id: u64,
    /// The caller belongs to the system process (no user-mode stack)
    pub system_process: bool,
}

impl InterceptedCall {
    pub fn facts(&self) -> CallFacts {
        CallFacts {
            process_id: self.process_id,
            thread_id: self.thread_id,
            previous_mode: self.previous_mode,
            number: self.number,
        }
    }
}

/// Why a call was ignored before any ruleset was consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Logging is not running
    Stopped,
    /// Above APC level
    Level,
    ForeignTable,
    /// Fault recovery out of the logger's own code
    SelfExclusion,
}

/// Result of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Skipped(SkipReason),
    NoSubscribers,
    /// The event could not be built; nothing was delivered
    Aborted,
    /// Sequences written, one per matched subscriber
    Delivered(usize),
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    // SeqCst pairs with `set_running(false)` followed by `wait_idle`: either
    // the stopper sees this count or this dispatch sees the stopped flag.
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

type Match = (Arc<RuleSet>, Arc<ClientEntry>);

/// Dispatch state shared by every intercepted call
pub struct Dispatcher {
    platform: Platform,
    config: LoggerConfig,
    registry: CallRegistry,
    rulesets: RwLock<Vec<Arc<RuleSet>>>,
    deferred_rulesets: DeferredRelease<RuleSet>,
    deferred_clients: DeferredRelease<ClientEntry>,
    running: AtomicBool,
    in_flight: AtomicUsize,
}

impl Dispatcher {
    pub fn new(platform: Platform, config: LoggerConfig, registry: CallRegistry) -> Self {
        Self {
            platform,
            config,
            registry,
            rulesets: RwLock::new(Vec::new()),
            deferred_rulesets: DeferredRelease::new(),
            deferred_clients: DeferredRelease::new(),
            running: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn registry(&self) -> &CallRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Opens or closes the gate every dispatch passes first
    ///
    /// Closing does not wait; follow it with [`Dispatcher::wait_idle`].
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Dispatches currently inside [`Dispatcher::dispatch`]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Spins until no dispatch is in flight
    pub fn wait_idle(&self) {
        while self.in_flight() != 0 {
            core::hint::spin_loop();
        }
    }

    /// Appends a ruleset to the end of the match order
    pub fn attach(&self, ruleset: Arc<RuleSet>) -> Result<()> {
        let mut rulesets = self.rulesets.write();
        rulesets
            .try_reserve(1)
            .map_err(|_| Error::InsufficientResources("ruleset list"))?;
        rulesets.push(ruleset);
        Ok(())
    }

    /// Unlinks one ruleset; the caller drops it once no lock is held
    pub fn detach(&self, ruleset: &Arc<RuleSet>) -> Option<Arc<RuleSet>> {
        let mut rulesets = self.rulesets.write();
        let position = rulesets.iter().position(|entry| Arc::ptr_eq(entry, ruleset))?;
        Some(rulesets.remove(position))
    }

    /// Unlinks every ruleset owned by `client`
    pub fn detach_client(&self, client: &Arc<ClientEntry>) -> Vec<Arc<RuleSet>> {
        let mut rulesets = self.rulesets.write();
        let mut detached = Vec::new();
        rulesets.retain(|ruleset| {
            if ruleset.is_owned_by(client) {
                detached.push(Arc::clone(ruleset));
                false
            } else {
                true
            }
        });
        detached
    }

    /// Unlinks everything
    pub fn detach_all(&self) -> Vec<Arc<RuleSet>> {
        core::mem::take(&mut *self.rulesets.write())
    }

    pub fn ruleset_count(&self) -> usize {
        self.rulesets.read().len()
    }

    /// Handles one intercepted call
    pub fn dispatch(&self, call: &InterceptedCall) -> DispatchOutcome {
        let _in_flight = InFlight::enter(&self.in_flight);
        if !self.is_running() {
            return DispatchOutcome::Skipped(SkipReason::Stopped);
        }
        if self.platform.processors.current_level() > ExecutionLevel::Apc {
            return DispatchOutcome::Skipped(SkipReason::Level);
        }
        if call.table != ServiceTable::Primary {
            ss_debug!("dispatch: call {:#x} through a foreign table", call.number);
            return DispatchOutcome::Skipped(SkipReason::ForeignTable);
        }
        if self.is_own_recovery(call) {
            ss_debug!("dispatch: own fault recovery, not logged");
            return DispatchOutcome::Skipped(SkipReason::SelfExclusion);
        }

        let matched = self.snapshot(&call.facts());
        self.deferred_rulesets.drain();
        self.deferred_clients.drain();
        let matched = match matched {
            Ok(matched) if matched.is_empty() => return DispatchOutcome::NoSubscribers,
            Ok(matched) => matched,
            Err(err) => {
                ss_error!("dispatch: ruleset snapshot failed: {}", err);
                return DispatchOutcome::Aborted;
            }
        };

        let cx = CaptureContext {
            memory: &*self.platform.memory,
            objects: &*self.platform.objects,
            mode: call.previous_mode,
            limits: self.config.capture,
            highest_user_address: self.config.highest_user_address,
            context_layout: self.config.context_layout,
        };

        let (event, values) = match self.build_event(call, &cx) {
            Ok(built) => built,
            Err(err) => {
                ss_error!("dispatch: unable to build event for call {:#x}: {}", call.number, err);
                return DispatchOutcome::Aborted;
            }
        };
        let arguments = self.capture_arguments(call, values.as_deref(), &cx);

        let delivered = matched.len();
        for (ruleset, client) in matched {
            deliver(&client, &event, &arguments);
            drop(ruleset);
        }
        DispatchOutcome::Delivered(delivered)
    }

    /// The exception-continuation call, raised from a fault in this image
    fn is_own_recovery(&self, call: &InterceptedCall) -> bool {
        let highest = self.config.highest_user_address;
        if call.number != self.config.recovery_call
            || call.argument_count != 2
            || call.previous_mode != ProcessorMode::Kernel
            || call.arguments <= highest
        {
            return false;
        }

        let memory = &self.platform.memory;
        let mut word = [0u8; 8];
        if memory.read(call.arguments, &mut word).is_err() {
            return false;
        }
        let context = u64::from_le_bytes(word);
        if context <= highest {
            return false;
        }

        let layout = self.config.context_layout;
        let ip_address = context.wrapping_add(layout.instruction_pointer_offset as u64);
        if memory.read(ip_address, &mut word).is_err() {
            return false;
        }
        self.config.image_range.contains(u64::from_le_bytes(word))
    }

    fn snapshot(&self, facts: &CallFacts) -> Result<Vec<Match>> {
        let limit = self.config.ruleset_snapshot_limit;
        let mut matched = Vec::new();
        matched
            .try_reserve_exact(limit)
            .map_err(|_| Error::InsufficientResources("ruleset snapshot"))?;

        let rulesets = self.rulesets.read();
        for ruleset in rulesets.iter() {
            if matched.len() >= limit {
                break;
            }
            if !ruleset.matches(facts) {
                continue;
            }
            let reference = Arc::clone(ruleset);
            match reference.client() {
                Some(client) if client.is_enabled() => matched.push((reference, client)),
                client => {
                    if let Some(client) = client {
                        self.deferred_clients.push(client);
                    }
                    self.deferred_rulesets.push(reference);
                }
            }
        }
        Ok(matched)
    }

    /// Builds the event block and returns it with the raw argument values,
    /// when those could be read
    fn build_event(
        &self,
        call: &InterceptedCall,
        cx: &CaptureContext<'_>,
    ) -> Result<(Vec<u8>, Option<Vec<u64>>)> {
        let count = u16::try_from(call.argument_count)
            .map_err(|_| Error::InvalidParameter(3, "argument count"))?;
        let count = count as usize;

        let half = self.config.max_stack_depth.saturating_sub(1);
        let mut frames = Vec::new();
        frames
            .try_reserve_exact(half * 2)
            .map_err(|_| Error::InsufficientResources("stack trace"))?;
        frames.resize(half * 2, 0u64);
        let tracer = &self.platform.tracer;
        let mut captured = tracer.capture(&mut frames[..half], false).min(half);
        if !call.system_process {
            captured += tracer.capture(&mut frames[captured..captured + half], true).min(half);
        }

        let arguments_size = count * 8;
        let trace_offset = EVENT_BLOCK_SIZE + arguments_size;
        let size = trace_offset + captured * 8;
        if size > MAX_BLOCK_SIZE {
            return Err(Error::InvalidParameter(3, "event block too large"));
        }

        let mut flags = match call.previous_mode {
            ProcessorMode::User => EventFlags::USER_MODE,
            ProcessorMode::Kernel => EventFlags::KERNEL_MODE,
        };

        let mut raw = Vec::new();
        raw.try_reserve_exact(arguments_size)
            .map_err(|_| Error::InsufficientResources("argument array"))?;
        raw.resize(arguments_size, 0u8);
        let mut readable = true;
        if cx.probe(call.arguments, arguments_size).is_err() {
            flags |= EventFlags::PROBE_ARGUMENTS_FAILED;
            readable = false;
        } else if arguments_size > 0 && cx.memory.read(call.arguments, &mut raw).is_err() {
            flags |= EventFlags::COPY_ARGUMENTS_FAILED;
            raw.fill(0);
            readable = false;
        }

        let mut block = PayloadBuilder::with_capacity(size)?;
        block.put_bytes(&BlockHeader::new(size as u16, BlockType::Event).to_bytes())?;
        block.put_u32(flags.bits())?;
        block.put_u64(self.platform.clock.now() as u64)?;
        block.put_u64(call.process_id)?;
        block.put_u64(call.thread_id)?;
        block.put_u32(call.number)?;
        block.put_u16(count as u16)?;
        block.put_u16(EVENT_BLOCK_SIZE as u16)?;
        block.put_u16(captured as u16)?;
        block.put_u16(trace_offset as u16)?;
        block.put_bytes(&raw)?;
        for frame in &frames[..captured] {
            block.put_u64(*frame)?;
        }

        let values = if readable {
            let mut values = Vec::new();
            values
                .try_reserve_exact(count)
                .map_err(|_| Error::InsufficientResources("argument values"))?;
            values.extend(
                raw.chunks_exact(8)
                    .map(|chunk| u64::from_le_bytes([
                        chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
                    ])),
            );
            Some(values)
        } else {
            ss_debug!("dispatch: arguments of call {:#x} unreadable ({:?})", call.number, flags);
            None
        };

        Ok((block.into_bytes(), values))
    }

    /// Argument blocks in index order; `None` where capture failed
    fn capture_arguments(
        &self,
        call: &InterceptedCall,
        values: Option<&[u64]>,
        cx: &CaptureContext<'_>,
    ) -> Vec<Option<Vec<u8>>> {
        let mut blocks = Vec::new();
        let (Some(values), Some(descriptor)) = (values, self.registry.lookup(call.number)) else {
            return blocks;
        };

        let limit = values.len().min(self.config.max_argument_blocks);
        if blocks.try_reserve_exact(limit).is_err() {
            return blocks;
        }

        for (index, value) in values.iter().take(limit).enumerate() {
            let block = descriptor.argument_type(index).and_then(|arg_type| {
                let position = u8::try_from(index).ok()?;
                let raw = match descriptor.length_argument(index).and_then(|l| values.get(l)) {
                    Some(length) => RawArgument::with_length(*value, *length),
                    None => RawArgument::new(*value),
                };
                capture_argument(position, arg_type, &raw, cx)
                    .map_err(|err| {
                        ss_trace!("dispatch: {} argument {} omitted: {}", descriptor.name, index, err)
                    })
                    .ok()
            });
            blocks.push(block);
        }
        blocks
    }
}

/// Writes one event sequence to `client`
fn deliver(client: &ClientEntry, event: &[u8], arguments: &[Option<Vec<u8>>]) {
    let mut sequence = client.begin_sequence();
    let blocks = core::iter::once(event).chain(arguments.iter().flatten().map(Vec::as_slice));
    for block in blocks {
        if let Err(Error::BufferTooSmall) = sequence.write_block(block) {
            break;
        }
    }
}
