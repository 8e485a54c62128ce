//! Logger management surface
//!
//! [`Logger`] ties the pieces together and exposes the operations the
//! control surface calls: start and stop logging, client registration,
//! rulesets and rules. Interception enters through [`Logger::dispatch`].

use alloc::sync::Arc;
use spin::Mutex;
use ssmon_api::platform::{Platform, ProcessorMode};
use ssmon_api::{Error, Result};

use crate::calls::CallRegistry;
use crate::config::LoggerConfig;
use crate::dispatcher::{DispatchOutcome, Dispatcher, InterceptedCall};
use crate::hook::CodeHook;
use crate::object::HandleTable;
use crate::quiesce::ProcessorLock;
use crate::rules::{FilterType, RuleHandle, RuleSet, RuleSetAction, RuleSetHandle, RuleValue};
use crate::transport::{ClientEntry, ClientInformation};

/// Opaque client handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientHandle(pub u64);

/// Parameters of a client registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRequest {
    /// Handle to the subscriber process
    pub process_handle: u64,
    /// Semaphore the producer signals once per block written
    pub read_semaphore: u64,
    /// Semaphore the producer takes one unit of per block
    pub write_semaphore: u64,
    pub buffer_base: u64,
    pub buffer_size: usize,
}

/// The system service logger
pub struct Logger {
    platform: Platform,
    lock: ProcessorLock,
    hook: Option<CodeHook>,
    dispatcher: Dispatcher,
    clients: HandleTable<ClientEntry>,
    rulesets: HandleTable<RuleSet>,
    state: Mutex<()>,
}

impl Logger {
    /// Builds the call descriptor table and an idle logger
    pub fn new(platform: Platform, config: LoggerConfig) -> Self {
        let registry = CallRegistry::load();
        ss_info!("logger: {} call descriptors loaded", registry.len());
        Self {
            lock: ProcessorLock::new(Arc::clone(&platform.processors)),
            hook: platform.hook_target.map(|target| CodeHook::new(target.target, target.replacement)),
            dispatcher: Dispatcher::new(platform.clone(), config, registry),
            clients: HandleTable::new(config.rule_handle_increment),
            rulesets: HandleTable::new(config.rule_handle_increment),
            state: Mutex::new(()),
            platform,
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        self.dispatcher.config()
    }

    pub fn registry(&self) -> &CallRegistry {
        self.dispatcher.registry()
    }

    pub fn is_logging(&self) -> bool {
        self.dispatcher.is_running()
    }

    /// Installs the hook
    pub fn start_logging(&self) -> Result<()> {
        let _state = self.state.lock();
        if self.is_logging() {
            return Err(Error::InvalidState("logging already started"));
        }
        let hook = self.hook.as_ref().ok_or(Error::NotSupported("no call table hook target"))?;
        hook.install(&self.lock, &*self.platform.code)?;
        self.dispatcher.set_running(true);
        ss_info!("logger: started");
        Ok(())
    }

    /// Removes the hook and waits for in-flight dispatches to drain
    pub fn stop_logging(&self) -> Result<()> {
        let _state = self.state.lock();
        if !self.is_logging() {
            return Err(Error::InvalidState("logging not started"));
        }
        let hook = self.hook.as_ref().ok_or(Error::NotSupported("no call table hook target"))?;
        hook.remove(&self.lock, &*self.platform.code)?;
        self.dispatcher.set_running(false);
        self.dispatcher.wait_idle();
        ss_info!("logger: stopped");
        Ok(())
    }

    /// Registers a subscriber; the client starts out disabled
    pub fn create_client(&self, request: &ClientRequest, mode: ProcessorMode) -> Result<ClientHandle> {
        if request.buffer_size == 0 {
            return Err(Error::InvalidParameter(5, "buffer size"));
        }
        if mode == ProcessorMode::User {
            let end = request
                .buffer_base
                .checked_add(request.buffer_size as u64)
                .ok_or(Error::AccessFault(request.buffer_base))?;
            if end > self.config().highest_user_address.saturating_add(1) {
                return Err(Error::AccessFault(request.buffer_base));
            }
        }

        let objects = &self.platform.clients;
        let process = objects.open_process(request.process_handle, mode)?;
        let read_semaphore = objects.open_semaphore(request.read_semaphore, mode)?;
        let write_semaphore = objects.open_semaphore(request.write_semaphore, mode)?;

        let client = Arc::new(ClientEntry::new(
            process,
            read_semaphore,
            write_semaphore,
            request.buffer_base,
            request.buffer_size,
        ));
        let handle = self.clients.insert(client)?;
        ss_info!(
            "logger: client {} created, buffer {:#x}+{:#x}",
            handle,
            request.buffer_base,
            request.buffer_size
        );
        Ok(ClientHandle(handle))
    }

    fn client(&self, handle: ClientHandle) -> Result<Arc<ClientEntry>> {
        self.clients.get(handle.0).ok_or(Error::InvalidHandle("client"))
    }

    pub fn enable_client(&self, handle: ClientHandle, enabled: bool) -> Result<()> {
        self.client(handle)?.set_enabled(enabled);
        Ok(())
    }

    pub fn query_client(&self, handle: ClientHandle) -> Result<ClientInformation> {
        Ok(self.client(handle)?.information())
    }

    /// Unregisters a subscriber and every ruleset it owns
    pub fn close_client(&self, handle: ClientHandle) -> Result<()> {
        let client = self.clients.remove(handle.0).ok_or(Error::InvalidHandle("client"))?;
        client.set_enabled(false);
        let detached = self.dispatcher.detach_client(&client);
        let unlinked = self.rulesets.remove_where(|ruleset| ruleset.is_owned_by(&client));
        ss_info!("logger: client {} closed with {} rulesets", handle.0, unlinked.len());
        drop(detached);
        drop(unlinked);
        Ok(())
    }

    pub fn create_ruleset(
        &self,
        client: ClientHandle,
        default: FilterType,
        action: RuleSetAction,
    ) -> Result<RuleSetHandle> {
        let client = self.client(client)?;
        let step = self.config().rule_handle_increment;
        let (handle, ruleset) = self.rulesets.insert_with(|handle| {
            Arc::new(RuleSet::new(RuleSetHandle(handle), &client, default, action, step))
        })?;
        if let Err(err) = self.dispatcher.attach(ruleset) {
            drop(self.rulesets.remove(handle));
            return Err(err);
        }
        ss_info!("logger: ruleset {} created for pid {}", handle, client.process_id());
        Ok(RuleSetHandle(handle))
    }

    pub fn remove_ruleset(&self, handle: RuleSetHandle) -> Result<()> {
        let ruleset = self.rulesets.remove(handle.0).ok_or(Error::InvalidHandle("ruleset"))?;
        let detached = self.dispatcher.detach(&ruleset);
        drop(detached);
        ss_info!("logger: ruleset {} removed", handle.0);
        Ok(())
    }

    fn ruleset(&self, handle: RuleSetHandle) -> Result<Arc<RuleSet>> {
        self.rulesets.get(handle.0).ok_or(Error::InvalidHandle("ruleset"))
    }

    pub fn add_rule(&self, ruleset: RuleSetHandle, filter: FilterType, value: RuleValue) -> Result<RuleHandle> {
        self.ruleset(ruleset)?.add_rule(filter, value)
    }

    pub fn remove_rule(&self, ruleset: RuleSetHandle, rule: RuleHandle) -> Result<()> {
        self.ruleset(ruleset)?.remove_rule(rule)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn ruleset_count(&self) -> usize {
        self.rulesets.len()
    }

    /// Entry point for the hook
    pub fn dispatch(&self, call: &InterceptedCall) -> DispatchOutcome {
        self.dispatcher.dispatch(call)
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if self.is_logging() {
            if let Err(err) = self.stop_logging() {
                ss_error!("logger: stop on teardown failed: {}", err);
            }
        }
        let rulesets = self.dispatcher.detach_all();
        ss_debug!("logger: torn down with {} rulesets", rulesets.len());
    }
}
