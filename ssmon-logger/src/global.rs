//! Process-scoped logger instance
//!
//! The platform entry stub has no context pointer to pass, so it reaches the
//! logger through this slot. Ordering: [`init`] builds the call descriptor
//! table before logging can be started; [`teardown`] refuses while logging
//! is running, so stop (which drains in-flight dispatches) always comes
//! first.

use alloc::sync::Arc;

use spin::RwLock;
use ssmon_api::{Error, Platform, Result};

use crate::config::LoggerConfig;
use crate::dispatcher::{DispatchOutcome, InterceptedCall, SkipReason};
use crate::manager::Logger;

static LOGGER: RwLock<Option<Arc<Logger>>> = RwLock::new(None);

/// Creates the logger instance
pub fn init(platform: Platform, config: LoggerConfig) -> Result<Arc<Logger>> {
    let mut slot = LOGGER.write();
    if slot.is_some() {
        return Err(Error::InvalidState("logger already initialized"));
    }
    let logger = Arc::new(Logger::new(platform, config));
    *slot = Some(Arc::clone(&logger));
    Ok(logger)
}

/// The current instance, if initialized
pub fn instance() -> Option<Arc<Logger>> {
    LOGGER.read().clone()
}

/// Destroys the instance; logging must be stopped
pub fn teardown() -> Result<()> {
    let logger = {
        let mut slot = LOGGER.write();
        let running = slot
            .as_ref()
            .map(|logger| logger.is_logging())
            .ok_or(Error::InvalidState("logger not initialized"))?;
        if running {
            return Err(Error::InvalidState("logging still running"));
        }
        slot.take()
    };
    drop(logger);
    Ok(())
}

/// Hook entry point
pub fn dispatch(call: &InterceptedCall) -> DispatchOutcome {
    match instance() {
        Some(logger) => logger.dispatch(call),
        None => DispatchOutcome::Skipped(SkipReason::Stopped),
    }
}
