//! SSMON Logger
//!
//! Intercepts system service calls, filters them per subscriber and
//! delivers structured call records into subscriber ring buffers.
//!
//! # Architecture
//!
//! - **Quiesce**: parks every other processor while code is patched
//! - **Hook**: installs and removes the call-table redirection
//! - **Calls**: the static table of call descriptors
//! - **Capture**: type-aware copies of call arguments
//! - **Rules**: per-subscriber include/exclude filtering
//! - **Transport**: drop-on-full writes into subscriber buffers
//! - **Dispatcher**: the per-call pipeline that ties the above together
//! - **Manager**: the management surface ([`Logger`])
//!
//! # Usage
//!
//! ```rust,ignore
//! use ssmon_logger::{global, LoggerConfig};
//!
//! let logger = global::init(platform, LoggerConfig::default())?;
//! let client = logger.create_client(&request, ProcessorMode::User)?;
//! let ruleset = logger.create_ruleset(client, FilterType::Exclude, RuleSetAction::Deliver)?;
//! logger.add_rule(ruleset, FilterType::Include, RuleValue::ProcessId(pid))?;
//! logger.enable_client(client, true)?;
//! logger.start_logging()?;
//! ```

#![no_std]

#[cfg(any(test, feature = "std"))]
extern crate std;

extern crate alloc;

#[macro_use]
mod logging;

pub mod calls;
pub mod capture;
pub mod config;
pub mod dispatcher;
pub mod global;
pub mod hook;
pub mod manager;
pub mod object;
pub mod quiesce;
pub mod rules;
pub mod transport;

// Re-export commonly used items
pub use config::{CaptureLimits, ImageRange, LoggerConfig};
pub use dispatcher::{DispatchOutcome, InterceptedCall, ServiceTable, SkipReason};
pub use manager::{ClientHandle, ClientRequest, Logger};
pub use rules::{FilterType, RuleHandle, RuleSetAction, RuleSetHandle, RuleValue};
pub use transport::{ClientInformation, WriteOutcome};
