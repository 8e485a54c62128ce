//! Logger configuration
//!
//! Every tunable constant of the logger lives here. The defaults describe the
//! supported 64-bit build.

use ssmon_api::abi::ContextLayout;

/// Upper bounds applied while copying argument payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureLimits {
    /// Longest narrow, wide or counted string copied, in bytes
    pub string_max_bytes: usize,
    /// Longest raw byte buffer copied
    pub bytes_max: usize,
    /// Scratch space for an object's name or type name
    pub name_scratch_bytes: usize,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            string_max_bytes: 0x1000,
            bytes_max: 0x1000,
            name_scratch_bytes: 0x400,
        }
    }
}

/// Address range occupied by the logger's own code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageRange {
    pub start: u64,
    pub length: u64,
}

impl ImageRange {
    pub const fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address - self.start < self.length
    }
}

/// Logger configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Maximum number of rulesets referenced by one dispatch
    pub ruleset_snapshot_limit: usize,
    /// Arguments beyond this index never get an argument block
    pub max_argument_blocks: usize,
    /// Frames per trace half (kernel and user)
    pub max_stack_depth: usize,
    /// Argument capture bounds
    pub capture: CaptureLimits,
    /// Step between rule handles; the first handle equals the step
    pub rule_handle_increment: u64,
    /// Call number of the exception-continuation service
    pub recovery_call: u32,
    /// The logger's own image, for self-exclusion
    pub image_range: ImageRange,
    /// Highest address a less trusted caller may pass
    pub highest_user_address: u64,
    /// Register context geometry
    pub context_layout: ContextLayout,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            ruleset_snapshot_limit: 64,
            max_argument_blocks: 32,
            max_stack_depth: 64,
            capture: CaptureLimits::default(),
            rule_handle_increment: 4,
            recovery_call: crate::calls::numbers::NT_CONTINUE,
            image_range: ImageRange::default(),
            highest_user_address: 0x7fff_ffef_ffff,
            context_layout: ContextLayout::AMD64,
        }
    }
}

impl LoggerConfig {
    /// Default configuration with the logger image placed at `image_range`
    pub fn with_image(image_range: ImageRange) -> Self {
        Self { image_range, ..Self::default() }
    }
}
