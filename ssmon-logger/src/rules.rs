//! Rule engine
//!
//! A [`RuleSet`] belongs to one client and decides, for every intercepted
//! call, whether that client wants it. Rules come in four kinds that are
//! evaluated independently and then combined in a fixed kind order:
//!
//! 1. An Exclude hit of a kind means "no match", immediately.
//! 2. An Include hit of a kind means "match", but a later kind may still
//!    override it.
//! 3. An Include rule of a kind that was tested and missed means "no match",
//!    immediately, unless the ruleset default is Include.
//!
//! The starting point is the ruleset default. Kinds that no rule exercised
//! are skipped.

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use spin::RwLock;
use ssmon_api::platform::ProcessorMode;
use ssmon_api::{Error, Result};

use crate::transport::ClientEntry;

/// Include or Exclude, for rules and ruleset defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    Include,
    Exclude,
}

impl FilterType {
    pub fn from_raw(raw: u32, parameter: u8) -> Result<Self> {
        match raw {
            0 => Ok(FilterType::Include),
            1 => Ok(FilterType::Exclude),
            _ => Err(Error::InvalidParameter(parameter, "filter type")),
        }
    }
}

/// What happens to a matched call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleSetAction {
    /// Write the event to the client's buffer
    Deliver,
}

impl RuleSetAction {
    pub fn from_raw(raw: u32, parameter: u8) -> Result<Self> {
        match raw {
            0 => Ok(RuleSetAction::Deliver),
            _ => Err(Error::InvalidParameter(parameter, "ruleset action")),
        }
    }
}

/// Rule kinds, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleKind {
    ProcessId = 0,
    ThreadId = 1,
    PreviousMode = 2,
    Number = 3,
}

impl RuleKind {
    pub const COUNT: usize = 4;
}

/// Kind-specific rule payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleValue {
    ProcessId(u64),
    ThreadId(u64),
    PreviousMode(ProcessorMode),
    Number(u32),
}

impl RuleValue {
    /// Decodes a rule as marshalled by the control surface
    pub fn from_raw(kind: u32, value: u64) -> Result<Self> {
        match kind {
            0 => Ok(RuleValue::ProcessId(value)),
            1 => Ok(RuleValue::ThreadId(value)),
            2 => u8::try_from(value)
                .ok()
                .and_then(ProcessorMode::from_raw)
                .map(RuleValue::PreviousMode)
                .ok_or(Error::InvalidParameter(4, "previous mode")),
            3 => u32::try_from(value)
                .map(RuleValue::Number)
                .map_err(|_| Error::InvalidParameter(4, "call number")),
            _ => Err(Error::InvalidParameter(3, "rule type")),
        }
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            RuleValue::ProcessId(_) => RuleKind::ProcessId,
            RuleValue::ThreadId(_) => RuleKind::ThreadId,
            RuleValue::PreviousMode(_) => RuleKind::PreviousMode,
            RuleValue::Number(_) => RuleKind::Number,
        }
    }

    fn fires(&self, call: &CallFacts) -> bool {
        match *self {
            RuleValue::ProcessId(id) => call.process_id == id,
            RuleValue::ThreadId(id) => call.thread_id == id,
            RuleValue::PreviousMode(mode) => call.previous_mode == mode,
            RuleValue::Number(number) => call.number == number,
        }
    }
}

/// The attributes of a call that rules test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFacts {
    pub process_id: u64,
    pub thread_id: u64,
    pub previous_mode: ProcessorMode,
    pub number: u32,
}

/// Opaque rule handle, unique within its ruleset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleHandle(pub u64);

/// One rule
///
/// A rule is inserted before it is published; the matcher skips it until
/// [`RuleEntry::publish`] has run.
#[derive(Debug)]
pub struct RuleEntry {
    handle: RuleHandle,
    filter: FilterType,
    value: RuleValue,
    initialized: AtomicBool,
}

impl RuleEntry {
    pub fn new(handle: RuleHandle, filter: FilterType, value: RuleValue) -> Self {
        Self { handle, filter, value, initialized: AtomicBool::new(false) }
    }

    pub fn handle(&self) -> RuleHandle {
        self.handle
    }

    pub fn filter(&self) -> FilterType {
        self.filter
    }

    pub fn value(&self) -> RuleValue {
        self.value
    }

    pub fn publish(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct KindState {
    included: bool,
    excluded: bool,
    include_failed: bool,
}

/// Evaluates `rules` against `call`
pub fn evaluate(default: FilterType, rules: &[Arc<RuleEntry>], call: &CallFacts) -> bool {
    let mut kinds = [KindState::default(); RuleKind::COUNT];

    for rule in rules {
        if !rule.is_initialized() {
            continue;
        }
        let state = &mut kinds[rule.value.kind() as usize];
        if state.excluded {
            continue;
        }
        let fired = rule.value.fires(call);
        match (rule.filter, fired) {
            (FilterType::Include, true) => state.included = true,
            (FilterType::Include, false) => state.include_failed = true,
            (FilterType::Exclude, true) => state.excluded = true,
            (FilterType::Exclude, false) => {}
        }
    }

    let mut result = default == FilterType::Include;
    for state in &kinds {
        if state.excluded {
            result = false;
            break;
        }
        if state.included {
            result = true;
        } else if state.include_failed && default != FilterType::Include {
            result = false;
            break;
        }
    }
    result
}

/// Opaque ruleset handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleSetHandle(pub u64);

/// A client's rules plus the default policy
pub struct RuleSet {
    handle: RuleSetHandle,
    default: FilterType,
    action: RuleSetAction,
    client: Weak<ClientEntry>,
    rules: RwLock<Vec<Arc<RuleEntry>>>,
    next_rule: AtomicU64,
    rule_step: u64,
}

impl RuleSet {
    pub fn new(
        handle: RuleSetHandle,
        client: &Arc<ClientEntry>,
        default: FilterType,
        action: RuleSetAction,
        rule_step: u64,
    ) -> Self {
        Self {
            handle,
            default,
            action,
            client: Arc::downgrade(client),
            rules: RwLock::new(Vec::new()),
            next_rule: AtomicU64::new(rule_step),
            rule_step,
        }
    }

    pub fn handle(&self) -> RuleSetHandle {
        self.handle
    }

    pub fn default_filter(&self) -> FilterType {
        self.default
    }

    pub fn action(&self) -> RuleSetAction {
        self.action
    }

    /// The owning client, unless it is already gone
    pub fn client(&self) -> Option<Arc<ClientEntry>> {
        self.client.upgrade()
    }

    pub fn is_owned_by(&self, client: &Arc<ClientEntry>) -> bool {
        core::ptr::eq(self.client.as_ptr(), Arc::as_ptr(client))
    }

    /// Adds a rule and returns its handle
    pub fn add_rule(&self, filter: FilterType, value: RuleValue) -> Result<RuleHandle> {
        let handle = RuleHandle(self.next_rule.fetch_add(self.rule_step, Ordering::Relaxed));
        let rule = Arc::new(RuleEntry::new(handle, filter, value));
        {
            let mut rules = self.rules.write();
            rules
                .try_reserve(1)
                .map_err(|_| Error::InsufficientResources("rule entry"))?;
            rules.push(Arc::clone(&rule));
        }
        rule.publish();
        Ok(handle)
    }

    pub fn remove_rule(&self, handle: RuleHandle) -> Result<()> {
        let removed = {
            let mut rules = self.rules.write();
            let position = rules
                .iter()
                .position(|rule| rule.handle == handle)
                .ok_or(Error::NotFound("rule"))?;
            rules.remove(position)
        };
        drop(removed);
        Ok(())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Whether `call` passes this ruleset
    pub fn matches(&self, call: &CallFacts) -> bool {
        let rules = self.rules.read();
        evaluate(self.default, &rules, call)
    }
}

impl core::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RuleSet")
            .field("handle", &self.handle)
            .field("default", &self.default)
            .field("action", &self.action)
            .field("rules", &self.rule_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use proptest::prelude::*;

    const CALL_42: CallFacts = CallFacts {
        process_id: 42,
        thread_id: 100,
        previous_mode: ProcessorMode::User,
        number: 0x0c,
    };

    fn rule(filter: FilterType, value: RuleValue) -> Arc<RuleEntry> {
        let rule = Arc::new(RuleEntry::new(RuleHandle(0), filter, value));
        rule.publish();
        rule
    }

    #[test]
    fn test_empty_ruleset_follows_default() {
        assert!(evaluate(FilterType::Include, &[], &CALL_42));
        assert!(!evaluate(FilterType::Exclude, &[], &CALL_42));
    }

    #[test]
    fn test_failed_include_suppresses_under_exclude_default() {
        let rules = vec![rule(FilterType::Include, RuleValue::ProcessId(42))];
        assert!(evaluate(FilterType::Exclude, &rules, &CALL_42));
        let other = CallFacts { process_id: 7, ..CALL_42 };
        assert!(!evaluate(FilterType::Exclude, &rules, &other));
        // Under an Include default a missed Include changes nothing.
        assert!(evaluate(FilterType::Include, &rules, &other));
    }

    #[test]
    fn test_exclude_wins_within_kind() {
        let rules = vec![
            rule(FilterType::Include, RuleValue::ProcessId(42)),
            rule(FilterType::Exclude, RuleValue::ProcessId(42)),
        ];
        assert!(!evaluate(FilterType::Include, &rules, &CALL_42));
        assert!(!evaluate(FilterType::Exclude, &rules, &CALL_42));
    }

    #[test]
    fn test_later_kind_exclude_overrides_include() {
        let rules = vec![
            rule(FilterType::Include, RuleValue::ProcessId(42)),
            rule(FilterType::Exclude, RuleValue::Number(0x0c)),
        ];
        assert!(!evaluate(FilterType::Exclude, &rules, &CALL_42));
    }

    #[test]
    fn test_kind_order_asymmetry() {
        // Included process, missed number: the missed Include only counts
        // when the default is Exclude.
        let rules = vec![
            rule(FilterType::Include, RuleValue::ProcessId(42)),
            rule(FilterType::Include, RuleValue::Number(0x99)),
        ];
        assert!(evaluate(FilterType::Include, &rules, &CALL_42));
        assert!(!evaluate(FilterType::Exclude, &rules, &CALL_42));
    }

    #[test]
    fn test_any_include_of_kind_fires() {
        let rules = vec![
            rule(FilterType::Include, RuleValue::ProcessId(7)),
            rule(FilterType::Include, RuleValue::ProcessId(42)),
        ];
        assert!(evaluate(FilterType::Exclude, &rules, &CALL_42));
    }

    #[test]
    fn test_unpublished_rule_is_invisible() {
        let pending = Arc::new(RuleEntry::new(RuleHandle(4), FilterType::Exclude, RuleValue::ProcessId(42)));
        let rules = vec![pending.clone()];
        assert!(evaluate(FilterType::Include, &rules, &CALL_42));
        pending.publish();
        assert!(!evaluate(FilterType::Include, &rules, &CALL_42));
    }

    #[test]
    fn test_previous_mode_rule() {
        let rules = vec![rule(FilterType::Exclude, RuleValue::PreviousMode(ProcessorMode::Kernel))];
        assert!(evaluate(FilterType::Include, &rules, &CALL_42));
        let kernel = CallFacts { previous_mode: ProcessorMode::Kernel, ..CALL_42 };
        assert!(!evaluate(FilterType::Include, &rules, &kernel));
    }

    #[test]
    fn test_rule_value_from_raw() {
        assert_eq!(RuleValue::from_raw(0, 8), Ok(RuleValue::ProcessId(8)));
        assert_eq!(RuleValue::from_raw(2, 1), Ok(RuleValue::PreviousMode(ProcessorMode::User)));
        assert_eq!(RuleValue::from_raw(2, 5), Err(Error::InvalidParameter(4, "previous mode")));
        assert_eq!(RuleValue::from_raw(3, 1 << 40), Err(Error::InvalidParameter(4, "call number")));
        assert_eq!(RuleValue::from_raw(9, 0), Err(Error::InvalidParameter(3, "rule type")));
        assert_eq!(FilterType::from_raw(2, 2), Err(Error::InvalidParameter(2, "filter type")));
    }

    fn value_strategy() -> impl Strategy<Value = RuleValue> {
        prop_oneof![
            (0u64..4).prop_map(RuleValue::ProcessId),
            (0u64..4).prop_map(RuleValue::ThreadId),
            any::<bool>().prop_map(|user| RuleValue::PreviousMode(if user {
                ProcessorMode::User
            } else {
                ProcessorMode::Kernel
            })),
            (0u32..4).prop_map(RuleValue::Number),
        ]
    }

    fn filter_strategy() -> impl Strategy<Value = FilterType> {
        prop_oneof![Just(FilterType::Include), Just(FilterType::Exclude)]
    }

    fn facts_strategy() -> impl Strategy<Value = CallFacts> {
        (0u64..4, 0u64..4, any::<bool>(), 0u32..4).prop_map(|(process_id, thread_id, user, number)| {
            CallFacts {
                process_id,
                thread_id,
                previous_mode: if user { ProcessorMode::User } else { ProcessorMode::Kernel },
                number,
            }
        })
    }

    proptest! {
        #[test]
        fn prop_fired_exclude_always_wins(
            rules in proptest::collection::vec((filter_strategy(), value_strategy()), 0..12),
            default in filter_strategy(),
            call in facts_strategy(),
            position in any::<prop::sample::Index>(),
        ) {
            let mut rules: Vec<Arc<RuleEntry>> =
                rules.into_iter().map(|(filter, value)| rule(filter, value)).collect();
            let exclude = rule(FilterType::Exclude, RuleValue::Number(call.number));
            let at = position.index(rules.len() + 1);
            rules.insert(at, exclude);
            prop_assert!(!evaluate(default, &rules, &call));
        }

        #[test]
        fn prop_rule_order_within_kind_is_irrelevant(
            rules in proptest::collection::vec((filter_strategy(), value_strategy()), 0..12),
            default in filter_strategy(),
            call in facts_strategy(),
        ) {
            let forward: Vec<Arc<RuleEntry>> =
                rules.iter().map(|&(filter, value)| rule(filter, value)).collect();
            let mut backward = forward.clone();
            backward.reverse();
            prop_assert_eq!(evaluate(default, &forward, &call), evaluate(default, &backward, &call));
        }

        #[test]
        fn prop_excludes_only_never_match_under_exclude_default(
            values in proptest::collection::vec(value_strategy(), 0..12),
            call in facts_strategy(),
        ) {
            let rules: Vec<Arc<RuleEntry>> =
                values.into_iter().map(|value| rule(FilterType::Exclude, value)).collect();
            prop_assert!(!evaluate(FilterType::Exclude, &rules, &call));
        }
    }
}
