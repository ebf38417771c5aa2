//! Federation membership registry.
//!
//! One [`SimulatorState`] per member, stored in registration order. A
//! member's position in the vector is its wire identity in ACK frames; the
//! name-to-index map exists only for sender lookup. Entries are never
//! removed — BYE marks a member quiescent, it does not unregister it.

use cosim_types::{SimIndex, SimTime, TIME_NEVER};
use std::collections::{HashMap, HashSet};

/// Per-member time-stepping state.
#[derive(Debug, Clone)]
pub struct SimulatorState {
    /// Unique name supplied at registration.
    pub name: String,
    /// Minimum granularity at which this member accepts grants, ns.
    pub time_delta: SimTime,
    /// Next simulated time this member wants to be woken.
    /// [`TIME_NEVER`] once the member has said BYE.
    pub time_requested: SimTime,
    /// Time of the most recent grant this member acted on.
    pub time_last_processed: SimTime,
    /// True between grant-sent and the member's next TIME_REQUEST/BYE.
    pub processing: bool,
    /// True if a publish has been routed here since the last grant.
    pub messages_pending: bool,
    /// Topics this member receives.
    pub subscriptions: HashSet<String>,
}

impl SimulatorState {
    /// Fresh state for a newly registered member.
    pub fn new(name: String, time_delta: SimTime, subscriptions: HashSet<String>) -> Self {
        SimulatorState {
            name,
            time_delta,
            time_requested: 0,
            time_last_processed: 0,
            processing: false,
            messages_pending: false,
            subscriptions,
        }
    }

    /// Whether this member has said BYE.
    pub fn has_departed(&self) -> bool {
        self.time_requested == TIME_NEVER
    }

    /// The earliest simulated time at which this member has real work.
    ///
    /// A member with pending mail must be woken one granularity after it
    /// last ran regardless of what it requested; a member without mail waits
    /// for its requested time. Requests in the past of `floor` (the current
    /// global grant) are pulled up to `floor` so the global clock never runs
    /// backwards.
    pub fn actionable(&self, floor: SimTime) -> SimTime {
        if self.messages_pending {
            self.time_last_processed.saturating_add(self.time_delta)
        } else {
            self.time_requested.max(floor)
        }
    }

    /// Fast-forward `time_last_processed` to the largest multiple of
    /// `time_delta` that is ≤ `time_granted`, keeping the mail-driven wake
    /// arithmetic aligned to this member's native grid.
    pub fn align_to_grid(&mut self, time_granted: SimTime) {
        debug_assert!(self.time_delta > 0);
        if time_granted > self.time_last_processed {
            let jump = (time_granted - self.time_last_processed) / self.time_delta;
            self.time_last_processed += self.time_delta * jump;
        }
    }

    pub fn subscribes_to(&self, topic: &str) -> bool {
        self.subscriptions.contains(topic)
    }
}

/// Ordered membership with by-name lookup.
#[derive(Debug, Default)]
pub struct Registry {
    members: Vec<SimulatorState>,
    by_name: HashMap<String, SimIndex>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Append a member; its index is its position in registration order.
    pub fn insert(&mut self, state: SimulatorState) -> SimIndex {
        debug_assert!(!self.contains(&state.name));
        let index = self.members.len();
        self.by_name.insert(state.name.clone(), index);
        self.members.push(state);
        index
    }

    pub fn index_of(&self, name: &str) -> Option<SimIndex> {
        self.by_name.get(name).copied()
    }

    pub fn member(&self, index: SimIndex) -> &SimulatorState {
        &self.members[index]
    }

    pub fn member_mut(&mut self, index: SimIndex) -> &mut SimulatorState {
        &mut self.members[index]
    }

    pub fn members(&self) -> &[SimulatorState] {
        &self.members
    }

    pub fn members_mut(&mut self) -> &mut [SimulatorState] {
        &mut self.members
    }
}
