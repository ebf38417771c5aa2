//! Grant computation for the lockstep time engine.
//!
//! Runs only when every processing member has reported back
//! (`n_processing == 0`). The next global time is the minimum actionable
//! time over the *entire* membership — departed members participate with
//! [`TIME_NEVER`](cosim_types::TIME_NEVER) and can never win the minimum,
//! because BYE clears their pending-mail flag and the publish router never
//! re-sets it for them.

use crate::registry::SimulatorState;
use cosim_types::{SimIndex, SimTime};

/// Outcome of one grant computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRound {
    /// The next global simulated time.
    pub time: SimTime,
    /// Members to wake at `time`, in index order.
    pub wake: Vec<SimIndex>,
}

/// Compute the next grant from the full membership.
///
/// `time_granted` is the current global clock; member requests in its past
/// are clamped up to it, which keeps successive rounds non-decreasing. All
/// members sharing the minimum are woken simultaneously.
pub fn compute(members: &[SimulatorState], time_granted: SimTime) -> GrantRound {
    let time = members
        .iter()
        .map(|m| m.actionable(time_granted))
        .min()
        .unwrap_or(SimTime::MAX);

    let wake = members
        .iter()
        .enumerate()
        .filter(|(_, m)| m.actionable(time_granted) == time)
        .map(|(i, _)| i)
        .collect();

    GrantRound { time, wake }
}

/// Apply a computed round to the membership.
///
/// Woken members become processing with their mail flag cleared; everyone
/// else fast-forwards `time_last_processed` onto its granularity grid so the
/// next mail-driven wake lands on a native step boundary.
pub fn apply(members: &mut [SimulatorState], round: &GrantRound) {
    for (i, member) in members.iter_mut().enumerate() {
        // `wake` is in ascending index order by construction.
        if round.wake.binary_search(&i).is_ok() {
            member.processing = true;
            member.messages_pending = false;
        } else {
            member.align_to_grid(round.time);
        }
    }
}
