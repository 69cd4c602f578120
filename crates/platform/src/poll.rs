//! Bounded hardware polling.
//!
//! Every wait on a hardware status bit has an explicit ceiling: a stuck
//! PLL or training engine must surface as a fault, never as a hang.

use embedded_hal::delay::DelayNs;

/// Poll ceiling and spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollBudget {
    /// Maximum number of condition checks.
    pub max_polls: u32,
    /// Delay between checks.
    pub interval_ns: u32,
}

impl PollBudget {
    /// Budget of `max_polls` checks spaced `interval_ns` apart.
    #[must_use]
    pub const fn new(max_polls: u32, interval_ns: u32) -> Self {
        Self {
            max_polls,
            interval_ns,
        }
    }

    /// Upper bound of the wall time spent polling, in nanoseconds.
    #[must_use]
    pub const fn ceiling_ns(self) -> u64 {
        (self.max_polls as u64).saturating_mul(self.interval_ns as u64)
    }
}

/// Training-engine pass completion.
pub const TRAINING_PASS: PollBudget = PollBudget::new(20_000, 1_000);
/// PLL lock.
pub const PLL_LOCK: PollBudget = PollBudget::new(2_000, 1_000);
/// Frame-buffer stop/start, self-refresh entry/exit.
pub const FB_HANDSHAKE: PollBudget = PollBudget::new(5_000, 1_000);
/// Mode-register sequencer idle.
pub const MRS_IDLE: PollBudget = PollBudget::new(1_000, 100);
/// Voltage regulator settle.
pub const VOLTAGE_SETTLE: PollBudget = PollBudget::new(10_000, 10_000);

/// The condition never became true within the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollTimeout {
    /// Number of checks performed.
    pub polls: u32,
}

impl core::fmt::Display for PollTimeout {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "condition not met after {} polls", self.polls)
    }
}

/// Check `condition` until it holds or the budget is exhausted.
///
/// The condition is evaluated first without delay. Returns the number of
/// checks it took (at least 1).
///
/// # Errors
///
/// [`PollTimeout`] when `budget.max_polls` checks all returned `false`.
pub fn poll_until<D, F>(delay: &mut D, budget: PollBudget, mut condition: F) -> Result<u32, PollTimeout>
where
    D: DelayNs + ?Sized,
    F: FnMut() -> bool,
{
    let mut polls: u32 = 0;
    while polls < budget.max_polls {
        polls = polls.saturating_add(1);
        if condition() {
            return Ok(polls);
        }
        delay.delay_ns(budget.interval_ns);
    }
    Err(PollTimeout { polls })
}
