//! Clock-path transition sequences.
//!
//! Each primitive transition is a fixed list of [`TransitionStep`]s run by
//! one interpreter, [`run`]. Path pairs without a primitive are chained from
//! two primitives through the one-source path or the reference PLL.
//!
//! ```text
//!            ┌──────── OneSourceToRefPll ───────┐
//!   OneSource                                    RefPll ── RefPllToDramPll ──► DramPll
//!            └◄─────── RefPllToOneSource ───────┘                              │  ▲
//!   OneSource ◄──────────────── DramPllToOneSource ────────────────────────────┘  │
//!                                                  DramPllToDramPll ──────────────┘
//! ```

use embedded_hal::delay::DelayNs;
use gddr_platform::poll::{poll_until, PLL_LOCK};
use gddr_platform::{fbpa, fence, ClockPath, FatalFault, PllId, RegisterBus};
use heapless::Vec;

use crate::snapshot::{pll_regs, SnapshotPair};

/// One operation of a transition sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransitionStep {
    /// Gate (`true`) or release the DRAM clock.
    Clamp(bool),
    /// Route the DRAM clock around (`true`) or through the PLLs.
    Bypass(bool),
    /// Disable and power down a PLL.
    PowerDown(PllId),
    /// Write a PLL's coefficient, SDM and SSD words from the target.
    ProgramDividers(PllId),
    /// Power up and enable a PLL.
    Enable(PllId),
    /// Poll for PLL lock.
    WaitLock(PllId),
    /// Write the target one-source divider if it differs.
    OneSourceDivider,
    /// Select a clock path.
    Select(ClockPath),
    /// Ordering fence between dependent writes.
    Fence,
}

use TransitionStep::{
    Bypass, Clamp, Enable, Fence, OneSourceDivider, PowerDown, ProgramDividers, Select, WaitLock,
};

const ONESOURCE_TO_REFPLL: &[TransitionStep] = &[
    Clamp(true),
    Bypass(true),
    PowerDown(PllId::Ref),
    ProgramDividers(PllId::Ref),
    Enable(PllId::Ref),
    WaitLock(PllId::Ref),
    Fence,
    Select(ClockPath::RefPll),
    Fence,
    Bypass(false),
    Clamp(false),
];

const REFPLL_TO_ONESOURCE: &[TransitionStep] = &[
    Clamp(true),
    Bypass(true),
    OneSourceDivider,
    Fence,
    Select(ClockPath::OneSource),
    Fence,
    PowerDown(PllId::Ref),
    Bypass(false),
    Clamp(false),
];

const REFPLL_TO_DRAMPLL: &[TransitionStep] = &[
    Clamp(true),
    Bypass(true),
    PowerDown(PllId::Ref),
    ProgramDividers(PllId::Ref),
    Enable(PllId::Ref),
    WaitLock(PllId::Ref),
    Fence,
    PowerDown(PllId::Dram),
    ProgramDividers(PllId::Dram),
    Enable(PllId::Dram),
    WaitLock(PllId::Dram),
    Fence,
    Select(ClockPath::DramPll),
    Fence,
    Bypass(false),
    Clamp(false),
];

const DRAMPLL_TO_DRAMPLL: &[TransitionStep] = &[
    Clamp(true),
    Bypass(true),
    PowerDown(PllId::Dram),
    ProgramDividers(PllId::Dram),
    Enable(PllId::Dram),
    WaitLock(PllId::Dram),
    Fence,
    Bypass(false),
    Clamp(false),
];

const DRAMPLL_TO_ONESOURCE: &[TransitionStep] = &[
    Clamp(true),
    Bypass(true),
    OneSourceDivider,
    Fence,
    Select(ClockPath::OneSource),
    Fence,
    PowerDown(PllId::Dram),
    PowerDown(PllId::Ref),
    Bypass(false),
    Clamp(false),
];

const ONESOURCE_TO_ONESOURCE: &[TransitionStep] = &[OneSourceDivider];

/// Primitive clock-path transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockPathTransition {
    /// One-source divider to reference PLL.
    OneSourceToRefPll,
    /// Reference PLL back to the one-source divider.
    RefPllToOneSource,
    /// Reference PLL to the cascaded DRAM PLL.
    RefPllToDramPll,
    /// Relock the DRAM PLL in place.
    DramPllToDramPll,
    /// Cascaded DRAM PLL to the one-source divider.
    DramPllToOneSource,
    /// Divider change only.
    OneSourceToOneSource,
}

/// Primitives making up one path change, in order.
pub type TransitionChain = Vec<ClockPathTransition, 2>;

impl ClockPathTransition {
    /// Steps of this transition.
    pub const fn steps(self) -> &'static [TransitionStep] {
        match self {
            Self::OneSourceToRefPll => ONESOURCE_TO_REFPLL,
            Self::RefPllToOneSource => REFPLL_TO_ONESOURCE,
            Self::RefPllToDramPll => REFPLL_TO_DRAMPLL,
            Self::DramPllToDramPll => DRAMPLL_TO_DRAMPLL,
            Self::DramPllToOneSource => DRAMPLL_TO_ONESOURCE,
            Self::OneSourceToOneSource => ONESOURCE_TO_ONESOURCE,
        }
    }

    /// Primitives taking the clock from `from` to `to`.
    pub fn between(from: ClockPath, to: ClockPath) -> TransitionChain {
        use ClockPath::{DramPll, OneSource, RefPll};
        let parts: &[Self] = match (from, to) {
            (OneSource, OneSource) => &[Self::OneSourceToOneSource],
            (OneSource, RefPll) => &[Self::OneSourceToRefPll],
            (OneSource, DramPll) => &[Self::OneSourceToRefPll, Self::RefPllToDramPll],
            (RefPll, OneSource) => &[Self::RefPllToOneSource],
            (RefPll, RefPll) => &[Self::RefPllToOneSource, Self::OneSourceToRefPll],
            (RefPll, DramPll) => &[Self::RefPllToDramPll],
            (DramPll, OneSource) => &[Self::DramPllToOneSource],
            (DramPll, RefPll) => &[Self::DramPllToOneSource, Self::OneSourceToRefPll],
            (DramPll, DramPll) => &[Self::DramPllToDramPll],
        };
        parts.iter().copied().collect()
    }
}

impl core::fmt::Display for ClockPathTransition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::OneSourceToRefPll => "one-source -> ref-pll",
            Self::RefPllToOneSource => "ref-pll -> one-source",
            Self::RefPllToDramPll => "ref-pll -> dram-pll",
            Self::DramPllToDramPll => "dram-pll relock",
            Self::DramPllToOneSource => "dram-pll -> one-source",
            Self::OneSourceToOneSource => "one-source divider",
        })
    }
}

/// Execute `transition` against the target of `pair`. Returns the polls
/// spent waiting for lock.
///
/// # Errors
///
/// [`FatalFault::PllLockTimeout`] when a PLL does not lock within
/// [`PLL_LOCK`].
pub fn run<B, D>(
    transition: ClockPathTransition,
    pair: &mut SnapshotPair,
    bus: &mut B,
    delay: &mut D,
) -> Result<u32, FatalFault>
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
{
    fb_info!("clock transition {}", transition);
    let mut polls = 0u32;
    for &step in transition.steps() {
        match step {
            Clamp(on) => bus.write(fbpa::CLK_CLAMP, fbpa::CLK_CLAMP_ENABLE.encode(u32::from(on))),
            Bypass(on) => bus.write(fbpa::CLK_BYPASS, fbpa::CLK_BYPASS_ENABLE.encode(u32::from(on))),
            PowerDown(pll) => pair.target.commit_pll_cfg(&mut pair.current, bus, pll, false),
            ProgramDividers(pll) => pair.target.commit_pll_dividers(&mut pair.current, bus, pll),
            Enable(pll) => pair.target.commit_pll_cfg(&mut pair.current, bus, pll, true),
            WaitLock(pll) => {
                let cfg = pll_regs(pll).cfg;
                let used = poll_until(delay, PLL_LOCK, || {
                    bus.read_field(cfg, fbpa::PLL_CFG_LOCK) == 1
                })
                .map_err(|_| {
                    let fault = FatalFault::PllLockTimeout { pll };
                    fb_error!("{}", fault);
                    fault
                })?;
                polls = polls.saturating_add(used);
            }
            OneSourceDivider => {
                pair.target.commit_onesource_div(&mut pair.current, bus);
            }
            Select(path) => {
                let value = fbpa::CLK_SRC_SEL_PATH.insert(pair.current.clk_src_sel, path.raw());
                bus.write(fbpa::CLK_SRC_SEL, value);
                pair.current.clk_src_sel = value;
            }
            Fence => fence(bus, delay),
        }
    }
    Ok(polls)
}
