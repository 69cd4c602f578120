//! Frequency-switch driver.
//!
//! # State Machine
//!
//! ```text
//!   Idle ─► ComputeCoefficients ─► FbStop ─► SelfRefreshEntry ─► ClockPathTransition
//!                                                                       │
//!   ┌───────────────────────────────────────────────────────────────────┘
//!   ▼
//!   SelfRefreshExit ─► AddressTraining ─► PostAddressTraining ─► LinkTraining
//!                                                                       │
//!   Idle ◄─ FbStart ◄─ RefreshAndTrainingReenable ◄─────────────────────┘
//! ```
//!
//! # Staged Switching
//!
//! Boot drives the first switch in three calls so it can train in between:
//!
//! | Call | Flag                    | Runs                                        |
//! |------|-------------------------|---------------------------------------------|
//! | 1    | `pre_address_training`  | `ComputeCoefficients ..= SelfRefreshExit`   |
//! |      | *(caller)*              | address training                            |
//! | 2    | `post_address_training` | `PostAddressTraining`                       |
//! |      | *(caller)*              | WCK, read and write training                |
//! | 3    | `post_link_training`    | `RefreshAndTrainingReenable ..= FbStart`    |
//!
//! With no flag set one call runs the whole sequence and trains whatever the
//! frequency record selects. The in-flight switch is carried in the
//! [`ClockSwitch`] context between staged calls; a call out of order is a
//! [`FatalFault::StageOutOfOrder`].

pub mod transition;
pub mod voltage;

use embedded_hal::delay::DelayNs;
use gddr_platform::board::{BoardTable, FrequencyRecord};
use gddr_platform::fault::{ConfigItem, SwitchHandshake};
use gddr_platform::mailbox::{self, Progress};
use gddr_platform::poll::{poll_until, FB_HANDSHAKE};
use gddr_platform::{fbpa, ClockPath, FatalFault, Field, PllId, RegAddr, RegisterBus};

use crate::pll::{self, PllSettings};
use crate::snapshot::{CommitSet, RegisterSnapshot, SnapshotPair};
use crate::training::{LinkTrainer, TrainingConfig, TrainingWorkspace};

use self::transition::ClockPathTransition;
use self::voltage::VoltagePlan;

// ── Stage flags ──────────────────────────────────────────────────────────────

/// Portion of a switch a call executes. At most one flag may be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StageFlags {
    /// Run up to self-refresh exit and suspend for address training.
    pub pre_address_training: bool,
    /// Resume after address training and suspend for link training.
    pub post_address_training: bool,
    /// Resume after link training and finish the switch.
    pub post_link_training: bool,
}

impl StageFlags {
    /// Whole switch in one call.
    pub const FULL: Self = Self {
        pre_address_training: false,
        post_address_training: false,
        post_link_training: false,
    };
    /// First staged call.
    pub const PRE_ADDRESS: Self = Self {
        pre_address_training: true,
        ..Self::FULL
    };
    /// Second staged call.
    pub const POST_ADDRESS: Self = Self {
        post_address_training: true,
        ..Self::FULL
    };
    /// Third staged call.
    pub const POST_LINK: Self = Self {
        post_link_training: true,
        ..Self::FULL
    };

    const PRE_BIT: u8 = 1;
    const POST_ADDRESS_BIT: u8 = 2;
    const POST_LINK_BIT: u8 = 4;

    /// Flags as a bit set: pre = 1, post-address = 2, post-link = 4.
    pub const fn bits(self) -> u8 {
        let mut bits = 0;
        if self.pre_address_training {
            bits |= Self::PRE_BIT;
        }
        if self.post_address_training {
            bits |= Self::POST_ADDRESS_BIT;
        }
        if self.post_link_training {
            bits |= Self::POST_LINK_BIT;
        }
        bits
    }
}

// ── States ───────────────────────────────────────────────────────────────────

/// Switch driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SwitchState {
    /// No switch in progress.
    Idle = 0,
    /// Resolve the record, solve the PLLs, build the target snapshot.
    ComputeCoefficients = 1,
    /// Drain and stop the FB.
    FbStop = 2,
    /// Put the DRAM into self-refresh.
    SelfRefreshEntry = 3,
    /// Move the DRAM clock to the target path.
    ClockPathTransition = 4,
    /// Bring the DRAM out of self-refresh.
    SelfRefreshExit = 5,
    /// Command/address training.
    AddressTraining = 6,
    /// Apply training control for link training.
    PostAddressTraining = 7,
    /// WCK, read and write training.
    LinkTraining = 8,
    /// Restore refresh and periodic training.
    RefreshAndTrainingReenable = 9,
    /// Restart the FB.
    FbStart = 10,
}

impl SwitchState {
    /// Stage flag that resumes a switch suspended before this state.
    const fn resume_bit(self) -> u8 {
        match self {
            Self::PostAddressTraining => StageFlags::POST_ADDRESS_BIT,
            Self::RefreshAndTrainingReenable => StageFlags::POST_LINK_BIT,
            _ => 0,
        }
    }

    const fn next(self) -> Self {
        match self {
            Self::Idle => Self::ComputeCoefficients,
            Self::ComputeCoefficients => Self::FbStop,
            Self::FbStop => Self::SelfRefreshEntry,
            Self::SelfRefreshEntry => Self::ClockPathTransition,
            Self::ClockPathTransition => Self::SelfRefreshExit,
            Self::SelfRefreshExit => Self::AddressTraining,
            Self::AddressTraining => Self::PostAddressTraining,
            Self::PostAddressTraining => Self::LinkTraining,
            Self::LinkTraining => Self::RefreshAndTrainingReenable,
            Self::RefreshAndTrainingReenable => Self::FbStart,
            Self::FbStart => Self::Idle,
        }
    }
}

impl core::fmt::Display for SwitchState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::ComputeCoefficients => "compute-coefficients",
            Self::FbStop => "fb-stop",
            Self::SelfRefreshEntry => "self-refresh-entry",
            Self::ClockPathTransition => "clock-path-transition",
            Self::SelfRefreshExit => "self-refresh-exit",
            Self::AddressTraining => "address-training",
            Self::PostAddressTraining => "post-address-training",
            Self::LinkTraining => "link-training",
            Self::RefreshAndTrainingReenable => "refresh-reenable",
            Self::FbStart => "fb-start",
        })
    }
}

/// Result of one driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwitchOutcome {
    /// Suspended; the next staged call resumes at `resume`.
    Suspended {
        /// State the next call starts from.
        resume: SwitchState,
    },
    /// The FB is running at the new frequency.
    Complete(SwitchReport),
}

/// Summary of a completed switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SwitchReport {
    /// Frequency record switched to.
    pub freq_mhz: u32,
    /// Polls spent in handshakes and lock waits.
    pub polls: u32,
}

// ── Context ──────────────────────────────────────────────────────────────────

struct InFlight {
    record: FrequencyRecord,
    pair: SnapshotPair,
    voltage: VoltagePlan,
    polls: u32,
    resume: SwitchState,
}

/// Switch driver context: the board, resolved training parameters and any
/// suspended staged switch.
pub struct ClockSwitch<'a> {
    board: &'a BoardTable<'a>,
    training: TrainingConfig,
    in_flight: Option<InFlight>,
}

impl<'a> ClockSwitch<'a> {
    /// Driver for `board`.
    pub fn new(board: &'a BoardTable<'a>, training: TrainingConfig) -> Self {
        Self {
            board,
            training,
            in_flight: None,
        }
    }

    /// Training parameters used by full switches.
    pub fn training(&self) -> &TrainingConfig {
        &self.training
    }

    /// State a suspended staged switch resumes at.
    pub fn pending(&self) -> Option<SwitchState> {
        self.in_flight.as_ref().map(|f| f.resume)
    }

    /// Switch the DRAM to `target_mhz`, or the part of the switch `flags`
    /// selects.
    ///
    /// Resuming calls continue the suspended switch; their `target_mhz` is
    /// not consulted.
    ///
    /// # Errors
    ///
    /// [`FatalFault::StageOutOfOrder`] for more than one flag or a flag that
    /// does not match the suspended switch; otherwise any fault raised by
    /// coefficient calculation, handshakes, lock waits or training.
    pub fn switch_to_frequency<B, D>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        ws: &mut TrainingWorkspace,
        target_mhz: u32,
        flags: StageFlags,
    ) -> Result<SwitchOutcome, FatalFault>
    where
        B: RegisterBus + ?Sized,
        D: DelayNs + ?Sized,
    {
        let requested = flags.bits();
        let expected = self.in_flight.as_ref().map_or(0, |f| f.resume.resume_bit());
        let out_of_order = FatalFault::StageOutOfOrder {
            expected,
            requested,
        };
        let driver = Driver {
            board: self.board,
            training: &self.training,
        };
        match requested {
            0 | StageFlags::PRE_BIT if self.in_flight.is_none() => {
                let full = requested == 0;
                let mut flight = driver.begin(bus, delay, ws, target_mhz, true)?;
                let stop = if full {
                    SwitchState::Idle
                } else {
                    SwitchState::AddressTraining
                };
                driver.drive(bus, delay, ws, &mut flight, SwitchState::FbStop, stop, full)?;
                if full {
                    return Ok(SwitchOutcome::Complete(driver.finish(bus, &flight)));
                }
                flight.resume = SwitchState::PostAddressTraining;
                self.in_flight = Some(flight);
                Ok(SwitchOutcome::Suspended {
                    resume: SwitchState::PostAddressTraining,
                })
            }
            StageFlags::POST_ADDRESS_BIT | StageFlags::POST_LINK_BIT if requested == expected => {
                let Some(mut flight) = self.in_flight.take() else {
                    return Err(out_of_order);
                };
                if flight.record.freq_mhz != target_mhz {
                    fb_warn!(
                        "staged call for {} MHz resumes switch to {} MHz",
                        target_mhz,
                        flight.record.freq_mhz
                    );
                }
                let (start, stop) = if requested == StageFlags::POST_ADDRESS_BIT {
                    (SwitchState::PostAddressTraining, SwitchState::LinkTraining)
                } else {
                    (SwitchState::RefreshAndTrainingReenable, SwitchState::Idle)
                };
                driver.drive(bus, delay, ws, &mut flight, start, stop, false)?;
                if stop == SwitchState::Idle {
                    return Ok(SwitchOutcome::Complete(driver.finish(bus, &flight)));
                }
                flight.resume = SwitchState::RefreshAndTrainingReenable;
                self.in_flight = Some(flight);
                Ok(SwitchOutcome::Suspended {
                    resume: SwitchState::RefreshAndTrainingReenable,
                })
            }
            _ => {
                fb_error!("{}", out_of_order);
                Err(out_of_order)
            }
        }
    }
}

// ── Driver ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
struct Driver<'d> {
    board: &'d BoardTable<'d>,
    training: &'d TrainingConfig,
}

impl Driver<'_> {
    /// `ComputeCoefficients`, including any intermediate supply hop.
    fn begin<B, D>(
        &self,
        bus: &mut B,
        delay: &mut D,
        ws: &mut TrainingWorkspace,
        target_mhz: u32,
        allow_hop: bool,
    ) -> Result<InFlight, FatalFault>
    where
        B: RegisterBus + ?Sized,
        D: DelayNs + ?Sized,
    {
        let record = *self.board.record_for(target_mhz)?;
        self.begin_record(bus, delay, ws, record, allow_hop)
    }

    fn begin_record<B, D>(
        &self,
        bus: &mut B,
        delay: &mut D,
        ws: &mut TrainingWorkspace,
        record: FrequencyRecord,
        allow_hop: bool,
    ) -> Result<InFlight, FatalFault>
    where
        B: RegisterBus + ?Sized,
        D: DelayNs + ?Sized,
    {
        mailbox::progress(bus, Progress::SwitchStart);
        let mut current = RegisterSnapshot::save_current(bus);
        fb_info!(
            "switch {} kHz -> {} MHz via {}",
            current_khz(self.board, &current),
            record.freq_mhz,
            record.path
        );
        let plan = pll::plan(self.board, &record)?;
        pll::validate_plan(self.board, &plan).inspect_err(|fault| fb_error!("{}", fault))?;
        let mut target =
            RegisterSnapshot::compute_target(&current, &record, &plan, &self.board.training);
        let mut polls = 0u32;
        let mut supply = voltage::plan(&current, &target, &record);
        if let VoltagePlan::ViaIntermediate(mhz) = supply {
            if allow_hop {
                fb_info!("supply change via {} MHz", mhz);
                let hop = voltage::intermediate_record(self.board, &record, mhz)?;
                let mut flight = self.begin_record(bus, delay, ws, hop, false)?;
                self.drive(bus, delay, ws, &mut flight, SwitchState::FbStop, SwitchState::Idle, true)?;
                polls = self.finish(bus, &flight).polls;
                current = RegisterSnapshot::save_current(bus);
                target = RegisterSnapshot::compute_target(&current, &record, &plan, &self.board.training);
                mailbox::progress(bus, Progress::SwitchStart);
            }
            supply = match voltage::plan(&current, &target, &record) {
                VoltagePlan::Unchanged => VoltagePlan::Unchanged,
                _ => VoltagePlan::InTransition,
            };
        }
        mailbox::progress(bus, Progress::CoefficientsReady);
        Ok(InFlight {
            record,
            pair: SnapshotPair { current, target },
            voltage: supply,
            polls,
            resume: SwitchState::FbStop,
        })
    }

    /// Execute states from `start` up to, not including, `stop`.
    #[allow(clippy::too_many_arguments)]
    fn drive<B, D>(
        &self,
        bus: &mut B,
        delay: &mut D,
        ws: &mut TrainingWorkspace,
        flight: &mut InFlight,
        start: SwitchState,
        stop: SwitchState,
        full: bool,
    ) -> Result<(), FatalFault>
    where
        B: RegisterBus + ?Sized,
        D: DelayNs + ?Sized,
    {
        let mut state = start;
        while state != stop {
            fb_debug!("switch state {}", state);
            self.execute(bus, delay, ws, flight, state, full)?;
            state = state.next();
        }
        Ok(())
    }

    fn execute<B, D>(
        &self,
        bus: &mut B,
        delay: &mut D,
        ws: &mut TrainingWorkspace,
        flight: &mut InFlight,
        state: SwitchState,
        full: bool,
    ) -> Result<(), FatalFault>
    where
        B: RegisterBus + ?Sized,
        D: DelayNs + ?Sized,
    {
        let pair = &mut flight.pair;
        let used = match state {
            SwitchState::Idle | SwitchState::ComputeCoefficients => 0,
            SwitchState::FbStop => {
                let refresh = fbpa::REFRESH_CTRL_ENABLE.insert(pair.current.refresh_ctrl, 0);
                bus.write(fbpa::REFRESH_CTRL, refresh);
                pair.current.refresh_ctrl = refresh;
                bus.write(fbpa::PERIODIC_TRAINING, 0);
                pair.current.periodic_training = 0;
                let polls = handshake(
                    bus,
                    delay,
                    (fbpa::FB_CTRL, fbpa::FB_CTRL_STOP),
                    (fbpa::FB_STATUS, fbpa::FB_STATUS_IDLE, 1),
                    SwitchHandshake::FbStop,
                )?;
                mailbox::progress(bus, Progress::FbStopped);
                polls
            }
            SwitchState::SelfRefreshEntry => {
                let polls = handshake(
                    bus,
                    delay,
                    (fbpa::SELF_REFRESH_CTRL, fbpa::SELF_REFRESH_ENTRY),
                    (fbpa::SELF_REFRESH_STATUS, fbpa::SELF_REFRESH_STATUS_ACTIVE, 1),
                    SwitchHandshake::SelfRefreshEntry,
                )?;
                mailbox::progress(bus, Progress::SelfRefreshEntered);
                polls
            }
            SwitchState::ClockPathTransition => {
                let raw = fbpa::CLK_SRC_SEL_PATH.extract(pair.current.clk_src_sel);
                let from = ClockPath::from_raw(raw).ok_or(FatalFault::ConfigOutOfRange {
                    item: ConfigItem::ClockPath,
                    value: raw,
                    min: ClockPath::OneSource.raw(),
                    max: ClockPath::DramPll.raw(),
                })?;
                let mut polls = 0u32;
                for step in ClockPathTransition::between(from, flight.record.path) {
                    polls = polls.saturating_add(transition::run(step, pair, bus, delay)?);
                }
                if flight.voltage == VoltagePlan::InTransition {
                    fb_info!("supply to {} mV", flight.record.voltage_mv);
                    pair.commit(bus, delay, CommitSet::POWER)?;
                }
                mailbox::progress(bus, Progress::ClockSwitched);
                polls
            }
            SwitchState::SelfRefreshExit => {
                pair.commit(bus, delay, CommitSet::TIMING)?;
                let polls = handshake(
                    bus,
                    delay,
                    (fbpa::SELF_REFRESH_CTRL, fbpa::SELF_REFRESH_EXIT),
                    (fbpa::SELF_REFRESH_STATUS, fbpa::SELF_REFRESH_STATUS_ACTIVE, 0),
                    SwitchHandshake::SelfRefreshExit,
                )?;
                pair.commit(bus, delay, CommitSet::MODE_REGISTERS)?;
                mailbox::progress(bus, Progress::SelfRefreshExited);
                polls
            }
            SwitchState::AddressTraining => {
                if full && flight.record.training.address {
                    LinkTrainer::new(&mut *bus, &mut *delay, self.training, &mut *ws).train_address()?;
                }
                0
            }
            SwitchState::PostAddressTraining => {
                pair.commit(bus, delay, CommitSet::TRAINING_CONTROL)?;
                0
            }
            SwitchState::LinkTraining => {
                if full {
                    let select = flight.record.training;
                    let mut trainer = LinkTrainer::new(&mut *bus, &mut *delay, self.training, &mut *ws);
                    if select.wck {
                        trainer.train_wck()?;
                    }
                    if select.read {
                        trainer.train_read()?;
                    }
                    if select.write {
                        trainer.train_write()?;
                    }
                }
                0
            }
            SwitchState::RefreshAndTrainingReenable => {
                pair.commit(bus, delay, CommitSet::REFRESH)?;
                mailbox::progress(bus, Progress::RefreshReenabled);
                0
            }
            SwitchState::FbStart => handshake(
                bus,
                delay,
                (fbpa::FB_CTRL, fbpa::FB_CTRL_START),
                (fbpa::FB_STATUS, fbpa::FB_STATUS_RUNNING, 1),
                SwitchHandshake::FbStart,
            )?,
        };
        flight.polls = flight.polls.saturating_add(used);
        Ok(())
    }

    /// Publish a completed switch.
    fn finish<B: RegisterBus + ?Sized>(&self, bus: &mut B, flight: &InFlight) -> SwitchReport {
        let report = SwitchReport {
            freq_mhz: flight.record.freq_mhz,
            polls: flight.polls,
        };
        mailbox::switch_complete(bus, report.polls, report.freq_mhz);
        mailbox::progress(bus, Progress::SwitchDone);
        let settled = RegisterSnapshot::save_current(bus);
        fb_info!(
            "switch done at {} kHz, {} polls",
            current_khz(self.board, &settled),
            report.polls
        );
        report
    }
}

/// Pulse `ctrl` and wait for `status` to read `want`.
fn handshake<B, D>(
    bus: &mut B,
    delay: &mut D,
    ctrl: (RegAddr, Field),
    status: (RegAddr, Field, u32),
    which: SwitchHandshake,
) -> Result<u32, FatalFault>
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
{
    bus.write(ctrl.0, ctrl.1.encode(1));
    let (addr, field, want) = status;
    poll_until(delay, FB_HANDSHAKE, || bus.read_field(addr, field) == want).map_err(|_| {
        let fault = FatalFault::SwitchTimeout { handshake: which };
        fb_error!("{}", fault);
        fault
    })
}

/// DRAM clock in kHz implied by `snapshot`.
pub fn current_khz(board: &BoardTable<'_>, snapshot: &RegisterSnapshot) -> u32 {
    let settings = |pll: PllId, input_khz: u32| {
        let m = snapshot.pll(pll);
        PllSettings::from_registers(pll, input_khz, m.coeff, m.cfg, m.sdm, m.ssd)
    };
    match snapshot.clock_path() {
        Some(ClockPath::OneSource) => {
            let div = fbpa::ONESOURCE_DIV_VALUE.extract(snapshot.onesource_div);
            board.onesource_src_khz.checked_div(div).unwrap_or(0)
        }
        Some(ClockPath::RefPll) => settings(PllId::Ref, board.crystal_khz).output_khz(),
        Some(ClockPath::DramPll) => {
            let reference = settings(PllId::Ref, board.crystal_khz).output_khz();
            settings(PllId::Dram, reference).output_khz()
        }
        None => 0,
    }
}
