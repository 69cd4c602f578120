//! Fatal fault taxonomy.
//!
//! Every unrecoverable condition in training or clock switching is a
//! [`FatalFault`]. Faults propagate as `Err` to a single boundary which
//! publishes [`FatalFault::code`] and [`FatalFault::aux`] to the mailbox and
//! then halts through [`Halt`]. Nothing below that boundary halts on its own.
//!
//! Code layout (16 bits, high byte is the family):
//!
//! | Family | Range    | Meaning                          |
//! |--------|----------|----------------------------------|
//! | `0xF1` | `F1xx`   | zero eye area                    |
//! | `0xF2` | `F2xx`   | training pass timed out          |
//! | `0xF3` | `F3xx`   | training pass reported an error  |
//! | `0xF4` | `F4xx`   | PLL lock timeout                 |
//! | `0xF5` | `F5xx`   | PLL coefficient out of range     |
//! | `0xF6` | `F6xx`   | requested frequency unsupported  |
//! | `0xF7` | `F7xx`   | clock-switch handshake timeout   |
//! | `0xF8` | `F8xx`   | staged-switch protocol violation |
//! | `0xF9` | `F9xx`   | board-table value out of range   |

use crate::types::{Eye, PinClassId, PllCoefficient, PllId, TrainingDirection};

/// Hardware training pass, for timeout and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TrainingStage {
    /// Command/address training.
    Address = 0,
    /// WCK-to-CK alignment.
    Wck = 1,
    /// Read initial VREF capture.
    ReadVref = 2,
    /// Read DFE sweep pass.
    ReadSweep = 3,
    /// Write initial VREF capture.
    WriteVref = 4,
    /// Write DFE sweep pass.
    WriteSweep = 5,
    /// Final write verification.
    WriteVerify = 6,
    /// Hybrid DFE tracking pass.
    Hybrid = 7,
    /// Mode-register sequencer.
    ModeRegister = 8,
}

impl core::fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Address => "address",
            Self::Wck => "wck",
            Self::ReadVref => "read-vref",
            Self::ReadSweep => "read-sweep",
            Self::WriteVref => "write-vref",
            Self::WriteSweep => "write-sweep",
            Self::WriteVerify => "write-verify",
            Self::Hybrid => "hybrid",
            Self::ModeRegister => "mrs",
        })
    }
}

/// Clock-switch handshake that can time out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SwitchHandshake {
    /// Waiting for the FB to drain.
    FbStop = 0,
    /// Waiting for self-refresh entry.
    SelfRefreshEntry = 1,
    /// Waiting for self-refresh exit.
    SelfRefreshExit = 2,
    /// Waiting for the FB to resume.
    FbStart = 3,
    /// Waiting for the regulator to settle.
    VoltageSettle = 4,
}

impl core::fmt::Display for SwitchHandshake {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::FbStop => "fb-stop",
            Self::SelfRefreshEntry => "self-refresh-entry",
            Self::SelfRefreshExit => "self-refresh-exit",
            Self::FbStart => "fb-start",
            Self::VoltageSettle => "voltage-settle",
        })
    }
}

/// Board-table quantity rejected by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ConfigItem {
    /// Averaging loop count.
    AveragingLoops = 0,
    /// DFE sweep window.
    DfeSweep = 1,
    /// VREF sweep window.
    VrefSweep = 2,
    /// PI sweep window.
    PiSweep = 3,
    /// Spread-spectrum depth.
    SpreadDepth = 4,
    /// Clock path unsupported for the record.
    ClockPath = 5,
    /// PLL limits missing for a PLL the record needs.
    PllLimits = 6,
    /// Enabled-partition mask selects no partition.
    PartitionMask = 7,
}

impl core::fmt::Display for ConfigItem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::AveragingLoops => "averaging-loops",
            Self::DfeSweep => "dfe-sweep",
            Self::VrefSweep => "vref-sweep",
            Self::PiSweep => "pi-sweep",
            Self::SpreadDepth => "spread-depth",
            Self::ClockPath => "clock-path",
            Self::PllLimits => "pll-limits",
            Self::PartitionMask => "partition-mask",
        })
    }
}

/// Unrecoverable training or clock-switch condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FatalFault {
    /// An eye had zero area at every equalization setting swept.
    ZeroArea {
        /// Link direction.
        direction: TrainingDirection,
        /// Pin namespace.
        class: PinClassId,
        /// Flat pin index.
        pin: u16,
        /// Eye with no opening.
        eye: Eye,
    },
    /// A fatal training pass never completed.
    TrainingTimeout {
        /// Pass that timed out.
        stage: TrainingStage,
    },
    /// A fatal training pass completed with its error bit set.
    TrainingError {
        /// Pass that failed.
        stage: TrainingStage,
        /// Engine error code.
        status: u32,
    },
    /// A PLL did not lock within the poll ceiling.
    PllLockTimeout {
        /// PLL that failed to lock.
        pll: PllId,
    },
    /// A PLL coefficient or derived quantity is outside the board limits.
    PllOutOfRange {
        /// Offending PLL.
        pll: PllId,
        /// Offending quantity.
        coefficient: PllCoefficient,
        /// Computed value.
        value: u32,
        /// Inclusive minimum.
        min: u32,
        /// Inclusive maximum.
        max: u32,
    },
    /// No frequency record covers the request.
    FrequencyUnsupported {
        /// Requested frequency in MHz.
        requested_mhz: u32,
        /// Highest supported frequency in MHz.
        max_mhz: u32,
    },
    /// A clock-switch handshake never completed.
    SwitchTimeout {
        /// Handshake that timed out.
        handshake: SwitchHandshake,
    },
    /// A staged switch call arrived out of order.
    StageOutOfOrder {
        /// Stage the in-progress switch expected next (0 = none).
        expected: u8,
        /// Stage requested by the caller.
        requested: u8,
    },
    /// A board-table value failed validation.
    ConfigOutOfRange {
        /// Offending item.
        item: ConfigItem,
        /// Value found.
        value: u32,
        /// Inclusive minimum.
        min: u32,
        /// Inclusive maximum.
        max: u32,
    },
}

impl FatalFault {
    /// Mailbox error code.
    ///
    /// Zero-area faults carry a distinct code per eye, direction and pin class.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match *self {
            Self::ZeroArea {
                direction,
                class,
                eye,
                ..
            } => 0xF100 | (direction as u32).wrapping_shl(4) | (class as u32).wrapping_shl(2) | (eye as u32),
            Self::TrainingTimeout { stage } => 0xF200 | stage as u32,
            Self::TrainingError { stage, .. } => 0xF300 | stage as u32,
            Self::PllLockTimeout { pll } => 0xF400 | pll as u32,
            Self::PllOutOfRange {
                pll, coefficient, ..
            } => 0xF500 | (pll as u32).wrapping_shl(4) | coefficient as u32,
            Self::FrequencyUnsupported { .. } => 0xF600,
            Self::SwitchTimeout { handshake } => 0xF700 | handshake as u32,
            Self::StageOutOfOrder { .. } => 0xF800,
            Self::ConfigOutOfRange { item, .. } => 0xF900 | item as u32,
        }
    }

    /// Auxiliary mailbox words, fault-specific.
    #[must_use]
    pub const fn aux(&self) -> [u32; 3] {
        match *self {
            Self::ZeroArea { pin, .. } => [pin as u32, 0, 0],
            Self::TrainingError { status, .. } => [status, 0, 0],
            Self::TrainingTimeout { .. }
            | Self::PllLockTimeout { .. }
            | Self::SwitchTimeout { .. } => [0, 0, 0],
            Self::PllOutOfRange {
                value, min, max, ..
            }
            | Self::ConfigOutOfRange {
                value, min, max, ..
            } => [value, min, max],
            Self::FrequencyUnsupported {
                requested_mhz,
                max_mhz,
            } => [requested_mhz, max_mhz, 0],
            Self::StageOutOfOrder {
                expected,
                requested,
            } => [expected as u32, requested as u32, 0],
        }
    }
}

impl core::fmt::Display for FatalFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ZeroArea {
                direction,
                class,
                pin,
                eye,
            } => write!(f, "{direction} {class} pin {pin}: {eye} eye has zero area"),
            Self::TrainingTimeout { stage } => write!(f, "{stage} training timed out"),
            Self::TrainingError { stage, status } => {
                write!(f, "{stage} training failed with status {status:#x}")
            }
            Self::PllLockTimeout { pll } => write!(f, "{pll} did not lock"),
            Self::PllOutOfRange {
                pll,
                coefficient,
                value,
                min,
                max,
            } => write!(f, "{pll} {coefficient} = {value} outside {min}..={max}"),
            Self::FrequencyUnsupported {
                requested_mhz,
                max_mhz,
            } => write!(f, "{requested_mhz} MHz above highest record {max_mhz} MHz"),
            Self::SwitchTimeout { handshake } => write!(f, "{handshake} handshake timed out"),
            Self::StageOutOfOrder {
                expected,
                requested,
            } => write!(f, "switch stage {requested} requested, expected {expected}"),
            Self::ConfigOutOfRange {
                item,
                value,
                min,
                max,
            } => write!(f, "board {item} = {value} outside {min}..={max}"),
        }
    }
}

/// Terminal halt.
///
/// The target implementation parks the core; host tests panic so that the
/// halt is observable.
pub trait Halt {
    /// Stop execution. `code` is the value already published to the mailbox.
    fn halt(&mut self, code: u32) -> !;
}
