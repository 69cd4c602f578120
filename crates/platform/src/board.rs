//! Board configuration tables.
//!
//! Everything board-specific the firmware consumes: supported frequency
//! records, PLL limits, the training table and per-strap offsets. Tables are
//! `&'static` data on target; tests build them on the stack.

use crate::fault::{ConfigItem, FatalFault};
use crate::fbpa::{ChipGeneration, MODE_REGISTER_COUNT, TIMING_COUNT};
use crate::types::{ClockPath, OutOfRangeError, PllId};

/// Number of timing words in a frequency record.
pub const TIMING_WORDS: usize = TIMING_COUNT as usize;
/// Number of mode-register seeds in a frequency record.
pub const MODE_REGISTERS: usize = MODE_REGISTER_COUNT as usize;

// ── Sweep windows ────────────────────────────────────────────────────────────

/// Inclusive code window swept in fixed steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SweepRange {
    /// Lowest code.
    pub min: u8,
    /// Highest code.
    pub max: u8,
    /// Step between codes, at least 1.
    pub step: u8,
}

impl SweepRange {
    /// Window `min..=max` stepped by `step`.
    #[must_use]
    pub const fn new(min: u8, max: u8, step: u8) -> Self {
        Self { min, max, step }
    }

    /// Number of codes visited from `min` to `max`. Zero for an invalid window.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // step and ordering checked first
    pub const fn points(&self) -> usize {
        if self.step == 0 || self.min > self.max {
            0
        } else {
            ((self.max - self.min) / self.step) as usize + 1
        }
    }

    /// `code` is on the stepped grid of the window.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // short-circuits before the remainder
    pub const fn contains(&self, code: u8) -> bool {
        self.step != 0
            && code >= self.min
            && code <= self.max
            && (code - self.min) % self.step == 0
    }

    /// Clamp `value` into `min..=max`. An inverted window clamps to `max`.
    #[must_use]
    pub fn clamp(&self, value: i32) -> u8 {
        let clamped = value.max(i32::from(self.min)).min(i32::from(self.max));
        u8::try_from(clamped).unwrap_or(self.max)
    }
}

/// Phase-interpolator offset pass parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PiSweep {
    /// Offset window.
    pub offset: SweepRange,
    /// Coarse PI step.
    pub coarse_step: u8,
    /// Fine PI step.
    pub fine_step: u8,
}

/// Training parameters for one link direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DirectionTable {
    /// Equalization window.
    pub dfe: SweepRange,
    /// First DFE code of the two-directional sweep.
    pub dfe_start: u8,
    /// VREF window handed to the engine.
    pub vref: SweepRange,
    /// PI-offset pass parameters.
    pub pi: PiSweep,
    /// Fixed initial VREF per eye when area-based capture is disabled.
    pub back_key_vref: [u8; 3],
    /// Also train the DBI/EDC pins.
    pub dbi: bool,
}

/// Board training table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TrainingTable {
    /// Read-direction parameters.
    pub read: DirectionTable,
    /// Write-direction parameters.
    pub write: DirectionTable,
    /// Outer averaging loop count, at least 1.
    pub averaging_loops: u8,
    /// Smooth areas across neighbouring DFE codes before selection.
    pub moving_average: bool,
    /// Capture the initial VREF with an area-based pass instead of the back-key defaults.
    pub area_based_initial_vref: bool,
    /// Use the hardware tag comparator instead of reading back every area.
    pub hybrid: bool,
}

/// Per-strap trim added to the trained values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BoardOffsets {
    /// Strap value these offsets apply to.
    pub strap: u8,
    /// Added to every read VREF.
    pub read_vref: i8,
    /// Added to every read DFE.
    pub read_dfe: i8,
    /// Added to every write VREF.
    pub write_vref: i8,
    /// Added to every write DFE.
    pub write_dfe: i8,
}

// ── Frequency records ────────────────────────────────────────────────────────

/// Which trainings a switch to a record runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TrainingSelect {
    /// Command/address training.
    pub address: bool,
    /// WCK alignment.
    pub wck: bool,
    /// Read link training.
    pub read: bool,
    /// Write link training.
    pub write: bool,
}

impl TrainingSelect {
    /// Run nothing.
    pub const NONE: Self = Self {
        address: false,
        wck: false,
        read: false,
        write: false,
    };

    /// Run everything.
    pub const ALL: Self = Self {
        address: true,
        wck: true,
        read: true,
        write: true,
    };
}

/// One supported DRAM frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrequencyRecord {
    /// DRAM clock in MHz.
    pub freq_mhz: u32,
    /// Clock path used at this frequency.
    pub path: ClockPath,
    /// DRAM core supply in mV.
    pub voltage_mv: u16,
    /// Auxiliary VREF supply in mV.
    pub aux_vref_mv: u16,
    /// Frequency already qualified at this record's voltage, used as a
    /// stepping stone when the switch also changes voltage.
    pub intermediate_mhz: Option<u32>,
    /// Spread-spectrum depth in ppm (0 = off).
    pub spread_ppm: u32,
    /// Use the sigma-delta fractional feedback.
    pub sdm: bool,
    /// Timing register seeds.
    pub timing: [u32; TIMING_WORDS],
    /// Mode-register seeds (12-bit payloads).
    pub mode_registers: [u16; MODE_REGISTERS],
    /// Auto-refresh interval in controller clocks.
    pub refresh_interval: u16,
    /// Trainings run after switching to this record.
    pub training: TrainingSelect,
}

// ── PLL limits ───────────────────────────────────────────────────────────────

/// Inclusive `u32` limit pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Limit {
    /// Minimum.
    pub min: u32,
    /// Maximum.
    pub max: u32,
}

impl Limit {
    /// Limit `min..=max`.
    #[must_use]
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Check `value` against the limit.
    ///
    /// # Errors
    ///
    /// [`OutOfRangeError`] when `value` is outside `min..=max`.
    pub const fn check(&self, value: u32) -> Result<u32, OutOfRangeError> {
        OutOfRangeError::check(value, self.min, self.max)
    }
}

/// Coefficient and frequency limits of one PLL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllLimits {
    /// Input divider.
    pub m: Limit,
    /// Feedback multiplier.
    pub n: Limit,
    /// Post divider.
    pub p: Limit,
    /// Phase-detector update rate (input / M) in kHz.
    pub update_rate_khz: Limit,
    /// VCO frequency in kHz.
    pub vco_khz: Limit,
    /// Sigma-delta fraction in 1/8192 units.
    pub sdm: Limit,
    /// Spread-spectrum step.
    pub ssd: Limit,
}

/// Limits of one PLL for one board strap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllLimitsEntry {
    /// Board strap the entry applies to.
    pub strap: u8,
    /// PLL the limits describe.
    pub pll: PllId,
    /// Limits.
    pub limits: PllLimits,
}

/// Complete board description.
#[derive(Debug, Clone, Copy)]
pub struct BoardTable<'a> {
    /// Attached DRAM generation.
    pub generation: ChipGeneration,
    /// Board strap read from the fuses.
    pub strap: u8,
    /// Crystal reference in kHz.
    pub crystal_khz: u32,
    /// Fixed source divided by the one-source path, in kHz.
    pub onesource_src_khz: u32,
    /// Reference-PLL output used to feed the DRAM PLL, in kHz.
    pub cascade_ref_khz: u32,
    /// One-source divider limits.
    pub onesource_div: Limit,
    /// PLL limits per strap and PLL.
    pub pll_limits: &'a [PllLimitsEntry],
    /// Supported frequencies.
    pub records: &'a [FrequencyRecord],
    /// Training table.
    pub training: TrainingTable,
    /// Per-strap trims. Straps without an entry get zero offsets.
    pub offsets: &'a [BoardOffsets],
    /// Frequency reached by boot-time training, in MHz.
    pub boot_mhz: u32,
}

impl BoardTable<'_> {
    /// Highest supported frequency in MHz (0 with no records).
    #[must_use]
    pub fn max_mhz(&self) -> u32 {
        self.records.iter().map(|r| r.freq_mhz).max().unwrap_or(0)
    }

    /// Record for `requested_mhz`: the exact match, otherwise the lowest
    /// record above the request.
    ///
    /// # Errors
    ///
    /// [`FatalFault::FrequencyUnsupported`] when the request is above every record.
    pub fn record_for(&self, requested_mhz: u32) -> Result<&FrequencyRecord, FatalFault> {
        self.records
            .iter()
            .filter(|r| r.freq_mhz >= requested_mhz)
            .min_by_key(|r| r.freq_mhz)
            .ok_or(FatalFault::FrequencyUnsupported {
                requested_mhz,
                max_mhz: self.max_mhz(),
            })
    }

    /// Limits of `pll` for the board strap.
    ///
    /// # Errors
    ///
    /// [`FatalFault::ConfigOutOfRange`] (item `PllLimits`) when the strap has
    /// no entry for `pll`. `min..=max` spans the straps that do.
    pub fn limits_for(&self, pll: PllId) -> Result<&PllLimits, FatalFault> {
        if let Some(entry) = self.pll_limits.iter().find(|e| e.strap == self.strap && e.pll == pll) {
            return Ok(&entry.limits);
        }
        let straps = self.pll_limits.iter().filter(|e| e.pll == pll).map(|e| u32::from(e.strap));
        Err(FatalFault::ConfigOutOfRange {
            item: ConfigItem::PllLimits,
            value: u32::from(self.strap),
            min: straps.clone().min().unwrap_or(0),
            max: straps.max().unwrap_or(0),
        })
    }

    /// Offsets for the board strap.
    #[must_use]
    pub fn strap_offsets(&self) -> BoardOffsets {
        self.offsets
            .iter()
            .find(|o| o.strap == self.strap)
            .copied()
            .unwrap_or(BoardOffsets {
                strap: self.strap,
                ..BoardOffsets::default()
            })
    }
}
