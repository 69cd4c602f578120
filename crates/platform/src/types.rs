//! Shared vocabulary for the memory-controller firmware.
//!
//! Small `Copy` enums used on both sides of the platform boundary: the
//! register map keys its constants by them, the fault codes encode them,
//! and the firmware's training and clock-switch code is parameterised over
//! them.

// ── Error type ───────────────────────────────────────────────────────────────

/// Error returned when a value is out of the valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutOfRangeError {
    /// The value that was out of range.
    pub value: u32,
    /// The inclusive minimum allowed value.
    pub min: u32,
    /// The inclusive maximum allowed value.
    pub max: u32,
}

impl OutOfRangeError {
    /// Check `value` against the inclusive range `min..=max`.
    ///
    /// # Errors
    ///
    /// Returns the populated error when `value` lies outside the range.
    pub const fn check(value: u32, min: u32, max: u32) -> Result<u32, Self> {
        if value < min || value > max {
            Err(Self { value, min, max })
        } else {
            Ok(value)
        }
    }
}

impl core::fmt::Display for OutOfRangeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "value {} outside {}..={}",
            self.value, self.min, self.max
        )
    }
}

// ── Signaling ────────────────────────────────────────────────────────────────

/// Line signaling of the attached DRAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SignalingMode {
    /// Two-level signaling: a single eye per pin.
    Nrz,
    /// Four-level signaling: three stacked eyes per pin.
    Pam4,
}

impl SignalingMode {
    /// Number of eyes measured per pin.
    #[must_use]
    pub const fn eye_count(self) -> usize {
        match self {
            Self::Nrz => 1,
            Self::Pam4 => 3,
        }
    }

    /// The eyes that exist in this mode, lowest first.
    #[must_use]
    pub fn eyes(self) -> &'static [Eye] {
        match self {
            Self::Nrz => &[Eye::Low],
            Self::Pam4 => &Eye::ALL,
        }
    }
}

/// One eye of a (possibly multi-level) data pin.
///
/// NRZ pins only expose [`Eye::Low`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Eye {
    /// Lower eye (or the only eye for NRZ).
    Low = 0,
    /// Middle eye.
    Mid = 1,
    /// Upper eye.
    High = 2,
}

impl Eye {
    /// All three eyes in measurement order.
    pub const ALL: [Eye; 3] = [Eye::Low, Eye::Mid, Eye::High];

    /// Slot index `0..3`.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl core::fmt::Display for Eye {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
        })
    }
}

/// Which way data travels on the trained link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TrainingDirection {
    /// DRAM drives, controller samples.
    Read = 0,
    /// Controller drives, DRAM samples.
    Write = 1,
}

impl core::fmt::Display for TrainingDirection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// Pin namespace a training pass operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PinClassId {
    /// Data pins.
    Dq = 0,
    /// Data-bus-inversion and error-detection pins.
    Dbi = 1,
}

impl core::fmt::Display for PinClassId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Dq => "dq",
            Self::Dbi => "dbi",
        })
    }
}

// ── Clocking ─────────────────────────────────────────────────────────────────

/// Source of the DRAM clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ClockPath {
    /// Integer divider off the fixed system source. Low frequencies only.
    OneSource = 0,
    /// Reference PLL driving the DRAM clock directly.
    RefPll = 1,
    /// DRAM PLL fed by the reference PLL (cascaded).
    DramPll = 2,
}

impl ClockPath {
    /// Decode the clock-source select field.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::OneSource),
            1 => Some(Self::RefPll),
            2 => Some(Self::DramPll),
            _ => None,
        }
    }

    /// Encoded clock-source select value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self as u32
    }
}

impl core::fmt::Display for ClockPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::OneSource => "one-source",
            Self::RefPll => "ref-pll",
            Self::DramPll => "dram-pll",
        })
    }
}

/// One of the two programmable PLLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PllId {
    /// Reference PLL.
    Ref = 0,
    /// DRAM PLL.
    Dram = 1,
}

impl core::fmt::Display for PllId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Ref => "ref-pll",
            Self::Dram => "dram-pll",
        })
    }
}

/// Coefficient or derived quantity checked against a PLL's limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PllCoefficient {
    /// Input divider.
    M = 0,
    /// Feedback multiplier.
    N = 1,
    /// Post divider.
    P = 2,
    /// Phase-detector update rate (input / M) in kHz.
    UpdateRate = 3,
    /// VCO frequency in kHz.
    Vco = 4,
    /// Sigma-delta fractional value in 1/8192 units.
    Sdm = 5,
    /// Spread-spectrum step.
    Ssd = 6,
    /// One-source integer divider.
    OneSourceDiv = 7,
}

impl core::fmt::Display for PllCoefficient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::M => "M",
            Self::N => "N",
            Self::P => "P",
            Self::UpdateRate => "update-rate",
            Self::Vco => "vco",
            Self::Sdm => "sdm",
            Self::Ssd => "ssd",
            Self::OneSourceDiv => "onesource-div",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pam4_exposes_three_eyes_nrz_one() {
        assert_eq!(SignalingMode::Nrz.eyes(), &[Eye::Low]);
        assert_eq!(SignalingMode::Pam4.eyes().len(), 3);
        assert_eq!(SignalingMode::Pam4.eye_count(), 3);
    }

    #[test]
    fn clock_path_raw_round_trips_and_rejects_unknown() {
        for path in [ClockPath::OneSource, ClockPath::RefPll, ClockPath::DramPll] {
            assert_eq!(ClockPath::from_raw(path.raw()), Some(path));
        }
        assert_eq!(ClockPath::from_raw(3), None);
    }

    #[test]
    fn out_of_range_check_is_inclusive() {
        assert_eq!(OutOfRangeError::check(5, 5, 9), Ok(5));
        assert_eq!(OutOfRangeError::check(9, 5, 9), Ok(9));
        assert_eq!(
            OutOfRangeError::check(10, 5, 9),
            Err(OutOfRangeError {
                value: 10,
                min: 5,
                max: 9
            })
        );
    }
}
