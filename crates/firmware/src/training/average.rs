//! Integer averaging with round-half-up.
//!
//! The firmware has no floating point. Every average in training (duplicated
//! sweep point, moving average, outer averaging loops) goes through
//! [`round_half_up`], which returns `floor(total / n + 1/2)`.

use gddr_platform::board::SweepRange;
use gddr_platform::Eye;

use crate::pins::{AnyPinTable, Pin, PinClass, PinTable};

/// `total / n` rounded to nearest, halves rounding towards +∞.
///
/// `n == 0` returns `total` unchanged.
pub fn round_half_up(total: i32, n: u32) -> i32 {
    if n == 0 {
        return total;
    }
    let n = i64::from(n);
    let twice = i64::from(total).saturating_mul(2).saturating_add(n);
    let q = twice.div_euclid(n.saturating_mul(2));
    i32::try_from(q).unwrap_or(if q < 0 { i32::MIN } else { i32::MAX })
}

/// Unsigned variant of [`round_half_up`]: compares twice the remainder with
/// the divisor.
pub fn round_half_up_u32(total: u32, n: u32) -> u32 {
    let (Some(q), Some(r)) = (total.checked_div(n), total.checked_rem(n)) else {
        return total;
    };
    if u64::from(r).saturating_mul(2) >= u64::from(n) {
        q.saturating_add(1)
    } else {
        q
    }
}

/// Per-pin sums of the values selected in each averaging loop.
#[derive(Debug, Clone, Copy)]
pub struct Accumulator {
    dfe: AnyPinTable<u32>,
    vref: [AnyPinTable<u32>; 3],
    loops: u32,
}

/// Final per-pin values after averaging and offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalValue {
    /// DFE code.
    pub dfe: u8,
    /// VREF per eye (unused eyes are zero).
    pub vref: [u8; 3],
}

impl Accumulator {
    /// Empty accumulator.
    pub const fn new() -> Self {
        Self {
            dfe: PinTable::filled(0),
            vref: [PinTable::filled(0); 3],
            loops: 0,
        }
    }

    /// Discard all sums.
    pub fn clear(&mut self) {
        self.dfe.fill(0);
        for table in &mut self.vref {
            table.fill(0);
        }
        self.loops = 0;
    }

    /// Add one loop's selection for `pin`.
    pub fn add<C: PinClass>(&mut self, pin: Pin<C>, dfe: u8, vref: &[u8; 3]) {
        if let Some(slot) = self.dfe.slot_mut(pin) {
            *slot = slot.saturating_add(u32::from(dfe));
        }
        for (table, &v) in self.vref.iter_mut().zip(vref) {
            if let Some(slot) = table.slot_mut(pin) {
                *slot = slot.saturating_add(u32::from(v));
            }
        }
    }

    /// Mark one averaging loop complete.
    pub fn end_loop(&mut self) {
        self.loops = self.loops.saturating_add(1);
    }

    /// Loops accumulated so far.
    pub fn loops(&self) -> u32 {
        self.loops
    }

    /// Rounded average for `pin` plus offsets, clamped into the windows.
    pub fn finalize<C: PinClass>(
        &self,
        pin: Pin<C>,
        eyes: &[Eye],
        dfe_window: &SweepRange,
        vref_window: &SweepRange,
        dfe_offset: i8,
        vref_offset: i8,
    ) -> FinalValue {
        let average = |sum: u32| -> i32 {
            i32::try_from(round_half_up_u32(sum, self.loops)).unwrap_or(i32::MAX)
        };
        let dfe = average(self.dfe.get(pin).unwrap_or(0)).saturating_add(i32::from(dfe_offset));
        let mut vref = [0u8; 3];
        for eye in eyes {
            let Some(table) = self.vref.get(eye.index()) else {
                continue;
            };
            let v = average(table.get(pin).unwrap_or(0)).saturating_add(i32::from(vref_offset));
            if let Some(out) = vref.get_mut(eye.index()) {
                *out = vref_window.clamp(v);
            }
        }
        FinalValue {
            dfe: dfe_window.clamp(dfe),
            vref,
        }
    }
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pins::DqPin;

    #[test]
    fn halves_round_up() {
        assert_eq!(round_half_up(6, 4), 2); // 1.5
        assert_eq!(round_half_up(5, 4), 1); // 1.25
        assert_eq!(round_half_up(7, 4), 2); // 1.75
        assert_eq!(round_half_up(3, 2), 2); // 1.5
        assert_eq!(round_half_up(8, 4), 2);
    }

    #[test]
    fn negative_halves_round_towards_positive() {
        assert_eq!(round_half_up(-3, 2), -1); // -1.5
        assert_eq!(round_half_up(-5, 4), -1); // -1.25
        assert_eq!(round_half_up(-7, 4), -2); // -1.75
    }

    #[test]
    fn unsigned_matches_signed_for_positive_totals() {
        for total in 0..200u32 {
            for n in 1..9u32 {
                assert_eq!(
                    i64::from(round_half_up_u32(total, n)),
                    i64::from(round_half_up(i32::try_from(total).unwrap(), n))
                );
            }
        }
    }

    #[test]
    fn four_identical_loops_average_to_the_loop_value() {
        let mut acc = Accumulator::new();
        let pin = DqPin::from_flat(10).unwrap();
        for _ in 0..4 {
            acc.add(pin, 2, &[0x40, 0, 0]);
            acc.end_loop();
        }
        let value = acc.finalize(
            pin,
            &[Eye::Low],
            &SweepRange::new(0, 7, 1),
            &SweepRange::new(0x10, 0x70, 1),
            0,
            0,
        );
        assert_eq!(value, FinalValue { dfe: 2, vref: [0x40, 0, 0] });
    }

    #[test]
    fn offsets_apply_after_rounding_and_clamp() {
        let mut acc = Accumulator::new();
        let pin = DqPin::from_flat(0).unwrap();
        for dfe in [1u8, 2] {
            acc.add(pin, dfe, &[0x6F, 0x20, 0x30]);
            acc.end_loop();
        }
        let value = acc.finalize(
            pin,
            &Eye::ALL,
            &SweepRange::new(0, 7, 1),
            &SweepRange::new(0x10, 0x70, 1),
            -1,
            4,
        );
        // dfe (1+2)/2 = 1.5 → 2, then -1
        assert_eq!(value.dfe, 1);
        assert_eq!(value.vref, [0x70, 0x24, 0x34]);
    }

    #[test]
    fn clear_resets_loops_and_sums() {
        let mut acc = Accumulator::new();
        let pin = DqPin::from_flat(0).unwrap();
        acc.add(pin, 5, &[1, 1, 1]);
        acc.end_loop();
        acc.clear();
        assert_eq!(acc.loops(), 0);
        acc.add(pin, 3, &[0, 0, 0]);
        acc.end_loop();
        let v = acc.finalize(pin, &[Eye::Low], &SweepRange::new(0, 7, 1), &SweepRange::new(0, 0xFF, 1), 0, 0);
        assert_eq!(v.dfe, 3);
    }
}
