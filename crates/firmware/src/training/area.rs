//! Per-pin eye-area tables and min-max selection.
//!
//! For every (eye, DFE slot, pin) the tables hold the measured eye area and
//! the VREF the engine centred on. Selection picks, per pin, the DFE slot
//! whose *worst* eye is largest: multi-level signaling is only as good as
//! its smallest eye.

use gddr_platform::{Eye, FatalFault, TrainingDirection};

use crate::pins::{AnyPinTable, Pin, PinClass, PinTable};

use super::average::round_half_up;

/// DFE slots a single sweep window may cover.
pub const MAX_DFE_SLOTS: usize = 16;

/// Measured areas and VREFs of one averaging loop.
#[derive(Debug, Clone, Copy)]
pub struct AreaTables {
    area: [[AnyPinTable<i16>; MAX_DFE_SLOTS]; 3],
    vref: [[AnyPinTable<u8>; MAX_DFE_SLOTS]; 3],
    slots: usize,
}

/// Winning DFE slot of one pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Slot index.
    pub slot: usize,
    /// Worst-eye area at that slot.
    pub min_area: i16,
    /// VREF per eye at that slot.
    pub vref: [u8; 3],
}

impl AreaTables {
    /// Empty tables.
    pub const fn new() -> Self {
        Self {
            area: [[PinTable::filled(0); MAX_DFE_SLOTS]; 3],
            vref: [[PinTable::filled(0); MAX_DFE_SLOTS]; 3],
            slots: 0,
        }
    }

    /// Zero every entry and size the tables for `slots` DFE codes.
    pub fn reset(&mut self, slots: usize) {
        for eye in self.area.iter_mut() {
            for table in eye.iter_mut() {
                table.fill(0);
            }
        }
        for eye in self.vref.iter_mut() {
            for table in eye.iter_mut() {
                table.fill(0);
            }
        }
        self.slots = slots.min(MAX_DFE_SLOTS);
    }

    /// Number of DFE slots in use.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Area at (eye, slot, pin).
    pub fn area<C: PinClass>(&self, eye: Eye, slot: usize, pin: Pin<C>) -> i16 {
        self.area
            .get(eye.index())
            .and_then(|e| e.get(slot))
            .and_then(|t| t.get(pin))
            .unwrap_or(0)
    }

    /// VREF at (eye, slot, pin).
    pub fn vref<C: PinClass>(&self, eye: Eye, slot: usize, pin: Pin<C>) -> u8 {
        self.vref
            .get(eye.index())
            .and_then(|e| e.get(slot))
            .and_then(|t| t.get(pin))
            .unwrap_or(0)
    }

    /// Store a measurement.
    ///
    /// With `merge` the area is averaged with the value already stored
    /// (second visit of the sweep start) and the VREF replaced.
    pub fn record<C: PinClass>(&mut self, eye: Eye, slot: usize, pin: Pin<C>, area: i16, vref: u8, merge: bool) {
        if let Some(table) = self.area.get_mut(eye.index()).and_then(|e| e.get_mut(slot)) {
            if let Some(stored) = table.slot_mut(pin) {
                *stored = if merge {
                    narrow(round_half_up(i32::from(*stored).saturating_add(i32::from(area)), 2))
                } else {
                    area
                };
            }
        }
        if let Some(table) = self.vref.get_mut(eye.index()).and_then(|e| e.get_mut(slot)) {
            table.set(pin, vref);
        }
    }

    /// Three-tap moving average of each pin's areas along the DFE axis.
    ///
    /// Edge slots average with their single neighbour; a single-slot sweep
    /// is left unchanged.
    pub fn smooth<C: PinClass>(&mut self, eyes: &[Eye], pins: impl Iterator<Item = Pin<C>> + Clone) {
        let n = self.slots;
        if n < 2 {
            return;
        }
        for eye in eyes {
            for pin in pins.clone() {
                let mut raw = [0i16; MAX_DFE_SLOTS];
                for (slot, value) in raw.iter_mut().enumerate().take(n) {
                    *value = self.area(*eye, slot, pin);
                }
                for slot in 0..n {
                    let lo = slot.saturating_sub(1);
                    let hi = slot.saturating_add(1).min(n.saturating_sub(1));
                    let window = raw.get(lo..=hi).unwrap_or(&[]);
                    let sum: i32 = window.iter().map(|&a| i32::from(a)).sum();
                    let count = u32::try_from(window.len()).unwrap_or(1);
                    let smoothed = narrow(round_half_up(sum, count));
                    if let Some(stored) = self
                        .area
                        .get_mut(eye.index())
                        .and_then(|e| e.get_mut(slot))
                        .and_then(|t| t.slot_mut(pin))
                    {
                        *stored = smoothed;
                    }
                }
            }
        }
    }

    /// Fail if any eye of `pin` measured zero area at every slot.
    pub fn check_open<C: PinClass>(
        &self,
        direction: TrainingDirection,
        eyes: &[Eye],
        pin: Pin<C>,
    ) -> Result<(), FatalFault> {
        for &eye in eyes {
            if (0..self.slots).all(|slot| self.area(eye, slot, pin) == 0) {
                return Err(FatalFault::ZeroArea {
                    direction,
                    class: C::ID,
                    pin: pin.raw(),
                    eye,
                });
            }
        }
        Ok(())
    }

    /// Slot maximising the minimum area across `eyes`. Ties keep the lowest
    /// slot.
    pub fn select<C: PinClass>(&self, eyes: &[Eye], pin: Pin<C>) -> Selection {
        let mut best = Selection {
            slot: 0,
            min_area: i16::MIN,
            vref: [0; 3],
        };
        for slot in 0..self.slots {
            let worst = eyes
                .iter()
                .map(|&eye| self.area(eye, slot, pin))
                .min()
                .unwrap_or(0);
            if slot == 0 || worst > best.min_area {
                best.slot = slot;
                best.min_area = worst;
            }
        }
        for &eye in eyes {
            if let Some(v) = best.vref.get_mut(eye.index()) {
                *v = self.vref(eye, best.slot, pin);
            }
        }
        best
    }
}

impl Default for AreaTables {
    fn default() -> Self {
        Self::new()
    }
}

fn narrow(value: i32) -> i16 {
    i16::try_from(value).unwrap_or(if value < 0 { i16::MIN } else { i16::MAX })
}
