//! Typed pin arena.
//!
//! Pins are addressed by a flat index into fixed-size tables, laid out
//! partition-major:
//!
//! ```text
//! flat = ((partition * SUBPARTITIONS + subpartition) * BYTES + byte) * LANES + lane
//! ```
//!
//! [`Pin<C>`] binds the index to its namespace at compile time: a DBI index
//! can never be used to program a DQ register. Per-pin training state lives
//! in [`PinTable`]s owned by the training workspace.

use core::marker::PhantomData;

use gddr_platform::fbpa::{
    BYTES_PER_SUBPARTITION, DBI_PER_BYTE, DBI_PIN_COUNT, DQ_PER_BYTE, DQ_PIN_COUNT,
    MAX_PARTITIONS, SUBPARTITIONS,
};
use gddr_platform::{OutOfRangeError, PinClassId};

// ── Pin classes ──────────────────────────────────────────────────────────────

/// A pin namespace.
pub trait PinClass: Copy + core::fmt::Debug {
    /// Number of pins in the namespace.
    const COUNT: usize;
    /// Pins per byte lane.
    const LANES_PER_BYTE: usize;
    /// Register encoding of the namespace.
    const ID: PinClassId;
    /// First lane of the namespace in per-pin MRS addressing (DQ, then DBI).
    const MRS_LANE_BASE: u16;
}

/// Data pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dq;

/// Data-bus-inversion / error-detection pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dbi;

impl PinClass for Dq {
    const COUNT: usize = DQ_PIN_COUNT;
    const LANES_PER_BYTE: usize = DQ_PER_BYTE;
    const ID: PinClassId = PinClassId::Dq;
    const MRS_LANE_BASE: u16 = 0;
}

impl PinClass for Dbi {
    const COUNT: usize = DBI_PIN_COUNT;
    const LANES_PER_BYTE: usize = DBI_PER_BYTE;
    const ID: PinClassId = PinClassId::Dbi;
    const MRS_LANE_BASE: u16 = DQ_PIN_COUNT as u16;
}

/// A DQ pin.
pub type DqPin = Pin<Dq>;
/// A DBI/EDC pin.
pub type DbiPin = Pin<Dbi>;

// ── Pin ──────────────────────────────────────────────────────────────────────

/// Pin of class `C`, stored as its flat index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pin<C: PinClass> {
    flat: u16,
    _class: PhantomData<C>,
}

const PINS_PER_PARTITION: usize = SUBPARTITIONS * BYTES_PER_SUBPARTITION;

impl<C: PinClass> Pin<C> {
    /// Pin from its coordinates.
    ///
    /// # Errors
    ///
    /// [`OutOfRangeError`] naming the first coordinate that is out of range.
    #[allow(clippy::arithmetic_side_effects)] // Safety: every coordinate bounds-checked first
    pub fn new(
        partition: usize,
        subpartition: usize,
        byte: usize,
        lane: usize,
    ) -> Result<Self, OutOfRangeError> {
        check(partition, MAX_PARTITIONS)?;
        check(subpartition, SUBPARTITIONS)?;
        check(byte, BYTES_PER_SUBPARTITION)?;
        check(lane, C::LANES_PER_BYTE)?;
        let flat = ((partition * SUBPARTITIONS + subpartition) * BYTES_PER_SUBPARTITION + byte)
            * C::LANES_PER_BYTE
            + lane;
        Self::from_flat(flat)
    }

    /// Pin from a flat index.
    ///
    /// # Errors
    ///
    /// [`OutOfRangeError`] when `flat >= C::COUNT`.
    pub fn from_flat(flat: usize) -> Result<Self, OutOfRangeError> {
        check(flat, C::COUNT)?;
        Ok(Self {
            flat: u16::try_from(flat).map_err(|_| range_error(flat, C::COUNT))?,
            _class: PhantomData,
        })
    }

    /// Flat table index.
    pub const fn flat(self) -> usize {
        self.flat as usize
    }

    /// Flat index as written to the select registers.
    pub const fn raw(self) -> u16 {
        self.flat
    }

    /// Lane addressed by a per-pin MRS command.
    pub const fn mrs_lane(self) -> u16 {
        C::MRS_LANE_BASE.saturating_add(self.flat)
    }

    /// Owning partition.
    #[allow(clippy::arithmetic_side_effects)] // nonzero const divisor
    pub const fn partition(self) -> usize {
        self.flat as usize / (C::LANES_PER_BYTE * PINS_PER_PARTITION)
    }

    /// All pins of the class whose partition is set in `partition_mask`.
    pub fn enabled(partition_mask: u8) -> impl Iterator<Item = Self> + Clone {
        (0..C::COUNT)
            .filter_map(|flat| Self::from_flat(flat).ok())
            .filter(move |pin| partition_mask & 1u8.wrapping_shl((pin.partition() & 7) as u32) != 0)
    }
}

fn range_error(value: usize, count: usize) -> OutOfRangeError {
    OutOfRangeError {
        value: u32::try_from(value).unwrap_or(u32::MAX),
        min: 0,
        max: u32::try_from(count.saturating_sub(1)).unwrap_or(u32::MAX),
    }
}

fn check(value: usize, count: usize) -> Result<(), OutOfRangeError> {
    if value < count {
        Ok(())
    } else {
        Err(range_error(value, count))
    }
}

// ── PinTable ─────────────────────────────────────────────────────────────────

/// Fixed-size per-pin storage indexed by [`Pin`].
///
/// Sized for the largest namespace; a table used for a smaller class just
/// leaves its tail untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinTable<T: Copy, const N: usize> {
    slots: [T; N],
}

/// Table large enough for any pin class.
pub type AnyPinTable<T> = PinTable<T, DQ_PIN_COUNT>;

impl<T: Copy, const N: usize> PinTable<T, N> {
    /// Table with every slot set to `value`.
    pub const fn filled(value: T) -> Self {
        Self { slots: [value; N] }
    }

    /// Value for `pin`. Pins beyond `N` read as `None`.
    pub fn get<C: PinClass>(&self, pin: Pin<C>) -> Option<T> {
        self.slots.get(pin.flat()).copied()
    }

    /// Store `value` for `pin`. Pins beyond `N` are ignored.
    pub fn set<C: PinClass>(&mut self, pin: Pin<C>, value: T) {
        if let Some(slot) = self.slots.get_mut(pin.flat()) {
            *slot = value;
        }
    }

    /// Mutable slot for `pin`.
    pub fn slot_mut<C: PinClass>(&mut self, pin: Pin<C>) -> Option<&mut T> {
        self.slots.get_mut(pin.flat())
    }

    /// Reset every slot to `value`.
    pub fn fill(&mut self, value: T) {
        self.slots = [value; N];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_index_is_partition_major() {
        let first = DqPin::new(0, 0, 0, 0).unwrap();
        let second_byte = DqPin::new(0, 0, 1, 0).unwrap();
        let last = DqPin::new(5, 1, 1, 7).unwrap();
        assert_eq!(first.flat(), 0);
        assert_eq!(second_byte.flat(), 8);
        assert_eq!(last.flat(), DQ_PIN_COUNT - 1);
        assert_eq!(last.partition(), 5);
    }

    #[test]
    fn dbi_pins_use_two_lanes_per_byte() {
        let pin = DbiPin::new(1, 0, 0, 1).unwrap();
        assert_eq!(pin.flat(), 9);
        assert_eq!(pin.partition(), 1);
        assert!(DbiPin::new(0, 0, 0, 2).is_err());
    }

    #[test]
    fn dbi_mrs_lanes_follow_dq_lanes() {
        assert_eq!(DqPin::from_flat(191).unwrap().mrs_lane(), 191);
        assert_eq!(DbiPin::from_flat(0).unwrap().mrs_lane(), 192);
    }

    #[test]
    fn out_of_range_coordinate_is_rejected() {
        assert_eq!(
            DqPin::new(6, 0, 0, 0),
            Err(OutOfRangeError {
                value: 6,
                min: 0,
                max: 5
            })
        );
        assert!(DqPin::from_flat(DQ_PIN_COUNT).is_err());
    }

    #[test]
    fn enabled_skips_masked_partitions() {
        let pins: std::vec::Vec<_> = DqPin::enabled(0b0000_0101).collect();
        assert_eq!(pins.len(), 2 * DQ_PIN_COUNT / MAX_PARTITIONS);
        assert!(pins.iter().all(|p| p.partition() == 0 || p.partition() == 2));
    }

    #[test]
    fn pin_table_get_set() {
        let mut table: AnyPinTable<u8> = PinTable::filled(0);
        let pin = DbiPin::from_flat(47).unwrap();
        table.set(pin, 9);
        assert_eq!(table.get(pin), Some(9));
        assert_eq!(table.get(DqPin::from_flat(47).unwrap()), Some(9));
        table.fill(1);
        assert_eq!(table.get(pin), Some(1));
    }
}
