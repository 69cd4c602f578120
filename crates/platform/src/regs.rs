//! Memory-mapped register access.
//!
//! All hardware interaction funnels through [`RegisterBus`]: a 32-bit
//! read/write interface over the frame-buffer partition address space.
//! Target builds implement it with volatile MMIO; host builds use the
//! register-file mocks in [`crate::mocks`].
//!
//! [`Field`] describes a bit field inside a register so that callers never
//! hand-roll shift/mask arithmetic.

use embedded_hal::delay::DelayNs;

use crate::fbpa;

/// Byte address of a 32-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct RegAddr(pub u32);

impl RegAddr {
    /// Address `index` registers after `self` (4-byte stride).
    ///
    /// Saturates at the top of the address space; register arrays in
    /// [`crate::fbpa`] are far below it.
    #[must_use]
    pub const fn offset(self, index: u32) -> Self {
        Self(self.0.saturating_add(index.saturating_mul(4)))
    }
}

/// A contiguous bit field within a 32-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Field {
    shift: u8,
    width: u8,
}

impl Field {
    /// Field of `width` bits starting at bit `shift`.
    ///
    /// `shift + width` must not exceed 32; the register map only declares
    /// fields that satisfy this.
    #[must_use]
    pub const fn new(shift: u8, width: u8) -> Self {
        Self { shift, width }
    }

    /// Single-bit field at `shift`.
    #[must_use]
    pub const fn bit(shift: u8) -> Self {
        Self { shift, width: 1 }
    }

    /// LSB position.
    #[must_use]
    pub const fn shift(self) -> u8 {
        self.shift
    }

    /// Largest value the field can hold.
    #[must_use]
    pub const fn max_value(self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            1u32.wrapping_shl(self.width as u32).wrapping_sub(1)
        }
    }

    /// In-place mask of the field.
    #[must_use]
    pub const fn mask(self) -> u32 {
        self.max_value().wrapping_shl(self.shift as u32)
    }

    /// Replace the field in `reg` with `value`. Bits of `value` wider
    /// than the field are discarded.
    #[must_use]
    pub const fn insert(self, reg: u32, value: u32) -> u32 {
        (reg & !self.mask()) | ((value & self.max_value()).wrapping_shl(self.shift as u32))
    }

    /// Extract the field from `reg`.
    #[must_use]
    pub const fn extract(self, reg: u32) -> u32 {
        reg.wrapping_shr(self.shift as u32) & self.max_value()
    }

    /// `value` placed in an otherwise-zero register word.
    #[must_use]
    pub const fn encode(self, value: u32) -> u32 {
        self.insert(0, value)
    }
}

/// 32-bit register interface.
///
/// Reads take `&mut self`: status reads on real hardware may clear
/// sticky bits, and the mocks record every access.
pub trait RegisterBus {
    /// Read the register at `addr`.
    fn read(&mut self, addr: RegAddr) -> u32;

    /// Write `value` to the register at `addr`.
    fn write(&mut self, addr: RegAddr, value: u32);

    /// Read-modify-write of one field.
    fn modify(&mut self, addr: RegAddr, field: Field, value: u32) {
        let current = self.read(addr);
        self.write(addr, field.insert(current, value));
    }

    /// Read one field.
    fn read_field(&mut self, addr: RegAddr, field: Field) -> u32 {
        field.extract(self.read(addr))
    }
}

impl<T: RegisterBus + ?Sized> RegisterBus for &mut T {
    fn read(&mut self, addr: RegAddr) -> u32 {
        T::read(self, addr)
    }

    fn write(&mut self, addr: RegAddr, value: u32) {
        T::write(self, addr, value);
    }
}

/// Settle time after a fence before dependent operations may start.
pub const FENCE_SETTLE_NS: u32 = 200;

/// Value written to the fence register. Any write drains posted writes.
pub const FENCE_TOKEN: u32 = 0x0000_0001;

/// Drain all posted register writes and wait for the hardware to settle.
///
/// Required between dependent clocking and training operations.
pub fn fence<B: RegisterBus + ?Sized, D: DelayNs + ?Sized>(bus: &mut B, delay: &mut D) {
    bus.write(fbpa::FENCE, FENCE_TOKEN);
    delay.delay_ns(FENCE_SETTLE_NS);
}
