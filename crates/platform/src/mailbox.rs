//! Host-visible mailbox.
//!
//! Eight scratch registers the host driver reads to follow boot progress
//! and to collect the fault code after a halt. The layout is fixed:
//!
//! | Index | Content                                  |
//! |-------|------------------------------------------|
//! | 0     | last [`Progress`] marker                 |
//! | 1     | fault code (0 = none)                    |
//! | 2..=4 | fault auxiliary words                    |
//! | 5     | reserved, cleared on fault               |
//! | 6     | duration of the last switch, in polls    |
//! | 7     | current DRAM frequency in MHz            |

use crate::fault::FatalFault;
use crate::fbpa;
use crate::regs::{RegAddr, RegisterBus};

/// Mailbox slot for the progress marker.
pub const SLOT_PROGRESS: u32 = 0;
/// Mailbox slot for the fault code.
pub const SLOT_FAULT_CODE: u32 = 1;
/// First mailbox slot of the fault auxiliary words.
pub const SLOT_FAULT_AUX: u32 = 2;
/// Reserved slot.
pub const SLOT_RESERVED: u32 = 5;
/// Mailbox slot for the last switch duration.
pub const SLOT_SWITCH_POLLS: u32 = 6;
/// Mailbox slot for the current DRAM frequency.
pub const SLOT_FREQUENCY_MHZ: u32 = 7;

/// Progress markers, in boot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum Progress {
    /// Boot-time training entered.
    BootStart = 0x0B00,
    /// Frequency switch started.
    SwitchStart = 0x0B10,
    /// PLL coefficients computed.
    CoefficientsReady = 0x0B11,
    /// FB drained.
    FbStopped = 0x0B12,
    /// DRAM in self-refresh.
    SelfRefreshEntered = 0x0B13,
    /// Clock path switched.
    ClockSwitched = 0x0B14,
    /// DRAM out of self-refresh.
    SelfRefreshExited = 0x0B15,
    /// Address training finished.
    AddressTrained = 0x0B20,
    /// WCK training finished.
    WckTrained = 0x0B21,
    /// Read training finished.
    ReadTrained = 0x0B22,
    /// Write training finished.
    WriteTrained = 0x0B23,
    /// Refresh and periodic training back on.
    RefreshReenabled = 0x0B30,
    /// FB running at the new frequency.
    SwitchDone = 0x0B31,
    /// Boot-time training complete.
    BootDone = 0x0BFF,
}

/// Address of mailbox slot `index`.
#[must_use]
pub const fn slot(index: u32) -> RegAddr {
    fbpa::MAILBOX_BASE.offset(index)
}

/// Publish a progress marker.
pub fn progress<B: RegisterBus + ?Sized>(bus: &mut B, marker: Progress) {
    bus.write(slot(SLOT_PROGRESS), marker as u32);
}

/// Record the duration and resulting frequency of a completed switch.
pub fn switch_complete<B: RegisterBus + ?Sized>(bus: &mut B, polls: u32, freq_mhz: u32) {
    bus.write(slot(SLOT_SWITCH_POLLS), polls);
    bus.write(slot(SLOT_FREQUENCY_MHZ), freq_mhz);
}

/// Publish a fatal fault. The host treats a non-zero code slot as terminal.
///
/// Auxiliary words are written before the code so the host never observes
/// a code with stale auxiliary data.
pub fn report_fault<B: RegisterBus + ?Sized>(bus: &mut B, fault: &FatalFault) {
    let mut index = SLOT_FAULT_AUX;
    for word in fault.aux() {
        bus.write(slot(index), word);
        index = index.saturating_add(1);
    }
    bus.write(slot(SLOT_RESERVED), 0);
    bus.write(slot(SLOT_FAULT_CODE), fault.code());
}
