//! Mock implementations for testing
//!
//! - [`MockRegisterBus`]: plain register file that records every write.
//! - [`SimulatedFb`]: behavioural model of the training engine, PLLs and
//!   FB handshakes, driven by a caller-supplied eye-area profile.
//! - [`RecordingDelay`] / [`PanicHalt`]: timer and halt collaborators.
//! - [`fixtures`]: a complete reference board table.

#![cfg(any(test, feature = "std"))]
// Host-only test doubles: counters and map lookups are not audited.
#![allow(clippy::arithmetic_side_effects, clippy::indexing_slicing)]

pub mod fixtures;
mod sim;

pub use sim::{AreaQuery, MrsWrite, PassRecord, SimulatedFb};

use std::collections::BTreeMap;

use embedded_hal::delay::DelayNs;

use crate::fault::Halt;
use crate::regs::{RegAddr, RegisterBus};

/// Register file with a write log. Unwritten registers read as zero.
#[derive(Debug, Default)]
pub struct MockRegisterBus {
    regs: BTreeMap<RegAddr, u32>,
    writes: Vec<(RegAddr, u32)>,
    reads: usize,
}

impl MockRegisterBus {
    /// Empty register file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload a register without logging a write.
    pub fn preload(&mut self, addr: RegAddr, value: u32) {
        self.regs.insert(addr, value);
    }

    /// Current value of `addr` without counting a read.
    #[must_use]
    pub fn peek(&self, addr: RegAddr) -> u32 {
        self.regs.get(&addr).copied().unwrap_or(0)
    }

    /// All writes in order.
    #[must_use]
    pub fn writes(&self) -> &[(RegAddr, u32)] {
        &self.writes
    }

    /// Whether `value` was ever written to `addr`.
    #[must_use]
    pub fn wrote(&self, addr: RegAddr, value: u32) -> bool {
        self.writes.iter().any(|&(a, v)| a == addr && v == value)
    }

    /// Number of reads performed.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads
    }
}

impl RegisterBus for MockRegisterBus {
    fn read(&mut self, addr: RegAddr) -> u32 {
        self.reads += 1;
        self.peek(addr)
    }

    fn write(&mut self, addr: RegAddr, value: u32) {
        self.writes.push((addr, value));
        self.regs.insert(addr, value);
    }
}

/// Delay that only accumulates the requested time.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordingDelay {
    /// Sum of all requested delays.
    pub total_ns: u64,
    /// Number of delay calls.
    pub calls: u32,
}

impl RecordingDelay {
    /// Zeroed delay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
        self.calls += 1;
    }
}

/// Halt that panics with the mailbox code, for `#[should_panic]` tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicHalt;

impl Halt for PanicHalt {
    #[allow(clippy::panic)]
    fn halt(&mut self, code: u32) -> ! {
        panic!("halted with code {code:#06x}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fbpa;
    use crate::regs::{fence, FENCE_SETTLE_NS, FENCE_TOKEN};

    #[test]
    fn mock_bus_logs_writes_in_order() {
        let mut bus = MockRegisterBus::new();
        bus.write(RegAddr(0x10), 1);
        bus.write(RegAddr(0x14), 2);
        assert_eq!(bus.writes(), &[(RegAddr(0x10), 1), (RegAddr(0x14), 2)]);
        assert_eq!(bus.read(RegAddr(0x14)), 2);
        assert_eq!(bus.read_count(), 1);
    }

    #[test]
    fn modify_touches_only_the_field() {
        let mut bus = MockRegisterBus::new();
        bus.preload(RegAddr(0x20), 0xFFFF_0000);
        bus.modify(RegAddr(0x20), crate::regs::Field::new(0, 8), 0xAB);
        assert_eq!(bus.peek(RegAddr(0x20)), 0xFFFF_00AB);
    }

    #[test]
    fn fence_writes_token_then_waits() {
        let mut bus = MockRegisterBus::new();
        let mut delay = RecordingDelay::new();
        fence(&mut bus, &mut delay);
        assert!(bus.wrote(fbpa::FENCE, FENCE_TOKEN));
        assert_eq!(delay.total_ns, u64::from(FENCE_SETTLE_NS));
    }

    #[test]
    #[should_panic(expected = "halted with code 0xf400")]
    fn panic_halt_reports_code() {
        PanicHalt.halt(0xF400);
    }
}
