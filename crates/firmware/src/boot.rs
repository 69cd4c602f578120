//! Boot-time training and the fault boundary.
//!
//! Boot order (each step depends on the previous one):
//!   1. Publish boot start to the mailbox
//!   2. Read the enabled-partition mask and resolve the training parameters
//!   3. Switch call 1: coefficients through self-refresh exit
//!   4. Address training
//!   5. Switch call 2: training control
//!   6. WCK, read and write training
//!   7. Switch call 3: refresh back on, FB restarted
//!   8. Publish boot done
//!
//! [`boot_entry`] and [`switch_entry`] are the only places a [`FatalFault`]
//! leaves the firmware: the fault goes to the mailbox and the core halts.

use embedded_hal::delay::DelayNs;
use gddr_platform::board::BoardTable;
use gddr_platform::mailbox::{self, Progress};
use gddr_platform::{fbpa, FatalFault, Halt, RegisterBus};

use crate::clock::{ClockSwitch, StageFlags, SwitchOutcome, SwitchReport};
use crate::training::{LinkTrainer, TrainingConfig, TrainingWorkspace};

/// Ordered list of boot steps, for documentation and tests.
pub const BOOT_SEQUENCE_STEPS: &[&str] = &[
    "1. Mailbox: boot start",
    "2. Partitions: read enabled mask, resolve training config",
    "3. Switch (pre-address): coefficients, FB stop, clock path, self-refresh exit",
    "4. Address training",
    "5. Switch (post-address): training control",
    "6. Link training: WCK, read, write",
    "7. Switch (post-link): refresh re-enable, FB start",
    "8. Mailbox: boot done",
];

/// Train the link up to the board's boot frequency.
///
/// The switch is staged so address training runs between calls 1 and 2 and
/// link training between calls 2 and 3, each gated by the record's
/// [`TrainingSelect`](gddr_platform::TrainingSelect).
pub fn run_boot_time_training<B, D>(
    bus: &mut B,
    delay: &mut D,
    board: &BoardTable<'_>,
    ws: &mut TrainingWorkspace,
) -> Result<SwitchReport, FatalFault>
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
{
    mailbox::progress(bus, Progress::BootStart);
    let mask = u8::try_from(bus.read_field(fbpa::PARTITION_MASK, fbpa::PARTITION_MASK_BITS)).unwrap_or(0);
    let target = board.boot_mhz;
    fb_info!("boot training to {} MHz, partition mask {}", target, mask);
    let config = TrainingConfig::from_board(board, mask)?;
    let select = board.record_for(target)?.training;
    let mut switch = ClockSwitch::new(board, config);

    switch.switch_to_frequency(bus, delay, ws, target, StageFlags::PRE_ADDRESS)?;
    if select.address {
        LinkTrainer::new(&mut *bus, &mut *delay, switch.training(), &mut *ws).train_address()?;
    }

    switch.switch_to_frequency(bus, delay, ws, target, StageFlags::POST_ADDRESS)?;
    {
        let mut trainer = LinkTrainer::new(&mut *bus, &mut *delay, switch.training(), &mut *ws);
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

    let SwitchOutcome::Complete(report) =
        switch.switch_to_frequency(bus, delay, ws, target, StageFlags::POST_LINK)?
    else {
        return Err(FatalFault::StageOutOfOrder {
            expected: 0,
            requested: StageFlags::POST_LINK.bits(),
        });
    };
    mailbox::progress(bus, Progress::BootDone);
    fb_info!("boot training done at {} MHz", report.freq_mhz);
    Ok(report)
}

/// Boot entry: train or halt.
pub fn boot_entry<B, D, H>(
    bus: &mut B,
    delay: &mut D,
    halt: &mut H,
    board: &BoardTable<'_>,
    ws: &mut TrainingWorkspace,
) -> SwitchReport
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
    H: Halt + ?Sized,
{
    match run_boot_time_training(bus, delay, board, ws) {
        Ok(report) => report,
        Err(fault) => fail(bus, halt, &fault),
    }
}

/// Runtime switch entry: switch or halt.
pub fn switch_entry<B, D, H>(
    bus: &mut B,
    delay: &mut D,
    halt: &mut H,
    switch: &mut ClockSwitch<'_>,
    ws: &mut TrainingWorkspace,
    target_mhz: u32,
    flags: StageFlags,
) -> SwitchOutcome
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
    H: Halt + ?Sized,
{
    match switch.switch_to_frequency(bus, delay, ws, target_mhz, flags) {
        Ok(outcome) => outcome,
        Err(fault) => fail(bus, halt, &fault),
    }
}

fn fail<B, H>(bus: &mut B, halt: &mut H, fault: &FatalFault) -> !
where
    B: RegisterBus + ?Sized,
    H: Halt + ?Sized,
{
    fb_error!("fatal {}: {}", fault.code(), fault);
    mailbox::report_fault(bus, fault);
    halt.halt(fault.code())
}

/// Training workspace in static memory. `None` after the first call.
#[cfg(feature = "hardware")]
pub fn take_workspace() -> Option<&'static mut TrainingWorkspace> {
    static WORKSPACE: static_cell::StaticCell<TrainingWorkspace> = static_cell::StaticCell::new();
    WORKSPACE.try_init(TrainingWorkspace::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use gddr_platform::mocks::fixtures::reference_board;
    use gddr_platform::mocks::{PanicHalt, SimulatedFb};
    use gddr_platform::ChipGeneration;

    #[test]
    fn boot_sequence_trains_between_switch_stages() {
        let steps = BOOT_SEQUENCE_STEPS;
        let pos = |needle: &str| steps.iter().position(|s| s.contains(needle)).unwrap();
        assert!(pos("pre-address") < pos("Address training"));
        assert!(pos("Address training") < pos("post-address"));
        assert!(pos("post-address") < pos("Link training"));
        assert!(pos("Link training") < pos("post-link"));
    }

    #[test]
    fn boot_reaches_boot_frequency() {
        let board = reference_board(ChipGeneration::Gddr6);
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6);
        let mut ws = Box::new(TrainingWorkspace::new());
        let report = boot_entry(&mut sim, &mut NoopDelay::new(), &mut PanicHalt, &board, &mut ws);
        assert_eq!(report.freq_mhz, board.boot_mhz);
        assert_eq!(
            sim.peek(mailbox::slot(mailbox::SLOT_PROGRESS)),
            Progress::BootDone as u32
        );
        assert_eq!(sim.peek(mailbox::slot(mailbox::SLOT_FAULT_CODE)), 0);
    }

    #[test]
    #[should_panic(expected = "halted with code")]
    fn unsupported_boot_frequency_halts() {
        let mut board = reference_board(ChipGeneration::Gddr6);
        board.boot_mhz = 9_000;
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6);
        let mut ws = Box::new(TrainingWorkspace::new());
        boot_entry(&mut sim, &mut NoopDelay::new(), &mut PanicHalt, &board, &mut ws);
    }

    #[test]
    fn fault_reaches_mailbox_before_halt() {
        let board = reference_board(ChipGeneration::Gddr6);
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6);
        let mut ws = Box::new(TrainingWorkspace::new());
        let err = run_boot_time_training(&mut sim, &mut NoopDelay::new(), &board_with_boot(&board, 9_000), &mut ws)
            .unwrap_err();
        assert!(matches!(err, FatalFault::FrequencyUnsupported { requested_mhz: 9_000, .. }));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            fail(&mut sim, &mut PanicHalt, &err);
        }));
        assert!(result.is_err());
        assert_eq!(sim.peek(mailbox::slot(mailbox::SLOT_FAULT_CODE)), err.code());
    }

    fn board_with_boot<'a>(board: &BoardTable<'a>, mhz: u32) -> BoardTable<'a> {
        BoardTable {
            boot_mhz: mhz,
            ..*board
        }
    }
}
