//! Runtime frequency-switch integration tests
//!
//! Boots the simulated controller, then drives runtime switches across clock
//! paths and supplies, and checks that every fatal condition reaches the
//! mailbox before the halt.
//!
//! Run with: cargo test -p gddr-firmware --test integration_switch
#![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use std::panic::{catch_unwind, AssertUnwindSafe};

use embedded_hal_mock::eh1::delay::NoopDelay;
use gddr_firmware::{
    boot_entry, run_boot_time_training, switch_entry, ClockSwitch, StageFlags, SwitchOutcome, SwitchReport,
    TrainingConfig, TrainingWorkspace,
};
use gddr_platform::board::{BoardTable, Limit, PllLimits, PllLimitsEntry};
use gddr_platform::fault::ConfigItem;
use gddr_platform::mailbox;
use gddr_platform::mocks::fixtures::{reference_board, DRAMPLL_LIMITS, PLL_LIMITS};
use gddr_platform::mocks::{PanicHalt, SimulatedFb};
use gddr_platform::{fbpa, ChipGeneration, ClockPath, Eye, FatalFault, PinClassId, PllId, RegAddr, RegisterBus, TrainingDirection};

const GEN: ChipGeneration = ChipGeneration::Gddr6;

/// Booted controller, workspace and switch context.
fn booted(board: &BoardTable<'static>) -> (SimulatedFb, Box<TrainingWorkspace>) {
    let mut sim = SimulatedFb::new(board.generation);
    let mut ws = Box::new(TrainingWorkspace::new());
    run_boot_time_training(&mut sim, &mut NoopDelay::new(), board, &mut ws).unwrap();
    sim.clear_logs();
    (sim, ws)
}

fn switch_to(board: &BoardTable<'static>, sim: &mut SimulatedFb, ws: &mut TrainingWorkspace, mhz: u32) -> Result<SwitchReport, FatalFault> {
    let mut switch = ClockSwitch::new(board, TrainingConfig::from_board(board, 0x3F)?);
    match switch.switch_to_frequency(sim, &mut NoopDelay::new(), ws, mhz, StageFlags::FULL)? {
        SwitchOutcome::Complete(report) => Ok(report),
        SwitchOutcome::Suspended { resume } => panic!("full switch suspended at {resume}"),
    }
}

fn written(sim: &SimulatedFb, addr: RegAddr) -> Vec<u32> {
    sim.writes().iter().filter(|(a, _)| *a == addr).map(|&(_, v)| v).collect()
}

// ─── Clock paths ─────────────────────────────────────────────────────────────

#[test]
fn switch_down_to_one_source_skips_training() {
    let board = reference_board(GEN);
    let (mut sim, mut ws) = booted(&board);
    let report = switch_to(&board, &mut sim, &mut ws, 405).unwrap();
    assert_eq!(report.freq_mhz, 405);
    assert_eq!(
        sim.read_field(fbpa::CLK_SRC_SEL, fbpa::CLK_SRC_SEL_PATH),
        ClockPath::OneSource.raw()
    );
    assert_eq!(sim.read_field(fbpa::ONESOURCE_DIV, fbpa::ONESOURCE_DIV_VALUE), 4);
    assert_eq!(sim.read_field(fbpa::DRAMPLL.cfg, fbpa::PLL_CFG_LOCK), 0);
    assert_eq!(sim.read_field(fbpa::REFPLL.cfg, fbpa::PLL_CFG_LOCK), 0);
    assert!(sim.passes().is_empty());
}

#[test]
fn cascaded_to_reference_goes_through_one_source() {
    let board = reference_board(GEN);
    let (mut sim, mut ws) = booted(&board);
    switch_to(&board, &mut sim, &mut ws, 810).unwrap();
    let paths: Vec<u32> = written(&sim, fbpa::CLK_SRC_SEL)
        .into_iter()
        .map(|v| fbpa::CLK_SRC_SEL_PATH.extract(v))
        .collect();
    assert_eq!(paths, vec![ClockPath::OneSource.raw(), ClockPath::RefPll.raw()]);
    assert_eq!(sim.read_field(fbpa::REFPLL.cfg, fbpa::PLL_CFG_LOCK), 1);
}

#[test]
fn cascaded_relock_retrains_the_link() {
    let board = reference_board(GEN);
    let (mut sim, mut ws) = booted(&board);
    switch_to(&board, &mut sim, &mut ws, 1250).unwrap();
    assert_eq!(
        sim.read_field(fbpa::CLK_SRC_SEL, fbpa::CLK_SRC_SEL_PATH),
        ClockPath::DramPll.raw()
    );
    let ops = GEN.opcodes();
    assert!(sim.passes().iter().any(|p| p.opcode == ops.address));
    assert!(sim.passes().iter().any(|p| p.opcode == ops.wck));
    assert!(sim.passes().iter().any(|p| p.opcode == ops.pi_offset));
    assert_eq!(sim.peek(mailbox::slot(mailbox::SLOT_FREQUENCY_MHZ)), 1250);
}

#[test]
fn switch_publishes_poll_count() {
    let board = reference_board(GEN);
    let (mut sim, mut ws) = booted(&board);
    let report = switch_to(&board, &mut sim, &mut ws, 1250).unwrap();
    assert_eq!(sim.peek(mailbox::slot(mailbox::SLOT_SWITCH_POLLS)), report.polls);
}

// ─── Supplies ────────────────────────────────────────────────────────────────

#[test]
fn supply_change_with_qualified_hop_switches_twice() {
    let board = reference_board(GEN);
    let (mut sim, mut ws) = booted(&board);
    let report = switch_to(&board, &mut sim, &mut ws, 2000).unwrap();
    assert_eq!(report.freq_mhz, 2000);
    assert_eq!(written(&sim, mailbox::slot(mailbox::SLOT_FREQUENCY_MHZ)), vec![1500, 2000]);
    assert_eq!(sim.read_field(fbpa::VDD_CTRL, fbpa::VDD_CTRL_MV), 1400);
    assert_eq!(sim.read_field(fbpa::VREF_AUX_CTRL, fbpa::VREF_AUX_CTRL_MV), 700);
    assert_eq!(sim.read_field(fbpa::DRAMPLL.cfg, fbpa::PLL_CFG_SDM_EN), 1);
    assert_eq!(sim.read_field(fbpa::DRAMPLL.cfg, fbpa::PLL_CFG_SSC_EN), 1);
}

#[test]
fn supply_change_without_hop_commits_in_self_refresh() {
    let board = reference_board(GEN);
    let (mut sim, mut ws) = booted(&board);
    switch_to(&board, &mut sim, &mut ws, 1500).unwrap();
    assert_eq!(written(&sim, mailbox::slot(mailbox::SLOT_FREQUENCY_MHZ)), vec![1500]);
    let writes = sim.writes();
    let vdd = writes.iter().position(|(a, _)| *a == fbpa::VDD_CTRL).unwrap();
    let sr_exit = writes
        .iter()
        .position(|&(a, v)| a == fbpa::SELF_REFRESH_CTRL && fbpa::SELF_REFRESH_EXIT.extract(v) == 1)
        .unwrap();
    assert!(vdd < sr_exit);
    assert_eq!(sim.read_field(fbpa::VDD_CTRL, fbpa::VDD_CTRL_MV), 1400);
}

// ─── Fatal conditions ────────────────────────────────────────────────────────

#[test]
fn unsupported_runtime_frequency_is_rejected_before_fb_stop() {
    let board = reference_board(GEN);
    let (mut sim, mut ws) = booted(&board);
    assert_eq!(
        switch_to(&board, &mut sim, &mut ws, 2600),
        Err(FatalFault::FrequencyUnsupported {
            requested_mhz: 2600,
            max_mhz: 2000
        })
    );
    assert!(written(&sim, fbpa::FB_CTRL).is_empty());
}

#[test]
fn pll_outside_board_limits_is_fatal_before_any_clock_write() {
    let narrow = PllLimitsEntry {
        strap: 0,
        pll: PllId::Dram,
        limits: PllLimits {
            vco_khz: Limit::new(1_000_000, 1_200_000),
            ..DRAMPLL_LIMITS
        },
    };
    let entries = [PLL_LIMITS[0], narrow];
    let board = BoardTable {
        pll_limits: &entries,
        ..reference_board(GEN)
    };
    let mut sim = SimulatedFb::new(GEN);
    let mut ws = Box::new(TrainingWorkspace::new());
    let err = run_boot_time_training(&mut sim, &mut NoopDelay::new(), &board, &mut ws).unwrap_err();
    assert!(matches!(err, FatalFault::PllOutOfRange { pll: PllId::Dram, .. }));
    assert!(written(&sim, fbpa::CLK_SRC_SEL).is_empty());
    assert_eq!(sim.read_field(fbpa::FB_STATUS, fbpa::FB_STATUS_RUNNING), 1);
}

#[test]
fn strap_without_pll_limits_is_fatal_before_fb_stop() {
    let board = BoardTable {
        strap: 5,
        ..reference_board(GEN)
    };
    let mut sim = SimulatedFb::new(GEN);
    let mut ws = Box::new(TrainingWorkspace::new());
    let err = run_boot_time_training(&mut sim, &mut NoopDelay::new(), &board, &mut ws).unwrap_err();
    assert_eq!(
        err,
        FatalFault::ConfigOutOfRange {
            item: ConfigItem::PllLimits,
            value: 5,
            min: 0,
            max: 1,
        }
    );
    assert!(written(&sim, fbpa::FB_CTRL).is_empty());
}

#[test]
fn pll_that_never_locks_halts_with_its_code() {
    let board = reference_board(GEN);
    let mut sim = SimulatedFb::new(GEN).unlockable(PllId::Dram);
    let mut ws = Box::new(TrainingWorkspace::new());
    let halted = catch_unwind(AssertUnwindSafe(|| {
        boot_entry(&mut sim, &mut NoopDelay::new(), &mut PanicHalt, &board, &mut ws);
    }));
    assert!(halted.is_err());
    let expected = FatalFault::PllLockTimeout { pll: PllId::Dram };
    assert_eq!(sim.peek(mailbox::slot(mailbox::SLOT_FAULT_CODE)), expected.code());
    assert_eq!(sim.peek(mailbox::slot(mailbox::SLOT_FAULT_AUX)), expected.aux()[0]);
}

fn closed_write_mid_eye() -> SimulatedFb {
    SimulatedFb::new(ChipGeneration::Gddr6x).with_area_profile(|q| {
        if q.direction == TrainingDirection::Write && q.class == PinClassId::Dq && q.pin == 5 && q.eye == Eye::Mid {
            0
        } else {
            100 - 10 * (i16::from(q.dfe) - 2).abs()
        }
    })
}

#[test]
fn closed_eye_names_direction_pin_and_eye() {
    let board = reference_board(ChipGeneration::Gddr6x);
    let mut sim = closed_write_mid_eye();
    let mut ws = Box::new(TrainingWorkspace::new());
    assert_eq!(
        run_boot_time_training(&mut sim, &mut NoopDelay::new(), &board, &mut ws),
        Err(FatalFault::ZeroArea {
            direction: TrainingDirection::Write,
            class: PinClassId::Dq,
            pin: 5,
            eye: Eye::Mid,
        })
    );
}

#[test]
#[should_panic(expected = "halted with code")]
fn closed_eye_halts_at_the_boot_boundary() {
    let board = reference_board(ChipGeneration::Gddr6x);
    let mut sim = closed_write_mid_eye();
    let mut ws = Box::new(TrainingWorkspace::new());
    boot_entry(&mut sim, &mut NoopDelay::new(), &mut PanicHalt, &board, &mut ws);
}

#[test]
#[should_panic(expected = "halted with code")]
fn out_of_order_stage_halts_at_the_switch_boundary() {
    let board = reference_board(GEN);
    let (mut sim, mut ws) = booted(&board);
    let mut switch = ClockSwitch::new(&board, TrainingConfig::from_board(&board, 0x3F).unwrap());
    switch_entry(&mut sim, &mut NoopDelay::new(), &mut PanicHalt, &mut switch, &mut ws, 1250, StageFlags::POST_LINK);
}
