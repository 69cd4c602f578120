//! Area-table DFE search.
//!
//! Per averaging loop:
//!
//! 1. DFE bypassed, capture an initial VREF per eye (hardware area pass or
//!    the board's back-key value) and program it into every pin.
//! 2. DFE enabled, walk the sweep order. At each code and for each eye run
//!    the two-step PI-offset pass (collect with a per-pin tag, then select)
//!    and store every pin's area and centred VREF.
//! 3. Optionally smooth along the DFE axis.
//! 4. Per pin, reject a fully closed eye and pick the min-max slot; add the
//!    pick to the accumulator.

use embedded_hal::delay::DelayNs;
use gddr_platform::fault::TrainingStage;
use gddr_platform::{fbpa, Eye, FatalFault, PinClassId, RegisterBus, TrainingDirection};

use crate::pins::{Pin, PinClass};

use super::commit;
use super::engine::{Engine, PassCommand};
use super::sweep::SweepOrder;
use super::{DirectionParams, TrainingConfig, TrainingWorkspace};

pub(super) fn vref_stage(direction: TrainingDirection) -> TrainingStage {
    match direction {
        TrainingDirection::Read => TrainingStage::ReadVref,
        TrainingDirection::Write => TrainingStage::WriteVref,
    }
}

pub(super) fn sweep_stage(direction: TrainingDirection) -> TrainingStage {
    match direction {
        TrainingDirection::Read => TrainingStage::ReadSweep,
        TrainingDirection::Write => TrainingStage::WriteSweep,
    }
}

/// Run every averaging loop for class `C` in `direction`, leaving the sums in
/// the workspace accumulator.
pub(super) fn run<B, D, C>(
    engine: &mut Engine<'_, B, D>,
    config: &TrainingConfig,
    ws: &mut TrainingWorkspace,
    direction: TrainingDirection,
) -> Result<(), FatalFault>
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
    C: PinClass,
{
    let params = config.direction(direction);
    let eyes = config.eyes();
    ws.accum.clear();
    for iteration in 0..config.averaging_loops {
        fb_debug!("{} {} loop {}", direction, C::ID, iteration);
        ws.tables.reset(params.dfe.points());
        initial_vref::<B, D, C>(engine, config, ws, params)?;
        engine.enable_dfe(direction, true)?;
        sweep::<B, D, C>(engine, config, ws, params)?;
        if config.moving_average {
            ws.tables.smooth(eyes, Pin::<C>::enabled(config.partition_mask));
        }
        for pin in Pin::<C>::enabled(config.partition_mask) {
            ws.tables
                .check_open(direction, eyes, pin)
                .inspect_err(|fault| fb_error!("{}", fault))?;
            let pick = ws.tables.select(eyes, pin);
            let code = SweepOrder::code_of(&params.dfe, pick.slot);
            ws.accum.add(pin, code, &pick.vref);
        }
        ws.accum.end_loop();
    }
    Ok(())
}

/// Capture and program the initial VREF of every pin with DFE bypassed.
pub(super) fn initial_vref<B, D, C>(
    engine: &mut Engine<'_, B, D>,
    config: &TrainingConfig,
    ws: &mut TrainingWorkspace,
    params: &DirectionParams,
) -> Result<(), FatalFault>
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
    C: PinClass,
{
    let direction = params.direction;
    engine.enable_dfe(direction, false)?;
    engine.configure_vref_sweep(&params.vref);
    for &eye in config.eyes() {
        let back_key = params.vref.clamp(i32::from(
            params.back_key_vref.get(eye.index()).copied().unwrap_or(0),
        ));
        let mut measured = false;
        if config.area_based_initial_vref {
            engine.select_eye(eye);
            let opcode = engine.opcodes().vref_area;
            measured = area_pass(engine, opcode, vref_stage(direction), direction, C::ID, eye);
        }
        let Some(table) = ws.initial_vref.get_mut(eye.index()) else {
            continue;
        };
        for pin in Pin::<C>::enabled(config.partition_mask) {
            let vref = if measured {
                params.vref.clamp(i32::from(engine.read_vref(pin, eye)))
            } else {
                back_key
            };
            table.set(pin, vref);
            commit::program_vref(engine, direction, pin, eye, vref)?;
        }
    }
    Ok(())
}

/// Collect-then-select pair of a tolerated two-step pass. Returns whether
/// both steps completed.
pub(super) fn area_pass<B, D>(
    engine: &mut Engine<'_, B, D>,
    opcode: u32,
    stage: TrainingStage,
    direction: TrainingDirection,
    class: PinClassId,
    eye: Eye,
) -> bool
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
{
    let mut cmd = PassCommand {
        opcode,
        stage,
        direction,
        class,
        eye,
        pass: fbpa::PASS_AREA_COLLECT,
    };
    let collected = engine.tolerate(&cmd);
    cmd.pass = fbpa::PASS_SELECT;
    engine.tolerate(&cmd) && collected
}

fn sweep<B, D, C>(
    engine: &mut Engine<'_, B, D>,
    config: &TrainingConfig,
    ws: &mut TrainingWorkspace,
    params: &DirectionParams,
) -> Result<(), FatalFault>
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
    C: PinClass,
{
    let direction = params.direction;
    let eyes = config.eyes();
    let opcode = engine.opcodes().pi_offset;
    let mut reprogrammed = false;
    for point in SweepOrder::new(params.dfe, params.dfe_start) {
        fb_debug!("{} dfe {} slot {}", direction, point.code, point.slot);
        if point.revisit {
            for &eye in eyes {
                for pin in Pin::<C>::enabled(config.partition_mask) {
                    let vref = ws.tables.vref(eye, point.slot, pin);
                    commit::program_vref(engine, direction, pin, eye, vref)?;
                }
            }
            reprogrammed = true;
        } else if reprogrammed {
            restore_initial_vref::<B, D, C>(engine, config, ws, direction)?;
            reprogrammed = false;
        }
        engine.set_dfe(direction, point.code)?;
        let tag = u8::try_from(point.slot).unwrap_or(u8::MAX);
        for &eye in eyes {
            engine.select_eye(eye);
            engine.configure_pi_sweep(&params.pi);
            for pin in Pin::<C>::enabled(config.partition_mask) {
                engine.write_tag(pin, tag);
            }
            area_pass(engine, opcode, sweep_stage(direction), direction, C::ID, eye);
            for pin in Pin::<C>::enabled(config.partition_mask) {
                let (area, vref) = engine.read_result(pin, eye);
                ws.tables.record(eye, point.slot, pin, area, vref, point.revisit);
            }
        }
    }
    Ok(())
}

fn restore_initial_vref<B, D, C>(
    engine: &mut Engine<'_, B, D>,
    config: &TrainingConfig,
    ws: &TrainingWorkspace,
    direction: TrainingDirection,
) -> Result<(), FatalFault>
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
    C: PinClass,
{
    for &eye in config.eyes() {
        let Some(table) = ws.initial_vref.get(eye.index()) else {
            continue;
        };
        for pin in Pin::<C>::enabled(config.partition_mask) {
            commit::program_vref(engine, direction, pin, eye, table.get(pin).unwrap_or(0))?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pins::{Dq, DqPin};
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use gddr_platform::mocks::fixtures::reference_board;
    use gddr_platform::mocks::SimulatedFb;
    use gddr_platform::ChipGeneration;

    fn config(generation: ChipGeneration) -> TrainingConfig {
        TrainingConfig::from_board(&reference_board(generation), 0x01).unwrap()
    }

    #[test]
    fn default_profile_selects_dfe_two_every_loop() {
        let cfg = config(ChipGeneration::Gddr6x);
        let mut ws = Box::new(TrainingWorkspace::new());
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6x);
        let mut delay = NoopDelay::new();
        let mut engine = Engine::new(&mut sim, &mut delay, ChipGeneration::Gddr6x);
        run::<_, _, Dq>(&mut engine, &cfg, &mut ws, TrainingDirection::Read).unwrap();
        assert_eq!(ws.accum.loops(), 4);
        let pin = DqPin::from_flat(5).unwrap();
        let fin = ws.accum.finalize(pin, cfg.eyes(), &cfg.read.dfe, &cfg.read.vref, 0, 0);
        assert_eq!(fin.dfe, 2);
        assert_eq!(fin.vref, [0x40, 0x48, 0x50]);
    }

    #[test]
    fn sweep_visits_start_twice_per_eye() {
        let cfg = config(ChipGeneration::Gddr6);
        let mut ws = Box::new(TrainingWorkspace::new());
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6);
        let mut delay = NoopDelay::new();
        {
            let mut engine = Engine::new(&mut sim, &mut delay, ChipGeneration::Gddr6);
            sweep::<_, _, Dq>(&mut engine, &cfg, &mut ws, &cfg.read).unwrap();
        }
        let pi = ChipGeneration::Gddr6.opcodes().pi_offset;
        let selects = sim
            .passes()
            .iter()
            .filter(|p| p.opcode == pi && p.pass == fbpa::PASS_SELECT)
            .count();
        assert_eq!(selects, SweepOrder::len(&cfg.read.dfe));
    }

    #[test]
    fn closed_eye_is_fatal_with_eye_identity() {
        let cfg = config(ChipGeneration::Gddr6x);
        let mut ws = Box::new(TrainingWorkspace::new());
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6x).with_area_profile(|q| {
            if q.pin == 3 && q.eye == Eye::Mid {
                0
            } else {
                50
            }
        });
        let mut delay = NoopDelay::new();
        let mut engine = Engine::new(&mut sim, &mut delay, ChipGeneration::Gddr6x);
        let err = run::<_, _, Dq>(&mut engine, &cfg, &mut ws, TrainingDirection::Read).unwrap_err();
        assert_eq!(
            err,
            FatalFault::ZeroArea {
                direction: TrainingDirection::Read,
                class: PinClassId::Dq,
                pin: 3,
                eye: Eye::Mid,
            }
        );
    }

    #[test]
    fn failed_area_pass_falls_back_to_back_key() {
        let cfg = config(ChipGeneration::Gddr6);
        let mut ws = Box::new(TrainingWorkspace::new());
        let generation = ChipGeneration::Gddr6;
        let mut sim = SimulatedFb::new(generation)
            .failing_opcode(generation.opcodes().vref_area)
            .with_vref_profile(|_| 0x22);
        let mut delay = NoopDelay::new();
        let mut engine = Engine::new(&mut sim, &mut delay, generation);
        initial_vref::<_, _, Dq>(&mut engine, &cfg, &mut ws, &cfg.read).unwrap();
        let pin = DqPin::from_flat(0).unwrap();
        assert_eq!(ws.initial_vref[0].get(pin), Some(cfg.read.back_key_vref[0]));
    }

    #[test]
    fn area_based_initial_vref_programs_measured_value() {
        let cfg = config(ChipGeneration::Gddr6);
        let mut ws = Box::new(TrainingWorkspace::new());
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6).with_vref_profile(|q| 0x30 | u8::try_from(q.pin & 3).unwrap());
        let mut delay = NoopDelay::new();
        {
            let mut engine = Engine::new(&mut sim, &mut delay, ChipGeneration::Gddr6);
            initial_vref::<_, _, Dq>(&mut engine, &cfg, &mut ws, &cfg.read).unwrap();
        }
        assert_eq!(
            sim.pin_vref(fbpa::PIN_TARGET_CONTROLLER, PinClassId::Dq, 6, Eye::Low),
            Some(0x32)
        );
    }
}
