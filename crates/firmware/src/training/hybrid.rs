//! Tag-register DFE search.
//!
//! The engine keeps, per pin, the best area seen since the last reset and the
//! tag that was loaded when it was measured. Loading the DFE code as the tag
//! before each pass makes the hardware select the per-pin DFE; no software
//! area tables are involved. NRZ only.

use embedded_hal::delay::DelayNs;
use gddr_platform::fault::TrainingStage;
use gddr_platform::{fbpa, Eye, FatalFault, RegisterBus, TrainingDirection};

use crate::pins::{Pin, PinClass};

use super::engine::{Engine, PassCommand};
use super::search::initial_vref;
use super::sweep::SweepOrder;
use super::{TrainingConfig, TrainingWorkspace};

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
    let cmd = PassCommand {
        opcode: engine.opcodes().hybrid,
        stage: TrainingStage::Hybrid,
        direction,
        class: C::ID,
        eye: Eye::Low,
        pass: fbpa::PASS_SINGLE,
    };
    ws.accum.clear();
    for iteration in 0..config.averaging_loops {
        fb_debug!("{} {} hybrid loop {}", direction, C::ID, iteration);
        initial_vref::<B, D, C>(engine, config, ws, params)?;
        engine.enable_dfe(direction, true)?;
        engine.select_eye(Eye::Low);
        engine.configure_pi_sweep(&params.pi);
        engine.hybrid_reset();
        for point in SweepOrder::new(params.dfe, params.dfe_start).filter(|p| !p.revisit) {
            engine.set_dfe(direction, point.code)?;
            engine.hybrid_tag(point.code);
            engine
                .require(&cmd)
                .inspect_err(|fault| fb_error!("{}", fault))?;
        }
        for pin in Pin::<C>::enabled(config.partition_mask) {
            let (area, vref) = engine.read_result(pin, Eye::Low);
            if area <= 0 {
                let fault = FatalFault::ZeroArea {
                    direction,
                    class: C::ID,
                    pin: pin.raw(),
                    eye: Eye::Low,
                };
                fb_error!("{}", fault);
                return Err(fault);
            }
            let dfe = params.dfe.clamp(i32::from(engine.read_tag(pin)));
            ws.accum.add(pin, dfe, &[vref, 0, 0]);
        }
        ws.accum.end_loop();
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
    use gddr_platform::{ChipGeneration, PinClassId};

    fn hybrid_config() -> TrainingConfig {
        let mut board = reference_board(ChipGeneration::Gddr6);
        board.training.hybrid = true;
        TrainingConfig::from_board(&board, 0x01).unwrap()
    }

    #[test]
    fn tag_register_picks_per_pin_peak() {
        let cfg = hybrid_config();
        let mut ws = Box::new(TrainingWorkspace::new());
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6).with_area_profile(|q| {
            let peak = if q.pin % 2 == 0 { 1 } else { 5 };
            100 - 10 * (i16::from(q.dfe) - peak).abs()
        });
        let mut delay = NoopDelay::new();
        let mut engine = Engine::new(&mut sim, &mut delay, ChipGeneration::Gddr6);
        run::<_, _, Dq>(&mut engine, &cfg, &mut ws, TrainingDirection::Read).unwrap();
        let even = DqPin::from_flat(0).unwrap();
        let odd = DqPin::from_flat(1).unwrap();
        let fin_even = ws.accum.finalize(even, cfg.eyes(), &cfg.read.dfe, &cfg.read.vref, 0, 0);
        let fin_odd = ws.accum.finalize(odd, cfg.eyes(), &cfg.read.dfe, &cfg.read.vref, 0, 0);
        assert_eq!(fin_even.dfe, 1);
        assert_eq!(fin_odd.dfe, 5);
    }

    #[test]
    fn hybrid_pass_failure_is_fatal() {
        let cfg = hybrid_config();
        let mut ws = Box::new(TrainingWorkspace::new());
        let opcode = ChipGeneration::Gddr6.opcodes().hybrid;
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6).hung_opcode(opcode);
        let mut delay = NoopDelay::new();
        let mut engine = Engine::new(&mut sim, &mut delay, ChipGeneration::Gddr6);
        assert_eq!(
            run::<_, _, Dq>(&mut engine, &cfg, &mut ws, TrainingDirection::Read),
            Err(FatalFault::TrainingTimeout {
                stage: TrainingStage::Hybrid
            })
        );
    }

    #[test]
    fn closed_pin_is_fatal() {
        let cfg = hybrid_config();
        let mut ws = Box::new(TrainingWorkspace::new());
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6)
            .with_area_profile(|q| if q.pin == 9 { 0 } else { 40 });
        let mut delay = NoopDelay::new();
        let mut engine = Engine::new(&mut sim, &mut delay, ChipGeneration::Gddr6);
        assert!(matches!(
            run::<_, _, Dq>(&mut engine, &cfg, &mut ws, TrainingDirection::Write),
            Err(FatalFault::ZeroArea {
                class: PinClassId::Dq,
                pin: 9,
                ..
            })
        ));
    }
}
