//! Programming trained values into the link.
//!
//! | Direction | Signaling | VREF / DFE destination                      |
//! |-----------|-----------|---------------------------------------------|
//! | read      | any       | controller per-pin registers                |
//! | write     | PAM4      | DRAM per-pin registers via `PIN_PROG`       |
//! | write     | NRZ       | DRAM mode registers, per-pin MRS            |

use embedded_hal::delay::DelayNs;
use gddr_platform::{fbpa, Eye, FatalFault, RegisterBus, SignalingMode, TrainingDirection};

use crate::pins::{Pin, PinClass};

use super::engine::Engine;
use super::{TrainingConfig, TrainingWorkspace};

/// Program one pin's VREF for `eye`.
pub(super) fn program_vref<B, D, C>(
    engine: &mut Engine<'_, B, D>,
    direction: TrainingDirection,
    pin: Pin<C>,
    eye: Eye,
    vref: u8,
) -> Result<(), FatalFault>
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
    C: PinClass,
{
    match (direction, engine.signaling()) {
        (TrainingDirection::Read, _) => {
            engine.program_pin_vref(fbpa::PIN_TARGET_CONTROLLER, pin, eye, vref);
            Ok(())
        }
        (TrainingDirection::Write, SignalingMode::Pam4) => {
            engine.program_pin_vref(fbpa::PIN_TARGET_DRAM, pin, eye, vref);
            Ok(())
        }
        (TrainingDirection::Write, SignalingMode::Nrz) => {
            let mr = engine.mode_registers().vrefd;
            engine.pin_mode_register(mr, pin, u16::from(vref))
        }
    }
}

/// Program one pin's DFE code.
pub(super) fn program_dfe<B, D, C>(
    engine: &mut Engine<'_, B, D>,
    direction: TrainingDirection,
    pin: Pin<C>,
    dfe: u8,
) -> Result<(), FatalFault>
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
    C: PinClass,
{
    match (direction, engine.signaling()) {
        (TrainingDirection::Read, _) => {
            engine.program_pin_dfe(fbpa::PIN_TARGET_CONTROLLER, pin, dfe);
            Ok(())
        }
        (TrainingDirection::Write, SignalingMode::Pam4) => {
            engine.program_pin_dfe(fbpa::PIN_TARGET_DRAM, pin, dfe);
            Ok(())
        }
        (TrainingDirection::Write, SignalingMode::Nrz) => {
            let mr = engine.mode_registers().dfe;
            engine.pin_mode_register(mr, pin, u16::from(dfe))
        }
    }
}

/// Average the accumulated picks, add the board offsets and program every
/// enabled pin of class `C`.
pub(super) fn apply<B, D, C>(
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
    let params = config.direction(direction);
    let eyes = config.eyes();
    for pin in Pin::<C>::enabled(config.partition_mask) {
        let value = ws.accum.finalize(
            pin,
            eyes,
            &params.dfe,
            &params.vref,
            params.dfe_offset,
            params.vref_offset,
        );
        program_dfe(engine, direction, pin, value.dfe)?;
        for &eye in eyes {
            let vref = value.vref.get(eye.index()).copied().unwrap_or(0);
            program_vref(engine, direction, pin, eye, vref)?;
        }
    }
    engine.enable_dfe(direction, true)
}

/// Mode-register values changed for DBI-class write training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SavedDbiModes {
    dbi_edc: u16,
    termination: u16,
}

/// Switch the DRAM to DBI-class training: DFE on the DBI/EDC receivers and
/// termination off.
pub(super) fn enter_dbi_training<B, D>(engine: &mut Engine<'_, B, D>) -> Result<SavedDbiModes, FatalFault>
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
{
    let map = engine.mode_registers();
    let saved = SavedDbiModes {
        dbi_edc: engine.mode_register_mirror(map.dbi_edc),
        termination: engine.mode_register_mirror(map.termination),
    };
    let dbi_edc = fbpa::MR_DBI_EDC_DFE.insert(u32::from(saved.dbi_edc), 1);
    let termination = fbpa::MR_TERMINATION_OFF.insert(u32::from(saved.termination), 1);
    engine.broadcast_mode_register(map.dbi_edc, u16::try_from(dbi_edc).unwrap_or(saved.dbi_edc))?;
    engine.broadcast_mode_register(
        map.termination,
        u16::try_from(termination).unwrap_or(saved.termination),
    )?;
    Ok(saved)
}

/// Restore the mode registers changed by [`enter_dbi_training`].
pub(super) fn leave_dbi_training<B, D>(engine: &mut Engine<'_, B, D>, saved: SavedDbiModes) -> Result<(), FatalFault>
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
{
    let map = engine.mode_registers();
    engine.broadcast_mode_register(map.termination, saved.termination)?;
    engine.broadcast_mode_register(map.dbi_edc, saved.dbi_edc)
}
