//! Hardware training-engine primitives.
//!
//! Thin, stateless wrappers over the training registers. Each pass is
//! launched with a single command write and completion is polled with a
//! bounded budget. Whether a failed pass is fatal is the caller's decision:
//! [`Engine::require`] maps failures to [`FatalFault`], [`Engine::tolerate`]
//! logs and continues.

use embedded_hal::delay::DelayNs;
use gddr_platform::board::{PiSweep, SweepRange};
use gddr_platform::fault::TrainingStage;
use gddr_platform::fbpa::{self, ModeRegisterMap, TrainingOpcodes};
use gddr_platform::poll::{poll_until, TRAINING_PASS};
use gddr_platform::{ChipGeneration, Eye, FatalFault, PinClassId, RegisterBus, SignalingMode, TrainingDirection};

use crate::mrs;
use crate::pins::{Pin, PinClass};

/// One training-engine launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassCommand {
    /// Opcode.
    pub opcode: u32,
    /// Stage for fault reporting.
    pub stage: TrainingStage,
    /// Direction.
    pub direction: TrainingDirection,
    /// Pin namespace.
    pub class: PinClassId,
    /// Eye under measurement.
    pub eye: Eye,
    /// Pass step.
    pub pass: u32,
}

impl PassCommand {
    fn word(&self) -> u32 {
        fbpa::TRNG_CMD_OPCODE.encode(self.opcode)
            | fbpa::TRNG_CMD_EYE.encode(self.eye as u32)
            | fbpa::TRNG_CMD_DIRECTION.encode(self.direction as u32)
            | fbpa::TRNG_CMD_PASS.encode(self.pass)
            | fbpa::TRNG_CMD_PIN_CLASS.encode(self.class as u32)
            | fbpa::TRNG_CMD_START.encode(1)
    }
}

/// Why a pass did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassFailure {
    /// Done never set.
    Timeout,
    /// Done with the error bit; engine status code attached.
    Error(u32),
}

/// Training-engine access for one generation.
pub struct Engine<'a, B: ?Sized, D: ?Sized> {
    bus: &'a mut B,
    delay: &'a mut D,
    opcodes: &'static TrainingOpcodes,
    mode_registers: &'static ModeRegisterMap,
    signaling: SignalingMode,
}

impl<'a, B, D> Engine<'a, B, D>
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
{
    /// Engine over `bus` for `generation`.
    pub fn new(bus: &'a mut B, delay: &'a mut D, generation: ChipGeneration) -> Self {
        Self {
            bus,
            delay,
            opcodes: generation.opcodes(),
            mode_registers: generation.mode_registers(),
            signaling: generation.signaling(),
        }
    }

    /// Opcode table.
    pub fn opcodes(&self) -> &'static TrainingOpcodes {
        self.opcodes
    }

    /// Mode-register numbers.
    pub fn mode_registers(&self) -> &'static ModeRegisterMap {
        self.mode_registers
    }

    /// Signaling in use.
    pub fn signaling(&self) -> SignalingMode {
        self.signaling
    }

    /// Underlying bus, for sequencing outside the engine.
    pub fn bus(&mut self) -> &mut B {
        self.bus
    }

    /// Launch a pass and wait for it.
    pub fn launch(&mut self, cmd: &PassCommand) -> Result<(), PassFailure> {
        self.bus.write(fbpa::TRNG_CMD, cmd.word());
        let bus = &mut *self.bus;
        poll_until(&mut *self.delay, TRAINING_PASS, || {
            bus.read_field(fbpa::TRNG_STATUS, fbpa::TRNG_STATUS_DONE) == 1
        })
        .map_err(|_| PassFailure::Timeout)?;
        let status = self.bus.read(fbpa::TRNG_STATUS);
        if fbpa::TRNG_STATUS_ERROR.extract(status) == 1 {
            return Err(PassFailure::Error(fbpa::TRNG_STATUS_CODE.extract(status)));
        }
        Ok(())
    }

    /// Launch a pass whose failure is fatal.
    pub fn require(&mut self, cmd: &PassCommand) -> Result<(), FatalFault> {
        self.launch(cmd).map_err(|failure| match failure {
            PassFailure::Timeout => FatalFault::TrainingTimeout { stage: cmd.stage },
            PassFailure::Error(status) => FatalFault::TrainingError {
                stage: cmd.stage,
                status,
            },
        })
    }

    /// Launch a pass whose failure only shows up in the measured results.
    /// Returns whether it succeeded.
    pub fn tolerate(&mut self, cmd: &PassCommand) -> bool {
        match self.launch(cmd) {
            Ok(()) => true,
            Err(PassFailure::Timeout) => {
                fb_warn!("{} pass timed out on {} eye, continuing", cmd.stage, cmd.eye);
                false
            }
            Err(PassFailure::Error(code)) => {
                fb_warn!("{} pass error {} on {} eye, continuing", cmd.stage, code, cmd.eye);
                false
            }
        }
    }

    /// Apply `code` as the DFE for every pin of `direction`.
    pub fn set_dfe(&mut self, direction: TrainingDirection, code: u8) -> Result<(), FatalFault> {
        match direction {
            TrainingDirection::Read => {
                self.bus
                    .modify(fbpa::TRNG_DFE, fbpa::TRNG_DFE_CODE, u32::from(code));
                Ok(())
            }
            TrainingDirection::Write => {
                mrs::broadcast(&mut *self.bus, &mut *self.delay, self.mode_registers.dfe, u16::from(code))
            }
        }
    }

    /// Enable or bypass the receiver DFE of `direction`.
    ///
    /// Disabling the write direction programs DFE code zero into the DRAM.
    pub fn enable_dfe(&mut self, direction: TrainingDirection, enable: bool) -> Result<(), FatalFault> {
        match direction {
            TrainingDirection::Read => {
                self.bus
                    .modify(fbpa::TRNG_DFE, fbpa::TRNG_DFE_ENABLE, u32::from(enable));
                Ok(())
            }
            TrainingDirection::Write if !enable => self.set_dfe(direction, 0),
            TrainingDirection::Write => Ok(()),
        }
    }

    /// Restrict the next pass to `eye`.
    pub fn select_eye(&mut self, eye: Eye) {
        self.bus.write(
            fbpa::TRNG_EYE_MASK,
            fbpa::TRNG_EYE_MASK_BITS.encode(1u32.wrapping_shl(eye.index() as u32)),
        );
    }

    /// Program the VREF sweep window.
    pub fn configure_vref_sweep(&mut self, range: &SweepRange) {
        self.bus.write(
            fbpa::TRNG_VREF_SWEEP,
            fbpa::TRNG_VREF_SWEEP_MIN.encode(u32::from(range.min))
                | fbpa::TRNG_VREF_SWEEP_MAX.encode(u32::from(range.max))
                | fbpa::TRNG_VREF_SWEEP_STEP.encode(u32::from(range.step)),
        );
    }

    /// Program the PI-offset sweep window.
    pub fn configure_pi_sweep(&mut self, pi: &PiSweep) {
        self.bus.write(
            fbpa::TRNG_PI_SWEEP,
            fbpa::TRNG_PI_SWEEP_MIN.encode(u32::from(pi.offset.min))
                | fbpa::TRNG_PI_SWEEP_MAX.encode(u32::from(pi.offset.max))
                | fbpa::TRNG_PI_SWEEP_COARSE.encode(u32::from(pi.coarse_step))
                | fbpa::TRNG_PI_SWEEP_FINE.encode(u32::from(pi.fine_step)),
        );
    }

    fn select_result<C: PinClass>(&mut self, pin: Pin<C>, eye: Eye) {
        self.bus.write(
            fbpa::TRNG_RESULT_SELECT,
            fbpa::TRNG_RESULT_SELECT_PIN.encode(u32::from(pin.raw()))
                | fbpa::TRNG_RESULT_SELECT_EYE.encode(eye as u32)
                | fbpa::TRNG_RESULT_SELECT_CLASS.encode(C::ID as u32),
        );
    }

    /// Attach `tag` to `pin` for the next area collection.
    pub fn write_tag<C: PinClass>(&mut self, pin: Pin<C>, tag: u8) {
        self.select_result(pin, Eye::Low);
        self.bus
            .write(fbpa::TRNG_PIN_TAG, fbpa::TRNG_PIN_TAG_VALUE.encode(u32::from(tag)));
    }

    /// Area and VREF measured for `pin` on `eye`.
    pub fn read_result<C: PinClass>(&mut self, pin: Pin<C>, eye: Eye) -> (i16, u8) {
        self.select_result(pin, eye);
        let raw_area = self
            .bus
            .read_field(fbpa::TRNG_RESULT_AREA, fbpa::TRNG_RESULT_AREA_VALUE);
        let raw_vref = self
            .bus
            .read_field(fbpa::TRNG_RESULT_VREF, fbpa::TRNG_RESULT_VREF_VALUE);
        #[allow(clippy::cast_possible_wrap)] // 16-bit two's-complement area field
        let area = raw_area as u16 as i16;
        (area, u8::try_from(raw_vref).unwrap_or(u8::MAX))
    }

    /// VREF centred for `pin` on `eye` by the last pass.
    pub fn read_vref<C: PinClass>(&mut self, pin: Pin<C>, eye: Eye) -> u8 {
        self.select_result(pin, eye);
        let raw = self
            .bus
            .read_field(fbpa::TRNG_RESULT_VREF, fbpa::TRNG_RESULT_VREF_VALUE);
        u8::try_from(raw).unwrap_or(u8::MAX)
    }

    /// Tag latched for `pin` (hybrid: winning DFE code).
    pub fn read_tag<C: PinClass>(&mut self, pin: Pin<C>) -> u8 {
        self.select_result(pin, Eye::Low);
        let raw = self
            .bus
            .read_field(fbpa::TRNG_RESULT_TAG, fbpa::TRNG_RESULT_TAG_VALUE);
        u8::try_from(raw).unwrap_or(u8::MAX)
    }

    fn select_pin_prog<C: PinClass>(&mut self, target: u32, pin: Pin<C>, eye: Eye) {
        self.bus.write(
            fbpa::PIN_PROG_SELECT,
            fbpa::PIN_PROG_SELECT_PIN.encode(u32::from(pin.raw()))
                | fbpa::PIN_PROG_SELECT_EYE.encode(eye as u32)
                | fbpa::PIN_PROG_SELECT_CLASS.encode(C::ID as u32)
                | fbpa::PIN_PROG_SELECT_TARGET.encode(target),
        );
    }

    /// Program one pin's VREF through the per-pin registers.
    pub fn program_pin_vref<C: PinClass>(&mut self, target: u32, pin: Pin<C>, eye: Eye, vref: u8) {
        self.select_pin_prog(target, pin, eye);
        self.bus
            .write(fbpa::PIN_VREF, fbpa::PIN_VREF_VALUE.encode(u32::from(vref)));
    }

    /// Program one pin's DFE through the per-pin registers.
    pub fn program_pin_dfe<C: PinClass>(&mut self, target: u32, pin: Pin<C>, dfe: u8) {
        self.select_pin_prog(target, pin, Eye::Low);
        self.bus
            .write(fbpa::PIN_DFE, fbpa::PIN_DFE_VALUE.encode(u32::from(dfe)));
    }

    /// Per-pin mode-register write.
    pub fn pin_mode_register<C: PinClass>(&mut self, mr: u8, pin: Pin<C>, data: u16) -> Result<(), FatalFault> {
        mrs::mode_register_set(&mut *self.bus, &mut *self.delay, mr, data, Some(pin))
    }

    /// Broadcast mode-register write.
    pub fn broadcast_mode_register(&mut self, mr: u8, data: u16) -> Result<(), FatalFault> {
        mrs::broadcast(&mut *self.bus, &mut *self.delay, mr, data)
    }

    /// Controller-side mirror of mode register `mr`.
    pub fn mode_register_mirror(&mut self, mr: u8) -> u16 {
        let raw = self.bus.read(fbpa::MR_MIRROR_BASE.offset(u32::from(mr)));
        u16::try_from(fbpa::MRS_CMD_DATA.max_value() & raw).unwrap_or(0)
    }

    /// Clear the hybrid best-area trackers.
    pub fn hybrid_reset(&mut self) {
        self.bus
            .write(fbpa::TRNG_HYBRID, fbpa::TRNG_HYBRID_RESET.encode(1));
    }

    /// Tag latched by hybrid passes that beat their pin's best area.
    pub fn hybrid_tag(&mut self, tag: u8) {
        self.bus
            .write(fbpa::TRNG_HYBRID, fbpa::TRNG_HYBRID_TAG.encode(u32::from(tag)));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pins::DqPin;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use gddr_platform::mocks::SimulatedFb;

    fn cmd(opcode: u32) -> PassCommand {
        PassCommand {
            opcode,
            stage: TrainingStage::Address,
            direction: TrainingDirection::Read,
            class: PinClassId::Dq,
            eye: Eye::Low,
            pass: fbpa::PASS_SINGLE,
        }
    }

    #[test]
    fn require_maps_timeout_to_stage() {
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6).hung_opcode(0x01);
        let mut delay = NoopDelay::new();
        let mut engine = Engine::new(&mut sim, &mut delay, ChipGeneration::Gddr6);
        assert_eq!(
            engine.require(&cmd(0x01)),
            Err(FatalFault::TrainingTimeout {
                stage: TrainingStage::Address
            })
        );
    }

    #[test]
    fn require_maps_error_bit_with_status() {
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6).failing_opcode(0x01);
        let mut delay = NoopDelay::new();
        let mut engine = Engine::new(&mut sim, &mut delay, ChipGeneration::Gddr6);
        assert!(matches!(
            engine.require(&cmd(0x01)),
            Err(FatalFault::TrainingError {
                stage: TrainingStage::Address,
                status: 0x5A
            })
        ));
    }

    #[test]
    fn tolerate_reports_failure_without_fault() {
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6).failing_opcode(0x05);
        let mut delay = NoopDelay::new();
        let mut engine = Engine::new(&mut sim, &mut delay, ChipGeneration::Gddr6);
        assert!(!engine.tolerate(&cmd(0x05)));
        assert!(engine.tolerate(&cmd(0x04)));
    }

    #[test]
    fn read_result_sign_extends_area() {
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6).with_area_profile(|_| -12);
        let mut delay = NoopDelay::new();
        let mut engine = Engine::new(&mut sim, &mut delay, ChipGeneration::Gddr6);
        engine.launch(&cmd(0x05)).unwrap();
        let (area, vref) = engine.read_result(DqPin::from_flat(4).unwrap(), Eye::Low);
        assert_eq!(area, -12);
        assert_eq!(vref, 0x40);
    }

    #[test]
    fn pin_programming_reaches_selected_pin() {
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6x);
        let mut delay = NoopDelay::new();
        let mut engine = Engine::new(&mut sim, &mut delay, ChipGeneration::Gddr6x);
        let pin = DqPin::from_flat(100).unwrap();
        engine.program_pin_vref(fbpa::PIN_TARGET_DRAM, pin, Eye::High, 0x55);
        engine.program_pin_dfe(fbpa::PIN_TARGET_DRAM, pin, 3);
        assert_eq!(
            sim.pin_vref(fbpa::PIN_TARGET_DRAM, PinClassId::Dq, 100, Eye::High),
            Some(0x55)
        );
        assert_eq!(sim.pin_dfe(fbpa::PIN_TARGET_DRAM, PinClassId::Dq, 100), Some(3));
    }

    #[test]
    fn write_dfe_goes_through_mode_register() {
        let mut sim = SimulatedFb::new(ChipGeneration::Gddr6);
        let mut delay = NoopDelay::new();
        let mut engine = Engine::new(&mut sim, &mut delay, ChipGeneration::Gddr6);
        engine.set_dfe(TrainingDirection::Write, 4).unwrap();
        let mr = ChipGeneration::Gddr6.mode_registers().dfe;
        assert_eq!(sim.mrs_log().last().map(|w| (w.mr, w.data)), Some((mr, 4)));
    }
}
