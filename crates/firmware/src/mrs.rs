//! Mode-register sequencer access.

use embedded_hal::delay::DelayNs;
use gddr_platform::fault::TrainingStage;
use gddr_platform::poll::{poll_until, MRS_IDLE};
use gddr_platform::{fbpa, FatalFault, RegisterBus};

use crate::pins::{Pin, PinClass};

/// Issue one mode-register-set command and wait for the sequencer.
///
/// `pin` selects a per-pin command; `None` broadcasts to every device.
pub fn mode_register_set<B, D, C>(
    bus: &mut B,
    delay: &mut D,
    mr: u8,
    data: u16,
    pin: Option<Pin<C>>,
) -> Result<(), FatalFault>
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
    C: PinClass,
{
    let mut cmd = fbpa::MRS_CMD_ADDR.encode(u32::from(mr))
        | fbpa::MRS_CMD_DATA.encode(u32::from(data))
        | fbpa::MRS_CMD_START.encode(1);
    if let Some(pin) = pin {
        cmd |= fbpa::MRS_CMD_PER_PIN.encode(1) | fbpa::MRS_CMD_PIN.encode(u32::from(pin.mrs_lane()));
    }
    bus.write(fbpa::MRS_CMD, cmd);
    poll_until(delay, MRS_IDLE, || {
        bus.read_field(fbpa::MRS_STATUS, fbpa::MRS_STATUS_BUSY) == 0
    })
    .map(|_| ())
    .map_err(|_| FatalFault::TrainingTimeout {
        stage: TrainingStage::ModeRegister,
    })
}

/// Broadcast variant of [`mode_register_set`].
pub fn broadcast<B, D>(bus: &mut B, delay: &mut D, mr: u8, data: u16) -> Result<(), FatalFault>
where
    B: RegisterBus + ?Sized,
    D: DelayNs + ?Sized,
{
    mode_register_set::<B, D, crate::pins::Dq>(bus, delay, mr, data, None)
}
