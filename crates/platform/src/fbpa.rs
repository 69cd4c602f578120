//! Frame-buffer partition (FBPA) register map.
//!
//! Addresses and bit fields for the memory controller blocks touched by the
//! training and clock-switch firmware. Everything is broadcast: a write lands
//! in every enabled partition, and per-pin accesses go through the indirect
//! select/data register pairs.
//!
//! Two register-compatible DRAM generations exist; they differ only in the
//! training-engine opcodes and the mode-register layout, selected through
//! [`ChipGeneration`].

use crate::regs::{Field, RegAddr};
use crate::types::SignalingMode;

// ── Pin geometry ─────────────────────────────────────────────────────────────

/// Frame-buffer partitions per chip.
pub const MAX_PARTITIONS: usize = 6;
/// Sub-partitions per partition.
pub const SUBPARTITIONS: usize = 2;
/// Byte lanes per sub-partition.
pub const BYTES_PER_SUBPARTITION: usize = 2;
/// Data pins per byte lane.
pub const DQ_PER_BYTE: usize = 8;
/// DBI/EDC pins per byte lane (one DBI, one EDC).
pub const DBI_PER_BYTE: usize = 2;
/// Total DQ pins; flat indices are `0..DQ_PIN_COUNT`.
pub const DQ_PIN_COUNT: usize = MAX_PARTITIONS * SUBPARTITIONS * BYTES_PER_SUBPARTITION * DQ_PER_BYTE;
/// Total DBI/EDC pins; flat indices are `0..DBI_PIN_COUNT`.
pub const DBI_PIN_COUNT: usize =
    MAX_PARTITIONS * SUBPARTITIONS * BYTES_PER_SUBPARTITION * DBI_PER_BYTE;

// ── Fence / mailbox ──────────────────────────────────────────────────────────

/// Write-drain fence. Any write completes once prior posted writes land.
pub const FENCE: RegAddr = RegAddr(0x0010_0000);

/// First of [`MAILBOX_COUNT`] host-visible scratch registers.
pub const MAILBOX_BASE: RegAddr = RegAddr(0x0010_0040);
/// Number of mailbox registers.
pub const MAILBOX_COUNT: u32 = 8;

// ── Frame-buffer control ─────────────────────────────────────────────────────

/// Frame-buffer traffic control.
pub const FB_CTRL: RegAddr = RegAddr(0x0010_0200);
/// Request the FB to stop accepting traffic and drain.
pub const FB_CTRL_STOP: Field = Field::bit(0);
/// Request the FB to resume traffic.
pub const FB_CTRL_START: Field = Field::bit(1);

/// Frame-buffer status.
pub const FB_STATUS: RegAddr = RegAddr(0x0010_0204);
/// FB drained and idle.
pub const FB_STATUS_IDLE: Field = Field::bit(0);
/// FB accepting traffic.
pub const FB_STATUS_RUNNING: Field = Field::bit(1);

/// DRAM self-refresh control.
pub const SELF_REFRESH_CTRL: RegAddr = RegAddr(0x0010_0208);
/// Enter self-refresh.
pub const SELF_REFRESH_ENTRY: Field = Field::bit(0);
/// Exit self-refresh.
pub const SELF_REFRESH_EXIT: Field = Field::bit(1);

/// DRAM self-refresh status.
pub const SELF_REFRESH_STATUS: RegAddr = RegAddr(0x0010_020C);
/// DRAM currently in self-refresh.
pub const SELF_REFRESH_STATUS_ACTIVE: Field = Field::bit(0);

/// Auto-refresh control.
pub const REFRESH_CTRL: RegAddr = RegAddr(0x0010_0210);
/// Auto-refresh enabled.
pub const REFRESH_CTRL_ENABLE: Field = Field::bit(0);
/// Refresh interval in controller clocks.
pub const REFRESH_CTRL_INTERVAL: Field = Field::new(4, 16);

/// Hardware periodic retraining.
pub const PERIODIC_TRAINING: RegAddr = RegAddr(0x0010_0214);
/// Periodic retraining enabled.
pub const PERIODIC_TRAINING_ENABLE: Field = Field::bit(0);

/// Enabled-partition mask (read-only, fused).
pub const PARTITION_MASK: RegAddr = RegAddr(0x0010_0218);
/// One bit per frame-buffer partition.
pub const PARTITION_MASK_BITS: Field = Field::new(0, 8);

/// First of [`TIMING_COUNT`] DRAM timing configuration registers.
pub const TIMING_BASE: RegAddr = RegAddr(0x0010_0300);
/// Number of timing configuration registers.
pub const TIMING_COUNT: u32 = 12;

/// First of [`MODE_REGISTER_COUNT`] controller-side mode-register mirrors.
pub const MR_MIRROR_BASE: RegAddr = RegAddr(0x0010_0340);
/// Number of DRAM mode registers.
pub const MODE_REGISTER_COUNT: u32 = 16;

// ── Training engine ──────────────────────────────────────────────────────────

/// Training command. Writing with [`TRNG_CMD_START`] set launches a pass.
pub const TRNG_CMD: RegAddr = RegAddr(0x0010_0400);
/// Opcode, see [`TrainingOpcodes`].
pub const TRNG_CMD_OPCODE: Field = Field::new(0, 6);
/// Eye under measurement (multi-level only).
pub const TRNG_CMD_EYE: Field = Field::new(8, 2);
/// 0 = read, 1 = write.
pub const TRNG_CMD_DIRECTION: Field = Field::bit(12);
/// Pass step, see [`PASS_SINGLE`], [`PASS_AREA_COLLECT`], [`PASS_SELECT`].
pub const TRNG_CMD_PASS: Field = Field::new(13, 2);
/// 0 = DQ, 1 = DBI/EDC.
pub const TRNG_CMD_PIN_CLASS: Field = Field::bit(16);
/// Launch bit. Self-clearing.
pub const TRNG_CMD_START: Field = Field::bit(31);

/// One-shot pass.
pub const PASS_SINGLE: u32 = 0;
/// Area-based step 1: collect eye area under the programmed tags.
pub const PASS_AREA_COLLECT: u32 = 1;
/// Area-based step 2: select the centre of the collected area.
pub const PASS_SELECT: u32 = 2;

/// Training status.
pub const TRNG_STATUS: RegAddr = RegAddr(0x0010_0404);
/// Pass finished.
pub const TRNG_STATUS_DONE: Field = Field::bit(0);
/// Pass finished with an error.
pub const TRNG_STATUS_ERROR: Field = Field::bit(1);
/// Engine-specific error code.
pub const TRNG_STATUS_CODE: Field = Field::new(8, 8);

/// Equalization (DFE) under training.
pub const TRNG_DFE: RegAddr = RegAddr(0x0010_0408);
/// DFE code applied to all pins during the next pass.
pub const TRNG_DFE_CODE: Field = Field::new(0, 5);
/// Receiver DFE enable.
pub const TRNG_DFE_ENABLE: Field = Field::bit(8);

/// VREF sweep window.
pub const TRNG_VREF_SWEEP: RegAddr = RegAddr(0x0010_040C);
/// Lowest VREF code swept.
pub const TRNG_VREF_SWEEP_MIN: Field = Field::new(0, 8);
/// Highest VREF code swept.
pub const TRNG_VREF_SWEEP_MAX: Field = Field::new(8, 8);
/// VREF step.
pub const TRNG_VREF_SWEEP_STEP: Field = Field::new(16, 4);

/// Phase-interpolator sweep window.
pub const TRNG_PI_SWEEP: RegAddr = RegAddr(0x0010_0410);
/// Lowest PI offset swept.
pub const TRNG_PI_SWEEP_MIN: Field = Field::new(0, 8);
/// Highest PI offset swept.
pub const TRNG_PI_SWEEP_MAX: Field = Field::new(8, 8);
/// Coarse PI step.
pub const TRNG_PI_SWEEP_COARSE: Field = Field::new(16, 4);
/// Fine PI step.
pub const TRNG_PI_SWEEP_FINE: Field = Field::new(20, 4);

/// Eye select mask applied to the next pass.
pub const TRNG_EYE_MASK: RegAddr = RegAddr(0x0010_0414);
/// One bit per eye.
pub const TRNG_EYE_MASK_BITS: Field = Field::new(0, 3);

/// Result readback select.
pub const TRNG_RESULT_SELECT: RegAddr = RegAddr(0x0010_0418);
/// Flat pin index.
pub const TRNG_RESULT_SELECT_PIN: Field = Field::new(0, 10);
/// Eye.
pub const TRNG_RESULT_SELECT_EYE: Field = Field::new(12, 2);
/// 0 = DQ, 1 = DBI/EDC.
pub const TRNG_RESULT_SELECT_CLASS: Field = Field::bit(16);

/// Measured eye area of the selected pin (signed 16-bit).
pub const TRNG_RESULT_AREA: RegAddr = RegAddr(0x0010_041C);
/// Area field.
pub const TRNG_RESULT_AREA_VALUE: Field = Field::new(0, 16);

/// Centre VREF chosen for the selected pin.
pub const TRNG_RESULT_VREF: RegAddr = RegAddr(0x0010_0420);
/// VREF field.
pub const TRNG_RESULT_VREF_VALUE: Field = Field::new(0, 8);

/// Tag attached to the selected pin's result (hybrid: winning DFE code).
pub const TRNG_RESULT_TAG: RegAddr = RegAddr(0x0010_0424);
/// Tag field.
pub const TRNG_RESULT_TAG_VALUE: Field = Field::new(0, 8);

/// Per-pin tag for the next area collection, for the pin in
/// [`TRNG_RESULT_SELECT`].
pub const TRNG_PIN_TAG: RegAddr = RegAddr(0x0010_0428);
/// Tag field.
pub const TRNG_PIN_TAG_VALUE: Field = Field::new(0, 8);

/// Per-pin programming select.
pub const PIN_PROG_SELECT: RegAddr = RegAddr(0x0010_042C);
/// Flat pin index.
pub const PIN_PROG_SELECT_PIN: Field = Field::new(0, 10);
/// Eye.
pub const PIN_PROG_SELECT_EYE: Field = Field::new(12, 2);
/// 0 = DQ, 1 = DBI/EDC.
pub const PIN_PROG_SELECT_CLASS: Field = Field::bit(16);
/// 0 = controller receiver, 1 = DRAM receiver (relayed over the link).
pub const PIN_PROG_SELECT_TARGET: Field = Field::bit(20);

/// Controller receiver.
pub const PIN_TARGET_CONTROLLER: u32 = 0;
/// DRAM receiver.
pub const PIN_TARGET_DRAM: u32 = 1;

/// VREF for the selected pin/eye.
pub const PIN_VREF: RegAddr = RegAddr(0x0010_0430);
/// VREF field.
pub const PIN_VREF_VALUE: Field = Field::new(0, 8);

/// DFE for the selected pin.
pub const PIN_DFE: RegAddr = RegAddr(0x0010_0434);
/// DFE field.
pub const PIN_DFE_VALUE: Field = Field::new(0, 5);

/// Hybrid tracking: current sweep tag and best-so-far reset.
pub const TRNG_HYBRID: RegAddr = RegAddr(0x0010_0438);
/// Tag latched into a pin's result when its area beats the best so far.
pub const TRNG_HYBRID_TAG: Field = Field::new(0, 8);
/// Clear per-pin best area and tag.
pub const TRNG_HYBRID_RESET: Field = Field::bit(31);

/// Receiver/WCK training control.
pub const TRNG_CTRL: RegAddr = RegAddr(0x0010_043C);
/// WCK-to-CK alignment enable.
pub const TRNG_CTRL_WCK_ALIGN: Field = Field::bit(0);
/// Read DBI enable.
pub const TRNG_CTRL_READ_DBI: Field = Field::bit(1);
/// Write DBI enable.
pub const TRNG_CTRL_WRITE_DBI: Field = Field::bit(2);

// ── Mode-register sequencer ──────────────────────────────────────────────────

/// Mode-register-set command.
pub const MRS_CMD: RegAddr = RegAddr(0x0010_0500);
/// Mode register number.
pub const MRS_CMD_ADDR: Field = Field::new(0, 4);
/// 12-bit payload.
pub const MRS_CMD_DATA: Field = Field::new(4, 12);
/// Flat pin index for a per-pin MRS.
pub const MRS_CMD_PIN: Field = Field::new(16, 10);
/// Per-pin (set) or broadcast (clear).
pub const MRS_CMD_PER_PIN: Field = Field::bit(30);
/// Launch bit. Self-clearing.
pub const MRS_CMD_START: Field = Field::bit(31);

/// Mode-register-set status.
pub const MRS_STATUS: RegAddr = RegAddr(0x0010_0504);
/// Sequencer busy.
pub const MRS_STATUS_BUSY: Field = Field::bit(0);

// ── Clock generation ─────────────────────────────────────────────────────────

/// DRAM clock source select.
pub const CLK_SRC_SEL: RegAddr = RegAddr(0x0010_0600);
/// [`crate::types::ClockPath`] encoding.
pub const CLK_SRC_SEL_PATH: Field = Field::new(0, 2);

/// Output clamp. Holds the DRAM clock low while sources change.
pub const CLK_CLAMP: RegAddr = RegAddr(0x0010_0604);
/// Clamp asserted.
pub const CLK_CLAMP_ENABLE: Field = Field::bit(0);

/// PLL bypass. Routes the crystal reference around both PLLs.
pub const CLK_BYPASS: RegAddr = RegAddr(0x0010_0608);
/// Bypass asserted.
pub const CLK_BYPASS_ENABLE: Field = Field::bit(0);

/// One-source integer divider.
pub const ONESOURCE_DIV: RegAddr = RegAddr(0x0010_060C);
/// Divider value.
pub const ONESOURCE_DIV_VALUE: Field = Field::new(0, 6);

/// Register block of one PLL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PllRegs {
    /// M/N/P coefficients.
    pub coeff: RegAddr,
    /// Enable, power-down and lock.
    pub cfg: RegAddr,
    /// Sigma-delta fraction.
    pub sdm: RegAddr,
    /// Spread-spectrum step.
    pub ssd: RegAddr,
}

/// Reference PLL.
pub const REFPLL: PllRegs = PllRegs {
    coeff: RegAddr(0x0010_0610),
    cfg: RegAddr(0x0010_0614),
    sdm: RegAddr(0x0010_0618),
    ssd: RegAddr(0x0010_061C),
};

/// DRAM PLL.
pub const DRAMPLL: PllRegs = PllRegs {
    coeff: RegAddr(0x0010_0620),
    cfg: RegAddr(0x0010_0624),
    sdm: RegAddr(0x0010_0628),
    ssd: RegAddr(0x0010_062C),
};

/// Input divider.
pub const PLL_COEFF_M: Field = Field::new(0, 8);
/// Feedback multiplier.
pub const PLL_COEFF_N: Field = Field::new(8, 8);
/// Post divider.
pub const PLL_COEFF_P: Field = Field::new(16, 6);

/// PLL running.
pub const PLL_CFG_ENABLE: Field = Field::bit(0);
/// PLL powered down.
pub const PLL_CFG_IDDQ: Field = Field::bit(1);
/// Spread spectrum enabled.
pub const PLL_CFG_SSC_EN: Field = Field::bit(2);
/// Sigma-delta modulator enabled.
pub const PLL_CFG_SDM_EN: Field = Field::bit(3);
/// Lock indicator (read-only).
pub const PLL_CFG_LOCK: Field = Field::bit(17);

/// Fractional feedback in 1/8192 units.
pub const PLL_SDM_DIN: Field = Field::new(0, 13);

/// Spread-spectrum step per modulation tick.
pub const PLL_SSD_STEP: Field = Field::new(0, 16);
/// Down-spread (set) or centre-spread (clear).
pub const PLL_SSD_DOWN: Field = Field::bit(16);

// ── Power ────────────────────────────────────────────────────────────────────

/// DRAM core supply target.
pub const VDD_CTRL: RegAddr = RegAddr(0x0010_0700);
/// Target in millivolts.
pub const VDD_CTRL_MV: Field = Field::new(0, 12);

/// Auxiliary VREF supply target.
pub const VREF_AUX_CTRL: RegAddr = RegAddr(0x0010_0704);
/// Target in millivolts.
pub const VREF_AUX_CTRL_MV: Field = Field::new(0, 12);

/// Voltage regulator status.
pub const VOLTAGE_STATUS: RegAddr = RegAddr(0x0010_0708);
/// Output settled at the programmed target.
pub const VOLTAGE_STATUS_SETTLED: Field = Field::bit(0);

/// Pad drive and termination.
pub const PAD_CTRL: RegAddr = RegAddr(0x0010_070C);

// ── Generation-specific tables ───────────────────────────────────────────────

/// Training-engine opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingOpcodes {
    /// Command/address bus training.
    pub address: u32,
    /// WCK-to-CK alignment.
    pub wck: u32,
    /// Area-based VREF centring.
    pub vref_area: u32,
    /// Phase-interpolator offset sweep.
    pub pi_offset: u32,
    /// Hybrid DFE tracking pass.
    pub hybrid: u32,
    /// Write-path verification.
    pub verify: u32,
}

/// Mode-register numbers used by training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeRegisterMap {
    /// DRAM receive VREF.
    pub vrefd: u8,
    /// DRAM receive equalization.
    pub dfe: u8,
    /// DBI/EDC configuration.
    pub dbi_edc: u8,
    /// Data termination.
    pub termination: u8,
}

/// DBI/EDC mode register: DFE applied to the DBI/EDC pins.
pub const MR_DBI_EDC_DFE: Field = Field::bit(3);
/// Termination mode register: ODT disabled.
pub const MR_TERMINATION_OFF: Field = Field::bit(5);

/// Attached DRAM generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipGeneration {
    /// Two-level signaling generation.
    Gddr6,
    /// Four-level signaling generation.
    Gddr6x,
}

const GDDR6_OPCODES: TrainingOpcodes = TrainingOpcodes {
    address: 0x01,
    wck: 0x02,
    vref_area: 0x04,
    pi_offset: 0x05,
    hybrid: 0x06,
    verify: 0x07,
};

const GDDR6X_OPCODES: TrainingOpcodes = TrainingOpcodes {
    address: 0x11,
    wck: 0x12,
    vref_area: 0x14,
    pi_offset: 0x15,
    hybrid: 0x16,
    verify: 0x17,
};

const GDDR6_MR: ModeRegisterMap = ModeRegisterMap {
    vrefd: 6,
    dfe: 9,
    dbi_edc: 3,
    termination: 1,
};

const GDDR6X_MR: ModeRegisterMap = ModeRegisterMap {
    vrefd: 6,
    dfe: 10,
    dbi_edc: 3,
    termination: 1,
};

impl ChipGeneration {
    /// Signaling used by this generation.
    #[must_use]
    pub const fn signaling(self) -> SignalingMode {
        match self {
            Self::Gddr6 => SignalingMode::Nrz,
            Self::Gddr6x => SignalingMode::Pam4,
        }
    }

    /// Training-engine opcodes.
    #[must_use]
    pub const fn opcodes(self) -> &'static TrainingOpcodes {
        match self {
            Self::Gddr6 => &GDDR6_OPCODES,
            Self::Gddr6x => &GDDR6X_OPCODES,
        }
    }

    /// Mode-register numbers.
    #[must_use]
    pub const fn mode_registers(self) -> &'static ModeRegisterMap {
        match self {
            Self::Gddr6 => &GDDR6_MR,
            Self::Gddr6x => &GDDR6X_MR,
        }
    }
}
