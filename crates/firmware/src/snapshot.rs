//! Register snapshots for frequency switching.
//!
//! A [`RegisterSnapshot`] mirrors every register a switch may change. The
//! switch works on a [`SnapshotPair`]: `current` is read back from the
//! hardware at the start, `target` is computed from the frequency record,
//! and [`RegisterSnapshot::commit`] writes selected groups of the target
//! while keeping `current` in step with what was written.

use core::ops::BitOr;

use embedded_hal::delay::DelayNs;
use gddr_platform::board::{FrequencyRecord, TrainingTable, MODE_REGISTERS, TIMING_WORDS};
use gddr_platform::fault::SwitchHandshake;
use gddr_platform::poll::{poll_until, VOLTAGE_SETTLE};
use gddr_platform::{fbpa, ClockPath, FatalFault, PllId, RegAddr, RegisterBus};

use crate::mrs;
use crate::pll::ClockPlan;

/// Mirrors of one PLL's register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PllMirror {
    /// Coefficient word.
    pub coeff: u32,
    /// Configuration word.
    pub cfg: u32,
    /// SDM word.
    pub sdm: u32,
    /// SSD word.
    pub ssd: u32,
}

impl PllMirror {
    fn read<B: RegisterBus + ?Sized>(bus: &mut B, regs: &fbpa::PllRegs) -> Self {
        Self {
            coeff: bus.read(regs.coeff),
            cfg: bus.read(regs.cfg),
            sdm: bus.read(regs.sdm),
            ssd: bus.read(regs.ssd),
        }
    }
}

/// Register groups written by [`RegisterSnapshot::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSet(u8);

impl CommitSet {
    /// Nothing.
    pub const NONE: Self = Self(0);
    /// DRAM timing registers.
    pub const TIMING: Self = Self(1 << 0);
    /// Mode-register mirrors, each followed by a broadcast MRS.
    pub const MODE_REGISTERS: Self = Self(1 << 1);
    /// Core and auxiliary supplies; waits for the regulator.
    pub const POWER: Self = Self(1 << 2);
    /// WCK/DBI training control and receiver DFE enable.
    pub const TRAINING_CONTROL: Self = Self(1 << 3);
    /// Auto-refresh and periodic training.
    pub const REFRESH: Self = Self(1 << 4);

    /// Whether every group in `other` is selected.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CommitSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Mirror of every register a frequency switch touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSnapshot {
    /// Timing configuration.
    pub timing: [u32; TIMING_WORDS],
    /// Mode-register mirrors.
    pub mode_registers: [u32; MODE_REGISTERS],
    /// Clock source select.
    pub clk_src_sel: u32,
    /// One-source divider.
    pub onesource_div: u32,
    /// Reference PLL.
    pub refpll: PllMirror,
    /// DRAM PLL.
    pub drampll: PllMirror,
    /// Core supply.
    pub vdd: u32,
    /// Auxiliary VREF supply.
    pub vref_aux: u32,
    /// Pad drive/termination.
    pub pad_ctrl: u32,
    /// Training control.
    pub trng_ctrl: u32,
    /// Receiver DFE.
    pub rx_dfe: u32,
    /// Auto-refresh control.
    pub refresh_ctrl: u32,
    /// Periodic training.
    pub periodic_training: u32,
}

impl RegisterSnapshot {
    /// Read the live register state.
    pub fn save_current<B: RegisterBus + ?Sized>(bus: &mut B) -> Self {
        let mut timing = [0u32; TIMING_WORDS];
        for (i, word) in (0u32..).zip(timing.iter_mut()) {
            *word = bus.read(fbpa::TIMING_BASE.offset(i));
        }
        let mut mode_registers = [0u32; MODE_REGISTERS];
        for (i, word) in (0u32..).zip(mode_registers.iter_mut()) {
            *word = bus.read(fbpa::MR_MIRROR_BASE.offset(i));
        }
        Self {
            timing,
            mode_registers,
            clk_src_sel: bus.read(fbpa::CLK_SRC_SEL),
            onesource_div: bus.read(fbpa::ONESOURCE_DIV),
            refpll: PllMirror::read(bus, &fbpa::REFPLL),
            drampll: PllMirror::read(bus, &fbpa::DRAMPLL),
            vdd: bus.read(fbpa::VDD_CTRL),
            vref_aux: bus.read(fbpa::VREF_AUX_CTRL),
            pad_ctrl: bus.read(fbpa::PAD_CTRL),
            trng_ctrl: bus.read(fbpa::TRNG_CTRL),
            rx_dfe: bus.read(fbpa::TRNG_DFE),
            refresh_ctrl: bus.read(fbpa::REFRESH_CTRL),
            periodic_training: bus.read(fbpa::PERIODIC_TRAINING),
        }
    }

    /// Target state for `record`, starting from `current`. Pure.
    ///
    /// PLL enable and power-down bits are left as in `current`; the clock
    /// transition sequences own them.
    pub fn compute_target(
        current: &Self,
        record: &FrequencyRecord,
        plan: &ClockPlan,
        table: &TrainingTable,
    ) -> Self {
        let mut target = *current;
        target.timing = record.timing;
        target.mode_registers = record.mode_registers.map(u32::from);
        target.clk_src_sel = fbpa::CLK_SRC_SEL_PATH.insert(current.clk_src_sel, plan.path.raw());
        if let Some(div) = plan.onesource_div {
            target.onesource_div = fbpa::ONESOURCE_DIV_VALUE.encode(div);
        }
        let mode_mask = fbpa::PLL_CFG_SDM_EN.mask() | fbpa::PLL_CFG_SSC_EN.mask();
        for (settings, mirror) in [
            (plan.refpll, &mut target.refpll),
            (plan.drampll, &mut target.drampll),
        ] {
            if let Some(s) = settings {
                mirror.coeff = s.coeff_word();
                mirror.sdm = s.sdm_word();
                mirror.ssd = s.ssd_word();
                mirror.cfg = (mirror.cfg & !mode_mask) | s.cfg_mode_bits();
            }
        }
        target.vdd = fbpa::VDD_CTRL_MV.encode(u32::from(record.voltage_mv));
        target.vref_aux = fbpa::VREF_AUX_CTRL_MV.encode(u32::from(record.aux_vref_mv));
        target.trng_ctrl = fbpa::TRNG_CTRL_WCK_ALIGN.encode(u32::from(record.training.wck))
            | fbpa::TRNG_CTRL_READ_DBI.encode(u32::from(table.read.dbi))
            | fbpa::TRNG_CTRL_WRITE_DBI.encode(u32::from(table.write.dbi));
        target.rx_dfe =
            fbpa::TRNG_DFE_ENABLE.insert(current.rx_dfe, u32::from(record.training.read));
        target.refresh_ctrl = fbpa::REFRESH_CTRL_ENABLE.encode(1)
            | fbpa::REFRESH_CTRL_INTERVAL.encode(u32::from(record.refresh_interval));
        target.periodic_training = fbpa::PERIODIC_TRAINING_ENABLE.encode(1);
        target
    }

    /// Clock path encoded in the source select mirror.
    pub fn clock_path(&self) -> Option<ClockPath> {
        ClockPath::from_raw(fbpa::CLK_SRC_SEL_PATH.extract(self.clk_src_sel))
    }

    /// Core supply in mV.
    pub fn voltage_mv(&self) -> u32 {
        fbpa::VDD_CTRL_MV.extract(self.vdd)
    }

    /// Mirror of `pll`.
    pub fn pll(&self, pll: PllId) -> &PllMirror {
        match pll {
            PllId::Ref => &self.refpll,
            PllId::Dram => &self.drampll,
        }
    }

    fn pll_mut(&mut self, pll: PllId) -> &mut PllMirror {
        match pll {
            PllId::Ref => &mut self.refpll,
            PllId::Dram => &mut self.drampll,
        }
    }

    /// Write `pll`'s coefficient, SDM and SSD words from `self`.
    pub fn commit_pll_dividers<B: RegisterBus + ?Sized>(
        &self,
        current: &mut Self,
        bus: &mut B,
        pll: PllId,
    ) {
        let regs = pll_regs(pll);
        let src = *self.pll(pll);
        bus.write(regs.coeff, src.coeff);
        bus.write(regs.sdm, src.sdm);
        bus.write(regs.ssd, src.ssd);
        let dst = current.pll_mut(pll);
        dst.coeff = src.coeff;
        dst.sdm = src.sdm;
        dst.ssd = src.ssd;
    }

    /// Write `pll`'s configuration word with `enable` and `iddq` applied to
    /// the target's modulator bits.
    pub fn commit_pll_cfg<B: RegisterBus + ?Sized>(
        &self,
        current: &mut Self,
        bus: &mut B,
        pll: PllId,
        enable: bool,
    ) {
        let mut cfg = self.pll(pll).cfg;
        cfg = fbpa::PLL_CFG_ENABLE.insert(cfg, u32::from(enable));
        cfg = fbpa::PLL_CFG_IDDQ.insert(cfg, u32::from(!enable));
        cfg = fbpa::PLL_CFG_LOCK.insert(cfg, 0);
        bus.write(pll_regs(pll).cfg, cfg);
        current.pll_mut(pll).cfg = cfg;
    }

    /// Write the one-source divider. Returns whether it changed.
    pub fn commit_onesource_div<B: RegisterBus + ?Sized>(&self, current: &mut Self, bus: &mut B) -> bool {
        if current.onesource_div == self.onesource_div {
            return false;
        }
        write_mirror(bus, fbpa::ONESOURCE_DIV, self.onesource_div, &mut current.onesource_div);
        true
    }

    /// Write the selected groups of `self` (the target), updating `current`.
    ///
    /// Groups are written in a fixed order: timing, mode registers, power,
    /// training control, refresh. Clock registers are written by the
    /// transition sequences.
    pub fn commit<B, D>(
        &self,
        current: &mut Self,
        bus: &mut B,
        delay: &mut D,
        set: CommitSet,
    ) -> Result<(), FatalFault>
    where
        B: RegisterBus + ?Sized,
        D: DelayNs + ?Sized,
    {
        if set.contains(CommitSet::TIMING) {
            for (i, (src, dst)) in (0u32..).zip(self.timing.iter().zip(current.timing.iter_mut())) {
                write_mirror(bus, fbpa::TIMING_BASE.offset(i), *src, dst);
            }
        }
        if set.contains(CommitSet::MODE_REGISTERS) {
            for (i, (src, dst)) in
                (0u8..).zip(self.mode_registers.iter().zip(current.mode_registers.iter_mut()))
            {
                write_mirror(bus, fbpa::MR_MIRROR_BASE.offset(u32::from(i)), *src, dst);
                let data = u16::try_from(fbpa::MRS_CMD_DATA.max_value() & *src).unwrap_or(0);
                mrs::broadcast(bus, delay, i, data)?;
            }
        }
        if set.contains(CommitSet::POWER) {
            write_mirror(bus, fbpa::VDD_CTRL, self.vdd, &mut current.vdd);
            write_mirror(bus, fbpa::VREF_AUX_CTRL, self.vref_aux, &mut current.vref_aux);
            write_mirror(bus, fbpa::PAD_CTRL, self.pad_ctrl, &mut current.pad_ctrl);
            poll_until(delay, VOLTAGE_SETTLE, || {
                bus.read_field(fbpa::VOLTAGE_STATUS, fbpa::VOLTAGE_STATUS_SETTLED) == 1
            })
            .map_err(|_| FatalFault::SwitchTimeout {
                handshake: SwitchHandshake::VoltageSettle,
            })?;
        }
        if set.contains(CommitSet::TRAINING_CONTROL) {
            write_mirror(bus, fbpa::TRNG_CTRL, self.trng_ctrl, &mut current.trng_ctrl);
            write_mirror(bus, fbpa::TRNG_DFE, self.rx_dfe, &mut current.rx_dfe);
        }
        if set.contains(CommitSet::REFRESH) {
            write_mirror(bus, fbpa::REFRESH_CTRL, self.refresh_ctrl, &mut current.refresh_ctrl);
            write_mirror(
                bus,
                fbpa::PERIODIC_TRAINING,
                self.periodic_training,
                &mut current.periodic_training,
            );
        }
        Ok(())
    }
}

fn write_mirror<B: RegisterBus + ?Sized>(bus: &mut B, addr: RegAddr, value: u32, mirror: &mut u32) {
    bus.write(addr, value);
    *mirror = value;
}

/// Register block of `pll`.
pub const fn pll_regs(pll: PllId) -> &'static fbpa::PllRegs {
    match pll {
        PllId::Ref => &fbpa::REFPLL,
        PllId::Dram => &fbpa::DRAMPLL,
    }
}

/// Current and target snapshots of an in-progress switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotPair {
    /// What the hardware holds.
    pub current: RegisterSnapshot,
    /// What the switch is driving towards.
    pub target: RegisterSnapshot,
}

impl SnapshotPair {
    /// Write the selected target groups and track them in `current`.
    pub fn commit<B, D>(&mut self, bus: &mut B, delay: &mut D, set: CommitSet) -> Result<(), FatalFault>
    where
        B: RegisterBus + ?Sized,
        D: DelayNs + ?Sized,
    {
        self.target.commit(&mut self.current, bus, delay, set)
    }
}
