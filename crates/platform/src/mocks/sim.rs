//! Behavioural model of one memory controller.
//!
//! Responds to the register map the way the hardware does at the level the
//! firmware can observe: training passes complete and expose per-pin area
//! and VREF results computed from an area profile, PLLs lock when enabled,
//! FB and self-refresh handshakes acknowledge, and the mode-register
//! sequencer logs every command.

use std::collections::BTreeMap;

use crate::fbpa::{self, ChipGeneration};
use crate::regs::{RegAddr, RegisterBus};
use crate::types::{Eye, PinClassId, PllId, TrainingDirection};

/// Inputs to the area and VREF profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaQuery {
    /// Direction of the pass.
    pub direction: TrainingDirection,
    /// Pin namespace.
    pub class: PinClassId,
    /// Flat pin index.
    pub pin: u16,
    /// Eye measured.
    pub eye: Eye,
    /// DFE code in effect for the direction.
    pub dfe: u8,
}

/// A decoded training command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassRecord {
    /// Opcode.
    pub opcode: u32,
    /// Direction bit.
    pub direction: TrainingDirection,
    /// Pin class bit.
    pub class: PinClassId,
    /// Eye field.
    pub eye: u8,
    /// Pass step field.
    pub pass: u32,
}

/// A decoded mode-register command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MrsWrite {
    /// Mode register number.
    pub mr: u8,
    /// Payload.
    pub data: u16,
    /// Target pin for a per-pin command, `None` for broadcast.
    pub pin: Option<u16>,
}

type AreaFn = Box<dyn Fn(&AreaQuery) -> i16>;
type VrefFn = Box<dyn Fn(&AreaQuery) -> u8>;

/// Key of a per-pin programmed value: (target, class, pin, eye).
type PinKey = (u32, u8, u16, u8);

/// Magic engine error code reported for injected failures.
pub const INJECTED_ERROR_CODE: u32 = 0x5A;

/// Simulated memory controller.
pub struct SimulatedFb {
    generation: ChipGeneration,
    regs: BTreeMap<RegAddr, u32>,
    writes: Vec<(RegAddr, u32)>,
    area: AreaFn,
    vref: VrefFn,
    read_dfe: u8,
    write_dfe: u8,
    last_pass: Option<PassRecord>,
    passes: Vec<PassRecord>,
    hybrid_best: BTreeMap<(u8, u16), (i16, u8)>,
    pin_vref: BTreeMap<PinKey, u8>,
    pin_dfe: BTreeMap<PinKey, u8>,
    pin_tags: BTreeMap<(u8, u16), u8>,
    mrs: Vec<MrsWrite>,
    failing_opcodes: Vec<u32>,
    hung_opcodes: Vec<u32>,
    unlockable: Vec<PllId>,
}

impl SimulatedFb {
    /// Controller at power-on: one-source path at 405 MHz from a
    /// 1.62 GHz source, FB running, 1350 mV core supply, all six
    /// partitions enabled.
    ///
    /// Default profile: every eye's area peaks at DFE 2 and falls by 10
    /// per code either side; VREF centres at `0x40 + 8 * eye`.
    #[must_use]
    pub fn new(generation: ChipGeneration) -> Self {
        let mut sim = Self {
            generation,
            regs: BTreeMap::new(),
            writes: Vec::new(),
            area: Box::new(|q| 100 - 10 * (i16::from(q.dfe) - 2).abs()),
            vref: Box::new(|q| 0x40 + 8 * q.eye as u8),
            read_dfe: 0,
            write_dfe: 0,
            last_pass: None,
            passes: Vec::new(),
            hybrid_best: BTreeMap::new(),
            pin_vref: BTreeMap::new(),
            pin_dfe: BTreeMap::new(),
            pin_tags: BTreeMap::new(),
            mrs: Vec::new(),
            failing_opcodes: Vec::new(),
            hung_opcodes: Vec::new(),
            unlockable: Vec::new(),
        };
        sim.regs.insert(fbpa::CLK_SRC_SEL, fbpa::CLK_SRC_SEL_PATH.encode(0));
        sim.regs.insert(fbpa::ONESOURCE_DIV, 4);
        sim.regs.insert(fbpa::VDD_CTRL, 1350);
        sim.regs.insert(fbpa::VREF_AUX_CTRL, 675);
        sim.regs.insert(fbpa::VOLTAGE_STATUS, 1);
        sim.regs.insert(fbpa::FB_STATUS, fbpa::FB_STATUS_RUNNING.encode(1));
        sim.regs.insert(fbpa::PARTITION_MASK, 0x3F);
        sim.regs.insert(
            fbpa::REFRESH_CTRL,
            fbpa::REFRESH_CTRL_ENABLE.encode(1) | fbpa::REFRESH_CTRL_INTERVAL.encode(0x0C30),
        );
        sim.regs.insert(fbpa::PERIODIC_TRAINING, 1);
        sim.regs.insert(fbpa::REFPLL.cfg, fbpa::PLL_CFG_IDDQ.encode(1));
        sim.regs.insert(fbpa::DRAMPLL.cfg, fbpa::PLL_CFG_IDDQ.encode(1));
        for i in 0..fbpa::TIMING_COUNT {
            sim.regs.insert(fbpa::TIMING_BASE.offset(i), 0x0195_0000 | i);
        }
        sim
    }

    /// Replace the eye-area profile.
    #[must_use]
    pub fn with_area_profile(mut self, f: impl Fn(&AreaQuery) -> i16 + 'static) -> Self {
        self.area = Box::new(f);
        self
    }

    /// Replace the VREF profile.
    #[must_use]
    pub fn with_vref_profile(mut self, f: impl Fn(&AreaQuery) -> u8 + 'static) -> Self {
        self.vref = Box::new(f);
        self
    }

    /// Passes with `opcode` complete with the error bit set.
    #[must_use]
    pub fn failing_opcode(mut self, opcode: u32) -> Self {
        self.failing_opcodes.push(opcode);
        self
    }

    /// Passes with `opcode` never complete.
    #[must_use]
    pub fn hung_opcode(mut self, opcode: u32) -> Self {
        self.hung_opcodes.push(opcode);
        self
    }

    /// `pll` never reports lock.
    #[must_use]
    pub fn unlockable(mut self, pll: PllId) -> Self {
        self.unlockable.push(pll);
        self
    }

    /// Set a register without logging a write.
    pub fn preload(&mut self, addr: RegAddr, value: u32) {
        self.regs.insert(addr, value);
    }

    /// Current value of `addr`.
    #[must_use]
    pub fn peek(&self, addr: RegAddr) -> u32 {
        self.regs.get(&addr).copied().unwrap_or(0)
    }

    /// Entire register file.
    #[must_use]
    pub fn register_file(&self) -> &BTreeMap<RegAddr, u32> {
        &self.regs
    }

    /// All writes in order.
    #[must_use]
    pub fn writes(&self) -> &[(RegAddr, u32)] {
        &self.writes
    }

    /// Every training command launched, in order.
    #[must_use]
    pub fn passes(&self) -> &[PassRecord] {
        &self.passes
    }

    /// Every mode-register command, in order.
    #[must_use]
    pub fn mrs_log(&self) -> &[MrsWrite] {
        &self.mrs
    }

    /// VREF programmed for a pin through the per-pin registers.
    #[must_use]
    pub fn pin_vref(&self, target: u32, class: PinClassId, pin: u16, eye: Eye) -> Option<u8> {
        self.pin_vref
            .get(&(target, class as u8, pin, eye as u8))
            .copied()
    }

    /// DFE programmed for a pin through the per-pin registers.
    #[must_use]
    pub fn pin_dfe(&self, target: u32, class: PinClassId, pin: u16) -> Option<u8> {
        self.pin_dfe.get(&(target, class as u8, pin, 0)).copied()
    }

    /// Last per-pin mode-register payload sent to `mr` for `pin`.
    #[must_use]
    pub fn per_pin_mr(&self, mr: u8, pin: u16) -> Option<u16> {
        self.mrs
            .iter()
            .rev()
            .find(|w| w.mr == mr && w.pin == Some(pin))
            .map(|w| w.data)
    }

    /// Drop the write, pass and MRS logs, keeping register state.
    pub fn clear_logs(&mut self) {
        self.writes.clear();
        self.passes.clear();
        self.mrs.clear();
    }

    fn pin_count(class: PinClassId) -> u16 {
        let count = match class {
            PinClassId::Dq => fbpa::DQ_PIN_COUNT,
            PinClassId::Dbi => fbpa::DBI_PIN_COUNT,
        };
        u16::try_from(count).unwrap_or(u16::MAX)
    }

    fn dfe_for(&self, direction: TrainingDirection) -> u8 {
        match direction {
            TrainingDirection::Read => self.read_dfe,
            TrainingDirection::Write => self.write_dfe,
        }
    }

    fn query(&self, pass: &PassRecord, pin: u16, eye: Eye) -> AreaQuery {
        AreaQuery {
            direction: pass.direction,
            class: pass.class,
            pin,
            eye,
            dfe: self.dfe_for(pass.direction),
        }
    }

    fn eye_from(raw: u32) -> Eye {
        match raw {
            1 => Eye::Mid,
            2 => Eye::High,
            _ => Eye::Low,
        }
    }

    fn class_from(raw: u32) -> PinClassId {
        if raw == 0 {
            PinClassId::Dq
        } else {
            PinClassId::Dbi
        }
    }

    fn launch_pass(&mut self, cmd: u32) {
        let pass = PassRecord {
            opcode: fbpa::TRNG_CMD_OPCODE.extract(cmd),
            direction: if fbpa::TRNG_CMD_DIRECTION.extract(cmd) == 0 {
                TrainingDirection::Read
            } else {
                TrainingDirection::Write
            },
            class: Self::class_from(fbpa::TRNG_CMD_PIN_CLASS.extract(cmd)),
            eye: u8::try_from(fbpa::TRNG_CMD_EYE.extract(cmd)).unwrap_or(0),
            pass: fbpa::TRNG_CMD_PASS.extract(cmd),
        };
        self.passes.push(pass);
        self.last_pass = Some(pass);

        if pass.opcode == self.generation.opcodes().hybrid {
            let tag = u8::try_from(fbpa::TRNG_HYBRID_TAG.extract(self.peek(fbpa::TRNG_HYBRID)))
                .unwrap_or(0);
            let eye = Self::eye_from(u32::from(pass.eye));
            for pin in 0..Self::pin_count(pass.class) {
                let area = (self.area)(&self.query(&pass, pin, eye));
                let entry = self
                    .hybrid_best
                    .entry((pass.class as u8, pin))
                    .or_insert((0, tag));
                if area > entry.0 {
                    *entry = (area, tag);
                }
            }
        }

        let status = if self.hung_opcodes.contains(&pass.opcode) {
            0
        } else if self.failing_opcodes.contains(&pass.opcode) {
            fbpa::TRNG_STATUS_DONE.encode(1)
                | fbpa::TRNG_STATUS_ERROR.encode(1)
                | fbpa::TRNG_STATUS_CODE.encode(INJECTED_ERROR_CODE)
        } else {
            fbpa::TRNG_STATUS_DONE.encode(1)
        };
        self.regs.insert(fbpa::TRNG_STATUS, status);
    }

    fn result_select(&self) -> (PinClassId, u16, Eye) {
        let sel = self.peek(fbpa::TRNG_RESULT_SELECT);
        (
            Self::class_from(fbpa::TRNG_RESULT_SELECT_CLASS.extract(sel)),
            u16::try_from(fbpa::TRNG_RESULT_SELECT_PIN.extract(sel)).unwrap_or(0),
            Self::eye_from(fbpa::TRNG_RESULT_SELECT_EYE.extract(sel)),
        )
    }

    fn is_hybrid(&self, pass: &PassRecord) -> bool {
        pass.opcode == self.generation.opcodes().hybrid
    }

    fn read_result_area(&self) -> u32 {
        let Some(pass) = self.last_pass else {
            return 0;
        };
        let (class, pin, eye) = self.result_select();
        let area = if self.is_hybrid(&pass) {
            self.hybrid_best
                .get(&(class as u8, pin))
                .map_or(0, |&(a, _)| a)
        } else {
            (self.area)(&AreaQuery {
                class,
                ..self.query(&pass, pin, eye)
            })
        };
        u32::from(area as u16)
    }

    fn read_result_vref(&self) -> u32 {
        let Some(pass) = self.last_pass else {
            return 0;
        };
        let (class, pin, eye) = self.result_select();
        let mut query = AreaQuery {
            class,
            ..self.query(&pass, pin, eye)
        };
        if self.is_hybrid(&pass) {
            if let Some(&(_, tag)) = self.hybrid_best.get(&(class as u8, pin)) {
                query.dfe = tag;
            }
        }
        u32::from((self.vref)(&query))
    }

    fn read_result_tag(&self) -> u32 {
        let (class, pin, _) = self.result_select();
        if self.last_pass.is_some_and(|p| self.is_hybrid(&p)) {
            return self
                .hybrid_best
                .get(&(class as u8, pin))
                .map_or(0, |&(_, t)| u32::from(t));
        }
        self.pin_tags
            .get(&(class as u8, pin))
            .map_or(0, |&t| u32::from(t))
    }

    fn pin_prog_key(&self) -> PinKey {
        let sel = self.peek(fbpa::PIN_PROG_SELECT);
        (
            fbpa::PIN_PROG_SELECT_TARGET.extract(sel),
            u8::try_from(fbpa::PIN_PROG_SELECT_CLASS.extract(sel)).unwrap_or(0),
            u16::try_from(fbpa::PIN_PROG_SELECT_PIN.extract(sel)).unwrap_or(0),
            u8::try_from(fbpa::PIN_PROG_SELECT_EYE.extract(sel)).unwrap_or(0),
        )
    }

    fn mrs_command(&mut self, cmd: u32) {
        let mr = u8::try_from(fbpa::MRS_CMD_ADDR.extract(cmd)).unwrap_or(0);
        let data = u16::try_from(fbpa::MRS_CMD_DATA.extract(cmd)).unwrap_or(0);
        let pin = (fbpa::MRS_CMD_PER_PIN.extract(cmd) == 1)
            .then(|| u16::try_from(fbpa::MRS_CMD_PIN.extract(cmd)).unwrap_or(0));
        if pin.is_none() && mr == self.generation.mode_registers().dfe {
            self.write_dfe = u8::try_from(data & 0x1F).unwrap_or(0);
        }
        self.mrs.push(MrsWrite { mr, data, pin });
        self.regs.insert(fbpa::MRS_STATUS, 0);
    }

    fn pll_cfg(&mut self, pll: PllId, addr: RegAddr, value: u32) {
        let running = fbpa::PLL_CFG_ENABLE.extract(value) == 1
            && fbpa::PLL_CFG_IDDQ.extract(value) == 0
            && !self.unlockable.contains(&pll);
        let stored = fbpa::PLL_CFG_LOCK.insert(value, u32::from(running));
        self.regs.insert(addr, stored);
    }
}

impl RegisterBus for SimulatedFb {
    fn read(&mut self, addr: RegAddr) -> u32 {
        match addr {
            fbpa::TRNG_RESULT_AREA => self.read_result_area(),
            fbpa::TRNG_RESULT_VREF => self.read_result_vref(),
            fbpa::TRNG_RESULT_TAG => self.read_result_tag(),
            _ => self.peek(addr),
        }
    }

    fn write(&mut self, addr: RegAddr, value: u32) {
        self.writes.push((addr, value));
        match addr {
            fbpa::TRNG_CMD => {
                let stored = fbpa::TRNG_CMD_START.insert(value, 0);
                self.regs.insert(addr, stored);
                if fbpa::TRNG_CMD_START.extract(value) == 1 {
                    self.launch_pass(value);
                }
            }
            fbpa::TRNG_HYBRID => {
                if fbpa::TRNG_HYBRID_RESET.extract(value) == 1 {
                    self.hybrid_best.clear();
                }
                self.regs
                    .insert(addr, fbpa::TRNG_HYBRID_RESET.insert(value, 0));
            }
            fbpa::TRNG_DFE => {
                self.read_dfe = u8::try_from(fbpa::TRNG_DFE_CODE.extract(value)).unwrap_or(0);
                self.regs.insert(addr, value);
            }
            fbpa::TRNG_PIN_TAG => {
                let (class, pin, _) = self.result_select();
                self.pin_tags.insert(
                    (class as u8, pin),
                    u8::try_from(fbpa::TRNG_PIN_TAG_VALUE.extract(value)).unwrap_or(0),
                );
                self.regs.insert(addr, value);
            }
            fbpa::PIN_VREF => {
                let key = self.pin_prog_key();
                self.pin_vref.insert(
                    key,
                    u8::try_from(fbpa::PIN_VREF_VALUE.extract(value)).unwrap_or(0),
                );
                self.regs.insert(addr, value);
            }
            fbpa::PIN_DFE => {
                let (target, class, pin, _) = self.pin_prog_key();
                self.pin_dfe.insert(
                    (target, class, pin, 0),
                    u8::try_from(fbpa::PIN_DFE_VALUE.extract(value)).unwrap_or(0),
                );
                self.regs.insert(addr, value);
            }
            fbpa::MRS_CMD => {
                self.regs.insert(addr, fbpa::MRS_CMD_START.insert(value, 0));
                if fbpa::MRS_CMD_START.extract(value) == 1 {
                    self.mrs_command(value);
                }
            }
            fbpa::FB_CTRL => {
                if fbpa::FB_CTRL_STOP.extract(value) == 1 {
                    self.regs
                        .insert(fbpa::FB_STATUS, fbpa::FB_STATUS_IDLE.encode(1));
                } else if fbpa::FB_CTRL_START.extract(value) == 1 {
                    self.regs
                        .insert(fbpa::FB_STATUS, fbpa::FB_STATUS_RUNNING.encode(1));
                }
                self.regs.insert(addr, 0);
            }
            fbpa::SELF_REFRESH_CTRL => {
                if fbpa::SELF_REFRESH_ENTRY.extract(value) == 1 {
                    self.regs.insert(fbpa::SELF_REFRESH_STATUS, 1);
                } else if fbpa::SELF_REFRESH_EXIT.extract(value) == 1 {
                    self.regs.insert(fbpa::SELF_REFRESH_STATUS, 0);
                }
                self.regs.insert(addr, 0);
            }
            fbpa::VDD_CTRL | fbpa::VREF_AUX_CTRL => {
                self.regs.insert(addr, value);
                self.regs.insert(fbpa::VOLTAGE_STATUS, 1);
            }
            a if a == fbpa::REFPLL.cfg => self.pll_cfg(PllId::Ref, a, value),
            a if a == fbpa::DRAMPLL.cfg => self.pll_cfg(PllId::Dram, a, value),
            _ => {
                self.regs.insert(addr, value);
            }
        }
    }
}
