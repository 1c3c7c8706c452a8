use thiserror::Error;

use crate::{interrupts::Interrupt, mmu::Mmu};

// Flag bits as they appear in F (gbdev.io/pandocs/CPU_Registers_and_Flags.html)
const FLAG_Z: u8 = 0x80;
const FLAG_N: u8 = 0x40;
const FLAG_H: u8 = 0x20;
const FLAG_C: u8 = 0x10;

// Post-boot CPU state from gbdev.io/pandocs/Power_Up_State.html
const BOOT_AF: u16 = 0x01B0;
const BOOT_BC: u16 = 0x0013;
const BOOT_DE: u16 = 0x00D8;
const BOOT_HL: u16 = 0x014D;
const BOOT_SP: u16 = 0xFFFE;
const BOOT_PC: u16 = 0x0100;

const CYCLES_PER_M_CYCLE: u64 = 4;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CpuError {
    #[error("illegal opcode {opcode:#04X} at {pc:#06X}")]
    IllegalOpcode { opcode: u8, pc: u16 },
}

/// Two 8-bit registers addressed together as one 16-bit value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterPair(u16);

impl RegisterPair {
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn pair(self) -> u16 {
        self.0
    }

    pub fn high(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn low(self) -> u8 {
        self.0 as u8
    }

    pub fn set_pair(&mut self, value: u16) {
        self.0 = value;
    }

    pub fn set_high(&mut self, value: u8) {
        self.0 = (self.0 & 0x00FF) | (value as u16) << 8;
    }

    pub fn set_low(&mut self, value: u8) {
        self.0 = (self.0 & 0xFF00) | value as u16;
    }
}

#[derive(Debug, Clone, Copy)]
enum Condition {
    NotZero,
    Zero,
    NotCarry,
    Carry,
}

#[derive(Debug, Clone)]
pub struct Cpu {
    /// A in the high byte. F is assembled from the flag fields.
    af: RegisterPair,
    pub bc: RegisterPair,
    pub de: RegisterPair,
    pub hl: RegisterPair,
    pub sp: u16,
    pub pc: u16,
    pub zero: bool,
    pub negative: bool,
    pub half_carry: bool,
    pub carry: bool,
    pub cycles: u64,
    pub ime: bool,
    pub halted: bool,
    halt_bug: bool,
    /// EI takes effect after the next opcode fetch
    ei_delay: bool,
}

impl Cpu {
    /// Power-on state with every register cleared, for running a boot ROM.
    pub fn new() -> Self {
        Self {
            af: RegisterPair::default(),
            bc: RegisterPair::default(),
            de: RegisterPair::default(),
            hl: RegisterPair::default(),
            sp: 0,
            pc: 0,
            zero: false,
            negative: false,
            half_carry: false,
            carry: false,
            cycles: 0,
            ime: false,
            halted: false,
            halt_bug: false,
            ei_delay: false,
        }
    }

    /// Register state the DMG boot ROM leaves behind.
    pub fn new_post_boot() -> Self {
        let mut cpu = Self::new();
        cpu.set_af(BOOT_AF);
        cpu.bc.set_pair(BOOT_BC);
        cpu.de.set_pair(BOOT_DE);
        cpu.hl.set_pair(BOOT_HL);
        cpu.sp = BOOT_SP;
        cpu.pc = BOOT_PC;
        cpu
    }

    pub fn a(&self) -> u8 {
        self.af.high()
    }

    pub fn set_a(&mut self, val: u8) {
        self.af.set_high(val);
    }

    /// Flags packed into the F register layout.
    pub fn f(&self) -> u8 {
        (if self.zero { FLAG_Z } else { 0 })
            | (if self.negative { FLAG_N } else { 0 })
            | (if self.half_carry { FLAG_H } else { 0 })
            | (if self.carry { FLAG_C } else { 0 })
    }

    pub fn set_f(&mut self, val: u8) {
        self.zero = val & FLAG_Z != 0;
        self.negative = val & FLAG_N != 0;
        self.half_carry = val & FLAG_H != 0;
        self.carry = val & FLAG_C != 0;
    }

    pub fn af(&self) -> u16 {
        (self.a() as u16) << 8 | self.f() as u16
    }

    pub fn set_af(&mut self, val: u16) {
        self.af.set_pair(val & 0xFF00);
        self.set_f(val as u8);
    }

    /// Formatted CPU state string for debugging.
    pub fn debug_state(&self) -> String {
        format!(
            "AF:{:04X} BC:{:04X} DE:{:04X} HL:{:04X} PC:{:04X} SP:{:04X} CY:{}",
            self.af(),
            self.bc.pair(),
            self.de.pair(),
            self.hl.pair(),
            self.pc,
            self.sp,
            self.cycles
        )
    }

    #[inline]
    fn tick(&mut self, mmu: &mut Mmu) {
        self.cycles += CYCLES_PER_M_CYCLE;
        mmu.tick();
    }

    #[inline(always)]
    fn fetch8(&mut self, mmu: &mut Mmu) -> u8 {
        let val = mmu.read_byte(self.pc);
        self.pc = self.pc.wrapping_add(1);
        self.tick(mmu);
        val
    }

    #[inline(always)]
    fn fetch16(&mut self, mmu: &mut Mmu) -> u16 {
        let lo = self.fetch8(mmu) as u16;
        let hi = self.fetch8(mmu) as u16;
        (hi << 8) | lo
    }

    #[inline(always)]
    fn read8(&mut self, mmu: &mut Mmu, addr: u16) -> u8 {
        let val = mmu.read_byte(addr);
        self.tick(mmu);
        val
    }

    #[inline(always)]
    fn write8(&mut self, mmu: &mut Mmu, addr: u16, val: u8) {
        mmu.write_byte(addr, val);
        self.tick(mmu);
    }

    fn push_stack(&mut self, mmu: &mut Mmu, val: u16) {
        self.sp = self.sp.wrapping_sub(1);
        self.write8(mmu, self.sp, (val >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        self.write8(mmu, self.sp, val as u8);
    }

    fn pop_stack(&mut self, mmu: &mut Mmu) -> u16 {
        let lo = self.read8(mmu, self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        let hi = self.read8(mmu, self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    /// 8-bit operand slot: B C D E H L (HL) A.
    fn read_reg(&mut self, mmu: &mut Mmu, index: u8) -> u8 {
        match index {
            0 => self.bc.high(),
            1 => self.bc.low(),
            2 => self.de.high(),
            3 => self.de.low(),
            4 => self.hl.high(),
            5 => self.hl.low(),
            6 => self.read8(mmu, self.hl.pair()),
            _ => self.a(),
        }
    }

    fn write_reg(&mut self, mmu: &mut Mmu, index: u8, val: u8) {
        match index {
            0 => self.bc.set_high(val),
            1 => self.bc.set_low(val),
            2 => self.de.set_high(val),
            3 => self.de.set_low(val),
            4 => self.hl.set_high(val),
            5 => self.hl.set_low(val),
            6 => self.write8(mmu, self.hl.pair(), val),
            _ => self.set_a(val),
        }
    }

    /// 16-bit operand slot for LD/INC/DEC/ADD: BC DE HL SP.
    fn read_r16(&self, index: u8) -> u16 {
        match index {
            0 => self.bc.pair(),
            1 => self.de.pair(),
            2 => self.hl.pair(),
            _ => self.sp,
        }
    }

    fn write_r16(&mut self, index: u8, val: u16) {
        match index {
            0 => self.bc.set_pair(val),
            1 => self.de.set_pair(val),
            2 => self.hl.set_pair(val),
            _ => self.sp = val,
        }
    }

    fn condition(&self, cond: Condition) -> bool {
        match cond {
            Condition::NotZero => !self.zero,
            Condition::Zero => self.zero,
            Condition::NotCarry => !self.carry,
            Condition::Carry => self.carry,
        }
    }

    fn condition_from(opcode: u8) -> Condition {
        match (opcode >> 3) & 0x03 {
            0 => Condition::NotZero,
            1 => Condition::Zero,
            2 => Condition::NotCarry,
            _ => Condition::Carry,
        }
    }

    fn set_flags(&mut self, z: bool, n: bool, h: bool, c: bool) {
        self.zero = z;
        self.negative = n;
        self.half_carry = h;
        self.carry = c;
    }

    fn inc8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_add(1);
        self.zero = res == 0;
        self.negative = false;
        self.half_carry = val & 0x0F == 0x0F;
        res
    }

    fn dec8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_sub(1);
        self.zero = res == 0;
        self.negative = true;
        self.half_carry = val & 0x0F == 0;
        res
    }

    /// ALU operation selected by bits 3-5 of the opcode.
    fn alu(&mut self, op: u8, val: u8) {
        let a = self.a();
        match op {
            // ADD / ADC
            0 | 1 => {
                let carry_in = (op == 1 && self.carry) as u8;
                let res = a as u16 + val as u16 + carry_in as u16;
                self.set_flags(
                    res as u8 == 0,
                    false,
                    (a & 0x0F) + (val & 0x0F) + carry_in > 0x0F,
                    res > 0xFF,
                );
                self.set_a(res as u8);
            }
            // SUB / SBC / CP
            2 | 3 | 7 => {
                let carry_in = (op == 3 && self.carry) as u8;
                let res = a.wrapping_sub(val).wrapping_sub(carry_in);
                self.set_flags(
                    res == 0,
                    true,
                    (a & 0x0F) < (val & 0x0F) + carry_in,
                    (a as u16) < val as u16 + carry_in as u16,
                );
                if op != 7 {
                    self.set_a(res);
                }
            }
            4 => {
                let res = a & val;
                self.set_flags(res == 0, false, true, false);
                self.set_a(res);
            }
            5 => {
                let res = a ^ val;
                self.set_flags(res == 0, false, false, false);
                self.set_a(res);
            }
            _ => {
                let res = a | val;
                self.set_flags(res == 0, false, false, false);
                self.set_a(res);
            }
        }
    }

    fn daa(&mut self) {
        let mut a = self.a();
        let mut correction = 0u8;
        let mut carry = self.carry;
        if self.half_carry || (!self.negative && (a & 0x0F) > 0x09) {
            correction |= 0x06;
        }
        if self.carry || (!self.negative && a > 0x99) {
            correction |= 0x60;
            carry = true;
        }
        a = if self.negative {
            a.wrapping_sub(correction)
        } else {
            a.wrapping_add(correction)
        };
        self.zero = a == 0;
        self.half_carry = false;
        self.carry = carry;
        self.set_a(a);
    }

    fn add_hl(&mut self, val: u16) {
        let hl = self.hl.pair();
        let res = hl as u32 + val as u32;
        self.negative = false;
        self.half_carry = (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF;
        self.carry = res > 0xFFFF;
        self.hl.set_pair(res as u16);
    }

    /// SP + signed immediate with flags from the unsigned low-byte add.
    fn sp_offset(&mut self, offset: u8) -> u16 {
        let sp = self.sp;
        let val = offset as i8 as i16 as u16;
        self.set_flags(
            false,
            false,
            (sp & 0x0F) + (val & 0x0F) > 0x0F,
            (sp & 0xFF) + (val & 0xFF) > 0xFF,
        );
        sp.wrapping_add(val)
    }

    /// Shift/rotate group shared by RLCA..RRA and the CB prefix.
    fn rotate(&mut self, op: u8, val: u8) -> u8 {
        let (res, carry) = match op {
            // RLC
            0 => (val.rotate_left(1), val & 0x80 != 0),
            // RRC
            1 => (val.rotate_right(1), val & 0x01 != 0),
            // RL
            2 => ((val << 1) | self.carry as u8, val & 0x80 != 0),
            // RR
            3 => ((val >> 1) | (self.carry as u8) << 7, val & 0x01 != 0),
            // SLA
            4 => (val << 1, val & 0x80 != 0),
            // SRA
            5 => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
            // SWAP
            6 => (val.rotate_left(4), false),
            // SRL
            _ => (val >> 1, val & 0x01 != 0),
        };
        self.set_flags(res == 0, false, false, carry);
        res
    }

    fn execute_cb(&mut self, mmu: &mut Mmu) {
        let opcode = self.fetch8(mmu);
        let r = opcode & 0x07;
        let bit = (opcode >> 3) & 0x07;
        let val = self.read_reg(mmu, r);
        match opcode {
            0x00..=0x3F => {
                let res = self.rotate(bit, val);
                self.write_reg(mmu, r, res);
            }
            0x40..=0x7F => {
                // BIT only reads, even for (HL)
                self.zero = val & (1 << bit) == 0;
                self.negative = false;
                self.half_carry = true;
            }
            0x80..=0xBF => self.write_reg(mmu, r, val & !(1 << bit)),
            _ => self.write_reg(mmu, r, val | (1 << bit)),
        }
    }

    /// Dispatch a pending interrupt, or wake from HALT without dispatching
    /// when IME is clear.
    fn service_interrupts(&mut self, mmu: &mut Mmu) {
        if mmu.irq.pending() == 0 {
            return;
        }
        let was_halted = self.halted;
        self.halted = false;
        if !self.ime {
            return;
        }

        if !was_halted {
            self.tick(mmu);
        }
        self.tick(mmu);
        self.ime = false;

        // The high byte may land on IE and change which interrupt is taken.
        self.sp = self.sp.wrapping_sub(1);
        self.write8(mmu, self.sp, (self.pc >> 8) as u8);
        self.tick(mmu);

        let interrupt = mmu.irq.highest_pending();
        if let Some(interrupt) = interrupt {
            mmu.irq.acknowledge(interrupt);
        }
        self.sp = self.sp.wrapping_sub(1);
        self.write8(mmu, self.sp, self.pc as u8);

        self.pc = interrupt.map_or(0x0000, Interrupt::vector);
        self.tick(mmu);
    }

    /// Service interrupts, then fetch and execute one instruction. Returns the
    /// total T-cycle count.
    pub fn step(&mut self, mmu: &mut Mmu) -> Result<u64, CpuError> {
        self.service_interrupts(mmu);

        if self.halted {
            self.tick(mmu);
            return Ok(self.cycles);
        }

        let opcode_pc = self.pc;
        let opcode = self.fetch8(mmu);
        if self.halt_bug {
            self.halt_bug = false;
            self.pc = self.pc.wrapping_sub(1);
        }
        if self.ei_delay {
            self.ei_delay = false;
            self.ime = true;
        }

        match opcode {
            0x00 => {}
            // LD r16,d16
            0x01 | 0x11 | 0x21 | 0x31 => {
                let val = self.fetch16(mmu);
                self.write_r16(opcode >> 4, val);
            }
            // LD (r16),A
            0x02 => self.write8(mmu, self.bc.pair(), self.a()),
            0x12 => self.write8(mmu, self.de.pair(), self.a()),
            0x22 => {
                let hl = self.hl.pair();
                self.write8(mmu, hl, self.a());
                self.hl.set_pair(hl.wrapping_add(1));
            }
            0x32 => {
                let hl = self.hl.pair();
                self.write8(mmu, hl, self.a());
                self.hl.set_pair(hl.wrapping_sub(1));
            }
            // LD A,(r16)
            0x0A => {
                let val = self.read8(mmu, self.bc.pair());
                self.set_a(val);
            }
            0x1A => {
                let val = self.read8(mmu, self.de.pair());
                self.set_a(val);
            }
            0x2A => {
                let hl = self.hl.pair();
                let val = self.read8(mmu, hl);
                self.hl.set_pair(hl.wrapping_add(1));
                self.set_a(val);
            }
            0x3A => {
                let hl = self.hl.pair();
                let val = self.read8(mmu, hl);
                self.hl.set_pair(hl.wrapping_sub(1));
                self.set_a(val);
            }
            // INC r16 / DEC r16
            0x03 | 0x13 | 0x23 | 0x33 => {
                let r = opcode >> 4;
                self.write_r16(r, self.read_r16(r).wrapping_add(1));
                self.tick(mmu);
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let r = opcode >> 4;
                self.write_r16(r, self.read_r16(r).wrapping_sub(1));
                self.tick(mmu);
            }
            // INC r8 / DEC r8 / LD r8,d8
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let r = (opcode >> 3) & 0x07;
                let val = self.read_reg(mmu, r);
                let res = self.inc8(val);
                self.write_reg(mmu, r, res);
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let r = (opcode >> 3) & 0x07;
                let val = self.read_reg(mmu, r);
                let res = self.dec8(val);
                self.write_reg(mmu, r, res);
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let val = self.fetch8(mmu);
                self.write_reg(mmu, (opcode >> 3) & 0x07, val);
            }
            // RLCA / RRCA / RLA / RRA
            0x07 | 0x0F | 0x17 | 0x1F => {
                let res = self.rotate(opcode >> 3, self.a());
                self.zero = false;
                self.set_a(res);
            }
            0x08 => {
                let addr = self.fetch16(mmu);
                self.write8(mmu, addr, self.sp as u8);
                self.write8(mmu, addr.wrapping_add(1), (self.sp >> 8) as u8);
            }
            // ADD HL,r16
            0x09 | 0x19 | 0x29 | 0x39 => {
                self.add_hl(self.read_r16(opcode >> 4));
                self.tick(mmu);
            }
            0x10 => {
                // STOP: skip the padding byte and reset DIV
                self.fetch8(mmu);
                mmu.timer.reset_div();
            }
            0x18 => {
                let offset = self.fetch8(mmu) as i8;
                self.pc = self.pc.wrapping_add(offset as u16);
                self.tick(mmu);
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                let offset = self.fetch8(mmu) as i8;
                if self.condition(Self::condition_from(opcode)) {
                    self.pc = self.pc.wrapping_add(offset as u16);
                    self.tick(mmu);
                }
            }
            0x27 => self.daa(),
            0x2F => {
                self.set_a(!self.a());
                self.negative = true;
                self.half_carry = true;
            }
            0x37 => {
                self.negative = false;
                self.half_carry = false;
                self.carry = true;
            }
            0x3F => {
                self.negative = false;
                self.half_carry = false;
                self.carry = !self.carry;
            }
            0x76 => {
                if self.ime || mmu.irq.pending() == 0 {
                    self.halted = true;
                } else {
                    self.halt_bug = true;
                }
            }
            // LD r8,r8
            0x40..=0x7F => {
                let val = self.read_reg(mmu, opcode & 0x07);
                self.write_reg(mmu, (opcode >> 3) & 0x07, val);
            }
            // ALU A,r8
            0x80..=0xBF => {
                let val = self.read_reg(mmu, opcode & 0x07);
                self.alu((opcode >> 3) & 0x07, val);
            }
            // ALU A,d8
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let val = self.fetch8(mmu);
                self.alu((opcode >> 3) & 0x07, val);
            }
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                self.tick(mmu);
                if self.condition(Self::condition_from(opcode)) {
                    self.pc = self.pop_stack(mmu);
                    self.tick(mmu);
                }
            }
            0xC9 => {
                self.pc = self.pop_stack(mmu);
                self.tick(mmu);
            }
            0xD9 => {
                self.ime = true;
                self.pc = self.pop_stack(mmu);
                self.tick(mmu);
            }
            // POP
            0xC1 => {
                let val = self.pop_stack(mmu);
                self.bc.set_pair(val);
            }
            0xD1 => {
                let val = self.pop_stack(mmu);
                self.de.set_pair(val);
            }
            0xE1 => {
                let val = self.pop_stack(mmu);
                self.hl.set_pair(val);
            }
            0xF1 => {
                let val = self.pop_stack(mmu);
                self.set_af(val);
            }
            // PUSH
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let val = match opcode {
                    0xC5 => self.bc.pair(),
                    0xD5 => self.de.pair(),
                    0xE5 => self.hl.pair(),
                    _ => self.af(),
                };
                self.tick(mmu);
                self.push_stack(mmu, val);
            }
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                let addr = self.fetch16(mmu);
                if self.condition(Self::condition_from(opcode)) {
                    self.pc = addr;
                    self.tick(mmu);
                }
            }
            0xC3 => {
                self.pc = self.fetch16(mmu);
                self.tick(mmu);
            }
            0xE9 => self.pc = self.hl.pair(),
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                let addr = self.fetch16(mmu);
                if self.condition(Self::condition_from(opcode)) {
                    self.tick(mmu);
                    self.push_stack(mmu, self.pc);
                    self.pc = addr;
                }
            }
            0xCD => {
                let addr = self.fetch16(mmu);
                self.tick(mmu);
                self.push_stack(mmu, self.pc);
                self.pc = addr;
            }
            // RST n
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.tick(mmu);
                self.push_stack(mmu, self.pc);
                self.pc = (opcode & 0x38) as u16;
            }
            0xCB => self.execute_cb(mmu),
            0xE0 => {
                let addr = 0xFF00 | self.fetch8(mmu) as u16;
                self.write8(mmu, addr, self.a());
            }
            0xF0 => {
                let addr = 0xFF00 | self.fetch8(mmu) as u16;
                let val = self.read8(mmu, addr);
                self.set_a(val);
            }
            0xE2 => self.write8(mmu, 0xFF00 | self.bc.low() as u16, self.a()),
            0xF2 => {
                let val = self.read8(mmu, 0xFF00 | self.bc.low() as u16);
                self.set_a(val);
            }
            0xEA => {
                let addr = self.fetch16(mmu);
                self.write8(mmu, addr, self.a());
            }
            0xFA => {
                let addr = self.fetch16(mmu);
                let val = self.read8(mmu, addr);
                self.set_a(val);
            }
            0xE8 => {
                let offset = self.fetch8(mmu);
                self.sp = self.sp_offset(offset);
                self.tick(mmu);
                self.tick(mmu);
            }
            0xF8 => {
                let offset = self.fetch8(mmu);
                let val = self.sp_offset(offset);
                self.hl.set_pair(val);
                self.tick(mmu);
            }
            0xF9 => {
                self.sp = self.hl.pair();
                self.tick(mmu);
            }
            0xF3 => {
                self.ime = false;
                self.ei_delay = false;
            }
            0xFB => self.ei_delay = true,
            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
                log::error!("Illegal opcode {opcode:02X} at {opcode_pc:04X}");
                return Err(CpuError::IllegalOpcode {
                    opcode,
                    pc: opcode_pc,
                });
            }
        }

        Ok(self.cycles)
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
