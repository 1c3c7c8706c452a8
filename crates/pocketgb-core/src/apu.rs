//! Sound register file. Values are latched so software can read them back,
//! but no audio is generated.

const REG_BASE: u16 = 0xFF10;
const REG_COUNT: usize = 0x30;

pub struct Apu {
    regs: [u8; REG_COUNT],
}

impl Apu {
    pub fn new() -> Self {
        Self {
            regs: [0; REG_COUNT],
        }
    }

    /// Register state left behind by the boot ROM.
    pub fn apply_boot_state(&mut self) {
        for (addr, val) in [
            (0xFF10, 0x80),
            (0xFF11, 0xBF),
            (0xFF12, 0xF3),
            (0xFF14, 0xBF),
            (0xFF16, 0x3F),
            (0xFF19, 0xBF),
            (0xFF1A, 0x7F),
            (0xFF1B, 0xFF),
            (0xFF1C, 0x9F),
            (0xFF1E, 0xBF),
            (0xFF20, 0xFF),
            (0xFF23, 0xBF),
            (0xFF24, 0x77),
            (0xFF25, 0xF3),
            (0xFF26, 0xF1),
        ] {
            self.write_reg(addr, val);
        }
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match Self::index(addr) {
            Some(i) => self.regs[i] | Self::read_mask(addr),
            None => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        if let Some(i) = Self::index(addr) {
            self.regs[i] = val;
        }
    }

    fn index(addr: u16) -> Option<usize> {
        let i = addr.checked_sub(REG_BASE)? as usize;
        (i < REG_COUNT).then_some(i)
    }

    /// Bits that always read back as 1 on DMG.
    fn read_mask(addr: u16) -> u8 {
        match addr {
            0xFF10 => 0x80,
            0xFF11 | 0xFF16 => 0x3F,
            0xFF13 | 0xFF18 | 0xFF1B | 0xFF1D | 0xFF20 => 0xFF,
            0xFF14 | 0xFF19 | 0xFF1E | 0xFF23 => 0xBF,
            0xFF1A => 0x7F,
            0xFF1C => 0x9F,
            0xFF12 | 0xFF17 | 0xFF21 | 0xFF22 | 0xFF24 | 0xFF25 => 0x00,
            0xFF26 => 0x70,
            0xFF30..=0xFF3F => 0x00,
            _ => 0xFF,
        }
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_read_back_through_masks() {
        let mut apu = Apu::new();
        apu.write_reg(0xFF12, 0xA5);
        assert_eq!(apu.read_reg(0xFF12), 0xA5);
        apu.write_reg(0xFF11, 0x00);
        assert_eq!(apu.read_reg(0xFF11), 0x3F);
        apu.write_reg(0xFF13, 0x12);
        assert_eq!(apu.read_reg(0xFF13), 0xFF);
        assert_eq!(apu.read_reg(0xFF15), 0xFF);
        assert_eq!(apu.read_reg(0xFF27), 0xFF);
    }

    #[test]
    fn wave_ram_is_plain_storage() {
        let mut apu = Apu::new();
        for (i, addr) in (0xFF30..=0xFF3F).enumerate() {
            apu.write_reg(addr, i as u8 * 0x11);
        }
        assert_eq!(apu.read_reg(0xFF30), 0x00);
        assert_eq!(apu.read_reg(0xFF3F), 0xFF);
        assert_eq!(apu.read_reg(0xFF35), 0x55);
    }
}
