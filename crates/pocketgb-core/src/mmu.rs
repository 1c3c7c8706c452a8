use crate::{
    apu::Apu,
    cartridge::Cartridge,
    input::{Button, Joypad},
    interrupts::Interrupts,
    ppu::Ppu,
    serial::Serial,
    timer::Timer,
};

const WRAM_SIZE: usize = 0x2000;
const HRAM_SIZE: usize = 0x7F;
const BOOT_ROM_SIZE: usize = 0x100;

const OAM_DMA_LENGTH: u16 = 160;
/// Two setup cycles precede the first byte copy.
const OAM_DMA_START: u16 = OAM_DMA_LENGTH + 2;

/// Which physical bus an address is decoded on while OAM DMA runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bus {
    External,
    Video,
    Other,
}

impl Bus {
    fn of(addr: u16) -> Self {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xFDFF => Bus::External,
            0x8000..=0x9FFF => Bus::Video,
            _ => Bus::Other,
        }
    }
}

#[derive(Debug, Default)]
struct OamDma {
    /// Machine cycles left, including the start delay. 0 when idle.
    remaining: u16,
    source: u16,
    last_byte: u8,
}

impl OamDma {
    /// Copying bytes, as opposed to idle or still in the start delay.
    fn transferring(&self) -> bool {
        self.remaining > 0 && self.remaining <= OAM_DMA_LENGTH
    }
}

pub struct Mmu {
    pub wram: [u8; WRAM_SIZE],
    pub hram: [u8; HRAM_SIZE],
    pub cart: Option<Cartridge>,
    pub boot_rom: Option<Vec<u8>>,
    pub boot_mapped: bool,
    pub irq: Interrupts,
    pub timer: Timer,
    pub ppu: Ppu,
    pub apu: Apu,
    pub serial: Serial,
    pub joypad: Joypad,
    dma: OamDma,
}

impl Mmu {
    pub fn new() -> Self {
        Self {
            wram: [0; WRAM_SIZE],
            hram: [0; HRAM_SIZE],
            cart: None,
            boot_rom: None,
            boot_mapped: false,
            irq: Interrupts::new(),
            timer: Timer::new(),
            ppu: Ppu::new(),
            apu: Apu::new(),
            serial: Serial::new(),
            joypad: Joypad::new(),
            dma: OamDma::default(),
        }
    }

    /// I/O state as the DMG boot ROM leaves it when it hands over to the
    /// cartridge at 0x0100.
    pub fn apply_boot_state(&mut self) {
        // two warm-up timer ticks bring this to 0xABCC
        self.timer.div = 0xABC4;
        self.irq.write_if(0x01);
        self.ppu.apply_boot_state(&mut self.irq);
        self.apu.apply_boot_state();
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    /// Map a 256-byte boot ROM over 0x0000-0x00FF until 0xFF50 is written.
    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        if data.len() != BOOT_ROM_SIZE {
            log::warn!(
                "Boot ROM is {} bytes, expected {}",
                data.len(),
                BOOT_ROM_SIZE
            );
        }
        self.boot_rom = Some(data);
        self.boot_mapped = true;
    }

    pub fn save_cart_ram(&self) {
        if let Some(cart) = &self.cart
            && let Err(e) = cart.save_ram()
        {
            log::warn!("Failed to save RAM: {e}");
        }
    }

    pub fn press(&mut self, button: Button) {
        self.joypad.press(button, &mut self.irq);
    }

    pub fn release(&mut self, button: Button) {
        self.joypad.release(button);
    }

    pub fn take_serial(&mut self) -> Vec<u8> {
        self.serial.take_output()
    }

    /// Return true while an OAM DMA transfer is armed or copying.
    pub fn dma_active(&self) -> bool {
        self.dma.remaining > 0
    }

    /// CPU-visible read, including DMA bus conflicts.
    pub fn read_byte(&self, addr: u16) -> u8 {
        if self.dma.remaining > 0 && addr < 0xFF00 && !self.boot_overlay_hit(addr) {
            if self.dma.transferring() && addr >= 0xFE00 {
                return 0xFF;
            }
            if Bus::of(addr) == Bus::of(self.dma.source) {
                return self.dma.last_byte;
            }
        }
        self.read_mapped(addr)
    }

    fn boot_overlay_hit(&self, addr: u16) -> bool {
        self.boot_mapped && (addr as usize) < BOOT_ROM_SIZE
    }

    fn read_mapped(&self, addr: u16) -> u8 {
        if self.boot_overlay_hit(addr) {
            return self
                .boot_rom
                .as_ref()
                .and_then(|b| b.get(addr as usize).copied())
                .unwrap_or(0xFF);
        }
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF)
            }
            0x8000..=0x9FFF => self.ppu.read_vram(addr),
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => self.ppu.read_oam(addr),
            0xFEA0..=0xFEFF => 0x00,
            0xFF00 => self.joypad.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.irq.read_if(),
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => self.ppu.read_reg(addr),
            0xFF46 => (self.dma.source >> 8) as u8,
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.irq.ie,
            _ => 0xFF,
        }
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => {
                if !self.boot_mapped
                    && let Some(cart) = self.cart.as_mut()
                {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => self.ppu.write_vram(addr, val),
            0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = val,
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = val,
            0xFE00..=0xFE9F => {
                if !self.dma.transferring() {
                    self.ppu.write_oam(addr, val);
                }
            }
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.joypad.write(val),
            0xFF01 | 0xFF02 => self.serial.write(addr, val),
            0xFF04..=0xFF07 => self.timer.write(addr, val),
            0xFF0F => self.irq.write_if(val),
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => self.ppu.write_reg(addr, val, &mut self.irq),
            0xFF46 => self.start_dma(val),
            0xFF50 => {
                if self.boot_mapped {
                    log::debug!("Boot ROM unmapped");
                }
                self.boot_mapped = false;
            }
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.irq.ie = val,
            _ => {}
        }
    }

    fn start_dma(&mut self, page: u8) {
        // a restart is only accepted before copying begins
        if self.dma.transferring() {
            log::trace!("OAM DMA restart from {page:02X}00 ignored");
            return;
        }
        self.dma.source = (page as u16) << 8;
        self.dma.remaining = OAM_DMA_START;
        log::trace!("OAM DMA armed from {:04X}", self.dma.source);
    }

    /// Read used by the DMA engine. Pages 0xFE and 0xFF alias the WRAM echo.
    fn dma_source_read(&self, addr: u16) -> u8 {
        if addr >= 0xFE00 {
            self.read_mapped(addr - 0x2000)
        } else {
            self.read_mapped(addr)
        }
    }

    /// Advance the ongoing OAM DMA transfer by one machine cycle.
    fn dma_step(&mut self) {
        if self.dma.remaining == 0 {
            return;
        }
        if self.dma.transferring() {
            let index = OAM_DMA_LENGTH - self.dma.remaining;
            let byte = self.dma_source_read(self.dma.source.wrapping_add(index));
            self.ppu.dma_write_oam(index as usize, byte);
            self.dma.last_byte = byte;
        }
        self.dma.remaining -= 1;
    }

    /// Advance every peripheral by one machine cycle.
    pub fn tick(&mut self) {
        self.dma_step();
        self.timer.tick(&mut self.irq);
        self.ppu.tick(&mut self.irq);
        self.serial.tick(&mut self.irq);
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}
