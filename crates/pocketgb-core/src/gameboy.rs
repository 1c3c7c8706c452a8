use crate::{
    cartridge::Cartridge,
    cpu::{Cpu, CpuError},
    input::Button,
    mmu::Mmu,
    ppu::{SCREEN_HEIGHT, SCREEN_WIDTH},
};

/// T-cycles in one full frame (154 lines of 456 cycles).
pub const CYCLES_PER_FRAME: u64 = 70224;

pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
}

impl GameBoy {
    /// Machine in the post-boot state, as if the boot ROM had just handed
    /// over to the cartridge.
    pub fn new(cart: Cartridge) -> Self {
        let mut mmu = Mmu::new();
        mmu.load_cart(cart);
        mmu.apply_boot_state();
        let mut gb = Self {
            cpu: Cpu::new_post_boot(),
            mmu,
        };
        gb.warm_up();
        gb
    }

    /// Machine at power-on with the boot ROM mapped over 0x0000-0x00FF.
    pub fn new_with_boot_rom(cart: Cartridge, boot_rom: Vec<u8>) -> Self {
        let mut mmu = Mmu::new();
        mmu.load_cart(cart);
        mmu.load_boot_rom(boot_rom);
        let mut gb = Self {
            cpu: Cpu::new(),
            mmu,
        };
        gb.warm_up();
        gb
    }

    /// Phase alignment between the peripherals and the first CPU fetch.
    fn warm_up(&mut self) {
        self.mmu.timer.tick(&mut self.mmu.irq);
        self.mmu.timer.tick(&mut self.mmu.irq);
        self.mmu.ppu.tick(&mut self.mmu.irq);
    }

    /// Execute one instruction (or one halted cycle).
    pub fn step(&mut self) -> Result<u64, CpuError> {
        self.cpu.step(&mut self.mmu)
    }

    /// Run until the PPU finishes a frame, or one frame's worth of cycles
    /// when the LCD is off.
    pub fn run_frame(&mut self) -> Result<(), CpuError> {
        self.run_frame_until(u64::MAX).map(|_| ())
    }

    /// `run_frame` that also stops once the cycle counter reaches
    /// `cycle_limit`. Returns false if the limit cut the frame short.
    pub fn run_frame_until(&mut self, cycle_limit: u64) -> Result<bool, CpuError> {
        let start = self.cpu.cycles;
        while !self.mmu.ppu.frame_ready() && self.cpu.cycles - start < CYCLES_PER_FRAME {
            if self.cpu.cycles >= cycle_limit {
                return Ok(false);
            }
            self.cpu.step(&mut self.mmu)?;
        }
        self.mmu.ppu.clear_frame_flag();
        Ok(true)
    }

    pub fn framebuffer(&self) -> &[u32; SCREEN_WIDTH * SCREEN_HEIGHT] {
        self.mmu.ppu.framebuffer()
    }

    pub fn press(&mut self, button: Button) {
        self.mmu.press(button);
    }

    pub fn release(&mut self, button: Button) {
        self.mmu.release(button);
    }

    /// Bytes the game has sent over the serial port since the last call.
    pub fn take_serial(&mut self) -> Vec<u8> {
        self.mmu.take_serial()
    }

    /// Turn recording of serial output on or off (on by default).
    pub fn set_serial_capture(&mut self, capture: bool) {
        self.mmu.serial.set_capture(capture);
    }

    /// Flush battery-backed cartridge RAM to its save file.
    pub fn save_ram(&self) {
        self.mmu.save_cart_ram();
    }
}
