use crate::interrupts::{Interrupt, Interrupts};

/// T-cycles the divider advances per machine cycle.
const DIV_STEP: u16 = 4;

pub struct Timer {
    /// 16-bit internal divider counter. DIV register is the upper 8 bits.
    pub div: u16,
    /// Timer counter
    pub tima: u8,
    /// Timer modulo
    pub tma: u8,
    /// Timer control
    pub tac: u8,
    /// Edge signal sampled on the previous machine cycle
    last_signal: bool,
    /// TIMA overflowed and will be reloaded from TMA on the next cycle
    reload_pending: bool,
    /// The reload is being applied this cycle
    reloading: bool,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            div: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            last_signal: false,
            reload_pending: false,
            reloading: false,
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.div >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF04 => self.reset_div(),
            0xFF05 => {
                // the reload wins over a write in the same cycle
                if self.reloading {
                    return;
                }
                self.tima = val;
                self.reload_pending = false;
            }
            0xFF06 => {
                self.tma = val;
                if self.reloading {
                    self.tima = val;
                }
            }
            0xFF07 => {
                self.tac = val & 0x07;
                let new = Self::signal_with(self.div, self.tac);
                if self.last_signal && !new {
                    self.increment();
                }
                self.last_signal = new;
            }
            _ => {}
        }
    }

    /// Advance the timer by one machine cycle.
    pub fn tick(&mut self, irq: &mut Interrupts) {
        self.reloading = false;
        if self.reload_pending {
            self.reload_pending = false;
            self.reloading = true;
            self.tima = self.tma;
            irq.request(Interrupt::Timer);
        }

        self.div = self.div.wrapping_add(DIV_STEP);
        let new = Self::signal_with(self.div, self.tac);
        if self.last_signal && !new {
            self.increment();
        }
        self.last_signal = new;
    }

    /// Reset the internal divider counter, applying TIMA edge logic.
    pub fn reset_div(&mut self) {
        self.div = 0;
        let new = Self::signal_with(self.div, self.tac);
        if self.last_signal && !new {
            self.increment();
        }
        self.last_signal = new;
    }

    /// True while TIMA has overflowed but not yet been reloaded.
    pub fn reload_pending(&self) -> bool {
        self.reload_pending
    }

    fn increment(&mut self) {
        self.tima = self.tima.wrapping_add(1);
        if self.tima == 0 {
            self.reload_pending = true;
        }
    }

    fn timer_bit_with(div: u16, tac: u8) -> u8 {
        match tac & 0x03 {
            0x00 => ((div >> 9) & 1) as u8,
            0x01 => ((div >> 3) & 1) as u8,
            0x02 => ((div >> 5) & 1) as u8,
            _ => ((div >> 7) & 1) as u8,
        }
    }

    fn signal_with(div: u16, tac: u8) -> bool {
        if tac & 0x04 == 0 {
            false
        } else {
            Self::timer_bit_with(div, tac) != 0
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
