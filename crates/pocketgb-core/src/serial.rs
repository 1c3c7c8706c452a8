use crate::interrupts::{Interrupt, Interrupts};

/// T-cycles per shifted bit with the 8192 Hz internal clock.
const CYCLES_PER_BIT: u32 = 512;
const TRANSFER_CYCLES: u32 = CYCLES_PER_BIT * 8;

/// SB/SC registers. Only internal-clock transfers ever complete.
pub struct Serial {
    sb: u8,
    sc: u8,
    out_buf: Vec<u8>,
    /// Whether sent bytes are kept in `out_buf`
    capture: bool,
    /// T-cycles left in the running transfer
    remaining: Option<u32>,
}

impl Serial {
    pub fn new() -> Self {
        Self {
            sb: 0,
            sc: 0,
            out_buf: Vec::new(),
            capture: true,
            remaining: None,
        }
    }

    /// Stop or resume recording sent bytes. Disabling drops anything
    /// not yet taken.
    pub fn set_capture(&mut self, capture: bool) {
        self.capture = capture;
        if !capture {
            self.out_buf = Vec::new();
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF01 => self.sb,
            0xFF02 => self.sc | 0x7E,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF01 => self.sb = val,
            0xFF02 => {
                self.sc = val & 0x81;
                self.remaining = if val & 0x81 == 0x81 {
                    if self.capture {
                        self.out_buf.push(self.sb);
                    }
                    Some(TRANSFER_CYCLES)
                } else {
                    None
                };
            }
            _ => {}
        }
    }

    /// Advance by one machine cycle.
    pub fn tick(&mut self, irq: &mut Interrupts) {
        let Some(remaining) = self.remaining else {
            return;
        };
        let remaining = remaining.saturating_sub(4);
        if remaining > 0 {
            self.remaining = Some(remaining);
            return;
        }
        self.remaining = None;
        // nothing on the other end of the cable
        self.sb = 0xFF;
        self.sc &= 0x7F;
        irq.request(Interrupt::Serial);
    }

    /// Drain the bytes sent so far.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out_buf)
    }

    pub fn peek_output(&self) -> &[u8] {
        &self.out_buf
    }
}

impl Default for Serial {
    fn default() -> Self {
        Self::new()
    }
}
