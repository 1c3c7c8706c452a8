use crate::interrupts::{Interrupt, Interrupts};

const SELECT_DPAD: u8 = 0x10;
const SELECT_BUTTONS: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl Button {
    /// Bit in the combined pressed mask: d-pad in the low nibble, buttons in
    /// the high nibble.
    fn mask(self) -> u8 {
        match self {
            Button::Right => 0x01,
            Button::Left => 0x02,
            Button::Up => 0x04,
            Button::Down => 0x08,
            Button::A => 0x10,
            Button::B => 0x20,
            Button::Select => 0x40,
            Button::Start => 0x80,
        }
    }
}

/// The P1/JOYP register at 0xFF00.
#[derive(Debug, Clone)]
pub struct Joypad {
    /// Bits 4/5 as last written (0 = group selected)
    select: u8,
    /// 1 = pressed
    pressed: u8,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            select: SELECT_DPAD | SELECT_BUTTONS,
            pressed: 0,
        }
    }

    pub fn read(&self) -> u8 {
        0xC0 | self.select | self.nibble()
    }

    pub fn write(&mut self, val: u8) {
        self.select = val & (SELECT_DPAD | SELECT_BUTTONS);
    }

    pub fn press(&mut self, button: Button, irq: &mut Interrupts) {
        let before = self.nibble();
        self.pressed |= button.mask();
        // high-to-low transition on any selected input line
        if before & !self.nibble() != 0 {
            irq.request(Interrupt::Joypad);
        }
    }

    pub fn release(&mut self, button: Button) {
        self.pressed &= !button.mask();
    }

    /// Active-low state of the selected lines.
    fn nibble(&self) -> u8 {
        let mut lines = 0;
        if self.select & SELECT_DPAD == 0 {
            lines |= self.pressed & 0x0F;
        }
        if self.select & SELECT_BUTTONS == 0 {
            lines |= self.pressed >> 4;
        }
        !lines & 0x0F
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}
