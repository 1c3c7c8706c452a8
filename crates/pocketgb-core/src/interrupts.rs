// Interrupt vectors (gbdev.io/pandocs/Interrupts.html)
const VECTOR_VBLANK: u16 = 0x40;
const VECTOR_STAT: u16 = 0x48;
const VECTOR_TIMER: u16 = 0x50;
const VECTOR_SERIAL: u16 = 0x58;
const VECTOR_JOYPAD: u16 = 0x60;

/// Only the low five bits of IE/IF take part in dispatch.
pub const INTERRUPT_MASK: u8 = 0x1F;

/// Interrupt sources in priority order (VBlank is serviced first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank,
    Stat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    const PRIORITY: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::Stat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    /// IE/IF bit for this source.
    pub fn bit(self) -> u8 {
        match self {
            Interrupt::VBlank => 0x01,
            Interrupt::Stat => 0x02,
            Interrupt::Timer => 0x04,
            Interrupt::Serial => 0x08,
            Interrupt::Joypad => 0x10,
        }
    }

    /// Address the CPU jumps to when servicing this source.
    pub fn vector(self) -> u16 {
        match self {
            Interrupt::VBlank => VECTOR_VBLANK,
            Interrupt::Stat => VECTOR_STAT,
            Interrupt::Timer => VECTOR_TIMER,
            Interrupt::Serial => VECTOR_SERIAL,
            Interrupt::Joypad => VECTOR_JOYPAD,
        }
    }
}

/// The IE (0xFFFF) and IF (0xFF0F) registers.
///
/// Peripherals only ever set IF bits through [`Interrupts::request`]; the CPU
/// reads [`Interrupts::pending`] and clears a bit with
/// [`Interrupts::acknowledge`] when it dispatches.
#[derive(Debug, Clone, Default)]
pub struct Interrupts {
    /// Interrupt enable register. All eight bits are stored.
    pub ie: u8,
    /// Interrupt flag register (low five bits).
    flags: u8,
}

impl Interrupts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, interrupt: Interrupt) {
        self.flags |= interrupt.bit();
    }

    pub fn acknowledge(&mut self, interrupt: Interrupt) {
        self.flags &= !interrupt.bit();
    }

    /// IF as seen on the bus: unused upper bits read as 1.
    pub fn read_if(&self) -> u8 {
        self.flags | 0xE0
    }

    pub fn write_if(&mut self, val: u8) {
        self.flags = val & INTERRUPT_MASK;
    }

    /// Bits that are both requested and enabled.
    pub fn pending(&self) -> u8 {
        self.ie & self.flags & INTERRUPT_MASK
    }

    /// Highest-priority source that is requested and enabled.
    pub fn highest_pending(&self) -> Option<Interrupt> {
        let pending = self.pending();
        Interrupt::PRIORITY
            .into_iter()
            .find(|i| pending & i.bit() != 0)
    }

    pub fn is_requested(&self, interrupt: Interrupt) -> bool {
        self.flags & interrupt.bit() != 0
    }
}
