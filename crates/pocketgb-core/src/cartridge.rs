use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;

const HEADER_END: usize = 0x150;
const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("failed to read ROM: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported cartridge type {0:#04X}")]
    UnsupportedMapper(u8),
    #[error("ROM is truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("unknown ROM size code {0:#04X}")]
    UnknownRomSize(u8),
    #[error("unknown RAM size code {0:#04X}")]
    UnknownRamSize(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    NoMbc,
    Mbc1,
    Mbc3,
}

#[derive(Debug)]
enum MbcState {
    NoMbc,
    Mbc1 {
        /// 5-bit low bank register, never 0
        rom_bank: u8,
        /// 2-bit upper bank / RAM bank register
        upper_bits: u8,
        mode: u8,
        ram_enable: bool,
    },
    Mbc3 {
        rom_bank: u8,
        /// 0-3 select RAM, 0x08-0x0C would select RTC registers
        ram_bank: u8,
        ram_enable: bool,
    },
}

#[derive(Debug)]
pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub mbc: MbcType,
    pub title: String,
    cart_type: u8,
    save_path: Option<PathBuf>,
    mbc_state: MbcState,
}

impl Cartridge {
    /// Load a ROM image from disk, restoring battery RAM from the sibling
    /// `.sav` file when the cartridge has one.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let data = fs::read(&path)?;
        let mut cart = Self::load(data)?;

        if cart.has_battery() {
            let save = path.as_ref().with_extension("sav");
            match fs::read(&save) {
                Ok(bytes) => {
                    for (d, s) in cart.ram.iter_mut().zip(bytes.iter()) {
                        *d = *s;
                    }
                    log::info!("Loaded save data from {}", save.display());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to read {}: {e}", save.display()),
            }
            cart.save_path = Some(save);
        }

        log::info!(
            "Loaded ROM: {} (MBC: {:?}, ROM: {} KiB, RAM: {} KiB)",
            cart.title,
            cart.mbc,
            cart.rom.len() / 1024,
            cart.ram.len() / 1024
        );
        Ok(cart)
    }

    /// Build a cartridge from an in-memory ROM image.
    pub fn load(data: Vec<u8>) -> Result<Self, CartridgeError> {
        let header = Header::parse(&data)?;
        let rom_size = header.rom_size()?;
        if data.len() < rom_size {
            return Err(CartridgeError::Truncated {
                expected: rom_size,
                actual: data.len(),
            });
        }

        let cart_type = header.cart_type();
        let mbc = header.mbc_type()?;
        let ram_size = if header.has_ram() {
            header.ram_size()?
        } else {
            0
        };
        let title = header.title();

        let mbc_state = match mbc {
            MbcType::NoMbc => MbcState::NoMbc,
            MbcType::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                upper_bits: 0,
                mode: 0,
                ram_enable: false,
            },
            MbcType::Mbc3 => MbcState::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
            },
        };

        Ok(Self {
            rom: data,
            ram: vec![0; ram_size],
            mbc,
            title,
            cart_type,
            save_path: None,
            mbc_state,
        })
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.read_rom(self.low_bank() * ROM_BANK_SIZE + addr as usize),
            0x4000..=0x7FFF => {
                self.read_rom(self.high_bank() * ROM_BANK_SIZE + (addr as usize - 0x4000))
            }
            0xA000..=0xBFFF => match self.ram_index(addr) {
                Some(idx) => self.ram[idx],
                None => 0xFF,
            },
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        if (0xA000..=0xBFFF).contains(&addr) {
            if let Some(idx) = self.ram_index(addr) {
                self.ram[idx] = val;
            }
            return;
        }
        match (&mut self.mbc_state, addr) {
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF)
            | (MbcState::Mbc3 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = (val & 0x1F).max(1);
            }
            (MbcState::Mbc1 { upper_bits, .. }, 0x4000..=0x5FFF) => {
                *upper_bits = val & 0x03;
            }
            (MbcState::Mbc1 { mode, .. }, 0x6000..=0x7FFF) => {
                *mode = val & 0x01;
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = (val & 0x7F).max(1);
            }
            (MbcState::Mbc3 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val;
            }
            // RTC latch, no clock present
            (MbcState::Mbc3 { .. }, 0x6000..=0x7FFF) => {}
            _ => {}
        }
    }

    fn read_rom(&self, offset: usize) -> u8 {
        self.rom.get(offset).copied().unwrap_or(0xFF)
    }

    fn rom_bank_count(&self) -> usize {
        (self.rom.len() / ROM_BANK_SIZE).max(1)
    }

    /// Bank mapped at 0x0000-0x3FFF.
    fn low_bank(&self) -> usize {
        match &self.mbc_state {
            MbcState::Mbc1 {
                upper_bits,
                mode: 1,
                ..
            } => ((*upper_bits as usize) << 5) % self.rom_bank_count(),
            _ => 0,
        }
    }

    /// Bank mapped at 0x4000-0x7FFF.
    fn high_bank(&self) -> usize {
        let bank = match &self.mbc_state {
            MbcState::NoMbc => 1,
            MbcState::Mbc1 {
                rom_bank,
                upper_bits,
                ..
            } => ((*upper_bits as usize) << 5) | *rom_bank as usize,
            MbcState::Mbc3 { rom_bank, .. } => *rom_bank as usize,
        };
        bank % self.rom_bank_count()
    }

    /// Offset into `ram` for an access at `addr`, or `None` when RAM is
    /// disabled, absent or not selected.
    fn ram_index(&self, addr: u16) -> Option<usize> {
        if self.ram.is_empty() {
            return None;
        }
        let bank_count = self.ram.len().div_ceil(RAM_BANK_SIZE);
        let offset = addr as usize - 0xA000;
        let bank = match &self.mbc_state {
            MbcState::NoMbc => 0,
            MbcState::Mbc1 {
                ram_enable: false, ..
            }
            | MbcState::Mbc3 {
                ram_enable: false, ..
            } => return None,
            MbcState::Mbc1 {
                upper_bits, mode, ..
            } => {
                if *mode == 0 {
                    0
                } else {
                    *upper_bits as usize % bank_count
                }
            }
            MbcState::Mbc3 { ram_bank, .. } => match *ram_bank {
                0x00..=0x03 => *ram_bank as usize % bank_count,
                _ => return None,
            },
        };
        // 2 KiB RAM mirrors within its bank
        Some((bank * RAM_BANK_SIZE + offset) % self.ram.len())
    }

    pub fn has_battery(&self) -> bool {
        matches!(self.cart_type, 0x03 | 0x09 | 0x0F | 0x10 | 0x13)
    }

    pub fn save_path(&self) -> Option<&Path> {
        self.save_path.as_deref()
    }

    /// Write battery-backed RAM to the `.sav` file chosen at load time.
    pub fn save_ram(&self) -> io::Result<()> {
        if let (true, Some(path)) = (self.has_battery(), &self.save_path)
            && !self.ram.is_empty()
        {
            fs::write(path, &self.ram)?;
            log::info!("Saved {} bytes to {}", self.ram.len(), path.display());
        }
        Ok(())
    }
}

struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    fn parse(data: &'a [u8]) -> Result<Self, CartridgeError> {
        if data.len() < HEADER_END {
            return Err(CartridgeError::Truncated {
                expected: HEADER_END,
                actual: data.len(),
            });
        }
        Ok(Self { data })
    }

    fn title(&self) -> String {
        let mut slice = &self.data[0x0134..0x0144];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn cart_type(&self) -> u8 {
        self.data[0x0147]
    }

    fn mbc_type(&self) -> Result<MbcType, CartridgeError> {
        match self.cart_type() {
            0x00 | 0x08 | 0x09 => Ok(MbcType::NoMbc),
            0x01..=0x03 => Ok(MbcType::Mbc1),
            0x0F..=0x13 => Ok(MbcType::Mbc3),
            other => Err(CartridgeError::UnsupportedMapper(other)),
        }
    }

    fn has_ram(&self) -> bool {
        matches!(self.cart_type(), 0x02 | 0x03 | 0x08 | 0x09 | 0x10 | 0x12 | 0x13)
    }

    fn rom_size(&self) -> Result<usize, CartridgeError> {
        match self.data[0x0148] {
            code @ 0x00..=0x08 => Ok((32 * 1024) << code),
            other => Err(CartridgeError::UnknownRomSize(other)),
        }
    }

    fn ram_size(&self) -> Result<usize, CartridgeError> {
        match self.data[0x0149] {
            0x00 => Ok(0),
            0x01 => Ok(0x800),
            0x02 => Ok(0x2000),
            0x03 => Ok(0x8000),
            0x04 => Ok(0x20000),
            0x05 => Ok(0x10000),
            other => Err(CartridgeError::UnknownRamSize(other)),
        }
    }
}
