//! Cycle-accurate DMG Game Boy emulation core.
//!
//! Every CPU bus access advances the rest of the machine by one machine
//! cycle through [`mmu::Mmu::tick`]. Frontends drive the core through the
//! [`gameboy`] facade.

/// Sound register file (no synthesis).
pub mod apu;

/// Cartridge header parsing, mappers and battery RAM.
pub mod cartridge;

/// SM83 CPU core.
pub mod cpu;

/// High-level facade that wires the CPU and MMU into a single machine.
pub mod gameboy;

/// Joypad input register and edge-triggered interrupt behavior.
pub mod input;

/// IE/IF registers and interrupt priority.
pub mod interrupts;

/// Memory map, OAM DMA and the per-cycle clock fan-out.
pub mod mmu;

/// Pixel Processing Unit (PPU) emulation.
pub mod ppu;

/// Serial port and link cable plumbing.
pub mod serial;

/// Divider/timer unit.
pub mod timer;
