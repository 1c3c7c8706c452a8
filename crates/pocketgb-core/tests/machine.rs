//! Whole-machine tests: CPU code driving the peripherals through the bus.

mod common;

use pocketgb_core::{
    cartridge::Cartridge, gameboy::GameBoy, input::Button, interrupts::Interrupt,
};

/// Machine running `code` at 0x0100 with a `JR -2` parked at `vector`.
fn gameboy_with_handler(code: &[u8], vector: u16) -> GameBoy {
    let mut rom = common::rom_with_code(code);
    let v = vector as usize;
    rom[v..v + 2].copy_from_slice(&[0x18, 0xFE]);
    GameBoy::new(Cartridge::load(rom).unwrap())
}

#[test]
fn timer_interrupt_wakes_halt_and_jumps_to_vector() {
    let mut gb = gameboy_with_handler(
        &[
            0x3E, 0x05, // LD A,0x05
            0xE0, 0x07, // LDH (TAC),A
            0x3E, 0x04, // LD A,0x04
            0xE0, 0xFF, // LDH (IE),A
            0xFB, // EI
            0x76, // HALT
            0x18, 0xFE, // JR -2
        ],
        0x0050,
    );
    assert!(common::run_until_pc(&mut gb, 0x0050, 200_000));
    assert!(!gb.mmu.irq.is_requested(Interrupt::Timer));
    assert!(!gb.cpu.ime);
    // return address is the instruction after HALT
    assert_eq!(gb.mmu.read_byte(0xFFFC), 0x0A);
    assert_eq!(gb.mmu.read_byte(0xFFFD), 0x01);
}

#[test]
fn dma_conflict_from_hram_routine() {
    let mut gb = common::gameboy_with_code(&[0x18, 0xFE]);
    for i in 0..0xA0u16 {
        gb.mmu.write_byte(0xC000 + i, 0x80 | i as u8);
    }
    let routine = [
        0x3E, 0xC0, // LD A,0xC0
        0xE0, 0x46, // LDH (DMA),A
        0xFA, 0x00, 0xD0, // LD A,(0xD000)
        0xE0, 0xF0, // LDH (0xF0),A
        0x3E, 0x28, // LD A,40
        0x3D, // DEC A
        0x20, 0xFD, // JR NZ,-3
        0x18, 0xFE, // JR -2
    ];
    for (i, b) in routine.iter().enumerate() {
        gb.mmu.write_byte(0xFF80 + i as u16, *b);
    }
    gb.cpu.pc = 0xFF80;

    assert!(common::run_until_pc(&mut gb, 0xFF8E, 10_000));
    // the read landed on the second byte in flight, not WRAM at 0xD000
    assert_eq!(gb.mmu.read_byte(0xFFF0), 0x81);
    assert!(!gb.mmu.dma_active());
    assert_eq!(gb.mmu.ppu.oam[0x00], 0x80);
    assert_eq!(gb.mmu.ppu.oam[0x9F], 0x80 | 0x9F);
}

#[test]
fn joypad_interrupt_from_button_press() {
    let mut gb = gameboy_with_handler(
        &[
            0x3E, 0x10, // LD A,0x10 (select buttons)
            0xE0, 0x00, // LDH (P1),A
            0x3E, 0x10, // LD A,0x10
            0xE0, 0xFF, // LDH (IE),A
            0xFB, // EI
            0x76, // HALT
            0x18, 0xFE, // JR -2
        ],
        0x0060,
    );
    assert!(common::run_until_pc(&mut gb, 0x010A, 1_000));
    assert!(gb.cpu.halted);
    gb.press(Button::Start);
    let budget = gb.cpu.cycles + 100;
    assert!(common::run_until_pc(&mut gb, 0x0060, budget));
    assert_eq!(gb.mmu.read_byte(0xFF00), 0xD7);
    gb.release(Button::Start);
    assert_eq!(gb.mmu.read_byte(0xFF00), 0xDF);
}

#[test]
fn serial_transfer_reports_output_and_interrupt() {
    let mut gb = common::gameboy_with_code(&[
        0x3E, b'K', // LD A,'K'
        0xE0, 0x01, // LDH (SB),A
        0x3E, 0x81, // LD A,0x81
        0xE0, 0x02, // LDH (SC),A
        0x18, 0xFE, // JR -2
    ]);
    assert!(common::run_until_pc(&mut gb, 0x0108, 1_000));
    assert_eq!(gb.take_serial(), b"K");
    let start = gb.cpu.cycles;
    while gb.mmu.read_byte(0xFF02) & 0x80 != 0 {
        gb.step().unwrap();
        assert!(gb.cpu.cycles - start < 5_000);
    }
    assert_eq!(gb.mmu.read_byte(0xFF01), 0xFF);
    assert!(gb.mmu.irq.is_requested(Interrupt::Serial));
}

#[test]
fn lcd_frame_renders_background_tiles() {
    let mut gb = common::gameboy_with_code(&[0x18, 0xFE]);
    // Tile 0 solid colour 3, map all zeros, unsigned tile data at 0x8000
    gb.mmu.write_byte(0xFF40, 0x00);
    for addr in 0x8000..0x8010u16 {
        gb.mmu.write_byte(addr, 0xFF);
    }
    gb.mmu.write_byte(0xFF47, 0xE4);
    gb.mmu.write_byte(0xFF40, 0x91);

    gb.run_frame().unwrap();
    gb.run_frame().unwrap();
    let frame = gb.framebuffer();
    assert!(frame.iter().all(|&px| px == 0x00081820));
}
