use std::fs;
use tempfile::tempdir;
use pocketgb_core::cartridge::{Cartridge, CartridgeError, MbcType};

#[test]
fn battery_ram_saved_to_disk() {
    let dir = tempdir().unwrap();
    let rom_path = dir.path().join("game.gb");

    let mut rom = vec![0u8; 0x8000];
    rom[0x0147] = 0x03; // MBC1 + RAM + Battery
    rom[0x0149] = 0x03; // 32KB RAM
    fs::write(&rom_path, &rom).unwrap();

    let mut cart = Cartridge::from_file(&rom_path).unwrap();
    assert_eq!(cart.save_path(), Some(rom_path.with_extension("sav").as_path()));
    cart.ram[0] = 0xAA;
    cart.save_ram().unwrap();

    let data = fs::read(rom_path.with_extension("sav")).unwrap();
    assert_eq!(data.len(), 0x8000);
    assert_eq!(data[0], 0xAA);
}

#[test]
fn save_file_restored_on_load() {
    let dir = tempdir().unwrap();
    let rom_path = dir.path().join("mbc3.gb");

    let mut rom = vec![0u8; 0x8000];
    rom[0x0147] = 0x13; // MBC3 + RAM + Battery
    rom[0x0149] = 0x02; // 8KB RAM
    fs::write(&rom_path, &rom).unwrap();

    let mut cart = Cartridge::from_file(&rom_path).unwrap();
    cart.write(0x0000, 0x0A);
    cart.write(0xA123, 0x5C);
    cart.save_ram().unwrap();

    let mut cart = Cartridge::from_file(&rom_path).unwrap();
    assert_eq!(cart.mbc, MbcType::Mbc3);
    assert_eq!(cart.read(0xA123), 0xFF);
    cart.write(0x0000, 0x0A);
    assert_eq!(cart.read(0xA123), 0x5C);
}

#[test]
fn cartridge_without_battery_writes_nothing() {
    let dir = tempdir().unwrap();
    let rom_path = dir.path().join("plain.gb");

    let mut rom = vec![0u8; 0x8000];
    rom[0x0147] = 0x02; // MBC1 + RAM
    rom[0x0149] = 0x02;
    fs::write(&rom_path, &rom).unwrap();

    let cart = Cartridge::from_file(&rom_path).unwrap();
    assert!(!cart.has_battery());
    assert_eq!(cart.save_path(), None);
    cart.save_ram().unwrap();
    assert!(!rom_path.with_extension("sav").exists());
}

#[test]
fn missing_rom_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = Cartridge::from_file(dir.path().join("absent.gb")).unwrap_err();
    assert!(matches!(err, CartridgeError::Io(_)));
}
