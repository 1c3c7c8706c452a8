use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};

use pocketgb_core::{cartridge::Cartridge, gameboy::GameBoy};

static INIT: OnceCell<()> = OnceCell::new();

const TEST_ROM_BUNDLE: &str =
    "https://github.com/c-sp/game-boy-test-roms/releases/download/v7.0/game-boy-test-roms-v7.0.zip";

/// Download the test ROM bundle when `POCKETGB_FETCH_TEST_ROMS=1` is set and
/// it has not been extracted yet.
fn ensure_test_roms(dir: &Path) {
    INIT.get_or_init(|| {
        if dir.join("mooneye-test-suite").exists() {
            return;
        }
        if std::env::var("POCKETGB_FETCH_TEST_ROMS").as_deref() != Ok("1") {
            return;
        }
        fs::create_dir_all(dir).expect("failed to create test_roms directory");

        let resp = reqwest::blocking::get(TEST_ROM_BUNDLE).expect("failed to download test roms");
        let status = resp.status();
        if !status.is_success() {
            panic!("failed to download test roms: {status}");
        }
        let bytes = resp.bytes().expect("failed to read rom bytes");
        let reader = std::io::Cursor::new(bytes);
        let mut archive = zip::ZipArchive::new(reader).expect("failed to open zip archive");
        archive.extract(dir).expect("failed to extract test roms");
    });
}

pub fn roms_dir() -> PathBuf {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("test_roms");
    ensure_test_roms(&dir);
    dir
}

/// Path to a ROM inside the test bundle, or `None` (with a note on stderr)
/// when the bundle is not available.
#[allow(dead_code)]
pub fn test_rom<P: AsRef<Path>>(relative: P) -> Option<PathBuf> {
    let path = roms_dir().join(relative);
    if path.exists() {
        Some(path)
    } else {
        eprintln!("skipping: {} not found", path.display());
        None
    }
}

/// 32 KiB ROM-only image with `code` placed at the 0x0100 entry point.
#[allow(dead_code)]
pub fn rom_with_code(code: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x0134..0x0138].copy_from_slice(b"TEST");
    rom[0x0100..0x0100 + code.len()].copy_from_slice(code);
    rom
}

/// Post-boot machine running `code` from the cartridge entry point.
#[allow(dead_code)]
pub fn gameboy_with_code(code: &[u8]) -> GameBoy {
    let cart = Cartridge::load(rom_with_code(code)).expect("synthetic ROM should load");
    GameBoy::new(cart)
}

/// Step until PC reaches `addr` or the cycle budget runs out.
#[allow(dead_code)]
pub fn run_until_pc(gb: &mut GameBoy, addr: u16, max_cycles: u64) -> bool {
    while gb.cpu.cycles < max_cycles {
        if gb.cpu.pc == addr {
            return true;
        }
        gb.step().expect("unexpected CPU error");
    }
    false
}
