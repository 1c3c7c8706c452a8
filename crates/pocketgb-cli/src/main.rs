mod cli_config;

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use log::{error, info};
use pocketgb_core::{
    cartridge::{Cartridge, CartridgeError},
    cpu::CpuError,
    gameboy::GameBoy,
    ppu::{SCREEN_HEIGHT, SCREEN_WIDTH},
};
use thiserror::Error;

const DEFAULT_FRAMES: u64 = 60;

/// Register values a mooneye-style test ROM leaves in B..L at LD B,B.
const PASS_SIGNATURE: [u8; 6] = [3, 5, 8, 13, 21, 34];
const FAIL_SIGNATURE: [u8; 6] = [0x42; 6];
const LD_B_B: u8 = 0x40;

#[derive(Parser)]
#[command(name = "pocketgb", about = "Headless DMG Game Boy emulator")]
struct Args {
    /// Path to ROM file
    rom: PathBuf,

    /// Path to boot ROM file
    #[arg(long)]
    bootrom: Option<PathBuf>,

    /// Number of frames to run
    #[arg(long)]
    frames: Option<u64>,

    /// Stop after this many CPU cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Write the last frame to a PNG file
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Print serial output to stdout
    #[arg(long)]
    serial: bool,

    /// Run until LD B,B and check the test ROM register signature
    #[arg(long)]
    until_breakpoint: bool,

    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to load ROM {}: {source}", .path.display())]
    Rom {
        path: PathBuf,
        source: CartridgeError,
    },
    #[error("failed to read boot ROM {}: {source}", .path.display())]
    BootRom { path: PathBuf, source: io::Error },
    #[error("emulation stopped: {0}")]
    Cpu(#[from] CpuError),
    #[error("failed to encode screenshot: {0}")]
    Png(#[from] png::EncodingError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("test ROM reported failure at {pc:04X}")]
    TestFailed { pc: u16 },
    #[error("no breakpoint reached within {0} cycles")]
    Timeout(u64),
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(cli_config::default_config_path);
    let config = cli_config::load_from_file(&config_path);

    let cart = Cartridge::from_file(&args.rom).map_err(|source| CliError::Rom {
        path: args.rom.clone(),
        source,
    })?;

    let mut gb = match args.bootrom.or(config.bootrom_path) {
        Some(path) => {
            let data = std::fs::read(&path).map_err(|source| CliError::BootRom {
                path: path.clone(),
                source,
            })?;
            info!("Using boot ROM {}", path.display());
            GameBoy::new_with_boot_rom(cart, data)
        }
        None => GameBoy::new(cart),
    };

    gb.set_serial_capture(args.serial);

    let frames = args.frames.or(config.frames).unwrap_or(DEFAULT_FRAMES);
    let result = if args.until_breakpoint {
        run_until_breakpoint(&mut gb, breakpoint_budget(args.cycles, frames), args.serial)
    } else {
        run_headless(&mut gb, frames, args.cycles, args.serial)
    };

    gb.save_ram();
    if let Some(path) = &args.screenshot {
        write_screenshot(path, gb.framebuffer())?;
        info!("Saved screenshot to {}", path.display());
    }
    result
}

/// Cycle budget for breakpoint mode: `--cycles`, or the frame count's worth.
fn breakpoint_budget(cycles: Option<u64>, frames: u64) -> u64 {
    cycles.unwrap_or(frames.saturating_mul(pocketgb_core::gameboy::CYCLES_PER_FRAME))
}

fn run_headless(
    gb: &mut GameBoy,
    frame_limit: u64,
    cycle_limit: Option<u64>,
    serial: bool,
) -> Result<(), CliError> {
    let cycle_limit = cycle_limit.unwrap_or(u64::MAX);
    let mut frame_count = 0u64;
    while frame_count < frame_limit {
        let finished = gb.run_frame_until(cycle_limit)?;
        if serial {
            print_serial(&gb.take_serial())?;
        }
        if !finished {
            break;
        }
        frame_count += 1;
    }

    log::debug!("{}", gb.cpu.debug_state());
    info!("Ran {frame_count} frames ({} cycles)", gb.cpu.cycles);
    Ok(())
}

fn run_until_breakpoint(gb: &mut GameBoy, max_cycles: u64, serial: bool) -> Result<(), CliError> {
    while gb.cpu.cycles < max_cycles {
        let pc = gb.cpu.pc;
        if !gb.cpu.halted && gb.mmu.read_byte(pc) == LD_B_B {
            let regs = [
                gb.cpu.bc.high(),
                gb.cpu.bc.low(),
                gb.cpu.de.high(),
                gb.cpu.de.low(),
                gb.cpu.hl.high(),
                gb.cpu.hl.low(),
            ];
            if regs == PASS_SIGNATURE {
                if serial {
                    print_serial(&gb.take_serial())?;
                }
                info!("Test ROM passed at {pc:04X}");
                return Ok(());
            }
            if regs == FAIL_SIGNATURE {
                log::debug!("{}", gb.cpu.debug_state());
                return Err(CliError::TestFailed { pc });
            }
        }
        gb.step()?;
    }

    log::debug!("{}", gb.cpu.debug_state());
    Err(CliError::Timeout(max_cycles))
}

fn print_serial(bytes: &[u8]) -> io::Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    let mut out = io::stdout().lock();
    for b in bytes {
        if b.is_ascii_graphic() || b.is_ascii_whitespace() {
            write!(out, "{}", *b as char)?;
        } else {
            write!(out, "\\x{b:02X}")?;
        }
    }
    out.flush()
}

fn frame_to_rgb(frame: &[u32]) -> Vec<u8> {
    let mut out = vec![0u8; frame.len() * 3];
    for (i, &px) in frame.iter().enumerate() {
        out[i * 3] = ((px >> 16) & 0xFF) as u8;
        out[i * 3 + 1] = ((px >> 8) & 0xFF) as u8;
        out[i * 3 + 2] = (px & 0xFF) as u8;
    }
    out
}

fn write_screenshot(path: &Path, frame: &[u32]) -> Result<(), CliError> {
    let file = File::create(path)?;
    let w = BufWriter::new(file);
    let mut encoder = png::Encoder::new(w, SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&frame_to_rgb(frame))?;
    writer.finish()?;
    Ok(())
}
