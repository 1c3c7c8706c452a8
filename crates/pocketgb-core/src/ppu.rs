use crate::interrupts::{Interrupt, Interrupts};

// Screen resolution used by the Game Boy PPU
pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

// Timing constants in T-cycles
const OAM_SCAN_CYCLES: u16 = 80;
const TRANSFER_CYCLES: u16 = 172;
const LINE_CYCLES: u16 = 456;

const LAST_LINE: u8 = 153;

// Sprite limits
const MAX_SPRITES_PER_LINE: usize = 10;
const TOTAL_SPRITES: usize = 40;

// Internal memory sizes
const VRAM_SIZE: usize = 0x2000;
const OAM_SIZE: usize = 0xA0;

// VRAM layout constants (offsets from 0x8000)
const BG_MAP_0_BASE: u16 = 0x1800;
const BG_MAP_1_BASE: u16 = 0x1C00;
const TILE_DATA_UNSIGNED_BASE: u16 = 0x0000;
const TILE_DATA_SIGNED_BASE: u16 = 0x1000;

// LCDC bits
const LCDC_ENABLE: u8 = 0x80;
const LCDC_WINDOW_MAP: u8 = 0x40;
const LCDC_WINDOW_ENABLE: u8 = 0x20;
const LCDC_TILE_DATA: u8 = 0x10;
const LCDC_BG_MAP: u8 = 0x08;
const LCDC_OBJ_SIZE: u8 = 0x04;
const LCDC_OBJ_ENABLE: u8 = 0x02;
const LCDC_BG_ENABLE: u8 = 0x01;

// STAT interrupt enable bits
const STAT_LYC_INT: u8 = 0x40;
const STAT_OAM_INT: u8 = 0x20;
const STAT_VBLANK_INT: u8 = 0x10;
const STAT_HBLANK_INT: u8 = 0x08;
const STAT_WRITABLE: u8 = 0x78;

/// Physical colours in 0x00RRGGBB order: four shades of green followed by a
/// debug colour shown wherever nothing has been rendered yet.
pub const COLOURS: [u32; 5] = [0x00E0F8D0, 0x0088C070, 0x00346856, 0x00081820, 0x00FF0000];
const DEBUG_COLOUR: u32 = COLOURS[4];

/// LCD controller mode as reported in the low bits of STAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    HBlank,
    VBlank,
    OamScan,
    Transfer,
    /// Transitional state across LCD enable/disable and line boundaries.
    None,
}

impl Mode {
    fn bits(self) -> u8 {
        match self {
            Mode::HBlank | Mode::None => 0,
            Mode::VBlank => 1,
            Mode::OamScan => 2,
            Mode::Transfer => 3,
        }
    }
}

#[derive(Copy, Clone, Default)]
struct Sprite {
    x: i16,
    y: i16,
    tile: u8,
    flags: u8,
    oam_index: usize,
    /// Object height at the time of the OAM scan
    height: u8,
}

pub struct Ppu {
    pub vram: [u8; VRAM_SIZE],
    pub oam: [u8; OAM_SIZE],

    lcdc: u8,
    /// Interrupt enable bits of STAT (0x78)
    stat: u8,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    lyc_eq_ly: bool,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,

    /// Internal window line counter
    win_line_counter: u8,

    line_cycle: u16,
    mode: Mode,
    /// Mode change scheduled for the next machine cycle
    pending_mode: Option<Mode>,
    /// LY already reads 0 but the line is still 153
    on_line_153: bool,

    pub framebuffer: [u32; SCREEN_WIDTH * SCREEN_HEIGHT],
    /// Raw background colour indices of the current line, used for sprite priority
    line_color: [u8; SCREEN_WIDTH],
    /// Latched sprites for the current scanline
    line_sprites: [Sprite; MAX_SPRITES_PER_LINE],
    sprite_count: usize,
    /// Indicates a completed frame is available in `framebuffer`
    frame_ready: bool,
    stat_irq_line: bool,
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            vram: [0; VRAM_SIZE],
            oam: [0; OAM_SIZE],
            lcdc: 0,
            stat: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            lyc_eq_ly: false,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
            win_line_counter: 0,
            line_cycle: 0,
            mode: Mode::None,
            pending_mode: None,
            on_line_153: false,
            framebuffer: [DEBUG_COLOUR; SCREEN_WIDTH * SCREEN_HEIGHT],
            line_color: [0; SCREEN_WIDTH],
            line_sprites: [Sprite::default(); MAX_SPRITES_PER_LINE],
            sprite_count: 0,
            frame_ready: false,
            stat_irq_line: false,
        }
    }

    /// Registers as left behind by the DMG boot ROM.
    pub fn apply_boot_state(&mut self, irq: &mut Interrupts) {
        self.write_reg(0xFF40, 0x91, irq);
        self.bgp = 0xFC;
        self.obp0 = 0xFF;
        self.obp1 = 0xFF;
    }

    pub fn lcd_enabled(&self) -> bool {
        self.lcdc & LCDC_ENABLE != 0
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn line_cycle(&self) -> u16 {
        self.line_cycle
    }

    /// Returns true if a full frame has been rendered and is ready to display.
    pub fn frame_ready(&self) -> bool {
        self.frame_ready
    }

    /// Clears the frame ready flag after a frame has been consumed.
    pub fn clear_frame_flag(&mut self) {
        self.frame_ready = false;
    }

    /// Returns the current value of the internal window line counter.
    pub fn window_line_counter(&self) -> u8 {
        self.win_line_counter
    }

    /// Returns the current framebuffer. Call `frame_ready()` to check if a
    /// frame is complete. After presenting, call `clear_frame_flag()`.
    pub fn framebuffer(&self) -> &[u32; SCREEN_WIDTH * SCREEN_HEIGHT] {
        &self.framebuffer
    }

    pub fn vram_accessible(&self) -> bool {
        if !self.lcd_enabled() {
            return true;
        }
        match self.mode {
            Mode::Transfer => false,
            // the cycle right before pixel transfer starts
            Mode::OamScan => self.line_cycle != OAM_SCAN_CYCLES,
            _ => true,
        }
    }

    pub fn oam_accessible(&self) -> bool {
        if !self.lcd_enabled() {
            return true;
        }
        if matches!(self.mode, Mode::OamScan | Mode::Transfer) {
            return false;
        }
        self.line_cycle != 0
    }

    pub fn read_vram(&self, addr: u16) -> u8 {
        if self.vram_accessible() {
            self.vram[(addr & 0x1FFF) as usize]
        } else {
            0xFF
        }
    }

    pub fn write_vram(&mut self, addr: u16, val: u8) {
        if self.vram_accessible() {
            self.vram[(addr & 0x1FFF) as usize] = val;
        }
    }

    pub fn read_oam(&self, addr: u16) -> u8 {
        if self.oam_accessible() {
            self.oam[(addr & 0xFF) as usize]
        } else {
            0xFF
        }
    }

    pub fn write_oam(&mut self, addr: u16, val: u8) {
        if self.oam_accessible() {
            self.oam[(addr & 0xFF) as usize] = val;
        }
    }

    /// OAM write performed by the DMA engine, which ignores mode gating.
    pub fn dma_write_oam(&mut self, index: usize, val: u8) {
        self.oam[index] = val;
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF40 => self.lcdc,
            0xFF41 => {
                let coincidence = if self.lyc_eq_ly { 0x04 } else { 0 };
                0x80 | (self.stat & STAT_WRITABLE) | coincidence | self.mode.bits()
            }
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8, irq: &mut Interrupts) {
        match addr {
            0xFF40 => {
                let was_on = self.lcd_enabled();
                self.lcdc = val;
                if was_on && !self.lcd_enabled() {
                    log::trace!("LCD off at LY={} cycle={}", self.ly, self.line_cycle);
                    self.ly = 0;
                    self.line_cycle = 0;
                    self.mode = Mode::None;
                    self.pending_mode = None;
                    self.on_line_153 = false;
                    self.stat_irq_line = false;
                    self.framebuffer.fill(COLOURS[0]);
                } else if !was_on && self.lcd_enabled() {
                    log::trace!("LCD on");
                    // the first line after enabling starts late
                    self.line_cycle = 4;
                    self.compare_lyc(0, true, irq);
                    self.change_mode(Mode::None);
                }
            }
            0xFF41 => {
                self.stat = val & STAT_WRITABLE;
                if self.lcd_enabled() {
                    self.update_stat_irq(irq, false);
                }
            }
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            0xFF44 => {}
            0xFF45 => {
                self.lyc = val;
                if self.lcd_enabled() {
                    self.compare_lyc(self.ly, true, irq);
                }
            }
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            _ => {}
        }
    }

    /// Advance the PPU by one machine cycle.
    pub fn tick(&mut self, irq: &mut Interrupts) {
        if !self.lcd_enabled() {
            return;
        }

        self.line_cycle += 4;
        if let Some(mode) = self.pending_mode.take() {
            self.mode = mode;
        }
        self.update_stat_irq(irq, false);

        if self.on_line_153 {
            self.line_153(irq);
        } else if (self.ly as usize) < SCREEN_HEIGHT {
            self.visible_line(irq);
        } else {
            self.vblank_line(irq);
        }

        self.update_stat_irq(irq, false);
    }

    fn visible_line(&mut self, irq: &mut Interrupts) {
        let hblank_at = OAM_SCAN_CYCLES + TRANSFER_CYCLES + round_up_to_m_cycle(self.scx & 7);
        match self.line_cycle {
            // line 0 never raises the LYC interrupt here; it was already
            // evaluated at the end of line 153
            4 => self.compare_lyc(self.ly, self.ly != 0, irq),
            OAM_SCAN_CYCLES => {
                self.oam_scan();
                self.change_mode(Mode::Transfer);
            }
            c if c == hblank_at => {
                self.render_scanline();
                self.change_mode(Mode::HBlank);
            }
            LINE_CYCLES => {
                self.mode = Mode::None;
                self.line_cycle = 0;
                self.ly += 1;
                self.lyc_eq_ly = false;
                if self.ly as usize == SCREEN_HEIGHT {
                    self.enter_vblank();
                } else {
                    self.change_mode(Mode::OamScan);
                }
            }
            _ => {}
        }
    }

    fn vblank_line(&mut self, irq: &mut Interrupts) {
        match self.line_cycle {
            4 => {
                if self.ly as usize == SCREEN_HEIGHT {
                    irq.request(Interrupt::VBlank);
                    // DMG also raises the OAM STAT source on VBlank entry
                    let oam_source = self.stat & STAT_OAM_INT != 0;
                    self.update_stat_irq(irq, oam_source);
                }
                self.compare_lyc(self.ly, true, irq);
            }
            LINE_CYCLES => {
                self.line_cycle = 0;
                self.ly += 1;
                self.lyc_eq_ly = false;
                if self.ly == LAST_LINE {
                    self.on_line_153 = true;
                }
            }
            _ => {}
        }
    }

    fn line_153(&mut self, irq: &mut Interrupts) {
        match self.line_cycle {
            4 => {
                self.ly = 0;
                self.compare_lyc(LAST_LINE, true, irq);
            }
            8 => self.lyc_eq_ly = false,
            12 => self.compare_lyc(0, true, irq),
            LINE_CYCLES => {
                self.on_line_153 = false;
                self.line_cycle = 0;
                self.change_mode(Mode::OamScan);
            }
            _ => {}
        }
    }

    fn enter_vblank(&mut self) {
        self.change_mode(Mode::VBlank);
        self.frame_ready = true;
        self.win_line_counter = 0;
    }

    fn change_mode(&mut self, mode: Mode) {
        self.pending_mode = Some(mode);
    }

    fn compare_lyc(&mut self, line: u8, fire: bool, irq: &mut Interrupts) {
        self.lyc_eq_ly = line == self.lyc;
        if fire {
            self.update_stat_irq(irq, false);
        } else {
            self.stat_irq_line = self.stat_signal();
        }
    }

    fn stat_signal(&self) -> bool {
        let coincidence = self.lyc_eq_ly && self.stat & STAT_LYC_INT != 0;
        let mode_signal = match self.mode {
            Mode::HBlank => self.stat & STAT_HBLANK_INT != 0,
            Mode::VBlank => self.stat & STAT_VBLANK_INT != 0,
            Mode::OamScan => self.stat & STAT_OAM_INT != 0,
            Mode::Transfer | Mode::None => false,
        };
        coincidence || mode_signal
    }

    /// Raise the STAT interrupt on a rising edge of the combined request line.
    fn update_stat_irq(&mut self, irq: &mut Interrupts, extra: bool) {
        let current = self.stat_signal() || extra;
        if current && !self.stat_irq_line {
            irq.request(Interrupt::Stat);
        }
        self.stat_irq_line = current;
    }

    /// Collect up to 10 sprites visible on the current scanline.
    fn oam_scan(&mut self) {
        let sprite_height: u8 = if self.lcdc & LCDC_OBJ_SIZE != 0 { 16 } else { 8 };
        self.sprite_count = 0;
        for i in 0..TOTAL_SPRITES {
            if self.sprite_count >= MAX_SPRITES_PER_LINE {
                break;
            }
            let base = i * 4;
            let y = self.oam[base] as i16 - 16;
            let ly = self.ly as i16;
            if ly >= y && ly < y + sprite_height as i16 {
                self.line_sprites[self.sprite_count] = Sprite {
                    x: self.oam[base + 1] as i16 - 8,
                    y,
                    tile: self.oam[base + 2],
                    flags: self.oam[base + 3],
                    oam_index: i,
                    height: sprite_height,
                };
                self.sprite_count += 1;
            }
        }
        // lower X wins, ties go to the earlier OAM entry
        self.line_sprites[..self.sprite_count].sort_by_key(|s| (s.x, s.oam_index));
    }

    #[inline(always)]
    fn shade(palette: u8, color_id: u8) -> u32 {
        COLOURS[((palette >> (color_id * 2)) & 0x03) as usize]
    }

    #[inline(always)]
    fn tile_pixel(&self, row_addr: u16, bit: u8) -> u8 {
        let lo = self.vram[row_addr as usize & 0x1FFF];
        let hi = self.vram[(row_addr as usize + 1) & 0x1FFF];
        ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1)
    }

    fn render_scanline(&mut self) {
        let row = self.ly as usize * SCREEN_WIDTH;
        self.render_background(row);
        if self.lcdc & LCDC_OBJ_ENABLE != 0 {
            self.render_sprites(row);
        }
    }

    fn render_background(&mut self, row: usize) {
        if self.lcdc & LCDC_BG_ENABLE == 0 {
            let colour = Self::shade(self.bgp, 0);
            self.framebuffer[row..row + SCREEN_WIDTH].fill(colour);
            self.line_color.fill(0);
            return;
        }

        let unsigned_tiles = self.lcdc & LCDC_TILE_DATA != 0;
        let bg_map = if self.lcdc & LCDC_BG_MAP != 0 {
            BG_MAP_1_BASE
        } else {
            BG_MAP_0_BASE
        };
        let window_map = if self.lcdc & LCDC_WINDOW_MAP != 0 {
            BG_MAP_1_BASE
        } else {
            BG_MAP_0_BASE
        };
        let window_x = self.wx as i16 - 7;
        let window_visible = self.lcdc & LCDC_WINDOW_ENABLE != 0 && self.wy <= self.ly;

        let mut window_drawn = false;
        let mut map = bg_map;
        let mut tile_x = self.scx;
        let mut tile_y = self.ly.wrapping_add(self.scy);

        for x in 0..SCREEN_WIDTH {
            if !window_drawn && window_visible && window_x <= x as i16 {
                window_drawn = true;
                map = window_map;
                tile_x = (x as i16 - window_x) as u8;
                tile_y = self.win_line_counter;
            }

            let map_addr = map + (tile_y as u16 / 8) * 32 + tile_x as u16 / 8;
            let tile_index = self.vram[map_addr as usize];
            let tile_addr = if unsigned_tiles {
                TILE_DATA_UNSIGNED_BASE + tile_index as u16 * 16
            } else {
                TILE_DATA_SIGNED_BASE.wrapping_add((tile_index as i8 as i16 * 16) as u16)
            };
            let row_addr = tile_addr + (tile_y as u16 & 7) * 2;
            let color_id = self.tile_pixel(row_addr, 7 - (tile_x & 7));

            self.framebuffer[row + x] = Self::shade(self.bgp, color_id);
            self.line_color[x] = color_id;
            tile_x = tile_x.wrapping_add(1);
        }

        if window_drawn {
            self.win_line_counter = self.win_line_counter.wrapping_add(1);
        }
    }

    fn render_sprites(&mut self, row: usize) {
        let mut drawn = [false; SCREEN_WIDTH];

        for i in 0..self.sprite_count {
            let s = self.line_sprites[i];
            if s.x >= SCREEN_WIDTH as i16 {
                continue;
            }
            let tile = if s.height == 16 { s.tile & 0xFE } else { s.tile };
            let mut line_idx = (self.ly as i16 - s.y) as usize & (s.height as usize - 1);
            if s.flags & 0x40 != 0 {
                line_idx = s.height as usize - 1 - line_idx;
            }
            let row_addr = (tile as usize * 16 + line_idx * 2) as u16;
            let palette = if s.flags & 0x10 != 0 { self.obp1 } else { self.obp0 };

            for px in 0..8u8 {
                let sx = s.x + px as i16;
                if sx < 0 {
                    continue;
                }
                if sx >= SCREEN_WIDTH as i16 {
                    break;
                }
                let sx = sx as usize;
                if drawn[sx] {
                    continue;
                }
                let bit = if s.flags & 0x20 != 0 { px } else { 7 - px };
                let color_id = self.tile_pixel(row_addr, bit);
                if color_id == 0 {
                    continue;
                }
                if s.flags & 0x80 != 0 && self.line_color[sx] != 0 {
                    continue;
                }
                self.framebuffer[row + sx] = Self::shade(palette, color_id);
                drawn[sx] = true;
            }
        }
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

fn round_up_to_m_cycle(value: u8) -> u16 {
    (value as u16 + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcd_on(ppu: &mut Ppu, irq: &mut Interrupts, lcdc: u8) {
        ppu.write_reg(0xFF40, lcdc | LCDC_ENABLE, irq);
    }

    /// Run until the PPU is at the given line and cycle.
    fn run_to(ppu: &mut Ppu, irq: &mut Interrupts, ly: u8, cycle: u16) {
        for _ in 0..200_000 {
            if ppu.ly() == ly && ppu.line_cycle() == cycle && !ppu.on_line_153 {
                return;
            }
            ppu.tick(irq);
        }
        panic!("PPU never reached LY={ly} cycle={cycle}");
    }

    #[test]
    fn first_line_after_enable_skips_oam_scan() {
        let mut ppu = Ppu::new();
        let mut irq = Interrupts::new();
        lcd_on(&mut ppu, &mut irq, 0x11);
        ppu.tick(&mut irq);
        assert_eq!(ppu.mode(), Mode::None);
        assert_eq!(ppu.read_reg(0xFF41) & 0x03, 0);
        run_to(&mut ppu, &mut irq, 0, 84);
        assert_eq!(ppu.mode(), Mode::Transfer);
    }

    #[test]
    fn scx_stall_delays_hblank() {
        let mut ppu = Ppu::new();
        let mut irq = Interrupts::new();
        lcd_on(&mut ppu, &mut irq, 0x11);
        ppu.write_reg(0xFF43, 0x05, &mut irq);
        run_to(&mut ppu, &mut irq, 1, 80 + 172 + 8);
        assert_eq!(ppu.mode(), Mode::Transfer);
        ppu.tick(&mut irq);
        assert_eq!(ppu.mode(), Mode::HBlank);
    }

    #[test]
    fn hblank_stat_fires_once_per_line() {
        let mut ppu = Ppu::new();
        let mut irq = Interrupts::new();
        lcd_on(&mut ppu, &mut irq, 0x11);
        ppu.write_reg(0xFF41, STAT_HBLANK_INT, &mut irq);
        run_to(&mut ppu, &mut irq, 1, 0);
        irq.acknowledge(Interrupt::Stat);

        let mut fired = 0;
        for _ in 0..(LINE_CYCLES / 4) {
            ppu.tick(&mut irq);
            if irq.is_requested(Interrupt::Stat) {
                fired += 1;
                irq.acknowledge(Interrupt::Stat);
            }
        }
        assert_eq!(fired, 1);
        assert_eq!(ppu.ly(), 2);
    }

    #[test]
    fn vblank_entry_raises_vblank_and_oam_stat() {
        let mut ppu = Ppu::new();
        let mut irq = Interrupts::new();
        lcd_on(&mut ppu, &mut irq, 0x11);
        ppu.write_reg(0xFF41, STAT_OAM_INT, &mut irq);
        run_to(&mut ppu, &mut irq, 143, 8);
        irq.write_if(0);
        run_to(&mut ppu, &mut irq, 144, 0);
        assert!(!irq.is_requested(Interrupt::VBlank));
        assert!(ppu.frame_ready());
        ppu.tick(&mut irq);
        assert_eq!(ppu.mode(), Mode::VBlank);
        assert!(irq.is_requested(Interrupt::VBlank));
        assert!(irq.is_requested(Interrupt::Stat));
    }

    #[test]
    fn line_153_reports_ly_zero_early() {
        let mut ppu = Ppu::new();
        let mut irq = Interrupts::new();
        lcd_on(&mut ppu, &mut irq, 0x11);
        ppu.write_reg(0xFF45, 153, &mut irq);
        ppu.write_reg(0xFF41, STAT_LYC_INT, &mut irq);
        run_to(&mut ppu, &mut irq, 152, 452);
        ppu.tick(&mut irq);
        assert_eq!(ppu.ly(), 153);
        irq.write_if(0);

        ppu.tick(&mut irq);
        assert_eq!(ppu.ly(), 0);
        assert!(ppu.read_reg(0xFF41) & 0x04 != 0);
        assert!(irq.is_requested(Interrupt::Stat));

        ppu.tick(&mut irq);
        ppu.tick(&mut irq);
        // comparison now targets 0
        assert!(ppu.read_reg(0xFF41) & 0x04 == 0);
    }

    #[test]
    fn vram_locked_during_transfer() {
        let mut ppu = Ppu::new();
        let mut irq = Interrupts::new();
        ppu.write_vram(0x8000, 0x12);
        lcd_on(&mut ppu, &mut irq, 0x11);
        run_to(&mut ppu, &mut irq, 1, 80);
        assert_eq!(ppu.mode(), Mode::OamScan);
        assert_eq!(ppu.read_vram(0x8000), 0xFF);
        assert_eq!(ppu.read_oam(0xFE00), 0xFF);
        ppu.tick(&mut irq);
        assert_eq!(ppu.read_vram(0x8000), 0xFF);
        ppu.write_vram(0x8000, 0x34);
        run_to(&mut ppu, &mut irq, 1, 300);
        assert_eq!(ppu.read_vram(0x8000), 0x12);
        assert_eq!(ppu.read_oam(0xFE00), 0x00);
    }

    #[test]
    fn lcd_off_resets_ly_and_mode() {
        let mut ppu = Ppu::new();
        let mut irq = Interrupts::new();
        lcd_on(&mut ppu, &mut irq, 0x11);
        run_to(&mut ppu, &mut irq, 20, 100);
        ppu.write_reg(0xFF40, 0x11, &mut irq);
        assert_eq!(ppu.ly(), 0);
        assert_eq!(ppu.mode(), Mode::None);
        irq.write_if(0);
        for _ in 0..1000 {
            ppu.tick(&mut irq);
        }
        assert_eq!(ppu.ly(), 0);
        assert_eq!(irq.read_if(), 0xE0);
    }

    #[test]
    fn window_counter_starts_at_zero_on_first_visible_line() {
        let mut ppu = Ppu::new();
        let mut irq = Interrupts::new();
        // tile 1: first row all colour 3, remaining rows colour 0
        ppu.vram[0x10] = 0xFF;
        ppu.vram[0x11] = 0xFF;
        // window map at 0x9C00 filled with tile 1
        for i in 0..0x400 {
            ppu.vram[BG_MAP_1_BASE as usize + i] = 1;
        }
        ppu.write_reg(0xFF47, 0xE4, &mut irq);
        ppu.write_reg(0xFF4A, 10, &mut irq);
        ppu.write_reg(0xFF4B, 7, &mut irq);
        lcd_on(&mut ppu, &mut irq, 0x71);

        run_to(&mut ppu, &mut irq, 9, 300);
        assert_eq!(ppu.window_line_counter(), 0);

        run_to(&mut ppu, &mut irq, 10, 300);
        assert_eq!(ppu.window_line_counter(), 1);
        assert_eq!(ppu.framebuffer()[10 * SCREEN_WIDTH], COLOURS[3]);

        run_to(&mut ppu, &mut irq, 11, 300);
        assert_eq!(ppu.window_line_counter(), 2);
        assert_eq!(ppu.framebuffer()[11 * SCREEN_WIDTH], COLOURS[0]);
    }

    #[test]
    fn sprites_sorted_by_x_and_respect_bg_priority() {
        let mut ppu = Ppu::new();
        let mut irq = Interrupts::new();
        // tile 0: solid colour 1 for the background
        for row in 0..8 {
            ppu.vram[row * 2] = 0xFF;
        }
        // tile 2: solid colour 3 for sprites
        for row in 0..8 {
            ppu.vram[0x20 + row * 2] = 0xFF;
            ppu.vram[0x21 + row * 2] = 0xFF;
        }
        ppu.write_reg(0xFF47, 0xE4, &mut irq);
        ppu.write_reg(0xFF48, 0xE4, &mut irq);
        ppu.write_reg(0xFF49, 0x00, &mut irq);
        // sprite 0 at x=20 uses OBP1 (all white), sprite 1 at x=16 uses OBP0
        ppu.oam[0..4].copy_from_slice(&[16, 28, 2, 0x10]);
        ppu.oam[4..8].copy_from_slice(&[16, 24, 2, 0x00]);
        // sprite 2 behind a non-zero background
        ppu.oam[8..12].copy_from_slice(&[16, 108, 2, 0x80]);
        lcd_on(&mut ppu, &mut irq, 0x13);
        run_to(&mut ppu, &mut irq, 1, 300);

        let line = &ppu.framebuffer()[..SCREEN_WIDTH];
        // overlap 20..24: lower X sprite wins
        assert_eq!(line[16], COLOURS[3]);
        assert_eq!(line[23], COLOURS[3]);
        assert_eq!(line[24], COLOURS[0]);
        // behind-background sprite hidden by colour 1
        assert_eq!(line[100], COLOURS[1]);
    }

    #[test]
    fn signed_tile_data_addressing() {
        let mut ppu = Ppu::new();
        let mut irq = Interrupts::new();
        // map column 0 uses tile 0x80 (0x8800), column 1 uses tile 0x00 (0x9000)
        ppu.vram[BG_MAP_0_BASE as usize] = 0x80;
        ppu.vram[BG_MAP_0_BASE as usize + 1] = 0x00;
        ppu.vram[0x0800] = 0xFF;
        ppu.vram[0x1001] = 0xFF;
        ppu.write_reg(0xFF47, 0xE4, &mut irq);
        lcd_on(&mut ppu, &mut irq, 0x01);
        run_to(&mut ppu, &mut irq, 0, 300);

        let line = &ppu.framebuffer()[..SCREEN_WIDTH];
        assert!(line[0..8].iter().all(|&px| px == COLOURS[1]));
        assert!(line[8..16].iter().all(|&px| px == COLOURS[2]));
    }

    #[test]
    fn tall_sprite_ignores_tile_bit_zero_and_flips() {
        let mut ppu = Ppu::new();
        let mut irq = Interrupts::new();
        // last row of the 8x16 pair starting at tile 2, leftmost pixel colour 1
        ppu.vram[0x20 + 15 * 2] = 0x80;
        ppu.write_reg(0xFF47, 0xE4, &mut irq);
        ppu.write_reg(0xFF48, 0xE4, &mut irq);
        // tile 3 with X and Y flip at the top-left corner
        ppu.oam[0..4].copy_from_slice(&[16, 8, 3, 0x60]);
        lcd_on(&mut ppu, &mut irq, 0x07);
        run_to(&mut ppu, &mut irq, 0, 300);

        let line = &ppu.framebuffer()[..SCREEN_WIDTH];
        assert_eq!(line[0], COLOURS[0]);
        assert_eq!(line[7], COLOURS[1]);
    }

    #[test]
    fn sprite_height_latched_at_oam_scan() {
        let mut ppu = Ppu::new();
        let mut irq = Interrupts::new();
        // row 3 of tile 2 solid colour 3
        ppu.vram[0x20 + 3 * 2] = 0xFF;
        ppu.vram[0x21 + 3 * 2] = 0xFF;
        ppu.write_reg(0xFF47, 0xE4, &mut irq);
        ppu.write_reg(0xFF48, 0xE4, &mut irq);
        ppu.oam[0..4].copy_from_slice(&[16, 8, 2, 0x40]);
        lcd_on(&mut ppu, &mut irq, 0x07);
        run_to(&mut ppu, &mut irq, 12, 84);
        // switch to 8x8 objects after the scan picked the sprite as 8x16
        ppu.write_reg(0xFF40, 0x83, &mut irq);
        run_to(&mut ppu, &mut irq, 12, 300);

        let line = &ppu.framebuffer()[12 * SCREEN_WIDTH..13 * SCREEN_WIDTH];
        assert!(line[0..8].iter().all(|&px| px == COLOURS[3]));
        assert_eq!(line[8], COLOURS[0]);
    }

    #[test]
    fn oam_blocked_on_first_cycle_of_line() {
        let mut ppu = Ppu::new();
        let mut irq = Interrupts::new();
        ppu.oam[0] = 0x42;
        lcd_on(&mut ppu, &mut irq, 0x01);
        run_to(&mut ppu, &mut irq, 0, 452);
        assert_eq!(ppu.read_oam(0xFE00), 0x42);
        ppu.tick(&mut irq);
        assert_eq!(ppu.ly(), 1);
        assert_eq!(ppu.line_cycle(), 0);
        assert_eq!(ppu.read_oam(0xFE00), 0xFF);
    }
}
