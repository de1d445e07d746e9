use crate::model::PetState;
use crossterm::{
    cursor,
    event::{DisableMouseCapture, EnableMouseCapture},
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use std::io::{self, Write};

/// Logical scene size; all scene geometry is in these units.
pub(crate) const SCENE_W: f32 = 480.0;
pub(crate) const SCENE_H: f32 = 360.0;
const WALL_FRACTION: f32 = 0.68;

// Marks the right half of a double-width glyph.
const WIDE_TAIL: char = '\0';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Cell {
    pub(crate) ch: char,
    pub(crate) fg: Color,
    pub(crate) bg: Color,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Color::White,
            bg: Color::Black,
        }
    }
}

pub(crate) struct CellBuffer {
    pub(crate) w: u16,
    pub(crate) h: u16,
    pub(crate) cells: Vec<Cell>,
}

impl CellBuffer {
    pub(crate) fn new(w: u16, h: u16) -> Self {
        Self {
            w,
            h,
            cells: vec![Cell::default(); (w as usize) * (h as usize)],
        }
    }
    pub(crate) fn idx(&self, x: u16, y: u16) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }
    pub(crate) fn set(&mut self, x: u16, y: u16, c: Cell) {
        if x < self.w && y < self.h {
            let i = self.idx(x, y);
            self.cells[i] = c;
        }
    }
    pub(crate) fn clear(&mut self, bg: Color) {
        self.cells.fill(Cell {
            bg,
            ..Cell::default()
        });
    }

    #[cfg(test)]
    pub(crate) fn row_text(&self, y: u16) -> String {
        (0..self.w)
            .map(|x| self.cells[self.idx(x, y)].ch)
            .filter(|c| *c != WIDE_TAIL)
            .collect()
    }
}

/// Full-screen session. Dropping it while still active restores the screen, so an early
/// `?` in the frame loop never leaves the shell in raw mode.
pub(crate) struct Terminal<W: Write = io::Stdout> {
    pub(crate) out: W,
    pub(crate) cols: u16,
    pub(crate) rows: u16,
    pub(crate) prev: CellBuffer,
    pub(crate) cur: CellBuffer,
    active: bool,
}

impl Terminal {
    pub(crate) fn begin() -> anyhow::Result<Self> {
        let mut out = io::stdout();
        execute!(
            out,
            EnterAlternateScreen,
            cursor::Hide,
            DisableLineWrap,
            EnableMouseCapture,
            terminal::Clear(ClearType::All)
        )?;
        terminal::enable_raw_mode()?;

        let (cols, rows) = terminal::size()?;
        Ok(Self {
            out,
            cols,
            rows,
            prev: CellBuffer::new(cols, rows),
            cur: CellBuffer::new(cols, rows),
            active: true,
        })
    }
}

impl<W: Write> Terminal<W> {
    #[cfg(test)]
    pub(crate) fn attached(out: W, cols: u16, rows: u16) -> Self {
        Self {
            out,
            cols,
            rows,
            prev: CellBuffer::new(cols, rows),
            cur: CellBuffer::new(cols, rows),
            active: true,
        }
    }

    pub(crate) fn end(&mut self) -> anyhow::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        queue!(
            self.out,
            BeginSynchronizedUpdate,
            ResetColor,
            Clear(ClearType::All),
            DisableMouseCapture,
            cursor::Show,
            EnableLineWrap,
            EndSynchronizedUpdate,
            LeaveAlternateScreen
        )?;
        self.out.flush()?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    pub(crate) fn resize_if_needed(&mut self) -> anyhow::Result<bool> {
        let (c, r) = terminal::size()?;
        if c == self.cols && r == self.rows {
            return Ok(false);
        }
        self.cols = c;
        self.rows = r;
        self.prev = CellBuffer::new(c, r);
        self.cur = CellBuffer::new(c, r);
        queue!(self.out, Clear(ClearType::All))?;
        Ok(true)
    }

    pub(crate) fn present(&mut self) -> anyhow::Result<()> {
        queue!(self.out, BeginSynchronizedUpdate)?;

        let mut last_fg = None;
        let mut last_bg = None;

        for y in 0..self.rows {
            for x in 0..self.cols {
                let i = self.cur.idx(x, y);
                let c = self.cur.cells[i];
                if c == self.prev.cells[i] || c.ch == WIDE_TAIL {
                    continue;
                }

                queue!(self.out, cursor::MoveTo(x, y))?;

                if last_fg != Some(c.fg) {
                    queue!(self.out, SetForegroundColor(c.fg))?;
                    last_fg = Some(c.fg);
                }
                if last_bg != Some(c.bg) {
                    queue!(self.out, SetBackgroundColor(c.bg))?;
                    last_bg = Some(c.bg);
                }

                queue!(self.out, Print(c.ch))?;
            }
        }

        queue!(self.out, ResetColor, EndSynchronizedUpdate)?;
        self.out.flush()?;
        self.prev.cells.copy_from_slice(&self.cur.cells);
        Ok(())
    }
}

impl<W: Write> Drop for Terminal<W> {
    fn drop(&mut self) {
        let _ = self.end();
    }
}

/* -----------------------------
   Scene geometry
------------------------------ */

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SceneRect {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) w: f32,
    pub(crate) h: f32,
}

impl SceneRect {
    /// Edges count as inside.
    pub(crate) fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.w && py >= self.y && py <= self.y + self.h
    }
}

pub(crate) const CHARACTER_RECT: SceneRect = SceneRect {
    x: 240.0,
    y: 250.0,
    w: 24.0,
    h: 64.0,
};

const WINDOW_FRAME: SceneRect = SceneRect {
    x: 70.0,
    y: 70.0,
    w: 190.0,
    h: 130.0,
};
const WINDOW_GLASS: SceneRect = SceneRect {
    x: 78.0,
    y: 78.0,
    w: 174.0,
    h: 114.0,
};

/// Where the scene sits on screen, in terminal cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SceneLayout {
    pub(crate) x: u16,
    pub(crate) y: u16,
    pub(crate) w: u16,
    pub(crate) h: u16,
}

impl SceneLayout {
    pub(crate) fn for_terminal(cols: u16, rows: u16) -> Self {
        let panel = panel_width(cols);
        Self {
            x: 0,
            y: 0,
            w: cols.saturating_sub(panel).max(1),
            h: rows.max(1),
        }
    }

    /// Centre of the cell, in scene units. `None` outside the scene.
    pub(crate) fn cell_to_scene(&self, col: u16, row: u16) -> Option<(f32, f32)> {
        if col < self.x || row < self.y || col >= self.x + self.w || row >= self.y + self.h {
            return None;
        }
        let sx = (f32::from(col - self.x) + 0.5) * SCENE_W / f32::from(self.w);
        let sy = (f32::from(row - self.y) + 0.5) * SCENE_H / f32::from(self.h);
        Some((sx, sy))
    }

    /// Cell span covering `r`; never empty so thin shapes stay visible.
    fn cells_for(&self, r: SceneRect) -> (u16, u16, u16, u16) {
        let to_col = |v: f32| (v * f32::from(self.w) / SCENE_W) as i32;
        let to_row = |v: f32| (v * f32::from(self.h) / SCENE_H) as i32;
        let c0 = to_col(r.x);
        let r0 = to_row(r.y);
        let c1 = to_col(r.x + r.w).max(c0 + 1);
        let r1 = to_row(r.y + r.h).max(r0 + 1);
        let clamp_c = |v: i32| v.clamp(0, i32::from(self.w)) as u16;
        let clamp_r = |v: i32| v.clamp(0, i32::from(self.h)) as u16;
        (clamp_c(c0), clamp_r(r0), clamp_c(c1), clamp_r(r1))
    }
}

fn panel_width(cols: u16) -> u16 {
    (cols / 2).max(36).min(cols.saturating_sub(10))
}

/// Hit-test a click given in terminal cells against the character.
pub(crate) fn hits_character(layout: &SceneLayout, col: u16, row: u16) -> bool {
    match layout.cell_to_scene(col, row) {
        Some((x, y)) => CHARACTER_RECT.contains(x, y),
        None => false,
    }
}

/* -----------------------------
   Frame drawing
------------------------------ */

pub(crate) struct FrameView<'a> {
    pub(crate) state: &'a PetState,
    pub(crate) line: &'a str,
    pub(crate) debug: &'a [String],
    pub(crate) cooldown_active: bool,
    pub(crate) enable_color: bool,
}

#[derive(Clone, Copy)]
struct Paint {
    color: Color,
    glyph: char,
}

const WALL: Paint = Paint {
    color: Color::Rgb {
        r: 0x6d,
        g: 0x7f,
        b: 0xb6,
    },
    glyph: ' ',
};
const FLOOR: Paint = Paint {
    color: Color::Rgb {
        r: 0x3f,
        g: 0x35,
        b: 0x51,
    },
    glyph: '.',
};
const FRAME: Paint = Paint {
    color: Color::Rgb {
        r: 0xe6,
        g: 0xec,
        b: 0xff,
    },
    glyph: '#',
};
const GLASS: Paint = Paint {
    color: Color::Rgb {
        r: 0x8f,
        g: 0xd8,
        b: 0xff,
    },
    glyph: ':',
};
const SKIN: Paint = Paint {
    color: Color::Rgb {
        r: 0xff,
        g: 0xd8,
        b: 0xbd,
    },
    glyph: 'o',
};
const HAIR: Paint = Paint {
    color: Color::Rgb {
        r: 0x3b,
        g: 0x2c,
        b: 0x22,
    },
    glyph: '^',
};
const SHIRT: Paint = Paint {
    color: Color::Rgb {
        r: 0x58,
        g: 0xa8,
        b: 0xff,
    },
    glyph: '|',
};
const PANTS: Paint = Paint {
    color: Color::Rgb {
        r: 0x29,
        g: 0x38,
        b: 0x55,
    },
    glyph: '"',
};

fn fill(buf: &mut CellBuffer, layout: &SceneLayout, r: SceneRect, paint: Paint, color: bool) {
    let (c0, r0, c1, r1) = layout.cells_for(r);
    let cell = if color {
        Cell {
            ch: ' ',
            fg: Color::White,
            bg: paint.color,
        }
    } else {
        Cell {
            ch: paint.glyph,
            fg: Color::White,
            bg: Color::Black,
        }
    };
    for y in r0..r1 {
        for x in c0..c1 {
            buf.set(layout.x + x, layout.y + y, cell);
        }
    }
}

pub(crate) fn draw_scene(buf: &mut CellBuffer, layout: &SceneLayout, color: bool) {
    let wall_h = SCENE_H * WALL_FRACTION;
    let full = |y: f32, h: f32| SceneRect {
        x: 0.0,
        y,
        w: SCENE_W,
        h,
    };
    fill(buf, layout, full(0.0, wall_h), WALL, color);
    fill(buf, layout, full(wall_h, SCENE_H - wall_h), FLOOR, color);
    fill(buf, layout, WINDOW_FRAME, FRAME, color);
    fill(buf, layout, WINDOW_GLASS, GLASS, color);

    // 8-unit pixel grid, 3 wide and 8 tall
    let s = CHARACTER_RECT.w / 3.0;
    let (x, y) = (CHARACTER_RECT.x, CHARACTER_RECT.y);
    let part = |dx: f32, dy: f32, w: f32, h: f32| SceneRect {
        x: x + dx * s,
        y: y + dy * s,
        w: w * s,
        h: h * s,
    };
    fill(buf, layout, part(0.0, 0.0, 3.0, 3.0), SKIN, color);
    fill(buf, layout, part(0.0, 0.0, 3.0, 1.0), HAIR, color);
    fill(buf, layout, part(1.0, 3.0, 1.0, 3.0), SHIRT, color);
    fill(buf, layout, part(0.0, 6.0, 1.0, 2.0), PANTS, color);
    fill(buf, layout, part(2.0, 6.0, 1.0, 2.0), PANTS, color);
}

fn char_cols(ch: char) -> u16 {
    match ch as u32 {
        0x1100..=0x115F
        | 0x2E80..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6 => 2,
        _ => 1,
    }
}

/// Writes `s` clipped at `max_x`; returns the column after the last glyph.
pub(crate) fn draw_text_clipped(
    buf: &mut CellBuffer,
    x: u16,
    y: u16,
    max_x: u16,
    s: &str,
    fg: Color,
) -> u16 {
    let mut xx = x;
    for ch in s.chars() {
        let w = char_cols(ch);
        if xx + w > max_x.min(buf.w) || y >= buf.h {
            break;
        }
        buf.set(
            xx,
            y,
            Cell {
                ch,
                fg,
                bg: Color::Black,
            },
        );
        if w == 2 {
            buf.set(
                xx + 1,
                y,
                Cell {
                    ch: WIDE_TAIL,
                    fg,
                    bg: Color::Black,
                },
            );
        }
        xx += w;
    }
    xx
}

/// Greedy wrap by display width.
pub(crate) fn wrap(s: &str, width: u16) -> Vec<String> {
    let width = width.max(2);
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut cur_w = 0;
    for ch in s.chars() {
        let w = char_cols(ch);
        if cur_w + w > width {
            out.push(std::mem::take(&mut cur));
            cur_w = 0;
        }
        cur.push(ch);
        cur_w += w;
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

fn bar(value: u8, width: usize) -> String {
    let v = f32::from(value.min(100)) / 100.0;
    let fill = (v * width as f32 + 0.5) as usize;
    let mut s = String::new();
    s.push('[');
    for i in 0..width {
        s.push(if i < fill { '█' } else { ' ' });
    }
    s.push(']');
    s
}

pub(crate) fn draw_frame(buf: &mut CellBuffer, view: &FrameView) {
    buf.clear(Color::Black);
    let layout = SceneLayout::for_terminal(buf.w, buf.h);
    draw_scene(buf, &layout, view.enable_color);

    let x0 = layout.x + layout.w + 1;
    let max_x = buf.w;
    let fg = Color::White;
    let dim = Color::DarkGrey;
    let mut y = 0u16;

    draw_text_clipped(buf, x0, y, max_x, "Xiaoyin Pet", Color::Yellow);
    y += 2;

    let st = view.state;
    for (name, val) in [("Affection", st.affection), ("Hunger   ", st.hunger)] {
        let line = format!("{name} {} {:>3} / 100", bar(val, 12), val);
        draw_text_clipped(buf, x0, y, max_x, &line, fg);
        y += 1;
    }
    y += 1;

    let text_w = max_x.saturating_sub(x0);
    for l in wrap(view.line, text_w).iter().take(3) {
        draw_text_clipped(buf, x0, y, max_x, l, Color::Cyan);
        y += 1;
    }
    y += 1;

    let action_fg = if view.cooldown_active { dim } else { fg };
    draw_text_clipped(
        buf,
        x0,
        y,
        max_x,
        "[1] pc  [2] eat  [3] drink  [4] music",
        action_fg,
    );
    y += 1;
    draw_text_clipped(
        buf,
        x0,
        y,
        max_x,
        "[t]/click tap  [o] +5h  [n] new day  [r] reset  [q] quit",
        dim,
    );
    y += 2;

    for l in view.debug {
        if y >= buf.h {
            break;
        }
        draw_text_clipped(buf, x0, y, max_x, l, dim);
        y += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn character_rect_edges_are_inside() {
        assert!(CHARACTER_RECT.contains(240.0, 250.0));
        assert!(CHARACTER_RECT.contains(264.0, 314.0));
        assert!(!CHARACTER_RECT.contains(239.9, 260.0));
        assert!(!CHARACTER_RECT.contains(250.0, 314.1));
    }

    #[test]
    fn clicking_the_character_cell_hits() {
        // 48x36 cells: exactly 10 scene units per cell
        let layout = SceneLayout {
            x: 0,
            y: 0,
            w: 48,
            h: 36,
        };
        assert!(hits_character(&layout, 24, 25));
        assert!(hits_character(&layout, 25, 30));
        assert!(!hits_character(&layout, 10, 25));
        assert!(!hits_character(&layout, 24, 10));
        assert!(!hits_character(&layout, 60, 25));
    }

    #[test]
    fn layout_leaves_room_for_panel() {
        let l = SceneLayout::for_terminal(120, 40);
        assert_eq!(l.w, 60);
        let l = SceneLayout::for_terminal(40, 20);
        assert_eq!(l.w, 10);
    }

    #[test]
    fn wide_glyphs_take_two_columns() {
        let mut buf = CellBuffer::new(10, 1);
        let end = draw_text_clipped(&mut buf, 0, 0, 10, "小白：hi", Color::White);
        assert_eq!(end, 8);
        assert_eq!(buf.row_text(0).trim_end(), "小白：hi");
    }

    #[test]
    fn wrap_respects_display_width() {
        assert_eq!(wrap("abcdef", 4), vec!["abcd", "ef"]);
        assert_eq!(wrap("小白小白", 5), vec!["小白", "小白"]);
        assert!(wrap("", 5).is_empty());
    }

    #[test]
    fn frame_shows_stats_and_debug() {
        let mut st = PetState::new_default(0, "2024-05-01");
        st.affection = 8;
        st.hunger = 88;
        let debug = vec!["hunger: 88".to_string()];
        let mut buf = CellBuffer::new(100, 30);
        draw_frame(
            &mut buf,
            &FrameView {
                state: &st,
                line: "小白：我在认真用电脑。",
                debug: &debug,
                cooldown_active: false,
                enable_color: false,
            },
        );
        let all: Vec<String> = (0..buf.h).map(|y| buf.row_text(y)).collect();
        assert!(all.iter().any(|r| r.contains("Affection") && r.contains("  8 / 100")));
        assert!(all.iter().any(|r| r.contains(" 88 / 100")));
        assert!(all.iter().any(|r| r.contains("我在认真用电脑")));
        assert!(all.iter().any(|r| r.contains("hunger: 88")));
        // mono mode paints the character with glyphs
        assert!(all.iter().any(|r| r.contains('o')));
    }

    #[derive(Clone, Default)]
    struct SharedBuf(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, b: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(b);
            Ok(b.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    #[test]
    fn dropping_an_active_terminal_restores_the_screen() {
        let buf = SharedBuf::default();
        drop(Terminal::attached(buf.clone(), 20, 6));
        let out = buf.text();
        assert!(out.contains("\x1b[?1049l"), "left alternate screen");
        assert!(out.contains("\x1b[?25h"), "cursor shown again");
    }

    #[test]
    fn explicit_end_is_not_repeated_on_drop() {
        let buf = SharedBuf::default();
        let mut term = Terminal::attached(buf.clone(), 20, 6);
        term.end().unwrap();
        let written = buf.0.borrow().len();
        drop(term);
        assert_eq!(buf.0.borrow().len(), written);
    }
}
