/// Presentation layer: double-buffered, diff-based terminal renderer.
///
/// How it works:
///   1. Compose the next frame into `front` buffer (array of Cell)
///   2. Compare each cell with `back` buffer (previous frame)
///   3. Only emit terminal commands for cells that changed
///   4. All commands are batched with `queue!`, flushed once at the end
///   5. Swap front/back
///
/// Screen layout:
///   row 0        HUD: level, steps, timeline state
///   row 2..      one bordered board per branch, side by side:
///                MAIN, SUB (while branched), MERGE PREVIEW (while branched)
///   below        level hint, message bar, key help
///
/// Each grid cell is two terminal columns.

use std::io::{self, BufWriter, Write};

use crossterm::{
    cursor::{self, MoveTo},
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};

use divergence::domain::branch::BranchState;
use divergence::domain::entity::Layer;
use divergence::domain::physics;
use divergence::domain::terrain::{Dir, Pos, Terrain};
use divergence::sim::view::{BranchView, FrameView, HintKind, TimelineHint};

// ── Cell: the unit of the back-buffer ──

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Cell {
    ch: char,
    fg: Color,
    bg: Color,
}

impl Cell {
    /// Explicit dark background for all "empty" terminal cells, so the gap
    /// between rows matches the cell colour on VTE terminals.
    const BASE_BG: Color = Color::Rgb { r: 22, g: 22, b: 35 };

    const BLANK: Cell = Cell { ch: ' ', fg: Color::White, bg: Cell::BASE_BG };

    /// Sentinel cell used to invalidate the back buffer.
    /// Different from any real cell, so every position will be diff'd.
    const INVALID: Cell = Cell { ch: '?', fg: Color::Magenta, bg: Color::Magenta };

    fn new(ch: char, fg: Color, bg: Color) -> Self {
        Cell { ch, fg, bg }
    }
}

// ── FrameBuffer: a 2D grid of Cells ──

struct FrameBuffer {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl FrameBuffer {
    fn new(w: usize, h: usize) -> Self {
        FrameBuffer {
            width: w,
            height: h,
            cells: vec![Cell::BLANK; w * h],
        }
    }

    fn resize(&mut self, w: usize, h: usize) {
        if self.width != w || self.height != h {
            self.width = w;
            self.height = h;
            self.cells = vec![Cell::BLANK; w * h];
        }
    }

    fn clear(&mut self) {
        self.cells.fill(Cell::BLANK);
    }

    fn set(&mut self, x: usize, y: usize, cell: Cell) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = cell;
        }
    }

    fn get(&self, x: usize, y: usize) -> Cell {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x]
        } else {
            Cell::BLANK
        }
    }

    /// Write a string at (x, y). Each char occupies 1 column.
    fn put_str(&mut self, x: usize, y: usize, s: &str, fg: Color, bg: Color) {
        for (i, ch) in s.chars().enumerate() {
            if x + i >= self.width { break; }
            self.set(x + i, y, Cell::new(ch, fg, bg));
        }
    }

    fn fill_row(&mut self, y: usize, bg: Color) {
        for x in 0..self.width {
            self.set(x, y, Cell::new(' ', Color::White, bg));
        }
    }

    #[cfg(test)]
    fn row_text(&self, y: usize) -> String {
        (0..self.width).map(|x| self.get(x, y).ch).collect()
    }
}

// ── Layout ──

const CELL_W: usize = 2;
const HUD_ROW: usize = 0;
const TITLE_ROW: usize = 2;
const BOARD_ROW: usize = 3;
const PANEL_GAP: usize = 3;

const HUD_BG: Color = Color::Rgb { r: 20, g: 20, b: 60 };
const FLOOR_BG: Color = Color::Rgb { r: 34, g: 34, b: 50 };
const PIT_BG: Color = Color::Rgb { r: 6, g: 6, b: 10 };
const TARGET_BG: Color = Color::Rgb { r: 80, g: 72, b: 20 };
const FOCUS_FG: Color = Color::Rgb { r: 255, g: 220, b: 50 };
const FRAME_FG: Color = Color::Rgb { r: 90, g: 90, b: 110 };

/// Text around the boards.
pub struct Hud<'a> {
    pub level: usize,
    pub total: usize,
    pub name: &'a str,
    /// Level message for the current stage.
    pub hint: &'a str,
    /// Transient status line (saves, loads, errors).
    pub message: &'a str,
}

// ── Renderer ──

pub struct Renderer {
    writer: BufWriter<io::Stdout>,
    front: FrameBuffer,
    back: FrameBuffer,
    term_w: usize,
    term_h: usize,
}

impl Renderer {
    pub fn new() -> Self {
        Renderer {
            writer: BufWriter::with_capacity(16384, io::stdout()),
            front: FrameBuffer::new(0, 0),
            back: FrameBuffer::new(0, 0),
            term_w: 0,
            term_h: 0,
        }
    }

    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(
            self.writer,
            terminal::EnterAlternateScreen,
            cursor::Hide,
            SetBackgroundColor(Cell::BASE_BG),
            Clear(ClearType::All)
        )?;

        let (tw, th) = terminal::size().unwrap_or((80, 24));
        self.term_w = tw as usize;
        self.term_h = th as usize;
        self.front.resize(self.term_w, self.term_h);
        self.back.resize(self.term_w, self.term_h);
        // Force full repaint on first frame
        self.back.cells.fill(Cell::INVALID);

        Ok(())
    }

    pub fn cleanup(&mut self) -> io::Result<()> {
        execute!(
            self.writer,
            ResetColor,
            cursor::Show,
            terminal::LeaveAlternateScreen
        )?;
        terminal::disable_raw_mode()
    }

    /// Force a full repaint next frame (level change, load).
    pub fn invalidate(&mut self) {
        self.back.cells.fill(Cell::INVALID);
    }

    pub fn render(&mut self, frame: &FrameView, hud: &Hud) -> io::Result<()> {
        // Detect terminal resize
        let (tw, th) = terminal::size().unwrap_or((80, 24));
        if tw as usize != self.term_w || th as usize != self.term_h {
            self.term_w = tw as usize;
            self.term_h = th as usize;
            self.front.resize(self.term_w, self.term_h);
            self.back.resize(self.term_w, self.term_h);
            self.back.cells.fill(Cell::INVALID);
            queue!(self.writer, SetBackgroundColor(Cell::BASE_BG), Clear(ClearType::All))?;
        }

        self.front.clear();
        compose(&mut self.front, frame, hud);

        self.flush_diff()?;
        std::mem::swap(&mut self.front, &mut self.back);
        Ok(())
    }

    // ── Diff flush: only write changed cells ──

    fn flush_diff(&mut self) -> io::Result<()> {
        let mut last_fg = Color::White;
        let mut last_bg = Cell::BASE_BG;
        let mut need_move = true;
        let mut last_x: usize = 0;
        let mut last_y: usize = 0;

        // Explicit base colours; ResetColor would fall back to the terminal default.
        queue!(self.writer,
            SetForegroundColor(Color::White),
            SetBackgroundColor(Cell::BASE_BG),
        )?;

        for y in 0..self.front.height {
            for x in 0..self.front.width {
                let cell = self.front.get(x, y);
                if cell == self.back.get(x, y) {
                    need_move = true;
                    continue;
                }

                if need_move || x != last_x + 1 || y != last_y {
                    queue!(self.writer, MoveTo(x as u16, y as u16))?;
                    need_move = false;
                }
                if cell.fg != last_fg {
                    queue!(self.writer, SetForegroundColor(cell.fg))?;
                    last_fg = cell.fg;
                }
                if cell.bg != last_bg {
                    queue!(self.writer, SetBackgroundColor(cell.bg))?;
                    last_bg = cell.bg;
                }
                queue!(self.writer, Print(cell.ch))?;
                last_x = x;
                last_y = y;
            }
        }

        self.writer.flush()
    }
}

// ══════════════════════════════════════════════════════════════
// Compose: build front buffer content
// ══════════════════════════════════════════════════════════════

fn compose(buf: &mut FrameBuffer, frame: &FrameView, hud: &Hud) {
    // ── HUD row ──
    let timeline = match frame.timeline {
        TimelineHint::None => "",
        TimelineHint::Branch => "V: split timeline",
        TimelineHint::Merge if frame.can_inherit => "C: merge  I: inherit",
        TimelineHint::Merge => "C: merge",
    };
    let goal = if frame.goal_active { "GOAL OPEN" } else { "" };
    let text = format!(
        " DIVERGENCE  {}/{}  {:<22}  Steps:{:<4}  {:<9}  {} ",
        hud.level + 1, hud.total, hud.name, frame.steps, goal, timeline,
    );
    buf.fill_row(HUD_ROW, HUD_BG);
    buf.put_str(0, HUD_ROW, &text, Color::White, HUD_BG);

    // ── Boards ──
    let mut col = 1;
    let mut board_h = 0;
    for panel in frame.panels.iter().chain(frame.preview.as_ref()) {
        let (w, h) = compose_panel(buf, panel, frame.goal_active, col);
        col += w + PANEL_GAP;
        board_h = board_h.max(h);
    }

    // ── Overlay ──
    if frame.collapsed {
        compose_overlay(buf, col, board_h, "TIMELINE COLLAPSED", "Z: undo   R: reset", Color::Rgb { r: 120, g: 20, b: 20 });
    } else if frame.victory {
        compose_overlay(buf, col, board_h, "LEVEL CLEAR", "PgDn: next level", Color::Rgb { r: 20, g: 100, b: 40 });
    }

    // ── Hint / message / help ──
    let hint_row = BOARD_ROW + board_h + 1;
    if !hud.hint.is_empty() {
        buf.put_str(1, hint_row, hud.hint, Color::Rgb { r: 180, g: 180, b: 200 }, Cell::BASE_BG);
    }
    let msg_row = hint_row + 1;
    if !hud.message.is_empty() {
        let bar = Color::Rgb { r: 200, g: 180, b: 50 };
        buf.fill_row(msg_row, bar);
        buf.put_str(0, msg_row, &format!(" {} ", hud.message), Color::Black, bar);
    }
    let help_row = msg_row + 2;
    buf.put_str(0, help_row, " Move:Arrows/WASD  Act:X/Space  V:Branch  C:Merge  I:Inherit  Tab:Focus", Color::DarkGrey, Cell::BASE_BG);
    buf.put_str(0, help_row + 1, " Z:Undo  R:Reset  PgUp/PgDn:Level  F5-F8:Save  F9-F12:Load  Esc:Quit", Color::DarkGrey, Cell::BASE_BG);
}

/// Draw one bordered board with its title. Returns (width, height) in
/// terminal cells, border included.
fn compose_panel(buf: &mut FrameBuffer, panel: &BranchView, goal_active: bool, left: usize) -> (usize, usize) {
    let size = panel.state.grid_size;
    let inner_w = size * CELL_W;
    let frame_fg = if panel.focused { FOCUS_FG } else { FRAME_FG };

    let title = if panel.focused { format!("▶ {}", panel.title) } else { format!("  {}", panel.title) };
    buf.put_str(left, TITLE_ROW, &title, frame_fg, Cell::BASE_BG);

    // Border
    let right = left + inner_w + 1;
    let bottom = BOARD_ROW + size + 1;
    for x in left + 1..right {
        buf.set(x, BOARD_ROW, Cell::new('─', frame_fg, Cell::BASE_BG));
        buf.set(x, bottom, Cell::new('─', frame_fg, Cell::BASE_BG));
    }
    for y in BOARD_ROW + 1..bottom {
        buf.set(left, y, Cell::new('│', frame_fg, Cell::BASE_BG));
        buf.set(right, y, Cell::new('│', frame_fg, Cell::BASE_BG));
    }
    buf.set(left, BOARD_ROW, Cell::new('┌', frame_fg, Cell::BASE_BG));
    buf.set(right, BOARD_ROW, Cell::new('┐', frame_fg, Cell::BASE_BG));
    buf.set(left, bottom, Cell::new('└', frame_fg, Cell::BASE_BG));
    buf.set(right, bottom, Cell::new('┘', frame_fg, Cell::BASE_BG));

    let target = panel.interaction.map(|h| h.target);
    for gy in 0..size {
        for gx in 0..size {
            let pos = Pos::new(gx as i32, gy as i32);
            let [c0, c1] = compose_cell(panel, pos, goal_active);
            let highlight = |c: Cell| if target == Some(pos) { Cell { bg: TARGET_BG, ..c } } else { c };
            let col = left + 1 + gx * CELL_W;
            let row = BOARD_ROW + 1 + gy;
            buf.set(col, row, highlight(c0));
            buf.set(col + 1, row, highlight(c1));
        }
    }

    // Adaptive-action label under the focused board
    if let Some(hint) = panel.interaction {
        let label = match hint.kind {
            HintKind::Pickup => "X: pick up",
            HintKind::Drop => "X: drop",
            HintKind::Converge => "X: collapse copy",
        };
        buf.put_str(left + 1, bottom + 1, label, FOCUS_FG, Cell::BASE_BG);
    }

    (inner_w + 2, size + 3)
}

/// The two terminal cells for grid cell `pos`.
fn compose_cell(panel: &BranchView, pos: Pos, goal_active: bool) -> [Cell; 2] {
    let state: &BranchState = &panel.state;
    let player = state.player();

    if player.pos == pos {
        let arrow = match player.facing {
            Dir::Up => '▲',
            Dir::Down => '▼',
            Dir::Left => '◀',
            Dir::Right => '▶',
        };
        let carry = if state.is_holding() { '■' } else { ' ' };
        let bg = terrain_cells(state, pos, goal_active)[0].bg;
        return [Cell::new(arrow, Color::White, bg), Cell::new(carry, Color::Rgb { r: 230, g: 150, b: 60 }, bg)];
    }

    if let Some(b) = state.entities.iter().find(|e| e.is_box() && e.pos == pos && e.layer == Layer::Ground) {
        let bg = terrain_cells(state, pos, goal_active)[0].bg;
        return if panel.shadows.contains(&b.id) {
            let fg = Color::Rgb { r: 120, g: 170, b: 230 };
            [Cell::new('░', fg, bg), Cell::new('░', fg, bg)]
        } else {
            let fg = Color::Rgb { r: 230, g: 150, b: 60 };
            [Cell::new('█', fg, bg), Cell::new('█', fg, bg)]
        };
    }

    terrain_cells(state, pos, goal_active)
}

fn terrain_cells(state: &BranchState, pos: Pos, goal_active: bool) -> [Cell; 2] {
    let pair = |c0: char, c1: char, fg: Color, bg: Color| [Cell::new(c0, fg, bg), Cell::new(c1, fg, bg)];
    match state.terrain_at(pos) {
        Terrain::Floor => pair(' ', ' ', Color::White, FLOOR_BG),
        Terrain::Wall => pair('▓', '▓', Color::Rgb { r: 110, g: 110, b: 120 }, Color::Rgb { r: 60, g: 60, b: 70 }),
        Terrain::Switch => {
            let fg = if physics::weight_at(pos, state) > 0 {
                Color::Rgb { r: 80, g: 220, b: 100 }
            } else {
                Color::Rgb { r: 220, g: 200, b: 60 }
            };
            pair('[', ']', fg, FLOOR_BG)
        }
        Terrain::WeightLimit(n) => pair('w', digit(n), Color::Rgb { r: 100, g: 200, b: 255 }, FLOOR_BG),
        Terrain::NoCarry => pair('×', '×', Color::Rgb { r: 170, g: 60, b: 60 }, FLOOR_BG),
        Terrain::BranchPoint(n) => pair('◆', digit(n), Color::Rgb { r: 200, g: 100, b: 230 }, FLOOR_BG),
        Terrain::Goal => {
            let fg = if goal_active { Color::Rgb { r: 80, g: 255, b: 120 } } else { Color::DarkGrey };
            pair('◎', ' ', fg, FLOOR_BG)
        }
        Terrain::Hole if physics::is_hole_filled(pos, state) => {
            pair('▒', '▒', Color::Rgb { r: 120, g: 80, b: 40 }, Color::Rgb { r: 50, g: 35, b: 20 })
        }
        Terrain::Hole => pair(' ', ' ', Color::White, PIT_BG),
    }
}

fn digit(n: u8) -> char {
    char::from_digit(u32::from(n), 10).unwrap_or('+')
}

fn compose_overlay(buf: &mut FrameBuffer, boards_w: usize, boards_h: usize, title: &str, sub: &str, bg: Color) {
    let box_w = 30_usize;
    let box_h = 5_usize;
    let box_x = boards_w.saturating_sub(box_w) / 2;
    let box_y = BOARD_ROW + boards_h.saturating_sub(box_h) / 2;

    for y in box_y..box_y + box_h {
        for x in box_x..box_x + box_w {
            buf.set(x, y, Cell::new(' ', Color::White, bg));
        }
    }
    let centre = |s: &str| box_x + box_w.saturating_sub(s.chars().count()) / 2;
    buf.put_str(centre(title), box_y + 1, title, Color::White, bg);
    buf.put_str(centre(sub), box_y + 3, sub, Color::Rgb { r: 220, g: 220, b: 220 }, bg);
}
