/// Keyboard input tracker.
///
/// Tracks which keys are currently held down, enabling:
///   - Repeated steps while a direction key is held
///   - Edge-triggered actions (only fire on the initial press)
///
/// Uses crossterm's keyboard enhancement for Release events when available.
/// Falls back to timeout-based release detection on terminals that don't support it.
///
/// ## Keys
///   Arrows / WASD   move or turn       X / Space   adaptive action
///   P / O           pick up / drop     V           branch
///   C / I           merge / inherit    Tab         switch focus
///   Z / Backspace   undo               R           reset level
///   PgUp / PgDn     previous / next level
///   F5-F8 save slot 1-4, F9-F12 load slot 1-4, Esc / Ctrl-C quit

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossterm::event::{self, poll, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use divergence::domain::entity::Intent;
use divergence::domain::terrain::Dir;

/// After this duration without a Press/Repeat event, consider the key released.
/// Only used when the terminal doesn't report Release events.
const HOLD_TIMEOUT: Duration = Duration::from_millis(160);

/// One thing the player asked for this frame.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Command {
    Play(Intent),
    PrevLevel,
    NextLevel,
    SaveSlot(u8),
    LoadSlot(u8),
    Quit,
}

const KEYS_UP: &[KeyCode] = &[KeyCode::Up, KeyCode::Char('w'), KeyCode::Char('W')];
const KEYS_DOWN: &[KeyCode] = &[KeyCode::Down, KeyCode::Char('s'), KeyCode::Char('S')];
const KEYS_LEFT: &[KeyCode] = &[KeyCode::Left, KeyCode::Char('a'), KeyCode::Char('A')];
const KEYS_RIGHT: &[KeyCode] = &[KeyCode::Right, KeyCode::Char('d'), KeyCode::Char('D')];

fn direction_for(code: KeyCode) -> Option<Dir> {
    if KEYS_UP.contains(&code) {
        Some(Dir::Up)
    } else if KEYS_DOWN.contains(&code) {
        Some(Dir::Down)
    } else if KEYS_LEFT.contains(&code) {
        Some(Dir::Left)
    } else if KEYS_RIGHT.contains(&code) {
        Some(Dir::Right)
    } else {
        None
    }
}

/// Map one key press to a command.
pub fn command_for(key: &KeyEvent) -> Option<Command> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C')).then_some(Command::Quit);
    }
    if let Some(dir) = direction_for(key.code) {
        return Some(Command::Play(Intent::Move(dir)));
    }

    let intent = match key.code {
        KeyCode::Char(' ') | KeyCode::Char('x') | KeyCode::Char('X') => Intent::Adaptive,
        KeyCode::Char('p') | KeyCode::Char('P') => Intent::Pickup,
        KeyCode::Char('o') | KeyCode::Char('O') => Intent::Drop,
        KeyCode::Char('v') | KeyCode::Char('V') => Intent::Branch,
        KeyCode::Char('c') | KeyCode::Char('C') => Intent::Merge,
        KeyCode::Char('i') | KeyCode::Char('I') => Intent::InheritMerge,
        KeyCode::Tab => Intent::SwitchFocus,
        KeyCode::Char('z') | KeyCode::Char('Z') | KeyCode::Backspace => Intent::Undo,
        KeyCode::Char('r') | KeyCode::Char('R') => Intent::Reset,
        KeyCode::PageUp => return Some(Command::PrevLevel),
        KeyCode::PageDown => return Some(Command::NextLevel),
        KeyCode::F(n @ 5..=8) => return Some(Command::SaveSlot(n - 4)),
        KeyCode::F(n @ 9..=12) => return Some(Command::LoadSlot(n - 8)),
        KeyCode::Esc => return Some(Command::Quit),
        _ => return None,
    };
    Some(Command::Play(intent))
}

pub struct InputState {
    /// Timestamp of last Press/Repeat event for each key.
    last_active: HashMap<KeyCode, Instant>,

    /// Keys that went from "not held" to "held" during the most recent
    /// drain_events() call.
    fresh_presses: Vec<KeyEvent>,

    /// Whether to honor Release events. Only true when keyboard
    /// enhancement is confirmed working.
    pub honor_release: bool,
}

impl InputState {
    pub fn new() -> Self {
        InputState {
            last_active: HashMap::with_capacity(16),
            fresh_presses: Vec::with_capacity(8),
            honor_release: false,
        }
    }

    /// Drain all pending terminal events and update key states.
    /// Call this once per frame.
    pub fn drain_events(&mut self) {
        self.fresh_presses.clear();

        // Read all available events without blocking
        while poll(Duration::ZERO).unwrap_or(false) {
            let Ok(Event::Key(key)) = event::read() else {
                continue;
            };
            match key.kind {
                KeyEventKind::Release if self.honor_release => {
                    self.last_active.remove(&key.code);
                }
                KeyEventKind::Release => {
                    // Enhancement not confirmed; rely on timeout expiry
                }
                _ => {
                    let was_held = self.is_held(key.code);
                    self.last_active.insert(key.code, Instant::now());
                    if !was_held {
                        self.fresh_presses.push(key);
                    }
                }
            }
        }

        // Expire keys that have timed out (fallback for terminals without Release)
        let now = Instant::now();
        self.last_active.retain(|_, t| now.duration_since(*t) < HOLD_TIMEOUT);
    }

    /// Commands from keys first pressed this frame, in arrival order.
    pub fn commands(&self) -> Vec<Command> {
        self.fresh_presses.iter().filter_map(command_for).collect()
    }

    /// Direction key currently held, for step repeat.
    pub fn held_direction(&self) -> Option<Dir> {
        self.last_active
            .iter()
            .filter(|(_, t)| t.elapsed() < HOLD_TIMEOUT)
            .filter_map(|(code, t)| direction_for(*code).map(|dir| (dir, *t)))
            .max_by_key(|(_, t)| *t)
            .map(|(dir, _)| dir)
    }

    fn is_held(&self, code: KeyCode) -> bool {
        self.last_active
            .get(&code)
            .map_or(false, |t| t.elapsed() < HOLD_TIMEOUT)
    }
}
