/// Gamepad input tracker using gilrs.
///
/// Button mapping is loaded from config.toml via `load_button_config()`.
/// Default mapping:
///   D-pad / Left Stick    →  Move / turn
///   A                     →  Adaptive action
///   Y                     →  Branch
///   X                     →  Merge
///   R1                    →  Inherit-merge
///   L1 / Select           →  Switch focus
///   B                     →  Undo
///   Start                 →  Reset level
///   Mode                  →  Quit

#[cfg(feature = "gamepad")]
use gilrs::{Axis, Button, EventType, Gilrs};

use divergence::config::GamepadConfig;
use divergence::domain::entity::Intent;
use divergence::domain::terrain::Dir;

use super::input::Command;

#[cfg_attr(not(feature = "gamepad"), allow(dead_code))]
const STICK_DEADZONE: f32 = 0.35;

const BTN_COUNT: usize = 11;

/// Logical button identifiers (one per physical button).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Btn {
    A,       // South
    B,       // East
    X,       // West
    Y,       // North
    L1,      // LeftTrigger
    R1,      // RightTrigger
    L2,      // LeftTrigger2
    R2,      // RightTrigger2
    Start,
    Select,
    Mode,
}

impl Btn {
    fn from_name(s: &str) -> Option<Btn> {
        match s.to_uppercase().as_str() {
            "A" | "SOUTH"  => Some(Btn::A),
            "B" | "EAST"   => Some(Btn::B),
            "X" | "WEST"   => Some(Btn::X),
            "Y" | "NORTH"  => Some(Btn::Y),
            "L1" | "LB" | "LEFTTRIGGER"  => Some(Btn::L1),
            "R1" | "RB" | "RIGHTTRIGGER" => Some(Btn::R1),
            "L2" | "LT" | "LEFTTRIGGER2"  => Some(Btn::L2),
            "R2" | "RT" | "RIGHTTRIGGER2" => Some(Btn::R2),
            "START" => Some(Btn::Start),
            "SELECT" | "BACK" => Some(Btn::Select),
            "MODE" | "GUIDE" | "HOME" => Some(Btn::Mode),
            _ => None,
        }
    }

    #[cfg(feature = "gamepad")]
    fn from_gilrs(btn: Button) -> Option<Btn> {
        match btn {
            Button::South     => Some(Btn::A),
            Button::East      => Some(Btn::B),
            Button::West      => Some(Btn::X),
            Button::North     => Some(Btn::Y),
            Button::LeftTrigger  => Some(Btn::L1),
            Button::RightTrigger => Some(Btn::R1),
            Button::LeftTrigger2  => Some(Btn::L2),
            Button::RightTrigger2 => Some(Btn::R2),
            Button::Start     => Some(Btn::Start),
            Button::Select    => Some(Btn::Select),
            Button::Mode      => Some(Btn::Mode),
            _ => None,
        }
    }
}

/// Per-button state: held (continuous) and just_pressed (edge).
#[derive(Clone, Copy, Debug, Default)]
struct BtnState {
    held: bool,
    just_pressed: bool,
}

impl BtnState {
    fn set(&mut self, held: bool) {
        if held && !self.held {
            self.just_pressed = true;
        }
        self.held = held;
    }
}

/// Action-to-button mapping (loaded from config).
#[derive(Debug, PartialEq)]
struct ActionMap {
    act: Vec<Btn>,
    branch: Vec<Btn>,
    merge: Vec<Btn>,
    inherit: Vec<Btn>,
    switch_focus: Vec<Btn>,
    undo: Vec<Btn>,
    reset: Vec<Btn>,
    quit: Vec<Btn>,
}

impl Default for ActionMap {
    fn default() -> Self {
        ActionMap {
            act:          vec![Btn::A],
            branch:       vec![Btn::Y],
            merge:        vec![Btn::X],
            inherit:      vec![Btn::R1],
            switch_focus: vec![Btn::L1, Btn::Select],
            undo:         vec![Btn::B],
            reset:        vec![Btn::Start],
            quit:         vec![Btn::Mode],
        }
    }
}

impl ActionMap {
    /// Lists naming no known button keep their default.
    fn from_config(cfg: &GamepadConfig) -> Self {
        fn parse_into(names: &[String], slot: &mut Vec<Btn>) {
            let parsed: Vec<Btn> = names.iter().filter_map(|s| Btn::from_name(s)).collect();
            if !parsed.is_empty() {
                *slot = parsed;
            }
        }
        let mut map = ActionMap::default();
        parse_into(&cfg.act, &mut map.act);
        parse_into(&cfg.branch, &mut map.branch);
        parse_into(&cfg.merge, &mut map.merge);
        parse_into(&cfg.inherit, &mut map.inherit);
        parse_into(&cfg.switch_focus, &mut map.switch_focus);
        parse_into(&cfg.undo, &mut map.undo);
        parse_into(&cfg.reset, &mut map.reset);
        parse_into(&cfg.quit, &mut map.quit);
        map
    }

    /// Bindings in dispatch order.
    fn bindings(&self) -> [(&[Btn], Command); 8] {
        [
            (self.quit.as_slice(), Command::Quit),
            (self.undo.as_slice(), Command::Play(Intent::Undo)),
            (self.reset.as_slice(), Command::Play(Intent::Reset)),
            (self.act.as_slice(), Command::Play(Intent::Adaptive)),
            (self.branch.as_slice(), Command::Play(Intent::Branch)),
            (self.merge.as_slice(), Command::Play(Intent::Merge)),
            (self.inherit.as_slice(), Command::Play(Intent::InheritMerge)),
            (self.switch_focus.as_slice(), Command::Play(Intent::SwitchFocus)),
        ]
    }
}

pub struct GamepadState {
    #[cfg(feature = "gamepad")]
    gilrs: Option<Gilrs>,

    // All tracked buttons (indexed by Btn)
    buttons: [BtnState; BTN_COUNT],

    // D-pad and left stick, indexed by dir_index
    dpad: [BtnState; 4],
    stick: [BtnState; 4],
    stick_x: f32,
    stick_y: f32,

    action_map: ActionMap,

    pub connected: bool,
}

fn btn_index(btn: Btn) -> usize {
    btn as usize
}

fn dir_index(dir: Dir) -> usize {
    match dir {
        Dir::Up => 0,
        Dir::Down => 1,
        Dir::Left => 2,
        Dir::Right => 3,
    }
}

impl GamepadState {
    pub fn new() -> Self {
        #[cfg(feature = "gamepad")]
        let (gilrs_opt, connected) = match Gilrs::new() {
            Ok(g) => {
                let has_pad = g.gamepads().next().is_some();
                (Some(g), has_pad)
            }
            Err(e) => {
                tracing::warn!(error = %e, "gamepad support unavailable");
                (None, false)
            }
        };
        #[cfg(not(feature = "gamepad"))]
        let connected = false;

        GamepadState {
            #[cfg(feature = "gamepad")]
            gilrs: gilrs_opt,
            buttons: [BtnState::default(); BTN_COUNT],
            dpad: [BtnState::default(); 4],
            stick: [BtnState::default(); 4],
            stick_x: 0.0,
            stick_y: 0.0,
            action_map: ActionMap::default(),
            connected,
        }
    }

    /// Load button mapping from config.
    pub fn load_button_config(&mut self, cfg: &GamepadConfig) {
        self.action_map = ActionMap::from_config(cfg);
    }

    pub fn update(&mut self) {
        self.clear_just_pressed();

        #[cfg(feature = "gamepad")]
        self.poll_gilrs();
    }

    #[cfg(feature = "gamepad")]
    fn poll_gilrs(&mut self) {
        let gilrs = match &mut self.gilrs {
            Some(g) => g,
            None => return,
        };

        let events: Vec<_> = std::iter::from_fn(|| gilrs.next_event()).collect();

        for event in events {
            match event.event {
                EventType::ButtonPressed(btn, _) => {
                    self.connected = true;
                    self.set_button(btn, true);
                }
                EventType::ButtonReleased(btn, _) => {
                    self.connected = true;
                    self.set_button(btn, false);
                }
                EventType::AxisChanged(axis, value, _) => {
                    self.connected = true;
                    match axis {
                        Axis::LeftStickX => self.stick_x = value,
                        Axis::LeftStickY => self.stick_y = value,
                        _ => {}
                    }
                }
                EventType::Connected => {
                    self.connected = true;
                    tracing::info!("gamepad connected");
                }
                EventType::Disconnected => {
                    self.connected = false;
                    self.release_all();
                    tracing::info!("gamepad disconnected");
                }
                _ => {}
            }
        }

        // Derive stick digital states
        let (x, y) = (self.stick_x, self.stick_y);
        self.stick[dir_index(Dir::Left)].set(x < -STICK_DEADZONE);
        self.stick[dir_index(Dir::Right)].set(x > STICK_DEADZONE);
        self.stick[dir_index(Dir::Up)].set(y > STICK_DEADZONE);
        self.stick[dir_index(Dir::Down)].set(y < -STICK_DEADZONE);
    }

    #[cfg(feature = "gamepad")]
    fn set_button(&mut self, gilrs_btn: Button, held: bool) {
        // D-pad handled separately (not in Btn enum)
        let dir = match gilrs_btn {
            Button::DPadUp => Some(Dir::Up),
            Button::DPadDown => Some(Dir::Down),
            Button::DPadLeft => Some(Dir::Left),
            Button::DPadRight => Some(Dir::Right),
            _ => None,
        };
        if let Some(dir) = dir {
            self.dpad[dir_index(dir)].set(held);
            return;
        }

        if let Some(btn) = Btn::from_gilrs(gilrs_btn) {
            self.buttons[btn_index(btn)].set(held);
        }
    }

    // ── Queries ──

    fn any_just_pressed(&self, btns: &[Btn]) -> bool {
        btns.iter().any(|&b| self.buttons[btn_index(b)].just_pressed)
    }

    /// Commands from buttons first pressed this frame.
    pub fn commands(&self) -> Vec<Command> {
        let mut out: Vec<Command> = Dir::ALL
            .into_iter()
            .filter(|&d| self.dpad[dir_index(d)].just_pressed || self.stick[dir_index(d)].just_pressed)
            .map(|d| Command::Play(Intent::Move(d)))
            .collect();
        for (btns, command) in self.action_map.bindings() {
            if self.any_just_pressed(btns) {
                out.push(command);
            }
        }
        out
    }

    /// Direction currently held on the d-pad or stick.
    pub fn held_direction(&self) -> Option<Dir> {
        Dir::ALL
            .into_iter()
            .find(|&d| self.dpad[dir_index(d)].held || self.stick[dir_index(d)].held)
    }

    // ── Internal ──

    fn clear_just_pressed(&mut self) {
        for b in self.buttons.iter_mut().chain(&mut self.dpad).chain(&mut self.stick) {
            b.just_pressed = false;
        }
    }

    #[cfg_attr(not(feature = "gamepad"), allow(dead_code))]
    fn release_all(&mut self) {
        self.buttons = [BtnState::default(); BTN_COUNT];
        self.dpad = [BtnState::default(); 4];
        self.stick = [BtnState::default(); 4];
        self.stick_x = 0.0;
        self.stick_y = 0.0;
    }
}
