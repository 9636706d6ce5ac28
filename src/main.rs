/// Entry point and game loop.

mod ui;

use std::error::Error;
use std::fs::OpenOptions;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use divergence::config::{GameConfig, LogConfig};
use divergence::domain::entity::Intent;
use divergence::sim::event::GameEvent;
use divergence::sim::level::{load_levels, Level};
use divergence::sim::replay::{self, SaveData};
use divergence::sim::session::GameSession;
use divergence::sim::view::{self, FrameView};
use ui::gamepad::GamepadState;
use ui::input::{Command, InputState};
use ui::renderer::{Hud, Renderer};
use ui::sound::{self, SoundEngine};

/// How long a status message stays up, in frames.
const MESSAGE_FRAMES: u32 = 150;

fn main() {
    let config = GameConfig::load();

    if let Err(e) = init_logging(&config.log) {
        eprintln!("Logging disabled: {e}");
    }
    for warning in &config.warnings {
        warn!("{warning}");
    }

    let mut app = match App::new(load_levels(&config), config.start_level) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Cannot start: {e}");
            return;
        }
    };

    let mut renderer = Renderer::new();
    if let Err(e) = renderer.init() {
        eprintln!("Terminal init failed: {e}");
        return;
    }

    let audio = if config.sound_enabled { SoundEngine::new() } else { None };

    let result = game_loop(&mut app, &mut renderer, audio.as_ref(), &config);

    if let Err(e) = renderer.cleanup() {
        eprintln!("Terminal cleanup failed: {e}");
    }
    if let Err(e) = result {
        eprintln!("Game error: {e}");
    }

    println!();
    println!("Thanks for playing Divergence!");
}

/// Plain-text log file; stdout belongs to the terminal UI.
fn init_logging(cfg: &LogConfig) -> Result<(), Box<dyn Error + Send + Sync>> {
    if cfg.file.as_os_str().is_empty() {
        return Ok(());
    }
    let file = OpenOptions::new().create(true).append(true).open(&cfg.file)?;
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&cfg.level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()?;
    Ok(())
}

// ══════════════════════════════════════════════════════════════
// App: level list + current session
// ══════════════════════════════════════════════════════════════

struct App {
    levels: Vec<Level>,
    /// Always a valid index into `levels`.
    index: usize,
    session: GameSession,
    message: String,
    message_timer: u32,
}

impl App {
    fn new(levels: Vec<Level>, start: usize) -> Result<Self, Box<dyn Error>> {
        let index = start.min(levels.len().saturating_sub(1));
        let level = levels.get(index).ok_or("no playable levels")?;
        let session = GameSession::new(level.source.clone())?;
        info!(level = %level.name, index, total = levels.len(), "level loaded");
        Ok(App { levels, index, session, message: String::new(), message_timer: 0 })
    }

    fn level(&self) -> &Level {
        &self.levels[self.index]
    }

    fn set_message(&mut self, msg: impl Into<String>) {
        self.message = msg.into();
        self.message_timer = MESSAGE_FRAMES;
    }

    fn tick_message(&mut self) {
        if self.message_timer > 0 {
            self.message_timer -= 1;
            if self.message_timer == 0 {
                self.message.clear();
            }
        }
    }

    /// Switch to level `index`, if it exists.
    fn open(&mut self, index: usize) {
        let Some(level) = self.levels.get(index) else {
            return;
        };
        let name = level.name.clone();
        match GameSession::new(level.source.clone()) {
            Ok(session) => {
                self.session = session;
                self.index = index;
                info!(level = %name, index, "level loaded");
                self.set_message(format!("Level {}: {}", index + 1, name));
            }
            Err(e) => {
                warn!(level = %name, error = %e, "level unplayable");
                self.set_message(format!("Level {} unplayable: {e}", index + 1));
            }
        }
    }

    fn save(&mut self, slot: u8) {
        let data = SaveData::of(self.index, &self.session);
        match replay::save_slot(slot, &data) {
            Ok(()) => self.set_message(format!("Saved slot {} (level {}, {} steps)", slot, self.index + 1, data.log.len())),
            Err(e) => {
                warn!(slot, error = %e, "save failed");
                self.set_message(format!("Save failed: {e}"));
            }
        }
    }

    fn load(&mut self, slot: u8) {
        let Some(data) = replay::load_slot(slot) else {
            self.set_message(format!("Slot {slot} is empty"));
            return;
        };
        let Some(level) = self.levels.get(data.level) else {
            self.set_message(format!("Slot {slot}: level {} is not installed", data.level + 1));
            return;
        };
        match replay::replay(&level.source, &data.log) {
            Ok(session) => {
                self.session = session;
                self.index = data.level;
                info!(slot, level = data.level, steps = data.log.len(), "save loaded");
                self.set_message(format!("Loaded slot {slot}"));
            }
            Err(e) => {
                warn!(slot, error = %e, "save replay failed");
                self.set_message(format!("Slot {slot}: {e}"));
            }
        }
    }

    fn apply(&mut self, intent: Intent, audio: Option<&SoundEngine>) {
        let events = self.session.apply(intent);
        if let (Some(engine), Some(sfx)) = (audio, sound::pick(&events)) {
            engine.play(sfx);
        }
        if events.contains(&GameEvent::Victory) {
            let msg = if self.index + 1 < self.levels.len() {
                format!("Cleared in {} steps. PgDn for the next level", self.session.input_log().len())
            } else {
                format!("Cleared in {} steps. That was the last level", self.session.input_log().len())
            };
            self.set_message(msg);
        }
    }
}

// ══════════════════════════════════════════════════════════════
// Game loop
// ══════════════════════════════════════════════════════════════

fn game_loop(
    app: &mut App,
    renderer: &mut Renderer,
    audio: Option<&SoundEngine>,
    config: &GameConfig,
) -> Result<(), Box<dyn Error>> {
    let mut kb = InputState::new();
    let mut gp = GamepadState::new();
    gp.load_button_config(&config.gamepad);

    let frame_time = Duration::from_millis(config.input.frame_ms);
    let repeat = Duration::from_millis(config.input.move_repeat_ms);
    let mut last_move = Instant::now();

    loop {
        kb.drain_events();
        gp.update();

        let mut commands = kb.commands();
        commands.extend(gp.commands());

        // Held direction keeps stepping at the repeat rate
        if commands.iter().any(|c| matches!(c, Command::Play(Intent::Move(_)))) {
            last_move = Instant::now();
        } else if let Some(dir) = kb.held_direction().or_else(|| gp.held_direction()) {
            if last_move.elapsed() >= repeat {
                commands.push(Command::Play(Intent::Move(dir)));
                last_move = Instant::now();
            }
        }

        for command in commands {
            match command {
                Command::Quit => return Ok(()),
                Command::Play(intent) => app.apply(intent, audio),
                Command::PrevLevel if app.index > 0 => {
                    app.open(app.index - 1);
                    renderer.invalidate();
                }
                Command::NextLevel if app.index + 1 < app.levels.len() => {
                    app.open(app.index + 1);
                    renderer.invalidate();
                }
                Command::PrevLevel | Command::NextLevel => {}
                Command::SaveSlot(slot) => app.save(slot),
                Command::LoadSlot(slot) => {
                    app.load(slot);
                    renderer.invalidate();
                }
            }
        }

        app.tick_message();

        let level = app.level();
        let frame = FrameView::build(&app.session);
        let hud = Hud {
            level: app.index,
            total: app.levels.len(),
            name: &level.name,
            hint: view::stage_hint(&app.session, &level.hints),
            message: &app.message,
        };
        renderer.render(&frame, &hud)?;

        std::thread::sleep(frame_time);
    }
}
