/// External configuration loader.
///
/// Reads `config.toml` from the executable's directory, the CWD or the
/// per-user / system data directories, first hit wins.
/// Falls back to sensible defaults if the file is missing or incomplete.
///
/// Logging is configured *by* this file, so nothing here can log yet:
/// problems are collected in `GameConfig::warnings` and reported once the
/// subscriber is up.

use serde::Deserialize;
use std::path::PathBuf;

const APP_DIR: &str = "divergence";

// ── Public Config Struct ──

#[derive(Clone, Debug)]
pub struct GameConfig {
    pub input: InputConfig,
    pub gamepad: GamepadConfig,
    pub log: LogConfig,
    pub levels_dir: PathBuf,
    /// Index into the level list to open on start.
    pub start_level: usize,
    pub sound_enabled: bool,
    /// Problems met while loading, for the caller to log.
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct InputConfig {
    /// Minimum gap between two accepted moves while a key is held.
    pub move_repeat_ms: u64,
    pub frame_ms: u64,
}

#[derive(Clone, Debug)]
pub struct GamepadConfig {
    pub act: Vec<String>,
    pub branch: Vec<String>,
    pub merge: Vec<String>,
    pub inherit: Vec<String>,
    pub switch_focus: Vec<String>,
    pub undo: Vec<String>,
    pub reset: Vec<String>,
    pub quit: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct LogConfig {
    /// Empty disables logging.
    pub file: PathBuf,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

// ── TOML Schema (with serde defaults) ──

#[derive(Deserialize, Debug, Default)]
struct TomlConfig {
    #[serde(default)]
    input: TomlInput,
    #[serde(default)]
    gamepad: TomlGamepad,
    #[serde(default)]
    general: TomlGeneral,
    #[serde(default)]
    log: TomlLog,
    #[serde(default)]
    sound: TomlSound,
}

#[derive(Deserialize, Debug)]
struct TomlInput {
    #[serde(default = "default_move_repeat")]
    move_repeat_ms: u64,
    #[serde(default = "default_frame")]
    frame_ms: u64,
}

#[derive(Deserialize, Debug)]
struct TomlGamepad {
    #[serde(default = "default_act")]
    act: Vec<String>,
    #[serde(default = "default_branch")]
    branch: Vec<String>,
    #[serde(default = "default_merge")]
    merge: Vec<String>,
    #[serde(default = "default_inherit")]
    inherit: Vec<String>,
    #[serde(default = "default_switch_focus")]
    switch_focus: Vec<String>,
    #[serde(default = "default_undo")]
    undo: Vec<String>,
    #[serde(default = "default_reset")]
    reset: Vec<String>,
    #[serde(default = "default_quit")]
    quit: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct TomlGeneral {
    #[serde(default = "default_levels_dir")]
    levels_dir: String,
    #[serde(default)]
    start_level: usize,
}

#[derive(Deserialize, Debug)]
struct TomlLog {
    #[serde(default = "default_log_file")]
    file: String,
    #[serde(default = "default_log_level")]
    level: String,
}

#[derive(Deserialize, Debug)]
struct TomlSound {
    #[serde(default = "default_true")]
    enabled: bool,
}

// ── Defaults ──

fn default_move_repeat() -> u64 { 120 }
fn default_frame() -> u64 { 16 }

fn default_act() -> Vec<String> { vec!["A".into()] }
fn default_branch() -> Vec<String> { vec!["Y".into()] }
fn default_merge() -> Vec<String> { vec!["X".into()] }
fn default_inherit() -> Vec<String> { vec!["R1".into()] }
fn default_switch_focus() -> Vec<String> { vec!["L1".into(), "Select".into()] }
fn default_undo() -> Vec<String> { vec!["B".into()] }
fn default_reset() -> Vec<String> { vec!["Start".into()] }
fn default_quit() -> Vec<String> { vec!["Mode".into()] }
fn default_levels_dir() -> String { "levels".into() }
fn default_log_file() -> String { "divergence.log".into() }
fn default_log_level() -> String { "info".into() }
fn default_true() -> bool { true }

impl Default for TomlInput {
    fn default() -> Self {
        TomlInput {
            move_repeat_ms: default_move_repeat(),
            frame_ms: default_frame(),
        }
    }
}

impl Default for TomlGamepad {
    fn default() -> Self {
        TomlGamepad {
            act: default_act(),
            branch: default_branch(),
            merge: default_merge(),
            inherit: default_inherit(),
            switch_focus: default_switch_focus(),
            undo: default_undo(),
            reset: default_reset(),
            quit: default_quit(),
        }
    }
}

impl Default for TomlGeneral {
    fn default() -> Self {
        TomlGeneral {
            levels_dir: default_levels_dir(),
            start_level: 0,
        }
    }
}

impl Default for TomlLog {
    fn default() -> Self {
        TomlLog {
            file: default_log_file(),
            level: default_log_level(),
        }
    }
}

impl Default for TomlSound {
    fn default() -> Self {
        TomlSound { enabled: true }
    }
}

// ── Loading ──

impl GameConfig {
    /// Load config from `config.toml`.
    /// Missing file or missing keys gracefully fall back to defaults.
    pub fn load() -> Self {
        let search_dirs = candidate_dirs();
        let mut warnings = vec![];
        let toml_cfg = load_toml(&search_dirs, &mut warnings);
        Self::resolve(toml_cfg, &search_dirs, warnings)
    }

    /// Build from TOML text. Parse errors fall back to defaults.
    pub fn from_toml_str(text: &str) -> Self {
        let mut warnings = vec![];
        let toml_cfg = parse_toml(text, "config.toml", &mut warnings);
        Self::resolve(toml_cfg, &[], warnings)
    }

    fn resolve(toml_cfg: TomlConfig, search_dirs: &[PathBuf], warnings: Vec<String>) -> Self {
        let levels_dir_str = &toml_cfg.general.levels_dir;
        let levels_dir = if PathBuf::from(levels_dir_str).is_absolute() {
            PathBuf::from(levels_dir_str)
        } else {
            search_dirs.iter()
                .map(|d| d.join(levels_dir_str))
                .find(|p| p.is_dir())
                .unwrap_or_else(|| PathBuf::from(levels_dir_str))
        };

        GameConfig {
            input: InputConfig {
                move_repeat_ms: toml_cfg.input.move_repeat_ms,
                frame_ms: toml_cfg.input.frame_ms.max(1),
            },
            gamepad: GamepadConfig {
                act: toml_cfg.gamepad.act,
                branch: toml_cfg.gamepad.branch,
                merge: toml_cfg.gamepad.merge,
                inherit: toml_cfg.gamepad.inherit,
                switch_focus: toml_cfg.gamepad.switch_focus,
                undo: toml_cfg.gamepad.undo,
                reset: toml_cfg.gamepad.reset,
                quit: toml_cfg.gamepad.quit,
            },
            log: LogConfig {
                file: PathBuf::from(toml_cfg.log.file),
                level: toml_cfg.log.level,
            },
            levels_dir,
            start_level: toml_cfg.general.start_level,
            sound_enabled: toml_cfg.sound.enabled,
            warnings,
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self::resolve(TomlConfig::default(), &[], vec![])
    }
}

/// Candidate directories to search: exe dir + CWD + data paths (deduplicated).
/// Shared with the save-slot and level-pack lookups.
pub fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![];

    // 1. Directory of the running executable, symlinks resolved
    if let Ok(exe) = std::env::current_exe() {
        let resolved = exe.canonicalize().unwrap_or(exe);
        if let Some(parent) = resolved.parent() {
            dirs.push(parent.to_path_buf());
        }
    }

    // 2. Current working directory
    if let Ok(cwd) = std::env::current_dir() {
        if !dirs.iter().any(|d| d == &cwd) {
            dirs.push(cwd);
        }
    }

    // 3. XDG data home
    if let Ok(home) = std::env::var("HOME") {
        let xdg = PathBuf::from(&home).join(".local/share").join(APP_DIR);
        if xdg.is_dir() && !dirs.iter().any(|d| d == &xdg) {
            dirs.push(xdg);
        }
    }

    // 4. System data directory
    let sys = PathBuf::from("/usr/share").join(APP_DIR);
    if sys.is_dir() && !dirs.iter().any(|d| d == &sys) {
        dirs.push(sys);
    }

    if dirs.is_empty() {
        dirs.push(PathBuf::from("."));
    }

    dirs
}

fn parse_toml(text: &str, origin: &str, warnings: &mut Vec<String>) -> TomlConfig {
    match toml::from_str::<TomlConfig>(text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warnings.push(format!("{origin} parse error, using defaults: {e}"));
            TomlConfig::default()
        }
    }
}

/// Search for config.toml in candidate directories.
fn load_toml(search_dirs: &[PathBuf], warnings: &mut Vec<String>) -> TomlConfig {
    for dir in search_dirs {
        let path = dir.join("config.toml");
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(text) => return parse_toml(&text, &path.display().to_string(), warnings),
                Err(e) => warnings.push(format!("could not read {}: {e}", path.display())),
            }
        }
    }
    TomlConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = GameConfig::from_toml_str("");
        assert_eq!(cfg.input.move_repeat_ms, 120);
        assert_eq!(cfg.log.level, "info");
        assert_eq!(cfg.levels_dir, PathBuf::from("levels"));
        assert!(cfg.sound_enabled);
        assert!(cfg.warnings.is_empty());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = GameConfig::from_toml_str(
            "[general]\nstart_level = 2\n[gamepad]\nundo = [\"Y\", \"L2\"]\n[log]\nfile = \"\"\n",
        );
        assert_eq!(cfg.start_level, 2);
        assert_eq!(cfg.gamepad.undo, vec!["Y".to_string(), "L2".to_string()]);
        assert_eq!(cfg.gamepad.act, vec!["A".to_string()]);
        assert_eq!(cfg.log.file, PathBuf::new());
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn malformed_file_warns_and_falls_back() {
        let cfg = GameConfig::from_toml_str("[input\nframe_ms = ");
        assert_eq!(cfg.warnings.len(), 1);
        assert_eq!(cfg.input.frame_ms, 16);
    }
}
