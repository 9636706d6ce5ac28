/// Input-log replay and save slots.
///
/// A session is fully determined by its level and the codes of the intents
/// it accepted, so a save is just those two things:
///
/// ```text
///   level=2
///   log=VXUULLLUXT
/// ```
///
/// Loading replays the log from the level's initial state. The same path
/// doubles as the regression harness: replaying a recorded solution must
/// land on an identical final state.
///
/// Slots 1-4 stored as save_1.dat .. save_4.dat.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::domain::branch::LevelSource;
use crate::domain::entity::Intent;
use crate::error::ReplayError;

use super::event::GameEvent;
use super::session::{GameSession, Snapshot};

// ══════════════════════════════════════════════════════════════
// Replay
// ══════════════════════════════════════════════════════════════

pub fn parse_codes(codes: &str) -> Result<Vec<Intent>, ReplayError> {
    codes
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| Intent::from_code(c).ok_or(ReplayError::UnknownCode(c)))
        .collect()
}

/// Rebuild a session by re-applying `codes` to a fresh start on `source`.
/// Every intent must be accepted.
pub fn replay(source: &LevelSource, codes: &str) -> Result<GameSession, ReplayError> {
    let intents = parse_codes(codes)?;
    let mut session = GameSession::new(source.clone())?;
    for (step, intent) in intents.into_iter().enumerate() {
        let events = session.apply(intent);
        if events.iter().any(|e| matches!(e, GameEvent::Rejected { .. })) {
            return Err(ReplayError::Rejected { step, intent });
        }
    }
    Ok(session)
}

/// Does replaying `codes` end in exactly `expected`?
pub fn verify(source: &LevelSource, codes: &str, expected: &Snapshot) -> Result<bool, ReplayError> {
    Ok(replay(source, codes)?.snapshot() == *expected)
}

// ══════════════════════════════════════════════════════════════
// Save data
// ══════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveData {
    pub level: usize,
    pub log: String,
}

impl SaveData {
    pub fn of(level: usize, session: &GameSession) -> Self {
        SaveData { level, log: session.codes() }
    }
}

fn serialize(data: &SaveData) -> String {
    format!("level={}\nlog={}\n", data.level, data.log)
}

fn parse_save(content: &str) -> Result<SaveData, ReplayError> {
    let mut level = None;
    let mut log = None;

    for line in content.lines() {
        let line = line.trim();
        if let Some(val) = line.strip_prefix("level=") {
            let n = val.trim().parse().map_err(|_| ReplayError::MalformedSave(format!("bad level {val:?}")))?;
            level = Some(n);
        } else if let Some(val) = line.strip_prefix("log=") {
            log = Some(val.trim().to_string());
        }
    }

    match (level, log) {
        (Some(level), log) => Ok(SaveData { level, log: log.unwrap_or_default() }),
        (None, _) => Err(ReplayError::MalformedSave("missing level".into())),
    }
}

// ══════════════════════════════════════════════════════════════
// Paths
// ══════════════════════════════════════════════════════════════

fn save_dir() -> PathBuf {
    // 1. Exe directory, if writable (portable installs)
    if let Ok(exe) = std::env::current_exe() {
        let resolved = exe.canonicalize().unwrap_or(exe);
        if let Some(parent) = resolved.parent() {
            let test_path = parent.join(".write_test_divergence");
            if std::fs::write(&test_path, "").is_ok() {
                let _ = std::fs::remove_file(&test_path);
                return parent.to_path_buf();
            }
        }
    }

    // 2. XDG data home for system installs
    if let Ok(home) = std::env::var("HOME") {
        let xdg = PathBuf::from(&home).join(".local/share/divergence");
        if std::fs::create_dir_all(&xdg).is_ok() {
            return xdg;
        }
    }

    // 3. Fallback to CWD
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn slot_path(slot: u8) -> PathBuf {
    save_dir().join(format!("save_{}.dat", slot))
}

// ══════════════════════════════════════════════════════════════
// Slot operations (F5-F12)
// ══════════════════════════════════════════════════════════════

pub fn save_to(path: &Path, data: &SaveData) -> Result<(), ReplayError> {
    std::fs::write(path, serialize(data))
        .map_err(|source| ReplayError::Io { path: path.to_path_buf(), source })
}

pub fn load_from(path: &Path) -> Result<SaveData, ReplayError> {
    let content = std::fs::read_to_string(path)
        .map_err(|source| ReplayError::Io { path: path.to_path_buf(), source })?;
    parse_save(&content)
}

/// Save to a numbered slot (1-4).
pub fn save_slot(slot: u8, data: &SaveData) -> Result<(), ReplayError> {
    let path = slot_path(slot);
    save_to(&path, data)?;
    info!(slot, level = data.level, steps = data.log.len(), "saved");
    Ok(())
}

/// Load from a numbered slot (1-4). Missing or unreadable slots are `None`.
pub fn load_slot(slot: u8) -> Option<SaveData> {
    let path = slot_path(slot);
    if !path.exists() {
        return None;
    }
    match load_from(&path) {
        Ok(data) => Some(data),
        Err(e) => {
            warn!(slot, error = %e, "save slot unreadable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::terrain::Pos;
    use crate::sim::level::{embedded_levels, Level};

    fn level(name: &str) -> Level {
        embedded_levels().into_iter().find(|l| l.name == name).unwrap()
    }

    // ── recorded solutions ──

    #[test]
    fn heavy_lifting_solution() {
        let s = replay(&level("Heavy Lifting").source, "RUURD").unwrap();
        assert!(s.victory());
    }

    #[test]
    fn mind_the_gap_solution() {
        let s = replay(&level("Mind the Gap").source, "RRRR").unwrap();
        assert!(s.victory());
        assert!(s.main().entities[1].is_buried());
    }

    #[test]
    fn two_places_at_once_solution() {
        let src = level("Two Places at Once").source;
        let s = replay(&src, "VXUULLLUXTXUURRRUXC").unwrap();
        assert!(!s.is_branched());
        let cells: Vec<_> = s.main().instances(1).map(|e| e.pos).collect();
        assert_eq!(cells, vec![Pos::new(5, 1), Pos::new(1, 1)]);
        assert!(!s.victory());

        let s = replay(&src, "VXUULLLUXTXUURRRUXCDDLLD").unwrap();
        assert!(s.victory());
    }

    #[test]
    fn replay_is_deterministic() {
        let src = level("Two Places at Once").source;
        let codes = "VXUULLLUXTXUURRRUXCDDL";
        let a = replay(&src, codes).unwrap();
        let b = replay(&src, codes).unwrap();
        assert_eq!(a.snapshot(), b.snapshot());
        assert!(verify(&src, codes, &a.snapshot()).unwrap());
        assert!(!verify(&src, "VXUULLLUXTXUURRRUXCDD", &a.snapshot()).unwrap());
    }

    #[test]
    fn session_log_replays_to_same_state() {
        let src = level("Two Places at Once").source;
        let mut s = GameSession::new(src.clone()).unwrap();
        for c in "VXUUQLLUXZ".chars() {
            if let Some(i) = Intent::from_code(c) {
                s.apply(i);
            }
        }
        // Unknown keys never reach the log; undo takes the drop back out.
        assert_eq!(s.codes(), "VXUULLU");
        assert!(verify(&src, &s.codes(), &s.snapshot()).unwrap());
    }

    // ── failures ──

    #[test]
    fn unknown_code_is_reported() {
        let err = replay(&level("Heavy Lifting").source, "RQ").unwrap_err();
        assert!(matches!(err, ReplayError::UnknownCode('Q')));
    }

    #[test]
    fn rejected_step_is_reported() {
        let err = replay(&level("Heavy Lifting").source, "LL").unwrap_err();
        assert!(matches!(
            err,
            ReplayError::Rejected { step: 1, intent: Intent::Move(crate::domain::terrain::Dir::Left) }
        ));
    }

    // ── save data ──

    #[test]
    fn save_text_round_trip() {
        let data = SaveData { level: 3, log: "VXT".into() };
        assert_eq!(parse_save(&serialize(&data)).unwrap(), data);
    }

    #[test]
    fn save_without_log_is_level_start() {
        assert_eq!(parse_save("level=1\n").unwrap(), SaveData { level: 1, log: String::new() });
        assert!(matches!(parse_save("log=RR\n"), Err(ReplayError::MalformedSave(_))));
        assert!(matches!(parse_save("level=x\n"), Err(ReplayError::MalformedSave(_))));
    }

    #[test]
    fn save_file_round_trip() {
        let path = std::env::temp_dir().join(format!("divergence_save_test_{}.dat", std::process::id()));
        let data = SaveData { level: 0, log: "RUURD".into() };
        save_to(&path, &data).unwrap();
        assert_eq!(load_from(&path).unwrap(), data);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(load_from(&path), Err(ReplayError::Io { .. })));
    }
}
