//! Load-time errors. Gameplay itself never errors: illegal actions are
//! plain rejections with no state change.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::entity::Intent;

/// A level description that cannot become a valid branch.
#[derive(Debug, Error)]
pub enum LevelError {
    #[error("level map is empty")]
    EmptyMap,

    #[error("floor and object layers differ in height ({floor} vs {objects} rows)")]
    LayerHeightMismatch { floor: usize, objects: usize },

    #[error("unknown floor symbol {ch:?} at ({x},{y})")]
    UnknownFloorSymbol { ch: char, x: usize, y: usize },

    #[error("unknown object symbol {ch:?} at ({x},{y})")]
    UnknownObjectSymbol { ch: char, x: usize, y: usize },

    #[error("player start position (P) not found")]
    MissingPlayer,

    #[error("second player start at ({x},{y})")]
    DuplicatePlayer { x: usize, y: usize },

    #[error("player start lies outside the grid")]
    PlayerOutOfBounds,

    #[error("entity table does not list the player first")]
    PlayerNotFirst,

    #[error("goal (G) not found")]
    MissingGoal,

    #[error("level pack {path}: {source}")]
    Pack {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to rebuild a session from a recorded input log.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("unknown intent code {0:?}")]
    UnknownCode(char),

    #[error("step {step}: {intent:?} was rejected")]
    Rejected { step: usize, intent: Intent },

    #[error(transparent)]
    Level(#[from] LevelError),

    #[error("malformed save data: {0}")]
    MalformedSave(String),

    #[error("save file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
