/// Level loader: dual-layer text maps and TOML level packs.
///
/// ## Sources (priority order):
///   1. `*.toml` packs in `levels_dir`, sorted by file name
///   2. Built-in embedded levels
///
/// ## Pack format (`.toml`):
///   ```toml
///   [[level]]
///   name = "Two Places at Once"
///   floor = """
///   #####
///   #.G.#
///   #####
///   """
///   objects = """
///   .....
///   .P...
///   .....
///   """
///   [level.hints]
///   initial = "Stand on the branch point and press V."
///   ```
///
/// Each level is two layers of equal height: the floor layer fixes the
/// terrain, the object layer places the player and the boxes.
///
/// ## Floor legend:
///   '.' = Floor         '#' / ' ' = Wall      'S' = Switch
///   'w' = Weight limit 1  'W' = Weight limit 2  'N' = No-carry floor
///   'v' / 'V' / 'x' / 'X' = Branch point with 1 / 2 / 3 / 4 uses
///   'G' = Goal          'H' = Hole
///
/// ## Object legend:
///   '.' / ' ' = Empty   'P' = Player   'B' = Box (ids 1.. in reading order)

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::GameConfig;
use crate::domain::branch::LevelSource;
use crate::domain::entity::{EntityId, EntityKind, PLAYER_ID};
use crate::domain::terrain::{Pos, Terrain, TerrainMap};
use crate::error::LevelError;

/// Message lines shown at the different stages of a level.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LevelHints {
    pub initial: String,
    pub branched: String,
    pub goal_active: String,
    pub victory: String,
}

/// One level as written in a pack.
#[derive(Clone, Debug, Deserialize)]
pub struct LevelDef {
    pub name: String,
    pub floor: String,
    pub objects: String,
    #[serde(default)]
    pub hints: LevelHints,
}

/// A level ready to play.
#[derive(Clone, Debug)]
pub struct Level {
    pub name: String,
    pub source: LevelSource,
    pub hints: LevelHints,
}

#[derive(Deserialize)]
struct PackFile {
    #[serde(default, rename = "level")]
    levels: Vec<LevelDef>,
}

impl LevelDef {
    pub fn build(&self) -> Result<Level, LevelError> {
        Ok(Level {
            name: self.name.clone(),
            source: parse_dual_layer(&self.floor, &self.objects)?,
            hints: self.hints.clone(),
        })
    }
}

// ══════════════════════════════════════════════════════════════
// Dual-layer parsing
// ══════════════════════════════════════════════════════════════

fn map_lines(text: &str) -> Vec<&str> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::trim_end)
        .collect()
}

/// Parse a floor layer and an object layer into a level description.
/// Grid size is the larger of row count and longest row; cells not drawn
/// stay Floor.
pub fn parse_dual_layer(floor: &str, objects: &str) -> Result<LevelSource, LevelError> {
    let floor_lines = map_lines(floor);
    let object_lines = map_lines(objects);

    if floor_lines.is_empty() {
        return Err(LevelError::EmptyMap);
    }
    if floor_lines.len() != object_lines.len() {
        return Err(LevelError::LayerHeightMismatch {
            floor: floor_lines.len(),
            objects: object_lines.len(),
        });
    }

    let widest = floor_lines.iter()
        .chain(object_lines.iter())
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0);
    let grid_size = floor_lines.len().max(widest);

    let mut terrain = TerrainMap::new(grid_size);
    for (y, line) in floor_lines.iter().enumerate() {
        for (x, ch) in line.chars().enumerate() {
            let t = Terrain::from_symbol(ch)
                .ok_or(LevelError::UnknownFloorSymbol { ch, x, y })?;
            terrain.set(Pos::new(x as i32, y as i32), t);
        }
    }

    let mut entities = BTreeMap::new();
    let mut next_id: EntityId = 1;
    for (y, line) in object_lines.iter().enumerate() {
        for (x, ch) in line.chars().enumerate() {
            let pos = Pos::new(x as i32, y as i32);
            match ch {
                '.' | ' ' => {}
                'P' => {
                    if entities.contains_key(&PLAYER_ID) {
                        return Err(LevelError::DuplicatePlayer { x, y });
                    }
                    entities.insert(PLAYER_ID, (EntityKind::Player, pos));
                }
                'B' => {
                    entities.insert(next_id, (EntityKind::Box, pos));
                    next_id += 1;
                }
                _ => return Err(LevelError::UnknownObjectSymbol { ch, x, y }),
            }
        }
    }

    if !entities.contains_key(&PLAYER_ID) {
        return Err(LevelError::MissingPlayer);
    }
    if !terrain.contains(Terrain::Goal) {
        return Err(LevelError::MissingGoal);
    }

    Ok(LevelSource { grid_size, terrain, entities, next_id })
}

// ══════════════════════════════════════════════════════════════
// Packs
// ══════════════════════════════════════════════════════════════

/// Parse the level tables of one pack file.
pub fn parse_pack(content: &str, path: &Path) -> Result<Vec<LevelDef>, LevelError> {
    toml::from_str::<PackFile>(content)
        .map(|p| p.levels)
        .map_err(|source| LevelError::Pack { path: path.to_path_buf(), source })
}

pub fn load_pack_file(path: &Path) -> Result<Vec<LevelDef>, LevelError> {
    let content = std::fs::read_to_string(path)
        .map_err(|source| LevelError::Io { path: path.to_path_buf(), source })?;
    parse_pack(&content, path)
}

/// Levels from every pack in `dir`. Broken packs and broken levels are
/// logged and skipped.
pub fn load_from_directory(dir: &Path) -> Vec<Level> {
    let mut paths: Vec<_> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().map_or(false, |e| e == "toml"))
            .collect(),
        Err(_) => return vec![],
    };
    paths.sort();

    let mut levels = vec![];
    for path in paths {
        let defs = match load_pack_file(&path) {
            Ok(defs) => defs,
            Err(e) => {
                warn!(error = %e, "skipping level pack");
                continue;
            }
        };
        for def in defs {
            match def.build() {
                Ok(level) => levels.push(level),
                Err(e) => warn!(pack = %path.display(), level = %def.name, error = %e, "skipping level"),
            }
        }
    }
    levels
}

/// The playable level list: packs from `levels_dir` if it has any valid
/// level, else the built-in set.
pub fn load_levels(config: &GameConfig) -> Vec<Level> {
    if config.levels_dir.is_dir() {
        let levels = load_from_directory(&config.levels_dir);
        if !levels.is_empty() {
            info!(dir = %config.levels_dir.display(), count = levels.len(), "loaded level packs");
            return levels;
        }
    }
    embedded_levels()
}

// ══════════════════════════════════════════════════════════════
// Embedded levels
// ══════════════════════════════════════════════════════════════

const EMBEDDED_PACK: &str = r##"
[[level]]
name = "Heavy Lifting"
floor = """
#####
#.S.#
#...#
#..G#
#####
"""
objects = """
.....
.....
..B..
.P...
.....
"""
[level.hints]
initial = "Push the box onto the switch, then reach the goal."
goal_active = "The goal is open."
victory = "Cleared!"

[[level]]
name = "Mind the Gap"
floor = """
######
#....#
#..HG#
#....#
#....#
######
"""
objects = """
......
......
.PB...
......
......
......
"""
[level.hints]
initial = "Open holes swallow you. Fill one with a box first."
victory = "Cleared!"

[[level]]
name = "Two Places at Once"
floor = """
#######
#S...S#
#.....#
#..V..#
#.....#
#..G..#
#######
"""
objects = """
.......
.......
.......
...P...
...B...
.......
.......
"""
[level.hints]
initial = "One box, two switches. Stand on the branch point and press V."
branched = "Tab switches timeline. C merges them back."
goal_active = "Both timelines agree. Head for the goal."
victory = "Cleared!"

[[level]]
name = "Keep What You Carry"
floor = """
#######
#.....#
#.x.N.#
#.....#
#..S..#
#.HHG.#
#######
"""
objects = """
.......
.....B.
..P....
.......
.......
.......
.......
"""
[level.hints]
initial = "Nothing can be picked up while standing on N."
branched = "I merges and keeps what the other timeline is holding."
victory = "Cleared!"

[[level]]
name = "Fork"
floor = """
#.V.S#
#H.#.#
#H##H#
#HG#H#
###.H#
#..V.#
"""
objects = """
.B....
......
......
......
......
.BP.B.
"""
[level.hints]
initial = "Two branch points, three boxes, six holes."
branched = "Boxes moved in one timeline stay where the other left them."
goal_active = "The goal is open."
victory = "Cleared!"
"##;

pub fn embedded_levels() -> Vec<Level> {
    let defs = match parse_pack(EMBEDDED_PACK, Path::new("<embedded>")) {
        Ok(defs) => defs,
        Err(e) => {
            warn!(error = %e, "embedded level pack unreadable");
            return vec![];
        }
    };
    defs.iter()
        .filter_map(|d| match d.build() {
            Ok(level) => Some(level),
            Err(e) => {
                warn!(level = %d.name, error = %e, "embedded level invalid");
                None
            }
        })
        .collect()
}
