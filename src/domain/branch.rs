/// BranchState: one complete copy of the world.
///
/// ## Ownership
///
/// A branch owns its terrain and its entity list outright. `Clone` is a deep
/// copy, and cloning is the only way a second branch (or an undo snapshot)
/// comes into existence, so two branches never alias entity storage.
///
/// ## Entity order
///
/// `entities[0]` is always the player. Everything that looks up "the
/// player" relies on that index; `init_branch` refuses to build a branch
/// that would violate it.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::LevelError;

use super::entity::{Entity, EntityId, EntityKind, PLAYER_ID};
use super::terrain::{Pos, Terrain, TerrainMap};

/// Immutable level description produced by the map parser.
#[derive(Clone, Debug)]
pub struct LevelSource {
    pub grid_size: usize,
    pub terrain: TerrainMap,
    /// Initial placement keyed by id. Id 0 is the player.
    pub entities: BTreeMap<EntityId, (EntityKind, Pos)>,
    pub next_id: EntityId,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BranchState {
    pub terrain: TerrainMap,
    pub grid_size: usize,
    pub entities: Vec<Entity>,
}

/// Build the initial branch from a level. The only ingestion point of the core.
pub fn init_branch(source: &LevelSource) -> Result<BranchState, LevelError> {
    let mut ids = source.entities.keys();
    match ids.next() {
        Some(&PLAYER_ID) => {}
        Some(_) => return Err(LevelError::PlayerNotFirst),
        None => return Err(LevelError::MissingPlayer),
    }
    let (kind, player_pos) = source.entities[&PLAYER_ID];
    if kind != EntityKind::Player {
        return Err(LevelError::PlayerNotFirst);
    }
    if !source.terrain.in_bounds(player_pos) {
        return Err(LevelError::PlayerOutOfBounds);
    }
    if !source.terrain.contains(Terrain::Goal) {
        return Err(LevelError::MissingGoal);
    }

    // BTreeMap iterates ascending, so the player lands at index 0.
    let entities = source
        .entities
        .iter()
        .map(|(&id, &(kind, pos))| match kind {
            EntityKind::Player => Entity::player(pos),
            EntityKind::Box => Entity::crate_box(id, pos),
        })
        .collect();

    Ok(BranchState {
        terrain: source.terrain.clone(),
        grid_size: source.grid_size,
        entities,
    })
}

// ── Queries ──

impl BranchState {
    #[inline]
    pub fn player(&self) -> &Entity {
        &self.entities[0]
    }

    #[inline]
    pub fn player_mut(&mut self) -> &mut Entity {
        &mut self.entities[0]
    }

    /// The cell the player is facing.
    pub fn front(&self) -> Pos {
        let p = self.player();
        p.pos.step(p.facing)
    }

    #[inline]
    pub fn in_bounds(&self, pos: Pos) -> bool {
        self.terrain.in_bounds(pos)
    }

    #[inline]
    pub fn terrain_at(&self, pos: Pos) -> Terrain {
        self.terrain.get(pos)
    }

    /// Every live instance of `id`.
    pub fn instances(&self, id: EntityId) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(move |e| e.id == id)
    }

    /// More than one live position for the same id.
    pub fn is_shadow(&self, id: EntityId) -> bool {
        let mut positions = self.instances(id).map(|e| e.pos);
        match positions.next() {
            Some(first) => positions.any(|p| p != first),
            None => false,
        }
    }

    /// Ids currently carried by the player, ascending.
    pub fn held_ids(&self) -> BTreeSet<EntityId> {
        self.entities.iter().filter(|e| e.is_held()).map(|e| e.id).collect()
    }

    pub fn is_holding(&self) -> bool {
        self.entities.iter().any(|e| e.is_held())
    }

    /// First grounded box at `pos` (shadow instances included).
    pub fn find_box_at(&self, pos: Pos) -> Option<&Entity> {
        self.entities.iter().find(|e| e.is_box() && e.is_grounded() && e.pos == pos)
    }

    pub fn has_box_at(&self, pos: Pos) -> bool {
        self.find_box_at(pos).is_some()
    }

    /// Ids that currently have more than one live position.
    pub fn shadow_ids(&self) -> BTreeSet<EntityId> {
        self.entities
            .iter()
            .filter(|e| !e.is_player())
            .map(|e| e.id)
            .filter(|&id| self.is_shadow(id))
            .collect()
    }
}
