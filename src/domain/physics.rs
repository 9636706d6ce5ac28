/// Physics layer: single source of truth for occupancy, weight and support.
///
/// ## Collision model
///
/// Collision at a cell is a signed sum:
///
///   terrain base + Σ collision of non-buried entities at the cell
///
/// ┌──────────────────────────┬──────────────┐
/// │ Terrain                  │ Base         │
/// ├──────────────────────────┼──────────────┤
/// │ Wall / out of bounds     │ +255         │
/// │ Hole, nothing buried     │ −1           │
/// │ Hole, filled             │ 0            │
/// │ Anything else            │ 0            │
/// └──────────────────────────┴──────────────┘
///
/// One number answers both "can something enter here" (≤ 0) and "is the
/// player supported here" (≥ own collision volume).
///
/// ## Settlement
///
/// `settle` runs after every mutating action:
///   1. Bury grounded boxes standing on unfilled holes, repeating until a
///      full pass changes nothing.
///   2. Fall check: collision under the player < player's own volume.

use tracing::trace;

use super::branch::BranchState;
use super::entity::Layer;
use super::terrain::{Pos, Terrain};

/// Terrain base for walls and cells off the grid. Never enterable.
pub const WALL_SENTINEL: i32 = 255;

/// How many distinct items the player may carry on ordinary floor.
pub const CARRY_CAPACITY: usize = 1;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PhysicsResult {
    Ok,
    /// The ground under the player no longer supports them.
    Fall,
}

// ══════════════════════════════════════════════════════════════
// Cell queries
// ══════════════════════════════════════════════════════════════

/// Is there a buried entity at `pos`?
pub fn is_hole_filled(pos: Pos, state: &BranchState) -> bool {
    state.entities.iter().any(|e| e.pos == pos && e.layer == Layer::Buried)
}

fn terrain_base(pos: Pos, state: &BranchState) -> i32 {
    if !state.in_bounds(pos) {
        return WALL_SENTINEL;
    }
    match state.terrain_at(pos) {
        Terrain::Wall => WALL_SENTINEL,
        Terrain::Hole if is_hole_filled(pos, state) => 0,
        Terrain::Hole => -1,
        _ => 0,
    }
}

/// Net occupancy at `pos`. See the table in the module docs.
pub fn collision_at(pos: Pos, state: &BranchState) -> i32 {
    let stacked: i32 = state
        .entities
        .iter()
        .filter(|e| e.pos == pos && e.layer != Layer::Buried)
        .map(|e| e.collision)
        .sum();
    terrain_base(pos, state) + stacked
}

/// Total weight at `pos`, every layer included.
pub fn weight_at(pos: Pos, state: &BranchState) -> i32 {
    state.entities.iter().filter(|e| e.pos == pos).map(|e| e.weight).sum()
}

/// How many items may be held while standing at `pos`: 0 on NoCarry, else 1.
pub fn effective_capacity(state: &BranchState, pos: Pos) -> usize {
    match state.terrain_at(pos) {
        Terrain::NoCarry => 0,
        _ => CARRY_CAPACITY,
    }
}

/// Every Switch cell carries some weight. Vacuously true with no switches.
pub fn all_switches_activated(state: &BranchState) -> bool {
    state
        .terrain
        .iter()
        .filter(|(_, t)| *t == Terrain::Switch)
        .all(|(p, _)| weight_at(p, state) > 0)
}

/// Can something be placed at or pushed into `pos`? In bounds, not a wall,
/// nothing solid on it. Open holes qualify.
pub fn is_enterable(pos: Pos, state: &BranchState) -> bool {
    state.in_bounds(pos)
        && !state.terrain_at(pos).is_wall()
        && collision_at(pos, state) <= 0
}

// ══════════════════════════════════════════════════════════════
// Hole filling
// ══════════════════════════════════════════════════════════════

/// Bury entity `idx` if `pos` is an unfilled hole. No-op anywhere else.
/// Returns whether the hole was filled.
pub fn trigger_fill(state: &mut BranchState, idx: usize, pos: Pos) -> bool {
    if state.terrain_at(pos) != Terrain::Hole || is_hole_filled(pos, state) {
        return false;
    }
    let e = &mut state.entities[idx];
    e.layer = Layer::Buried;
    e.holder = None;
    trace!(id = e.id, %pos, "hole filled");
    true
}

/// Bury grounded boxes on unfilled holes until stable.
/// Returns the cells filled, in fill order.
pub fn fill_holes(state: &mut BranchState) -> Vec<Pos> {
    let mut filled = vec![];
    loop {
        let mut changed = false;
        for idx in 0..state.entities.len() {
            let e = &state.entities[idx];
            if !(e.is_box() && e.is_grounded()) {
                continue;
            }
            let pos = e.pos;
            if trigger_fill(state, idx, pos) {
                filled.push(pos);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    filled
}

/// Can the ground under the player still carry them?
pub fn check_fall(state: &BranchState) -> bool {
    let p = state.player();
    collision_at(p.pos, state) < p.collision
}

/// Post-action stabilization: fill holes, then evaluate the fall condition.
pub fn settle(state: &mut BranchState) -> PhysicsResult {
    fill_holes(state);
    if check_fall(state) {
        PhysicsResult::Fall
    } else {
        PhysicsResult::Ok
    }
}

// ══════════════════════════════════════════════════════════════
// Unit tests
// ══════════════════════════════════════════════════════════════
