/// Move and action rules, truth-table driven.
///
/// `can_*` functions are pure; `execute_*` / `try_*` mutate exactly one
/// branch and never look at the other.
///
/// ## Move Truth Table
///
/// target = player.pos + dir, beyond = target + dir
/// ┌────────────────────────────────────┬─────────┐
/// │ Condition                          │ Allow?  │
/// ├────────────────────────────────────┼─────────┤
/// │ target out of bounds / Wall        │ DENY    │
/// │ collision(target) < 0 (open hole)  │ DENY    │
/// │ collision(target) ≥ wall sentinel  │ DENY    │
/// │ collision(target) = 0              │ ALLOW   │
/// │ > 0, any occupant in shadow        │ DENY    │
/// │ > 0, beyond not enterable          │ DENY    │
/// │ > 0, otherwise                     │ PUSH    │
/// └────────────────────────────────────┴─────────┘
///
/// ## Pickup / Drop
/// ┌────────────────────────────────────┬─────────┐
/// │ Pickup: standing on NoCarry        │ DENY    │
/// │ Pickup: already at capacity        │ DENY    │
/// │ Pickup: no grounded box in front   │ DENY    │
/// │ Drop:   nothing held               │ DENY    │
/// │ Drop:   front not enterable        │ DENY    │
/// └────────────────────────────────────┴─────────┘
///
/// ## Two-step turning
///
/// While holding something, or when a grounded box sits in the target cell,
/// a direction that differs from the current facing only turns the player.
/// In open terrain one input turns and moves.

use tracing::trace;

use super::branch::BranchState;
use super::entity::EntityId;
use super::physics::{self, WALL_SENTINEL};
use super::terrain::{Dir, Pos};
use super::timeline;

/// Why a move was refused. Surfaced in logs only.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MoveBlock {
    Edge,
    Wall,
    OpenHole,
    Shadow,
    PushBlocked,
}

/// Result of a successful move.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct MoveReport {
    /// Ids pushed one cell ahead.
    pub pushed: Vec<EntityId>,
    /// Cells filled by a pushed box this same action.
    pub filled: Vec<Pos>,
}

// ── Movement ──

/// Check a move without performing it. See truth table above.
pub fn check_move(state: &BranchState, dir: Dir) -> Result<(), MoveBlock> {
    let target = state.player().pos.step(dir);
    if !state.in_bounds(target) {
        return Err(MoveBlock::Edge);
    }
    if state.terrain_at(target).is_wall() {
        return Err(MoveBlock::Wall);
    }

    let collision = physics::collision_at(target, state);
    if collision < 0 {
        return Err(MoveBlock::OpenHole);
    }
    if collision >= WALL_SENTINEL {
        return Err(MoveBlock::Wall);
    }
    if collision == 0 {
        return Ok(());
    }

    // Something solid is in the way: a push is required.
    let shadowed = state
        .entities
        .iter()
        .filter(|e| e.pos == target && e.is_grounded() && e.collision > 0)
        .any(|e| state.is_shadow(e.id));
    if shadowed {
        return Err(MoveBlock::Shadow);
    }
    if !physics::is_enterable(target.step(dir), state) {
        return Err(MoveBlock::PushBlocked);
    }
    Ok(())
}

pub fn can_move(state: &BranchState, dir: Dir) -> bool {
    check_move(state, dir).is_ok()
}

/// Perform a move already validated by `can_move`.
/// Pushes occupants, buries any that land in a hole, carries held items along.
pub fn execute_move(state: &mut BranchState, dir: Dir) -> MoveReport {
    let mut report = MoveReport::default();
    let target = state.player().pos.step(dir);
    let beyond = target.step(dir);

    let pushed: Vec<usize> = state
        .entities
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.is_player() && e.pos == target && e.is_grounded() && e.collision > 0)
        .map(|(i, _)| i)
        .collect();
    for idx in pushed {
        state.entities[idx].pos = beyond;
        report.pushed.push(state.entities[idx].id);
        if physics::trigger_fill(state, idx, beyond) {
            report.filled.push(beyond);
        }
    }

    let player = state.player_mut();
    player.pos = target;
    player.facing = dir;

    for e in state.entities.iter_mut().filter(|e| e.is_held()) {
        e.pos = target;
    }

    trace!(%target, pushed = report.pushed.len(), "player moved");
    report
}

/// Does this directional input only turn the player this tick?
pub fn turn_only(state: &BranchState, dir: Dir) -> bool {
    let p = state.player();
    if p.facing == dir {
        return false;
    }
    state.is_holding() || state.has_box_at(p.pos.step(dir))
}

// ── Pickup / Drop ──

/// Pick up the grounded box in front. A shadowed box is first collapsed onto
/// the faced cell. Returns the id picked up.
pub fn try_pickup(state: &mut BranchState) -> Option<EntityId> {
    let here = state.player().pos;
    let capacity = physics::effective_capacity(state, here);
    if state.held_ids().len() >= capacity {
        return None;
    }

    let front = state.front();
    let id = state.find_box_at(front)?.id;
    let item = timeline::converge_one(state, id, Some(front))?;
    item.grab(here);
    Some(id)
}

/// Put every held item down in front of the player. Returns the ids dropped.
pub fn try_drop(state: &mut BranchState) -> Option<Vec<EntityId>> {
    if !state.is_holding() {
        return None;
    }
    let front = state.front();
    if !state.in_bounds(front)
        || state.terrain_at(front).is_wall()
        || physics::collision_at(front, state) > 0
    {
        return None;
    }

    let held: Vec<usize> = state
        .entities
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_held())
        .map(|(i, _)| i)
        .collect();
    let mut dropped = Vec::with_capacity(held.len());
    for idx in held {
        state.entities[idx].release(front);
        dropped.push(state.entities[idx].id);
        physics::trigger_fill(state, idx, front);
    }
    Some(dropped)
}

// ══════════════════════════════════════════════════════════════
// Unit tests
// ══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::branch::tests::branch_from;
    use crate::domain::entity::{Entity, Layer};
    use crate::domain::physics::{collision_at, settle, PhysicsResult};

    // ── can_move ──

    #[test]
    fn move_into_open_floor() {
        let b = branch_from(&["...", "...", "..G"], (1, 1), &[]);
        for d in Dir::ALL {
            assert!(can_move(&b, d), "{d:?}");
        }
    }

    #[test]
    fn move_denied_at_edge_and_wall() {
        let b = branch_from(&[".#.", "...", "..G"], (0, 0), &[]);
        assert_eq!(check_move(&b, Dir::Up), Err(MoveBlock::Edge));
        assert_eq!(check_move(&b, Dir::Left), Err(MoveBlock::Edge));
        assert_eq!(check_move(&b, Dir::Right), Err(MoveBlock::Wall));
    }

    #[test]
    fn move_denied_into_open_hole() {
        let b = branch_from(&[".H.", "...", "..G"], (0, 0), &[]);
        assert_eq!(check_move(&b, Dir::Right), Err(MoveBlock::OpenHole));
    }

    #[test]
    fn move_onto_filled_hole() {
        let mut b = branch_from(&[".H.", "...", "..G"], (0, 0), &[(1, 1, 0)]);
        b.entities[1].layer = Layer::Buried;
        assert!(can_move(&b, Dir::Right));
    }

    #[test]
    fn push_needs_room_beyond() {
        let b = branch_from(&["...", "...", "..G"], (0, 0), &[(1, 1, 0)]);
        assert!(can_move(&b, Dir::Right));

        let walled = branch_from(&["..#", "...", "..G"], (0, 0), &[(1, 1, 0)]);
        assert_eq!(check_move(&walled, Dir::Right), Err(MoveBlock::PushBlocked));

        let edge = branch_from(&["...", "...", "..G"], (1, 0), &[(1, 2, 0)]);
        assert_eq!(check_move(&edge, Dir::Right), Err(MoveBlock::PushBlocked));

        let stacked = branch_from(&["....", "....", "....", "...G"], (0, 0), &[(1, 1, 0), (2, 2, 0)]);
        assert_eq!(check_move(&stacked, Dir::Right), Err(MoveBlock::PushBlocked));
    }

    #[test]
    fn shadow_cannot_be_pushed() {
        let mut b = branch_from(&["....", "....", "....", "...G"], (0, 0), &[(1, 1, 0)]);
        b.entities.push(Entity::crate_box(1, Pos::new(3, 3)));
        assert_eq!(check_move(&b, Dir::Right), Err(MoveBlock::Shadow));
    }

    // ── execute_move ──

    #[test]
    fn move_updates_position_and_facing() {
        let mut b = branch_from(&["...", "...", "..G"], (1, 1), &[]);
        execute_move(&mut b, Dir::Left);
        assert_eq!(b.player().pos, Pos::new(0, 1));
        assert_eq!(b.player().facing, Dir::Left);
    }

    #[test]
    fn push_moves_box_ahead() {
        let mut b = branch_from(&["...", "...", "..G"], (0, 0), &[(1, 1, 0)]);
        let report = execute_move(&mut b, Dir::Right);
        assert_eq!(report.pushed, vec![1]);
        assert_eq!(b.entities[1].pos, Pos::new(2, 0));
        assert_eq!(b.player().pos, Pos::new(1, 0));
    }

    #[test]
    fn push_into_hole_fills_it_same_action() {
        let mut b = branch_from(&["..H", "...", "..G"], (0, 0), &[(1, 1, 0)]);
        assert!(can_move(&b, Dir::Right));
        let report = execute_move(&mut b, Dir::Right);
        assert_eq!(report.filled, vec![Pos::new(2, 0)]);
        assert!(b.entities[1].is_buried());
        assert_eq!(collision_at(Pos::new(2, 0), &b), 0);
        // The player can now walk onto the filled hole.
        assert!(can_move(&b, Dir::Right));
        execute_move(&mut b, Dir::Right);
        assert_eq!(settle(&mut b), PhysicsResult::Ok);
    }

    #[test]
    fn held_items_follow_player() {
        let mut b = branch_from(&["...", "...", "..G"], (0, 0), &[(1, 0, 1)]);
        b.entities[1].grab(Pos::new(0, 0));
        execute_move(&mut b, Dir::Right);
        assert_eq!(b.entities[1].pos, Pos::new(1, 0));
        assert!(b.entities[1].is_held());
    }

    // ── two-step turning ──

    #[test]
    fn turn_only_when_facing_box_or_holding() {
        let mut b = branch_from(&["...", "...", "..G"], (1, 1), &[(1, 2, 1)]);
        b.player_mut().facing = Dir::Up;
        assert!(turn_only(&b, Dir::Right), "box ahead, not yet facing it");
        assert!(!turn_only(&b, Dir::Left), "open terrain");
        b.player_mut().facing = Dir::Right;
        assert!(!turn_only(&b, Dir::Right), "already facing");

        b.entities[1].grab(Pos::new(1, 1));
        b.player_mut().facing = Dir::Up;
        assert!(turn_only(&b, Dir::Left), "holding");
    }

    // ── pickup ──

    #[test]
    fn pickup_front_box() {
        let mut b = branch_from(&["...", "...", "..G"], (1, 0), &[(1, 1, 1)]);
        assert_eq!(try_pickup(&mut b), Some(1));
        let held = &b.entities[1];
        assert!(held.is_held());
        assert_eq!(held.pos, Pos::new(1, 0));
        assert_eq!(held.collision, 0);
    }

    #[test]
    fn pickup_nothing_fails() {
        let mut b = branch_from(&["...", "...", "..G"], (1, 0), &[]);
        let before = b.clone();
        assert_eq!(try_pickup(&mut b), None);
        assert_eq!(b, before);
    }

    #[test]
    fn pickup_denied_on_no_carry() {
        let mut b = branch_from(&[".N.", "...", "..G"], (1, 0), &[(1, 1, 1)]);
        assert_eq!(try_pickup(&mut b), None);
    }

    #[test]
    fn pickup_denied_at_capacity() {
        let mut b = branch_from(&["...", "...", "..G"], (1, 0), &[(1, 1, 1), (2, 0, 0)]);
        b.entities[2].grab(Pos::new(1, 0));
        assert_eq!(try_pickup(&mut b), None);
    }

    #[test]
    fn pickup_collapses_shadow_onto_front() {
        let mut b = branch_from(&["...", "...", "..G"], (1, 0), &[(1, 1, 1)]);
        b.entities.push(Entity::crate_box(1, Pos::new(0, 2)));
        assert_eq!(try_pickup(&mut b), Some(1));
        assert_eq!(b.instances(1).count(), 1);
        assert!(b.instances(1).all(|e| e.is_held()));
    }

    #[test]
    fn buried_box_is_not_pickable() {
        let mut b = branch_from(&[".H.", "...", "..G"], (0, 0), &[(1, 1, 0)]);
        b.player_mut().facing = Dir::Right;
        b.entities[1].layer = Layer::Buried;
        assert_eq!(try_pickup(&mut b), None);
    }

    // ── drop ──

    #[test]
    fn drop_in_front() {
        let mut b = branch_from(&["...", "...", "..G"], (1, 0), &[(1, 0, 0)]);
        b.entities[1].grab(Pos::new(1, 0));
        assert_eq!(try_drop(&mut b), Some(vec![1]));
        assert_eq!(b.entities[1].pos, Pos::new(1, 1));
        assert!(b.entities[1].is_grounded());
        assert_eq!(b.entities[1].collision, 1);
    }

    #[test]
    fn drop_refused_when_blocked() {
        let mut b = branch_from(&["...", "...", "..G"], (1, 0), &[(1, 0, 0), (2, 1, 1)]);
        b.entities[1].grab(Pos::new(1, 0));
        let before = b.clone();
        assert_eq!(try_drop(&mut b), None);
        assert_eq!(b, before);

        b.player_mut().facing = Dir::Up;
        assert_eq!(try_drop(&mut b), None, "off the grid");
    }

    #[test]
    fn drop_with_empty_hands_fails() {
        let mut b = branch_from(&["...", "...", "..G"], (1, 0), &[]);
        assert_eq!(try_drop(&mut b), None);
    }

    #[test]
    fn drop_into_hole_buries() {
        let mut b = branch_from(&["...", ".H.", "..G"], (1, 0), &[(1, 0, 0)]);
        b.entities[1].grab(Pos::new(1, 0));
        assert_eq!(try_drop(&mut b), Some(vec![1]));
        assert!(b.entities[1].is_buried());
        assert_eq!(collision_at(Pos::new(1, 1), &b), 0);
    }

    #[test]
    fn drop_allowed_while_on_no_carry() {
        let mut b = branch_from(&[".N.", "...", "..G"], (1, 0), &[(1, 0, 0)]);
        b.entities[1].grab(Pos::new(1, 0));
        assert!(try_drop(&mut b).is_some());
    }
}
