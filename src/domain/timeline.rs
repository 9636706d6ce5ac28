/// Timeline operations: divergence and convergence of branches.
///
/// ## Merge algorithm
///
/// ```text
///   focused ──┐
///             ├─ union of (id, pos) instances ── layer priority ── drop conflicts ── settle_carried
///   other ────┘        Held > Ground > Buried        other.held \ focused.held
///                                                    → Ground at other's player
/// ```
///
/// The player (position, facing) always comes from the focused branch.
/// Boxes that ended up at different cells in the two branches survive the
/// merge as shadow instances of the same id; `converge_one` collapses them
/// on demand (pickup, or the adaptive action while facing one).
///
/// | Focused holds | Other holds | merge         | inherit       |
/// |---------------|-------------|---------------|---------------|
/// | A             | –           | holds A       | holds A       |
/// | A             | A           | holds A       | holds A       |
/// | A             | B           | A, B dropped  | refused       |
/// | –             | B           | B dropped     | holds B       |

use std::collections::BTreeSet;

use tracing::trace;

use super::branch::BranchState;
use super::entity::{Entity, EntityId, PLAYER_ID};
use super::physics;
use super::terrain::Pos;

// ══════════════════════════════════════════════════════════════
// Divergence
// ══════════════════════════════════════════════════════════════

/// Split off a sub-branch. The branch point under the player loses one use
/// before the copy is taken, so both branches see the spent counter.
/// `None` when the player is not standing on a usable branch point.
pub fn diverge(state: &mut BranchState) -> Option<BranchState> {
    let here = state.player().pos;
    let terrain = state.terrain_at(here);
    if !terrain.is_branch_point() {
        return None;
    }
    state.terrain.set(here, terrain.spend_branch_use());
    trace!(%here, left = ?state.terrain_at(here), "branch point spent");
    Some(state.clone())
}

// ══════════════════════════════════════════════════════════════
// Convergence
// ══════════════════════════════════════════════════════════════

/// Merge `other` into `focused`. Both inputs are left untouched.
///
/// Does not settle carried items; callers go through `merge` or
/// `inherit_merge` unless they need the raw union.
pub fn converge(focused: &BranchState, other: &BranchState) -> BranchState {
    let focused_held = focused.held_ids();
    let drop_ids: BTreeSet<EntityId> = other.held_ids().difference(&focused_held).copied().collect();
    let drop_at = other.player().pos;

    let mut entities: Vec<Entity> = vec![focused.player().clone()];
    let instances = focused.entities.iter().chain(other.entities.iter()).filter(|e| !e.is_player());
    for e in instances {
        let slot = entities[1..].iter_mut().find(|k| k.id == e.id && k.pos == e.pos);
        match slot {
            Some(k) if e.layer.priority() > k.layer.priority() => *k = e.clone(),
            Some(_) => {}
            None => entities.push(e.clone()),
        }
    }

    for e in entities[1..].iter_mut() {
        if e.is_held() && drop_ids.contains(&e.id) {
            e.release(drop_at);
        }
    }

    BranchState {
        terrain: focused.terrain.clone(),
        grid_size: focused.grid_size,
        entities,
    }
}

/// Collapse every instance of `id` into one. Picks an already-held instance,
/// else the one at `preferred`, else the first found. The survivor keeps its
/// slot in the entity list; all other instances are removed.
pub fn converge_one(state: &mut BranchState, id: EntityId, preferred: Option<Pos>) -> Option<&mut Entity> {
    if id == PLAYER_ID {
        return None;
    }
    let first = state.entities.iter().position(|e| e.id == id)?;
    let chosen = state
        .entities
        .iter()
        .position(|e| e.id == id && e.is_held())
        .or_else(|| {
            let at = preferred?;
            state.entities.iter().position(|e| e.id == id && e.pos == at)
        })
        .unwrap_or(first);

    let mut i = 0;
    state.entities.retain(|e| {
        let keep = e.id != id || i == chosen;
        i += 1;
        keep
    });
    state.entities.iter_mut().find(|e| e.id == id)
}

/// Every held id ends up as exactly one instance in the player's hands.
pub fn settle_carried(state: &mut BranchState) {
    let at = state.player().pos;
    for id in state.held_ids() {
        if let Some(item) = converge_one(state, id, None) {
            item.grab(at);
        }
    }
}

/// Plain merge: converge, then settle carried items.
pub fn merge(focused: &BranchState, other: &BranchState) -> BranchState {
    let mut merged = converge(focused, other);
    settle_carried(&mut merged);
    merged
}

/// Ids the focused player would end up carrying after an inherit-merge.
fn inherited_ids(focused: &BranchState, other: &BranchState) -> BTreeSet<EntityId> {
    focused.held_ids().union(&other.held_ids()).copied().collect()
}

/// Inherit-merge is offered only while everything either player holds fits
/// in the focused player's hands at their current cell.
pub fn can_inherit(focused: &BranchState, other: &BranchState) -> bool {
    let capacity = physics::effective_capacity(focused, focused.player().pos);
    inherited_ids(focused, other).len() <= capacity
}

/// Merge that hands the other branch's carried item to the focused player.
/// `None` when `can_inherit` does not hold.
pub fn inherit_merge(focused: &BranchState, other: &BranchState) -> Option<BranchState> {
    if !can_inherit(focused, other) {
        return None;
    }
    let carry = inherited_ids(focused, other);
    let at = focused.player().pos;
    let mut merged = converge(focused, other);
    for e in merged.entities.iter_mut().filter(|e| carry.contains(&e.id)) {
        e.grab(at);
    }
    settle_carried(&mut merged);
    Some(merged)
}

// ══════════════════════════════════════════════════════════════
// Unit tests
// ══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::branch::tests::branch_from;
    use crate::domain::entity::Layer;
    use crate::domain::rules::{execute_move, try_pickup};
    use crate::domain::terrain::{Dir, Terrain};

    const OPEN: [&str; 6] = ["......", "......", "......", "......", "......", "......"];

    /// Player at `at` holding `held` (if any), nothing else in the world.
    fn holding(at: (i32, i32), held: Option<EntityId>) -> BranchState {
        let boxes: Vec<_> = held.iter().map(|&id| (id, at.0, at.1)).collect();
        let mut b = branch_from(&OPEN, at, &boxes);
        if held.is_some() {
            b.entities[1].grab(Pos::new(at.0, at.1));
        }
        b
    }

    fn grounded(b: &BranchState) -> Vec<&Entity> {
        b.entities.iter().filter(|e| !e.is_player() && !e.is_held()).collect()
    }

    // ── diverge ──

    #[test]
    fn diverge_copies_and_spends_use() {
        let mut main = branch_from(&["X..", "...", "..G"], (0, 0), &[(1, 1, 1)]);
        let sub = diverge(&mut main).unwrap();
        assert_eq!(main.terrain_at(Pos::new(0, 0)), Terrain::BranchPoint(3));
        assert_eq!(sub, main);
    }

    #[test]
    fn last_use_turns_into_floor() {
        let mut main = branch_from(&["v..", "...", "..G"], (0, 0), &[]);
        let sub = diverge(&mut main).unwrap();
        assert_eq!(sub.terrain_at(Pos::new(0, 0)), Terrain::Floor);
        assert!(diverge(&mut main).is_none());
    }

    #[test]
    fn diverge_refused_off_branch_point() {
        let mut main = branch_from(&["V..", "...", "..G"], (1, 0), &[]);
        let before = main.clone();
        assert!(diverge(&mut main).is_none());
        assert_eq!(main, before);
    }

    #[test]
    fn diverged_branches_do_not_alias() {
        let mut main = branch_from(&["V..", "...", "..G"], (0, 0), &[(1, 1, 1)]);
        let mut sub = diverge(&mut main).unwrap();
        sub.entities[1].pos = Pos::new(2, 1);
        assert_eq!(main.entities[1].pos, Pos::new(1, 1));
    }

    // ── converge ──

    #[test]
    fn round_trip_is_identity() {
        let mut b = branch_from(&["V..", ".H.", "..G"], (0, 0), &[(1, 2, 0), (2, 1, 1)]);
        b.entities[2].layer = Layer::Buried;
        let copy = diverge(&mut b).unwrap();
        assert_eq!(merge(&copy, &b), b);
    }

    #[test]
    fn player_comes_from_focused_branch() {
        let mut main = branch_from(&OPEN, (0, 0), &[]);
        let mut sub = main.clone();
        main.player_mut().facing = Dir::Right;
        sub.player_mut().pos = Pos::new(4, 4);
        let merged = merge(&main, &sub);
        assert_eq!(merged.entities[0], main.entities[0]);
        let merged = merge(&sub, &main);
        assert_eq!(merged.player().pos, Pos::new(4, 4));
    }

    #[test]
    fn box_moved_in_one_branch_becomes_shadow() {
        let main = branch_from(&OPEN, (0, 1), &[(1, 1, 1)]);
        let mut sub = main.clone();
        execute_move(&mut sub, Dir::Right);
        assert_eq!(sub.entities[1].pos, Pos::new(2, 1));

        let mut merged = merge(&main, &sub);
        assert!(merged.is_shadow(1));
        assert_eq!(merged.instances(1).count(), 2);
        assert!(merged.instances(1).all(|e| e.is_grounded()));

        let kept = converge_one(&mut merged, 1, Some(Pos::new(2, 1))).unwrap();
        assert_eq!(kept.pos, Pos::new(2, 1));
        assert!(!merged.is_shadow(1));
        assert_eq!(merged.instances(1).count(), 1);
    }

    #[test]
    fn held_copy_wins_over_pushed_copy() {
        let mut main = branch_from(&OPEN, (1, 0), &[(1, 1, 1)]);
        let mut sub = main.clone();
        assert_eq!(try_pickup(&mut main), Some(1));
        execute_move(&mut sub, Dir::Down);

        let merged = merge(&main, &sub);
        assert_eq!(merged.instances(1).count(), 1);
        let b = merged.instances(1).next().unwrap();
        assert!(b.is_held());
        assert_eq!(b.pos, merged.player().pos);
    }

    #[test]
    fn buried_and_ground_at_same_cell_keep_ground() {
        let mut main = branch_from(&[".H.", "...", "..G"], (0, 0), &[(1, 1, 0)]);
        let sub = main.clone();
        main.entities[1].layer = Layer::Buried;
        let merged = converge(&main, &sub);
        assert_eq!(merged.instances(1).count(), 1);
        assert!(merged.entities[1].is_grounded());
    }

    // ── hold-conflict table ──

    #[test]
    fn focused_holds_a_other_empty() {
        let merged = merge(&holding((2, 2), Some(1)), &holding((2, 3), None));
        assert_eq!(merged.held_ids().into_iter().collect::<Vec<_>>(), vec![1]);
        assert!(grounded(&merged).is_empty());
    }

    #[test]
    fn both_hold_same_box() {
        let merged = merge(&holding((2, 2), Some(1)), &holding((2, 3), Some(1)));
        assert_eq!(merged.held_ids().into_iter().collect::<Vec<_>>(), vec![1]);
        assert_eq!(merged.instances(1).count(), 1);
        assert_eq!(merged.instances(1).next().unwrap().pos, Pos::new(2, 2));
        assert!(grounded(&merged).is_empty());
    }

    #[test]
    fn different_boxes_drop_other_at_its_player() {
        let merged = merge(&holding((2, 2), Some(1)), &holding((2, 3), Some(2)));
        assert_eq!(merged.held_ids().into_iter().collect::<Vec<_>>(), vec![1]);
        let ground = grounded(&merged);
        assert_eq!(ground.len(), 1);
        assert_eq!(ground[0].id, 2);
        assert_eq!(ground[0].pos, Pos::new(2, 3));
        assert_eq!(ground[0].collision, 1);
        assert_eq!(ground[0].holder, None);
    }

    #[test]
    fn empty_handed_merge_drops_other_hold() {
        let merged = merge(&holding((2, 2), None), &holding((2, 3), Some(2)));
        assert!(merged.held_ids().is_empty());
        let ground = grounded(&merged);
        assert_eq!(ground.len(), 1);
        assert_eq!(ground[0].id, 2);
        assert_eq!(ground[0].pos, Pos::new(2, 3));
    }

    #[test]
    fn empty_handed_inherit_takes_other_hold() {
        let focused = holding((2, 2), None);
        let other = holding((2, 3), Some(2));
        assert!(can_inherit(&focused, &other));
        let merged = inherit_merge(&focused, &other).unwrap();
        let b2: Vec<_> = merged.instances(2).collect();
        assert_eq!(b2.len(), 1);
        assert_eq!(b2[0].pos, Pos::new(2, 2));
        assert_eq!(b2[0].holder, Some(PLAYER_ID));
        assert_eq!(b2[0].collision, 0);
    }

    #[test]
    fn inherit_refused_when_hands_would_overflow() {
        let focused = holding((2, 2), Some(1));
        let other = holding((2, 3), Some(2));
        assert!(!can_inherit(&focused, &other));
        assert!(inherit_merge(&focused, &other).is_none());
        // Same box on both sides still fits.
        assert!(can_inherit(&focused, &holding((2, 3), Some(1))));
    }

    #[test]
    fn inherit_refused_on_no_carry() {
        let mut focused = holding((2, 2), None);
        focused.terrain.set(Pos::new(2, 2), Terrain::NoCarry);
        let other = holding((2, 3), Some(2));
        assert!(!can_inherit(&focused, &other));
        // Nothing held anywhere: inherit degenerates to a plain merge.
        assert!(can_inherit(&focused, &holding((2, 3), None)));
    }

    #[test]
    fn inherit_collapses_ground_copy_in_focused() {
        // Diverged, then picked the box up in the other branch only.
        let focused = branch_from(&OPEN, (0, 0), &[(2, 4, 4)]);
        let mut other = focused.clone();
        other.player_mut().pos = Pos::new(4, 3);
        assert_eq!(try_pickup(&mut other), Some(2));

        let merged = inherit_merge(&focused, &other).unwrap();
        assert_eq!(merged.instances(2).count(), 1);
        let b = merged.instances(2).next().unwrap();
        assert!(b.is_held());
        assert_eq!(b.pos, Pos::new(0, 0));
    }

    // ── converge_one / settle_carried ──

    #[test]
    fn converge_one_prefers_held_then_preferred_then_first() {
        let mut b = branch_from(&OPEN, (0, 0), &[(1, 3, 3), (1, 4, 4), (1, 5, 5)]);
        assert_eq!(converge_one(&mut b.clone(), 1, None).unwrap().pos, Pos::new(3, 3));
        assert_eq!(converge_one(&mut b.clone(), 1, Some(Pos::new(5, 5))).unwrap().pos, Pos::new(5, 5));
        b.entities[2].grab(Pos::new(0, 0));
        let kept = converge_one(&mut b, 1, Some(Pos::new(5, 5))).unwrap();
        assert!(kept.is_held());
        assert_eq!(b.entities.len(), 2);
    }

    #[test]
    fn converge_one_missing_id() {
        let mut b = branch_from(&OPEN, (0, 0), &[]);
        assert!(converge_one(&mut b, 9, None).is_none());
        assert!(converge_one(&mut b, PLAYER_ID, None).is_none());
        assert_eq!(b.entities.len(), 1);
    }

    #[test]
    fn settle_carried_pulls_held_to_player() {
        let mut b = branch_from(&OPEN, (2, 2), &[(1, 0, 0), (1, 5, 5)]);
        b.entities[2].grab(Pos::new(5, 5));
        settle_carried(&mut b);
        assert_eq!(b.instances(1).count(), 1);
        let held = b.instances(1).next().unwrap();
        assert!(held.is_held());
        assert_eq!(held.pos, Pos::new(2, 2));
        assert_eq!(held.collision, 0);
    }
}
