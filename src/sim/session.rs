/// GameSession: the controller that turns intents into branch mutations.
///
/// ## Processing order (per accepted intent)
///   1. Dispatch to the move / action rules or a timeline operation
///   2. Settle the active branch (fill holes, fall check)
///   3. Snapshot {main, sub, focus, has_branched} into history
///   4. Append the intent to the input log
///   5. Victory check against the merge preview
///
/// Rejected intents change nothing: no snapshot, no log entry.
///
/// ## State machine
///
/// ```text
///   Unbranched ──V (on branch point)──▶ Branched{focus: Main|Sub}
///        ▲                                  │  T toggles focus
///        └────────── C / I (merge) ─────────┘
/// ```
///
/// `collapsed` (the player fell) and `victory` are terminal until undo or
/// reset.

use std::borrow::Cow;

use tracing::{debug, info};

use crate::domain::branch::{init_branch, BranchState, LevelSource};
use crate::domain::entity::Intent;
use crate::domain::physics::{self, PhysicsResult};
use crate::domain::rules;
use crate::domain::terrain::{Dir, Terrain};
use crate::domain::timeline;
use crate::error::LevelError;

use super::event::GameEvent;

/// Which branch receives player input.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Focus {
    #[default]
    Main,
    Sub,
}

impl Focus {
    pub fn toggled(self) -> Focus {
        match self {
            Focus::Main => Focus::Sub,
            Focus::Sub => Focus::Main,
        }
    }
}

/// One undo step.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Snapshot {
    pub main: BranchState,
    pub sub: Option<BranchState>,
    pub focus: Focus,
    pub has_branched: bool,
}

#[derive(Debug)]
pub struct GameSession {
    source: LevelSource,
    initial: BranchState,
    main: BranchState,
    sub: Option<BranchState>,
    focus: Focus,
    has_branched: bool,
    collapsed: bool,
    victory: bool,
    history: Vec<Snapshot>,
    input_log: Vec<Intent>,
}

// ══════════════════════════════════════════════════════════════
// Construction / accessors
// ══════════════════════════════════════════════════════════════

impl GameSession {
    /// Start a session on `source`. Fails only if the level cannot form a
    /// valid branch.
    pub fn new(source: LevelSource) -> Result<Self, LevelError> {
        let initial = init_branch(&source)?;
        let mut session = GameSession {
            source,
            main: initial.clone(),
            initial,
            sub: None,
            focus: Focus::Main,
            has_branched: false,
            collapsed: false,
            victory: false,
            history: vec![],
            input_log: vec![],
        };
        session.reset();
        Ok(session)
    }

    pub fn source(&self) -> &LevelSource {
        &self.source
    }

    pub fn main(&self) -> &BranchState {
        &self.main
    }

    pub fn sub(&self) -> Option<&BranchState> {
        self.sub.as_ref()
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn is_branched(&self) -> bool {
        self.has_branched
    }

    pub fn collapsed(&self) -> bool {
        self.collapsed
    }

    pub fn victory(&self) -> bool {
        self.victory
    }

    /// Number of snapshots, the initial one included.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn input_log(&self) -> &[Intent] {
        &self.input_log
    }

    /// The input log as a code string, e.g. `"RRUXC"`.
    pub fn codes(&self) -> String {
        self.input_log.iter().map(|i| i.code()).collect()
    }

    /// The current state as an undo snapshot would record it.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            main: self.main.clone(),
            sub: self.sub.clone(),
            focus: self.focus,
            has_branched: self.has_branched,
        }
    }

    /// The branch under player control.
    pub fn active(&self) -> &BranchState {
        match (self.focus, &self.sub) {
            (Focus::Sub, Some(sub)) => sub,
            _ => &self.main,
        }
    }

    fn active_mut(&mut self) -> &mut BranchState {
        match (self.focus, &mut self.sub) {
            (Focus::Sub, Some(sub)) => sub,
            _ => &mut self.main,
        }
    }

    /// (focused, other) while branched.
    pub fn focused_and_other(&self) -> Option<(&BranchState, &BranchState)> {
        let sub = self.sub.as_ref()?;
        Some(match self.focus {
            Focus::Main => (&self.main, sub),
            Focus::Sub => (sub, &self.main),
        })
    }

    /// What the world would look like if merged right now. Pure.
    pub fn merge_preview(&self) -> Cow<'_, BranchState> {
        match self.focused_and_other() {
            Some((focused, other)) => Cow::Owned(timeline::merge(focused, other)),
            None => Cow::Borrowed(&self.main),
        }
    }

    /// Every switch weighted and the player on a goal, judged on the merge
    /// preview. Pure.
    pub fn check_victory(&self) -> bool {
        let preview = self.merge_preview();
        physics::all_switches_activated(&preview)
            && preview.terrain_at(preview.player().pos) == Terrain::Goal
    }
}

// ══════════════════════════════════════════════════════════════
// Intent dispatch
// ══════════════════════════════════════════════════════════════

impl GameSession {
    /// Apply one intent. Returns what happened; an illegal intent yields a
    /// single `Rejected` event and leaves the session untouched.
    pub fn apply(&mut self, intent: Intent) -> Vec<GameEvent> {
        match intent {
            Intent::Undo => {
                return if self.undo() {
                    vec![GameEvent::Undone]
                } else {
                    vec![GameEvent::Rejected { intent }]
                };
            }
            Intent::Reset => {
                self.reset();
                return vec![GameEvent::Reset];
            }
            _ => {}
        }

        if self.collapsed || self.victory {
            debug!(?intent, reason = "game over", "intent rejected");
            return vec![GameEvent::Rejected { intent }];
        }

        let mut events = vec![];
        let accepted = match intent {
            Intent::Move(dir) => self.handle_move(dir, &mut events),
            Intent::Pickup => self.handle_pickup(&mut events),
            Intent::Drop => self.handle_drop(&mut events),
            Intent::Adaptive => self.handle_adaptive(&mut events),
            Intent::Branch => self.try_branch(&mut events),
            Intent::Merge => self.try_merge(false, &mut events),
            Intent::InheritMerge => self.try_merge(true, &mut events),
            Intent::SwitchFocus => self.switch_focus(&mut events),
            Intent::Undo | Intent::Reset => false,
        };
        if !accepted {
            return vec![GameEvent::Rejected { intent }];
        }

        self.finish_action(intent, &mut events);
        events
    }

    fn finish_action(&mut self, intent: Intent, events: &mut Vec<GameEvent>) {
        let active = self.active_mut();
        for at in physics::fill_holes(active) {
            events.push(GameEvent::HoleFilled { at });
        }
        if physics::settle(active) == PhysicsResult::Fall {
            let at = active.player().pos;
            self.collapsed = true;
            info!(%at, "player fell");
            events.push(GameEvent::Fell);
        }

        let snapshot = self.snapshot();
        self.history.push(snapshot);
        self.input_log.push(intent);

        if !self.collapsed && self.check_victory() {
            self.victory = true;
            info!(steps = self.input_log.len(), "victory");
            events.push(GameEvent::Victory);
        }
    }

    /// Step back one accepted action. `false` when only the initial state is left.
    pub fn undo(&mut self) -> bool {
        if self.history.len() <= 1 {
            return false;
        }
        self.history.pop();
        self.input_log.pop();
        let Some(snapshot) = self.history.last() else {
            return false;
        };
        self.main = snapshot.main.clone();
        self.sub = snapshot.sub.clone();
        self.focus = snapshot.focus;
        self.has_branched = snapshot.has_branched;
        self.collapsed = false;
        self.victory = self.check_victory();
        true
    }

    /// Reload the level from its source.
    pub fn reset(&mut self) {
        self.main = self.initial.clone();
        self.sub = None;
        self.focus = Focus::Main;
        self.has_branched = false;
        self.collapsed = false;
        self.history.clear();
        self.input_log.clear();
        let snapshot = self.snapshot();
        self.history.push(snapshot);
        self.victory = self.check_victory();
        info!("level reset");
    }

    // ── Move ──

    fn handle_move(&mut self, dir: Dir, events: &mut Vec<GameEvent>) -> bool {
        let active = self.active_mut();

        // Holding, or a box right ahead: the first press only turns.
        if rules::turn_only(active, dir) {
            active.player_mut().facing = dir;
            events.push(GameEvent::Turned { dir });
            return true;
        }

        // Open terrain: face the direction, then try to step.
        let turned = active.player().facing != dir;
        active.player_mut().facing = dir;
        match rules::check_move(active, dir) {
            Ok(()) => {
                let report = rules::execute_move(active, dir);
                let to = active.player().pos;
                events.push(GameEvent::Moved { to });
                for id in report.pushed {
                    events.push(GameEvent::Pushed { id, to: to.step(dir) });
                }
                for at in report.filled {
                    events.push(GameEvent::HoleFilled { at });
                }
                true
            }
            Err(reason) if turned => {
                debug!(?dir, ?reason, "move blocked, turned only");
                events.push(GameEvent::Turned { dir });
                true
            }
            Err(reason) => {
                debug!(?dir, ?reason, "move rejected");
                false
            }
        }
    }

    // ── Pickup / Drop / Adaptive ──

    fn handle_pickup(&mut self, events: &mut Vec<GameEvent>) -> bool {
        match rules::try_pickup(self.active_mut()) {
            Some(id) => {
                events.push(GameEvent::PickedUp { id });
                true
            }
            None => {
                debug!(reason = "nothing pickable", "pickup rejected");
                false
            }
        }
    }

    fn handle_drop(&mut self, events: &mut Vec<GameEvent>) -> bool {
        let active = self.active_mut();
        let at = active.front();
        let open_hole = active.in_bounds(at)
            && active.terrain_at(at).is_hole()
            && !physics::is_hole_filled(at, active);
        match rules::try_drop(active) {
            Some(ids) => {
                events.extend(ids.into_iter().map(|id| GameEvent::Dropped { id, at }));
                if open_hole {
                    events.push(GameEvent::HoleFilled { at });
                }
                true
            }
            None => {
                debug!(%at, reason = "drop blocked", "drop rejected");
                false
            }
        }
    }

    /// Drop if holding; converge a faced shadow in place; else pick up.
    fn handle_adaptive(&mut self, events: &mut Vec<GameEvent>) -> bool {
        if self.active().is_holding() {
            return self.handle_drop(events);
        }
        let active = self.active_mut();
        let front = active.front();
        let Some(id) = active.find_box_at(front).map(|e| e.id) else {
            debug!(%front, reason = "nothing in front", "action rejected");
            return false;
        };
        if active.is_shadow(id) {
            timeline::converge_one(active, id, Some(front));
            events.push(GameEvent::Converged { id, at: front });
            return true;
        }
        self.handle_pickup(events)
    }

    // ── Timeline ──

    fn try_branch(&mut self, events: &mut Vec<GameEvent>) -> bool {
        if self.has_branched {
            debug!(reason = "already branched", "branch rejected");
            return false;
        }
        let Some(sub) = timeline::diverge(&mut self.main) else {
            debug!(reason = "not on a branch point", "branch rejected");
            return false;
        };
        self.sub = Some(sub);
        self.has_branched = true;
        self.focus = Focus::Main;
        info!(at = %self.main.player().pos, "timeline split");
        events.push(GameEvent::Branched);
        true
    }

    fn try_merge(&mut self, inherit: bool, events: &mut Vec<GameEvent>) -> bool {
        let Some((focused, other)) = self.focused_and_other() else {
            debug!(inherit, reason = "not branched", "merge rejected");
            return false;
        };
        let merged = if inherit {
            match timeline::inherit_merge(focused, other) {
                Some(m) => m,
                None => {
                    debug!(reason = "hands full", "inherit-merge rejected");
                    return false;
                }
            }
        } else {
            timeline::merge(focused, other)
        };

        let from = self.focus;
        self.main = merged;
        self.sub = None;
        self.has_branched = false;
        self.focus = Focus::Main;
        info!(?from, inherit, shadows = self.main.shadow_ids().len(), "timelines merged");
        events.push(if inherit { GameEvent::Inherited } else { GameEvent::Merged });
        true
    }

    fn switch_focus(&mut self, events: &mut Vec<GameEvent>) -> bool {
        if !self.has_branched {
            debug!(reason = "not branched", "focus switch rejected");
            return false;
        }
        self.focus = self.focus.toggled();
        info!(focus = ?self.focus, "focus switched");
        events.push(GameEvent::FocusSwitched);
        true
    }
}

// ══════════════════════════════════════════════════════════════
// Unit tests
// ══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::terrain::Pos;
    use crate::sim::level::parse_dual_layer;

    fn session(floor: &str, objects: &str) -> GameSession {
        GameSession::new(parse_dual_layer(floor, objects).unwrap()).unwrap()
    }

    fn play(s: &mut GameSession, codes: &str) -> Vec<GameEvent> {
        codes
            .chars()
            .flat_map(|c| s.apply(Intent::from_code(c).unwrap()))
            .collect()
    }

    fn rejected(events: &[GameEvent]) -> bool {
        events.iter().any(|e| matches!(e, GameEvent::Rejected { .. }))
    }

    /// Switch at (2,2), goal at (4,4), branch point at (0,0).
    fn switch_and_goal() -> GameSession {
        session(
            "V....\n.....\n..S..\n.....\n....G\n",
            "P....\n.....\n.B...\n.....\n.....\n",
        )
    }

    // ── construction ──

    #[test]
    fn new_validates_level() {
        let mut src = parse_dual_layer("..G\n", "P..\n").unwrap();
        src.terrain.set(Pos::new(2, 0), Terrain::Floor);
        assert!(matches!(GameSession::new(src), Err(LevelError::MissingGoal)));
    }

    #[test]
    fn fresh_session_is_unbranched() {
        let s = switch_and_goal();
        assert!(!s.is_branched());
        assert!(s.sub().is_none());
        assert_eq!(s.focus(), Focus::Main);
        assert_eq!(s.history_len(), 1);
        assert!(!s.victory());
    }

    // ── undo / reset ──

    #[test]
    fn undo_on_initial_state_is_noop() {
        let mut s = switch_and_goal();
        let before = s.snapshot();
        assert!(!s.undo());
        assert_eq!(s.snapshot(), before);
        assert_eq!(s.apply(Intent::Undo), vec![GameEvent::Rejected { intent: Intent::Undo }]);
    }

    #[test]
    fn n_undos_restore_initial_state() {
        let mut s = switch_and_goal();
        let initial = s.snapshot();
        play(&mut s, "VDDRRTRR");
        assert_eq!(s.input_log().len(), 8);
        assert!(s.is_branched());
        for _ in 0..8 {
            assert!(s.undo());
        }
        assert_eq!(s.snapshot(), initial);
        assert!(s.input_log().is_empty());
        assert!(!s.undo());
    }

    #[test]
    fn rejected_intent_leaves_no_trace() {
        let mut s = switch_and_goal();
        let events = s.apply(Intent::Merge);
        assert!(rejected(&events));
        assert_eq!(s.history_len(), 1);
        assert!(s.input_log().is_empty());
        // Wall of the grid, already facing it: nothing changes.
        s.apply(Intent::Move(Dir::Up));
        let events = s.apply(Intent::Move(Dir::Up));
        assert!(rejected(&events));
        assert_eq!(s.codes(), "U");
    }

    #[test]
    fn reset_restores_source_and_clears_log() {
        let mut s = switch_and_goal();
        play(&mut s, "VDD");
        assert_eq!(s.apply(Intent::Reset), vec![GameEvent::Reset]);
        assert!(!s.is_branched());
        assert_eq!(s.history_len(), 1);
        assert_eq!(s.codes(), "");
        assert_eq!(s.main().terrain_at(Pos::new(0, 0)), Terrain::BranchPoint(2));
    }

    // ── movement ──

    #[test]
    fn open_terrain_turns_and_moves_in_one_press() {
        let mut s = switch_and_goal();
        let events = s.apply(Intent::Move(Dir::Right));
        assert_eq!(events, vec![GameEvent::Moved { to: Pos::new(1, 0) }]);
        assert_eq!(s.active().player().facing, Dir::Right);
    }

    #[test]
    fn facing_a_box_takes_two_presses() {
        let mut s = switch_and_goal();
        play(&mut s, "DD");
        assert_eq!(s.active().player().pos, Pos::new(0, 2));
        let events = s.apply(Intent::Move(Dir::Right));
        assert_eq!(events, vec![GameEvent::Turned { dir: Dir::Right }]);
        assert_eq!(s.active().player().pos, Pos::new(0, 2));
        let events = s.apply(Intent::Move(Dir::Right));
        assert!(events.contains(&GameEvent::Pushed { id: 1, to: Pos::new(2, 2) }));
        assert_eq!(s.codes(), "DDRR");
    }

    #[test]
    fn blocked_move_that_changes_facing_is_a_turn() {
        let mut s = switch_and_goal();
        let events = s.apply(Intent::Move(Dir::Left));
        assert_eq!(events, vec![GameEvent::Turned { dir: Dir::Left }]);
        assert_eq!(s.active().player().facing, Dir::Left);
        assert_eq!(s.history_len(), 2);
    }

    // ── branching ──

    #[test]
    fn branch_needs_branch_point_and_no_live_branch() {
        let mut s = switch_and_goal();
        play(&mut s, "R");
        assert!(rejected(&s.apply(Intent::Branch)));
        play(&mut s, "L");
        assert_eq!(s.apply(Intent::Branch), vec![GameEvent::Branched]);
        assert!(rejected(&s.apply(Intent::Branch)));
        assert_eq!(s.main().terrain_at(Pos::new(0, 0)), Terrain::BranchPoint(1));
        assert_eq!(s.sub().unwrap().terrain_at(Pos::new(0, 0)), Terrain::BranchPoint(1));
    }

    #[test]
    fn branches_evolve_independently() {
        let mut s = switch_and_goal();
        play(&mut s, "VTRR");
        assert_eq!(s.focus(), Focus::Sub);
        assert_eq!(s.sub().unwrap().player().pos, Pos::new(2, 0));
        assert_eq!(s.main().player().pos, Pos::new(0, 0));
        play(&mut s, "T");
        assert_eq!(s.active().player().pos, Pos::new(0, 0));
    }

    #[test]
    fn switch_focus_requires_branch() {
        let mut s = switch_and_goal();
        assert!(rejected(&s.apply(Intent::SwitchFocus)));
    }

    #[test]
    fn merge_takes_focused_player() {
        let mut s = switch_and_goal();
        play(&mut s, "VTRR");
        assert_eq!(s.apply(Intent::Merge), vec![GameEvent::Merged]);
        assert!(!s.is_branched());
        assert_eq!(s.focus(), Focus::Main);
        assert_eq!(s.main().player().pos, Pos::new(2, 0));
    }

    // ── victory ──

    #[test]
    fn victory_unbranched() {
        let mut s = switch_and_goal();
        play(&mut s, "DDRRURRRDD");
        assert!(!s.victory(), "switch pressed but player not on goal");
        let events = play(&mut s, "D");
        assert!(events.contains(&GameEvent::Victory));
        assert!(s.victory());
        assert!(rejected(&s.apply(Intent::Move(Dir::Up))));
    }

    #[test]
    fn victory_via_merge_preview_while_branched() {
        let mut s = switch_and_goal();
        // Main pushes the box onto the switch, sub walks to the goal.
        play(&mut s, "VDDRRTRRRRDDD");
        assert!(s.is_branched());
        assert!(!s.victory());
        let preview = s.merge_preview();
        assert!(physics::all_switches_activated(&preview));
        let events = play(&mut s, "D");
        assert!(events.contains(&GameEvent::Victory));
        assert!(s.is_branched(), "victory does not force the merge");
        assert_eq!(s.sub().unwrap().player().pos, Pos::new(4, 4));
    }

    #[test]
    fn merge_preview_does_not_mutate() {
        let mut s = switch_and_goal();
        play(&mut s, "VDDRRT");
        let before = s.snapshot();
        let _ = s.merge_preview();
        let _ = s.check_victory();
        assert_eq!(s.snapshot(), before);
    }

    #[test]
    fn undo_clears_victory() {
        let mut s = switch_and_goal();
        play(&mut s, "DDRRURRRDDD");
        assert!(s.victory());
        assert!(s.undo());
        assert!(!s.victory());
        assert!(!rejected(&s.apply(Intent::Move(Dir::Down))));
    }

    // ── carrying ──

    #[test]
    fn adaptive_picks_up_then_drops() {
        let mut s = switch_and_goal();
        play(&mut s, "D");
        // At (0,1) facing down; the box is at (1,2), not in front.
        assert!(rejected(&s.apply(Intent::Adaptive)));
        play(&mut s, "RD");
        // R moved to (1,1); D only turned, the box being right ahead.
        assert_eq!(s.active().player().pos, Pos::new(1, 1));
        assert_eq!(s.apply(Intent::Adaptive), vec![GameEvent::PickedUp { id: 1 }]);
        assert!(s.active().is_holding());
        let events = s.apply(Intent::Adaptive);
        assert_eq!(events, vec![GameEvent::Dropped { id: 1, at: Pos::new(1, 2) }]);
    }

    #[test]
    fn inherit_hands_over_the_other_box() {
        let mut s = switch_and_goal();
        // Sub walks to the box and picks it up; focus back to main, inherit.
        play(&mut s, "VTRDX");
        assert!(s.sub().unwrap().is_holding());
        play(&mut s, "T");
        assert_eq!(s.apply(Intent::InheritMerge), vec![GameEvent::Inherited]);
        let held: Vec<_> = s.main().instances(1).collect();
        assert_eq!(held.len(), 1);
        assert!(held[0].is_held());
        assert_eq!(held[0].pos, Pos::new(0, 0));
    }

    #[test]
    fn plain_merge_drops_the_other_box_at_its_player() {
        let mut s = switch_and_goal();
        play(&mut s, "VTRDXT");
        play(&mut s, "C");
        assert!(!s.main().is_holding());
        // The original copy at (1,2) and the dropped one at (1,1) coexist.
        assert!(s.main().is_shadow(1));
        let cells: Vec<_> = s.main().instances(1).map(|e| e.pos).collect();
        assert!(cells.contains(&Pos::new(1, 1)));
        assert!(cells.contains(&Pos::new(1, 2)));
    }

    // ── falling ──

    #[test]
    fn converging_away_a_filling_box_drops_the_player() {
        let mut s = session("v.H.\n....\n....\n...G\n", ".B..\n....\n....\nP...\n");
        // Walk to the branch point first.
        play(&mut s, "UUU");
        assert_eq!(s.active().player().pos, Pos::new(0, 0));
        // Sub pushes the box into the hole and stands on it; merge from sub.
        play(&mut s, "VTRRR");
        assert_eq!(s.active().player().pos, Pos::new(2, 0));
        assert!(s.active().entities[1].is_buried());
        play(&mut s, "C");
        assert!(s.main().is_shadow(1));
        // Converge the ground copy beside us: the buried one vanishes.
        play(&mut s, "L");
        let events = s.apply(Intent::Adaptive);
        assert!(events.contains(&GameEvent::Fell));
        assert!(s.collapsed());
        assert!(rejected(&s.apply(Intent::Move(Dir::Right))));
        assert!(s.undo());
        assert!(!s.collapsed());
    }
}
