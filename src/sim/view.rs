/// Read-only views of a session for the presentation layer.
///
/// Everything here is derived on demand from the current state; no hint
/// is ever stored. Building a view never mutates the session.

use std::borrow::Cow;
use std::collections::BTreeSet;

use crate::domain::branch::BranchState;
use crate::domain::entity::EntityId;
use crate::domain::physics;
use crate::domain::terrain::Pos;
use crate::domain::timeline;

use super::level::LevelHints;
use super::session::{Focus, GameSession};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HintKind {
    Pickup,
    Drop,
    /// Collapse the faced shadow onto its cell.
    Converge,
}

/// What the adaptive action would do, and on which cell.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct InteractionHint {
    pub kind: HintKind,
    pub target: Pos,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TimelineHint {
    None,
    /// Standing on a usable branch point.
    Branch,
    /// A branch is live.
    Merge,
}

/// Adaptive-action hint for the active branch.
pub fn interaction_hint(session: &GameSession) -> Option<InteractionHint> {
    branch_interaction(session.active())
}

fn branch_interaction(state: &BranchState) -> Option<InteractionHint> {
    let target = state.front();

    if state.is_holding() {
        let room = state.in_bounds(target)
            && !state.terrain_at(target).is_wall()
            && physics::collision_at(target, state) <= 0;
        return room.then_some(InteractionHint { kind: HintKind::Drop, target });
    }

    if physics::effective_capacity(state, state.player().pos) == 0 {
        return None;
    }

    let id = state.find_box_at(target)?.id;
    let kind = if state.is_shadow(id) { HintKind::Converge } else { HintKind::Pickup };
    Some(InteractionHint { kind, target })
}

pub fn timeline_hint(session: &GameSession) -> TimelineHint {
    if session.is_branched() {
        return TimelineHint::Merge;
    }
    let main = session.main();
    if main.terrain_at(main.player().pos).is_branch_point() {
        TimelineHint::Branch
    } else {
        TimelineHint::None
    }
}

/// Every switch would be weighted after a merge right now.
pub fn goal_active(session: &GameSession) -> bool {
    physics::all_switches_activated(&session.merge_preview())
}

/// Inherit-merge is currently legal.
pub fn can_inherit(session: &GameSession) -> bool {
    session
        .focused_and_other()
        .map_or(false, |(focused, other)| timeline::can_inherit(focused, other))
}

/// The level message for the current stage.
pub fn stage_hint<'a>(session: &GameSession, hints: &'a LevelHints) -> &'a str {
    let pick = |s: &'a str, fallback: &'a str| if s.is_empty() { fallback } else { s };
    if session.victory() {
        pick(&hints.victory, "")
    } else if goal_active(session) {
        pick(&hints.goal_active, &hints.initial)
    } else if session.is_branched() {
        pick(&hints.branched, &hints.initial)
    } else {
        &hints.initial
    }
}

// ══════════════════════════════════════════════════════════════
// Frame views
// ══════════════════════════════════════════════════════════════

/// One board panel.
pub struct BranchView<'a> {
    pub title: &'static str,
    pub state: Cow<'a, BranchState>,
    pub focused: bool,
    pub shadows: BTreeSet<EntityId>,
    /// Only set on the focused panel.
    pub interaction: Option<InteractionHint>,
}

impl<'a> BranchView<'a> {
    fn new(title: &'static str, state: Cow<'a, BranchState>, focused: bool) -> Self {
        let shadows = state.shadow_ids();
        let interaction = if focused { branch_interaction(&state) } else { None };
        BranchView { title, state, focused, shadows, interaction }
    }
}

/// Everything needed to draw one frame.
pub struct FrameView<'a> {
    /// Main first, then the sub-branch while branched.
    pub panels: Vec<BranchView<'a>>,
    /// Merge preview, only while branched.
    pub preview: Option<BranchView<'a>>,
    pub timeline: TimelineHint,
    pub goal_active: bool,
    pub can_inherit: bool,
    pub collapsed: bool,
    pub victory: bool,
    pub steps: usize,
}

impl<'a> FrameView<'a> {
    pub fn build(session: &'a GameSession) -> Self {
        let focus = session.focus();
        let mut panels = vec![BranchView::new(
            "MAIN",
            Cow::Borrowed(session.main()),
            !session.is_branched() || focus == Focus::Main,
        )];
        if let Some(sub) = session.sub() {
            panels.push(BranchView::new("SUB", Cow::Borrowed(sub), focus == Focus::Sub));
        }
        let preview = session
            .is_branched()
            .then(|| BranchView::new("MERGE PREVIEW", session.merge_preview(), false));

        FrameView {
            panels,
            preview,
            timeline: timeline_hint(session),
            goal_active: goal_active(session),
            can_inherit: can_inherit(session),
            collapsed: session.collapsed(),
            victory: session.victory(),
            steps: session.input_log().len(),
        }
    }
}
