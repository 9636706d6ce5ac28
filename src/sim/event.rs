/// Events emitted while the session applies one intent.
/// The presentation layer consumes these for the message line and sound.

use crate::domain::entity::{EntityId, Intent};
use crate::domain::terrain::{Dir, Pos};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameEvent {
    Moved { to: Pos },
    Turned { dir: Dir },
    Pushed { id: EntityId, to: Pos },
    PickedUp { id: EntityId },
    Dropped { id: EntityId, at: Pos },
    /// A shadowed box collapsed onto one cell.
    Converged { id: EntityId, at: Pos },
    HoleFilled { at: Pos },
    Branched,
    Merged,
    Inherited,
    FocusSwitched,
    Fell,
    Victory,
    Undone,
    Reset,
    Rejected { intent: Intent },
}
