/// Entities: the player and boxes, plus the discrete intents that drive them.
///
/// An entity id names a conceptual object across every timeline. Within one
/// branch several instances may share an id at different positions; that id
/// is then in *shadow* until something converges it.

use super::terrain::{Dir, Pos};

pub type EntityId = u32;

/// The player's id. Boxes get 1.. at parse time.
pub const PLAYER_ID: EntityId = 0;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EntityKind {
    Player,
    Box,
}

/// Vertical layer an entity occupies.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Layer {
    /// Inside a filled hole; excluded from collision stacking.
    Buried,
    Ground,
    /// Carried by the player.
    Held,
}

impl Layer {
    /// Merge priority: Held > Ground > Buried.
    #[inline]
    pub fn priority(self) -> u8 {
        match self {
            Layer::Buried => 0,
            Layer::Ground => 1,
            Layer::Held => 2,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub pos: Pos,
    /// Contribution to occupancy at `pos`.
    pub collision: i32,
    /// Contribution to switch weight at `pos`.
    pub weight: i32,
    pub layer: Layer,
    pub holder: Option<EntityId>,
    /// Only meaningful for the player.
    pub facing: Dir,
}

impl Entity {
    pub fn player(pos: Pos) -> Self {
        Entity {
            id: PLAYER_ID,
            kind: EntityKind::Player,
            pos,
            collision: 1,
            weight: 1,
            layer: Layer::Ground,
            holder: None,
            facing: Dir::default(),
        }
    }

    pub fn crate_box(id: EntityId, pos: Pos) -> Self {
        Entity {
            id,
            kind: EntityKind::Box,
            pos,
            collision: 1,
            weight: 1,
            layer: Layer::Ground,
            holder: None,
            facing: Dir::default(),
        }
    }

    pub fn is_player(&self) -> bool {
        self.kind == EntityKind::Player
    }

    pub fn is_box(&self) -> bool {
        self.kind == EntityKind::Box
    }

    pub fn is_held(&self) -> bool {
        self.layer == Layer::Held
    }

    pub fn is_grounded(&self) -> bool {
        self.layer == Layer::Ground
    }

    pub fn is_buried(&self) -> bool {
        self.layer == Layer::Buried
    }

    /// Put into the player's hands at `at`.
    pub fn grab(&mut self, at: Pos) {
        self.layer = Layer::Held;
        self.holder = Some(PLAYER_ID);
        self.collision = 0;
        self.pos = at;
    }

    /// Set down on the floor at `at`.
    pub fn release(&mut self, at: Pos) {
        self.layer = Layer::Ground;
        self.holder = None;
        self.collision = 1;
        self.pos = at;
    }
}

/// Discrete player intents. No continuous input crosses into the core.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Intent {
    Move(Dir),
    Pickup,
    Drop,
    /// Context-sensitive: drop if holding, converge a faced shadow, else pick up.
    Adaptive,
    Branch,
    Merge,
    InheritMerge,
    SwitchFocus,
    Undo,
    Reset,
}

impl Intent {
    /// One-character code used by the input log and save files.
    pub fn code(self) -> char {
        match self {
            Intent::Move(Dir::Up) => 'U',
            Intent::Move(Dir::Down) => 'D',
            Intent::Move(Dir::Left) => 'L',
            Intent::Move(Dir::Right) => 'R',
            Intent::Pickup => 'P',
            Intent::Drop => 'O',
            Intent::Adaptive => 'X',
            Intent::Branch => 'V',
            Intent::Merge => 'C',
            Intent::InheritMerge => 'I',
            Intent::SwitchFocus => 'T',
            Intent::Undo => 'Z',
            Intent::Reset => '!',
        }
    }

    pub fn from_code(ch: char) -> Option<Intent> {
        Some(match ch {
            'U' => Intent::Move(Dir::Up),
            'D' => Intent::Move(Dir::Down),
            'L' => Intent::Move(Dir::Left),
            'R' => Intent::Move(Dir::Right),
            'P' => Intent::Pickup,
            'O' => Intent::Drop,
            'X' => Intent::Adaptive,
            'V' => Intent::Branch,
            'C' => Intent::Merge,
            'I' => Intent::InheritMerge,
            'T' => Intent::SwitchFocus,
            'Z' => Intent::Undo,
            '!' => Intent::Reset,
            _ => return None,
        })
    }
}
