/// Grid coordinates, directions and terrain.
/// Terrain semantics are queried via methods, not stored as flags,
/// so the meaning of each cell kind is centralized here.

/// A grid cell. Signed so that "one step past the edge" is representable;
/// bounds are checked by the owning map, never by the arithmetic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Pos {
    pub x: i32,
    pub y: i32,
}

impl Pos {
    pub const fn new(x: i32, y: i32) -> Self {
        Pos { x, y }
    }

    /// The neighbouring cell one step in `dir`.
    #[inline]
    pub fn step(self, dir: Dir) -> Pos {
        let (dx, dy) = dir.delta();
        Pos { x: self.x + dx, y: self.y + dy }
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Cardinal direction. Screen coordinates: y grows downwards.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Dir {
    Up,
    Down,
    Left,
    Right,
}

impl Dir {
    pub const ALL: [Dir; 4] = [Dir::Up, Dir::Down, Dir::Left, Dir::Right];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Dir::Up => (0, -1),
            Dir::Down => (0, 1),
            Dir::Left => (-1, 0),
            Dir::Right => (1, 0),
        }
    }
}

impl Default for Dir {
    /// A freshly spawned player faces down (towards the viewer).
    fn default() -> Self {
        Dir::Down
    }
}

/// Terrain kinds. Immutable after level load, except for the
/// branch-point use counter which is spent by divergence.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Terrain {
    Floor,
    Wall,
    Switch,
    /// Weight-limited floor (capacity 1 or 2).
    WeightLimit(u8),
    /// Floor on which nothing may be picked up.
    NoCarry,
    /// Divergence point with 1..=4 uses remaining.
    BranchPoint(u8),
    Goal,
    Hole,
}

impl Terrain {
    pub fn is_wall(self) -> bool {
        matches!(self, Terrain::Wall)
    }

    pub fn is_hole(self) -> bool {
        matches!(self, Terrain::Hole)
    }

    pub fn is_branch_point(self) -> bool {
        matches!(self, Terrain::BranchPoint(n) if n > 0)
    }

    /// Terrain after one divergence has been spent here.
    /// 4 → 3 → 2 → 1 → Floor. Anything else is unchanged.
    pub fn spend_branch_use(self) -> Terrain {
        match self {
            Terrain::BranchPoint(n) if n > 1 => Terrain::BranchPoint(n - 1),
            Terrain::BranchPoint(_) => Terrain::Floor,
            other => other,
        }
    }

    /// Map symbol for the floor layer.
    pub fn from_symbol(ch: char) -> Option<Terrain> {
        Some(match ch {
            '.' => Terrain::Floor,
            '#' | ' ' => Terrain::Wall,
            'S' => Terrain::Switch,
            'w' => Terrain::WeightLimit(1),
            'W' => Terrain::WeightLimit(2),
            'N' => Terrain::NoCarry,
            'v' => Terrain::BranchPoint(1),
            'V' => Terrain::BranchPoint(2),
            'x' => Terrain::BranchPoint(3),
            'X' => Terrain::BranchPoint(4),
            'G' => Terrain::Goal,
            'H' => Terrain::Hole,
            _ => return None,
        })
    }

    pub fn symbol(self) -> char {
        match self {
            Terrain::Floor => '.',
            Terrain::Wall => '#',
            Terrain::Switch => 'S',
            Terrain::WeightLimit(1) => 'w',
            Terrain::WeightLimit(_) => 'W',
            Terrain::NoCarry => 'N',
            Terrain::BranchPoint(1) => 'v',
            Terrain::BranchPoint(2) => 'V',
            Terrain::BranchPoint(3) => 'x',
            Terrain::BranchPoint(_) => 'X',
            Terrain::Goal => 'G',
            Terrain::Hole => 'H',
        }
    }
}

impl Default for Terrain {
    fn default() -> Self {
        Terrain::Floor
    }
}

/// Square terrain grid. `cells[y][x]`; cells never set stay Floor.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TerrainMap {
    size: usize,
    cells: Vec<Vec<Terrain>>,
}

impl TerrainMap {
    pub fn new(size: usize) -> Self {
        TerrainMap { size, cells: vec![vec![Terrain::Floor; size]; size] }
    }

    #[inline]
    pub fn in_bounds(&self, pos: Pos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.size && (pos.y as usize) < self.size
    }

    /// Terrain at `pos`. Out of bounds reads as Wall.
    #[inline]
    pub fn get(&self, pos: Pos) -> Terrain {
        if self.in_bounds(pos) {
            self.cells[pos.y as usize][pos.x as usize]
        } else {
            Terrain::Wall
        }
    }

    /// Set a cell. Writes outside the grid are ignored.
    pub fn set(&mut self, pos: Pos, terrain: Terrain) {
        if self.in_bounds(pos) {
            self.cells[pos.y as usize][pos.x as usize] = terrain;
        }
    }

    /// All cells with their positions, row-major.
    pub fn iter(&self) -> impl Iterator<Item = (Pos, Terrain)> + '_ {
        self.cells.iter().enumerate().flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .map(move |(x, t)| (Pos::new(x as i32, y as i32), *t))
        })
    }

    pub fn contains(&self, kind: Terrain) -> bool {
        self.iter().any(|(_, t)| t == kind)
    }
}
