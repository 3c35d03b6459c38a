use crate::infra::Position;
use crate::state::{BOX, BOX_ON_DROP_OFF, CellCode, Map, WALL};

pub const WALKABLE: u8 = 0;
pub const BLOCKED: u8 = 1;

/// Binary walkability grid derived from a [`Map`] for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyMap {
    pub width: i32,
    pub height: i32,
    cells: Vec<u8>,
}

impl OccupancyMap {
    /// Builds a map directly from row-major 0/1 cells. Any non-zero value counts as blocked.
    pub fn from_cells(width: i32, height: i32, cells: Vec<u8>) -> Option<Self> {
        if width < 0 || height < 0 || cells.len() != (width * height) as usize {
            return None;
        }
        let cells = cells
            .into_iter()
            .map(|cell| if cell == WALKABLE { WALKABLE } else { BLOCKED })
            .collect();
        Some(Self {
            width,
            height,
            cells,
        })
    }

    pub fn open(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            cells: vec![WALKABLE; (width.max(0) * height.max(0)) as usize],
        }
    }

    pub fn contains(&self, pos: &Position) -> bool {
        pos.x >= 0 && pos.x < self.width && pos.y >= 0 && pos.y < self.height
    }

    fn index(&self, pos: &Position) -> Option<usize> {
        if self.contains(pos) {
            Some((pos.y * self.width + pos.x) as usize)
        } else {
            None
        }
    }

    pub fn get(&self, pos: &Position) -> Option<u8> {
        self.index(pos).map(|index| self.cells[index])
    }

    /// In bounds and not blocked.
    pub fn is_walkable(&self, pos: &Position) -> bool {
        self.get(pos) == Some(WALKABLE)
    }

    pub fn set(&mut self, pos: Position, value: u8) {
        if let Some(index) = self.index(&pos) {
            self.cells[index] = if value == WALKABLE { WALKABLE } else { BLOCKED };
        }
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }
}

fn occupancy_of(code: CellCode) -> u8 {
    match code {
        WALL | BOX | BOX_ON_DROP_OFF => BLOCKED,
        // floor, drop-off and every agent code
        _ => WALKABLE,
    }
}

/// Walkability of `map` as seen by an agent heading for `target`.
///
/// Floor, drop-offs and agents are walkable; walls and boxes are blocked. The
/// target itself is always walkable, so an occupied target can still be planned to.
pub fn preprocess(map: &Map, target: Position) -> OccupancyMap {
    let mut occupancy = OccupancyMap {
        width: map.width,
        height: map.height,
        cells: map.cells().iter().map(|&code| occupancy_of(code)).collect(),
    };
    occupancy.set(target, WALKABLE);
    occupancy
}
