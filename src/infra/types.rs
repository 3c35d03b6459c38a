#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn neighbors(&self) -> [Position; 4] {
        [
            Position::new(self.x, self.y - 1), // North
            Position::new(self.x, self.y + 1), // South
            Position::new(self.x - 1, self.y), // West
            Position::new(self.x + 1, self.y), // East
        ]
    }

    pub fn diagonal_neighbors(&self) -> [Position; 4] {
        [
            Position::new(self.x - 1, self.y - 1),
            Position::new(self.x + 1, self.y - 1),
            Position::new(self.x - 1, self.y + 1),
            Position::new(self.x + 1, self.y + 1),
        ]
    }

    pub fn is_adjacent(&self, other: &Position) -> bool {
        self.distance(other) == 1
    }

    /// Position reached by applying `action` from here, ignoring walls and bounds.
    pub fn apply(&self, action: Action) -> Position {
        let (dx, dy) = action.delta();
        Position::new(self.x + dx, self.y + dy)
    }
}

/// One discrete move of a single agent. The discriminant is the wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Action {
    #[default]
    Stay = 0,
    Up = 1,
    Down = 2,
    Left = 3,
    Right = 4,
}

impl Action {
    pub const COUNT: usize = 5;

    pub const ALL: [Action; Action::COUNT] =
        [Action::Stay, Action::Up, Action::Down, Action::Left, Action::Right];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Action> {
        Action::ALL.get(code as usize).copied()
    }

    /// (dx, dy) of the move; up decreases the row.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Action::Stay => (0, 0),
            Action::Up => (0, -1),
            Action::Down => (0, 1),
            Action::Left => (-1, 0),
            Action::Right => (1, 0),
        }
    }

    /// Inverse of [`Action::delta`]. Diagonal and long deltas have no action.
    pub fn from_delta(dx: i32, dy: i32) -> Option<Action> {
        match (dx, dy) {
            (0, 0) => Some(Action::Stay),
            (0, -1) => Some(Action::Up),
            (0, 1) => Some(Action::Down),
            (-1, 0) => Some(Action::Left),
            (1, 0) => Some(Action::Right),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_codes_are_stable() {
        for (index, action) in Action::ALL.iter().enumerate() {
            assert_eq!(action.code() as usize, index);
            assert_eq!(Action::from_code(index as u8), Some(*action));
        }
        assert_eq!(Action::from_code(5), None);
    }

    #[test]
    fn test_delta_mapping() {
        let origin = Position::new(2, 2);
        assert_eq!(origin.apply(Action::Up), Position::new(2, 1));
        assert_eq!(origin.apply(Action::Down), Position::new(2, 3));
        assert_eq!(origin.apply(Action::Left), Position::new(1, 2));
        assert_eq!(origin.apply(Action::Right), Position::new(3, 2));
        assert_eq!(origin.apply(Action::Stay), origin);
        assert_eq!(Action::from_delta(1, 1), None);
    }
}
