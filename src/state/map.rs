use std::fmt;

use crate::infra::Position;

/// Raw integer code of one grid cell.
pub type CellCode = i32;

pub const WALL: CellCode = 0;
pub const FLOOR: CellCode = 1;
pub const DROP_OFF: CellCode = 2;
pub const BOX_ON_DROP_OFF: CellCode = 3;
pub const BOX: CellCode = 4;
pub const FIRST_AGENT: CellCode = 5;

/// Codes of agent `agent`: (standing on floor, standing on a drop-off).
pub fn agent_codes(agent: usize) -> (CellCode, CellCode) {
    let off_target = FIRST_AGENT + 2 * agent as CellCode;
    (off_target, off_target + 1)
}

/// Agent id encoded by `code`, if it is an agent code.
pub fn agent_of(code: CellCode) -> Option<usize> {
    if code >= FIRST_AGENT {
        Some(((code - FIRST_AGENT) / 2) as usize)
    } else {
        None
    }
}

/// Whether an agent code marks the agent as standing on a drop-off.
pub fn is_on_drop_off(code: CellCode) -> bool {
    code >= FIRST_AGENT && (code - FIRST_AGENT) % 2 == 1
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    EmptyMap,
    RaggedRow { row: usize, expected: usize, found: usize },
    UnknownGlyph { glyph: char, row: usize, col: usize },
}

impl fmt::Display for ParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::EmptyMap => write!(formatter, "map has no rows"),
            ParseError::RaggedRow { row, expected, found } => write!(
                formatter,
                "row {} has {} cells, expected {}",
                row, found, expected
            ),
            ParseError::UnknownGlyph { glyph, row, col } => {
                write!(formatter, "unknown glyph '{}' at row {}, col {}", glyph, row, col)
            }
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Map {
    pub width: i32,
    pub height: i32,
    cells: Vec<CellCode>,
}

impl Map {
    pub fn new(width: i32, height: i32) -> Self {
        Self::filled(width, height, FLOOR)
    }

    pub fn filled(width: i32, height: i32, code: CellCode) -> Self {
        let len = (width.max(0) * height.max(0)) as usize;
        Self {
            width,
            height,
            cells: vec![code; len],
        }
    }

    /// Builds a map from row-major codes. Returns `None` when the length does not match.
    pub fn from_cells(width: i32, height: i32, cells: Vec<CellCode>) -> Option<Self> {
        if width < 0 || height < 0 || cells.len() != (width * height) as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            cells,
        })
    }

    /// Parses an ASCII drawing, one line per row:
    /// `#` wall, `.` floor, `D` drop-off, `*` box on drop-off, `$` box,
    /// `0`-`9` agent on floor, `a`-`j` agent on a drop-off.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let rows: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let Some(first) = rows.first() else {
            return Err(ParseError::EmptyMap);
        };
        let width = first.chars().count();

        let mut cells = Vec::with_capacity(width * rows.len());
        for (row, line) in rows.iter().enumerate() {
            let found = line.chars().count();
            if found != width {
                return Err(ParseError::RaggedRow {
                    row,
                    expected: width,
                    found,
                });
            }
            for (col, glyph) in line.chars().enumerate() {
                let code = match glyph {
                    '#' => WALL,
                    '.' => FLOOR,
                    'D' => DROP_OFF,
                    '*' => BOX_ON_DROP_OFF,
                    '$' => BOX,
                    '0'..='9' => agent_codes(glyph as usize - '0' as usize).0,
                    'a'..='j' => agent_codes(glyph as usize - 'a' as usize).1,
                    _ => return Err(ParseError::UnknownGlyph { glyph, row, col }),
                };
                cells.push(code);
            }
        }

        Ok(Self {
            width: width as i32,
            height: rows.len() as i32,
            cells,
        })
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

    pub fn get(&self, pos: &Position) -> Option<CellCode> {
        self.index(pos).map(|index| self.cells[index])
    }

    /// Overwrites a cell, returning the previous code. Out-of-bounds writes are ignored.
    pub fn set(&mut self, pos: Position, code: CellCode) -> Option<CellCode> {
        let index = self.index(&pos)?;
        Some(std::mem::replace(&mut self.cells[index], code))
    }

    pub fn cells(&self) -> &[CellCode] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Row-major iteration over every cell.
    pub fn iter(&self) -> impl Iterator<Item = (Position, CellCode)> + '_ {
        let width = self.width.max(1);
        self.cells.iter().enumerate().map(move |(index, &code)| {
            let index = index as i32;
            (Position::new(index % width, index / width), code)
        })
    }

    /// Current cell of `agent`, found by scanning for either of its codes.
    pub fn find_agent(&self, agent: usize) -> Option<Position> {
        let (off_target, on_target) = agent_codes(agent);
        self.iter()
            .find(|&(_, code)| code == off_target || code == on_target)
            .map(|(pos, _)| pos)
    }

    pub fn draw_ascii_map(&self) -> String {
        let mut out = String::with_capacity(self.cells.len() + self.height.max(0) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let code = self.get(&Position::new(x, y)).unwrap_or(WALL);
                out.push(glyph_for(code));
            }
            out.push('\n');
        }
        out
    }
}

fn glyph_for(code: CellCode) -> char {
    match code {
        WALL => '#',
        FLOOR => '.',
        DROP_OFF => 'D',
        BOX_ON_DROP_OFF => '*',
        BOX => '$',
        _ => match agent_of(code) {
            Some(agent) if agent < 10 && is_on_drop_off(code) => (b'a' + agent as u8) as char,
            Some(agent) if agent < 10 => (b'0' + agent as u8) as char,
            _ => '?',
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_codes_round_trip() {
        for agent in 0..8 {
            let (off, on) = agent_codes(agent);
            assert_eq!(agent_of(off), Some(agent));
            assert_eq!(agent_of(on), Some(agent));
            assert!(!is_on_drop_off(off));
            assert!(is_on_drop_off(on));
        }
        assert_eq!(agent_of(BOX), None);
    }

    #[test]
    fn test_parse_and_draw() {
        let text = "#####\n#0.D#\n#$a.#\n#####\n";
        let map = Map::parse(text).unwrap();
        assert_eq!(map.width, 5);
        assert_eq!(map.height, 4);
        assert_eq!(map.get(&Position::new(1, 1)), Some(agent_codes(0).0));
        assert_eq!(map.get(&Position::new(2, 2)), Some(agent_codes(0).1));
        assert_eq!(map.get(&Position::new(3, 1)), Some(DROP_OFF));
        assert_eq!(map.get(&Position::new(1, 2)), Some(BOX));
        assert_eq!(map.draw_ascii_map(), text);
    }

    #[test]
    fn test_parse_rejects_ragged_rows() {
        let result = Map::parse("###\n##\n");
        assert_eq!(
            result,
            Err(ParseError::RaggedRow {
                row: 1,
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_find_agent_and_bounds() {
        let map = Map::parse("...\n.1.\n...").unwrap();
        assert_eq!(map.find_agent(1), Some(Position::new(1, 1)));
        assert_eq!(map.find_agent(0), None);
        assert_eq!(map.get(&Position::new(-1, 0)), None);
        assert_eq!(map.get(&Position::new(3, 0)), None);
    }
}
