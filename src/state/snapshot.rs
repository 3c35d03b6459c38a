use crate::infra::Position;

use super::map::Map;

/// Full observable state of the grid world at one tick.
///
/// A snapshot is a plain value: it is cloned whenever a hypothesis is explored so
/// the canonical state is never touched, and it carries enough information for a
/// simulator to replay deterministically from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSnapshot {
    pub map: Map,
    /// Current target of every agent; `None` once the agent has nothing left to do.
    pub targets: Vec<Option<Position>>,
    pub tick: u32,
}

impl GridSnapshot {
    pub fn new(map: Map, targets: Vec<Option<Position>>, tick: u32) -> Self {
        Self { map, targets, tick }
    }

    pub fn num_agents(&self) -> usize {
        self.targets.len()
    }

    pub fn target(&self, agent: usize) -> Option<Position> {
        self.targets.get(agent).copied().flatten()
    }

    pub fn agent_position(&self, agent: usize) -> Option<Position> {
        self.map.find_agent(agent)
    }
}
