//! Reference grid world: agents fetch boxes and carry them to drop-off cells.

use std::fmt;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::infra::{Action, Position, Simulator, StepInfo, StepOutcome};

use super::map::{
    BOX, BOX_ON_DROP_OFF, CellCode, DROP_OFF, FLOOR, Map, WALL, agent_codes, agent_of,
    is_on_drop_off,
};
use super::snapshot::GridSnapshot;

/// Level generation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseLayout {
    /// Number of agents
    pub agents: usize,
    /// Box clusters per side; each cluster is a 2x2 block of boxes
    pub blocks: usize,
    /// Free cells between the border wall and the first cluster
    pub wall_offset: usize,
    /// Free cells between neighbouring clusters
    pub box_offset: usize,
    /// Episode is truncated at this tick
    pub max_steps: u32,
}

impl Default for WarehouseLayout {
    fn default() -> Self {
        Self {
            agents: 4,
            blocks: 2,
            wall_offset: 1,
            box_offset: 1,
            max_steps: 200,
        }
    }
}

impl WarehouseLayout {
    /// Side length of the square level.
    pub fn dimension(&self) -> i32 {
        let inner = 2 * self.wall_offset + self.blocks.saturating_sub(1) * self.box_offset;
        (2 + inner + 2 * self.blocks) as i32
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.agents == 0 {
            return Err(LayoutError::NoAgents);
        }
        if self.blocks == 0 {
            return Err(LayoutError::NoBoxes);
        }
        let floor = build_floor(self);
        if !floor.iter().any(|(_, code)| code == DROP_OFF) {
            return Err(LayoutError::NoDropOff);
        }
        let capacity = start_cells(&floor).len();
        if self.agents > capacity {
            return Err(LayoutError::TooManyAgents {
                agents: self.agents,
                capacity,
            });
        }
        Ok(())
    }
}

/// Reward shaping of a single step.
///
/// A collision-free step never costs more than `step_cost + progress_reward`
/// per agent, while a single collision costs `collision_penalty` per agent in
/// the world. The defaults keep one collision below any clean step even when
/// every other agent delivers at the same time.
#[derive(Debug, Clone, PartialEq)]
pub struct WarehouseRewards {
    /// Charged for every agent that does not stay
    pub step_cost: f32,
    /// Paid per cell an agent moves closer to its target, charged per cell it moves away
    pub progress_reward: f32,
    /// Charged for every colliding pair, once per agent in the world
    pub collision_penalty: f32,
    /// Paid when an agent picks up its box
    pub pickup_reward: f32,
    /// Paid when an agent drops its box off
    pub delivery_reward: f32,
}

impl Default for WarehouseRewards {
    fn default() -> Self {
        Self {
            step_cost: 1.0,
            progress_reward: 2.0,
            collision_penalty: 200.0,
            pickup_reward: 10.0,
            delivery_reward: 100.0,
        }
    }
}

impl WarehouseRewards {
    /// Penalty for one colliding pair among `agents` agents.
    pub fn collision_cost(&self, agents: usize) -> f32 {
        self.collision_penalty * agents as f32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    NoAgents,
    NoBoxes,
    NoDropOff,
    TooManyAgents { agents: usize, capacity: usize },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LayoutError::NoAgents => write!(formatter, "layout needs at least one agent"),
            LayoutError::NoBoxes => write!(formatter, "layout needs at least one box cluster"),
            LayoutError::NoDropOff => write!(formatter, "layout leaves no room for a drop-off"),
            LayoutError::TooManyAgents { agents, capacity } => write!(
                formatter,
                "{} agents requested but only {} start cells available",
                agents, capacity
            ),
        }
    }
}

impl std::error::Error for LayoutError {}

/// Multi-agent warehouse world.
///
/// The static layer (`floor`) holds walls, floor, drop-offs and boxes not yet
/// picked up; agents are overlaid when a snapshot is taken. An agent whose target
/// is a drop-off cell is carrying its box.
#[derive(Debug, Clone)]
pub struct Warehouse {
    layout: WarehouseLayout,
    rewards: WarehouseRewards,
    rng: StdRng,
    floor: Map,
    positions: Vec<Position>,
    targets: Vec<Option<Position>>,
    tick: u32,
}

impl Warehouse {
    pub fn new(
        layout: WarehouseLayout,
        rewards: WarehouseRewards,
        seed: Option<u64>,
    ) -> Result<Self, LayoutError> {
        layout.validate()?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut warehouse = Self {
            layout,
            rewards,
            rng,
            floor: Map::new(0, 0),
            positions: Vec::new(),
            targets: Vec::new(),
            tick: 0,
        };
        warehouse.generate();
        Ok(warehouse)
    }

    /// Warehouse positioned at `snapshot`, for replaying hand-made situations.
    pub fn from_snapshot(snapshot: &GridSnapshot, rewards: WarehouseRewards, max_steps: u32) -> Self {
        let layout = WarehouseLayout {
            agents: snapshot.num_agents(),
            max_steps,
            ..WarehouseLayout::default()
        };
        let mut warehouse = Self {
            layout,
            rewards,
            rng: StdRng::seed_from_u64(0),
            floor: Map::new(0, 0),
            positions: Vec::new(),
            targets: Vec::new(),
            tick: 0,
        };
        warehouse.restore(snapshot);
        warehouse
    }

    pub fn boxes_left(&self) -> usize {
        self.floor.iter().filter(|&(_, code)| code == BOX).count()
    }

    pub fn is_carrying(&self, agent: usize) -> bool {
        self.targets
            .get(agent)
            .copied()
            .flatten()
            .is_some_and(|target| self.floor.get(&target) == Some(DROP_OFF))
    }

    pub fn observe(&self) -> GridSnapshot {
        let mut map = self.floor.clone();
        for (agent, pos) in self.positions.iter().enumerate() {
            let (off_target, on_target) = agent_codes(agent);
            let code = if self.floor.get(pos) == Some(DROP_OFF) {
                on_target
            } else {
                off_target
            };
            map.set(*pos, code);
        }
        GridSnapshot::new(map, self.targets.clone(), self.tick)
    }

    fn generate(&mut self) {
        let floor = build_floor(&self.layout);
        let mut starts = start_cells(&floor);
        starts.shuffle(&mut self.rng);
        starts.truncate(self.layout.agents);

        self.floor = floor;
        self.positions = starts;
        self.targets = vec![None; self.positions.len()];
        self.tick = 0;
        self.assign_idle_agents();

        tracing::debug!(
            dimension = self.layout.dimension(),
            agents = self.positions.len(),
            boxes = self.boxes_left(),
            "Generated warehouse level"
        );
    }

    fn restore(&mut self, snapshot: &GridSnapshot) {
        let map = &snapshot.map;
        let mut floor = map.clone();
        let mut found: Vec<Option<Position>> = vec![None; snapshot.num_agents()];

        for (pos, code) in map.iter() {
            match agent_of(code) {
                Some(agent) => {
                    floor.set(pos, if is_on_drop_off(code) { DROP_OFF } else { FLOOR });
                    if let Some(slot) = found.get_mut(agent) {
                        *slot = Some(pos);
                    }
                }
                None if code == BOX_ON_DROP_OFF => {
                    floor.set(pos, BOX);
                }
                None => {}
            }
        }

        self.positions = found
            .into_iter()
            .enumerate()
            .map(|(agent, pos)| {
                pos.unwrap_or_else(|| {
                    tracing::warn!(agent, "Agent missing from snapshot, parking it off the map");
                    Position::new(-1, -1)
                })
            })
            .collect();
        self.floor = floor;
        self.targets = snapshot.targets.clone();
        self.tick = snapshot.tick;
    }

    fn can_enter(&self, agent: usize, pos: Position) -> bool {
        match self.floor.get(&pos) {
            Some(FLOOR | DROP_OFF) => true,
            Some(BOX) => self.targets[agent] == Some(pos),
            _ => false,
        }
    }

    fn nearest(&self, from: Position, code: CellCode, exclude: &[Option<Position>]) -> Option<Position> {
        let mut best: Option<(i32, Position)> = None;
        for (pos, cell) in self.floor.iter() {
            if cell != code || exclude.contains(&Some(pos)) {
                continue;
            }
            let distance = from.distance(&pos);
            if best.is_none_or(|(best_distance, _)| distance < best_distance) {
                best = Some((distance, pos));
            }
        }
        best.map(|(_, pos)| pos)
    }

    /// Targets and cells of every agent but `agent`.
    fn taken_by_others(&self, agent: usize) -> Vec<Option<Position>> {
        let others = (0..self.positions.len()).filter(|&other| other != agent);
        others
            .clone()
            .map(|other| self.targets[other])
            .chain(others.map(|other| Some(self.positions[other])))
            .collect()
    }

    /// Nearest drop-off nobody else stands on or heads for; the nearest one
    /// overall when they are all taken.
    fn free_drop_off(&self, agent: usize) -> Option<Position> {
        let from = self.positions[agent];
        let taken = self.taken_by_others(agent);
        self.nearest(from, DROP_OFF, &taken)
            .or_else(|| self.nearest(from, DROP_OFF, &[]))
    }

    /// Gives every agent without a target the nearest unclaimed box. Agents left
    /// without work on a drop-off are sent to the nearest free floor cell.
    fn assign_idle_agents(&mut self) {
        for agent in 0..self.positions.len() {
            if self.targets[agent].is_some() {
                continue;
            }
            let claimed = self.targets.clone();
            self.targets[agent] = self.nearest(self.positions[agent], BOX, &claimed);
            if let Some(target) = self.targets[agent] {
                tracing::trace!(agent, ?target, "Assigned box");
                continue;
            }

            let pos = self.positions[agent];
            if self.floor.get(&pos) == Some(DROP_OFF) {
                self.targets[agent] = self.nearest(pos, FLOOR, &self.taken_by_others(agent));
                tracing::trace!(agent, target = ?self.targets[agent], "Clearing drop-off");
            }
        }
    }

    /// Where every agent ends up once conflicting moves are held back.
    /// Returns the final positions and the number of colliding pairs.
    fn resolve_moves(&self, intended: &[Position]) -> (Vec<Position>, usize) {
        let current = &self.positions;
        let n = current.len();
        let mut resolved = intended.to_vec();
        let mut collisions = 0;

        for i in 0..n {
            for j in (i + 1)..n {
                let same_cell = intended[i] == intended[j];
                let swap = intended[i] == current[j]
                    && intended[j] == current[i]
                    && intended[i] != current[i];
                if same_cell || swap {
                    collisions += 1;
                    resolved[i] = current[i];
                    resolved[j] = current[j];
                }
            }
        }

        // movers blocked by an agent that ended up staying
        loop {
            let mut changed = false;
            for i in 0..n {
                if resolved[i] == current[i] {
                    continue;
                }
                if (0..n).any(|j| j != i && resolved[j] == resolved[i]) {
                    resolved[i] = current[i];
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        (resolved, collisions)
    }
}

impl Simulator for Warehouse {
    fn num_agents(&self) -> usize {
        self.positions.len()
    }

    fn reset(&mut self, snapshot: Option<&GridSnapshot>) -> GridSnapshot {
        match snapshot {
            Some(snapshot) => self.restore(snapshot),
            None => self.generate(),
        }
        self.observe()
    }

    fn step(&mut self, actions: &[Action]) -> StepOutcome {
        let n = self.positions.len();
        let mut reward = 0.0;
        let mut info = StepInfo::default();

        let intended: Vec<Position> = (0..n)
            .map(|agent| {
                let action = actions.get(agent).copied().unwrap_or_default();
                if action != Action::Stay {
                    reward -= self.rewards.step_cost;
                }
                let destination = self.positions[agent].apply(action);
                if self.can_enter(agent, destination) {
                    destination
                } else {
                    self.positions[agent]
                }
            })
            .collect();

        let (resolved, collisions) = self.resolve_moves(&intended);
        info.collisions = collisions;
        reward -= self.rewards.collision_cost(n) * collisions as f32;
        let previous = std::mem::replace(&mut self.positions, resolved);

        for (agent, target) in self.targets.iter().enumerate() {
            if let Some(target) = target {
                let progress = previous[agent].distance(target) - self.positions[agent].distance(target);
                reward += self.rewards.progress_reward * progress as f32;
            }
        }

        for agent in 0..n {
            let pos = self.positions[agent];
            if self.targets[agent] != Some(pos) {
                continue;
            }
            match self.floor.get(&pos) {
                Some(BOX) => {
                    self.floor.set(pos, FLOOR);
                    self.targets[agent] = self.free_drop_off(agent);
                    reward += self.rewards.pickup_reward;
                    info.pickups += 1;
                    tracing::trace!(agent, ?pos, "Picked up box");
                }
                Some(DROP_OFF) => {
                    self.targets[agent] = None;
                    reward += self.rewards.delivery_reward;
                    info.deliveries += 1;
                    tracing::trace!(agent, ?pos, "Delivered box");
                }
                _ => {
                    self.targets[agent] = None;
                }
            }
        }
        self.assign_idle_agents();

        self.tick += 1;
        info.tick = self.tick;
        info.completed = self.boxes_left() == 0 && (0..n).all(|agent| !self.is_carrying(agent));
        info.truncated = !info.completed && self.tick >= self.layout.max_steps;

        StepOutcome {
            snapshot: self.observe(),
            reward,
            done: info.completed || info.truncated,
            info,
        }
    }

    fn render(&self) -> Option<String> {
        Some(self.observe().map.draw_ascii_map())
    }
}

fn build_floor(layout: &WarehouseLayout) -> Map {
    let dim = layout.dimension();
    let mut floor = Map::filled(dim, dim, FLOOR);

    for i in 0..dim {
        floor.set(Position::new(i, 0), WALL);
        floor.set(Position::new(i, dim - 1), WALL);
        floor.set(Position::new(0, i), WALL);
        floor.set(Position::new(dim - 1, i), WALL);
    }

    let stride = 2 + layout.box_offset as i32;
    let first = 1 + layout.wall_offset as i32;
    for block_row in 0..layout.blocks as i32 {
        for block_col in 0..layout.blocks as i32 {
            let y = first + block_row * stride;
            let x = first + block_col * stride;
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                floor.set(Position::new(x + dx, y + dy), BOX);
            }
        }
    }

    let drop_row = dim - 2;
    for x in (1..dim - 1).step_by(2) {
        let pos = Position::new(x, drop_row);
        if floor.get(&pos) == Some(FLOOR) {
            floor.set(pos, DROP_OFF);
        }
    }

    floor
}

/// Free cells of the first two interior rows, where agents are spawned.
fn start_cells(floor: &Map) -> Vec<Position> {
    floor
        .iter()
        .filter(|&(pos, code)| code == FLOOR && (pos.y == 1 || pos.y == 2))
        .map(|(pos, _)| pos)
        .collect()
}
