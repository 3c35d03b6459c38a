mod map;
mod snapshot;
mod warehouse;

pub use map::{
    BOX, BOX_ON_DROP_OFF, CellCode, DROP_OFF, FIRST_AGENT, FLOOR, Map, ParseError, WALL,
    agent_codes, agent_of, is_on_drop_off,
};
pub use snapshot::GridSnapshot;
pub use warehouse::{LayoutError, Warehouse, WarehouseLayout, WarehouseRewards};
