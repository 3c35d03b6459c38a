pub mod infra;
pub mod planners;
pub mod state;

// Re-export commonly used types for convenience
pub use infra::{AStar, Action, Position, Simulator};
pub use state::{GridSnapshot, Map};
