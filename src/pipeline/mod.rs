//! Subcommand drivers wiring the layers together.

pub mod compare;
pub mod discover;
pub mod index;
pub mod map;

pub use compare::run_compare;
pub use discover::{run_discover, DiscoverParams};
pub use index::run_index;
pub use map::{run_map, MapParams};
