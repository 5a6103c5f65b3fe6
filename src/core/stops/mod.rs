//! Active destination and recently used stops.
//!
//! Handles remembering where the user is going between runs.

pub mod model;
pub mod store;

pub use model::{RecentStop, RecentStops, MAX_RECENT_STOPS};
pub use store::{DestinationStore, JsonDestinationStore, MemoryDestinationStore};
