//! State module for tracking per-URL fetch progress
//!
//! # Components
//!
//! - `ItemState`: The state machine each URL moves through (pending, in flight, backoff, terminal)
//! - `WorkItem`: A URL plus its attempt count and current state

mod item_state;
mod work_item;

// Re-export main types
pub use item_state::ItemState;
pub use work_item::WorkItem;
