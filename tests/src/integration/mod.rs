//! Cross-crate integration tests for the invalidation fabric.

mod delivery;
mod heartbeat;
mod lifecycle;
mod stress;
