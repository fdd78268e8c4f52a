//! # Invalidation Fabric Test Suite
//!
//! Unified test crate covering cross-crate flows:
//!
//! ```text
//! tests/src/integration/
//! ├── lifecycle.rs   # start/stop sequencing, rollback, restart
//! ├── delivery.rs    # end-to-end frame delivery through the relay
//! ├── heartbeat.rs   # liveness observation at a real subscriber
//! └── stress.rs      # many concurrent producers
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p inval-tests
//! cargo test -p inval-tests integration::delivery
//! ```

pub mod support;

#[cfg(test)]
mod integration;
