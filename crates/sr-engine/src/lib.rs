//! sr-engine: Rack engine for SonicRack
//!
//! Turns rack descriptions into running signal chains:
//! - Module registry (declared parameters and defaults) and processor factory
//! - Handle-based processor arena, cached per module id
//! - Track and bus strips with incremental rack reconciliation
//! - Mixer orchestrator driven by a lock-free command queue
//! - Throttled, lock-free telemetry back to the control plane
//! - Offline rendering through the same command path

// Per-sample loops index several buffers in lockstep
#![allow(clippy::needless_range_loop)]

mod arena;
mod assets;
mod context;
mod error;
mod export;
mod factory;
mod mixer;
mod node;
mod offline;
mod protocol;
mod registry;
mod strip;
mod telemetry;
mod transport;
mod wrappers;

pub use arena::*;
pub use assets::*;
pub use context::*;
pub use error::*;
pub use export::*;
pub use factory::*;
pub use mixer::*;
pub use node::*;
pub use offline::*;
pub use protocol::*;
pub use registry::*;
pub use strip::*;
pub use telemetry::*;
pub use transport::*;
pub use wrappers::*;
