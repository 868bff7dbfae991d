//! Configuration types
//!
//! Rig configuration as read from TOML, and the validated settings runs
//! are started with.

pub mod file;
pub mod types;

pub use file::{load_file, parse_config, RigConfig};
pub use types::*;
