//! Run state machine
//!
//! A run is explicit, finite and deterministic: every runner transition
//! goes through [`RunState::transition`].

pub mod events;
pub mod machine;

pub use events::{RunEvent, StopReason};
pub use machine::RunState;
