//! Core traits for platform-agnostic settings functionality.
//!
//! These decouple the settings engine from the board (clock) so the whole
//! engine runs on the host under test.

pub mod time;

pub use time::{MockTime, TimeSource};
