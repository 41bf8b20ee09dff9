//! Core settings functionality
//!
//! This module contains the settings engine and the infrastructure it runs
//! on: logging macros and the time source used by the restart timer.

pub mod logging;
pub mod settings;
pub mod traits;
