//! Platform abstraction layer
//!
//! Hardware services the settings engine needs from the board. Only Flash is
//! required: a board driver implements [`FlashInterface`] and hands it to
//! the Flash-backed settings store.

pub mod error;
pub mod traits;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{FlashError, PlatformError, Result};
pub use traits::FlashInterface;
