//! Runtime settings
//!
//! A firmware image declares its settings as a static [`Setting`] table.
//! At boot, [`Settings::boot`] loads persisted values from a
//! [`KeyValueStore`]; at runtime, [`Settings::apply`] takes remote update
//! requests and [`StatePublisher`] sends the current state out in
//! size-bounded documents.
//!
//! # Example
//!
//! ```
//! use pico_settings::core::settings::{
//!     EngineConfig, Identity, MemoryStore, RestartTrigger, Schema, Setting, Settings,
//! };
//!
//! static SETTINGS: &[Setting] = &[
//!     Setting::unsigned("count", 2, "0"),
//!     Setting::bit("debug", "false").live(),
//! ];
//!
//! struct NoRestart;
//! impl RestartTrigger for NoRestart {
//!     fn schedule_restart(&mut self, _reason: &str, _delay_secs: u32) {}
//! }
//!
//! let schema = Schema::new(SETTINGS).unwrap();
//! let identity = Identity::new("a1b2c3", "demo");
//! let mut settings =
//!     Settings::new(schema, MemoryStore::new(), identity, EngineConfig::default()).unwrap();
//! settings.boot();
//!
//! let response = settings.handle_request(br#"{"debug": true}"#, &mut NoRestart);
//! assert_eq!(response, "");
//! assert_eq!(settings.bit("debug", 0), Some(true));
//! ```

pub mod bits;
pub mod boot;
pub mod codec;
pub mod engine;
pub mod error;
pub mod publish;
pub mod restart;
pub mod schema;
pub mod store;
pub mod update;
pub mod value;

pub use bits::BitSet;
pub use boot::BootReport;
pub use engine::{EngineConfig, Identity, Settings, DEVICE_NAMESPACE};
pub use error::{CapacityError, CodecError, SchemaError, SettingsError, StoreError};
pub use publish::{PublishReport, StatePublisher, Transport, DEFAULT_MESSAGE_BUDGET};
pub use restart::{DeferredRestart, RestartTrigger};
pub use schema::{Namespace, Schema, Setting, SettingFlags, SettingKind};
pub use store::{FlashStore, KeyValueStore, Tag};
#[cfg(any(test, feature = "mock"))]
pub use store::MemoryStore;
pub use update::ApplyReport;
pub use value::{SettingsState, Storage};
