//! State publication
//!
//! The current state goes out as one or more JSON documents on the device
//! topic. Each document stays within the message budget: items are
//! appended until the next one would not fit, then the document is sent
//! and a new one started. An item too large for any document is sent on
//! its own and reported as oversized.

use super::engine::Settings;
use super::error::{CapacityError, SettingsError};
use super::store::KeyValueStore;
use crate::{log_debug, log_warn};
use alloc::format;
use alloc::string::String;
use heapless::Vec;
use serde_json::Value;

/// Default largest document size in bytes
pub const DEFAULT_MESSAGE_BUDGET: usize = 1024;

/// Message transport (MQTT or similar)
pub trait Transport {
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool);
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) {
        (**self).publish(topic, payload, retain)
    }
}

/// Outcome of one publish pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Documents sent
    pub messages: usize,
    /// Items that exceeded the budget and were sent alone
    pub oversized: usize,
}

/// Splits the state into budget-sized documents
///
/// The document buffer is a fixed `N`-byte `heapless::Vec`, so the budget
/// is also the publisher's memory footprint.
pub struct StatePublisher<const N: usize = DEFAULT_MESSAGE_BUDGET> {
    buffer: Vec<u8, N>,
    items: usize,
}

impl<const N: usize> Default for StatePublisher<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> StatePublisher<N> {
    /// Fails the build for a budget that cannot hold `{}`
    const BUDGET_HOLDS_EMPTY_DOCUMENT: () = assert!(N >= 2, "message budget below 2 bytes");

    pub const fn new() -> Self {
        let () = Self::BUDGET_HOLDS_EMPTY_DOCUMENT;
        Self {
            buffer: Vec::new(),
            items: 0,
        }
    }

    /// Message budget in bytes
    pub const fn budget(&self) -> usize {
        N
    }

    fn begin(&mut self) {
        self.buffer.clear();
        self.items = 0;
        // Cannot fail: N >= 2
        let _ = self.buffer.push(b'{');
    }

    fn append(&mut self, fragment: &str) -> Result<(), CapacityError> {
        let overflow = || CapacityError::Oversized {
            tag: String::new(),
            len: fragment.len(),
            budget: N,
        };
        if self.items > 0 {
            self.buffer.push(b',').map_err(|_| overflow())?;
        }
        self.buffer
            .extend_from_slice(fragment.as_bytes())
            .map_err(|_| overflow())?;
        self.items += 1;
        Ok(())
    }

    fn flush<T: Transport>(&mut self, topic: &str, transport: &mut T, retain: bool) -> Result<(), CapacityError> {
        self.buffer.push(b'}').map_err(|_| CapacityError::Oversized {
            tag: String::new(),
            len: self.buffer.len() + 1,
            budget: N,
        })?;
        log_debug!("Publish {} items, {} bytes", self.items, self.buffer.len());
        transport.publish(topic, &self.buffer, retain);
        self.begin();
        Ok(())
    }

    /// Publish the full non-secret state of `settings`
    pub fn publish<S: KeyValueStore, T: Transport>(
        &mut self,
        settings: &Settings<S>,
        transport: &mut T,
    ) -> Result<PublishReport, SettingsError> {
        let topic = settings.topic();
        let retain = settings.config().retain;
        let mut report = PublishReport::default();

        self.begin();
        for (tag, value) in settings.state_items() {
            let fragment = format!("{}:{}", Value::String(tag.into()), value);
            let separator = usize::from(self.items > 0);

            if self.buffer.len() + separator + fragment.len() + 1 > N {
                if self.items > 0 {
                    self.flush(&topic, transport, retain)?;
                    report.messages += 1;
                }

                if 1 + fragment.len() + 1 > N {
                    let err = CapacityError::Oversized {
                        tag: tag.into(),
                        len: fragment.len() + 2,
                        budget: N,
                    };
                    log_warn!("{}", err);
                    let document = format!("{{{}}}", fragment);
                    transport.publish(&topic, document.as_bytes(), retain);
                    report.messages += 1;
                    report.oversized += 1;
                    continue;
                }
            }

            self.append(&fragment)?;
        }

        if self.items > 0 || report.messages == 0 {
            self.flush(&topic, transport, retain)?;
            report.messages += 1;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings::engine::{EngineConfig, Identity};
    use crate::core::settings::schema::{Schema, Setting};
    use crate::core::settings::store::MemoryStore;
    use alloc::vec::Vec as StdVec;

    #[derive(Default)]
    struct Capture {
        messages: StdVec<(String, StdVec<u8>, bool)>,
    }

    impl Transport for Capture {
        fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) {
            self.messages.push((topic.into(), payload.to_vec(), retain));
        }
    }

    static TABLE: &[Setting] = &[
        Setting::unsigned("count", 2, "42"),
        Setting::bit("debug", "1"),
        Setting::unsigned("chan", 1, "1,2,3").array(3),
        Setting::string("token", 32, "hidden").secret(),
        Setting::string("motd", 200, ""),
    ];

    fn engine() -> Settings<MemoryStore> {
        Settings::new(
            Schema::new(TABLE).unwrap(),
            MemoryStore::new(),
            Identity::new("a1b2c3", "demo"),
            EngineConfig::default(),
        )
        .unwrap()
    }

    fn documents(capture: &Capture) -> StdVec<Value> {
        capture
            .messages
            .iter()
            .map(|(_, payload, _)| serde_json::from_slice(payload).unwrap())
            .collect()
    }

    #[test]
    fn test_single_document() {
        let settings = engine();
        let mut capture = Capture::default();
        let mut publisher = StatePublisher::<1024>::new();

        let report = publisher.publish(&settings, &mut capture).unwrap();
        assert_eq!(report, PublishReport { messages: 1, oversized: 0 });

        let (topic, payload, retain) = &capture.messages[0];
        assert_eq!(topic, "settings/demo/a1b2c3");
        assert!(*retain);
        assert_eq!(
            core::str::from_utf8(payload).unwrap(),
            r#"{"count":42,"debug":true,"chan":[1,2,3],"motd":""}"#
        );
    }

    #[test]
    fn test_splits_at_budget() {
        let settings = engine();
        let mut capture = Capture::default();
        let mut publisher = StatePublisher::<24>::new();

        let report = publisher.publish(&settings, &mut capture).unwrap();
        assert_eq!(report.oversized, 0);
        assert!(report.messages > 1);

        let mut merged = serde_json::Map::new();
        for (_, payload, _) in &capture.messages {
            assert!(payload.len() <= 24);
        }
        for document in documents(&capture) {
            merged.extend(document.as_object().unwrap().clone());
        }
        assert_eq!(merged.len(), 4);
        assert!(!merged.contains_key("token"));
    }

    #[test]
    fn test_oversized_item_sent_alone() {
        static LONG: &[Setting] = &[
            Setting::unsigned("a", 1, "1"),
            Setting::string("banner", 64, "a banner longer than the budget"),
            Setting::unsigned("b", 1, "2"),
        ];
        let settings = Settings::new(
            Schema::new(LONG).unwrap(),
            MemoryStore::new(),
            Identity::new("x", "y"),
            EngineConfig::default(),
        )
        .unwrap();

        let mut capture = Capture::default();
        let report = StatePublisher::<32>::new()
            .publish(&settings, &mut capture)
            .unwrap();

        assert_eq!(report, PublishReport { messages: 3, oversized: 1 });
        let payloads: StdVec<&[u8]> = capture
            .messages
            .iter()
            .map(|(_, payload, _)| payload.as_slice())
            .collect();
        assert_eq!(payloads[0], br#"{"a":1}"#);
        assert_eq!(
            payloads[1],
            br#"{"banner":"a banner longer than the budget"}"#
        );
        assert_eq!(payloads[2], br#"{"b":2}"#);
    }

    #[test]
    fn test_smallest_budget_sends_every_item_alone() {
        let settings = engine();
        let mut capture = Capture::default();

        let report = StatePublisher::<2>::new()
            .publish(&settings, &mut capture)
            .unwrap();

        assert_eq!(report, PublishReport { messages: 4, oversized: 4 });
        assert_eq!(capture.messages[0].1, br#"{"count":42}"#);
        assert_eq!(capture.messages[3].1, br#"{"motd":""}"#);
    }

    #[test]
    fn test_empty_state_sends_empty_document() {
        static SECRETS: &[Setting] = &[Setting::string("token", 8, "").secret()];
        let settings = Settings::new(
            Schema::new(SECRETS).unwrap(),
            MemoryStore::new(),
            Identity::new("x", "y"),
            EngineConfig::default(),
        )
        .unwrap();

        let mut capture = Capture::default();
        let report = StatePublisher::<64>::new()
            .publish(&settings, &mut capture)
            .unwrap();
        assert_eq!(report.messages, 1);
        assert_eq!(capture.messages[0].1, b"{}");
    }
}
