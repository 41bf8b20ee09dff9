//! Boot-time load
//!
//! Loads defaults, then walks every stored entry of both namespaces and
//! matches its tag against the schema. Unknown tags are erased ("zapped"),
//! legacy array tags are migrated to the current form, and FIX settings
//! with nothing stored are written out so they stay pinned across schema
//! changes.

use super::bits::BitSet;
use super::codec;
use super::engine::Settings;
use super::error::SettingsError;
use super::schema::{Namespace, Schema, Setting};
use super::store::{KeyValueStore, Tag, INDEX_FLAG};
use crate::{log_debug, log_error, log_info};
use alloc::vec::Vec;

/// Outcome of [`Settings::boot`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootReport {
    /// Slots loaded from the store
    pub loaded: usize,
    /// Legacy-tagged slots rewritten under their current tag
    pub migrated: usize,
    /// Stored entries erased
    pub zapped: usize,
    /// FIX slots written with their default
    pub fixed: usize,
    /// Entries or store operations that failed
    pub errors: usize,
}

/// One way a stored tag can name a setting slot
struct KeyMatcher {
    name: &'static str,
    /// Tag is an old format; the entry is rewritten and the old tag erased
    legacy: bool,
    matches: fn(&Setting, &[u8]) -> Option<usize>,
}

/// Tried in order; the first matcher that claims a tag wins
const KEY_MATCHERS: [KeyMatcher; 3] = [
    KeyMatcher {
        name: "scalar",
        legacy: false,
        matches: match_scalar,
    },
    KeyMatcher {
        name: "indexed",
        legacy: false,
        matches: match_indexed,
    },
    KeyMatcher {
        name: "legacy",
        legacy: true,
        matches: match_legacy,
    },
];

/// `name` for a scalar
fn match_scalar(setting: &Setting, tag: &[u8]) -> Option<usize> {
    (!setting.is_array() && tag == setting.name.as_bytes()).then_some(0)
}

/// `name` + `0x80 | slot` for an array slot
fn match_indexed(setting: &Setting, tag: &[u8]) -> Option<usize> {
    if !setting.is_array() {
        return None;
    }
    let (last, name) = tag.split_last()?;
    if name != setting.name.as_bytes() || last & INDEX_FLAG == 0 {
        return None;
    }
    let slot = (last & !INDEX_FLAG) as usize;
    (slot < setting.slots()).then_some(slot)
}

/// `name` + one-based decimal index
fn match_legacy(setting: &Setting, tag: &[u8]) -> Option<usize> {
    if !setting.is_array() {
        return None;
    }
    let digits = tag.strip_prefix(setting.name.as_bytes())?;
    if digits.is_empty() || digits.len() > 3 || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let number = digits
        .iter()
        .fold(0usize, |acc, d| acc * 10 + (d - b'0') as usize);
    (1..=setting.slots())
        .contains(&number)
        .then(|| number - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeyMatch {
    index: usize,
    slot: usize,
    legacy: bool,
}

fn match_key(schema: &Schema, namespace: Namespace, tag: &[u8]) -> Option<KeyMatch> {
    KEY_MATCHERS.iter().find_map(|matcher| {
        schema
            .settings()
            .iter()
            .enumerate()
            .filter(|(_, setting)| setting.namespace == namespace)
            .find_map(|(index, setting)| {
                (matcher.matches)(setting, tag).map(|slot| {
                    log_debug!("{}: {} tag, slot {}", setting.name, matcher.name, slot);
                    KeyMatch {
                        index,
                        slot,
                        legacy: matcher.legacy,
                    }
                })
            })
    })
}

impl<S: KeyValueStore> Settings<S> {
    /// Load persisted values, zap unknown entries, migrate legacy tags and
    /// pin FIX settings. Per-entry failures are logged and counted; boot
    /// itself does not fail.
    pub fn boot(&mut self) -> BootReport {
        let mut report = BootReport::default();
        let mut found = BitSet::new(self.schema.total_slots());
        let mut legacy = BitSet::new(self.schema.total_slots());
        let mut zap: Vec<(Namespace, Tag)> = Vec::new();

        self.load_defaults();

        for namespace in Namespace::ALL {
            let entries = match self.store.iterate(namespace) {
                Ok(entries) => entries,
                Err(e) => {
                    log_error!("{}: {}", self.identity.namespace_name(namespace), e);
                    report.errors += 1;
                    continue;
                }
            };

            for (tag, raw) in entries {
                let Some(key) = match_key(&self.schema, namespace, &tag) else {
                    log_info!("Zap unknown setting tag ({} bytes)", tag.len());
                    zap.push((namespace, tag));
                    continue;
                };

                let setting = &self.schema.settings()[key.index];
                let global = self.schema.slot_index(key.index, key.slot);

                // Current-format tags win over legacy ones
                let shadowed = key.legacy && found.test(global);
                let loaded = !shadowed
                    && match codec::normalize(setting, &raw) {
                        Ok(value) => {
                            self.state.set_raw(key.index, key.slot, &value);
                            found.set(global, !key.legacy);
                            legacy.set(global, key.legacy);
                            report.loaded += 1;
                            true
                        }
                        Err(e) => {
                            log_error!("{}: {}", setting.name, e);
                            report.errors += 1;
                            false
                        }
                    };

                if key.legacy || !loaded {
                    zap.push((namespace, tag));
                }
            }
        }

        log_debug!("{} of {} slots stored", found.count_ones(), found.len());

        for (namespace, tag) in zap {
            match self.store.erase(namespace, &tag) {
                Ok(()) => report.zapped += 1,
                Err(e) => {
                    log_error!("Zap failed: {}", e);
                    report.errors += 1;
                }
            }
        }

        for (index, setting) in self.schema.settings().iter().enumerate() {
            for slot in 0..setting.slots() {
                let global = self.schema.slot_index(index, slot);
                let result = if legacy.test(global) {
                    self.persist_slot(index, slot).map(|()| report.migrated += 1)
                } else if setting.is_fix() && !found.test(global) {
                    self.persist_slot(index, slot).map(|()| report.fixed += 1)
                } else {
                    Ok(())
                };
                if let Err(e) = result {
                    log_error!("{}: {}", setting.name, e);
                    report.errors += 1;
                }
            }
        }

        report.errors += self.commit_all();

        log_info!(
            "Settings loaded: {} loaded, {} migrated, {} zapped, {} fixed, {} errors",
            report.loaded,
            report.migrated,
            report.zapped,
            report.fixed,
            report.errors
        );
        report
    }

    /// Commit both namespaces, returning how many commits failed
    pub(super) fn commit_all(&mut self) -> usize {
        let mut failed = 0;
        for namespace in Namespace::ALL {
            if let Err(e) = self.store.commit(namespace) {
                log_error!("{}: {}", self.identity.namespace_name(namespace), SettingsError::from(e));
                failed += 1;
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings::engine::{EngineConfig, Identity};
    use crate::core::settings::store::{self, MemoryStore};

    static TABLE: &[Setting] = &[
        Setting::unsigned("count", 2, "0"),
        Setting::unsigned("chan", 1, "1,2,3").array(3),
        Setting::string("name", 9, "").device(),
        Setting::unsigned("level", 1, "4").fix(),
        Setting::unsigned("chan1", 1, "0"),
    ];

    fn legacy_tags(setting: &Setting) -> impl Iterator<Item = Tag> + '_ {
        (0..setting.slots()).map(move |slot| store::legacy_tag(setting.name, slot).unwrap())
    }

    fn schema() -> Schema {
        Schema::new(TABLE).unwrap()
    }

    fn engine(store: MemoryStore) -> Settings<MemoryStore> {
        Settings::new(
            schema(),
            store,
            Identity::new("dev", "app"),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_matchers() {
        let chan = &TABLE[1];
        assert_eq!(match_scalar(&TABLE[0], b"count"), Some(0));
        assert_eq!(match_scalar(chan, b"chan"), None);
        assert_eq!(match_indexed(chan, b"chan\x82"), Some(2));
        assert_eq!(match_indexed(chan, b"chan\x83"), None);
        assert_eq!(match_indexed(chan, b"chan\x02"), None);
        assert_eq!(match_legacy(chan, b"chan1"), Some(0));
        assert_eq!(match_legacy(chan, b"chan3"), Some(2));
        assert_eq!(match_legacy(chan, b"chan0"), None);
        assert_eq!(match_legacy(chan, b"chan4"), None);
        assert_eq!(match_legacy(chan, b"chanx"), None);
    }

    #[test]
    fn test_exact_scalar_beats_legacy_suffix() {
        let key = match_key(&schema(), Namespace::Application, b"chan1").unwrap();
        assert_eq!(key.index, 4);
        assert!(!key.legacy);
    }

    #[test]
    fn test_namespace_scopes_matching() {
        assert!(match_key(&schema(), Namespace::Device, b"name").is_some());
        assert!(match_key(&schema(), Namespace::Application, b"name").is_none());
    }

    #[test]
    fn test_boot_loads_and_zaps() {
        let mut store = MemoryStore::new();
        store.insert_raw(Namespace::Application, b"count", &[0, 42]);
        store.insert_raw(Namespace::Application, b"chan\x81", &[9]);
        store.insert_raw(Namespace::Application, b"retired", &[1]);
        store.insert_raw(Namespace::Device, b"name", b"pico");

        let mut settings = engine(store);
        let report = settings.boot();

        assert_eq!(report.loaded, 3);
        assert_eq!(report.zapped, 1);
        assert_eq!(report.errors, 0);
        assert_eq!(settings.unsigned("count", 0), Some(42));
        assert_eq!(settings.unsigned("chan", 0), Some(1));
        assert_eq!(settings.unsigned("chan", 1), Some(9));
        assert_eq!(settings.string("name", 0).as_deref(), Some("pico"));
        assert!(!settings.store().contains(Namespace::Application, b"retired"));
    }

    #[test]
    fn test_boot_pins_fix_settings() {
        let mut settings = engine(MemoryStore::new());
        let report = settings.boot();

        assert_eq!(report.fixed, 1);
        assert_eq!(
            settings.store().value(Namespace::Application, b"level"),
            Some(&[4u8][..])
        );

        // Second boot finds it stored
        let report = settings.boot();
        assert_eq!(report.fixed, 0);
        assert_eq!(report.loaded, 1);
    }

    #[test]
    fn test_boot_skips_bad_entries() {
        let mut store = MemoryStore::new();
        store.insert_raw(Namespace::Application, b"count", &[1, 2, 3]);
        store.insert_raw(Namespace::Device, b"name", &[b'p', 0xFF]);

        let mut settings = engine(store);
        let report = settings.boot();

        assert_eq!(report.errors, 2);
        assert_eq!(report.zapped, 2);
        assert_eq!(settings.unsigned("count", 0), Some(0));
        assert_eq!(settings.string("name", 0).as_deref(), Some(""));
        assert!(!settings.store().contains(Namespace::Application, b"count"));
        assert!(!settings.store().contains(Namespace::Device, b"name"));
    }

    #[test]
    fn test_boot_migrates_legacy_tags() {
        static ARRAYS: &[Setting] = &[Setting::unsigned("chan", 1, "1,2,3").array(3)];

        let mut store = MemoryStore::new();
        for (slot, tag) in legacy_tags(&ARRAYS[0]).enumerate() {
            store.insert_raw(Namespace::Application, &tag, &[10 + slot as u8]);
        }
        // The current tag wins over the legacy one for slot 2
        store.insert_raw(Namespace::Application, b"chan\x82", &[99]);

        let mut settings = Settings::new(
            Schema::new(ARRAYS).unwrap(),
            store,
            Identity::new("dev", "app"),
            EngineConfig::default(),
        )
        .unwrap();
        let report = settings.boot();

        assert_eq!(report.migrated, 2);
        assert_eq!(report.zapped, 3);
        assert_eq!(settings.unsigned("chan", 0), Some(10));
        assert_eq!(settings.unsigned("chan", 1), Some(11));
        assert_eq!(settings.unsigned("chan", 2), Some(99));

        let store = settings.store();
        assert_eq!(store.value(Namespace::Application, b"chan\x80"), Some(&[10u8][..]));
        assert_eq!(store.value(Namespace::Application, b"chan\x81"), Some(&[11u8][..]));
        assert!(!store.contains(Namespace::Application, b"chan2"));
    }

    #[test]
    fn test_bad_legacy_entry_is_zapped_once() {
        static WIDE: &[Setting] = &[Setting::unsigned("port", 2, "80").array(2)];

        let mut store = MemoryStore::new();
        store.insert_raw(Namespace::Application, b"port1", &[1, 2, 3]);
        store.insert_raw(Namespace::Application, b"port2", &[0, 8]);

        let mut settings = Settings::new(
            Schema::new(WIDE).unwrap(),
            store,
            Identity::new("dev", "app"),
            EngineConfig::default(),
        )
        .unwrap();
        let report = settings.boot();

        assert_eq!(report.errors, 1);
        assert_eq!(report.zapped, 2);
        assert_eq!(report.migrated, 1);
        assert_eq!(settings.unsigned("port", 0), Some(80));
        assert_eq!(settings.unsigned("port", 1), Some(8));

        let store = settings.store();
        assert_eq!(store.len(Namespace::Application), 1);
        assert_eq!(store.value(Namespace::Application, b"port\x81"), Some(&[0u8, 8][..]));
    }
}
