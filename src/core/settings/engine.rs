//! Settings engine
//!
//! [`Settings`] owns the validated schema, the live values and the store.
//! Loading at boot lives in `boot.rs`, remote updates in `update.rs` and
//! state publication in `publish.rs`; this file holds construction, value
//! access and factory reset.

use super::codec;
use super::error::SettingsError;
use super::restart::RestartTrigger;
use super::schema::{Namespace, Schema, SettingKind};
use super::store::{self, KeyValueStore};
use super::value::SettingsState;
use crate::{log_error, log_warn};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use serde_json::{Map, Value};

/// Store namespace name for device-owned settings
pub const DEVICE_NAMESPACE: &str = "device";

/// Longest store namespace name
pub const MAX_NAMESPACE_NAME: usize = 15;

/// Who this device is: names the application namespace and the state topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Unique device id, usually derived from the MAC address
    pub device_id: String,
    /// Application name
    pub app_name: String,
}

impl Identity {
    pub fn new(device_id: &str, app_name: &str) -> Self {
        Self {
            device_id: device_id.into(),
            app_name: app_name.into(),
        }
    }

    /// Store namespace name (application name cut to 15 bytes)
    pub fn namespace_name(&self, namespace: Namespace) -> &str {
        match namespace {
            Namespace::Device => DEVICE_NAMESPACE,
            Namespace::Application => {
                let mut end = self.app_name.len().min(MAX_NAMESPACE_NAME);
                while !self.app_name.is_char_boundary(end) {
                    end -= 1;
                }
                &self.app_name[..end]
            }
        }
    }

    /// Topic the state document is published on
    pub fn topic(&self) -> String {
        format!("settings/{}/{}", self.app_name, self.device_id)
    }
}

/// Engine tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Delay before a restart requested by a non-live change
    pub restart_delay_secs: u32,
    /// Publish the state document as retained
    pub retain: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            restart_delay_secs: 5,
            retain: true,
        }
    }
}

/// Runtime settings
pub struct Settings<S: KeyValueStore> {
    pub(super) schema: Schema,
    pub(super) state: SettingsState,
    /// Default value per global slot
    pub(super) defaults: Vec<Vec<u8>>,
    /// Persisted values of non-live slots waiting for a restart, by global slot
    pub(super) pending: BTreeMap<usize, Vec<u8>>,
    pub(super) store: S,
    pub(super) identity: Identity,
    pub(super) config: EngineConfig,
}

impl<S: KeyValueStore> Settings<S> {
    /// Open both store namespaces and load defaults into memory.
    /// Call [`boot`](Settings::boot) to load persisted values.
    pub fn new(
        schema: Schema,
        mut store: S,
        identity: Identity,
        config: EngineConfig,
    ) -> Result<Self, SettingsError> {
        for namespace in Namespace::ALL {
            store.open(namespace, identity.namespace_name(namespace))?;
        }

        let defaults = Self::parse_defaults(&schema);
        let mut settings = Self {
            state: SettingsState::new(&schema),
            schema,
            defaults,
            pending: BTreeMap::new(),
            store,
            identity,
            config,
        };
        settings.load_defaults();
        Ok(settings)
    }

    fn parse_defaults(schema: &Schema) -> Vec<Vec<u8>> {
        let mut defaults = Vec::with_capacity(schema.total_slots());
        for setting in schema.settings() {
            let empty = codec::parse(setting, "").unwrap_or_default();
            let pieces = if setting.is_array() {
                codec::split_list(setting.default, setting.slots())
            } else {
                Ok(vec![setting.default])
            };

            match pieces {
                Ok(pieces) => {
                    for piece in pieces {
                        let value = codec::parse(setting, piece).unwrap_or_else(|e| {
                            log_error!("{}: bad default ({})", setting.name, e);
                            empty.clone()
                        });
                        defaults.push(value);
                    }
                }
                Err(e) => {
                    log_error!("{}: bad default ({})", setting.name, e);
                    defaults.extend(core::iter::repeat(empty).take(setting.slots()));
                }
            }
        }
        defaults
    }

    /// Reset every slot in memory to its default and forget pending values
    pub(super) fn load_defaults(&mut self) {
        for (index, setting) in self.schema.settings().iter().enumerate() {
            for slot in 0..setting.slots() {
                let global = self.schema.slot_index(index, slot);
                self.state.set_raw(index, slot, &self.defaults[global]);
            }
        }
        self.pending.clear();
    }

    /// Write one slot's in-memory value to the store
    pub(super) fn persist_slot(&mut self, index: usize, slot: usize) -> Result<(), SettingsError> {
        let setting = &self.schema.settings()[index];
        let tag = store::setting_tag(setting, slot)?;
        let raw = self.state.raw(index, slot);
        self.store.put(setting.namespace, &tag, &raw)?;
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Give back the store (on restart, uncommitted state is gone anyway)
    pub fn into_store(self) -> S {
        self.store
    }

    /// Topic for the state document
    pub fn topic(&self) -> String {
        self.identity.topic()
    }

    fn locate(&self, name: &str, slot: usize) -> Option<usize> {
        let index = self.schema.find(name)?;
        (slot < self.schema.settings()[index].slots()).then_some(index)
    }

    /// In-memory binary value of one slot
    pub fn raw(&self, name: &str, slot: usize) -> Option<Vec<u8>> {
        self.locate(name, slot)
            .map(|index| self.state.raw(index, slot))
    }

    /// In-memory value of one slot as text
    pub fn text(&self, name: &str, slot: usize) -> Option<String> {
        let index = self.locate(name, slot)?;
        codec::format(&self.schema.settings()[index], &self.state.raw(index, slot)).ok()
    }

    fn raw_of_kind(&self, name: &str, slot: usize, kind: SettingKind) -> Option<Vec<u8>> {
        let index = self.locate(name, slot)?;
        (self.schema.settings()[index].kind == kind).then(|| self.state.raw(index, slot))
    }

    /// Unsigned setting as its raw integer (decimal settings are scaled,
    /// flag and sentinel bits included)
    pub fn unsigned(&self, name: &str, slot: usize) -> Option<u64> {
        self.raw_of_kind(name, slot, SettingKind::Unsigned)
            .map(|raw| codec::unsigned_value(&raw))
    }

    /// Signed setting as its raw integer
    pub fn signed(&self, name: &str, slot: usize) -> Option<i64> {
        self.raw_of_kind(name, slot, SettingKind::Signed)
            .map(|raw| codec::signed_value(&raw))
    }

    pub fn bit(&self, name: &str, slot: usize) -> Option<bool> {
        self.raw_of_kind(name, slot, SettingKind::Bit)
            .map(|raw| raw.first().is_some_and(|b| *b != 0))
    }

    pub fn string(&self, name: &str, slot: usize) -> Option<String> {
        self.raw_of_kind(name, slot, SettingKind::Str)
            .and_then(|raw| String::from_utf8(raw).ok())
    }

    /// Blob or octets value
    pub fn bytes(&self, name: &str, slot: usize) -> Option<Vec<u8>> {
        let index = self.locate(name, slot)?;
        matches!(
            self.schema.settings()[index].kind,
            SettingKind::Blob | SettingKind::Octets
        )
        .then(|| self.state.raw(index, slot))
    }

    /// Persisted value waiting for a restart
    pub fn pending(&self, name: &str, slot: usize) -> Option<&[u8]> {
        let index = self.locate(name, slot)?;
        self.pending
            .get(&self.schema.slot_index(index, slot))
            .map(Vec::as_slice)
    }

    /// Any non-live change is waiting for a restart
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Value a slot takes after the next restart: the pending value if there
    /// is one, else memory
    fn published_raw(&self, index: usize, slot: usize) -> Vec<u8> {
        match self.pending.get(&self.schema.slot_index(index, slot)) {
            Some(raw) => raw.clone(),
            None => self.state.raw(index, slot),
        }
    }

    /// Published form of one setting (array or scalar). Slots with a pending
    /// change show the pending value, so echoing the state back is a no-op.
    pub fn value_json(&self, index: usize) -> Value {
        let setting = &self.schema.settings()[index];
        let slot_json = |slot| {
            codec::to_json(setting, &self.published_raw(index, slot)).unwrap_or(Value::Null)
        };
        if setting.is_array() {
            Value::Array((0..setting.slots()).map(slot_json).collect())
        } else {
            slot_json(0)
        }
    }

    /// Published form of a group: non-secret members by member name
    pub fn group_json(&self, group: u8) -> Value {
        let members: Map<String, Value> = self
            .schema
            .group_members(group)
            .filter(|index| !self.schema.settings()[*index].is_secret())
            .map(|index| {
                (
                    self.schema.settings()[index].member_name().into(),
                    self.value_json(index),
                )
            })
            .collect();
        Value::Object(members)
    }

    /// Top-level items of the state document in declared order; secrets are
    /// left out and each group appears once, at its first published member
    pub fn state_items(&self) -> Vec<(&'static str, Value)> {
        let settings = self.schema.settings();
        let mut items = Vec::new();

        for (index, setting) in settings.iter().enumerate() {
            if setting.is_secret() {
                continue;
            }
            match setting.group_name() {
                None => items.push((setting.name, self.value_json(index))),
                Some(group) => {
                    let seen = settings[..index]
                        .iter()
                        .any(|s| s.group == setting.group && !s.is_secret());
                    if !seen {
                        items.push((group, self.group_json(setting.group)));
                    }
                }
            }
        }
        items
    }

    /// Whole state as one document
    pub fn state_document(&self) -> Value {
        Value::Object(
            self.state_items()
                .into_iter()
                .map(|(tag, value)| (tag.into(), value))
                .collect(),
        )
    }

    /// Erase every persisted setting in both namespaces, reload defaults and
    /// schedule a restart. Returns the number of entries erased.
    pub fn factory_reset<R: RestartTrigger>(&mut self, restart: &mut R) -> Result<usize, SettingsError> {
        let mut erased = 0;
        for namespace in Namespace::ALL {
            for (tag, _) in self.store.iterate(namespace)? {
                self.store.erase(namespace, &tag)?;
                erased += 1;
            }
            self.store.commit(namespace)?;
        }

        self.load_defaults();
        log_warn!("Factory reset, {} entries erased", erased);
        restart.schedule_restart("factory reset", self.config.restart_delay_secs);
        Ok(erased)
    }
}
