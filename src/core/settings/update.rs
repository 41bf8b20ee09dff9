//! Remote updates
//!
//! An update request is a JSON object of tag → value:
//!
//! ```text
//! {"count": 42}                    scalar, any JSON scalar is read as text
//! {"chan": [9, null, 7]}           array, null resets a slot to its default
//! {"chan": "9,2,7"}                array given as list text
//! {"wifi": {"ssid": "home"}}       group, unnamed members reset to default
//! {"wifi": null}                   whole group to defaults
//! {"count": null}                  setting to its default
//! ```
//!
//! Only slots whose binary value changes are written. A slot set back to
//! its default is erased from the store instead, unless the setting is FIX.
//! Non-live changes are persisted but stay out of memory until a restart,
//! which is scheduled once per request.

use super::bits::BitSet;
use super::codec;
use super::engine::Settings;
use super::error::{SchemaError, SettingsError};
use super::restart::RestartTrigger;
use super::schema::Namespace;
use super::store::{self, KeyValueStore};
use crate::{log_debug, log_error, log_info};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use serde_json::{Map, Value};

/// Outcome of a successful update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Slots written to the store
    pub changed: usize,
    /// Slots erased because they went back to their default
    pub erased: usize,
    /// A restart was scheduled
    pub restart: bool,
}

#[derive(Default)]
struct ApplyContext {
    report: ApplyReport,
    first_error: Option<SettingsError>,
    restart_reason: Option<&'static str>,
    touched: [bool; 2],
}

impl ApplyContext {
    fn touch(&mut self, namespace: Namespace) {
        self.touched[namespace.id()] = true;
    }

    fn fail(&mut self, tag: &str, err: SettingsError) {
        log_error!("{}: {}", tag, err);
        self.first_error.get_or_insert(err);
    }
}

impl<S: KeyValueStore> Settings<S> {
    /// Apply an update request. Tags are processed independently: a failing
    /// tag is logged and skipped, and the first failure is returned after
    /// the others have been applied.
    pub fn apply<R: RestartTrigger>(
        &mut self,
        request: &Value,
        restart: &mut R,
    ) -> Result<ApplyReport, SettingsError> {
        let Value::Object(tags) = request else {
            return Err(SchemaError::BadRequest.into());
        };

        let mut ctx = ApplyContext::default();
        for (tag, value) in tags {
            self.apply_tag(None, tag, value, &mut ctx, None);
        }

        for namespace in Namespace::ALL {
            if ctx.touched[namespace.id()] {
                if let Err(e) = self.store.commit(namespace) {
                    ctx.fail(self.identity.namespace_name(namespace), e.into());
                }
            }
        }

        if let Some(reason) = ctx.restart_reason {
            restart.schedule_restart(reason, self.config.restart_delay_secs);
            ctx.report.restart = true;
        }

        match ctx.first_error {
            Some(err) => Err(err),
            None => Ok(ctx.report),
        }
    }

    /// Apply a raw request payload and return the caller-facing response:
    /// empty on success, otherwise the first error message
    pub fn handle_request<R: RestartTrigger>(&mut self, payload: &[u8], restart: &mut R) -> String {
        let request: Value = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(_) => {
                log_error!("Request is not valid JSON ({} bytes)", payload.len());
                return SchemaError::BadRequest.to_string();
            }
        };

        match self.apply(&request, restart) {
            Ok(report) => {
                log_info!(
                    "Update applied: {} changed, {} erased",
                    report.changed,
                    report.erased
                );
                String::new()
            }
            Err(err) => err.to_string(),
        }
    }

    /// Set one setting from text (list text for arrays)
    pub fn apply_text<R: RestartTrigger>(
        &mut self,
        name: &str,
        text: &str,
        restart: &mut R,
    ) -> Result<ApplyReport, SettingsError> {
        let mut request = Map::new();
        request.insert(name.into(), Value::String(text.into()));
        self.apply(&Value::Object(request), restart)
    }

    fn apply_tag(
        &mut self,
        group: Option<u8>,
        tag: &str,
        value: &Value,
        ctx: &mut ApplyContext,
        visited: Option<&mut BitSet>,
    ) {
        let found = match group {
            None => self.schema.find(tag),
            Some(group) => self.schema.find_member(group, tag),
        };

        if let Some(index) = found {
            if let Some(visited) = visited {
                visited.set(index, true);
            }
            let result = match value {
                Value::Null => self.reset_setting(index, ctx),
                Value::Object(_) if group.is_some() => Err(SchemaError::TooDeep.into()),
                Value::Object(_) => Err(SchemaError::NotAGroup.into()),
                Value::Array(items) => self.apply_array(index, items, ctx),
                scalar => self.apply_scalar(index, scalar, ctx),
            };
            if let Err(err) = result {
                ctx.fail(tag, err);
            }
            return;
        }

        let group_id = match group {
            None => self.schema.group_id(tag),
            Some(_) => None,
        };
        let Some(group_id) = group_id else {
            let err = match value {
                Value::Object(_) if group.is_some() => SchemaError::TooDeep,
                _ => SchemaError::NotFound,
            };
            ctx.fail(tag, err.into());
            return;
        };

        match value {
            Value::Null => {
                let members: Vec<usize> = self.schema.group_members(group_id).collect();
                for index in members {
                    if let Err(err) = self.reset_setting(index, ctx) {
                        ctx.fail(self.schema.settings()[index].name, err);
                    }
                }
            }
            Value::Object(members) => {
                let mut visited = BitSet::new(self.schema.len());
                for (member, value) in members {
                    self.apply_tag(Some(group_id), member, value, ctx, Some(&mut visited));
                }

                // Members the request left out go back to their defaults,
                // except secrets, which are never published to begin with
                let unvisited: Vec<usize> = self
                    .schema
                    .group_members(group_id)
                    .filter(|index| !visited.test(*index))
                    .filter(|index| !self.schema.settings()[*index].is_secret())
                    .collect();
                for index in unvisited {
                    if let Err(err) = self.reset_setting(index, ctx) {
                        ctx.fail(self.schema.settings()[index].name, err);
                    }
                }
            }
            _ => ctx.fail(tag, SchemaError::Unexpected.into()),
        }
    }

    /// Every slot back to its default
    fn reset_setting(&mut self, index: usize, ctx: &mut ApplyContext) -> Result<(), SettingsError> {
        let slots = self.schema.settings()[index].slots();
        for slot in 0..slots {
            let default = self.defaults[self.schema.slot_index(index, slot)].clone();
            self.write_slot(index, slot, default, ctx)?;
        }
        Ok(())
    }

    fn apply_array(&mut self, index: usize, items: &[Value], ctx: &mut ApplyContext) -> Result<(), SettingsError> {
        let setting = &self.schema.settings()[index];
        if !setting.is_array() {
            return Err(SchemaError::NotAnArray.into());
        }
        if items.len() > setting.slots() {
            return Err(SchemaError::TooMany.into());
        }

        // Parse every element before writing any
        let mut values = Vec::with_capacity(setting.slots());
        for slot in 0..setting.slots() {
            let value = match items.get(slot) {
                None | Some(Value::Null) => self.defaults[self.schema.slot_index(index, slot)].clone(),
                Some(item) => {
                    let text = codec::scalar_text(item).ok_or(SchemaError::Unexpected)?;
                    codec::parse(setting, &text)?
                }
            };
            values.push(value);
        }

        for (slot, value) in values.into_iter().enumerate() {
            self.write_slot(index, slot, value, ctx)?;
        }
        Ok(())
    }

    fn apply_scalar(&mut self, index: usize, value: &Value, ctx: &mut ApplyContext) -> Result<(), SettingsError> {
        let setting = &self.schema.settings()[index];
        let text = codec::scalar_text(value).ok_or(SchemaError::Unexpected)?;

        if !setting.is_array() {
            let raw = codec::parse(setting, &text)?;
            return self.write_slot(index, 0, raw, ctx);
        }

        let values = codec::split_list(&text, setting.slots())?
            .into_iter()
            .map(|piece| codec::parse(setting, piece))
            .collect::<Result<Vec<_>, _>>()?;
        for (slot, raw) in values.into_iter().enumerate() {
            self.write_slot(index, slot, raw, ctx)?;
        }
        Ok(())
    }

    /// Persist one slot if its value changed
    fn write_slot(
        &mut self,
        index: usize,
        slot: usize,
        raw: Vec<u8>,
        ctx: &mut ApplyContext,
    ) -> Result<(), SettingsError> {
        let setting = &self.schema.settings()[index];
        let global = self.schema.slot_index(index, slot);
        let memory = self.state.raw(index, slot);
        let current = self.pending.get(&global).unwrap_or(&memory);
        let tag = store::setting_tag(setting, slot)?;
        let namespace = setting.namespace;

        if raw == *current {
            if !setting.is_fix() && raw == self.defaults[global] && self.store.get(namespace, &tag)?.is_some() {
                self.store.erase(namespace, &tag)?;
                ctx.report.erased += 1;
                ctx.touch(namespace);
                log_debug!("{}[{}] back to default, erased", setting.name, slot);
            }
            return Ok(());
        }

        self.store.put(namespace, &tag, &raw)?;
        ctx.report.changed += 1;
        ctx.touch(namespace);

        if setting.is_live() {
            self.state.set_raw(index, slot, &raw);
            self.pending.remove(&global);
        } else if raw == memory {
            // Pending change undone before the restart
            self.pending.remove(&global);
        } else {
            log_info!("{}[{}] changed, takes effect after restart", setting.name, slot);
            self.pending.insert(global, raw);
            ctx.restart_reason = Some(setting.name);
        }
        Ok(())
    }
}
