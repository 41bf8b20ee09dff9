//! Setting descriptors and the validated schema table
//!
//! A firmware image declares its settings once as a `&'static [Setting]`
//! built with the `const fn` builders below, then validates it into a
//! [`Schema`] at startup:
//!
//! ```
//! use pico_settings::core::settings::{Schema, Setting};
//!
//! static SETTINGS: &[Setting] = &[
//!     Setting::unsigned("count", 2, "0"),
//!     Setting::unsigned("chan", 1, "1,2,3").array(3),
//!     Setting::string("wifi.ssid", 33, "").group(1).live(),
//!     Setting::string("wifi.pass", 64, "").group(1).secret(),
//! ];
//!
//! let schema = Schema::new(SETTINGS).unwrap();
//! assert_eq!(schema.group_id("wifi"), Some(1));
//! ```

use super::error::SchemaError;
use alloc::vec::Vec;
use bitflags::bitflags;

/// Maximum setting name length (store tags hold one more byte for the index)
pub const MAX_NAME_LEN: usize = 15;

/// Maximum array length addressable by the index suffix byte
pub const MAX_ARRAY_LEN: usize = 128;

/// Value kind of a setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingKind {
    /// Two's complement integer of 1/2/4/8 bytes
    Signed,
    /// Unsigned integer of 1/2/4/8 bytes
    Unsigned,
    /// Boolean held in the shared bit-vector
    Bit,
    /// Variable-length heap-owned bytes
    Blob,
    /// String, fixed NUL-terminated buffer unless heap-owned
    Str,
    /// Fixed-length byte array
    Octets,
}

/// Store namespace a setting persists into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Namespace {
    /// Settings owned by the device platform (identity, networking)
    Device = 0,
    /// Settings owned by the application
    Application = 1,
}

impl Namespace {
    /// Both namespaces in id order
    pub const ALL: [Namespace; 2] = [Namespace::Device, Namespace::Application];

    /// Namespace id (0 or 1)
    pub const fn id(self) -> usize {
        self as usize
    }
}

bitflags! {
    /// Setting behaviour flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SettingFlags: u16 {
        /// Never published
        const SECRET = 0b0000_0001;
        /// Takes effect in memory immediately when changed
        const LIVE = 0b0000_0010;
        /// Always persisted, even when equal to the default
        const FIX = 0b0000_0100;
        /// Top bit marks "a value was supplied"
        const SET = 0b0000_1000;
        /// Flag characters are written before the digits
        const LEADING_FLAGS = 0b0001_0000;
        /// Text form is hex
        const HEX = 0b0010_0000;
        /// Text form is base64
        const BASE64 = 0b0100_0000;
        /// Slot storage is heap-owned
        const HEAP = 0b1000_0000;
    }
}

/// Immutable definition of one setting
#[derive(Debug, Clone, Copy)]
pub struct Setting {
    /// Setting name, `group.member` for group members
    pub name: &'static str,
    /// Value kind
    pub kind: SettingKind,
    /// Byte width (numerics), buffer size including NUL (strings), exact length (octets)
    pub size: u8,
    /// Array length, 0 for a scalar
    pub array: u8,
    /// Group id, 0 for top level
    pub group: u8,
    /// Decimal places for numerics
    pub decimal: u8,
    /// Default value as text
    pub default: &'static str,
    /// Flag alphabet for numerics, first character is the highest flag bit
    pub flag_chars: &'static str,
    /// Store namespace
    pub namespace: Namespace,
    /// Behaviour flags
    pub flags: SettingFlags,
}

impl Setting {
    const fn new(name: &'static str, kind: SettingKind, size: u8, default: &'static str) -> Self {
        Self {
            name,
            kind,
            size,
            array: 0,
            group: 0,
            decimal: 0,
            default,
            flag_chars: "",
            namespace: Namespace::Application,
            flags: SettingFlags::empty(),
        }
    }

    /// Signed integer of `width` bytes
    pub const fn signed(name: &'static str, width: u8, default: &'static str) -> Self {
        Self::new(name, SettingKind::Signed, width, default)
    }

    /// Unsigned integer of `width` bytes
    pub const fn unsigned(name: &'static str, width: u8, default: &'static str) -> Self {
        Self::new(name, SettingKind::Unsigned, width, default)
    }

    /// Boolean
    pub const fn bit(name: &'static str, default: &'static str) -> Self {
        Self::new(name, SettingKind::Bit, 1, default)
    }

    /// Variable-length blob
    pub const fn blob(name: &'static str, default: &'static str) -> Self {
        Self::new(name, SettingKind::Blob, 0, default).with(SettingFlags::HEAP)
    }

    /// Fixed string buffer of `size` bytes (at most `size - 1` characters)
    pub const fn string(name: &'static str, size: u8, default: &'static str) -> Self {
        Self::new(name, SettingKind::Str, size, default)
    }

    /// Heap-owned string of any length
    pub const fn heap_string(name: &'static str, default: &'static str) -> Self {
        Self::new(name, SettingKind::Str, 0, default).with(SettingFlags::HEAP)
    }

    /// Fixed byte array of exactly `size` bytes
    pub const fn octets(name: &'static str, size: u8, default: &'static str) -> Self {
        Self::new(name, SettingKind::Octets, size, default)
    }

    /// Make this an array of `len` slots
    pub const fn array(mut self, len: u8) -> Self {
        self.array = len;
        self
    }

    /// Place this setting in group `id`
    pub const fn group(mut self, id: u8) -> Self {
        self.group = id;
        self
    }

    /// Fixed-point with `places` decimal digits
    pub const fn decimal(mut self, places: u8) -> Self {
        self.decimal = places;
        self
    }

    /// Flag alphabet for numerics
    pub const fn flag_chars(mut self, chars: &'static str) -> Self {
        self.flag_chars = chars;
        self
    }

    /// Persist into the device namespace
    pub const fn device(mut self) -> Self {
        self.namespace = Namespace::Device;
        self
    }

    /// Add behaviour flags
    pub const fn with(mut self, flags: SettingFlags) -> Self {
        self.flags = self.flags.union(flags);
        self
    }

    pub const fn secret(self) -> Self {
        self.with(SettingFlags::SECRET)
    }

    pub const fn live(self) -> Self {
        self.with(SettingFlags::LIVE)
    }

    pub const fn fix(self) -> Self {
        self.with(SettingFlags::FIX)
    }

    /// Reserve the top bit as the "value supplied" sentinel
    pub const fn sentinel(self) -> Self {
        self.with(SettingFlags::SET)
    }

    pub const fn leading_flags(self) -> Self {
        self.with(SettingFlags::LEADING_FLAGS)
    }

    pub const fn hex(self) -> Self {
        self.with(SettingFlags::HEX)
    }

    pub const fn base64(self) -> Self {
        self.with(SettingFlags::BASE64)
    }

    /// Number of value slots (1 for a scalar)
    pub fn slots(&self) -> usize {
        (self.array as usize).max(1)
    }

    pub fn is_array(&self) -> bool {
        self.array > 0
    }

    pub fn is_secret(&self) -> bool {
        self.flags.contains(SettingFlags::SECRET)
    }

    pub fn is_live(&self) -> bool {
        self.flags.contains(SettingFlags::LIVE)
    }

    pub fn is_fix(&self) -> bool {
        self.flags.contains(SettingFlags::FIX)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, SettingKind::Signed | SettingKind::Unsigned)
    }

    /// Slots live on the heap rather than in an inline buffer
    pub fn is_heap(&self) -> bool {
        self.kind == SettingKind::Blob || self.flags.contains(SettingFlags::HEAP)
    }

    /// Group part of the name, for group members
    pub fn group_name(&self) -> Option<&'static str> {
        if self.group == 0 {
            return None;
        }
        self.name.split_once('.').map(|(group, _)| group)
    }

    /// Name within the group, or the full name at top level
    pub fn member_name(&self) -> &'static str {
        match (self.group, self.name.split_once('.')) {
            (0, _) | (_, None) => self.name,
            (_, Some((_, member))) => member,
        }
    }
}

/// Validated, immutable schema table
#[derive(Debug, Clone)]
pub struct Schema {
    settings: &'static [Setting],
    /// First global slot index per setting
    slot_base: Vec<usize>,
    /// First bit-vector index per setting (Bit kinds only)
    bit_base: Vec<usize>,
    total_slots: usize,
    total_bits: usize,
}

impl Schema {
    /// Validate a descriptor table and assign slot and bit positions
    pub fn new(settings: &'static [Setting]) -> Result<Self, SchemaError> {
        let mut slot_base = Vec::with_capacity(settings.len());
        let mut bit_base = Vec::with_capacity(settings.len());
        let mut total_slots = 0;
        let mut total_bits = 0;

        for (index, setting) in settings.iter().enumerate() {
            Self::validate(setting)?;

            if settings[..index].iter().any(|s| s.name == setting.name) {
                return Err(SchemaError::DuplicateName);
            }

            if setting.group != 0 {
                let group = setting.group_name().ok_or(SchemaError::GroupMismatch)?;
                let conflict = settings[..index].iter().any(|other| {
                    other.group != 0
                        && ((other.group == setting.group) != (other.group_name() == Some(group)))
                });
                if conflict {
                    return Err(SchemaError::GroupMismatch);
                }
            }

            slot_base.push(total_slots);
            bit_base.push(total_bits);
            total_slots += setting.slots();
            if setting.kind == SettingKind::Bit {
                total_bits += setting.slots();
            }
        }

        // A group name must not also be a top-level setting name
        for setting in settings.iter().filter(|s| s.group == 0) {
            if settings
                .iter()
                .any(|s| s.group != 0 && s.group_name() == Some(setting.name))
            {
                return Err(SchemaError::GroupMismatch);
            }
        }

        Ok(Self {
            settings,
            slot_base,
            bit_base,
            total_slots,
            total_bits,
        })
    }

    fn validate(setting: &Setting) -> Result<(), SchemaError> {
        if setting.name.is_empty() || setting.name.len() > MAX_NAME_LEN {
            return Err(SchemaError::NameTooLong);
        }
        if setting.array as usize > MAX_ARRAY_LEN {
            return Err(SchemaError::ArrayTooLong);
        }

        match setting.kind {
            SettingKind::Signed | SettingKind::Unsigned => {
                if !matches!(setting.size, 1 | 2 | 4 | 8) {
                    return Err(SchemaError::BadWidth);
                }
                let reserved = setting.flag_chars.chars().count()
                    + usize::from(setting.flags.contains(SettingFlags::SET));
                if reserved >= setting.size as usize * 8 {
                    return Err(SchemaError::BadWidth);
                }
            }
            SettingKind::Str | SettingKind::Octets if !setting.is_heap() => {
                if setting.size == 0 {
                    return Err(SchemaError::BadWidth);
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// The descriptor table
    pub fn settings(&self) -> &'static [Setting] {
        self.settings
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'static Setting> {
        self.settings.get(index)
    }

    /// Index of the setting with this full name
    pub fn find(&self, name: &str) -> Option<usize> {
        self.settings.iter().position(|s| s.name == name)
    }

    /// Index of `member` within group `group`
    pub fn find_member(&self, group: u8, member: &str) -> Option<usize> {
        self.settings
            .iter()
            .position(|s| s.group == group && s.group != 0 && s.member_name() == member)
    }

    /// Group id for a group name
    pub fn group_id(&self, name: &str) -> Option<u8> {
        self.settings
            .iter()
            .find(|s| s.group_name() == Some(name))
            .map(|s| s.group)
    }

    /// Indices of all members of a group, in declared order
    pub fn group_members(&self, group: u8) -> impl Iterator<Item = usize> + '_ {
        self.settings
            .iter()
            .enumerate()
            .filter(move |(_, s)| group != 0 && s.group == group)
            .map(|(index, _)| index)
    }

    /// Global slot index of `slot` of setting `index`
    pub fn slot_index(&self, index: usize, slot: usize) -> usize {
        self.slot_base[index] + slot
    }

    /// First bit-vector index of a Bit setting
    pub fn bit_index(&self, index: usize) -> usize {
        self.bit_base[index]
    }

    /// Total value slots across all settings
    pub fn total_slots(&self) -> usize {
        self.total_slots
    }

    /// Total bits in the shared bit-vector
    pub fn total_bits(&self) -> usize {
        self.total_bits
    }
}
