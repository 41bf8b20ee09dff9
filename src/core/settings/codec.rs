//! Text ↔ binary conversion for setting values
//!
//! Every value has a text form (requests, defaults, logs) and a binary form
//! (memory and store). Conversions work on one slot at a time; array text is
//! split into per-slot pieces with [`split_list`] first.
//!
//! # Numeric layout
//!
//! Numerics are big-endian. From the most significant bit down:
//!
//! ```text
//! [sentinel (SET only)] [flag bit per flag char, first char highest] [value field]
//! ```
//!
//! Signed values are two's complement within the value field.

use super::error::CodecError;
use super::schema::{Setting, SettingFlags, SettingKind};
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use core::iter::Peekable;
use core::str::Chars;
use serde_json::Value;

/// Bit allocation of a numeric setting
#[derive(Debug, Clone, Copy)]
struct NumberLayout {
    bits: u32,
    value_bits: u32,
    flag_count: u32,
    sentinel: bool,
}

impl NumberLayout {
    fn of(setting: &Setting) -> Self {
        let bits = setting.size as u32 * 8;
        let sentinel = setting.flags.contains(SettingFlags::SET);
        let flag_count = setting.flag_chars.chars().count() as u32;
        Self {
            bits,
            value_bits: bits - flag_count - u32::from(sentinel),
            flag_count,
            sentinel,
        }
    }

    fn sentinel_bit(&self) -> u64 {
        1 << (self.bits - 1)
    }
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1 << bits) - 1
    }
}

/// Big-endian bytes to integer
pub fn unsigned_value(raw: &[u8]) -> u64 {
    raw.iter().fold(0, |acc, b| (acc << 8) | u64::from(*b))
}

/// Big-endian two's complement bytes to integer
pub fn signed_value(raw: &[u8]) -> i64 {
    match raw.len() {
        0 => 0,
        len => sign_extend(unsigned_value(raw), (len.min(8) * 8) as u32),
    }
}

fn sign_extend(value: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

fn to_be(value: u64, width: usize) -> Vec<u8> {
    value.to_be_bytes()[8 - width..].to_vec()
}

/// Parse one slot's text into its binary form
pub fn parse(setting: &Setting, text: &str) -> Result<Vec<u8>, CodecError> {
    match setting.kind {
        SettingKind::Signed | SettingKind::Unsigned => {
            parse_number(setting, text).map(|value| to_be(value, setting.size as usize))
        }
        SettingKind::Bit => Ok(vec![u8::from(parse_bool(text))]),
        SettingKind::Str => {
            if !setting.is_heap() && text.len() >= setting.size as usize {
                return Err(CodecError::TooLong);
            }
            Ok(text.as_bytes().to_vec())
        }
        SettingKind::Blob => parse_bytes(setting, text),
        SettingKind::Octets => {
            let bytes = parse_bytes(setting, text)?;
            if bytes.is_empty() {
                return Ok(vec![0; setting.size as usize]);
            }
            if bytes.len() != setting.size as usize {
                return Err(CodecError::WrongLength);
            }
            Ok(bytes)
        }
    }
}

/// Format one slot's binary form as text
pub fn format(setting: &Setting, raw: &[u8]) -> Result<String, CodecError> {
    match setting.kind {
        SettingKind::Signed | SettingKind::Unsigned => format_number(setting, raw),
        SettingKind::Bit => Ok(format_bool(raw.first().is_some_and(|b| *b != 0)).into()),
        SettingKind::Str => Ok(String::from_utf8_lossy(raw).into_owned()),
        SettingKind::Blob => Ok(format_bytes(setting, raw)),
        SettingKind::Octets => {
            if raw.len() != setting.size as usize {
                return Err(CodecError::WrongLength);
            }
            Ok(format_bytes(setting, raw))
        }
    }
}

/// Check persisted bytes against the setting shape and return the
/// in-memory form
pub fn normalize(setting: &Setting, raw: &[u8]) -> Result<Vec<u8>, CodecError> {
    let value = match setting.kind {
        SettingKind::Signed | SettingKind::Unsigned | SettingKind::Octets => {
            if raw.len() != setting.size as usize {
                return Err(CodecError::WrongLength);
            }
            raw.to_vec()
        }
        SettingKind::Bit => match raw {
            [value] => vec![u8::from(*value != 0)],
            _ => return Err(CodecError::WrongLength),
        },
        SettingKind::Str if !setting.is_heap() => {
            let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
            if end >= setting.size as usize {
                return Err(CodecError::TooLong);
            }
            raw[..end].to_vec()
        }
        SettingKind::Str | SettingKind::Blob => raw.to_vec(),
    };

    // Bytes shown as plain text must be text, or they would not survive
    // a publish and re-apply
    if is_plain_text(setting) && core::str::from_utf8(&value).is_err() {
        return Err(CodecError::BadText);
    }
    Ok(value)
}

fn is_plain_text(setting: &Setting) -> bool {
    match setting.kind {
        SettingKind::Str => true,
        SettingKind::Blob | SettingKind::Octets => !setting
            .flags
            .intersects(SettingFlags::HEX.union(SettingFlags::BASE64)),
        _ => false,
    }
}

/// `"1"` or anything starting with `t` is true
pub fn parse_bool(text: &str) -> bool {
    matches!(text.chars().next(), Some('1' | 't'))
}

pub fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn parse_bytes(setting: &Setting, text: &str) -> Result<Vec<u8>, CodecError> {
    if setting.flags.contains(SettingFlags::HEX) {
        hex::decode(text).map_err(|_| CodecError::BadHex)
    } else if setting.flags.contains(SettingFlags::BASE64) {
        STANDARD.decode(text).map_err(|_| CodecError::BadBase64)
    } else {
        Ok(text.as_bytes().to_vec())
    }
}

fn format_bytes(setting: &Setting, raw: &[u8]) -> String {
    if setting.flags.contains(SettingFlags::HEX) {
        hex::encode(raw)
    } else if setting.flags.contains(SettingFlags::BASE64) {
        STANDARD.encode(raw)
    } else {
        String::from_utf8_lossy(raw).into_owned()
    }
}

/// Consume any flag characters, setting their bits in `flags`
fn take_flags(setting: &Setting, layout: &NumberLayout, chars: &mut Peekable<Chars<'_>>, flags: &mut u64) {
    while let Some(position) = chars
        .peek()
        .and_then(|c| setting.flag_chars.chars().position(|f| f == *c))
    {
        chars.next();
        *flags |= 1 << (layout.flag_count - 1 - position as u32);
    }
}

fn parse_number(setting: &Setting, text: &str) -> Result<u64, CodecError> {
    if text.is_empty() {
        return Ok(0);
    }

    let layout = NumberLayout::of(setting);
    let hex = setting.flags.contains(SettingFlags::HEX);
    let radix = if hex { 16 } else { 10 };
    let mut chars = text.chars().peekable();
    let mut flags = 0u64;
    let mut digits = 0usize;
    let mut magnitude = 0u64;

    take_flags(setting, &layout, &mut chars, &mut flags);

    let negative = chars.next_if_eq(&'-').is_some();
    if negative && setting.kind == SettingKind::Unsigned {
        return Err(CodecError::Negative);
    }

    let push_digit = |magnitude: u64, radix: u32, digit: u32| {
        magnitude
            .checked_mul(u64::from(radix))
            .and_then(|m| m.checked_add(u64::from(digit)))
            .ok_or(CodecError::NumberTooLarge)
    };

    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(radix)) {
        chars.next();
        magnitude = push_digit(magnitude, radix, digit)?;
        digits += 1;
    }

    if !hex && setting.decimal > 0 {
        let mut places = 0;
        if chars.next_if_eq(&'.').is_some() {
            while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
                chars.next();
                digits += 1;
                // Extra fractional digits are truncated
                if places < setting.decimal {
                    magnitude = push_digit(magnitude, 10, digit)?;
                    places += 1;
                }
            }
        }
        for _ in places..setting.decimal {
            magnitude = push_digit(magnitude, 10, 0)?;
        }
    }

    take_flags(setting, &layout, &mut chars, &mut flags);

    if chars.next().is_some() || (digits == 0 && (negative || flags == 0)) {
        return Err(CodecError::BadNumber);
    }

    let field = match setting.kind {
        SettingKind::Signed => {
            let max = mask(layout.value_bits - 1);
            if magnitude > max + u64::from(negative) {
                return Err(CodecError::NumberTooBig);
            }
            if negative {
                magnitude.wrapping_neg() & mask(layout.value_bits)
            } else {
                magnitude
            }
        }
        _ => {
            if magnitude > mask(layout.value_bits) {
                return Err(CodecError::NumberTooBig);
            }
            magnitude
        }
    };

    let mut raw = field;
    if layout.flag_count > 0 {
        raw |= flags << layout.value_bits;
    }
    if layout.sentinel {
        raw |= layout.sentinel_bit();
    }
    Ok(raw)
}

fn format_number(setting: &Setting, raw: &[u8]) -> Result<String, CodecError> {
    if raw.len() != setting.size as usize {
        return Err(CodecError::WrongLength);
    }

    let layout = NumberLayout::of(setting);
    let value = unsigned_value(raw);

    if layout.sentinel && value & layout.sentinel_bit() == 0 {
        return Ok(String::new());
    }

    let field = value & mask(layout.value_bits);
    let flags = if layout.flag_count > 0 {
        (value >> layout.value_bits) & mask(layout.flag_count)
    } else {
        0
    };

    let (negative, magnitude) = match setting.kind {
        SettingKind::Signed if (field >> (layout.value_bits - 1)) & 1 == 1 => {
            (true, (field | !mask(layout.value_bits)).wrapping_neg())
        }
        _ => (false, field),
    };

    let hex = setting.flags.contains(SettingFlags::HEX);
    let mut digits = if hex {
        format!("{:x}", magnitude)
    } else {
        magnitude.to_string()
    };
    if !hex && setting.decimal > 0 {
        let places = setting.decimal as usize;
        while digits.len() <= places {
            digits.insert(0, '0');
        }
        digits.insert(digits.len() - places, '.');
    }

    let flag_text: String = setting
        .flag_chars
        .chars()
        .enumerate()
        .filter(|(i, _)| flags & (1 << (layout.flag_count - 1 - *i as u32)) != 0)
        .map(|(_, c)| c)
        .collect();

    let leading = setting.flags.contains(SettingFlags::LEADING_FLAGS);
    let mut out = String::with_capacity(flag_text.len() + digits.len() + 1);
    if leading {
        out.push_str(&flag_text);
    }
    if negative {
        out.push('-');
    }
    out.push_str(&digits);
    if !leading {
        out.push_str(&flag_text);
    }
    Ok(out)
}

/// Split array text on `,` or tab into exactly `slots` pieces
///
/// Missing trailing elements come back empty; more elements than slots is
/// [`CodecError::TrailingData`].
pub fn split_list(text: &str, slots: usize) -> Result<Vec<&str>, CodecError> {
    let mut pieces: Vec<&str> = text.split(&[',', '\t'][..]).collect();
    if pieces.len() > slots {
        return Err(CodecError::TrailingData);
    }
    pieces.resize(slots, "");
    Ok(pieces)
}

/// Numerics without decimals, flags, hex or sentinel map to JSON numbers
fn is_plain_number(setting: &Setting) -> bool {
    setting.is_numeric()
        && setting.decimal == 0
        && setting.flag_chars.is_empty()
        && !setting
            .flags
            .intersects(SettingFlags::HEX.union(SettingFlags::SET))
}

/// Structured form of one slot for the published state document
pub fn to_json(setting: &Setting, raw: &[u8]) -> Result<Value, CodecError> {
    if setting.kind == SettingKind::Bit {
        return Ok(Value::Bool(raw.first().is_some_and(|b| *b != 0)));
    }
    if is_plain_number(setting) && raw.len() == setting.size as usize {
        return Ok(match setting.kind {
            SettingKind::Signed => Value::from(signed_value(raw)),
            _ => Value::from(unsigned_value(raw)),
        });
    }
    format(setting, raw).map(Value::String)
}

/// Text form of a JSON scalar, `None` for null, arrays and objects
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(format_bool(*b).into()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
