//! Settings error types
//!
//! The `Display` text of each variant is what a remote caller receives as the
//! response to a failed update, so the strings are short and stable.

use crate::platform::error::{FlashError, PlatformError};
use alloc::string::String;
use thiserror::Error;

/// Request or schema shape errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchemaError {
    /// Tag matches no setting and no group
    #[error("Not found")]
    NotFound,
    /// Object given for something that is not a group
    #[error("Not a group")]
    NotAGroup,
    /// Object nested below a group
    #[error("Too deep")]
    TooDeep,
    /// Array given for a scalar setting
    #[error("Not an array")]
    NotAnArray,
    /// More array elements than the setting holds
    #[error("Too many")]
    TooMany,
    /// Value of a shape the setting cannot take (e.g. a scalar for a group)
    #[error("Unexpected value")]
    Unexpected,
    /// Payload is not a structured object
    #[error("Bad request")]
    BadRequest,
    /// Setting name longer than a store tag allows
    #[error("Name too long")]
    NameTooLong,
    /// Two settings share a name
    #[error("Duplicate name")]
    DuplicateName,
    /// Numeric width not 1/2/4/8, or a zero-sized buffer
    #[error("Bad width")]
    BadWidth,
    /// Array longer than the index suffix can address
    #[error("Array too long")]
    ArrayTooLong,
    /// Group members disagree on group id or name prefix
    #[error("Group mismatch")]
    GroupMismatch,
}

/// Text ↔ binary conversion errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// Characters that are neither digits nor flags
    #[error("Bad number")]
    BadNumber,
    /// Accumulator overflow while reading digits
    #[error("Number too large")]
    NumberTooLarge,
    /// Value does not fit the declared width
    #[error("Number too big")]
    NumberTooBig,
    /// Minus sign on an unsigned setting
    #[error("Negative not allowed")]
    Negative,
    /// String longer than its buffer
    #[error("Too long")]
    TooLong,
    /// Fixed byte array of the wrong size
    #[error("Wrong length")]
    WrongLength,
    /// Text left over after the last array element
    #[error("Trailing data")]
    TrailingData,
    /// Invalid hex text
    #[error("Bad hex")]
    BadHex,
    /// Invalid base64 text
    #[error("Bad base64")]
    BadBase64,
    /// Stored bytes of a text-valued setting are not UTF-8
    #[error("Bad text")]
    BadText,
}

/// Key-value store adapter errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Namespace used before `open`
    #[error("Store not open")]
    NotOpen,
    /// Tag longer than 16 bytes
    #[error("Key too long")]
    KeyTooLong,
    /// No room left in the namespace
    #[error("Store full")]
    Full,
    /// Persisted data failed validation
    #[error("Store corrupt")]
    Corrupt,
    /// Read failed
    #[error("Store read failed")]
    ReadFailed,
    /// Write failed
    #[error("Store write failed")]
    WriteFailed,
    /// Erase failed
    #[error("Store erase failed")]
    EraseFailed,
    /// Underlying Flash error
    #[error("Store flash error: {0}")]
    Flash(FlashError),
}

impl From<FlashError> for StoreError {
    fn from(err: FlashError) -> Self {
        StoreError::Flash(err)
    }
}

impl From<PlatformError> for StoreError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Flash(flash_err) => StoreError::Flash(flash_err),
            _ => StoreError::ReadFailed,
        }
    }
}

/// A single item too large for one message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CapacityError {
    /// Item encoding alone exceeds the message budget
    #[error("{tag} needs {len} bytes, budget is {budget}")]
    Oversized {
        /// Setting or group name
        tag: String,
        /// Encoded document length
        len: usize,
        /// Message budget
        budget: usize,
    },
}

/// Any settings engine error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingsError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}
