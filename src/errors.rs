//! Library-wide error types, split by phase: [BuildError] at descriptor
//! construction, [DecodeError] while decoding bytes.

use std::fmt;

use crate::value::Value;

/// Rejected descriptor declarations. Raised by `Builder::compile`, never
/// during decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A string field declared neither a length nor zero-termination.
    UnboundedString(String),
    /// A choice field with an empty option list.
    EmptyChoice(String),
    /// A bit-field block with no entries.
    EmptyBitfield,
    /// A bit-field entry of zero width.
    ZeroWidthBitEntry(String),
    /// A bit-field entry with an empty destination path.
    EmptyBitPath,
    /// A bit-field block wider than [crate::bits::MAX_BLOCK_BITS] bits.
    BitfieldTooWide(usize),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::UnboundedString(name) => {
                write!(f, "string field '{name}' needs a length or zero-termination")
            }
            BuildError::EmptyChoice(name) => {
                write!(f, "choice field '{name}' has no options")
            }
            BuildError::EmptyBitfield => write!(f, "bit-field block has no entries"),
            BuildError::ZeroWidthBitEntry(name) => {
                write!(f, "bit-field entry '{name}' has zero width")
            }
            BuildError::EmptyBitPath => write!(f, "bit-field entry has an empty path"),
            BuildError::BitfieldTooWide(bits) => {
                write!(f, "bit-field block of {bits} bits exceeds the 53-bit limit")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Failures while decoding. EOF is not among them: end-of-input is signalled
/// through the read protocol and handled by the combinators.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// An asserted field decoded to an unacceptable value.
    Assert { field: String, value: Value },
    /// A length option named a field that is absent from the object.
    UnresolvedLength { field: String, referenced: String },
    /// A length option resolved to a non-numeric or negative value.
    InvalidLength { field: String },
    /// A chooser selected an option index outside the declared list.
    ChoiceOutOfRange { field: String, index: usize },
    /// String bytes were not valid in the declared encoding.
    InvalidEncoding { field: String },
    /// A keyed array element is missing the key field.
    MissingKey { field: String, key: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Assert { field, value } => {
                write!(f, "assertion failed on field '{field}' (decoded {value})")
            }
            DecodeError::UnresolvedLength { field, referenced } => {
                write!(
                    f,
                    "length of '{field}' references '{referenced}', which is not decoded yet"
                )
            }
            DecodeError::InvalidLength { field } => {
                write!(f, "length of '{field}' did not resolve to a nonnegative integer")
            }
            DecodeError::ChoiceOutOfRange { field, index } => {
                write!(f, "choice '{field}' selected option {index}, which does not exist")
            }
            DecodeError::InvalidEncoding { field } => {
                write!(f, "field '{field}' holds bytes invalid for its encoding")
            }
            DecodeError::MissingKey { field, key } => {
                write!(f, "array '{field}' element is missing key field '{key}'")
            }
        }
    }
}

impl std::error::Error for DecodeError {}
