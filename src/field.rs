//! Declaration layer: per-field options collected by the builder before
//! compilation.
//!
//! Options that need decode-time context are closures over the partially
//! built [Record]; everything else is plain data. Option structs expose
//! their fields so declarations compose with struct-update syntax:
//!
//! ```
//! use bytecraft::field::StringOptions;
//!
//! let opts = StringOptions {
//!     strip_null: true,
//!     ..StringOptions::with_length(8)
//! };
//! assert!(opts.strip_null);
//! ```

use crate::builder::Builder;
use crate::primitive::Primitive;
use crate::value::{Record, Value};

/// Constructs a fresh output object, optionally with the parent object as
/// context. The element may read the parent but never mutates it.
pub type Ctor = Box<dyn Fn(Option<&Record>) -> Record>;

/// Replaces a decoded value before it is stored.
pub type Formatter = Box<dyn Fn(&Record, Value) -> Value>;

/// Selects a choice option by index from the fields decoded so far.
pub type Chooser = Box<dyn Fn(&Record) -> usize>;

/// Post-decode check on a field. Runs against the raw decoded value, before
/// any formatter.
pub enum Assert {
    /// The decoded value must equal this one.
    Equals(Value),
    /// The predicate must hold for (object so far, decoded value).
    Check(Box<dyn Fn(&Record, &Value) -> bool>),
}

/// A byte length resolved at decode time.
pub enum Length {
    Fixed(usize),
    /// Named field on the object being built; must already be decoded and
    /// hold a nonnegative integer.
    Field(String),
    /// Computed from the object being built.
    Compute(Box<dyn Fn(&Record) -> usize>),
}

impl Length {
    /// Length computed by a callback over the object so far.
    pub fn with(f: impl Fn(&Record) -> usize + 'static) -> Self {
        Length::Compute(Box::new(f))
    }
}

impl From<usize> for Length {
    fn from(n: usize) -> Self {
        Length::Fixed(n)
    }
}

impl From<&str> for Length {
    fn from(name: &str) -> Self {
        Length::Field(name.to_string())
    }
}

impl From<String> for Length {
    fn from(name: String) -> Self {
        Length::Field(name)
    }
}

/// Character encoding for string fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// UTF-8. Any valid UTF-8 byte sequence is accepted.
    #[default]
    Utf8,
    /// ASCII. Every byte must be in 0..=0x7F.
    Ascii,
}

/// Options common to every field kind.
#[derive(Default)]
pub struct FieldOptions {
    pub assert: Option<Assert>,
    pub formatter: Option<Formatter>,
}

impl std::fmt::Debug for FieldOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldOptions")
            .field("assert", &self.assert.is_some())
            .field("formatter", &self.formatter.is_some())
            .finish()
    }
}

/// Options for string fields. Supply a length, zero-termination, or both
/// (zero-terminated with a maximum length); supplying neither fails at
/// compile.
pub struct StringOptions {
    pub length: Option<Length>,
    pub zero_terminated: bool,
    /// Strip trailing NUL characters after decoding.
    pub strip_null: bool,
    pub encoding: Encoding,
    pub assert: Option<Assert>,
    pub formatter: Option<Formatter>,
}

impl StringOptions {
    /// A string of a fixed or decode-time-resolved byte length.
    pub fn with_length(length: impl Into<Length>) -> Self {
        StringOptions {
            length: Some(length.into()),
            zero_terminated: false,
            strip_null: false,
            encoding: Encoding::default(),
            assert: None,
            formatter: None,
        }
    }

    /// A string read byte-by-byte until a NUL terminator.
    pub fn zero_terminated() -> Self {
        StringOptions {
            length: None,
            zero_terminated: true,
            strip_null: false,
            encoding: Encoding::default(),
            assert: None,
            formatter: None,
        }
    }
}

/// Options for raw byte fields.
pub struct BufferOptions {
    /// `None` reads to end of input.
    pub length: Option<Length>,
    pub assert: Option<Assert>,
    pub formatter: Option<Formatter>,
}

impl BufferOptions {
    pub fn with_length(length: impl Into<Length>) -> Self {
        BufferOptions {
            length: Some(length.into()),
            assert: None,
            formatter: None,
        }
    }

    /// Consume every remaining byte of the input.
    pub fn until_eof() -> Self {
        BufferOptions {
            length: None,
            assert: None,
            formatter: None,
        }
    }
}

/// What ends a repeated field.
pub enum Terminator {
    /// A declared element count, resolved at decode time.
    Count(Length),
    /// Read elements until end of input; the read that hit EOF yields no
    /// element.
    Eof,
    /// Checked after each element; a true result stops the array, keeping
    /// that element.
    Until(Box<dyn Fn(&Value) -> bool>),
}

/// The element type of an array.
pub enum ArrayItem {
    Prim(Primitive),
    Nested(Builder),
}

/// Options for array fields.
pub struct ArrayOptions {
    pub terminator: Terminator,
    /// Re-key the decoded sequence into a map by this inner field. Later
    /// entries overwrite earlier ones on collision.
    pub key: Option<String>,
    pub assert: Option<Assert>,
    pub formatter: Option<Formatter>,
}

impl ArrayOptions {
    /// An array with a declared element count.
    pub fn count(length: impl Into<Length>) -> Self {
        ArrayOptions {
            terminator: Terminator::Count(length.into()),
            key: None,
            assert: None,
            formatter: None,
        }
    }

    /// An array that runs to end of input.
    pub fn until_eof() -> Self {
        ArrayOptions {
            terminator: Terminator::Eof,
            key: None,
            assert: None,
            formatter: None,
        }
    }

    /// An array ended by a predicate on each decoded element.
    pub fn until(pred: impl Fn(&Value) -> bool + 'static) -> Self {
        ArrayOptions {
            terminator: Terminator::Until(Box::new(pred)),
            key: None,
            assert: None,
            formatter: None,
        }
    }
}

/// One entry of a packed bit-field block.
pub struct BitEntry {
    /// Destination path in the output object; more than one segment writes
    /// into a nested sub-record created on demand.
    pub path: Vec<String>,
    /// Width in bits.
    pub bits: usize,
    pub opts: FieldOptions,
}

impl BitEntry {
    pub fn new(name: &str, bits: usize) -> Self {
        BitEntry {
            path: vec![name.to_string()],
            bits,
            opts: FieldOptions::default(),
        }
    }

    /// An entry stored under a nested path.
    pub fn nested<const N: usize>(path: [&str; N], bits: usize) -> Self {
        BitEntry {
            path: path.iter().map(|s| s.to_string()).collect(),
            bits,
            opts: FieldOptions::default(),
        }
    }
}

/// A declared field, prior to compilation.
pub(crate) struct FieldDecl {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
}

pub(crate) enum FieldKind {
    Prim {
        prim: Primitive,
        opts: FieldOptions,
    },
    Str {
        opts: StringOptions,
    },
    Buffer {
        opts: BufferOptions,
    },
    Nest {
        inner: Builder,
    },
    Array {
        item: ArrayItem,
        opts: ArrayOptions,
    },
    Choice {
        options: Vec<Builder>,
        chooser: Chooser,
    },
    Bits {
        entries: Vec<BitEntry>,
    },
}
