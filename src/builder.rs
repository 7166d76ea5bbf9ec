//! Chainable descriptor builder.
//!
//! Each call appends one field step; the declared chain is validated and
//! frozen by [Builder::compile]. Earlier fields are visible to later ones at
//! decode time, so a length can name a field that precedes it.
//!
//! ```
//! use bytecraft::builder::Builder;
//! use bytecraft::field::{ArrayItem, ArrayOptions};
//! use bytecraft::primitive::U16BE;
//!
//! let schema = Builder::new()
//!     .uint8("n")
//!     .array("xs", ArrayItem::Prim(U16BE), ArrayOptions::count("n"))
//!     .compile()
//!     .unwrap();
//!
//! let parsed = schema.parse(&[0x02, 0x00, 0x0A, 0x00, 0x0B]).unwrap();
//! assert!(parsed.is_some());
//! ```

use crate::compiled::Step;
use crate::errors::BuildError;
use crate::field::{
    ArrayItem, ArrayOptions, BitEntry, BufferOptions, Ctor, FieldDecl, FieldKind, FieldOptions,
    StringOptions,
};
use crate::primitive::{self, Primitive};
use crate::schema::Schema;
use crate::value::Record;

/// Accumulates field declarations for one object layout.
#[derive(Default)]
pub struct Builder {
    fields: Vec<FieldDecl>,
    ctor: Option<Ctor>,
}

impl Builder {
    pub fn new() -> Self {
        Builder::default()
    }

    /// Sets the output object constructor. The parent object is passed as
    /// context when this layout runs nested under another.
    pub fn create(mut self, ctor: impl Fn(Option<&Record>) -> Record + 'static) -> Self {
        self.ctor = Some(Box::new(ctor));
        self
    }

    fn push(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldDecl {
            name: name.to_string(),
            kind,
        });
        self
    }

    /// Appends a fixed-width primitive field from the type table.
    pub fn prim(self, name: &str, prim: Primitive, opts: FieldOptions) -> Self {
        self.push(name, FieldKind::Prim { prim, opts })
    }

    /// Appends a string field; see [StringOptions].
    pub fn string(self, name: &str, opts: StringOptions) -> Self {
        self.push(name, FieldKind::Str { opts })
    }

    /// Appends a raw byte field; see [BufferOptions].
    pub fn buffer(self, name: &str, opts: BufferOptions) -> Self {
        self.push(name, FieldKind::Buffer { opts })
    }

    /// Appends a nested object decoded by `inner`.
    pub fn nest(self, name: &str, inner: Builder) -> Self {
        self.push(name, FieldKind::Nest { inner })
    }

    /// Appends a repeated field; see [ArrayOptions].
    pub fn array(self, name: &str, item: ArrayItem, opts: ArrayOptions) -> Self {
        self.push(name, FieldKind::Array { item, opts })
    }

    /// Appends a discriminated union: `chooser` picks the option index from
    /// the fields decoded so far.
    pub fn choice(
        self,
        name: &str,
        options: Vec<Builder>,
        chooser: impl Fn(&Record) -> usize + 'static,
    ) -> Self {
        self.push(
            name,
            FieldKind::Choice {
                options,
                chooser: Box::new(chooser),
            },
        )
    }

    /// Appends a packed bit-field block.
    pub fn bitfield(self, entries: Vec<BitEntry>) -> Self {
        self.push("", FieldKind::Bits { entries })
    }

    /// Validates the declarations and freezes them into a [Schema].
    pub fn compile(self) -> Result<Schema, BuildError> {
        let steps = self
            .fields
            .into_iter()
            .map(Step::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Schema::assemble(steps, self.ctor))
    }

    // One method per entry of the standard primitive table.

    pub fn uint8(self, name: &str) -> Self {
        self.prim(name, primitive::U8, FieldOptions::default())
    }

    pub fn int8(self, name: &str) -> Self {
        self.prim(name, primitive::I8, FieldOptions::default())
    }

    pub fn uint16_be(self, name: &str) -> Self {
        self.prim(name, primitive::U16BE, FieldOptions::default())
    }

    pub fn uint16_le(self, name: &str) -> Self {
        self.prim(name, primitive::U16LE, FieldOptions::default())
    }

    pub fn int16_be(self, name: &str) -> Self {
        self.prim(name, primitive::I16BE, FieldOptions::default())
    }

    pub fn int16_le(self, name: &str) -> Self {
        self.prim(name, primitive::I16LE, FieldOptions::default())
    }

    pub fn uint32_be(self, name: &str) -> Self {
        self.prim(name, primitive::U32BE, FieldOptions::default())
    }

    pub fn uint32_le(self, name: &str) -> Self {
        self.prim(name, primitive::U32LE, FieldOptions::default())
    }

    pub fn int32_be(self, name: &str) -> Self {
        self.prim(name, primitive::I32BE, FieldOptions::default())
    }

    pub fn int32_le(self, name: &str) -> Self {
        self.prim(name, primitive::I32LE, FieldOptions::default())
    }

    pub fn uint64_be(self, name: &str) -> Self {
        self.prim(name, primitive::U64BE, FieldOptions::default())
    }

    pub fn uint64_le(self, name: &str) -> Self {
        self.prim(name, primitive::U64LE, FieldOptions::default())
    }

    pub fn int64_be(self, name: &str) -> Self {
        self.prim(name, primitive::I64BE, FieldOptions::default())
    }

    pub fn int64_le(self, name: &str) -> Self {
        self.prim(name, primitive::I64LE, FieldOptions::default())
    }

    pub fn float32_be(self, name: &str) -> Self {
        self.prim(name, primitive::F32BE, FieldOptions::default())
    }

    pub fn float32_le(self, name: &str) -> Self {
        self.prim(name, primitive::F32LE, FieldOptions::default())
    }

    pub fn float64_be(self, name: &str) -> Self {
        self.prim(name, primitive::F64BE, FieldOptions::default())
    }

    pub fn float64_le(self, name: &str) -> Self {
        self.prim(name, primitive::F64LE, FieldOptions::default())
    }
}
