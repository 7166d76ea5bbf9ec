//! Compiled field steps and their decode logic.
//!
//! Declarations are validated once into [Step]s; each step decodes against a
//! byte source and writes into the object under construction. Steps report a
//! [Control] outcome so EOF and suspension flow through the chain without
//! being errors.

use crate::bits::{self, BitBlock};
use crate::errors::{BuildError, DecodeError};
use crate::field::{
    ArrayItem, Assert, Chooser, Encoding, FieldDecl, FieldKind, FieldOptions, Length, Terminator,
};
use crate::primitive::Primitive;
use crate::schema::{Outcome, Schema, Size};
use crate::source::{ByteSource, Fetch};
use crate::value::{insert_at_path, Record, Value};

/// What a step tells the chain after running.
pub(crate) enum Control {
    /// Field written; run the next step.
    Continue,
    /// EOF was tolerated and the object is still valid; stop the chain and
    /// emit.
    Finish,
    /// EOF before the step could complete; the object is void.
    Eof,
    /// Stream suspension; retry the parse once more bytes arrive.
    Pending,
}

/// One decode action in a schema's chain.
pub(crate) struct Step {
    pub(crate) name: String,
    pub(crate) kind: StepKind,
}

pub(crate) enum StepKind {
    Prim {
        prim: Primitive,
        opts: FieldOptions,
    },
    Str(TextStep),
    Buffer {
        length: Option<Length>,
        opts: FieldOptions,
    },
    Nest {
        schema: Schema,
    },
    Array {
        item: Item,
        terminator: Terminator,
        key: Option<String>,
        opts: FieldOptions,
    },
    Choice {
        options: Vec<Schema>,
        chooser: Chooser,
    },
    Bits {
        block: BitBlock,
    },
}

/// A compiled string field.
pub(crate) struct TextStep {
    /// Fixed length, or the maximum when zero-terminated.
    length: Option<Length>,
    zero_terminated: bool,
    strip_null: bool,
    encoding: Encoding,
    opts: FieldOptions,
}

/// A compiled array element.
pub(crate) enum Item {
    Prim(Primitive),
    Nested(Box<Schema>),
}

/// Outcome of decoding one array element.
enum Element {
    Value(Value),
    Eof,
    Pending,
}

impl TryFrom<FieldDecl> for Step {
    type Error = BuildError;

    fn try_from(decl: FieldDecl) -> Result<Self, Self::Error> {
        let kind = match decl.kind {
            FieldKind::Prim { prim, opts } => StepKind::Prim { prim, opts },
            FieldKind::Str { opts } => {
                if opts.length.is_none() && !opts.zero_terminated {
                    return Err(BuildError::UnboundedString(decl.name));
                }
                StepKind::Str(TextStep {
                    length: opts.length,
                    zero_terminated: opts.zero_terminated,
                    strip_null: opts.strip_null,
                    encoding: opts.encoding,
                    opts: FieldOptions {
                        assert: opts.assert,
                        formatter: opts.formatter,
                    },
                })
            }
            FieldKind::Buffer { opts } => StepKind::Buffer {
                length: opts.length,
                opts: FieldOptions {
                    assert: opts.assert,
                    formatter: opts.formatter,
                },
            },
            FieldKind::Nest { inner } => StepKind::Nest {
                schema: inner.compile()?,
            },
            FieldKind::Array { item, opts } => StepKind::Array {
                item: match item {
                    ArrayItem::Prim(prim) => Item::Prim(prim),
                    ArrayItem::Nested(inner) => Item::Nested(Box::new(inner.compile()?)),
                },
                terminator: opts.terminator,
                key: opts.key,
                opts: FieldOptions {
                    assert: opts.assert,
                    formatter: opts.formatter,
                },
            },
            FieldKind::Choice { options, chooser } => {
                if options.is_empty() {
                    return Err(BuildError::EmptyChoice(decl.name));
                }
                StepKind::Choice {
                    options: options
                        .into_iter()
                        .map(|b| b.compile())
                        .collect::<Result<_, _>>()?,
                    chooser,
                }
            }
            FieldKind::Bits { entries } => StepKind::Bits {
                block: BitBlock::compile(entries)?,
            },
        };

        Ok(Step {
            name: decl.name,
            kind,
        })
    }
}

impl Step {
    /// Contribution to the containing schema's fixed size.
    pub(crate) fn size(&self) -> Size {
        match &self.kind {
            StepKind::Prim { prim, .. } => Size::Known(prim.width),
            StepKind::Str(text) => match (&text.length, text.zero_terminated) {
                (Some(Length::Fixed(n)), false) => Size::Known(*n),
                _ => Size::Unknown,
            },
            StepKind::Buffer { length, .. } => match length {
                Some(Length::Fixed(n)) => Size::Known(*n),
                _ => Size::Unknown,
            },
            StepKind::Nest { schema } => schema.size(),
            StepKind::Array {
                item, terminator, ..
            } => {
                let element = match item {
                    Item::Prim(prim) => Size::Known(prim.width),
                    Item::Nested(schema) => schema.size(),
                };
                match terminator {
                    Terminator::Count(Length::Fixed(n)) => element.times(*n),
                    _ => Size::Unknown,
                }
            }
            StepKind::Choice { .. } => Size::Unknown,
            StepKind::Bits { block } => Size::Known(block.total_bytes()),
        }
    }

    pub(crate) fn decode(
        &self,
        src: &mut dyn ByteSource,
        rec: &mut Record,
    ) -> Result<Control, DecodeError> {
        match &self.kind {
            StepKind::Prim { prim, opts } => {
                let raw = match src.request(prim.width) {
                    Fetch::Bytes(buf) => (prim.decode)(buf),
                    Fetch::Pending => return Ok(Control::Pending),
                    Fetch::Eof => return Ok(Control::Eof),
                };
                store(rec, &self.name, raw, opts)?;
                Ok(Control::Continue)
            }

            StepKind::Str(text) => self.decode_str(src, rec, text),

            StepKind::Buffer { length, opts } => match length {
                Some(length) => {
                    let n = resolve_length(length, rec, &self.name)?;
                    let raw = if n == 0 {
                        Value::Bytes(Vec::new())
                    } else {
                        match src.request(n) {
                            Fetch::Bytes(buf) => Value::Bytes(buf.to_vec()),
                            Fetch::Pending => return Ok(Control::Pending),
                            Fetch::Eof => return Ok(Control::Eof),
                        }
                    };
                    store(rec, &self.name, raw, opts)?;
                    Ok(Control::Continue)
                }
                None => {
                    // Read-to-EOF: the terminator is consumed, so the chain
                    // ends here and the object is emitted as-is.
                    let mut collected = Vec::new();
                    loop {
                        match src.request(1) {
                            Fetch::Bytes(buf) => collected.push(buf[0]),
                            Fetch::Pending => return Ok(Control::Pending),
                            Fetch::Eof => break,
                        }
                    }
                    store(rec, &self.name, Value::Bytes(collected), opts)?;
                    Ok(Control::Finish)
                }
            },

            StepKind::Nest { schema } => match schema.run(src, Some(rec))? {
                Outcome::Complete(sub) => {
                    rec.insert(self.name.clone(), Value::Record(sub));
                    Ok(Control::Continue)
                }
                Outcome::Finished(sub) => {
                    rec.insert(self.name.clone(), Value::Record(sub));
                    Ok(Control::Finish)
                }
                Outcome::Eof => Ok(Control::Eof),
                Outcome::Pending => Ok(Control::Pending),
            },

            StepKind::Array {
                item,
                terminator,
                key,
                opts,
            } => self.decode_array(src, rec, item, terminator, key.as_deref(), opts),

            StepKind::Choice { options, chooser } => {
                let index = chooser(rec);
                let schema = options.get(index).ok_or_else(|| DecodeError::ChoiceOutOfRange {
                    field: self.name.clone(),
                    index,
                })?;
                match schema.run(src, Some(rec))? {
                    Outcome::Complete(sub) => {
                        rec.insert(self.name.clone(), Value::Record(sub));
                        Ok(Control::Continue)
                    }
                    Outcome::Finished(sub) => {
                        rec.insert(self.name.clone(), Value::Record(sub));
                        Ok(Control::Finish)
                    }
                    Outcome::Eof => Ok(Control::Eof),
                    Outcome::Pending => Ok(Control::Pending),
                }
            }

            StepKind::Bits { block } => {
                let mut remainder = 0u64;
                for entry in &block.entries {
                    for &run in &entry.runs {
                        let pulled = match src.request(run) {
                            Fetch::Bytes(buf) => bits::run_value(buf),
                            Fetch::Pending => return Ok(Control::Pending),
                            Fetch::Eof => return Ok(Control::Eof),
                        };
                        remainder = bits::fold_run(remainder, run, pulled);
                    }

                    let (extracted, rest) = bits::extract(remainder, entry.shift);
                    remainder = rest;

                    let raw = Value::U64(extracted);
                    if let Some(assert) = &entry.opts.assert {
                        if !check(assert, rec, &raw) {
                            return Err(DecodeError::Assert {
                                field: entry.path.join("."),
                                value: raw,
                            });
                        }
                    }
                    let value = match &entry.opts.formatter {
                        Some(format) => format(rec, raw),
                        None => raw,
                    };
                    insert_at_path(rec, &entry.path, value);
                }
                Ok(Control::Continue)
            }
        }
    }

    fn decode_str(
        &self,
        src: &mut dyn ByteSource,
        rec: &mut Record,
        text: &TextStep,
    ) -> Result<Control, DecodeError> {
        let mut eof_tolerated = false;

        let bytes = if text.zero_terminated {
            let max = match &text.length {
                Some(length) => Some(resolve_length(length, rec, &self.name)?),
                None => None,
            };
            let mut collected = Vec::new();
            loop {
                if max.is_some_and(|m| collected.len() >= m) {
                    break;
                }
                match src.request(1) {
                    Fetch::Bytes(buf) => {
                        if buf[0] == 0 {
                            break;
                        }
                        collected.push(buf[0]);
                    }
                    Fetch::Pending => return Ok(Control::Pending),
                    Fetch::Eof => {
                        if collected.is_empty() {
                            return Ok(Control::Eof);
                        }
                        eof_tolerated = true;
                        break;
                    }
                }
            }
            collected
        } else {
            // Validated at compile time: length is present here.
            let n = match &text.length {
                Some(length) => resolve_length(length, rec, &self.name)?,
                None => 0,
            };
            if n == 0 {
                Vec::new()
            } else {
                match src.request(n) {
                    Fetch::Bytes(buf) => buf.to_vec(),
                    Fetch::Pending => return Ok(Control::Pending),
                    Fetch::Eof => return Ok(Control::Eof),
                }
            }
        };

        let mut decoded = decode_text(bytes, text.encoding, &self.name)?;
        if text.strip_null {
            while decoded.ends_with('\0') {
                decoded.pop();
            }
        }

        store(rec, &self.name, Value::Str(decoded), &text.opts)?;
        if eof_tolerated {
            Ok(Control::Finish)
        } else {
            Ok(Control::Continue)
        }
    }

    fn decode_array(
        &self,
        src: &mut dyn ByteSource,
        rec: &mut Record,
        item: &Item,
        terminator: &Terminator,
        key: Option<&str>,
        opts: &FieldOptions,
    ) -> Result<Control, DecodeError> {
        let expected = match terminator {
            Terminator::Count(length) => Some(resolve_length(length, rec, &self.name)?),
            _ => None,
        };

        let mut vals = Vec::new();
        let mut eof_tolerated = false;

        loop {
            if expected.is_some_and(|n| vals.len() >= n) {
                break;
            }

            match self.decode_element(src, rec, item)? {
                Element::Value(v) => {
                    let stop = match terminator {
                        Terminator::Until(pred) => pred(&v),
                        _ => false,
                    };
                    vals.push(v);
                    if stop {
                        break;
                    }
                }
                Element::Pending => return Ok(Control::Pending),
                Element::Eof => match terminator {
                    // A predicate array cut short by EOF never saw its
                    // terminator; the partial sequence is not a value.
                    Terminator::Until(_) => return Ok(Control::Eof),
                    _ => {
                        if vals.is_empty() {
                            return Ok(Control::Eof);
                        }
                        eof_tolerated = true;
                        break;
                    }
                },
            }
        }

        let raw = match key {
            Some(key) => rekey(&self.name, key, vals)?,
            None => Value::Array(vals),
        };
        store(rec, &self.name, raw, opts)?;

        if eof_tolerated {
            Ok(Control::Finish)
        } else {
            Ok(Control::Continue)
        }
    }

    fn decode_element(
        &self,
        src: &mut dyn ByteSource,
        rec: &Record,
        item: &Item,
    ) -> Result<Element, DecodeError> {
        match item {
            Item::Prim(prim) => match src.request(prim.width) {
                Fetch::Bytes(buf) => Ok(Element::Value((prim.decode)(buf))),
                Fetch::Pending => Ok(Element::Pending),
                Fetch::Eof => Ok(Element::Eof),
            },
            Item::Nested(schema) => match schema.run(src, Some(rec))? {
                Outcome::Complete(sub) | Outcome::Finished(sub) => {
                    Ok(Element::Value(Value::Record(sub)))
                }
                Outcome::Eof => Ok(Element::Eof),
                Outcome::Pending => Ok(Element::Pending),
            },
        }
    }
}

/// Resolves a decode-time length against the fields decoded so far.
fn resolve_length(length: &Length, rec: &Record, field: &str) -> Result<usize, DecodeError> {
    match length {
        Length::Fixed(n) => Ok(*n),
        Length::Field(name) => {
            let value = rec.get(name).ok_or_else(|| DecodeError::UnresolvedLength {
                field: field.to_string(),
                referenced: name.clone(),
            })?;
            value.as_count().ok_or_else(|| DecodeError::InvalidLength {
                field: field.to_string(),
            })
        }
        Length::Compute(f) => Ok(f(rec)),
    }
}

fn check(assert: &Assert, rec: &Record, raw: &Value) -> bool {
    match assert {
        Assert::Equals(expected) => raw == expected,
        Assert::Check(pred) => pred(rec, raw),
    }
}

/// Asserts on the raw value, then stores the formatted representation.
fn store(
    rec: &mut Record,
    name: &str,
    raw: Value,
    opts: &FieldOptions,
) -> Result<(), DecodeError> {
    if let Some(assert) = &opts.assert {
        if !check(assert, rec, &raw) {
            return Err(DecodeError::Assert {
                field: name.to_string(),
                value: raw,
            });
        }
    }

    let value = match &opts.formatter {
        Some(format) => format(rec, raw),
        None => raw,
    };
    rec.insert(name.to_string(), value);
    Ok(())
}

fn decode_text(bytes: Vec<u8>, encoding: Encoding, field: &str) -> Result<String, DecodeError> {
    if encoding == Encoding::Ascii && bytes.iter().any(|b| *b > 0x7F) {
        return Err(DecodeError::InvalidEncoding {
            field: field.to_string(),
        });
    }

    String::from_utf8(bytes).map_err(|_| DecodeError::InvalidEncoding {
        field: field.to_string(),
    })
}

/// Re-keys record elements by an inner field's rendered value.
fn rekey(field: &str, key: &str, vals: Vec<Value>) -> Result<Value, DecodeError> {
    let mut map = Record::new();
    for val in vals {
        let rendered = match &val {
            Value::Record(element) => element.get(key).map(Value::to_string),
            _ => None,
        };
        match rendered {
            Some(k) => {
                map.insert(k, val);
            }
            None => {
                return Err(DecodeError::MissingKey {
                    field: field.to_string(),
                    key: key.to_string(),
                })
            }
        }
    }
    Ok(Value::Record(map))
}
