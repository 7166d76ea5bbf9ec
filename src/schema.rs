//! A compiled descriptor: the ordered step chain, the object constructor,
//! and the fixed-size fold. Use [crate::builder::Builder] to build one, then
//! [Schema::parse] for a single buffer or [Schema::stream] for a chunked
//! byte stream.

use std::fmt;

use crate::compiled::{Control, Step};
use crate::errors::DecodeError;
use crate::field::Ctor;
use crate::source::{ByteSource, SliceSource};
use crate::stream::StreamParser;
use crate::value::Record;

/// Total byte size of a descriptor when statically known. Any step of
/// unknown size poisons the sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Known(usize),
    Unknown,
}

impl Size {
    /// The size in bytes, if statically known.
    pub fn known(self) -> Option<usize> {
        match self {
            Size::Known(n) => Some(n),
            Size::Unknown => None,
        }
    }

    pub(crate) fn add(self, other: Size) -> Size {
        match (self, other) {
            (Size::Known(a), Size::Known(b)) => Size::Known(a + b),
            _ => Size::Unknown,
        }
    }

    pub(crate) fn times(self, n: usize) -> Size {
        match self {
            Size::Known(a) => Size::Known(a * n),
            Size::Unknown => Size::Unknown,
        }
    }
}

/// Result of running a full step chain.
pub(crate) enum Outcome {
    /// Every step ran; the object is complete.
    Complete(Record),
    /// An EOF-tolerant step ended the chain early; the object is still
    /// emitted.
    Finished(Record),
    /// EOF before the object was usable; nothing is emitted.
    Eof,
    /// Stream suspension; the attempt is re-run later.
    Pending,
}

/// An immutable compiled parser descriptor.
pub struct Schema {
    steps: Vec<Step>,
    ctor: Option<Ctor>,
    size: Size,
}

impl Schema {
    pub(crate) fn assemble(steps: Vec<Step>, ctor: Option<Ctor>) -> Self {
        let size = steps
            .iter()
            .fold(Size::Known(0), |acc, step| acc.add(step.size()));
        Schema { steps, ctor, size }
    }

    /// Total byte size, when every step's size is statically known.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Runs the chain against a source, constructing the output object with
    /// `parent` as context.
    pub(crate) fn run(
        &self,
        src: &mut dyn ByteSource,
        parent: Option<&Record>,
    ) -> Result<Outcome, DecodeError> {
        let mut rec = match &self.ctor {
            Some(ctor) => ctor(parent),
            None => Record::new(),
        };

        for step in &self.steps {
            match step.decode(src, &mut rec)? {
                Control::Continue => {}
                Control::Finish => return Ok(Outcome::Finished(rec)),
                Control::Eof => return Ok(Outcome::Eof),
                Control::Pending => return Ok(Outcome::Pending),
            }
        }

        Ok(Outcome::Complete(rec))
    }

    /// Decodes one object from an in-memory buffer. Returns `None` when the
    /// buffer ends before the object does. Trailing bytes are ignored.
    pub fn parse(&self, data: &[u8]) -> Result<Option<Record>, DecodeError> {
        let mut src = SliceSource::new(data);
        match self.run(&mut src, None)? {
            Outcome::Complete(rec) | Outcome::Finished(rec) => Ok(Some(rec)),
            // A buffer source never suspends, so Pending cannot reach here.
            Outcome::Eof | Outcome::Pending => Ok(None),
        }
    }

    /// A streaming transducer decoding objects from pushed chunks.
    pub fn stream(&self) -> StreamParser<'_> {
        StreamParser::new(self)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field(
                "steps",
                &self.steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            )
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::builder::Builder;
    use crate::field::{
        ArrayItem, ArrayOptions, Assert, BitEntry, BufferOptions, Encoding, FieldOptions, Length,
        StringOptions,
    };
    use crate::primitive::{U16BE, U8};
    use crate::value::Value;

    fn rec(entries: Vec<(&str, Value)>) -> Record {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_two_uint8s() {
        let schema = Builder::new().uint8("a").uint8("b").compile().unwrap();

        let parsed = schema.parse(&[0x01, 0x02]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![("a", Value::U64(1)), ("b", Value::U64(2))]))
        );

        // Short input: no object.
        assert_eq!(schema.parse(&[0x01]).unwrap(), None);
    }

    #[test]
    fn test_fixed_size_fold() {
        let schema = Builder::new()
            .uint8("a")
            .uint16_be("b")
            .uint32_le("c")
            .compile()
            .unwrap();
        assert_eq!(schema.size(), Size::Known(7));

        let unknown = Builder::new()
            .uint8("a")
            .string("s", StringOptions::zero_terminated())
            .compile()
            .unwrap();
        assert_eq!(unknown.size(), Size::Unknown);
    }

    #[test]
    fn test_length_determinism() {
        let schema = Builder::new()
            .uint16_be("x")
            .buffer("b", BufferOptions::with_length(3))
            .compile()
            .unwrap();
        let data = [0u8; 8];

        let mut src = SliceSource::new(&data);
        let outcome = schema.run(&mut src, None).unwrap();
        assert!(matches!(outcome, Outcome::Complete(_)));
        assert_eq!(src.consumed(), schema.size().known().unwrap());
    }

    #[test]
    fn test_zero_terminated_string_then_u8() {
        let schema = Builder::new()
            .string("s", StringOptions::zero_terminated())
            .uint8("n")
            .compile()
            .unwrap();

        let parsed = schema.parse(&[0x48, 0x69, 0x00, 0x2A]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![
                ("n", Value::U64(42)),
                ("s", Value::Str("Hi".to_string())),
            ]))
        );
    }

    #[test]
    fn test_zero_terminated_string_max_length() {
        let schema = Builder::new()
            .string(
                "s",
                StringOptions {
                    length: Some(Length::Fixed(3)),
                    ..StringOptions::zero_terminated()
                },
            )
            .uint8("n")
            .compile()
            .unwrap();

        // No NUL within the cap: exactly three bytes consumed.
        let parsed = schema.parse(b"abcd").unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![
                ("n", Value::U64(b'd' as u64)),
                ("s", Value::Str("abc".to_string())),
            ]))
        );
    }

    #[test]
    fn test_fixed_string_strip_null() {
        let schema = Builder::new()
            .string(
                "name",
                StringOptions {
                    strip_null: true,
                    ..StringOptions::with_length(4)
                },
            )
            .compile()
            .unwrap();

        let parsed = schema.parse(b"ab\0\0").unwrap();
        assert_eq!(parsed, Some(rec(vec![("name", Value::Str("ab".to_string()))])));
    }

    #[test]
    fn test_string_invalid_utf8() {
        let schema = Builder::new()
            .string("s", StringOptions::with_length(2))
            .compile()
            .unwrap();

        assert_eq!(
            schema.parse(&[0xFF, 0xFE]).unwrap_err(),
            DecodeError::InvalidEncoding {
                field: "s".to_string()
            }
        );
    }

    #[test]
    fn test_string_ascii_rejects_high_bytes() {
        let schema = Builder::new()
            .string(
                "s",
                StringOptions {
                    encoding: Encoding::Ascii,
                    ..StringOptions::with_length(2)
                },
            )
            .compile()
            .unwrap();

        assert!(schema.parse(&[0x41, 0x80]).is_err());
        assert_eq!(
            schema.parse(&[0x41, 0x42]).unwrap(),
            Some(rec(vec![("s", Value::Str("AB".to_string()))]))
        );
    }

    #[test]
    fn test_length_prefixed_array() {
        let schema = Builder::new()
            .uint8("n")
            .array("xs", ArrayItem::Prim(U16BE), ArrayOptions::count("n"))
            .compile()
            .unwrap();

        let parsed = schema.parse(&[0x02, 0x00, 0x0A, 0x00, 0x0B]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![
                ("n", Value::U64(2)),
                ("xs", Value::Array(vec![Value::U64(10), Value::U64(11)])),
            ]))
        );
    }

    #[test]
    fn test_array_count_from_callback() {
        let schema = Builder::new()
            .uint8("half")
            .array(
                "xs",
                ArrayItem::Prim(U8),
                ArrayOptions::count(Length::with(|rec| match rec.get("half") {
                    Some(Value::U64(h)) => (*h as usize) * 2,
                    _ => 0,
                })),
            )
            .compile()
            .unwrap();

        let parsed = schema.parse(&[0x01, 0x07, 0x08]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![
                ("half", Value::U64(1)),
                ("xs", Value::Array(vec![Value::U64(7), Value::U64(8)])),
            ]))
        );
    }

    #[test]
    fn test_array_unresolved_count_field() {
        let schema = Builder::new()
            .array("xs", ArrayItem::Prim(U8), ArrayOptions::count("missing"))
            .compile()
            .unwrap();

        assert_eq!(
            schema.parse(&[0x01]).unwrap_err(),
            DecodeError::UnresolvedLength {
                field: "xs".to_string(),
                referenced: "missing".to_string(),
            }
        );
    }

    #[test]
    fn test_array_until_predicate_keeps_terminating_element() {
        let schema = Builder::new()
            .array(
                "xs",
                ArrayItem::Prim(U8),
                ArrayOptions::until(|v| *v == Value::U64(0xFF)),
            )
            .uint8("after")
            .compile()
            .unwrap();

        let parsed = schema.parse(&[0x01, 0x02, 0xFF, 0x09]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![
                ("after", Value::U64(9)),
                (
                    "xs",
                    Value::Array(vec![Value::U64(1), Value::U64(2), Value::U64(255)])
                ),
            ]))
        );
    }

    #[test]
    fn test_eof_array_yields_every_whole_element() {
        let schema = Builder::new()
            .array("xs", ArrayItem::Prim(U16BE), ArrayOptions::until_eof())
            .compile()
            .unwrap();

        let parsed = schema.parse(&[0x00, 0x01, 0x00, 0x02]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![(
                "xs",
                Value::Array(vec![Value::U64(1), Value::U64(2)])
            )]))
        );

        // A trailing half element is discarded with the EOF that ended it.
        let parsed = schema.parse(&[0x00, 0x01, 0x00]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![("xs", Value::Array(vec![Value::U64(1)]))]))
        );

        // No whole element at all: EOF propagates and no object is emitted.
        assert_eq!(schema.parse(&[0x00]).unwrap(), None);
        assert_eq!(schema.parse(&[]).unwrap(), None);
    }

    #[test]
    fn test_finite_array_keeps_partial_elements_on_eof() {
        let schema = Builder::new()
            .array("xs", ArrayItem::Prim(U8), ArrayOptions::count(4))
            .compile()
            .unwrap();

        let parsed = schema.parse(&[0x01, 0x02]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![(
                "xs",
                Value::Array(vec![Value::U64(1), Value::U64(2)])
            )]))
        );
    }

    #[test]
    fn test_keyed_array_overwrites_on_collision() {
        let element = || Builder::new().uint8("id").uint8("v");
        let schema = Builder::new()
            .array(
                "by_id",
                ArrayItem::Nested(element()),
                ArrayOptions {
                    key: Some("id".to_string()),
                    ..ArrayOptions::count(3)
                },
            )
            .compile()
            .unwrap();

        let parsed = schema.parse(&[0x01, 0x0A, 0x02, 0x0B, 0x01, 0x0C]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![(
                "by_id",
                Value::Record(BTreeMap::from([
                    (
                        "1".to_string(),
                        Value::Record(rec(vec![("id", Value::U64(1)), ("v", Value::U64(12))]))
                    ),
                    (
                        "2".to_string(),
                        Value::Record(rec(vec![("id", Value::U64(2)), ("v", Value::U64(11))]))
                    ),
                ]))
            )]))
        );
    }

    #[test]
    fn test_nest_reads_parent_context() {
        let inner = Builder::new()
            .create(|parent| match parent {
                Some(p) => rec(vec![("parent_tag", p.get("tag").cloned().unwrap_or(Value::U64(0)))]),
                None => Record::new(),
            })
            .uint8("x");

        let schema = Builder::new().uint8("tag").nest("body", inner).compile().unwrap();

        let parsed = schema.parse(&[0x07, 0x2A]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![
                (
                    "body",
                    Value::Record(rec(vec![
                        ("parent_tag", Value::U64(7)),
                        ("x", Value::U64(42)),
                    ]))
                ),
                ("tag", Value::U64(7)),
            ]))
        );
    }

    #[test]
    fn test_nest_propagates_eof() {
        let schema = Builder::new()
            .uint8("tag")
            .nest("body", Builder::new().uint16_be("x"))
            .compile()
            .unwrap();

        assert_eq!(schema.parse(&[0x01, 0x00]).unwrap(), None);
    }

    #[test]
    fn test_choice_by_tag() {
        let schema = Builder::new()
            .uint8("tag")
            .choice(
                "body",
                vec![
                    Builder::new().uint16_be("x"),
                    Builder::new().uint8("y"),
                ],
                |rec| match rec.get("tag") {
                    Some(Value::U64(1)) => 0,
                    _ => 1,
                },
            )
            .compile()
            .unwrap();

        let parsed = schema.parse(&[0x01, 0x00, 0x07]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![
                ("body", Value::Record(rec(vec![("x", Value::U64(7))]))),
                ("tag", Value::U64(1)),
            ]))
        );

        let parsed = schema.parse(&[0x02, 0x09]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![
                ("body", Value::Record(rec(vec![("y", Value::U64(9))]))),
                ("tag", Value::U64(2)),
            ]))
        );
    }

    #[test]
    fn test_choice_out_of_range() {
        let schema = Builder::new()
            .uint8("tag")
            .choice("body", vec![Builder::new().uint8("x")], |_| 5)
            .compile()
            .unwrap();

        assert_eq!(
            schema.parse(&[0x00, 0x00]).unwrap_err(),
            DecodeError::ChoiceOutOfRange {
                field: "body".to_string(),
                index: 5,
            }
        );
    }

    #[test]
    fn test_bitfield_three_five_eight() {
        let schema = Builder::new()
            .bitfield(vec![
                BitEntry::new("a", 3),
                BitEntry::new("b", 5),
                BitEntry::new("c", 8),
            ])
            .compile()
            .unwrap();
        assert_eq!(schema.size(), Size::Known(2));

        let parsed = schema.parse(&[0xA5, 0xC3]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![
                ("a", Value::U64(5)),
                ("b", Value::U64(5)),
                ("c", Value::U64(195)),
            ]))
        );
    }

    #[test]
    fn test_bitfield_nested_path() {
        let schema = Builder::new()
            .bitfield(vec![
                BitEntry::nested(["flags", "syn"], 1),
                BitEntry::nested(["flags", "ack"], 1),
                BitEntry::new("window", 6),
            ])
            .compile()
            .unwrap();

        let parsed = schema.parse(&[0b10_000101]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![
                (
                    "flags",
                    Value::Record(rec(vec![
                        ("ack", Value::U64(0)),
                        ("syn", Value::U64(1)),
                    ]))
                ),
                ("window", Value::U64(5)),
            ]))
        );
    }

    #[test]
    fn test_bitfield_wide_value_round_trip() {
        // 5 + 48 = 53 bits, the widest accepted block.
        let schema = Builder::new()
            .bitfield(vec![BitEntry::new("ver", 5), BitEntry::new("ts", 48)])
            .compile()
            .unwrap();

        let ver = 0b10110u64;
        let ts = 0x0000_8877_6655_4433u64 & ((1 << 48) - 1);
        let packed = (ver << 48) | ts;
        // 53 bits occupy 7 bytes, left-aligned to the block's bit 0.
        let shifted = packed << 3;
        let bytes: Vec<u8> = (0..7).map(|i| (shifted >> (8 * (6 - i))) as u8).collect();

        let parsed = schema.parse(&bytes).unwrap().unwrap();
        assert_eq!(parsed.get("ver"), Some(&Value::U64(ver)));
        assert_eq!(parsed.get("ts"), Some(&Value::U64(ts)));
    }

    #[test]
    fn test_assert_constant_pass_and_fail() {
        let schema = Builder::new()
            .prim(
                "magic",
                U8,
                FieldOptions {
                    assert: Some(Assert::Equals(Value::U64(0x7F))),
                    ..FieldOptions::default()
                },
            )
            .compile()
            .unwrap();

        assert!(schema.parse(&[0x7F]).unwrap().is_some());
        assert_eq!(
            schema.parse(&[0x00]).unwrap_err(),
            DecodeError::Assert {
                field: "magic".to_string(),
                value: Value::U64(0),
            }
        );
    }

    #[test]
    fn test_assert_sees_raw_formatter_shapes_stored() {
        // The assert runs against the raw decoded value even though a
        // formatter replaces what is stored.
        let schema = Builder::new()
            .prim(
                "level",
                U8,
                FieldOptions {
                    assert: Some(Assert::Check(Box::new(|_, v| *v == Value::U64(2)))),
                    formatter: Some(Box::new(|_, _| Value::Str("debug".to_string()))),
                },
            )
            .compile()
            .unwrap();

        let parsed = schema.parse(&[0x02]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![("level", Value::Str("debug".to_string()))]))
        );
        assert!(schema.parse(&[0x03]).is_err());
    }

    #[test]
    fn test_buffer_to_eof_allows_empty_tail() {
        let schema = Builder::new()
            .uint8("kind")
            .buffer("rest", BufferOptions::until_eof())
            .compile()
            .unwrap();

        let parsed = schema.parse(&[0x05, 0xAA, 0xBB]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![
                ("kind", Value::U64(5)),
                ("rest", Value::Bytes(vec![0xAA, 0xBB])),
            ]))
        );

        let parsed = schema.parse(&[0x05]).unwrap();
        assert_eq!(
            parsed,
            Some(rec(vec![
                ("kind", Value::U64(5)),
                ("rest", Value::Bytes(Vec::new())),
            ]))
        );
    }

    #[test]
    fn test_builder_rejects_unbounded_string() {
        let err = Builder::new()
            .string(
                "s",
                StringOptions {
                    zero_terminated: false,
                    ..StringOptions::zero_terminated()
                },
            )
            .compile();
        assert_eq!(err.unwrap_err(), crate::errors::BuildError::UnboundedString("s".to_string()));
    }
}
